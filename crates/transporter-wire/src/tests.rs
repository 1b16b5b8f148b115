//! Wire format tests: frame shapes, path segments, handle references.

use crate::as_handle_ref;
use crate::handle_ref;
use crate::Codec;
use crate::CodecError;
use crate::ErrorKind;
use crate::JsonCodec;
use crate::Message;
use crate::PathSegment;
use crate::Payload;
use crate::SOURCE_TAG;

#[test]
fn frame_round_trip() {
    let codec = JsonCodec;
    let message = Message::new(
        7,
        "demo",
        Payload::Apply {
            handle: 0,
            path: vec!["math".into(), "sum".into()],
            args: vec![serde_json::json!(1.0), handle_ref(3)],
        },
    );

    let frame = codec.encode(&message).unwrap();
    let decoded = codec.decode(&frame).unwrap();

    assert_eq!(decoded, message);
    assert_eq!(decoded.source, SOURCE_TAG);
}

#[test]
fn type_tags_are_snake_case() {
    let codec = JsonCodec;
    let frame = codec
        .encode(&Message::new(1, "demo", Payload::GarbageCollect { handle: 4 }))
        .unwrap();

    let raw: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(raw["type"], "garbage_collect");
    assert_eq!(raw["handle"], 4);
    assert_eq!(raw["scope"], "demo");
    assert_eq!(raw["source"], "transporter");
}

#[test]
fn ping_is_a_bare_tag() {
    let codec = JsonCodec;
    let frame = codec.encode(&Message::new(2, "demo", Payload::Ping)).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(raw["type"], "ping");
}

#[test]
fn error_kinds_are_snake_case() {
    let frame = serde_json::to_string(&ErrorKind::UnknownHandle).unwrap();
    assert_eq!(frame, "\"unknown_handle\"");
    let frame = serde_json::to_string(&ErrorKind::PathNotFound).unwrap();
    assert_eq!(frame, "\"path_not_found\"");
}

#[test]
fn path_segments_mix_keys_and_indices() {
    let path: Vec<PathSegment> = serde_json::from_str(r#"["items", 2, "name"]"#).unwrap();
    assert_eq!(
        path,
        vec![
            PathSegment::Key("items".into()),
            PathSegment::Index(2),
            PathSegment::Key("name".into()),
        ]
    );

    let rendered = serde_json::to_string(&path).unwrap();
    assert_eq!(rendered, r#"["items",2,"name"]"#);
}

#[test]
fn handle_ref_detection() {
    assert_eq!(as_handle_ref(&handle_ref(9)), Some(9));

    // Plain objects that merely resemble a placeholder are not handles.
    assert_eq!(as_handle_ref(&serde_json::json!({ "__handle": 9 })), None);
    assert_eq!(
        as_handle_ref(&serde_json::json!({ "__handle": 9, "kind": "widget" })),
        None
    );
    assert_eq!(as_handle_ref(&serde_json::json!("function")), None);
}

#[test]
fn decode_rejects_garbage() {
    let codec = JsonCodec;
    match codec.decode("not a frame") {
        Err(CodecError::Decode(_)) => {}
        other => panic!("expected Decode error, got {:?}", other),
    }
}

#[test]
fn decode_tolerates_unknown_fields() {
    let codec = JsonCodec;
    let frame = r#"{"id":1,"scope":"demo","source":"transporter","type":"get","handle":0,"path":[],"hops":3}"#;
    let message = codec.decode(frame).unwrap();
    assert_eq!(
        message.payload,
        Payload::Get {
            handle: 0,
            path: vec![]
        }
    );
}

#[test]
fn decode_rejects_missing_type() {
    let codec = JsonCodec;
    let frame = r#"{"id":1,"scope":"demo","source":"transporter"}"#;
    assert!(codec.decode(frame).is_err());
}
