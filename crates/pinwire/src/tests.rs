use serde_json::json;

use crate::*;

// ============================================================================
//  WIRE TYPES
// ============================================================================

#[test]
fn test_wire_type_encoding() {
    assert_eq!(serde_json::to_value(WireType::Flow).unwrap(), json!("flow"));
    assert_eq!(serde_json::to_value(WireType::Any).unwrap(), json!("any"));
    assert_eq!(serde_json::to_value(WireType::AnyOrFlow).unwrap(), json!("any_or_flow"));
    assert_eq!(serde_json::to_value(WireType::data("i64")).unwrap(), json!({"data": "i64"}));
    assert_eq!(serde_json::to_value(WireType::Wildcard(3)).unwrap(), json!({"wildcard": 3}));
}

#[test]
fn test_wire_type_decoding() {
    let ty: WireType = serde_json::from_value(json!({"data": "vec3"})).unwrap();
    assert_eq!(ty, WireType::data("vec3"));

    let ty: WireType = serde_json::from_value(json!({"wildcard": 2})).unwrap();
    assert_eq!(ty, WireType::Wildcard(2));

    let ty: WireType = serde_json::from_value(json!("wildcard")).unwrap();
    assert_eq!(ty, WireType::Wildcard(0));

    let ty: WireType = serde_json::from_value(json!("any_or_flow")).unwrap();
    assert_eq!(ty, WireType::AnyOrFlow);
}

#[test]
fn test_wire_type_rejects_malformed() {
    assert!(serde_json::from_value::<WireType>(json!("data")).is_err());
    assert!(serde_json::from_value::<WireType>(json!({"data": 5})).is_err());
    assert!(serde_json::from_value::<WireType>(json!({"data": "i64", "wildcard": 1})).is_err());
    assert!(serde_json::from_value::<WireType>(json!(42)).is_err());
}

#[test]
fn test_pin_spec_omits_absent_fields() {
    let pin = PinSpec::flow();
    assert_eq!(serde_json::to_value(&pin).unwrap(), json!({"label": "", "type": "flow"}));

    let pin = PinSpec::data("a", "i64", PinContainer::Array).with_default(Some(json!([1])));
    assert_eq!(
        serde_json::to_value(&pin).unwrap(),
        json!({"label": "a", "type": {"data": "i64"}, "container": "array", "default": [1]})
    );
}

#[test]
fn test_pin_counts_split_flow_and_data() {
    let spec = NodeSpec {
        name: "add".into(),
        label: "Add".into(),
        description: None,
        inputs: vec![
            PinSpec::flow(),
            PinSpec::data("a", "i64", PinContainer::Single),
            PinSpec::data("b", "i64", PinContainer::Single),
        ],
        outputs: vec![PinSpec::flow(), PinSpec::data("out", "i64", PinContainer::Single)],
    };

    assert_eq!(spec.input_counts(), PinCounts { flow: 1, data: 2 });
    assert_eq!(spec.output_counts(), PinCounts { flow: 1, data: 1 });
}

// ============================================================================
//  INBOUND FRAMES
// ============================================================================

#[test]
fn test_decode_discovery() {
    let msg = IncomingMessage::decode(br#"{"id": 1, "discovery": {}}"#).unwrap();
    assert_eq!(msg.id, 1);
    assert_eq!(msg.node, None);
    assert_eq!(msg.command, Command::Discovery);
}

#[test]
fn test_decode_init() {
    let frame = json!({
        "id": 2,
        "node": 7,
        "init": {
            "node_id": "n7",
            "node_type": "math/add",
            "exec_inputs": [{"label": "", "exec_id": 1}],
            "exec_outputs": [{"label": "", "exec_id": 2}],
            "data_inputs": [{"label": "a", "type": "i64"}, {"label": "b", "type": "i64", "data": 4}],
            "data_outputs": [{"label": "out", "type": "i64"}]
        }
    });
    let msg = IncomingMessage::decode(frame.to_string().as_bytes()).unwrap();

    let Command::Init(init) = msg.command else {
        panic!("expected init, got {:?}", msg.command);
    };
    assert_eq!(msg.node, Some(7));
    assert_eq!(init.node_type, "math/add");
    assert_eq!(init.data_inputs.len(), 2);
    assert_eq!(init.data_inputs[1].data, Some(json!(4)));
}

#[test]
fn test_decode_rejects_missing_command() {
    let err = IncomingMessage::decode(br#"{"id": 1}"#).unwrap_err();
    assert!(matches!(err, Error::MissingCommand));
}

#[test]
fn test_decode_rejects_unknown_command() {
    let err = IncomingMessage::decode(br#"{"id": 1, "shutdown": {}}"#).unwrap_err();
    match err {
        Error::UnsupportedCommand(keys) => assert_eq!(keys, vec!["shutdown".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_decode_rejects_ambiguous_command() {
    let frame = br#"{"id": 1, "discovery": {}, "exec": {"exec_id": 1, "time": 0, "inputs": []}}"#;
    let err = IncomingMessage::decode(frame).unwrap_err();
    match err {
        Error::AmbiguousCommand(keys) => assert_eq!(keys, vec!["discovery", "exec"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_decode_rejects_malformed_json() {
    let err = IncomingMessage::decode(b"{not json").unwrap_err();
    assert!(matches!(err, Error::Json(_)));
}

#[test]
fn test_incoming_roundtrip_preserves_variant() {
    let msg = IncomingMessage::new(
        9,
        Some(3),
        Command::Exec(ExecCommand { exec_id: 4, time: 12, inputs: vec![json!(2), json!("x")] }),
    );
    let bytes = msg.encode().unwrap();
    assert_eq!(IncomingMessage::decode(&bytes).unwrap(), msg);
}

#[test]
fn test_serde_deserialize_applies_cardinality_rule() {
    let res: std::result::Result<IncomingMessage, _> =
        serde_json::from_value(json!({"id": 1, "discovery": {}, "init": null, "exec": null}));
    assert!(res.is_ok());

    let res: std::result::Result<IncomingMessage, _> = serde_json::from_value(json!({"id": 1}));
    assert!(res.is_err());
}

// ============================================================================
//  OUTBOUND FRAMES
// ============================================================================

#[test]
fn test_encode_exec_ok() {
    let msg = OutgoingMessage::new(
        3,
        Some(7),
        Reply::ExecOk(ExecReply { exec_id: 1, outputs: vec![json!(5)] }),
    );
    let value: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
    assert_eq!(value, json!({"id": 3, "node": 7, "exec_ok": {"exec_id": 1, "outputs": [5]}}));
}

#[test]
fn test_encode_init_ok_and_debug() {
    let msg = OutgoingMessage::new(2, None, Reply::InitOk);
    let value: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
    assert_eq!(value, json!({"id": 2, "init_ok": {}}));

    let msg = OutgoingMessage::debug(Some(4), "hello");
    let value: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
    assert_eq!(value, json!({"id": 0, "node": 4, "debug_message": "hello"}));
}

#[test]
fn test_outgoing_roundtrip_preserves_discovery() {
    let discovery = Discovery {
        options: DiscoveryOptions { init_timeout: 2.0, exec_timeout: 5.0 },
        types: vec![TypeSpec {
            name: "vec2".into(),
            description: None,
            fields: vec![("x".into(), "f64".into()), ("y".into(), "f64".into())],
        }],
        nodes: vec![NodeSpec {
            name: "ns/split".into(),
            label: "Split".into(),
            description: Some("splits".into()),
            inputs: vec![PinSpec::flow(), PinSpec::data("a", "i64", PinContainer::Single)],
            outputs: vec![
                PinSpec::flow(),
                PinSpec::data("out1", "i64", PinContainer::Single),
                PinSpec::data("out2", "i64", PinContainer::Single),
            ],
        }],
    };
    let msg = OutgoingMessage::new(1, None, Reply::DiscoveryOk(discovery));
    let decoded = OutgoingMessage::decode(&msg.encode().unwrap()).unwrap();
    assert_eq!(decoded, msg);
}

#[test]
fn test_outgoing_rejects_two_replies() {
    let err = OutgoingMessage::decode(br#"{"id": 1, "error": "x", "debug_message": "y"}"#).unwrap_err();
    assert!(matches!(err, Error::AmbiguousCommand(_)));

    let err = OutgoingMessage::decode(br#"{"id": 1}"#).unwrap_err();
    assert!(matches!(err, Error::MissingCommand));
}

#[test]
fn test_decode_header_survives_bad_body() {
    let frame = br#"{"id": 12, "node": 3, "exec": {"inputs": "nope"}}"#;
    assert!(IncomingMessage::decode(frame).is_err());
    assert_eq!(decode_header(frame), Some((12, Some(3))));
    assert_eq!(decode_header(b"garbage"), None);
}
