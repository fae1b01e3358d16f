//! Routing over nested trees built from one specification.

use av_controls::routing;
use av_controls::types::{ControlType, Envelope, Spec};
use av_controls::{ControlError, Receiver, Sender};
use serde_json::{json, Value};

fn nested_spec() -> Spec {
    Spec::from_value(json!({
        "type": "group",
        "name": "root",
        "controlSpecs": {
            "a": {"type": "fader", "name": "a", "initialValue": 0, "min": 0, "max": 1},
            "outer": {
                "type": "group",
                "name": "outer",
                "controlSpecs": {
                    "a": {"type": "knob", "name": "inner a", "initialValue": 0, "min": -1, "max": 1},
                    "modal": {
                        "type": "modal",
                        "name": "more",
                        "controlSpecs": {
                            "sel": {"type": "selector", "name": "s", "options": ["x", "y", "z"]}
                        }
                    }
                }
            },
            "tabs": {
                "type": "tabs",
                "name": "tabs",
                "pages": {
                    "one": {"a": {"type": "switch", "name": "one a"}},
                    "two": {
                        "a": {"type": "textbox", "name": "two a"},
                        "stick": {"type": "joystick", "name": "j"}
                    }
                }
            }
        }
    }))
    .unwrap()
}

/// A signal each leaf type accepts.
fn probe(control_type: ControlType) -> Value {
    match control_type {
        ControlType::Fader | ControlType::Knob => json!({"value": 0.25}),
        ControlType::Switch => json!({"on": true}),
        ControlType::Selector => json!({"index": 2}),
        ControlType::Textbox => json!({"text": "hello"}),
        ControlType::Joystick => json!({"x": 0.5, "y": -0.5}),
        other => panic!("no probe for {}", other),
    }
}

#[test]
fn test_every_leaf_routes_in_both_trees() {
    let spec = nested_spec();
    let receiver = Receiver::from_spec(&spec).unwrap();
    let sender = Sender::from_spec(&spec).unwrap();

    let receiver_paths = routing::leaf_paths(&receiver);
    let sender_paths = routing::leaf_paths(&sender);
    assert_eq!(receiver_paths, sender_paths);
    assert_eq!(receiver_paths.len(), 6);

    for path in &receiver_paths {
        let r = receiver.route(path).unwrap();
        let s = sender.route(path).unwrap();
        assert_eq!(r.control_type(), s.control_type(), "at [{}]", path);
    }
}

#[test]
fn test_wrapped_signal_reaches_only_its_leaf() {
    let spec = nested_spec();
    let mut receiver = Receiver::from_spec(&spec).unwrap();

    for path in routing::leaf_paths(&receiver) {
        let before: Vec<Option<Value>> = routing::leaf_paths(&receiver)
            .iter()
            .map(|p| receiver.route(p).unwrap().current_value())
            .collect();

        let payload = probe(receiver.route(&path).unwrap().control_type());
        let signal = Envelope::wrap_path(&path, payload);
        let update = receiver.handle_signal(&signal).unwrap().unwrap();

        let (update_path, _) = update.unwrap_path();
        assert_eq!(update_path, path);

        let after: Vec<Option<Value>> = routing::leaf_paths(&receiver)
            .iter()
            .map(|p| receiver.route(p).unwrap().current_value())
            .collect();
        let changed: Vec<usize> = before
            .iter()
            .zip(&after)
            .enumerate()
            .filter(|(_, (b, a))| b != a)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(changed.len(), 1, "signal to [{}] changed {:?}", path, changed);
    }
}

#[test]
fn test_partial_and_unknown_paths_fail() {
    let receiver = Receiver::from_spec(&nested_spec()).unwrap();
    for path in [
        vec!["tabs", "one"],
        vec!["tabs", "three", "a"],
        vec!["outer", "b"],
        vec!["a", "deeper"],
    ] {
        let err = receiver.route(&path.as_slice().into()).err().unwrap();
        assert!(matches!(err, ControlError::ControlNotFound(_)));
    }
}

#[test]
fn test_unknown_control_type_is_rejected() {
    let err = Receiver::from_value(json!({
        "type": "group",
        "name": "root",
        "controlSpecs": {"x": {"type": "theremin", "name": "x"}}
    }))
    .err()
    .unwrap();
    assert!(matches!(err, ControlError::UnknownControlType(_)));
}
