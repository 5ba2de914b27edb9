use crate::hub::{ChatMessage, Hub};
use crate::transport::message::{ClientMessage, RECEIVE_MESSAGE, ServerMessage};
use crate::transport::websocket::invoke;
use crate::utils::{HubError, InvocationError};

use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

#[test]
fn test_parse_send_message_invocation() {
    let msg = json!({
        "type": "invocation",
        "invocation_id": "7",
        "target": "SendMessage",
        "arguments": ["alice", "hi"]
    })
    .to_string();

    let parsed: ClientMessage = serde_json::from_str(&msg).unwrap();
    assert_eq!(
        parsed,
        ClientMessage::send_message(Some("7".to_string()), "alice", "hi")
    );
}

#[test]
fn test_invocation_id_is_optional() {
    let msg = json!({
        "type": "invocation",
        "target": "SendMessage",
        "arguments": ["alice", "hi"]
    })
    .to_string();

    let parsed: ClientMessage = serde_json::from_str(&msg).unwrap();
    let ClientMessage::Invocation { invocation_id, .. } = parsed;
    assert!(invocation_id.is_none());
}

#[test]
fn test_receive_message_frame_shape() {
    let frame = ServerMessage::from(&ChatMessage::new("alice", "hi"));
    let value = serde_json::to_value(&frame).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "invocation",
            "target": RECEIVE_MESSAGE,
            "arguments": ["alice", "hi"]
        })
    );
}

#[test]
fn test_successful_completion_omits_error() {
    let frame = ServerMessage::Completion {
        invocation_id: "1".to_string(),
        error: None,
    };
    let value = serde_json::to_value(&frame).unwrap();
    assert_eq!(value, json!({ "type": "completion", "invocation_id": "1" }));
}

#[test]
fn test_invoke_broadcasts_through_hub() {
    let hub = Hub::default();
    let (tx, mut rx) = mpsc::unbounded_channel::<ChatMessage>();
    let id = hub.on_connect(Arc::new(tx)).unwrap();

    invoke(&hub, id, "sendmessage", vec!["alice".into(), "hi".into()]).unwrap();

    assert_eq!(rx.try_recv().unwrap(), ChatMessage::new("alice", "hi"));
}

#[test]
fn test_invoke_rejects_unknown_method() {
    let hub = Hub::default();
    let (tx, mut rx) = mpsc::unbounded_channel::<ChatMessage>();
    let id = hub.on_connect(Arc::new(tx)).unwrap();

    let err = invoke(&hub, id, "JoinGroup", vec!["lobby".into()]).unwrap_err();
    assert_eq!(err, InvocationError::UnknownMethod("JoinGroup".to_string()));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_invoke_checks_argument_count() {
    let hub = Hub::default();
    let (tx, _rx) = mpsc::unbounded_channel::<ChatMessage>();
    let id = hub.on_connect(Arc::new(tx)).unwrap();

    let err = invoke(&hub, id, "SendMessage", vec!["alice".into()]).unwrap_err();
    assert!(matches!(
        err,
        InvocationError::ArgumentCount {
            expected: 2,
            got: 1,
            ..
        }
    ));
}

#[test]
fn test_invoke_surfaces_unknown_sender() {
    let hub = Hub::default();
    let (tx, _rx) = mpsc::unbounded_channel::<ChatMessage>();
    let id = hub.on_connect(Arc::new(tx)).unwrap();
    hub.on_disconnect(id);

    let err = invoke(&hub, id, "SendMessage", vec!["alice".into(), "hi".into()]).unwrap_err();
    assert_eq!(err, InvocationError::Hub(HubError::UnknownSender(id)));
}
