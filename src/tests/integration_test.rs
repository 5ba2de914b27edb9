use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::client::{ClientEvent, HubConnectionBuilder};
use crate::config::Settings;
use crate::hub::{ConnectionState, Hub};
use crate::transport::WebSocketServer;

async fn next_event(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

async fn wait_for_open(hub: &Hub, count: usize) {
    for _ in 0..200 {
        let connections = hub.connections();
        if connections.len() == count
            && connections.iter().all(|c| c.state == ConnectionState::Open)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} open connections");
}

fn received(user: &str, message: &str) -> ClientEvent {
    ClientEvent::ReceiveMessage {
        user: user.to_string(),
        message: message.to_string(),
    }
}

#[tokio::test]
async fn integration_chat_end_to_end() {
    let mut settings = Settings::default();
    settings.server.port = 0;
    let hub = Arc::new(Hub::new(&settings.hub));
    let server = WebSocketServer::bind(&settings).await.unwrap();
    let url = format!("ws://{}/chathub", server.local_addr().unwrap());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(server.run_until(hub.clone(), async move {
        let _ = stop_rx.await;
    }));

    let (alice, mut alice_events) = HubConnectionBuilder::new(&url).start().await.unwrap();
    let (bob, mut bob_events) = HubConnectionBuilder::new(&url).start().await.unwrap();
    wait_for_open(&hub, 2).await;

    alice.send_message("alice", "hi").await.unwrap();
    assert_eq!(next_event(&mut alice_events).await, received("alice", "hi"));
    assert_eq!(next_event(&mut bob_events).await, received("alice", "hi"));

    bob.stop().await;
    assert_eq!(
        next_event(&mut bob_events).await,
        ClientEvent::Closed { error: None }
    );
    wait_for_open(&hub, 1).await;

    alice.send_message("alice", "bye").await.unwrap();
    assert_eq!(next_event(&mut alice_events).await, received("alice", "bye"));
    assert!(bob_events.try_recv().is_err());

    // both sides are tracked by display name on the hub
    let names: Vec<_> = hub
        .connections()
        .into_iter()
        .filter_map(|c| c.user_name)
        .collect();
    assert_eq!(names, vec!["alice".to_string()]);

    alice.stop().await;
    let _ = stop_tx.send(());
    server_task.await.unwrap();
}
