//! Shared helpers for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use dashboard_sync::{ConnectionState, FeedClient, FeedSettings};

pub const WAIT: Duration = Duration::from_secs(5);

/// Local feed server accepting one connection at a time.
pub struct TestServer {
    pub url: String,
    /// JSON messages received from the client.
    pub incoming: mpsc::UnboundedReceiver<Value>,
    /// Frames to push to the connected client.
    pub outgoing: mpsc::UnboundedSender<Message>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (incoming_tx, incoming) = mpsc::unbounded_channel();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let (mut write, mut read) = ws.split();

                loop {
                    tokio::select! {
                        frame = read.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                                let _ = incoming_tx.send(value);
                            }
                            Some(Ok(_)) => {}
                            Some(Err(_)) | None => break,
                        },
                        Some(frame) = outgoing_rx.recv() => {
                            let closing = matches!(frame, Message::Close(_));
                            let _ = write.send(frame).await;
                            if closing {
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self {
            url: format!("ws://{addr}/ws"),
            incoming,
            outgoing,
        }
    }

    pub async fn recv(&mut self) -> Value {
        timeout(WAIT, self.incoming.recv())
            .await
            .expect("timed out waiting for client message")
            .expect("server stopped")
    }

    pub fn push(&self, event: &Value) {
        self.outgoing
            .send(Message::Text(event.to_string().into()))
            .unwrap();
    }
}

pub fn settings(url: &str) -> FeedSettings {
    let mut settings = FeedSettings::new(url);
    settings.reconnect_delay_initial = Duration::from_millis(10);
    settings.reconnect_delay_max = Duration::from_millis(50);
    settings
}

pub async fn wait_connected(client: &FeedClient) {
    let mut states = client.state_changes();
    timeout(WAIT, states.wait_for(ConnectionState::is_open))
        .await
        .expect("timed out waiting for connection")
        .unwrap();
}

pub fn subscribe(topic: &str) -> Value {
    json!({"action": "subscribe", "topic": topic})
}

pub fn unsubscribe(topic: &str) -> Value {
    json!({"action": "unsubscribe", "topic": topic})
}
