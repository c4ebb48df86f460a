//! WebSocket transport
//!
//! Controllers with a network bridge (ESP32 GRBL boards, FluidNC) expose the
//! serial stream over a WebSocket: command lines go out as text frames and
//! real-time bytes as one-byte binary frames.

use super::link::{Connector, LinkEvent, Outbound};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use plotkit_core::ConnectionError;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Accepts `ws://`/`wss://` URLs and bare `host:port` addresses
pub fn normalize_address(address: &str) -> Result<Url, ConnectionError> {
    let address = address.trim();
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("ws://{}", address)
    };

    let url = Url::parse(&candidate).map_err(|_| ConnectionError::InvalidAddress {
        address: address.to_string(),
    })?;

    match url.scheme() {
        "ws" | "wss" if url.host().is_some() => Ok(url),
        _ => Err(ConnectionError::InvalidAddress {
            address: address.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn run(
        &self,
        address: String,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) {
        let url = match normalize_address(&address) {
            Ok(url) => url,
            Err(e) => {
                let _ = events.send(LinkEvent::Failed(e.to_string()));
                let _ = events.send(LinkEvent::Closed);
                return;
            }
        };

        let stream = match connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                let error = ConnectionError::FailedToOpen {
                    address: address.clone(),
                    reason: e.to_string(),
                };
                let _ = events.send(LinkEvent::Failed(error.to_string()));
                let _ = events.send(LinkEvent::Closed);
                return;
            }
        };

        tracing::debug!("WebSocket connected to {}", url);
        let _ = events.send(LinkEvent::Opened);
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                command = outbound.recv() => {
                    let message = match command {
                        Some(Outbound::Line(line)) => Message::Text(format!("{}\n", line)),
                        Some(Outbound::Realtime(byte)) => Message::Binary(vec![byte]),
                        None => {
                            let _ = write.close().await;
                            break;
                        }
                    };
                    if let Err(e) = write.send(message).await {
                        let error = ConnectionError::WebSocketError { reason: e.to_string() };
                        let _ = events.send(LinkEvent::Failed(error.to_string()));
                        break;
                    }
                }
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let _ = events.send(LinkEvent::Frame(text));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let text = String::from_utf8_lossy(&data).into_owned();
                        let _ = events.send(LinkEvent::Frame(text));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let error = ConnectionError::ConnectionLost { reason: e.to_string() };
                        let _ = events.send(LinkEvent::Failed(error.to_string()));
                        break;
                    }
                }
            }
        }

        tracing::debug!("WebSocket to {} closed", url);
        let _ = events.send(LinkEvent::Closed);
    }
}
