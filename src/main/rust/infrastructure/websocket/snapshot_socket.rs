use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    ClientMessage, ServerMessage, SnapshotSocket, SnapshotSocketConnector, SocketEvent,
};
use crate::domain::value_objects::{BackendConfig, CameraId};

/// Push-mode snapshot socket over tokio-tungstenite
#[derive(Debug, Clone)]
pub struct TungsteniteSnapshotConnector {
    config: BackendConfig,
}

impl TungsteniteSnapshotConnector {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }
}

/// Normal and going-away closes are expected; everything else is abnormal
fn classify_close(frame: Option<&CloseFrame<'_>>) -> (bool, String) {
    match frame {
        None => (false, "closed without a close frame".to_string()),
        Some(frame) => {
            let abnormal = !matches!(frame.code, CloseCode::Normal | CloseCode::Away);
            let reason = format!("{} {}", u16::from(frame.code), frame.reason);
            (abnormal, reason.trim().to_string())
        }
    }
}

fn parse_text(text: String) -> SocketEvent {
    match serde_json::from_str::<ServerMessage>(&text) {
        Ok(message) => SocketEvent::Message(message),
        Err(_) => SocketEvent::Malformed(text),
    }
}

#[async_trait]
impl SnapshotSocketConnector for TungsteniteSnapshotConnector {
    async fn open(&self, camera_id: CameraId) -> Result<SnapshotSocket> {
        let url = self.config.ws_url(&format!("/webrtc/snapshot/{}", camera_id));
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| DomainError::TransportState(format!("snapshot socket {}: {}", url, e)))?;
        tracing::debug!(%camera_id, url = %url, "Snapshot socket connected");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Unserialisable snapshot message: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            // Owner dropped the sender: close politely
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => parse_text(text),
                    Ok(Message::Close(frame)) => {
                        let (abnormal, reason) = classify_close(frame.as_ref());
                        let _ = inbound_tx.send(SocketEvent::Closed { abnormal, reason });
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_tx.send(SocketEvent::Closed {
                            abnormal: true,
                            reason: e.to_string(),
                        });
                        return;
                    }
                };
                if inbound_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = inbound_tx.send(SocketEvent::Closed {
                abnormal: true,
                reason: "connection dropped".to_string(),
            });
        });

        Ok(SnapshotSocket {
            outbound: outbound_tx,
            inbound: inbound_rx,
            reader,
        })
    }
}
