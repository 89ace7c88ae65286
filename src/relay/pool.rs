//! Websocket relay pool
//!
//! One background task per endpoint. Each task opens a websocket, sends a
//! REQ frame, forwards matching events through a shared channel and ends
//! when its connection drops. Events seen from more than one endpoint are
//! delivered once, attributed to the first endpoint that relayed them.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::event::UnsignedEvent;
use crate::keys::Keys;
use crate::relay::wire::{self, RelayMessage};
use crate::relay::{EventSource, IncomingEvent, PublishStatus, Publisher, RelayError};

const SUBSCRIPTION_ID: &str = "ingest";
const CHANNEL_CAPACITY: usize = 64;

/// Fan-in subscription over a set of relay endpoints
pub struct RelayPool {
    endpoints: Vec<String>,
    topic: String,
    backlog_limit: u32,
}

impl RelayPool {
    pub fn new(endpoints: Vec<String>, topic: &str, backlog_limit: u32) -> Self {
        Self {
            endpoints,
            topic: topic.to_string(),
            backlog_limit,
        }
    }

    async fn run_endpoint(
        endpoint: String,
        topic: String,
        backlog_limit: u32,
        seen: Arc<Mutex<HashSet<String>>>,
        tx: mpsc::Sender<IncomingEvent>,
    ) -> Result<(), RelayError> {
        let (stream, _) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| RelayError::Connect {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        let (mut sink, mut source) = stream.split();

        let req = wire::req(SUBSCRIPTION_ID, &topic, backlog_limit)?;
        sink.send(Message::Text(req))
            .await
            .map_err(|e| RelayError::Transport {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        info!(endpoint = %endpoint, topic = %topic, "subscribed");

        while let Some(frame) = source.next().await {
            let frame = frame.map_err(|e| RelayError::Transport {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
            let text = match frame {
                Message::Text(text) => text,
                Message::Ping(payload) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                    continue;
                }
                Message::Close(_) => break,
                _ => continue,
            };

            match wire::parse(&text) {
                Ok(RelayMessage::Event { event, .. }) => {
                    let fresh = seen.lock().await.insert(event.id.clone());
                    if !fresh {
                        debug!(endpoint = %endpoint, id = %event.id, "duplicate event");
                        continue;
                    }
                    let incoming = IncomingEvent {
                        event,
                        endpoint: endpoint.clone(),
                    };
                    if tx.send(incoming).await.is_err() {
                        // consumer went away, unsubscribe and stop reading
                        if let Ok(frame) = wire::close(SUBSCRIPTION_ID) {
                            let _ = sink.send(Message::Text(frame)).await;
                        }
                        break;
                    }
                }
                Ok(RelayMessage::Notice { message }) => {
                    warn!(endpoint = %endpoint, message = %message, "relay notice");
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(endpoint = %endpoint, error = %e, "unparseable frame");
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventSource for RelayPool {
    async fn subscribe(&self) -> Result<mpsc::Receiver<IncomingEvent>, RelayError> {
        if self.endpoints.is_empty() {
            return Err(RelayError::NoEndpoints);
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let seen = Arc::new(Mutex::new(HashSet::new()));

        for endpoint in &self.endpoints {
            let endpoint = endpoint.clone();
            let topic = self.topic.clone();
            let backlog_limit = self.backlog_limit;
            let seen = Arc::clone(&seen);
            let tx = tx.clone();
            tokio::spawn(async move {
                let result =
                    Self::run_endpoint(endpoint.clone(), topic, backlog_limit, seen, tx).await;
                match result {
                    Ok(()) => info!(endpoint = %endpoint, "relay connection ended"),
                    Err(e) => warn!(endpoint = %endpoint, error = %e, "relay connection failed"),
                }
            });
        }

        // rx closes once every endpoint task has dropped its sender
        Ok(rx)
    }
}

/// Signs events and publishes them to a single relay, waiting for the
/// relay's OK acknowledgement.
pub struct RelayPublisher {
    keys: Keys,
}

impl RelayPublisher {
    pub fn new(keys: Keys) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl Publisher for RelayPublisher {
    async fn publish(
        &self,
        endpoint: &str,
        event: UnsignedEvent,
    ) -> Result<PublishStatus, RelayError> {
        let signed = self
            .keys
            .sign(event)
            .map_err(|e| RelayError::Signing(e.to_string()))?;
        let event_id = signed.id.clone();
        let frame = wire::publish(&signed)?;

        let (stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| RelayError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        let (mut sink, mut source) = stream.split();

        sink.send(Message::Text(frame))
            .await
            .map_err(|e| RelayError::Transport {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        while let Some(frame) = source.next().await {
            let frame = frame.map_err(|e| RelayError::Transport {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
            let text = match frame {
                Message::Text(text) => text,
                Message::Ping(payload) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                    continue;
                }
                Message::Close(_) => break,
                _ => continue,
            };

            if let Ok(RelayMessage::Ok {
                event_id: acked_id,
                accepted,
                message,
            }) = wire::parse(&text)
            {
                if acked_id != event_id {
                    continue;
                }
                let _ = sink.send(Message::Close(None)).await;
                return if accepted {
                    info!(endpoint = %endpoint, id = %event_id, "event accepted");
                    Ok(PublishStatus::Succeeded)
                } else {
                    warn!(endpoint = %endpoint, id = %event_id, reason = %message, "event rejected");
                    Ok(PublishStatus::Failed(message))
                };
            }
        }

        Err(RelayError::Closed(endpoint.to_string()))
    }
}
