//! Pub/sub relay layer
//!
//! Subscribing fans out one websocket connection per configured endpoint and
//! funnels deduplicated events into a single channel. Publishing connects to
//! one endpoint, sends the signed event and waits for the relay's
//! acknowledgement.

pub mod mock;
pub mod pool;
pub mod wire;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::{Event, UnsignedEvent};

pub use mock::{MockEventSource, MockPublisher};
pub use pool::{RelayPool, RelayPublisher};

/// An event together with the endpoint that delivered it
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    pub event: Event,
    pub endpoint: String,
}

/// Relay acknowledgement of a published event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    Succeeded,
    /// Relay rejected the event, with its reason
    Failed(String),
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("transport error on {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("malformed relay message: {0}")]
    Malformed(String),

    #[error("no relay endpoints configured")]
    NoEndpoints,

    #[error("connection to {0} closed before acknowledgement")]
    Closed(String),

    #[error("failed to sign event: {0}")]
    Signing(String),
}

/// Stream of subscribed events from the relay set. The receiver closes when
/// every endpoint connection has ended.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self) -> Result<mpsc::Receiver<IncomingEvent>, RelayError>;
}

/// Signs and publishes events to a single relay endpoint
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        endpoint: &str,
        event: UnsignedEvent,
    ) -> Result<PublishStatus, RelayError>;
}
