//! Mock relay implementations for tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::event::UnsignedEvent;
use crate::relay::{EventSource, IncomingEvent, PublishStatus, Publisher, RelayError};

/// [`EventSource`] that delivers a scripted list of events once, then closes
pub struct MockEventSource {
    pub subscribe_should_fail: AtomicBool,
    events: Mutex<Vec<IncomingEvent>>,
}

impl MockEventSource {
    pub fn new(events: Vec<IncomingEvent>) -> Self {
        Self {
            subscribe_should_fail: AtomicBool::new(false),
            events: Mutex::new(events),
        }
    }

    pub fn failing() -> Self {
        let mock = Self::new(Vec::new());
        mock.subscribe_should_fail.store(true, Ordering::SeqCst);
        mock
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn subscribe(&self) -> Result<mpsc::Receiver<IncomingEvent>, RelayError> {
        if self.subscribe_should_fail.load(Ordering::SeqCst) {
            return Err(RelayError::NoEndpoints);
        }
        let events = match self.events.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        };
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.send(event).await;
        }
        Ok(rx)
    }
}

/// [`Publisher`] that records what it was asked to publish
pub struct MockPublisher {
    pub should_fail: AtomicBool,
    pub reject: AtomicBool,
    published: Mutex<Vec<(String, UnsignedEvent)>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            should_fail: AtomicBool::new(false),
            reject: AtomicBool::new(false),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Mock whose publishes fail with a transport error
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.should_fail.store(true, Ordering::SeqCst);
        mock
    }

    /// Mock whose publishes are acknowledged but rejected
    pub fn rejecting() -> Self {
        let mock = Self::new();
        mock.reject.store(true, Ordering::SeqCst);
        mock
    }

    /// Everything published so far, as (endpoint, event) pairs
    pub fn published(&self) -> Vec<(String, UnsignedEvent)> {
        match self.published.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(
        &self,
        endpoint: &str,
        event: UnsignedEvent,
    ) -> Result<PublishStatus, RelayError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(RelayError::Transport {
                endpoint: endpoint.to_string(),
                reason: "mock transport failure".into(),
            });
        }
        if let Ok(mut guard) = self.published.lock() {
            guard.push((endpoint.to_string(), event));
        }
        if self.reject.load(Ordering::SeqCst) {
            return Ok(PublishStatus::Failed("mock rejection".into()));
        }
        Ok(PublishStatus::Succeeded)
    }
}
