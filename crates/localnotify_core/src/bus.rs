//! Seam between the bridge and the host's native message bus.

use std::collections::HashMap;

use parking_lot::Mutex;
use std::sync::Arc;

/// Handler for an inbound native event; receives the raw JSON payload.
pub type InboundHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Host event bus that carries messages to and from native plugins.
pub trait NativeBus: Send + Sync {
    fn register_handler(&self, event: &str, handler: InboundHandler);
    fn send_event(&self, plugin: &str, event: &str, payload: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub plugin: String,
    pub event: String,
    pub payload: String,
}

impl OutboundMessage {
    pub fn payload_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.payload)
    }
}

/// Process-local bus that records outbound traffic and dispatches inbound
/// events synchronously to whichever handler is registered.
#[derive(Default)]
pub struct InMemoryBus {
    handlers: Mutex<HashMap<String, InboundHandler>>,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn take_sent(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent_count(&self, event: &str) -> usize {
        self.sent.lock().iter().filter(|msg| msg.event == event).count()
    }

    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.lock().contains_key(event)
    }

    /// Returns `false` when nothing listens for `event`.
    pub fn dispatch(&self, event: &str, payload: &str) -> bool {
        let handler = self.handlers.lock().get(event).cloned();
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => {
                tracing::debug!(event, "no handler registered for inbound event");
                false
            }
        }
    }
}

impl NativeBus for InMemoryBus {
    fn register_handler(&self, event: &str, handler: InboundHandler) {
        self.handlers.lock().insert(event.to_string(), handler);
    }

    fn send_event(&self, plugin: &str, event: &str, payload: &str) {
        self.sent.lock().push(OutboundMessage {
            plugin: plugin.to_string(),
            event: event.to_string(),
            payload: payload.to_string(),
        });
    }
}
