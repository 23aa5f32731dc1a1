use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use localnotify_core::{events, OutboundMessage};
use serde_json::{json, Map, Value};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub event: &'static str,
    pub payload: String,
}

impl InboundEvent {
    fn new(event: &'static str, payload: Value) -> Self {
        Self {
            event,
            payload: payload.to_string(),
        }
    }
}

/// In-process stand-in for the native notification plugin.
#[derive(Debug, Default)]
pub struct SimulatedPlugin {
    ready: bool,
    scheduled: BTreeMap<String, Map<String, Value>>,
}

impl SimulatedPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn scheduled_names(&self) -> Vec<String> {
        self.scheduled.keys().cloned().collect()
    }

    pub fn handle(&mut self, message: &OutboundMessage) -> Result<Vec<InboundEvent>> {
        let payload = message
            .payload_json()
            .with_context(|| format!("invalid `{}` payload", message.event))?;
        debug!(event = %message.event, "plugin received request");
        let replies = match message.event.as_str() {
            "Ready" => {
                self.ready = true;
                Vec::new()
            }
            "List" => {
                let list: Vec<Value> = self
                    .scheduled
                    .values()
                    .cloned()
                    .map(Value::Object)
                    .collect();
                vec![InboundEvent::new(events::LIST_RESULT, json!({ "list": list }))]
            }
            "Get" => {
                let name = payload_name(&payload)?;
                let info = self
                    .scheduled
                    .get(name)
                    .cloned()
                    .map(Value::Object)
                    .unwrap_or_else(|| json!({ "name": name, "utc": 0 }));
                vec![InboundEvent::new(events::GET_RESULT, json!({ "info": info }))]
            }
            "Add" => {
                let Value::Object(mut entry) = payload else {
                    bail!("`Add` payload must be an object");
                };
                let name = entry
                    .get("name")
                    .and_then(Value::as_str)
                    .context("`Add` payload is missing `name`")?
                    .to_string();
                entry.remove("delay");
                entry.remove("date");
                self.scheduled.insert(name, entry);
                Vec::new()
            }
            "Remove" => {
                let name = payload_name(&payload)?;
                self.scheduled.remove(name);
                Vec::new()
            }
            "Clear" => {
                self.scheduled.clear();
                Vec::new()
            }
            other => bail!("unsupported plugin request `{other}`"),
        };
        Ok(replies)
    }

    /// Fires and unschedules every notification due at or before `now`.
    pub fn advance_to(&mut self, now: DateTime<Utc>) -> Vec<InboundEvent> {
        let now_secs = now.timestamp_millis() as f64 / 1000.0;
        let due: Vec<String> = self
            .scheduled
            .iter()
            .filter(|(_, entry)| {
                entry
                    .get("utc")
                    .and_then(Value::as_f64)
                    .is_some_and(|utc| utc <= now_secs)
            })
            .map(|(name, _)| name.clone())
            .collect();

        due.into_iter()
            .filter_map(|name| self.scheduled.remove(&name))
            .map(|entry| InboundEvent::new(events::NOTIFY, json!({ "info": entry })))
            .collect()
    }
}

fn payload_name(payload: &Value) -> Result<&str> {
    payload
        .get("name")
        .and_then(Value::as_str)
        .context("payload is missing `name`")
}
