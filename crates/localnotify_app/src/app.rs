use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use localnotify_core::{
    BridgeConfig, Delay, InMemoryBus, LocalNotify, NotificationRequest, TaskQueue,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::plugin::SimulatedPlugin;

const DEMO_NOTIFICATION: &str = "demo-reminder";
const MAX_PUMP_ROUNDS: usize = 64;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) bridge: BridgeConfig,
    pub(crate) demo_delay_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            bridge: BridgeConfig::from_env(),
            ..Self::default()
        };
        if let Ok(delay) = std::env::var("LOCAL_NOTIFY_DEMO_DELAY_SECS") {
            if let Ok(value) = delay.trim().parse::<u64>() {
                config.demo_delay_secs = value;
            }
        }
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            demo_delay_secs: 90,
        }
    }
}

/// What the demo observed on the consumer side of the bridge.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub listed: Vec<String>,
    pub fetched: Option<String>,
    pub fired: Vec<String>,
    pub remaining: Vec<String>,
}

/// Owns the single bridge instance plus the host pieces it talks to.
struct Runtime {
    bus: Arc<InMemoryBus>,
    queue: Arc<TaskQueue>,
    plugin: SimulatedPlugin,
    bridge: LocalNotify,
}

impl Runtime {
    fn new(config: BridgeConfig) -> Self {
        let bus = Arc::new(InMemoryBus::new());
        let queue = Arc::new(TaskQueue::new());
        let bridge = LocalNotify::init(bus.clone(), queue.clone(), config);
        Self {
            bus,
            queue,
            plugin: SimulatedPlugin::new(),
            bridge,
        }
    }

    /// Shuttles traffic between bridge and plugin and runs scheduled ticks
    /// until both sides are quiet.
    fn pump(&mut self) -> Result<()> {
        for _ in 0..MAX_PUMP_ROUNDS {
            let outbound = self.bus.take_sent();
            if outbound.is_empty() && self.queue.is_empty() {
                return Ok(());
            }
            for message in &outbound {
                let replies = self
                    .plugin
                    .handle(message)
                    .with_context(|| format!("plugin rejected `{}`", message.event))?;
                for reply in replies {
                    if !self.bus.dispatch(reply.event, &reply.payload) {
                        warn!(event = reply.event, "reply had no listener");
                    }
                }
            }
            let ran = self.queue.run_pending();
            debug!(messages = outbound.len(), tasks = ran, "pump round");
        }
        bail!("bridge did not settle after {MAX_PUMP_ROUNDS} rounds")
    }

    fn advance_to(&mut self, now: DateTime<Utc>) -> Result<()> {
        for event in self.plugin.advance_to(now) {
            self.bus.dispatch(event.event, &event.payload);
        }
        self.pump()
    }
}

pub fn run(config: AppConfig) -> Result<RunSummary> {
    let mut runtime = Runtime::new(config.bridge.clone());
    runtime.pump()?;
    anyhow::ensure!(runtime.plugin.is_ready(), "plugin never saw the ready signal");

    let summary = Arc::new(Mutex::new(RunSummary::default()));
    let bridge = runtime.bridge.clone();

    let now = Utc::now();
    let mut request = NotificationRequest::new(DEMO_NOTIFICATION)
        .at(now)
        .after(Delay::seconds(config.demo_delay_secs as f64))
        .with_field("text", "Time to stretch");
    bridge.add(&mut request)?;
    let fire_at = request
        .utc
        .and_then(|utc| DateTime::from_timestamp_millis((utc * 1000.0).round() as i64))
        .context("scheduled time was not stamped")?;
    info!(name = DEMO_NOTIFICATION, %fire_at, "scheduled notification");

    let sink = summary.clone();
    bridge.list(move |list| {
        info!(count = list.len(), "scheduled notifications");
        sink.lock()
            .listed
            .extend(list.iter().map(|info| info.name.clone()));
    });
    let sink = summary.clone();
    bridge.get(DEMO_NOTIFICATION, move |info| {
        info!(name = %info.name, date = %info.date, "fetched notification");
        sink.lock().fetched = Some(info.name.clone());
    })?;
    runtime.pump()?;

    // Fires before any handler exists, so the bridge buffers it.
    runtime.advance_to(fire_at + Duration::seconds(1))?;
    info!(
        pending = bridge.pending_count(),
        "notifications waiting for a handler"
    );

    let sink = summary.clone();
    bridge.set_notify_handler(move |info| {
        info!(name = %info.name, date = %info.date, "notification fired");
        sink.lock().fired.push(info.name.clone());
    });
    runtime.pump()?;

    bridge.remove(DEMO_NOTIFICATION)?;
    bridge.clear();
    runtime.pump()?;
    bridge.clear_notify_handler();

    let mut summary = summary.lock().clone();
    summary.remaining = runtime.plugin.scheduled_names();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_run_delivers_buffered_notification() {
        let summary = run(AppConfig::default()).expect("demo run");
        assert_eq!(summary.listed, vec![DEMO_NOTIFICATION.to_string()]);
        assert_eq!(summary.fetched.as_deref(), Some(DEMO_NOTIFICATION));
        assert_eq!(summary.fired, vec![DEMO_NOTIFICATION.to_string()]);
        assert!(summary.remaining.is_empty());
    }

    #[test]
    fn zero_delay_still_fires() {
        let config = AppConfig {
            demo_delay_secs: 0,
            ..AppConfig::default()
        };
        let summary = run(config).expect("demo run");
        assert_eq!(summary.fired.len(), 1);
    }
}
