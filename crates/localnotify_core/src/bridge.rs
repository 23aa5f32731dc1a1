use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::{
    bus::NativeBus,
    config::BridgeConfig,
    error::{BridgeError, BridgeResult},
    notifications::{NotificationInfo, NotificationRequest, RawNotificationInfo},
    pending::PendingNotifications,
    tick::Scheduler,
};

/// Inbound event names registered with the host bus.
pub mod events {
    pub const LIST_RESULT: &str = "LocalNotifyList";
    pub const GET_RESULT: &str = "LocalNotifyGet";
    pub const NOTIFY: &str = "LocalNotify";
}

pub type ListCallback = Box<dyn FnOnce(&[NotificationInfo]) + Send>;
pub type GetCallback = Box<dyn FnOnce(&NotificationInfo) + Send>;
pub type NotifyHandler = Arc<dyn Fn(&NotificationInfo) + Send + Sync>;

/// Requests understood by the native plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginRequest {
    Ready,
    List,
    Get,
    Add,
    Remove,
    Clear,
}

impl PluginRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::List => "List",
            Self::Get => "Get",
            Self::Add => "Add",
            Self::Remove => "Remove",
            Self::Clear => "Clear",
        }
    }
}

#[derive(Deserialize)]
struct ListResultPayload {
    list: Vec<Value>,
}

#[derive(Deserialize)]
struct InfoPayload {
    info: RawNotificationInfo,
}

struct RoutingState {
    list_callbacks: VecDeque<ListCallback>,
    /// Set while a list result is being delivered; `list` calls made from
    /// inside a callback join that delivery instead of sending a request.
    draining_list: bool,
    get_callbacks: HashMap<String, VecDeque<GetCallback>>,
    notify_handler: Option<NotifyHandler>,
    pending: PendingNotifications,
}

impl RoutingState {
    fn new(config: &BridgeConfig) -> Self {
        Self {
            list_callbacks: VecDeque::new(),
            draining_list: false,
            get_callbacks: HashMap::new(),
            notify_handler: None,
            pending: PendingNotifications::new(config.pending_capacity, config.overflow),
        }
    }
}

/// Façade over the native local-notification plugin.
///
/// Outbound calls are fire-and-forget messages on the host bus; replies come
/// back as inbound events and resolve whichever callbacks are queued at that
/// moment. Replies are not correlated with individual requests.
///
/// The routing lock is never held while consumer code runs, so callbacks and
/// handlers may call back into the bridge.
#[derive(Clone)]
pub struct LocalNotify {
    state: Arc<Mutex<RoutingState>>,
    bus: Arc<dyn NativeBus>,
    scheduler: Arc<dyn Scheduler>,
    config: Arc<BridgeConfig>,
}

impl LocalNotify {
    /// Registers the inbound handlers and tells the plugin the bridge is ready.
    pub fn init(
        bus: Arc<dyn NativeBus>,
        scheduler: Arc<dyn Scheduler>,
        config: BridgeConfig,
    ) -> Self {
        let state = Arc::new(Mutex::new(RoutingState::new(&config)));
        let bridge = Self {
            state,
            bus,
            scheduler,
            config: Arc::new(config),
        };

        bridge.register(events::LIST_RESULT, handle_list_result);
        bridge.register(events::GET_RESULT, handle_get_result);
        bridge.register(events::NOTIFY, handle_notify);

        bridge.send(PluginRequest::Ready, "{}");
        bridge
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Requests the full notification list. Calls made before the reply
    /// arrives share one native round trip.
    #[instrument(skip(self, callback))]
    pub fn list<F>(&self, callback: F)
    where
        F: FnOnce(&[NotificationInfo]) + Send + 'static,
    {
        let first = {
            let mut state = self.state.lock();
            let first = state.list_callbacks.is_empty() && !state.draining_list;
            state.list_callbacks.push_back(Box::new(callback));
            first
        };
        if first {
            self.send(PluginRequest::List, "{}");
        } else {
            debug!("list request already in flight, queueing callback");
        }
    }

    #[instrument(skip(self, callback))]
    pub fn get<F>(&self, name: &str, callback: F) -> BridgeResult<()>
    where
        F: FnOnce(&NotificationInfo) + Send + 'static,
    {
        ensure_name(name)?;
        let payload = serde_json::to_string(&json!({ "name": name }))?;
        self.state
            .lock()
            .get_callbacks
            .entry(name.to_string())
            .or_default()
            .push_back(Box::new(callback));
        self.send(PluginRequest::Get, &payload);
        Ok(())
    }

    /// Stamps `options.utc` with the absolute fire time and schedules it.
    #[instrument(skip(self, options), fields(name = %options.name))]
    pub fn add(&self, options: &mut NotificationRequest) -> BridgeResult<()> {
        for key in options.strip_reserved_fields() {
            warn!(%key, "dropping pass-through field that shadows a scheduling field");
        }
        let utc = options.resolve_utc(Utc::now())?;
        options.utc = Some(utc);
        let payload = serde_json::to_string(options)?;
        self.send(PluginRequest::Add, &payload);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn remove(&self, name: &str) -> BridgeResult<()> {
        ensure_name(name)?;
        let payload = serde_json::to_string(&json!({ "name": name }))?;
        self.send(PluginRequest::Remove, &payload);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn clear(&self) {
        self.send(PluginRequest::Clear, "{}");
    }

    /// Installs `handler` and delivers anything buffered on the next tick.
    #[instrument(skip(self, handler))]
    pub fn set_notify_handler<F>(&self, handler: F)
    where
        F: Fn(&NotificationInfo) + Send + Sync + 'static,
    {
        self.state.lock().notify_handler = Some(Arc::new(handler));
        let state = Arc::downgrade(&self.state);
        self.scheduler.post(Box::new(move || {
            if let Some(state) = state.upgrade() {
                deliver_pending(&state);
            }
        }));
    }

    #[instrument(skip(self))]
    pub fn clear_notify_handler(&self) {
        self.state.lock().notify_handler = None;
    }

    pub fn notify_handler(&self) -> Option<NotifyHandler> {
        self.state.lock().notify_handler.clone()
    }

    pub fn pending_notifications(&self) -> Vec<NotificationInfo> {
        self.state.lock().pending.snapshot()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn dropped_notifications(&self) -> u64 {
        self.state.lock().pending.dropped()
    }

    pub fn pending_list_callbacks(&self) -> usize {
        self.state.lock().list_callbacks.len()
    }

    pub fn pending_get_callbacks(&self, name: &str) -> usize {
        self.state
            .lock()
            .get_callbacks
            .get(name)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

impl LocalNotify {
    fn register(&self, event: &'static str, handle: fn(&Mutex<RoutingState>, &str)) {
        let state: Weak<Mutex<RoutingState>> = Arc::downgrade(&self.state);
        self.bus.register_handler(
            event,
            Arc::new(move |payload: &str| match state.upgrade() {
                Some(state) => handle(&state, payload),
                None => debug!(event, "bridge dropped, ignoring inbound event"),
            }),
        );
    }

    fn send(&self, request: PluginRequest, payload: &str) {
        debug!(
            plugin = %self.config.plugin_name,
            event = request.as_str(),
            "sending plugin event"
        );
        self.bus
            .send_event(&self.config.plugin_name, request.as_str(), payload);
    }
}

fn ensure_name(name: &str) -> BridgeResult<()> {
    if name.is_empty() {
        return Err(BridgeError::EmptyName);
    }
    Ok(())
}

fn decode<T: for<'de> Deserialize<'de>>(event: &'static str, payload: &str) -> BridgeResult<T> {
    serde_json::from_str(payload).map_err(|source| BridgeError::Decode { event, source })
}

fn decode_info(event: &'static str, payload: &str) -> Option<NotificationInfo> {
    match decode::<InfoPayload>(event, payload).and_then(|payload| payload.info.into_info()) {
        Ok(info) => Some(info),
        Err(err) => {
            warn!(%err, event, "dropping malformed inbound event");
            None
        }
    }
}

fn handle_list_result(state: &Mutex<RoutingState>, payload: &str) {
    let raw = match decode::<ListResultPayload>(events::LIST_RESULT, payload) {
        Ok(payload) => payload.list,
        Err(err) => {
            warn!(%err, "dropping malformed list result");
            return;
        }
    };
    let list: Vec<NotificationInfo> = raw
        .into_iter()
        .filter_map(|value| {
            serde_json::from_value::<RawNotificationInfo>(value)
                .map_err(|source| BridgeError::Decode {
                    event: events::LIST_RESULT,
                    source,
                })
                .and_then(RawNotificationInfo::into_info)
                .map_err(|err| warn!(%err, "skipping malformed list entry"))
                .ok()
        })
        .collect();

    // Pop one callback at a time so callbacks queued while delivering
    // receive this same list.
    state.lock().draining_list = true;
    let mut delivered = 0usize;
    loop {
        let next = state.lock().list_callbacks.pop_front();
        let Some(callback) = next else {
            break;
        };
        callback(&list);
        delivered += 1;
    }
    state.lock().draining_list = false;
    debug!(entries = list.len(), callbacks = delivered, "resolved list callbacks");
}

fn handle_get_result(state: &Mutex<RoutingState>, payload: &str) {
    let Some(info) = decode_info(events::GET_RESULT, payload) else {
        return;
    };
    if !state.lock().get_callbacks.contains_key(&info.name) {
        debug!(name = %info.name, "no pending get for notification");
        return;
    }
    // The queue stays registered until empty, so a `get` for the same name
    // made from inside a callback is resolved by this result too.
    loop {
        let next = {
            let mut guard = state.lock();
            let next = guard
                .get_callbacks
                .get_mut(&info.name)
                .and_then(VecDeque::pop_front);
            if next.is_none() {
                guard.get_callbacks.remove(&info.name);
            }
            next
        };
        let Some(callback) = next else {
            break;
        };
        callback(&info);
    }
}

fn handle_notify(state: &Mutex<RoutingState>, payload: &str) {
    let Some(info) = decode_info(events::NOTIFY, payload) else {
        return;
    };
    let handler = {
        let mut guard = state.lock();
        match guard.notify_handler.clone() {
            Some(handler) => handler,
            None => {
                info!(name = %info.name, "pending event");
                guard.pending.push(info);
                return;
            }
        }
    };
    info!(name = %info.name, "delivering event");
    handler(&info);
}

/// Flushes the buffer to whichever handler is active when the tick runs.
/// Nothing is flushed if the handler was cleared in the meantime.
fn deliver_pending(state: &Mutex<RoutingState>) -> usize {
    let (handler, pending) = {
        let mut guard = state.lock();
        let Some(handler) = guard.notify_handler.clone() else {
            return 0;
        };
        (handler, guard.pending.drain())
    };
    if !pending.is_empty() {
        info!(count = pending.len(), "delivering pending events");
    }
    for info in &pending {
        handler(info);
    }
    pending.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::tick::TaskQueue;

    fn bridge() -> (LocalNotify, Arc<InMemoryBus>, Arc<TaskQueue>) {
        let bus = Arc::new(InMemoryBus::new());
        let queue = Arc::new(TaskQueue::new());
        let bridge = LocalNotify::init(bus.clone(), queue.clone(), BridgeConfig::default());
        (bridge, bus, queue)
    }

    #[test]
    fn init_registers_handlers_and_signals_ready() {
        let (_bridge, bus, _queue) = bridge();
        assert!(bus.has_handler(events::LIST_RESULT));
        assert!(bus.has_handler(events::GET_RESULT));
        assert!(bus.has_handler(events::NOTIFY));

        let sent = bus.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].plugin, "LocalNotifyPlugin");
        assert_eq!(sent[0].event, "Ready");
        assert_eq!(sent[0].payload, "{}");
    }

    #[test]
    fn get_rejects_empty_name_without_sending() {
        let (bridge, bus, _queue) = bridge();
        bus.take_sent();
        assert!(matches!(bridge.get("", |_| {}), Err(BridgeError::EmptyName)));
        assert!(matches!(bridge.remove(""), Err(BridgeError::EmptyName)));
        assert!(bus.sent().is_empty());
        assert_eq!(bridge.pending_get_callbacks(""), 0);
    }

    #[test]
    fn get_result_for_unknown_name_is_dropped() {
        let (bridge, bus, _queue) = bridge();
        bridge.get("known", |_| panic!("wrong name routed")).unwrap();
        bus.dispatch(events::GET_RESULT, r#"{"info":{"name":"other","utc":1}}"#);
        assert_eq!(bridge.pending_get_callbacks("known"), 1);
    }

    #[test]
    fn malformed_list_result_keeps_callbacks_pending() {
        let (bridge, bus, _queue) = bridge();
        bridge.list(|_| panic!("must not run on malformed payload"));
        bus.dispatch(events::LIST_RESULT, r#"{"items":[]}"#);
        bus.dispatch(events::LIST_RESULT, "not json");
        assert_eq!(bridge.pending_list_callbacks(), 1);
    }

    #[test]
    fn dropped_bridge_ignores_inbound_events() {
        let (bridge, bus, _queue) = bridge();
        drop(bridge);
        assert!(bus.dispatch(events::NOTIFY, r#"{"info":{"name":"late","utc":1}}"#));
    }
}
