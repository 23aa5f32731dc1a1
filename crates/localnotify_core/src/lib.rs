pub mod bridge;
pub mod bus;
pub mod config;
pub mod error;
pub mod notifications;
mod pending;
pub mod tick;

pub use crate::bridge::{events, LocalNotify, NotifyHandler, PluginRequest};
pub use crate::bus::{InMemoryBus, NativeBus, OutboundMessage};
pub use crate::config::{BridgeConfig, OverflowPolicy};
pub use crate::error::{BridgeError, BridgeResult};
pub use crate::notifications::{Delay, NotificationInfo, NotificationRequest};
pub use crate::tick::{Scheduler, TaskQueue};
