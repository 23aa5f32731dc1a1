use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, BridgeResult};

const SECONDS_PER_MINUTE: f64 = 60.0;
const SECONDS_PER_HOUR: f64 = 60.0 * 60.0;
const SECONDS_PER_DAY: f64 = 60.0 * 60.0 * 24.0;

/// Keys the bridge owns on the `Add` payload; `extra` must not shadow them.
pub const RESERVED_FIELDS: [&str; 4] = ["name", "date", "delay", "utc"];

/// Relative offset applied on top of the base date when scheduling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delay {
    pub seconds: f64,
    pub minutes: f64,
    pub hours: f64,
    pub days: f64,
}

impl Delay {
    pub fn seconds(seconds: f64) -> Self {
        Self {
            seconds,
            ..Self::default()
        }
    }

    pub fn minutes(minutes: f64) -> Self {
        Self {
            minutes,
            ..Self::default()
        }
    }

    pub fn hours(hours: f64) -> Self {
        Self {
            hours,
            ..Self::default()
        }
    }

    pub fn days(days: f64) -> Self {
        Self {
            days,
            ..Self::default()
        }
    }

    pub fn and_seconds(mut self, seconds: f64) -> Self {
        self.seconds += seconds;
        self
    }

    pub fn and_minutes(mut self, minutes: f64) -> Self {
        self.minutes += minutes;
        self
    }

    pub fn total_seconds(&self) -> f64 {
        self.seconds
            + self.minutes * SECONDS_PER_MINUTE
            + self.hours * SECONDS_PER_HOUR
            + self.days * SECONDS_PER_DAY
    }
}

/// Options handed to the native plugin when scheduling a notification.
///
/// Fields the bridge does not interpret (title, text, sound, ...) live in
/// `extra` and are forwarded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn after(mut self, delay: Delay) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Removes pass-through entries that collide with the typed fields and
    /// returns their keys.
    pub fn strip_reserved_fields(&mut self) -> Vec<String> {
        let mut stripped = Vec::new();
        for key in RESERVED_FIELDS {
            if self.extra.remove(key).is_some() {
                stripped.push(key.to_string());
            }
        }
        stripped
    }

    /// Absolute fire time in epoch seconds: base date plus the summed delay.
    pub fn resolve_utc(&self, now: DateTime<Utc>) -> BridgeResult<f64> {
        let base = self.date.unwrap_or(now);
        let mut time = base.timestamp_millis() as f64 / 1000.0;
        if let Some(delay) = &self.delay {
            time += delay.total_seconds();
        }
        if !time.is_finite() {
            return Err(BridgeError::InvalidSchedule {
                name: self.name.clone(),
            });
        }
        Ok(time)
    }
}

/// A notification as reported by the native plugin, with its `date` derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationInfo {
    pub name: String,
    pub utc: f64,
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationInfo {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// Wire shape of a native record before the bridge augments it.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawNotificationInfo {
    #[serde(default)]
    pub name: String,
    pub utc: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawNotificationInfo {
    pub(crate) fn into_info(self) -> BridgeResult<NotificationInfo> {
        let date = utc_seconds_to_date(self.utc)?;
        let mut extra = self.extra;
        extra.remove("date");
        Ok(NotificationInfo {
            name: self.name,
            utc: self.utc,
            date,
            extra,
        })
    }
}

pub fn utc_seconds_to_date(utc: f64) -> BridgeResult<DateTime<Utc>> {
    let millis = utc * 1000.0;
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return Err(BridgeError::InvalidTimestamp { utc });
    }
    DateTime::from_timestamp_millis(millis.round() as i64)
        .ok_or(BridgeError::InvalidTimestamp { utc })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn delay_sums_every_component() {
        let delay = Delay {
            seconds: 1.0,
            minutes: 1.0,
            hours: 1.0,
            days: 1.0,
        };
        assert_eq!(delay.total_seconds(), 1.0 + 60.0 + 3600.0 + 86400.0);
    }

    #[test]
    fn resolve_utc_adds_delay_to_base_date() {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let request = NotificationRequest::new("reminder")
            .at(base)
            .after(Delay::minutes(2.0).and_seconds(30.0));
        assert_eq!(request.resolve_utc(Utc::now()).unwrap(), 1_700_000_150.0);
    }

    #[test]
    fn delay_builders_accumulate() {
        let delay = Delay::days(1.0).and_minutes(30.0).and_minutes(15.0);
        assert_eq!(delay.total_seconds(), 86400.0 + 45.0 * 60.0);
    }

    #[test]
    fn strip_reserved_fields_keeps_payload_fields() {
        let mut request = NotificationRequest::new("x")
            .with_field("utc", 5)
            .with_field("name", "y")
            .with_field("text", "kept");
        let mut stripped = request.strip_reserved_fields();
        stripped.sort();
        assert_eq!(stripped, ["name", "utc"]);
        assert_eq!(request.name, "x");
        assert_eq!(request.extra.len(), 1);
        assert!(request.strip_reserved_fields().is_empty());
    }

    #[test]
    fn resolve_utc_defaults_to_now() {
        let now = Utc.timestamp_opt(1_600_000_000, 500_000_000).unwrap();
        let request = NotificationRequest::new("now");
        assert_eq!(request.resolve_utc(now).unwrap(), 1_600_000_000.5);
    }

    #[test]
    fn request_serializes_extra_fields_flat() {
        let request = NotificationRequest::new("water")
            .with_field("text", "Drink water")
            .with_field("number", 3);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["name"], "water");
        assert_eq!(value["text"], "Drink water");
        assert_eq!(value["number"], 3);
        assert!(value.get("utc").is_none());
    }

    #[test]
    fn raw_info_gains_date_from_utc() {
        let raw: RawNotificationInfo =
            serde_json::from_str(r#"{"name":"a","utc":1700000000,"text":"hi"}"#).unwrap();
        let info = raw.into_info().unwrap();
        assert_eq!(info.date.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(info.field("text").and_then(Value::as_str), Some("hi"));
    }

    #[test]
    fn non_finite_timestamp_is_rejected() {
        assert!(matches!(
            utc_seconds_to_date(f64::INFINITY),
            Err(BridgeError::InvalidTimestamp { .. })
        ));
    }
}
