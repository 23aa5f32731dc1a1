use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("notification name must not be empty")]
    EmptyName,
    #[error("scheduled time for `{name}` is out of range")]
    InvalidSchedule { name: String },
    #[error("timestamp {utc} cannot be represented as a date")]
    InvalidTimestamp { utc: f64 },
    #[error("failed to encode outbound payload")]
    Encode(#[from] serde_json::Error),
    #[error("malformed `{event}` payload")]
    Decode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
