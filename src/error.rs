use thiserror::Error;

/// Everything that can halt or degrade a sensor session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("bluetooth adapter unavailable or not powered on")]
    AdapterUnavailable,

    #[error("service or characteristic discovery failed")]
    DiscoveryFailed,

    #[error("connection to the sensor failed")]
    ConnectionFailed,

    #[error("enabling heart rate notifications failed")]
    SubscriptionFailed,

    #[error("malformed heart rate frame ({len} bytes)")]
    DecodeError { len: usize },
}
