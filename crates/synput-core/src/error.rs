use thiserror::Error;

/// Caller-visible failures. Everything else is absorbed into a [`crate::pump::DeliveryReport`].
#[derive(Debug, Error)]
pub enum InputError {
    #[error("invalid target handle {0:#x}")]
    InvalidTarget(u64),
    #[error("backend unavailable: {0}")]
    Backend(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failure to hand one native event to the backend. Recorded, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("target {0:#x} no longer exists")]
    TargetGone(u64),
    #[error("event queue rejected the event")]
    QueueRejected,
    #[error("event not supported by this backend: {0}")]
    Unsupported(&'static str),
    #[error("platform call failed: {0}")]
    Platform(String),
}
