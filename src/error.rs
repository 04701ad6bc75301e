//! Error types for the notification engine.
//!
//! Nothing here is fatal to the process: delivery and handler failures
//! drive the retry/backoff lifecycle, cache failures surface to the
//! caller, and malformed snapshots are rejected without touching state.

use std::time::Duration;

use crate::events::model::EventType;
use crate::gateway::ChannelKind;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

/// Key-value cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Backend failure: {0}")]
    Backend(String),

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Invalid key pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Channel delivery errors. Recoverable — they drive the dispatch
/// queue's retry transition and only become terminal once the retry
/// budget is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Channel {channel} rejected send for user {user_id}: {reason}")]
    ChannelFailed {
        channel: ChannelKind,
        user_id: String,
        reason: String,
    },

    #[error("Channel {channel} send timed out after {timeout:?}")]
    Timeout {
        channel: ChannelKind,
        timeout: Duration,
    },
}

/// Integration event handler errors. Same retry lifecycle as delivery
/// errors, on the event bus side.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Handler for {event_type} event failed: {reason}")]
    HandlerFailed {
        event_type: EventType,
        reason: String,
    },

    #[error("Handler for {event_type} event timed out after {timeout:?}")]
    Timeout {
        event_type: EventType,
        timeout: Duration,
    },

    #[error("Malformed {event_type} event payload: {reason}")]
    MalformedPayload {
        event_type: EventType,
        reason: String,
    },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
