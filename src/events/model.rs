//! Integration event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of externally-raised occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Booking,
    Payment,
    Attendance,
    Notification,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Booking => "booking",
            Self::Payment => "payment",
            Self::Attendance => "attendance",
            Self::Notification => "notification",
        };
        write!(f, "{s}")
    }
}

/// Processing status of an integration event.
///
/// `Pending → Processing → Completed` on success;
/// `Processing → Pending` with a due time when retries remain;
/// `Processing → Failed` once the budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One externally-raised occurrence queued for processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Producer identifier (API route, webhook, ...).
    pub source: String,
    /// Opaque payload, interpreted only by the matching handler.
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub status: EventStatus,
    pub retry_count: u32,
    /// When a retried event becomes due again. Absent until the first
    /// failure; a future sweep discovers the event by this field rather
    /// than by a timer.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl IntegrationEvent {
    /// New pending event.
    pub fn new(
        event_type: EventType,
        source: impl Into<String>,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            source: source.into(),
            data,
            timestamp: now,
            status: EventStatus::Pending,
            retry_count: 0,
            next_attempt_at: None,
        }
    }

    /// Pending and past its due time (or never retried).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Pending && self.next_attempt_at.is_none_or(|at| at <= now)
    }
}
