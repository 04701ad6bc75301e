//! Reminder message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::behavior::model::UserType;
use crate::gateway::ChannelKind;
use crate::rules::model::ReminderRule;

/// Delivery status of a reminder.
///
/// `Pending → Sent` on success, `Pending → Pending` on a retryable
/// failure (counter incremented, rescheduled), `Pending → Failed` once
/// the retry budget is exhausted. `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Failed,
}

impl ReminderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One instance of a rule firing for a user.
///
/// Created by the scheduler, mutated only by the dispatch sweep, never
/// deleted — terminal messages are kept as history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderMessage {
    pub id: Uuid,
    pub user_id: String,
    pub user_type: UserType,
    pub rule_id: String,
    pub message: String,
    pub channels: Vec<ChannelKind>,
    pub status: ReminderStatus,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

impl ReminderMessage {
    /// New pending message for a fired rule.
    pub fn new(
        user_id: impl Into<String>,
        user_type: UserType,
        rule: &ReminderRule,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            user_type,
            rule_id: rule.id.clone(),
            message: rule.message.clone(),
            channels: rule.channels.clone(),
            status: ReminderStatus::Pending,
            scheduled_at,
            sent_at: None,
            retry_count: 0,
        }
    }
}

/// Outcome counts of one dispatch sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Items that were due and attempted this sweep.
    pub attempted: usize,
    /// Items delivered (or handled) successfully.
    pub succeeded: usize,
    /// Items kept pending with an incremented retry counter.
    pub retried: usize,
    /// Items that exhausted the retry budget and became terminal.
    pub failed: usize,
}
