//! Reminder messages: deduplicated scheduling and retryable dispatch.

pub mod model;
pub mod queue;

pub use model::{ReminderMessage, ReminderStatus, SweepReport};
pub use queue::ReminderQueue;
