//! Rule evaluation — pure predicates over a behavior snapshot.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::behavior::model::UserBehavior;
use crate::config::EngineConfig;
use crate::rules::model::{ReminderRule, RuleCondition};

/// External lookup for the two schedule-coupled predicates. The engine
/// cannot resolve class times from behavior alone; without a wired
/// source those predicates evaluate false.
pub trait ScheduleSource: Send + Sync {
    /// Start time of the user's next scheduled class, if any.
    fn upcoming_class_start(&self, user_id: &str) -> Option<DateTime<Utc>>;

    /// End time of the most recent class whose attendance has not been
    /// confirmed, if any.
    fn unconfirmed_class_end(&self, user_id: &str) -> Option<DateTime<Utc>>;
}

/// Evaluates the rule catalog against a behavior snapshot.
///
/// Predicates are pure functions of `(behavior, now)` (plus the optional
/// schedule source): deterministic, side-effect free, independently
/// testable.
pub struct RuleEngine {
    schedule: Option<Arc<dyn ScheduleSource>>,
    low_hours_threshold: f64,
    pre_class_window: Duration,
}

impl RuleEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            schedule: None,
            low_hours_threshold: config.low_hours_threshold,
            pre_class_window: Duration::from_std(config.pre_class_window)
                .unwrap_or_else(|_| Duration::minutes(10)),
        }
    }

    /// Wire a schedule source for the before-class and no-attendance rules.
    pub fn with_schedule_source(mut self, source: Arc<dyn ScheduleSource>) -> Self {
        self.schedule = Some(source);
        self
    }

    /// Return the enabled rules whose condition holds for `behavior` at `now`.
    pub fn evaluate<'a>(
        &self,
        rules: &'a [ReminderRule],
        behavior: &UserBehavior,
        now: DateTime<Utc>,
    ) -> Vec<&'a ReminderRule> {
        let satisfied: Vec<&ReminderRule> = rules
            .iter()
            .filter(|rule| rule.enabled && self.satisfied(rule.condition, behavior, now))
            .collect();

        if !satisfied.is_empty() {
            debug!(
                user_id = %behavior.user_id,
                rules = ?satisfied.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
                "Rules satisfied"
            );
        }
        satisfied
    }

    fn satisfied(&self, condition: RuleCondition, behavior: &UserBehavior, now: DateTime<Utc>) -> bool {
        match condition {
            RuleCondition::NoBooking7Days => behavior
                .days_since_last_booking(now)
                .is_none_or(|days| days >= 7),

            RuleCondition::NoNoteView => matches!(
                (behavior.last_attendance_date, behavior.last_note_view_date),
                (Some(attended), Some(viewed)) if viewed < attended
            ),

            RuleCondition::LowHours => behavior.monthly_class_hours < self.low_hours_threshold,

            RuleCondition::BeforeClass => self
                .schedule
                .as_ref()
                .and_then(|s| s.upcoming_class_start(&behavior.user_id))
                .is_some_and(|start| now <= start && start - now <= self.pre_class_window),

            RuleCondition::NoAttendance => self
                .schedule
                .as_ref()
                .and_then(|s| s.unconfirmed_class_end(&behavior.user_id))
                .is_some_and(|end| end <= now),

            RuleCondition::Unknown => false,
        }
    }
}
