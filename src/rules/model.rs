//! Rule catalog types.

use serde::{Deserialize, Serialize};

use crate::gateway::ChannelKind;

/// Condition a rule evaluates. A closed set — there is no expression
/// language. A name outside the catalog deserializes to [`Unknown`],
/// which never fires, so a typo in an imported rule silently disables
/// it instead of erroring.
///
/// [`Unknown`]: RuleCondition::Unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleCondition {
    /// No booking recorded, or the last one is at least 7 days old.
    #[serde(rename = "no_booking_7days")]
    NoBooking7Days,
    /// A lesson note exists that the user hasn't viewed since attending.
    #[serde(rename = "no_note_view")]
    NoNoteView,
    /// Monthly class hours below the configured threshold.
    #[serde(rename = "low_hours")]
    LowHours,
    /// A scheduled class starts within the pre-class window.
    /// Needs an external schedule source; evaluates false without one.
    #[serde(rename = "before_class")]
    BeforeClass,
    /// A class ended without confirmed attendance. Same schedule-source
    /// caveat as `BeforeClass`.
    #[serde(rename = "no_attendance")]
    NoAttendance,
    /// Catch-all for condition names not in the catalog.
    #[serde(other, rename = "unknown")]
    Unknown,
}

/// When a fired rule's reminder should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderTiming {
    /// Deliver on the next sweep, triggered eagerly at schedule time.
    Immediate,
    /// Deliver 24 hours after the rule fires.
    Daily,
    /// Deliver 7 days after the rule fires.
    Weekly,
    /// Deliver 30 days after the rule fires.
    Monthly,
}

/// Informational priority — does not affect evaluation or dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePriority {
    Low,
    Medium,
    High,
}

/// A named condition-to-message mapping, managed by administrators and
/// read-only to the engine at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRule {
    pub id: String,
    pub name: String,
    pub condition: RuleCondition,
    /// Message body delivered to the user when the rule fires.
    pub message: String,
    /// Non-empty set of delivery channels.
    pub channels: Vec<ChannelKind>,
    pub timing: ReminderTiming,
    pub enabled: bool,
    pub priority: RulePriority,
}

impl ReminderRule {
    /// The stock rule set the portal ships with.
    pub fn default_catalog() -> Vec<ReminderRule> {
        vec![
            ReminderRule {
                id: "no_booking_7days".into(),
                name: "Booking reminder".into(),
                condition: RuleCondition::NoBooking7Days,
                message: "It's been a while since your last booking. Ready for your next class?"
                    .into(),
                channels: vec![ChannelKind::Line, ChannelKind::Email],
                timing: ReminderTiming::Daily,
                enabled: true,
                priority: RulePriority::Medium,
            },
            ReminderRule {
                id: "no_note_view".into(),
                name: "Note review reminder".into(),
                condition: RuleCondition::NoNoteView,
                message: "Your latest lesson note is ready. Take a look before the next class."
                    .into(),
                channels: vec![ChannelKind::Line],
                timing: ReminderTiming::Daily,
                enabled: true,
                priority: RulePriority::Low,
            },
            ReminderRule {
                id: "low_hours".into(),
                name: "Monthly hours check".into(),
                condition: RuleCondition::LowHours,
                message: "You're below your usual class hours this month. Want to book more sessions?"
                    .into(),
                channels: vec![ChannelKind::Email],
                timing: ReminderTiming::Weekly,
                enabled: true,
                priority: RulePriority::Medium,
            },
            ReminderRule {
                id: "before_class".into(),
                name: "Class starting soon".into(),
                condition: RuleCondition::BeforeClass,
                message: "Your class starts in 10 minutes.".into(),
                channels: vec![ChannelKind::Push, ChannelKind::Line],
                timing: ReminderTiming::Immediate,
                enabled: true,
                priority: RulePriority::High,
            },
            ReminderRule {
                id: "no_attendance".into(),
                name: "Attendance not confirmed".into(),
                condition: RuleCondition::NoAttendance,
                message: "We couldn't confirm your attendance for today's class.".into(),
                channels: vec![ChannelKind::Line],
                timing: ReminderTiming::Immediate,
                enabled: true,
                priority: RulePriority::High,
            },
        ]
    }
}
