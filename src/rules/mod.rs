//! Declarative reminder rules and their evaluation.

pub mod engine;
pub mod model;

pub use engine::{RuleEngine, ScheduleSource};
pub use model::{ReminderRule, ReminderTiming, RuleCondition, RulePriority};
