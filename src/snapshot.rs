//! Serialized engine snapshot for export/import.

use serde::{Deserialize, Serialize};

use crate::behavior::model::UserBehavior;
use crate::reminders::model::ReminderMessage;
use crate::rules::model::ReminderRule;

/// Full engine state as a single JSON document:
/// `{ behaviors: [[userId, UserBehavior], ...], reminderRules: [...],
/// reminderQueue: [...] }`. The event queue is not part of the
/// snapshot — events are externally raised and short-lived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub behaviors: Vec<(String, UserBehavior)>,
    pub reminder_rules: Vec<ReminderRule>,
    pub reminder_queue: Vec<ReminderMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::model::UserType;
    use crate::reminders::model::ReminderMessage;
    use chrono::{TimeZone, Utc};

    #[test]
    fn snapshot_shape_matches_wire_format() {
        let now = Utc.with_ymd_and_hms(2024, 4, 15, 12, 0, 0).unwrap();
        let rules = ReminderRule::default_catalog();
        let snapshot = EngineSnapshot {
            behaviors: vec![(
                "u1".to_string(),
                UserBehavior::new("u1", UserType::Student, now),
            )],
            reminder_queue: vec![ReminderMessage::new("u1", UserType::Student, &rules[0], now)],
            reminder_rules: rules,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["behaviors"].is_array());
        assert!(json["reminderRules"].is_array());
        assert!(json["reminderQueue"].is_array());
        // Behavior entries are [userId, record] pairs.
        assert_eq!(json["behaviors"][0][0], "u1");
        assert_eq!(json["behaviors"][0][1]["userId"], "u1");
    }

    #[test]
    fn snapshot_roundtrips() {
        let now = Utc.with_ymd_and_hms(2024, 4, 15, 12, 0, 0).unwrap();
        let snapshot = EngineSnapshot {
            behaviors: vec![(
                "u1".to_string(),
                UserBehavior::new("u1", UserType::Teacher, now),
            )],
            reminder_rules: ReminderRule::default_catalog(),
            reminder_queue: vec![],
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: EngineSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.behaviors, snapshot.behaviors);
        assert_eq!(parsed.reminder_rules, snapshot.reminder_rules);
    }

    #[test]
    fn malformed_snapshot_fails_to_parse() {
        assert!(serde_json::from_str::<EngineSnapshot>("{not json").is_err());
        // Well-formed JSON with the wrong shape also fails.
        assert!(serde_json::from_str::<EngineSnapshot>("{\"behaviors\": 42}").is_err());
    }
}
