//! Behavior record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of portal account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Student,
    Teacher,
    Admin,
}

/// Derived booking cadence. Never set directly — recomputed from
/// `last_booking_date` on every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingPattern {
    /// Booked within the last 7 days (inclusive).
    Regular,
    /// Booked within the last 30 days (inclusive).
    Irregular,
    /// No booking in over 30 days, or never booked.
    Inactive,
}

/// One behavior record per user.
///
/// Serialized in camelCase because the record round-trips through the
/// portal's snapshot format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBehavior {
    pub user_id: String,
    pub user_type: UserType,
    pub last_booking_date: Option<DateTime<Utc>>,
    pub last_attendance_date: Option<DateTime<Utc>>,
    pub last_note_view_date: Option<DateTime<Utc>>,
    pub last_homework_submission: Option<DateTime<Utc>>,
    pub total_class_hours: f64,
    /// Capped at the configured monthly maximum on every write.
    pub monthly_class_hours: f64,
    pub booking_pattern: BookingPattern,
    /// 0..1.
    pub attendance_rate: f64,
    pub note_view_frequency: f64,
    /// 0..1.
    pub homework_completion_rate: f64,
    /// Refreshed to the call time on every update.
    pub last_activity_date: DateTime<Utc>,
}

impl UserBehavior {
    /// Zero-valued record, created lazily on a user's first update.
    pub fn new(user_id: impl Into<String>, user_type: UserType, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            user_type,
            last_booking_date: None,
            last_attendance_date: None,
            last_note_view_date: None,
            last_homework_submission: None,
            total_class_hours: 0.0,
            monthly_class_hours: 0.0,
            booking_pattern: BookingPattern::Inactive,
            attendance_rate: 0.0,
            note_view_frequency: 0.0,
            homework_completion_rate: 0.0,
            last_activity_date: now,
        }
    }

    /// Whole days elapsed since the last booking, if any.
    pub fn days_since_last_booking(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_booking_date
            .map(|d| now.signed_duration_since(d).num_days())
    }

    /// Merge a partial update onto this record. Present fields override,
    /// absent fields are left alone.
    pub(crate) fn apply(&mut self, update: &BehaviorUpdate) {
        if let Some(d) = update.last_booking_date {
            self.last_booking_date = Some(d);
        }
        if let Some(d) = update.last_attendance_date {
            self.last_attendance_date = Some(d);
        }
        if let Some(d) = update.last_note_view_date {
            self.last_note_view_date = Some(d);
        }
        if let Some(d) = update.last_homework_submission {
            self.last_homework_submission = Some(d);
        }
        if let Some(h) = update.total_class_hours {
            self.total_class_hours = h;
        }
        if let Some(h) = update.monthly_class_hours {
            self.monthly_class_hours = h;
        }
        if let Some(r) = update.attendance_rate {
            self.attendance_rate = r;
        }
        if let Some(f) = update.note_view_frequency {
            self.note_view_frequency = f;
        }
        if let Some(r) = update.homework_completion_rate {
            self.homework_completion_rate = r;
        }
    }

    /// Recompute derived fields after a merge. Boundaries are inclusive:
    /// 7 days since booking is still Regular, 30 still Irregular.
    pub(crate) fn recompute_derived(&mut self, now: DateTime<Utc>, monthly_hours_cap: f64) {
        if let Some(days) = self.days_since_last_booking(now) {
            self.booking_pattern = if days <= 7 {
                BookingPattern::Regular
            } else if days <= 30 {
                BookingPattern::Irregular
            } else {
                BookingPattern::Inactive
            };
        }

        if self.monthly_class_hours > monthly_hours_cap {
            self.monthly_class_hours = monthly_hours_cap;
        }
    }
}

/// Partial update applied by [`super::BehaviorStore::update`].
///
/// Every field is optional; `last_activity_date` is not settable by
/// callers — the store always stamps it with the call time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorUpdate {
    pub last_booking_date: Option<DateTime<Utc>>,
    pub last_attendance_date: Option<DateTime<Utc>>,
    pub last_note_view_date: Option<DateTime<Utc>>,
    pub last_homework_submission: Option<DateTime<Utc>>,
    pub total_class_hours: Option<f64>,
    pub monthly_class_hours: Option<f64>,
    pub attendance_rate: Option<f64>,
    pub note_view_frequency: Option<f64>,
    pub homework_completion_rate: Option<f64>,
}
