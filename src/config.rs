//! Configuration types.

use std::time::Duration;

/// Engine configuration.
///
/// The defaults match the portal's fixed thresholds; tests construct
/// variants with shorter timeouts where needed.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delivery attempts before a reminder or event becomes terminally failed.
    pub max_delivery_attempts: u32,
    /// Upper bound applied to `monthly_class_hours` on every write.
    pub monthly_hours_cap: f64,
    /// Monthly class hours below this trigger the low-hours rule and recommendation.
    pub low_hours_threshold: f64,
    /// Attendance rate below this triggers a recommendation.
    pub attendance_rate_floor: f64,
    /// Note-view frequency below this triggers a recommendation.
    pub note_view_floor: f64,
    /// A class starting within this window satisfies the before-class rule.
    pub pre_class_window: Duration,
    /// Bound on every external send so a hung integration cannot stall a sweep.
    pub send_timeout: Duration,
    /// TTL applied to cached engine state. `None` means no expiry.
    pub cache_ttl: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 3,
            monthly_hours_cap: 300.0,
            low_hours_threshold: 180.0,
            attendance_rate_floor: 0.8,
            note_view_floor: 2.0,
            pre_class_window: Duration::from_secs(10 * 60),
            send_timeout: Duration::from_secs(10),
            cache_ttl: Some(Duration::from_secs(30 * 24 * 3600)), // 30 days
        }
    }
}
