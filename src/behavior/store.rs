//! Behavior store — merge incremental updates, recompute derived
//! classifications, persist the table through the cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::behavior::model::{BehaviorUpdate, BookingPattern, UserBehavior, UserType};
use crate::cache::KeyValueCache;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{CacheError, Result};

/// Cache key holding the full behavior table.
pub(crate) const BEHAVIOR_TABLE_KEY: &str = "notify:behaviors";

/// Holds one behavior record per user behind a single writer lock, so a
/// read-merge-recompute-persist sequence can never interleave with
/// another update for the same table.
pub struct BehaviorStore {
    cache: Arc<dyn KeyValueCache>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    table: RwLock<HashMap<String, UserBehavior>>,
}

impl BehaviorStore {
    pub fn new(cache: Arc<dyn KeyValueCache>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            cache,
            clock,
            config,
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Restore the behavior table from the cache. Malformed cached JSON
    /// is logged and ignored — never partially applied.
    pub async fn load(&self) -> Result<()> {
        let Some(raw) = self.cache.get(BEHAVIOR_TABLE_KEY).await? else {
            return Ok(());
        };

        match serde_json::from_str::<Vec<(String, UserBehavior)>>(&raw) {
            Ok(pairs) => {
                let mut table = self.table.write().await;
                *table = pairs.into_iter().collect();
                debug!(users = table.len(), "Restored behavior table from cache");
            }
            Err(e) => {
                warn!(error = %e, "Cached behavior table is malformed, starting empty");
            }
        }
        Ok(())
    }

    /// Merge a partial update onto the user's record, creating a
    /// zero-valued one if absent. `last_activity_date` is always stamped
    /// with the call time; derived fields are recomputed afterwards.
    /// Returns the refreshed record.
    pub async fn update(
        &self,
        user_id: &str,
        user_type: UserType,
        update: BehaviorUpdate,
    ) -> Result<UserBehavior> {
        let now = self.clock.now();

        let snapshot = {
            let mut table = self.table.write().await;
            let record = table
                .entry(user_id.to_string())
                .or_insert_with(|| UserBehavior::new(user_id, user_type, now));

            record.apply(&update);
            record.last_activity_date = now;
            record.recompute_derived(now, self.config.monthly_hours_cap);
            record.clone()
        };

        debug!(
            user_id,
            pattern = ?snapshot.booking_pattern,
            monthly_hours = snapshot.monthly_class_hours,
            "Behavior updated"
        );

        self.persist().await?;
        Ok(snapshot)
    }

    /// Current record for a user, if one exists.
    pub async fn get(&self, user_id: &str) -> Option<UserBehavior> {
        self.table.read().await.get(user_id).cloned()
    }

    /// Advisory strings derived from the current record against fixed
    /// thresholds. Pure read — no side effects, no persistence.
    pub async fn recommendations(&self, user_id: &str) -> Vec<String> {
        let Some(behavior) = self.get(user_id).await else {
            return Vec::new();
        };

        let mut out = Vec::new();
        if behavior.booking_pattern == BookingPattern::Inactive {
            out.push("No recent bookings. Suggest scheduling the next class.".to_string());
        }
        if behavior.monthly_class_hours < self.config.low_hours_threshold {
            out.push(format!(
                "Monthly class hours ({:.0}) are below {:.0}. Recommend additional sessions.",
                behavior.monthly_class_hours, self.config.low_hours_threshold
            ));
        }
        if behavior.attendance_rate < self.config.attendance_rate_floor {
            out.push("Attendance rate is low. Follow up on missed classes.".to_string());
        }
        if behavior.note_view_frequency < self.config.note_view_floor {
            out.push("Lesson notes are rarely viewed. Encourage reviewing notes after class.".to_string());
        }
        out
    }

    /// Sorted copy of the table, for snapshot export.
    pub async fn entries(&self) -> Vec<(String, UserBehavior)> {
        let table = self.table.read().await;
        let mut pairs: Vec<_> = table
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }

    /// Replace the whole table (snapshot import) and persist.
    pub async fn replace_all(&self, pairs: Vec<(String, UserBehavior)>) -> Result<()> {
        {
            let mut table = self.table.write().await;
            *table = pairs.into_iter().collect();
        }
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let json = {
            let pairs = self.entries().await;
            serde_json::to_string(&pairs).map_err(|e| CacheError::Serialization {
                key: BEHAVIOR_TABLE_KEY.to_string(),
                reason: e.to_string(),
            })?
        };
        self.cache
            .set(BEHAVIOR_TABLE_KEY, json, self.config.cache_ttl)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 15, 12, 0, 0).unwrap()
    }

    fn make_store() -> (BehaviorStore, Arc<ManualClock>, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let clock = Arc::new(ManualClock::new(start()));
        let store = BehaviorStore::new(
            Arc::clone(&cache) as Arc<dyn KeyValueCache>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            EngineConfig::default(),
        );
        (store, clock, cache)
    }

    #[tokio::test]
    async fn first_update_creates_record() {
        let (store, _, _) = make_store();
        let b = store
            .update("u1", UserType::Student, BehaviorUpdate::default())
            .await
            .unwrap();
        assert_eq!(b.user_id, "u1");
        assert_eq!(b.booking_pattern, BookingPattern::Inactive);
        assert!(store.get("u1").await.is_some());
    }

    #[tokio::test]
    async fn last_activity_always_refreshed() {
        let (store, clock, _) = make_store();
        store
            .update("u1", UserType::Student, BehaviorUpdate::default())
            .await
            .unwrap();

        clock.advance(Duration::hours(3));
        let b = store
            .update("u1", UserType::Student, BehaviorUpdate::default())
            .await
            .unwrap();
        assert_eq!(b.last_activity_date, start() + Duration::hours(3));
    }

    #[tokio::test]
    async fn booking_pattern_classification_boundaries() {
        let (store, _, _) = make_store();

        for (days, expected) in [
            (7, BookingPattern::Regular),
            (8, BookingPattern::Irregular),
            (30, BookingPattern::Irregular),
            (31, BookingPattern::Inactive),
        ] {
            let b = store
                .update(
                    "u1",
                    UserType::Student,
                    BehaviorUpdate {
                        last_booking_date: Some(start() - Duration::days(days)),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            assert_eq!(b.booking_pattern, expected, "at {days} days");
        }
    }

    #[tokio::test]
    async fn monthly_hours_clamped_on_write() {
        let (store, _, _) = make_store();
        let b = store
            .update(
                "u1",
                UserType::Student,
                BehaviorUpdate {
                    monthly_class_hours: Some(500.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(b.monthly_class_hours, 300.0);
    }

    #[tokio::test]
    async fn update_persists_table_to_cache() {
        let (store, _, cache) = make_store();
        store
            .update("u1", UserType::Student, BehaviorUpdate::default())
            .await
            .unwrap();

        let raw = cache.get(BEHAVIOR_TABLE_KEY).await.unwrap().unwrap();
        let pairs: Vec<(String, UserBehavior)> = serde_json::from_str(&raw).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "u1");
    }

    #[tokio::test]
    async fn load_restores_persisted_table() {
        let cache = Arc::new(MemoryCache::new());
        let clock = Arc::new(ManualClock::new(start()));

        {
            let store = BehaviorStore::new(
                Arc::clone(&cache) as Arc<dyn KeyValueCache>,
                Arc::clone(&clock) as Arc<dyn Clock>,
                EngineConfig::default(),
            );
            store
                .update("u1", UserType::Teacher, BehaviorUpdate::default())
                .await
                .unwrap();
        }

        let store = BehaviorStore::new(
            Arc::clone(&cache) as Arc<dyn KeyValueCache>,
            clock as Arc<dyn Clock>,
            EngineConfig::default(),
        );
        store.load().await.unwrap();
        let b = store.get("u1").await.unwrap();
        assert_eq!(b.user_type, UserType::Teacher);
    }

    #[tokio::test]
    async fn load_ignores_malformed_cache_entry() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set(BEHAVIOR_TABLE_KEY, "{not json".into(), None)
            .await
            .unwrap();

        let store = BehaviorStore::new(
            cache as Arc<dyn KeyValueCache>,
            Arc::new(ManualClock::new(start())) as Arc<dyn Clock>,
            EngineConfig::default(),
        );
        store.load().await.unwrap();
        assert!(store.get("u1").await.is_none());
    }

    #[tokio::test]
    async fn recommendations_for_struggling_student() {
        let (store, _, _) = make_store();
        store
            .update(
                "u1",
                UserType::Student,
                BehaviorUpdate {
                    monthly_class_hours: Some(100.0),
                    attendance_rate: Some(0.5),
                    note_view_frequency: Some(1.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let recs = store.recommendations("u1").await;
        // Inactive pattern + low hours + low attendance + low note views.
        assert_eq!(recs.len(), 4);
    }

    #[tokio::test]
    async fn recommendations_empty_for_healthy_student() {
        let (store, _, _) = make_store();
        store
            .update(
                "u1",
                UserType::Student,
                BehaviorUpdate {
                    last_booking_date: Some(start() - Duration::days(2)),
                    monthly_class_hours: Some(200.0),
                    attendance_rate: Some(0.95),
                    note_view_frequency: Some(5.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(store.recommendations("u1").await.is_empty());
    }

    #[tokio::test]
    async fn recommendations_empty_for_unknown_user() {
        let (store, _, _) = make_store();
        assert!(store.recommendations("ghost").await.is_empty());
    }
}
