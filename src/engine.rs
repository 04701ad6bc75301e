//! Notification engine — composition root for the behavior store, rule
//! catalog, and reminder queue.
//!
//! Constructed once at process start and passed into API handlers;
//! there is no global singleton. The engine runs no background tasks of
//! its own — an external driver (cron job, timer) calls
//! [`NotificationEngine::process_pending`] periodically, and
//! immediate-timing rules trigger an eager pass at schedule time.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::behavior::model::{BehaviorUpdate, UserBehavior, UserType};
use crate::behavior::store::BehaviorStore;
use crate::cache::KeyValueCache;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{CacheError, Result};
use crate::gateway::ChannelGateway;
use crate::reminders::model::{ReminderMessage, SweepReport};
use crate::reminders::queue::ReminderQueue;
use crate::rules::engine::{RuleEngine, ScheduleSource};
use crate::rules::model::{ReminderRule, ReminderTiming};
use crate::snapshot::EngineSnapshot;

/// Cache key holding the rule catalog.
pub(crate) const RULES_KEY: &str = "notify:reminder_rules";

/// External collaborators injected into the engine.
pub struct EngineDeps {
    pub cache: Arc<dyn KeyValueCache>,
    pub gateway: Arc<dyn ChannelGateway>,
    pub clock: Arc<dyn Clock>,
    /// Schedule lookup for the before-class / no-attendance rules.
    /// Those rules evaluate false when absent.
    pub schedule: Option<Arc<dyn ScheduleSource>>,
}

/// The behavior-triggered notification engine.
pub struct NotificationEngine {
    behaviors: BehaviorStore,
    rules: RwLock<Vec<ReminderRule>>,
    rule_engine: RuleEngine,
    queue: ReminderQueue,
    cache: Arc<dyn KeyValueCache>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl NotificationEngine {
    /// Build an engine with the default rule catalog.
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Self {
        let mut rule_engine = RuleEngine::new(&config);
        if let Some(schedule) = deps.schedule {
            rule_engine = rule_engine.with_schedule_source(schedule);
        }

        Self {
            behaviors: BehaviorStore::new(
                Arc::clone(&deps.cache),
                Arc::clone(&deps.clock),
                config.clone(),
            ),
            rules: RwLock::new(ReminderRule::default_catalog()),
            rule_engine,
            queue: ReminderQueue::new(
                Arc::clone(&deps.cache),
                deps.gateway,
                Arc::clone(&deps.clock),
                config.clone(),
            ),
            cache: deps.cache,
            clock: deps.clock,
            config,
        }
    }

    /// Restore behaviors, rules, and the queue from the cache. Call once
    /// after construction; malformed cached state is skipped, not fatal.
    pub async fn load(&self) -> Result<()> {
        self.behaviors.load().await?;
        self.queue.load().await?;

        if let Some(raw) = self.cache.get(RULES_KEY).await? {
            match serde_json::from_str::<Vec<ReminderRule>>(&raw) {
                Ok(rules) => {
                    let mut catalog = self.rules.write().await;
                    *catalog = rules;
                    debug!(rules = catalog.len(), "Restored rule catalog from cache");
                }
                Err(e) => {
                    warn!(error = %e, "Cached rule catalog is malformed, keeping defaults");
                }
            }
        }
        Ok(())
    }

    /// Record an activity update for a user and run the full pipeline:
    /// merge the update, evaluate the rule catalog against the refreshed
    /// snapshot, schedule a deduplicated reminder per satisfied rule,
    /// and run an eager dispatch pass if any of them was immediate.
    ///
    /// Returns the refreshed behavior record.
    pub async fn record_activity(
        &self,
        user_id: &str,
        user_type: UserType,
        update: BehaviorUpdate,
    ) -> Result<UserBehavior> {
        let behavior = self.behaviors.update(user_id, user_type, update).await?;

        let now = self.clock.now();
        let fired: Vec<ReminderRule> = {
            let rules = self.rules.read().await;
            self.rule_engine
                .evaluate(&rules, &behavior, now)
                .into_iter()
                .cloned()
                .collect()
        };

        let mut eager = false;
        for rule in &fired {
            if let Some(message) = self.queue.schedule(user_id, user_type, rule).await? {
                info!(
                    user_id,
                    rule_id = %rule.id,
                    scheduled_at = %message.scheduled_at,
                    "Rule fired"
                );
                if rule.timing == ReminderTiming::Immediate {
                    eager = true;
                }
            }
        }

        if eager {
            self.queue.process_pending().await?;
        }

        Ok(behavior)
    }

    /// One dispatch sweep over due reminders. Invoked by the external
    /// driver; see the module docs.
    pub async fn process_pending(&self) -> Result<SweepReport> {
        self.queue.process_pending().await
    }

    /// Current behavior record for a user, if any.
    pub async fn behavior(&self, user_id: &str) -> Option<UserBehavior> {
        self.behaviors.get(user_id).await
    }

    /// Advisory recommendations for a user. Pure read.
    pub async fn recommendations(&self, user_id: &str) -> Vec<String> {
        self.behaviors.recommendations(user_id).await
    }

    /// Reminders still awaiting delivery.
    pub async fn pending_reminders(&self) -> Vec<ReminderMessage> {
        self.queue.pending().await
    }

    /// Every reminder including sent/failed history.
    pub async fn reminder_history(&self) -> Vec<ReminderMessage> {
        self.queue.all().await
    }

    // ── Rule administration ─────────────────────────────────────────

    /// Current rule catalog.
    pub async fn rules(&self) -> Vec<ReminderRule> {
        self.rules.read().await.clone()
    }

    /// Insert a rule, or replace the one with the same id.
    pub async fn upsert_rule(&self, rule: ReminderRule) -> Result<()> {
        {
            let mut rules = self.rules.write().await;
            match rules.iter_mut().find(|r| r.id == rule.id) {
                Some(existing) => *existing = rule,
                None => rules.push(rule),
            }
        }
        self.persist_rules().await
    }

    /// Remove a rule by id. Returns whether anything was removed.
    pub async fn remove_rule(&self, rule_id: &str) -> Result<bool> {
        let removed = {
            let mut rules = self.rules.write().await;
            let before = rules.len();
            rules.retain(|r| r.id != rule_id);
            rules.len() != before
        };
        if removed {
            self.persist_rules().await?;
        }
        Ok(removed)
    }

    // ── Snapshot export/import ──────────────────────────────────────

    /// Serialize the behavior table, rule catalog, and reminder queue
    /// into a single JSON document.
    pub async fn export_data(&self) -> Result<String> {
        let snapshot = EngineSnapshot {
            behaviors: self.behaviors.entries().await,
            reminder_rules: self.rules().await,
            reminder_queue: self.queue.all().await,
        };
        serde_json::to_string(&snapshot)
            .map_err(|e| {
                CacheError::Serialization {
                    key: "snapshot".to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Replace all engine state from an exported document. Returns
    /// `false` without touching anything if the document doesn't parse.
    pub async fn import_data(&self, json: &str) -> bool {
        let snapshot: EngineSnapshot = match serde_json::from_str(json) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Snapshot import rejected, state unchanged");
                return false;
            }
        };

        let behaviors = snapshot.behaviors.len();
        let rules = snapshot.reminder_rules.len();
        let queue = snapshot.reminder_queue.len();

        if let Err(e) = self.behaviors.replace_all(snapshot.behaviors).await {
            warn!(error = %e, "Failed to persist imported behaviors");
        }
        {
            let mut catalog = self.rules.write().await;
            *catalog = snapshot.reminder_rules;
        }
        if let Err(e) = self.persist_rules().await {
            warn!(error = %e, "Failed to persist imported rules");
        }
        if let Err(e) = self.queue.replace_all(snapshot.reminder_queue).await {
            warn!(error = %e, "Failed to persist imported queue");
        }

        info!(behaviors, rules, queue, "Snapshot imported");
        true
    }

    async fn persist_rules(&self) -> Result<()> {
        let json = {
            let rules = self.rules.read().await;
            serde_json::to_string(&*rules).map_err(|e| CacheError::Serialization {
                key: RULES_KEY.to_string(),
                reason: e.to_string(),
            })?
        };
        self.cache
            .set(RULES_KEY, json, self.config.cache_ttl)
            .await?;
        Ok(())
    }
}
