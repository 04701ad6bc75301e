//! Reminder queue — deduplicated scheduling plus the dispatch sweep.
//!
//! Scheduling enforces the at-most-one-pending-per-(user, rule)
//! invariant. The sweep is cooperative: nothing here runs on a timer,
//! an external driver calls `process_pending()` periodically (or the
//! engine calls it eagerly for immediate-timing rules).

use std::sync::Arc;

use chrono::Duration;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::behavior::model::UserType;
use crate::cache::KeyValueCache;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{CacheError, DeliveryError, Result};
use crate::gateway::ChannelGateway;
use crate::reminders::model::{ReminderMessage, ReminderStatus, SweepReport};
use crate::rules::model::{ReminderRule, ReminderTiming};

/// Cache key holding the reminder queue.
pub(crate) const REMINDER_QUEUE_KEY: &str = "notify:reminder_queue";

/// Owns the reminder queue behind a single writer lock.
pub struct ReminderQueue {
    cache: Arc<dyn KeyValueCache>,
    gateway: Arc<dyn ChannelGateway>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    queue: RwLock<Vec<ReminderMessage>>,
}

impl ReminderQueue {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        gateway: Arc<dyn ChannelGateway>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            cache,
            gateway,
            clock,
            config,
            queue: RwLock::new(Vec::new()),
        }
    }

    /// Restore the queue from the cache, ignoring malformed state.
    pub async fn load(&self) -> Result<()> {
        let Some(raw) = self.cache.get(REMINDER_QUEUE_KEY).await? else {
            return Ok(());
        };
        match serde_json::from_str::<Vec<ReminderMessage>>(&raw) {
            Ok(messages) => {
                let mut queue = self.queue.write().await;
                *queue = messages;
                debug!(len = queue.len(), "Restored reminder queue from cache");
            }
            Err(e) => {
                warn!(error = %e, "Cached reminder queue is malformed, starting empty");
            }
        }
        Ok(())
    }

    /// Enqueue a reminder for a fired rule, deduplicated: if a pending
    /// message already exists for `(user_id, rule.id)` this is a no-op
    /// returning `None`. Otherwise returns the new message so the
    /// caller can trigger an eager sweep for immediate timing.
    pub async fn schedule(
        &self,
        user_id: &str,
        user_type: UserType,
        rule: &ReminderRule,
    ) -> Result<Option<ReminderMessage>> {
        let now = self.clock.now();
        let scheduled_at = match rule.timing {
            ReminderTiming::Immediate => now,
            ReminderTiming::Daily => now + Duration::hours(24),
            ReminderTiming::Weekly => now + Duration::days(7),
            ReminderTiming::Monthly => now + Duration::days(30),
        };

        let message = {
            let mut queue = self.queue.write().await;
            let already_pending = queue.iter().any(|m| {
                m.status == ReminderStatus::Pending && m.user_id == user_id && m.rule_id == rule.id
            });
            if already_pending {
                debug!(user_id, rule_id = %rule.id, "Reminder already pending, skipping");
                return Ok(None);
            }

            let message = ReminderMessage::new(user_id, user_type, rule, scheduled_at);
            queue.push(message.clone());
            message
        };

        info!(
            user_id,
            rule_id = %rule.id,
            scheduled_at = %message.scheduled_at,
            "Reminder scheduled"
        );
        self.persist().await?;
        Ok(Some(message))
    }

    /// One dispatch sweep: attempt every pending message whose
    /// scheduled time has arrived.
    ///
    /// Each message's channels are attempted independently (a failure on
    /// one channel does not skip the others), but the verdict is
    /// all-or-nothing: any channel failure counts the whole attempt as
    /// failed and drives the retry transition. Message attempts are
    /// fanned out concurrently and every send is bounded by the
    /// configured timeout.
    pub async fn process_pending(&self) -> Result<SweepReport> {
        let now = self.clock.now();

        let due: Vec<ReminderMessage> = {
            let queue = self.queue.read().await;
            queue
                .iter()
                .filter(|m| m.status == ReminderStatus::Pending && m.scheduled_at <= now)
                .cloned()
                .collect()
        };

        let mut report = SweepReport {
            attempted: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        let send_timeout = self.config.send_timeout;
        let attempts = due.iter().map(|msg| {
            let gateway = Arc::clone(&self.gateway);
            async move {
                let sends = msg.channels.iter().map(|&channel| {
                    let gateway = Arc::clone(&gateway);
                    async move {
                        match tokio::time::timeout(
                            send_timeout,
                            gateway.send(&msg.user_id, &msg.message, channel),
                        )
                        .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(DeliveryError::Timeout {
                                channel,
                                timeout: send_timeout,
                            }),
                        }
                    }
                });
                (msg.id, join_all(sends).await)
            }
        });
        let outcomes = join_all(attempts).await;

        {
            let mut queue = self.queue.write().await;
            for (id, results) in outcomes {
                let Some(msg) = queue.iter_mut().find(|m| m.id == id) else {
                    continue;
                };

                let failures: Vec<&DeliveryError> =
                    results.iter().filter_map(|r| r.as_ref().err()).collect();

                if failures.is_empty() {
                    msg.status = ReminderStatus::Sent;
                    msg.sent_at = Some(now);
                    report.succeeded += 1;
                    info!(
                        user_id = %msg.user_id,
                        rule_id = %msg.rule_id,
                        retry_count = msg.retry_count,
                        "Reminder sent"
                    );
                    continue;
                }

                for failure in &failures {
                    warn!(
                        user_id = %msg.user_id,
                        rule_id = %msg.rule_id,
                        error = %failure,
                        "Reminder channel send failed"
                    );
                }

                msg.retry_count += 1;
                if msg.retry_count >= self.config.max_delivery_attempts {
                    msg.status = ReminderStatus::Failed;
                    report.failed += 1;
                    warn!(
                        user_id = %msg.user_id,
                        rule_id = %msg.rule_id,
                        attempts = msg.retry_count,
                        "Reminder failed terminally, retry budget exhausted"
                    );
                } else {
                    // Exponential backoff: 2^retry_count minutes.
                    msg.scheduled_at = now + Duration::minutes(1i64 << msg.retry_count);
                    report.retried += 1;
                    debug!(
                        user_id = %msg.user_id,
                        rule_id = %msg.rule_id,
                        retry_count = msg.retry_count,
                        next_attempt = %msg.scheduled_at,
                        "Reminder rescheduled"
                    );
                }
            }
        }

        self.persist().await?;
        Ok(report)
    }

    /// Pending messages, for callers and tests.
    pub async fn pending(&self) -> Vec<ReminderMessage> {
        let queue = self.queue.read().await;
        queue
            .iter()
            .filter(|m| m.status == ReminderStatus::Pending)
            .cloned()
            .collect()
    }

    /// Every message including terminal history.
    pub async fn all(&self) -> Vec<ReminderMessage> {
        self.queue.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.queue.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.read().await.is_empty()
    }

    /// Replace the whole queue (snapshot import) and persist.
    pub async fn replace_all(&self, messages: Vec<ReminderMessage>) -> Result<()> {
        {
            let mut queue = self.queue.write().await;
            *queue = messages;
        }
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let json = {
            let queue = self.queue.read().await;
            serde_json::to_string(&*queue).map_err(|e| CacheError::Serialization {
                key: REMINDER_QUEUE_KEY.to_string(),
                reason: e.to_string(),
            })?
        };
        self.cache
            .set(REMINDER_QUEUE_KEY, json, self.config.cache_ttl)
            .await?;
        Ok(())
    }
}
