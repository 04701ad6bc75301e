//! Integration event bus.
//!
//! Producers enqueue events via [`IntegrationEventBus::publish`], which
//! also runs an immediate processing pass. Failed events return to
//! pending with an explicit due time (`next_attempt_at`) so a later
//! sweep re-discovers them — there is no timer hidden inside the loop.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::KeyValueCache;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{CacheError, EventError, Result};
use crate::events::model::{EventStatus, EventType, IntegrationEvent};
use crate::gateway::{ChannelGateway, ChannelKind};
use crate::reminders::model::SweepReport;

/// Cache key holding the event queue.
pub(crate) const EVENT_QUEUE_KEY: &str = "notify:event_queue";

/// Booking-system synchronization (e.g. an external booking service).
#[async_trait]
pub trait BookingSync: Send + Sync {
    async fn sync_booking(&self, event: &IntegrationEvent) -> std::result::Result<(), EventError>;
}

/// Payment-provider processing.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn process_payment(&self, event: &IntegrationEvent)
    -> std::result::Result<(), EventError>;
}

/// Internal attendance bookkeeping.
#[async_trait]
pub trait AttendanceRecorder: Send + Sync {
    async fn record_attendance(
        &self,
        event: &IntegrationEvent,
    ) -> std::result::Result<(), EventError>;
}

/// External collaborators the bus dispatches to, by event type.
/// Notification events go out through the channel gateway on line.
#[derive(Clone)]
pub struct EventSinks {
    pub booking: Arc<dyn BookingSync>,
    pub payment: Arc<dyn PaymentProcessor>,
    pub attendance: Arc<dyn AttendanceRecorder>,
    pub gateway: Arc<dyn ChannelGateway>,
}

/// Owns the event queue behind a single writer lock.
pub struct IntegrationEventBus {
    cache: Arc<dyn KeyValueCache>,
    sinks: EventSinks,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    queue: RwLock<Vec<IntegrationEvent>>,
}

impl IntegrationEventBus {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        sinks: EventSinks,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            cache,
            sinks,
            clock,
            config,
            queue: RwLock::new(Vec::new()),
        }
    }

    /// Restore the event queue from the cache, ignoring malformed state.
    pub async fn load(&self) -> Result<()> {
        let Some(raw) = self.cache.get(EVENT_QUEUE_KEY).await? else {
            return Ok(());
        };
        match serde_json::from_str::<Vec<IntegrationEvent>>(&raw) {
            Ok(events) => {
                let mut queue = self.queue.write().await;
                *queue = events;
                debug!(len = queue.len(), "Restored event queue from cache");
            }
            Err(e) => {
                warn!(error = %e, "Cached event queue is malformed, starting empty");
            }
        }
        Ok(())
    }

    /// Enqueue an event and immediately run a processing pass.
    /// Returns the enqueued event (its status reflects the pass).
    pub async fn publish(
        &self,
        event_type: EventType,
        source: &str,
        data: serde_json::Value,
    ) -> Result<IntegrationEvent> {
        let event = IntegrationEvent::new(event_type, source, data, self.clock.now());
        let id = event.id;

        info!(event_id = %id, %event_type, source, "Event queued");
        {
            let mut queue = self.queue.write().await;
            queue.push(event.clone());
        }
        self.persist().await?;

        self.process_queue().await?;

        let queue = self.queue.read().await;
        Ok(queue.iter().find(|e| e.id == id).cloned().unwrap_or(event))
    }

    /// One processing sweep over every due pending event.
    ///
    /// Events are marked processing, dispatched concurrently to their
    /// handler (bounded by the send timeout), then transitioned:
    /// completed on success, back to pending with a `2^retry_count`
    /// second due time while retries remain, failed once exhausted.
    pub async fn process_queue(&self) -> Result<SweepReport> {
        let now = self.clock.now();

        let batch: Vec<IntegrationEvent> = {
            let mut queue = self.queue.write().await;
            let mut batch = Vec::new();
            for event in queue.iter_mut().filter(|e| e.is_due(now)) {
                event.status = EventStatus::Processing;
                batch.push(event.clone());
            }
            batch
        };

        let mut report = SweepReport {
            attempted: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }

        let send_timeout = self.config.send_timeout;
        let attempts = batch.iter().map(|event| {
            let sinks = self.sinks.clone();
            async move {
                let result = match tokio::time::timeout(
                    send_timeout,
                    Self::dispatch(&sinks, event),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(EventError::Timeout {
                        event_type: event.event_type,
                        timeout: send_timeout,
                    }),
                };
                (event.id, result)
            }
        });
        let outcomes = join_all(attempts).await;

        {
            let mut queue = self.queue.write().await;
            for (id, result) in outcomes {
                let Some(event) = queue.iter_mut().find(|e| e.id == id) else {
                    continue;
                };

                match result {
                    Ok(()) => {
                        event.status = EventStatus::Completed;
                        report.succeeded += 1;
                        info!(event_id = %event.id, event_type = %event.event_type, "Event completed");
                    }
                    Err(e) => {
                        warn!(
                            event_id = %event.id,
                            event_type = %event.event_type,
                            error = %e,
                            "Event handler failed"
                        );
                        event.retry_count += 1;
                        if event.retry_count >= self.config.max_delivery_attempts {
                            event.status = EventStatus::Failed;
                            report.failed += 1;
                            warn!(
                                event_id = %event.id,
                                attempts = event.retry_count,
                                "Event failed terminally, retry budget exhausted"
                            );
                        } else {
                            // Exponential backoff: 2^retry_count seconds.
                            event.status = EventStatus::Pending;
                            event.next_attempt_at =
                                Some(now + Duration::seconds(1i64 << event.retry_count));
                            report.retried += 1;
                        }
                    }
                }
            }
        }

        self.persist().await?;
        Ok(report)
    }

    /// Route an event to its external collaborator.
    async fn dispatch(
        sinks: &EventSinks,
        event: &IntegrationEvent,
    ) -> std::result::Result<(), EventError> {
        match event.event_type {
            EventType::Booking => sinks.booking.sync_booking(event).await,
            EventType::Payment => sinks.payment.process_payment(event).await,
            EventType::Attendance => sinks.attendance.record_attendance(event).await,
            EventType::Notification => {
                let user_id = event.data.get("userId").and_then(|v| v.as_str()).ok_or(
                    EventError::MalformedPayload {
                        event_type: event.event_type,
                        reason: "missing userId".into(),
                    },
                )?;
                let message = event.data.get("message").and_then(|v| v.as_str()).ok_or(
                    EventError::MalformedPayload {
                        event_type: event.event_type,
                        reason: "missing message".into(),
                    },
                )?;
                sinks
                    .gateway
                    .send(user_id, message, ChannelKind::Line)
                    .await
                    .map_err(|e| EventError::HandlerFailed {
                        event_type: event.event_type,
                        reason: e.to_string(),
                    })
            }
        }
    }

    /// Every event including terminal history.
    pub async fn all(&self) -> Vec<IntegrationEvent> {
        self.queue.read().await.clone()
    }

    /// Events still awaiting (re)processing.
    pub async fn pending(&self) -> Vec<IntegrationEvent> {
        let queue = self.queue.read().await;
        queue
            .iter()
            .filter(|e| e.status == EventStatus::Pending)
            .cloned()
            .collect()
    }

    async fn persist(&self) -> Result<()> {
        let json = {
            let queue = self.queue.read().await;
            serde_json::to_string(&*queue).map_err(|e| CacheError::Serialization {
                key: EVENT_QUEUE_KEY.to_string(),
                reason: e.to_string(),
            })?
        };
        self.cache
            .set(EVENT_QUEUE_KEY, json, self.config.cache_ttl)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::clock::ManualClock;
    use crate::error::DeliveryError;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 15, 12, 0, 0).unwrap()
    }

    /// Collaborator that fails a scripted number of times, then succeeds.
    #[derive(Default)]
    struct FlakySink {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakySink {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(times),
                calls: AtomicU32::new(0),
            }
        }

        fn attempt(&self, event_type: EventType) -> std::result::Result<(), EventError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                Err(EventError::HandlerFailed {
                    event_type,
                    reason: "scripted failure".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl BookingSync for FlakySink {
        async fn sync_booking(
            &self,
            event: &IntegrationEvent,
        ) -> std::result::Result<(), EventError> {
            self.attempt(event.event_type)
        }
    }

    #[async_trait]
    impl PaymentProcessor for FlakySink {
        async fn process_payment(
            &self,
            event: &IntegrationEvent,
        ) -> std::result::Result<(), EventError> {
            self.attempt(event.event_type)
        }
    }

    #[async_trait]
    impl AttendanceRecorder for FlakySink {
        async fn record_attendance(
            &self,
            event: &IntegrationEvent,
        ) -> std::result::Result<(), EventError> {
            self.attempt(event.event_type)
        }
    }

    /// Gateway recording notification sends.
    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<(String, String, ChannelKind)>>,
    }

    #[async_trait]
    impl ChannelGateway for RecordingGateway {
        async fn send(
            &self,
            user_id: &str,
            message: &str,
            channel: ChannelKind,
        ) -> std::result::Result<(), DeliveryError> {
            self.sent
                .lock()
                .unwrap()
                .push((user_id.to_string(), message.to_string(), channel));
            Ok(())
        }
    }

    struct TestBus {
        bus: IntegrationEventBus,
        booking: Arc<FlakySink>,
        gateway: Arc<RecordingGateway>,
        clock: Arc<ManualClock>,
    }

    fn make_bus(booking: FlakySink) -> TestBus {
        let booking = Arc::new(booking);
        let gateway = Arc::new(RecordingGateway::default());
        let clock = Arc::new(ManualClock::new(start()));
        let sinks = EventSinks {
            booking: Arc::clone(&booking) as Arc<dyn BookingSync>,
            payment: Arc::new(FlakySink::default()),
            attendance: Arc::new(FlakySink::default()),
            gateway: Arc::clone(&gateway) as Arc<dyn ChannelGateway>,
        };
        let bus = IntegrationEventBus::new(
            Arc::new(MemoryCache::new()),
            sinks,
            Arc::clone(&clock) as Arc<dyn Clock>,
            EngineConfig::default(),
        );
        TestBus {
            bus,
            booking,
            gateway,
            clock,
        }
    }

    #[tokio::test]
    async fn publish_processes_immediately() {
        let t = make_bus(FlakySink::default());
        let event = t
            .bus
            .publish(EventType::Booking, "api", serde_json::json!({"slot": 1}))
            .await
            .unwrap();

        assert_eq!(event.status, EventStatus::Completed);
        assert_eq!(t.booking.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_backs_off_in_seconds() {
        let t = make_bus(FlakySink::failing(1));
        let event = t
            .bus
            .publish(EventType::Booking, "api", serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(event.retry_count, 1);
        assert_eq!(event.next_attempt_at, Some(start() + Duration::seconds(2)));
    }

    #[tokio::test]
    async fn retried_event_waits_for_due_time() {
        let t = make_bus(FlakySink::failing(1));
        t.bus
            .publish(EventType::Booking, "api", serde_json::json!({}))
            .await
            .unwrap();

        // Not due yet — the sweep must skip it.
        let report = t.bus.process_queue().await.unwrap();
        assert_eq!(report.attempted, 0);

        t.clock.advance(Duration::seconds(2));
        let report = t.bus.process_queue().await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(t.bus.all().await[0].status, EventStatus::Completed);
    }

    #[tokio::test]
    async fn retries_exhausted_becomes_failed() {
        let t = make_bus(FlakySink::failing(10));
        t.bus
            .publish(EventType::Booking, "api", serde_json::json!({}))
            .await
            .unwrap();

        t.clock.advance(Duration::seconds(2));
        t.bus.process_queue().await.unwrap();
        t.clock.advance(Duration::seconds(4));
        let report = t.bus.process_queue().await.unwrap();

        assert_eq!(report.failed, 1);
        let event = t.bus.all().await[0].clone();
        assert_eq!(event.status, EventStatus::Failed);
        assert_eq!(event.retry_count, 3);

        // Terminal: later sweeps ignore it.
        t.clock.advance(Duration::hours(1));
        assert_eq!(t.bus.process_queue().await.unwrap().attempted, 0);
        assert_eq!(t.booking.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn notification_event_goes_through_gateway() {
        let t = make_bus(FlakySink::default());
        let event = t
            .bus
            .publish(
                EventType::Notification,
                "admin-ui",
                serde_json::json!({"userId": "u1", "message": "Class moved to 5pm"}),
            )
            .await
            .unwrap();

        assert_eq!(event.status, EventStatus::Completed);
        let sent = t.gateway.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![(
                "u1".to_string(),
                "Class moved to 5pm".to_string(),
                ChannelKind::Line
            )]
        );
    }

    #[tokio::test]
    async fn malformed_notification_payload_retries_then_fails() {
        let t = make_bus(FlakySink::default());
        t.bus
            .publish(EventType::Notification, "admin-ui", serde_json::json!({}))
            .await
            .unwrap();

        t.clock.advance(Duration::seconds(2));
        t.bus.process_queue().await.unwrap();
        t.clock.advance(Duration::seconds(4));
        t.bus.process_queue().await.unwrap();

        assert_eq!(t.bus.all().await[0].status, EventStatus::Failed);
        assert!(t.gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn queue_persists_and_reloads() {
        let cache = Arc::new(MemoryCache::new());
        let clock = Arc::new(ManualClock::new(start()));
        let sinks = EventSinks {
            booking: Arc::new(FlakySink::failing(10)),
            payment: Arc::new(FlakySink::default()),
            attendance: Arc::new(FlakySink::default()),
            gateway: Arc::new(RecordingGateway::default()),
        };

        {
            let bus = IntegrationEventBus::new(
                Arc::clone(&cache) as Arc<dyn KeyValueCache>,
                sinks.clone(),
                Arc::clone(&clock) as Arc<dyn Clock>,
                EngineConfig::default(),
            );
            bus.publish(EventType::Booking, "api", serde_json::json!({}))
                .await
                .unwrap();
        }

        let bus = IntegrationEventBus::new(
            cache as Arc<dyn KeyValueCache>,
            sinks,
            clock as Arc<dyn Clock>,
            EngineConfig::default(),
        );
        bus.load().await.unwrap();

        let events = bus.all().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Pending);
        assert_eq!(events[0].retry_count, 1);
    }
}
