//! Generic integration events: the non-reminder sibling of the
//! dispatch queue, sharing the same retry/backoff lifecycle.

pub mod bus;
pub mod model;

pub use bus::{AttendanceRecorder, BookingSync, EventSinks, IntegrationEventBus, PaymentProcessor};
pub use model::{EventStatus, EventType, IntegrationEvent};
