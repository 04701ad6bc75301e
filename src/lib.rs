//! class-notify — behavior-triggered notification engine for a school
//! portal.
//!
//! Activity updates flow through the behavior store, a catalog of
//! declarative rules is evaluated against the refreshed snapshot, and
//! satisfied rules enqueue deduplicated reminders that a retryable,
//! multi-channel dispatch queue delivers with exponential backoff. A
//! generic integration event bus handles booking/payment/attendance/
//! notification events with the same retry lifecycle.

pub mod behavior;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod reminders;
pub mod rules;
pub mod snapshot;
