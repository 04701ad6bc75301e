//! Per-user activity signals and derived classifications.

pub mod model;
pub mod store;

pub use model::{BehaviorUpdate, BookingPattern, UserBehavior, UserType};
pub use store::BehaviorStore;
