//! Channel gateway — the seam to the external delivery integrations.
//!
//! Each channel kind is a distinct external service (chat-bot push API,
//! email-template API, push-notification API). The engine only sees
//! this trait; wire-level details live with the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// A delivery medium for reminder messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Line,
    Email,
    Push,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Line => "line",
            Self::Email => "email",
            Self::Push => "push",
        };
        write!(f, "{s}")
    }
}

/// Performs the actual send for one channel and reports success/failure.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    async fn send(
        &self,
        user_id: &str,
        message: &str,
        channel: ChannelKind,
    ) -> Result<(), DeliveryError>;
}
