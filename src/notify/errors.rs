//! Notifier errors

use thiserror::Error;

/// Failure reported by a notifier backend
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// Recipient address rejected before sending
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Transport failed to deliver
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Broadcast audience not recognized
    #[error("Unknown audience: {0}")]
    UnknownAudience(String),
}
