//! Notification sender port.

/// Error type for notification delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification endpoint answered {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Port trait for outbound notifications.
///
/// Called after a successful commit. Failures are logged by the caller and
/// never undo the payment.
#[async_trait::async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends a message to a specific recipient.
    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotificationError>;

    /// Broadcasts a message to the sender's default audience.
    async fn notify(&self, message: &str) -> Result<(), NotificationError>;
}
