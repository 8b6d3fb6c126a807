use async_trait::async_trait;
use thiserror::Error;

use super::models::NotificationBatch;

pub mod console;
pub mod email;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid email address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("Failed to build email message: {0}")]
    MessageBuild(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Write error: {0}")]
    Io(#[from] std::io::Error),
}

/// A sink for batches of newly detected rows.
/// Concrete notifiers (console, email) implement this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Delivers one batch. Implementations must do nothing for an empty batch.
    async fn notify(&self, batch: &NotificationBatch) -> Result<(), SenderError>;
}
