use tracing::{debug, error};

use super::models::NotificationBatch;
use super::senders::{
    console::ConsoleNotifier, email::EmailNotifier, Notifier, SenderError,
};
use crate::config::AppConfig;

/// Fans a batch out to every enabled notifier.
pub struct NotificationService {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotificationService {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    /// Console first, then email, each only when enabled.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();
        if config.monitor.enable_console {
            notifiers.push(Box::new(ConsoleNotifier::new()));
        }
        if config.monitor.enable_email {
            notifiers.push(Box::new(EmailNotifier::from_config(&config.email)));
        }
        Self::new(notifiers)
    }

    pub fn notifier_names(&self) -> Vec<&'static str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    /// Sends `batch` through every notifier. A failing notifier does not stop
    /// the others; the last error is returned after all have run.
    pub async fn dispatch(&self, batch: &NotificationBatch) -> Result<(), SenderError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut last_error: Option<SenderError> = None;
        for notifier in &self.notifiers {
            match notifier.notify(batch).await {
                Ok(()) => {
                    debug!(notifier = notifier.name(), count = batch.len(), "Notification delivered.");
                }
                Err(e) => {
                    error!(notifier = notifier.name(), error = %e, "Notification failed.");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
