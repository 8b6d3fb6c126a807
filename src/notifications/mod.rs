pub mod models;
pub mod senders;
pub mod service;

pub use models::{AlertContext, NotificationBatch};
pub use senders::{Notifier, SenderError};
pub use service::NotificationService;
