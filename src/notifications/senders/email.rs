use async_trait::async_trait;
use chrono::Local;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use super::{Notifier, SenderError};
use crate::config::EmailConfig;
use crate::notifications::models::NotificationBatch;

/// A fully composed plain-text email, independent of how it is delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    /// Envelope recipients: the primary recipient followed by every CC.
    pub fn recipients(&self) -> Vec<&str> {
        std::iter::once(self.to.as_str())
            .chain(self.cc.iter().map(String::as_str))
            .collect()
    }
}

/// Delivers a composed mail. The SMTP implementation is the production one;
/// tests substitute a recording transport.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), SenderError>;
}

/// One SMTP session per message: connect, STARTTLS, authenticate, send, quit.
pub struct SmtpMailTransport {
    server: String,
    port: u16,
    username: String,
    password: String,
}

impl SmtpMailTransport {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            server: config.smtp_server.clone(),
            port: config.smtp_port,
            username: config.sender_email.clone(),
            password: config.sender_password.clone(),
        }
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), SenderError> {
        let message = build_message(mail)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.server)?
            .port(self.port)
            .credentials(Credentials::new(self.username.clone(), self.password.clone()))
            .build();

        transport.send(message).await?;
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, SenderError> {
    address
        .parse::<Mailbox>()
        .map_err(|source| SenderError::InvalidAddress {
            address: address.to_string(),
            source,
        })
}

pub(crate) fn build_message(mail: &OutgoingMail) -> Result<Message, SenderError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&mail.from)?)
        .to(parse_mailbox(&mail.to)?)
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_PLAIN);
    for cc in &mail.cc {
        builder = builder.cc(parse_mailbox(cc)?);
    }
    Ok(builder.body(mail.body.clone())?)
}

/// Splits a comma separated address list, trimming whitespace and dropping
/// empty entries.
pub fn parse_cc_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

/// `customer_name` -> `Customer_Name`: every letter following a non-letter is
/// upper-cased, the rest lower-cased.
fn title_case(name: &str) -> String {
    let mut titled = String::with_capacity(name.len());
    let mut after_letter = false;
    for ch in name.chars() {
        if ch.is_alphabetic() {
            if after_letter {
                titled.extend(ch.to_lowercase());
            } else {
                titled.extend(ch.to_uppercase());
            }
            after_letter = true;
        } else {
            titled.push(ch);
            after_letter = false;
        }
    }
    titled
}

pub fn render_subject(prefix: &str, batch: &NotificationBatch) -> String {
    format!(
        "{prefix}: {} rows with status_id={} detected",
        batch.len(),
        batch.context.status_id
    )
}

pub fn render_body(batch: &NotificationBatch) -> String {
    let ctx = &batch.context;
    let mut body = String::from("Database Alert Report\n========================\n\n");
    body.push_str(&format!("Schema: {}\n", ctx.schema));
    body.push_str(&format!("Table: {}\n", ctx.table));
    body.push_str(&format!(
        "Found {} rows with status_id = {} updated in the last {} minutes.\n\n",
        batch.len(),
        ctx.status_id,
        ctx.window_minutes
    ));
    body.push_str("Details:\n--------\n");

    for (index, row) in batch.rows.iter().enumerate() {
        body.push_str(&format!("\n{}. Record ID: {}\n", index + 1, row.id()));
        body.push_str(&format!("   Updated At: {}\n", row.updated_at()));
        body.push_str(&format!("   Status ID: {}\n", row.status()));
        for (name, value) in row.extra_columns() {
            body.push_str(&format!("   {}: {}\n", title_case(name), value));
        }
        body.push_str(&format!("   {}\n", "-".repeat(40)));
    }

    body.push_str(&format!(
        "\nGenerated at: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    body
}

/// Emails each batch to the configured recipient and CC list.
pub struct EmailNotifier<T = SmtpMailTransport> {
    transport: T,
    sender: String,
    recipient: String,
    cc: Vec<String>,
    subject_prefix: String,
}

impl EmailNotifier<SmtpMailTransport> {
    pub fn from_config(config: &EmailConfig) -> Self {
        Self::new(SmtpMailTransport::new(config), config)
    }
}

impl<T: MailTransport> EmailNotifier<T> {
    pub fn new(transport: T, config: &EmailConfig) -> Self {
        Self {
            transport,
            sender: config.sender_email.clone(),
            recipient: config.recipient_email.clone(),
            cc: parse_cc_list(&config.cc_email),
            subject_prefix: config.subject_prefix.clone(),
        }
    }

    pub fn compose(&self, batch: &NotificationBatch) -> OutgoingMail {
        OutgoingMail {
            from: self.sender.clone(),
            to: self.recipient.clone(),
            cc: self.cc.clone(),
            subject: render_subject(&self.subject_prefix, batch),
            body: render_body(batch),
        }
    }
}

#[async_trait]
impl<T: MailTransport> Notifier for EmailNotifier<T> {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, batch: &NotificationBatch) -> Result<(), SenderError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mail = self.compose(batch);
        self.transport.send(&mail).await?;

        if mail.cc.is_empty() {
            info!(count = batch.len(), to = %mail.to, "Email notification sent.");
        } else {
            info!(
                count = batch.len(),
                to = %mail.to,
                cc = %mail.cc.join(", "),
                "Email notification sent."
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Row, RowValue};
    use crate::notifications::models::AlertContext;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<OutgoingMail>>>,
        fail: bool,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), SenderError> {
            if self.fail {
                return Err(SenderError::SendFailed("535 authentication failed".to_string()));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    fn email_config(cc: &str) -> EmailConfig {
        EmailConfig {
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
            sender_email: "alerts@example.com".to_string(),
            sender_password: "secret".to_string(),
            recipient_email: "ops@example.com".to_string(),
            cc_email: cc.to_string(),
            subject_prefix: "Database Alert".to_string(),
        }
    }

    fn batch() -> NotificationBatch {
        let row = Row::from_columns(vec![
            ("id".to_string(), RowValue::Integer(42)),
            ("updated_at".to_string(), RowValue::Text("2024-05-01 10:30:00".to_string())),
            ("status_id".to_string(), RowValue::Integer(3)),
            ("customer_name".to_string(), RowValue::Text("Acme".to_string())),
            ("amount".to_string(), RowValue::Float(12.5)),
        ])
        .unwrap();
        NotificationBatch::new(
            AlertContext {
                schema: "public".to_string(),
                table: "orders".to_string(),
                status_id: 3,
                window_minutes: 30,
            },
            vec![row],
        )
    }

    #[test]
    fn test_cc_list_is_trimmed_and_empty_entries_dropped() {
        assert_eq!(parse_cc_list("a@x.com, , b@x.com"), vec!["a@x.com", "b@x.com"]);
        assert_eq!(parse_cc_list(""), Vec::<String>::new());
        assert_eq!(parse_cc_list(" , ,"), Vec::<String>::new());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("customer_name"), "Customer_Name");
        assert_eq!(title_case("AMOUNT"), "Amount");
        assert_eq!(title_case("line2item"), "Line2Item");
    }

    #[test]
    fn test_subject() {
        assert_eq!(
            render_subject("Database Alert", &batch()),
            "Database Alert: 1 rows with status_id=3 detected"
        );
    }

    #[test]
    fn test_body_lists_every_column() {
        let body = render_body(&batch());

        assert!(body.starts_with("Database Alert Report\n========================\n\n"));
        assert!(body.contains("Schema: public\nTable: orders\n"));
        assert!(body.contains("Found 1 rows with status_id = 3 updated in the last 30 minutes.\n"));
        assert!(body.contains("\n1. Record ID: 42\n"));
        assert!(body.contains("   Updated At: 2024-05-01 10:30:00\n"));
        assert!(body.contains("   Status ID: 3\n"));
        assert!(body.contains("   Customer_Name: Acme\n"));
        assert!(body.contains("   Amount: 12.5\n"));
        assert!(body.contains(&format!("   {}\n", "-".repeat(40))));
        assert!(body.contains("\nGenerated at: "));
    }

    #[tokio::test]
    async fn test_recipients_include_cc() {
        let transport = RecordingTransport::default();
        let notifier = EmailNotifier::new(transport.clone(), &email_config("a@x.com, , b@x.com"));

        notifier.notify(&batch()).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients(), vec!["ops@example.com", "a@x.com", "b@x.com"]);
        assert_eq!(sent[0].from, "alerts@example.com");
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let transport = RecordingTransport::default();
        let notifier = EmailNotifier::new(transport.clone(), &email_config(""));
        let empty = NotificationBatch::new(batch().context, Vec::new());

        notifier.notify(&empty).await.unwrap();

        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_returned() {
        let transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };
        let notifier = EmailNotifier::new(transport, &email_config(""));

        let result = notifier.notify(&batch()).await;
        assert!(matches!(result, Err(SenderError::SendFailed(_))));
    }

    #[test]
    fn test_message_envelope_contains_cc() {
        let notifier = EmailNotifier::new(RecordingTransport::default(), &email_config("a@x.com, b@x.com"));
        let message = build_message(&notifier.compose(&batch())).unwrap();

        let envelope: Vec<String> = message.envelope().to().iter().map(|a| a.to_string()).collect();
        assert_eq!(envelope, vec!["ops@example.com", "a@x.com", "b@x.com"]);
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let notifier = EmailNotifier::new(RecordingTransport::default(), &email_config("not-an-address"));
        let result = build_message(&notifier.compose(&batch()));

        assert!(matches!(result, Err(SenderError::InvalidAddress { .. })));
    }
}
