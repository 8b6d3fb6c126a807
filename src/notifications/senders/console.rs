use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::warn;

use super::{Notifier, SenderError};
use crate::notifications::models::NotificationBatch;

/// Prints alerts for humans watching the process. Write failures are logged
/// and swallowed.
pub struct ConsoleNotifier<W = io::Stdout> {
    out: Mutex<W>,
}

impl Default for ConsoleNotifier<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleNotifier<io::Stdout> {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl<W: Write + Send> ConsoleNotifier<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_batch(&self, text: &str) -> io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

pub fn render_console(batch: &NotificationBatch) -> String {
    let ctx = &batch.context;
    let mut text = format!(
        "\n🔔 ALERT: Found {} rows in {} with status_id={} updated in last {} minutes:\n",
        batch.len(),
        ctx.target(),
        ctx.status_id,
        ctx.window_minutes
    );
    for row in &batch.rows {
        text.push_str(&format!("  - ID: {}, Updated: {}", row.id(), row.updated_at()));
        for (name, value) in row.extra_columns() {
            text.push_str(&format!(", {name}={value}"));
        }
        text.push('\n');
    }
    text.push_str(&"-".repeat(50));
    text.push('\n');
    text
}

#[async_trait]
impl<W: Write + Send> Notifier for ConsoleNotifier<W> {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn notify(&self, batch: &NotificationBatch) -> Result<(), SenderError> {
        if batch.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.write_batch(&render_console(batch)) {
            warn!(error = %e, "Failed to write console notification.");
        }
        Ok(())
    }
}
