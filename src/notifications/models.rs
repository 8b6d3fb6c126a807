use crate::config::AppConfig;
use crate::db::Row;
use crate::db::row_source::display_table_name;

/// What a batch of alerts is about. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertContext {
    pub schema: String,
    pub table: String,
    pub status_id: i32,
    pub window_minutes: u32,
}

impl AlertContext {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            schema: config.database.schema.clone(),
            table: config.database.table.clone(),
            status_id: config.monitor.target_status_id,
            window_minutes: config.monitor.time_window_minutes,
        }
    }

    /// `table`, or `schema.table` outside the public schema.
    pub fn target(&self) -> String {
        display_table_name(&self.schema, &self.table)
    }
}

/// The new rows found in one cycle, most recently updated first.
#[derive(Debug, Clone)]
pub struct NotificationBatch {
    pub context: AlertContext,
    pub rows: Vec<Row>,
}

impl NotificationBatch {
    pub fn new(context: AlertContext, rows: Vec<Row>) -> Self {
        Self { context, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
