use tracing::{debug, error, info, warn};

use super::dedup::SeenSet;
use crate::config::MonitorConfig;
use crate::db::RowSource;
use crate::notifications::{AlertContext, NotificationBatch, NotificationService};

/// Result of one check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The row source failed; the cycle counted as zero rows.
    SourceFailed,
    NoNewRows,
    Notified { count: usize },
}

/// Runs check cycles: query, drop rows already notified, notify the rest.
///
/// The service owns the [`SeenSet`] and is driven through `&mut self`, so
/// cycles cannot overlap and the set needs no lock.
pub struct MonitorService {
    config: MonitorConfig,
    context: AlertContext,
    source: Box<dyn RowSource>,
    notifications: NotificationService,
    seen: SeenSet,
}

impl MonitorService {
    pub fn new(
        config: MonitorConfig,
        context: AlertContext,
        source: Box<dyn RowSource>,
        notifications: NotificationService,
    ) -> Self {
        Self {
            config,
            context,
            source,
            notifications,
            seen: SeenSet::new(),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// One cycle. Never fails: source and notifier errors are logged and the
    /// next scheduled cycle acts as the retry.
    pub async fn run_check(&mut self) -> CycleOutcome {
        info!(table = %self.source.describe_target(), "Running database check...");

        let rows = match self
            .source
            .fetch_recent(self.config.target_status_id, self.config.time_window_minutes)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Failed to fetch recent rows.");
                return CycleOutcome::SourceFailed;
            }
        };
        let candidates = rows.len();

        // Rows are marked seen here, before any notifier runs; a failed email
        // does not make them eligible again.
        let new_rows = self.seen.filter_new(rows);
        debug!(
            candidates,
            new = new_rows.len(),
            seen_total = self.seen.len(),
            "Deduplicated candidate rows."
        );

        if new_rows.is_empty() {
            info!("No new matching rows found.");
            return CycleOutcome::NoNewRows;
        }

        let count = new_rows.len();
        info!(count, "Found new rows matching criteria.");

        let batch = NotificationBatch::new(self.context.clone(), new_rows);
        if let Err(e) = self.notifications.dispatch(&batch).await {
            warn!(error = %e, "Some notifications failed for this cycle.");
        }

        CycleOutcome::Notified { count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Row, RowId, RowValue, SourceError};
    use crate::notifications::{Notifier, SenderError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays queued responses, then keeps returning an empty result.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Vec<Row>, SourceError>>>,
        fallback: Vec<Row>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<Row>, SourceError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                fallback: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl RowSource for ScriptedSource {
        async fn fetch_recent(&self, _: i32, _: u32) -> Result<Vec<Row>, SourceError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback.clone()))
        }

        fn describe_target(&self) -> String {
            "orders".to_string()
        }
    }

    #[derive(Clone, Default)]
    struct CollectingNotifier {
        batches: Arc<Mutex<Vec<Vec<RowId>>>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for CollectingNotifier {
        fn name(&self) -> &'static str {
            "collecting"
        }

        async fn notify(&self, batch: &NotificationBatch) -> Result<(), SenderError> {
            self.batches
                .lock()
                .unwrap()
                .push(batch.rows.iter().map(|r| r.id().clone()).collect());
            if self.fail {
                return Err(SenderError::SendFailed("smtp down".to_string()));
            }
            Ok(())
        }
    }

    fn row(id: i64) -> Row {
        Row::from_columns(vec![
            ("id".to_string(), RowValue::Integer(id)),
            ("status_id".to_string(), RowValue::Integer(3)),
        ])
        .unwrap()
    }

    fn monitor(source: ScriptedSource, notifier: CollectingNotifier) -> MonitorService {
        MonitorService::new(
            MonitorConfig {
                check_interval_minutes: 5,
                time_window_minutes: 30,
                target_status_id: 3,
                enable_console: false,
                enable_email: true,
            },
            AlertContext {
                schema: "public".to_string(),
                table: "orders".to_string(),
                status_id: 3,
                window_minutes: 30,
            },
            Box::new(source),
            NotificationService::new(vec![Box::new(notifier)]),
        )
    }

    fn connection_refused() -> SourceError {
        SourceError::Connection(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }

    #[tokio::test]
    async fn test_rows_in_consecutive_cycles_are_notified_once() {
        let notifier = CollectingNotifier::default();
        let mut service = monitor(
            ScriptedSource::new(vec![Ok(vec![row(2), row(1)]), Ok(vec![row(3), row(2), row(1)])]),
            notifier.clone(),
        );

        assert_eq!(service.run_check().await, CycleOutcome::Notified { count: 2 });
        assert_eq!(service.run_check().await, CycleOutcome::Notified { count: 1 });

        let batches = notifier.batches.lock().unwrap();
        assert_eq!(
            *batches,
            vec![
                vec![RowId::Integer(2), RowId::Integer(1)],
                vec![RowId::Integer(3)],
            ]
        );
    }

    #[tokio::test]
    async fn test_source_failure_skips_notifiers() {
        let notifier = CollectingNotifier::default();
        let mut service = monitor(
            ScriptedSource::new(vec![Err(connection_refused())]),
            notifier.clone(),
        );

        assert_eq!(service.run_check().await, CycleOutcome::SourceFailed);
        assert!(notifier.batches.lock().unwrap().is_empty());
        assert!(service.seen().is_empty());
    }

    #[tokio::test]
    async fn test_rows_after_a_failed_cycle_are_still_detected() {
        let notifier = CollectingNotifier::default();
        let mut service = monitor(
            ScriptedSource::new(vec![Err(connection_refused()), Ok(vec![row(9)])]),
            notifier.clone(),
        );

        service.run_check().await;
        assert_eq!(service.run_check().await, CycleOutcome::Notified { count: 1 });
    }

    #[tokio::test]
    async fn test_no_rows() {
        let notifier = CollectingNotifier::default();
        let mut service = monitor(ScriptedSource::new(vec![Ok(Vec::new())]), notifier.clone());

        assert_eq!(service.run_check().await, CycleOutcome::NoNewRows);
        assert!(notifier.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_notification_still_marks_rows_seen() {
        let notifier = CollectingNotifier {
            fail: true,
            ..Default::default()
        };
        let mut service = monitor(
            ScriptedSource::new(vec![Ok(vec![row(5)]), Ok(vec![row(5)])]),
            notifier.clone(),
        );

        assert_eq!(service.run_check().await, CycleOutcome::Notified { count: 1 });
        assert!(service.seen().contains(&RowId::Integer(5)));
        assert_eq!(service.run_check().await, CycleOutcome::NoNewRows);
        assert_eq!(notifier.batches.lock().unwrap().len(), 1);
    }
}
