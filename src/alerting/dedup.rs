use std::collections::HashSet;

use crate::db::{Row, RowId};

/// Identifiers of every row already notified in this process.
///
/// The set only grows; nothing is ever evicted. A row whose status leaves and
/// re-enters the target status keeps its identifier here and is not alerted on
/// again until the process restarts.
#[derive(Debug, Default)]
pub struct SeenSet {
    seen: HashSet<RowId>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the rows whose identifier has not been seen, in input order, and
    /// records them. A repeated identifier inside `rows` is kept only once.
    pub fn filter_new(&mut self, mut rows: Vec<Row>) -> Vec<Row> {
        rows.retain(|row| self.seen.insert(row.id().clone()));
        rows
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
