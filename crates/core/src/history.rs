use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub query: String,
    pub query_id: String,
    pub tab_name: String,
    pub timestamp: DateTime<Utc>,
    pub execution_time: String,
    pub row_count: usize,
}

impl HistoryRecord {
    #[must_use]
    pub fn new(
        query: impl Into<String>,
        query_id: impl Into<String>,
        tab_name: impl Into<String>,
        execution_time: impl Into<String>,
        row_count: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            query_id: query_id.into(),
            tab_name: tab_name.into(),
            timestamp: Utc::now(),
            execution_time: execution_time.into(),
            row_count,
        }
    }

    #[must_use]
    pub fn time_label(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryHistory {
    entries: VecDeque<HistoryRecord>,
    max_entries: Option<usize>,
}

impl QueryHistory {
    #[must_use]
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    pub fn record(&mut self, record: HistoryRecord) {
        tracing::debug!(
            history_id = %record.id,
            query_id = %record.query_id,
            row_count = record.row_count,
            "recording query history"
        );
        self.entries.push_front(record);
        if let Some(max_entries) = self.max_entries {
            self.entries.truncate(max_entries);
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.entries.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.entries.front()
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&HistoryRecord> {
        self.entries.iter().find(|record| record.id == id)
    }

    #[must_use]
    pub fn nth(&self, index: usize) -> Option<&HistoryRecord> {
        self.entries.get(index)
    }

    pub fn clear(&mut self) {
        tracing::info!(entries_cleared = self.entries.len(), "clearing query history");
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
