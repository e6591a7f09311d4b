use std::sync::Arc;

use chrono::{DateTime, Utc};

use dupmerge_merge::{ColumnMapping, Dataset, MergeOperation, ProcessedResult, Side};

use crate::id::SessionId;

/// Per-user state between upload, configuration and processing.
///
/// Datasets and results are shared behind `Arc` so handing a snapshot to a
/// caller does not copy row data.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub dataset_a: Option<Arc<Dataset>>,
    pub dataset_b: Option<Arc<Dataset>>,
    pub column_mapping: Option<ColumnMapping>,
    pub merge_operations: Option<Vec<MergeOperation>>,
    pub result: Option<Arc<ProcessedResult>>,
    /// Bumped whenever a dataset, the mapping or the operations change.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            dataset_a: None,
            dataset_b: None,
            column_mapping: None,
            merge_operations: None,
            result: None,
            revision: 0,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn dataset(&self, side: Side) -> Option<&Arc<Dataset>> {
        match side {
            Side::A => self.dataset_a.as_ref(),
            Side::B => self.dataset_b.as_ref(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            has_dataset_a: self.dataset_a.is_some(),
            has_dataset_b: self.dataset_b.is_some(),
            has_mapping: self.column_mapping.is_some(),
            has_operations: self.merge_operations.as_ref().is_some_and(|ops| !ops.is_empty()),
            has_result: self.result.is_some(),
        }
    }

    /// Merge `update` in. Fields the update leaves unset keep their value.
    pub(crate) fn apply(&mut self, update: SessionUpdate, now: DateTime<Utc>) {
        if update.changes_inputs() {
            self.revision += 1;
        }
        if let Some(ds) = update.dataset_a {
            self.dataset_a = Some(ds);
        }
        if let Some(ds) = update.dataset_b {
            self.dataset_b = Some(ds);
        }
        if let Some(mapping) = update.column_mapping {
            self.column_mapping = Some(mapping);
        }
        if let Some(ops) = update.merge_operations {
            self.merge_operations = Some(ops);
        }
        if let Some(result) = update.result {
            self.result = result;
        }
        self.last_activity = update.last_activity.unwrap_or(now);
    }
}

/// Partial update for [`crate::SessionStore::update`].
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    dataset_a: Option<Arc<Dataset>>,
    dataset_b: Option<Arc<Dataset>>,
    column_mapping: Option<ColumnMapping>,
    merge_operations: Option<Vec<MergeOperation>>,
    result: Option<Option<Arc<ProcessedResult>>>,
    last_activity: Option<DateTime<Utc>>,
    if_revision: Option<u64>,
}

impl SessionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset(mut self, side: Side, dataset: Arc<Dataset>) -> Self {
        match side {
            Side::A => self.dataset_a = Some(dataset),
            Side::B => self.dataset_b = Some(dataset),
        }
        self
    }

    pub fn mapping(mut self, mapping: ColumnMapping) -> Self {
        self.column_mapping = Some(mapping);
        self
    }

    pub fn operations(mut self, operations: Vec<MergeOperation>) -> Self {
        self.merge_operations = Some(operations);
        self
    }

    pub fn result(mut self, result: Arc<ProcessedResult>) -> Self {
        self.result = Some(Some(result));
        self
    }

    pub fn clear_result(mut self) -> Self {
        self.result = Some(None);
        self
    }

    /// Stamp `last_activity` with `at` instead of the store's clock.
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity = Some(at);
        self
    }

    /// Only apply if the session is still at `revision`, i.e. nothing was
    /// uploaded or reconfigured since it was read. Otherwise the store
    /// rejects the update with [`crate::SessionError::Conflict`].
    pub fn if_revision(mut self, revision: u64) -> Self {
        self.if_revision = Some(revision);
        self
    }

    pub(crate) fn expected_revision(&self) -> Option<u64> {
        self.if_revision
    }

    fn changes_inputs(&self) -> bool {
        self.dataset_a.is_some()
            || self.dataset_b.is_some()
            || self.column_mapping.is_some()
            || self.merge_operations.is_some()
    }
}

/// What a session holds, without the data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub has_dataset_a: bool,
    pub has_dataset_b: bool,
    pub has_mapping: bool,
    pub has_operations: bool,
    pub has_result: bool,
}

impl SessionStatus {
    pub fn ready_to_process(&self) -> bool {
        self.has_dataset_a && self.has_dataset_b && self.has_mapping && self.has_operations
    }
}
