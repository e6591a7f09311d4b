//! Upload → configure → process → export, one session at a time.

use std::sync::Arc;

use dupmerge_merge::pipeline::{check_configuration, check_dataset};
use dupmerge_merge::{
    process, ColumnMapping, Dataset, MergeOperation, ProcessOptions, ProcessedResult, ResultSet,
    ResultTable, Side,
};

use crate::error::SessionError;
use crate::id::SessionId;
use crate::session::{SessionStatus, SessionUpdate};
use crate::store::SessionStore;

pub struct MergeWorkflow {
    store: SessionStore,
    options: ProcessOptions,
}

impl MergeWorkflow {
    pub fn new(store: SessionStore, options: ProcessOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn start(&self) -> SessionId {
        self.store.create().id
    }

    /// Attach one side's dataset. Any earlier result is dropped.
    pub fn upload(
        &self,
        id: &SessionId,
        side: Side,
        dataset: Dataset,
    ) -> Result<SessionStatus, SessionError> {
        check_dataset(side, &dataset, self.options.max_rows)?;
        log::debug!(
            "session {}: dataset {} uploaded ({} rows, {} columns)",
            id.short(),
            side.as_str(),
            dataset.len(),
            dataset.columns().len()
        );
        self.store
            .update(id, SessionUpdate::new().dataset(side, Arc::new(dataset)).clear_result())?;
        self.store.peek_status(id)
    }

    /// Set the key mapping and operations. Both datasets must be uploaded
    /// so the columns can be checked now rather than at processing time.
    pub fn configure(
        &self,
        id: &SessionId,
        mapping: ColumnMapping,
        operations: Vec<MergeOperation>,
    ) -> Result<(), SessionError> {
        let session = self.store.get(id)?;
        let a = session.dataset_a.ok_or(SessionError::MissingDataset(Side::A))?;
        let b = session.dataset_b.ok_or(SessionError::MissingDataset(Side::B))?;
        check_configuration(a.columns(), b.columns(), &mapping, &operations)?;
        self.store.update(
            id,
            SessionUpdate::new()
                .mapping(mapping)
                .operations(operations)
                .clear_result()
                .if_revision(session.revision),
        )
    }

    pub fn process(&self, id: &SessionId) -> Result<Arc<ProcessedResult>, SessionError> {
        let session = self.store.get(id)?;
        let a = session.dataset_a.ok_or(SessionError::MissingDataset(Side::A))?;
        let b = session.dataset_b.ok_or(SessionError::MissingDataset(Side::B))?;
        let mapping = session.column_mapping.ok_or(SessionError::MissingMapping)?;
        let operations = match session.merge_operations {
            Some(ops) if !ops.is_empty() => ops,
            _ => return Err(SessionError::MissingOperations),
        };

        let started = self.store.now();
        let result = match process(&a, &b, &mapping, &operations, &self.options, started) {
            Ok(result) => Arc::new(result),
            Err(e) => {
                log::warn!("session {}: processing failed: {e}", id.short());
                return Err(e.into());
            }
        };

        // Stamp with the start time; matching a large pair can take a while.
        let update =
            SessionUpdate::new().result(Arc::clone(&result)).at(started).if_revision(session.revision);
        if let Err(e) = self.store.update(id, update) {
            if e == SessionError::Conflict {
                log::info!("session {}: inputs changed during processing; result dropped", id.short());
            }
            return Err(e);
        }
        Ok(result)
    }

    pub fn status(&self, id: &SessionId) -> Result<SessionStatus, SessionError> {
        Ok(self.store.get(id)?.status())
    }

    pub fn result(&self, id: &SessionId) -> Result<Arc<ProcessedResult>, SessionError> {
        self.store.get(id)?.result.ok_or(SessionError::MissingResult)
    }

    /// One result set as a table. The session stays alive; see [`MergeWorkflow::finish`].
    pub fn export(&self, id: &SessionId, set: ResultSet) -> Result<ResultTable, SessionError> {
        Ok(self.result(id)?.table(set))
    }

    /// Drop the session once its results have been taken.
    pub fn finish(&self, id: &SessionId) -> bool {
        self.store.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::timer::ManualTimer;
    use chrono::{DateTime, Utc};
    use dupmerge_merge::{MergeError, Operator, Value};
    use parking_lot::Mutex;
    use std::time::Duration;

    type Hook = Box<dyn FnOnce() + Send>;

    /// Runs a hook on the `n`th clock read after it is set, standing in for
    /// a second request that lands while this one is mid-flight.
    struct HookClock {
        inner: ManualClock,
        hook: Mutex<Option<(usize, Hook)>>,
    }

    impl HookClock {
        fn on_read(&self, n: usize, hook: Hook) {
            *self.hook.lock() = Some((n, hook));
        }
    }

    impl Clock for HookClock {
        fn now(&self) -> DateTime<Utc> {
            let due = {
                let mut slot = self.hook.lock();
                match slot.as_mut() {
                    Some((n, _)) if *n > 1 => {
                        *n -= 1;
                        None
                    }
                    Some(_) => slot.take().map(|(_, hook)| hook),
                    None => None,
                }
            };
            if let Some(hook) = due {
                hook();
            }
            self.inner.now()
        }
    }

    fn hooked_workflow() -> (MergeWorkflow, Arc<HookClock>) {
        let inner = ManualClock::new(Utc::now());
        let clock = Arc::new(HookClock { inner: inner.clone(), hook: Mutex::new(None) });
        let timer = Arc::new(ManualTimer::new(inner));
        let store = SessionStore::new(Duration::from_secs(900), clock.clone(), timer);
        (MergeWorkflow::new(store, ProcessOptions::default()), clock)
    }

    fn workflow() -> MergeWorkflow {
        let clock = ManualClock::new(Utc::now());
        let timer = Arc::new(ManualTimer::new(clock.clone()));
        let store = SessionStore::new(Duration::from_secs(900), Arc::new(clock), timer);
        MergeWorkflow::new(store, ProcessOptions::default())
    }

    fn people(rows: &[(&str, &str)]) -> Dataset {
        Dataset::from_rows(
            &["email", "score"],
            rows.iter().map(|(e, s)| vec![Value::from(*e), Value::from(*s)]),
        )
        .unwrap()
    }

    fn loaded(wf: &MergeWorkflow) -> SessionId {
        let id = wf.start();
        wf.upload(&id, Side::A, people(&[("a@x", "1"), ("b@x", "2")])).unwrap();
        wf.upload(&id, Side::B, people(&[("A@X", "10"), ("c@x", "3")])).unwrap();
        id
    }

    #[test]
    fn full_flow() {
        let wf = workflow();
        let id = loaded(&wf);
        wf.configure(
            &id,
            ColumnMapping::new("email", "email"),
            vec![MergeOperation::column("score", Operator::Sum)],
        )
        .unwrap();
        assert!(wf.status(&id).unwrap().ready_to_process());

        let result = wf.process(&id).unwrap();
        assert_eq!(result.stats.duplicate_count, 1);
        assert_eq!(result.merged[0]["score"], Value::Number(11.0));
        assert!(wf.status(&id).unwrap().has_result);

        let table = wf.export(&id, ResultSet::UniqueB).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert!(wf.finish(&id));
        assert_eq!(wf.status(&id).unwrap_err(), SessionError::NotFound);
    }

    #[test]
    fn upload_rejects_empty_dataset() {
        let wf = workflow();
        let id = wf.start();
        let err = wf.upload(&id, Side::B, people(&[])).unwrap_err();
        assert_eq!(err, SessionError::Merge(MergeError::EmptyDataset(Side::B)));
    }

    #[test]
    fn configure_needs_both_datasets() {
        let wf = workflow();
        let id = wf.start();
        wf.upload(&id, Side::A, people(&[("a@x", "1")])).unwrap();
        let err = wf
            .configure(&id, ColumnMapping::new("email", "email"), vec![MergeOperation::MergeAll])
            .unwrap_err();
        assert_eq!(err, SessionError::MissingDataset(Side::B));
    }

    #[test]
    fn configure_checks_columns() {
        let wf = workflow();
        let id = loaded(&wf);
        let err = wf
            .configure(&id, ColumnMapping::new("email", "mail"), vec![MergeOperation::MergeAll])
            .unwrap_err();
        assert!(matches!(err, SessionError::Merge(MergeError::UnknownColumn { side: Side::B, .. })));
    }

    #[test]
    fn process_reports_missing_configuration() {
        let wf = workflow();
        let id = loaded(&wf);
        assert_eq!(wf.process(&id).unwrap_err(), SessionError::MissingMapping);
        assert_eq!(wf.result(&id).unwrap_err(), SessionError::MissingResult);
    }

    #[test]
    fn reupload_clears_result() {
        let wf = workflow();
        let id = loaded(&wf);
        wf.configure(&id, ColumnMapping::new("email", "email"), vec![MergeOperation::MergeAll])
            .unwrap();
        wf.process(&id).unwrap();
        wf.upload(&id, Side::A, people(&[("z@x", "9")])).unwrap();
        assert!(!wf.status(&id).unwrap().has_result);
        assert_eq!(wf.export(&id, ResultSet::Merged).unwrap_err(), SessionError::MissingResult);
    }

    #[test]
    fn upload_during_process_discards_result() {
        let (wf, clock) = hooked_workflow();
        let id = loaded(&wf);
        wf.configure(&id, ColumnMapping::new("email", "email"), vec![MergeOperation::MergeAll])
            .unwrap();

        // process reads the clock in `get`, then for its start time. The
        // re-upload lands between the two, after the session was read.
        let (store, target) = (wf.store().clone(), id.clone());
        clock.on_read(
            2,
            Box::new(move || {
                let replacement = Arc::new(people(&[("zzz@x", "7")]));
                store
                    .update(&target, SessionUpdate::new().dataset(Side::A, replacement).clear_result())
                    .unwrap();
            }),
        );

        assert_eq!(wf.process(&id).unwrap_err(), SessionError::Conflict);
        let session = wf.store().get(&id).unwrap();
        assert!(session.result.is_none());
        assert_eq!(session.dataset_a.unwrap().records()[0]["email"], Value::from("zzz@x"));

        // A fresh run sees the new data.
        let result = wf.process(&id).unwrap();
        assert_eq!(result.stats.duplicate_count, 0);
        assert!(wf.status(&id).unwrap().has_result);
    }

    #[test]
    fn upload_during_configure_is_not_overwritten() {
        let (wf, clock) = hooked_workflow();
        let id = loaded(&wf);

        // configure reads the clock in `get`, then in `update`.
        let (store, target) = (wf.store().clone(), id.clone());
        clock.on_read(
            2,
            Box::new(move || {
                let no_email =
                    Dataset::from_rows(&["score"], vec![vec![Value::from("1")]]).unwrap();
                store
                    .update(&target, SessionUpdate::new().dataset(Side::B, Arc::new(no_email)))
                    .unwrap();
            }),
        );

        let err = wf
            .configure(&id, ColumnMapping::new("email", "email"), vec![MergeOperation::MergeAll])
            .unwrap_err();
        assert_eq!(err, SessionError::Conflict);
        assert!(!wf.status(&id).unwrap().has_mapping);
    }
}
