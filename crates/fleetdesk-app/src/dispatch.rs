// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{
    ActionBusy, ActionKind, ActionTracker, Collection, CollectionEndpoint, NormalizeIssue,
    NormalizedBatch, RemoteError, RowId, RowPatch, RowRecord, TableController, TokenSource,
    ViewLifetime, normalize_record, normalize_rows, writable_fields,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Busy(#[from] ActionBusy),
    #[error("not signed in -- sign in first; nothing was sent")]
    Deferred,
    #[error("{0}")]
    Invalid(String),
    #[error("row {0} is not loaded -- refresh with r and retry")]
    UnknownRow(RowId),
    #[error("nothing selected -- select rows with space and retry")]
    NothingSelected,
    #[error("{operation} {collection} failed: {source}")]
    Remote {
        operation: &'static str,
        collection: &'static str,
        source: RemoteError,
    },
    #[error("{operation} {collection}: server response is not a record ({issue})")]
    Malformed {
        operation: &'static str,
        collection: &'static str,
        issue: NormalizeIssue,
    },
}

impl ActionError {
    pub fn notice(&self) -> Notice {
        match self {
            Self::Deferred => Notice::info(self.to_string()),
            _ => Notice::error(self.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Deferred,
    Loaded(NormalizedBatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    pub id: RowId,
    pub key: String,
}

impl DeleteTarget {
    pub fn of(collection: Collection, row: &RowRecord) -> Self {
        Self {
            id: row.id,
            key: row.remote_key(collection),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteReport {
    pub deleted: Vec<RowId>,
    // The failing id, then every id never attempted.
    pub failed: Vec<RowId>,
    pub error: Option<RemoteError>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn notice(&self, collection: Collection) -> Notice {
        let deleted = self.deleted.len();
        if self.is_complete() {
            return Notice::success(format!(
                "deleted {deleted} {} from {}",
                plural(deleted, "row", "rows"),
                collection.label()
            ));
        }
        let failed = self
            .failed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let reason = self
            .error
            .as_ref()
            .map_or_else(|| "unknown error".to_owned(), ToString::to_string);
        Notice::error(format!(
            "deleted {deleted}, not deleted: {failed} -- {reason}"
        ))
    }
}

fn plural(count: usize, one: &'static str, many: &'static str) -> &'static str {
    if count == 1 { one } else { many }
}

#[derive(Clone)]
pub struct RemoteActions {
    collection: Collection,
    endpoint: Arc<dyn CollectionEndpoint>,
    tokens: Arc<dyn TokenSource>,
}

impl std::fmt::Debug for RemoteActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteActions")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl RemoteActions {
    pub fn new(
        collection: Collection,
        endpoint: Arc<dyn CollectionEndpoint>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            collection,
            endpoint,
            tokens,
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn has_token(&self) -> bool {
        self.token().is_some()
    }

    fn token(&self) -> Option<String> {
        self.tokens
            .bearer_token()
            .filter(|token| !token.trim().is_empty())
    }

    fn require_token(&self) -> Result<String, ActionError> {
        self.token().ok_or(ActionError::Deferred)
    }

    fn remote_error(&self, operation: &'static str, source: RemoteError) -> ActionError {
        ActionError::Remote {
            operation,
            collection: self.collection.as_str(),
            source,
        }
    }

    fn record_from(&self, operation: &'static str, value: Value) -> Result<RowRecord, ActionError> {
        normalize_record(self.collection, 0, value)
            .map(|(row, issues)| {
                for issue in issues {
                    tracing::warn!(collection = self.collection.as_str(), "{issue}");
                }
                row
            })
            .map_err(|issue| ActionError::Malformed {
                operation,
                collection: self.collection.as_str(),
                issue,
            })
    }

    pub fn fetch_rows(&self) -> Result<FetchOutcome, ActionError> {
        let Some(token) = self.token() else {
            debug!(collection = self.collection.as_str(), "no token; fetch deferred");
            return Ok(FetchOutcome::Deferred);
        };
        let records = self
            .endpoint
            .list(self.collection, &token)
            .map_err(|source| self.remote_error("load", source))?;
        Ok(FetchOutcome::Loaded(normalize_rows(self.collection, records)))
    }

    pub fn get_row(&self, key: &str) -> Result<RowRecord, ActionError> {
        let token = self.require_token()?;
        let record = self
            .endpoint
            .get(self.collection, key, &token)
            .map_err(|source| self.remote_error("view", source))?;
        self.record_from("view", record)
    }

    // Sequential; stops at the first failure.
    pub fn delete_keys(&self, targets: &[DeleteTarget]) -> Result<DeleteReport, ActionError> {
        let token = self.require_token()?;
        let mut report = DeleteReport::default();

        for (position, target) in targets.iter().enumerate() {
            match self.endpoint.delete(self.collection, &target.key, &token) {
                Ok(()) => {
                    debug!(
                        collection = self.collection.as_str(),
                        id = target.id.get(),
                        "row deleted"
                    );
                    report.deleted.push(target.id);
                }
                Err(remote) => {
                    error!(
                        collection = self.collection.as_str(),
                        id = target.id.get(),
                        error = %remote,
                        "delete failed; remaining rows not attempted"
                    );
                    report
                        .failed
                        .extend(targets[position..].iter().map(|target| target.id));
                    report.error = Some(remote);
                    break;
                }
            }
        }
        Ok(report)
    }

    // An unusable response falls back to the merged record.
    pub fn update_row(&self, row: &RowRecord, patch: &RowPatch) -> Result<RowRecord, ActionError> {
        patch
            .validate(self.collection)
            .map_err(|error| ActionError::Invalid(format!("{error:#}")))?;
        let token = self.require_token()?;
        let merged = patch.merged_into(&row.source);
        let response = self
            .endpoint
            .update(
                self.collection,
                &row.remote_key(self.collection),
                &writable_fields(&merged),
                &token,
            )
            .map_err(|source| self.remote_error("update", source))?;

        match normalize_record(self.collection, 0, response) {
            Ok((updated, _)) if updated.id == row.id => Ok(updated),
            _ => {
                debug!(
                    collection = self.collection.as_str(),
                    id = row.id.get(),
                    "update response unusable; using merged record"
                );
                self.record_from("update", Value::Object(merged))
            }
        }
    }

    pub fn create_row(&self, patch: &RowPatch) -> Result<RowRecord, ActionError> {
        patch
            .validate_for_create(self.collection)
            .map_err(|error| ActionError::Invalid(format!("{error:#}")))?;
        let token = self.require_token()?;
        let response = self
            .endpoint
            .create(self.collection, &patch.to_record(), &token)
            .map_err(|source| self.remote_error("create", source))?;
        self.record_from("create", response)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Deferred,
    Loaded { rows: usize, issues: usize },
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteStatus {
    Declined,
    Finished(DeleteReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub collection: Collection,
    pub ids: Vec<RowId>,
}

impl Confirmation {
    pub fn prompt(&self) -> String {
        match self.ids.as_slice() {
            [id] => format!("delete row {id} from {}? (y/n)", self.collection.label()),
            ids => format!(
                "delete {} rows from {}? (y/n)",
                ids.len(),
                self.collection.label()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub confirmation: Confirmation,
    pub targets: Vec<DeleteTarget>,
}

// A validated save with its slot reserved; `run` may happen on a worker.
#[derive(Debug, Clone)]
pub struct SaveJob {
    pub kind: ActionKind,
    row: Option<RowRecord>,
    patch: RowPatch,
}

impl SaveJob {
    pub fn run(&self, remote: &RemoteActions) -> Result<RowRecord, ActionError> {
        match &self.row {
            Some(row) => remote.update_row(row, &self.patch),
            None => remote.create_row(&self.patch),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    remote: RemoteActions,
    tracker: ActionTracker,
}

impl ActionDispatcher {
    pub fn new(remote: RemoteActions) -> Self {
        Self {
            remote,
            tracker: ActionTracker::default(),
        }
    }

    pub fn remote(&self) -> &RemoteActions {
        &self.remote
    }

    pub fn tracker(&self) -> &ActionTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ActionTracker {
        &mut self.tracker
    }

    fn start(
        &mut self,
        kind: ActionKind,
        notify: &mut impl FnMut(Notice),
    ) -> Result<(), ActionError> {
        self.tracker.begin(kind).map_err(|busy| {
            let error = ActionError::from(busy);
            notify(error.notice());
            error
        })
    }

    fn refuse(error: ActionError, notify: &mut impl FnMut(Notice)) -> ActionError {
        notify(error.notice());
        error
    }

    // Ok(false): no token, nothing to send.
    pub fn begin_fetch(&mut self, mut notify: impl FnMut(Notice)) -> Result<bool, ActionError> {
        if !self.remote.has_token() {
            debug!(
                collection = self.remote.collection().as_str(),
                "no token; fetch deferred"
            );
            return Ok(false);
        }
        self.start(ActionKind::Fetch, &mut notify)?;
        Ok(true)
    }

    pub fn finish_fetch(
        &mut self,
        controller: &mut TableController,
        lifetime: &ViewLifetime,
        result: Result<FetchOutcome, ActionError>,
        mut notify: impl FnMut(Notice),
    ) -> Result<FetchStatus, ActionError> {
        let collection = self.remote.collection();
        let batch = match result {
            Ok(FetchOutcome::Loaded(batch)) => batch,
            Ok(FetchOutcome::Deferred) => {
                self.tracker.settle(ActionKind::Fetch, true);
                self.tracker.dismiss(ActionKind::Fetch);
                return Ok(FetchStatus::Deferred);
            }
            Err(error) => {
                self.tracker.settle(ActionKind::Fetch, false);
                return Err(report_failure(collection, ActionKind::Fetch, error, &mut notify));
            }
        };
        self.tracker.settle(ActionKind::Fetch, true);

        if !lifetime.is_mounted() {
            debug!(
                collection = collection.as_str(),
                "view unmounted; fetch result discarded"
            );
            return Ok(FetchStatus::Discarded);
        }

        let rows = batch.rows.len();
        let issues = batch.issues.len();
        controller.load(batch.rows);
        info!(collection = collection.as_str(), rows, issues, "rows loaded");
        if issues > 0 {
            notify(Notice::info(format!(
                "loaded {rows} rows; {issues} {} adjusted or skipped (see log)",
                plural(issues, "record", "records")
            )));
        }
        Ok(FetchStatus::Loaded { rows, issues })
    }

    pub fn fetch_all(
        &mut self,
        controller: &mut TableController,
        lifetime: &ViewLifetime,
        mut notify: impl FnMut(Notice),
    ) -> Result<FetchStatus, ActionError> {
        if !self.begin_fetch(&mut notify)? {
            return Ok(FetchStatus::Deferred);
        }
        let result = self.remote.fetch_rows();
        self.finish_fetch(controller, lifetime, result, notify)
    }

    pub fn request_delete(
        &mut self,
        controller: &TableController,
        ids: &[RowId],
        mut notify: impl FnMut(Notice),
    ) -> Result<PendingDelete, ActionError> {
        let targets = resolve_targets(controller, ids)
            .map_err(|error| Self::refuse(error, &mut notify))?;
        if !self.remote.has_token() {
            return Err(Self::refuse(ActionError::Deferred, &mut notify));
        }
        if let Err(busy) = self.tracker.request_confirmation(ActionKind::Delete) {
            return Err(Self::refuse(busy.into(), &mut notify));
        }
        Ok(PendingDelete {
            confirmation: Confirmation {
                collection: self.remote.collection(),
                ids: targets.iter().map(|target| target.id).collect(),
            },
            targets,
        })
    }

    pub fn cancel_delete(&mut self) {
        self.tracker.cancel(ActionKind::Delete);
        debug!(
            collection = self.remote.collection().as_str(),
            "delete declined"
        );
    }

    pub fn begin_delete(&mut self, mut notify: impl FnMut(Notice)) -> Result<(), ActionError> {
        self.start(ActionKind::Delete, &mut notify)
    }

    pub fn finish_delete(
        &mut self,
        controller: &mut TableController,
        result: Result<DeleteReport, ActionError>,
        notify: impl FnMut(Notice),
    ) -> Result<DeleteReport, ActionError> {
        match &result {
            Ok(report) => {
                controller.remove_rows(&report.deleted);
                self.tracker.settle(ActionKind::Delete, report.is_complete());
            }
            Err(_) => self.tracker.settle(ActionKind::Delete, false),
        }
        Self::report_delete(self.remote.collection(), result, notify)
    }

    // Also used when the table that started the delete is gone.
    pub fn report_delete(
        collection: Collection,
        result: Result<DeleteReport, ActionError>,
        mut notify: impl FnMut(Notice),
    ) -> Result<DeleteReport, ActionError> {
        match result {
            Ok(report) => {
                info!(
                    collection = collection.as_str(),
                    deleted = report.deleted.len(),
                    failed = report.failed.len(),
                    "delete finished"
                );
                notify(report.notice(collection));
                Ok(report)
            }
            Err(error) => Err(report_failure(
                collection,
                ActionKind::Delete,
                error,
                &mut notify,
            )),
        }
    }

    pub fn delete_one(
        &mut self,
        controller: &mut TableController,
        id: RowId,
        confirm: impl FnOnce(&Confirmation) -> bool,
        notify: impl FnMut(Notice),
    ) -> Result<DeleteStatus, ActionError> {
        self.delete_many(controller, &[id], confirm, notify)
    }

    pub fn delete_many(
        &mut self,
        controller: &mut TableController,
        ids: &[RowId],
        confirm: impl FnOnce(&Confirmation) -> bool,
        mut notify: impl FnMut(Notice),
    ) -> Result<DeleteStatus, ActionError> {
        let pending = self.request_delete(controller, ids, &mut notify)?;
        if !confirm(&pending.confirmation) {
            self.cancel_delete();
            return Ok(DeleteStatus::Declined);
        }
        self.begin_delete(&mut notify)?;
        let result = self.remote.delete_keys(&pending.targets);
        self.finish_delete(controller, result, notify)
            .map(DeleteStatus::Finished)
    }

    // `target` None means a new row.
    pub fn begin_save(
        &mut self,
        controller: &TableController,
        target: Option<RowId>,
        patch: &RowPatch,
        mut notify: impl FnMut(Notice),
    ) -> Result<SaveJob, ActionError> {
        let collection = self.remote.collection();
        let validated = match target {
            Some(_) => patch.validate(collection),
            None => patch.validate_for_create(collection),
        };
        if let Err(error) = validated {
            return Err(Self::refuse(
                ActionError::Invalid(format!("{error:#}")),
                &mut notify,
            ));
        }
        let row = match target {
            Some(id) => match controller.row(id) {
                Some(row) => Some(row.clone()),
                None => return Err(Self::refuse(ActionError::UnknownRow(id), &mut notify)),
            },
            None => None,
        };
        if !self.remote.has_token() {
            return Err(Self::refuse(ActionError::Deferred, &mut notify));
        }
        let kind = if row.is_some() {
            ActionKind::Update
        } else {
            ActionKind::Create
        };
        self.start(kind, &mut notify)?;
        Ok(SaveJob {
            kind,
            row,
            patch: patch.clone(),
        })
    }

    pub fn finish_save(
        &mut self,
        controller: &mut TableController,
        kind: ActionKind,
        result: Result<RowRecord, ActionError>,
        notify: impl FnMut(Notice),
    ) -> Result<RowId, ActionError> {
        let result = result.map(|row| {
            let id = row.id;
            if kind == ActionKind::Create {
                controller.insert_row(row);
            } else {
                controller.replace_row(row);
            }
            id
        });
        self.tracker.settle(kind, result.is_ok());
        Self::report_save(self.remote.collection(), kind, result, notify)
    }

    // Also used when the table that started the save is gone.
    pub fn report_save(
        collection: Collection,
        kind: ActionKind,
        result: Result<RowId, ActionError>,
        mut notify: impl FnMut(Notice),
    ) -> Result<RowId, ActionError> {
        match result {
            Ok(id) => {
                info!(
                    collection = collection.as_str(),
                    id = id.get(),
                    action = kind.as_str(),
                    "row saved"
                );
                let verb = if kind == ActionKind::Create {
                    "created"
                } else {
                    "updated"
                };
                notify(Notice::success(format!(
                    "{verb} row {id} in {}",
                    collection.label()
                )));
                Ok(id)
            }
            Err(error) => Err(report_failure(collection, kind, error, &mut notify)),
        }
    }

    pub fn update_one(
        &mut self,
        controller: &mut TableController,
        id: RowId,
        patch: &RowPatch,
        mut notify: impl FnMut(Notice),
    ) -> Result<RowId, ActionError> {
        let job = self.begin_save(controller, Some(id), patch, &mut notify)?;
        let result = job.run(&self.remote);
        self.finish_save(controller, job.kind, result, notify)
    }

    pub fn create_one(
        &mut self,
        controller: &mut TableController,
        patch: &RowPatch,
        mut notify: impl FnMut(Notice),
    ) -> Result<RowId, ActionError> {
        let job = self.begin_save(controller, None, patch, &mut notify)?;
        let result = job.run(&self.remote);
        self.finish_save(controller, job.kind, result, notify)
    }
}

fn report_failure(
    collection: Collection,
    kind: ActionKind,
    error: ActionError,
    notify: &mut impl FnMut(Notice),
) -> ActionError {
    if error == ActionError::Deferred {
        debug!(action = kind.as_str(), "deferred until sign-in");
    } else {
        error!(
            action = kind.as_str(),
            collection = collection.as_str(),
            "{error}"
        );
    }
    notify(error.notice());
    error
}

fn resolve_targets(
    controller: &TableController,
    ids: &[RowId],
) -> Result<Vec<DeleteTarget>, ActionError> {
    if ids.is_empty() {
        return Err(ActionError::NothingSelected);
    }
    ids.iter()
        .map(|id| {
            controller
                .row(*id)
                .map(|row| DeleteTarget::of(controller.collection(), row))
                .ok_or(ActionError::UnknownRow(*id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        ActionDispatcher, ActionError, DeleteReport, DeleteStatus, FetchStatus, Notice,
        NoticeLevel, RemoteActions,
    };
    use crate::{
        ActionKind, ActionPhase, Collection, CollectionEndpoint, RemoteError, RowId, RowPatch,
        Session, TableController, ViewLifetime,
    };
    use serde_json::{Map, Value, json};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeEndpoint {
        records: Vec<Value>,
        failing_keys: Vec<String>,
        fail_list: bool,
        fail_update: bool,
        echo_updates: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeEndpoint {
        fn roles(count: i64) -> Self {
            Self {
                records: (1..=count)
                    .map(|id| json!({ "id": id, "name": format!("role {id}") }))
                    .collect(),
                ..Self::default()
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().expect("calls lock").push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn server_error() -> RemoteError {
            RemoteError::Status {
                status: 500,
                message: "internal error".to_owned(),
            }
        }
    }

    impl CollectionEndpoint for FakeEndpoint {
        fn list(&self, collection: Collection, token: &str) -> Result<Vec<Value>, RemoteError> {
            assert_eq!(token, "jwt");
            self.record(format!("list {}", collection.as_str()));
            if self.fail_list {
                return Err(Self::server_error());
            }
            Ok(self.records.clone())
        }

        fn get(&self, collection: Collection, key: &str, _: &str) -> Result<Value, RemoteError> {
            self.record(format!("get {} {key}", collection.as_str()));
            self.records
                .iter()
                .find(|record| record["id"].to_string() == key)
                .cloned()
                .ok_or(RemoteError::Status {
                    status: 404,
                    message: "Not Found".to_owned(),
                })
        }

        fn create(
            &self,
            collection: Collection,
            record: &Map<String, Value>,
            _: &str,
        ) -> Result<Value, RemoteError> {
            self.record(format!("create {}", collection.as_str()));
            let mut created = record.clone();
            created.insert("id".to_owned(), json!(99));
            Ok(Value::Object(created))
        }

        fn update(
            &self,
            collection: Collection,
            key: &str,
            record: &Map<String, Value>,
            _: &str,
        ) -> Result<Value, RemoteError> {
            self.record(format!("update {} {key}", collection.as_str()));
            assert!(!record.contains_key("id"), "id must not be sent");
            if self.fail_update {
                return Err(Self::server_error());
            }
            if !self.echo_updates {
                return Ok(json!({ "ok": true }));
            }
            let mut echoed = record.clone();
            echoed.insert("id".to_owned(), json!(key.parse::<i64>().expect("numeric key")));
            echoed.insert("description".to_owned(), json!("from server"));
            Ok(Value::Object(echoed))
        }

        fn delete(&self, collection: Collection, key: &str, _: &str) -> Result<(), RemoteError> {
            self.record(format!("delete {} {key}", collection.as_str()));
            if self.failing_keys.iter().any(|failing| failing == key) {
                return Err(Self::server_error());
            }
            Ok(())
        }
    }

    fn dispatcher(endpoint: &Arc<FakeEndpoint>, session: &Arc<Session>) -> ActionDispatcher {
        ActionDispatcher::new(RemoteActions::new(
            Collection::Roles,
            endpoint.clone(),
            session.clone(),
        ))
    }

    fn signed_in() -> Arc<Session> {
        Arc::new(Session::with_token("jwt"))
    }

    fn loaded(
        endpoint: &Arc<FakeEndpoint>,
        session: &Arc<Session>,
    ) -> (ActionDispatcher, TableController) {
        let mut dispatcher = dispatcher(endpoint, session);
        let mut table = TableController::new(Collection::Roles, 10);
        dispatcher
            .fetch_all(&mut table, &ViewLifetime::mounted(), |_| {})
            .expect("initial fetch");
        (dispatcher, table)
    }

    fn ids(table: &TableController) -> Vec<i64> {
        table.rows().iter().map(|row| row.id.get()).collect()
    }

    #[test]
    fn fetch_without_token_is_deferred_and_sends_nothing() {
        let endpoint = Arc::new(FakeEndpoint::roles(3));
        let session = Arc::new(Session::new());
        let mut dispatcher = dispatcher(&endpoint, &session);
        let mut table = TableController::new(Collection::Roles, 10);
        let lifetime = ViewLifetime::mounted();

        let status = dispatcher
            .fetch_all(&mut table, &lifetime, |_| {})
            .expect("deferred is not an error");
        assert_eq!(status, FetchStatus::Deferred);
        assert!(endpoint.calls().is_empty());
        assert_eq!(table.total_count(), 0);
        assert_eq!(dispatcher.tracker().phase(ActionKind::Fetch), ActionPhase::Idle);

        session.sign_in("jwt");
        let status = dispatcher
            .fetch_all(&mut table, &lifetime, |_| {})
            .expect("signed-in fetch");
        assert_eq!(status, FetchStatus::Loaded { rows: 3, issues: 0 });
        assert_eq!(endpoint.calls(), vec!["list roles"]);
        assert_eq!(ids(&table), vec![1, 2, 3]);
    }

    #[test]
    fn fetch_after_unmount_does_not_touch_the_controller() {
        let endpoint = Arc::new(FakeEndpoint::roles(3));
        let mut dispatcher = dispatcher(&endpoint, &signed_in());
        let mut table = TableController::new(Collection::Roles, 10);
        let lifetime = ViewLifetime::mounted();
        lifetime.unmount();

        let status = dispatcher
            .fetch_all(&mut table, &lifetime, |_| {})
            .expect("discard is not an error");
        assert_eq!(status, FetchStatus::Discarded);
        assert_eq!(table.total_count(), 0);
    }

    #[test]
    fn failed_fetch_keeps_the_previous_rows() {
        let endpoint = Arc::new(FakeEndpoint::roles(2));
        let session = signed_in();
        let (_, mut table) = loaded(&endpoint, &session);

        let failing = Arc::new(FakeEndpoint {
            fail_list: true,
            ..FakeEndpoint::default()
        });
        let mut dispatcher = dispatcher(&failing, &session);
        let mut notices = Vec::new();
        let error = dispatcher
            .fetch_all(&mut table, &ViewLifetime::mounted(), |notice| {
                notices.push(notice)
            })
            .expect_err("list failure surfaces");

        assert!(matches!(error, ActionError::Remote { operation: "load", .. }));
        assert_eq!(ids(&table), vec![1, 2]);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(notices[0].message.contains("server error (500)"));
        assert_eq!(
            dispatcher.tracker().phase(ActionKind::Fetch),
            ActionPhase::Failed
        );
    }

    #[test]
    fn partial_delete_removes_only_confirmed_rows() {
        let endpoint = Arc::new(FakeEndpoint {
            failing_keys: vec!["7".to_owned()],
            ..FakeEndpoint::roles(8)
        });
        let session = signed_in();
        let (mut dispatcher, mut table) = loaded(&endpoint, &session);
        table.toggle_row_selected(RowId::new(3));
        table.toggle_row_selected(RowId::new(7));
        let selected = table.selected_ids().iter().copied().collect::<Vec<_>>();

        let mut prompts = Vec::new();
        let mut notices = Vec::new();
        let status = dispatcher
            .delete_many(
                &mut table,
                &selected,
                |confirmation| {
                    prompts.push(confirmation.prompt());
                    true
                },
                |notice| notices.push(notice),
            )
            .expect("partial delete is reported, not raised");

        let DeleteStatus::Finished(report) = status else {
            panic!("delete was confirmed");
        };
        assert_eq!(report.deleted, vec![RowId::new(3)]);
        assert_eq!(report.failed, vec![RowId::new(7)]);
        assert_eq!(ids(&table), vec![1, 2, 4, 5, 6, 7, 8]);
        assert!(table.selected_ids().is_empty());
        assert_eq!(prompts, vec!["delete 2 rows from roles? (y/n)"]);
        assert_eq!(
            endpoint.calls(),
            vec!["list roles", "delete roles 3", "delete roles 7"]
        );
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(notices[0].message.contains("not deleted: 7"));
        assert_eq!(
            dispatcher.tracker().phase(ActionKind::Delete),
            ActionPhase::Failed
        );
    }

    #[test]
    fn delete_stops_at_the_first_failure() {
        let endpoint = Arc::new(FakeEndpoint {
            failing_keys: vec!["3".to_owned()],
            ..FakeEndpoint::roles(4)
        });
        let (mut dispatcher, mut table) = loaded(&endpoint, &signed_in());

        let status = dispatcher
            .delete_many(
                &mut table,
                &[RowId::new(2), RowId::new(3), RowId::new(4)],
                |_| true,
                |_| {},
            )
            .expect("reported");

        let DeleteStatus::Finished(report) = status else {
            panic!("delete was confirmed");
        };
        assert_eq!(report.deleted, vec![RowId::new(2)]);
        assert_eq!(report.failed, vec![RowId::new(3), RowId::new(4)]);
        assert_eq!(ids(&table), vec![1, 3, 4]);
        assert!(!endpoint.calls().contains(&"delete roles 4".to_owned()));
    }

    #[test]
    fn declined_delete_sends_nothing() {
        let endpoint = Arc::new(FakeEndpoint::roles(2));
        let (mut dispatcher, mut table) = loaded(&endpoint, &signed_in());

        let status = dispatcher
            .delete_one(&mut table, RowId::new(1), |_| false, |_| {})
            .expect("declined is not an error");
        assert_eq!(status, DeleteStatus::Declined);
        assert_eq!(endpoint.calls(), vec!["list roles"]);
        assert_eq!(ids(&table), vec![1, 2]);
        assert_eq!(
            dispatcher.tracker().phase(ActionKind::Delete),
            ActionPhase::Idle
        );
    }

    #[test]
    fn delete_of_unknown_or_no_rows_is_refused() {
        let endpoint = Arc::new(FakeEndpoint::roles(2));
        let (mut dispatcher, mut table) = loaded(&endpoint, &signed_in());

        let error = dispatcher
            .delete_many(&mut table, &[], |_| true, |_| {})
            .expect_err("empty selection");
        assert_eq!(error, ActionError::NothingSelected);

        let error = dispatcher
            .delete_one(&mut table, RowId::new(42), |_| true, |_| {})
            .expect_err("unknown row");
        assert_eq!(error, ActionError::UnknownRow(RowId::new(42)));
        assert_eq!(endpoint.calls(), vec!["list roles"]);
    }

    #[test]
    fn failed_update_leaves_the_row_unchanged() {
        let endpoint = Arc::new(FakeEndpoint {
            fail_update: true,
            ..FakeEndpoint::roles(3)
        });
        let (mut dispatcher, mut table) = loaded(&endpoint, &signed_in());
        let before = table.row(RowId::new(2)).cloned();

        let mut notices = Vec::new();
        dispatcher
            .update_one(
                &mut table,
                RowId::new(2),
                &RowPatch::new().set("name", "Dispatcher"),
                |notice| notices.push(notice),
            )
            .expect_err("server rejects update");

        assert_eq!(table.row(RowId::new(2)).cloned(), before);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(
            dispatcher.tracker().phase(ActionKind::Update),
            ActionPhase::Failed
        );
    }

    #[test]
    fn update_prefers_the_server_record() {
        let endpoint = Arc::new(FakeEndpoint {
            echo_updates: true,
            ..FakeEndpoint::roles(3)
        });
        let (mut dispatcher, mut table) = loaded(&endpoint, &signed_in());

        dispatcher
            .update_one(
                &mut table,
                RowId::new(2),
                &RowPatch::new().set("name", "Dispatcher"),
                |_| {},
            )
            .expect("update succeeds");

        let row = table.row(RowId::new(2)).expect("row still present");
        assert_eq!(row.display("name"), "Dispatcher");
        assert_eq!(row.display("description"), "from server");
        assert_eq!(endpoint.calls(), vec!["list roles", "update roles 2"]);
    }

    #[test]
    fn update_falls_back_to_the_merged_record() {
        let endpoint = Arc::new(FakeEndpoint::roles(3));
        let (mut dispatcher, mut table) = loaded(&endpoint, &signed_in());

        let mut notices = Vec::new();
        dispatcher
            .update_one(
                &mut table,
                RowId::new(1),
                &RowPatch::new().set("name", "Auditor"),
                |notice| notices.push(notice),
            )
            .expect("update succeeds");

        assert_eq!(table.row(RowId::new(1)).expect("row").display("name"), "Auditor");
        assert_eq!(ids(&table), vec![1, 2, 3]);
        assert_eq!(notices, vec![Notice::success("updated row 1 in roles")]);
    }

    #[test]
    fn invalid_patch_never_reaches_the_server() {
        let endpoint = Arc::new(FakeEndpoint::roles(1));
        let (mut dispatcher, mut table) = loaded(&endpoint, &signed_in());

        let error = dispatcher
            .update_one(&mut table, RowId::new(1), &RowPatch::new().set("name", ""), |_| {})
            .expect_err("blank role name");
        assert!(matches!(error, ActionError::Invalid(_)));
        assert_eq!(endpoint.calls(), vec!["list roles"]);
    }

    #[test]
    fn busy_action_refuses_resubmission() {
        let endpoint = Arc::new(FakeEndpoint::roles(1));
        let (mut dispatcher, mut table) = loaded(&endpoint, &signed_in());
        dispatcher
            .tracker_mut()
            .begin(ActionKind::Update)
            .expect("simulate in-flight update");

        let mut notices = Vec::new();
        let error = dispatcher
            .update_one(
                &mut table,
                RowId::new(1),
                &RowPatch::new().set("name", "x"),
                |notice| notices.push(notice),
            )
            .expect_err("second update refused");
        assert!(matches!(error, ActionError::Busy(_)));
        assert!(notices[0].message.contains("update already in progress"));
        assert_eq!(endpoint.calls(), vec!["list roles"]);
    }

    #[test]
    fn create_inserts_the_server_row() {
        let endpoint = Arc::new(FakeEndpoint::roles(2));
        let (mut dispatcher, mut table) = loaded(&endpoint, &signed_in());

        let id = dispatcher
            .create_one(&mut table, &RowPatch::new().set("name", "Mechanic"), |_| {})
            .expect("create succeeds");
        assert_eq!(id, RowId::new(99));
        assert_eq!(table.row(id).expect("inserted").display("name"), "Mechanic");
        assert_eq!(table.total_count(), 3);
    }

    #[test]
    fn fetch_split_across_a_worker_holds_the_slot() {
        let endpoint = Arc::new(FakeEndpoint::roles(3));
        let mut dispatcher = dispatcher(&endpoint, &signed_in());
        let mut table = TableController::new(Collection::Roles, 10);

        assert!(dispatcher.begin_fetch(|_| {}).expect("slot reserved"));
        let mut notices = Vec::new();
        let error = dispatcher
            .begin_fetch(|notice| notices.push(notice))
            .expect_err("second fetch refused");
        assert!(matches!(error, ActionError::Busy(_)));
        assert!(notices[0].message.contains("load already in progress"));

        let worker = dispatcher.remote().clone();
        let result = std::thread::spawn(move || worker.fetch_rows())
            .join()
            .expect("worker thread");
        let status = dispatcher
            .finish_fetch(&mut table, &ViewLifetime::mounted(), result, |_| {})
            .expect("fetch applied");
        assert_eq!(status, FetchStatus::Loaded { rows: 3, issues: 0 });
        assert_eq!(ids(&table), vec![1, 2, 3]);
        assert_eq!(endpoint.calls(), vec!["list roles"]);
    }

    #[test]
    fn delete_reported_after_its_table_is_gone() {
        let report = DeleteReport {
            deleted: vec![RowId::new(4)],
            ..DeleteReport::default()
        };
        let mut notices = Vec::new();
        ActionDispatcher::report_delete(Collection::Roles, Ok(report), |notice| {
            notices.push(notice)
        })
        .expect("report passes through");
        assert_eq!(notices, vec![Notice::success("deleted 1 row from roles")]);

        let mut notices = Vec::new();
        ActionDispatcher::report_save(
            Collection::Roles,
            ActionKind::Create,
            Err(ActionError::Deferred),
            |notice| notices.push(notice),
        )
        .expect_err("error passes through");
        assert_eq!(notices[0].level, NoticeLevel::Info);
    }

    #[test]
    fn rejected_save_does_not_reserve_the_slot() {
        let endpoint = Arc::new(FakeEndpoint::roles(2));
        let (mut dispatcher, table) = loaded(&endpoint, &signed_in());

        let error = dispatcher
            .begin_save(&table, None, &RowPatch::new().set("description", "x"), |_| {})
            .expect_err("name is required for new rows");
        assert!(matches!(error, ActionError::Invalid(_)));

        let error = dispatcher
            .begin_save(
                &table,
                Some(RowId::new(9)),
                &RowPatch::new().set("name", "x"),
                |_| {},
            )
            .expect_err("row 9 is not loaded");
        assert_eq!(error, ActionError::UnknownRow(RowId::new(9)));
        assert_eq!(
            dispatcher.tracker().phase(ActionKind::Create),
            ActionPhase::Idle
        );
        assert_eq!(
            dispatcher.tracker().phase(ActionKind::Update),
            ActionPhase::Idle
        );

        let job = dispatcher
            .begin_save(&table, None, &RowPatch::new().set("name", "Clerk"), |_| {})
            .expect("valid new row");
        assert_eq!(job.kind, ActionKind::Create);
        assert!(dispatcher.tracker().is_busy(ActionKind::Create));
    }

    #[test]
    fn get_row_normalizes_a_single_record() {
        let endpoint = Arc::new(FakeEndpoint::roles(2));
        let session = signed_in();
        let remote = RemoteActions::new(Collection::Roles, endpoint.clone(), session);

        let row = remote.get_row("2").expect("row exists");
        assert_eq!(row.display("name"), "role 2");

        let error = remote.get_row("9").expect_err("missing row");
        assert!(error.to_string().contains("404"));
    }
}
