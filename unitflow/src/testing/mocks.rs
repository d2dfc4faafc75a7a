//! Mock collaborators and units for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::context::Context;
use crate::db::{DbFacade, DbProvider};
use crate::errors::{DbError, MailError, UnitError};
use crate::mail::{Mailer, OutgoingMail};
use crate::units::{Unit, UnitEnv, UnitOutcome};

/// A recorded database call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// SQL text or stored query name, as passed.
    pub sql: String,
    /// The parameter context.
    pub params: Context,
}

#[derive(Debug, Default)]
struct MemoryDbState {
    results: HashMap<String, Vec<Context>>,
    queries: Vec<RecordedCall>,
    commands: Vec<RecordedCall>,
    pending: Vec<RecordedCall>,
    committed: Vec<RecordedCall>,
    in_transaction: bool,
    fail_begin: bool,
    fail_commit: bool,
    commit_count: usize,
    rollback_count: usize,
}

/// An in-memory database facade.
///
/// Queries answer with scripted rows (empty when none are scripted) and
/// commands are recorded. Commands issued inside a transaction stay pending
/// until commit; a rollback discards them. Clones share state, so a test
/// can keep a handle while the batch owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryDb {
    state: Arc<Mutex<MemoryDbState>>,
}

impl MemoryDb {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the rows returned for `sql`.
    #[must_use]
    pub fn with_rows(self, sql: impl Into<String>, rows: Vec<Context>) -> Self {
        self.state.lock().results.insert(sql.into(), rows);
        self
    }

    /// Makes every commit fail.
    #[must_use]
    pub fn failing_commit(self) -> Self {
        self.state.lock().fail_commit = true;
        self
    }

    /// Makes every begin fail.
    #[must_use]
    pub fn failing_begin(self) -> Self {
        self.state.lock().fail_begin = true;
        self
    }

    /// Returns every query issued.
    #[must_use]
    pub fn queries(&self) -> Vec<RecordedCall> {
        self.state.lock().queries.clone()
    }

    /// Returns every command issued, committed or not.
    #[must_use]
    pub fn commands(&self) -> Vec<RecordedCall> {
        self.state.lock().commands.clone()
    }

    /// Returns the commands made durable.
    #[must_use]
    pub fn committed(&self) -> Vec<RecordedCall> {
        self.state.lock().committed.clone()
    }

    /// Returns the commands of the open transaction.
    #[must_use]
    pub fn pending(&self) -> Vec<RecordedCall> {
        self.state.lock().pending.clone()
    }

    /// Returns the number of successful commits.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.state.lock().commit_count
    }

    /// Returns the number of rollbacks.
    #[must_use]
    pub fn rollback_count(&self) -> usize {
        self.state.lock().rollback_count
    }
}

impl DbFacade for MemoryDb {
    fn query(&mut self, sql_or_name: &str, params: &Context) -> Result<Vec<Context>, DbError> {
        let mut state = self.state.lock();
        state.queries.push(RecordedCall {
            sql: sql_or_name.to_string(),
            params: params.clone(),
        });
        Ok(state.results.get(sql_or_name).cloned().unwrap_or_default())
    }

    fn execute(&mut self, sql_or_name: &str, params: &Context) -> Result<usize, DbError> {
        let mut state = self.state.lock();
        let call = RecordedCall {
            sql: sql_or_name.to_string(),
            params: params.clone(),
        };
        state.commands.push(call.clone());
        if state.in_transaction {
            state.pending.push(call);
        } else {
            state.committed.push(call);
        }
        Ok(1)
    }

    fn begin(&mut self) -> Result<(), DbError> {
        let mut state = self.state.lock();
        if state.fail_begin {
            return Err(DbError::Backend("begin refused".into()));
        }
        if state.in_transaction {
            return Err(DbError::Transaction("transaction already open".into()));
        }
        state.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        let mut state = self.state.lock();
        if !state.in_transaction {
            return Err(DbError::Transaction("no open transaction".into()));
        }
        if state.fail_commit {
            return Err(DbError::Backend("commit refused".into()));
        }
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        state.in_transaction = false;
        state.commit_count += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        let mut state = self.state.lock();
        if state.in_transaction {
            state.pending.clear();
            state.in_transaction = false;
            state.rollback_count += 1;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.state.lock().in_transaction
    }
}

/// Opens handles onto one shared [`MemoryDb`].
#[derive(Debug, Clone, Default)]
pub struct MemoryDbProvider {
    db: MemoryDb,
    fail_open: bool,
}

impl MemoryDbProvider {
    /// Creates a provider over `db`.
    #[must_use]
    pub fn new(db: MemoryDb) -> Self {
        Self { db, fail_open: false }
    }

    /// Creates a provider whose `open` always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            db: MemoryDb::new(),
            fail_open: true,
        }
    }
}

impl DbProvider for MemoryDbProvider {
    fn open(&self, _config: &DatabaseConfig) -> Result<Box<dyn DbFacade>, DbError> {
        if self.fail_open {
            return Err(DbError::Backend("database unavailable".into()));
        }
        Ok(Box::new(self.db.clone()))
    }
}

/// A unit that records every context it receives and emits it unchanged.
#[derive(Debug, Clone)]
pub struct RecordingUnit {
    label: String,
    received: Arc<Mutex<Vec<Context>>>,
}

impl RecordingUnit {
    /// Creates a recording unit.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns the received contexts, in order.
    #[must_use]
    pub fn received(&self) -> Vec<Context> {
        self.received.lock().clone()
    }

    /// Returns the number of activations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.received.lock().len()
    }

    /// Clears recorded contexts.
    pub fn clear(&self) {
        self.received.lock().clear();
    }
}

#[async_trait]
impl Unit for RecordingUnit {
    fn label(&self) -> &str {
        &self.label
    }

    async fn execute(
        &mut self,
        input: Context,
        _env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        self.received.lock().push(input.clone());
        Ok(UnitOutcome::emit(input))
    }
}

/// A unit that always fails.
#[derive(Debug, Clone)]
pub struct FailingUnit {
    label: String,
    message: String,
}

impl FailingUnit {
    /// Creates a failing unit.
    #[must_use]
    pub fn new(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Unit for FailingUnit {
    fn label(&self) -> &str {
        &self.label
    }

    async fn execute(
        &mut self,
        _input: Context,
        _env: &mut UnitEnv<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        Err(UnitError::invalid_config(self.message.clone()))
    }
}

/// A mailer that records messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
    fail: bool,
}

impl RecordingMailer {
    /// Creates a mailer that accepts every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mailer whose sends fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    /// Returns the accepted messages.
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Transport("connection refused".into()));
        }
        self.sent.lock().push(mail);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEnv;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_db_commit_publishes_pending_commands() {
        let db = MemoryDb::new();
        let mut handle = db.clone();

        handle.begin().unwrap();
        handle.execute("INSERT 1", &Context::new()).unwrap();
        assert_eq!(db.pending().len(), 1);
        assert!(db.committed().is_empty());

        handle.commit().unwrap();
        assert!(db.pending().is_empty());
        assert_eq!(db.committed()[0].sql, "INSERT 1");
        assert_eq!(db.commit_count(), 1);
    }

    #[test]
    fn test_memory_db_failing_commit_keeps_transaction_open() {
        let mut db = MemoryDb::new().failing_commit();
        db.begin().unwrap();
        db.execute("INSERT 1", &Context::new()).unwrap();

        assert!(db.commit().is_err());
        assert!(db.in_transaction());
        db.rollback().unwrap();
        assert!(db.committed().is_empty());
        assert_eq!(db.rollback_count(), 1);
    }

    #[test]
    fn test_memory_db_scripted_rows() {
        let mut db = MemoryDb::new().with_rows("q", vec![Context::new().with("id", 1)]);
        assert_eq!(db.query("q", &Context::new()).unwrap().len(), 1);
        assert!(db.query("other", &Context::new()).unwrap().is_empty());
        assert_eq!(db.queries().len(), 2);
    }

    #[test]
    fn test_failing_provider() {
        assert!(MemoryDbProvider::failing().open(&DatabaseConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_recording_unit_shares_log_across_clones() {
        let unit = RecordingUnit::new("recorder");
        let mut instance = unit.clone();
        let mut test_env = TestEnv::new();

        instance
            .execute(Context::new().with("n", 1), &mut test_env.env())
            .await
            .unwrap();
        assert_eq!(unit.call_count(), 1);
        assert_eq!(unit.received()[0].get_string("n"), "1");
    }
}
