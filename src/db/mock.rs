//! Scripted in-memory driver for tests.
//!
//! [`MockDriver`] answers calls from an ordered queue of expectations. Each
//! call must match the next expectation's kind and, when given, contain its SQL
//! fragment; anything else fails with an internal error. Every call is
//! recorded and can be inspected with [`MockDriver::calls`].
//!
//! ```ignore
//! let mock = MockDriver::new();
//! mock.expect_begin(Ok(()));
//! mock.expect_exec("INSERT INTO `students`", Ok(ExecResult::new(1, 10)));
//! mock.expect_commit(Ok(()));
//! ```

use crate::db::driver::{Driver, DriverTx, ExecResult, TxOptions};
use crate::error::{DbError, DbResult};
use crate::models::{Row, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Kind of a recorded driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    Ping,
    Prepare,
    Exec,
    Query,
    Begin,
    TxExec,
    TxQuery,
    Commit,
    Rollback,
    Close,
}

impl MockCall {
    /// Whether an expectation for `self` accepts an actual `call`.
    fn accepts(self, call: MockCall) -> bool {
        match self {
            MockCall::Exec => matches!(call, MockCall::Exec | MockCall::TxExec),
            MockCall::Query => matches!(call, MockCall::Query | MockCall::TxQuery),
            other => other == call,
        }
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub call: MockCall,
    pub sql: String,
    pub args: Vec<Value>,
}

enum Outcome {
    Done(DbResult<()>),
    Exec(DbResult<ExecResult>),
    Rows(DbResult<Vec<Row>>),
}

struct Expectation {
    call: MockCall,
    sql: Option<String>,
    outcome: Outcome,
}

#[derive(Default)]
struct MockState {
    expectations: VecDeque<Expectation>,
    calls: Vec<RecordedCall>,
    keep_open_on_commit_error: bool,
}

/// Driver answering from a script of expectations.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, call: MockCall, sql: Option<&str>, outcome: Outcome) -> &Self {
        self.lock().expectations.push_back(Expectation {
            call,
            sql: sql.map(str::to_string),
            outcome,
        });
        self
    }

    pub fn expect_ping(&self, result: DbResult<()>) -> &Self {
        self.push(MockCall::Ping, None, Outcome::Done(result))
    }

    pub fn expect_prepare(&self, sql: &str, result: DbResult<()>) -> &Self {
        self.push(MockCall::Prepare, Some(sql), Outcome::Done(result))
    }

    /// Expect a statement, on the pool or inside a transaction.
    pub fn expect_exec(&self, sql: &str, result: DbResult<ExecResult>) -> &Self {
        self.push(MockCall::Exec, Some(sql), Outcome::Exec(result))
    }

    /// Expect a query, on the pool or inside a transaction.
    pub fn expect_query(&self, sql: &str, result: DbResult<Vec<Row>>) -> &Self {
        self.push(MockCall::Query, Some(sql), Outcome::Rows(result))
    }

    pub fn expect_begin(&self, result: DbResult<()>) -> &Self {
        self.push(MockCall::Begin, None, Outcome::Done(result))
    }

    pub fn expect_commit(&self, result: DbResult<()>) -> &Self {
        self.push(MockCall::Commit, None, Outcome::Done(result))
    }

    pub fn expect_rollback(&self, result: DbResult<()>) -> &Self {
        self.push(MockCall::Rollback, None, Outcome::Done(result))
    }

    /// A failed commit leaves the transaction open, so the follow-up rollback
    /// reaches the script instead of reporting the transaction as done.
    pub fn keep_tx_open_on_commit_error(&self) -> &Self {
        self.lock().keep_open_on_commit_error = true;
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls of one kind.
    pub fn calls_of(&self, call: MockCall) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.call == call)
            .cloned()
            .collect()
    }

    /// Fails if any expectation was not consumed.
    pub fn verify(&self) -> DbResult<()> {
        let state = self.lock();
        match state.expectations.front() {
            None => Ok(()),
            Some(next) => Err(DbError::internal(format!(
                "mock: {} expectation(s) not met, next is {:?}",
                state.expectations.len(),
                next.call
            ))),
        }
    }

    fn keeps_open_on_commit_error(&self) -> bool {
        self.lock().keep_open_on_commit_error
    }

    fn next(&self, call: MockCall, sql: &str, args: &[Value]) -> DbResult<Outcome> {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            call,
            sql: sql.to_string(),
            args: args.to_vec(),
        });

        let Some(expected) = state.expectations.pop_front() else {
            return Err(DbError::internal(format!(
                "mock: unexpected {:?} call: {}",
                call, sql
            )));
        };
        if !expected.call.accepts(call) {
            return Err(DbError::internal(format!(
                "mock: expected {:?}, got {:?}: {}",
                expected.call, call, sql
            )));
        }
        if let Some(fragment) = &expected.sql {
            if !sql.contains(fragment.as_str()) {
                return Err(DbError::internal(format!(
                    "mock: SQL '{}' does not contain '{}'",
                    sql, fragment
                )));
            }
        }
        Ok(expected.outcome)
    }

    fn next_done(&self, call: MockCall, sql: &str) -> DbResult<()> {
        match self.next(call, sql, &[])? {
            Outcome::Done(result) => result,
            _ => Err(DbError::internal(format!("mock: {:?} scripted with wrong outcome", call))),
        }
    }

    fn next_exec(&self, call: MockCall, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        match self.next(call, sql, args)? {
            Outcome::Exec(result) => result,
            _ => Err(DbError::internal(format!("mock: {:?} scripted with wrong outcome", call))),
        }
    }

    fn next_rows(&self, call: MockCall, sql: &str, args: &[Value]) -> DbResult<Vec<Row>> {
        match self.next(call, sql, args)? {
            Outcome::Rows(result) => result,
            _ => Err(DbError::internal(format!("mock: {:?} scripted with wrong outcome", call))),
        }
    }
}

impl Driver for MockDriver {
    type Tx = MockTx;

    async fn ping(&self) -> DbResult<()> {
        self.next_done(MockCall::Ping, "")
    }

    async fn prepare(&self, sql: &str) -> DbResult<()> {
        self.next_done(MockCall::Prepare, sql)
    }

    async fn exec(&self, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.next_exec(MockCall::Exec, sql, args)
    }

    async fn query(&self, sql: &str, args: &[Value]) -> DbResult<Vec<Row>> {
        self.next_rows(MockCall::Query, sql, args)
    }

    async fn begin(&self, _opts: &TxOptions) -> DbResult<MockTx> {
        self.next_done(MockCall::Begin, "")?;
        Ok(MockTx {
            driver: self.clone(),
            done: false,
        })
    }

    async fn close(&self) {
        self.lock().calls.push(RecordedCall {
            call: MockCall::Close,
            sql: String::new(),
            args: Vec::new(),
        });
    }
}

/// Transaction handed out by [`MockDriver`].
pub struct MockTx {
    driver: MockDriver,
    done: bool,
}

impl MockTx {
    fn check_open(&self) -> DbResult<()> {
        if self.done {
            Err(DbError::TransactionDone)
        } else {
            Ok(())
        }
    }
}

impl DriverTx for MockTx {
    async fn exec(&mut self, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.check_open()?;
        self.driver.next_exec(MockCall::TxExec, sql, args)
    }

    async fn query(&mut self, sql: &str, args: &[Value]) -> DbResult<Vec<Row>> {
        self.check_open()?;
        self.driver.next_rows(MockCall::TxQuery, sql, args)
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.check_open()?;
        let result = self.driver.next_done(MockCall::Commit, "");
        if result.is_ok() || !self.driver.keeps_open_on_commit_error() {
            self.done = true;
        }
        result
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.check_open()?;
        self.done = true;
        self.driver.next_done(MockCall::Rollback, "")
    }
}
