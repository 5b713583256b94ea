//! Scripted database adapter for tests.
//!
//! Handlers are registered per adapter method and SQL text. Queries are
//! matched after whitespace normalisation, so a handler registered with a
//! one-line query also answers the same query written across several lines.
//! Every call is recorded for later assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use hearth_core::{HearthError, HearthResult, Params, RetryPolicy, Row};

use crate::adapter::DatabaseAdapter;

/// Adapter method a handler answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockMethod {
    Single,
    Query,
    Insert,
    Update,
    Execute,
    Raw,
}

/// A recorded adapter call.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub method: MockMethod,
    pub query: String,
    pub params: Params,
}

enum Reply {
    Row(Option<Row>),
    Rows(Vec<Row>),
    Id(Option<i64>),
    Count(u64),
    Done,
}

type Handler = Arc<dyn Fn(&Params) -> HearthResult<Reply> + Send + Sync>;

/// In-process [`DatabaseAdapter`] driven by registered handlers.
///
/// Unregistered queries fail with a database error, which keeps tests honest
/// about every statement a storage issues.
pub struct MockDatabase {
    handlers: Mutex<HashMap<(MockMethod, String), Handler>>,
    calls: Mutex<Vec<MockCall>>,
    ready: AtomicBool,
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDatabase")
            .field("handlers", &lock(&self.handlers).len())
            .field("calls", &lock(&self.calls).len())
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collapse runs of whitespace so formatting differences do not matter.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl MockDatabase {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            ready: AtomicBool::new(true),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    fn register(&self, method: MockMethod, query: &str, handler: Handler) {
        lock(&self.handlers).insert((method, normalize_query(query)), handler);
    }

    pub fn on_single<F>(&self, query: &str, handler: F)
    where
        F: Fn(&Params) -> Option<Row> + Send + Sync + 'static,
    {
        self.register(
            MockMethod::Single,
            query,
            Arc::new(move |params| Ok(Reply::Row(handler(params)))),
        );
    }

    pub fn on_query<F>(&self, query: &str, handler: F)
    where
        F: Fn(&Params) -> Vec<Row> + Send + Sync + 'static,
    {
        self.register(
            MockMethod::Query,
            query,
            Arc::new(move |params| Ok(Reply::Rows(handler(params)))),
        );
    }

    pub fn on_insert<F>(&self, query: &str, handler: F)
    where
        F: Fn(&Params) -> Option<i64> + Send + Sync + 'static,
    {
        self.register(
            MockMethod::Insert,
            query,
            Arc::new(move |params| Ok(Reply::Id(handler(params)))),
        );
    }

    pub fn on_update<F>(&self, query: &str, handler: F)
    where
        F: Fn(&Params) -> u64 + Send + Sync + 'static,
    {
        self.register(
            MockMethod::Update,
            query,
            Arc::new(move |params| Ok(Reply::Count(handler(params)))),
        );
    }

    pub fn on_execute<F>(&self, query: &str, handler: F)
    where
        F: Fn(&Params) -> u64 + Send + Sync + 'static,
    {
        self.register(
            MockMethod::Execute,
            query,
            Arc::new(move |params| Ok(Reply::Count(handler(params)))),
        );
    }

    /// Accept a raw SQL batch.
    pub fn on_raw(&self, sql: &str) {
        self.register(MockMethod::Raw, sql, Arc::new(|_| Ok(Reply::Done)));
    }

    /// Make a query fail with a database error.
    pub fn fail(&self, method: MockMethod, query: &str, reason: &str) {
        let reason = reason.to_string();
        self.register(
            method,
            query,
            Arc::new(move |_| Err(HearthError::database(reason.clone()))),
        );
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls made through `method`.
    pub fn count(&self, method: MockMethod) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// Total number of calls across all methods.
    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    fn dispatch(&self, method: MockMethod, query: &str, params: &Params) -> HearthResult<Reply> {
        let normalized = normalize_query(query);
        lock(&self.calls).push(MockCall {
            method,
            query: normalized.clone(),
            params: params.clone(),
        });

        // Clone the handler out so it runs without holding the lock.
        let handler = lock(&self.handlers).get(&(method, normalized)).cloned();
        match handler {
            Some(handler) => handler(params),
            None => Err(HearthError::database(format!(
                "no mock registered for {:?}: {}",
                method,
                normalize_query(query)
            ))),
        }
    }
}

fn unexpected(method: MockMethod) -> HearthError {
    HearthError::database(format!("mock handler returned the wrong shape for {:?}", method))
}

#[async_trait]
impl DatabaseAdapter for MockDatabase {
    async fn single(&self, query: &str, params: &Params) -> HearthResult<Option<Row>> {
        match self.dispatch(MockMethod::Single, query, params)? {
            Reply::Row(row) => Ok(row),
            _ => Err(unexpected(MockMethod::Single)),
        }
    }

    async fn query(&self, query: &str, params: &Params) -> HearthResult<Vec<Row>> {
        match self.dispatch(MockMethod::Query, query, params)? {
            Reply::Rows(rows) => Ok(rows),
            _ => Err(unexpected(MockMethod::Query)),
        }
    }

    async fn insert(&self, query: &str, params: &Params) -> HearthResult<Option<i64>> {
        match self.dispatch(MockMethod::Insert, query, params)? {
            Reply::Id(id) => Ok(id),
            _ => Err(unexpected(MockMethod::Insert)),
        }
    }

    async fn update(&self, query: &str, params: &Params) -> HearthResult<u64> {
        match self.dispatch(MockMethod::Update, query, params)? {
            Reply::Count(count) => Ok(count),
            _ => Err(unexpected(MockMethod::Update)),
        }
    }

    async fn execute(&self, query: &str, params: &Params) -> HearthResult<u64> {
        match self.dispatch(MockMethod::Execute, query, params)? {
            Reply::Count(count) => Ok(count),
            _ => Err(unexpected(MockMethod::Execute)),
        }
    }

    async fn raw_query(&self, sql: &str) -> HearthResult<()> {
        match self.dispatch(MockMethod::Raw, sql, &Params::new())? {
            Reply::Done => Ok(()),
            _ => Err(unexpected(MockMethod::Raw)),
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn await_ready(&self, timeout: Duration) -> bool {
        RetryPolicy::fixed(Duration::from_millis(10), u32::MAX)
            .wait_until(timeout, || async { self.is_ready() })
            .await
    }
}
