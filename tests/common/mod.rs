//! Shared fakes for the integration tests: a scriptable driver handle and a
//! connector that captures the configs it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use db_link::config::ConnectionConfig;
use db_link::connectors::Connector;
use db_link::connection::{Connection, Reconnector};
use db_link::driver::DriverHandle;
use db_link::error::{DbResult, Error};
use db_link::factory::ReplicaSelector;
use db_link::models::{FetchMode, Row, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared, ordered record of driver calls.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count_of(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| e.as_str() == entry).count()
    }
}

/// Scriptable in-memory driver handle.
pub struct FakeHandle {
    driver: &'static str,
    log: CallLog,
    rows: Vec<Row>,
    affected: u64,
    bound: Arc<Mutex<Vec<Vec<Value>>>>,
    failures: Mutex<VecDeque<String>>,
}

impl FakeHandle {
    pub fn new(log: CallLog) -> Self {
        Self {
            driver: "mysql",
            log,
            rows: Vec::new(),
            affected: 1,
            bound: Arc::new(Mutex::new(Vec::new())),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_driver(mut self, driver: &'static str) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    /// Queue a failure for the next statement call.
    pub fn fail_next(self, message: impl Into<String>) -> Self {
        self.failures.lock().unwrap().push_back(message.into());
        self
    }

    /// Bindings received so far, one entry per statement call.
    pub fn bindings_seen(&self) -> Arc<Mutex<Vec<Vec<Value>>>> {
        Arc::clone(&self.bound)
    }

    fn take_failure(&self) -> DbResult<()> {
        match self.failures.lock().unwrap().pop_front() {
            Some(message) => Err(Error::driver(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DriverHandle for FakeHandle {
    async fn query(
        &self,
        statement: &str,
        bindings: &[Value],
        _mode: FetchMode,
    ) -> DbResult<Vec<Row>> {
        self.log.record(format!("query:{statement}"));
        self.bound.lock().unwrap().push(bindings.to_vec());
        self.take_failure()?;
        Ok(self.rows.clone())
    }

    async fn execute(&self, statement: &str, bindings: &[Value]) -> DbResult<u64> {
        self.log.record(format!("execute:{statement}"));
        self.bound.lock().unwrap().push(bindings.to_vec());
        self.take_failure()?;
        Ok(self.affected)
    }

    async fn exec_raw(&self, statement: &str) -> DbResult<u64> {
        self.log.record(format!("exec:{statement}"));
        self.take_failure()?;
        Ok(self.affected)
    }

    async fn begin(&self) -> DbResult<()> {
        self.log.record("begin");
        Ok(())
    }

    async fn commit(&self) -> DbResult<()> {
        self.log.record("commit");
        Ok(())
    }

    async fn rollback(&self) -> DbResult<()> {
        self.log.record("rollback");
        Ok(())
    }

    fn driver_name(&self) -> &str {
        self.driver
    }
}

/// Connector that captures every config it is asked to connect with and
/// hands out fresh fake handles.
pub struct FakeConnector {
    pub driver: &'static str,
    pub log: CallLog,
    pub received: Arc<Mutex<Vec<ConnectionConfig>>>,
}

impl FakeConnector {
    pub fn new(driver: &'static str, log: CallLog) -> Self {
        Self {
            driver,
            log,
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn received_configs(&self) -> Vec<ConnectionConfig> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, config: &ConnectionConfig) -> DbResult<Box<dyn DriverHandle>> {
        self.received.lock().unwrap().push(config.clone());
        Ok(Box::new(FakeHandle::new(self.log.clone()).with_driver(self.driver)))
    }
}

/// Selector pinned to one index.
pub struct FixedSelector(pub usize);

impl ReplicaSelector for FixedSelector {
    fn pick(&self, len: usize) -> usize {
        self.0.min(len - 1)
    }
}

/// Reconnect strategy that installs a handle built by the given closure and
/// counts invocations.
pub struct ClosureReconnector<F> {
    build: F,
    pub count: Arc<AtomicUsize>,
}

impl<F> ClosureReconnector<F>
where
    F: Fn() -> Box<dyn DriverHandle> + Send + Sync,
{
    pub fn new(build: F) -> Self {
        Self {
            build,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.count)
    }
}

#[async_trait]
impl<F> Reconnector for ClosureReconnector<F>
where
    F: Fn() -> Box<dyn DriverHandle> + Send + Sync,
{
    async fn reconnect(&self, connection: &mut Connection) -> DbResult<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        connection.set_write_handle(Some((self.build)()))?;
        Ok(())
    }
}
