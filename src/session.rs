//! Test sessions: one isolated context, one database, one connection.
//!
//! A session walks a fixed lifecycle:
//!
//! ```text
//! Created -> ContextReady -> DatabaseInitialized -> ConnectionOpen -> Running -> TornDown
//! ```
//!
//! [`TestSession::begin`] creates the isolated context and lets the fixture
//! build its schema. The connection is opened on first use and kept for the
//! rest of the session. [`TestSession::end`] applies the teardown operation,
//! closes the connection and removes the context, and it does so on every
//! path: after a failed `begin`, after a failed test body, or when nothing
//! was ever opened. [`TestSession::run`] pairs the two around a test body.
//!
//! ```no_run
//! use rust_sqlite_dbunit::{assertion, DatabaseFixture, FnFixture, IsolatedContext, SessionConfig, TestSession};
//! use rust_sqlite_dbunit::resources::parse_yaml_data_set;
//!
//! let fixture = FnFixture::new(
//!     |ctx: &IsolatedContext, name: &str| {
//!         ctx.create_database(name, 1, "CREATE TABLE widget(_id INTEGER PRIMARY KEY, name TEXT);")?;
//!         Ok(())
//!     },
//!     || Ok(parse_yaml_data_set("widget:\n  - { _id: 1, name: a }\n")?),
//! );
//! let mut session = TestSession::new(fixture, SessionConfig::new("widget.sqlite"));
//! session.run(|session| {
//!     let expected = session.fixture().data_set()?;
//!     assertion::assert_equals(&expected.sorted(), &session.current_data_set()?)?;
//!     Ok::<_, anyhow::Error>(())
//! })?;
//! # Ok::<_, anyhow::Error>(())
//! ```

use crate::config::SessionConfig;
use crate::connection::DatabaseConnection;
use crate::context::{Environment, IsolatedContext};
use crate::dataset::{filter, DataSet, ReservedTables};
use crate::error::{Error, Result};
use crate::operation::DatabaseOperation;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Test-author hooks a session calls into
pub trait DatabaseFixture {
    /// Creates the schema of `database_name` inside `context`.
    ///
    /// Rows are not expected here: the session populates the database from
    /// [`DatabaseFixture::data_set`] with its setup operation.
    fn on_create_database(&self, context: &IsolatedContext, database_name: &str)
        -> anyhow::Result<()>;

    /// The data set the database is set up with
    fn data_set(&self) -> anyhow::Result<DataSet>;
}

/// A fixture built from two closures
pub struct FnFixture<C, D> {
    create: C,
    data_set: D,
}

impl<C, D> FnFixture<C, D>
where
    C: Fn(&IsolatedContext, &str) -> anyhow::Result<()>,
    D: Fn() -> anyhow::Result<DataSet>,
{
    pub fn new(create: C, data_set: D) -> Self {
        Self { create, data_set }
    }
}

impl<C, D> DatabaseFixture for FnFixture<C, D>
where
    C: Fn(&IsolatedContext, &str) -> anyhow::Result<()>,
    D: Fn() -> anyhow::Result<DataSet>,
{
    fn on_create_database(
        &self,
        context: &IsolatedContext,
        database_name: &str,
    ) -> anyhow::Result<()> {
        (self.create)(context, database_name)
    }

    fn data_set(&self) -> anyhow::Result<DataSet> {
        (self.data_set)()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Created,
    ContextReady,
    DatabaseInitialized,
    ConnectionOpen,
    Running,
    TornDown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::ContextReady => "context ready",
            SessionState::DatabaseInitialized => "database initialized",
            SessionState::ConnectionOpen => "connection open",
            SessionState::Running => "running",
            SessionState::TornDown => "torn down",
        };
        f.write_str(name)
    }
}

pub struct TestSession<F> {
    fixture: F,
    config: SessionConfig,
    reserved: ReservedTables,
    environment: Option<Environment>,
    context: Option<IsolatedContext>,
    connection: Option<DatabaseConnection>,
    // Data set last pushed by the setup operation; teardown runs against it.
    applied: Option<DataSet>,
    state: SessionState,
}

impl<F: DatabaseFixture> TestSession<F> {
    pub fn new(fixture: F, config: SessionConfig) -> Self {
        Self {
            fixture,
            config,
            reserved: ReservedTables::platform(),
            environment: None,
            context: None,
            connection: None,
            applied: None,
            state: SessionState::Created,
        }
    }

    /// Runs the session on top of `environment` instead of a temporary one
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Replaces the tables hidden from snapshots
    pub fn with_reserved_tables(mut self, reserved: ReservedTables) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn fixture(&self) -> &F {
        &self.fixture
    }

    pub fn database_name(&self) -> &str {
        &self.config.database_name
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    pub fn context(&self) -> Option<&IsolatedContext> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut IsolatedContext> {
        self.context.as_mut()
    }

    /// Where the test database lives, once the context exists
    pub fn database_path(&self) -> Option<PathBuf> {
        self.context
            .as_ref()
            .map(|c| c.database_path(&self.config.database_name))
    }

    /// Creates the isolated context and hands it to the fixture.
    ///
    /// If the fixture fails the context is kept so that [`end`](Self::end)
    /// can remove it; no connection is opened.
    pub fn begin(&mut self) -> Result<()> {
        if self.state != SessionState::Created {
            return Err(Error::invalid_state("begin", self.state));
        }
        self.config.validate()?;

        let environment = match self.environment.take() {
            Some(environment) => environment,
            None => Environment::temporary()?,
        };
        let context = IsolatedContext::create(&environment, &self.config.file_prefix);
        self.environment = Some(environment);
        let context = context?;
        self.transition(SessionState::ContextReady);

        let created = self
            .fixture
            .on_create_database(&context, &self.config.database_name);
        self.context = Some(context);
        created.map_err(Error::DatabaseInitialization)?;
        self.transition(SessionState::DatabaseInitialized);
        info!(database = %self.config.database_name, "test session began");
        Ok(())
    }

    /// [`begin`](Self::begin), then set the database up with the fixture's data set
    pub fn set_up(&mut self) -> Result<()> {
        self.begin()?;
        let expected = self.fixture.data_set().map_err(Error::DataSetLoad)?;
        self.apply_setup(&expected)
    }

    /// The session's connection, opened on first call.
    pub fn connection(&mut self) -> Result<&DatabaseConnection> {
        if self.state < SessionState::DatabaseInitialized {
            return Err(Error::Connection(format!(
                "database '{}' was never initialized",
                self.config.database_name
            )));
        }
        if self.state == SessionState::TornDown {
            return Err(Error::Connection(format!(
                "session for '{}' has ended",
                self.config.database_name
            )));
        }

        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                let path = self.database_path().ok_or_else(|| {
                    Error::Connection("isolated context is gone".to_string())
                })?;
                let connection = DatabaseConnection::open(path, self.config.database.clone())?;
                if self.state == SessionState::DatabaseInitialized {
                    self.transition(SessionState::ConnectionOpen);
                }
                connection
            }
        };
        let connection: &DatabaseConnection = self.connection.insert(connection);
        Ok(connection)
    }

    /// Runs the configured setup operation with `expected`.
    pub fn apply_setup(&mut self, expected: &DataSet) -> Result<()> {
        let operation = DatabaseOperation::from(self.config.setup_operation);
        self.execute(operation, expected)?;
        self.applied = Some(expected.clone());
        if self.state < SessionState::Running {
            self.transition(SessionState::Running);
        }
        Ok(())
    }

    /// Replaces whatever the database holds with `dataset`
    pub fn replace_data_set(&mut self, dataset: &DataSet) -> Result<()> {
        self.execute(DatabaseOperation::CleanInsert, dataset)
    }

    pub fn execute(&mut self, operation: DatabaseOperation, dataset: &DataSet) -> Result<()> {
        let connection = self.connection()?;
        operation.execute(connection.raw(), dataset)
    }

    /// Current database contents without reserved tables, optionally sorted.
    pub fn snapshot(&mut self, sorted: bool) -> Result<DataSet> {
        let full = self.connection()?.create_data_set()?;
        let filtered = filter(&full, &self.reserved);
        Ok(if sorted { filtered.sorted() } else { filtered })
    }

    /// [`snapshot`](Self::snapshot) using the configured sort setting
    pub fn current_data_set(&mut self) -> Result<DataSet> {
        self.snapshot(self.config.sort_snapshots)
    }

    /// Tears the session down.
    ///
    /// Every step is attempted even if an earlier one failed; the first
    /// failure is returned and the rest are logged. Calling it again, or on a
    /// session that never began, does nothing.
    pub fn end(&mut self) -> Result<()> {
        if self.state == SessionState::TornDown {
            return Ok(());
        }
        let mut first_error = None;

        if let Some(connection) = self.connection.take() {
            let operation = DatabaseOperation::from(self.config.teardown_operation);
            if operation != DatabaseOperation::None {
                let dataset = match self.applied.take() {
                    Some(dataset) => Ok(dataset),
                    None => connection
                        .create_schema_data_set()
                        .map(|schema| filter(&schema, &self.reserved)),
                };
                let result = dataset.and_then(|ds| operation.execute(connection.raw(), &ds));
                record(&mut first_error, "teardown operation", result);
            }
            record(&mut first_error, "closing connection", connection.close());
        }

        if let Some(context) = self.context.take() {
            record(&mut first_error, "destroying context", context.destroy());
        }

        self.applied = None;
        self.transition(SessionState::TornDown);
        info!(database = %self.config.database_name, "test session ended");
        first_error.map_or(Ok(()), Err)
    }

    /// Sets up, runs `body`, and always tears down.
    ///
    /// A failure from setup or the body wins over a teardown failure, which
    /// is then only logged.
    pub fn run<T, E>(
        &mut self,
        body: impl FnOnce(&mut Self) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<Error> + fmt::Display,
    {
        let outcome = match self.set_up() {
            Ok(()) => body(self),
            Err(e) => Err(E::from(e)),
        };
        let teardown = self.end();
        match (outcome, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(E::from(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown)) => {
                warn!(error = %e, teardown = %teardown, "teardown failed after test failure");
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, database = %self.config.database_name, "session transition");
        self.state = next;
    }
}

fn record(slot: &mut Option<Error>, step: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!(step, error = %e, "teardown step failed");
        if slot.is_none() {
            *slot = Some(e);
        }
    }
}

impl<F> Drop for TestSession<F> {
    fn drop(&mut self) {
        if self.state != SessionState::Created && self.state != SessionState::TornDown {
            warn!(
                database = %self.config.database_name,
                state = %self.state,
                "test session dropped without end()"
            );
        }
    }
}
