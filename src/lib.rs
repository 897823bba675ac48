//! Dataset-driven SQLite test sessions running in isolated, throwaway contexts.
//!
//! # Intention
//!
//! - Give each test its own SQLite database inside a prefixed sandbox
//!   directory, seeded from an expected data set and emptied afterwards.
//! - Hide engine and platform bookkeeping tables so snapshots compare cleanly
//!   against hand-written data sets.
//! - Load expected data sets from JSON or YAML test resources.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/test-fixture code belongs here.
//! - No business logic or unrelated utilities.
//! - Single-threaded: a session is owned and driven by one test.

pub mod assertion;
pub mod config;
pub mod connection;
pub mod context;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod operation;
pub mod resources;
pub mod session;
pub mod value;

pub use config::SessionConfig;
pub use connection::{DatabaseConfig, DatabaseConnection};
pub use context::{Environment, IsolatedContext, MockContentResolver};
pub use dataset::{Column, DataSet, DataType, ReservedTables, Table, TableFilter, TableMetaData};
pub use error::{Error, Mismatch, Result};
pub use operation::{DatabaseOperation, SetupOperation, TeardownOperation};
pub use session::{DatabaseFixture, FnFixture, SessionState, TestSession};
pub use value::Value;
