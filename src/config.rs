//! Session configuration.
//!
//! Built in code with the `with_*` methods, or read from TOML:
//!
//! ```toml
//! database_name = "widget.sqlite"
//! setup_operation = "clean_insert"
//! teardown_operation = "none"
//! sort_snapshots = true
//! ```

use crate::connection::DatabaseConfig;
use crate::context::DEFAULT_PREFIX;
use crate::error::{Error, Result};
use crate::operation::{SetupOperation, TeardownOperation};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// File name of the test database inside the isolated context
    pub database_name: String,

    #[serde(default)]
    pub setup_operation: SetupOperation,

    #[serde(default)]
    pub teardown_operation: TeardownOperation,

    /// Whether snapshots are sorted before being handed out
    #[serde(default = "default_sort_snapshots")]
    pub sort_snapshots: bool,

    /// Prefix applied to every file and directory the session creates
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_sort_snapshots() -> bool {
    true
}

fn default_file_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl SessionConfig {
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            setup_operation: SetupOperation::default(),
            teardown_operation: TeardownOperation::default(),
            sort_snapshots: default_sort_snapshots(),
            file_prefix: default_file_prefix(),
            database: DatabaseConfig::default(),
        }
    }

    pub fn with_setup_operation(mut self, operation: SetupOperation) -> Self {
        self.setup_operation = operation;
        self
    }

    pub fn with_teardown_operation(mut self, operation: TeardownOperation) -> Self {
        self.teardown_operation = operation;
        self
    }

    pub fn with_sort_snapshots(mut self, sort: bool) -> Self {
        self.sort_snapshots = sort;
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_database_config(mut self, database: DatabaseConfig) -> Self {
        self.database = database;
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let name = self.database_name.as_str();
        if name.is_empty() {
            return Err(Error::Config("database_name must not be empty".to_string()));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::Config(format!(
                "database_name must be a plain file name, got '{}'",
                name
            )));
        }
        if self.file_prefix.is_empty() {
            // An empty prefix would hand the test the application's own files.
            return Err(Error::Config("file_prefix must not be empty".to_string()));
        }
        Ok(())
    }
}
