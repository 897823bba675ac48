//! Isolated execution contexts for test databases.
//!
//! An [`Environment`] is where the application under test really keeps its
//! files: a data directory and a directory of packaged resources. An
//! [`IsolatedContext`] sits on top of it and renames everything it creates
//! with a prefix, so a test database named `widget.sqlite` never touches the
//! application's own `widget.sqlite`.

use crate::dataset::DataSet;
use crate::error::{Error, Result};
use crate::resources;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

pub const DEFAULT_PREFIX: &str = "dbunit_";

const DATABASES_DIR: &str = "databases";
const FILES_DIR: &str = "files";

/// The real, unprefixed environment a context delegates to
#[derive(Debug)]
pub struct Environment {
    data_dir: PathBuf,
    resources_dir: PathBuf,
    // Keeps a temporary environment alive for as long as it is in use.
    _temp: Option<TempDir>,
}

impl Environment {
    pub fn new(data_dir: impl Into<PathBuf>, resources_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            resources_dir: resources_dir.into(),
            _temp: None,
        }
    }

    /// A throwaway environment removed when dropped.
    ///
    /// Resources resolve against `./tests/resources` of the current crate.
    pub fn temporary() -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix("sqlite-dbunit-")
            .tempdir()
            .map_err(|e| Error::EnvironmentUnavailable {
                path: std::env::temp_dir(),
                reason: e.to_string(),
            })?;
        let resources_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("resources");
        Ok(Self {
            data_dir: temp.path().to_path_buf(),
            resources_dir,
            _temp: Some(temp),
        })
    }

    pub fn with_resources_dir(mut self, resources_dir: impl Into<PathBuf>) -> Self {
        self.resources_dir = resources_dir.into();
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn resources_dir(&self) -> &Path {
        &self.resources_dir
    }

    /// Unprefixed database path, as the application itself would use it
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(DATABASES_DIR).join(name)
    }
}

/// Content-access facade that resolves only what a test registered.
#[derive(Debug, Default)]
pub struct MockContentResolver {
    providers: BTreeMap<String, PathBuf>,
}

impl MockContentResolver {
    pub fn add_provider(&mut self, authority: impl Into<String>, path: impl Into<PathBuf>) {
        self.providers.insert(authority.into(), path.into());
    }

    pub fn resolve(&self, authority: &str) -> Option<&Path> {
        self.providers.get(authority).map(PathBuf::as_path)
    }
}

/// A sandbox whose files live under prefixed names in the real data directory
#[derive(Debug)]
pub struct IsolatedContext {
    data_dir: PathBuf,
    resources_dir: PathBuf,
    prefix: String,
    content_resolver: MockContentResolver,
    created: Vec<PathBuf>,
}

impl IsolatedContext {
    /// Creates a context over `base`, failing if its data directory is unusable.
    pub fn create(base: &Environment, prefix: &str) -> Result<Self> {
        let data_dir = base.data_dir().to_path_buf();
        let metadata = fs::metadata(&data_dir).map_err(|e| Error::EnvironmentUnavailable {
            path: data_dir.clone(),
            reason: e.to_string(),
        })?;
        if !metadata.is_dir() {
            return Err(Error::EnvironmentUnavailable {
                path: data_dir,
                reason: "not a directory".to_string(),
            });
        }
        if metadata.permissions().readonly() {
            return Err(Error::EnvironmentUnavailable {
                path: data_dir,
                reason: "read-only".to_string(),
            });
        }

        let mut context = Self {
            data_dir,
            resources_dir: base.resources_dir().to_path_buf(),
            prefix: prefix.to_string(),
            content_resolver: MockContentResolver::default(),
            created: Vec::new(),
        };
        context.dir(DATABASES_DIR)?;
        context.dir(FILES_DIR)?;
        debug!(data_dir = %context.data_dir.display(), prefix, "created isolated context");
        Ok(context)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Private directory `<data>/<prefix><name>`; creating it twice is fine
    pub fn dir(&mut self, name: &str) -> Result<PathBuf> {
        let path = self.prefixed(name);
        fs::create_dir_all(&path).map_err(|e| Error::EnvironmentUnavailable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        if !self.created.contains(&path) {
            self.created.push(path.clone());
        }
        Ok(path)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.prefixed(FILES_DIR)
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.files_dir().join(name)
    }

    pub fn databases_dir(&self) -> PathBuf {
        self.prefixed(DATABASES_DIR)
    }

    pub fn database_path(&self, name: &str) -> PathBuf {
        self.databases_dir().join(name)
    }

    pub fn database_exists(&self, name: &str) -> bool {
        self.database_path(name).is_file()
    }

    pub fn resource_path(&self, name: &str) -> PathBuf {
        self.resources_dir.join(name)
    }

    /// Opens a packaged resource from the real environment
    pub fn open_resource(&self, name: &str) -> Result<File> {
        Ok(File::open(self.resource_path(name))?)
    }

    pub fn load_resource_data_set(&self, name: &str) -> Result<DataSet> {
        resources::load_data_set(self.resource_path(name))
    }

    pub fn content_resolver(&self) -> &MockContentResolver {
        &self.content_resolver
    }

    pub fn content_resolver_mut(&mut self) -> &mut MockContentResolver {
        &mut self.content_resolver
    }

    /// Creates (or recreates the schema of) a database inside the context.
    ///
    /// `schema_version` is stored as the database's `user_version`, which is
    /// what migration helpers read to decide whether to upgrade.
    pub fn create_database(&self, name: &str, schema_version: u32, sql: &str) -> Result<()> {
        let conn = Connection::open(self.database_path(name))?;
        conn.execute_batch(sql)?;
        conn.pragma_update(None, "user_version", schema_version)?;
        conn.close().map_err(|(_, e)| Error::Sqlite(e))?;
        debug!(name, schema_version, "created test database");
        Ok(())
    }

    /// Raw connection for application code under test, created if missing
    pub fn open_database(&self, name: &str) -> Result<Connection> {
        Ok(Connection::open(self.database_path(name))?)
    }

    /// Removes everything the context created.
    pub fn destroy(self) -> Result<()> {
        let mut first_error = None;
        for path in self.created.iter().rev() {
            match fs::remove_dir_all(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        debug!(data_dir = %self.data_dir.display(), prefix = %self.prefix, "destroyed isolated context");
        match first_error {
            Some(e) => Err(Error::Io(e)),
            None => Ok(()),
        }
    }

    fn prefixed(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}{}", self.prefix, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_prefixed_and_distinct_from_the_application() {
        let env = Environment::temporary().unwrap();
        let context = IsolatedContext::create(&env, DEFAULT_PREFIX).unwrap();
        let test_path = context.database_path("widget.sqlite");
        assert_ne!(test_path, env.database_path("widget.sqlite"));
        assert!(test_path.starts_with(env.data_dir().join("dbunit_databases")));
        assert!(context.file_path("notes.txt").starts_with(env.data_dir().join("dbunit_files")));
        context.destroy().unwrap();
    }

    #[test]
    fn dir_creation_is_idempotent() {
        let env = Environment::temporary().unwrap();
        let mut context = IsolatedContext::create(&env, "t_").unwrap();
        let first = context.dir("cache").unwrap();
        let second = context.dir("cache").unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
        context.destroy().unwrap();
        assert!(!first.exists());
    }

    #[test]
    fn missing_data_dir_is_unavailable() {
        let env = Environment::new("/nonexistent/sqlite-dbunit", "/nonexistent");
        let result = IsolatedContext::create(&env, DEFAULT_PREFIX);
        assert!(matches!(result, Err(Error::EnvironmentUnavailable { .. })));
    }

    #[test]
    fn create_database_stamps_user_version() {
        let env = Environment::temporary().unwrap();
        let context = IsolatedContext::create(&env, DEFAULT_PREFIX).unwrap();
        context
            .create_database("w.sqlite", 3, "CREATE TABLE widget(_id INTEGER, name TEXT);")
            .unwrap();
        assert!(context.database_exists("w.sqlite"));
        let conn = context.open_database("w.sqlite").unwrap();
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 3);
        drop(conn);
        context.destroy().unwrap();
    }

    #[test]
    fn resources_resolve_against_the_real_environment() {
        let env = Environment::temporary().unwrap().with_resources_dir("/fixtures");
        let context = IsolatedContext::create(&env, DEFAULT_PREFIX).unwrap();
        assert_eq!(context.resource_path("a.json"), PathBuf::from("/fixtures/a.json"));
        assert!(context.open_resource("a.json").is_err());
        context.destroy().unwrap();
    }

    #[test]
    fn content_resolver_knows_only_registered_providers() {
        let env = Environment::temporary().unwrap();
        let mut context = IsolatedContext::create(&env, DEFAULT_PREFIX).unwrap();
        assert!(context.content_resolver().resolve("widgets").is_none());
        context
            .content_resolver_mut()
            .add_provider("widgets", "/tmp/widgets");
        assert_eq!(
            context.content_resolver().resolve("widgets"),
            Some(Path::new("/tmp/widgets"))
        );
        context.destroy().unwrap();
    }
}
