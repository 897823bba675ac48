//! A single SQLite connection plus the metadata queries needed to snapshot
//! it into a [`DataSet`].

use crate::dataset::{Column, DataSet, DataType, Table, TableMetaData};
use crate::error::{Error, Result};
use crate::value::Value;
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Connection settings applied before first use
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Rows pulled from the driver per step while snapshotting
    pub fetch_size: usize,
    pub case_sensitive_table_names: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            fetch_size: 1,
            case_sensitive_table_names: false,
        }
    }
}

impl DatabaseConfig {
    // SQLite statements step one row at a time; any other fetch size would be
    // silently ignored by the driver, so it is rejected instead.
    fn validate(&self) -> Result<()> {
        if self.fetch_size != 1 {
            return Err(Error::Config(format!(
                "SQLite only supports a fetch size of 1, got {}",
                self.fetch_size
            )));
        }
        Ok(())
    }
}

pub struct DatabaseConnection {
    conn: Connection,
    path: PathBuf,
    config: DatabaseConfig,
}

impl std::fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

impl DatabaseConnection {
    /// Opens an existing database file.
    ///
    /// The file is never created here: a missing, locked or corrupt database
    /// fails with [`Error::Connection`].
    pub fn open(path: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::Connection(format!(
                "database file {} does not exist",
                path.display()
            )));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&path, flags)
            .map_err(|e| Error::Connection(format!("cannot open {}: {}", path.display(), e)))?;
        // Header corruption and locks only surface on the first read.
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::Connection(format!("cannot read {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "opened database connection");
        Ok(Self { conn, path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The underlying rusqlite connection, for ad-hoc queries in tests
    pub fn raw(&self) -> &Connection {
        &self.conn
    }

    /// User tables in creation order, reserved ones included
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY rowid")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    pub fn table_metadata(&self, table: &str) -> Result<TableMetaData> {
        table_metadata(&self.conn, table)
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Reads one table in storage order
    pub fn table(&self, table: &str) -> Result<Table> {
        let metadata = self.table_metadata(table)?;
        let columns = metadata
            .column_names()
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {} FROM {}", columns, quote_identifier(table));
        let width = metadata.columns.len();

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(width);
            for i in 0..width {
                record.push(row.get::<_, Value>(i)?);
            }
            values.push(record);
        }
        Table::new(metadata, values)
    }

    /// Snapshots every table of the database, reserved ones included
    pub fn create_data_set(&self) -> Result<DataSet> {
        let tables = self
            .table_names()?
            .iter()
            .map(|name| self.table(name))
            .collect::<Result<Vec<_>>>()?;
        DataSet::with_case_sensitivity(tables, self.config.case_sensitive_table_names)
    }

    /// Schema-only snapshot: every table with no rows
    pub fn create_schema_data_set(&self) -> Result<DataSet> {
        let tables = self
            .table_names()?
            .iter()
            .map(|name| Table::new(self.table_metadata(name)?, Vec::new()))
            .collect::<Result<Vec<_>>>()?;
        DataSet::with_case_sensitivity(tables, self.config.case_sensitive_table_names)
    }

    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.conn
            .close()
            .map_err(|(_, e)| Error::Connection(format!("cannot close {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "closed database connection");
        Ok(())
    }
}

pub(crate) fn table_metadata(conn: &Connection, table: &str) -> Result<TableMetaData> {
    let mut stmt = conn.prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| {
            let name: String = row.get(0)?;
            let declared: String = row.get(1)?;
            let not_null: bool = row.get(2)?;
            let pk: i64 = row.get(3)?;
            Ok(Column {
                name,
                data_type: DataType::from_declared(&declared),
                nullable: !not_null && pk == 0,
                primary_key: pk > 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if columns.is_empty() {
        return Err(Error::NoSuchTable(table.to_string()));
    }
    Ok(TableMetaData::new(table, columns))
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
