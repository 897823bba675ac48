//! Database operations that push a [`DataSet`] into a live connection.
//!
//! Each operation runs inside a single transaction: either every table is
//! processed or none is. Inserting walks the data set forward; deleting walks
//! it backwards so child tables listed after their parents are emptied first.

use crate::connection::{quote_identifier, table_metadata};
use crate::dataset::{DataSet, Table, TableMetaData};
use crate::error::{Error, Result};
use crate::value::Value;
use rusqlite::{params_from_iter, Connection, Transaction};
use serde::Deserialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseOperation {
    None,
    /// Inserts every row; fails on key conflicts
    Insert,
    /// Empties the data set's tables, then inserts every row
    CleanInsert,
    /// Empties the data set's tables
    DeleteAll,
    /// Deletes the data set's rows by primary key
    Delete,
    /// Updates the data set's rows by primary key
    Update,
    /// Updates rows that exist by primary key and inserts the rest
    Refresh,
}

impl fmt::Display for DatabaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseOperation::None => "NONE",
            DatabaseOperation::Insert => "INSERT",
            DatabaseOperation::CleanInsert => "CLEAN_INSERT",
            DatabaseOperation::DeleteAll => "DELETE_ALL",
            DatabaseOperation::Delete => "DELETE",
            DatabaseOperation::Update => "UPDATE",
            DatabaseOperation::Refresh => "REFRESH",
        };
        f.write_str(name)
    }
}

impl DatabaseOperation {
    pub fn execute(&self, conn: &Connection, dataset: &DataSet) -> Result<()> {
        if *self == DatabaseOperation::None {
            return Ok(());
        }
        let tx = Transaction::new_unchecked(conn, rusqlite::TransactionBehavior::Immediate)
            .map_err(|e| Error::operation(self.to_string(), "", e))?;
        self.apply(&tx, dataset)?;
        tx.commit()
            .map_err(|e| Error::operation(self.to_string(), "", e))?;
        debug!(operation = %self, tables = dataset.len(), "applied database operation");
        Ok(())
    }

    fn apply(&self, conn: &Connection, dataset: &DataSet) -> Result<()> {
        match self {
            DatabaseOperation::None => Ok(()),
            DatabaseOperation::Insert => {
                for table in dataset.iter() {
                    self.insert_rows(conn, table)?;
                }
                Ok(())
            }
            DatabaseOperation::DeleteAll => {
                for table in dataset.reverse_iter() {
                    self.delete_all(conn, table)?;
                }
                Ok(())
            }
            DatabaseOperation::CleanInsert => {
                DatabaseOperation::DeleteAll.apply(conn, dataset)?;
                DatabaseOperation::Insert.apply(conn, dataset)
            }
            DatabaseOperation::Delete => {
                for table in dataset.reverse_iter() {
                    self.for_each_row(conn, table, |stmt, key, _| {
                        stmt.execute(params_from_iter(key))?;
                        Ok(())
                    })?;
                }
                Ok(())
            }
            DatabaseOperation::Update | DatabaseOperation::Refresh => {
                for table in dataset.iter() {
                    self.update_rows(conn, table)?;
                }
                Ok(())
            }
        }
    }

    fn delete_all(&self, conn: &Connection, table: &Table) -> Result<()> {
        let live = self.live_metadata(conn, table)?;
        let sql = format!("DELETE FROM {}", quote_identifier(&live.table_name));
        conn.execute(&sql, [])
            .map_err(|e| Error::operation(self.to_string(), table.name(), e))?;
        Ok(())
    }

    fn insert_rows(&self, conn: &Connection, table: &Table) -> Result<()> {
        let live = self.live_metadata(conn, table)?;
        let columns = self.checked_columns(&live, table)?;
        if table.rows().is_empty() {
            return Ok(());
        }
        let sql = insert_sql(&live.table_name, &columns);
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| Error::operation(self.to_string(), table.name(), e))?;
        for row in table.rows() {
            stmt.execute(params_from_iter(row.iter()))
                .map_err(|e| Error::operation(self.to_string(), table.name(), e))?;
        }
        Ok(())
    }

    fn update_rows(&self, conn: &Connection, table: &Table) -> Result<()> {
        let live = self.live_metadata(conn, table)?;
        let columns = self.checked_columns(&live, table)?;
        let insert = insert_sql(&live.table_name, &columns);
        let refresh = *self == DatabaseOperation::Refresh;
        self.for_each_row(conn, table, |stmt, key, row| {
            let changed = stmt.execute(params_from_iter(row.iter().chain(key.iter().copied())))?;
            if changed == 0 && refresh {
                conn.prepare_cached(&insert)?
                    .execute(params_from_iter(row.iter()))?;
            }
            Ok(())
        })
    }

    // Runs a keyed statement (UPDATE ... WHERE pk or DELETE ... WHERE pk) once
    // per row, passing the row's key values.
    fn for_each_row<F>(&self, conn: &Connection, table: &Table, mut f: F) -> Result<()>
    where
        F: FnMut(&mut rusqlite::CachedStatement<'_>, Vec<&Value>, &[Value]) -> rusqlite::Result<()>,
    {
        let live = self.live_metadata(conn, table)?;
        let columns = self.checked_columns(&live, table)?;
        if table.rows().is_empty() {
            return Ok(());
        }
        let keys: Vec<usize> = live
            .primary_keys()
            .iter()
            .map(|pk| table.metadata().column_index(&pk.name))
            .collect::<Result<_>>()
            .map_err(|e| Error::operation(self.to_string(), table.name(), e))?;
        if keys.is_empty() {
            return Err(Error::operation(
                self.to_string(),
                table.name(),
                "table has no primary key",
            ));
        }

        let key_clause = keys
            .iter()
            .map(|&i| format!("{} = ?", quote_identifier(&columns[i])))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = match self {
            DatabaseOperation::Delete => format!(
                "DELETE FROM {} WHERE {}",
                quote_identifier(&live.table_name),
                key_clause
            ),
            _ => format!(
                "UPDATE {} SET {} WHERE {}",
                quote_identifier(&live.table_name),
                columns
                    .iter()
                    .map(|c| format!("{} = ?", quote_identifier(c)))
                    .collect::<Vec<_>>()
                    .join(", "),
                key_clause
            ),
        };

        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| Error::operation(self.to_string(), table.name(), e))?;
        for row in table.rows() {
            let key: Vec<&Value> = keys.iter().map(|&i| &row[i]).collect();
            f(&mut stmt, key, row).map_err(|e| Error::operation(self.to_string(), table.name(), e))?;
        }
        Ok(())
    }

    fn live_metadata(&self, conn: &Connection, table: &Table) -> Result<TableMetaData> {
        table_metadata(conn, table.name())
            .map_err(|e| Error::operation(self.to_string(), table.name(), e))
    }

    // Column names of the data set table, spelled as the live table spells them.
    fn checked_columns(&self, live: &TableMetaData, table: &Table) -> Result<Vec<String>> {
        table
            .metadata()
            .column_names()
            .map(|name| {
                live.column_index(name)
                    .map(|i| live.columns[i].name.clone())
                    .map_err(|e| Error::operation(self.to_string(), table.name(), e))
            })
            .collect()
    }
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", "),
        vec!["?"; columns.len()].join(", ")
    )
}

/// Operation run when a session sets up its database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupOperation {
    #[default]
    CleanInsert,
    Insert,
    None,
}

impl From<SetupOperation> for DatabaseOperation {
    fn from(op: SetupOperation) -> Self {
        match op {
            SetupOperation::CleanInsert => DatabaseOperation::CleanInsert,
            SetupOperation::Insert => DatabaseOperation::Insert,
            SetupOperation::None => DatabaseOperation::None,
        }
    }
}

/// Operation run when a session tears down its database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownOperation {
    #[default]
    DeleteAll,
    None,
}

impl From<TeardownOperation> for DatabaseOperation {
    fn from(op: TeardownOperation) -> Self {
        match op {
            TeardownOperation::DeleteAll => DatabaseOperation::DeleteAll,
            TeardownOperation::None => DatabaseOperation::None,
        }
    }
}
