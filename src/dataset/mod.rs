//! Immutable in-memory data sets: named tables of rows over a fixed column
//! schema.
//!
//! A [`DataSet`] is either written by a test author (the expected state) or
//! snapshotted from a live connection (the actual state). Tables are shared
//! behind `Arc`, so filtered and sorted views never copy rows they keep
//! unchanged.

pub mod filter;
mod sorted;

use crate::error::{Error, Result};
use crate::value::Value;
use std::sync::Arc;

pub use filter::{filter, ReservedTables, TableFilter, TableMatcher};

/// Storage affinity of a column, derived from its declared type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Real,
    Text,
    Blob,
    Numeric,
    /// No declared type: values are stored as given
    Unknown,
}

impl DataType {
    /// Applies SQLite's column affinity rules to a declared type name
    pub fn from_declared(declared: &str) -> Self {
        let declared = declared.to_ascii_uppercase();
        if declared.contains("INT") {
            DataType::Integer
        } else if declared.contains("CHAR") || declared.contains("CLOB") || declared.contains("TEXT")
        {
            DataType::Text
        } else if declared.contains("BLOB") {
            DataType::Blob
        } else if declared.contains("REAL") || declared.contains("FLOA") || declared.contains("DOUB")
        {
            DataType::Real
        } else if declared.trim().is_empty() {
            DataType::Unknown
        } else {
            DataType::Numeric
        }
    }

    /// The value a column of this affinity stores when `value` is written
    /// into it.
    ///
    /// Text that reads as a number becomes a number in numeric columns and
    /// numbers become text in text columns. Integral reals become integers
    /// under integer and numeric affinity. `NULL` and blobs never change.
    pub fn apply_affinity(&self, value: &Value) -> Value {
        match (self, value) {
            (_, Value::Null) | (_, Value::Blob(_)) => value.clone(),
            (DataType::Text, Value::Integer(i)) => Value::Text(i.to_string()),
            (DataType::Text, Value::Real(r)) => Value::Text(real_text(*r)),
            (DataType::Real, Value::Integer(i)) => Value::Real(*i as f64),
            (DataType::Real, Value::Text(s)) => match parse_numeric(s) {
                Some(Value::Integer(i)) => Value::Real(i as f64),
                Some(number) => number,
                None => value.clone(),
            },
            (DataType::Integer | DataType::Numeric, Value::Real(r)) => {
                integral(*r).unwrap_or_else(|| value.clone())
            }
            (DataType::Integer | DataType::Numeric, Value::Text(s)) => match parse_numeric(s) {
                Some(Value::Real(r)) => integral(r).unwrap_or(Value::Real(r)),
                Some(number) => number,
                None => value.clone(),
            },
            _ => value.clone(),
        }
    }
}

// Reals print with a fractional part, as SQLite renders them.
fn real_text(r: f64) -> String {
    if r.is_finite() && r.fract() == 0.0 && r.abs() < 1e15 {
        format!("{:.1}", r)
    } else {
        r.to_string()
    }
}

fn integral(r: f64) -> Option<Value> {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    (r.fract() == 0.0 && r >= -TWO_POW_63 && r < TWO_POW_63).then(|| Value::Integer(r as i64))
}

// Decimal integers and reals only; no hex, no `inf`/`nan` spellings.
fn parse_numeric(text: &str) -> Option<Value> {
    let text = text.trim();
    let numeric_chars = text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if text.is_empty() || !numeric_chars || !text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    text.parse::<f64>().ok().filter(|r| r.is_finite()).map(Value::Real)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
}

impl Column {
    /// A nullable column of unknown type, as inferred from a data set document
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Unknown,
            nullable: true,
            primary_key: false,
        }
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Name and column schema of one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetaData {
    pub table_name: String,
    pub columns: Vec<Column>,
}

impl TableMetaData {
    pub fn new(table_name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
        }
    }

    /// Position of a column, matched case-insensitively like SQLite identifiers
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::NoSuchColumn {
                table: self.table_name.clone(),
                column: name.to_string(),
            })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn primary_keys(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    metadata: TableMetaData,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Builds a table, rejecting rows whose width differs from the schema
    pub fn new(metadata: TableMetaData, rows: Vec<Vec<Value>>) -> Result<Self> {
        let width = metadata.columns.len();
        if let Some(index) = rows.iter().position(|row| row.len() != width) {
            return Err(Error::DataSet(format!(
                "row {} of table '{}' has {} values but the table has {} columns",
                index,
                metadata.table_name,
                rows[index].len(),
                width
            )));
        }
        Ok(Self { metadata, rows })
    }

    pub fn name(&self) -> &str {
        &self.metadata.table_name
    }

    pub fn metadata(&self) -> &TableMetaData {
        &self.metadata
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn value(&self, row: usize, column: &str) -> Result<&Value> {
        let index = self.metadata.column_index(column)?;
        self.rows
            .get(row)
            .map(|r| &r[index])
            .ok_or_else(|| {
                Error::DataSet(format!(
                    "row {} out of bounds for table '{}' with {} rows",
                    row,
                    self.name(),
                    self.rows.len()
                ))
            })
    }
}

/// An ordered collection of uniquely named tables
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    tables: Vec<Arc<Table>>,
    case_sensitive: bool,
}

impl Default for DataSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl DataSet {
    /// Builds a case-insensitive data set, rejecting duplicate table names
    pub fn new(tables: Vec<Table>) -> Result<Self> {
        Self::from_shared(tables.into_iter().map(Arc::new).collect(), false)
    }

    pub fn with_case_sensitivity(tables: Vec<Table>, case_sensitive: bool) -> Result<Self> {
        Self::from_shared(tables.into_iter().map(Arc::new).collect(), case_sensitive)
    }

    pub(crate) fn from_shared(tables: Vec<Arc<Table>>, case_sensitive: bool) -> Result<Self> {
        for (i, table) in tables.iter().enumerate() {
            if tables[..i]
                .iter()
                .any(|t| names_match(t.name(), table.name(), case_sensitive))
            {
                return Err(Error::DataSet(format!(
                    "duplicate table name '{}'",
                    table.name()
                )));
            }
        }
        Ok(Self {
            tables,
            case_sensitive,
        })
    }

    /// The data set with no tables
    pub const fn empty() -> Self {
        Self {
            tables: Vec::new(),
            case_sensitive: false,
        }
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name()).collect()
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| names_match(t.name(), name, self.case_sensitive))
            .map(|t| t.as_ref())
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.get_table(name)
            .ok_or_else(|| Error::NoSuchTable(name.to_string()))
    }

    pub fn table_metadata(&self, name: &str) -> Result<&TableMetaData> {
        self.table(name).map(Table::metadata)
    }

    /// Tables in data set order; `.rev()` walks them backwards
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Table> + ExactSizeIterator {
        self.tables.iter().map(|t| t.as_ref())
    }

    pub fn reverse_iter(&self) -> impl Iterator<Item = &Table> {
        self.iter().rev()
    }

    pub(crate) fn shared_tables(&self) -> &[Arc<Table>] {
        &self.tables
    }
}

pub(crate) fn names_match(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}
