//! Removes engine and platform bookkeeping tables from a data set.
//!
//! A live snapshot of a SQLite database contains tables nobody wrote a
//! fixture for (`sqlite_sequence`, `android_metadata`, statistics tables).
//! Comparing it against an expected data set only makes sense once those are
//! gone.

use super::{DataSet, Table};
use std::sync::Arc;

/// One reserved-name rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableMatcher {
    Exact(String),
    Prefix(String),
}

impl TableMatcher {
    fn matches(&self, name: &str, case_sensitive: bool) -> bool {
        match (self, case_sensitive) {
            (TableMatcher::Exact(exact), true) => name == exact,
            (TableMatcher::Exact(exact), false) => name.eq_ignore_ascii_case(exact),
            (TableMatcher::Prefix(prefix), true) => name.starts_with(prefix.as_str()),
            (TableMatcher::Prefix(prefix), false) => name
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
        }
    }
}

/// Fixed set of table names that never take part in comparisons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedTables {
    matchers: Vec<TableMatcher>,
    case_sensitive: bool,
}

impl ReservedTables {
    /// Tables maintained by SQLite itself and by Android's database helpers.
    pub fn platform() -> Self {
        Self::new(vec![
            TableMatcher::Exact("android_metadata".to_string()),
            TableMatcher::Exact("sqlite_sequence".to_string()),
            TableMatcher::Prefix("sqlite_".to_string()),
        ])
    }

    pub fn new(matchers: Vec<TableMatcher>) -> Self {
        Self {
            matchers,
            case_sensitive: false,
        }
    }

    /// Exact-name set, e.g. `ReservedTables::names(["android_metadata"])`
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|n| TableMatcher::Exact(n.into()))
                .collect(),
        )
    }

    pub fn with_case_sensitivity(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn is_reserved(&self, table_name: &str) -> bool {
        self.matchers
            .iter()
            .any(|m| m.matches(table_name, self.case_sensitive))
    }
}

impl Default for ReservedTables {
    fn default() -> Self {
        Self::platform()
    }
}

/// Returns a view of `dataset` without the reserved tables.
///
/// The input is left untouched and surviving tables are shared, not copied.
pub fn filter(dataset: &DataSet, reserved: &ReservedTables) -> DataSet {
    let tables: Vec<Arc<Table>> = dataset
        .shared_tables()
        .iter()
        .filter(|t| !reserved.is_reserved(t.name()))
        .cloned()
        .collect();
    DataSet {
        tables,
        case_sensitive: dataset.is_case_sensitive(),
    }
}

/// A reserved set bundled for repeated use
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    reserved: ReservedTables,
}

impl TableFilter {
    pub fn new(reserved: ReservedTables) -> Self {
        Self { reserved }
    }

    pub fn platform() -> Self {
        Self::new(ReservedTables::platform())
    }

    pub fn reserved(&self) -> &ReservedTables {
        &self.reserved
    }

    pub fn apply(&self, dataset: &DataSet) -> DataSet {
        filter(dataset, &self.reserved)
    }
}
