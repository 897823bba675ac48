use super::{DataSet, Table};
use std::cmp::Ordering;
use std::sync::Arc;

impl DataSet {
    /// Canonical ordering for order-independent comparisons.
    ///
    /// Tables are ordered by name and each table's rows are compared column
    /// by column in declared order. Both sorts are stable: rows that compare
    /// equal keep their original relative order.
    pub fn sorted(&self) -> DataSet {
        let mut tables: Vec<Arc<Table>> = self.tables.iter().map(|t| sort_rows(t)).collect();
        let case_sensitive = self.case_sensitive;
        tables.sort_by(|a, b| compare_names(a.name(), b.name(), case_sensitive));
        DataSet {
            tables,
            case_sensitive,
        }
    }
}

impl Table {
    pub fn sorted(&self) -> Table {
        let mut rows = self.rows.clone();
        rows.sort();
        Table {
            metadata: self.metadata.clone(),
            rows,
        }
    }

    pub(crate) fn is_sorted(&self) -> bool {
        self.rows.windows(2).all(|w| w[0] <= w[1])
    }
}

fn sort_rows(table: &Arc<Table>) -> Arc<Table> {
    if table.is_sorted() {
        Arc::clone(table)
    } else {
        Arc::new(table.sorted())
    }
}

fn compare_names(a: &str, b: &str, case_sensitive: bool) -> Ordering {
    if case_sensitive {
        a.cmp(b)
    } else {
        a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
    }
}
