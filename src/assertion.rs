//! First-divergence comparison of data sets and tables.
//!
//! Comparisons are positional: callers that do not control row order should
//! compare [`DataSet::sorted`] views. Only the expected table's columns are
//! checked, so an actual table may carry extra columns.
//!
//! Expected cells are read the way the actual column would have stored them
//! (see [`DataType::apply_affinity`]), so `"1"` matches an integer key and
//! `7` matches a text column holding `"7"`. When both tables arrive sorted,
//! the converted expected rows are sorted again so that both sides are in
//! stored-value order.

use crate::dataset::{DataSet, DataType, Table};
use crate::error::{Error, Mismatch, Result};
use crate::value::Value;

/// Fails with [`Error::ComparisonMismatch`] on the first difference found.
pub fn assert_equals(expected: &DataSet, actual: &DataSet) -> Result<()> {
    let mut expected_names = sorted_names(expected);
    let mut actual_names = sorted_names(actual);
    expected_names.dedup();
    actual_names.dedup();
    if expected_names != actual_names {
        return Err(Error::ComparisonMismatch(Mismatch::TableNames {
            expected: expected.table_names().iter().map(|n| n.to_string()).collect(),
            actual: actual.table_names().iter().map(|n| n.to_string()).collect(),
        }));
    }

    for table in expected.iter() {
        let other = actual.table(table.name())?;
        assert_table_equals(table, other)?;
    }
    Ok(())
}

pub fn assert_table_equals(expected: &Table, actual: &Table) -> Result<()> {
    let table_name = expected.name();
    let mut positions = Vec::with_capacity(expected.metadata().columns.len());
    for column in expected.metadata().column_names() {
        match actual.metadata().column_index(column) {
            Ok(index) => positions.push(index),
            Err(_) => {
                return Err(Error::ComparisonMismatch(Mismatch::MissingColumn {
                    table: table_name.to_string(),
                    column: column.to_string(),
                }))
            }
        }
    }

    if expected.row_count() != actual.row_count() {
        return Err(Error::ComparisonMismatch(Mismatch::RowCount {
            table: table_name.to_string(),
            expected: expected.row_count(),
            actual: actual.row_count(),
        }));
    }

    let types: Vec<DataType> = positions
        .iter()
        .map(|&position| actual.metadata().columns[position].data_type)
        .collect();
    let mut stored: Vec<Vec<Value>> = expected
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .zip(&types)
                .map(|(value, data_type)| data_type.apply_affinity(value))
                .collect()
        })
        .collect();
    if expected.is_sorted() && actual.is_sorted() {
        stored.sort();
    }

    for (row, (want, got)) in stored.iter().zip(actual.rows()).enumerate() {
        for (column, (value, &position)) in want.iter().zip(&positions).enumerate() {
            if *value != got[position] {
                return Err(Error::ComparisonMismatch(Mismatch::Value {
                    table: table_name.to_string(),
                    row,
                    column: expected.metadata().columns[column].name.clone(),
                    expected: value.to_string(),
                    actual: got[position].to_string(),
                }));
            }
        }
    }
    Ok(())
}

fn sorted_names(dataset: &DataSet) -> Vec<String> {
    let mut names: Vec<String> = dataset
        .table_names()
        .iter()
        .map(|n| n.to_ascii_lowercase())
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::{named_table, widget_table};
    use crate::dataset::{Column, TableMetaData};
    use crate::value::Value;

    #[test]
    fn equal_data_sets_pass() {
        let a = DataSet::new(vec![widget_table(&[(1, "a")]), named_table("other")]).unwrap();
        let b = DataSet::new(vec![named_table("OTHER"), widget_table(&[(1, "a")])]).unwrap();
        assert_equals(&a, &b).unwrap();
    }

    #[test]
    fn reports_first_divergent_cell() {
        let expected = DataSet::new(vec![widget_table(&[(1, "a"), (2, "b")])]).unwrap();
        let actual = DataSet::new(vec![widget_table(&[(1, "a"), (2, "c")])]).unwrap();
        let err = assert_equals(&expected, &actual).unwrap_err();
        match err {
            Error::ComparisonMismatch(Mismatch::Value { row, column, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "name");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reports_table_name_differences() {
        let expected = DataSet::new(vec![widget_table(&[])]).unwrap();
        let actual = DataSet::new(vec![widget_table(&[]), named_table("android_metadata")]).unwrap();
        let err = assert_equals(&expected, &actual).unwrap_err();
        assert!(matches!(err, Error::ComparisonMismatch(Mismatch::TableNames { .. })));
    }

    #[test]
    fn expected_cells_compare_as_the_column_stores_them() {
        let expected = Table::new(
            TableMetaData::new("widget", vec![Column::new("_id"), Column::new("name")]),
            vec![
                vec![Value::from("10"), Value::Integer(7)],
                vec![Value::from("9"), Value::Real(8.5)],
            ],
        )
        .unwrap()
        .sorted();
        let actual = widget_table(&[(9, "8.5"), (10, "7")]);
        assert_table_equals(&expected, &actual).unwrap();

        let wrong = widget_table(&[(9, "8.5"), (10, "8")]);
        match assert_table_equals(&expected, &wrong).unwrap_err() {
            Error::ComparisonMismatch(Mismatch::Value { row, column, expected, actual, .. }) => {
                assert_eq!((row, column.as_str()), (1, "name"));
                assert_eq!((expected.as_str(), actual.as_str()), ("'7'", "'8'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unsorted_tables_stay_positional() {
        let expected = Table::new(
            TableMetaData::new("widget", vec![Column::new("_id"), Column::new("name")]),
            vec![
                vec![Value::from("2"), Value::from("b")],
                vec![Value::from("1"), Value::from("a")],
            ],
        )
        .unwrap();
        assert_table_equals(&expected, &widget_table(&[(2, "b"), (1, "a")])).unwrap();
        assert!(assert_table_equals(&expected, &widget_table(&[(1, "a"), (2, "b")])).is_err());
    }

    #[test]
    fn reports_row_count_and_missing_columns() {
        let err = assert_table_equals(&widget_table(&[(1, "a")]), &widget_table(&[])).unwrap_err();
        assert!(matches!(err, Error::ComparisonMismatch(Mismatch::RowCount { expected: 1, actual: 0, .. })));

        let narrow = Table::new(
            TableMetaData::new("widget", vec![Column::new("_id")]),
            vec![vec![Value::Integer(1)]],
        )
        .unwrap();
        // Extra actual columns are fine; missing expected ones are not.
        assert_table_equals(&narrow, &widget_table(&[(1, "a")])).unwrap();
        let err = assert_table_equals(&widget_table(&[(1, "a")]), &narrow).unwrap_err();
        assert!(matches!(err, Error::ComparisonMismatch(Mismatch::MissingColumn { .. })));
    }
}
