//! Loaders for data sets kept as test resources.
//!
//! A data set document maps table names to their rows, in either of two
//! shapes. The flat shape lists one object per row; columns are the union of
//! the keys in first-seen order and missing cells are `NULL`:
//!
//! ```yaml
//! widget:
//!   - { _id: 1, name: a }
//!   - { _id: 2 }
//! ```
//!
//! The full shape names the columns once and lists rows positionally:
//!
//! ```json
//! { "widget": { "columns": ["_id", "name"], "rows": [[1, "a"], [2, null]] } }
//! ```
//!
//! Tables keep document order.

use crate::dataset::{Column, DataSet, Table, TableMetaData};
use crate::error::{Error, Result};
use crate::value::Value;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;

/// Document formats a data set resource can be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetFormat {
    Json,
    Yaml,
}

impl DataSetFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(DataSetFormat::Json),
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Ok(DataSetFormat::Yaml)
            }
            _ => Err(Error::DataSet(format!(
                "cannot tell the data set format of {}",
                path.display()
            ))),
        }
    }
}

/// Loads a data set file, choosing the format by extension
pub fn load_data_set(path: impl AsRef<Path>) -> Result<DataSet> {
    let path = path.as_ref();
    let format = DataSetFormat::from_path(path)?;
    let reader = BufReader::new(File::open(path)?);
    match format {
        DataSetFormat::Json => load_json_data_set(reader),
        DataSetFormat::Yaml => load_yaml_data_set(reader),
    }
}

pub fn load_json_data_set(reader: impl Read) -> Result<DataSet> {
    let document: Document = serde_json::from_reader(reader)
        .map_err(|e| Error::DataSetLoad(e.into()))?;
    document.into_data_set()
}

pub fn load_yaml_data_set(reader: impl Read) -> Result<DataSet> {
    let document: Document = serde_yaml::from_reader(reader)
        .map_err(|e| Error::DataSetLoad(e.into()))?;
    document.into_data_set()
}

pub fn parse_json_data_set(text: &str) -> Result<DataSet> {
    load_json_data_set(text.as_bytes())
}

pub fn parse_yaml_data_set(text: &str) -> Result<DataSet> {
    load_yaml_data_set(text.as_bytes())
}

#[derive(Deserialize)]
#[serde(transparent)]
struct Document(OrderedMap<TableDocument>);

#[derive(Deserialize)]
#[serde(untagged)]
enum TableDocument {
    Flat(Vec<OrderedMap<serde_json::Value>>),
    Full {
        columns: Vec<String>,
        #[serde(default)]
        rows: Vec<Vec<serde_json::Value>>,
    },
}

impl Document {
    fn into_data_set(self) -> Result<DataSet> {
        let Document(OrderedMap(entries)) = self;
        let tables = entries
            .into_iter()
            .map(|(name, table)| table.into_table(name))
            .collect::<Result<Vec<_>>>()?;
        DataSet::new(tables)
    }
}

impl TableDocument {
    fn into_table(self, name: String) -> Result<Table> {
        match self {
            TableDocument::Full { columns, rows } => {
                let rows = rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|cell| cell_value(&name, cell))
                            .collect::<Result<Vec<Value>>>()
                    })
                    .collect::<Result<Vec<_>>>()?;
                let columns = columns.into_iter().map(Column::new).collect();
                Table::new(TableMetaData::new(name, columns), rows)
            }
            TableDocument::Flat(records) => {
                let mut columns: Vec<String> = Vec::new();
                let mut cells = Vec::with_capacity(records.len());
                for record in records {
                    let mut indexed = Vec::with_capacity(record.0.len());
                    for (key, cell) in record.0 {
                        let index = match columns.iter().position(|c| c.eq_ignore_ascii_case(&key)) {
                            Some(index) => index,
                            None => {
                                columns.push(key);
                                columns.len() - 1
                            }
                        };
                        indexed.push((index, cell_value(&name, cell)?));
                    }
                    cells.push(indexed);
                }
                let rows = cells
                    .into_iter()
                    .map(|indexed| {
                        let mut row = vec![Value::Null; columns.len()];
                        for (index, value) in indexed {
                            row[index] = value;
                        }
                        row
                    })
                    .collect();
                let columns = columns.into_iter().map(Column::new).collect();
                Table::new(TableMetaData::new(name, columns), rows)
            }
        }
    }
}

fn cell_value(table: &str, cell: serde_json::Value) -> Result<Value> {
    use serde_json::Value as Json;
    match cell {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::from(b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Integer(i)),
            None => n.as_f64().map(Value::Real).ok_or_else(|| {
                Error::DataSet(format!("number {} in table '{}' is out of range", n, table))
            }),
        },
        Json::String(s) => Ok(Value::Text(s)),
        other => Err(Error::DataSet(format!(
            "table '{}' has a non-scalar cell: {}",
            table, other
        ))),
    }
}

/// String-keyed map that remembers key order
struct OrderedMap<V>(Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map with string keys")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}
