use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single cell value as returned by the data source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) if value.is_finite() => Some(*value),
            Self::Text(value) => value.trim().parse::<f64>().ok().filter(|value| value.is_finite()),
            Self::Bool(_) | Self::Null | Self::Real(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Real(_))
    }

    /// Grouping key used when a column is treated as categorical.
    pub fn level(&self) -> Option<String> {
        match self {
            Self::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

pub type Row = BTreeMap<String, Scalar>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TableShapeError {
    #[error("column names must not be empty (position {0})")]
    EmptyColumnName(usize),
    #[error("duplicate column name `{0}`")]
    DuplicateColumn(String),
    #[error("row {row_index} has {found} values but the table has {expected} columns")]
    ArityMismatch { row_index: usize, expected: usize, found: usize },
    #[error("row {row_index} keys do not match the column set: {detail}")]
    KeyMismatch { row_index: usize, detail: String },
}

/// Rows returned for a descriptive question together with the query that produced them.
///
/// Every row carries exactly the keys in `columns`; the row count is always derived
/// from `rows` and cannot be set independently.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "TableWire")]
pub struct TabularResult {
    columns: Vec<String>,
    rows: Vec<Row>,
    generating_query: String,
}

impl TabularResult {
    pub fn new(
        generating_query: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Row>,
    ) -> Result<Self, TableShapeError> {
        let column_set = validate_columns(&columns)?;

        for (row_index, row) in rows.iter().enumerate() {
            let keys = row.keys().map(String::as_str).collect::<BTreeSet<_>>();
            if keys != column_set {
                let missing = column_set.difference(&keys).copied().collect::<Vec<_>>();
                let extra = keys.difference(&column_set).copied().collect::<Vec<_>>();
                return Err(TableShapeError::KeyMismatch {
                    row_index,
                    detail: format!("missing [{}], unexpected [{}]", missing.join(", "), extra.join(", ")),
                });
            }
        }

        Ok(Self { columns, rows, generating_query: generating_query.into() })
    }

    /// Builds a table from positional records, as produced by a database cursor.
    pub fn from_records(
        generating_query: impl Into<String>,
        columns: Vec<String>,
        records: Vec<Vec<Scalar>>,
    ) -> Result<Self, TableShapeError> {
        validate_columns(&columns)?;

        let mut rows = Vec::with_capacity(records.len());
        for (row_index, record) in records.into_iter().enumerate() {
            if record.len() != columns.len() {
                return Err(TableShapeError::ArityMismatch {
                    row_index,
                    expected: columns.len(),
                    found: record.len(),
                });
            }
            rows.push(columns.iter().cloned().zip(record).collect::<Row>());
        }

        Ok(Self { columns, rows, generating_query: generating_query.into() })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn generating_query(&self) -> &str {
        &self.generating_query
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Scalar> + 'a {
        self.rows.iter().filter_map(move |row| row.get(column))
    }
}

fn validate_columns(columns: &[String]) -> Result<BTreeSet<&str>, TableShapeError> {
    let mut seen = BTreeSet::new();
    for (position, column) in columns.iter().enumerate() {
        if column.trim().is_empty() {
            return Err(TableShapeError::EmptyColumnName(position));
        }
        if !seen.insert(column.as_str()) {
            return Err(TableShapeError::DuplicateColumn(column.clone()));
        }
    }
    Ok(seen)
}

impl Serialize for TabularResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        struct TableView<'a> {
            columns: &'a [String],
            rows: &'a [Row],
            generating_query: &'a str,
            row_count: usize,
        }

        TableView {
            columns: &self.columns,
            rows: &self.rows,
            generating_query: &self.generating_query,
            row_count: self.row_count(),
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize)]
struct TableWire {
    columns: Vec<String>,
    rows: Vec<Row>,
    generating_query: String,
}

impl TryFrom<TableWire> for TabularResult {
    type Error = TableShapeError;

    fn try_from(wire: TableWire) -> Result<Self, Self::Error> {
        Self::new(wire.generating_query, wire.columns, wire.rows)
    }
}
