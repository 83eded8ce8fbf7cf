//! Result rows
//!
//! The control plane returns every cell as an optional string. Typed access
//! goes through the getters on [`Row`].

use crate::error::{ClientError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rows {
    pub columns: Arc<Vec<String>>,
    pub rows: Vec<Row>,
}

impl Rows {
    pub fn new(columns: Vec<String>, data: Vec<Vec<Option<String>>>) -> Self {
        let columns = Arc::new(columns);
        let rows = data
            .into_iter()
            .map(|values| Row {
                columns: Arc::clone(&columns),
                values,
            })
            .collect();
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row, or [`ClientError::NoRows`].
    pub fn first(self) -> Result<Row> {
        self.rows.into_iter().next().ok_or(ClientError::NoRows)
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Option<String>>,
}

impl Row {
    fn index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .ok_or_else(|| ClientError::Column(format!("column '{column}' not in result set")))
    }

    pub fn get_opt_str(&self, column: &str) -> Result<Option<String>> {
        let idx = self.index(column)?;
        Ok(self.values.get(idx).cloned().flatten())
    }

    /// Non-null string value. A NULL cell is an error.
    pub fn get_str(&self, column: &str) -> Result<String> {
        self.get_opt_str(column)?
            .ok_or_else(|| ClientError::Column(format!("column '{column}' is null")))
    }

    /// Positional access for result sets whose column names are not fixed.
    pub fn get_opt_str_at(&self, index: usize) -> Result<Option<String>> {
        self.values
            .get(index)
            .cloned()
            .ok_or_else(|| ClientError::Column(format!("column index {index} out of range")))
    }

    pub fn get_str_at(&self, index: usize) -> Result<String> {
        self.get_opt_str_at(index)?
            .ok_or_else(|| ClientError::Column(format!("column {index} is null")))
    }

    pub fn get_opt_i64(&self, column: &str) -> Result<Option<i64>> {
        self.get_opt_str(column)?
            .map(|v| {
                v.trim()
                    .parse::<i64>()
                    .map_err(|e| ClientError::Column(format!("column '{column}': {e}")))
            })
            .transpose()
    }

    pub fn get_opt_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>> {
        self.get_opt_str(column)?
            .map(|v| {
                parse_timestamp(&v).ok_or_else(|| {
                    ClientError::Column(format!("column '{column}': invalid timestamp '{v}'"))
                })
            })
            .transpose()
    }

    pub fn get_timestamp(&self, column: &str) -> Result<DateTime<Utc>> {
        self.get_opt_timestamp(column)?
            .ok_or_else(|| ClientError::Column(format!("column '{column}' is null")))
    }
}

/// Parse RFC 3339, falling back to the naive `YYYY-MM-DD HH:MM:SS[.f]` form
/// interpreted as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
