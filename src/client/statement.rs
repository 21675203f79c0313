//! Statements, bound parameters, batches and result sets exchanged with a [`Session`](super::Session).

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use unicase::UniCase;

use crate::base::{ColumnSpec, WireValue};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Statement
// ---------------------------------------------------------------------------

/// A one-off statement executed without preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    cql: String,
    fetch_size: Option<u32>,
}

impl Statement {
    pub fn new(cql: impl Into<String>) -> Self {
        Self {
            cql: cql.into(),
            fetch_size: None,
        }
    }

    /// Hint for how many rows the client should fetch per page.
    pub fn with_fetch_size(mut self, fetch_size: Option<u32>) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    pub fn cql(&self) -> &str {
        &self.cql
    }

    pub fn fetch_size(&self) -> Option<u32> {
        self.fetch_size
    }
}

// ---------------------------------------------------------------------------
// PreparedStatement / BoundStatement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    cql: String,
    variables: Vec<ColumnSpec>,
}

impl PreparedStatement {
    pub fn new(cql: impl Into<String>, variables: Vec<ColumnSpec>) -> Self {
        Self {
            cql: cql.into(),
            variables,
        }
    }

    pub fn cql(&self) -> &str {
        &self.cql
    }

    /// Bind markers in statement order.
    pub fn variables(&self) -> &[ColumnSpec] {
        &self.variables
    }

    /// Starts a binding with every variable unset.
    pub fn bind(self: &Arc<Self>) -> BoundStatement {
        BoundStatement {
            values: vec![BoundValue::Unset; self.variables.len()],
            prepared: self.clone(),
        }
    }
}

/// Unset leaves the column untouched by the write; null writes an explicit null.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BoundValue {
    #[default]
    Unset,
    Null,
    Value(WireValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    prepared: Arc<PreparedStatement>,
    values: Vec<BoundValue>,
}

impl BoundStatement {
    pub fn prepared(&self) -> &Arc<PreparedStatement> {
        &self.prepared
    }

    pub fn values(&self) -> &[BoundValue] {
        &self.values
    }

    /// Resolves a variable by exact name first, then case-insensitively.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        let variables = self.prepared.variables();
        variables.iter().position(|v| v.name == name).or_else(|| {
            let name = UniCase::new(name);
            variables.iter().position(|v| UniCase::new(v.name.as_str()) == name)
        })
    }

    fn require_index(&self, name: &str) -> Result<usize> {
        self.index_of(name).ok_or_else(|| {
            Error::conversion(format!(
                "`{name}` is not a variable of `{}`",
                self.prepared.cql()
            ))
        })
    }

    pub fn set(&mut self, name: &str, value: WireValue) -> Result<()> {
        let index = self.require_index(name)?;
        self.set_at(index, value)
    }

    pub fn set_at(&mut self, index: usize, value: WireValue) -> Result<()> {
        let variable = self.variable(index)?;
        if !value.conforms_to(&variable.typ) {
            return Err(Error::conversion(format!(
                "value `{value}` does not conform to `{}` of variable `{}`",
                variable.typ, variable.name
            )));
        }
        self.values[index] = BoundValue::Value(value);
        Ok(())
    }

    pub fn set_null(&mut self, name: &str) -> Result<()> {
        let index = self.require_index(name)?;
        self.set_null_at(index)
    }

    pub fn set_null_at(&mut self, index: usize) -> Result<()> {
        self.variable(index)?;
        self.values[index] = BoundValue::Null;
        Ok(())
    }

    pub fn variable(&self, index: usize) -> Result<&ColumnSpec> {
        self.prepared.variables().get(index).ok_or_else(|| {
            Error::conversion(format!(
                "variable index {index} out of range for `{}`",
                self.prepared.cql()
            ))
        })
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.index_of(name)
            .is_some_and(|i| self.values[i] != BoundValue::Unset)
    }
}

// ---------------------------------------------------------------------------
// BatchStatement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchType {
    #[default]
    Logged,
    Unlogged,
}

/// Several bound statements applied as one atomic network operation.
#[derive(Debug, Clone, Default)]
pub struct BatchStatement {
    batch_type: BatchType,
    statements: Vec<BoundStatement>,
}

impl BatchStatement {
    pub fn new(batch_type: BatchType) -> Self {
        Self {
            batch_type,
            statements: Vec::new(),
        }
    }

    pub fn batch_type(&self) -> BatchType {
        self.batch_type
    }

    pub fn add(&mut self, statement: BoundStatement) {
        self.statements.push(statement);
    }

    pub fn clear(&mut self) {
        self.statements.clear();
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> &[BoundStatement] {
        &self.statements
    }
}

// ---------------------------------------------------------------------------
// Row / ResultSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Option<WireValue>>,
}

impl Row {
    pub fn new(values: Vec<Option<WireValue>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Out-of-range positions read as null.
    pub fn is_null(&self, index: usize) -> bool {
        self.get(index).is_none()
    }

    pub fn get(&self, index: usize) -> Option<&WireValue> {
        self.values.get(index).and_then(Option::as_ref)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Row[{}]",
            self.values
                .iter()
                .map(|v| v.as_ref().map_or_else(|| "NULL".to_owned(), |v| v.to_string()))
                .join(", ")
        )
    }
}

pub type RowIter = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// Column metadata plus a forward-only row cursor. Fetching a row may hit the network.
pub struct ResultSet {
    columns: Arc<[ColumnSpec]>,
    rows: RowIter,
}

impl ResultSet {
    pub fn new(columns: impl Into<Arc<[ColumnSpec]>>, rows: RowIter) -> Self {
        Self {
            columns: columns.into(),
            rows,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Box::new(std::iter::empty()))
    }

    pub fn columns(&self) -> &Arc<[ColumnSpec]> {
        &self.columns
    }

    pub fn next_row(&mut self) -> Result<Option<Row>> {
        self.rows.next().transpose()
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::WireType;

    fn insert() -> Arc<PreparedStatement> {
        Arc::new(PreparedStatement::new(
            "INSERT INTO users (UserId, name) VALUES (?, ?)",
            vec![
                ColumnSpec::new("UserId", WireType::Int),
                ColumnSpec::new("name", WireType::Text),
            ],
        ))
    }

    #[test]
    fn bind_starts_unset() {
        let bound = insert().bind();
        assert_eq!(bound.values(), &[BoundValue::Unset, BoundValue::Unset]);
        assert!(!bound.is_set("name"));
    }

    #[test]
    fn name_lookup_prefers_exact_then_ignores_case() {
        let mut bound = insert().bind();
        assert_eq!(bound.index_of("UserId"), Some(0));
        assert_eq!(bound.index_of("userid"), Some(0));
        assert_eq!(bound.index_of("missing"), None);
        bound.set("USERID", WireValue::Int(7)).unwrap();
        assert!(bound.is_set("UserId"));
    }

    #[test]
    fn set_rejects_nonconforming_values() {
        let mut bound = insert().bind();
        let err = bound.set("name", WireValue::Int(1)).unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
        assert!(bound.set_at(5, WireValue::Int(1)).is_err());
        bound.set_null("name").unwrap();
        assert_eq!(bound.values()[1], BoundValue::Null);
    }

    #[test]
    fn row_display() {
        let row = Row::new(vec![Some(WireValue::Int(1)), None]);
        assert_eq!(row.to_string(), "Row[1, NULL]");
        assert!(row.is_null(1));
        assert!(row.is_null(9));
    }
}
