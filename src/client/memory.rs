//! In-process store implementing the client contract over plain tables.
//!
//! Understands `SELECT <cols|*> FROM <table> [LIMIT n]` and
//! `INSERT INTO <table> (<cols>) VALUES (<? | :name>, ...)`. Prepared insert
//! variables take the table's column spelling, as drivers report them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use regex::Regex;
use tracing::debug;
use unicase::UniCase;

use super::statement::{
    BatchStatement, BoundValue, PreparedStatement, ResultSet, Row, Statement,
};
use super::{Cluster, ClusterConfig, Driver, Session};
use crate::base::{ColumnSpec, WireType, WireValue};
use crate::error::{Error, Result};

static SELECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^\s*SELECT\s+(.+?)\s+FROM\s+([\w."]+)(?:\s+LIMIT\s+(\d+))?\s*;?\s*$"#)
        .expect("select pattern")
});

static INSERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^\s*INSERT\s+INTO\s+([\w."]+)\s*\(([^)]*)\)\s*VALUES\s*\(([^)]*)\)\s*;?\s*$"#)
        .expect("insert pattern")
});

fn unquote(ident: &str) -> &str {
    let ident = ident.trim();
    ident
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(ident)
}

/// `keyspace.table` and `table` address the same table.
fn table_key(name: &str) -> UniCase<String> {
    let name = name.rsplit('.').next().unwrap_or(name);
    UniCase::new(unquote(name).to_owned())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<Option<WireValue>>>,
}

impl Table {
    fn column_index(&self, name: &str) -> Result<usize> {
        let wanted = UniCase::new(unquote(name));
        self.columns
            .iter()
            .position(|c| UniCase::new(c.name.as_str()) == wanted)
            .ok_or_else(|| Error::store(format!("undefined column name {name}")))
    }
}

struct InsertPlan {
    table: UniCase<String>,
    targets: Vec<usize>,
    variables: Vec<ColumnSpec>,
}

// ---------------------------------------------------------------------------
// MemoryCluster
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Shared {
    tables: Mutex<HashMap<UniCase<String>, Table>>,
    rows_fetched: AtomicUsize,
    batches_executed: AtomicUsize,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    fail_next_batch: Mutex<Option<String>>,
    fail_close: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn plan_insert(&self, cql: &str) -> Result<InsertPlan> {
        let caps = INSERT_RE
            .captures(cql)
            .ok_or_else(|| Error::store(format!("unsupported statement: {cql}")))?;
        let key = table_key(&caps[1]);
        let tables = lock(&self.tables);
        let table = tables
            .get(&key)
            .ok_or_else(|| Error::store(format!("unconfigured table {}", &caps[1])))?;

        let names: Vec<&str> = caps[2].split(',').map(str::trim).collect();
        let markers: Vec<&str> = caps[3].split(',').map(str::trim).collect();
        if names.len() != markers.len() {
            return Err(Error::store(format!(
                "{} columns but {} values in: {cql}",
                names.len(),
                markers.len()
            )));
        }

        let mut targets = Vec::with_capacity(names.len());
        let mut variables = Vec::with_capacity(names.len());
        for (name, marker) in names.iter().zip(&markers) {
            let index = table.column_index(name)?;
            let column = &table.columns[index];
            let variable_name = match *marker {
                "?" => column.name.clone(),
                m if m.starts_with(':') && m.len() > 1 => unquote(&m[1..]).to_owned(),
                m => {
                    return Err(Error::store(format!(
                        "only bind markers are supported as values, got `{m}`"
                    )));
                }
            };
            targets.push(index);
            variables.push(ColumnSpec::new(variable_name, column.typ.clone()));
        }
        Ok(InsertPlan {
            table: key,
            targets,
            variables,
        })
    }

    fn select(self: &Arc<Self>, cql: &str) -> Result<ResultSet> {
        let caps = SELECT_RE
            .captures(cql)
            .ok_or_else(|| Error::store(format!("unsupported statement: {cql}")))?;
        let tables = lock(&self.tables);
        let table = tables
            .get(&table_key(&caps[2]))
            .ok_or_else(|| Error::store(format!("unconfigured table {}", &caps[2])))?;

        let projection: Vec<usize> = if caps[1].trim() == "*" {
            (0..table.columns.len()).collect()
        } else {
            caps[1]
                .split(',')
                .map(|name| table.column_index(name))
                .collect::<Result<_>>()?
        };
        let limit = match caps.get(3) {
            Some(m) => m
                .as_str()
                .parse::<usize>()
                .map_err(|e| Error::store(format!("invalid LIMIT: {e}")))?,
            None => usize::MAX,
        };

        let columns: Vec<ColumnSpec> = projection.iter().map(|&i| table.columns[i].clone()).collect();
        let rows: Vec<Row> = table
            .rows
            .iter()
            .take(limit)
            .map(|row| Row::new(projection.iter().map(|&i| row[i].clone()).collect()))
            .collect();

        let shared = self.clone();
        let iter = rows.into_iter().map(move |row| {
            shared.rows_fetched.fetch_add(1, Ordering::Relaxed);
            Ok(row)
        });
        Ok(ResultSet::new(columns, Box::new(iter)))
    }
}

/// A cheap-to-clone handle; clones share tables and counters.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    shared: Arc<Shared>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a table from `(name, cql type)` pairs.
    pub fn create_table(&self, name: &str, columns: &[(&str, &str)]) -> Result<()> {
        let columns = columns
            .iter()
            .map(|(name, typ)| Ok(ColumnSpec::new(*name, typ.parse::<WireType>()?)))
            .collect::<Result<Vec<_>>>()?;
        self.create_table_with_columns(name, columns);
        Ok(())
    }

    pub fn create_table_with_columns(&self, name: &str, columns: Vec<ColumnSpec>) {
        lock(&self.shared.tables).insert(
            table_key(name),
            Table {
                columns,
                rows: Vec::new(),
            },
        );
    }

    pub fn insert_row(&self, table: &str, values: Vec<Option<WireValue>>) -> Result<()> {
        let mut tables = lock(&self.shared.tables);
        let table = tables
            .get_mut(&table_key(table))
            .ok_or_else(|| Error::store(format!("unconfigured table {table}")))?;
        if values.len() != table.columns.len() {
            return Err(Error::store(format!(
                "expected {} values, got {}",
                table.columns.len(),
                values.len()
            )));
        }
        for (value, column) in values.iter().zip(&table.columns) {
            if let Some(value) = value
                && !value.conforms_to(&column.typ)
            {
                return Err(Error::store(format!(
                    "`{value}` is not a valid {} for column {}",
                    column.typ, column.name
                )));
            }
        }
        table.rows.push(values);
        Ok(())
    }

    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let tables = lock(&self.shared.tables);
        let table = tables
            .get(&table_key(table))
            .ok_or_else(|| Error::store(format!("unconfigured table {table}")))?;
        Ok(table.rows.iter().cloned().map(Row::new).collect())
    }

    /// Rows handed out by result-set cursors so far, including ones discarded while skipping.
    pub fn rows_fetched(&self) -> usize {
        self.shared.rows_fetched.load(Ordering::Relaxed)
    }

    pub fn batches_executed(&self) -> usize {
        self.shared.batches_executed.load(Ordering::Relaxed)
    }

    pub fn sessions_opened(&self) -> usize {
        self.shared.sessions_opened.load(Ordering::Relaxed)
    }

    pub fn sessions_closed(&self) -> usize {
        self.shared.sessions_closed.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Relaxed)
    }

    /// The next batch fails with `message` without applying any statement.
    pub fn fail_next_batch(&self, message: impl Into<String>) {
        *lock(&self.shared.fail_next_batch) = Some(message.into());
    }

    /// Makes every session close attempt fail.
    pub fn fail_on_close(&self, fail: bool) {
        self.shared.fail_close.store(fail, Ordering::Relaxed);
    }

    pub fn session(&self) -> Arc<dyn Session> {
        self.open_session(None)
    }

    fn open_session(&self, keyspace: Option<&str>) -> Arc<dyn Session> {
        self.shared.sessions_opened.fetch_add(1, Ordering::Relaxed);
        Arc::new(MemorySession {
            shared: self.shared.clone(),
            keyspace: keyspace.map(str::to_owned),
            closed: AtomicBool::new(false),
        })
    }
}

impl Cluster for MemoryCluster {
    fn connect(&self, keyspace: Option<&str>) -> Result<Arc<dyn Session>> {
        if self.is_closed() {
            return Err(Error::store("cluster is closed"));
        }
        Ok(self.open_session(keyspace))
    }

    fn close(&self) -> Result<()> {
        self.shared.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryDriver
// ---------------------------------------------------------------------------

/// Hands out the wrapped cluster for any configuration and records what it was given.
#[derive(Default)]
pub struct MemoryDriver {
    cluster: MemoryCluster,
    configs: Mutex<Vec<ClusterConfig>>,
}

impl MemoryDriver {
    pub fn new(cluster: MemoryCluster) -> Self {
        Self {
            cluster,
            configs: Mutex::new(Vec::new()),
        }
    }

    pub fn last_config(&self) -> Option<ClusterConfig> {
        lock(&self.configs).last().cloned()
    }
}

impl Driver for MemoryDriver {
    fn build(&self, config: &ClusterConfig) -> Result<Arc<dyn Cluster>> {
        lock(&self.configs).push(config.clone());
        Ok(Arc::new(self.cluster.clone()))
    }
}

// ---------------------------------------------------------------------------
// MemorySession
// ---------------------------------------------------------------------------

struct MemorySession {
    shared: Arc<Shared>,
    keyspace: Option<String>,
    closed: AtomicBool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::store("session is closed"));
        }
        Ok(())
    }
}

impl Session for MemorySession {
    fn execute(&self, statement: &Statement) -> Result<ResultSet> {
        self.ensure_open()?;
        debug!(
            cql = statement.cql(),
            keyspace = ?self.keyspace,
            fetch_size = ?statement.fetch_size(),
            "executing statement"
        );
        if INSERT_RE.is_match(statement.cql()) {
            return Err(Error::store("INSERT must be prepared and bound"));
        }
        self.shared.select(statement.cql())
    }

    fn prepare(&self, cql: &str) -> Result<Arc<PreparedStatement>> {
        self.ensure_open()?;
        if SELECT_RE.is_match(cql) {
            return Ok(Arc::new(PreparedStatement::new(cql, Vec::new())));
        }
        let plan = self.shared.plan_insert(cql)?;
        Ok(Arc::new(PreparedStatement::new(cql, plan.variables)))
    }

    fn execute_batch(&self, batch: &BatchStatement) -> Result<()> {
        self.ensure_open()?;
        if let Some(message) = lock(&self.shared.fail_next_batch).take() {
            return Err(Error::store(message));
        }

        let mut staged: Vec<(UniCase<String>, Vec<Option<WireValue>>)> = Vec::new();
        for statement in batch.statements() {
            let plan = self.shared.plan_insert(statement.prepared().cql())?;
            let width = lock(&self.shared.tables)
                .get(&plan.table)
                .map(|t| t.columns.len())
                .ok_or_else(|| Error::store("table dropped during batch"))?;
            let mut row = vec![None; width];
            for (value, &target) in statement.values().iter().zip(&plan.targets) {
                if let BoundValue::Value(v) = value {
                    row[target] = Some(v.clone());
                }
            }
            staged.push((plan.table, row));
        }

        let mut tables = lock(&self.shared.tables);
        for (table, row) in staged {
            if let Some(table) = tables.get_mut(&table) {
                table.rows.push(row);
            }
        }
        self.shared.batches_executed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn close(&self) -> Result<()> {
        if self.shared.fail_close.load(Ordering::Relaxed) {
            return Err(Error::store("failed to close session"));
        }
        if !self.closed.swap(true, Ordering::Relaxed) {
            self.shared.sessions_closed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
