//! Batch item writer: one prepared statement, one atomic batch per chunk.

use std::sync::Arc;

use derivative::Derivative;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, warn};
use unicase::UniCase;

use crate::base::Value;
use crate::client::{BatchStatement, BatchType, BoundStatement, PreparedStatement, Session};
use crate::codec::CodecRegistry;
use crate::connector::{Checkpoint, ItemWriter};
use crate::error::{Error, Result};
use crate::ops::shared::cassandra::{ConnectorContext, SessionManager, StopHandle};
use crate::settings::ConnectionSpec;
use crate::shape::{Item, ItemShape, ItemValues, Record, ShapeAdapter, Untyped};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spec {
    /// Insert or update statement with `?` or `:name` bind markers.
    pub cql: String,
    #[serde(default)]
    pub connection: ConnectionSpec,
    #[serde(default)]
    pub shape: ItemShape,
    /// Item keys tried, ignoring case, when a variable name has no exact match.
    pub parameter_names: Option<Vec<String>>,
    #[serde(default)]
    pub custom_codecs: Vec<String>,
    #[serde(default)]
    pub batch_type: BatchType,
}

// ---------------------------------------------------------------------------
// BatchAccumulator
// ---------------------------------------------------------------------------

/// Pending bound statements of the current chunk.
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    batch: BatchStatement,
}

impl BatchAccumulator {
    pub fn new(batch_type: BatchType) -> Self {
        Self {
            batch: BatchStatement::new(batch_type),
        }
    }

    pub fn add(&mut self, statement: BoundStatement) {
        self.batch.add(statement);
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn clear(&mut self) {
        self.batch.clear();
    }

    /// Executes the pending statements as one batch, then clears them whatever the outcome.
    pub fn flush(&mut self, session: &dyn Session) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        debug!(statements = self.batch.len(), batch_type = ?self.batch.batch_type(), "executing batch");
        let result = session.execute_batch(&self.batch);
        self.batch.clear();
        result
    }
}

// ---------------------------------------------------------------------------
// CassandraItemWriter
// ---------------------------------------------------------------------------

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct CassandraItemWriter<T: Record = Untyped> {
    spec: Spec,
    #[derivative(Debug = "ignore")]
    sessions: Arc<SessionManager>,
    codecs: CodecRegistry,
    adapter: ShapeAdapter<T>,
    #[derivative(Debug = "ignore")]
    session: Option<Arc<dyn Session>>,
    prepared: Option<Arc<PreparedStatement>>,
    batch: BatchAccumulator,
}

impl<T: Record> CassandraItemWriter<T> {
    pub fn new(spec: Spec, context: &ConnectorContext) -> Result<Self> {
        if spec.cql.trim().is_empty() {
            return Err(Error::config("cql", "a statement is required"));
        }
        let codecs = context.codec_factories.build_registry(&spec.custom_codecs)?;
        let sessions = Arc::new(SessionManager::new(context.provider.clone(), &spec.connection)?);
        Ok(Self {
            adapter: ShapeAdapter::new(spec.shape),
            batch: BatchAccumulator::new(spec.batch_type),
            spec,
            sessions,
            codecs,
            session: None,
            prepared: None,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.sessions.stop_handle()
    }

    /// Exact key first, then the configured aliases that equal `name` ignoring case.
    /// Null values count as absent.
    fn lookup<'a>(&self, values: &'a IndexMap<String, Value>, name: &str) -> Option<&'a Value> {
        let present = |key: &str| values.get(key).filter(|v| !v.is_null());
        present(name).or_else(|| {
            let name = UniCase::new(name);
            self.spec
                .parameter_names
                .iter()
                .flatten()
                .filter(|alias| UniCase::new(alias.as_str()) == name)
                .find_map(|alias| present(alias.as_str()))
        })
    }

    fn map_parameters(&self, prepared: &Arc<PreparedStatement>, item: Item<T>) -> Result<BoundStatement> {
        let mut bound = prepared.bind();
        match self.adapter.from_item(item)? {
            ItemValues::Positional(values) => {
                // Extra values are ignored; missing trailing ones bind null.
                for index in 0..prepared.variables().len() {
                    match values.get(index) {
                        Some(value) => self.codecs.bind_at(&mut bound, index, value)?,
                        None => bound.set_null_at(index)?,
                    }
                }
            }
            ItemValues::Named(values) => {
                for (index, variable) in prepared.variables().iter().enumerate() {
                    match self.lookup(&values, &variable.name) {
                        Some(value) => self.codecs.bind_at(&mut bound, index, value)?,
                        None => warn!(
                            parameter = %variable.name,
                            cql = %self.spec.cql,
                            "query parameter not bound"
                        ),
                    }
                }
            }
        }
        Ok(bound)
    }

    fn write_chunk(&mut self, items: Vec<Item<T>>) -> Result<()> {
        let (Some(session), Some(prepared)) = (self.session.clone(), self.prepared.clone()) else {
            return Err(Error::engine("write_items called before open"));
        };
        for item in items {
            let bound = self.map_parameters(&prepared, item)?;
            self.batch.add(bound);
        }
        self.batch.flush(session.as_ref())
    }
}

impl<T: Record> ItemWriter for CassandraItemWriter<T> {
    type Item = Item<T>;

    fn open(&mut self, _checkpoint: Option<Checkpoint>) -> Result<()> {
        let session = self.sessions.acquire()?;
        if self.prepared.is_none() || self.session.as_ref().is_none_or(|s| !Arc::ptr_eq(s, &session)) {
            self.prepared = Some(session.prepare(&self.spec.cql)?);
        }
        self.session = Some(session);
        Ok(())
    }

    fn write_items(&mut self, items: Vec<Item<T>>) -> Result<()> {
        let result = self.write_chunk(items);
        // A failed chunk must not leak statements into the next one.
        self.batch.clear();
        result
    }

    fn close(&mut self) {
        self.batch.clear();
        self.session = None;
        self.prepared = None;
        self.sessions.release();
    }
}
