//! Checkpointed item reader over the rows of one query.

use std::sync::Arc;

use derivative::Derivative;
use serde::Deserialize;
use tracing::debug;

use crate::base::ColumnSpec;
use crate::client::{ResultSet, Statement};
use crate::codec::CodecRegistry;
use crate::connector::{Checkpoint, ItemReader};
use crate::error::{Error, Result};
use crate::ops::shared::cassandra::{ConnectorContext, SessionManager, StopHandle};
use crate::settings::ConnectionSpec;
use crate::shape::{Item, ItemShape, Record, ShapeAdapter, Untyped};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spec {
    /// Query whose rows become items, in result order.
    pub cql: String,
    #[serde(default)]
    pub connection: ConnectionSpec,
    #[serde(default)]
    pub shape: ItemShape,
    /// Item keys (or record fields), one per result column. Defaults to the column names.
    pub column_mapping: Option<Vec<String>>,
    /// First 1-based row to deliver; `<= 0` means 1.
    #[serde(default)]
    pub start: i64,
    /// Last 1-based row to deliver, inclusive; 0 means unbounded.
    #[serde(default)]
    pub end: i64,
    pub fetch_size: Option<u32>,
    #[serde(default)]
    pub skip_validation: bool,
    /// Names resolved against the context's codec factories.
    #[serde(default)]
    pub custom_codecs: Vec<String>,
}

impl Spec {
    /// Normalized inclusive window.
    fn window(&self) -> Result<(u64, u64)> {
        let start = u64::try_from(self.start).unwrap_or(0).max(1);
        let end = match self.end {
            0 => u64::MAX,
            end if end < 0 || (end as u64) < start => {
                return Err(Error::config(
                    "end",
                    format!("{end} is less than start {start}"),
                ));
            }
            end => end as u64,
        };
        Ok((start, end))
    }
}

struct Cursor {
    rows: ResultSet,
    columns: Arc<[ColumnSpec]>,
    mapping: Vec<String>,
}

enum ReaderState {
    Unopened,
    Ready(Cursor),
    Exhausted,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct CassandraItemReader<T: Record = Untyped> {
    spec: Spec,
    start: u64,
    end: u64,
    #[derivative(Debug = "ignore")]
    sessions: Arc<SessionManager>,
    codecs: CodecRegistry,
    adapter: ShapeAdapter<T>,
    #[derivative(Debug = "ignore")]
    state: ReaderState,
    /// Rows consumed so far, skipped or delivered.
    position: u64,
}

impl<T: Record> CassandraItemReader<T> {
    pub fn new(spec: Spec, context: &ConnectorContext) -> Result<Self> {
        if spec.cql.trim().is_empty() {
            return Err(Error::config("cql", "a query is required"));
        }
        let (start, end) = spec.window()?;
        let codecs = context.codec_factories.build_registry(&spec.custom_codecs)?;
        let adapter = ShapeAdapter::new(spec.shape);
        if let Some(mapping) = &spec.column_mapping {
            adapter.check_mapping(mapping)?;
        }
        let sessions = Arc::new(SessionManager::new(context.provider.clone(), &spec.connection)?);
        Ok(Self {
            spec,
            start,
            end,
            sessions,
            codecs,
            adapter,
            state: ReaderState::Unopened,
            position: 0,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.sessions.stop_handle()
    }

    fn column_mapping(&self, columns: &[ColumnSpec]) -> Result<Vec<String>> {
        let mapping = match &self.spec.column_mapping {
            Some(mapping) if mapping.len() != columns.len() => {
                return Err(Error::config(
                    "column_mapping",
                    format!(
                        "{} names given for {} result columns: {mapping:?}",
                        mapping.len(),
                        columns.len()
                    ),
                ));
            }
            Some(mapping) => mapping.clone(),
            None => columns.iter().map(|c| c.name.clone()).collect(),
        };
        self.adapter.check_mapping(&mapping)?;
        Ok(mapping)
    }
}

impl<T: Record> ItemReader for CassandraItemReader<T> {
    type Item = Item<T>;

    fn open(&mut self, checkpoint: Option<Checkpoint>) -> Result<()> {
        let session = self.sessions.acquire()?;
        let statement = Statement::new(self.spec.cql.as_str()).with_fetch_size(self.spec.fetch_size);
        let mut rows = session.execute(&statement)?;
        let columns = rows.columns().clone();
        let mapping = self.column_mapping(&columns)?;

        // Never skip past the window end, whatever the checkpoint says.
        let ready = (self.start - 1)
            .max(checkpoint.map_or(0, Checkpoint::consumed))
            .min(self.end);
        let mut position = 0;
        while position < ready && rows.next_row()?.is_some() {
            position += 1;
        }
        debug!(skipped = position, ready, "positioned reader");

        self.position = position;
        self.state = ReaderState::Ready(Cursor {
            rows,
            columns,
            mapping,
        });
        Ok(())
    }

    fn read_item(&mut self) -> Result<Option<Item<T>>> {
        let cursor = match &mut self.state {
            ReaderState::Unopened => {
                return Err(Error::engine("read_item called before open"));
            }
            ReaderState::Exhausted => return Ok(None),
            ReaderState::Ready(cursor) => cursor,
        };
        if self.position >= self.end {
            self.state = ReaderState::Exhausted;
            return Ok(None);
        }
        let Some(row) = cursor.rows.next_row()? else {
            self.state = ReaderState::Exhausted;
            return Ok(None);
        };
        // A row that fails conversion still counts as consumed.
        self.position += 1;
        let item = self.adapter.to_item(
            &row,
            &cursor.columns,
            &cursor.mapping,
            &self.codecs,
            !self.spec.skip_validation,
        )?;
        Ok(Some(item))
    }

    fn checkpoint_info(&self) -> Option<Checkpoint> {
        match self.state {
            ReaderState::Unopened => None,
            _ => Some(Checkpoint(self.position + 1)),
        }
    }

    fn close(&mut self) {
        self.state = ReaderState::Unopened;
        self.sessions.release();
    }
}
