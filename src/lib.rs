//! Checkpointed chunk readers and batch writers for Cassandra-compatible stores.
//!
//! A [`CassandraItemReader`] turns the rows of one query into items and can
//! resume from a [`Checkpoint`]; a [`CassandraItemWriter`] binds items to a
//! prepared statement and applies each chunk as one batch. Both talk to the
//! store through the [`client`] traits.

mod error;
mod internal;

pub mod base;
pub mod client;
pub mod codec;
pub mod connector;
pub mod logging;
pub mod ops;
pub mod settings;
pub mod shape;

// Flat re-exports
pub use base::{HostType, Value, WireType, WireValue};
pub use client::memory::{MemoryCluster, MemoryDriver};
pub use client::{Cluster, Driver, Session};
pub use codec::{Codec, CodecFactoryRegistry, CodecRegistry};
pub use connector::{Batchlet, Checkpoint, ItemReader, ItemWriter};
pub use error::{Error, Result};
pub use ops::batchlets::cassandra::{CassandraBatchlet, Spec as BatchletSpec};
pub use ops::shared::cassandra::{ConnectorContext, SessionManager, SessionProvider, StopHandle};
pub use ops::sources::cassandra::{CassandraItemReader, Spec as ReaderSpec};
pub use ops::storages::cassandra::{BatchAccumulator, CassandraItemWriter, Spec as WriterSpec};
pub use settings::ConnectionSpec;
pub use shape::{HostValue, Item, ItemShape, Record, RecordSchemaBuilder, Untyped, Violation};
