//! Store client contract. Drivers plug in behind these traits; connection topology,
//! retry and wire framing stay on the driver side.

pub mod cluster;
pub mod memory;
pub mod statement;

use std::sync::Arc;

pub use cluster::{ClusterConfig, Compression, Credentials, ProtocolVersion};
pub use statement::{
    BatchStatement, BatchType, BoundStatement, BoundValue, PreparedStatement, ResultSet, Row,
    RowIter, Statement,
};

use crate::error::Result;

/// Builds cluster handles from validated configuration.
pub trait Driver: Send + Sync {
    fn build(&self, config: &ClusterConfig) -> Result<Arc<dyn Cluster>>;
}

pub trait Cluster: Send + Sync {
    /// Opens a session, bound to `keyspace` when given.
    fn connect(&self, keyspace: Option<&str>) -> Result<Arc<dyn Session>>;

    fn close(&self) -> Result<()>;
}

/// A live connection. All calls block the calling thread.
pub trait Session: Send + Sync {
    fn execute(&self, statement: &Statement) -> Result<ResultSet>;

    fn prepare(&self, cql: &str) -> Result<Arc<PreparedStatement>>;

    fn execute_batch(&self, batch: &BatchStatement) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Must be safe to call while another thread is blocked in `execute`.
    fn close(&self) -> Result<()>;
}
