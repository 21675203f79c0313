//! Runs one statement and reports its first row.

use std::sync::Arc;

use serde::Deserialize;

use crate::client::Statement;
use crate::connector::Batchlet;
use crate::error::{Error, Result};
use crate::ops::shared::cassandra::{ConnectorContext, SessionManager};
use crate::settings::ConnectionSpec;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spec {
    pub cql: String,
    #[serde(default)]
    pub connection: ConnectionSpec,
}

pub struct CassandraBatchlet {
    spec: Spec,
    sessions: Arc<SessionManager>,
}

impl CassandraBatchlet {
    pub fn new(spec: Spec, context: &ConnectorContext) -> Result<Self> {
        if spec.cql.trim().is_empty() {
            return Err(Error::config("cql", "a statement is required"));
        }
        let sessions = Arc::new(SessionManager::new(context.provider.clone(), &spec.connection)?);
        Ok(Self { spec, sessions })
    }

    fn run(&self) -> Result<Option<String>> {
        let session = self.sessions.acquire()?;
        let mut rows = session.execute(&Statement::new(self.spec.cql.as_str()))?;
        Ok(rows.next_row()?.map(|row| row.to_string()))
    }
}

impl Batchlet for CassandraBatchlet {
    /// The first result row rendered as text, or `None` for statements without rows.
    fn process(&mut self) -> Result<Option<String>> {
        let result = self.run();
        self.sessions.release();
        result
    }

    fn stop(&self) {}
}
