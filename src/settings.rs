use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Where and how to connect when no session or cluster is supplied.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSpec {
    /// `host` or `host:port`; IPv6 literals in brackets.
    #[serde(default)]
    pub contact_points: Vec<String>,
    pub keyspace: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Named cluster options, matched case-insensitively, e.g. `Port`, `Compression`.
    #[serde(default)]
    pub cluster_properties: IndexMap<String, String>,
}

/// Loads a spec from `path` (format chosen by extension), overridden by
/// environment variables like `{PREFIX}_CQL` or `{PREFIX}_CONNECTION__KEYSPACE`.
pub fn load<S: DeserializeOwned>(path: impl AsRef<Path>, env_prefix: Option<&str>) -> Result<S> {
    let mut builder = config::Config::builder().add_source(config::File::from(path.as_ref()));
    if let Some(prefix) = env_prefix {
        builder = builder.add_source(
            config::Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
    }
    Ok(builder.build()?.try_deserialize()?)
}
