//! Cluster configuration built from a [`ConnectionSpec`].

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use tracing::warn;
use unicase::UniCase;

use crate::error::{Error, Result};
use crate::settings::ConnectionSpec;

pub const DEFAULT_PORT: u16 = 9042;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Snappy,
    Lz4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V1,
    V2,
    V3,
    V4,
    V5,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything a [`Driver`](super::Driver) needs to open a cluster handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub contact_points: Vec<SocketAddr>,
    pub port: u16,
    pub credentials: Option<Credentials>,
    pub cluster_name: Option<String>,
    pub compression: Compression,
    pub protocol_version: Option<ProtocolVersion>,
    pub max_schema_agreement_wait: Option<Duration>,
    pub metrics: bool,
    pub jmx_reporting: bool,
    pub ssl: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            contact_points: Vec::new(),
            port: DEFAULT_PORT,
            credentials: None,
            cluster_name: None,
            compression: Compression::None,
            protocol_version: None,
            max_schema_agreement_wait: None,
            metrics: true,
            jmx_reporting: true,
            ssl: false,
        }
    }
}

impl ClusterConfig {
    /// Applies named cluster properties, then resolves contact points against the final port.
    pub fn from_spec(spec: &ConnectionSpec) -> Result<Self> {
        let mut config = ClusterConfig::default();
        let mut user = spec.user.clone().filter(|u| !u.is_empty());
        let mut password = spec.password.clone().filter(|p| !p.is_empty());

        for (key, value) in &spec.cluster_properties {
            let key_ci = UniCase::new(key.as_str());
            let is = |name: &str| key_ci == UniCase::new(name);
            if is("ClusterName") {
                config.cluster_name = Some(value.clone());
            } else if is("Compression") {
                config.compression = parse_compression(key, value)?;
            } else if is("Port") {
                config.port = value
                    .trim()
                    .parse()
                    .map_err(|e| Error::config(key, format!("invalid port `{value}`: {e}")))?;
            } else if is("ProtocolVersion") {
                config.protocol_version = Some(parse_protocol_version(key, value)?);
            } else if is("MaxSchemaAgreementWaitSeconds") {
                let secs: u64 = value
                    .trim()
                    .parse()
                    .map_err(|e| Error::config(key, format!("invalid seconds `{value}`: {e}")))?;
                config.max_schema_agreement_wait = Some(Duration::from_secs(secs));
            } else if is("Metrics") {
                config.metrics = parse_bool(key, value)?;
            } else if is("JMXReporting") {
                config.jmx_reporting = parse_bool(key, value)?;
            } else if is("SSL") {
                config.ssl = parse_bool(key, value)?;
            } else if is("User") {
                user = user.or_else(|| Some(value.clone()));
            } else if is("Password") {
                password = password.or_else(|| Some(value.clone()));
            } else {
                warn!(property = %key, value = %value, "ignoring unrecognized cluster property");
            }
        }

        if let Some(user) = user.filter(|u| !u.is_empty()) {
            config.credentials = Some(Credentials {
                user,
                password: password.unwrap_or_default(),
            });
        }

        if spec.contact_points.is_empty() {
            return Err(Error::config("contact_points", "at least one contact point is required"));
        }
        for point in &spec.contact_points {
            config.contact_points.push(resolve_contact_point(point, config.port)?);
        }
        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::config(key, format!("expected true or false, got `{value}`"))),
    }
}

fn parse_compression(key: &str, value: &str) -> Result<Compression> {
    match value.trim().to_ascii_lowercase().as_str() {
        "none" => Ok(Compression::None),
        "snappy" => Ok(Compression::Snappy),
        "lz4" => Ok(Compression::Lz4),
        _ => Err(Error::config(key, format!("unknown compression `{value}`"))),
    }
}

fn parse_protocol_version(key: &str, value: &str) -> Result<ProtocolVersion> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix(['v', 'V'])
        .unwrap_or(trimmed);
    match digits {
        "1" => Ok(ProtocolVersion::V1),
        "2" => Ok(ProtocolVersion::V2),
        "3" => Ok(ProtocolVersion::V3),
        "4" => Ok(ProtocolVersion::V4),
        "5" => Ok(ProtocolVersion::V5),
        _ => Err(Error::config(key, format!("unknown protocol version `{value}`"))),
    }
}

/// Accepts `host`, `host:port`, `[v6-addr]` and `[v6-addr]:port`.
fn resolve_contact_point(point: &str, default_port: u16) -> Result<SocketAddr> {
    let point = point.trim();
    let (host, port) = if let Some(rest) = point.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| Error::config("contact_points", format!("unterminated `[` in `{point}`")))?;
        match tail.strip_prefix(':') {
            Some(port) => (host, Some(port)),
            None if tail.is_empty() => (host, None),
            None => return Err(Error::config("contact_points", format!("malformed `{point}`"))),
        }
    } else {
        match point.rsplit_once(':') {
            // A bare IPv6 literal has several colons and no port.
            Some((host, _)) if host.contains(':') => (point, None),
            Some((host, port)) => (host, Some(port)),
            None => (point, None),
        }
    };
    let port = match port {
        Some(port) => port.parse::<u16>().map_err(|e| {
            Error::config("contact_points", format!("invalid port in `{point}`: {e}"))
        })?,
        None => default_port,
    };
    (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::config("contact_points", format!("cannot resolve `{host}`: {e}")))?
        .next()
        .ok_or_else(|| Error::config("contact_points", format!("`{host}` resolved to no address")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(points: &[&str], props: &[(&str, &str)]) -> ConnectionSpec {
        ConnectionSpec {
            contact_points: points.iter().map(|s| s.to_string()).collect(),
            cluster_properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn contact_points_use_configured_port() {
        let config = ClusterConfig::from_spec(&spec(
            &["127.0.0.1", "127.0.0.2:9999", "[::1]"],
            &[("port", "9043")],
        ))
        .unwrap();
        assert_eq!(
            config.contact_points,
            vec![
                "127.0.0.1:9043".parse().unwrap(),
                "127.0.0.2:9999".parse().unwrap(),
                "[::1]:9043".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn named_options_are_case_insensitive() {
        let config = ClusterConfig::from_spec(&spec(
            &["127.0.0.1"],
            &[
                ("clustername", "trades"),
                ("COMPRESSION", "lz4"),
                ("ProtocolVersion", "V4"),
                ("maxSchemaAgreementWaitSeconds", "20"),
                ("Metrics", "false"),
                ("ssl", "true"),
            ],
        ))
        .unwrap();
        assert_eq!(config.cluster_name.as_deref(), Some("trades"));
        assert_eq!(config.compression, Compression::Lz4);
        assert_eq!(config.protocol_version, Some(ProtocolVersion::V4));
        assert_eq!(config.max_schema_agreement_wait, Some(Duration::from_secs(20)));
        assert!(!config.metrics);
        assert!(config.ssl);
    }

    #[test]
    fn unknown_options_are_ignored() {
        let config = ClusterConfig::from_spec(&spec(
            &["127.0.0.1"],
            &[("LoadBalancingPolicy", "com.example.Policy")],
        ))
        .unwrap();
        assert_eq!(config.contact_points.len(), 1);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for (props, points) in [
            (vec![("port", "not-a-port")], vec!["127.0.0.1"]),
            (vec![("Compression", "zstd")], vec!["127.0.0.1"]),
            (vec![], vec!["127.0.0.1:70000"]),
            (vec![], vec![]),
        ] {
            let err = ClusterConfig::from_spec(&spec(&points, &props)).unwrap_err();
            assert!(err.is_config(), "{err}");
        }
    }

    #[test]
    fn credentials_from_properties_only_fill_gaps() {
        let mut s = spec(&["127.0.0.1"], &[("user", "fallback"), ("password", "pw")]);
        s.user = Some("explicit".into());
        let config = ClusterConfig::from_spec(&s).unwrap();
        let creds = config.credentials.unwrap();
        assert_eq!(creds.user, "explicit");
        assert_eq!(creds.password, "pw");
        assert_eq!(format!("{creds:?}"), r#"Credentials { user: "explicit", password: "<redacted>" }"#);
    }
}
