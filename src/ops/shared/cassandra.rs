//! Session acquisition and release shared by the reader, writer and batchlet.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::client::{Cluster, ClusterConfig, Driver, Session};
use crate::codec::CodecFactoryRegistry;
use crate::error::Result;
use crate::settings::ConnectionSpec;

/// Where sessions come from.
#[derive(Clone)]
pub enum SessionProvider {
    /// Used as-is and never closed here.
    Session(Arc<dyn Session>),
    /// Opens a session that is closed on release; the cluster is left open.
    Cluster(Arc<dyn Cluster>),
    /// Builds a cluster from the connection spec; both are closed on release.
    Driver(Arc<dyn Driver>),
}

impl std::fmt::Debug for SessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            SessionProvider::Session(_) => "Session",
            SessionProvider::Cluster(_) => "Cluster",
            SessionProvider::Driver(_) => "Driver",
        };
        write!(f, "SessionProvider::{kind}")
    }
}

/// Host-supplied collaborators for building connectors.
#[derive(Debug, Clone)]
pub struct ConnectorContext {
    pub provider: SessionProvider,
    pub codec_factories: Arc<CodecFactoryRegistry>,
}

impl ConnectorContext {
    pub fn new(provider: SessionProvider) -> Self {
        Self {
            provider,
            codec_factories: Arc::new(CodecFactoryRegistry::new()),
        }
    }

    pub fn with_codec_factories(mut self, factories: CodecFactoryRegistry) -> Self {
        self.codec_factories = Arc::new(factories);
        self
    }
}

#[derive(Default)]
struct Acquired {
    session: Option<Arc<dyn Session>>,
    /// Set only for clusters built here.
    cluster: Option<Arc<dyn Cluster>>,
    owned: bool,
}

/// Lazily acquires one session and releases what it created, exactly once.
pub struct SessionManager {
    provider: SessionProvider,
    keyspace: Option<String>,
    cluster_config: Option<ClusterConfig>,
    acquired: Mutex<Acquired>,
}

impl SessionManager {
    /// Cluster options are validated here, before any connection attempt.
    pub fn new(provider: SessionProvider, connection: &ConnectionSpec) -> Result<Self> {
        let cluster_config = match &provider {
            SessionProvider::Driver(_) => Some(ClusterConfig::from_spec(connection)?),
            _ => None,
        };
        Ok(Self {
            provider,
            keyspace: connection.keyspace.clone().filter(|k| !k.is_empty()),
            cluster_config,
            acquired: Mutex::new(Acquired::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Acquired> {
        self.acquired.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the current session, creating one if there is none open.
    /// Connecting happens outside the lock so `release` is never held up by it.
    pub fn acquire(&self) -> Result<Arc<dyn Session>> {
        let stale = {
            let mut acquired = self.lock();
            if let Some(session) = &acquired.session
                && !session.is_closed()
            {
                return Ok(session.clone());
            }
            std::mem::take(&mut *acquired)
        };
        // A closed session may still leave a built cluster behind.
        dispose(stale);

        let (session, fresh) = self.connect()?;
        let mut acquired = self.lock();
        if let Some(current) = &acquired.session
            && !current.is_closed()
        {
            // Another caller connected first; keep theirs.
            let current = current.clone();
            drop(acquired);
            dispose(fresh);
            return Ok(current);
        }
        let previous = std::mem::replace(&mut *acquired, fresh);
        drop(acquired);
        dispose(previous);
        Ok(session)
    }

    fn connect(&self) -> Result<(Arc<dyn Session>, Acquired)> {
        let keyspace = self.keyspace.as_deref();
        let (session, cluster, owned) = match &self.provider {
            SessionProvider::Session(session) => (session.clone(), None, false),
            SessionProvider::Cluster(cluster) => (cluster.connect(keyspace)?, None, true),
            SessionProvider::Driver(driver) => {
                let config = self.cluster_config.clone().unwrap_or_default();
                let cluster = driver.build(&config)?;
                match cluster.connect(keyspace) {
                    Ok(session) => (session, Some(cluster), true),
                    Err(err) => {
                        if let Err(close_err) = cluster.close() {
                            warn!(error = %close_err, "failed to close cluster after connect failure");
                        }
                        return Err(err);
                    }
                }
            }
        };
        if owned {
            info!(keyspace = ?keyspace, "opened session");
        }
        let acquired = Acquired {
            session: Some(session.clone()),
            cluster,
            owned,
        };
        Ok((session, acquired))
    }

    /// Whether the current session was created here.
    pub fn owns_session(&self) -> bool {
        self.lock().owned
    }

    /// Closes what this manager created. Never fails; errors are logged.
    pub fn release(&self) {
        let acquired = std::mem::take(&mut *self.lock());
        dispose(acquired);
    }

    pub fn stop_handle(self: &Arc<Self>) -> StopHandle {
        StopHandle(self.clone())
    }
}

/// Closes the owned session and built cluster of `acquired`, logging failures.
fn dispose(acquired: Acquired) {
    let Acquired {
        session,
        cluster,
        owned,
    } = acquired;
    if let Some(session) = session
        && owned
        && !session.is_closed()
    {
        match session.close() {
            Ok(()) => info!("closed session"),
            Err(err) => warn!(error = %err, "failed to close session"),
        }
    }
    if let Some(cluster) = cluster
        && let Err(err) = cluster.close()
    {
        warn!(error = %err, "failed to close cluster");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.release();
    }
}

/// Releases a connector's session from another thread, e.g. on job abort.
#[derive(Clone)]
pub struct StopHandle(Arc<SessionManager>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::client::memory::{MemoryCluster, MemoryDriver};

    /// Hands out a new cluster handle over one store per build and counts
    /// builds and closes. Closing a handle leaves the store usable.
    #[derive(Default)]
    struct CountingDriver {
        store: MemoryCluster,
        built: AtomicUsize,
        closed: Arc<AtomicUsize>,
        /// When set, every connect meets the test thread here twice.
        gate: Option<Arc<Barrier>>,
    }

    impl CountingDriver {
        fn gated(gate: Arc<Barrier>) -> Self {
            Self {
                gate: Some(gate),
                ..Default::default()
            }
        }

        fn built(&self) -> usize {
            self.built.load(Ordering::SeqCst)
        }

        fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct CountedCluster {
        store: MemoryCluster,
        closed: Arc<AtomicUsize>,
        gate: Option<Arc<Barrier>>,
    }

    impl Driver for CountingDriver {
        fn build(&self, _: &ClusterConfig) -> Result<Arc<dyn Cluster>> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountedCluster {
                store: self.store.clone(),
                closed: self.closed.clone(),
                gate: self.gate.clone(),
            }))
        }
    }

    impl Cluster for CountedCluster {
        fn connect(&self, keyspace: Option<&str>) -> Result<Arc<dyn Session>> {
            if let Some(gate) = &self.gate {
                gate.wait();
                gate.wait();
            }
            self.store.connect(keyspace)
        }

        fn close(&self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn connection() -> ConnectionSpec {
        ConnectionSpec {
            contact_points: vec!["127.0.0.1".into()],
            keyspace: Some("ks".into()),
            ..Default::default()
        }
    }

    #[test]
    fn acquire_is_idempotent() {
        let cluster = MemoryCluster::new();
        let manager =
            SessionManager::new(SessionProvider::Cluster(Arc::new(cluster.clone())), &connection())
                .unwrap();
        let first = manager.acquire().unwrap();
        let second = manager.acquire().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cluster.sessions_opened(), 1);
        assert!(manager.owns_session());
    }

    #[test]
    fn injected_session_is_never_closed() {
        let cluster = MemoryCluster::new();
        let session = cluster.session();
        let manager =
            SessionManager::new(SessionProvider::Session(session.clone()), &ConnectionSpec::default())
                .unwrap();
        manager.acquire().unwrap();
        manager.release();
        drop(manager);
        assert!(!session.is_closed());
        assert_eq!(cluster.sessions_closed(), 0);
    }

    #[test]
    fn built_cluster_is_closed_with_its_session() {
        let cluster = MemoryCluster::new();
        let driver = Arc::new(MemoryDriver::new(cluster.clone()));
        let manager = SessionManager::new(SessionProvider::Driver(driver.clone()), &connection()).unwrap();
        manager.acquire().unwrap();
        assert_eq!(driver.last_config().unwrap().contact_points.len(), 1);

        manager.release();
        manager.release();
        assert_eq!(cluster.sessions_closed(), 1);
        assert!(cluster.is_closed());
    }

    #[test]
    fn reconnect_closes_the_stale_cluster() {
        let driver = Arc::new(CountingDriver::default());
        let manager = SessionManager::new(SessionProvider::Driver(driver.clone()), &connection()).unwrap();
        let first = manager.acquire().unwrap();
        first.close().unwrap();

        let second = manager.acquire().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(driver.built(), 2);
        assert_eq!(driver.closed(), 1);

        manager.release();
        assert_eq!(driver.closed(), 2);
        assert!(second.is_closed());
    }

    #[test]
    fn stop_does_not_wait_for_a_pending_connect() {
        let gate = Arc::new(Barrier::new(2));
        let driver = Arc::new(CountingDriver::gated(gate.clone()));
        let manager = Arc::new(
            SessionManager::new(SessionProvider::Driver(driver.clone()), &connection()).unwrap(),
        );
        let connecting = {
            let manager = manager.clone();
            std::thread::spawn(move || manager.acquire().map(|_| ()))
        };

        // The other thread is now inside `connect`.
        gate.wait();
        manager.stop_handle().stop();
        gate.wait();
        connecting.join().unwrap().unwrap();

        manager.release();
        assert_eq!(driver.built(), 1);
        assert_eq!(driver.closed(), 1);
    }

    #[test]
    fn driver_config_is_validated_up_front() {
        let driver = Arc::new(MemoryDriver::new(MemoryCluster::new()));
        let err = SessionManager::new(SessionProvider::Driver(driver), &ConnectionSpec::default())
            .err()
            .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn release_swallows_close_failures() {
        let cluster = MemoryCluster::new();
        cluster.fail_on_close(true);
        let manager =
            SessionManager::new(SessionProvider::Cluster(Arc::new(cluster.clone())), &connection())
                .unwrap();
        manager.acquire().unwrap();
        manager.release();
        assert_eq!(cluster.sessions_closed(), 0);
    }

    #[test]
    fn stop_from_another_thread() {
        let cluster = MemoryCluster::new();
        let manager = Arc::new(
            SessionManager::new(SessionProvider::Cluster(Arc::new(cluster.clone())), &connection())
                .unwrap(),
        );
        let session = manager.acquire().unwrap();
        let handle = manager.stop_handle();
        std::thread::spawn(move || handle.stop()).join().unwrap();
        assert!(session.is_closed());
        // Stopping an idle manager is harmless.
        manager.stop_handle().stop();
    }
}
