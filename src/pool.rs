//! Per-database client pool.
//!
//! Schema-level objects live in one database and need a connection to that
//! database. [`ClientPool`] keeps one [`DatabaseClient`] per database name,
//! validates a cached client before handing it out, and replaces it when it
//! has gone stale. A default client built from the base DSN serves the
//! cluster-wide catalogs (`pg_roles`, `pg_database`).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::client::{ClientOptions, DatabaseClient};
use crate::error::{AccessError, AccessResult};

/// Hands out catalog clients by database tag.
#[async_trait]
pub trait DatabaseSource: Send + Sync {
    type Client: Catalog + 'static;

    /// Client for the cluster-wide catalogs.
    fn default_client(&self) -> Arc<Self::Client>;

    /// Database named by the connection string, if any.
    fn default_database(&self) -> Option<&str>;

    /// Client for the database with OID `tag`; an empty or non-numeric tag
    /// returns the default client.
    async fn get(&self, tag: &str) -> AccessResult<Arc<Self::Client>>;
}

/// A cached connection handle that can be health-checked and closed.
#[async_trait]
pub trait PooledHandle: Send + Sync {
    async fn validate(&self) -> bool;

    fn close(&self);
}

#[async_trait]
impl PooledHandle for DatabaseClient {
    async fn validate(&self) -> bool {
        match DatabaseClient::validate(self).await {
            Ok(()) => true,
            Err(err) => {
                log::debug!("validation of {} failed: {err}", self.database_name());
                false
            }
        }
    }

    fn close(&self) {
        DatabaseClient::close(self);
    }
}

/// Handles keyed by database name.
///
/// The lock covers lookup, eviction and insertion only. Validation and
/// connecting run without it.
pub struct ConnectionMap<H> {
    handles: Mutex<HashMap<String, Arc<H>>>,
}

impl<H> Default for ConnectionMap<H> {
    fn default() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }
}

impl<H: PooledHandle> ConnectionMap<H> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<H>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the cached handle for `name` if it still validates, otherwise
    /// evicts it and stores the result of `connect`.
    pub async fn get_or_connect<F, Fut>(&self, name: &str, connect: F) -> AccessResult<Arc<H>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AccessResult<H>>,
    {
        let cached = self.lock().get(name).cloned();

        if let Some(handle) = cached {
            if handle.validate().await {
                return Ok(handle);
            }

            log::warn!("connection to database {name} failed validation, reconnecting");
            let evicted = {
                let mut handles = self.lock();
                match handles.get(name) {
                    Some(current) if Arc::ptr_eq(current, &handle) => handles.remove(name),
                    _ => None,
                }
            };
            if evicted.is_some() {
                handle.close();
            }
        }

        let fresh = Arc::new(connect().await?);

        let (winner, lost) = {
            let mut handles = self.lock();
            match handles.get(name) {
                Some(existing) => (Arc::clone(existing), true),
                None => {
                    handles.insert(name.to_string(), Arc::clone(&fresh));
                    (Arc::clone(&fresh), false)
                }
            }
        };
        if lost {
            fresh.close();
        }

        Ok(winner)
    }

    /// Closes and forgets every handle.
    pub fn close_all(&self) {
        let drained: Vec<Arc<H>> = self.lock().drain().map(|(_, handle)| handle).collect();
        for handle in drained {
            handle.close();
        }
    }
}

/// Connection settings shared by every client the pool opens.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub client: ClientOptions,
    pub connect_timeout: Duration,
}

/// Database clients keyed by name, plus the default client.
pub struct ClientPool {
    base: tokio_postgres::Config,
    options: ClientOptions,
    default_client: Arc<DatabaseClient>,
    default_database: Option<String>,
    connections: ConnectionMap<DatabaseClient>,
}

impl ClientPool {
    /// Parses `dsn` and connects the default client.
    pub async fn connect(dsn: &str, options: PoolOptions) -> AccessResult<Self> {
        let mut base: tokio_postgres::Config = dsn
            .parse()
            .map_err(|err| AccessError::config(format!("invalid dsn: {err}")))?;
        base.connect_timeout(options.connect_timeout);

        let default_database = base.get_dbname().map(str::to_string);
        if let Some(name) = &default_database {
            log::info!("connection string names database {name}");
        }

        let default_client = DatabaseClient::connect(base.clone(), options.client.clone())
            .await
            .map_err(|err| {
                log::error!("failed to connect default client: {err}");
                err
            })?;

        Ok(Self {
            base,
            options: options.client,
            default_client: Arc::new(default_client),
            default_database,
            connections: ConnectionMap::new(),
        })
    }

    /// Closes the default client and every per-database client.
    pub fn close(&self) {
        self.connections.close_all();
        self.default_client.close();
    }

    async fn connect_database(&self, name: &str) -> AccessResult<DatabaseClient> {
        let mut config = self.base.clone();
        config.dbname(name);
        DatabaseClient::connect(config, self.options.clone())
            .await
            .map_err(|err| {
                log::error!("failed to connect to database {name}: {err}");
                match err {
                    AccessError::Connection { .. } => err,
                    other => AccessError::connection(name, other),
                }
            })
    }
}

#[async_trait]
impl DatabaseSource for ClientPool {
    type Client = DatabaseClient;

    fn default_client(&self) -> Arc<DatabaseClient> {
        Arc::clone(&self.default_client)
    }

    fn default_database(&self) -> Option<&str> {
        self.default_database.as_deref()
    }

    async fn get(&self, tag: &str) -> AccessResult<Arc<DatabaseClient>> {
        let oid = match tag.parse::<i64>() {
            Ok(oid) => oid,
            Err(_) => return Ok(self.default_client()),
        };

        let database = match self.default_client.get_database(oid).await {
            Ok(database) => database,
            Err(AccessError::NotFound { .. }) => {
                return Err(AccessError::DatabaseNotFound(tag.to_string()))
            }
            Err(err) => return Err(err),
        };

        if self.default_database.as_deref() == Some(database.name.as_str()) {
            return Ok(self.default_client());
        }

        self.connections
            .get_or_connect(&database.name, || self.connect_database(&database.name))
            .await
    }
}
