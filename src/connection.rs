use crate::error::{Error, Result};
use futures::lock::Mutex;
use rusqlite::{CachedStatement, Connection};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task;
use tracing::{debug, trace, warn};

/// Idle connections kept when the settings leave the limit alone.
pub const DEFAULT_MAX_IDLE: usize = 2;

const MAX_BUSY_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

/// Backend drivers that can actually execute queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
}

const DRIVERS: &[(&str, Driver)] = &[("sqlite3", Driver::Sqlite), ("sqlite", Driver::Sqlite)];

impl Driver {
    pub fn resolve(name: &str) -> Result<Self> {
        let name = name.trim();
        DRIVERS
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(name))
            .map(|(_, driver)| *driver)
            .ok_or_else(|| Error::UnsupportedDriver(name.to_string()))
    }
}

/// Pool sizing, passed through from the activity settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on connections in use at once; 0 means unbounded.
    pub max_open: usize,
    pub max_idle: usize,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 0,
            max_idle: DEFAULT_MAX_IDLE,
            busy_timeout: None,
        }
    }
}

impl PoolConfig {
    pub fn with_max_open(mut self, max_open: usize) -> Self {
        self.max_open = max_open;
        self
    }
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }
}

/// A statement prepared once at construction and re-used on every call.
///
/// Each pooled connection keeps the compiled form in its statement cache, so
/// the handle only carries the SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedHandle {
    sql: String,
}

impl PreparedHandle {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn statement<'conn>(&self, conn: &'conn Connection) -> Result<CachedStatement<'conn>> {
        Ok(conn.prepare_cached(&self.sql)?)
    }
}

/// How to open a new connection; cloned onto the blocking pool.
#[derive(Debug, Clone)]
struct Connector {
    driver: Driver,
    data_source: String,
    busy_timeout: Option<Duration>,
}

impl Connector {
    fn connect(&self) -> Result<Connection> {
        let conn = match self.driver {
            Driver::Sqlite => Connection::open(&self.data_source),
        }
        .map_err(|source| Error::Connection {
            data_source: self.data_source.clone(),
            source,
        })?;
        if let Some(timeout) = self.busy_timeout {
            // sqlite takes the timeout as an int of milliseconds
            conn.busy_timeout(timeout.min(MAX_BUSY_TIMEOUT))?;
        }
        Ok(conn)
    }
}

/// Shared connections for one data source.
///
/// Connections are lent out through [`ConnectionPool::with_connection`].
/// Connecting, querying and closing run on tokio's blocking pool.
pub struct ConnectionPool {
    connector: Connector,
    max_idle: usize,
    idle: Mutex<Vec<Connection>>,
    permits: Option<Arc<Semaphore>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Open the pool, connecting once so a bad data source fails here.
    pub async fn open(driver: Driver, data_source: &str, config: PoolConfig) -> Result<Self> {
        let permits = if config.max_open > 0 {
            debug!(max_open = config.max_open, "limiting open connections");
            Some(Arc::new(Semaphore::new(config.max_open)))
        } else {
            None
        };
        if config.max_idle != DEFAULT_MAX_IDLE {
            debug!(max_idle = config.max_idle, "overriding idle connection limit");
        }

        let connector = Connector {
            driver,
            data_source: data_source.to_string(),
            busy_timeout: config.busy_timeout,
        };
        let first = {
            let connector = connector.clone();
            task::spawn_blocking(move || connector.connect()).await??
        };

        let mut idle = Vec::new();
        if config.max_idle > 0 {
            idle.push(first);
        } else {
            task::spawn_blocking(move || close_connection(first)).await?;
        }
        Ok(Self {
            connector,
            max_idle: config.max_idle,
            idle: Mutex::new(idle),
            permits,
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Run `f` on a pooled connection, opening one if none is idle.
    ///
    /// `f` runs on the blocking pool. If the returned future is dropped
    /// first, `f` still runs to completion and its connection is closed
    /// rather than pooled; the open-connection permit is held until then.
    pub async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }
        let permit = match &self.permits {
            Some(permits) => Some(
                Arc::clone(permits)
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::PoolClosed)?,
            ),
            None => None,
        };

        let pooled = self.idle.lock().await.pop();
        let connector = pooled.is_none().then(|| self.connector.clone());
        let (conn, result) = task::spawn_blocking(move || {
            let _permit = permit;
            let conn = match (pooled, connector) {
                (Some(conn), _) => conn,
                (None, Some(connector)) => {
                    trace!(data_source = %connector.data_source, "opening connection");
                    match connector.connect() {
                        Ok(conn) => conn,
                        Err(err) => return (None, Err(err)),
                    }
                }
                (None, None) => return (None, Err(Error::PoolClosed)),
            };
            let result = f(&conn);
            (Some(conn), result)
        })
        .await?;

        if let Some(conn) = conn {
            self.put_back(conn).await;
        }
        result
    }

    async fn put_back(&self, conn: Connection) {
        {
            let mut idle = self.idle.lock().await;
            // checked under the lock so release() cannot miss this connection
            if !self.is_closed() && idle.len() < self.max_idle {
                idle.push(conn);
                return;
            }
        }
        task::spawn_blocking(move || close_connection(conn));
    }

    /// Prepare `sql` once to validate it and warm a connection's cache.
    pub async fn prepare(&self, sql: &str) -> Result<PreparedHandle> {
        let handle = PreparedHandle {
            sql: sql.to_string(),
        };
        let warm = handle.clone();
        self.with_connection(move |conn| {
            warm.statement(conn)?;
            Ok(())
        })
        .await?;
        Ok(handle)
    }

    /// Drop cached statements held for `handle` by idle connections.
    pub async fn release_prepared(&self, handle: &PreparedHandle) -> Result<()> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }
        for conn in self.idle.lock().await.iter() {
            conn.flush_prepared_statement_cache();
        }
        trace!(sql = handle.sql(), "released prepared statement");
        Ok(())
    }

    /// Release `prepared` and then every connection.
    ///
    /// A failure releasing the prepared statement is logged and does not stop
    /// the connections from closing. The first connection close error is
    /// returned. Calling this again is a no-op.
    pub async fn release(&self, prepared: Option<&PreparedHandle>) -> Result<()> {
        if self.is_closed() {
            trace!("connection pool already released");
            return Ok(());
        }
        if let Some(handle) = prepared {
            if let Err(err) = self.release_prepared(handle).await {
                warn!(error = %err, "error releasing prepared statement");
            }
        }
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(permits) = &self.permits {
            permits.close();
        }

        let idle = std::mem::take(&mut *self.idle.lock().await);
        let first_error = task::spawn_blocking(move || {
            let mut first_error = None;
            for conn in idle {
                if let Err((_, err)) = conn.close() {
                    warn!(error = %err, "error closing connection");
                    first_error.get_or_insert(err);
                }
            }
            first_error
        })
        .await?;
        match first_error {
            Some(err) => Err(Error::Cleanup(err)),
            None => Ok(()),
        }
    }
}

fn close_connection(conn: Connection) {
    if let Err((_, err)) = conn.close() {
        warn!(error = %err, "error closing connection");
    }
}
