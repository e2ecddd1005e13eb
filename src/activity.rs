use crate::binder::{bind_literal, bind_positional};
use crate::connection::{ConnectionPool, Driver, PoolConfig, PreparedHandle, DEFAULT_MAX_IDLE};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::results::{materialize, ResultSet, ResultShape, SqliteCursor};
use crate::statement::CompiledStatement;
use crate::value::Params;
use async_trait::async_trait;
use rusqlite::params_from_iter;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Name of the single output value of an invocation.
pub const RESULTS_OUTPUT: &str = "results";

fn default_max_idle() -> usize {
    DEFAULT_MAX_IDLE
}

/// Construction-time settings for a [`SqlQueryActivity`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Dialect identifier, e.g. `sqlite`, `postgres`, `mysql`.
    #[serde(alias = "dbType")]
    pub dialect: String,
    pub driver_name: String,
    #[serde(alias = "dataSourceDescriptor")]
    pub data_source_name: String,
    /// Select template with `:name` placeholders.
    pub query: String,
    #[serde(default, alias = "maxOpenConns")]
    pub max_open_connections: usize,
    #[serde(default = "default_max_idle", alias = "maxIdleConns")]
    pub max_idle_connections: usize,
    /// Splice escaped literals into the query instead of preparing it.
    #[serde(default, alias = "disablePrepared")]
    pub disable_prepared_statement: bool,
    /// Return rows as column-name maps rather than value lists.
    #[serde(default)]
    pub labeled_results: bool,
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

impl Settings {
    pub fn new(
        dialect: impl Into<String>,
        driver_name: impl Into<String>,
        data_source_name: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            dialect: dialect.into(),
            driver_name: driver_name.into(),
            data_source_name: data_source_name.into(),
            query: query.into(),
            max_open_connections: 0,
            max_idle_connections: DEFAULT_MAX_IDLE,
            disable_prepared_statement: false,
            labeled_results: false,
            busy_timeout_ms: None,
        }
    }

    /// Read settings from the host's JSON settings map.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|err| Error::Configuration(err.to_string()))
    }

    pub fn with_max_open_connections(mut self, max_open: usize) -> Self {
        self.max_open_connections = max_open;
        self
    }
    pub fn with_max_idle_connections(mut self, max_idle: usize) -> Self {
        self.max_idle_connections = max_idle;
        self
    }
    pub fn with_prepared_statement_disabled(mut self, disabled: bool) -> Self {
        self.disable_prepared_statement = disabled;
        self
    }
    pub fn with_labeled_results(mut self, labeled: bool) -> Self {
        self.labeled_results = labeled;
        self
    }
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn pool_config(&self) -> PoolConfig {
        let config = PoolConfig::default()
            .with_max_open(self.max_open_connections)
            .with_max_idle(self.max_idle_connections);
        match self.busy_timeout_ms {
            Some(ms) => config.with_busy_timeout(Duration::from_millis(ms)),
            None => config,
        }
    }

    pub fn result_shape(&self) -> ResultShape {
        if self.labeled_results {
            ResultShape::Labeled
        } else {
            ResultShape::Positional
        }
    }
}

/// Per-invocation input
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Input {
    #[serde(default)]
    pub params: Params,
}

impl Input {
    pub fn new(params: Params) -> Self {
        Self { params }
    }
}

/// Per-invocation output, serialized as `{"results": ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    pub results: ResultSet,
}

/// Lifecycle the hosting framework drives: build once, evaluate many times,
/// clean up once.
#[async_trait]
pub trait Activity: Send + Sync {
    async fn eval(&self, input: Input) -> Result<Output>;

    async fn cleanup(&self) -> Result<()>;
}

/// Runs one compiled select template against a pooled data source.
pub struct SqlQueryActivity {
    dialect: Dialect,
    statement: CompiledStatement,
    pool: ConnectionPool,
    prepared: Option<PreparedHandle>,
    shape: ResultShape,
}

impl SqlQueryActivity {
    /// Build the activity. Nothing usable is returned on failure, and a pool
    /// opened along the way is released first.
    pub async fn new(settings: Settings) -> Result<Self> {
        info!(
            dialect = %settings.dialect,
            driver = %settings.driver_name,
            "creating sql query activity"
        );

        let dialect = Dialect::resolve(&settings.dialect)?;
        let driver = Driver::resolve(&settings.driver_name)?;
        let statement = CompiledStatement::compile(&settings.query, dialect)?;
        info!(query = %settings.query, placeholders = ?statement.placeholder_names(), "compiled query");

        let pool =
            ConnectionPool::open(driver, &settings.data_source_name, settings.pool_config()).await?;

        let prepared = if settings.disable_prepared_statement {
            debug!("prepared statement disabled, using literal substitution");
            None
        } else {
            debug!(sql = statement.prepared_sql(), "using prepared statement");
            match pool.prepare(statement.prepared_sql()).await {
                Ok(handle) => Some(handle),
                Err(err) => {
                    if let Err(cleanup) = pool.release(None).await {
                        warn!(error = %cleanup, "error releasing connection pool");
                    }
                    return Err(err);
                }
            }
        };

        Ok(Self {
            dialect,
            statement,
            pool,
            prepared,
            shape: settings.result_shape(),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn statement(&self) -> &CompiledStatement {
        &self.statement
    }

    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    async fn select(&self, params: &Params) -> Result<ResultSet> {
        let dialect = self.dialect;
        let shape = self.shape;

        match &self.prepared {
            Some(handle) => {
                let args = bind_positional(&self.statement, params);
                trace!(args = ?args, "executing prepared statement");
                let handle = handle.clone();
                self.pool
                    .with_connection(move |conn| {
                        let mut stmt = handle.statement(conn)?;
                        let mut cursor = SqliteCursor::query(&mut stmt, params_from_iter(args.iter()))?;
                        materialize(&mut cursor, dialect, shape)
                    })
                    .await
            }
            None => {
                let sql = bind_literal(&self.statement, params)?;
                trace!(sql = %sql, "executing statement");
                self.pool
                    .with_connection(move |conn| {
                        let mut stmt = conn.prepare(&sql)?;
                        let mut cursor = SqliteCursor::query(&mut stmt, rusqlite::params![])?;
                        materialize(&mut cursor, dialect, shape)
                    })
                    .await
            }
        }
    }
}

#[async_trait]
impl Activity for SqlQueryActivity {
    async fn eval(&self, input: Input) -> Result<Output> {
        debug!(params = input.params.len(), "evaluating sql query");
        let results = self.select(&input.params).await?;
        debug!(rows = results.len(), "sql query returned");
        Ok(Output { results })
    }

    async fn cleanup(&self) -> Result<()> {
        trace!("cleaning up sql query activity");
        self.pool.release(self.prepared.as_ref()).await
    }
}
