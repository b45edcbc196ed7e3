//! PostgreSQL graph store for production use.
//!
//! One connection pool is created at startup and shared by every
//! resolution. Catalog loads run in their own transaction; each query is a
//! single statement built from a [`QueryTemplate`] with bound parameters.
//!
//! Closure resolution is a recursive CTE. `UNION` (not `UNION ALL`)
//! discards rows already produced, which is what terminates traversal on
//! cyclic catalogs.
//!
//! Configuration comes from [`StoreConfig`](crate::config::StoreConfig).

use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::{Executor, Row};

use crate::catalog::Catalog;
use crate::config::StoreConfig;
use crate::types::{DatasetId, Variable, VariableId};
use super::query::{BoundQuery, ColumnRowMapper, QueryError, QueryParam, QueryTemplate, RowMapper};
use super::GraphStore;

/// Tables backing the store. Idempotent.
pub const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_datasets (
    dataset_id   TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    fingerprint  TEXT NOT NULL,
    loaded_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS catalog_variables (
    dataset_id   TEXT NOT NULL REFERENCES catalog_datasets(dataset_id) ON DELETE CASCADE,
    variable_id  TEXT NOT NULL,
    name         TEXT NOT NULL,
    data_type    TEXT,
    position     BIGINT NOT NULL,
    PRIMARY KEY (dataset_id, variable_id)
);
CREATE TABLE IF NOT EXISTS catalog_requires (
    dataset_id      TEXT NOT NULL REFERENCES catalog_datasets(dataset_id) ON DELETE CASCADE,
    origin_id       TEXT NOT NULL,
    destination_id  TEXT NOT NULL,
    kind            TEXT NOT NULL,
    position        BIGINT NOT NULL,
    PRIMARY KEY (dataset_id, position)
);
CREATE INDEX IF NOT EXISTS catalog_requires_origin_idx
    ON catalog_requires (dataset_id, origin_id);
"#;

const DELETE_DATASET: QueryTemplate = QueryTemplate::new(
    "delete_dataset",
    "DELETE FROM catalog_datasets WHERE dataset_id = $1",
    1,
);

const INSERT_DATASET: QueryTemplate = QueryTemplate::new(
    "insert_dataset",
    "INSERT INTO catalog_datasets (dataset_id, name, fingerprint) VALUES ($1, $2, $3)",
    3,
);

const INSERT_VARIABLE: QueryTemplate = QueryTemplate::new(
    "insert_variable",
    r#"
    INSERT INTO catalog_variables (dataset_id, variable_id, name, data_type, position)
    VALUES ($1, $2, $3, $4, $5)
    "#,
    5,
);

const INSERT_EDGE: QueryTemplate = QueryTemplate::new(
    "insert_edge",
    r#"
    INSERT INTO catalog_requires (dataset_id, origin_id, destination_id, kind, position)
    VALUES ($1, $2, $3, $4, $5)
    "#,
    5,
);

const LIST_DATASETS: QueryTemplate = QueryTemplate::new(
    "list_datasets",
    "SELECT dataset_id FROM catalog_datasets ORDER BY dataset_id",
    0,
);

const SELECT_VARIABLES: QueryTemplate = QueryTemplate::new(
    "select_variables",
    r#"
    SELECT variable_id, name, data_type
    FROM catalog_variables
    WHERE dataset_id = $1 AND variable_id = ANY($2)
    ORDER BY position
    "#,
    2,
);

const SELECT_REQUIREMENTS: QueryTemplate = QueryTemplate::new(
    "select_requirements",
    r#"
    SELECT DISTINCT v.variable_id, v.name, v.data_type, v.position
    FROM catalog_requires r
    JOIN catalog_variables v
      ON v.dataset_id = r.dataset_id AND v.variable_id = r.destination_id
    WHERE r.dataset_id = $1 AND r.origin_id = ANY($2)
    ORDER BY v.position
    "#,
    2,
);

const RESOLVE_CLOSURE: QueryTemplate = QueryTemplate::new(
    "resolve_closure",
    r#"
    WITH RECURSIVE reach(variable_id) AS (
        SELECT r.destination_id
        FROM catalog_requires r
        WHERE r.dataset_id = $1 AND r.origin_id = ANY($2)
      UNION
        SELECT r.destination_id
        FROM catalog_requires r
        JOIN reach ON r.origin_id = reach.variable_id
        WHERE r.dataset_id = $1
    )
    SELECT v.variable_id, v.name, v.data_type
    FROM reach
    JOIN catalog_variables v
      ON v.dataset_id = $1 AND v.variable_id = reach.variable_id
    ORDER BY v.position
    "#,
    2,
);

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Query construction or row mapping failed.
    #[error("Query error: {0}")]
    Query(#[from] QueryError),
    /// Connection settings are unusable.
    #[error("Invalid store configuration: {0}")]
    Config(String),
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

type PgRowMapper = dyn RowMapper<PgRow, Error = QueryError>;

/// PostgreSQL graph store.
pub struct PostgresGraphStore {
    pool: PgPool,
    mapper: Arc<PgRowMapper>,
}

impl PostgresGraphStore {
    /// Connect a pool with the given configuration.
    pub async fn new(config: StoreConfig) -> Result<Self, PostgresError> {
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect_with(connect_options(&config)?)
            .await?;

        Ok(Self::from_pool(pool))
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, PostgresError> {
        Self::new(StoreConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            mapper: Arc::new(ColumnRowMapper::default()),
        }
    }

    /// Install a different row mapper for result rows.
    pub fn with_row_mapper<M>(mut self, mapper: M) -> Self
    where
        M: RowMapper<PgRow, Error = QueryError> + 'static,
    {
        self.mapper = Arc::new(mapper);
        self
    }

    /// Create the catalog tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), PostgresError> {
        (&self.pool).execute(CATALOG_SCHEMA).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }

    async fn fetch_variables(&self, bound: BoundQuery) -> Result<Vec<Variable>, PostgresError> {
        let start = Instant::now();
        let rows = prepare(&bound).fetch_all(&self.pool).await?;
        tracing::trace!(
            query = bound.template().name(),
            rows = rows.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Query completed"
        );
        Ok(self.mapper.map_rows(&rows)?)
    }
}

fn connect_options(config: &StoreConfig) -> Result<PgConnectOptions, PostgresError> {
    if let Some(url) = &config.database_url {
        return url.parse::<PgConnectOptions>().map_err(PostgresError::from);
    }
    match config.protocol.as_str() {
        "postgres" | "postgresql" => Ok(PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)),
        other => Err(PostgresError::Config(format!("unsupported protocol {other}"))),
    }
}

/// Attach bound parameters to a statement in placeholder order.
fn prepare(bound: &BoundQuery) -> Query<'static, Postgres, PgArguments> {
    bound
        .params()
        .iter()
        .fold(sqlx::query(bound.text()), |query, param| match param {
            QueryParam::Text(s) => query.bind(s.clone()),
            QueryParam::TextList(list) => query.bind(list.clone()),
            QueryParam::Integer(i) => query.bind(*i),
        })
}

/// Replace one dataset's rows inside the caller's transaction.
async fn write_catalog(conn: &mut PgConnection, catalog: &Catalog) -> Result<(), PostgresError> {
    let dataset = catalog.id().as_str();

    prepare(&DELETE_DATASET.bind(vec![dataset.into()])?)
        .execute(&mut *conn)
        .await?;
    prepare(&INSERT_DATASET.bind(vec![
        dataset.into(),
        catalog.name().into(),
        catalog.fingerprint().into(),
    ])?)
    .execute(&mut *conn)
    .await?;

    for (position, variable) in catalog.variables().iter().enumerate() {
        let bound = INSERT_VARIABLE.bind(vec![
            dataset.into(),
            variable.id.as_str().into(),
            variable.name.as_str().into(),
            variable.data_type.as_str().into(),
            (position as i64).into(),
        ])?;
        prepare(&bound).execute(&mut *conn).await?;
    }

    for (position, edge) in catalog.edges().iter().enumerate() {
        let bound = INSERT_EDGE.bind(vec![
            dataset.into(),
            edge.origin.as_str().into(),
            edge.destination.as_str().into(),
            QueryParam::Text(edge.kind.to_string()),
            (position as i64).into(),
        ])?;
        prepare(&bound).execute(&mut *conn).await?;
    }

    tracing::info!(
        dataset_id = %catalog.id(),
        variables = catalog.variables().len(),
        edges = catalog.edges().len(),
        fingerprint = %catalog.fingerprint(),
        "Catalog written"
    );
    Ok(())
}

impl RowMapper<PgRow> for ColumnRowMapper {
    type Error = QueryError;

    fn map_row(&self, row: &PgRow) -> Result<Variable, QueryError> {
        let id: String = row
            .try_get(self.id_column.as_str())
            .map_err(|_| QueryError::MissingColumn(self.id_column.clone()))?;
        let name: String = row
            .try_get(self.name_column.as_str())
            .map_err(|_| QueryError::MissingColumn(self.name_column.clone()))?;
        let data_type = optional_column(
            row.try_get(self.data_type_column.as_str()),
            &self.data_type_column,
        )?;

        Ok(Variable::new(id, name, data_type.unwrap_or_default()))
    }
}

/// An absent optional column reads as NULL; a present but undecodable one is an error.
fn optional_column(
    value: Result<Option<String>, sqlx::Error>,
    column: &str,
) -> Result<Option<String>, QueryError> {
    match value {
        Ok(v) => Ok(v),
        Err(sqlx::Error::ColumnNotFound(_)) => Ok(None),
        Err(e) => {
            tracing::warn!(column, error = %e, "Undecodable result column");
            Err(QueryError::MissingColumn(column.to_string()))
        }
    }
}

#[async_trait]
impl GraphStore for PostgresGraphStore {
    type Error = PostgresError;

    async fn load_catalog(&self, catalog: &Catalog) -> Result<(), Self::Error> {
        let mut tx = self.pool.begin().await?;
        write_catalog(&mut *tx, catalog).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_catalogs(&self, catalogs: &[Arc<Catalog>]) -> Result<(), Self::Error> {
        let mut tx = self.pool.begin().await?;
        for catalog in catalogs {
            write_catalog(&mut *tx, catalog).await?;
        }
        tx.commit().await?;
        tracing::info!(dataset_count = catalogs.len(), "Catalog batch committed");
        Ok(())
    }

    async fn list_datasets(&self) -> Result<Vec<DatasetId>, Self::Error> {
        let rows = prepare(&LIST_DATASETS.bind(vec![])?).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("dataset_id").map(DatasetId::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }

    async fn get_variables(
        &self,
        dataset: &DatasetId,
        ids: &[VariableId],
    ) -> Result<Vec<Variable>, Self::Error> {
        let bound = SELECT_VARIABLES.bind(vec![dataset.as_str().into(), QueryParam::ids(ids)])?;
        self.fetch_variables(bound).await
    }

    async fn get_requirements(
        &self,
        dataset: &DatasetId,
        ids: &[VariableId],
    ) -> Result<Vec<Variable>, Self::Error> {
        let bound = SELECT_REQUIREMENTS.bind(vec![dataset.as_str().into(), QueryParam::ids(ids)])?;
        self.fetch_variables(bound).await
    }

    async fn resolve_closure(
        &self,
        dataset: &DatasetId,
        seeds: &[VariableId],
    ) -> Result<Vec<Variable>, Self::Error> {
        let bound = RESOLVE_CLOSURE.bind(vec![dataset.as_str().into(), QueryParam::ids(seeds)])?;
        self.fetch_variables(bound).await
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
