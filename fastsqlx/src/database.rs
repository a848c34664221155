//! Connection pool lifecycle
//!
//! Uses sqlx's `Any` driver so the backend is picked from the URL at
//! runtime. The pool is opened on startup, shared through a cheap
//! [`Database`] handle, and closed on shutdown.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::{Any, AnyPool, Transaction};

use crate::config::{Backend, DatabaseConfig};
use crate::error::{Error, Result};
use crate::reflect::{reflect_tables, Table, Tables};
use crate::session::{finish_scope, SessionLayer};

/// Shared database handle.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    pool: AnyPool,
    backend: Backend,
    tables: Tables,
}

impl Database {
    /// Open the pool and reflect the configured tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or a table cannot be
    /// reflected.
    pub async fn connect(config: DatabaseConfig) -> Result<Self> {
        install_default_drivers();

        let options = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .test_before_acquire(config.test_before_acquire);

        let pool = options.connect(&config.url).await?;

        let tables = if config.reflect.is_empty() {
            Tables::default()
        } else {
            let mut tx = pool.begin().await?;
            let tables = reflect_tables(&mut tx, config.backend, &config.reflect).await?;
            tx.commit().await?;
            tables
        };

        tracing::info!(
            backend = config.backend.name(),
            max_connections = config.max_connections,
            reflected = tables.len(),
            "configured database"
        );

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                pool,
                backend: config.backend,
                tables,
            }),
        })
    }

    /// Read [`DatabaseConfig`] from the environment and connect.
    pub async fn connect_from_env() -> Result<Self> {
        Self::connect(DatabaseConfig::from_env()?).await
    }

    pub fn pool(&self) -> &AnyPool {
        &self.inner.pool
    }

    pub fn backend(&self) -> Backend {
        self.inner.backend
    }

    /// A table reflected at startup.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.inner.tables.get(name)
    }

    /// Layer that gives each request its own [`Session`](crate::Session).
    pub fn session_layer(&self) -> SessionLayer {
        SessionLayer::new(self.clone())
    }

    /// Run `f` inside a transaction, committing when it returns `Ok` and
    /// rolling back when it returns `Err`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let id: i64 = db
    ///     .with_session(|tx| {
    ///         Box::pin(async move {
    ///             let id = sqlx::query_scalar("INSERT INTO hero (name) VALUES ('Hulk') RETURNING id")
    ///                 .fetch_one(&mut **tx)
    ///                 .await?;
    ///             Ok::<_, fastsqlx::Error>(id)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn with_session<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'static, Any>) -> BoxFuture<'c, std::result::Result<T, E>>,
        E: From<Error>,
    {
        let mut tx = self
            .inner
            .pool
            .begin()
            .await
            .map_err(|e| E::from(Error::Database(e)))?;
        let outcome = f(&mut tx).await;
        finish_scope(tx, outcome).await
    }

    /// Close the pool, waiting for checked-out connections to come back.
    pub async fn close(&self) {
        self.inner.pool.close().await;
        tracing::info!("cleared database config");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }
}

/// Bind the database to an application's lifetime.
///
/// Connects, runs `app` with the handle, then closes the pool once `app`
/// finishes. Startup errors are returned before `app` runs.
///
/// # Example
///
/// ```ignore
/// let config = DatabaseConfig::from_env()?;
/// fastsqlx::lifespan(config, |db| async move {
///     let app = router().layer(db.session_layer());
///     axum::serve(listener, app).await
/// })
/// .await??;
/// ```
pub async fn lifespan<F, Fut, T>(config: DatabaseConfig, app: F) -> Result<T>
where
    F: FnOnce(Database) -> Fut,
    Fut: Future<Output = T>,
{
    let db = Database::connect(config).await?;
    let output = app(db.clone()).await;
    db.close().await;
    Ok(output)
}

/// [`lifespan`] with the configuration read from the environment.
pub async fn lifespan_from_env<F, Fut, T>(app: F) -> Result<T>
where
    F: FnOnce(Database) -> Fut,
    Fut: Future<Output = T>,
{
    lifespan(DatabaseConfig::from_env()?, app).await
}
