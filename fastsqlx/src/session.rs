//! Session per request
//!
//! [`SessionLayer`] puts an empty session slot into every request. The
//! [`Session`] extractor begins a transaction in that slot the first time a
//! handler asks for it. Once the handler has produced a response the layer
//! commits (success status) or rolls back (4xx/5xx), then returns the
//! connection to the pool.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use sqlx::{Any, AnyConnection, Transaction};
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};
use tower::{Layer, Service};

use crate::config::Backend;
use crate::database::Database;
use crate::error::{Error, Result};

type Tx = Transaction<'static, Any>;

/// Per-request slot holding the (lazily begun) transaction.
#[derive(Clone)]
struct SessionSlot {
    db: Database,
    tx: Arc<Mutex<Option<Tx>>>,
}

impl SessionSlot {
    fn new(db: Database) -> Self {
        Self {
            db,
            tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Commit or roll back depending on the response status.
    async fn finish(self, response: Response) -> Response {
        let Some(tx) = self.tx.lock().await.take() else {
            return response;
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "request failed: rolling back session");
            if let Err(e) = tx.rollback().await {
                tracing::error!(error = %e, "rollback failed");
            }
            tracing::debug!("closing session");
            return response;
        }

        tracing::debug!("request succeeded: committing session");
        let committed = tx.commit().await;
        tracing::debug!("closing session");
        match committed {
            Ok(()) => response,
            Err(e) => {
                // The failed transaction is dropped, which rolls it back.
                tracing::error!(error = %e, "commit failed: rolling back session");
                Error::Database(e).into_response()
            }
        }
    }
}

/// Finish a scoped transaction: commit on success, roll back on error.
pub(crate) async fn finish_scope<T, E>(tx: Tx, outcome: std::result::Result<T, E>) -> std::result::Result<T, E>
where
    E: From<Error>,
{
    let result = match outcome {
        Ok(value) => {
            tracing::debug!("context succeeded: committing session");
            match tx.commit().await {
                Ok(()) => Ok(value),
                Err(e) => {
                    tracing::error!(error = %e, "commit failed: rolling back session");
                    Err(E::from(Error::Database(e)))
                }
            }
        }
        Err(err) => {
            tracing::warn!("context failed: rolling back session");
            if let Err(e) = tx.rollback().await {
                tracing::error!(error = %e, "rollback failed");
            }
            Err(err)
        }
    };
    tracing::debug!("closing session");
    result
}

/// Tower layer that scopes one session to each request.
///
/// # Example
///
/// ```ignore
/// let db = Database::connect_from_env().await?;
/// let app = Router::new()
///     .route("/heroes", get(list_heroes))
///     .layer(db.session_layer());
/// ```
#[derive(Clone)]
pub struct SessionLayer {
    db: Database,
}

impl SessionLayer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            db: self.db.clone(),
        }
    }
}

/// Service produced by [`SessionLayer`].
#[derive(Clone)]
pub struct SessionService<S> {
    inner: S,
    db: Database,
}

impl<S> Service<Request> for SessionService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // The clone may not be ready; keep the service we polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let slot = SessionSlot::new(self.db.clone());
        req.extensions_mut().insert(slot.clone());

        Box::pin(async move {
            let response = inner.call(req).await?;
            Ok(slot.finish(response).await)
        })
    }
}

/// A transaction scoped to the current request.
///
/// Derefs to [`AnyConnection`], so it can be used as a sqlx executor with
/// `&mut *session`. Statements run immediately inside the transaction, so
/// constraint violations surface at execute time and can be mapped to a
/// client error by the handler.
pub struct Session {
    tx: OwnedMappedMutexGuard<Option<Tx>, Tx>,
    backend: Backend,
}

impl Session {
    pub(crate) async fn from_parts(parts: &Parts) -> Result<Self> {
        let slot = parts
            .extensions
            .get::<SessionSlot>()
            .cloned()
            .ok_or(Error::SessionLayerMissing)?;

        let mut guard = slot
            .tx
            .clone()
            .try_lock_owned()
            .map_err(|_| Error::SessionBusy)?;

        if guard.is_none() {
            let tx = slot.db.pool().begin().await?;
            tracing::debug!("opened session");
            *guard = Some(tx);
        }

        let tx = OwnedMutexGuard::try_map(guard, Option::as_mut).map_err(|_| Error::SessionBusy)?;
        Ok(Self {
            tx,
            backend: slot.db.backend(),
        })
    }

    /// Backend of the underlying connection, for building backend-specific SQL.
    pub fn backend(&self) -> Backend {
        self.backend
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        Self::from_parts(parts).await
    }
}

impl Deref for Session {
    type Target = AnyConnection;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tx
    }
}
