//! Hero endpoints
//!
//! - `GET /heroes` - paginated list
//! - `GET /heroes/{id}` - single hero
//! - `POST /heroes` - create, 409 when the name is taken

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use fastsqlx::{Backend, Database, Item, Page, Paginate, Session};
use serde::{Deserialize, Serialize};
use serde_json::json;

const HERO_COLUMNS: &str = "id, name, secret_identity, age";

/// Hero record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Hero {
    pub id: i64,
    pub name: String,
    pub secret_identity: String,
    pub age: i64,
}

/// Create hero request
#[derive(Debug, Deserialize)]
pub struct CreateHeroRequest {
    pub name: String,
    pub secret_identity: String,
    pub age: i64,
}

/// Handler errors with HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found (404)
    NotFound { resource: &'static str, id: String },

    /// Unique constraint hit (409)
    Conflict { message: String },

    /// Anything raised by fastsqlx (mapped by fastsqlx)
    Database(fastsqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "not_found",
                    "message": format!("{} '{}' not found", resource, id)
                })),
            )
                .into_response(),
            Self::Conflict { message } => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "conflict",
                    "message": message
                })),
            )
                .into_response(),
            Self::Database(e) => e.into_response(),
        }
    }
}

impl From<fastsqlx::Error> for ApiError {
    fn from(e: fastsqlx::Error) -> Self {
        Self::Database(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.into())
    }
}

/// Bind placeholder `n` (1-based) in the backend's native syntax.
fn param(backend: Backend, n: usize) -> String {
    match backend {
        Backend::Postgres => format!("${n}"),
        Backend::Sqlite => "?".to_string(),
    }
}

/// Create the hero table if it does not exist.
pub async fn create_schema(db: &Database) -> Result<(), fastsqlx::Error> {
    let ddl = match db.backend() {
        Backend::Postgres => {
            r#"
            CREATE TABLE IF NOT EXISTS hero (
                id              BIGSERIAL PRIMARY KEY,
                name            TEXT NOT NULL UNIQUE,
                secret_identity TEXT NOT NULL,
                age             BIGINT NOT NULL
            )
            "#
        }
        Backend::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS hero (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL UNIQUE,
                secret_identity TEXT NOT NULL,
                age             INTEGER NOT NULL
            )
            "#
        }
    };

    sqlx::query(ddl).execute(db.pool()).await?;
    Ok(())
}

/// GET /heroes - list heroes with pagination
async fn list_heroes(mut paginate: Paginate) -> Result<Page<Hero>, ApiError> {
    let page = paginate
        .paginate(format!("SELECT {HERO_COLUMNS} FROM hero ORDER BY id"))
        .await?;
    Ok(page)
}

/// GET /heroes/{id} - get a single hero
async fn get_hero(mut session: Session, Path(id): Path<i64>) -> Result<Item<Hero>, ApiError> {
    let backend = session.backend();
    let sql = format!("SELECT {HERO_COLUMNS} FROM hero WHERE id = {}", param(backend, 1));

    let hero = sqlx::query_as::<_, Hero>(&sql)
        .bind(id)
        .fetch_optional(&mut *session)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: "hero",
            id: id.to_string(),
        })?;

    Ok(Item::new(hero))
}

/// POST /heroes - create a new hero
async fn create_hero(
    mut session: Session,
    Json(req): Json<CreateHeroRequest>,
) -> Result<(StatusCode, Item<Hero>), ApiError> {
    let backend = session.backend();
    let sql = format!(
        "INSERT INTO hero (name, secret_identity, age) VALUES ({}, {}, {}) RETURNING {HERO_COLUMNS}",
        param(backend, 1),
        param(backend, 2),
        param(backend, 3),
    );

    let result = sqlx::query_as::<_, Hero>(&sql)
        .bind(req.name.as_str())
        .bind(req.secret_identity.as_str())
        .bind(req.age)
        .fetch_one(&mut *session)
        .await
        .map_err(fastsqlx::Error::from);

    match result {
        Ok(hero) => {
            tracing::info!(id = hero.id, name = %hero.name, "created hero");
            Ok((StatusCode::CREATED, Item::new(hero)))
        }
        Err(e) if e.is_unique_violation() => Err(ApiError::Conflict {
            message: format!("hero '{}' already exists", req.name),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Hero routes
pub fn router() -> Router {
    Router::new()
        .route("/heroes", get(list_heroes).post(create_hero))
        .route("/heroes/{id}", get(get_hero))
}
