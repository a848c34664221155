//! Offset/limit pagination
//!
//! [`Paginate`] reads `offset` and `limit` from the query string, borrows
//! the request [`Session`], and turns a [`Select`] into a [`Page`]:
//! one count query over the statement, then the statement itself with
//! `LIMIT`/`OFFSET` appended.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use sqlx::{Any, AnyConnection, FromRow};

use crate::config::Backend;
use crate::error::{Error, Result};
use crate::response::Page;
use crate::select::Select;
use crate::session::Session;

/// Default page size.
pub const DEFAULT_LIMIT: u64 = 10;

/// Maximum page size.
pub const MAX_LIMIT: u64 = 100;

/// Pagination metadata returned with every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Current page offset.
    pub offset: u64,
    /// Total number of items.
    pub total_items: u64,
    /// Total number of pages.
    pub total_pages: u64,
    /// Current page number. Starts at 1.
    pub page_number: u64,
}

impl Meta {
    /// Derive the metadata from the request window and the row count.
    ///
    /// `limit` must be non-zero; [`PageParams`] guarantees it.
    pub fn new(offset: u64, limit: u64, total_items: u64) -> Self {
        let limit = limit.max(1);
        Self {
            offset,
            total_items,
            total_pages: total_items.div_ceil(limit),
            page_number: offset / limit + 1,
        }
    }
}

/// Validated `offset` and `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub offset: u64,
    pub limit: u64,
}

impl PageParams {
    /// Validate raw query values against `default_limit` and `max_limit`.
    ///
    /// - `offset` defaults to 0 and must be >= 0
    /// - `limit` defaults to `default_limit` and must be in `1..=max_limit`
    pub fn new(
        offset: Option<i64>,
        limit: Option<i64>,
        default_limit: u64,
        max_limit: u64,
    ) -> Result<Self> {
        let offset = match offset {
            None => 0,
            Some(o) => u64::try_from(o)
                .map_err(|_| Error::Pagination("offset must be greater than or equal to 0".into()))?,
        };

        let limit = match limit {
            None => default_limit,
            Some(l) if l < 1 => {
                return Err(Error::Pagination(
                    "limit must be greater than or equal to 1".into(),
                ))
            }
            Some(l) => l as u64,
        };
        if limit > max_limit {
            return Err(Error::Pagination(format!(
                "limit must be less than or equal to {max_limit}"
            )));
        }

        Ok(Self { offset, limit })
    }
}

/// Raw query string values.
#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    offset: Option<i64>,
    limit: Option<i64>,
}

/// Pagination extractor.
///
/// The const parameters set the default and maximum page size; plain
/// `Paginate` uses 10 and 100.
///
/// # Example
///
/// ```ignore
/// async fn list_heroes(mut paginate: Paginate) -> Result<Page<Hero>, fastsqlx::Error> {
///     paginate.paginate("SELECT * FROM hero ORDER BY id").await
/// }
///
/// async fn list_large(mut paginate: Paginate<50, 500>) -> Result<Page<Hero>, fastsqlx::Error> {
///     paginate.paginate("SELECT * FROM hero ORDER BY id").await
/// }
/// ```
pub struct Paginate<const DEFAULT: u64 = DEFAULT_LIMIT, const MAX: u64 = MAX_LIMIT> {
    session: Session,
    params: PageParams,
}

impl<const DEFAULT: u64, const MAX: u64> Paginate<DEFAULT, MAX> {
    pub fn params(&self) -> PageParams {
        self.params
    }

    /// The request session, for handlers that need both.
    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Count the statement's rows, then fetch the requested page.
    pub async fn paginate<T>(&mut self, stmt: impl Into<Select>) -> Result<Page<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        paginate(&mut self.session, &stmt.into(), self.params).await
    }

    /// Fetch the requested page using a total computed elsewhere.
    pub async fn paginate_with_total<T>(
        &mut self,
        stmt: impl Into<Select>,
        total_items: u64,
    ) -> Result<Page<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let stmt = stmt.into();
        let data = fetch_page(&mut self.session, &stmt, self.params).await?;
        Ok(page(data, self.params, total_items))
    }

    /// Count and fetch, handing raw rows to `processor`.
    pub async fn paginate_rows<T, F>(&mut self, stmt: impl Into<Select>, processor: F) -> Result<Page<T>>
    where
        F: FnOnce(Vec<AnyRow>) -> Result<Vec<T>>,
    {
        let stmt = stmt.into();
        let total_items = count(&mut self.session, &stmt).await?;
        let (sql, arguments) = stmt
            .page_query(self.session.backend(), self.params.offset, self.params.limit)
            .into_parts()?;
        let rows = sqlx::query_with::<Any, _>(&sql, arguments)
            .fetch_all(&mut *self.session)
            .await?;
        Ok(page(processor(rows)?, self.params, total_items))
    }
}

impl<S, const DEFAULT: u64, const MAX: u64> FromRequestParts<S> for Paginate<DEFAULT, MAX>
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let Query(query) = Query::<PageQuery>::try_from_uri(&parts.uri)
            .map_err(|rejection| Error::Pagination(rejection.body_text()))?;
        let params = PageParams::new(query.offset, query.limit, DEFAULT, MAX)?;
        let session = Session::from_parts(parts).await?;
        Ok(Self { session, params })
    }
}

/// Count the rows of `stmt` and fetch one page of it over `conn`.
///
/// Usable outside a request, e.g. inside
/// [`Database::with_session`](crate::Database::with_session).
pub async fn paginate<T>(conn: &mut AnyConnection, stmt: &Select, params: PageParams) -> Result<Page<T>>
where
    T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
{
    let total_items = count(conn, stmt).await?;
    let data = fetch_page(conn, stmt, params).await?;
    Ok(page(data, params, total_items))
}

/// `SELECT COUNT(*)` over `stmt`.
pub async fn count(conn: &mut AnyConnection, stmt: &Select) -> Result<u64> {
    let backend = Backend::from_connection(conn)?;
    let (sql, arguments) = stmt.count_query(backend).into_parts()?;
    let total: i64 = sqlx::query_scalar_with::<Any, i64, _>(&sql, arguments)
        .fetch_one(&mut *conn)
        .await?;
    Ok(u64::try_from(total).unwrap_or_default())
}

async fn fetch_page<T>(conn: &mut AnyConnection, stmt: &Select, params: PageParams) -> Result<Vec<T>>
where
    T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
{
    let backend = Backend::from_connection(conn)?;
    let (sql, arguments) = stmt.page_query(backend, params.offset, params.limit).into_parts()?;
    let data = sqlx::query_as_with::<Any, T, _>(&sql, arguments)
        .fetch_all(&mut *conn)
        .await?;
    Ok(data)
}

fn page<T>(data: Vec<T>, params: PageParams, total_items: u64) -> Page<T> {
    let meta = Meta::new(params.offset, params.limit, total_items);
    tracing::debug!(
        offset = meta.offset,
        limit = params.limit,
        total_items = meta.total_items,
        returned = data.len(),
        "paginated query"
    );
    Page { data, meta }
}
