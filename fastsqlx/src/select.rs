//! Base statements that can be rendered more than once
//!
//! Pagination renders the same statement twice (count and page), so a
//! statement is stored as a function that pushes its SQL and arguments into
//! a fresh [`SelectBuilder`]. The builder knows the backend and writes bind
//! placeholders in its native syntax: `$1, $2, ...` on Postgres, `?` on
//! SQLite.

use std::fmt::{self, Write};
use std::sync::Arc;

use sqlx::any::AnyArguments;
use sqlx::error::BoxDynError;
use sqlx::{Any, Arguments, Encode, Type};

use crate::config::Backend;
use crate::error::{Error, Result};

type Render = dyn for<'q> Fn(&mut SelectBuilder<'q>) + Send + Sync;

/// SQL text plus bound arguments for one rendering of a [`Select`].
pub struct SelectBuilder<'q> {
    backend: Backend,
    sql: String,
    arguments: AnyArguments<'q>,
    error: Option<BoxDynError>,
}

impl<'q> SelectBuilder<'q> {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            sql: String::new(),
            arguments: AnyArguments::default(),
            error: None,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Append raw SQL.
    pub fn push(&mut self, sql: impl fmt::Display) -> &mut Self {
        // Writing to a String cannot fail.
        let _ = write!(self.sql, "{sql}");
        self
    }

    /// Bind `value` and append its placeholder.
    pub fn push_bind<T>(&mut self, value: T) -> &mut Self
    where
        T: 'q + Encode<'q, Any> + Type<Any>,
    {
        if let Err(e) = self.arguments.add(value) {
            self.error.get_or_insert(e);
        }
        match self.backend {
            Backend::Postgres => {
                let n = self.arguments.len();
                let _ = write!(self.sql, "${n}");
            }
            Backend::Sqlite => self.sql.push('?'),
        }
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of bound arguments.
    pub fn bind_count(&self) -> usize {
        self.arguments.len()
    }

    /// Split into SQL and arguments, surfacing the first encode error.
    pub(crate) fn into_parts(self) -> Result<(String, AnyArguments<'q>)> {
        match self.error {
            Some(e) => Err(Error::Database(sqlx::Error::Encode(e))),
            None => Ok((self.sql, self.arguments)),
        }
    }
}

/// A `SELECT` statement without `LIMIT`/`OFFSET`.
#[derive(Clone)]
pub struct Select {
    render: Arc<Render>,
}

impl Select {
    /// A statement made of plain SQL.
    pub fn new(sql: impl Into<String>) -> Self {
        let sql: String = sql.into();
        Self::from_fn(move |builder| {
            builder.push(sql.as_str());
        })
    }

    /// A statement that pushes its own SQL and bound arguments.
    ///
    /// # Example
    ///
    /// ```
    /// use fastsqlx::{Backend, Select};
    ///
    /// let min_age = 30_i64;
    /// let stmt = Select::from_fn(move |qb| {
    ///     qb.push("SELECT * FROM hero WHERE age >= ")
    ///         .push_bind(min_age)
    ///         .push(" ORDER BY id");
    /// });
    /// assert_eq!(stmt.sql(Backend::Postgres), "SELECT * FROM hero WHERE age >= $1 ORDER BY id");
    /// assert_eq!(stmt.sql(Backend::Sqlite), "SELECT * FROM hero WHERE age >= ? ORDER BY id");
    /// ```
    pub fn from_fn<F>(render: F) -> Self
    where
        F: for<'q> Fn(&mut SelectBuilder<'q>) + Send + Sync + 'static,
    {
        Self {
            render: Arc::new(render),
        }
    }

    /// Push this statement into `builder`.
    pub fn push_to(&self, builder: &mut SelectBuilder<'_>) {
        (self.render)(builder);
    }

    /// The SQL text as rendered for `backend`.
    pub fn sql(&self, backend: Backend) -> String {
        let mut builder = SelectBuilder::new(backend);
        self.push_to(&mut builder);
        builder.sql
    }

    /// `SELECT COUNT(*) FROM (<stmt>) AS subquery`
    pub(crate) fn count_query<'q>(&self, backend: Backend) -> SelectBuilder<'q> {
        let mut builder = SelectBuilder::new(backend);
        builder.push("SELECT COUNT(*) FROM (");
        self.push_to(&mut builder);
        builder.push(") AS subquery");
        builder
    }

    /// `<stmt> LIMIT <limit> OFFSET <offset>`
    pub(crate) fn page_query<'q>(&self, backend: Backend, offset: u64, limit: u64) -> SelectBuilder<'q> {
        let mut builder = SelectBuilder::new(backend);
        self.push_to(&mut builder);
        builder.push(format_args!(" LIMIT {limit} OFFSET {offset}"));
        builder
    }
}

impl fmt::Debug for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("sql", &self.sql(Backend::Postgres))
            .finish()
    }
}

impl From<&str> for Select {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Select {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thirty_and_older() -> Select {
        Select::from_fn(|qb| {
            qb.push("SELECT name FROM hero WHERE age >= ")
                .push_bind(30_i64)
                .push(" AND name <> ")
                .push_bind("Thor".to_string())
                .push(" ORDER BY id");
        })
    }

    #[test]
    fn count_wraps_statement() {
        let stmt = Select::new("SELECT * FROM hero ORDER BY id");
        assert_eq!(
            stmt.count_query(Backend::Sqlite).sql(),
            "SELECT COUNT(*) FROM (SELECT * FROM hero ORDER BY id) AS subquery"
        );
    }

    #[test]
    fn page_appends_limit_and_offset() {
        let stmt = Select::from("SELECT * FROM hero ORDER BY id");
        assert_eq!(
            stmt.page_query(Backend::Postgres, 20, 10).sql(),
            "SELECT * FROM hero ORDER BY id LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn postgres_placeholders_are_numbered() {
        let count = thirty_and_older().count_query(Backend::Postgres);
        assert_eq!(
            count.sql(),
            "SELECT COUNT(*) FROM (SELECT name FROM hero WHERE age >= $1 AND name <> $2 ORDER BY id) AS subquery"
        );
        assert_eq!(count.bind_count(), 2);

        let page = thirty_and_older().page_query(Backend::Postgres, 0, 5);
        assert_eq!(
            page.sql(),
            "SELECT name FROM hero WHERE age >= $1 AND name <> $2 ORDER BY id LIMIT 5 OFFSET 0"
        );
    }

    #[test]
    fn sqlite_placeholders_are_positional() {
        let page = thirty_and_older().page_query(Backend::Sqlite, 10, 10);
        assert_eq!(
            page.sql(),
            "SELECT name FROM hero WHERE age >= ? AND name <> ? ORDER BY id LIMIT 10 OFFSET 10"
        );
        assert_eq!(page.bind_count(), 2);
    }

    #[test]
    fn renders_repeatedly() {
        let stmt = thirty_and_older();
        assert_eq!(stmt.sql(Backend::Postgres), stmt.sql(Backend::Postgres));
        let (_, first) = stmt.count_query(Backend::Sqlite).into_parts().unwrap();
        let (_, second) = stmt.count_query(Backend::Sqlite).into_parts().unwrap();
        assert_eq!(first.len(), second.len());
    }
}
