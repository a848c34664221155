//! Deferred table reflection
//!
//! Tables listed in the configuration are described once at startup from the
//! backend's catalog (`pragma_table_info` on SQLite, `information_schema` on
//! Postgres). Names and types come back as text, so any column type can be
//! reflected.

use std::collections::HashMap;

use sqlx::{Any, AnyConnection};

use crate::config::Backend;
use crate::error::{Error, Result};

const SQLITE_COLUMNS: &str = "SELECT name, type FROM pragma_table_info(?) ORDER BY cid";

const SQLITE_SCHEMA_COLUMNS: &str = "SELECT name, type FROM pragma_table_info(?, ?) ORDER BY cid";

const POSTGRES_COLUMNS: &str = "SELECT column_name::text, data_type::text \
     FROM information_schema.columns \
     WHERE table_schema::text = current_schema()::text AND table_name::text = $1 \
     ORDER BY ordinal_position";

const POSTGRES_SCHEMA_COLUMNS: &str = "SELECT column_name::text, data_type::text \
     FROM information_schema.columns \
     WHERE table_name::text = $1 AND table_schema::text = $2 \
     ORDER BY ordinal_position";

/// A reflected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as reported by the catalog.
    pub type_name: String,
}

/// A reflected table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Tables reflected at startup, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Tables(HashMap<String, Table>);

impl Tables {
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reflect every table in `names` over one connection.
pub(crate) async fn reflect_tables(
    conn: &mut AnyConnection,
    backend: Backend,
    names: &[String],
) -> Result<Tables> {
    let mut tables = HashMap::with_capacity(names.len());
    for name in names {
        let table = reflect_table(conn, backend, name).await?;
        tracing::debug!(table = %name, columns = table.columns.len(), "reflected table");
        tables.insert(name.clone(), table);
    }
    Ok(Tables(tables))
}

async fn reflect_table(conn: &mut AnyConnection, backend: Backend, name: &str) -> Result<Table> {
    let (schema, table) = split_table_name(name)?;
    let sql = match (backend, schema) {
        (Backend::Sqlite, None) => SQLITE_COLUMNS,
        (Backend::Sqlite, Some(_)) => SQLITE_SCHEMA_COLUMNS,
        (Backend::Postgres, None) => POSTGRES_COLUMNS,
        (Backend::Postgres, Some(_)) => POSTGRES_SCHEMA_COLUMNS,
    };

    let mut query = sqlx::query_as::<Any, (String, String)>(sql).bind(table);
    if let Some(schema) = schema {
        query = query.bind(schema);
    }
    let rows = query.fetch_all(&mut *conn).await.map_err(|source| Error::Reflect {
        table: name.to_owned(),
        source,
    })?;

    if rows.is_empty() {
        return Err(Error::Reflect {
            table: name.to_owned(),
            source: sqlx::Error::RowNotFound,
        });
    }

    let columns = rows
        .into_iter()
        .map(|(name, type_name)| ColumnInfo { name, type_name })
        .collect();

    Ok(Table {
        name: name.to_owned(),
        columns,
    })
}

/// Split `table` or `schema.table` into its parts.
///
/// Only `[A-Za-z_][A-Za-z0-9_]*` segments are accepted.
pub(crate) fn split_table_name(name: &str) -> Result<(Option<&str>, &str)> {
    let segments: Vec<&str> = name.split('.').collect();
    if !segments.iter().all(|s| is_identifier(s)) {
        return Err(Error::InvalidTableName(name.to_owned()));
    }
    match segments.as_slice() {
        [table] => Ok((None, table)),
        [schema, table] => Ok((Some(schema), table)),
        _ => Err(Error::InvalidTableName(name.to_owned())),
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
