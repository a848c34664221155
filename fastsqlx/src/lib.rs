//! fastsqlx: sqlx integration for axum
//!
//! - [`Database`] opens the pool from the environment at startup and
//!   closes it on shutdown ([`lifespan`]).
//! - [`Session`] is a transaction scoped to one request, committed or
//!   rolled back by [`SessionLayer`] depending on the response status.
//! - [`Paginate`] wraps a [`Select`] into a [`Page`] with [`Meta`].

pub mod config;
pub mod database;
pub mod error;
pub mod pagination;
pub mod reflect;
pub mod response;
pub mod select;
pub mod session;

pub use config::{Backend, DatabaseConfig};
pub use database::{lifespan, lifespan_from_env, Database};
pub use error::{Error, Result};
pub use pagination::{Meta, PageParams, Paginate};
pub use reflect::{ColumnInfo, Table};
pub use response::{Collection, Item, Page};
pub use select::{Select, SelectBuilder};
pub use session::{Session, SessionLayer};
