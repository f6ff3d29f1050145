//! `PostgreSQL` adapter built on Diesel and an r2d2 pool.

mod models;
mod repository;
mod schema;

pub use repository::{PgPool, PostgresStore};
