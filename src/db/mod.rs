//! Database layer
//!
//! SQLite is the default backend; MySQL can be selected in the configuration.
//! Both are reached through the [`DatabasePool`] trait, and repositories
//! dispatch on [`Backend`] to run driver-specific SQL.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
