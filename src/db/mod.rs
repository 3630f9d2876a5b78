//! Database layer
//!
//! This module provides database abstraction for VolunteerHub.
//! It supports:
//! - SQLite (default, single-file deployment)
//! - MySQL (for larger deployments)
//!
//! The database driver is selected based on configuration.
//!
//! # Architecture
//!
//! The database layer uses a trait-based abstraction (`DatabasePool`) that
//! allows repositories to work with either SQLite or MySQL without the
//! services knowing the specific backend.
//!
//! # Usage
//!
//! ```ignore
//! use volunteerhub::config::DatabaseConfig;
//! use volunteerhub::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
