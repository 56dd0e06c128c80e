// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persistent storage for a mirror, backed by an embedded SQLite database.
//!
//! The main interface is [`SqlStore`] which wraps the connection pool and
//! offers the row-level operations the planner, ingestor and extractor are
//! built from. All multi-statement work runs inside explicit transactions
//! begun on the pool; helper functions in [`stores`] take the transaction's
//! connection so they can only ever run inside one.
use anyhow::Result;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::Sqlite;
use std::str::FromStr;

pub mod errors;
pub mod models;
pub(crate) mod stores;

/// Re-export of the connection pool type.
pub type Pool = sqlx::SqlitePool;

/// SQL based persistent storage holding the mirrored object graph.
#[derive(Clone, Debug)]
pub struct SqlStore {
    pub(crate) pool: Pool,
}

impl SqlStore {
    /// Create a new `SqlStore` using the provided db `Pool`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

/// Create database when not existing.
pub async fn create_database(url: &str) -> Result<()> {
    if !Sqlite::database_exists(url).await? {
        Sqlite::create_database(url).await?;
    }

    Ok(())
}

/// Create a connection pool onto a SQLite database.
///
/// The pool holds a single connection: one mirror instance is the sole
/// writer to its store and readers and writers share one serialised
/// connection. The rollback journal keeps the persisted state in a single
/// file.
pub async fn connection_pool(url: &str) -> Result<Pool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);

    let pool: Pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}
