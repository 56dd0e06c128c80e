// SPDX-License-Identifier: AGPL-3.0-or-later

//! Table creation and the `meta` compatibility gate.
use log::debug;
use sqlx::{query, query_scalar};

use crate::db::errors::StorageError;
use crate::db::SqlStore;

/// Version tag of the relational layout. Bumped whenever the layout or its
/// interpretation changes; stores written under a different tag are
/// rejected at open.
pub(crate) const VERSION: &str = "graph-mirror/1";

/// The fixed tables and indices of the relational layout.
const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS meta (
        id     INTEGER PRIMARY KEY CHECK (id = 0),
        config TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS updates (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        time_epoch_millis INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS objects (
        id          TEXT PRIMARY KEY NOT NULL,
        typename    TEXT,
        last_update INTEGER REFERENCES updates (id),
        CHECK (typename IS NOT NULL OR last_update IS NULL)
    )",
    "CREATE TABLE IF NOT EXISTS primitives (
        object_id  TEXT NOT NULL REFERENCES objects (id),
        field_name TEXT NOT NULL,
        value      TEXT,
        UNIQUE (object_id, field_name)
    )",
    "CREATE TABLE IF NOT EXISTS links (
        parent_id  TEXT NOT NULL REFERENCES objects (id),
        field_name TEXT NOT NULL,
        child_id   TEXT REFERENCES objects (id),
        UNIQUE (parent_id, field_name)
    )",
    "CREATE TABLE IF NOT EXISTS connections (
        id            INTEGER PRIMARY KEY,
        object_id     TEXT NOT NULL REFERENCES objects (id),
        field_name    TEXT NOT NULL,
        last_update   INTEGER REFERENCES updates (id),
        total_count   INTEGER,
        has_next_page BOOLEAN,
        end_cursor    TEXT,
        UNIQUE (object_id, field_name),
        CHECK ((last_update IS NULL) = (total_count IS NULL)),
        CHECK ((last_update IS NULL) = (has_next_page IS NULL)),
        CHECK (last_update IS NOT NULL OR end_cursor IS NULL)
    )",
    "CREATE TABLE IF NOT EXISTS connection_entries (
        connection_id INTEGER NOT NULL REFERENCES connections (id),
        idx           INTEGER NOT NULL,
        child_id      TEXT REFERENCES objects (id),
        UNIQUE (connection_id, idx)
    )",
    "CREATE TABLE IF NOT EXISTS network_log (
        id                        INTEGER PRIMARY KEY AUTOINCREMENT,
        query                     TEXT NOT NULL,
        query_parameters          TEXT NOT NULL,
        request_time_epoch_millis INTEGER NOT NULL,
        response                  TEXT,
        update_id                 INTEGER REFERENCES updates (id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_objects_typename
        ON objects (typename)",
    "CREATE INDEX IF NOT EXISTS idx_links_parent
        ON links (parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_connection_entries_connection
        ON connection_entries (connection_id, idx)",
];

impl SqlStore {
    /// Creates or confirms the fixed tables, then runs the `meta` gate
    /// against the given canonical config blob.
    ///
    /// On first use the blob is written; afterwards an open only succeeds
    /// when the stored blob is byte-identical. An incompatible open leaves
    /// the store untouched.
    pub(crate) async fn initialize(&self, config: &str) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        for statement in CREATE_TABLES {
            query(statement).execute(&mut *tx).await?;
        }

        let stored: Option<String> = query_scalar("SELECT config FROM meta WHERE id = 0")
            .fetch_optional(&mut *tx)
            .await?;

        match stored {
            None => {
                debug!("Installing mirror config into fresh store");
                query("INSERT INTO meta (id, config) VALUES (0, $1)")
                    .bind(config)
                    .execute(&mut *tx)
                    .await?;
            }
            Some(stored) if stored == config => {
                debug!("Mirror config matches store, proceeding");
            }
            Some(_) => {
                // Implicit rollback when the uncommitted transaction drops.
                return Err(StorageError::IncompatibleConfig);
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
