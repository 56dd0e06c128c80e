// SPDX-License-Identifier: AGPL-3.0-or-later

//! Row-level operations on `updates` and `network_log`.
use sqlx::{query, SqliteConnection};

use crate::db::errors::StorageError;

/// Opens a new remote-interaction epoch and returns its id. Ids increase
/// monotonically and are never reused.
pub(crate) async fn create_update(
    conn: &mut SqliteConnection,
    time_epoch_millis: i64,
) -> Result<i64, StorageError> {
    let result = query("INSERT INTO updates (time_epoch_millis) VALUES ($1)")
        .bind(time_epoch_millis)
        .execute(&mut *conn)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Records an outgoing request before it is posted. The response and the
/// update it produced are backfilled after a successful ingest.
pub(crate) async fn insert_network_log(
    conn: &mut SqliteConnection,
    query_text: &str,
    query_parameters: &str,
    request_time_epoch_millis: i64,
) -> Result<i64, StorageError> {
    let result = query(
        "
        INSERT INTO network_log (query, query_parameters, request_time_epoch_millis, response, update_id)
        VALUES ($1, $2, $3, NULL, NULL)
        ",
    )
    .bind(query_text)
    .bind(query_parameters)
    .bind(request_time_epoch_millis)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub(crate) async fn finish_network_log(
    conn: &mut SqliteConnection,
    log_id: i64,
    response: &str,
    update_id: i64,
) -> Result<(), StorageError> {
    let result = query("UPDATE network_log SET response = $1, update_id = $2 WHERE id = $3")
        .bind(response)
        .bind(update_id)
        .bind(log_id)
        .execute(&mut *conn)
        .await?;

    match result.rows_affected() {
        1 => Ok(()),
        affected => Err(StorageError::Corruption(format!(
            "single-row update of network_log {} affected {} rows",
            log_id, affected
        ))),
    }
}
