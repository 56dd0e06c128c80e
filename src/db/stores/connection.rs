// SPDX-License-Identifier: AGPL-3.0-or-later

//! Row-level operations on `connections` and `connection_entries`.
use sqlx::{query, query_as, query_scalar, SqliteConnection};

use crate::db::errors::StorageError;
use crate::db::models::{ConnectionEntryRow, ConnectionRow, StaleConnectionRow};
use crate::types::ObjectId;

const BIND_CHUNK: usize = 500;

/// The connection row for `(object, field)`, or `None` when the field was
/// never seeded for the object.
pub(crate) async fn connection_row(
    conn: &mut SqliteConnection,
    object_id: &ObjectId,
    field_name: &str,
) -> Result<Option<ConnectionRow>, StorageError> {
    let row = query_as::<_, ConnectionRow>(
        "
        SELECT id, object_id, field_name, last_update, total_count, has_next_page, end_cursor
        FROM connections
        WHERE object_id = $1 AND field_name = $2
        ",
    )
    .bind(object_id.as_str())
    .bind(field_name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

/// Records the page metadata of one ingested connection response and stamps
/// its last update.
pub(crate) async fn update_connection_page(
    conn: &mut SqliteConnection,
    connection_id: i64,
    update_id: i64,
    total_count: i64,
    has_next_page: bool,
    end_cursor: Option<&str>,
) -> Result<(), StorageError> {
    let result = query(
        "
        UPDATE connections
        SET last_update = $1, total_count = $2, has_next_page = $3, end_cursor = $4
        WHERE id = $5
        ",
    )
    .bind(update_id)
    .bind(total_count)
    .bind(has_next_page)
    .bind(end_cursor)
    .bind(connection_id)
    .execute(&mut *conn)
    .await?;

    match result.rows_affected() {
        1 => Ok(()),
        affected => Err(StorageError::Corruption(format!(
            "single-row update of connection {} affected {} rows",
            connection_id, affected
        ))),
    }
}

/// The next free entry index of a connection: one past the maximum present,
/// starting at 1.
pub(crate) async fn next_entry_index(
    conn: &mut SqliteConnection,
    connection_id: i64,
) -> Result<i64, StorageError> {
    let max: i64 = query_scalar(
        "SELECT COALESCE(MAX(idx), 0) FROM connection_entries WHERE connection_id = $1",
    )
    .bind(connection_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(max + 1)
}

pub(crate) async fn insert_entry(
    conn: &mut SqliteConnection,
    connection_id: i64,
    idx: i64,
    child: Option<&ObjectId>,
) -> Result<(), StorageError> {
    query("INSERT INTO connection_entries (connection_id, idx, child_id) VALUES ($1, $2, $3)")
        .bind(connection_id)
        .bind(idx)
        .bind(child.map(ObjectId::as_str))
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Connections which need a refresh: never loaded, loaded before the
/// cutoff, or known to have further pages. Ordered by object id then field
/// name.
pub(crate) async fn stale_connections(
    conn: &mut SqliteConnection,
    since_epoch_millis: i64,
) -> Result<Vec<StaleConnectionRow>, StorageError> {
    let rows = query_as::<_, StaleConnectionRow>(
        "
        SELECT objects.typename, connections.object_id, connections.field_name,
               connections.last_update IS NOT NULL AS loaded, connections.end_cursor
        FROM connections
        JOIN objects ON objects.id = connections.object_id
        LEFT JOIN updates ON updates.id = connections.last_update
        WHERE
            connections.last_update IS NULL
            OR updates.time_epoch_millis < $1
            OR connections.has_next_page
        ORDER BY connections.object_id, connections.field_name
        ",
    )
    .bind(since_epoch_millis)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// The `connections` rows of the given objects, ordered by object id then
/// field name.
pub(crate) async fn connection_rows_for(
    conn: &mut SqliteConnection,
    ids: &[ObjectId],
) -> Result<Vec<ConnectionRow>, StorageError> {
    let mut rows = Vec::new();

    for chunk in ids.chunks(BIND_CHUNK) {
        let sql = format!(
            "
            SELECT id, object_id, field_name, last_update, total_count, has_next_page, end_cursor
            FROM connections
            WHERE object_id IN ({})
            ",
            placeholders(chunk.len())
        );
        let mut q = query_as::<_, ConnectionRow>(&sql);
        for id in chunk {
            q = q.bind(id.as_str());
        }
        rows.extend(q.fetch_all(&mut *conn).await?);
    }

    rows.sort_by(|a, b| (&a.object_id, &a.field_name).cmp(&(&b.object_id, &b.field_name)));
    Ok(rows)
}

/// The entries of all connections of the given objects, ordered by
/// (object id, field name, idx).
pub(crate) async fn entry_rows_for(
    conn: &mut SqliteConnection,
    ids: &[ObjectId],
) -> Result<Vec<ConnectionEntryRow>, StorageError> {
    let mut rows = Vec::new();

    for chunk in ids.chunks(BIND_CHUNK) {
        let sql = format!(
            "
            SELECT connections.object_id, connections.field_name,
                   connection_entries.idx, connection_entries.child_id
            FROM connection_entries
            JOIN connections ON connections.id = connection_entries.connection_id
            WHERE connections.object_id IN ({})
            ",
            placeholders(chunk.len())
        );
        let mut q = query_as::<_, ConnectionEntryRow>(&sql);
        for id in chunk {
            q = q.bind(id.as_str());
        }
        rows.extend(q.fetch_all(&mut *conn).await?);
    }

    rows.sort_by(|a, b| {
        (&a.object_id, &a.field_name, a.idx).cmp(&(&b.object_id, &b.field_name, b.idx))
    });
    Ok(rows)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::stores::object::{insert_object, seed_object_fields};
    use crate::db::stores::update::create_update;
    use crate::test_utils::{initialize_store, repo_index};

    async fn seeded_repo(store: &crate::db::SqlStore) -> i64 {
        let index = repo_index();
        let mut tx = store.pool.begin().await.unwrap();
        insert_object(&mut tx, &ObjectId::from("R"), Some("Repo")).await.unwrap();
        seed_object_fields(&mut tx, index.object("Repo").unwrap(), &ObjectId::from("R"))
            .await
            .unwrap();
        let row = connection_row(&mut tx, &ObjectId::from("R"), "issues")
            .await
            .unwrap()
            .unwrap();
        tx.commit().await.unwrap();
        row.id
    }

    #[tokio::test]
    async fn pristine_connections_are_stale() {
        let store = initialize_store().await;
        seeded_repo(&store).await;

        let mut tx = store.pool.begin().await.unwrap();
        let stale = stale_connections(&mut tx, 0).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].field_name, "issues");
        assert_eq!(stale[0].typename, "Repo");
        assert_eq!(stale[0].end_cursor, None);
    }

    #[tokio::test]
    async fn paging_connections_stay_stale_until_complete() {
        let store = initialize_store().await;
        let connection_id = seeded_repo(&store).await;

        let mut tx = store.pool.begin().await.unwrap();
        let update = create_update(&mut tx, 1_000).await.unwrap();
        update_connection_page(&mut tx, connection_id, update, 2, true, Some("c1"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        // Within the cutoff but has_next_page keeps it in the plan.
        let mut tx = store.pool.begin().await.unwrap();
        let stale = stale_connections(&mut tx, 1_000).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].end_cursor.as_deref(), Some("c1"));

        let update = create_update(&mut tx, 1_000).await.unwrap();
        update_connection_page(&mut tx, connection_id, update, 2, false, Some("c2"))
            .await
            .unwrap();
        assert!(stale_connections(&mut tx, 1_000).await.unwrap().is_empty());
        assert_eq!(stale_connections(&mut tx, 1_001).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn entry_indices_start_at_one_and_increase() {
        let store = initialize_store().await;
        let connection_id = seeded_repo(&store).await;

        let mut tx = store.pool.begin().await.unwrap();
        assert_eq!(next_entry_index(&mut tx, connection_id).await.unwrap(), 1);

        insert_object(&mut tx, &ObjectId::from("I1"), Some("Issue")).await.unwrap();

        insert_entry(&mut tx, connection_id, 1, Some(&ObjectId::from("I1")))
            .await
            .unwrap();
        insert_entry(&mut tx, connection_id, 2, None).await.unwrap();
        assert_eq!(next_entry_index(&mut tx, connection_id).await.unwrap(), 3);

        let entries = entry_rows_for(&mut tx, &[ObjectId::from("R")]).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].idx, 1);
        assert_eq!(entries[0].child_id.as_deref(), Some("I1"));
        assert_eq!(entries[1].idx, 2);
        assert_eq!(entries[1].child_id, None);
    }
}
