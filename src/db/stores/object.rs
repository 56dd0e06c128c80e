// SPDX-License-Identifier: AGPL-3.0-or-later

//! Row-level operations on `objects`, `primitives` and `links`.
use sqlx::sqlite::SqliteQueryResult;
use sqlx::{query, query_as, query_scalar, SqliteConnection};

use crate::db::errors::StorageError;
use crate::db::models::{LinkRow, ObjectRow, PrimitiveRow};
use crate::schema::ObjectIndex;
use crate::types::ObjectId;

/// Maximum number of ids bound into one `IN (…)` clause. SQLite limits the
/// number of bound parameters per statement.
const BIND_CHUNK: usize = 500;

/// The typename column of the given object: `None` when the row is absent,
/// `Some(None)` while the object is typeless.
pub(crate) async fn object_typename(
    conn: &mut SqliteConnection,
    id: &ObjectId,
) -> Result<Option<Option<String>>, StorageError> {
    let row: Option<(Option<String>,)> =
        query_as("SELECT typename FROM objects WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map(|(typename,)| typename))
}

pub(crate) async fn insert_object(
    conn: &mut SqliteConnection,
    id: &ObjectId,
    typename: Option<&str>,
) -> Result<(), StorageError> {
    query("INSERT INTO objects (id, typename, last_update) VALUES ($1, $2, NULL)")
        .bind(id.as_str())
        .bind(typename)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub(crate) async fn set_typename(
    conn: &mut SqliteConnection,
    id: &ObjectId,
    typename: &str,
) -> Result<(), StorageError> {
    let result = query("UPDATE objects SET typename = $1 WHERE id = $2")
        .bind(typename)
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?;

    expect_single_row(result, "objects.typename")
}

/// Seeds the per-field rows of a freshly typed object: one null-valued
/// `primitives` row per storage primitive field, one null-child `links` row
/// per storage link field and one pristine `connections` row per connection
/// field.
pub(crate) async fn seed_object_fields(
    conn: &mut SqliteConnection,
    index: &ObjectIndex,
    id: &ObjectId,
) -> Result<(), StorageError> {
    for field in index.storage_primitive_fields() {
        query("INSERT INTO primitives (object_id, field_name, value) VALUES ($1, $2, NULL)")
            .bind(id.as_str())
            .bind(field)
            .execute(&mut *conn)
            .await?;
    }

    for field in index.storage_link_fields() {
        query("INSERT INTO links (parent_id, field_name, child_id) VALUES ($1, $2, NULL)")
            .bind(id.as_str())
            .bind(field)
            .execute(&mut *conn)
            .await?;
    }

    for connection in &index.connections {
        query(
            "
            INSERT INTO connections
                (object_id, field_name, last_update, total_count, has_next_page, end_cursor)
            VALUES
                ($1, $2, NULL, NULL, NULL, NULL)
            ",
        )
        .bind(id.as_str())
        .bind(&connection.name)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub(crate) async fn set_last_update(
    conn: &mut SqliteConnection,
    id: &ObjectId,
    update_id: i64,
) -> Result<(), StorageError> {
    let result = query("UPDATE objects SET last_update = $1 WHERE id = $2")
        .bind(update_id)
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?;

    expect_single_row(result, "objects.last_update")
}

/// Writes one primitive value. The row must have been seeded: updating
/// anything but exactly one row is storage corruption.
pub(crate) async fn write_primitive(
    conn: &mut SqliteConnection,
    id: &ObjectId,
    field: &str,
    value: &str,
) -> Result<(), StorageError> {
    let result = query("UPDATE primitives SET value = $1 WHERE object_id = $2 AND field_name = $3")
        .bind(value)
        .bind(id.as_str())
        .bind(field)
        .execute(&mut *conn)
        .await?;

    expect_single_row(result, "primitives.value")
}

pub(crate) async fn write_link(
    conn: &mut SqliteConnection,
    parent: &ObjectId,
    field: &str,
    child: Option<&ObjectId>,
) -> Result<(), StorageError> {
    let result = query("UPDATE links SET child_id = $1 WHERE parent_id = $2 AND field_name = $3")
        .bind(child.map(ObjectId::as_str))
        .bind(parent.as_str())
        .bind(field)
        .execute(&mut *conn)
        .await?;

    expect_single_row(result, "links.child_id")
}

/// Ids of all objects whose typename has never been resolved.
pub(crate) async fn typeless_object_ids(
    conn: &mut SqliteConnection,
) -> Result<Vec<ObjectId>, StorageError> {
    let ids: Vec<String> =
        query_scalar("SELECT id FROM objects WHERE typename IS NULL ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;

    Ok(ids.into_iter().map(ObjectId::from).collect())
}

/// Typed objects whose own data has never been loaded or was loaded before
/// the cutoff, as `(typename, id)` pairs ordered by typename then id.
pub(crate) async fn stale_object_refs(
    conn: &mut SqliteConnection,
    since_epoch_millis: i64,
) -> Result<Vec<(String, ObjectId)>, StorageError> {
    let rows: Vec<(String, String)> = query_as(
        "
        SELECT objects.typename, objects.id
        FROM objects
        LEFT JOIN updates ON updates.id = objects.last_update
        WHERE
            objects.typename IS NOT NULL
            AND (objects.last_update IS NULL OR updates.time_epoch_millis < $1)
        ORDER BY objects.typename, objects.id
        ",
    )
    .bind(since_epoch_millis)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(typename, id)| (typename, ObjectId::from(id)))
        .collect())
}

/// The transitive dependency closure of the given root over link and
/// connection-entry edges, root included, ordered by id.
///
/// Computed as a fixed point by a recursive CTE, so no auxiliary tables
/// exist outside this statement.
pub(crate) async fn transitive_dependencies(
    conn: &mut SqliteConnection,
    root: &ObjectId,
) -> Result<Vec<ObjectId>, StorageError> {
    let ids: Vec<String> = query_scalar(
        "
        WITH RECURSIVE
        edges (parent_id, child_id) AS (
            SELECT parent_id, child_id
            FROM links
            WHERE child_id IS NOT NULL
            UNION ALL
            SELECT connections.object_id, connection_entries.child_id
            FROM connection_entries
            JOIN connections ON connections.id = connection_entries.connection_id
            WHERE connection_entries.child_id IS NOT NULL
        ),
        transitive_deps (id) AS (
            VALUES ($1)
            UNION
            SELECT edges.child_id
            FROM edges
            JOIN transitive_deps ON edges.parent_id = transitive_deps.id
        )
        SELECT id FROM transitive_deps ORDER BY id
        ",
    )
    .bind(root.as_str())
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids.into_iter().map(ObjectId::from).collect())
}

/// The `objects` rows for the given ids, ordered by id. Absent ids are
/// silently missing from the result.
pub(crate) async fn object_rows_by_ids(
    conn: &mut SqliteConnection,
    ids: &[ObjectId],
) -> Result<Vec<ObjectRow>, StorageError> {
    let mut rows = Vec::with_capacity(ids.len());

    for chunk in ids.chunks(BIND_CHUNK) {
        let sql = format!(
            "SELECT id, typename, last_update FROM objects WHERE id IN ({})",
            placeholders(chunk.len())
        );
        let mut q = query_as::<_, ObjectRow>(&sql);
        for id in chunk {
            q = q.bind(id.as_str());
        }
        rows.extend(q.fetch_all(&mut *conn).await?);
    }

    rows.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(rows)
}

/// The `primitives` rows of the given objects, ordered by object id then
/// field name, so nested parents always precede their eggs.
pub(crate) async fn primitive_rows_for(
    conn: &mut SqliteConnection,
    ids: &[ObjectId],
) -> Result<Vec<PrimitiveRow>, StorageError> {
    let mut rows = Vec::new();

    for chunk in ids.chunks(BIND_CHUNK) {
        let sql = format!(
            "SELECT object_id, field_name, value FROM primitives WHERE object_id IN ({})",
            placeholders(chunk.len())
        );
        let mut q = query_as::<_, PrimitiveRow>(&sql);
        for id in chunk {
            q = q.bind(id.as_str());
        }
        rows.extend(q.fetch_all(&mut *conn).await?);
    }

    rows.sort_by(|a, b| (&a.object_id, &a.field_name).cmp(&(&b.object_id, &b.field_name)));
    Ok(rows)
}

/// The `links` rows of the given objects, ordered by parent id then field
/// name.
pub(crate) async fn link_rows_for(
    conn: &mut SqliteConnection,
    ids: &[ObjectId],
) -> Result<Vec<LinkRow>, StorageError> {
    let mut rows = Vec::new();

    for chunk in ids.chunks(BIND_CHUNK) {
        let sql = format!(
            "SELECT parent_id, field_name, child_id FROM links WHERE parent_id IN ({})",
            placeholders(chunk.len())
        );
        let mut q = query_as::<_, LinkRow>(&sql);
        for id in chunk {
            q = q.bind(id.as_str());
        }
        rows.extend(q.fetch_all(&mut *conn).await?);
    }

    rows.sort_by(|a, b| (&a.parent_id, &a.field_name).cmp(&(&b.parent_id, &b.field_name)));
    Ok(rows)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn expect_single_row(result: SqliteQueryResult, what: &str) -> Result<(), StorageError> {
    match result.rows_affected() {
        1 => Ok(()),
        affected => Err(StorageError::Corruption(format!(
            "single-row update of {} affected {} rows",
            what, affected
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::stores::update::create_update;
    use crate::test_utils::{initialize_store, repo_index};

    #[tokio::test]
    async fn typename_lookup_distinguishes_absent_and_typeless() {
        let store = initialize_store().await;
        let mut tx = store.pool.begin().await.unwrap();

        assert_eq!(
            object_typename(&mut tx, &ObjectId::from("R")).await.unwrap(),
            None
        );

        insert_object(&mut tx, &ObjectId::from("R"), None).await.unwrap();
        assert_eq!(
            object_typename(&mut tx, &ObjectId::from("R")).await.unwrap(),
            Some(None)
        );

        set_typename(&mut tx, &ObjectId::from("R"), "Repo").await.unwrap();
        assert_eq!(
            object_typename(&mut tx, &ObjectId::from("R")).await.unwrap(),
            Some(Some("Repo".to_owned()))
        );

        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn seeding_creates_one_row_per_storage_field() {
        let store = initialize_store().await;
        let index = repo_index();
        let repo = index.object("Repo").unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        insert_object(&mut tx, &ObjectId::from("R"), Some("Repo")).await.unwrap();
        seed_object_fields(&mut tx, repo, &ObjectId::from("R")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        let primitives = primitive_rows_for(&mut tx, &[ObjectId::from("R")])
            .await
            .unwrap();
        assert_eq!(primitives.len(), repo.storage_primitive_fields().len());
        assert!(primitives.iter().all(|row| row.value.is_none()));
    }

    #[tokio::test]
    async fn writing_an_unseeded_primitive_is_corruption() {
        let store = initialize_store().await;
        let mut tx = store.pool.begin().await.unwrap();

        insert_object(&mut tx, &ObjectId::from("R"), Some("Repo")).await.unwrap();
        let result = write_primitive(&mut tx, &ObjectId::from("R"), "name", "\"x\"").await;

        assert!(matches!(result, Err(StorageError::Corruption(_))));
    }

    #[tokio::test]
    async fn staleness_respects_the_cutoff() {
        let store = initialize_store().await;
        let index = repo_index();
        let repo = index.object("Repo").unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        insert_object(&mut tx, &ObjectId::from("R"), Some("Repo")).await.unwrap();
        seed_object_fields(&mut tx, repo, &ObjectId::from("R")).await.unwrap();
        insert_object(&mut tx, &ObjectId::from("X"), None).await.unwrap();

        // Never loaded: stale regardless of cutoff.
        assert_eq!(stale_object_refs(&mut tx, 0).await.unwrap().len(), 1);

        let update = create_update(&mut tx, 1_000).await.unwrap();
        set_last_update(&mut tx, &ObjectId::from("R"), update).await.unwrap();

        // Loaded at 1000: fresh for cutoff 1000, stale for cutoff 1001.
        assert!(stale_object_refs(&mut tx, 1_000).await.unwrap().is_empty());
        assert_eq!(stale_object_refs(&mut tx, 1_001).await.unwrap().len(), 1);

        // The typeless object is listed separately.
        assert_eq!(
            typeless_object_ids(&mut tx).await.unwrap(),
            vec![ObjectId::from("X")]
        );
    }

    #[tokio::test]
    async fn transitive_closure_follows_links_and_entries() {
        let store = initialize_store().await;
        let index = repo_index();

        let mut tx = store.pool.begin().await.unwrap();
        for (id, typename) in [("R", "Repo"), ("I1", "Issue"), ("I2", "Issue")] {
            insert_object(&mut tx, &ObjectId::from(id), Some(typename)).await.unwrap();
            seed_object_fields(&mut tx, index.object(typename).unwrap(), &ObjectId::from(id))
                .await
                .unwrap();
        }

        // R --issues--> I1 via a connection entry, I1 --repo?-- nothing;
        // unrelated I2 stays outside the closure.
        let connection =
            crate::db::stores::connection::connection_row(&mut tx, &ObjectId::from("R"), "issues")
                .await
                .unwrap()
                .unwrap();
        let update = create_update(&mut tx, 1_000).await.unwrap();
        crate::db::stores::connection::update_connection_page(
            &mut tx, connection.id, update, 1, false, None,
        )
        .await
        .unwrap();
        crate::db::stores::connection::insert_entry(
            &mut tx,
            connection.id,
            1,
            Some(&ObjectId::from("I1")),
        )
        .await
        .unwrap();

        let deps = transitive_dependencies(&mut tx, &ObjectId::from("R")).await.unwrap();
        assert_eq!(deps, vec![ObjectId::from("I1"), ObjectId::from("R")]);
    }
}
