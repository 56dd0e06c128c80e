// SPDX-License-Identifier: AGPL-3.0-or-later

//! Merges query responses back into the relational store.
//!
//! The ingestor performs one transaction per response: the driver begins
//! it, [`ingest_response`] writes every row, and the driver commits. Any
//! error unwinds through the uncommitted transaction, so partial updates
//! are never observable by readers.
//!
//! Top-level response fields are dispatched purely by their alias prefix
//! (see the planner): typename resolutions re-run the registration routine,
//! own-data records rewrite an object's primitive and link rows, and
//! connection updates append pages to `connection_entries`.
//!
//! [`register_object`] is the same routine external callers use through
//! [`crate::Mirror::register_object`]; link and connection targets found in
//! responses are registered recursively through it.
mod errors;

use log::{debug, warn};
use serde_json::Value;
use sqlx::SqliteConnection;

pub use errors::IngestError;

use crate::config::MirrorOptions;
use crate::db::stores::{connection, object, update};
use crate::planner::{NODE_PREFIX, OWN_DATA_PREFIX, TYPENAMES_PREFIX};
use crate::schema::{LinkField, ObjectIndex, SchemaIndex, ID_FIELD_NAME, TYPENAME_FIELD_NAME};
use crate::types::ObjectId;

/// Registers an object by id, with or without a known typename.
///
/// Re-registration with the same typename is a no-op; with a differing
/// non-null typename a hard error; with null against a known typename a
/// no-op. Registering a typename for a previously typeless object is a
/// *typename upgrade* which additionally seeds the object's per-field
/// rows.
pub(crate) async fn register_object(
    conn: &mut SqliteConnection,
    index: &SchemaIndex,
    options: &MirrorOptions,
    id: &ObjectId,
    typename: Option<&str>,
) -> Result<(), IngestError> {
    let declared = match typename {
        Some(typename) => {
            let declared =
                index
                    .object(typename)
                    .ok_or_else(|| IngestError::UnknownTypename {
                        typename: typename.to_owned(),
                    })?;

            if let Some(guesser) = &options.guess_typename {
                if let Some(guess) = guesser(id) {
                    if guess != typename {
                        warn!(
                            "Registration of '{}' as '{}' disagrees with guessed typename '{}'",
                            id, typename, guess
                        );
                    }
                }
            }

            Some((typename, declared))
        }
        None => None,
    };

    match object::object_typename(conn, id).await? {
        None => {
            debug!("Registering new object '{}' as {:?}", id, typename);
            object::insert_object(conn, id, typename).await?;
            if let Some((_, object_index)) = declared {
                object::seed_object_fields(conn, object_index, id).await?;
            }
            Ok(())
        }
        Some(None) => match declared {
            // Typename upgrade: seed the per-field rows now that the
            // object's shape is known.
            Some((typename, object_index)) => {
                debug!("Upgrading object '{}' to typename '{}'", id, typename);
                object::set_typename(conn, id, typename).await?;
                object::seed_object_fields(conn, object_index, id).await?;
                Ok(())
            }
            None => Ok(()),
        },
        Some(Some(stored)) => match typename {
            None => Ok(()),
            Some(typename) if typename == stored => Ok(()),
            Some(typename) => Err(IngestError::TypenameConflict {
                id: id.to_string(),
                stored,
                offered: typename.to_owned(),
            }),
        },
    }
}

/// Ingests one response: opens a new update epoch, dispatches every
/// top-level aliased field, and returns the epoch's id.
///
/// Runs inside the transaction the driver has begun; on error the driver
/// drops the transaction and nothing is committed.
pub(crate) async fn ingest_response(
    conn: &mut SqliteConnection,
    index: &SchemaIndex,
    options: &MirrorOptions,
    response: &Value,
    now_epoch_millis: i64,
) -> Result<i64, IngestError> {
    let fields = response
        .as_object()
        .ok_or_else(|| malformed("response payload is not an object"))?;

    let update_id = update::create_update(conn, now_epoch_millis).await?;

    for (alias, payload) in fields {
        if alias.starts_with(TYPENAMES_PREFIX) {
            ingest_typenames(conn, index, options, alias, payload).await?;
        } else if alias.starts_with(OWN_DATA_PREFIX) {
            ingest_own_data(conn, index, options, update_id, alias, payload).await?;
        } else if alias.starts_with(NODE_PREFIX) {
            ingest_connections(conn, index, options, update_id, alias, payload).await?;
        } else {
            return Err(IngestError::UnknownResultKind {
                alias: alias.clone(),
            });
        }
    }

    Ok(update_id)
}

/// `typenames_*`: a batch of `{ __typename, id }` tuples, each re-run
/// through the registration routine to upgrade typeless objects.
async fn ingest_typenames(
    conn: &mut SqliteConnection,
    index: &SchemaIndex,
    options: &MirrorOptions,
    alias: &str,
    payload: &Value,
) -> Result<(), IngestError> {
    let entries = payload
        .as_array()
        .ok_or_else(|| malformed(&format!("'{}' is not an array", alias)))?;

    debug!("Ingesting {} typename resolutions from '{}'", entries.len(), alias);

    for entry in entries {
        let record = entry
            .as_object()
            .ok_or_else(|| malformed(&format!("'{}' contains a non-object entry", alias)))?;
        let id = required_str(record, ID_FIELD_NAME, alias)?;
        let typename = required_str(record, TYPENAME_FIELD_NAME, alias)?;

        register_object(conn, index, options, &ObjectId::from(id), Some(typename)).await?;
    }

    Ok(())
}

/// `owndata_*`: a homogeneous batch of full object records of one
/// typename.
async fn ingest_own_data(
    conn: &mut SqliteConnection,
    index: &SchemaIndex,
    options: &MirrorOptions,
    update_id: i64,
    alias: &str,
    payload: &Value,
) -> Result<(), IngestError> {
    let entries = payload
        .as_array()
        .ok_or_else(|| malformed(&format!("'{}' is not an array", alias)))?;

    debug!("Ingesting own data for {} objects from '{}'", entries.len(), alias);

    // First pass: the batch must be homogeneous and duplicate-free before
    // anything is written.
    let mut expected: Option<&str> = None;
    let mut seen: Vec<&str> = Vec::new();
    for entry in entries {
        let record = entry
            .as_object()
            .ok_or_else(|| malformed(&format!("'{}' contains a non-object entry", alias)))?;
        let typename = required_str(record, TYPENAME_FIELD_NAME, alias)?;
        let id = required_str(record, ID_FIELD_NAME, alias)?;

        match expected {
            None => expected = Some(typename),
            Some(expected) if expected != typename => {
                return Err(IngestError::InconsistentTypenames {
                    expected: expected.to_owned(),
                    actual: typename.to_owned(),
                })
            }
            Some(_) => (),
        }

        if seen.contains(&id) {
            return Err(IngestError::DuplicateOwnData { id: id.to_owned() });
        }
        seen.push(id);
    }

    for entry in entries {
        let record = entry.as_object().expect("validated in first pass");
        let id = ObjectId::from(required_str(record, ID_FIELD_NAME, alias)?);
        let typename = required_str(record, TYPENAME_FIELD_NAME, alias)?;

        match object::object_typename(conn, &id).await? {
            None => {
                return Err(IngestError::UnregisteredObject { id: id.to_string() });
            }
            Some(None) => {
                return Err(malformed(&format!(
                    "own data for object '{}' whose typename is unresolved",
                    id
                )));
            }
            Some(Some(stored)) if stored != typename => {
                return Err(IngestError::TypenameConflict {
                    id: id.to_string(),
                    stored,
                    offered: typename.to_owned(),
                });
            }
            Some(Some(_)) => (),
        }

        let object_index = index
            .object(typename)
            .expect("stored typenames are declared");

        write_own_data(conn, index, object_index, options, update_id, &id, record).await?;
    }

    Ok(())
}

/// Writes one own-data record: every primitive, nested-presence flag,
/// nested egg and link, then stamps the object's last update.
async fn write_own_data(
    conn: &mut SqliteConnection,
    index: &SchemaIndex,
    object_index: &ObjectIndex,
    options: &MirrorOptions,
    update_id: i64,
    id: &ObjectId,
    record: &serde_json::Map<String, Value>,
) -> Result<(), IngestError> {
    for field in &object_index.primitives {
        let value = record.get(field).ok_or_else(|| IngestError::MissingPrimitive {
            field: field.clone(),
            id: id.to_string(),
        })?;
        object::write_primitive(conn, id, field, &encode_primitive(value)).await?;
    }

    for link in &object_index.links {
        let value = record.get(&link.name).ok_or_else(|| IngestError::MissingLink {
            field: link.name.clone(),
            id: id.to_string(),
        })?;
        let child = resolve_reference(conn, index, options, link, value, id).await?;
        object::write_link(conn, id, &link.name, child.as_ref()).await?;
    }

    for nest in &object_index.nested {
        let value = record.get(&nest.name).ok_or_else(|| IngestError::MissingPrimitive {
            field: nest.name.clone(),
            id: id.to_string(),
        })?;

        match value {
            // An absent nest records 0 and leaves its egg rows untouched,
            // so "not present" stays distinguishable from "present with
            // all-null children".
            Value::Null => {
                object::write_primitive(conn, id, &nest.name, "0").await?;
            }
            Value::Object(eggs) => {
                object::write_primitive(conn, id, &nest.name, "1").await?;

                for egg in &nest.primitive_eggs {
                    let compound = crate::schema::nested_field_name(&nest.name, egg);
                    let value = eggs.get(egg).ok_or_else(|| IngestError::MissingPrimitive {
                        field: compound.clone(),
                        id: id.to_string(),
                    })?;
                    object::write_primitive(conn, id, &compound, &encode_primitive(value)).await?;
                }

                for egg in &nest.node_eggs {
                    let compound = crate::schema::nested_field_name(&nest.name, &egg.name);
                    let value = eggs.get(&egg.name).ok_or_else(|| IngestError::MissingLink {
                        field: compound.clone(),
                        id: id.to_string(),
                    })?;
                    let child = resolve_reference(conn, index, options, egg, value, id).await?;
                    object::write_link(conn, id, &compound, child.as_ref()).await?;
                }
            }
            _ => {
                return Err(malformed(&format!(
                    "nested field '{}' on '{}' is neither null nor an object",
                    nest.name, id
                )))
            }
        }
    }

    object::set_last_update(conn, id, update_id).await?;
    Ok(())
}

/// `node_*`: connection updates for a single object, one per non-id key.
async fn ingest_connections(
    conn: &mut SqliteConnection,
    index: &SchemaIndex,
    options: &MirrorOptions,
    update_id: i64,
    alias: &str,
    payload: &Value,
) -> Result<(), IngestError> {
    let record = payload
        .as_object()
        .ok_or_else(|| malformed(&format!("'{}' is not an object", alias)))?;
    let id = ObjectId::from(required_str(record, ID_FIELD_NAME, alias)?);

    let typename = match object::object_typename(conn, &id).await? {
        None => return Err(IngestError::UnregisteredObject { id: id.to_string() }),
        Some(None) => {
            return Err(malformed(&format!(
                "connection update for object '{}' whose typename is unresolved",
                id
            )))
        }
        Some(Some(typename)) => typename,
    };
    let object_index = index
        .object(&typename)
        .expect("stored typenames are declared");

    for (field, value) in record {
        if field == ID_FIELD_NAME {
            continue;
        }

        let declared = object_index.connection(field).ok_or_else(|| {
            IngestError::UnknownConnection {
                typename: typename.clone(),
                field: field.clone(),
            }
        })?;

        if value.is_null() {
            warn!(
                "Response omits connection '{}' on '{}', skipping",
                field, id
            );
            continue;
        }

        ingest_connection_page(conn, index, options, update_id, &id, declared, field, value)
            .await?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn ingest_connection_page(
    conn: &mut SqliteConnection,
    index: &SchemaIndex,
    options: &MirrorOptions,
    update_id: i64,
    id: &ObjectId,
    declared: &crate::schema::ConnectionField,
    field: &str,
    value: &Value,
) -> Result<(), IngestError> {
    let payload = value
        .as_object()
        .ok_or_else(|| malformed(&format!("connection '{}' on '{}' is not an object", field, id)))?;

    let row = connection::connection_row(conn, id, field)
        .await?
        .ok_or_else(|| {
            IngestError::Storage(crate::db::errors::StorageError::Corruption(format!(
                "connection '{}' on '{}' was never seeded",
                field, id
            )))
        })?;

    let total_count = payload
        .get("totalCount")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed(&format!("connection '{}' on '{}' lacks totalCount", field, id)))?;

    let page_info = payload
        .get("pageInfo")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed(&format!("connection '{}' on '{}' lacks pageInfo", field, id)))?;
    let has_next_page = page_info
        .get("hasNextPage")
        .and_then(Value::as_bool)
        .ok_or_else(|| malformed(&format!("connection '{}' on '{}' lacks hasNextPage", field, id)))?;
    let end_cursor = match page_info.get("endCursor") {
        Some(Value::Null) => None,
        Some(Value::String(cursor)) => Some(cursor.as_str()),
        _ => {
            return Err(malformed(&format!(
                "connection '{}' on '{}' lacks endCursor",
                field, id
            )))
        }
    };

    let nodes = payload
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(&format!("connection '{}' on '{}' lacks nodes", field, id)))?;

    debug!(
        "Ingesting page of {} entries into connection '{}' on '{}'",
        nodes.len(),
        field,
        id
    );

    connection::update_connection_page(conn, row.id, update_id, total_count, has_next_page, end_cursor)
        .await?;

    let base = connection::next_entry_index(conn, row.id).await?;
    let reference = LinkField {
        name: field.to_owned(),
        target: declared.element.clone(),
        fidelity: declared.fidelity,
    };
    for (offset, node) in nodes.iter().enumerate() {
        let child = resolve_reference(conn, index, options, &reference, node, id).await?;
        connection::insert_entry(conn, row.id, base + offset as i64, child.as_ref()).await?;
    }

    Ok(())
}

/// Resolves a node reference from a response: blacklisted ids become null
/// without registration, faithful references register under their returned
/// typename, unfaithful ones as typeless.
async fn resolve_reference(
    conn: &mut SqliteConnection,
    index: &SchemaIndex,
    options: &MirrorOptions,
    reference: &LinkField,
    value: &Value,
    parent: &ObjectId,
) -> Result<Option<ObjectId>, IngestError> {
    let record = match value {
        Value::Null => return Ok(None),
        Value::Object(record) => record,
        _ => {
            return Err(malformed(&format!(
                "reference '{}' on '{}' is neither null nor an object",
                reference.name, parent
            )))
        }
    };

    let id = record
        .get(ID_FIELD_NAME)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            malformed(&format!(
                "reference '{}' on '{}' lacks an id",
                reference.name, parent
            ))
        })?;
    let child = ObjectId::from(id);

    if options.blacklisted_ids.contains(&child) {
        debug!("Blacklisted id '{}' treated as null reference", child);
        return Ok(None);
    }

    let typename = match reference.fidelity {
        crate::schema::Fidelity::Faithful => {
            Some(required_str(record, TYPENAME_FIELD_NAME, reference.name.as_str())?)
        }
        crate::schema::Fidelity::Unfaithful => None,
    };

    register_object(conn, index, options, &child, typename).await?;
    Ok(Some(child))
}

fn required_str<'a>(
    record: &'a serde_json::Map<String, Value>,
    key: &str,
    context: &str,
) -> Result<&'a str, IngestError> {
    record
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(&format!("'{}' lacks a string '{}'", context, key)))
}

/// A primitive value is stored as its JSON encoding, nulls included.
fn encode_primitive(value: &Value) -> String {
    value.to_string()
}

fn malformed(message: &str) -> IngestError {
    IngestError::MalformedResponse(message.to_owned())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sqlx::query_scalar;

    use super::*;
    use crate::db::SqlStore;
    use crate::test_utils::{forge_index, initialize_store, repo_index};

    async fn row_counts(store: &SqlStore) -> (i64, i64, i64, i64) {
        let mut tx = store.pool.begin().await.unwrap();
        let objects: i64 = query_scalar("SELECT COUNT(*) FROM objects")
            .fetch_one(&mut *tx)
            .await
            .unwrap();
        let primitives: i64 = query_scalar("SELECT COUNT(*) FROM primitives")
            .fetch_one(&mut *tx)
            .await
            .unwrap();
        let links: i64 = query_scalar("SELECT COUNT(*) FROM links")
            .fetch_one(&mut *tx)
            .await
            .unwrap();
        let connections: i64 = query_scalar("SELECT COUNT(*) FROM connections")
            .fetch_one(&mut *tx)
            .await
            .unwrap();
        (objects, primitives, links, connections)
    }

    async fn register(
        store: &SqlStore,
        index: &SchemaIndex,
        id: &str,
        typename: Option<&str>,
    ) -> Result<(), IngestError> {
        let options = MirrorOptions::default();
        let mut tx = store.pool.begin().await.unwrap();
        register_object(&mut tx, index, &options, &ObjectId::from(id), typename).await?;
        tx.commit().await.unwrap();
        Ok(())
    }

    async fn ingest(
        store: &SqlStore,
        index: &SchemaIndex,
        options: &MirrorOptions,
        response: serde_json::Value,
    ) -> Result<i64, IngestError> {
        let mut tx = store.pool.begin().await.unwrap();
        let update_id = ingest_response(&mut tx, index, options, &response, 1_000).await?;
        tx.commit().await.unwrap();
        Ok(update_id)
    }

    #[tokio::test]
    async fn registration_with_typename_seeds_field_rows() {
        let store = initialize_store().await;
        let index = repo_index();

        register(&store, &index, "R", Some("Repo")).await.unwrap();

        // One primitive (name), no links, one connection (issues).
        assert_eq!(row_counts(&store).await, (1, 1, 0, 1));
    }

    #[tokio::test]
    async fn re_registration_with_same_typename_is_a_noop() {
        let store = initialize_store().await;
        let index = repo_index();

        register(&store, &index, "R", Some("Repo")).await.unwrap();
        let before = row_counts(&store).await;
        register(&store, &index, "R", Some("Repo")).await.unwrap();
        register(&store, &index, "R", None).await.unwrap();

        assert_eq!(row_counts(&store).await, before);
    }

    #[tokio::test]
    async fn re_registration_with_differing_typename_is_an_error() {
        let store = initialize_store().await;
        let index = repo_index();

        register(&store, &index, "R", Some("Repo")).await.unwrap();
        let result = register(&store, &index, "R", Some("Issue")).await;

        assert!(matches!(
            result,
            Err(IngestError::TypenameConflict { .. })
        ));
    }

    #[tokio::test]
    async fn typename_upgrade_seeds_field_rows() {
        let store = initialize_store().await;
        let index = repo_index();

        register(&store, &index, "R", None).await.unwrap();
        assert_eq!(row_counts(&store).await, (1, 0, 0, 0));

        register(&store, &index, "R", Some("Repo")).await.unwrap();
        assert_eq!(row_counts(&store).await, (1, 1, 0, 1));

        // Idempotent after the upgrade.
        register(&store, &index, "R", Some("Repo")).await.unwrap();
        assert_eq!(row_counts(&store).await, (1, 1, 0, 1));
    }

    #[tokio::test]
    async fn registration_with_undeclared_typename_is_an_error() {
        let store = initialize_store().await;
        let index = repo_index();

        let result = register(&store, &index, "R", Some("Wiki")).await;
        assert!(matches!(result, Err(IngestError::UnknownTypename { .. })));
    }

    #[tokio::test]
    async fn guesser_disagreement_does_not_block_registration() {
        let store = initialize_store().await;
        let index = repo_index();
        let options = MirrorOptions {
            guess_typename: Some(Box::new(|_| Some("Issue".to_owned()))),
            ..Default::default()
        };

        let mut tx = store.pool.begin().await.unwrap();
        register_object(&mut tx, &index, &options, &ObjectId::from("R"), Some("Repo"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        assert_eq!(
            object::object_typename(&mut tx, &ObjectId::from("R")).await.unwrap(),
            Some(Some("Repo".to_owned()))
        );
    }

    #[tokio::test]
    async fn own_data_writes_primitives_and_stamps_last_update() {
        let store = initialize_store().await;
        let index = repo_index();
        register(&store, &index, "R", Some("Repo")).await.unwrap();

        ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "owndata_0": [{ "__typename": "Repo", "id": "R", "name": "x" }],
            }),
        )
        .await
        .unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        let value: Option<String> = query_scalar(
            "SELECT value FROM primitives WHERE object_id = 'R' AND field_name = 'name'",
        )
        .fetch_one(&mut *tx)
        .await
        .unwrap();
        assert_eq!(value.as_deref(), Some("\"x\""));

        let last_update: Option<i64> =
            query_scalar("SELECT last_update FROM objects WHERE id = 'R'")
                .fetch_one(&mut *tx)
                .await
                .unwrap();
        assert!(last_update.is_some());
    }

    #[tokio::test]
    async fn missing_primitive_is_fatal_and_rolls_back() {
        let store = initialize_store().await;
        let index = repo_index();
        register(&store, &index, "R", Some("Repo")).await.unwrap();

        let result = ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "owndata_0": [{ "__typename": "Repo", "id": "R" }],
            }),
        )
        .await;

        match result {
            Err(IngestError::MissingPrimitive { ref field, ref id }) => {
                assert_eq!(field, "name");
                assert_eq!(id, "R");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // The rolled-back transaction left no update epoch behind.
        let mut tx = store.pool.begin().await.unwrap();
        let updates: i64 = query_scalar("SELECT COUNT(*) FROM updates")
            .fetch_one(&mut *tx)
            .await
            .unwrap();
        assert_eq!(updates, 0);
    }

    #[tokio::test]
    async fn own_data_batch_mixing_typenames_is_fatal() {
        let store = initialize_store().await;
        let index = repo_index();
        register(&store, &index, "R", Some("Repo")).await.unwrap();
        register(&store, &index, "I", Some("Issue")).await.unwrap();

        let result = ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "owndata_0": [
                    { "__typename": "Repo", "id": "R", "name": "x" },
                    { "__typename": "Issue", "id": "I", "title": "t" },
                ],
            }),
        )
        .await;

        assert!(matches!(
            result,
            Err(IngestError::InconsistentTypenames { .. })
        ));
    }

    #[tokio::test]
    async fn own_data_batch_with_duplicate_id_is_fatal() {
        let store = initialize_store().await;
        let index = repo_index();
        register(&store, &index, "R", Some("Repo")).await.unwrap();

        let result = ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "owndata_0": [
                    { "__typename": "Repo", "id": "R", "name": "x" },
                    { "__typename": "Repo", "id": "R", "name": "y" },
                ],
            }),
        )
        .await;

        assert!(matches!(result, Err(IngestError::DuplicateOwnData { .. })));
    }

    #[tokio::test]
    async fn unfaithful_link_registers_target_as_typeless() {
        let store = initialize_store().await;
        let index = forge_index();
        register(&store, &index, "I1", Some("Issue")).await.unwrap();

        ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "owndata_0": [{
                    "__typename": "Issue",
                    "id": "I1",
                    "title": "t",
                    "state": "OPEN",
                    "author": { "id": "U1" },
                }],
            }),
        )
        .await
        .unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        assert_eq!(
            object::object_typename(&mut tx, &ObjectId::from("U1")).await.unwrap(),
            Some(None)
        );
        let child: Option<String> = query_scalar(
            "SELECT child_id FROM links WHERE parent_id = 'I1' AND field_name = 'author'",
        )
        .fetch_one(&mut *tx)
        .await
        .unwrap();
        assert_eq!(child.as_deref(), Some("U1"));
    }

    #[tokio::test]
    async fn union_reference_registers_the_concrete_clause() {
        let store = initialize_store().await;
        let index = forge_index();
        register(&store, &index, "ref1", Some("Ref")).await.unwrap();

        ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "owndata_0": [{
                    "__typename": "Ref",
                    "id": "ref1",
                    "target": { "__typename": "Commit", "id": "C9" },
                }],
            }),
        )
        .await
        .unwrap();

        // The returned clause typename seeds a Commit skeleton.
        let mut tx = store.pool.begin().await.unwrap();
        assert_eq!(
            object::object_typename(&mut tx, &ObjectId::from("C9")).await.unwrap(),
            Some(Some("Commit".to_owned()))
        );
        let seeded: i64 = query_scalar(
            "SELECT COUNT(*) FROM primitives WHERE object_id = 'C9'",
        )
        .fetch_one(&mut *tx)
        .await
        .unwrap();
        assert!(seeded > 0);
    }

    #[tokio::test]
    async fn blacklisted_link_target_becomes_null_without_registration() {
        let store = initialize_store().await;
        let index = forge_index();
        register(&store, &index, "I1", Some("Issue")).await.unwrap();

        let options = MirrorOptions {
            blacklisted_ids: vec![ObjectId::from("U1")].into_iter().collect(),
            ..Default::default()
        };

        ingest(
            &store,
            &index,
            &options,
            json!({
                "owndata_0": [{
                    "__typename": "Issue",
                    "id": "I1",
                    "title": "t",
                    "state": "OPEN",
                    "author": { "id": "U1" },
                }],
            }),
        )
        .await
        .unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        assert_eq!(
            object::object_typename(&mut tx, &ObjectId::from("U1")).await.unwrap(),
            None
        );
        let child: Option<String> = query_scalar(
            "SELECT child_id FROM links WHERE parent_id = 'I1' AND field_name = 'author'",
        )
        .fetch_one(&mut *tx)
        .await
        .unwrap();
        assert_eq!(child, None);
    }

    #[tokio::test]
    async fn null_nested_field_stores_the_absence_sentinel() {
        let store = initialize_store().await;
        let index = forge_index();
        register(&store, &index, "C1", Some("Commit")).await.unwrap();

        ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "owndata_0": [{
                    "__typename": "Commit",
                    "id": "C1",
                    "message": "m",
                    "author": null,
                    "parent": null,
                }],
            }),
        )
        .await
        .unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        let presence: Option<String> = query_scalar(
            "SELECT value FROM primitives WHERE object_id = 'C1' AND field_name = 'author'",
        )
        .fetch_one(&mut *tx)
        .await
        .unwrap();
        assert_eq!(presence.as_deref(), Some("0"));

        // The egg rows stay untouched.
        let egg: Option<String> = query_scalar(
            "SELECT value FROM primitives WHERE object_id = 'C1' AND field_name = 'author.date'",
        )
        .fetch_one(&mut *tx)
        .await
        .unwrap();
        assert_eq!(egg, None);
    }

    #[tokio::test]
    async fn present_nested_field_writes_its_eggs() {
        let store = initialize_store().await;
        let index = forge_index();
        register(&store, &index, "C1", Some("Commit")).await.unwrap();

        ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "owndata_0": [{
                    "__typename": "Commit",
                    "id": "C1",
                    "message": "m",
                    "author": {
                        "date": "2020",
                        "user": { "__typename": "User", "id": "U1" },
                    },
                    "parent": null,
                }],
            }),
        )
        .await
        .unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        let presence: Option<String> = query_scalar(
            "SELECT value FROM primitives WHERE object_id = 'C1' AND field_name = 'author'",
        )
        .fetch_one(&mut *tx)
        .await
        .unwrap();
        assert_eq!(presence.as_deref(), Some("1"));

        let date: Option<String> = query_scalar(
            "SELECT value FROM primitives WHERE object_id = 'C1' AND field_name = 'author.date'",
        )
        .fetch_one(&mut *tx)
        .await
        .unwrap();
        assert_eq!(date.as_deref(), Some("\"2020\""));

        // The faithful user egg registered a User skeleton.
        assert_eq!(
            object::object_typename(&mut tx, &ObjectId::from("U1")).await.unwrap(),
            Some(Some("User".to_owned()))
        );
    }

    #[tokio::test]
    async fn connection_page_appends_entries_with_increasing_indices() {
        let store = initialize_store().await;
        let index = repo_index();
        register(&store, &index, "R", Some("Repo")).await.unwrap();

        ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "node_0": {
                    "id": "R",
                    "issues": {
                        "totalCount": 2,
                        "pageInfo": { "endCursor": "c1", "hasNextPage": true },
                        "nodes": [{ "__typename": "Issue", "id": "I1" }],
                    },
                },
            }),
        )
        .await
        .unwrap();

        ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "node_0": {
                    "id": "R",
                    "issues": {
                        "totalCount": 2,
                        "pageInfo": { "endCursor": "c2", "hasNextPage": false },
                        "nodes": [{ "__typename": "Issue", "id": "I2" }, null],
                    },
                },
            }),
        )
        .await
        .unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        let row = connection::connection_row(&mut tx, &ObjectId::from("R"), "issues")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.total_count, Some(2));
        assert_eq!(row.has_next_page, Some(false));
        assert_eq!(row.end_cursor.as_deref(), Some("c2"));

        let entries = connection::entry_rows_for(&mut tx, &[ObjectId::from("R")])
            .await
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries.iter().map(|e| e.idx).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(entries[0].child_id.as_deref(), Some("I1"));
        assert_eq!(entries[1].child_id.as_deref(), Some("I2"));
        // The tombstoned remote reference keeps its slot.
        assert_eq!(entries[2].child_id, None);
    }

    #[tokio::test]
    async fn empty_final_page_completes_the_connection() {
        let store = initialize_store().await;
        let index = repo_index();
        register(&store, &index, "R", Some("Repo")).await.unwrap();

        ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "node_0": {
                    "id": "R",
                    "issues": {
                        "totalCount": 0,
                        "pageInfo": { "endCursor": null, "hasNextPage": false },
                        "nodes": [],
                    },
                },
            }),
        )
        .await
        .unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        let row = connection::connection_row(&mut tx, &ObjectId::from("R"), "issues")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.has_next_page, Some(false));
        assert_eq!(row.end_cursor, None);
        assert!(row.last_update.is_some());

        // Complete and fresh: excluded from the next plan.
        let stale = connection::stale_connections(&mut tx, 1_000).await.unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn unknown_connection_field_is_fatal() {
        let store = initialize_store().await;
        let index = repo_index();
        register(&store, &index, "R", Some("Repo")).await.unwrap();

        let result = ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "node_0": {
                    "id": "R",
                    "stargazers": {
                        "totalCount": 0,
                        "pageInfo": { "endCursor": null, "hasNextPage": false },
                        "nodes": [],
                    },
                },
            }),
        )
        .await;

        assert!(matches!(
            result,
            Err(IngestError::UnknownConnection { .. })
        ));
    }

    #[tokio::test]
    async fn omitted_connection_is_a_warning_not_an_error() {
        let store = initialize_store().await;
        let index = repo_index();
        register(&store, &index, "R", Some("Repo")).await.unwrap();

        ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "node_0": { "id": "R", "issues": null },
            }),
        )
        .await
        .unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        let row = connection::connection_row(&mut tx, &ObjectId::from("R"), "issues")
            .await
            .unwrap()
            .unwrap();
        assert!(row.last_update.is_none());
    }

    #[tokio::test]
    async fn typename_resolutions_upgrade_typeless_objects() {
        let store = initialize_store().await;
        let index = forge_index();
        register(&store, &index, "U1", None).await.unwrap();

        ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({
                "typenames_0": [{ "__typename": "User", "id": "U1" }],
            }),
        )
        .await
        .unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        assert_eq!(
            object::object_typename(&mut tx, &ObjectId::from("U1")).await.unwrap(),
            Some(Some("User".to_owned()))
        );
    }

    #[tokio::test]
    async fn unsolicited_result_kinds_are_rejected() {
        let store = initialize_store().await;
        let index = repo_index();

        let result = ingest(
            &store,
            &index,
            &MirrorOptions::default(),
            json!({ "surprise_0": [] }),
        )
        .await;

        assert!(matches!(
            result,
            Err(IngestError::UnknownResultKind { .. })
        ));
    }
}
