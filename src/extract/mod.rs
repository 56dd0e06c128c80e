// SPDX-License-Identifier: AGPL-3.0-or-later

//! Materialises a transitively closed object graph from the store.
//!
//! Extraction is a two-pass walk inside a single read transaction: first
//! one result record is allocated per transitive dependency of the root,
//! then primitives, links and connection entries are merged into them.
//! Node references are arena keys into the extraction's own object map, so
//! cyclic graphs are representable and every distinct remote object is
//! exactly one record, preserving identity-by-reference for readers.
mod errors;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use sqlx::SqliteConnection;

pub use errors::ExtractError;

use crate::db::errors::StorageError;
use crate::db::stores::{connection, object};
use crate::schema::{ObjectIndex, SchemaIndex};
use crate::types::ObjectId;

/// One field value of an extracted object.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    Null,

    /// A decoded primitive or enum value.
    Primitive(Value),

    /// A node reference: key into [`ExtractedGraph::object`].
    Reference(ObjectId),

    /// A present nested field with its egg values.
    Nested(BTreeMap<String, ExtractedValue>),

    /// A connection, in stable entry order. Tombstoned entries are `Null`.
    List(Vec<ExtractedValue>),
}

/// One materialised object.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedObject {
    pub typename: String,
    pub id: ObjectId,
    pub fields: BTreeMap<String, ExtractedValue>,
}

/// A materialised object graph, rooted and possibly cyclic.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedGraph {
    root: ObjectId,
    objects: HashMap<ObjectId, ExtractedObject>,
}

impl ExtractedGraph {
    pub fn root_id(&self) -> &ObjectId {
        &self.root
    }

    pub fn root(&self) -> &ExtractedObject {
        &self.objects[&self.root]
    }

    pub fn object(&self, id: &ObjectId) -> Option<&ExtractedObject> {
        self.objects.get(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Renders the graph as one JSON tree rooted at the root record, with
    /// references expanded in place.
    ///
    /// Shared records appear once per reference; a reference cycle cannot
    /// be rendered and fails instead of recursing forever.
    pub fn to_json(&self) -> Result<Value, ExtractError> {
        let mut on_path = HashSet::new();
        self.render_object(&self.root, &mut on_path)
    }

    fn render_object(
        &self,
        id: &ObjectId,
        on_path: &mut HashSet<ObjectId>,
    ) -> Result<Value, ExtractError> {
        if !on_path.insert(id.clone()) {
            return Err(ExtractError::CyclicGraph);
        }

        let object = &self.objects[id];
        let mut rendered = serde_json::Map::new();
        rendered.insert(
            "__typename".to_owned(),
            Value::String(object.typename.clone()),
        );
        rendered.insert("id".to_owned(), Value::String(object.id.to_string()));
        for (field, value) in &object.fields {
            rendered.insert(field.clone(), self.render_value(value, on_path)?);
        }

        on_path.remove(id);
        Ok(Value::Object(rendered))
    }

    fn render_value(
        &self,
        value: &ExtractedValue,
        on_path: &mut HashSet<ObjectId>,
    ) -> Result<Value, ExtractError> {
        match value {
            ExtractedValue::Null => Ok(Value::Null),
            ExtractedValue::Primitive(value) => Ok(value.clone()),
            ExtractedValue::Reference(id) => self.render_object(id, on_path),
            ExtractedValue::Nested(eggs) => {
                let mut rendered = serde_json::Map::new();
                for (egg, value) in eggs {
                    rendered.insert(egg.clone(), self.render_value(value, on_path)?);
                }
                Ok(Value::Object(rendered))
            }
            ExtractedValue::List(entries) => {
                let mut rendered = Vec::with_capacity(entries.len());
                for entry in entries {
                    rendered.push(self.render_value(entry, on_path)?);
                }
                Ok(Value::Array(rendered))
            }
        }
    }
}

/// Materialises the transitive dependency closure of `root`.
///
/// Runs inside the transaction the caller has begun, so the walks all
/// observe one consistent snapshot.
pub(crate) async fn extract(
    conn: &mut SqliteConnection,
    index: &SchemaIndex,
    root: &ObjectId,
) -> Result<ExtractedGraph, ExtractError> {
    // Pass one: collect the closure and verify it is fully loaded.
    let deps = object::transitive_dependencies(conn, root).await?;
    let rows = object::object_rows_by_ids(conn, &deps).await?;

    let mut typenames: HashMap<ObjectId, String> = HashMap::with_capacity(rows.len());
    for row in &rows {
        match (&row.typename, row.last_update) {
            (Some(typename), Some(_)) => {
                typenames.insert(ObjectId::from(row.id.clone()), typename.clone());
            }
            _ => {
                return Err(ExtractError::NeverLoaded {
                    root: root.to_string(),
                    id: row.id.clone(),
                    what: "own data".to_owned(),
                })
            }
        }
    }

    for dep in &deps {
        if !typenames.contains_key(dep) {
            if dep == root {
                return Err(ExtractError::NoSuchObject {
                    root: root.to_string(),
                });
            }
            // Links and entries only reference registered objects; a hole
            // in the closure means the store is inconsistent.
            return Err(ExtractError::Storage(StorageError::Corruption(format!(
                "dependency '{}' has no objects row",
                dep
            ))));
        }
    }

    let connection_rows = connection::connection_rows_for(conn, &deps).await?;
    for row in &connection_rows {
        if row.last_update.is_none() {
            return Err(ExtractError::NeverLoaded {
                root: root.to_string(),
                id: row.object_id.clone(),
                what: format!("\"{}\" connection", row.field_name),
            });
        }
    }

    // Pass two: allocate one record per dependency, then merge the row
    // walks into them.
    let mut objects: HashMap<ObjectId, ExtractedObject> = typenames
        .iter()
        .map(|(id, typename)| {
            (
                id.clone(),
                ExtractedObject {
                    typename: typename.clone(),
                    id: id.clone(),
                    fields: BTreeMap::new(),
                },
            )
        })
        .collect();

    let object_index = |typename: &str| -> &ObjectIndex {
        index
            .object(typename)
            .expect("stored typenames are declared")
    };

    // Primitives, ordered by field name so nest parents precede eggs.
    for row in object::primitive_rows_for(conn, &deps).await? {
        let id = ObjectId::from(row.object_id.clone());
        let fields_index = object_index(&typenames[&id]);
        let record = objects.get_mut(&id).expect("allocated above");

        let required = |value: &Option<String>| -> Result<String, StorageError> {
            value.clone().ok_or_else(|| {
                StorageError::Corruption(format!(
                    "loaded object '{}' has unwritten primitive '{}'",
                    row.object_id, row.field_name
                ))
            })
        };

        match split_compound(&row.field_name) {
            Some((nest, egg)) => {
                // Eggs of an absent nest may be unwritten or stale; they
                // are not merged either way.
                if matches!(record.fields.get(nest), Some(ExtractedValue::Null)) {
                    continue;
                }
                let raw = required(&row.value)?;
                merge_egg(record, nest, egg, decode_primitive(&raw, &row.field_name)?)?;
            }
            None if fields_index.is_nested(&row.field_name) => {
                let raw = required(&row.value)?;
                let value = match raw.as_str() {
                    "0" => ExtractedValue::Null,
                    "1" => ExtractedValue::Nested(BTreeMap::new()),
                    _ => {
                        return Err(ExtractError::Storage(StorageError::Corruption(format!(
                            "nested-presence indicator '{}' on '{}' holds '{}'",
                            row.field_name, row.object_id, raw
                        ))))
                    }
                };
                record.fields.insert(row.field_name.clone(), value);
            }
            None => {
                let raw = required(&row.value)?;
                record.fields.insert(
                    row.field_name.clone(),
                    decode_primitive(&raw, &row.field_name)?,
                );
            }
        }
    }

    // Links; egg links merge into their nest exactly like egg primitives.
    for row in object::link_rows_for(conn, &deps).await? {
        let id = ObjectId::from(row.parent_id.clone());
        let record = objects.get_mut(&id).expect("allocated above");
        let value = match row.child_id {
            Some(child) => ExtractedValue::Reference(ObjectId::from(child)),
            None => ExtractedValue::Null,
        };

        match split_compound(&row.field_name) {
            Some((nest, egg)) => merge_egg(record, nest, egg, value)?,
            None => {
                record.fields.insert(row.field_name.clone(), value);
            }
        }
    }

    // Connections: every loaded connection becomes an array, empty ones
    // included, then the entry walk appends in stable index order.
    for row in &connection_rows {
        let id = ObjectId::from(row.object_id.clone());
        let record = objects.get_mut(&id).expect("allocated above");
        record
            .fields
            .insert(row.field_name.clone(), ExtractedValue::List(Vec::new()));
    }

    for row in connection::entry_rows_for(conn, &deps).await? {
        let id = ObjectId::from(row.object_id.clone());
        let record = objects.get_mut(&id).expect("allocated above");
        let entry = match row.child_id {
            Some(child) => ExtractedValue::Reference(ObjectId::from(child)),
            None => ExtractedValue::Null,
        };
        match record.fields.get_mut(&row.field_name) {
            Some(ExtractedValue::List(entries)) => entries.push(entry),
            _ => {
                return Err(ExtractError::Storage(StorageError::Corruption(format!(
                    "entry of unknown connection '{}' on '{}'",
                    row.field_name, row.object_id
                ))))
            }
        }
    }

    Ok(ExtractedGraph {
        root: root.clone(),
        objects,
    })
}

fn split_compound(field_name: &str) -> Option<(&str, &str)> {
    field_name
        .find('.')
        .map(|dot| (&field_name[..dot], &field_name[dot + 1..]))
}

/// Merges an egg value into its nest's record if and only if the nest is
/// present. Eggs of an absent nest are stale leftovers and skipped.
fn merge_egg(
    record: &mut ExtractedObject,
    nest: &str,
    egg: &str,
    value: ExtractedValue,
) -> Result<(), ExtractError> {
    match record.fields.get_mut(nest) {
        Some(ExtractedValue::Nested(eggs)) => {
            eggs.insert(egg.to_owned(), value);
            Ok(())
        }
        Some(ExtractedValue::Null) => Ok(()),
        _ => Err(ExtractError::Storage(StorageError::Corruption(format!(
            "egg '{}.{}' on '{}' precedes its nest",
            nest, egg, record.id
        )))),
    }
}

fn decode_primitive(raw: &str, field_name: &str) -> Result<ExtractedValue, ExtractError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| {
        StorageError::Corruption(format!(
            "primitive '{}' holds undecodable value '{}'",
            field_name, raw
        ))
    })?;

    Ok(match value {
        Value::Null => ExtractedValue::Null,
        value => ExtractedValue::Primitive(value),
    })
}
