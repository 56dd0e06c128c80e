// SPDX-License-Identifier: AGPL-3.0-or-later

//! Computes which parts of the mirror are stale and packs them into one
//! bounded query.
//!
//! A [`Plan`] is an immutable snapshot of everything that remains to be
//! refreshed: objects whose typename is unresolved, objects whose own data
//! is missing or older than the cutoff, and connections which are missing,
//! outdated or known to have further pages. The update driver terminates
//! exactly when a plan is empty.
//!
//! [`query_from_plan`] turns (a bounded prefix of) a plan into a single
//! query document. Every top-level selection is aliased with a prefix
//! encoding its kind so the ingestor can re-dispatch the response without
//! any out-of-band state.
use sqlx::SqliteConnection;

use crate::config::UpdateOptions;
use crate::db::errors::StorageError;
use crate::db::stores::{connection, object};
use crate::graphql::{Body, Field, QueryDefinition, QueryValue, Selection};
use crate::schema::{Fidelity, Schema, SchemaIndex, ID_FIELD_NAME, TYPENAME_FIELD_NAME};
use crate::types::ObjectId;

/// Alias prefix of typename-resolution selections.
pub(crate) const TYPENAMES_PREFIX: &str = "typenames_";

/// Alias prefix of own-data selections.
pub(crate) const OWN_DATA_PREFIX: &str = "owndata_";

/// Alias prefix of per-object connection selections.
pub(crate) const NODE_PREFIX: &str = "node_";

/// One object whose own data needs a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRefresh {
    pub typename: String,
    pub id: ObjectId,
}

/// One connection which needs a(nother) page fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRefresh {
    pub typename: String,
    pub object_id: ObjectId,
    pub field_name: String,

    /// Whether the connection was ever loaded. Decides if an `after:`
    /// argument is emitted at all.
    pub loaded: bool,

    /// The cursor to continue from; `None` on a loaded connection means
    /// an explicit `after: null`.
    pub end_cursor: Option<String>,
}

/// An immutable snapshot of what remains to be refreshed.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub typenames: Vec<ObjectId>,
    pub objects: Vec<ObjectRefresh>,
    pub connections: Vec<ConnectionRefresh>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.typenames.is_empty() && self.objects.is_empty() && self.connections.is_empty()
    }
}

/// Computes the full plan for the given cutoff. No limits are applied
/// here; bounding happens when the query is generated.
pub(crate) async fn plan(
    conn: &mut SqliteConnection,
    since_epoch_millis: i64,
) -> Result<Plan, StorageError> {
    let typenames = object::typeless_object_ids(conn).await?;

    let objects = object::stale_object_refs(conn, since_epoch_millis)
        .await?
        .into_iter()
        .map(|(typename, id)| ObjectRefresh { typename, id })
        .collect();

    let connections = connection::stale_connections(conn, since_epoch_millis)
        .await?
        .into_iter()
        .map(|row| ConnectionRefresh {
            typename: row.typename,
            object_id: ObjectId::from(row.object_id),
            field_name: row.field_name,
            loaded: row.loaded,
            end_cursor: row.end_cursor,
        })
        .collect();

    Ok(Plan {
        typenames,
        objects,
        connections,
    })
}

/// Packs a bounded prefix of the plan into one query document.
///
/// Leftover plan items simply stay stale and are picked up by a later
/// iteration of the update loop.
pub(crate) fn query_from_plan(
    schema: &Schema,
    index: &SchemaIndex,
    plan: &Plan,
    options: &UpdateOptions,
) -> Body {
    let mut query = QueryDefinition::new("MirrorUpdate");
    let mut alias = AliasCounter::default();

    // Typename resolutions, chunked into batched `nodes` lookups.
    let typenames: Vec<&ObjectId> = plan
        .typenames
        .iter()
        .take(options.typenames_limit)
        .collect();
    for chunk in typenames.chunks(options.nodes_of_type_limit) {
        query = query.select(
            Field::new("nodes")
                .alias(&alias.next(TYPENAMES_PREFIX))
                .arg("ids", id_list(chunk.iter().copied()))
                .select(Field::new(TYPENAME_FIELD_NAME))
                .select(Field::new(ID_FIELD_NAME)),
        );
    }

    // Own-data requests, grouped by typename, then chunked. The plan is
    // ordered by typename so groups are contiguous.
    let own_data = &plan.objects[..plan.objects.len().min(options.nodes_limit)];
    for group in group_by_typename(own_data) {
        for chunk in group.ids.chunks(options.nodes_of_type_limit) {
            query = query.select(
                Field::new("nodes")
                    .alias(&alias.next(OWN_DATA_PREFIX))
                    .arg("ids", id_list(chunk.iter().copied()))
                    .select(Selection::inline_fragment(
                        group.typename,
                        own_data_selections(schema, index, group.typename),
                    )),
            );
        }
    }

    // Connection requests, grouped by owning object. The plan is ordered
    // by object id so groups are contiguous.
    let connections = &plan.connections[..plan.connections.len().min(options.connection_limit)];
    for group in group_by_object(connections) {
        let mut fields = Vec::new();
        for refresh in group.connections {
            fields.push(connection_selection(schema, index, refresh, options).into());
        }
        query = query.select(
            Field::new("node")
                .alias(&alias.next(NODE_PREFIX))
                .arg("id", QueryValue::string(group.object_id.as_str()))
                .select(Field::new(ID_FIELD_NAME))
                .select(Selection::inline_fragment(group.typename, fields)),
        );
    }

    if alias.total == 0 {
        return Body::new();
    }

    Body::new().definition(query)
}

/// The `{ __typename? id (… on Clause { id })* }` selection set of a node
/// reference: `__typename` iff the reference is faithful, clause spreads
/// iff the target is a union.
fn shallow_selections(schema: &Schema, target: &str, fidelity: Fidelity) -> Vec<Selection> {
    let mut selections = Vec::new();

    if fidelity == Fidelity::Faithful {
        selections.push(Field::new(TYPENAME_FIELD_NAME).into());
    }

    match schema.union_clauses(target) {
        Some(clauses) => {
            for clause in clauses {
                selections.push(Selection::inline_fragment(
                    clause,
                    vec![Field::new(ID_FIELD_NAME).into()],
                ));
            }
        }
        None => selections.push(Field::new(ID_FIELD_NAME).into()),
    }

    selections
}

/// The full own-data selection set of an object type: identity, every
/// primitive and link field, and every nested field with its eggs.
fn own_data_selections(schema: &Schema, index: &SchemaIndex, typename: &str) -> Vec<Selection> {
    let object = index
        .object(typename)
        .expect("own-data requests only exist for declared object types");

    let mut selections: Vec<Selection> = vec![
        Field::new(TYPENAME_FIELD_NAME).into(),
        Field::new(ID_FIELD_NAME).into(),
    ];

    for field in &object.primitives {
        selections.push(Field::new(field).into());
    }

    for link in &object.links {
        selections.push(
            Field::new(&link.name)
                .selections(shallow_selections(schema, &link.target, link.fidelity))
                .into(),
        );
    }

    for nest in &object.nested {
        let mut eggs: Vec<Selection> = Vec::new();
        for egg in &nest.primitive_eggs {
            eggs.push(Field::new(egg).into());
        }
        for egg in &nest.node_eggs {
            eggs.push(
                Field::new(&egg.name)
                    .selections(shallow_selections(schema, &egg.target, egg.fidelity))
                    .into(),
            );
        }
        selections.push(Field::new(&nest.name).selections(eggs).into());
    }

    selections
}

/// One `field(first: …, after: …) { totalCount pageInfo nodes }` read.
fn connection_selection(
    schema: &Schema,
    index: &SchemaIndex,
    refresh: &ConnectionRefresh,
    options: &UpdateOptions,
) -> Field {
    let declared = index
        .object(&refresh.typename)
        .and_then(|object| object.connection(&refresh.field_name))
        .expect("connection requests only exist for declared connection fields");

    let mut field = Field::new(&refresh.field_name).arg(
        "first",
        QueryValue::Int(options.connection_page_size as i64),
    );

    if refresh.loaded {
        let after = match &refresh.end_cursor {
            Some(cursor) => QueryValue::string(cursor),
            None => QueryValue::Null,
        };
        field = field.arg("after", after);
    }

    field
        .select(Field::new("totalCount"))
        .select(
            Field::new("pageInfo")
                .select(Field::new("endCursor"))
                .select(Field::new("hasNextPage")),
        )
        .select(Field::new("nodes").selections(shallow_selections(
            schema,
            &declared.element,
            declared.fidelity,
        )))
}

fn id_list<'a>(ids: impl Iterator<Item = &'a ObjectId>) -> QueryValue {
    QueryValue::List(ids.map(|id| QueryValue::string(id.as_str())).collect())
}

/// Allocates the aliases of top-level selections; indices are sequential
/// per prefix.
#[derive(Default)]
struct AliasCounter {
    typenames: usize,
    own_data: usize,
    nodes: usize,
    total: usize,
}

impl AliasCounter {
    fn next(&mut self, prefix: &str) -> String {
        let counter = match prefix {
            TYPENAMES_PREFIX => &mut self.typenames,
            OWN_DATA_PREFIX => &mut self.own_data,
            _ => &mut self.nodes,
        };
        let alias = format!("{}{}", prefix, *counter);
        *counter += 1;
        self.total += 1;
        alias
    }
}

struct TypenameGroup<'a> {
    typename: &'a str,
    ids: Vec<&'a ObjectId>,
}

fn group_by_typename(objects: &[ObjectRefresh]) -> Vec<TypenameGroup<'_>> {
    let mut groups: Vec<TypenameGroup> = Vec::new();
    for refresh in objects {
        let start_new = match groups.last() {
            Some(group) => group.typename != refresh.typename,
            None => true,
        };
        if start_new {
            groups.push(TypenameGroup {
                typename: &refresh.typename,
                ids: Vec::new(),
            });
        }
        groups
            .last_mut()
            .expect("a group was just pushed")
            .ids
            .push(&refresh.id);
    }
    groups
}

struct ObjectGroup<'a> {
    object_id: &'a ObjectId,
    typename: &'a str,
    connections: Vec<&'a ConnectionRefresh>,
}

fn group_by_object(connections: &[ConnectionRefresh]) -> Vec<ObjectGroup<'_>> {
    let mut groups: Vec<ObjectGroup> = Vec::new();
    for refresh in connections {
        let start_new = match groups.last() {
            Some(group) => group.object_id != &refresh.object_id,
            None => true,
        };
        if start_new {
            groups.push(ObjectGroup {
                object_id: &refresh.object_id,
                typename: &refresh.typename,
                connections: Vec::new(),
            });
        }
        groups
            .last_mut()
            .expect("a group was just pushed")
            .connections
            .push(refresh);
    }
    groups
}
