// SPDX-License-Identifier: AGPL-3.0-or-later

use sqlx::FromRow;

/// A struct representing a single row of the objects table.
#[derive(FromRow, Debug, Clone)]
pub struct ObjectRow {
    /// Id of this object.
    pub id: String,

    /// Typename of this object, null while it has never been resolved.
    pub typename: Option<String>,

    /// Id of the update which last ingested this object's own data, null
    /// while it has never been loaded.
    pub last_update: Option<i64>,
}

/// A struct representing a single row of the primitives table.
#[derive(FromRow, Debug, Clone)]
pub struct PrimitiveRow {
    /// Id of the owning object.
    pub object_id: String,

    /// Storage field name; nested eggs use `"<nest>.<egg>"`.
    pub field_name: String,

    /// JSON-encoded primitive value, the nested-presence indicators "0" /
    /// "1", or null while the object is only a skeleton.
    pub value: Option<String>,
}

/// A struct representing a single row of the links table.
#[derive(FromRow, Debug, Clone)]
pub struct LinkRow {
    /// Id of the owning object.
    pub parent_id: String,

    /// Storage field name; nested eggs use `"<nest>.<egg>"`.
    pub field_name: String,

    /// Id of the referenced object, or null.
    pub child_id: Option<String>,
}

/// A struct representing a single row of the connections table.
#[derive(FromRow, Debug, Clone)]
pub struct ConnectionRow {
    /// Primary key, referenced by connection entries.
    pub id: i64,

    /// Id of the owning object.
    pub object_id: String,

    /// Name of the connection field.
    pub field_name: String,

    /// Id of the update which last ingested a page of this connection.
    pub last_update: Option<i64>,

    /// Total number of entries the remote reported on the last ingest.
    pub total_count: Option<i64>,

    /// Whether the remote reported further pages on the last ingest.
    pub has_next_page: Option<bool>,

    /// Cursor to continue paging from, null before the first page and when
    /// the remote returned none.
    pub end_cursor: Option<String>,
}

/// A single connection entry joined with its connection's identity, as
/// walked by the extractor.
#[derive(FromRow, Debug, Clone)]
pub struct ConnectionEntryRow {
    /// Id of the object owning the connection.
    pub object_id: String,

    /// Name of the connection field.
    pub field_name: String,

    /// Position of this entry within the connection.
    pub idx: i64,

    /// Id of the referenced object, or null for a tombstoned remote
    /// reference.
    pub child_id: Option<String>,
}

/// A stale connection as listed by the planner, joined with the owning
/// object's typename.
#[derive(FromRow, Debug, Clone)]
pub struct StaleConnectionRow {
    /// Typename of the owning object.
    pub typename: String,

    /// Id of the owning object.
    pub object_id: String,

    /// Name of the connection field.
    pub field_name: String,

    /// Whether any page of this connection was ingested before.
    pub loaded: bool,

    /// Cursor to continue from, if a page was ingested before.
    pub end_cursor: Option<String>,
}
