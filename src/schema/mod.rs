// SPDX-License-Identifier: AGPL-3.0-or-later

//! Declarative schema model describing the universe of remote types.
//!
//! A [`Schema`] maps typenames to type declarations: objects with typed
//! fields, unions over object clauses, and the scalar and enum types which
//! primitive fields refer to. Schemas are validated on construction and
//! afterwards immutable.
//!
//! The relational layout, the query planner and the extractor all consume
//! the same derived [`SchemaIndex`] which caches, per object type, the
//! field lists each of them needs.
mod errors;
mod index;
mod model;

pub use errors::SchemaError;
pub use index::{
    nested_field_name, ConnectionField, LinkField, NestedField, ObjectIndex, SchemaIndex,
};
pub use model::{
    EggKind, FieldKind, Fidelity, GroundType, Nullability, Schema, SchemaBuilder, TypeDecl,
    ID_FIELD_NAME, TYPENAME_FIELD_NAME,
};
