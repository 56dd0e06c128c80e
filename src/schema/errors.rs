// SPDX-License-Identifier: AGPL-3.0-or-later

/// `Schema` validation errors.
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    /// The same typename was declared twice.
    #[error("type '{0}' declared more than once")]
    DuplicateType(String),

    /// The same field name was declared twice on one object.
    #[error("field '{field}' declared more than once on '{typename}'")]
    DuplicateField { typename: String, field: String },

    /// An object declares no id field, more than one, or one under the
    /// wrong name.
    #[error("object '{0}' must declare exactly one id field named \"id\"")]
    BadIdField(String),

    /// A field uses a name the mirror reserves for itself.
    #[error("field '{field}' on '{typename}' uses a reserved name")]
    ReservedFieldName { typename: String, field: String },

    /// Field names containing '.' would collide with the storage names of
    /// nested eggs.
    #[error("field '{field}' on '{typename}' contains '.'")]
    InvalidFieldName { typename: String, field: String },

    /// A field or union clause references a typename the schema does not
    /// declare.
    #[error("'{typename}' references undeclared type '{target}'")]
    UnknownType { typename: String, target: String },

    /// A field or union clause references a declared type of the wrong
    /// kind, e.g. a node field targeting a scalar.
    #[error("'{typename}' expects {expected} for '{target}'")]
    WrongKind {
        typename: String,
        target: String,
        expected: &'static str,
    },
}
