// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::db::errors::StorageError;

/// Errors raised while registering objects or ingesting a response. Any of
/// these rolls back the enclosing transaction; partial updates are never
/// observable.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    /// Attempt to re-register an object under a different non-null
    /// typename.
    #[error("object '{id}' already has typename '{stored}', cannot register as '{offered}'")]
    TypenameConflict {
        id: String,
        stored: String,
        offered: String,
    },

    /// Registration with a typename the schema does not declare as an
    /// object.
    #[error("cannot register object of undeclared type '{typename}'")]
    UnknownTypename { typename: String },

    /// The response carries own data or connections for an object the
    /// store has never seen.
    #[error("response contains data for unregistered object '{id}'")]
    UnregisteredObject { id: String },

    /// A primitive (or nested-presence, or nested-egg primitive) field is
    /// missing from an own-data record.
    #[error("Missing primitive {field} on {id}")]
    MissingPrimitive { field: String, id: String },

    /// A link (or nested-egg link) field is missing from an own-data
    /// record.
    #[error("Missing link {field} on {id}")]
    MissingLink { field: String, id: String },

    /// An own-data batch contains objects claiming different typenames.
    #[error("own-data batch mixes typenames '{expected}' and '{actual}'")]
    InconsistentTypenames { expected: String, actual: String },

    /// An own-data batch contains the same id twice.
    #[error("own-data batch contains object '{id}' twice")]
    DuplicateOwnData { id: String },

    /// A connection update for a field that is not a declared connection
    /// on the object's type.
    #[error("'{field}' is not a connection on type '{typename}'")]
    UnknownConnection { typename: String, field: String },

    /// A top-level alias the planner never generates.
    #[error("unrecognised result kind '{alias}'")]
    UnknownResultKind { alias: String },

    /// The response does not have the shape the generated query demands.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
