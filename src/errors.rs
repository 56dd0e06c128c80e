// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::db::errors::StorageError;
use crate::extract::ExtractError;
use crate::ingest::IngestError;
use crate::schema::SchemaError;
use crate::transport::TransportError;

/// Top-level error type of the mirror's public API.
#[derive(thiserror::Error, Debug)]
pub enum MirrorError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The caller supplied update options the driver cannot make progress
    /// with, e.g. a zero batch limit.
    #[error("invalid update options: {0}")]
    InvalidOptions(String),
}
