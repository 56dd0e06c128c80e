// SPDX-License-Identifier: AGPL-3.0-or-later

/// `SqlStore` errors.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// The store was initialised under a different schema, options or
    /// layout version and may not be shared with this mirror.
    #[error("incompatible schema, options, or version")]
    IncompatibleConfig,

    /// The database contents contradict an invariant the store maintains.
    /// Hitting this is a programmer error, not an I/O failure.
    #[error("storage corruption: {0}")]
    Corruption(String),

    /// A fatal database error occured.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
