// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::db::errors::StorageError;

/// Errors raised while materialising an object graph from the store.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// The requested root was never registered.
    #[error("cannot extract '{root}': no such object")]
    NoSuchObject { root: String },

    /// The root transitively depends on an object or connection that has
    /// never been loaded. `what` names the missing datum: `own data` or
    /// `"<field>" connection`.
    #[error("cannot extract '{root}': '{id}' is missing {what}")]
    NeverLoaded {
        root: String,
        id: String,
        what: String,
    },

    /// The extracted graph contains a reference cycle and cannot be
    /// rendered as a JSON tree.
    #[error("extracted graph is cyclic, cannot render it as a tree")]
    CyclicGraph,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
