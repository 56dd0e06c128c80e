// SPDX-License-Identifier: AGPL-3.0-or-later

#![doc = include_str!("../README.md")]
#![warn(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_import_braces,
    unused_qualifications
)]
#![allow(clippy::uninlined_format_args)]
mod config;
pub mod db;
mod errors;
pub mod extract;
pub mod graphql;
pub mod ingest;
mod mirror;
pub mod planner;
pub mod schema;
#[cfg(test)]
mod test_utils;
mod transport;
mod types;

pub use crate::config::{MirrorOptions, TypenameGuesser, UpdateOptions};
pub use crate::errors::MirrorError;
pub use crate::extract::{ExtractError, ExtractedGraph, ExtractedObject, ExtractedValue};
pub use crate::ingest::IngestError;
pub use crate::mirror::Mirror;
pub use crate::schema::{Schema, SchemaBuilder, SchemaError};
pub use crate::transport::{QueryRequest, Transport, TransportError};
pub use crate::types::ObjectId;

/// Init env_logger before the test suite runs to handle logging outputs.
///
/// We output log information using the `log` crate. In itself this doesn't print
/// out any logging information, library users can capture and handle the emitted logs
/// using a log handler. Here we use `env_logger` to handle logs emitted
/// while running our tests.
///
/// This will also capture and output any logs emitted from our dependencies. This behaviour
/// can be customised at runtime. With eg. `RUST_LOG=graph_mirror=info cargo t -- --nocapture`
/// or `RUST_LOG=sqlx=debug cargo t -- --nocapture`.
///
/// The `ctor` crate is used to define a global constructor function. This method will be run
/// before any of the test suites.
#[cfg(test)]
#[ctor::ctor]
fn init() {
    // If the `RUST_LOG` env var is not set skip initiation as we don't want
    // to see any logs.
    if std::env::var("RUST_LOG").is_ok() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}
