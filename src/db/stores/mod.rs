// SPDX-License-Identifier: AGPL-3.0-or-later

//! Row-level storage operations, grouped by table family.
//!
//! Functions taking a `&mut SqliteConnection` only ever run inside a
//! transaction the caller has begun; beginning another transaction while
//! holding the borrow is unrepresentable.
pub(crate) mod connection;
pub(crate) mod meta;
pub(crate) mod object;
pub(crate) mod update;
