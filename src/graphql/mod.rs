// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured representation of the remote query language.
//!
//! The planner assembles queries as values of the AST defined here and the
//! driver serialises them to text just before handing them to the
//! transport. The AST is construct-and-print only, there is no parser: the
//! mirror never needs to read queries back.
//!
//! Serialisation is a pure function of the AST and a [`Layout`] strategy,
//! deterministic and whitespace-stable, so query text can be asserted on
//! byte-for-byte in tests and compared across runs in the network log.
mod ast;
mod layout;

pub use ast::{
    Body, Definition, Field, FragmentDefinition, QueryDefinition, QueryValue, Selection,
};
pub use layout::Layout;
