// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared fixtures for the test suite: in-memory stores, fixture schemas
//! and a scripted stub transport.
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::db::{connection_pool, SqlStore};
use crate::graphql::Layout;
use crate::schema::{
    EggKind, FieldKind, Fidelity, GroundType, Nullability, Schema, SchemaIndex,
};
use crate::transport::{QueryRequest, Transport, TransportError};

/// An initialised in-memory store with all tables created.
pub(crate) async fn initialize_store() -> SqlStore {
    let pool = connection_pool("sqlite::memory:").await.unwrap();
    let store = SqlStore::new(pool);
    store.initialize("test-config").await.unwrap();
    store
}

/// The two-type fixture: a repository with a paginated issue list.
pub(crate) fn repo_schema() -> Schema {
    Schema::builder()
        .scalar("String", GroundType::String)
        .object(
            "Repo",
            vec![
                ("id", FieldKind::Id),
                ("name", FieldKind::primitive("String", Nullability::NonNull)),
                (
                    "issues",
                    FieldKind::connection("Issue", Fidelity::Faithful),
                ),
            ],
        )
        .object(
            "Issue",
            vec![
                ("id", FieldKind::Id),
                ("title", FieldKind::primitive("String", Nullability::Nullable)),
            ],
        )
        .build()
        .unwrap()
}

pub(crate) fn repo_index() -> SchemaIndex {
    SchemaIndex::new(&repo_schema())
}

/// The larger fixture: unions, nested fields, an unfaithful reference and a
/// potentially cyclic commit history.
pub(crate) fn forge_schema() -> Schema {
    Schema::builder()
        .scalar("String", GroundType::String)
        .scalar("Int", GroundType::Number)
        .enum_type("IssueState", vec!["OPEN", "CLOSED"])
        .object(
            "Repo",
            vec![
                ("id", FieldKind::Id),
                ("name", FieldKind::primitive("String", Nullability::NonNull)),
                (
                    "issues",
                    FieldKind::connection("Issue", Fidelity::Faithful),
                ),
            ],
        )
        .object(
            "Issue",
            vec![
                ("id", FieldKind::Id),
                ("title", FieldKind::primitive("String", Nullability::Nullable)),
                ("state", FieldKind::enum_("IssueState", Nullability::NonNull)),
                ("author", FieldKind::node("User", Fidelity::Unfaithful)),
            ],
        )
        .object(
            "User",
            vec![
                ("id", FieldKind::Id),
                ("login", FieldKind::primitive("String", Nullability::NonNull)),
            ],
        )
        .object(
            "Commit",
            vec![
                ("id", FieldKind::Id),
                (
                    "message",
                    FieldKind::primitive("String", Nullability::NonNull),
                ),
                (
                    "author",
                    FieldKind::nested(vec![
                        ("date", EggKind::primitive("String", Nullability::Nullable)),
                        ("user", EggKind::node("User", Fidelity::Faithful)),
                    ]),
                ),
                ("parent", FieldKind::node("Commit", Fidelity::Faithful)),
            ],
        )
        .object("Blob", vec![("id", FieldKind::Id)])
        .object("Tag", vec![("id", FieldKind::Id)])
        .object("Tree", vec![("id", FieldKind::Id)])
        .union("GitObject", vec!["Blob", "Commit", "Tag", "Tree"])
        .object(
            "Ref",
            vec![
                ("id", FieldKind::Id),
                ("target", FieldKind::node("GitObject", Fidelity::Faithful)),
            ],
        )
        .build()
        .unwrap()
}

pub(crate) fn forge_index() -> SchemaIndex {
    SchemaIndex::new(&forge_schema())
}

/// Transport stub replaying a fixed script of responses.
///
/// Every posted query is recorded in its serialised form so tests can
/// assert on the exact wire text. Running out of scripted responses fails
/// the request, which the driver surfaces as a transport error.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<Value>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serialised texts of all queries posted so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn responses_left(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(&self, request: QueryRequest) -> Result<Value, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push(request.body.format(&Layout::multiline("  ")));

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError("no scripted response left".to_owned()))
    }
}
