// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::BTreeMap;

use log::debug;
use serde_json::json;

use crate::config::{MirrorOptions, UpdateOptions};
use crate::db::errors::StorageError;
use crate::db::stores::meta::VERSION;
use crate::db::stores::update;
use crate::db::{Pool, SqlStore};
use crate::errors::MirrorError;
use crate::extract::{self, ExtractedGraph};
use crate::graphql::Layout;
use crate::ingest;
use crate::planner;
use crate::schema::{Schema, SchemaIndex};
use crate::transport::{QueryRequest, Transport};
use crate::types::ObjectId;

/// A local, schema-typed mirror of a remote object graph.
///
/// The mirror owns its store and is its sole writer. Clients register the
/// objects they care about, run [`Mirror::update`] to quiescence through an
/// injected transport, and read converged state with [`Mirror::extract`].
pub struct Mirror {
    store: SqlStore,
    schema: Schema,
    index: SchemaIndex,
    options: MirrorOptions,
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.debug_struct("Mirror")
            .field("store", &self.store)
            .field("options", &self.options)
            .finish()
    }
}

impl Mirror {
    /// Binds a mirror to a store.
    ///
    /// Creates or confirms the relational layout and runs the
    /// compatibility gate: a store initialised under a different schema,
    /// blacklist or layout version is rejected untouched.
    pub async fn new(
        pool: Pool,
        schema: Schema,
        options: MirrorOptions,
    ) -> Result<Self, MirrorError> {
        let store = SqlStore::new(pool);
        store
            .initialize(&canonical_config(&schema, &options))
            .await?;

        let index = SchemaIndex::new(&schema);
        Ok(Self {
            store,
            schema,
            index,
            options,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Registers an object by id, optionally with its typename. See the
    /// lifecycle rules on [`crate::ingest`].
    pub async fn register_object(
        &self,
        id: &ObjectId,
        typename: Option<&str>,
    ) -> Result<(), MirrorError> {
        let mut tx = self.store.pool.begin().await.map_err(StorageError::from)?;
        ingest::register_object(&mut tx, &self.index, &self.options, id, typename).await?;
        tx.commit().await.map_err(StorageError::from)?;
        Ok(())
    }

    /// Runs the update loop to quiescence: plan, emit one bounded query,
    /// post it through the transport, ingest the response in one
    /// transaction; repeat until the plan is empty.
    ///
    /// A converged mirror plans nothing and returns without touching the
    /// transport. Transport errors propagate without retry; the response
    /// they interrupt is simply never ingested.
    pub async fn update<T: Transport + ?Sized>(
        &self,
        transport: &T,
        options: &UpdateOptions,
    ) -> Result<(), MirrorError> {
        options.validate().map_err(MirrorError::InvalidOptions)?;

        loop {
            let mut tx = self.store.pool.begin().await.map_err(StorageError::from)?;
            let plan = planner::plan(&mut tx, options.since_epoch_millis).await?;
            tx.commit().await.map_err(StorageError::from)?;

            if plan.is_empty() {
                debug!("Plan is empty, mirror is quiescent");
                return Ok(());
            }
            debug!(
                "Planned refresh of {} typenames, {} objects, {} connections",
                plan.typenames.len(),
                plan.objects.len(),
                plan.connections.len()
            );

            let body = planner::query_from_plan(&self.schema, &self.index, &plan, options);
            let query_text = body.format(&Layout::multiline("  "));
            let variables = BTreeMap::new();

            // The outgoing request is logged before the suspension point so
            // the audit trail also covers requests whose response is never
            // ingested.
            let mut tx = self.store.pool.begin().await.map_err(StorageError::from)?;
            let log_id = update::insert_network_log(
                &mut tx,
                &query_text,
                "{}",
                options.now_epoch_millis,
            )
            .await?;
            tx.commit().await.map_err(StorageError::from)?;

            let response = transport.post(QueryRequest { body, variables }).await?;

            let mut tx = self.store.pool.begin().await.map_err(StorageError::from)?;
            let update_id = ingest::ingest_response(
                &mut tx,
                &self.index,
                &self.options,
                &response,
                options.now_epoch_millis,
            )
            .await?;
            update::finish_network_log(&mut tx, log_id, &response.to_string(), update_id).await?;
            tx.commit().await.map_err(StorageError::from)?;

            debug!("Ingested update epoch {}", update_id);
        }
    }

    /// Materialises the transitive closure rooted at the given id from
    /// committed state.
    pub async fn extract(&self, root: &ObjectId) -> Result<ExtractedGraph, MirrorError> {
        let mut tx = self.store.pool.begin().await.map_err(StorageError::from)?;
        let graph = extract::extract(&mut tx, &self.index, root).await?;
        Ok(graph)
    }
}

/// The canonical `meta.config` blob: layout version, canonical schema and
/// the options which affect stored data. Two installations whose blobs
/// differ may not share a database file.
fn canonical_config(schema: &Schema, options: &MirrorOptions) -> String {
    let blacklisted: Vec<&str> = options
        .blacklisted_ids
        .iter()
        .map(ObjectId::as_str)
        .collect();

    json!({
        "version": VERSION,
        "schema": schema,
        "options": { "blacklisted_ids": blacklisted },
    })
    .to_string()
}
