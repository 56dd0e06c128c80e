// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::BTreeSet;
use std::fmt;

use crate::types::ObjectId;

/// Predicate guessing the typename of an object from its id.
///
/// Some remote services encode the type into their ids; a guesser lets the
/// mirror cross-check registrations against that encoding. A disagreement
/// is reported as a warning and changes nothing.
pub type TypenameGuesser = Box<dyn Fn(&ObjectId) -> Option<String> + Send + Sync>;

/// Configuration of a mirror instance.
#[derive(Default)]
pub struct MirrorOptions {
    /// Ids which are treated as null references wherever they appear as
    /// link or connection targets. Lets operators patch around broken
    /// remote data without schema changes.
    ///
    /// The blacklist is part of the store's compatibility config: two
    /// installations with differing blacklists may not share a database
    /// file.
    pub blacklisted_ids: BTreeSet<ObjectId>,

    /// Optional typename guesser, see [`TypenameGuesser`].
    pub guess_typename: Option<TypenameGuesser>,
}

impl fmt::Debug for MirrorOptions {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        // The guesser is an opaque closure, report only its presence.
        fmt.debug_struct("MirrorOptions")
            .field("blacklisted_ids", &self.blacklisted_ids)
            .field("guess_typename", &self.guess_typename.is_some())
            .finish()
    }
}

/// Options of one call to the update driver.
///
/// The batch limits bound the fanout of every single generated query; the
/// driver keeps issuing queries until nothing is stale, so they bound
/// per-query cost, not total work.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Cutoff timestamp: objects and connections loaded strictly before
    /// this instant count as stale.
    pub since_epoch_millis: i64,

    /// Timestamp recorded for every update epoch this driver run creates.
    pub now_epoch_millis: i64,

    /// Max number of typename-only lookups per query.
    pub typenames_limit: usize,

    /// Max objects whose own data is fetched per query.
    pub nodes_limit: usize,

    /// Max objects of a single type per batched `nodes(ids: …)` lookup.
    pub nodes_of_type_limit: usize,

    /// Max connections fetched per query.
    pub connection_limit: usize,

    /// `first:` argument of each connection read.
    pub connection_page_size: usize,
}

impl UpdateOptions {
    pub fn new(since_epoch_millis: i64, now_epoch_millis: i64) -> Self {
        Self {
            since_epoch_millis,
            now_epoch_millis,
            typenames_limit: 100,
            nodes_limit: 100,
            nodes_of_type_limit: 50,
            connection_limit: 20,
            connection_page_size: 50,
        }
    }

    /// All batch limits must allow at least one item, otherwise the update
    /// loop could never drain a non-empty plan.
    pub(crate) fn validate(&self) -> Result<(), String> {
        let limits = [
            ("typenames_limit", self.typenames_limit),
            ("nodes_limit", self.nodes_limit),
            ("nodes_of_type_limit", self.nodes_of_type_limit),
            ("connection_limit", self.connection_limit),
            ("connection_page_size", self.connection_page_size),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(format!("{} must be at least 1", name));
            }
        }
        Ok(())
    }
}
