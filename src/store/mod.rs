pub mod sqlite;

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::Item;

pub use sqlite::SqliteStore;

/// A recorded identity, as shown by diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPost {
    pub identifier: String,
    pub title: Option<String>,
    pub first_seen_at: DateTime<Utc>,
}

/// Durable, append-only record of every identifier ever alerted on.
pub trait IdentityStore {
    /// Snapshot of all known identifiers.
    fn load(&self) -> Result<HashSet<String>>;

    /// Record items, ignoring identifiers that are already present.
    /// Returns how many rows were actually inserted.
    fn save(&self, items: &[Item]) -> Result<usize>;

    fn count(&self) -> Result<usize>;
    fn recent(&self, limit: usize) -> Result<Vec<KnownPost>>;

    /// Forget identities first seen before `cutoff`. Returns rows removed.
    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
