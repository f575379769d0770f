use std::collections::{BTreeMap, HashSet};

use crate::domain::{Item, Source};

/// New items discovered on one source during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUpdate {
    pub url: String,
    pub items: Vec<Item>,
}

/// Everything new found in a single polling cycle, keyed by source label.
///
/// Lives for one cycle only; its items are folded into the identity store
/// and then handed to the notifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleResult {
    updates: BTreeMap<String, SourceUpdate>,
    seen: HashSet<String>,
}

impl CycleResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one source's new items.
    ///
    /// Identifiers already merged from another source this cycle are dropped,
    /// and a source left with nothing is not recorded. Returns how many items
    /// were kept.
    pub fn merge(&mut self, source: &Source, items: Vec<Item>) -> usize {
        let kept: Vec<Item> = items
            .into_iter()
            .filter(|item| self.seen.insert(item.identifier.clone()))
            .collect();

        if kept.is_empty() {
            return 0;
        }

        let count = kept.len();
        self.updates
            .entry(source.label.clone())
            .or_insert_with(|| SourceUpdate {
                url: source.url.clone(),
                items: Vec::new(),
            })
            .items
            .extend(kept);
        count
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.updates.values().map(|u| u.items.len()).sum()
    }

    pub fn get(&self, label: &str) -> Option<&SourceUpdate> {
        self.updates.get(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SourceUpdate)> {
        self.updates.iter()
    }

    /// All items across sources, ready to be persisted.
    pub fn items(&self) -> Vec<Item> {
        self.updates
            .values()
            .flat_map(|u| u.items.iter().cloned())
            .collect()
    }
}
