//! Keyed lookup of previously approved designs.
//!
//! Consumed only by the design loop's reuse branch: when the generator emits
//! a reuse directive instead of a fresh design, the controller loads the
//! referenced design from here. Persistence format is the caller's business;
//! the loops only need `get`/`list`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::design::Design;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSummary {
    pub id: String,
    pub title: String,
}

pub trait DesignStore {
    fn get(&self, id: &str) -> Option<Design>;
    fn list(&self) -> Vec<DesignSummary>;
}

/// In-memory store; enough for tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    designs: BTreeMap<String, Design>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, design: Design) {
        self.designs.insert(id.into(), design);
    }
}

impl DesignStore for MemoryStore {
    fn get(&self, id: &str) -> Option<Design> {
        self.designs.get(id).cloned()
    }

    fn list(&self) -> Vec<DesignSummary> {
        self.designs
            .iter()
            .map(|(id, design)| DesignSummary {
                id: id.clone(),
                title: design.title.clone(),
            })
            .collect()
    }
}

/// A store with nothing in it, for callers that opt out of reuse.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyStore;

impl DesignStore for EmptyStore {
    fn get(&self, _id: &str) -> Option<Design> {
        None
    }

    fn list(&self) -> Vec<DesignSummary> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::fallback;

    #[test]
    fn memory_store_lists_and_fetches() {
        let mut store = MemoryStore::new();
        store.insert("bell-1", fallback::bell_pair());
        store.insert("hom-1", fallback::hong_ou_mandel());

        let ids: Vec<_> = store.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["bell-1", "hom-1"]);
        assert!(store.get("bell-1").is_some());
        assert!(store.get("missing").is_none());
    }
}
