use std::ops::Bound as RangeBound;
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;

use crate::types::{Gid, LabelId, View};

use super::super::transaction::{Transaction, TransactionEngine, TxStatus};
use super::super::vertex::{VertexAccessor, VertexChain};
use super::super::Storage;

/// Entries for one label, ordered by `(vertex, timestamp)`. Repeated label
/// changes produce duplicate entries for the same vertex; scans rely on the
/// ordering to group and skip them.
pub(crate) type LabelTree = SkipMap<(Gid, u64), Arc<VertexChain>>;

/// Index from label to the vertices that carried it at some point. Entries
/// are appended on label addition and never removed on the write path;
/// stale ones are filtered at scan time and reclaimed by garbage
/// collection.
pub(crate) struct LabelIndex {
    trees: SkipMap<LabelId, Arc<LabelTree>>,
}

impl LabelIndex {
    pub(crate) fn new() -> Self {
        LabelIndex {
            trees: SkipMap::new(),
        }
    }

    pub(crate) fn insert(&self, label: LabelId, chain: &Arc<VertexChain>, tid: u64) {
        let tree = match self.trees.get(&label) {
            Some(entry) => Arc::clone(entry.value()),
            None => Arc::clone(
                self.trees
                    .get_or_insert(label, Arc::new(SkipMap::new()))
                    .value(),
            ),
        };
        tree.insert((chain.gid, tid), Arc::clone(chain));
    }

    pub(crate) fn exists(&self, label: LabelId) -> bool {
        self.trees.contains_key(&label)
    }

    pub(crate) fn labels(&self) -> Vec<LabelId> {
        self.trees.iter().map(|entry| *entry.key()).collect()
    }

    pub(crate) fn vertices<'a>(
        &self,
        storage: &'a Storage,
        tx: &'a Transaction,
        label: LabelId,
        view: View,
    ) -> LabelVerticesIter<'a> {
        LabelVerticesIter {
            storage,
            tx,
            view,
            label,
            tree: self.trees.get(&label).map(|entry| Arc::clone(entry.value())),
            cursor: None,
            last_emitted: None,
        }
    }

    /// Removes entries whose transaction aborted, or committed below the
    /// horizon while no still-reachable version of the vertex carries the
    /// label any more.
    pub(crate) fn collect_garbage(&self, engine: &TransactionEngine, horizon: u64) -> u64 {
        let mut removed = 0;
        for tree_entry in self.trees.iter() {
            let label = *tree_entry.key();
            let tree = tree_entry.value();
            let mut cursor: Option<(Gid, u64)> = None;
            loop {
                let entry = match &cursor {
                    None => tree.front(),
                    Some(key) => tree.lower_bound(RangeBound::Excluded(key)),
                };
                let Some(entry) = entry else {
                    break;
                };
                let key = *entry.key();
                let chain = Arc::clone(entry.value());
                drop(entry);
                cursor = Some(key);
                if !entry_reclaimable(engine, horizon, key.1) {
                    continue;
                }
                let still_matches = chain
                    .chain
                    .any_reachable(engine, horizon, |data| data.labels.contains(&label));
                if !still_matches {
                    tree.remove(&key);
                    removed += 1;
                }
            }
        }
        removed
    }
}

pub(crate) fn entry_reclaimable(engine: &TransactionEngine, horizon: u64, tid: u64) -> bool {
    match engine.status(tid) {
        TxStatus::Aborted => true,
        TxStatus::Committed => engine
            .commit_timestamp(tid)
            .map_or(false, |ts| ts < horizon),
        TxStatus::Active => false,
    }
}

/// Lazy scan over one label's entries: resolves each vertex at the
/// requested view, keeps only versions that still carry the label, and
/// skips the duplicate entries the ordering groups together.
pub struct LabelVerticesIter<'a> {
    storage: &'a Storage,
    tx: &'a Transaction,
    view: View,
    label: LabelId,
    tree: Option<Arc<LabelTree>>,
    cursor: Option<(Gid, u64)>,
    last_emitted: Option<Gid>,
}

impl<'a> Iterator for LabelVerticesIter<'a> {
    type Item = VertexAccessor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree.as_ref()?;
        let engine = &*self.storage.engine;
        loop {
            let entry = match &self.cursor {
                None => tree.front(),
                Some(key) => tree.lower_bound(RangeBound::Excluded(key)),
            }?;
            let key = *entry.key();
            let chain = Arc::clone(entry.value());
            drop(entry);
            self.cursor = Some(key);
            if self.last_emitted == Some(key.0) {
                continue;
            }
            let matches = chain
                .chain
                .with_visible(engine, self.tx, self.view, |data| {
                    data.labels.contains(&self.label)
                });
            if matches == Some(true) {
                self.last_emitted = Some(key.0);
                return Some(VertexAccessor {
                    storage: self.storage,
                    tx: self.tx,
                    chain,
                });
            }
        }
    }
}
