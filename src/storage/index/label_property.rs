use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Bound as RangeBound;
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::types::{Bound, Gid, LabelId, PropertyId, View};
use crate::value::PropertyValue;

use super::super::transaction::{Transaction, TransactionEngine};
use super::super::vertex::{VertexAccessor, VertexChain};
use super::super::Storage;
use super::label::entry_reclaimable;

/// Composite key of a label+property index entry. Ordered by value (under
/// the property-value total order), then vertex, then timestamp, so range
/// scans walk values in order and duplicate entries for one vertex stay
/// adjacent.
#[derive(Clone)]
pub(crate) struct PropKey {
    pub(crate) value: PropertyValue,
    pub(crate) gid: Gid,
    pub(crate) tid: u64,
}

impl Ord for PropKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .index_cmp(&other.value)
            .then_with(|| self.gid.cmp(&other.gid))
            .then_with(|| self.tid.cmp(&other.tid))
    }
}

impl PartialOrd for PropKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PropKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PropKey {}

pub(crate) type PropTree = SkipMap<PropKey, Arc<VertexChain>>;

/// DDL-managed indexes over `(label, property)` pairs. Entries are added
/// eagerly when a matching label or property appears and reclaimed lazily;
/// scans re-verify the visible value against the entry key.
pub(crate) struct LabelPropertyIndex {
    trees: RwLock<HashMap<(LabelId, PropertyId), Arc<PropTree>>>,
}

impl LabelPropertyIndex {
    pub(crate) fn new() -> Self {
        LabelPropertyIndex {
            trees: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn create(&self, label: LabelId, property: PropertyId) -> Result<Arc<PropTree>> {
        let mut trees = self.trees.write();
        if trees.contains_key(&(label, property)) {
            return Err(Error::IndexExists);
        }
        let tree = Arc::new(SkipMap::new());
        trees.insert((label, property), Arc::clone(&tree));
        Ok(tree)
    }

    /// Detaches the whole tree; its memory goes away with the last scan
    /// guard instead of waiting for a garbage-collection pass.
    pub(crate) fn drop_index(&self, label: LabelId, property: PropertyId) -> Result<()> {
        self.trees
            .write()
            .remove(&(label, property))
            .map(|_| ())
            .ok_or(Error::IndexDoesNotExist)
    }

    pub(crate) fn exists(&self, label: LabelId, property: PropertyId) -> bool {
        self.trees.read().contains_key(&(label, property))
    }

    pub(crate) fn list(&self) -> Vec<(LabelId, PropertyId)> {
        let mut pairs: Vec<_> = self.trees.read().keys().copied().collect();
        pairs.sort();
        pairs
    }

    pub(crate) fn properties_for_label(&self, label: LabelId) -> Vec<PropertyId> {
        self.trees
            .read()
            .keys()
            .filter(|(l, _)| *l == label)
            .map(|(_, p)| *p)
            .collect()
    }

    pub(crate) fn labels_for_property(&self, property: PropertyId) -> Vec<LabelId> {
        self.trees
            .read()
            .keys()
            .filter(|(_, p)| *p == property)
            .map(|(l, _)| *l)
            .collect()
    }

    pub(crate) fn insert(
        &self,
        label: LabelId,
        property: PropertyId,
        value: PropertyValue,
        chain: &Arc<VertexChain>,
        tid: u64,
    ) {
        let tree = match self.trees.read().get(&(label, property)) {
            Some(tree) => Arc::clone(tree),
            None => return,
        };
        tree.insert(
            PropKey {
                value,
                gid: chain.gid,
                tid,
            },
            Arc::clone(chain),
        );
    }

    pub(crate) fn vertices<'a>(
        &self,
        storage: &'a Storage,
        tx: &'a Transaction,
        label: LabelId,
        property: PropertyId,
        lower: Option<Bound<PropertyValue>>,
        upper: Option<Bound<PropertyValue>>,
        view: View,
    ) -> Result<LabelPropertyVerticesIter<'a>> {
        let tree = self
            .trees
            .read()
            .get(&(label, property))
            .cloned()
            .ok_or(Error::IndexDoesNotExist)?;
        // A bound restricts iteration to its own type class (Int and Double
        // count as one class); conflicting bound types make the range empty.
        let mut clamp_rank = None;
        for bound in lower.iter().chain(upper.iter()) {
            let rank = bound.value().type_rank();
            match clamp_rank {
                None => clamp_rank = Some(rank),
                Some(existing) if existing != rank => {
                    return Ok(LabelPropertyVerticesIter::empty(storage, tx, label, property, view));
                }
                Some(_) => {}
            }
        }
        Ok(LabelPropertyVerticesIter {
            storage,
            tx,
            view,
            label,
            property,
            tree: Some(tree),
            lower,
            upper,
            clamp_rank,
            cursor: None,
            last_emitted: None,
        })
    }

    /// Same reclamation rule as the label index, with the entry additionally
    /// required to match the vertex's still-reachable value.
    pub(crate) fn collect_garbage(&self, engine: &TransactionEngine, horizon: u64) -> u64 {
        let trees: Vec<((LabelId, PropertyId), Arc<PropTree>)> = self
            .trees
            .read()
            .iter()
            .map(|(key, tree)| (*key, Arc::clone(tree)))
            .collect();
        let mut removed = 0;
        for ((label, property), tree) in trees {
            let mut cursor: Option<PropKey> = None;
            loop {
                let entry = match &cursor {
                    None => tree.front(),
                    Some(key) => tree.lower_bound(RangeBound::Excluded(key)),
                };
                let Some(entry) = entry else {
                    break;
                };
                let key = entry.key().clone();
                let chain = Arc::clone(entry.value());
                drop(entry);
                cursor = Some(key.clone());
                if !entry_reclaimable(engine, horizon, key.tid) {
                    continue;
                }
                let still_matches = chain.chain.any_reachable(engine, horizon, |data| {
                    data.labels.contains(&label)
                        && data
                            .properties
                            .get(&property)
                            .map_or(false, |v| v.index_cmp(&key.value) == Ordering::Equal)
                });
                if !still_matches {
                    tree.remove(&key);
                    removed += 1;
                }
            }
        }
        removed
    }
}

enum RangeCheck {
    Skip,
    Emit,
    Stop,
}

/// Lazy ordered scan over one `(label, property)` tree, optionally bounded.
/// Emission order is `(value, vertex)` ascending.
pub struct LabelPropertyVerticesIter<'a> {
    storage: &'a Storage,
    tx: &'a Transaction,
    view: View,
    label: LabelId,
    property: PropertyId,
    tree: Option<Arc<PropTree>>,
    lower: Option<Bound<PropertyValue>>,
    upper: Option<Bound<PropertyValue>>,
    clamp_rank: Option<u8>,
    cursor: Option<PropKey>,
    last_emitted: Option<Gid>,
}

impl<'a> LabelPropertyVerticesIter<'a> {
    fn empty(
        storage: &'a Storage,
        tx: &'a Transaction,
        label: LabelId,
        property: PropertyId,
        view: View,
    ) -> Self {
        LabelPropertyVerticesIter {
            storage,
            tx,
            view,
            label,
            property,
            tree: None,
            lower: None,
            upper: None,
            clamp_rank: None,
            cursor: None,
            last_emitted: None,
        }
    }

    fn check(&self, value: &PropertyValue) -> RangeCheck {
        if let Some(rank) = self.clamp_rank {
            let entry_rank = value.type_rank();
            if entry_rank < rank {
                return RangeCheck::Skip;
            }
            if entry_rank > rank {
                return RangeCheck::Stop;
            }
        }
        if let Some(lower) = &self.lower {
            match value.index_cmp(lower.value()) {
                Ordering::Less => return RangeCheck::Skip,
                Ordering::Equal if !lower.is_included() => return RangeCheck::Skip,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match value.index_cmp(upper.value()) {
                Ordering::Greater => return RangeCheck::Stop,
                Ordering::Equal if !upper.is_included() => return RangeCheck::Stop,
                _ => {}
            }
        }
        RangeCheck::Emit
    }
}

impl<'a> Iterator for LabelPropertyVerticesIter<'a> {
    type Item = VertexAccessor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree.as_ref()?;
        let engine = &*self.storage.engine;
        loop {
            let entry = match (&self.cursor, &self.lower) {
                (Some(key), _) => tree.lower_bound(RangeBound::Excluded(key)),
                (None, Some(lower)) => {
                    // Position at the first entry whose value can be in range;
                    // tid 0 sorts before any real entry for the same vertex.
                    let probe = PropKey {
                        value: lower.value().clone(),
                        gid: Gid(0),
                        tid: 0,
                    };
                    tree.lower_bound(RangeBound::Included(&probe))
                }
                (None, None) => tree.front(),
            }?;
            let key = entry.key().clone();
            let chain = Arc::clone(entry.value());
            drop(entry);
            self.cursor = Some(key.clone());
            match self.check(&key.value) {
                RangeCheck::Skip => continue,
                RangeCheck::Stop => {
                    self.tree = None;
                    return None;
                }
                RangeCheck::Emit => {}
            }
            if self.last_emitted == Some(key.gid) {
                continue;
            }
            // The visible version must still carry the label and hold a
            // value equal to the entry key; stale entries from later updates
            // or clears fail this and are skipped.
            let matches = chain
                .chain
                .with_visible(engine, self.tx, self.view, |data| {
                    data.labels.contains(&self.label)
                        && data
                            .properties
                            .get(&self.property)
                            .map_or(false, |v| v.index_cmp(&key.value) == Ordering::Equal)
                });
            if matches == Some(true) {
                self.last_emitted = Some(key.gid);
                return Some(VertexAccessor {
                    storage: self.storage,
                    tx: self.tx,
                    chain,
                });
            }
        }
    }
}
