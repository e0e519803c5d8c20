use std::collections::BTreeMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::types::{EdgeTypeId, Gid, LabelId, PropertyId, View};
use crate::value::PropertyValue;

use super::edge::EdgeAccessor;
use super::mvcc::VersionChain;
use super::transaction::{LockedChain, Transaction, TransactionEngine};
use super::Storage;

/// Adjacency triple stored in a vertex payload: edge type, the vertex on
/// the other side, and the edge itself.
pub(crate) type AdjacencyEntry = (EdgeTypeId, Gid, Gid);

/// Mutable vertex payload, cloned on write into new versions.
#[derive(Clone, Default)]
pub(crate) struct VertexData {
    pub(crate) labels: SmallVec<[LabelId; 4]>,
    pub(crate) properties: BTreeMap<PropertyId, PropertyValue>,
    pub(crate) out_edges: Vec<AdjacencyEntry>,
    pub(crate) in_edges: Vec<AdjacencyEntry>,
}

pub(crate) struct VertexChain {
    pub(crate) gid: Gid,
    pub(crate) chain: VersionChain<VertexData>,
}

/// Acquires the chain's write lock for `tx`, registers it for release at
/// transaction end, and verifies the head carries no stamps from commits
/// outside the transaction's snapshot.
pub(crate) fn acquire(
    chain: &Arc<VertexChain>,
    engine: &TransactionEngine,
    tx: &Transaction,
) -> Result<()> {
    if chain.chain.try_lock(tx)? {
        tx.locked.lock().push(LockedChain::Vertex(Arc::clone(chain)));
    }
    chain.chain.check_head_stamps(engine, tx)
}

/// Handle to a single vertex, bound to a transaction. Reads resolve the
/// version visible at the requested view; mutations go through the MVCC
/// write path and feed the indexes.
pub struct VertexAccessor<'a> {
    pub(crate) storage: &'a Storage,
    pub(crate) tx: &'a Transaction,
    pub(crate) chain: Arc<VertexChain>,
}

impl<'a> VertexAccessor<'a> {
    pub fn gid(&self) -> Gid {
        self.chain.gid
    }

    pub fn labels(&self, view: View) -> Result<Vec<LabelId>> {
        self.with_visible(view, |data| data.labels.to_vec())
    }

    pub fn has_label(&self, label: LabelId, view: View) -> Result<bool> {
        self.with_visible(view, |data| data.labels.contains(&label))
    }

    pub fn properties(&self, view: View) -> Result<BTreeMap<PropertyId, PropertyValue>> {
        self.with_visible(view, |data| data.properties.clone())
    }

    /// Returns `Null` for a property the vertex does not have.
    pub fn get_property(&self, property: PropertyId, view: View) -> Result<PropertyValue> {
        self.with_visible(view, |data| {
            data.properties.get(&property).cloned().unwrap_or_default()
        })
    }

    /// Adds a label; no-op returning `false` when the label is already
    /// present in the transaction's NEW view.
    pub fn add_label(&self, label: LabelId) -> Result<bool> {
        self.prepare_write()?;
        let engine = &*self.storage.engine;
        let present = self
            .chain
            .chain
            .with_visible(engine, self.tx, View::New, |data| {
                data.labels.contains(&label)
            })
            .ok_or(Error::DeletedObject)?;
        if present {
            return Ok(false);
        }
        let properties = self.chain.chain.update(self.tx, |data| {
            data.labels.push(label);
            data.properties.clone()
        })?;
        self.storage
            .indices
            .update_on_add_label(label, &self.chain, &properties, self.tx.id);
        Ok(true)
    }

    /// Removes a label; no-op returning `false` when the label is absent.
    /// The index keeps its entries; scans filter them out.
    pub fn remove_label(&self, label: LabelId) -> Result<bool> {
        self.prepare_write()?;
        let engine = &*self.storage.engine;
        let present = self
            .chain
            .chain
            .with_visible(engine, self.tx, View::New, |data| {
                data.labels.contains(&label)
            })
            .ok_or(Error::DeletedObject)?;
        if !present {
            return Ok(false);
        }
        self.chain.chain.update(self.tx, |data| {
            data.labels.retain(|existing| *existing != label);
        })?;
        Ok(true)
    }

    /// Sets a property; `Null` clears it. No-op returning `false` when the
    /// stored value already equals the new one. NaN doubles, nested ones
    /// included, fail with `InvalidValue`.
    pub fn set_property(&self, property: PropertyId, value: PropertyValue) -> Result<bool> {
        if value.contains_nan() {
            return Err(Error::InvalidValue);
        }
        self.prepare_write()?;
        let engine = &*self.storage.engine;
        let current = self
            .chain
            .chain
            .with_visible(engine, self.tx, View::New, |data| {
                data.properties.get(&property).cloned().unwrap_or_default()
            })
            .ok_or(Error::DeletedObject)?;
        if current == value {
            return Ok(false);
        }
        let labels = self.chain.chain.update(self.tx, |data| {
            if value.is_null() {
                data.properties.remove(&property);
            } else {
                data.properties.insert(property, value.clone());
            }
            data.labels.clone()
        })?;
        if !value.is_null() {
            self.storage
                .indices
                .update_on_set_property(property, &value, &self.chain, &labels, self.tx.id);
        }
        Ok(true)
    }

    pub fn clear_property(&self, property: PropertyId) -> Result<bool> {
        self.set_property(property, PropertyValue::Null)
    }

    /// Outgoing edges of the version visible at `view`, in insertion order,
    /// optionally filtered by edge type and destination.
    pub fn out_edges(
        &self,
        view: View,
        edge_types: Option<&[EdgeTypeId]>,
        destination: Option<Gid>,
    ) -> Result<Vec<EdgeAccessor<'a>>> {
        let triples = self.with_visible(view, |data| data.out_edges.clone())?;
        Ok(self.adjacent(triples, edge_types, destination))
    }

    /// Incoming edges of the version visible at `view`, optionally filtered
    /// by edge type and source.
    pub fn in_edges(
        &self,
        view: View,
        edge_types: Option<&[EdgeTypeId]>,
        source: Option<Gid>,
    ) -> Result<Vec<EdgeAccessor<'a>>> {
        let triples = self.with_visible(view, |data| data.in_edges.clone())?;
        Ok(self.adjacent(triples, edge_types, source))
    }

    fn adjacent(
        &self,
        triples: Vec<AdjacencyEntry>,
        edge_types: Option<&[EdgeTypeId]>,
        peer: Option<Gid>,
    ) -> Vec<EdgeAccessor<'a>> {
        let mut result = Vec::new();
        for (edge_type, other, edge) in triples {
            if let Some(types) = edge_types {
                if !types.contains(&edge_type) {
                    continue;
                }
            }
            if let Some(expected) = peer {
                if other != expected {
                    continue;
                }
            }
            if let Some(entry) = self.storage.edges.get(&edge) {
                result.push(EdgeAccessor {
                    storage: self.storage,
                    tx: self.tx,
                    chain: Arc::clone(entry.value()),
                });
            }
        }
        result
    }

    pub(crate) fn prepare_write(&self) -> Result<()> {
        acquire(&self.chain, &self.storage.engine, self.tx)
    }

    fn with_visible<R>(&self, view: View, f: impl FnOnce(&VertexData) -> R) -> Result<R> {
        self.chain
            .chain
            .with_visible(&self.storage.engine, self.tx, view, f)
            .ok_or(Error::DeletedObject)
    }
}
