use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{EdgeTypeId, Gid, PropertyId, View};
use crate::value::PropertyValue;

use super::mvcc::VersionChain;
use super::transaction::{LockedChain, Transaction, TransactionEngine};
use super::Storage;

/// Versioned edge payload. The topology of an edge (its type and
/// endpoints) never changes after creation and lives on the chain itself;
/// only the property map is versioned.
#[derive(Clone, Default)]
pub(crate) struct EdgeData {
    pub(crate) properties: BTreeMap<PropertyId, PropertyValue>,
}

pub(crate) struct EdgeChain {
    pub(crate) gid: Gid,
    pub(crate) edge_type: EdgeTypeId,
    pub(crate) from: Gid,
    pub(crate) to: Gid,
    pub(crate) chain: VersionChain<EdgeData>,
}

/// See `vertex::acquire`; identical locking discipline for edge chains.
pub(crate) fn acquire(
    chain: &Arc<EdgeChain>,
    engine: &TransactionEngine,
    tx: &Transaction,
) -> Result<()> {
    if chain.chain.try_lock(tx)? {
        tx.locked.lock().push(LockedChain::Edge(Arc::clone(chain)));
    }
    chain.chain.check_head_stamps(engine, tx)
}

/// Handle to a single edge, bound to a transaction.
pub struct EdgeAccessor<'a> {
    pub(crate) storage: &'a Storage,
    pub(crate) tx: &'a Transaction,
    pub(crate) chain: Arc<EdgeChain>,
}

impl<'a> EdgeAccessor<'a> {
    pub fn gid(&self) -> Gid {
        self.chain.gid
    }

    pub fn edge_type(&self) -> EdgeTypeId {
        self.chain.edge_type
    }

    pub fn from_vertex(&self) -> Gid {
        self.chain.from
    }

    pub fn to_vertex(&self) -> Gid {
        self.chain.to
    }

    pub fn properties(&self, view: View) -> Result<BTreeMap<PropertyId, PropertyValue>> {
        self.with_visible(view, |data| data.properties.clone())
    }

    /// Returns `Null` for a property the edge does not have.
    pub fn get_property(&self, property: PropertyId, view: View) -> Result<PropertyValue> {
        self.with_visible(view, |data| {
            data.properties.get(&property).cloned().unwrap_or_default()
        })
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
        self.chain.chain.update(self.tx, |data| {
            if value.is_null() {
                data.properties.remove(&property);
            } else {
                data.properties.insert(property, value);
            }
        })?;
        Ok(true)
    }

    pub fn clear_property(&self, property: PropertyId) -> Result<bool> {
        self.set_property(property, PropertyValue::Null)
    }

    pub(crate) fn prepare_write(&self) -> Result<()> {
        acquire(&self.chain, &self.storage.engine, self.tx)
    }

    fn with_visible<R>(&self, view: View, f: impl FnOnce(&EdgeData) -> R) -> Result<R> {
        self.chain
            .chain
            .with_visible(&self.storage.engine, self.tx, view, f)
            .ok_or(Error::DeletedObject)
    }
}
