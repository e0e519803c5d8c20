use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_skiplist::SkipMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::name_store::NameStore;
use crate::types::{Bound, EdgeTypeId, Gid, LabelId, PropertyId, View};
use crate::value::PropertyValue;

mod edge;
mod gc;
pub mod index;
mod mvcc;
mod transaction;
mod vertex;

pub use self::edge::EdgeAccessor;
pub use self::gc::GcStats;
pub use self::index::{IndicesInfo, LabelPropertyVerticesIter, LabelVerticesIter};
pub use self::vertex::VertexAccessor;

use self::edge::EdgeChain;
use self::gc::GcRunner;
use self::index::Indices;
use self::mvcc::VersionChain;
use self::transaction::{LockedChain, Transaction, TransactionEngine};
use self::vertex::{VertexChain, VertexData};

/// Engine configuration. With `gc_interval` unset, garbage is collected
/// only through [`Storage::collect_garbage`].
#[derive(Clone, Debug, Default)]
pub struct StorageConfig {
    pub gc_interval: Option<Duration>,
}

/// The single-node transactional graph store: MVCC vertex and edge tables,
/// label and label+property indexes, and the transaction engine binding
/// them.
///
/// All data access goes through a per-transaction [`Accessor`] obtained
/// from [`Storage::access`].
pub struct Storage {
    name_store: NameStore,
    pub(crate) engine: Arc<TransactionEngine>,
    pub(crate) vertices: Arc<SkipMap<Gid, Arc<VertexChain>>>,
    pub(crate) edges: Arc<SkipMap<Gid, Arc<EdgeChain>>>,
    pub(crate) indices: Arc<Indices>,
    next_vertex_gid: AtomicU64,
    next_edge_gid: AtomicU64,
    // Dropped last in declaration order; joins the collector thread.
    _gc_runner: Option<GcRunner>,
}

impl Default for Storage {
    fn default() -> Self {
        Storage::new(StorageConfig::default())
    }
}

impl Storage {
    pub fn new(config: StorageConfig) -> Storage {
        let engine = Arc::new(TransactionEngine::new());
        let vertices = Arc::new(SkipMap::new());
        let edges = Arc::new(SkipMap::new());
        let indices = Arc::new(Indices::new());
        let gc_runner = config.gc_interval.and_then(|interval| {
            GcRunner::spawn(
                interval,
                Arc::clone(&engine),
                Arc::clone(&vertices),
                Arc::clone(&edges),
                Arc::clone(&indices),
            )
        });
        Storage {
            name_store: NameStore::default(),
            engine,
            vertices,
            edges,
            indices,
            next_vertex_gid: AtomicU64::new(0),
            next_edge_gid: AtomicU64::new(0),
            _gc_runner: gc_runner,
        }
    }

    /// Starts a transaction and returns the accessor bound to it. Dropping
    /// the accessor without committing aborts the transaction.
    pub fn access(&self) -> Accessor<'_> {
        Accessor {
            storage: self,
            transaction: self.engine.begin(),
            finished: false,
        }
    }

    /// Registers a `(label, property)` index and back-fills it from the
    /// latest committed state. Returns `false` when the index already
    /// exists.
    pub fn create_index(&self, label: LabelId, property: PropertyId) -> bool {
        let Ok(tree) = self.indices.label_property.create(label, property) else {
            return false;
        };
        let reader = Transaction::committed_reader(u64::MAX);
        for entry in self.vertices.iter() {
            let chain = entry.value();
            let found = chain
                .chain
                .with_visible_version(&self.engine, &reader, View::New, |version| {
                    if !version.data.labels.contains(&label) {
                        return None;
                    }
                    version
                        .data
                        .properties
                        .get(&property)
                        .map(|value| (value.clone(), version.tx_created))
                });
            if let Some(Some((value, tid))) = found {
                tree.insert(
                    index::label_property::PropKey {
                        value,
                        gid: chain.gid,
                        tid,
                    },
                    Arc::clone(chain),
                );
            }
        }
        debug!(label = label.0, property = property.0, "index created");
        true
    }

    /// Drops a `(label, property)` index together with all its entries.
    /// Returns `false` when no such index exists.
    pub fn drop_index(&self, label: LabelId, property: PropertyId) -> bool {
        let dropped = self.indices.label_property.drop_index(label, property).is_ok();
        if dropped {
            debug!(label = label.0, property = property.0, "index dropped");
        }
        dropped
    }

    pub fn label_index_exists(&self, label: LabelId) -> bool {
        self.indices.label.exists(label)
    }

    pub fn label_property_index_exists(&self, label: LabelId, property: PropertyId) -> bool {
        self.indices.label_property.exists(label, property)
    }

    pub fn list_all_indices(&self) -> IndicesInfo {
        self.indices.info()
    }

    /// Reclaims versions and index entries no longer visible to any live
    /// transaction. Safe to call at any time from any thread.
    pub fn collect_garbage(&self) -> GcStats {
        gc::collect(&self.engine, &self.vertices, &self.edges, &self.indices)
    }
}

/// Per-transaction facade over the storage. Reads and writes name the
/// [`View`] they want; `advance_command` publishes the transaction's own
/// writes to subsequent `Old` reads.
pub struct Accessor<'a> {
    storage: &'a Storage,
    transaction: Transaction,
    finished: bool,
}

impl<'a> Accessor<'a> {
    fn check_active(&self) -> Result<()> {
        if self.finished {
            return Err(Error::TransactionEnded);
        }
        Ok(())
    }

    pub fn create_vertex(&self) -> Result<VertexAccessor<'_>> {
        self.check_active()?;
        let gid = Gid(self.storage.next_vertex_gid.fetch_add(1, Ordering::Relaxed));
        let chain = Arc::new(VertexChain {
            gid,
            chain: VersionChain::new(&self.transaction, VertexData::default()),
        });
        // The creator owns the chain until commit; a fresh chain cannot
        // conflict.
        if chain.chain.try_lock(&self.transaction)? {
            self.transaction
                .locked
                .lock()
                .push(LockedChain::Vertex(Arc::clone(&chain)));
        }
        self.storage.vertices.insert(gid, Arc::clone(&chain));
        Ok(VertexAccessor {
            storage: self.storage,
            tx: &self.transaction,
            chain,
        })
    }

    pub fn find_vertex(&self, gid: Gid, view: View) -> Result<Option<VertexAccessor<'_>>> {
        self.check_active()?;
        let Some(entry) = self.storage.vertices.get(&gid) else {
            return Ok(None);
        };
        let chain = Arc::clone(entry.value());
        let visible = chain
            .chain
            .with_visible(&self.storage.engine, &self.transaction, view, |_| ())
            .is_some();
        Ok(visible.then(|| VertexAccessor {
            storage: self.storage,
            tx: &self.transaction,
            chain,
        }))
    }

    /// All vertices visible at `view`, in gid order.
    pub fn vertices(&self, view: View) -> Result<VerticesIter<'_>> {
        self.check_active()?;
        Ok(VerticesIter {
            storage: self.storage,
            tx: &self.transaction,
            view,
            iter: self.storage.vertices.iter(),
        })
    }

    /// Vertices holding `label` at `view`, through the label index.
    pub fn vertices_by_label(&self, label: LabelId, view: View) -> Result<LabelVerticesIter<'_>> {
        self.check_active()?;
        Ok(self
            .storage
            .indices
            .label
            .vertices(self.storage, &self.transaction, label, view))
    }

    /// Vertices holding `label` and any non-null value of `property`, in
    /// value order. Fails when no such index is registered.
    pub fn vertices_by_label_property(
        &self,
        label: LabelId,
        property: PropertyId,
        view: View,
    ) -> Result<LabelPropertyVerticesIter<'_>> {
        self.check_active()?;
        self.storage.indices.label_property.vertices(
            self.storage,
            &self.transaction,
            label,
            property,
            None,
            None,
            view,
        )
    }

    /// Equality lookup on a `(label, property)` index. Integers and doubles
    /// match each other numerically.
    pub fn vertices_by_label_property_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
        view: View,
    ) -> Result<LabelPropertyVerticesIter<'_>> {
        self.check_active()?;
        self.storage.indices.label_property.vertices(
            self.storage,
            &self.transaction,
            label,
            property,
            Some(Bound::Included(value.clone())),
            Some(Bound::Included(value.clone())),
            view,
        )
    }

    /// Range lookup on a `(label, property)` index; absent bounds are open.
    pub fn vertices_by_label_property_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<Bound<PropertyValue>>,
        upper: Option<Bound<PropertyValue>>,
        view: View,
    ) -> Result<LabelPropertyVerticesIter<'_>> {
        self.check_active()?;
        self.storage.indices.label_property.vertices(
            self.storage,
            &self.transaction,
            label,
            property,
            lower,
            upper,
            view,
        )
    }

    /// All edges visible at `view`, in gid order.
    pub fn edges(&self, view: View) -> Result<EdgesIter<'_>> {
        self.check_active()?;
        Ok(EdgesIter {
            storage: self.storage,
            tx: &self.transaction,
            view,
            iter: self.storage.edges.iter(),
        })
    }

    /// Creates an edge between two vertices visible to this transaction.
    /// Both endpoint chains are locked and receive new versions carrying
    /// the adjacency entry.
    pub fn create_edge(
        &self,
        from: &VertexAccessor<'_>,
        to: &VertexAccessor<'_>,
        edge_type: EdgeTypeId,
    ) -> Result<EdgeAccessor<'_>> {
        self.check_active()?;
        let engine = &self.storage.engine;
        vertex::acquire(&from.chain, engine, &self.transaction)?;
        let loop_edge = from.chain.gid == to.chain.gid;
        if !loop_edge {
            vertex::acquire(&to.chain, engine, &self.transaction)?;
        }
        for endpoint in [&from.chain, &to.chain] {
            endpoint
                .chain
                .with_visible(engine, &self.transaction, View::New, |_| ())
                .ok_or(Error::DeletedObject)?;
        }
        let gid = Gid(self.storage.next_edge_gid.fetch_add(1, Ordering::Relaxed));
        let chain = Arc::new(EdgeChain {
            gid,
            edge_type,
            from: from.chain.gid,
            to: to.chain.gid,
            chain: VersionChain::new(&self.transaction, edge::EdgeData::default()),
        });
        if chain.chain.try_lock(&self.transaction)? {
            self.transaction
                .locked
                .lock()
                .push(LockedChain::Edge(Arc::clone(&chain)));
        }
        self.storage.edges.insert(gid, Arc::clone(&chain));
        let (from_gid, to_gid) = (from.chain.gid, to.chain.gid);
        if loop_edge {
            from.chain.chain.update(&self.transaction, |data| {
                data.out_edges.push((edge_type, to_gid, gid));
                data.in_edges.push((edge_type, from_gid, gid));
            })?;
        } else {
            from.chain.chain.update(&self.transaction, |data| {
                data.out_edges.push((edge_type, to_gid, gid));
            })?;
            to.chain.chain.update(&self.transaction, |data| {
                data.in_edges.push((edge_type, from_gid, gid));
            })?;
        }
        Ok(EdgeAccessor {
            storage: self.storage,
            tx: &self.transaction,
            chain,
        })
    }

    /// Deletes a vertex with no adjacent edges at the NEW view. Returns
    /// `false` when the vertex is already gone.
    pub fn delete_vertex(&self, vertex: &VertexAccessor<'_>) -> Result<bool> {
        self.check_active()?;
        vertex.prepare_write()?;
        let adjacency = vertex.chain.chain.with_visible(
            &self.storage.engine,
            &self.transaction,
            View::New,
            |data| data.out_edges.is_empty() && data.in_edges.is_empty(),
        );
        match adjacency {
            None => Ok(false),
            Some(false) => Err(Error::VertexHasEdges),
            Some(true) => {
                vertex.chain.chain.expire(&self.transaction)?;
                Ok(true)
            }
        }
    }

    /// Deletes an edge, detaching it from both endpoints. Returns `false`
    /// when the edge is already gone.
    pub fn delete_edge(&self, edge: &EdgeAccessor<'_>) -> Result<bool> {
        self.check_active()?;
        edge.prepare_write()?;
        let engine = &self.storage.engine;
        if edge
            .chain
            .chain
            .with_visible(engine, &self.transaction, View::New, |_| ())
            .is_none()
        {
            return Ok(false);
        }
        let from_chain = self
            .storage
            .vertices
            .get(&edge.chain.from)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::DeletedObject)?;
        let to_chain = self
            .storage
            .vertices
            .get(&edge.chain.to)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::DeletedObject)?;
        vertex::acquire(&from_chain, engine, &self.transaction)?;
        let loop_edge = from_chain.gid == to_chain.gid;
        if !loop_edge {
            vertex::acquire(&to_chain, engine, &self.transaction)?;
        }
        edge.chain.chain.expire(&self.transaction)?;
        let gid = edge.chain.gid;
        if loop_edge {
            from_chain.chain.update(&self.transaction, |data| {
                data.out_edges.retain(|(_, _, e)| *e != gid);
                data.in_edges.retain(|(_, _, e)| *e != gid);
            })?;
        } else {
            from_chain.chain.update(&self.transaction, |data| {
                data.out_edges.retain(|(_, _, e)| *e != gid);
            })?;
            to_chain.chain.update(&self.transaction, |data| {
                data.in_edges.retain(|(_, _, e)| *e != gid);
            })?;
        }
        Ok(true)
    }

    /// Makes the transaction's writes so far visible to its own subsequent
    /// `Old` reads.
    pub fn advance_command(&self) {
        self.transaction.advance_command();
    }

    /// Commits the transaction: the commit log transition publishes every
    /// write atomically, then the chain locks are released.
    pub fn commit(&mut self) -> Result<()> {
        self.check_active()?;
        let locked = std::mem::take(&mut *self.transaction.locked.lock());
        self.storage.engine.commit(&self.transaction);
        for chain in &locked {
            match chain {
                LockedChain::Vertex(chain) => chain.chain.release(self.transaction.id),
                LockedChain::Edge(chain) => chain.chain.release(self.transaction.id),
            }
        }
        self.finished = true;
        Ok(())
    }

    /// Aborts the transaction, detaching every version it created.
    pub fn abort(&mut self) -> Result<()> {
        self.check_active()?;
        self.rollback();
        Ok(())
    }

    fn rollback(&mut self) {
        let locked = std::mem::take(&mut *self.transaction.locked.lock());
        for chain in &locked {
            match chain {
                LockedChain::Vertex(chain) => {
                    if chain.chain.rollback(self.transaction.id) {
                        self.storage.vertices.remove(&chain.gid);
                    }
                }
                LockedChain::Edge(chain) => {
                    if chain.chain.rollback(self.transaction.id) {
                        self.storage.edges.remove(&chain.gid);
                    }
                }
            }
        }
        self.storage.engine.abort(&self.transaction);
        for chain in &locked {
            match chain {
                LockedChain::Vertex(chain) => chain.chain.release(self.transaction.id),
                LockedChain::Edge(chain) => chain.chain.release(self.transaction.id),
            }
        }
        self.finished = true;
    }

    pub fn name_to_label(&self, name: &str) -> LabelId {
        self.storage.name_store.name_to_label(name)
    }

    pub fn name_to_property(&self, name: &str) -> PropertyId {
        self.storage.name_store.name_to_property(name)
    }

    pub fn name_to_edge_type(&self, name: &str) -> EdgeTypeId {
        self.storage.name_store.name_to_edge_type(name)
    }

    pub fn label_to_name(&self, label: LabelId) -> Result<String> {
        self.storage.name_store.label_to_name(label)
    }

    pub fn property_to_name(&self, property: PropertyId) -> Result<String> {
        self.storage.name_store.property_to_name(property)
    }

    pub fn edge_type_to_name(&self, edge_type: EdgeTypeId) -> Result<String> {
        self.storage.name_store.edge_type_to_name(edge_type)
    }
}

impl Drop for Accessor<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback();
        }
    }
}

/// Lazy full scan over the vertex table with MVCC filtering.
pub struct VerticesIter<'a> {
    storage: &'a Storage,
    tx: &'a Transaction,
    view: View,
    iter: crossbeam_skiplist::map::Iter<'a, Gid, Arc<VertexChain>>,
}

impl<'a> Iterator for VerticesIter<'a> {
    type Item = VertexAccessor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let engine = &*self.storage.engine;
        loop {
            let entry = self.iter.next()?;
            let chain = Arc::clone(entry.value());
            if chain
                .chain
                .with_visible(engine, self.tx, self.view, |_| ())
                .is_some()
            {
                return Some(VertexAccessor {
                    storage: self.storage,
                    tx: self.tx,
                    chain,
                });
            }
        }
    }
}

/// Lazy full scan over the edge table with MVCC filtering.
pub struct EdgesIter<'a> {
    storage: &'a Storage,
    tx: &'a Transaction,
    view: View,
    iter: crossbeam_skiplist::map::Iter<'a, Gid, Arc<EdgeChain>>,
}

impl<'a> Iterator for EdgesIter<'a> {
    type Item = EdgeAccessor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let engine = &*self.storage.engine;
        loop {
            let entry = self.iter.next()?;
            let chain = Arc::clone(entry.value());
            if chain
                .chain
                .with_visible(engine, self.tx, self.view, |_| ())
                .is_some()
            {
                return Some(EdgeAccessor {
                    storage: self.storage,
                    tx: self.tx,
                    chain,
                });
            }
        }
    }
}
