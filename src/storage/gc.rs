use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_skiplist::SkipMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::types::Gid;

use super::edge::EdgeChain;
use super::index::Indices;
use super::mvcc::Prune;
use super::transaction::TransactionEngine;
use super::vertex::VertexChain;

/// Counters from one garbage-collection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    pub vertex_versions_pruned: u64,
    pub vertex_chains_removed: u64,
    pub edge_versions_pruned: u64,
    pub edge_chains_removed: u64,
    pub label_entries_removed: u64,
    pub label_property_entries_removed: u64,
}

/// One full pass: truncate version chains below the horizon, drop fully
/// deleted chains from the primary tables, and reclaim unreachable index
/// entries. Runs under skiplist access guards only, never chain write
/// locks, so it cannot block or be blocked by transactions.
pub(crate) fn collect(
    engine: &TransactionEngine,
    vertices: &SkipMap<Gid, Arc<VertexChain>>,
    edges: &SkipMap<Gid, Arc<EdgeChain>>,
    indices: &Indices,
) -> GcStats {
    let horizon = engine.gc_horizon();
    let mut stats = GcStats::default();
    for entry in vertices.iter() {
        match entry.value().chain.prune(engine, horizon) {
            Prune::Kept { versions_pruned } => {
                stats.vertex_versions_pruned += versions_pruned as u64;
            }
            Prune::RemoveChain => {
                entry.remove();
                stats.vertex_chains_removed += 1;
            }
        }
    }
    for entry in edges.iter() {
        match entry.value().chain.prune(engine, horizon) {
            Prune::Kept { versions_pruned } => {
                stats.edge_versions_pruned += versions_pruned as u64;
            }
            Prune::RemoveChain => {
                entry.remove();
                stats.edge_chains_removed += 1;
            }
        }
    }
    let (label_removed, label_property_removed) = indices.collect_garbage(engine, horizon);
    stats.label_entries_removed = label_removed;
    stats.label_property_entries_removed = label_property_removed;
    debug!(
        horizon,
        vertex_versions = stats.vertex_versions_pruned,
        vertex_chains = stats.vertex_chains_removed,
        edge_versions = stats.edge_versions_pruned,
        edge_chains = stats.edge_chains_removed,
        label_entries = stats.label_entries_removed,
        label_property_entries = stats.label_property_entries_removed,
        "gc pass finished"
    );
    stats
}

struct GcSignal {
    stop: Mutex<bool>,
    wake: Condvar,
}

/// Background collector thread, shut down and joined when the storage
/// drops.
pub(crate) struct GcRunner {
    signal: Arc<GcSignal>,
    handle: Option<JoinHandle<()>>,
}

impl GcRunner {
    pub(crate) fn spawn(
        interval: Duration,
        engine: Arc<TransactionEngine>,
        vertices: Arc<SkipMap<Gid, Arc<VertexChain>>>,
        edges: Arc<SkipMap<Gid, Arc<EdgeChain>>>,
        indices: Arc<Indices>,
    ) -> Option<GcRunner> {
        let signal = Arc::new(GcSignal {
            stop: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_signal = Arc::clone(&signal);
        let spawned = std::thread::Builder::new()
            .name("umbra-gc".to_owned())
            .spawn(move || loop {
                let mut stop = thread_signal.stop.lock();
                if *stop {
                    break;
                }
                thread_signal.wake.wait_for(&mut stop, interval);
                if *stop {
                    break;
                }
                drop(stop);
                collect(&engine, &vertices, &edges, &indices);
            });
        match spawned {
            Ok(handle) => Some(GcRunner {
                signal,
                handle: Some(handle),
            }),
            Err(error) => {
                warn!(%error, "failed to spawn gc thread; collection stays manual");
                None
            }
        }
    }
}

impl Drop for GcRunner {
    fn drop(&mut self) {
        *self.signal.stop.lock() = true;
        self.signal.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
