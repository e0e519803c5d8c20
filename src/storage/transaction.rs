use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::edge::EdgeChain;
use super::vertex::VertexChain;

/// Sentinel for an unset transaction stamp on a version.
pub(crate) const NO_TX: u64 = 0;

/// Outcome of a transaction as recorded in the commit log.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum TxStatus {
    Active,
    Committed,
    Aborted,
}

const CELLS_PER_WORD: u64 = 32;

/// Append-mostly log of transaction outcomes, two bits per id. Readers use
/// atomic loads against a shared word vector; only growth takes the write
/// lock.
pub(crate) struct CommitLog {
    words: RwLock<Vec<AtomicU64>>,
}

impl CommitLog {
    fn new() -> Self {
        CommitLog {
            words: RwLock::new(Vec::new()),
        }
    }

    fn ensure(&self, id: u64) {
        let needed = (id / CELLS_PER_WORD + 1) as usize;
        if self.words.read().len() >= needed {
            return;
        }
        let mut words = self.words.write();
        while words.len() < needed {
            words.push(AtomicU64::new(0));
        }
    }

    fn set(&self, id: u64, status: TxStatus) {
        self.ensure(id);
        let bits = match status {
            TxStatus::Active => 0u64,
            TxStatus::Committed => 1,
            TxStatus::Aborted => 2,
        };
        let shift = (id % CELLS_PER_WORD) * 2;
        let words = self.words.read();
        let word = &words[(id / CELLS_PER_WORD) as usize];
        let mut current = word.load(Ordering::Acquire);
        loop {
            let next = (current & !(0b11 << shift)) | (bits << shift);
            match word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub(crate) fn status(&self, id: u64) -> TxStatus {
        let words = self.words.read();
        let Some(word) = words.get((id / CELLS_PER_WORD) as usize) else {
            return TxStatus::Active;
        };
        let shift = (id % CELLS_PER_WORD) * 2;
        match (word.load(Ordering::Acquire) >> shift) & 0b11 {
            1 => TxStatus::Committed,
            2 => TxStatus::Aborted,
            _ => TxStatus::Active,
        }
    }
}

/// A chain whose write lock is held by a transaction, kept so commit and
/// abort can walk exactly the records the transaction touched.
pub(crate) enum LockedChain {
    Vertex(Arc<VertexChain>),
    Edge(Arc<EdgeChain>),
}

/// Per-transaction state. Mutation paths share it through the accessor, so
/// the command counter and the locked-chain registry use interior
/// mutability.
pub(crate) struct Transaction {
    pub(crate) id: u64,
    /// Ids active when this transaction began, sorted ascending.
    snapshot: Vec<u64>,
    command: AtomicU64,
    pub(crate) locked: Mutex<Vec<LockedChain>>,
}

impl Transaction {
    pub(crate) fn command(&self) -> u64 {
        self.command.load(Ordering::Relaxed)
    }

    pub(crate) fn advance_command(&self) {
        self.command.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn in_snapshot(&self, id: u64) -> bool {
        self.snapshot.binary_search(&id).is_ok()
    }

    /// A pseudo-transaction that observes every committed write and none in
    /// flight. Index back-fill reads through it, outside any client
    /// transaction.
    pub(crate) fn committed_reader(id: u64) -> Transaction {
        Transaction {
            id,
            snapshot: Vec::new(),
            command: AtomicU64::new(0),
            locked: Mutex::new(Vec::new()),
        }
    }
}

struct Counters {
    next_id: u64,
    active: BTreeSet<u64>,
}

/// Allocates transaction ids and commit timestamps from a single strictly
/// increasing counter, tracks the active set, and records outcomes in the
/// commit log.
pub(crate) struct TransactionEngine {
    counters: Mutex<Counters>,
    clog: CommitLog,
    commit_timestamps: RwLock<HashMap<u64, u64>>,
}

impl TransactionEngine {
    pub(crate) fn new() -> Self {
        TransactionEngine {
            counters: Mutex::new(Counters {
                // Id 0 is the unset-stamp sentinel.
                next_id: 1,
                active: BTreeSet::new(),
            }),
            clog: CommitLog::new(),
            commit_timestamps: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn begin(&self) -> Transaction {
        let mut counters = self.counters.lock();
        let id = counters.next_id;
        counters.next_id += 1;
        let snapshot: Vec<u64> = counters.active.iter().copied().collect();
        counters.active.insert(id);
        drop(counters);
        self.clog.ensure(id);
        debug!(tx_id = id, "transaction started");
        Transaction {
            id,
            snapshot,
            command: AtomicU64::new(0),
            locked: Mutex::new(Vec::new()),
        }
    }

    /// Marks the transaction committed and allocates its commit timestamp.
    /// The commit log transitions before the id leaves the active set so a
    /// concurrent `begin` can never observe the transaction as neither
    /// active nor committed.
    pub(crate) fn commit(&self, tx: &Transaction) -> u64 {
        let mut counters = self.counters.lock();
        let commit_ts = counters.next_id;
        counters.next_id += 1;
        self.commit_timestamps.write().insert(tx.id, commit_ts);
        self.clog.set(tx.id, TxStatus::Committed);
        counters.active.remove(&tx.id);
        drop(counters);
        debug!(tx_id = tx.id, commit_ts, "transaction committed");
        commit_ts
    }

    pub(crate) fn abort(&self, tx: &Transaction) {
        let mut counters = self.counters.lock();
        self.clog.set(tx.id, TxStatus::Aborted);
        counters.active.remove(&tx.id);
        drop(counters);
        debug!(tx_id = tx.id, "transaction aborted");
    }

    pub(crate) fn status(&self, id: u64) -> TxStatus {
        self.clog.status(id)
    }

    pub(crate) fn commit_timestamp(&self, id: u64) -> Option<u64> {
        self.commit_timestamps.read().get(&id).copied()
    }

    pub(crate) fn oldest_active(&self) -> Option<u64> {
        self.counters.lock().active.iter().next().copied()
    }

    /// Reclamation horizon: everything committed strictly below it is
    /// visible to every present and future transaction.
    pub(crate) fn gc_horizon(&self) -> u64 {
        let counters = self.counters.lock();
        counters
            .active
            .iter()
            .next()
            .copied()
            .unwrap_or(counters.next_id)
    }

    /// The id the next transaction would receive.
    pub(crate) fn peek_next_id(&self) -> u64 {
        self.counters.lock().next_id
    }
}
