use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::types::View;

use super::transaction::{Transaction, TransactionEngine, TxStatus, NO_TX};

/// One version of a record's payload, stamped with the transactions (and
/// commands within them) that created and expired it.
pub(crate) struct Version<T> {
    pub(crate) tx_created: u64,
    pub(crate) cmd_created: u64,
    pub(crate) tx_expired: u64,
    pub(crate) cmd_expired: u64,
    pub(crate) data: T,
}

/// Outcome of a garbage-collection pass over a single chain.
pub(crate) enum Prune {
    Kept { versions_pruned: usize },
    RemoveChain,
}

/// A record's version history, newest last, plus its write lock.
///
/// The lock is an owner-transaction-id cell: compare-and-set to acquire,
/// re-entrant for the holder, held until the owning transaction commits or
/// aborts. Writers that lose the race fail immediately with
/// `SerializationConflict` rather than waiting.
pub(crate) struct VersionChain<T> {
    owner: AtomicU64,
    versions: RwLock<Vec<Version<T>>>,
}

impl<T> VersionChain<T> {
    /// A fresh chain with a single version stamped by `tx`.
    pub(crate) fn new(tx: &Transaction, data: T) -> Self {
        VersionChain {
            owner: AtomicU64::new(NO_TX),
            versions: RwLock::new(vec![Version {
                tx_created: tx.id,
                cmd_created: tx.command(),
                tx_expired: NO_TX,
                cmd_expired: 0,
                data,
            }]),
        }
    }

    /// Acquires the chain's write lock for `tx`. Returns `true` when this
    /// call took the lock (the caller must register the chain for release
    /// at transaction end), `false` when `tx` already held it.
    pub(crate) fn try_lock(&self, tx: &Transaction) -> Result<bool> {
        match self
            .owner
            .compare_exchange(NO_TX, tx.id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(true),
            Err(holder) if holder == tx.id => Ok(false),
            Err(_) => Err(Error::SerializationConflict),
        }
    }

    pub(crate) fn release(&self, tx_id: u64) {
        let _ = self
            .owner
            .compare_exchange(tx_id, NO_TX, Ordering::Release, Ordering::Relaxed);
    }

    /// Rejects the write when the head carries a stamp from a transaction
    /// whose outcome `tx` cannot see: that transaction committed after `tx`
    /// began, so letting the write through would silently overwrite it.
    /// Must be called with the chain lock held by `tx`.
    pub(crate) fn check_head_stamps(
        &self,
        engine: &TransactionEngine,
        tx: &Transaction,
    ) -> Result<()> {
        let versions = self.versions.read();
        let Some(head) = versions.last() else {
            return Ok(());
        };
        for stamp in [head.tx_created, head.tx_expired] {
            if stamp != NO_TX && stamp != tx.id && !commit_visible(engine, tx, stamp) {
                return Err(Error::SerializationConflict);
            }
        }
        Ok(())
    }

    /// Runs `f` on the payload of the version visible to `tx` at `view`,
    /// or returns `None` when the record does not exist at that view.
    pub(crate) fn with_visible<R>(
        &self,
        engine: &TransactionEngine,
        tx: &Transaction,
        view: View,
        f: impl FnOnce(&T) -> R,
    ) -> Option<R> {
        self.with_visible_version(engine, tx, view, |version| f(&version.data))
    }

    /// Like `with_visible` but hands `f` the whole version, stamps
    /// included. Index back-fill uses the creation stamp as the entry
    /// timestamp.
    pub(crate) fn with_visible_version<R>(
        &self,
        engine: &TransactionEngine,
        tx: &Transaction,
        view: View,
        f: impl FnOnce(&Version<T>) -> R,
    ) -> Option<R> {
        let versions = self.versions.read();
        resolve(&versions, engine, tx, view).map(f)
    }

    /// Expires the current head in place. Used for deletion, where the
    /// payload does not change and no clone is needed.
    pub(crate) fn expire(&self, tx: &Transaction) -> Result<()> {
        let mut versions = self.versions.write();
        let Some(head) = versions.last_mut() else {
            return Err(Error::DeletedObject);
        };
        head.tx_expired = tx.id;
        head.cmd_expired = tx.command();
        Ok(())
    }

    /// True when some version of this chain is still observable by a
    /// present or future transaction at `horizon` and its payload satisfies
    /// `pred`. Drives index-entry reclamation.
    pub(crate) fn any_reachable(
        &self,
        engine: &TransactionEngine,
        horizon: u64,
        pred: impl Fn(&T) -> bool,
    ) -> bool {
        let versions = self.versions.read();
        versions
            .iter()
            .any(|version| !expired_below_horizon(engine, horizon, version) && pred(&version.data))
    }

    /// Drops versions that no present or future transaction can observe.
    /// Never touches the write lock; concurrent readers hold the version
    /// guard for the duration of a single resolve.
    pub(crate) fn prune(&self, engine: &TransactionEngine, horizon: u64) -> Prune {
        let mut versions = self.versions.write();
        if let Some(head) = versions.last() {
            if expired_below_horizon(engine, horizon, head) {
                return Prune::RemoveChain;
            }
        }
        let keep_from = versions
            .iter()
            .rposition(|version| expired_below_horizon(engine, horizon, version))
            .map(|index| index + 1)
            .unwrap_or(0);
        if keep_from == 0 {
            return Prune::Kept { versions_pruned: 0 };
        }
        versions.drain(0..keep_from);
        Prune::Kept {
            versions_pruned: keep_from,
        }
    }

    /// Undoes the transaction's footprint on this chain: detaches versions
    /// it created and clears its expiration stamps. Called on abort, with
    /// the lock still held. Returns `true` when the chain is left empty.
    pub(crate) fn rollback(&self, tx_id: u64) -> bool {
        let mut versions = self.versions.write();
        while versions.last().map_or(false, |v| v.tx_created == tx_id) {
            versions.pop();
        }
        if let Some(head) = versions.last_mut() {
            if head.tx_expired == tx_id {
                head.tx_expired = NO_TX;
                head.cmd_expired = 0;
            }
        }
        versions.is_empty()
    }
}

impl<T: Clone> VersionChain<T> {
    /// Applies a mutation through the clone-on-write path: the head is
    /// cloned into a new version unless it already belongs to this
    /// transaction's current command. Must be called with the chain lock
    /// held by `tx` and the head stamps checked.
    pub(crate) fn update<R>(&self, tx: &Transaction, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut versions = self.versions.write();
        let command = tx.command();
        let Some(head) = versions.last_mut() else {
            return Err(Error::DeletedObject);
        };
        if head.tx_created != tx.id || head.cmd_created != command {
            let data = head.data.clone();
            head.tx_expired = tx.id;
            head.cmd_expired = command;
            versions.push(Version {
                tx_created: tx.id,
                cmd_created: command,
                tx_expired: NO_TX,
                cmd_expired: 0,
                data,
            });
        }
        let head = versions.last_mut().ok_or(Error::DeletedObject)?;
        Ok(f(&mut head.data))
    }
}

/// Whether a commit by `stamp` is inside `tx`'s snapshot view of the world.
fn commit_visible(engine: &TransactionEngine, tx: &Transaction, stamp: u64) -> bool {
    engine.status(stamp) == TxStatus::Committed && stamp < tx.id && !tx.in_snapshot(stamp)
}

fn creation_visible<T>(
    engine: &TransactionEngine,
    tx: &Transaction,
    view: View,
    version: &Version<T>,
) -> bool {
    if version.tx_created == tx.id {
        match view {
            View::New => version.cmd_created <= tx.command(),
            View::Old => version.cmd_created < tx.command(),
        }
    } else {
        commit_visible(engine, tx, version.tx_created)
    }
}

fn expiration_effective<T>(
    engine: &TransactionEngine,
    tx: &Transaction,
    view: View,
    version: &Version<T>,
) -> bool {
    if version.tx_expired == NO_TX {
        return false;
    }
    if version.tx_expired == tx.id {
        match view {
            View::New => version.cmd_expired <= tx.command(),
            View::Old => version.cmd_expired < tx.command(),
        }
    } else {
        commit_visible(engine, tx, version.tx_expired)
    }
}

/// Walks newest to oldest. The newest creation-visible version decides: if
/// its expiration is also in effect the record is deleted at this view, and
/// older versions must not resurface.
fn resolve<'a, T>(
    versions: &'a [Version<T>],
    engine: &TransactionEngine,
    tx: &Transaction,
    view: View,
) -> Option<&'a Version<T>> {
    for version in versions.iter().rev() {
        if creation_visible(engine, tx, view, version) {
            if expiration_effective(engine, tx, view, version) {
                return None;
            }
            return Some(version);
        }
    }
    None
}

/// A version every present and future transaction agrees is gone: its
/// expiring transaction committed before the horizon.
fn expired_below_horizon<T>(
    engine: &TransactionEngine,
    horizon: u64,
    version: &Version<T>,
) -> bool {
    if version.tx_expired == NO_TX {
        return false;
    }
    engine.status(version.tx_expired) == TxStatus::Committed
        && engine
            .commit_timestamp(version.tx_expired)
            .map_or(false, |ts| ts < horizon)
}
