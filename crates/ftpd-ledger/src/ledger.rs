use std::fmt;

use ftpd_contracts::ACCOUNTING_BUCKETS;

use crate::keys::{hash_address, hash_worker_id, RawAddr, WorkerId};
use crate::table::{AccountingTable, TableError};

/// Handed to a freshly launched worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchDescriptor {
    /// Live-worker count at launch, this worker included.
    pub ordinal: u32,
    /// Concurrent connections from this worker's source address, this one
    /// included.
    pub rank_for_address: u32,
}

/// Bookkeeping failures. Every variant means the ledger's own invariants were
/// violated; callers escalate these to the fatal tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    AddressMissing(RawAddr),
    ZeroCount(RawAddr),
    WorkerAlreadyBound(WorkerId),
    WorkerMissing(WorkerId),
    ChildCountUnderflow,
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::AddressMissing(addr) => {
                write!(f, "IP address {addr} missing from connection counts")
            }
            LedgerError::ZeroCount(addr) => write!(f, "zero count for IP address {addr}"),
            LedgerError::WorkerAlreadyBound(id) => {
                write!(f, "worker pid {id} already present in worker table")
            }
            LedgerError::WorkerMissing(id) => {
                write!(f, "worker pid {id} missing from worker table")
            }
            LedgerError::ChildCountUnderflow => f.write_str("live child count underflow"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Live-connection accounting owned by the listener for its whole lifetime.
///
/// Invariant: every address bound to a live worker has a count of at least
/// one, and an address whose count drops to zero has no entry at all.
#[derive(Debug, Clone)]
pub struct AdmissionLedger {
    per_address_count: AccountingTable<RawAddr, u32>,
    worker_address: AccountingTable<WorkerId, RawAddr>,
    total_children: u32,
}

impl Default for AdmissionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionLedger {
    pub fn new() -> Self {
        Self::with_buckets(ACCOUNTING_BUCKETS)
    }

    pub fn with_buckets(buckets: u32) -> Self {
        Self {
            per_address_count: AccountingTable::new(buckets, hash_address),
            worker_address: AccountingTable::new(buckets, hash_worker_id),
            total_children: 0,
        }
    }

    pub fn total_children(&self) -> u32 {
        self.total_children
    }

    pub fn connections_from(&self, addr: &RawAddr) -> u32 {
        self.per_address_count.get(addr).unwrap_or(0)
    }

    pub fn tracked_addresses(&self) -> usize {
        self.per_address_count.len()
    }

    pub fn live_workers(&self) -> usize {
        self.worker_address.len()
    }

    pub fn worker_address(&self, id: WorkerId) -> Option<RawAddr> {
        self.worker_address.get(&id)
    }

    /// Counts one more connection from `addr` and returns its rank.
    pub fn record_connection(&mut self, addr: RawAddr) -> u32 {
        if let Some(count) = self.per_address_count.lookup(&addr) {
            *count += 1;
            return *count;
        }
        let inserted = self.per_address_count.insert(addr, 1);
        debug_assert!(inserted.is_ok(), "absent address collided: {inserted:?}");
        1
    }

    pub fn undo_connection(&mut self, addr: RawAddr) -> Result<(), LedgerError> {
        let count = self
            .per_address_count
            .lookup(&addr)
            .ok_or(LedgerError::AddressMissing(addr))?;
        if *count == 0 {
            return Err(LedgerError::ZeroCount(addr));
        }
        *count -= 1;
        if *count == 0 {
            self.per_address_count
                .remove(&addr)
                .map_err(|_| LedgerError::AddressMissing(addr))?;
        }
        Ok(())
    }

    pub fn bind_worker(&mut self, id: WorkerId, addr: RawAddr) -> Result<(), LedgerError> {
        self.worker_address
            .insert(id, addr)
            .map_err(|_: TableError| LedgerError::WorkerAlreadyBound(id))
    }

    pub fn release_worker(&mut self, id: WorkerId) -> Result<RawAddr, LedgerError> {
        self.worker_address
            .remove(&id)
            .map_err(|_: TableError| LedgerError::WorkerMissing(id))
    }

    /// Tentatively admits a connection: bumps the live-child count and the
    /// per-address count. Follow with `commit_admission` once the worker
    /// exists or `abandon_admission` if it could not be started.
    pub fn begin_admission(&mut self, addr: RawAddr) -> LaunchDescriptor {
        self.total_children = self.total_children.saturating_add(1);
        let rank_for_address = self.record_connection(addr);
        LaunchDescriptor {
            ordinal: self.total_children,
            rank_for_address,
        }
    }

    pub fn commit_admission(&mut self, id: WorkerId, addr: RawAddr) -> Result<(), LedgerError> {
        self.bind_worker(id, addr)
    }

    pub fn abandon_admission(&mut self, addr: RawAddr) -> Result<(), LedgerError> {
        self.decrement_children()?;
        self.undo_connection(addr)
    }

    /// Reverses a committed admission for a worker that has exited.
    pub fn retire_worker(&mut self, id: WorkerId) -> Result<RawAddr, LedgerError> {
        self.decrement_children()?;
        let addr = self.release_worker(id)?;
        self.undo_connection(addr)?;
        Ok(addr)
    }

    fn decrement_children(&mut self) -> Result<(), LedgerError> {
        self.total_children = self
            .total_children
            .checked_sub(1)
            .ok_or(LedgerError::ChildCountUnderflow)?;
        Ok(())
    }
}
