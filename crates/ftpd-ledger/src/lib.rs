//! Admission accounting for the standalone listener.
//!
//! Two fixed-width hash tables track live connections: one counts connections
//! per source address, the other remembers which address each worker process
//! was launched for. `AdmissionLedger` keeps both in step with the global
//! live-worker counter.

mod keys;
mod ledger;
mod table;

pub use keys::{hash_address, hash_worker_id, RawAddr, WorkerId};
pub use ledger::{AdmissionLedger, LaunchDescriptor, LedgerError};
pub use table::{AccountingTable, BucketHash, TableError};
