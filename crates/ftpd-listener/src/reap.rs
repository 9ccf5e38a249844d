use anyhow::{Context, Result};
use ftpd_ledger::{AdmissionLedger, RawAddr, WorkerId};

use crate::process::ProcessControl;

/// Collects every worker that has exited so far and retires it from the
/// ledger. One notification may stand for several exits, so this drains
/// until the process layer reports nothing left.
pub fn reap_exited<P: ProcessControl + ?Sized>(
    procs: &mut P,
    ledger: &mut AdmissionLedger,
) -> Result<Vec<(WorkerId, RawAddr)>> {
    let mut retired = Vec::new();
    while let Some(worker) = procs.reap_one().context("reap exited worker")? {
        let addr = ledger
            .retire_worker(worker)
            .with_context(|| format!("retire worker {worker}"))?;
        retired.push((worker, addr));
    }
    Ok(retired)
}
