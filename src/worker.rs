//! The long-lived worker thread: parks at the barrier, mutates the records
//! it owns for one round, reports back, and parks again.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::anonymizer::Anonymizer;
use crate::barrier::Barrier;
use crate::error::NfanonError;
use crate::partition::{RecordSlot, SharedBytes};
use crate::record::RecordType;
use crate::record::v3;

/// One round's published work, read once per release by every worker.
#[derive(Clone)]
pub struct Round {
    pub bytes: SharedBytes,
    pub slots: Arc<Vec<RecordSlot>>,
    pub block_index: usize,
}

/// Shared state a worker needs for its whole lifetime, independent of any
/// one round. `file_path` names whichever input file the controller is
/// currently streaming; the controller only ever mutates it between
/// rounds, while every worker is parked at the barrier, so a worker can
/// read it at any point during its own round without racing the next
/// update (the same happens-before argument the barrier gives `current_round`).
pub struct WorkerParams {
    pub id: usize,
    pub num_workers: usize,
    pub barrier: Arc<Barrier>,
    pub anonymizer: Arc<dyn Anonymizer>,
    pub current_round: Arc<Mutex<Option<Round>>>,
    pub failure: Arc<Mutex<Option<NfanonError>>>,
    pub file_path: Arc<Mutex<PathBuf>>,
}

/// The worker's entire run loop: wait, work, report, repeat until the
/// controller tears the barrier down.
pub fn run(params: WorkerParams) {
    // The barrier's round counter starts at 0 (`Barrier::new`), so a worker
    // must not start with that same value: it would treat the barrier's
    // initial state as "already seen" and park on `round_published` forever,
    // never reaching `worker_done()` for the post-spawn announce-readiness
    // rendezvous the controller's first `controller_wait()` depends on.
    let mut last_seen_round = u64::MAX;

    loop {
        let round_number = match params.barrier.worker_wait(last_seen_round) {
            Some(round_number) => round_number,
            None => break,
        };
        last_seen_round = round_number;

        if let Some(round) = current_round(&params) {
            process_round(&params, &round);
        }

        params.barrier.worker_done();
    }
}

fn current_round(params: &WorkerParams) -> Option<Round> {
    params.current_round.lock().unwrap().clone()
}

fn process_round(params: &WorkerParams, round: &Round) {
    for (idx, slot) in round.slots.iter().enumerate() {
        if idx % params.num_workers != params.id {
            continue;
        }

        match slot.header.record_type {
            RecordType::V3 => {
                // SAFETY: the controller assigned this (offset, size) pair to
                // this worker id via the same `idx % num_workers` rule, and
                // every other worker skips it for the same reason, so this
                // range is not concurrently aliased. See
                // `SharedBytes::slice_mut`.
                let record = unsafe { round.bytes.slice_mut(slot.offset, slot.header.size as usize) };
                if let Err(reason) = v3::walk(record, params.anonymizer.as_ref()) {
                    report_first_failure(params, round.block_index, idx, reason);
                }
            }
            other if other.is_recognized_passthrough() => {}
            other => {
                log::warn!(
                    "block {}: unknown record type {other:?} at record {idx}, leaving bytes unchanged",
                    round.block_index
                );
            }
        }
    }
}

fn report_first_failure(params: &WorkerParams, block_index: usize, record_index: usize, reason: String) {
    let mut failure = params.failure.lock().unwrap();
    if failure.is_none() {
        let file_path = params.file_path.lock().unwrap().clone();
        *failure = Some(NfanonError::corruption(
            file_path,
            block_index,
            Some(record_index),
            reason,
        ));
    }
}
