//! The controller: drives one worker pool across every discovered input
//! file, streaming blocks through the barrier and writing each mutated
//! block back out.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;

use serde::Serialize;

use crate::anonymizer::Anonymizer;
use crate::archive::{self, ArchiveReader, ArchiveWriter};
use crate::block::DataBlock;
use crate::error::NfanonError;
use crate::partition::{RecordSlot, SharedBytes, scan_records};
use crate::worker::{self, Round, WorkerParams};

const MAX_WORKERS: usize = 8;
const CREATOR_TAG: &str = "nfanon";

/// Aggregate counters for one [`run`] invocation, logged at completion and
/// returned to the caller for tests/tooling that want it structured rather
/// than scraped from log lines.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunSummary {
    pub files_processed: usize,
    pub blocks_processed: usize,
}

/// Resolved configuration the CLI front-end hands to [`run`]. Everything
/// the pipeline needs is an explicit field here rather than ambient global
/// state, per the design note on the anonymizer's key schedule.
pub struct RunConfig {
    pub anonymizer: Arc<dyn Anonymizer>,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub num_workers: usize,
    pub quiet: bool,
}

/// Picks `min(cores_online, MAX_WORKERS)`, falling back to 1 if the core
/// count cannot be determined (§4.6).
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().min(MAX_WORKERS))
        .unwrap_or(1)
}

/// The long-lived worker pool plus the shared state the controller
/// publishes rounds through. One `Pool` is spawned per [`run`] invocation
/// and shared across every discovered input file.
struct Pool {
    barrier: Arc<crate::barrier::Barrier>,
    current_round: Arc<Mutex<Option<Round>>>,
    failure: Arc<Mutex<Option<NfanonError>>>,
    active_file: Arc<Mutex<PathBuf>>,
    handles: Vec<JoinHandle<()>>,
}

impl Pool {
    fn spawn(num_workers: usize, anonymizer: Arc<dyn Anonymizer>, first_file: PathBuf) -> Self {
        let barrier = Arc::new(crate::barrier::Barrier::new(num_workers));
        let current_round = Arc::new(Mutex::new(None));
        let failure = Arc::new(Mutex::new(None));
        let active_file = Arc::new(Mutex::new(first_file));

        let handles = (0..num_workers)
            .map(|id| {
                let params = WorkerParams {
                    id,
                    num_workers,
                    barrier: Arc::clone(&barrier),
                    anonymizer: Arc::clone(&anonymizer),
                    current_round: Arc::clone(&current_round),
                    failure: Arc::clone(&failure),
                    file_path: Arc::clone(&active_file),
                };
                thread::spawn(move || worker::run(params))
            })
            .collect();

        Self {
            barrier,
            current_round,
            failure,
            active_file,
            handles,
        }
    }

    /// Called only while every worker is parked (right after the previous
    /// file's final `controller_wait`), so updating the shared path here
    /// cannot race a worker still reading it for the prior file.
    fn set_active_file(&self, path: PathBuf) {
        *self.active_file.lock().unwrap() = path;
    }

    /// Publishes `block`, releases the pool, and waits for completion,
    /// returning the mutated block or the first corruption a worker (or
    /// the prescan) reported.
    fn process_block(&self, block_index: usize, block: DataBlock) -> Result<DataBlock, NfanonError> {
        self.barrier.controller_wait();

        let DataBlock {
            block_type,
            num_records,
            mut bytes,
        } = block;

        let slots: Vec<RecordSlot> = scan_records(&bytes).map_err(|reason| {
            let file = self.active_file.lock().unwrap().clone();
            NfanonError::corruption(file, block_index, None, reason)
        })?;
        let shared = SharedBytes::new(&mut bytes);

        *self.current_round.lock().unwrap() = Some(Round {
            bytes: shared,
            slots: Arc::new(slots),
            block_index,
        });
        self.barrier.release();
        self.barrier.controller_wait();

        if let Some(err) = self.failure.lock().unwrap().take() {
            return Err(err);
        }

        Ok(DataBlock {
            block_type,
            num_records,
            bytes,
        })
    }

    /// Tells every worker there is no more work, releases them one last
    /// time, and joins their threads (§4.6 step 5).
    fn shutdown(mut self) {
        self.barrier.controller_wait();
        *self.current_round.lock().unwrap() = None;
        self.barrier.release();
        self.barrier.destroy();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Runs the whole anonymization pass described by `config`: discovers
/// inputs, spawns the worker pool once, and streams every input file's
/// blocks through it before tearing the pool down.
pub fn run(config: RunConfig) -> Result<RunSummary, NfanonError> {
    let inputs = archive::discover_inputs(&config.input)
        .map_err(|e| NfanonError::file(&config.input, "discovering input files", e))?;
    if inputs.is_empty() {
        return Err(NfanonError::setup(format!(
            "no input files found under {}",
            config.input.display()
        )));
    }

    let pool = Pool::spawn(config.num_workers, Arc::clone(&config.anonymizer), inputs[0].clone());
    // The post-spawn park: workers announce readiness before any block is
    // published (§4.4 step 1).
    pool.barrier.controller_wait();

    let mut summary = RunSummary::default();
    for (file_index, input_path) in inputs.iter().enumerate() {
        if file_index > 0 {
            pool.set_active_file(input_path.clone());
        }
        let block_count = process_file(&pool, input_path, &config)?;
        summary.files_processed += 1;
        summary.blocks_processed += block_count;
        if !config.quiet {
            log::info!("{}: finished ({block_count} blocks)", input_path.display());
        }
    }

    pool.shutdown();
    Ok(summary)
}

/// Streams one input file's blocks through the pool and writes each
/// (possibly mutated) block to its output, returning the number of blocks
/// processed.
fn process_file(pool: &Pool, input_path: &Path, config: &RunConfig) -> Result<usize, NfanonError> {
    let output_path = match &config.output {
        Some(path) => path.clone(),
        None => temp_output_path(input_path),
    };
    let in_place = config.output.is_none();

    let mut reader = ArchiveReader::open(input_path)
        .map_err(|e| NfanonError::file(input_path, "opening input archive", e))?;
    let identity = reader.identity().clone();
    let stat_record = *reader.stat_record();
    let compression = reader.compression();

    let mut writer =
        ArchiveWriter::create(&output_path, &identity, &stat_record, compression, CREATOR_TAG)
            .map_err(|e| NfanonError::file(&output_path, "opening output archive", e))?;

    let mut block_index = 0usize;
    loop {
        let block = reader
            .read_block()
            .map_err(|e| NfanonError::file(input_path, "reading block", e))?;
        let Some(block) = block else { break };

        let out_block = if block.block_type.carries_flow_records() {
            pool.process_block(block_index, block)?
        } else {
            log::warn!(
                "{}: block {block_index} has non-flow type, passing through unchanged",
                input_path.display()
            );
            block
        };

        writer
            .write_block(&out_block)
            .map_err(|e| NfanonError::file(&output_path, "writing block", e))?;
        block_index += 1;
    }

    writer
        .finalize()
        .map_err(|e| NfanonError::file(&output_path, "finalizing output archive", e))?;

    if in_place {
        archive::rename(&output_path, input_path)
            .map_err(|e| NfanonError::file(input_path, "renaming output into place", e))?;
    }

    Ok(block_index)
}

fn temp_output_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push("-tmp");
    PathBuf::from(name)
}
