//! Error taxonomy for the anonymization pipeline.
//!
//! Mirrors the layered error model called out in the design: setup errors
//! abort before any output is produced, per-file errors abandon the current
//! file but do not touch the process exit path directly, and corruption
//! errors are always fatal to the whole run.

use std::fmt;
use std::path::PathBuf;

/// Top-level error type returned by every fallible operation in this crate.
#[derive(Debug)]
pub enum NfanonError {
    /// Missing or malformed `-K` key, unreadable `-r` path, or worker spawn
    /// failure. Always occurs before any worker thread is spawned or any
    /// output file is created.
    Setup {
        context: String,
    },

    /// An input/output file could not be opened, or an in-place rename
    /// failed. The current file is abandoned; the run does not continue to
    /// the next input file.
    File {
        path: PathBuf,
        context: String,
        source: std::io::Error,
    },

    /// A record or block violated a size/bounds invariant that makes the
    /// remainder of the block frame untrustworthy. Fatal to the whole run.
    Corruption {
        file: PathBuf,
        block_index: usize,
        record_index: Option<usize>,
        reason: String,
    },
}

impl fmt::Display for NfanonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NfanonError::Setup { context } => write!(f, "setup error: {context}"),
            NfanonError::File {
                path,
                context,
                source,
            } => write!(f, "{}: {context}: {source}", path.display()),
            NfanonError::Corruption {
                file,
                block_index,
                record_index: Some(record_index),
                reason,
            } => write!(
                f,
                "{}: corrupt stream at block {block_index}, record {record_index}: {reason}",
                file.display()
            ),
            NfanonError::Corruption {
                file,
                block_index,
                record_index: None,
                reason,
            } => write!(
                f,
                "{}: corrupt stream at block {block_index}: {reason}",
                file.display()
            ),
        }
    }
}

impl std::error::Error for NfanonError {}

impl NfanonError {
    pub fn setup(context: impl Into<String>) -> Self {
        NfanonError::Setup {
            context: context.into(),
        }
    }

    pub fn file(path: impl Into<PathBuf>, context: impl Into<String>, source: std::io::Error) -> Self {
        NfanonError::File {
            path: path.into(),
            context: context.into(),
            source,
        }
    }

    pub fn corruption(
        file: impl Into<PathBuf>,
        block_index: usize,
        record_index: Option<usize>,
        reason: impl Into<String>,
    ) -> Self {
        NfanonError::Corruption {
            file: file.into(),
            block_index,
            record_index,
            reason: reason.into(),
        }
    }

    /// The process exit code this error maps to (`255` for every currently
    /// modeled variant, per the CLI contract).
    pub fn exit_code(&self) -> i32 {
        255
    }
}
