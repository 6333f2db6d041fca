//! Command-line surface: parses the flags in §6 of the design into a
//! resolved [`pipeline::RunConfig`].

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::anonymizer::{Anonymizer, CryptoPan};
use crate::error::NfanonError;
use crate::pipeline::{self, RunConfig};

/// Prefix-preserving anonymizer for NetFlow/IPFIX flow-record archives.
#[derive(Parser, Debug)]
#[command(name = "nfanon", version, about, long_about = None)]
struct Args {
    /// CryptoPAn key: a 64-character hex string, or an arbitrary
    /// passphrase (1-66 characters) stretched via SHA-256.
    #[arg(short = 'K', value_name = "KEY")]
    key: String,

    /// Log target name, used as the emitted record's module/target label
    /// rather than a POSIX syslog facility (see Open Questions).
    #[arg(short = 'L', value_name = "FACILITY")]
    log_facility: Option<String>,

    /// Suppress the per-file completion banner; warnings and errors still
    /// print.
    #[arg(short = 'q')]
    quiet: bool,

    /// Single input file, or a directory of input files.
    #[arg(short = 'r', value_name = "PATH")]
    read: PathBuf,

    /// Single output file. When omitted, each input file is anonymized
    /// in place via a `<input>-tmp` + atomic rename.
    #[arg(short = 'w', value_name = "PATH")]
    write: Option<PathBuf>,
}

/// Parses `argv`, initializes logging and the anonymizer key, and builds
/// the [`RunConfig`] the pipeline runs against. Returns `Err` for any
/// setup failure (§7); the caller is responsible for mapping that to
/// process exit code 255.
pub fn parse_and_build() -> Result<RunConfig, NfanonError> {
    let args = Args::parse();
    init_logging(args.log_facility.as_deref(), args.quiet);

    let anonymizer: Arc<dyn Anonymizer> = Arc::new(CryptoPan::from_key_str(&args.key)?);

    if !args.read.exists() {
        return Err(NfanonError::setup(format!(
            "input path {} does not exist",
            args.read.display()
        )));
    }

    Ok(RunConfig {
        anonymizer,
        input: args.read,
        output: args.write,
        num_workers: pipeline::default_worker_count(),
        quiet: args.quiet,
    })
}

fn init_logging(target: Option<&str>, quiet: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if quiet {
        builder.filter_level(log::LevelFilter::Warn);
    }
    if let Some(target) = target {
        builder.target(env_logger::Target::Stdout);
        // `-L` names a target/prefix for this invocation's log lines
        // rather than a POSIX syslog facility number; see Open Questions.
        builder.format(move |buf, record| {
            use std::io::Write;
            writeln!(buf, "[{target}] {}: {}", record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_input_path() {
        let args = Args {
            key: "test-key".to_string(),
            log_facility: None,
            quiet: true,
            read: PathBuf::from("/nonexistent/path/does/not/exist"),
            write: None,
        };
        init_logging(None, true);
        let anonymizer: Result<Arc<dyn Anonymizer>, NfanonError> =
            CryptoPan::from_key_str(&args.key).map(|c| Arc::new(c) as Arc<dyn Anonymizer>);
        assert!(anonymizer.is_ok());
        assert!(!args.read.exists());
    }
}
