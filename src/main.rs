//! `nfanon`: prefix-preserving IP/AS anonymization for NetFlow/IPFIX
//! archive files.

use std::process::ExitCode;

use nfanon::{cli, pipeline};

fn main() -> ExitCode {
    let config = match cli::parse_and_build() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("nfanon: {err}");
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    match pipeline::run(config) {
        Ok(summary) => {
            log::debug!(
                "run complete: {} file(s), {} block(s)",
                summary.files_processed,
                summary.blocks_processed
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            eprintln!("nfanon: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
