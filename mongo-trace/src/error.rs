use std::path::PathBuf;

use thiserror::Error;

/// Input-shape errors (§7): caught before any file is opened for the main
/// pipeline, reported to the operator, non-zero exit.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{path}: expected a .pcap or .log file")]
    UnrecognizedExtension { path: PathBuf },

    #[error("expected exactly one .log file, found {count}")]
    WrongLogFileCount { count: usize },
}
