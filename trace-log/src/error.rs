use std::path::PathBuf;

use thiserror::Error;

/// Only the log file's open itself is fatal (§7 input-shape errors); every
/// per-line problem is logged and skipped, never surfaced here.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("could not open log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
