use std::path::PathBuf;

use clap::Parser;

use crate::error::CliError;

#[derive(Debug, Parser)]
#[clap(name = "mongo-trace")]
#[clap(author, version)]
#[clap(about = "Reconstructs a causally-ordered vector-clock trace from pcaps and a server log")]
pub struct Cli {
    /// Pcap captures (`.pcap`) and exactly one server log (`.log`)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Where to write the ShiViz input file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// The files the pipeline needs, split and validated per §6.
#[derive(Debug)]
pub struct Inputs {
    pub pcaps: Vec<PathBuf>,
    pub log: PathBuf,
}

impl Cli {
    pub fn validate(self) -> Result<(Inputs, Option<PathBuf>), CliError> {
        let mut pcaps = Vec::new();
        let mut logs = Vec::new();

        for path in self.files {
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("pcap") => pcaps.push(path),
                Some("log") => logs.push(path),
                _ => return Err(CliError::UnrecognizedExtension { path }),
            }
        }

        if logs.len() != 1 {
            return Err(CliError::WrongLogFileCount { count: logs.len() });
        }

        Ok((
            Inputs {
                pcaps,
                log: logs.remove(0),
            },
            self.output,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(files: &[&str]) -> Cli {
        Cli {
            files: files.iter().map(PathBuf::from).collect(),
            output: None,
        }
    }

    #[test]
    fn accepts_one_log_and_any_number_of_pcaps() {
        let (inputs, _) = cli(&["a.pcap", "b.pcap", "run.log"]).validate().unwrap();
        assert_eq!(inputs.pcaps.len(), 2);
        assert_eq!(inputs.log, PathBuf::from("run.log"));
    }

    #[test]
    fn rejects_zero_log_files() {
        let err = cli(&["a.pcap"]).validate().unwrap_err();
        assert!(matches!(err, CliError::WrongLogFileCount { count: 0 }));
    }

    #[test]
    fn rejects_multiple_log_files() {
        let err = cli(&["a.log", "b.log"]).validate().unwrap_err();
        assert!(matches!(err, CliError::WrongLogFileCount { count: 2 }));
    }

    #[test]
    fn rejects_unrecognized_extension() {
        let err = cli(&["run.log", "capture.bin"]).validate().unwrap_err();
        assert!(matches!(err, CliError::UnrecognizedExtension { .. }));
    }
}
