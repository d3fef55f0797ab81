use std::fs::File;
use std::io::{self, BufWriter};

use anyhow::{Context, Result};
use clap::Parser;

mod classify;
mod clock;
mod cli;
mod error;
mod output;

use classify::{merge_by_sort_key, Classifier};
use clock::ClockSynthesizer;
use cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let (inputs, output) = Cli::parse().validate()?;

    let parsed_log = trace_log::parse_log_file(&inputs.log)
        .with_context(|| format!("reading log file {}", inputs.log.display()))?;
    let log_file = parsed_log.log_file;

    let compressors = trace_wire::CompressorRegistry::new();
    let mut per_pcap = Vec::new();
    for path in &inputs.pcaps {
        let messages: Vec<_> = trace_wire::decode_pcap_file(path, &compressors)
            .with_context(|| format!("reading pcap file {}", path.display()))?
            .collect();
        per_pcap.push(messages.into_iter());
    }

    let merged = merge_by_sort_key(per_pcap);
    let classified = Classifier::new(merged);

    let mut synth = ClockSynthesizer::new(&log_file);
    let mut events = Vec::new();
    for message in classified {
        if let Some([send, receive]) = synth.observe(&log_file, &message) {
            events.push(send);
            events.push(receive);
        }
    }

    match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("creating output file {}", path.display()))?;
            output::write_events(BufWriter::new(file), events)?;
        }
        None => {
            output::write_events(io::stdout().lock(), events)?;
        }
    }

    Ok(())
}
