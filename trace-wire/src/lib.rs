//! TCP stream reassembly and MongoDB wire protocol decoding.
//!
//! This crate owns the Stream Reassembler and Wire Decoder stages of the
//! reconstruction pipeline: turning capture-level TCP segments into framed
//! application messages. It treats the embedded binary document format
//! (`bson`) and the OP_COMPRESSED payload codec (`snap`) as external
//! libraries rather than reimplementing them.

pub mod capture;
pub mod compress;
pub mod decoder;
pub mod document;
pub mod error;
pub mod message;
pub mod reassembler;

pub use capture::{read_segments, CaptureError};
pub use compress::CompressorRegistry;
pub use decoder::decode_message;
pub use document::SafeGet;
pub use error::WireError;
pub use message::{port_of, MongoMessage, RawMessage, SortKey};
pub use reassembler::{reassemble, StreamReassembler, TcpSegment, TcpStream};

use std::path::Path;

/// Decode every framed message out of one pcap's worth of TCP segments,
/// chaining the Stream Reassembler and Wire Decoder stages (§4.4 step 1).
pub fn decode_segments<'a>(
    segments: impl IntoIterator<Item = TcpSegment> + 'a,
    compressors: &'a CompressorRegistry,
) -> impl Iterator<Item = MongoMessage> + 'a {
    reassemble(segments).flat_map(move |stream| {
        stream.into_iter().filter_map(move |raw| {
            match decode_message(&raw, compressors) {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!("dropping unreadable wire message: {err}");
                    None
                }
            }
        })
    })
}

/// Read one pcap file and decode its traffic into an ordered `MongoMessage`
/// sequence: Capture Source → Stream Reassembler → Wire Decoder (§4.6, §4.4
/// step 1). The whole file is read eagerly since an unreadable pcap is a
/// fatal, operator-visible error (§4.6), not something to discover lazily
/// mid-pipeline.
pub fn decode_pcap_file<'a>(
    path: &Path,
    compressors: &'a CompressorRegistry,
) -> Result<impl Iterator<Item = MongoMessage> + 'a, CaptureError> {
    let segments = read_segments(path)?;
    Ok(decode_segments(segments, compressors))
}
