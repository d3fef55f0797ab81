//! A pluggable decompressor registry for OP_COMPRESSED envelopes.
//!
//! The source this pipeline was built from always assumed `compressor_id`
//! meant Snappy. Whether other ids show up in practice is unknown (see
//! DESIGN.md), so the registry is open to more implementations rather than
//! a hardcoded match on one id.

use crate::error::WireError;

pub trait Decompressor {
    /// The MongoDB wire protocol compressor id this implementation handles.
    fn id(&self) -> u8;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, WireError>;
}

struct Snappy;

impl Decompressor for Snappy {
    fn id(&self) -> u8 {
        1
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, WireError> {
        let mut decoder = snap::raw::Decoder::new();
        Ok(decoder.decompress_vec(data)?)
    }
}

/// Holds the set of compressors this build knows how to decode.
pub struct CompressorRegistry {
    decompressors: Vec<Box<dyn Decompressor + Send + Sync>>,
}

impl CompressorRegistry {
    pub fn new() -> Self {
        Self {
            decompressors: vec![Box::new(Snappy)],
        }
    }

    pub fn decompress(&self, compressor_id: u8, data: &[u8]) -> Result<Vec<u8>, WireError> {
        self.decompressors
            .iter()
            .find(|d| d.id() == compressor_id)
            .ok_or(WireError::UnsupportedCompressor(compressor_id))?
            .decompress(data)
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
