use thiserror::Error;

/// Errors the wire decoder surfaces to its caller.
///
/// Everything that §7 classifies as "best-effort" (unknown opcodes, bad
/// embedded documents) never reaches this type — it is handled inline by
/// [`crate::decoder::decode_message`] and folded into the body instead.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("truncated wire message")]
    Truncated(#[from] std::io::Error),

    #[error("unsupported compressor id {0}")]
    UnsupportedCompressor(u8),

    #[error("snappy decompression failed: {0}")]
    Decompress(#[from] snap::Error),
}
