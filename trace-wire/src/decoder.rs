//! Wire Decoder (§4.2).
//!
//! Frames one [`RawMessage`] per the MongoDB wire protocol header and
//! decodes its body into a [`MongoMessage`]. Four opcodes are handled:
//! OP_QUERY, OP_REPLY, OP_COMPRESSED and OP_MSG; anything else is skipped.

use std::io::{Cursor, Read};

use bson::{doc, Bson, Document};
use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, warn};

use crate::compress::CompressorRegistry;
use crate::error::WireError;
use crate::message::{port_of, MongoMessage, RawMessage};

const OP_REPLY: i32 = 1;
const OP_QUERY: i32 = 2004;
const OP_COMPRESSED: i32 = 2012;
const OP_MSG: i32 = 2013;

const CHECKSUM_PRESENT: u32 = 0x1;

struct Header {
    msg_len: i32,
    request_id: i32,
    response_to: i32,
    op_code: i32,
}

fn read_header(cursor: &mut Cursor<&[u8]>) -> Result<Header, WireError> {
    Ok(Header {
        msg_len: cursor.read_i32::<LittleEndian>()?,
        request_id: cursor.read_i32::<LittleEndian>()?,
        response_to: cursor.read_i32::<LittleEndian>()?,
        op_code: cursor.read_i32::<LittleEndian>()?,
    })
}

fn read_cstring(cursor: &mut Cursor<&[u8]>) -> Result<String, WireError> {
    let mut bytes = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        cursor.read_exact(&mut byte)?;
        if byte[0] == 0 {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        bytes.push(byte[0]);
    }
}

/// Decode one document from the cursor.
///
/// The outer cursor always advances by the document's *declared* length,
/// whether or not the bytes inside turn out to be valid BSON — mirroring
/// the source's `read_remainder()`, which slices by the declared length
/// before attempting to decode. That keeps a bad document (the upstream
/// implementation's recurring failure is a timestamp field like
/// `electionTime` out of `bson`'s representable range) from desynchronizing
/// the rest of the framing; per §4.2 it becomes a body placeholder instead
/// of a hard error.
fn decode_document(cursor: &mut Cursor<&[u8]>) -> Document {
    let data = *cursor.get_ref();
    let start = cursor.position() as usize;

    if start + 4 > data.len() {
        cursor.set_position(data.len() as u64);
        return doc! { "error": "truncated document length" };
    }

    let declared_len = i32::from_le_bytes(data[start..start + 4].try_into().unwrap()).max(0) as usize;
    let end = (start + declared_len).min(data.len());
    cursor.set_position(end as u64);

    match Document::from_reader(&mut Cursor::new(&data[start..end])) {
        Ok(document) => document,
        Err(err) => doc! { "error": err.to_string() },
    }
}

fn decode_op_msg_payload(payload: &[u8]) -> Document {
    let mut cursor = Cursor::new(payload);
    let mut body = Document::new();

    let flags = match cursor.read_u32::<LittleEndian>() {
        Ok(flags) => flags,
        Err(err) => {
            body.insert("error", err.to_string());
            return body;
        }
    };

    let checksum_present = flags & CHECKSUM_PRESENT != 0;
    let section_end = payload.len().saturating_sub(if checksum_present { 4 } else { 0 });

    while (cursor.position() as usize) < section_end {
        let payload_type = match cursor.read_u8() {
            Ok(t) => t,
            Err(_) => break,
        };

        match payload_type {
            0 => {
                let section = decode_document(&mut cursor);
                for (key, value) in section {
                    body.insert(key, value);
                }
            }
            1 => {
                let section_start = cursor.position();
                let section_size = match cursor.read_u32::<LittleEndian>() {
                    Ok(size) => size as u64,
                    Err(_) => break,
                };
                let sequence_identifier = match read_cstring(&mut cursor) {
                    Ok(id) => id,
                    Err(_) => break,
                };

                let mut documents = Vec::new();
                while cursor.position() < section_start + section_size {
                    documents.push(Bson::Document(decode_document(&mut cursor)));
                }

                body.insert(sequence_identifier, Bson::Array(documents));
            }
            other => {
                warn!("unknown OP_MSG section payload type {other}, stopping section scan");
                break;
            }
        }
    }

    body
}

/// Decode one [`RawMessage`] into a [`MongoMessage`].
///
/// Returns `Ok(None)` for opcodes this pipeline doesn't know about (skipped
/// silently, per §4.2), and `Err` only for a framing-level failure: a
/// truncated header, or an OP_COMPRESSED envelope naming a compressor this
/// build doesn't support.
pub fn decode_message(
    raw: &RawMessage,
    compressors: &CompressorRegistry,
) -> Result<Option<MongoMessage>, WireError> {
    let mut cursor = Cursor::new(raw.data.as_slice());
    let header = read_header(&mut cursor)?;

    let src = port_of(&raw.src).unwrap_or_default();
    let dst = port_of(&raw.dst).unwrap_or_default();

    let body = match header.op_code {
        OP_QUERY => {
            let _flags = cursor.read_u32::<LittleEndian>()?;
            let _ns = read_cstring(&mut cursor)?;
            let _skip = cursor.read_u32::<LittleEndian>()?;
            let _return = cursor.read_u32::<LittleEndian>()?;
            decode_document(&mut cursor)
        }
        OP_REPLY => {
            let _flags = cursor.read_u32::<LittleEndian>()?;
            let _cursor_id = cursor.read_u64::<LittleEndian>()?;
            let _starting_from = cursor.read_u32::<LittleEndian>()?;
            let _number_returned = cursor.read_u32::<LittleEndian>()?;
            decode_document(&mut cursor)
        }
        OP_COMPRESSED => {
            let _original_op_code = cursor.read_u32::<LittleEndian>()?;
            let _uncompressed_length = cursor.read_u32::<LittleEndian>()?;
            let compressor_id = cursor.read_u8()?;

            let remaining = &raw.data[cursor.position() as usize..];
            let decompressed = compressors.decompress(compressor_id, remaining)?;
            decode_op_msg_payload(&decompressed)
        }
        OP_MSG => {
            let len = (header.msg_len as usize).saturating_sub(16);
            let start = cursor.position() as usize;
            let end = (start + len).min(raw.data.len());
            decode_op_msg_payload(&raw.data[start..end])
        }
        other => {
            debug!("skipping unknown opcode {other}");
            return Ok(None);
        }
    };

    Ok(Some(MongoMessage {
        src,
        dst,
        src_endpoint: raw.src.clone(),
        request_id: header.request_id,
        response_to: header.response_to,
        body,
        start_ts: raw.start_ts,
        end_ts: raw.end_ts,
        requester_pid: None,
    }))
}
