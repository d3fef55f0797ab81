//! Capture Source (§4.6): turns one pcap file on disk into the ordered
//! [`crate::reassembler::TcpSegment`] stream the Stream Reassembler consumes.
//!
//! Capture-file framing (legacy pcap vs pcapng) is handled by `pcap-parser`;
//! Ethernet/IPv4/TCP slicing by `etherparse`. Everything below the file-open
//! level is best-effort: an unparseable packet is skipped with a `trace` log
//! line rather than aborting the capture.

use std::fs::File;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use etherparse::{NetSlice as InternetSlice, SlicedPacket, TransportSlice};
use pcap_parser::pcapng::OptionCode;
use pcap_parser::{create_reader, Linktype, PcapBlockOwned, PcapError};
use thiserror::Error;
use tracing::trace;

use crate::reassembler::TcpSegment;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("could not open pcap file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not read pcap framing for {path}: {detail}")]
    Framing { path: PathBuf, detail: String },
}

/// Read every TCP segment with a non-empty payload out of one pcap file, in
/// capture order. `path` is used only for error messages and to scope
/// `stream_id`s to this file (§4.6: stream ids are not comparable across
/// files).
pub fn read_segments(path: &Path) -> Result<Vec<TcpSegment>, CaptureError> {
    let file = File::open(path).map_err(|source| CaptureError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = create_reader(65536, file).map_err(|source| CaptureError::Framing {
        path: path.to_path_buf(),
        detail: source.to_string(),
    })?;

    let file_tag = path.display().to_string();
    let mut legacy_linktype = Linktype::ETHERNET;
    let mut interfaces: Vec<InterfaceInfo> = Vec::new();
    let mut segments = Vec::new();

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(hdr) => {
                        legacy_linktype = hdr.network;
                    }
                    PcapBlockOwned::Legacy(packet) => {
                        let ts = micros_to_datetime(
                            packet.ts_sec as i64,
                            packet.ts_usec as i64,
                            1_000_000,
                        );
                        push_segment(&mut segments, packet.data, legacy_linktype, ts, &file_tag);
                    }
                    PcapBlockOwned::NG(ng_block) => {
                        use pcap_parser::Block;
                        match ng_block {
                            Block::InterfaceDescription(idb) => {
                                interfaces.push(InterfaceInfo {
                                    linktype: idb.linktype,
                                    resolution: if_tsresol(&idb.options),
                                });
                            }
                            Block::EnhancedPacket(epb) => {
                                let Some(interface) =
                                    interfaces.get(epb.if_id as usize).copied()
                                else {
                                    trace!(
                                        "skipping packet for unknown interface {} in {file_tag}",
                                        epb.if_id
                                    );
                                    reader.consume(offset);
                                    continue;
                                };
                                let ts_raw = ((epb.ts_high as u64) << 32) | epb.ts_low as u64;
                                let ts = ticks_to_datetime(ts_raw, interface.resolution);
                                push_segment(&mut segments, epb.data, interface.linktype, ts, &file_tag);
                            }
                            _ => {}
                        }
                    }
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|source| CaptureError::Framing {
                        path: path.to_path_buf(),
                        detail: source.to_string(),
                    })?;
            }
            Err(source) => {
                return Err(CaptureError::Framing {
                    path: path.to_path_buf(),
                    detail: source.to_string(),
                })
            }
        }
    }

    Ok(segments)
}

fn micros_to_datetime(secs: i64, micros: i64, resolution: i64) -> DateTime<Utc> {
    let nanos = micros * (1_000_000_000 / resolution.max(1));
    DateTime::from_timestamp(secs, nanos.max(0) as u32).unwrap_or_else(Utc::now)
}

#[derive(Clone, Copy)]
struct InterfaceInfo {
    linktype: Linktype,
    /// Ticks per second for this interface's packet timestamps (pcapng
    /// `if_tsresol`; defaults to microseconds, matching legacy pcap, when
    /// the option is absent).
    resolution: i64,
}

/// Decode a pcapng `if_tsresol` option value (a single byte: if the high bit
/// is unset, resolution is `10^value` ticks/second; if set, `2^(value & 0x7f)`).
/// Falls back to microsecond resolution when the option is missing.
fn if_tsresol(options: &[pcap_parser::pcapng::PcapNGOption]) -> i64 {
    let Some(option) = options.iter().find(|opt| opt.code == OptionCode::IfTsresol) else {
        return 1_000_000;
    };
    let Some(&raw) = option.value.first() else {
        return 1_000_000;
    };

    if raw & 0x80 == 0 {
        10i64.saturating_pow(raw as u32)
    } else {
        1i64.checked_shl((raw & 0x7f) as u32).unwrap_or(i64::MAX)
    }
}

/// Combine an `EnhancedPacketBlock`'s 64-bit split timestamp with its
/// interface's resolution into a `DateTime<Utc>`.
fn ticks_to_datetime(ticks: u64, resolution: i64) -> DateTime<Utc> {
    let resolution = resolution.max(1);
    let secs = (ticks / resolution as u64) as i64;
    let fraction = (ticks % resolution as u64) as i64;
    let nanos = fraction * (1_000_000_000 / resolution);
    DateTime::from_timestamp(secs, nanos.max(0) as u32).unwrap_or_else(Utc::now)
}

fn push_segment(
    out: &mut Vec<TcpSegment>,
    data: &[u8],
    linktype: Linktype,
    capture_ts: DateTime<Utc>,
    file_tag: &str,
) {
    if linktype != Linktype::ETHERNET {
        trace!("skipping non-Ethernet packet in {file_tag} (linktype {linktype:?})");
        return;
    }

    let sliced = match SlicedPacket::from_ethernet(data) {
        Ok(sliced) => sliced,
        Err(err) => {
            trace!("skipping unparseable packet in {file_tag}: {err}");
            return;
        }
    };

    let Some(InternetSlice::Ipv4(ipv4)) = sliced.net else {
        trace!("skipping non-IPv4 packet in {file_tag}");
        return;
    };
    let Some(TransportSlice::Tcp(tcp)) = sliced.transport else {
        trace!("skipping non-TCP packet in {file_tag}");
        return;
    };

    let payload = tcp.payload();
    if payload.is_empty() {
        return;
    }

    let src_ip: Ipv4Addr = ipv4.header().source_addr();
    let dst_ip: Ipv4Addr = ipv4.header().destination_addr();
    let src = format!("{src_ip}:{}", tcp.source_port());
    let dst = format!("{dst_ip}:{}", tcp.destination_port());

    let stream_id = normalized_stream_id(file_tag, &src, &dst);

    out.push(TcpSegment {
        stream_id,
        src,
        dst,
        payload: payload.to_vec(),
        capture_ts,
    });
}

/// Both directions of one TCP connection must hash to the same stream id
/// (§4.6): sort the two endpoints before joining them.
fn normalized_stream_id(file_tag: &str, a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{file_tag}|{lo}|{hi}")
}
