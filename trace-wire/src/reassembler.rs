//! Stream Reassembler (§4.1).
//!
//! Groups TCP segments by stream id and coalesces same-direction segments
//! adjacent in time into one [`RawMessage`] per direction-run. No sequence
//! numbers are tracked — the capture source hands segments over already in
//! capture order, and out-of-order delivery / retransmission are outside
//! this pipeline's scope (§1 Non-goals).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::message::RawMessage;

/// One TCP segment, as handed over by the capture source (§3a).
#[derive(Debug, Clone)]
pub struct TcpSegment {
    pub stream_id: String,
    pub src: String,
    pub dst: String,
    pub payload: Vec<u8>,
    pub capture_ts: DateTime<Utc>,
}

/// A reassembled TCP stream: the client/server labels from its first
/// segment, plus the `RawMessage`s observed on it, in capture order.
#[derive(Debug, Clone)]
pub struct TcpStream {
    pub client: String,
    pub server: String,
    pub messages: Vec<RawMessage>,
}

impl IntoIterator for TcpStream {
    type Item = RawMessage;
    type IntoIter = std::vec::IntoIter<RawMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

struct PendingStream {
    client: String,
    server: String,
    messages: Vec<RawMessage>,
}

/// Consumes a segment stream and yields reassembled [`TcpStream`]s.
///
/// Streams are materialized lazily only in the sense that nothing is
/// decoded until [`StreamReassembler::finish`] is called: the source
/// guarantees "no recoverable errors", so there is no reason to hold
/// segments open past the point the whole capture has been read.
pub struct StreamReassembler {
    order: Vec<String>,
    streams: HashMap<String, PendingStream>,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            streams: HashMap::new(),
        }
    }

    /// Feed one segment. Segments with an empty payload are dropped
    /// silently, per §4.1.
    pub fn ingest(&mut self, segment: TcpSegment) {
        if segment.payload.is_empty() {
            return;
        }

        match self.streams.get_mut(&segment.stream_id) {
            Some(stream) => {
                let same_direction = stream
                    .messages
                    .last()
                    .is_some_and(|m| m.src == segment.src && m.dst == segment.dst);

                if same_direction {
                    let last = stream.messages.last_mut().expect("checked above");
                    last.data.extend_from_slice(&segment.payload);
                    last.end_ts = segment.capture_ts;
                } else {
                    stream.messages.push(raw_message(&segment));
                }
            }
            None => {
                self.order.push(segment.stream_id.clone());
                self.streams.insert(
                    segment.stream_id.clone(),
                    PendingStream {
                        client: segment.src.clone(),
                        server: segment.dst.clone(),
                        messages: vec![raw_message(&segment)],
                    },
                );
            }
        }
    }

    /// Drain every stream seen so far, in the order each was first
    /// observed.
    pub fn finish(mut self) -> impl Iterator<Item = TcpStream> {
        self.order.into_iter().filter_map(move |id| {
            self.streams.remove(&id).map(|s| TcpStream {
                client: s.client,
                server: s.server,
                messages: s.messages,
            })
        })
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}

fn raw_message(segment: &TcpSegment) -> RawMessage {
    RawMessage {
        src: segment.src.clone(),
        dst: segment.dst.clone(),
        data: segment.payload.clone(),
        start_ts: segment.capture_ts,
        end_ts: segment.capture_ts,
    }
}

/// Reassemble a complete segment sequence in one call.
pub fn reassemble(segments: impl IntoIterator<Item = TcpSegment>) -> impl Iterator<Item = TcpStream> {
    let mut reassembler = StreamReassembler::new();
    for segment in segments {
        reassembler.ingest(segment);
    }
    reassembler.finish()
}
