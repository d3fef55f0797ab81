//! Traffic Classifier (§4.4): merges the per-pcap `MongoMessage` streams
//! into one total order, then keeps only intra-cluster traffic, tagging
//! every surviving message with the pid of the server that sent it.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tracing::info;
use trace_wire::{MongoMessage, SortKey};

/// Merge several already-ordered `MongoMessage` iterators into one, ordered
/// by `sort_key` (§9: a `BinaryHeap` K-way merge; ties broken by pop order).
pub fn merge_by_sort_key<'a, I>(sources: Vec<I>) -> impl Iterator<Item = MongoMessage> + 'a
where
    I: Iterator<Item = MongoMessage> + 'a,
{
    KWayMerge::new(sources)
}

struct HeapEntry {
    key: SortKey,
    source: usize,
    message: MongoMessage,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: `BinaryHeap` is a max-heap, and we want the smallest
        // `sort_key` out first.
        other.key.cmp(&self.key)
    }
}

struct KWayMerge<I> {
    sources: Vec<I>,
    heap: BinaryHeap<HeapEntry>,
}

impl<I: Iterator<Item = MongoMessage>> KWayMerge<I> {
    fn new(mut sources: Vec<I>) -> Self {
        let mut heap = BinaryHeap::new();
        for (index, source) in sources.iter_mut().enumerate() {
            if let Some(message) = source.next() {
                heap.push(HeapEntry {
                    key: message.sort_key(),
                    source: index,
                    message,
                });
            }
        }
        Self { sources, heap }
    }
}

impl<I: Iterator<Item = MongoMessage>> Iterator for KWayMerge<I> {
    type Item = MongoMessage;

    fn next(&mut self) -> Option<MongoMessage> {
        let entry = self.heap.pop()?;
        if let Some(next_message) = self.sources[entry.source].next() {
            self.heap.push(HeapEntry {
                key: next_message.sort_key(),
                source: entry.source,
                message: next_message,
            });
        }
        Some(entry.message)
    }
}

/// Filters an ordered `MongoMessage` sequence down to intra-cluster traffic,
/// resolving each survivor's `requester_pid` via request/reply correlation.
pub struct Classifier<I> {
    upstream: I,
    known_clients: HashMap<String, (i64, String)>,
    pending_requests: HashMap<i32, MongoMessage>,
    logged_unmatched: bool,
}

impl<I> Classifier<I> {
    pub fn new(upstream: I) -> Self {
        Self {
            upstream,
            known_clients: HashMap::new(),
            pending_requests: HashMap::new(),
            logged_unmatched: false,
        }
    }

    fn learn_handshake(&mut self, message: &MongoMessage) {
        let Some(name) = message
            .safe_get("client.application.name")
            .and_then(|v| v.as_str())
        else {
            return;
        };
        if !(name.ends_with("mongod") || name.ends_with("mongos")) {
            return;
        }
        let Some(pid) = message
            .safe_get("client.application.pid")
            .and_then(bson_as_i64)
        else {
            return;
        };

        self.known_clients
            .insert(message.src_endpoint.clone(), (pid, name.to_string()));
    }
}

fn bson_as_i64(value: &bson::Bson) -> Option<i64> {
    value.as_i64().or_else(|| value.as_i32().map(i64::from))
}

impl<I: Iterator<Item = MongoMessage>> Iterator for Classifier<I> {
    type Item = MongoMessage;

    fn next(&mut self) -> Option<MongoMessage> {
        loop {
            let mut message = match self.upstream.next() {
                Some(message) => message,
                None => {
                    if !self.logged_unmatched && !self.pending_requests.is_empty() {
                        info!(
                            "{} request(s) never received a matching reply",
                            self.pending_requests.len()
                        );
                    }
                    self.logged_unmatched = true;
                    return None;
                }
            };

            if message.is_request() {
                self.learn_handshake(&message);

                let Some((pid, _)) = self.known_clients.get(&message.src_endpoint).cloned() else {
                    continue;
                };
                message.requester_pid = Some(pid);
                self.pending_requests
                    .insert(message.request_id, message.clone());
                return Some(message);
            }

            let Some(request) = self.pending_requests.remove(&message.response_to) else {
                continue;
            };
            message.requester_pid = request.requester_pid;
            return Some(message);
        }
    }
}
