//! Clock Synthesizer (§4.5): walks the classified message stream and
//! emits a send/receive `ShivizEvent` pair per message, each carrying a
//! snapshot of a per-port vector clock.

use std::collections::BTreeMap;

use trace_log::LogFile;
use trace_wire::MongoMessage;

/// Port (as string) -> monotonically non-decreasing counter.
pub type VectorClock = BTreeMap<String, i64>;

#[derive(Debug, Clone, PartialEq)]
pub struct ShivizEvent {
    pub description: String,
    pub host: String,
    pub clock: VectorClock,
}

pub struct ClockSynthesizer {
    clock: VectorClock,
}

impl ClockSynthesizer {
    pub fn new(log_file: &LogFile) -> Self {
        let clock = log_file.server_ports().map(|port| (port.to_string(), 0)).collect();
        Self { clock }
    }

    /// Emit the send/receive pair for one classified message, or `None` if
    /// either endpoint can't be resolved to a known server (should not
    /// happen for a message that survived the Traffic Classifier, but is
    /// handled defensively rather than panicking).
    pub fn observe(&mut self, log_file: &LogFile, message: &MongoMessage) -> Option<[ShivizEvent; 2]> {
        let (source_port, dest_port) = if message.is_request() {
            let source = message.requester_pid.and_then(|pid| log_file.pid_to_server.get(&pid))?;
            let dest = log_file.port_to_server.get(&message.dst)?;
            (source.borrow().port, dest.borrow().port)
        } else {
            let source = log_file.port_to_server.get(&message.src)?;
            let dest = message.requester_pid.and_then(|pid| log_file.pid_to_server.get(&pid))?;
            (source.borrow().port, dest.borrow().port)
        };

        let send = self.bump_and_snapshot(source_port, send_description(message));
        let receive = self.bump_and_snapshot(dest_port, receive_description(message));

        Some([send, receive])
    }

    fn bump_and_snapshot(&mut self, port: u16, description: String) -> ShivizEvent {
        let host = port.to_string();
        *self.clock.entry(host.clone()).or_insert(0) += 1;
        ShivizEvent {
            description,
            host,
            clock: self.clock.clone(),
        }
    }
}

fn send_description(message: &MongoMessage) -> String {
    let body = serde_json::to_string(&message.body).unwrap_or_default();
    if message.is_request() {
        format!("request id:{} {body}", message.request_id)
    } else {
        format!(
            "reply id:{} response_to:{} {body}",
            message.request_id, message.response_to
        )
    }
}

fn receive_description(message: &MongoMessage) -> String {
    let direction = if message.is_request() { "request" } else { "reply" };
    format!("receive {direction} {}", message.request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use chrono::{DateTime, Utc};

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    fn log_file_with_two_servers() -> LogFile {
        let mut log_file = LogFile::new();
        log_file.install_server(100, 20020);
        log_file.install_server(200, 20021);
        log_file
    }

    fn request(requester_pid: i64, dst: u16) -> MongoMessage {
        MongoMessage {
            src: 1,
            dst,
            src_endpoint: "10.0.0.1:1".to_string(),
            request_id: 5,
            response_to: 0,
            body: doc! { "ping": 1 },
            start_ts: ts(),
            end_ts: ts(),
            requester_pid: Some(requester_pid),
        }
    }

    #[test]
    fn clock_starts_at_zero_for_every_known_server_port() {
        let log_file = log_file_with_two_servers();
        let synth = ClockSynthesizer::new(&log_file);
        assert_eq!(synth.clock.get("20020"), Some(&0));
        assert_eq!(synth.clock.get("20021"), Some(&0));
    }

    #[test]
    fn request_increments_source_then_destination() {
        let log_file = log_file_with_two_servers();
        let mut synth = ClockSynthesizer::new(&log_file);

        let message = request(100, 20021);
        let [send, receive] = synth.observe(&log_file, &message).unwrap();

        assert_eq!(send.host, "20020");
        assert_eq!(send.clock["20020"], 1);
        assert_eq!(send.clock["20021"], 0);

        assert_eq!(receive.host, "20021");
        assert_eq!(receive.clock["20021"], 1);
        assert_eq!(receive.clock["20020"], 1);
    }

    #[test]
    fn snapshots_are_independent_of_later_mutation() {
        let log_file = log_file_with_two_servers();
        let mut synth = ClockSynthesizer::new(&log_file);

        let [send, _] = synth.observe(&log_file, &request(100, 20021)).unwrap();
        let snapshot_before = send.clock.clone();

        synth.observe(&log_file, &request(100, 20021));
        assert_eq!(send.clock, snapshot_before);
    }

    #[test]
    fn unresolvable_endpoint_yields_none() {
        let log_file = log_file_with_two_servers();
        let mut synth = ClockSynthesizer::new(&log_file);
        let message = request(999, 20021);
        assert!(synth.observe(&log_file, &message).is_none());
    }

    #[test]
    fn receive_description_has_no_id_prefix() {
        let log_file = log_file_with_two_servers();
        let mut synth = ClockSynthesizer::new(&log_file);

        let mut message = request(100, 20021);
        message.request_id = 7;
        let [_, receive] = synth.observe(&log_file, &message).unwrap();
        assert_eq!(receive.description, "receive request 7");

        let mut reply = request(100, 20021);
        reply.src = 20021;
        reply.request_id = 42;
        reply.response_to = 7;
        reply.body = doc! { "ok": 1.0 };
        let [_, receive] = synth.observe(&log_file, &reply).unwrap();
        assert_eq!(receive.description, "receive reply 42");
    }
}
