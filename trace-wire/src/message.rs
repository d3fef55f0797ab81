use bson::Document;
use chrono::{DateTime, Utc};

use crate::document::SafeGet;

/// One unidirectional application-layer byte sequence reconstructed from
/// one or more TCP segments (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub src: String,
    pub dst: String,
    pub data: Vec<u8>,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
}

/// Total order across pcaps: `(start_ts, clusterTime.time, clusterTime.inc)`.
pub type SortKey = (DateTime<Utc>, u32, u32);

/// One decoded application-layer message (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct MongoMessage {
    pub src: u16,
    pub dst: u16,
    /// The full `"ip:port"` the message arrived from, kept alongside the
    /// port-only `src` because handshake learning keys on the endpoint,
    /// not just the port (two hosts can share a port number).
    pub src_endpoint: String,
    pub request_id: i32,
    pub response_to: i32,
    pub body: Document,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub requester_pid: Option<i64>,
}

impl MongoMessage {
    /// The first requestId and responseTo are 0; `ok` distinguishes a
    /// genuine request from the very first reply on a connection.
    pub fn is_request(&self) -> bool {
        self.response_to == 0 && !self.body.contains_key("ok")
    }

    pub fn command_name(&self) -> Option<&str> {
        if !self.is_request() {
            return None;
        }

        self.body.keys().next().map(String::as_str)
    }

    pub fn safe_get(&self, path: &str) -> Option<&bson::Bson> {
        self.body.safe_get(path)
    }

    pub fn sort_key(&self) -> SortKey {
        let cluster_time = self
            .body
            .get_document("$clusterTime")
            .ok()
            .and_then(|ct| ct.get_timestamp("clusterTime").ok());

        match cluster_time {
            Some(ts) => (self.start_ts, ts.time, ts.increment),
            None => (self.start_ts, 0, 0),
        }
    }
}

/// Split the final colon-separated field of an `"ip:port"` endpoint.
pub fn port_of(endpoint: &str) -> Option<u16> {
    endpoint.rsplit(':').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, Timestamp};

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn message(body: Document, response_to: i32) -> MongoMessage {
        MongoMessage {
            src: 1,
            dst: 2,
            src_endpoint: "10.0.0.1:1".to_string(),
            request_id: 7,
            response_to,
            body,
            start_ts: ts(100),
            end_ts: ts(100),
            requester_pid: None,
        }
    }

    #[test]
    fn request_without_ok_is_a_request() {
        let m = message(doc! { "ping": 1 }, 0);
        assert!(m.is_request());
        assert_eq!(m.command_name(), Some("ping"));
    }

    #[test]
    fn reply_carrying_ok_is_not_a_request() {
        let m = message(doc! { "ok": 1.0 }, 7);
        assert!(!m.is_request());
        assert_eq!(m.command_name(), None);
    }

    #[test]
    fn first_reply_with_response_to_zero_but_ok_is_not_a_request() {
        let m = message(doc! { "ok": 1.0 }, 0);
        assert!(!m.is_request());
    }

    #[test]
    fn sort_key_falls_back_to_zeros_without_cluster_time() {
        let m = message(doc! { "ping": 1 }, 0);
        assert_eq!(m.sort_key(), (ts(100), 0, 0));
    }

    #[test]
    fn sort_key_uses_cluster_time_when_present() {
        let body = doc! {
            "ping": 1,
            "$clusterTime": { "clusterTime": Timestamp { time: 42, increment: 3 } },
        };
        let m = message(body, 0);
        assert_eq!(m.sort_key(), (ts(100), 42, 3));
    }

    #[test]
    fn port_of_parses_trailing_port() {
        assert_eq!(port_of("10.0.0.1:54321"), Some(54321));
        assert_eq!(port_of("garbage"), None);
    }
}
