//! Hand-written scanner for one log line's shape (§4.3, §9 design notes:
//! the grammar is small and line-oriented, so a scanner beats a real
//! parser-generator dependency here).

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

/// `{d, s, m}` followed by the listening port of the process that wrote
/// this log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostId {
    pub kind: char,
    pub port: u16,
}

/// The payload of a `JsTest` line: JSON is attempted first, text is the
/// fallback (§4.3).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

/// One line of the log, tagged by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum LogLine {
    JsTest {
        test_name: String,
        timestamp: DateTime<FixedOffset>,
        host_id: HostId,
        payload: Payload,
    },
    Other(String),
}

/// Parse one line. Never fails — a line that doesn't match the `js_test`
/// shape is simply `LogLine::Other`.
pub fn parse_line(line: &str) -> LogLine {
    parse_js_test_line(line).unwrap_or_else(|| LogLine::Other(line.to_string()))
}

fn parse_js_test_line(line: &str) -> Option<LogLine> {
    let rest = line.strip_prefix("[js_test:")?;
    let (test_name, rest) = rest.split_once("] ")?;
    let (timestamp_str, rest) = rest.split_once(' ')?;
    let timestamp =
        DateTime::parse_from_str(timestamp_str, "%Y-%m-%dT%H:%M:%S%.3f%z").ok()?;

    let (host_id, payload_text) = parse_host_id(rest)?;
    let payload_text = payload_text.trim_start();

    let payload = if payload_text.starts_with('{') {
        match serde_json::from_str::<Value>(payload_text) {
            Ok(value @ Value::Object(_)) => Payload::Json(value),
            _ => Payload::Text(payload_text.to_string()),
        }
    } else {
        Payload::Text(payload_text.to_string())
    };

    Some(LogLine::JsTest {
        test_name: test_name.to_string(),
        timestamp,
        host_id,
        payload,
    })
}

/// Parse a `(d|s|m)<port>|` prefix, returning the id and whatever follows.
fn parse_host_id(s: &str) -> Option<(HostId, &str)> {
    let mut chars = s.char_indices();
    let (_, kind) = chars.next()?;
    if !matches!(kind, 'd' | 's' | 'm') {
        return None;
    }

    let digits_start = kind.len_utf8();
    let mut digits_end = digits_start;
    for (idx, c) in chars.by_ref() {
        if c.is_ascii_digit() {
            digits_end = idx + c.len_utf8();
        } else {
            break;
        }
    }

    if digits_end == digits_start {
        return None;
    }

    let port: u16 = s[digits_start..digits_end].parse().ok()?;
    let after_digits = &s[digits_end..];
    let rest = after_digits.strip_prefix('|')?;

    Some((HostId { kind, port }, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_structured_json_line() {
        let line = r#"[js_test:replset1] 2020-07-19T12:34:56.789+0000 d20020|{"id":4615611,"attr":{"pid":1000,"port":20020}}"#;
        let parsed = parse_line(line);

        match parsed {
            LogLine::JsTest {
                host_id, payload, ..
            } => {
                assert_eq!(host_id, HostId { kind: 'd', port: 20020 });
                match payload {
                    Payload::Json(value) => assert_eq!(value["id"], 4615611),
                    Payload::Text(_) => panic!("expected json"),
                }
            }
            LogLine::Other(_) => panic!("expected js_test line"),
        }
    }

    #[test]
    fn truncated_json_falls_back_to_text_without_aborting() {
        let line = r#"[js_test:replset1] 2020-07-19T12:34:56.789+0000 d20020|{"id":4615611, "attr":"#;
        let parsed = parse_line(line);

        match parsed {
            LogLine::JsTest { payload, .. } => {
                assert!(matches!(payload, Payload::Text(_)));
            }
            LogLine::Other(_) => panic!("expected js_test line, shape still matches"),
        }
    }

    #[test]
    fn non_matching_line_is_other() {
        assert_eq!(
            parse_line("some completely unrelated line"),
            LogLine::Other("some completely unrelated line".to_string())
        );
    }

    #[test]
    fn text_payload_is_kept_raw() {
        let line = "[js_test:replset1] 2020-07-19T12:34:56.789+0000 s20021|plain text message";
        match parse_line(line) {
            LogLine::JsTest { payload, .. } => {
                assert_eq!(payload, Payload::Text("plain text message".to_string()));
            }
            LogLine::Other(_) => panic!("expected js_test line"),
        }
    }
}
