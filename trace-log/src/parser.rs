use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{trace, warn};

use crate::error::LogError;
use crate::line::{parse_line, LogLine, Payload};
use crate::server::LogFile;

const SERVER_START_ID: i64 = 4615611;
const CLIENT_METADATA_ID: i64 = 51800;

/// The full result of parsing a log file: the identity indices, plus every
/// successfully-shaped structured line for optional downstream inspection.
pub struct ParsedLog {
    pub log_file: LogFile,
    pub lines: Vec<(usize, LogLine)>,
}

pub fn parse_log_file(path: impl AsRef<Path>) -> Result<ParsedLog, LogError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(parse_log(BufReader::new(file), path))
}

/// Parse an already-open reader. Individual line failures are logged and
/// skipped (§4.3, §7); there is no failure mode here beyond the read
/// itself raising an I/O error, which bubbles up via the `Result` the
/// caller's `BufRead` impl produces per line.
pub fn parse_log(reader: impl BufRead, source_name: &Path) -> ParsedLog {
    let mut log_file = LogFile::new();
    let mut lines = Vec::new();

    for (lineno, raw_line) in reader.lines().enumerate() {
        let lineno = lineno + 1;
        let raw_line = match raw_line {
            Ok(line) => line,
            Err(err) => {
                warn!(
                    "{}:{lineno}: could not read line: {err}",
                    source_name.display()
                );
                continue;
            }
        };

        let parsed = parse_line(&raw_line);

        if let LogLine::JsTest {
            ref host_id,
            ref payload,
            ..
        } = parsed
        {
            if let Payload::Json(value) = payload {
                apply_record(&mut log_file, host_id.port, value, lineno, source_name);
            }
            lines.push((lineno, parsed));
        }
    }

    ParsedLog { log_file, lines }
}

fn apply_record(
    log_file: &mut LogFile,
    line_host_port: u16,
    value: &serde_json::Value,
    lineno: usize,
    source_name: &Path,
) {
    let Some(id) = value.get("id").and_then(serde_json::Value::as_i64) else {
        return;
    };

    match id {
        SERVER_START_ID => {
            let pid = value.pointer("/attr/pid").and_then(serde_json::Value::as_i64);
            let port = value
                .pointer("/attr/port")
                .and_then(serde_json::Value::as_u64)
                .and_then(|p| u16::try_from(p).ok());

            match (pid, port) {
                (Some(pid), Some(port)) => log_file.install_server(pid, port),
                _ => warn!(
                    "{}:{lineno}: id {SERVER_START_ID} missing attr.pid/attr.port",
                    source_name.display()
                ),
            }
        }
        CLIENT_METADATA_ID => {
            let connection_id = value.get("ctx").and_then(serde_json::Value::as_str);
            let remote_pid = value
                .pointer("/attr/doc/application/pid")
                .and_then(serde_json::Value::as_i64);

            match (connection_id, remote_pid) {
                (Some(connection_id), Some(remote_pid)) => {
                    log_file.record_connection(line_host_port, connection_id.to_string(), remote_pid);
                }
                _ => trace!(
                    "{}:{lineno}: id {CLIENT_METADATA_ID} missing ctx/attr.doc.application.pid",
                    source_name.display()
                ),
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> ParsedLog {
        parse_log(Cursor::new(text.as_bytes()), Path::new("test.log"))
    }

    #[test]
    fn server_start_installs_a_server() {
        let log = parse(
            r#"[js_test:t] 2020-07-19T12:34:56.789+0000 d20020|{"id":4615611,"attr":{"pid":1000,"port":20020}}"#,
        );
        assert_eq!(log.log_file.port_to_server[&20020].borrow().pid, 1000);
        assert_eq!(log.lines.len(), 1);
    }

    #[test]
    fn handshake_records_connection_on_owning_server() {
        let text = "\
[js_test:t] 2020-07-19T12:34:56.789+0000 d20020|{\"id\":4615611,\"attr\":{\"pid\":1000,\"port\":20020}}
[js_test:t] 2020-07-19T12:34:56.900+0000 d20021|{\"id\":4615611,\"attr\":{\"pid\":1001,\"port\":20021}}
[js_test:t] 2020-07-19T12:34:57.000+0000 d20020|{\"id\":51800,\"ctx\":\"conn7\",\"attr\":{\"doc\":{\"application\":{\"pid\":1001}}}}
";
        let log = parse(text);
        assert_eq!(
            log.log_file.port_to_server[&20020].borrow().connections["conn7"],
            20021
        );
    }

    #[test]
    fn unrelated_lines_and_bad_json_are_skipped_without_aborting() {
        let text = "\
not a structured line at all
[js_test:t] 2020-07-19T12:34:56.789+0000 d20020|{\"id\":4615611,\"attr\":{\"pid\":1000,\"port\":20020}}
[js_test:t] 2020-07-19T12:34:57.000+0000 d20020|{truncated
";
        let log = parse(text);
        assert_eq!(log.log_file.port_to_server.len(), 1);
        // Only the two js_test-shaped lines are retained (one JSON, one text fallback).
        assert_eq!(log.lines.len(), 2);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let log = parse(
            r#"[js_test:t] 2020-07-19T12:34:56.789+0000 d20020|{"id":999,"attr":{}}"#,
        );
        assert!(log.log_file.port_to_server.is_empty());
        assert_eq!(log.lines.len(), 1);
    }
}
