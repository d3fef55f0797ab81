//! Output (§4.7, §6): serializes `ShivizEvent`s to the ShiViz input file
//! format — a capture-regex header line, a blank delimiter, then two lines
//! per event.

use std::io::{self, Write};

use crate::clock::ShivizEvent;

const HEADER: &str = r#"(?<host>\S*) (?<clock>\{.*\})\n(?<event>.*)"#;

pub fn write_events(mut sink: impl Write, events: impl IntoIterator<Item = ShivizEvent>) -> io::Result<()> {
    writeln!(sink, "{HEADER}")?;
    writeln!(sink)?;

    for event in events {
        let clock_json = serde_json::to_string(&event.clock).unwrap_or_else(|_| "{}".to_string());
        writeln!(sink, "{} {clock_json}", event.host)?;
        writeln!(sink, "{}", event.description)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VectorClock;

    #[test]
    fn writes_header_blank_line_then_host_clock_description_pairs() {
        let mut clock = VectorClock::new();
        clock.insert("20020".to_string(), 1);
        clock.insert("20021".to_string(), 0);

        let events = vec![ShivizEvent {
            description: "request id:5 {}".to_string(),
            host: "20020".to_string(),
            clock,
        }];

        let mut buf = Vec::new();
        write_events(&mut buf, events).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(HEADER));
        assert_eq!(lines.next(), Some(""));
        assert_eq!(lines.next(), Some(r#"20020 {"20020":1,"20021":0}"#));
        assert_eq!(lines.next(), Some("request id:5 {}"));
    }
}
