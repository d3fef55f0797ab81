use assert_cmd::Command;
use predicates::str::contains;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn rejects_a_run_with_no_log_file() {
    let mut pcap = NamedTempFile::with_suffix(".pcap").unwrap();
    pcap.write_all(b"").unwrap();

    Command::cargo_bin("mongo-trace")
        .unwrap()
        .arg(pcap.path())
        .assert()
        .failure()
        .stderr(contains("expected exactly one .log file"));
}

#[test]
fn rejects_a_file_with_an_unrecognized_extension() {
    let mut bogus = NamedTempFile::with_suffix(".bin").unwrap();
    bogus.write_all(b"").unwrap();

    Command::cargo_bin("mongo-trace")
        .unwrap()
        .arg(bogus.path())
        .assert()
        .failure()
        .stderr(contains("expected a .pcap or .log file"));
}

#[test]
fn an_empty_log_with_no_pcaps_produces_just_the_header() {
    let mut log = NamedTempFile::with_suffix(".log").unwrap();
    log.write_all(b"").unwrap();

    Command::cargo_bin("mongo-trace")
        .unwrap()
        .arg(log.path())
        .assert()
        .success()
        .stdout(contains("(?<host>"));
}
