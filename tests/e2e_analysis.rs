// AutoGrep - tests/e2e_analysis.rs
//
// End-to-end tests for the full archive pipeline: real archives built
// with the same tar/flate2/zip crates the engine consumes, real
// extraction into a temp root, real pattern matching and aggregation —
// no mocks, no stubs.

use autogrep::{analyze, analyze_streaming, Options, ScanEvent};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

// =============================================================================
// Helpers
// =============================================================================

fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).unwrap();
    }
    builder.into_inner().unwrap()
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(bytes).unwrap();
    gz.finish().unwrap()
}

/// Write a .tar.gz archive of (path, text) entries into `dir`.
fn make_archive(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
    let byte_entries: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(p, c)| (*p, c.as_bytes()))
        .collect();
    let archive = dir.join("sos.tar.gz");
    fs::write(&archive, gzip(&tar_bytes(&byte_entries))).unwrap();
    archive
}

fn collect_matches(archive: &Path, options: &Options) -> Vec<autogrep::Match> {
    let mut matches = Vec::new();
    analyze_streaming(archive, options, |ev| {
        if let ScanEvent::Match { data } = ev {
            matches.push((**data).clone());
        }
    })
    .unwrap();
    matches
}

// =============================================================================
// Scenario 1: Praefect connection refused
// =============================================================================

#[test]
fn e2e_praefect_connection_refused() {
    let dir = tempfile::tempdir().unwrap();
    let archive = make_archive(
        dir.path(),
        &[(
            "gitaly/current",
            "2024-01-01T00:00:00Z ERROR dialing failed: rpc error: \
             code = Unavailable desc = connection refused\n",
        )],
    );

    let matches = collect_matches(&archive, &Options::default());
    assert_eq!(matches.len(), 1, "exactly one match");
    let m = &matches[0];
    assert!(
        ["grpc_unavail", "pg_conn_refused", "pf_dial_refused"].contains(&m.pattern_id),
        "deterministic winner, got {}",
        m.pattern_id
    );
    assert_eq!(m.component.label(), "Praefect/Gitaly");
    assert_eq!(m.severity.label(), "ERROR");
    assert!(m.clean_message.contains("connection refused"));
    assert_eq!(m.line_number, 1);
    assert_eq!(m.file_path, "gitaly/current");
}

// =============================================================================
// Scenario 2: Python traceback grouping
// =============================================================================

#[test]
fn e2e_python_traceback_grouping() {
    let traceback_one = "Traceback (most recent call last):\n\
        \x20 File \"app/jobs/sync.py\", line 118, in perform\n\
        \x20   self.resolve(ref)\n\
        \x20 File \"app/jobs/sync.py\", line 87, in resolve\n\
        \x20   raise ValueError(\"bad input\")\n\
        ValueError: bad input\n";
    let mut infos = String::new();
    for i in 0..20 {
        infos.push_str(&format!(
            "2024-01-01T00:10:{i:02}Z INFO request served in {i}ms\n"
        ));
    }
    let traceback_two = "Traceback (most recent call last):\n\
        \x20 File \"app/jobs/sync.py\", line 118, in perform\n\
        \x20   self.resolve(ref)\n\
        \x20 File \"app/jobs/sync.py\", line 87, in resolve\n\
        \x20   raise ValueError(\"bad input\")\n\
        ValueError: bad input 3fa85f64-5717-4562-b3fc-2c963f66afa6\n";

    let content = format!("{traceback_one}{infos}{traceback_two}");
    let dir = tempfile::tempdir().unwrap();
    let archive = make_archive(dir.path(), &[("rails/production.log", &content)]);

    let report = analyze(&archive, &Options::default()).unwrap();
    assert_eq!(report.summary.errors_found, 2, "both tracebacks match");
    assert_eq!(report.groups.len(), 1, "identical signature groups them");
    let group = &report.groups[0];
    assert_eq!(group.count, 2);
    assert!(group.has_stack_trace);
    let stack = group.sample_matches[0]
        .stack_trace
        .as_ref()
        .expect("first sample carries the stack");
    assert!(stack.len() >= 5, "got {} frames", stack.len());
}

// =============================================================================
// Scenario 3: JSON Sidekiq failure vs worker-class false positive
// =============================================================================

#[test]
fn e2e_sidekiq_failure_vs_worker_class() {
    let content = concat!(
        r#"{"severity":"ERROR","class":"Geo::EventWorker","exception.class":"StandardError","exception.message":"boom"}"#,
        "\n",
        r#"{"severity":"INFO","class":"Geo::VerificationTimeoutWorker","jid":"abc"}"#,
        "\n",
    );
    let dir = tempfile::tempdir().unwrap();
    let archive = make_archive(dir.path(), &[("sidekiq/current", content)]);

    let matches = collect_matches(&archive, &Options::default());
    assert_eq!(matches.len(), 1, "the worker-class INFO line is rejected");
    assert_eq!(matches[0].clean_message, "boom");
    assert_eq!(matches[0].line_number, 1);
}

// =============================================================================
// Scenario 4: correlation enrichment across files
// =============================================================================

#[test]
fn e2e_correlation_enrichment() {
    let dir = tempfile::tempdir().unwrap();
    let archive = make_archive(
        dir.path(),
        &[
            (
                "gitaly/current",
                "2024-01-01T00:00:00Z ERROR dialing failed: connection refused \
                 correlation_id=7af0e2c1b4d3\n",
            ),
            (
                "workhorse/current",
                "request forwarded upstream correlation_id=7af0e2c1b4d3 status ok\n",
            ),
        ],
    );

    let matches = collect_matches(&archive, &Options::default());
    let m = matches
        .iter()
        .find(|m| m.file_path == "gitaly/current")
        .expect("the gitaly line matches");
    assert_eq!(m.correlation_id.as_deref(), Some("7af0e2c1b4d3"));
    let related = m
        .json_fields
        .as_ref()
        .and_then(|f| f.get("related_entries_count"))
        .and_then(|v| v.as_u64());
    assert_eq!(related, Some(2), "the id appears in both files");
}

// =============================================================================
// Scenario 5: schema-file suppression
// =============================================================================

#[test]
fn e2e_schema_file_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    let archive = make_archive(
        dir.path(),
        &[(
            "db/schema.rb",
            "t.integer :timeout, default: 60, null: false\n\
             t.index [:project_id], name: \"index_failed_builds\", where: \"failed\"\n",
        )],
    );

    let report = analyze(&archive, &Options::default()).unwrap();
    assert!(report.summary.files_processed > 0);
    assert_eq!(report.summary.errors_found, 0);
    assert!(report.groups.is_empty());
}

// =============================================================================
// Scenario 6: nested archive
// =============================================================================

#[test]
fn e2e_nested_archive_paths_relative_to_outer_root() {
    let inner = gzip(&tar_bytes(&[(
        "gitaly/current",
        b"2024-01-01T00:00:00Z ERROR dialing failed: connection refused\n" as &[u8],
    )]));
    let outer = tar_bytes(&[("logs.tar.gz", inner.as_slice())]);

    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("sos.tar");
    fs::write(&archive, outer).unwrap();

    let matches = collect_matches(&archive, &Options::default());
    assert_eq!(matches.len(), 1);
    assert_eq!(
        matches[0].file_path, "logs/gitaly/current",
        "path is relative to the outer extraction root"
    );
}

// =============================================================================
// Boundary behaviors
// =============================================================================

#[test]
fn e2e_empty_archive_emits_single_done() {
    let dir = tempfile::tempdir().unwrap();
    let archive = make_archive(dir.path(), &[]);

    let mut dones = 0;
    let report = analyze_streaming(&archive, &Options::default(), |ev| {
        if matches!(ev, ScanEvent::Done { .. }) {
            dones += 1;
        }
    })
    .unwrap();
    assert_eq!(dones, 1);
    assert_eq!(report.summary.files_processed, 0);
    assert_eq!(report.summary.lines_processed, 0);
    assert_eq!(report.summary.errors_found, 0);
}

#[test]
fn e2e_zip_archive_supported() {
    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let opts = zip::write::SimpleFileOptions::default();
        writer.start_file("postgresql/current", opts).unwrap();
        writer
            .write_all(b"PG::ConnectionBad: could not connect to server\n")
            .unwrap();
        writer.finish().unwrap();
    }
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("sos.zip");
    fs::write(&archive, buf).unwrap();

    let report = analyze(&archive, &Options::default()).unwrap();
    assert_eq!(report.summary.errors_found, 1);
}

#[test]
fn e2e_gzipped_member_scanned_by_streaming() {
    // A .gz member larger than the mmap threshold must go through
    // streaming decompression, never mmap.
    let line = "2024-01-01T00:00:00Z ERROR dialing failed: connection refused\n";
    let dir = tempfile::tempdir().unwrap();
    let member = gzip(line.as_bytes());
    let archive = dir.path().join("sos.tar");
    fs::write(
        &archive,
        tar_bytes(&[("gitaly/current.gz", member.as_slice())]),
    )
    .unwrap();

    let options = Options {
        // Absurdly low threshold: any non-gz file this size would mmap.
        mmap_threshold_bytes: 1,
        ..Options::default()
    };
    let matches = collect_matches(&archive, &options);
    assert_eq!(matches.len(), 1);
    assert_eq!(
        matches[0].line_number, 1,
        "streaming path keeps exact line numbers"
    );
}

#[test]
fn e2e_file_without_trailing_newline() {
    let dir = tempfile::tempdir().unwrap();
    let archive = make_archive(
        dir.path(),
        &[(
            "postgresql/current",
            "PG::ConnectionBad: could not connect to server",
        )],
    );

    let report = analyze(&archive, &Options::default()).unwrap();
    assert_eq!(report.summary.errors_found, 1, "last line is still scanned");
}

// =============================================================================
// Stream and report invariants
// =============================================================================

#[test]
fn e2e_signatures_are_16_hex_and_stable_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let archive = make_archive(
        dir.path(),
        &[
            (
                "gitaly/current",
                "2024-01-01T00:00:00Z ERROR dialing failed: connection refused\n",
            ),
            (
                "postgresql/current",
                "PG::ConnectionBad: could not connect to server\n",
            ),
        ],
    );

    let a = analyze(&archive, &Options::default()).unwrap();
    let b = analyze(&archive, &Options::default()).unwrap();

    for group in &a.groups {
        assert_eq!(group.signature.len(), 16);
        assert!(group
            .signature
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    let sigs_a: Vec<(&str, u64)> = a.groups.iter().map(|g| (g.signature.as_str(), g.count)).collect();
    let sigs_b: Vec<(&str, u64)> = b.groups.iter().map(|g| (g.signature.as_str(), g.count)).collect();
    assert_eq!(sigs_a, sigs_b);
    assert_eq!(
        a.summary.errors_found,
        a.groups.iter().map(|g| g.count).sum::<u64>(),
        "errors_found equals the sum of group counts"
    );
}

#[test]
fn e2e_match_event_json_shape() {
    let dir = tempfile::tempdir().unwrap();
    let archive = make_archive(
        dir.path(),
        &[(
            "gitaly/current",
            "2024-01-01T00:00:00Z ERROR dialing failed: connection refused\n",
        )],
    );

    let mut match_json = None;
    analyze_streaming(&archive, &Options::default(), |ev| {
        if matches!(ev, ScanEvent::Match { .. }) {
            match_json = Some(serde_json::to_value(ev).unwrap());
        }
    })
    .unwrap();

    let value = match_json.expect("one match event");
    assert_eq!(value["type"], "match");
    let data = &value["data"];
    assert_eq!(data["file_path"], "gitaly/current");
    assert_eq!(data["line_number"], 1);
    assert_eq!(data["severity"], "ERROR");
    assert_eq!(data["component"], "Praefect/Gitaly");
    // Absent optional fields are omitted, not null.
    assert!(data.get("stack_trace").is_none());
    assert!(data.get("user_id").is_none());
    // Timestamp is ISO-8601 without timezone.
    assert_eq!(data["timestamp"], "2024-01-01T00:00:00");
}

#[test]
fn e2e_matches_within_file_in_line_order() {
    let dir = tempfile::tempdir().unwrap();
    let archive = make_archive(
        dir.path(),
        &[(
            "postgresql/current",
            "PG::ConnectionBad: could not connect to server\n\
             an uninteresting informative middle line\n\
             FATAL:  password authentication failed for user \"gitlab\"\n\
             another quiet middle line of ordinary text\n\
             PG::UnableToSend: no connection to the server\n",
        )],
    );

    let matches = collect_matches(&archive, &Options::default());
    assert!(matches.len() >= 2);
    let numbers: Vec<u64> = matches.iter().map(|m| m.line_number).collect();
    let mut sorted = numbers.clone();
    sorted.sort_unstable();
    assert_eq!(numbers, sorted);
}
