// AutoGrep - engine/orchestrator.rs
//
// Run lifecycle: extract the archive, build the correlation index in a
// single-threaded prescan, fan the scannable files across a worker
// pool, pump events through a bounded MPSC queue into the caller's
// sink, and fold the match stream into the final report.
//
// Concurrency contract: the pattern bank, false-positive filter, and
// frozen correlation index are immutable shared state; each worker owns
// its scanner; one consumer (this thread) owns the aggregator and the
// sink. Workers block when the event queue is full.

use crate::core::aggregate::Aggregator;
use crate::core::correlation::CorrelationIndexer;
use crate::core::filter::FalsePositiveFilter;
use crate::core::model::{Options, Report, ScanEvent, Summary};
use crate::core::patterns::PatternBank;
use crate::core::scanner::{prescan_correlation, FileScanner};
use crate::engine::extract;
use crate::util::constants;
use crate::util::error::{EngineError, Result};
use crossbeam_channel::bounded;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Analyze an archive and return the final report. Blocks until the
/// run finishes.
pub fn analyze(archive: &Path, options: &Options) -> Result<Report> {
    analyze_streaming(archive, options, |_| {})
}

/// Analyze an archive, forwarding every event to `sink` as it is
/// produced. The stream always ends with exactly one `done` event on
/// success; on a fatal error one `error` event is emitted and the
/// error is returned.
pub fn analyze_streaming<F>(archive: &Path, options: &Options, mut sink: F) -> Result<Report>
where
    F: FnMut(&ScanEvent),
{
    let started = Instant::now();

    match run(archive, options, &mut sink, started) {
        Ok(report) => Ok(report),
        Err(e) => {
            sink(&ScanEvent::Error {
                reason: e.to_string(),
            });
            Err(e)
        }
    }
}

fn run<F>(
    archive: &Path,
    options: &Options,
    sink: &mut F,
    started: Instant,
) -> Result<Report>
where
    F: FnMut(&ScanEvent),
{
    let bank = PatternBank::build()?;
    let filter = FalsePositiveFilter::new();

    // Extraction root lives for the whole run and is removed on drop.
    let temp = tempfile::tempdir().map_err(|source| EngineError::Io {
        path: std::env::temp_dir(),
        operation: "create extraction directory",
        source,
    })?;

    tracing::info!(archive = %archive.display(), "Extracting archive");
    let extracted = extract::extract_archive(archive, temp.path())?;
    for reason in &extracted.warnings {
        sink(&ScanEvent::Warning {
            file: archive.display().to_string(),
            reason: reason.clone(),
        });
    }

    let scannable: Vec<(PathBuf, String, u64)> = extracted
        .files
        .iter()
        .filter(|f| filter.classify(Path::new(&f.rel)).is_scannable())
        .map(|f| (f.abs.clone(), f.rel.clone(), f.size))
        .collect();

    tracing::info!(
        files = extracted.files.len(),
        scannable = scannable.len(),
        "Classification complete"
    );

    // Phase 1: single-threaded correlation prescan, then freeze. The
    // mmap-sized giants are skipped; the index is a hint, not a truth.
    let mut indexer = CorrelationIndexer::new();
    for (abs, rel, size) in &scannable {
        if *size <= options.mmap_threshold_bytes {
            prescan_correlation(abs, rel, &mut indexer);
        }
    }
    let index = indexer.freeze();
    tracing::debug!(ids = index.distinct_ids(), "Correlation index frozen");

    // Phase 2: parallel scan.
    let workers = options
        .workers
        .unwrap_or_else(default_workers)
        .clamp(1, constants::MAX_WORKERS);
    let (work_tx, work_rx) = bounded::<(PathBuf, String)>(workers);
    let (event_tx, event_rx) = bounded::<ScanEvent>(constants::EVENT_QUEUE_CAPACITY);

    let cancel = options.cancel.clone();
    let mut aggregator = Aggregator::new();
    let mut limit_reached = false;

    let lines_processed: u64 = std::thread::scope(|s| {
        // Feeder: pushes work until done or cancelled, then closes the
        // queue by dropping the sender.
        let feeder_cancel = cancel.clone();
        let feed_items: Vec<(PathBuf, String)> = scannable
            .iter()
            .map(|(abs, rel, _)| (abs.clone(), rel.clone()))
            .collect();
        s.spawn(move || {
            for item in feed_items {
                if feeder_cancel.is_cancelled() {
                    break;
                }
                if work_tx.send(item).is_err() {
                    break;
                }
            }
        });

        // Workers: each owns one scanner, pulls files, pushes events.
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let event_tx = event_tx.clone();
            let bank = &bank;
            let filter = &filter;
            let index = &index;
            handles.push(s.spawn(move || {
                let scanner = FileScanner::new(bank, filter, index, options);
                let mut lines = 0u64;
                while let Ok((abs, rel)) = work_rx.recv() {
                    let outcome = scanner.scan_file(&abs, &rel, &event_tx);
                    lines += outcome.lines_processed;
                }
                lines
            }));
        }
        drop(work_rx);
        drop(event_tx);

        // Consumer: the single owner of the aggregator and the sink.
        let drain_timeout = Duration::from_secs(constants::CANCEL_DRAIN_TIMEOUT_SECS);
        let mut drain_deadline: Option<Instant> = None;
        loop {
            let event = if cancel.is_cancelled() {
                let deadline = *drain_deadline.get_or_insert_with(|| Instant::now() + drain_timeout);
                match event_rx.recv_deadline(deadline) {
                    Ok(ev) => ev,
                    Err(_) => break,
                }
            } else {
                match event_rx.recv() {
                    Ok(ev) => ev,
                    Err(_) => break,
                }
            };

            sink(&event);
            if let ScanEvent::Match { data } = event {
                aggregator.add(*data);
                if let Some(max) = options.max_matches {
                    if aggregator.matches_seen() >= max && !cancel.is_cancelled() {
                        tracing::info!(max, "Match limit reached; cancelling remaining work");
                        limit_reached = true;
                        cancel.cancel();
                    }
                }
            }
        }

        handles.into_iter().map(|h| h.join().unwrap_or(0)).sum()
    });

    // A cancel that was not the match limit is fatal: no partial report.
    if cancel.is_cancelled() && !limit_reached {
        return Err(EngineError::Cancelled);
    }

    let summary = Summary {
        files_processed: extracted.files.len() as u64,
        lines_processed,
        errors_found: aggregator.matches_seen(),
        duration_ms: started.elapsed().as_millis() as u64,
    };
    sink(&ScanEvent::Done {
        summary: summary.clone(),
    });

    tracing::info!(
        files = summary.files_processed,
        lines = summary.lines_processed,
        errors = summary.errors_found,
        duration_ms = summary.duration_ms,
        "Analysis complete"
    );

    Ok(aggregator.finalize(summary))
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(constants::MAX_WORKERS)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    /// Build a .tar.gz archive from (path, content) pairs.
    fn make_archive(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();

        let archive = dir.join("sos.tar.gz");
        let file = fs::File::create(&archive).unwrap();
        let mut gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        gz.write_all(&tar_bytes).unwrap();
        gz.finish().unwrap();
        archive
    }

    #[test]
    fn test_empty_archive_single_done_event() {
        let dir = tempfile::tempdir().unwrap();
        let archive = make_archive(dir.path(), &[]);

        let mut events = Vec::new();
        let report = analyze_streaming(&archive, &Options::default(), |ev| {
            events.push(serde_json::to_string(ev).unwrap());
        })
        .unwrap();

        assert_eq!(report.summary.errors_found, 0);
        assert_eq!(report.groups.len(), 0);
        let done_count = events.iter().filter(|e| e.contains("\"done\"")).count();
        assert_eq!(done_count, 1, "exactly one done event: {events:?}");
    }

    #[test]
    fn test_single_match_run() {
        let dir = tempfile::tempdir().unwrap();
        let archive = make_archive(
            dir.path(),
            &[(
                "gitaly/current",
                "2024-01-01T00:00:00Z ERROR dialing failed: rpc error: \
                 code = Unavailable desc = connection refused\n",
            )],
        );

        let report = analyze(&archive, &Options::default()).unwrap();
        assert_eq!(report.summary.errors_found, 1);
        assert_eq!(report.summary.files_processed, 1);
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].pattern_id, "grpc_unavail");
        assert_eq!(report.top_errors.len(), 1);
    }

    #[test]
    fn test_schema_only_archive_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = make_archive(
            dir.path(),
            &[(
                "db/schema.rb",
                "t.integer :timeout, default: 60, null: false\n",
            )],
        );

        let report = analyze(&archive, &Options::default()).unwrap();
        assert!(report.summary.files_processed > 0);
        assert_eq!(report.summary.errors_found, 0);
    }

    #[test]
    fn test_max_matches_stops_run() {
        let line = "2024-01-01T00:00:00Z ERROR dialing failed: connection refused\n";
        let content = line.repeat(50);
        // One entry per line; the boundary walk does not merge them
        // because each line is a fresh timestamped ERROR start.
        let dir = tempfile::tempdir().unwrap();
        let archive = make_archive(dir.path(), &[("gitaly/current", &content)]);

        let options = Options {
            max_matches: Some(3),
            workers: Some(1),
            ..Options::default()
        };
        let report = analyze(&archive, &options).unwrap();
        assert!(
            report.summary.errors_found >= 3,
            "at least the limit is reported"
        );
    }

    #[test]
    fn test_unsupported_archive_errors_with_error_event() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("sos.rar");
        fs::write(&bogus, "junk").unwrap();

        let mut saw_error_event = false;
        let result = analyze_streaming(&bogus, &Options::default(), |ev| {
            if matches!(ev, ScanEvent::Error { .. }) {
                saw_error_event = true;
            }
        });
        assert!(matches!(result, Err(EngineError::Archive(_))));
        assert!(saw_error_event, "fatal error must be surfaced on the stream");
    }

    #[test]
    fn test_repeat_runs_identical_groups() {
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
                    "PG::ConnectionBad: could not connect to server\n\
                     FATAL:  password authentication failed for user \"gitlab\"\n",
                ),
            ],
        );

        let a = analyze(&archive, &Options::default()).unwrap();
        let b = analyze(&archive, &Options::default()).unwrap();

        let sig_a: Vec<(&str, u64)> = a
            .groups
            .iter()
            .map(|g| (g.signature.as_str(), g.count))
            .collect();
        let sig_b: Vec<(&str, u64)> = b
            .groups
            .iter()
            .map(|g| (g.signature.as_str(), g.count))
            .collect();
        assert_eq!(sig_a, sig_b, "grouping must be run-order independent");
    }

    #[test]
    fn test_cancel_before_start_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = make_archive(
            dir.path(),
            &[("gitaly/current", "quiet line\n")],
        );

        let options = Options::default();
        options.cancel.cancel();
        let result = analyze(&archive, &options);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
