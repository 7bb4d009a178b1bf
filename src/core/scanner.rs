// AutoGrep - core/scanner.rs
//
// Per-file scan worker. Streams a file's lines through the literal
// prefilter, the false-positive filter, and the relevant slice of the
// pattern catalogue, reconstructs the multi-line entry around each hit,
// and emits match/progress/warning events.
//
// One scanner instance belongs to one worker thread. Everything it
// borrows (bank, filter, correlation index) is immutable shared state;
// everything mutable (ring buffer, processed set, line array) is local
// to a single file scan.

use crate::core::aggregate;
use crate::core::boundary::BoundaryDetector;
use crate::core::correlation::{CorrelationIndex, CorrelationIndexer};
use crate::core::filter::FalsePositiveFilter;
use crate::core::metadata;
use crate::core::model::{Match, Options, ScanEvent};
use crate::core::patterns::PatternBank;
use crate::util::constants;
use crossbeam_channel::Sender;
use flate2::read::GzDecoder;
use memmap2::Mmap;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

/// Per-file counters returned to the worker loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileOutcome {
    pub lines_processed: u64,
    pub matches_found: u64,
}

pub struct FileScanner<'a> {
    bank: &'a PatternBank,
    filter: &'a FalsePositiveFilter,
    index: &'a CorrelationIndex,
    boundary: BoundaryDetector,
    progress_every: u64,
    mmap_threshold: u64,
    max_file_bytes: u64,
    file_timeout: Duration,
}

impl<'a> FileScanner<'a> {
    pub fn new(
        bank: &'a PatternBank,
        filter: &'a FalsePositiveFilter,
        index: &'a CorrelationIndex,
        options: &Options,
    ) -> Self {
        Self {
            bank,
            filter,
            index,
            boundary: BoundaryDetector::new(),
            progress_every: options.progress_every_lines.max(1),
            mmap_threshold: options.mmap_threshold_bytes,
            max_file_bytes: options.max_file_bytes,
            file_timeout: Duration::from_secs(constants::FILE_TIMEOUT_SECS),
        }
    }

    /// Scan one file, emitting events for every match. `rel` is the
    /// path relative to the extraction root and is what appears in
    /// every event.
    pub fn scan_file(&self, abs: &Path, rel: &str, events: &Sender<ScanEvent>) -> FileOutcome {
        if self.filter.should_skip_file(Path::new(rel)) {
            tracing::trace!(file = rel, "Skipped by classification");
            return FileOutcome::default();
        }

        let size = match abs.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                let _ = events.send(warning(rel, format!("cannot stat file: {e}")));
                return FileOutcome::default();
            }
        };
        if size > self.max_file_bytes {
            let _ = events.send(warning(
                rel,
                format!("file size {size} exceeds limit {}", self.max_file_bytes),
            ));
            return FileOutcome::default();
        }

        let is_gz = abs.extension().is_some_and(|e| e == "gz");
        if size > self.mmap_threshold && !is_gz {
            self.scan_mmap(abs, rel, events)
        } else {
            self.scan_buffered(abs, rel, is_gz, events)
        }
    }

    // -------------------------------------------------------------------------
    // Regular mode: whole file buffered, exact line numbers, full
    // boundary reconstruction.
    // -------------------------------------------------------------------------

    fn scan_buffered(
        &self,
        abs: &Path,
        rel: &str,
        is_gz: bool,
        events: &Sender<ScanEvent>,
    ) -> FileOutcome {
        let content = match read_lossy(abs, is_gz) {
            Ok(content) => content,
            Err(e) => {
                let _ = events.send(warning(rel, format!("cannot read file: {e}")));
                return FileOutcome::default();
            }
        };
        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len() as u64;

        let relevant = self.bank.relevant_for(Path::new(rel));
        let started = Instant::now();

        let mut outcome = FileOutcome::default();
        let mut ring: VecDeque<&str> = VecDeque::with_capacity(constants::RING_BUFFER_LINES);
        let mut processed = vec![false; lines.len()];

        for (i, &line) in lines.iter().enumerate() {
            outcome.lines_processed += 1;

            if outcome.lines_processed % self.progress_every == 0 {
                if started.elapsed() > self.file_timeout {
                    let _ = events.send(warning(rel, "per-file timeout exceeded".to_string()));
                    return outcome;
                }
                let percent = (outcome.lines_processed as f64 / total_lines.max(1) as f64) * 100.0;
                if events
                    .send(ScanEvent::Progress {
                        file: rel.to_string(),
                        lines_processed: outcome.lines_processed,
                        total_lines: Some(total_lines),
                        progress_percent: percent,
                    })
                    .is_err()
                {
                    return outcome;
                }
            }

            if processed[i] {
                push_ring(&mut ring, line);
                continue;
            }
            if line.len() < constants::QUICK_CHECK_MIN_LINE_LEN || !self.bank.any_hit(line) {
                push_ring(&mut ring, line);
                continue;
            }
            if self.filter.is_false_positive(line) {
                push_ring(&mut ring, line);
                continue;
            }

            for &pidx in &relevant {
                let Some(range) = self.bank.matcher(pidx).find(line) else {
                    continue;
                };
                let pattern = &self.bank.patterns()[pidx];

                let (start, end, format) = self.boundary.find_boundaries(&lines, i);
                for flag in processed.iter_mut().take(end + 1).skip(start) {
                    *flag = true;
                }
                let entry_lines = &lines[start..=end];
                let full_context = entry_lines.join("\n");

                let clean_message = metadata::extract_clean_message(line, pattern, entry_lines);

                let after_end = (i + 1 + constants::CONTEXT_AFTER_LINES).min(lines.len());
                let mut m = Match {
                    pattern_id: pattern.id,
                    component: pattern.component,
                    severity: pattern.severity,
                    description: pattern.description,
                    matched_text: line[range].to_string(),
                    clean_message,
                    full_line: line.to_string(),
                    full_context,
                    file_path: rel.to_string(),
                    line_number: (i + 1) as u64,
                    timestamp: metadata::extract_timestamp(line),
                    node: metadata::extract_node(Path::new(rel)),
                    context_before: last_n(&ring, constants::CONTEXT_BEFORE_LINES),
                    context_after: lines[i + 1..after_end]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    correlation_id: None,
                    request_id: None,
                    user_id: None,
                    project_id: None,
                    job_id: None,
                    trace_id: None,
                    error_code: None,
                    stack_trace: None,
                    json_fields: None,
                    signature: String::new(),
                    confidence: 1.0,
                };

                metadata::enrich(line, &mut m, entry_lines);
                if format.has_stack_trace() {
                    m.stack_trace = metadata::extract_stack_trace(entry_lines, format);
                }
                if let Some(id) = m.correlation_id.clone() {
                    let related = self.index.count(&id);
                    m.json_fields
                        .get_or_insert_with(serde_json::Map::new)
                        .insert("related_entries_count".to_string(), related.into());
                }
                m.signature =
                    aggregate::signature(m.component, m.pattern_id, aggregate::signature_source(&m));

                outcome.matches_found += 1;
                if events.send(ScanEvent::Match { data: Box::new(m) }).is_err() {
                    return outcome;
                }
                // At most one match per line.
                break;
            }

            push_ring(&mut ring, line);
        }

        outcome
    }

    // -------------------------------------------------------------------------
    // Mmap mode: chunked scan of huge files. Line numbers and forward
    // context are unavailable; boundaries are approximate.
    // -------------------------------------------------------------------------

    fn scan_mmap(&self, abs: &Path, rel: &str, events: &Sender<ScanEvent>) -> FileOutcome {
        let file = match File::open(abs) {
            Ok(f) => f,
            Err(e) => {
                let _ = events.send(warning(rel, format!("cannot open file: {e}")));
                return FileOutcome::default();
            }
        };
        // Read-only map; the extraction tree is not modified while the
        // scan phase runs.
        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(m) => m,
            Err(e) => {
                let _ = events.send(warning(rel, format!("cannot mmap file: {e}")));
                return FileOutcome::default();
            }
        };

        let relevant = self.bank.relevant_for(Path::new(rel));
        let started = Instant::now();
        let total = mmap.len();

        let mut outcome = FileOutcome::default();
        let mut ring: VecDeque<String> = VecDeque::with_capacity(constants::RING_BUFFER_LINES);
        let mut offset = 0usize;

        while offset < total {
            if started.elapsed() > self.file_timeout {
                let _ = events.send(warning(rel, "per-file timeout exceeded".to_string()));
                return outcome;
            }

            let mut end = (offset + constants::MMAP_CHUNK_BYTES).min(total);
            while end < total && mmap[end - 1] != b'\n' {
                end += 1;
            }
            let chunk = String::from_utf8_lossy(&mmap[offset..end]);

            for line in chunk.split('\n') {
                let line = line.trim_end_matches('\r');
                if line.is_empty() {
                    continue;
                }
                outcome.lines_processed += 1;

                if line.len() < constants::QUICK_CHECK_MIN_LINE_LEN
                    || !self.bank.any_hit(line)
                    || self.filter.is_false_positive(line)
                {
                    push_ring_owned(&mut ring, line);
                    continue;
                }

                for &pidx in &relevant {
                    let Some(range) = self.bank.matcher(pidx).find(line) else {
                        continue;
                    };
                    let pattern = &self.bank.patterns()[pidx];

                    let mut m = Match {
                        pattern_id: pattern.id,
                        component: pattern.component,
                        severity: pattern.severity,
                        description: pattern.description,
                        matched_text: line[range].to_string(),
                        clean_message: metadata::extract_clean_message(line, pattern, &[]),
                        full_line: line.to_string(),
                        full_context: line.to_string(),
                        file_path: rel.to_string(),
                        // Random access to prior lines is unavailable
                        // here, so the line number is not tracked.
                        line_number: 0,
                        timestamp: metadata::extract_timestamp(line),
                        node: metadata::extract_node(Path::new(rel)),
                        context_before: last_n_owned(&ring, constants::CONTEXT_BEFORE_LINES),
                        context_after: Vec::new(),
                        correlation_id: None,
                        request_id: None,
                        user_id: None,
                        project_id: None,
                        job_id: None,
                        trace_id: None,
                        error_code: None,
                        stack_trace: None,
                        json_fields: None,
                        signature: String::new(),
                        confidence: 1.0,
                    };
                    metadata::enrich(line, &mut m, &[]);
                    m.signature = aggregate::signature(
                        m.component,
                        m.pattern_id,
                        aggregate::signature_source(&m),
                    );

                    outcome.matches_found += 1;
                    if events.send(ScanEvent::Match { data: Box::new(m) }).is_err() {
                        return outcome;
                    }
                    break;
                }

                push_ring_owned(&mut ring, line);
            }

            offset = end;

            let percent = (offset as f64 / total.max(1) as f64) * 100.0;
            if events
                .send(ScanEvent::Progress {
                    file: rel.to_string(),
                    lines_processed: outcome.lines_processed,
                    total_lines: None,
                    progress_percent: percent,
                })
                .is_err()
            {
                return outcome;
            }
        }

        outcome
    }
}

// =============================================================================
// Correlation prescan
// =============================================================================

/// First-pass indexing step: feed every line of a file into the
/// correlation indexer. Read errors are ignored here; the scan pass
/// will surface them as warnings.
pub fn prescan_correlation(abs: &Path, rel: &str, indexer: &mut CorrelationIndexer) {
    let is_gz = abs.extension().is_some_and(|e| e == "gz");
    let Ok(content) = read_lossy(abs, is_gz) else {
        return;
    };
    for (idx, line) in content.lines().enumerate() {
        indexer.index_line(line, (idx + 1) as u64, rel);
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn read_lossy(path: &Path, is_gz: bool) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    let file = File::open(path)?;
    if is_gz {
        GzDecoder::new(file).read_to_end(&mut bytes)?;
    } else {
        let mut file = file;
        file.read_to_end(&mut bytes)?;
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn warning(file: &str, reason: String) -> ScanEvent {
    tracing::debug!(file, reason = %reason, "File-local warning");
    ScanEvent::Warning {
        file: file.to_string(),
        reason,
    }
}

fn push_ring<'a>(ring: &mut VecDeque<&'a str>, line: &'a str) {
    if ring.len() == constants::RING_BUFFER_LINES {
        ring.pop_front();
    }
    ring.push_back(line);
}

fn push_ring_owned(ring: &mut VecDeque<String>, line: &str) {
    if ring.len() == constants::RING_BUFFER_LINES {
        ring.pop_front();
    }
    ring.push_back(line.to_string());
}

fn last_n(ring: &VecDeque<&str>, n: usize) -> Vec<String> {
    ring.iter()
        .skip(ring.len().saturating_sub(n))
        .map(|s| s.to_string())
        .collect()
}

fn last_n_owned(ring: &VecDeque<String>, n: usize) -> Vec<String> {
    ring.iter()
        .skip(ring.len().saturating_sub(n))
        .cloned()
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
