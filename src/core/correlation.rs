// AutoGrep - core/correlation.rs
//
// Correlation-ID indexing. A dedicated prescan pass walks every
// scannable file once, pulls out correlation/request/job/trace
// identifiers, and records where each one appeared. The index is then
// frozen and shared read-only with the scan workers so a match can say
// "this id appears in N other places".

use crate::util::constants;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// One place an identifier was seen.
#[derive(Debug, Clone)]
pub struct Occurrence {
    pub file: String,
    pub line: u64,
    pub raw: String,
}

/// Builder half: accumulates occurrences during the prescan.
#[derive(Debug, Default)]
pub struct CorrelationIndexer {
    entries: HashMap<String, Vec<Occurrence>>,
}

/// Frozen half: read-only lookups during scanning.
#[derive(Debug, Default)]
pub struct CorrelationIndex {
    entries: HashMap<String, Vec<Occurrence>>,
}

/// The extractor regexes, applied in order with all findings kept.
fn id_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"(?i)"correlation_id"\s*:\s*"([^"]+)""#,
            r"(?i)correlation_id=([a-zA-Z0-9\-_]+)",
            r#"(?i)"request_id"\s*:\s*"([^"]+)""#,
            r"(?i)request_id=([a-zA-Z0-9\-_]+)",
            r#"(?i)"job_id"\s*:\s*"([^"]+)""#,
            r"(?i)job_id=([a-zA-Z0-9\-_]+)",
            r#"(?i)"trace_id"\s*:\s*"([^"]+)""#,
            r"(?i)RequestId:\s*([a-zA-Z0-9\-_]+)",
            r"(?i)X-Request-Id:\s*([a-zA-Z0-9\-_]+)",
            r#"(?i)"x-request-id"\s*:\s*"([^"]+)""#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("correlation pattern must compile"))
        .collect()
    })
}

impl CorrelationIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every identifier found on `line`.
    pub fn index_line(&mut self, line: &str, line_number: u64, file: &str) {
        for pattern in id_patterns() {
            for caps in pattern.captures_iter(line) {
                let id = &caps[1];
                if id.len() <= constants::CORRELATION_MIN_ID_LEN {
                    continue;
                }
                let bucket = self.entries.entry(id.to_string()).or_default();
                if bucket.len() >= constants::CORRELATION_MAX_ENTRIES_PER_ID {
                    // Overflow is dropped silently; the index is a hint.
                    continue;
                }
                bucket.push(Occurrence {
                    file: file.to_string(),
                    line: line_number,
                    raw: line.to_string(),
                });
            }
        }
    }

    /// Freeze into the read-only index shared with workers.
    pub fn freeze(self) -> CorrelationIndex {
        CorrelationIndex {
            entries: self.entries,
        }
    }
}

impl CorrelationIndex {
    /// Number of places `id` was seen across the whole archive.
    pub fn count(&self, id: &str) -> usize {
        self.entries.get(id).map_or(0, Vec::len)
    }

    pub fn related(&self, id: &str) -> &[Occurrence] {
        self.entries.get(id).map_or(&[], Vec::as_slice)
    }

    pub fn distinct_ids(&self) -> usize {
        self.entries.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
