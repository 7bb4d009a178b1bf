// AutoGrep - core/boundary.rs
//
// Multi-line entry boundary detection. Given the lines of a file and
// the index of a matched line, expand to the full logical log entry
// (stack trace, JSON blob, wrapped message) it belongs to.

use crate::core::model::LogFormat;
use crate::util::constants;
use regex::Regex;
use std::sync::OnceLock;

/// Classifies lines as entry starts, continuations, or entry ends, and
/// walks outward from a matched line to the enclosing entry.
///
/// Stateless after construction; one instance per scanner.
pub struct BoundaryDetector {
    starts: &'static [Regex],
    continuations: &'static [Regex],
    ends: &'static [Regex],
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("boundary pattern must compile"))
        .collect()
}

/// Start-of-entry patterns, anchored at the beginning of the line.
const START_PATTERNS: &[&str] = &[
    r"^\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2}.*(?:ERROR|FATAL|CRITICAL)",
    r"^E, \[\d{4}-\d{2}-\d{2}",
    r"^\s*Traceback \(most recent call last\)",
    r"^Exception in thread",
    r"^panic:",
    r#"^\{\s*"(?:level|severity)"\s*:\s*"(?:error|fatal|critical)""#,
    r"^goroutine \d+",
    r"^FATAL:",
    r"^PANIC:",
];

/// Continuation patterns: stack frames, indented content, wrap markers.
const CONTINUATION_PATTERNS: &[&str] = &[
    r"^\s+at ",
    r#"^\s+File "[^"]+", line \d+"#,
    r"^\s+from .+:\d+:in",
    r"^\s+.*\.go:\d+",
    r"^\s+\w+\(.*\)",
    r"^Caused by:",
    r"^\s+\.{3}",
    r"^\s{2,}\S",
];

/// End-of-entry patterns: the next benign entry or a section break.
const END_PATTERNS: &[&str] = &[
    r"^\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2}.*(?:INFO|DEBUG|TRACE)",
    r"^I, \[\d{4}-\d{2}-\d{2}",
    r#"^\{\s*"(?:level|severity)"\s*:\s*"(?:info|debug)""#,
    r"^$",
    r"^[A-Z][a-z]+.*:$",
];

impl BoundaryDetector {
    pub fn new() -> Self {
        static STARTS: OnceLock<Vec<Regex>> = OnceLock::new();
        static CONTINUATIONS: OnceLock<Vec<Regex>> = OnceLock::new();
        static ENDS: OnceLock<Vec<Regex>> = OnceLock::new();

        Self {
            starts: STARTS.get_or_init(|| compile_all(START_PATTERNS)),
            continuations: CONTINUATIONS.get_or_init(|| compile_all(CONTINUATION_PATTERNS)),
            ends: ENDS.get_or_init(|| compile_all(END_PATTERNS)),
        }
    }

    /// Detect the format of the matched line itself.
    pub fn detect_format(&self, line: &str) -> LogFormat {
        static TS: OnceLock<Regex> = OnceLock::new();
        let ts = TS.get_or_init(|| {
            Regex::new(r"^\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2}").expect("timestamp regex")
        });

        let trimmed = line.trim_start();
        if trimmed.starts_with('{') && (line.contains("\"level\"") || line.contains("\"severity\""))
        {
            LogFormat::JsonLevel
        } else if ts.is_match(line) {
            LogFormat::TimestampPrefix
        } else if line.starts_with("E, [") || line.starts_with("I, [") {
            LogFormat::RubyLogger
        } else if line.contains("Traceback") {
            LogFormat::PythonTraceback
        } else if line.starts_with("Exception in thread") || trimmed.starts_with("at ") {
            LogFormat::JavaStack
        } else if line.starts_with("panic:") {
            LogFormat::GoPanic
        } else if line.contains("goroutine") || line.contains(".go:") {
            LogFormat::GoStack
        } else if line.starts_with("FATAL:") {
            LogFormat::BareFatal
        } else if line.starts_with("PANIC:") {
            LogFormat::BarePanic
        } else {
            LogFormat::Text
        }
    }

    fn is_start(&self, line: &str) -> bool {
        self.starts.iter().any(|r| r.is_match(line))
    }

    fn is_continuation(&self, line: &str) -> bool {
        self.continuations.iter().any(|r| r.is_match(line))
    }

    fn is_end(&self, line: &str) -> bool {
        self.ends.iter().any(|r| r.is_match(line))
    }

    /// Expand a matched line to its logical entry.
    ///
    /// Walks backwards up to 100 lines collecting continuations until a
    /// new entry start or other non-continuation content; walks forwards
    /// up to 200 lines while continuations extend the entry, stopping at
    /// an end pattern or other non-continuation content. Returns the
    /// inclusive `(start, end)` line range and the detected format.
    pub fn find_boundaries(&self, lines: &[&str], match_line: usize) -> (usize, usize, LogFormat) {
        let format = self.detect_format(lines.get(match_line).copied().unwrap_or(""));
        let mut start = match_line;
        let mut end = match_line;

        // Backward walk.
        let back_limit = match_line.saturating_sub(constants::BOUNDARY_BACKWARD_LINES);
        let mut i = match_line;
        while i > back_limit {
            i -= 1;
            let line = lines[i];

            if self.is_start(line) {
                break;
            }
            if self.is_continuation(line) {
                start = i;
                continue;
            }
            if !line.trim().is_empty() {
                break;
            }
            // Empty line: part of the entry only when preceded by a
            // continuation (a blank inside a stack trace).
            if i > 0 && self.is_continuation(lines[i - 1]) {
                start = i;
            }
        }

        // Forward walk.
        let fwd_limit = (match_line + constants::BOUNDARY_FORWARD_LINES + 1).min(lines.len());
        let mut in_stack = false;
        let mut j = match_line + 1;
        while j < fwd_limit {
            let line = lines[j];

            // An empty line ends the entry unless the line right before
            // it was a continuation (a blank inside a stack trace).
            let blank_inside_stack =
                line.trim().is_empty() && j > 0 && self.is_continuation(lines[j - 1]);
            if self.is_end(line) && !blank_inside_stack {
                return (start, end, format);
            }

            if self.is_continuation(line) {
                end = j;
                in_stack = true;
            } else if in_stack && line.trim().is_empty() {
                // Blank after a stack: end unless the trace resumes.
                end = j;
                if j + 1 < lines.len() && !self.is_continuation(lines[j + 1]) {
                    break;
                }
            } else if !line.trim().is_empty() {
                break;
            }
            j += 1;
        }

        if end < start {
            end = start;
        }
        (start, end, format)
    }
}

impl Default for BoundaryDetector {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
