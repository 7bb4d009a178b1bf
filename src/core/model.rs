// AutoGrep - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// knowledge of threads or archives; these are the shared vocabulary
// across the scanner, the orchestrator, and the aggregator.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// Severity
// =============================================================================

/// Severity of a catalogued failure pattern, ordered most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Severity {
    #[serde(rename = "CRITICAL")]
    Critical,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "WARNING")]
    Warning,
}

impl Severity {
    /// Sort rank: lower sorts first (Critical before Error before Warning).
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Error => 1,
            Severity::Warning => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Component
// =============================================================================

/// Deployment component a pattern (and therefore a match) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Component {
    #[serde(rename = "Praefect/Gitaly")]
    PraefectGitaly,
    #[serde(rename = "PostgreSQL")]
    PostgreSql,
    #[serde(rename = "Redis")]
    Redis,
    #[serde(rename = "Sidekiq")]
    Sidekiq,
    #[serde(rename = "Rails")]
    Rails,
    #[serde(rename = "Workhorse")]
    Workhorse,
    #[serde(rename = "Nginx")]
    Nginx,
    #[serde(rename = "Auth")]
    Auth,
    #[serde(rename = "Network")]
    Network,
    #[serde(rename = "System/OS")]
    SystemOs,
    #[serde(rename = "Kubernetes/Helm")]
    KubernetesHelm,
    #[serde(rename = "SSL/Certificates")]
    SslCertificates,
    #[serde(rename = "Geo")]
    Geo,
    #[serde(rename = "Git/Shell")]
    GitShell,
    #[serde(rename = "CI/CD")]
    CiCd,
    #[serde(rename = "Generic")]
    Generic,
}

impl Component {
    pub fn label(self) -> &'static str {
        match self {
            Component::PraefectGitaly => "Praefect/Gitaly",
            Component::PostgreSql => "PostgreSQL",
            Component::Redis => "Redis",
            Component::Sidekiq => "Sidekiq",
            Component::Rails => "Rails",
            Component::Workhorse => "Workhorse",
            Component::Nginx => "Nginx",
            Component::Auth => "Auth",
            Component::Network => "Network",
            Component::SystemOs => "System/OS",
            Component::KubernetesHelm => "Kubernetes/Helm",
            Component::SslCertificates => "SSL/Certificates",
            Component::Geo => "Geo",
            Component::GitShell => "Git/Shell",
            Component::CiCd => "CI/CD",
            Component::Generic => "Generic",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Log format
// =============================================================================

/// Shape of the logical log entry a matched line belongs to, as decided
/// by the boundary detector. Drives stack-trace extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    TimestampPrefix,
    RubyLogger,
    PythonTraceback,
    JavaStack,
    GoPanic,
    GoStack,
    JsonLevel,
    BareFatal,
    BarePanic,
    Text,
}

impl LogFormat {
    /// Formats whose entries carry an extractable stack trace.
    pub fn has_stack_trace(self) -> bool {
        matches!(
            self,
            LogFormat::PythonTraceback
                | LogFormat::JavaStack
                | LogFormat::GoStack
                | LogFormat::GoPanic
                | LogFormat::RubyLogger
        )
    }
}

// =============================================================================
// Pattern
// =============================================================================

/// One immutable failure-pattern definition from the built-in catalogue.
///
/// The regex source is kept as plain data; compilation happens once in
/// the pattern bank, which owns a parallel array of compiled matchers.
#[derive(Debug, Clone, Copy)]
pub struct Pattern {
    /// Unique id within the component (e.g. "pg_conn_refused").
    pub id: &'static str,

    /// Regex source, compiled case-insensitive and multi-line.
    pub regex: &'static str,

    pub component: Component,

    /// Free-form category ("infrastructure", "database", ...).
    pub category: &'static str,

    pub severity: Severity,

    /// 1..=10, higher is tried first.
    pub priority: u8,

    /// Whether matches of this pattern usually span multiple lines.
    pub multiline: bool,

    /// Human description; also the clean-message fallback.
    pub description: &'static str,
}

// =============================================================================
// File classification
// =============================================================================

/// What kind of file an extracted path is. Only `LogSuitable` and
/// `KubeResource` files are fed to the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClassification {
    LogSuitable,
    Static,
    Schema,
    SystemInfo,
    Config,
    MonitoringOnly,
    KubeResource,
    Unknown,
}

impl FileClassification {
    /// Whether files of this class are scanned for failure patterns.
    pub fn is_scannable(self) -> bool {
        matches!(
            self,
            FileClassification::LogSuitable | FileClassification::KubeResource
        )
    }
}

// =============================================================================
// Match
// =============================================================================

/// A single catalogued failure found in a log file, with its full
/// reconstructed context. Created by a scan worker, handed to the event
/// consumer, folded into the report by the aggregator; never shared.
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub pattern_id: &'static str,
    pub component: Component,
    pub severity: Severity,
    pub description: &'static str,

    /// Text the pattern's regex matched.
    pub matched_text: String,

    /// Extracted human-readable error message.
    pub clean_message: String,

    /// First line of the logical entry, as read.
    pub full_line: String,

    /// The complete multi-line entry (stack trace, JSON blob).
    pub full_context: String,

    /// Path relative to the extraction root.
    pub file_path: String,

    /// 1-based line number; 0 when the mmap path could not track it.
    pub line_number: u64,

    /// Wall-clock timestamp parsed from the line. Display only; never
    /// used for ordering or deduplication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,

    /// Node derived from the path (praefect/gitaly/postgres/...).
    pub node: String,

    /// Up to 5 preceding non-entry lines.
    pub context_before: Vec<String>,

    /// Up to 5 succeeding lines.
    pub context_after: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// HTTP status or gRPC code, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Parsed stack frames, ordered as they appear.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<String>>,

    /// All JSON fields of the line when it parses as JSON, plus
    /// engine-added enrichments such as `related_entries_count`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_fields: Option<serde_json::Map<String, serde_json::Value>>,

    /// 16 lowercase hex chars. Informational on the match; the
    /// aggregator recomputes it authoritatively when grouping.
    pub signature: String,

    /// Confidence in [0, 1].
    pub confidence: f64,
}

// =============================================================================
// Event stream
// =============================================================================

/// One event on the match stream. Serialized as one JSON object per
/// line; the stream ends with exactly one `done` on success or one
/// `error` on fatal failure.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScanEvent {
    Progress {
        file: String,
        lines_processed: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_lines: Option<u64>,
        progress_percent: f64,
    },
    Warning {
        file: String,
        reason: String,
    },
    Match {
        data: Box<Match>,
    },
    Done {
        summary: Summary,
    },
    Error {
        reason: String,
    },
}

/// Run-level counters reported with the terminal `done` event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub files_processed: u64,
    pub lines_processed: u64,
    pub errors_found: u64,
    pub duration_ms: u64,
}

// =============================================================================
// Report
// =============================================================================

/// A cluster of matches sharing one normalized signature.
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub signature: String,
    pub count: u64,
    pub first_message: String,
    pub severity: Severity,
    pub component: Component,
    pub pattern_id: &'static str,
    /// Up to 3 full sample matches.
    pub sample_matches: Vec<Match>,
    /// Distinct files this signature appeared in.
    pub files: Vec<String>,
    pub has_correlation: bool,
    pub has_stack_trace: bool,
}

/// Terminal output of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub totals_by_severity: BTreeMap<Severity, u64>,
    pub totals_by_component: BTreeMap<Component, u64>,
    pub groups: Vec<Group>,
    /// First 10 groups by count desc (ties broken by signature).
    pub top_errors: Vec<Group>,
}

// =============================================================================
// Options & cancellation
// =============================================================================

/// Cooperative cancel signal shared between the caller, the signal
/// handler, and the worker pool.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// The underlying flag, for signal-handler registration.
    pub fn as_arc(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Tunables for one engine run. All fields have sensible defaults.
#[derive(Debug, Clone)]
pub struct Options {
    /// Worker count; defaults to min(available cores, 16).
    pub workers: Option<usize>,

    /// Files larger than this are skipped with a warning.
    pub max_file_bytes: u64,

    /// Non-gzip files larger than this use the chunked mmap path.
    pub mmap_threshold_bytes: u64,

    /// A progress event is emitted every this many lines per file.
    pub progress_every_lines: u64,

    /// When set, the run cancels after the Nth match.
    pub max_matches: Option<u64>,

    /// Cooperative cancel signal.
    pub cancel: CancelFlag,
}

impl Default for Options {
    fn default() -> Self {
        use crate::util::constants;
        Self {
            workers: None,
            max_file_bytes: constants::DEFAULT_MAX_FILE_BYTES,
            mmap_threshold_bytes: constants::DEFAULT_MMAP_THRESHOLD_BYTES,
            progress_every_lines: constants::DEFAULT_PROGRESS_EVERY_LINES,
            max_matches: None,
            cancel: CancelFlag::new(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_rank_ordering() {
        assert!(Severity::Critical.rank() < Severity::Error.rank());
        assert!(Severity::Error.rank() < Severity::Warning.rank());
    }

    #[test]
    fn test_severity_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"CRITICAL\""
        );
        assert_eq!(
            serde_json::to_string(&Severity::Warning).unwrap(),
            "\"WARNING\""
        );
    }

    #[test]
    fn test_component_serializes_display_name() {
        assert_eq!(
            serde_json::to_string(&Component::PraefectGitaly).unwrap(),
            "\"Praefect/Gitaly\""
        );
        assert_eq!(
            serde_json::to_string(&Component::SystemOs).unwrap(),
            "\"System/OS\""
        );
    }

    #[test]
    fn test_event_tagging() {
        let ev = ScanEvent::Warning {
            file: "x.log".to_string(),
            reason: "unreadable".to_string(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"warning\""), "got: {json}");
        assert!(json.contains("\"file\":\"x.log\""));
    }

    #[test]
    fn test_done_event_shape() {
        let ev = ScanEvent::Done {
            summary: Summary {
                files_processed: 2,
                lines_processed: 100,
                errors_found: 3,
                duration_ms: 42,
            },
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"done\""));
        assert!(json.contains("\"errors_found\":3"));
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_scannable_classes() {
        assert!(FileClassification::LogSuitable.is_scannable());
        assert!(FileClassification::KubeResource.is_scannable());
        assert!(!FileClassification::Schema.is_scannable());
        assert!(!FileClassification::SystemInfo.is_scannable());
        assert!(!FileClassification::Config.is_scannable());
    }
}
