// AutoGrep - core/metadata.rs
//
// Match enrichment: clean-message extraction, identifier and error-code
// extraction, stack-trace parsing, best-effort timestamps, and node
// derivation from the file path.
//
// Everything here degrades silently. A JSON parse failure, an
// unrecognised timestamp, or a missing field leaves the match with less
// metadata, never with an error.

use crate::core::model::{LogFormat, Match, Pattern};
use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

/// Placeholder values some GitLab log schemas emit in message fields.
const MESSAGE_PLACEHOLDERS: &[&str] = &["bulk_exception", "exception", "error"];

// =============================================================================
// Clean message
// =============================================================================

/// Pull the message out of a parsed JSON line, in priority order.
///
/// GitLab emits both nested `exception` objects and flat
/// `"exception.message"` keys depending on the subsystem; both are
/// consulted.
fn json_message(data: &Value) -> Option<String> {
    let candidates = [
        data.get("error_message"),
        data.get("exception").and_then(|e| e.get("message")),
        data.get("exception.message"),
        data.get("exception").and_then(|e| e.get("class")),
        data.get("exception.class"),
        data.get("error"),
        data.get("msg"),
        data.get("message"),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Some(text) = candidate.as_str() {
            if !text.is_empty() && !MESSAGE_PLACEHOLDERS.contains(&text) {
                return Some(text.to_string());
            }
        }
    }
    None
}

fn parse_json_object(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(Value::is_object)
}

/// Component-specific message extractors, keyed by substrings of the
/// pattern id or component name.
fn component_extractors() -> &'static [(&'static str, Regex)] {
    static EXTRACTORS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    EXTRACTORS.get_or_init(|| {
        [
            ("ssl", r"(?i)(?:error|failed):\s*(.+)"),
            ("timeout", r"(?i)timeout.*?:\s*(.+)"),
            ("connection", r"(?i)connection.*?:\s*(.+)"),
            ("postgres", r"(?i)ERROR:\s*(.+)"),
            ("grpc", r#"(?i)desc\s*=\s*"?([^"]+)"?"#),
            ("redis", r"(?i)Redis.*?:\s*(.+)"),
            ("sidekiq", r"(?i)(?:failed|error):\s*(.+)"),
        ]
        .iter()
        .map(|(k, p)| (*k, Regex::new(p).expect("extractor regex must compile")))
        .collect()
    })
}

fn generic_extractors() -> &'static [Regex] {
    static EXTRACTORS: OnceLock<Vec<Regex>> = OnceLock::new();
    EXTRACTORS.get_or_init(|| {
        [
            r"(?i)(?:ERROR|FATAL|CRITICAL|error|fail)[:\s]+(.+)",
            r#"(?i)message[:\s]+["']*([^"']+)"#,
            r#"(?i)msg[:\s]+["']*([^"']+)"#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("generic extractor must compile"))
        .collect()
    })
}

/// Extract the clean, human-readable message for a match.
///
/// Priority: the line's own JSON fields, then JSON in the first five
/// context lines, then a component-specific extractor, then generic
/// ERROR/message extractors, then the pattern description, then the
/// first 100 characters of the pattern source.
pub fn extract_clean_message(line: &str, pattern: &Pattern, context: &[&str]) -> String {
    if let Some(data) = parse_json_object(line) {
        if let Some(message) = json_message(&data) {
            return message;
        }
    }

    for ctx_line in context.iter().take(5) {
        if let Some(data) = parse_json_object(ctx_line) {
            if let Some(message) = json_message(&data) {
                return message;
            }
        }
    }

    let id_lower = pattern.id.to_lowercase();
    let component_lower = pattern.component.label().to_lowercase();
    for (key, extractor) in component_extractors() {
        if id_lower.contains(key) || component_lower.contains(key) {
            if let Some(caps) = extractor.captures(line) {
                return caps[1].trim().to_string();
            }
        }
    }

    for extractor in generic_extractors() {
        if let Some(caps) = extractor.captures(line) {
            return caps[1].trim().to_string();
        }
    }

    if !pattern.description.is_empty() {
        pattern.description.to_string()
    } else {
        pattern.regex.chars().take(100).collect()
    }
}

// =============================================================================
// Identifiers and error codes
// =============================================================================

fn json_field_string(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Fill the match's identifier, error-code, and json_fields metadata
/// from the matched line, consulting context lines only for fields
/// still missing afterwards.
pub fn enrich(line: &str, m: &mut Match, context: &[&str]) {
    static CORRELATION: OnceLock<Regex> = OnceLock::new();
    static REQUEST: OnceLock<Regex> = OnceLock::new();
    static STATUS: OnceLock<Regex> = OnceLock::new();
    static GRPC: OnceLock<Regex> = OnceLock::new();
    static CTX_CODE: OnceLock<Regex> = OnceLock::new();

    let correlation = CORRELATION.get_or_init(|| {
        Regex::new(r#"(?i)correlation_id[=:]\s*"?([a-zA-Z0-9\-_]+)"?"#).expect("regex")
    });
    let request = REQUEST.get_or_init(|| {
        Regex::new(r#"(?i)request_id[=:]\s*"?([a-zA-Z0-9\-_]+)"?"#).expect("regex")
    });
    let status =
        STATUS.get_or_init(|| Regex::new(r"\b([45]\d{2})\s+(?:Error|Bad|Not)").expect("regex"));
    let grpc = GRPC.get_or_init(|| Regex::new(r"(?i)code\s*=\s*(\w+)").expect("regex"));
    let ctx_code = CTX_CODE.get_or_init(|| Regex::new(r"\b([45]\d{2})\s+").expect("regex"));

    if let Some(data) = parse_json_object(line) {
        m.correlation_id = json_field_string(&data, "correlation_id");
        m.request_id = json_field_string(&data, "request_id");
        m.user_id = json_field_string(&data, "user_id");
        m.project_id = json_field_string(&data, "project_id");
        m.job_id = json_field_string(&data, "job_id");
        m.trace_id = json_field_string(&data, "trace_id");
        m.error_code = json_field_string(&data, "code")
            .or_else(|| json_field_string(&data, "status"))
            .or_else(|| json_field_string(&data, "grpc.code"));
        if let Value::Object(map) = data {
            m.json_fields = Some(map);
        }
    }

    if m.correlation_id.is_none() {
        if let Some(caps) = correlation.captures(line) {
            m.correlation_id = Some(caps[1].to_string());
        }
    }
    if m.request_id.is_none() {
        if let Some(caps) = request.captures(line) {
            m.request_id = Some(caps[1].to_string());
        }
    }
    if let Some(caps) = status.captures(line) {
        m.error_code = Some(caps[1].to_string());
    }
    if m.error_code.is_none() {
        if let Some(caps) = grpc.captures(line) {
            m.error_code = Some(caps[1].to_string());
        }
    }

    // Context lines only fill fields that are still missing.
    for ctx_line in context {
        if m.correlation_id.is_none() {
            if let Some(caps) = correlation.captures(ctx_line) {
                m.correlation_id = Some(caps[1].to_string());
            }
        }
        if m.error_code.is_none() {
            if let Some(caps) = ctx_code.captures(ctx_line) {
                m.error_code = Some(caps[1].to_string());
            }
        }
    }
}

// =============================================================================
// Stack traces
// =============================================================================

/// Extract the stack frames from an entry's lines, format-specific and
/// greedy until the first non-continuation.
pub fn extract_stack_trace(lines: &[&str], format: LogFormat) -> Option<Vec<String>> {
    let mut frames: Vec<String> = Vec::new();

    match format {
        LogFormat::PythonTraceback => {
            let mut in_trace = false;
            for line in lines {
                if line.contains("Traceback") {
                    in_trace = true;
                    frames.push(line.trim().to_string());
                } else if in_trace {
                    if line.starts_with(' ') || line.contains("File") {
                        frames.push(line.trim().to_string());
                    } else {
                        break;
                    }
                }
            }
        }
        LogFormat::JavaStack => {
            for line in lines {
                if line.contains("Exception")
                    || line.trim_start().starts_with("at ")
                    || line.contains("Caused by:")
                {
                    frames.push(line.trim().to_string());
                }
            }
        }
        LogFormat::GoStack | LogFormat::GoPanic => {
            for line in lines {
                if line.contains("panic:") || line.contains("goroutine") || line.contains(".go:") {
                    frames.push(line.trim().to_string());
                }
            }
        }
        LogFormat::RubyLogger => {
            static RUBY_FRAME: OnceLock<Regex> = OnceLock::new();
            let frame = RUBY_FRAME
                .get_or_init(|| Regex::new(r"^\s+from .+:\d+:in").expect("ruby frame regex"));
            for line in lines {
                if frame.is_match(line) {
                    frames.push(line.trim().to_string());
                }
            }
        }
        _ => {}
    }

    if frames.is_empty() {
        None
    } else {
        Some(frames)
    }
}

// =============================================================================
// Timestamps
// =============================================================================

/// Best-effort wall-clock timestamp from a line. The result is stored
/// for display only and never used for ordering.
pub fn extract_timestamp(line: &str) -> Option<NaiveDateTime> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            r"(\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2})",
            r#""time":"([^"]+)""#,
            r#""timestamp":"([^"]+)""#,
            r#""@timestamp":"([^"]+)""#,
            r"\[(\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2}[^\]]*)\]",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("timestamp regex must compile"))
        .collect()
    });

    for pattern in patterns {
        if let Some(caps) = pattern.captures(line) {
            let raw = caps[1]
                .replace('T', " ")
                .split(['.', '+', 'Z'])
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            if let Ok(ts) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S") {
                return Some(ts);
            }
        }
    }
    None
}

// =============================================================================
// Node derivation
// =============================================================================

const NODES: &[&str] = &[
    "praefect",
    "gitaly",
    "postgresql",
    "postgres",
    "redis",
    "sidekiq",
    "workhorse",
    "nginx",
    "puma",
    "gitlab-rails",
    "gitlab-shell",
    "registry",
    "pages",
    "kas",
];

/// Derive the node name from the file path.
pub fn extract_node(path: &Path) -> String {
    let path_str = path.to_string_lossy().to_lowercase();
    for node in NODES {
        if path_str.contains(node) {
            return (*node).to_string();
        }
    }
    "unknown".to_string()
}

// =============================================================================
// Tests
// =============================================================================
