// AutoGrep - core/aggregate.rs
//
// Signature computation and match-stream folding. This is the single
// authoritative signature implementation; the scanner stamps matches
// with it for display, and the aggregator recomputes through the same
// function when grouping, so the two can never drift.
//
// The fold is commutative with respect to match order: grouping and
// counters do not depend on the interleaving across files.

use crate::core::model::{Component, Group, Match, Report, Severity, Summary};
use crate::util::constants;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

// =============================================================================
// Signature
// =============================================================================

/// Normalize a message for clustering: timestamps, UUIDs, and bare
/// integers are collapsed so syntactically similar errors land in the
/// same group, then the result is truncated.
pub fn normalize_message(message: &str) -> String {
    static TIMESTAMP: OnceLock<Regex> = OnceLock::new();
    static UUID: OnceLock<Regex> = OnceLock::new();
    static INTEGER: OnceLock<Regex> = OnceLock::new();

    let timestamp = TIMESTAMP.get_or_init(|| {
        Regex::new(r"\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2}").expect("timestamp regex")
    });
    let uuid = UUID.get_or_init(|| {
        Regex::new(r"[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}")
            .expect("uuid regex")
    });
    let integer = INTEGER.get_or_init(|| Regex::new(r"\b\d+\b").expect("integer regex"));

    let normalized = timestamp.replace_all(message, "TIMESTAMP");
    let normalized = uuid.replace_all(&normalized, "UUID");
    let normalized = integer.replace_all(&normalized, "N");

    normalized
        .chars()
        .take(constants::SIGNATURE_MESSAGE_PREFIX)
        .collect()
}

/// Stable 16-hex fingerprint of (component, pattern id, normalized
/// message).
pub fn signature(component: Component, pattern_id: &str, message: &str) -> String {
    let normalized = normalize_message(message);
    let input = format!("{}:{}:{}", component.label(), pattern_id, normalized);
    let digest = format!("{:x}", md5::compute(input.as_bytes()));
    digest[..constants::SIGNATURE_HEX_LEN].to_string()
}

/// The message a signature is derived from: the clean message, or the
/// matched text when extraction produced nothing.
pub fn signature_source(m: &Match) -> &str {
    if m.clean_message.is_empty() {
        &m.matched_text
    } else {
        &m.clean_message
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Folds the match stream into the final report. Single-consumer by
/// contract: the orchestrator owns one aggregator and feeds it from the
/// event pump thread; it is never shared across workers.
#[derive(Default)]
pub struct Aggregator {
    groups: HashMap<String, Group>,
    by_severity: BTreeMap<Severity, u64>,
    by_component: BTreeMap<Component, u64>,
    total: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one match in. Ownership transfers; the sample list keeps up
    /// to three full matches per group.
    pub fn add(&mut self, m: Match) {
        self.total += 1;
        *self.by_severity.entry(m.severity).or_insert(0) += 1;
        *self.by_component.entry(m.component).or_insert(0) += 1;

        let sig = signature(m.component, m.pattern_id, signature_source(&m));

        let group = self.groups.entry(sig.clone()).or_insert_with(|| Group {
            signature: sig,
            count: 0,
            first_message: m.clean_message.clone(),
            severity: m.severity,
            component: m.component,
            pattern_id: m.pattern_id,
            sample_matches: Vec::new(),
            files: Vec::new(),
            has_correlation: false,
            has_stack_trace: false,
        });

        group.count += 1;
        if !group.files.contains(&m.file_path) {
            group.files.push(m.file_path.clone());
        }
        group.has_correlation |= m.correlation_id.is_some();
        group.has_stack_trace |= m.stack_trace.is_some();
        if group.sample_matches.len() < constants::GROUP_SAMPLE_LIMIT {
            group.sample_matches.push(m);
        }
    }

    pub fn matches_seen(&self) -> u64 {
        self.total
    }

    /// Produce the report. Groups sort by count descending with the
    /// signature as tiebreaker so repeated runs emit byte-identical
    /// output.
    pub fn finalize(self, mut summary: Summary) -> Report {
        let mut groups: Vec<Group> = self.groups.into_values().collect();
        groups.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.signature.cmp(&b.signature))
        });

        let top_errors: Vec<Group> = groups
            .iter()
            .take(constants::TOP_ERRORS_LIMIT)
            .cloned()
            .collect();

        // The stream is the truth for the error count; intermediate
        // per-file counters are not trusted.
        summary.errors_found = self.total;

        Report {
            summary,
            totals_by_severity: self.by_severity,
            totals_by_component: self.by_component,
            groups,
            top_errors,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
