// AutoGrep - core/patterns.rs
//
// The built-in failure-pattern catalogue and the bank that compiles it.
// Core layer: pure data + compilation, no I/O.
//
// The bank is built once at engine construction and never mutated.
// Pattern records stay plain data; the bank owns a parallel array of
// compiled matchers behind the `Matcher` trait so the regex engine is a
// replaceable seam.
//
// The regex crate has no lookaround, so the suppression guards the
// catalogue would otherwise embed (retry chatter, schema DDL, CLI flags)
// live in core::filter instead and run before any pattern is tried.

use crate::core::model::{Component, Pattern, Severity};
use crate::util::constants;
use crate::util::error::PatternError;
use aho_corasick::AhoCorasick;
use regex::RegexBuilder;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;
use std::path::Path;

// =============================================================================
// Matcher seam
// =============================================================================

/// A compiled single-pattern matcher. One implementation per engine;
/// only the `regex` crate engine exists today.
pub trait Matcher: Send + Sync {
    /// Byte range of the first match in `line`, if any.
    fn find(&self, line: &str) -> Option<Range<usize>>;
}

struct RegexMatcher(regex::Regex);

impl Matcher for RegexMatcher {
    fn find(&self, line: &str) -> Option<Range<usize>> {
        self.0.find(line).map(|m| m.range())
    }
}

// =============================================================================
// Pattern bank
// =============================================================================

/// The immutable catalogue plus everything derived from it: compiled
/// matchers, the id index, and the literal prefilter automaton.
pub struct PatternBank {
    patterns: Vec<Pattern>,
    matchers: Vec<Box<dyn Matcher>>,
    by_id: HashMap<&'static str, usize>,
    prefilter: AhoCorasick,
}

impl PatternBank {
    /// Compile the full catalogue. Any failure is fatal: the catalogue
    /// is compiled in, so an error here is a defect, not an input
    /// problem.
    pub fn build() -> Result<Self, PatternError> {
        let patterns = builtin_patterns();

        let mut matchers = Vec::with_capacity(patterns.len());
        let mut by_id = HashMap::with_capacity(patterns.len());
        let mut seen: HashSet<(Component, &'static str)> = HashSet::new();
        let mut tokens: BTreeSet<String> = BTreeSet::new();

        for (idx, pattern) in patterns.iter().enumerate() {
            if !seen.insert((pattern.component, pattern.id)) {
                return Err(PatternError::DuplicateId {
                    pattern_id: pattern.id,
                });
            }

            let regex = RegexBuilder::new(pattern.regex)
                .case_insensitive(true)
                .multi_line(true)
                .build()
                .map_err(|source| {
                    tracing::error!(pattern_id = pattern.id, error = %source, "Pattern failed to compile");
                    PatternError::InvalidRegex {
                        pattern_id: pattern.id,
                        source,
                    }
                })?;
            matchers.push(Box::new(RegexMatcher(regex)) as Box<dyn Matcher>);
            by_id.insert(pattern.id, idx);

            let literals = literal_tokens(pattern.regex);
            if literals.is_empty() {
                return Err(PatternError::NoLiteralToken {
                    pattern_id: pattern.id,
                });
            }
            tokens.extend(literals);
        }

        for seed in constants::PREFILTER_SEED_TOKENS {
            tokens.insert((*seed).to_string());
        }

        let prefilter = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(tokens.iter())
            .expect("prefilter automaton from validated literal tokens");

        tracing::debug!(
            patterns = patterns.len(),
            prefilter_tokens = tokens.len(),
            "Pattern bank built"
        );

        Ok(Self {
            patterns,
            matchers,
            by_id,
            prefilter,
        })
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn get(&self, id: &str) -> Option<&Pattern> {
        self.by_id.get(id).map(|&idx| &self.patterns[idx])
    }

    /// The compiled matcher paired with `patterns()[idx]`.
    pub fn matcher(&self, idx: usize) -> &dyn Matcher {
        self.matchers[idx].as_ref()
    }

    /// Literal prefilter: does any catalogue token appear anywhere in
    /// the line? A single automaton traversal; filters the vast
    /// majority of lines before any regex runs.
    pub fn any_hit(&self, line: &str) -> bool {
        self.prefilter.is_match(line)
    }

    /// Indexes of the patterns worth trying for a file at `path`,
    /// ordered by (priority desc, severity rank, id asc).
    ///
    /// Component relevance comes from path substrings; the generic
    /// components are always included, and CRITICAL patterns are
    /// included regardless of component. Never returns an empty list.
    pub fn relevant_for(&self, path: &Path) -> Vec<usize> {
        let path_str = path.to_string_lossy().to_lowercase();

        let mut components: HashSet<Component> = HashSet::new();
        for (needle, comps) in RELEVANCE_MAP {
            if path_str.contains(needle) {
                components.extend(comps.iter().copied());
            }
        }
        components.insert(Component::SystemOs);
        components.insert(Component::Network);
        components.insert(Component::Generic);

        let mut relevant: Vec<usize> = self
            .patterns
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                components.contains(&p.component) || p.severity == Severity::Critical
            })
            .map(|(idx, _)| idx)
            .collect();

        relevant.sort_by(|&a, &b| {
            let pa = &self.patterns[a];
            let pb = &self.patterns[b];
            pb.priority
                .cmp(&pa.priority)
                .then(pa.severity.rank().cmp(&pb.severity.rank()))
                .then(pa.id.cmp(pb.id))
        });
        relevant
    }
}

/// Path substrings mapped to the component sets whose patterns apply.
const RELEVANCE_MAP: &[(&str, &[Component])] = &[
    ("sidekiq", &[Component::Sidekiq, Component::Rails, Component::Redis]),
    ("gitaly", &[Component::PraefectGitaly, Component::GitShell]),
    ("praefect", &[Component::PraefectGitaly]),
    ("postgres", &[Component::PostgreSql]),
    ("pgbouncer", &[Component::PostgreSql]),
    ("patroni", &[Component::PostgreSql]),
    ("redis", &[Component::Redis]),
    ("nginx", &[Component::Nginx, Component::Network]),
    ("workhorse", &[Component::Workhorse, Component::Rails, Component::Network]),
    ("gitlab-rails", &[Component::Rails, Component::Auth, Component::Geo]),
    ("gitlab-shell", &[Component::GitShell]),
    ("puma", &[Component::Rails, Component::Workhorse]),
    ("production", &[Component::Rails]),
    ("api_json", &[Component::Rails]),
    ("application", &[Component::Rails]),
    ("exceptions_json", &[Component::Rails]),
    ("geo", &[Component::Geo]),
    ("kube", &[Component::KubernetesHelm]),
    ("helm", &[Component::KubernetesHelm]),
    ("registry", &[Component::Workhorse, Component::Network]),
];

// =============================================================================
// Literal token extraction
// =============================================================================

/// Derive prefilter literals from a regex source: delete the regex
/// metacharacters, split on whitespace, keep lowercased tokens longer
/// than three characters.
fn literal_tokens(regex: &str) -> Vec<String> {
    let cleaned: String = regex
        .chars()
        .map(|c| match c {
            '\\' | '^' | '$' | '*' | '+' | '?' | '{' | '}' | '[' | ']' | '(' | ')' | '.' | '|' => {
                ' '
            }
            _ => c,
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|w| w.len() >= constants::PREFILTER_MIN_TOKEN_LEN)
        .map(|w| w.to_lowercase())
        .collect()
}

// =============================================================================
// Catalogue
// =============================================================================

/// Shorthand constructor with the catalogue defaults.
fn p(
    id: &'static str,
    regex: &'static str,
    component: Component,
    category: &'static str,
    severity: Severity,
) -> Pattern {
    Pattern {
        id,
        regex,
        component,
        category,
        severity,
        priority: 5,
        multiline: false,
        description: "",
    }
}

/// The complete built-in catalogue, grouped by component.
#[rustfmt::skip]
fn builtin_patterns() -> Vec<Pattern> {
    use Component::*;
    use Severity::*;

    let mut out = Vec::with_capacity(320);

    // ---------------------------------------------------------------------
    // Praefect / Gitaly: connection failures
    // ---------------------------------------------------------------------
    out.extend([
        Pattern { multiline: true, ..p("pg_conn_dial_fail", r"(?:ERROR|error).*dialing\s+failed.*(?:connection.*context\s+deadline\s+exceeded|deadline\s+exceeded)", PraefectGitaly, "infrastructure", Critical) },
        Pattern { priority: 8, description: "Dial failed: connection refused", ..p("pg_conn_refused", r"(?:ERROR|error).*dialing\s+failed.*connection\s+refused", PraefectGitaly, "infrastructure", Error) },
        p("pg_dial_fail", r"dialing\s+failed.*failed\s+to\s+dial", PraefectGitaly, "infrastructure", Error),
        p("pg_dial_generic", r"dialing\s+failed\s*:", PraefectGitaly, "infrastructure", Error),
        p("pg_conn_fail", r"failed\s+to\s+dial.*connection", PraefectGitaly, "infrastructure", Error),
        p("pg_conn_refused2", r"failed\s+to\s+dial.*connection\s+refused", PraefectGitaly, "infrastructure", Error),
        p("pg_no_route", r"failed\s+to\s+dial.*no\s+route\s+to\s+host", PraefectGitaly, "infrastructure", Error),
        p("pg_net_unreach", r"failed\s+to\s+dial.*network\s+is\s+unreachable", PraefectGitaly, "infrastructure", Error),
        p("pg_timeout", r"failed\s+to\s+dial.*timeout", PraefectGitaly, "infrastructure", Error),
    ]);

    // Praefect-specific failures
    out.extend([
        p("pf_gitaly_conn_fail", r"praefect.*failed\s+to\s+connect\s+to\s+gitaly\s+node", PraefectGitaly, "infrastructure", Critical),
        p("pf_gitaly_unreach", r"praefect.*gitaly\s+node.*unreachable", PraefectGitaly, "infrastructure", Critical),
        p("pf_no_healthy", r"praefect.*no\s+healthy\s+gitaly\s+nodes\s+available", PraefectGitaly, "infrastructure", Critical),
        p("pf_all_down", r"praefect.*all\s+gitaly\s+nodes\s+are\s+down", PraefectGitaly, "infrastructure", Critical),
        p("pf_conn_pool", r"praefect.*gitaly\s+connection\s+pool\s+exhausted", PraefectGitaly, "infrastructure", Error),
        p("pf_dial_fail", r"praefect.*gitaly.*dial.*failed", PraefectGitaly, "infrastructure", Error),
        p("pf_conn_fail2", r"praefect.*connection.*failed", PraefectGitaly, "infrastructure", Error),
        p("pf_cannot_conn", r"praefect.*cannot\s+connect", PraefectGitaly, "infrastructure", Error),
        Pattern { priority: 8, ..p("pf_dial_refused", r"praefect.*dial.*connection\s+refused", PraefectGitaly, "infrastructure", Error) },
        p("pf_deadline", r"praefect.*context\s+deadline\s+exceeded", PraefectGitaly, "infrastructure", Error),
        p("pf_no_healthy2", r"praefect.*no\s+healthy\s+nodes", PraefectGitaly, "infrastructure", Critical),
        p("pf_trans_fail", r"praefect.*transaction.*failed", PraefectGitaly, "infrastructure", Error),
        p("pf_repl_fail", r"praefect.*replication.*failed", PraefectGitaly, "infrastructure", Error),
        p("pf_primary_unreach", r"praefect.*primary.*unreachable", PraefectGitaly, "infrastructure", Critical),
        p("pf_voting_fail", r"praefect.*voting.*failed", PraefectGitaly, "infrastructure", Error),
        p("pf_metadata_inconsist", r"praefect.*metadata.*inconsistent", PraefectGitaly, "infrastructure", Warning),
        p("pf_failover", r"praefect.*failover.*triggered", PraefectGitaly, "infrastructure", Warning),
        p("pf_reconcil_fail", r"praefect.*reconciliation.*failed", PraefectGitaly, "infrastructure", Error),
        p("pf_datastore_err", r"praefect.*datastore.*error", PraefectGitaly, "infrastructure", Error),
        p("pf_sql_err", r"praefect.*sql.*error", PraefectGitaly, "infrastructure", Error),
        p("pf_postgres_err", r"praefect.*postgres.*error", PraefectGitaly, "infrastructure", Error),
        p("pf_migration_fail", r"praefect.*database.*migration.*failed", PraefectGitaly, "infrastructure", Critical),
        p("pf_election_fail", r"praefect.*election.*failed", PraefectGitaly, "infrastructure", Error),
        p("pf_elector_err", r"praefect.*elector.*error", PraefectGitaly, "infrastructure", Error),
    ]);

    // Node health
    out.extend([
        p("node_health_fail", r"failed\s+checking\s+node\s+health", PraefectGitaly, "infrastructure", Error),
        p("node_check_fail", r"node\s+health\s+check\s+failed", PraefectGitaly, "infrastructure", Error),
        p("gitaly_unhealthy", r"gitaly\s+node.*is\s+not\s+healthy", PraefectGitaly, "infrastructure", Error),
        p("gitaly_health_fail", r"gitaly\s+node.*failed\s+health\s+check", PraefectGitaly, "infrastructure", Error),
        p("pf_node_unavail", r"praefect.*node.*unavailable", PraefectGitaly, "infrastructure", Error),
        p("pf_storage_unavail", r"praefect.*storage.*unavailable", PraefectGitaly, "infrastructure", Error),
        p("health_mgr_err", r"HealthManager.*error", PraefectGitaly, "infrastructure", Error),
        p("health_check_fail", r"health.*check.*failed", PraefectGitaly, "infrastructure", Error),
    ]);

    // gRPC
    out.extend([
        Pattern { priority: 8, ..p("grpc_unavail", r"(?:rpc\s+error|RPC\s+error|grpc).*code\s*=\s*Unavailable", PraefectGitaly, "infrastructure", Error) },
        p("grpc_deadline", r"(?:rpc\s+error|RPC\s+error|grpc).*code\s*=\s*DeadlineExceeded", PraefectGitaly, "infrastructure", Error),
        p("grpc_internal", r"(?:rpc\s+error|RPC\s+error|grpc).*code\s*=\s*Internal", PraefectGitaly, "infrastructure", Error),
        p("grpc_notfound", r"(?:rpc\s+error|RPC\s+error|grpc).*code\s*=\s*NotFound", PraefectGitaly, "infrastructure", Warning),
        p("grpc_error", r"(?:rpc\s+error|RPC\s+error).*desc\s*=", PraefectGitaly, "infrastructure", Error),
        p("grpc_unavail2", r"GRPC::Unavailable", PraefectGitaly, "infrastructure", Error),
        p("grpc_deadline2", r"GRPC::DeadlineExceeded", PraefectGitaly, "infrastructure", Error),
        p("grpc_internal2", r"GRPC::Internal", PraefectGitaly, "infrastructure", Error),
        p("grpc_invalid", r"GRPC::InvalidArgument", PraefectGitaly, "infrastructure", Warning),
        p("grpc_notfound2", r"GRPC::NotFound", PraefectGitaly, "infrastructure", Warning),
        p("grpc_permission", r"GRPC::PermissionDenied", PraefectGitaly, "infrastructure", Error),
        p("grpc_exhausted", r"GRPC::ResourceExhausted", PraefectGitaly, "infrastructure", Error),
        p("grpc_precond", r"GRPC::FailedPrecondition", PraefectGitaly, "infrastructure", Error),
        p("grpc_aborted", r"GRPC::Aborted", PraefectGitaly, "infrastructure", Error),
        p("grpc_unimpl", r"GRPC::Unimplemented", PraefectGitaly, "infrastructure", Warning),
        p("grpc_dataloss", r"GRPC::DataLoss", PraefectGitaly, "infrastructure", Critical),
        p("grpc_unauth", r"GRPC::Unauthenticated", PraefectGitaly, "infrastructure", Error),
        p("grpc_transient", r"all\s+SubCons\s+are\s+in\s+TransientFailure", PraefectGitaly, "infrastructure", Error),
        p("grpc_transport", r"grpc.*createTransport\s+failed", PraefectGitaly, "infrastructure", Error),
        p("grpc_addrconn", r"addrConn.*createTransport\s+failed", PraefectGitaly, "infrastructure", Error),
    ]);

    // Timeouts, replication, storage
    out.extend([
        p("gitaly_deadline", r"gitaly.*deadline\s+exceeded", PraefectGitaly, "infrastructure", Error),
        p("gitaly_ctx_deadline", r"gitaly.*context\s+deadline\s+exceeded", PraefectGitaly, "infrastructure", Error),
        p("pf_timeout_gitaly", r"praefect.*timeout.*gitaly", PraefectGitaly, "infrastructure", Error),
        p("ctx_deadline", r"context\s+deadline\s+exceeded", PraefectGitaly, "infrastructure", Error),
        p("repl_event_fail", r"replication\s+event.*failed", PraefectGitaly, "infrastructure", Error),
        p("voting_fail", r"voting.*failed", PraefectGitaly, "infrastructure", Error),
        p("metadata_inconsist", r"metadata.*inconsistent", PraefectGitaly, "infrastructure", Warning),
        p("failover_trigger", r"failover.*triggered", PraefectGitaly, "infrastructure", Warning),
        p("reconcil_fail", r"reconciliation.*failed", PraefectGitaly, "infrastructure", Error),
        p("repl_queue_full", r"replication\s+queue.*full", PraefectGitaly, "infrastructure", Error),
        p("node_update_err", r"Error\s+updating\s+node", PraefectGitaly, "infrastructure", Error),
        p("shard_err", r"error\s+getting\s+shard", PraefectGitaly, "infrastructure", Error),
        p("shard_fail", r"could\s+not\s+get\s+shard", PraefectGitaly, "infrastructure", Error),
        p("repl_job_fail", r"replication\s+job.*failed", PraefectGitaly, "infrastructure", Error),
        p("lock_acquire_fail", r"could\s+not\s+acquire\s+lock", PraefectGitaly, "infrastructure", Error),
        p("db_locked", r"database.*is\s+locked", PraefectGitaly, "infrastructure", Error),
    ]);

    // Repository operations & streaming
    out.extend([
        p("repo_not_found", r"gitaly.*repository.*not\s+found", PraefectGitaly, "infrastructure", Error),
        p("repo_corrupt", r"gitaly.*repository.*corrupted", PraefectGitaly, "infrastructure", Critical),
        p("storage_not_found", r"gitaly.*storage.*not\s+found", PraefectGitaly, "infrastructure", Error),
        p("gitaly_perm_denied", r"gitaly.*permission.*denied", PraefectGitaly, "infrastructure", Error),
        p("git_cmd_fail", r"gitaly.*git.*command.*failed", PraefectGitaly, "infrastructure", Error),
        p("gitaly_spawn_fail", r"gitaly.*spawn.*failed", PraefectGitaly, "infrastructure", Error),
        p("gitaly_housekeep_fail", r"gitaly.*housekeeping.*failed", PraefectGitaly, "infrastructure", Error),
        p("no_remote_head", r"no\s+remote\s+HEAD\s+found", PraefectGitaly, "infrastructure", Error),
        p("stream_internal", r"finished\s+streaming\s+call\s+with\s+code\s+Internal", PraefectGitaly, "infrastructure", Error),
        p("stream_error", r"finished\s+streaming\s+call\s+with\s+error", PraefectGitaly, "infrastructure", Error),
        p("gitaly_stream_fail", r"gitaly.*stream.*failed", PraefectGitaly, "infrastructure", Error),
        p("repos_unavail", r"virtual-storage.*has.*repositories.*that\s+are\s+unavailable", PraefectGitaly, "infrastructure", Critical),
        p("repos_unavail2", r"repositories\s+that\s+are\s+unavailable", PraefectGitaly, "infrastructure", Critical),
        p("gitaly_node_unavail", r"gitaly.*node.*unavailable", PraefectGitaly, "infrastructure", Error),
        p("storage_unavail", r"storage.*unavailable", PraefectGitaly, "infrastructure", Error),
        p("gitaly_conn_reset", r"gitaly.*connection\s+reset\s+by\s+peer", PraefectGitaly, "infrastructure", Error),
        p("gitaly_broken_pipe", r"gitaly.*broken\s+pipe", PraefectGitaly, "infrastructure", Error),
        p("gitaly_transport_close", r"gitaly.*transport\s+is\s+closing", PraefectGitaly, "infrastructure", Warning),
        p("gitaly_unhealthy2", r"gitaly.*unhealthy", PraefectGitaly, "infrastructure", Error),
        p("gitaly_not_respond", r"gitaly.*not\s+responding", PraefectGitaly, "infrastructure", Error),
        p("gitaly_disk_full", r"gitaly.*disk.*full", PraefectGitaly, "infrastructure", Critical),
        p("gitaly_mem_exceeded", r"gitaly.*memory.*exceeded", PraefectGitaly, "infrastructure", Error),
    ]);

    // Security / git plumbing seen in gitaly trees
    out.extend([
        p("jwt_verify_err", r"JWT::VerificationError", PraefectGitaly, "security", Error),
        p("sig_verify_fail", r"Signature\s+verification\s+raised", PraefectGitaly, "security", Error),
        p("token_expired", r"token\s+has\s+expired", PraefectGitaly, "security", Error),
        p("token_untrusted", r"token\s+signed\s+by\s+untrusted\s+key", PraefectGitaly, "security", Error),
        p("deny_hidden_ref", r"deny\s+updating\s+a\s+hidden\s+ref", PraefectGitaly, "git", Error),
        p("pre_receive_decline", r"Pre-receive\s+hook\s+declined", PraefectGitaly, "git", Error),
        p("remote_hung_up", r"fatal:\s*the\s+remote\s+end\s+hung\s+up\s+unexpectedly", PraefectGitaly, "git", Error),
        p("early_eof", r"fatal:\s*early\s+EOF", PraefectGitaly, "git", Error),
        p("index_pack_fail", r"index-pack\s+failed", PraefectGitaly, "git", Error),
        p("fork_exec_denied", r"fork/exec.*permission\s+denied", PraefectGitaly, "system", Error),
        p("fapolicy_deny", r"fapolicyd.*denying\s+execution", PraefectGitaly, "system", Error),
        p("timestamp_window", r"timestamp.*outside.*valid.*window", PraefectGitaly, "security", Error),
        p("tls_handshake_fail", r"transport:\s*authentication\s+handshake\s+failed", PraefectGitaly, "security", Error),
        p("tls_verify_fail", r"tls:\s*failed\s+to\s+verify\s+certificate", PraefectGitaly, "security", Error),
        p("gitaly_hooks_slow", r"gitaly-hooks.*taking.*seconds.*to\s+start", PraefectGitaly, "performance", Warning),
        p("pf_level_error", r#""level"\s*:\s*"error".*praefect"#, PraefectGitaly, "infrastructure", Error),
        p("gitaly_level_error", r#""level"\s*:\s*"error".*gitaly"#, PraefectGitaly, "infrastructure", Error),
        p("pf_error_log", r"ERROR:.*praefect", PraefectGitaly, "infrastructure", Error),
        p("gitaly_error_log", r"ERROR:.*gitaly", PraefectGitaly, "infrastructure", Error),
        p("pf_fatal_log", r"FATAL:.*praefect", PraefectGitaly, "infrastructure", Critical),
        p("gitaly_fatal_log", r"FATAL:.*gitaly", PraefectGitaly, "infrastructure", Critical),
    ]);

    // ---------------------------------------------------------------------
    // PostgreSQL
    // ---------------------------------------------------------------------
    out.extend([
        Pattern { multiline: true, ..p("pg_conn_bad", r"PG::ConnectionBad", PostgreSql, "database", Error) },
        p("pg_unable_send", r"PG::UnableToSend", PostgreSql, "database", Error),
        p("pg_admin_shutdown", r"PG::AdminShutdown", PostgreSql, "database", Warning),
        p("pg_crash_shutdown", r"PG::CrashShutdown", PostgreSql, "database", Critical),
        p("pg_cannot_conn", r"PG::CannotConnectNow", PostgreSql, "database", Error),
        p("pg_too_many_conn", r"PG::TooManyConnections", PostgreSql, "database", Error),
        Pattern { multiline: true, ..p("ar_conn_timeout", r"ActiveRecord::ConnectionTimeoutError", PostgreSql, "database", Error) },
        Pattern { multiline: true, ..p("ar_conn_not_estab", r"ActiveRecord::ConnectionNotEstablished", PostgreSql, "database", Error) },
        p("pg_server_conn_fail", r"could\s+not\s+connect\s+to\s+server", PostgreSql, "database", Error),
        p("pg_pool_exhausted", r"connection\s+pool\s+exhausted", PostgreSql, "database", Error),
        p("pgbouncer_conn_fail", r"pgbouncer\s+cannot\s+connect\s+to\s+server", PostgreSql, "database", Error),
        p("pgbouncer_pooler_err", r"pgbouncer.*pooler.*error", PostgreSql, "database", Error),
        p("pgbouncer_auth_fail", r"pgbouncer.*auth.*failed", PostgreSql, "database", Error),
        p("pgbouncer_conn_crash", r"pgbouncer.*server\s+connection.*crashed", PostgreSql, "database", Error),
        p("pg_deadlock", r"ERROR.*deadlock\s+detected", PostgreSql, "database", Error),
        p("pg_serialize_fail", r"ERROR.*could\s+not\s+serialize\s+access\s+due\s+to\s+concurrent\s+update", PostgreSql, "database", Error),
        p("pg_duplicate_key", r"ERROR.*duplicate\s+key\s+value\s+violates\s+unique\s+constraint", PostgreSql, "database", Error),
        Pattern { multiline: true, ..p("ar_stmt_invalid", r"ActiveRecord::StatementInvalid", PostgreSql, "database", Error) },
        p("ar_stmt_timeout", r"ActiveRecord::StatementTimeout", PostgreSql, "database", Error),
        p("ar_invalid_fkey", r"ActiveRecord::InvalidForeignKey", PostgreSql, "database", Error),
        p("ar_not_unique", r"ActiveRecord::RecordNotUnique", PostgreSql, "database", Error),
        p("ar_deadlocked", r"ActiveRecord::Deadlocked", PostgreSql, "database", Error),
        p("pg_query_canceled", r"PG::QueryCanceled", PostgreSql, "database", Warning),
        p("pg_lock_not_avail", r"PG::LockNotAvailable", PostgreSql, "database", Error),
        p("pg_not_null_viol", r"PG::NotNullViolation", PostgreSql, "database", Error),
        p("pg_check_viol", r"PG::CheckViolation", PostgreSql, "database", Error),
        p("pg_unique_viol", r"PG::UniqueViolation", PostgreSql, "database", Error),
        p("pg_fkey_viol", r"PG::ForeignKeyViolation", PostgreSql, "database", Error),
        p("pg_readonly_trans", r"PG::ReadOnlySqlTransaction.*cannot\s+execute\s+UPDATE\s+in\s+a\s+read-only\s+transaction", PostgreSql, "database", Error),
        p("pg_disk_full", r"PG::DiskFull", PostgreSql, "database", Critical),
        p("pg_out_of_mem", r"PG::OutOfMemory", PostgreSql, "database", Critical),
        p("pg_system_err", r"PG::SystemError", PostgreSql, "database", Error),
        p("pg_starting_up", r"FATAL.*the\s+database\s+system\s+is\s+starting\s+up", PostgreSql, "database", Warning),
        p("pg_shutting_down", r"FATAL.*the\s+database\s+system\s+is\s+shutting\s+down", PostgreSql, "database", Warning),
        p("pg_shared_mem_fail", r"FATAL.*could\s+not\s+map\s+anonymous\s+shared\s+memory", PostgreSql, "database", Critical),
        p("pg_conn_slots_reserved", r"FATAL.*remaining\s+connection\s+slots\s+are\s+reserved", PostgreSql, "database", Error),
        p("pg_role_not_exist", r"FATAL.*role.*does\s+not\s+exist", PostgreSql, "database", Error),
        p("pg_db_not_exist", r"FATAL.*database.*does\s+not\s+exist", PostgreSql, "database", Error),
        p("pg_pass_auth_fail", r"FATAL.*password\s+authentication\s+failed", PostgreSql, "database", Error),
        p("pg_idle_timeout", r"FATAL.*terminating\s+connection\s+due\s+to\s+idle-in-transaction\s+timeout", PostgreSql, "database", Warning),
        p("pg_no_hba_entry", r"FATAL.*no\s+pg_hba\.conf\s+entry", PostgreSql, "database", Error),
        p("pg_too_many_clients", r"FATAL.*sorry.*too\s+many\s+clients\s+already", PostgreSql, "database", Error),
        p("pg_rel_not_exist", r"ERROR.*relation.*does\s+not\s+exist", PostgreSql, "database", Error),
        p("pg_col_not_exist", r"ERROR.*column.*does\s+not\s+exist", PostgreSql, "database", Error),
        p("pg_perm_denied_rel", r"ERROR.*permission\s+denied\s+for\s+relation", PostgreSql, "database", Error),
        p("pg_stmt_timeout", r"ERROR.*canceling\s+statement\s+due\s+to\s+statement\s+timeout", PostgreSql, "database", Warning),
        p("pg_conflict_recovery", r"ERROR.*canceling\s+statement\s+due\s+to\s+conflict\s+with\s+recovery", PostgreSql, "database", Warning),
        p("pg_repl_slot_not_exist", r"replication\s+slot.*does\s+not\s+exist", PostgreSql, "database", Error),
        p("pg_wal_stream_fail", r"could\s+not\s+start\s+WAL\s+streaming", PostgreSql, "database", Error),
        p("pg_wal_receiver_crash", r"wal_receiver.*crashed", PostgreSql, "database", Critical),
        p("pg_repl_lag_exceeded", r"replication.*lag.*exceeded", PostgreSql, "database", Warning),
        p("pg_standby_disconnect", r"standby.*disconnected", PostgreSql, "database", Warning),
        p("pg_panic_wal_refs", r"PANIC.*WAL\s+contains\s+references\s+to\s+invalid\s+pages", PostgreSql, "database", Critical),
        p("pg_panic_checkpoint", r"PANIC.*could\s+not\s+locate\s+a\s+valid\s+checkpoint\s+record", PostgreSql, "database", Critical),
        p("pg_panic_invalid_page", r"PANIC.*invalid\s+page\s+in\s+block", PostgreSql, "database", Critical),
        p("pg_checkpoint_freq", r"LOG.*checkpoints\s+are\s+occurring\s+too\s+frequently", PostgreSql, "database", Warning),
    ]);

    // ---------------------------------------------------------------------
    // Redis
    // ---------------------------------------------------------------------
    out.extend([
        p("redis_conn_refused", r"Redis.*connection.*refused", Redis, "cache", Error),
        p("redis_timeout", r"Redis.*timeout", Redis, "cache", Error),
        p("redis_timeout_err", r"Redis::TimeoutError", Redis, "cache", Error),
        p("redis_read_timeout", r"Redis::ReadTimeoutError", Redis, "cache", Error),
        p("redis_write_timeout", r"Redis::WriteTimeoutError", Redis, "cache", Error),
        p("redis_conn_err", r"Redis::ConnectionError", Redis, "cache", Error),
        p("redis_cannot_conn", r"Redis::CannotConnectError", Redis, "cache", Error),
        p("redis_protocol_err", r"Redis::ProtocolError", Redis, "cache", Error),
        p("redis_conn_fail", r"Could\s+not\s+connect\s+to\s+Redis", Redis, "cache", Error),
        p("redis_conn_lost", r"Redis.*connection.*lost", Redis, "cache", Error),
        p("redis_misconf", r"MISCONF\s+Redis\s+is\s+configured\s+to\s+save\s+RDB\s+snapshots.*unable\s+to\s+persist", Redis, "cache", Error),
        p("redis_oom", r"OOM\s+command\s+not\s+allowed\s+when\s+used\s+memory", Redis, "cache", Critical),
        p("redis_readonly", r"Redis.*READONLY.*You.*can.*write", Redis, "cache", Error),
        p("redis_clusterdown", r"Redis.*CLUSTERDOWN.*Hash.*slot.*not.*served", Redis, "cache", Error),
        p("redis_moved", r"Redis.*MOVED.*slot", Redis, "cache", Warning),
        p("redis_crossslot", r"Redis.*CROSSSLOT.*Keys.*in.*request", Redis, "cache", Error),
        p("redis_masterdown", r"Redis.*MASTERDOWN.*Link.*with.*MASTER.*is.*down", Redis, "cache", Error),
        p("redis_sentinel_err", r"Redis.*sentinel.*error", Redis, "cache", Error),
        p("redis_failover_fail", r"Redis.*failover.*failed", Redis, "cache", Error),
        p("redis_master_not_found", r"Redis.*master.*not.*found", Redis, "cache", Error),
        p("redis_repl_err", r"Redis.*replication.*error", Redis, "cache", Error),
        p("redis_noauth", r"Redis.*NOAUTH.*Authentication.*required", Redis, "cache", Error),
        p("redis_wrongtype", r"Redis.*WRONGTYPE.*Operation.*against.*key", Redis, "cache", Error),
        p("redis_loading", r"Redis.*LOADING.*Redis.*is.*loading", Redis, "cache", Warning),
        p("redis_busy", r"Redis.*BUSY.*Redis.*is.*busy", Redis, "cache", Warning),
    ]);

    // ---------------------------------------------------------------------
    // Sidekiq
    // ---------------------------------------------------------------------
    out.extend([
        Pattern { multiline: true, ..p("sidekiq_retry_err", r"Sidekiq.*RetryError", Sidekiq, "background_jobs", Error) },
        p("sidekiq_shutdown", r"Sidekiq.*Shutdown", Sidekiq, "background_jobs", Warning),
        p("sidekiq_redis_timeout", r"Sidekiq.*Redis::TimeoutError", Sidekiq, "background_jobs", Error),
        p("sidekiq_redis_conn", r"Sidekiq.*Redis::ConnectionError", Sidekiq, "background_jobs", Error),
        p("sidekiq_job_timeout", r"Sidekiq.*job.*timeout", Sidekiq, "background_jobs", Error),
        p("sidekiq_mem_exceeded", r"Sidekiq.*memory.*exceeded", Sidekiq, "background_jobs", Error),
        p("sidekiq_queue_full", r"Sidekiq.*queue.*full", Sidekiq, "background_jobs", Error),
        p("sidekiq_worker_died", r"Sidekiq.*worker.*died", Sidekiq, "background_jobs", Error),
        p("sidekiq_poison_pill", r"Sidekiq.*poison.*pill", Sidekiq, "background_jobs", Critical),
        p("sidekiq_malformed_job", r"Sidekiq.*malformed.*job", Sidekiq, "background_jobs", Error),
        p("sidekiq_deserial_fail", r"Sidekiq.*deserialization.*failed", Sidekiq, "background_jobs", Error),
        p("sidekiq_scheduler_err", r"Sidekiq.*scheduler.*error", Sidekiq, "background_jobs", Error),
        p("sidekiq_batch_fail", r"Sidekiq.*batch.*failed", Sidekiq, "background_jobs", Error),
        p("sidekiq_retry_exhausted", r"Sidekiq.*retry.*exhausted", Sidekiq, "background_jobs", Error),
        p("sidekiq_processor_crash", r"Sidekiq.*processor.*crashed", Sidekiq, "background_jobs", Error),
        p("sidekiq_heartbeat_fail", r"Sidekiq.*heartbeat.*failed", Sidekiq, "background_jobs", Error),
        p("sidekiq_thread_died", r"Sidekiq.*thread.*died", Sidekiq, "background_jobs", Error),
        p("sidekiq_manager_died", r"Sidekiq.*manager.*died", Sidekiq, "background_jobs", Error),
        p("sidekiq_fetcher_died", r"Sidekiq.*fetcher.*died", Sidekiq, "background_jobs", Error),
        p("sidekiq_oom_killed", r"Sidekiq.*OOM.*killed", Sidekiq, "background_jobs", Critical),
        p("sidekiq_worker_stuck", r"Sidekiq.*worker.*stuck", Sidekiq, "background_jobs", Error),
        p("job_failed_times", r"Job.*failed.*times", Sidekiq, "background_jobs", Error),
        Pattern { multiline: true, ..p("job_raised_exception", r"Job\s+raised\s+exception", Sidekiq, "background_jobs", Error) },
        p("job_status_failed", r"job_status.*failed", Sidekiq, "background_jobs", Error),
        p("active_job_failed", r"ActiveJob.*failed", Sidekiq, "background_jobs", Error),
        p("failed_process_args", r"Failed\s+to\s+process.*with\s+args", Sidekiq, "background_jobs", Error),
        p("sidekiq_retries_exhausted", r"sidekiq_retries_exhausted", Sidekiq, "background_jobs", Error),
        p("sidekiq_record_not_found", r"WARN.*ActiveRecord::RecordNotFound", Sidekiq, "background_jobs", Warning),
        p("sidekiq_interrupted_exhausted", r"sidekiq_interruptions_exhausted", Sidekiq, "background_jobs", Error),
        p("sidekiq_interrupted_count_exceeded", r"interrupted_count.*exceeded", Sidekiq, "background_jobs", Error),
        p("sidekiq_adding_dead_job_interrupted", r"adding\s+dead.*job.*to\s+interrupted\s+queue", Sidekiq, "background_jobs", Error),
        p("sidekiq_worker_dead_cleanup", r"worker_dead.*cleaning.*working\s+queue", Sidekiq, "background_jobs", Warning),
        p("sidekiq_job_cancelled", r"Canceling\s+thread\s+with\s+CancelledError", Sidekiq, "background_jobs", Warning),
        p("sidekiq_cancelled_error", r"Gitlab::SidekiqDaemon::Monitor::CancelledError", Sidekiq, "background_jobs", Warning),
        p("sidekiq_exceed_limit_error", r"ExceedLimitError", Sidekiq, "background_jobs", Error),
        p("sidekiq_job_exceeds_payload", r"job\s+exceeds\s+payload\s+size\s+limit", Sidekiq, "background_jobs", Error),
        p("sidekiq_payload_too_large", r"payload.*size.*exceeded.*limit", Sidekiq, "background_jobs", Error),
        p("sidekiq_duplicate_check_fail", r"duplicate.*job.*check.*failed", Sidekiq, "background_jobs", Error),
        p("sidekiq_concurrency_limit_exceeded", r"concurrency.*limit.*exceeded", Sidekiq, "background_jobs", Warning),
        p("sidekiq_invalid_routing_rule", r"InvalidRoutingRuleError", Sidekiq, "background_jobs", Error),
        p("sidekiq_invalid_queue_error", r"InvalidQueueError", Sidekiq, "background_jobs", Error),
        p("sidekiq_enqueue_from_transaction", r"EnqueueFromTransactionError", Sidekiq, "background_jobs", Error),
        p("sidekiq_cannot_enqueue_transaction", r"cannot\s+be\s+enqueued\s+inside\s+a\s+transaction", Sidekiq, "background_jobs", Error),
        p("sidekiq_job_retry_handled", r"Sidekiq::JobRetry::Handled", Sidekiq, "background_jobs", Warning),
        p("sidekiq_job_status_fail", r#""job_status"\s*:\s*"fail""#, Sidekiq, "background_jobs", Error),
        p("sidekiq_job_dropped", r#""job_status"\s*:\s*"dropped""#, Sidekiq, "background_jobs", Warning),
        p("sidekiq_watchdog_fail", r"watchdog.*failed", Sidekiq, "background_jobs", Error),
        p("sidekiq_import_stuck", r"stuck.*import.*job", Sidekiq, "background_jobs", Error),
        p("bulk_import_pipeline_fail", r"Pipeline\s+failed.*bulk.*import", Sidekiq, "background_jobs", Error),
        p("bulk_import_invalid_status", r"Pipeline\s+in\s+invalid\s+status", Sidekiq, "background_jobs", Error),
        p("sidekiq_exception_class", r#""exception\.class"\s*:\s*"[^"]+""#, Sidekiq, "background_jobs", Error),
        p("sidekiq_exception_message", r#""exception\.message"\s*:\s*"[^"]+""#, Sidekiq, "background_jobs", Error),
        p("sidekiq_error_message", r#""error_message"\s*:\s*"[^"]+""#, Sidekiq, "background_jobs", Error),
        p("sidekiq_error_class", r#""error_class"\s*:\s*"[^"]+""#, Sidekiq, "background_jobs", Error),
        p("sidekiq_jobs_dead_total", r"sidekiq_jobs_dead_total", Sidekiq, "background_jobs", Error),
        p("sidekiq_job_moved_to_dead", r"job.*moved.*to.*dead.*set", Sidekiq, "background_jobs", Error),
        p("reliable_fetch_cleanup_fail", r"Reliable.*Fetcher.*cleanup.*failed", Sidekiq, "background_jobs", Error),
        p("reliable_fetch_heartbeat_missing", r"heartbeat.*missing.*worker.*dead", Sidekiq, "background_jobs", Warning),
        p("sidekiq_perform_failure", r"perform_failure.*exception", Sidekiq, "background_jobs", Error),
    ]);

    // ---------------------------------------------------------------------
    // Rails application
    // ---------------------------------------------------------------------
    out.extend([
        Pattern { multiline: true, ..p("av_template_err", r"ActionView::Template::Error", Rails, "application", Error) },
        p("ac_routing_err", r"ActionController::RoutingError", Rails, "application", Error),
        p("ac_param_missing", r"ActionController::ParameterMissing", Rails, "application", Error),
        p("ac_unpermitted_params", r"ActionController::UnpermittedParameters", Rails, "application", Warning),
        p("am_validation_err", r"ActiveModel::ValidationError", Rails, "application", Error),
        p("ar_record_invalid", r"ActiveRecord::RecordInvalid", Rails, "application", Error),
        p("ar_record_not_found", r"ActiveRecord::RecordNotFound", Rails, "application", Warning),
        p("ar_record_not_saved", r"ActiveRecord::RecordNotSaved", Rails, "application", Error),
        p("ar_unknown_attr", r"ActiveRecord::UnknownAttributeError", Rails, "application", Error),
        p("ar_stale_object", r"ActiveRecord::StaleObjectError", Rails, "application", Error),
        p("as_msg_verifier_invalid", r"ActiveSupport::MessageVerifier::InvalidSignature", Rails, "application", Error),
        p("as_msg_encryptor_invalid", r"ActiveSupport::MessageEncryptor::InvalidMessage", Rails, "application", Error),
        p("validation_fail_blank", r"Validation\s+failed.*can't\s+be\s+blank", Rails, "application", Error),
        Pattern { multiline: true, ..p("no_method_err", r"NoMethodError.*undefined\s+method", Rails, "application", Error) },
        Pattern { multiline: true, ..p("name_err", r"NameError.*undefined.*variable", Rails, "application", Error) },
        Pattern { multiline: true, ..p("argument_err", r"ArgumentError", Rails, "application", Error) },
        Pattern { multiline: true, ..p("runtime_err", r"RuntimeError", Rails, "application", Error) },
        Pattern { multiline: true, ..p("standard_err", r"StandardError", Rails, "application", Error) },
        p("load_err", r"LoadError.*cannot\s+load\s+such\s+file", Rails, "application", Error),
        p("type_err", r"TypeError.*no\s+implicit\s+conversion", Rails, "application", Error),
        p("stack_err", r"SystemStackError.*stack\s+level\s+too\s+deep", Rails, "application", Error),
        p("json_parse_err", r"JSON::ParserError", Rails, "application", Error),
        p("encoding_invalid_byte", r"Encoding::InvalidByteSequenceError", Rails, "application", Error),
        p("uri_invalid", r"URI::InvalidURIError", Rails, "application", Error),
        p("timeout_err", r"Timeout::Error", Rails, "application", Error),
        p("execution_expired", r"execution\s+expired", Rails, "application", Error),
        p("rack_timeout", r"Rack::Timeout::RequestTimeoutException", Rails, "application", Error),
        p("gitlab_deadline_exceeded", r"Gitlab::RequestContext::RequestDeadlineExceeded", Rails, "application", Error),
    ]);

    // ---------------------------------------------------------------------
    // Kubernetes / Helm
    // ---------------------------------------------------------------------
    out.extend([
        p("k8s_job_backoff", r"Job\s+failed:\s*BackoffLimitExceeded", KubernetesHelm, "kubernetes", Error),
        p("helm_no_deployed", r"UPGRADE\s+FAILED:.*has\s+no\s+deployed\s+releases", KubernetesHelm, "kubernetes", Error),
        p("helm_patch_fail", r"UPGRADE\s+FAILED:\s*cannot\s+patch.*with\s+kind\s+Deployment", KubernetesHelm, "kubernetes", Error),
        p("helm_type_mismatch", r"UPGRADE\s+FAILED:\s*type\s+mismatch", KubernetesHelm, "kubernetes", Error),
        p("k8s_image_pull_backoff", r"ImagePullBackOff", KubernetesHelm, "kubernetes", Error),
        p("k8s_err_image_pull", r"ErrImagePull", KubernetesHelm, "kubernetes", Error),
        p("k8s_failed_pull_image", r"Failed\s+to\s+pull\s+image", KubernetesHelm, "kubernetes", Error),
        p("k8s_manifest_unknown", r"manifest\s+unknown", KubernetesHelm, "kubernetes", Error),
        p("k8s_crashloop", r"CrashLoopBackOff", KubernetesHelm, "kubernetes", Error),
        p("k8s_evicted", r"pod.*evicted", KubernetesHelm, "kubernetes", Warning),
        p("k8s_system_oom", r"System\s+OOM\s+encountered,\s*victim\s+process", KubernetesHelm, "kubernetes", Critical),
        p("k8s_mem_cgroup_oom", r"Memory\s+cgroup\s+out\s+of\s+memory", KubernetesHelm, "kubernetes", Critical),
        p("k8s_liveness_fail", r"Liveness\s+probe\s+failed", KubernetesHelm, "kubernetes", Warning),
        p("k8s_readiness_fail", r"Readiness\s+probe\s+failed", KubernetesHelm, "kubernetes", Warning),
    ]);

    // ---------------------------------------------------------------------
    // SSL / Certificates
    // ---------------------------------------------------------------------
    out.extend([
        p("ssl_local_issuer", r"unable\s+to\s+get\s+local\s+issuer\s+certificate", SslCertificates, "security", Error),
        p("ssl_verify_first", r"unable\s+to\s+verify\s+the\s+first\s+certificate", SslCertificates, "security", Error),
        p("ssl_unknown_authority", r"certificate\s+signed\s+by\s+unknown\s+authority", SslCertificates, "security", Error),
        p("ssl_self_signed", r"self\s+signed\s+certificate\s+in\s+certificate\s+chain", SslCertificates, "security", Error),
        p("ssl_x509_legacy", r"x509:\s*certificate\s+relies\s+on\s+legacy\s+Common\s+Name\s+field", SslCertificates, "security", Warning),
        p("ssl_key_mismatch", r"key\s+values\s+mismatch", SslCertificates, "security", Error),
        p("ssl_cert_expired", r"certificate\s+has\s+expired", SslCertificates, "security", Error),
        p("ssl_problem", r"SSL\s+certificate\s+problem", SslCertificates, "security", Error),
        p("ssl_connect_err", r"SSL_connect\s+returned=1\s+errno=0\s+state=error", SslCertificates, "security", Error),
        p("ssl_x509_routines", r"SSL:\s*error:.*:x509\s+certificate\s+routines", SslCertificates, "security", Error),
    ]);

    // ---------------------------------------------------------------------
    // Geo replication
    // ---------------------------------------------------------------------
    out.extend([
        p("geo_secondary_not_config", r"Geo\s+secondary\s+database\s+is\s+not\s+configured", Geo, "replication", Error),
        p("geo_db_writable", r"Geo\s+site\s+has\s+a\s+database\s+that\s+is\s+writable", Geo, "replication", Error),
        p("geo_tracking_not_config", r"Geo.*tracking\s+database.*not\s+configured", Geo, "replication", Error),
        p("geo_not_checksummable", r"Repository\s+cannot\s+be\s+checksummable", Geo, "replication", Error),
        p("geo_file_not_checksummable", r"File\s+is\s+not\s+checksummable", Geo, "replication", Error),
        p("geo_primary_missing", r"The\s+file\s+is\s+missing\s+on\s+the\s+Geo\s+primary\s+site", Geo, "replication", Error),
        p("geo_primary_missing_file", r#""primary_missing_file"\s*:\s*true"#, Geo, "replication", Error),
        p("geo_verification_timeout", r"Verification\s+timed\s+out\s+after", Geo, "replication", Error),
        p("geo_unexpected_disconnect", r"unexpected\s+disconnect\s+while\s+reading\s+sideband\s+packet", Geo, "replication", Error),
        p("geo_site_unhealthy", r"Geo.*site.*unhealthy", Geo, "replication", Error),
        p("geo_repos_unavail", r"Geo.*repositories.*unavailable", Geo, "replication", Critical),
        p("geo_tracking_inconsist", r"Geo.*tracking.*inconsistent", Geo, "replication", Error),
    ]);

    // ---------------------------------------------------------------------
    // Nginx
    // ---------------------------------------------------------------------
    out.extend([
        p("nginx_worker_exit", r"nginx.*worker.*process.*exited.*on.*signal", Nginx, "proxy", Error),
        p("nginx_upstream_close", r"nginx.*upstream.*prematurely.*closed.*connection", Nginx, "proxy", Error),
        p("nginx_ssl_handshake", r"nginx.*SSL.*handshake.*failed", Nginx, "proxy", Error),
        p("nginx_client_large_body", r"nginx.*client.*intended.*to.*send.*too.*large.*body", Nginx, "proxy", Error),
        p("nginx_upstream_invalid", r"nginx.*upstream.*sent.*invalid.*header", Nginx, "proxy", Error),
        p("nginx_connect_refused", r"nginx.*connect.*failed.*Connection.*refused", Nginx, "proxy", Error),
        p("nginx_recv_reset", r"nginx.*recv.*failed.*Connection.*reset.*by.*peer", Nginx, "proxy", Error),
        p("nginx_upstream_timeout", r"upstream.*timed\s+out", Nginx, "proxy", Error),
        p("nginx_no_live_upstream", r"no\s+live\s+upstreams", Nginx, "proxy", Error),
    ]);

    // ---------------------------------------------------------------------
    // Workhorse (and Puma front-line)
    // ---------------------------------------------------------------------
    out.extend([
        p("workhorse_keywatcher_eof", r"keywatcher:.*pubsub\s+receive:.*EOF", Workhorse, "redis", Error),
        p("workhorse_keywatcher_misconf", r"keywatcher:.*pubsub\s+receive:.*MISCONF", Workhorse, "redis", Error),
        p("workhorse_redis_no_connection", r"no\s+redis\s+connection", Workhorse, "redis", Error),
        p("workhorse_redis_sentinel_unreachable", r"all\s+sentinels.*are\s+unreachable", Workhorse, "redis", Error),
        p("workhorse_gitaly_lookup_fail", r"look\s+up\s+for\s+gitaly\s+connection", Workhorse, "gitaly", Error),
        p("workhorse_gitaly_sidechannel_err", r"sidechannel\s+error", Workhorse, "gitaly", Error),
        p("workhorse_gitaly_archive_fail", r"SendArchive:.*failed", Workhorse, "gitaly", Error),
        p("workhorse_upload_injected_param", r"injected\s+client\s+parameter", Workhorse, "upload", Error),
        p("workhorse_upload_too_many_files", r"upload\s+request\s+contains\s+more\s+than.*files", Workhorse, "upload", Error),
        p("workhorse_upload_unexpected_eof", r"unexpected\s+EOF\s+when\s+reading\s+multipart", Workhorse, "upload", Error),
        p("workhorse_upload_entity_too_large", r"entity\s+too\s+large", Workhorse, "upload", Error),
        p("workhorse_objectstore_put_fail", r"PUT\s+request.*returned:", Workhorse, "objectstore", Error),
        p("workhorse_queue_too_many_requests", r"too\s+many\s+requests\s+queued", Workhorse, "queueing", Error),
        p("workhorse_queue_timeout", r"queueing\s+timedout", Workhorse, "queueing", Error),
        p("workhorse_api_no_response", r"no\s+api\s+response:\s*status", Workhorse, "api", Error),
        p("workhorse_api_preauth_fail", r"preAuthorizeHandler.*do\s+request", Workhorse, "api", Error),
        p("workhorse_api_decode_fail", r"decode\s+authorization\s+response", Workhorse, "api", Error),
        p("workhorse_api_response_limit", r"response\s+body\s+exceeded\s+maximum\s+buffer\s+size", Workhorse, "api", Error),
        p("workhorse_http_no_content_length", r"header\s+Content-Length\s+was\s+not\s+set", Workhorse, "http", Error),
        p("workhorse_http_content_changed", r"content\s+has\s+changed\s+since\s+first\s+request", Workhorse, "http", Error),
        p("workhorse_zip_invalid", r"zip\s+archive\s+format\s+invalid", Workhorse, "artifacts", Error),
        p("workhorse_zip_entry_not_found", r"zip\s+entry\s+not\s+found", Workhorse, "artifacts", Error),
        p("workhorse_zip_limits_reached", r"zip\s+processing\s+limits\s+reached", Workhorse, "artifacts", Error),
        p("workhorse_channel_connect_fail", r"Channel:\s*connecting\s+to\s+server\s+failed", Workhorse, "websocket", Error),
        p("workhorse_channel_upgrade_fail", r"upgrading\s+client\s+to\s+websocket\s+failed", Workhorse, "websocket", Error),
        p("workhorse_context_canceled", r"context\s+canceled", Workhorse, "timeout", Warning),
        p("workhorse_sendurl_copy_fail", r"SendURL:\s*Copy\s+response", Workhorse, "sendurl", Error),
        p("workhorse_body_limit_exceeded", r"body\s+limit.*exceeded", Workhorse, "proxy", Error),
        Pattern { multiline: true, ..p("workhorse_panic_recovered", r"panic.*recovered", Workhorse, "application", Critical) },
        p("workhorse_handler_aborted", r"Handler\s+aborted\s+connection", Workhorse, "application", Warning),
        p("workhorse_badgateway", r"badgateway:.*failed\s+to\s+receive\s+response", Workhorse, "proxy", Error),
        p("workhorse_s3_multipart_complete_fail", r"CompleteMultipartUpload\s+request.*returned", Workhorse, "objectstore", Error),
        p("workhorse_s3_part_upload_fail", r"upload\s+part\s+\d+:", Workhorse, "objectstore", Error),
        p("workhorse_image_resize_fail", r"read\s+image\s+resize\s+params", Workhorse, "imageresizer", Error),
        p("workhorse_image_resize_cmd_fail", r"gitlab-resize-image.*failed", Workhorse, "imageresizer", Error),
        p("workhorse_circuit_breaker_open", r"circuit\s+breaker.*open", Workhorse, "circuitbreaker", Warning),
        p("workhorse_circuit_breaker_error", r"gobreaker:.*error", Workhorse, "circuitbreaker", Error),
        p("workhorse_lsif_parse_fail", r"lsif\s+parser:", Workhorse, "lsif", Error),
        p("workhorse_jwt_sign_fail", r"secret\.JWTTokenString:\s*sign\s+JWT", Workhorse, "auth", Error),
        p("workhorse_cert_pool_load_fail", r"failed\s+to\s+load\s+system\s+cert\s+pool", Workhorse, "tls", Error),
        p("workhorse_config_redis_fail", r"unable\s+to\s+configure\s+redis\s+client", Workhorse, "config", Error),
        p("puma_worker_timeout", r"Puma.*timed\s+out.*worker", Workhorse, "application", Error),
        p("puma_worker_spinning", r"Puma.*worker.*spinning\s+at\s+100%", Workhorse, "application", Error),
    ]);

    // ---------------------------------------------------------------------
    // Git / Shell
    // ---------------------------------------------------------------------
    out.extend([
        p("gitlab_shell_err", r"GitLab.*Shell.*error", GitShell, "git_access", Error),
        p("gitlab_shell_auth_fail", r"GitLab.*Shell.*authentication.*failed", GitShell, "git_access", Error),
        p("git_remote_hung_up", r"fatal:.*The\s+remote\s+end\s+hung\s+up\s+unexpectedly", GitShell, "git_access", Error),
        p("git_not_repo", r"fatal:.*not\s+a\s+git\s+repository", GitShell, "git_access", Error),
        p("git_repo_corrupt", r"fatal:.*repository.*corrupt", GitShell, "git_access", Critical),
        p("git_could_not_read", r"Could\s+not\s+read\s+from\s+remote\s+repository", GitShell, "git_access", Error),
        p("git_push_fail", r"error:.*failed\s+to\s+push\s+some\s+refs", GitShell, "git_access", Error),
    ]);

    // ---------------------------------------------------------------------
    // CI/CD
    // ---------------------------------------------------------------------
    out.extend([
        p("pipeline_fail", r"Pipeline.*failed", CiCd, "ci_cd", Error),
        p("job_fail_exit", r"Job.*failed.*exit.*code.*[1-9]\d*", CiCd, "ci_cd", Error),
        p("runner_not_avail", r"Runner.*not.*available", CiCd, "ci_cd", Error),
        p("runner_auth_fail", r"Runner.*authentication.*failed", CiCd, "ci_cd", Error),
        p("runner_executor_err", r"Runner.*executor.*error", CiCd, "ci_cd", Error),
        p("build_fail", r"Build.*failed", CiCd, "ci_cd", Error),
        p("job_timeout", r"ERROR:\s*Job\s+failed:\s*execution\s+took\s+longer\s+than", CiCd, "ci_cd", Error),
    ]);

    // ---------------------------------------------------------------------
    // Auth
    // ---------------------------------------------------------------------
    out.extend([
        p("http_401", r"\b401\s+Unauthorized\b", Auth, "security", Error),
        p("http_403", r"\b403\s+Forbidden\b", Auth, "security", Error),
        p("oauth_err", r"OAuth.*error", Auth, "security", Error),
        p("oauth2_invalid", r"OAuth2.*invalid.*grant", Auth, "security", Error),
        p("jwt_expired", r"JWT.*expired", Auth, "security", Error),
        p("jwt_sig_fail", r"JWT.*signature.*verification.*failed", Auth, "security", Error),
        p("auth_fail", r"authentication.*failed", Auth, "security", Error),
        p("pass_auth_fail", r"password\s+authentication\s+failed", Auth, "security", Error),
        p("ldap_auth_fail", r"LDAP.*authentication.*failed", Auth, "security", Error),
        p("saml_auth_fail", r"SAML.*authentication.*failed", Auth, "security", Error),
        p("perm_denied", r"permission\s+denied", Auth, "security", Error),
        p("invalid_token", r"Invalid.*token", Auth, "security", Error),
        p("ldap_conn_fail", r"LDAP.*connection.*failed", Auth, "security", Error),
        p("access_denied", r"access.*denied", Auth, "security", Error),
    ]);

    // ---------------------------------------------------------------------
    // Network
    // ---------------------------------------------------------------------
    out.extend([
        p("tcp_conn_refused", r"Failed\s+to\s+open\s+TCP\s+connection.*Connection\s+refused", Network, "infrastructure", Error),
        p("conn_timeout", r"Connection\s+timed\s+out", Network, "infrastructure", Error),
        p("net_unreachable", r"Network\s+is\s+unreachable", Network, "infrastructure", Error),
        p("conn_reset_peer", r"Connection\s+reset\s+by\s+peer", Network, "infrastructure", Error),
        p("broken_pipe", r"Broken\s+pipe", Network, "infrastructure", Error),
        p("no_route_host", r"No\s+route\s+to\s+host", Network, "infrastructure", Error),
        p("name_service_unknown", r"Name\s+or\s+service\s+not\s+known", Network, "infrastructure", Error),
        p("http_502", r"\b502\s+Bad\s+Gateway\b", Network, "infrastructure", Error),
        p("http_503", r"\b503\s+Service\s+Unavailable\b", Network, "infrastructure", Error),
        p("http_504", r"\b504\s+Gateway\s+Timeout\b", Network, "infrastructure", Error),
        p("http_500", r"\b500\s+Internal\s+Server\s+Error\b", Network, "infrastructure", Error),
    ]);

    // ---------------------------------------------------------------------
    // System / OS
    // ---------------------------------------------------------------------
    out.extend([
        p("oom", r"Out\s+of\s+memory", SystemOs, "system", Critical),
        p("oom_killer", r"OOM\s+killer", SystemOs, "system", Critical),
        p("cannot_alloc_mem", r"Cannot\s+allocate\s+memory", SystemOs, "system", Critical),
        p("no_space_left", r"No\s+space\s+left\s+on\s+device", SystemOs, "system", Critical),
        p("disk_quota_exceeded", r"Disk\s+quota\s+exceeded", SystemOs, "system", Error),
        p("too_many_open_files", r"Too\s+many\s+open\s+files", SystemOs, "system", Error),
        p("segfault", r"segmentation\s+fault", SystemOs, "system", Critical),
        p("kernel_killed", r"kernel:.*killed\s+process", SystemOs, "system", Critical),
        p("filesystem_full", r"filesystem.*full", SystemOs, "system", Critical),
        p("inode_exhausted", r"inode.*exhausted", SystemOs, "system", Critical),
    ]);

    // ---------------------------------------------------------------------
    // Generic
    // ---------------------------------------------------------------------
    out.extend([
        p("level_error", r#""level"\s*:\s*"error".*"error"\s*:\s*"[^"]+""#, Generic, "generic", Error),
        p("level_fatal", r#""level"\s*:\s*"fatal""#, Generic, "generic", Critical),
        p("fatal_error", r"FATAL:", Generic, "generic", Critical),
        p("critical_error", r"CRITICAL:", Generic, "generic", Critical),
        p("panic", r"PANIC:", Generic, "generic", Critical),
        p("kernel_panic", r"kernel\s+panic", Generic, "generic", Critical),
        Pattern { multiline: true, ..p("unhandled_exception", r"unhandled\s+exception", Generic, "generic", Error) },
        Pattern { multiline: true, ..p("uncaught_exception", r"uncaught\s+exception", Generic, "generic", Error) },
        Pattern { multiline: true, description: "Unhandled Python exception", ..p("python_traceback", r"Traceback\s+\(most\s+recent\s+call\s+last\)", Generic, "generic", Error) },
    ]);

    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_builds() {
        let bank = PatternBank::build().expect("catalogue must compile");
        assert!(
            bank.patterns().len() > 250,
            "catalogue unexpectedly small: {}",
            bank.patterns().len()
        );
    }

    #[test]
    fn test_ids_unique_per_component() {
        let patterns = builtin_patterns();
        let mut seen = HashSet::new();
        for p in &patterns {
            assert!(
                seen.insert((p.component, p.id)),
                "duplicate pattern id: {}",
                p.id
            );
        }
    }

    #[test]
    fn test_every_pattern_has_literal_token() {
        for p in builtin_patterns() {
            assert!(
                !literal_tokens(p.regex).is_empty(),
                "pattern {} yields no prefilter token",
                p.id
            );
        }
    }

    #[test]
    fn test_literal_token_extraction() {
        let tokens = literal_tokens(r"(?:rpc\s+error|RPC\s+error|grpc).*code\s*=\s*Unavailable");
        assert!(tokens.contains(&"error".to_string()));
        assert!(tokens.contains(&"unavailable".to_string()));
        // Short fragments from escapes must not survive.
        assert!(!tokens.iter().any(|t| t.len() < 4));
    }

    #[test]
    fn test_prefilter_hits_seed_tokens() {
        let bank = PatternBank::build().unwrap();
        assert!(bank.any_hit("2024-01-01 something went wrong: Connection REFUSED"));
        assert!(bank.any_hit("panic: runtime error"));
        assert!(!bank.any_hit("all quiet on this line"));
    }

    #[test]
    fn test_relevant_for_never_empty() {
        let bank = PatternBank::build().unwrap();
        let relevant = bank.relevant_for(Path::new("some/unknown/file.bin"));
        assert!(!relevant.is_empty());
        // Generic fallback set always contains the generic patterns.
        assert!(relevant
            .iter()
            .any(|&i| bank.patterns()[i].component == Component::Generic));
    }

    #[test]
    fn test_relevant_for_sidekiq_includes_redis() {
        let bank = PatternBank::build().unwrap();
        let relevant = bank.relevant_for(Path::new("var/log/gitlab/sidekiq/current"));
        let components: HashSet<Component> = relevant
            .iter()
            .map(|&i| bank.patterns()[i].component)
            .collect();
        assert!(components.contains(&Component::Sidekiq));
        assert!(components.contains(&Component::Rails));
        assert!(components.contains(&Component::Redis));
    }

    #[test]
    fn test_critical_included_regardless_of_component() {
        let bank = PatternBank::build().unwrap();
        let relevant = bank.relevant_for(Path::new("gitaly/current"));
        // Redis is not relevant for a gitaly path, but its CRITICAL
        // pattern must still be present.
        assert!(relevant.iter().any(|&i| bank.patterns()[i].id == "redis_oom"));
        // Non-critical Redis patterns must not be.
        assert!(!relevant
            .iter()
            .any(|&i| bank.patterns()[i].id == "redis_timeout_err"));
    }

    #[test]
    fn test_relevance_sort_is_deterministic() {
        let bank = PatternBank::build().unwrap();
        let a = bank.relevant_for(Path::new("gitaly/current"));
        let b = bank.relevant_for(Path::new("gitaly/current"));
        assert_eq!(a, b);
        // Priority 8 entries come before the default tier.
        let first = &bank.patterns()[a[0]];
        assert!(first.priority >= bank.patterns()[*a.last().unwrap()].priority);
    }

    #[test]
    fn test_dial_refused_winner_is_deterministic() {
        let bank = PatternBank::build().unwrap();
        let line = "2024-01-01T00:00:00Z ERROR dialing failed: rpc error: \
                    code = Unavailable desc = connection refused";
        let relevant = bank.relevant_for(Path::new("gitaly/current"));
        let winner = relevant
            .iter()
            .copied()
            .find(|&i| bank.matcher(i).find(line).is_some())
            .map(|i| bank.patterns()[i].id)
            .expect("a pattern must match the dial-refused line");
        assert_eq!(winner, "grpc_unavail");
    }

    #[test]
    fn test_matcher_range_maps_to_text() {
        let bank = PatternBank::build().unwrap();
        let idx = *bank.by_id.get("grpc_unavail").unwrap();
        let line = "rpc error: code = Unavailable desc = boom";
        let range = bank.matcher(idx).find(line).unwrap();
        assert!(line[range].to_lowercase().contains("unavailable"));
    }
}
