// AutoGrep - core/filter.rs
//
// False-positive rejection, applied before any catalogue regex runs.
// Two layers: whole-file classification (schema dumps, system-info
// command output, config trees are never scanned) and per-line rules
// (success markers, health checks, DDL, CLI flags, worker class names
// that merely *contain* failure words).

use crate::core::model::FileClassification;
use glob::Pattern as GlobPattern;
use regex::RegexSetBuilder;
use std::path::Path;

// =============================================================================
// File classification sets
// =============================================================================

/// Database schema/structure dumps. Full of "timeout"/"failed" column
/// names that are not failures.
const SCHEMA_GLOBS: &[&str] = &[
    "schema.rb",
    "structure.sql",
    "*schema_dump*",
    "*db_schema*",
    "*database_structure*",
    "*migrations*",
    "*migrate*",
];

/// Captured command output (top, df, iostat, sar, ...). Column soup,
/// no log entries.
const SYSTEM_INFO_GLOBS: &[&str] = &[
    "top_*", "df_*", "iostat*", "sar_*", "ps_*", "ps", "netstat", "ss", "vmstat", "free",
    "mpstat", "lsof", "mount", "lsblk", "uptime", "hostname", "sysctl_a", "ip_address",
    "ip_route", "iptables", "ifconfig", "nfsstat", "ntpq", "ulimit", "limits.conf",
    "systemctl_unit_files", "rpm_verify", "last", "who", "w",
];

/// Check/doctor output describes failure modes without containing any.
/// Treated like system info: inventoried, never scanned.
const DIAGNOSTIC_GLOBS: &[&str] = &[
    "*praefect_check*",
    "*gitlab_check*",
    "*gitlab_geo_check*",
    "*gitlab-rake*",
    "*gitlab-ctl*",
    "*rake_check*",
    "doctor.rb",
    "check.rb",
    "*verify*",
];

/// Well-known config basenames that carry no log content.
const CONFIG_BASENAMES: &[&str] = &[
    "sshd_config",
    "ssh_config",
    "gitlab.rb",
    "database.yml",
    "resque.yml",
    "cable.yml",
    "settings.yml",
    "secrets.yml",
    "unicorn.rb",
    "puma.rb",
    "nginx.conf",
];

const CONFIG_EXTENSIONS: &[&str] = &["conf", "config", "cfg", "ini", "yaml", "yml"];

/// Observability agents whose logs are not core GitLab.
const MONITORING_SERVICES: &[&str] = &[
    "grafana-agent",
    "prometheus",
    "mimir",
    "loki",
    "tempo",
    "otel-collector",
    "otelopscol",
    "telegraf",
    "datadog",
    "new-relic",
    "elastic-agent",
    "fluentbit",
    "fluentd",
    "vector",
    "filebeat",
    "metricbeat",
    "node-exporter",
    "blackbox-exporter",
    "alertmanager",
];

const STATIC_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "svg", "woff", "woff2", "ttf", "eot", "pdf", "so",
    "bin",
];

// =============================================================================
// Line-level rule lists
// =============================================================================

/// Lines matching any of these are never failures, whatever the
/// catalogue thinks.
const FALSE_POSITIVE_PATTERNS: &[&str] = &[
    // Command not found chatter
    r"sh:\s+line\s+\d+:\s+\w+:\s+command not found",
    r"bash:\s+line\s+\d+:\s+\w+:\s+command not found",
    r"command not found",
    r"chpst:\s+fatal:\s+unknown user/group",
    r"unknown user/group:\s+gitlab-\w+",
    // Success / health indicators
    r"SUCCESS:\s+node\s+is\s+healthy",
    r#""grpc\.code":"OK""#,
    r#""level":"info""#,
    r#""level":"debug""#,
    r#""level":"trace""#,
    r#""severity":"info""#,
    r#""severity":"debug""#,
    r#""severity":"INFO""#,
    r#""severity":"DEBUG""#,
    r"level=info",
    r"level=debug",
    r"INFO\s+--",
    r"DEBUG\s+--",
    r"^\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2}\S*\s+(?:INFO|DEBUG|TRACE)\b",
    // Job execution states that are outcomes, not failures
    r#""status":"completed""#,
    r#""status":"success""#,
    r#""state":"finished""#,
    r#""state":"completed""#,
    r#"completed_at":"\d{4}"#,
    r#"succeeded_at":"\d{4}"#,
    r"will\s+retry",
    // Normal systemd operations
    r"systemd\[\d+\]:\s+Started\s+",
    r"systemd\[\d+\]:\s+Starting\s+",
    r"systemd\[\d+\]:\s+Stopped\s+",
    r"systemd\[\d+\]:\s+Stopping\s+",
    r"\.service:\s+Succeeded",
    r"\.service:\s+Deactivated\s+successfully",
    // Comments and separators
    r"^\s*#",
    r"^\s*$",
    r"^-+$",
    r"^=+$",
    // System-info column output
    r"^\s*\d+\s+root\s+\d+\s+\d+",
    r"^Filesystem\s+Type\s+Size",
    r"^Device:\s+rrqm/s",
    r"^\w+\.\w+\s*=\s*[\d\w]+$",
    r"^[a-z\-]+\.target\s+\w+$",
    r"^\s*inet\s+\d+\.\d+\.\d+\.\d+",
    r"^total\s+used\s+free",
    // Schema / migration DDL
    r"t\.integer.*timeout.*default:",
    r"t\.index.*failed.*where:",
    r"t\.string.*error.*default:",
    r"t\.boolean.*expired.*default:",
    r"add_column.*timeout",
    r"add_column.*error",
    r"add_column.*failed",
    r"create_table.*errors",
    r"create_table.*failures",
    r"remove_column.*error",
    r"add_index.*failed",
    // Command-line flags
    r"--timeout\s+\d+",
    r"--error-.*\s+",
    r"--retry\s+\d+",
    r"--failed-.*",
    r"/bin/.*--.*timeout",
    r"/usr/bin/.*--.*error",
    // Health-check endpoints
    r"GET\s+/health",
    r"GET\s+/metrics",
    r"GET\s+/-/.*health",
    r"GET\s+/-/readiness",
    r"GET\s+/-/liveness",
    r"POST\s+/api/v4/internal/check",
    // Graceful shutdown
    r"Shutting down gracefully",
    r"Graceful shutdown",
    r"Received TERM signal",
    r"Stopping workers",
    r"terminate.*administrator command.*gitlab-ctl",
    // Deprecation warnings
    r"will cause.*future versions",
    r"deprecated.*will be removed",
    r"DEPRECATION WARNING",
    r"is deprecated and will",
];

/// Worker/job class names that contain failure words by construction.
const WORKER_CLASS_PATTERNS: &[&str] = &[
    r#""class":"[^"]*(?:Timeout|Error|Failed|Failure|Retry|Dead|Shutdown|Crashed|Exception|Expire|Expired)Worker""#,
    r#""worker":"[^"]*(?:Timeout|Error|Failed|Failure|Retry|Dead|Shutdown|Crashed|Exception)Worker""#,
    r"VerificationTimeoutWorker",
    r"SyncTimeoutCronWorker",
    r"RetryWorker",
    r"DeadJobWorker",
    r"FailureWorker",
    r"ErrorTrackingWorker",
    r"ExceptionWorker",
    r"ExpireJobCacheWorker",
    r"ExpirePipelineCacheWorker",
    r"StuckCiJobsWorker",
    r"FailedPipelineWorker",
    r"TimeoutWorker",
    r"CleanupContainerExpirationPolicyWorker",
    r"DeleteExpiredJobArtifactsWorker",
    r"TimeoutPendingStatusCheckResponsesWorker",
    r"TimeoutOrphanedJobArtifactFilesWorker",
    r"ExpireBuildArtifactsWorker",
    r#"Geo::[^"]*(?:Timeout|Verification|Sync|Retry|Failed)(?:Worker|CronWorker)"#,
    r#"Ci::[^"]*(?:Timeout|Failed|Retry|Stuck)Worker"#,
    r"ComplianceManagement::[^\s]*TimeoutWorker",
];

// =============================================================================
// Filter
// =============================================================================

/// Compiled false-positive rules plus the file classification sets.
/// Built once and shared read-only across workers.
pub struct FalsePositiveFilter {
    false_positives: regex::RegexSet,
    worker_classes: regex::RegexSet,
    schema_globs: Vec<GlobPattern>,
    system_info_globs: Vec<GlobPattern>,
    diagnostic_globs: Vec<GlobPattern>,
}

fn compile_globs(patterns: &[&str]) -> Vec<GlobPattern> {
    patterns
        .iter()
        .map(|p| GlobPattern::new(p).expect("skip-file glob must compile"))
        .collect()
}

impl FalsePositiveFilter {
    pub fn new() -> Self {
        let false_positives = RegexSetBuilder::new(FALSE_POSITIVE_PATTERNS)
            .case_insensitive(true)
            .build()
            .expect("false-positive rules must compile");
        let worker_classes = RegexSetBuilder::new(WORKER_CLASS_PATTERNS)
            .case_insensitive(true)
            .build()
            .expect("worker-class rules must compile");

        Self {
            false_positives,
            worker_classes,
            schema_globs: compile_globs(SCHEMA_GLOBS),
            system_info_globs: compile_globs(SYSTEM_INFO_GLOBS),
            diagnostic_globs: compile_globs(DIAGNOSTIC_GLOBS),
        }
    }

    /// Classify an extracted file by its path. Only `LogSuitable` and
    /// `KubeResource` files reach the scanner.
    pub fn classify(&self, path: &Path) -> FileClassification {
        let basename = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_lowercase(),
            None => return FileClassification::Unknown,
        };
        let path_str = path.to_string_lossy().to_lowercase();

        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if STATIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                return FileClassification::Static;
            }
        }

        if self.schema_globs.iter().any(|g| g.matches(&basename)) {
            return FileClassification::Schema;
        }
        if self.system_info_globs.iter().any(|g| g.matches(&basename))
            || self.diagnostic_globs.iter().any(|g| g.matches(&basename))
        {
            return FileClassification::SystemInfo;
        }
        if MONITORING_SERVICES.iter().any(|s| basename.contains(s)) {
            return FileClassification::MonitoringOnly;
        }
        if basename.starts_with("kubectl_")
            || basename.starts_with("kube_")
            || path_str.contains("kubesos")
            || path_str.contains("cluster-info")
        {
            return FileClassification::KubeResource;
        }

        let is_config_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| CONFIG_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if (is_config_ext && !path_str.contains("/log/"))
            || CONFIG_BASENAMES.contains(&basename.as_str())
        {
            return FileClassification::Config;
        }

        FileClassification::LogSuitable
    }

    /// Whole-file skip decision derived from the classification.
    pub fn should_skip_file(&self, path: &Path) -> bool {
        !self.classify(path).is_scannable()
    }

    /// Per-line rejection. A worker-class hit is forgiven only when the
    /// line is an actual error record carrying an exception field.
    pub fn is_false_positive(&self, line: &str) -> bool {
        if self.false_positives.is_match(line) {
            return true;
        }
        if self.worker_classes.is_match(line) {
            let is_error_level =
                line.contains(r#""severity":"ERROR""#) || line.contains(r#""level":"error""#);
            let has_exception = line.contains(r#""exception":""#) || line.contains(r#"error":""#);
            return !(is_error_level && has_exception);
        }
        false
    }
}

impl Default for FalsePositiveFilter {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn filter() -> FalsePositiveFilter {
        FalsePositiveFilter::new()
    }

    #[test]
    fn test_schema_files_skipped() {
        let f = filter();
        assert_eq!(
            f.classify(Path::new("db/schema.rb")),
            FileClassification::Schema
        );
        assert_eq!(
            f.classify(Path::new("postgres/structure.sql")),
            FileClassification::Schema
        );
        assert_eq!(
            f.classify(Path::new("sos/ar_schema_dump_result")),
            FileClassification::Schema
        );
        assert!(f.should_skip_file(Path::new("db/schema.rb")));
    }

    #[test]
    fn test_system_info_files_skipped() {
        let f = filter();
        for name in ["top_res", "df_hT", "iostat", "sar_cpu", "free", "vmstat", "ps_aux"] {
            let path = PathBuf::from("node1").join(name);
            assert!(
                f.should_skip_file(&path),
                "{name} should be classified as system info"
            );
        }
    }

    #[test]
    fn test_config_files_skipped_unless_under_log() {
        let f = filter();
        assert_eq!(
            f.classify(Path::new("etc/gitlab/gitlab.rb")),
            FileClassification::Config
        );
        assert_eq!(
            f.classify(Path::new("config/database.yml")),
            FileClassification::Config
        );
        // The /log/ carve-out: structured logs shipped as .yml stay scannable.
        assert_eq!(
            f.classify(Path::new("var/log/gitlab/events.yml")),
            FileClassification::LogSuitable
        );
    }

    #[test]
    fn test_kube_resources_are_scannable() {
        let f = filter();
        let c = f.classify(Path::new("kubesos/kubectl_get_events"));
        assert_eq!(c, FileClassification::KubeResource);
        assert!(c.is_scannable());
    }

    #[test]
    fn test_monitoring_files_not_scanned() {
        let f = filter();
        assert_eq!(
            f.classify(Path::new("var/log/grafana-agent.log")),
            FileClassification::MonitoringOnly
        );
    }

    #[test]
    fn test_plain_log_files_are_suitable() {
        let f = filter();
        assert_eq!(
            f.classify(Path::new("gitaly/current")),
            FileClassification::LogSuitable
        );
        assert_eq!(
            f.classify(Path::new("var/log/gitlab/sidekiq/current")),
            FileClassification::LogSuitable
        );
    }

    #[test]
    fn test_success_markers_are_false_positives() {
        let f = filter();
        assert!(f.is_false_positive("SUCCESS: node is healthy"));
        assert!(f.is_false_positive(r#"{"grpc.code":"OK","msg":"done"}"#));
        assert!(f.is_false_positive(r#"{"severity":"INFO","class":"X"}"#));
        assert!(f.is_false_positive("level=info msg=\"starting\""));
    }

    #[test]
    fn test_timestamped_info_lines_rejected() {
        let f = filter();
        assert!(f.is_false_positive("2024-01-15T14:30:22Z INFO an error counter was reset"));
        assert!(!f.is_false_positive("2024-01-15T14:30:22Z ERROR dialing failed"));
    }

    #[test]
    fn test_schema_ddl_lines_rejected() {
        let f = filter();
        assert!(f.is_false_positive("t.integer :timeout, default: 60, null: false"));
        assert!(f.is_false_positive("add_column :jobs, :error, :string"));
    }

    #[test]
    fn test_cli_flags_rejected() {
        let f = filter();
        assert!(f.is_false_positive("exec /opt/thing --timeout 30 --verbose"));
        assert!(f.is_false_positive("GET /-/readiness HTTP/1.1"));
    }

    #[test]
    fn test_worker_class_name_is_false_positive() {
        let f = filter();
        assert!(f.is_false_positive(
            r#"{"severity":"INFO","class":"Geo::VerificationTimeoutWorker","jid":"abc"}"#
        ));
        assert!(f.is_false_positive("scheduled ExpireBuildArtifactsWorker in 5s"));
    }

    #[test]
    fn test_worker_class_with_real_exception_passes() {
        let f = filter();
        let line = r#"{"severity":"ERROR","class":"Geo::VerificationTimeoutWorker","exception":"StandardError","error":"boom"}"#;
        assert!(
            !f.is_false_positive(line),
            "error-severity worker line with an exception field is real"
        );
    }

    #[test]
    fn test_comment_and_separator_lines() {
        let f = filter();
        assert!(f.is_false_positive("# this is a comment"));
        assert!(f.is_false_positive("--------"));
        assert!(f.is_false_positive("========"));
        assert!(f.is_false_positive(""));
    }

    #[test]
    fn test_real_errors_pass_through() {
        let f = filter();
        assert!(!f.is_false_positive(
            "2024-01-01T00:00:00Z ERROR dialing failed: connection refused"
        ));
        assert!(!f.is_false_positive("PG::ConnectionBad: could not connect to server"));
        assert!(!f.is_false_positive(
            r#"{"severity":"ERROR","exception.class":"StandardError","exception.message":"boom"}"#
        ));
    }
}
