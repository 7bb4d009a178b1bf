// AutoGrep - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Every bound the engine enforces is declared here so the resource model
// is auditable in one place.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "AutoGrep";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Worker pool
// =============================================================================

/// Hard upper bound on the number of scan workers. The default worker
/// count is min(available cores, this).
pub const MAX_WORKERS: usize = 16;

/// Capacity of the bounded MPSC event queue between workers and the
/// single event consumer. Workers block when the queue is full.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// How long the orchestrator waits for workers to drain their current
/// files after a cancel signal before the event queue is closed.
pub const CANCEL_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Hard per-file processing timeout. A worker that exceeds this abandons
/// the file with a warning event and moves on.
pub const FILE_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// File size strategy
// =============================================================================

/// Files above this size (and not gzipped) are processed via mmap in
/// chunks rather than being buffered whole.
pub const DEFAULT_MMAP_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024; // 50 MiB

/// Chunk size for the mmap path. Each chunk is extended to the next
/// newline before decoding.
pub const MMAP_CHUNK_BYTES: usize = 10 * 1024 * 1024; // 10 MiB

/// Files above this size are skipped entirely with a warning.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024 * 1024; // 10 GiB

// =============================================================================
// Scanning
// =============================================================================

/// Number of recent lines kept in the per-file ring buffer.
pub const RING_BUFFER_LINES: usize = 10;

/// Maximum preceding non-entry lines attached to a match as context.
pub const CONTEXT_BEFORE_LINES: usize = 5;

/// Maximum succeeding lines attached to a match as context.
pub const CONTEXT_AFTER_LINES: usize = 5;

/// A progress event is emitted every this many lines per file.
pub const DEFAULT_PROGRESS_EVERY_LINES: u64 = 1000;

/// Lines shorter than this cannot hold any catalogued failure text and
/// are rejected before the prefilter runs.
pub const QUICK_CHECK_MIN_LINE_LEN: usize = 10;

// =============================================================================
// Boundary detection
// =============================================================================

/// How far the boundary detector walks backwards from a matched line
/// looking for the start of the logical entry.
pub const BOUNDARY_BACKWARD_LINES: usize = 100;

/// How far the boundary detector walks forwards from a matched line
/// looking for the end of the logical entry.
pub const BOUNDARY_FORWARD_LINES: usize = 200;

// =============================================================================
// Correlation index
// =============================================================================

/// Identifiers shorter than this are noise (ports, counters) and are
/// not indexed.
pub const CORRELATION_MIN_ID_LEN: usize = 5;

/// Per-identifier occurrence cap. Overflow is silently dropped; the
/// index is a hint, not a truth.
pub const CORRELATION_MAX_ENTRIES_PER_ID: usize = 10_000;

// =============================================================================
// Pattern bank
// =============================================================================

/// Minimum length of a literal token derived from a pattern's regex for
/// the Aho-Corasick prefilter.
pub const PREFILTER_MIN_TOKEN_LEN: usize = 4;

/// Fixed indicator tokens always present in the prefilter automaton,
/// independent of the catalogue.
pub const PREFILTER_SEED_TOKENS: &[&str] = &[
    "error",
    "fail",
    "fatal",
    "panic",
    "exception",
    "critical",
    "timeout",
    "refused",
    "unavailable",
    "abort",
    "crash",
    "corrupt",
    "invalid",
    "violation",
];

// =============================================================================
// Aggregation
// =============================================================================

/// Normalized messages are truncated to this many characters before
/// hashing into a signature.
pub const SIGNATURE_MESSAGE_PREFIX: usize = 100;

/// Length of the hex signature kept from the digest.
pub const SIGNATURE_HEX_LEN: usize = 16;

/// Maximum number of full sample matches retained per group.
pub const GROUP_SAMPLE_LIMIT: usize = 3;

/// Number of groups surfaced as top errors.
pub const TOP_ERRORS_LIMIT: usize = 10;

// =============================================================================
// Logging
// =============================================================================

/// Default log level when neither RUST_LOG nor --debug is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";
