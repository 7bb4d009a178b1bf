// AutoGrep - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Only fatal conditions surface here: a bad archive, a pattern that does
// not compile, unrecoverable I/O, or a cancel request. File-local
// problems become warning events on the stream; line-local problems
// degrade silently.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for an engine run. An `Err` of this type means
/// the run produced no report.
#[derive(Debug)]
pub enum EngineError {
    /// Archive detection or extraction failed.
    Archive(ArchiveError),

    /// The built-in pattern catalogue failed validation or compilation.
    Pattern(PatternError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },

    /// The run was cancelled before completion.
    Cancelled,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive(e) => write!(f, "Archive error: {e}"),
            Self::Pattern(e) => write!(f, "Pattern error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
            Self::Cancelled => write!(f, "Analysis cancelled"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Archive(e) => Some(e),
            Self::Pattern(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            Self::Cancelled => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Archive errors
// ---------------------------------------------------------------------------

/// Errors related to opening and extracting the input archive.
#[derive(Debug)]
pub enum ArchiveError {
    /// The filename suffix is not one of .tar, .tar.gz, .tgz, .zip.
    UnsupportedFormat { path: PathBuf },

    /// The archive could not be opened or its header is invalid.
    Open { path: PathBuf, source: io::Error },

    /// ZIP central directory is unreadable.
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// Extraction of the top-level archive failed partway.
    Extract { path: PathBuf, source: io::Error },
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat { path } => write!(
                f,
                "'{}' is not a supported archive (.tar, .tar.gz, .tgz, .zip)",
                path.display()
            ),
            Self::Open { path, source } => {
                write!(f, "Cannot open archive '{}': {source}", path.display())
            }
            Self::Zip { path, source } => {
                write!(f, "Cannot read zip '{}': {source}", path.display())
            }
            Self::Extract { path, source } => {
                write!(f, "Extraction of '{}' failed: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. } | Self::Extract { source, .. } => Some(source),
            Self::Zip { source, .. } => Some(source),
            Self::UnsupportedFormat { .. } => None,
        }
    }
}

impl From<ArchiveError> for EngineError {
    fn from(e: ArchiveError) -> Self {
        Self::Archive(e)
    }
}

// ---------------------------------------------------------------------------
// Pattern errors
// ---------------------------------------------------------------------------

/// Errors raised while building the pattern bank. All are fatal: the
/// catalogue is compiled in, so any failure here is a defect.
#[derive(Debug)]
pub enum PatternError {
    /// A catalogue regex failed to compile.
    InvalidRegex {
        pattern_id: &'static str,
        source: regex::Error,
    },

    /// Two catalogue entries share the same (component, id).
    DuplicateId { pattern_id: &'static str },

    /// No literal token of the required length could be derived from the
    /// regex, so the prefilter would never admit lines for it.
    NoLiteralToken { pattern_id: &'static str },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRegex { pattern_id, source } => {
                write!(f, "Pattern '{pattern_id}': invalid regex: {source}")
            }
            Self::DuplicateId { pattern_id } => {
                write!(f, "Pattern '{pattern_id}': duplicate id within component")
            }
            Self::NoLiteralToken { pattern_id } => write!(
                f,
                "Pattern '{pattern_id}': no literal token of length >= 4 \
                 derivable for the prefilter"
            ),
        }
    }
}

impl std::error::Error for PatternError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRegex { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PatternError> for EngineError {
    fn from(e: PatternError) -> Self {
        Self::Pattern(e)
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
