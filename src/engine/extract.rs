// AutoGrep - engine/extract.rs
//
// Archive extraction into a temp root, with recursive handling of
// nested archives. Format detection is by filename suffix only.
//
// Safety: entry paths are treated as relative to the extraction root.
// Absolute paths, `..` segments, and symlinks pointing outside the
// root are rejected with a warning and skipped, never followed.

use crate::util::error::ArchiveError;
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// One regular file found under the extraction root.
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Absolute path on disk.
    pub abs: PathBuf,
    /// Path relative to the extraction root, `/`-separated.
    pub rel: String,
    pub size: u64,
}

/// Result of extracting an archive tree.
#[derive(Debug, Default)]
pub struct ExtractOutcome {
    pub files: Vec<ExtractedFile>,
    /// Non-fatal problems: unsafe entries, failed inner archives.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Tar,
    TarGz,
    Zip,
}

fn detect_kind(name: &str) -> Option<ArchiveKind> {
    let lower = name.to_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Some(ArchiveKind::TarGz)
    } else if lower.ends_with(".tar") {
        Some(ArchiveKind::Tar)
    } else if lower.ends_with(".zip") {
        Some(ArchiveKind::Zip)
    } else {
        None
    }
}

/// "logs.tar.gz" -> "logs"; "bundle.zip" -> "bundle".
fn archive_stem(name: &str) -> &str {
    let lower = name.to_lowercase();
    if lower.ends_with(".tar.gz") {
        &name[..name.len() - ".tar.gz".len()]
    } else if lower.ends_with(".tgz") || lower.ends_with(".tar") || lower.ends_with(".zip") {
        &name[..name.len() - 4]
    } else {
        name
    }
}

/// macOS resource-fork companions carry no log content.
fn is_resource_fork(name: &str) -> bool {
    name.starts_with("._")
}

// =============================================================================
// Top-level entry point
// =============================================================================

/// Extract `archive` (and any archives nested inside it) into `dest`
/// and inventory the regular files. Fatal only when the outer archive
/// itself is unusable; everything inner degrades to warnings.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<ExtractOutcome, ArchiveError> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let kind = detect_kind(name).ok_or_else(|| ArchiveError::UnsupportedFormat {
        path: archive.to_path_buf(),
    })?;

    let mut warnings = extract_one(archive, kind, dest)?;

    // Recursive pass: extract inner archives into `<stem>/` siblings
    // until none remain. Failed inner archives are left in place and
    // remembered so the loop terminates.
    let mut failed: HashSet<PathBuf> = HashSet::new();
    loop {
        let inner: Vec<PathBuf> = WalkDir::new(dest)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|n| detect_kind(n).is_some())
            })
            .map(|e| e.into_path())
            .filter(|p| !failed.contains(p))
            .collect();

        if inner.is_empty() {
            break;
        }

        for inner_path in inner {
            let inner_name = inner_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let inner_kind = match detect_kind(&inner_name) {
                Some(k) => k,
                None => continue,
            };
            let inner_dest = inner_path
                .parent()
                .unwrap_or(dest)
                .join(archive_stem(&inner_name));

            let result = fs::create_dir_all(&inner_dest)
                .map_err(|e| ArchiveError::Extract {
                    path: inner_path.clone(),
                    source: e,
                })
                .and_then(|()| extract_one(&inner_path, inner_kind, &inner_dest));

            match result {
                Ok(mut inner_warnings) => {
                    warnings.append(&mut inner_warnings);
                    if let Err(e) = fs::remove_file(&inner_path) {
                        warnings.push(format!(
                            "cannot remove extracted inner archive '{}': {e}",
                            inner_path.display()
                        ));
                        failed.insert(inner_path);
                    }
                }
                Err(e) => {
                    tracing::warn!(archive = %inner_path.display(), error = %e, "Inner archive extraction failed");
                    warnings.push(format!("inner archive '{inner_name}' not extracted: {e}"));
                    failed.insert(inner_path);
                }
            }
        }
    }

    // Inventory the tree.
    let mut files = Vec::new();
    for entry in WalkDir::new(dest).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warnings.push(format!("cannot walk extraction tree: {e}"));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_str()
            .is_some_and(is_resource_fork)
        {
            continue;
        }
        let abs = entry.into_path();
        let rel = match abs.strip_prefix(dest) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        let size = abs.metadata().map(|m| m.len()).unwrap_or(0);
        files.push(ExtractedFile { abs, rel, size });
    }
    files.sort_by(|a, b| a.rel.cmp(&b.rel));

    tracing::debug!(
        files = files.len(),
        warnings = warnings.len(),
        "Archive extraction complete"
    );

    Ok(ExtractOutcome { files, warnings })
}

// =============================================================================
// Single-archive extraction
// =============================================================================

fn extract_one(
    archive: &Path,
    kind: ArchiveKind,
    dest: &Path,
) -> Result<Vec<String>, ArchiveError> {
    match kind {
        ArchiveKind::Tar => {
            let file = open(archive)?;
            extract_tar(tar::Archive::new(file), archive, dest)
        }
        ArchiveKind::TarGz => {
            let file = open(archive)?;
            extract_tar(tar::Archive::new(GzDecoder::new(file)), archive, dest)
        }
        ArchiveKind::Zip => extract_zip(archive, dest),
    }
}

fn open(path: &Path) -> Result<File, ArchiveError> {
    File::open(path).map_err(|source| ArchiveError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn extract_tar<R: io::Read>(
    mut tar: tar::Archive<R>,
    archive: &Path,
    dest: &Path,
) -> Result<Vec<String>, ArchiveError> {
    let mut warnings = Vec::new();

    let entries = tar.entries().map_err(|source| ArchiveError::Extract {
        path: archive.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|source| ArchiveError::Extract {
            path: archive.to_path_buf(),
            source,
        })?;

        let entry_path = match entry.path() {
            Ok(p) => p.into_owned(),
            Err(e) => {
                warnings.push(format!("unreadable tar entry path: {e}"));
                continue;
            }
        };
        let entry_name = entry_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if is_resource_fork(entry_name) {
            continue;
        }

        if entry.header().entry_type().is_symlink() {
            let target = entry.link_name().ok().flatten();
            let escapes = target.as_deref().map_or(true, |t| {
                t.is_absolute() || t.components().any(|c| c == Component::ParentDir)
            });
            if escapes {
                warnings.push(format!(
                    "symlink '{}' points outside the extraction root",
                    entry_path.display()
                ));
                continue;
            }
        }

        // unpack_in refuses absolute paths and `..` traversal.
        match entry.unpack_in(dest) {
            Ok(true) => {}
            Ok(false) => {
                warnings.push(format!(
                    "unsafe tar entry '{}' skipped",
                    entry_path.display()
                ));
            }
            Err(e) => {
                warnings.push(format!(
                    "tar entry '{}' not extracted: {e}",
                    entry_path.display()
                ));
            }
        }
    }

    Ok(warnings)
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<Vec<String>, ArchiveError> {
    let mut warnings = Vec::new();

    let file = open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|source| ArchiveError::Zip {
        path: archive.to_path_buf(),
        source,
    })?;

    for i in 0..zip.len() {
        let mut entry = match zip.by_index(i) {
            Ok(e) => e,
            Err(e) => {
                warnings.push(format!("unreadable zip entry #{i}: {e}"));
                continue;
            }
        };

        // enclosed_name rejects absolute paths and `..` traversal.
        let Some(rel) = entry.enclosed_name() else {
            warnings.push(format!("unsafe zip entry '{}' skipped", entry.name()));
            continue;
        };
        let entry_name = rel
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if is_resource_fork(entry_name) {
            continue;
        }

        let out_path = dest.join(&rel);
        let result = if entry.is_dir() {
            fs::create_dir_all(&out_path)
        } else {
            (|| {
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&out_path)?;
                io::copy(&mut entry, &mut out)?;
                Ok(())
            })()
        };
        if let Err(e) = result {
            warnings.push(format!("zip entry '{}' not extracted: {e}", rel.display()));
        }
    }

    Ok(warnings)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_tar(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(bytes).unwrap();
        gz.finish().unwrap()
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(detect_kind("sos.tar"), Some(ArchiveKind::Tar));
        assert_eq!(detect_kind("sos.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(detect_kind("sos.tgz"), Some(ArchiveKind::TarGz));
        assert_eq!(detect_kind("sos.zip"), Some(ArchiveKind::Zip));
        assert_eq!(detect_kind("sos.log"), None);
        assert_eq!(detect_kind("sos.gz"), None, "bare .gz is a log, not an archive");
    }

    #[test]
    fn test_archive_stem() {
        assert_eq!(archive_stem("logs.tar.gz"), "logs");
        assert_eq!(archive_stem("logs.tgz"), "logs");
        assert_eq!(archive_stem("logs.tar"), "logs");
        assert_eq!(archive_stem("logs.zip"), "logs");
    }

    #[test]
    fn test_extract_plain_tar() {
        let tar_bytes = build_tar(&[
            ("gitaly/current", "line one\n"),
            ("postgresql/current", "line two\n"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sos.tar");
        fs::write(&archive, tar_bytes).unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let outcome = extract_archive(&archive, &dest).unwrap();
        let rels: Vec<&str> = outcome.files.iter().map(|f| f.rel.as_str()).collect();
        assert_eq!(rels, vec!["gitaly/current", "postgresql/current"]);
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    }

    #[test]
    fn test_extract_tar_gz() {
        let tar_bytes = build_tar(&[("gitaly/current", "hello\n")]);
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sos.tar.gz");
        fs::write(&archive, gzip(&tar_bytes)).unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let outcome = extract_archive(&archive, &dest).unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].rel, "gitaly/current");
        assert_eq!(outcome.files[0].size, 6);
    }

    #[test]
    fn test_extract_zip() {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let opts = zip::write::SimpleFileOptions::default();
            writer.start_file("nginx/error.log", opts).unwrap();
            writer.write_all(b"upstream timed out\n").unwrap();
            writer.finish().unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sos.zip");
        fs::write(&archive, buf).unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let outcome = extract_archive(&archive, &dest).unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].rel, "nginx/error.log");
    }

    #[test]
    fn test_nested_archive_extracted_into_stem_dir() {
        let inner_tar = build_tar(&[("gitaly/current", "inner content\n")]);
        let outer_tar = {
            let mut builder = tar::Builder::new(Vec::new());
            let inner_gz = gzip(&inner_tar);
            let mut header = tar::Header::new_gnu();
            header.set_size(inner_gz.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "logs.tar.gz", inner_gz.as_slice())
                .unwrap();
            builder.into_inner().unwrap()
        };

        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sos.tar");
        fs::write(&archive, outer_tar).unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let outcome = extract_archive(&archive, &dest).unwrap();
        let rels: Vec<&str> = outcome.files.iter().map(|f| f.rel.as_str()).collect();
        assert_eq!(
            rels,
            vec!["logs/gitaly/current"],
            "inner archive lands in its stem directory and is deleted"
        );
    }

    #[test]
    fn test_resource_forks_dropped() {
        let tar_bytes = build_tar(&[
            ("._gitaly", "resource fork junk"),
            ("gitaly/current", "real\n"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sos.tar");
        fs::write(&archive, tar_bytes).unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let outcome = extract_archive(&archive, &dest).unwrap();
        let rels: Vec<&str> = outcome.files.iter().map(|f| f.rel.as_str()).collect();
        assert_eq!(rels, vec!["gitaly/current"]);
    }

    #[test]
    fn test_unsupported_format_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sos.rar");
        fs::write(&archive, b"not an archive").unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let result = extract_archive(&archive, &dest);
        assert!(matches!(
            result,
            Err(ArchiveError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_corrupt_inner_archive_is_warning_not_fatal() {
        let tar_bytes = build_tar(&[
            ("logs.tar.gz", "this is not gzip data"),
            ("gitaly/current", "fine\n"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sos.tar");
        fs::write(&archive, tar_bytes).unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let outcome = extract_archive(&archive, &dest).unwrap();
        assert!(
            !outcome.warnings.is_empty(),
            "corrupt inner archive must warn"
        );
        // The inner archive stays in place as a regular file.
        assert!(outcome.files.iter().any(|f| f.rel == "logs.tar.gz"));
        assert!(outcome.files.iter().any(|f| f.rel == "gitaly/current"));
    }
}
