//! Fetching a single-file artifact into the local cache and verifying it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::UtilError;

/// A cached artifact.
#[derive(Debug, Clone)]
pub struct ArtifactResult {
    pub path: PathBuf,
    /// Hex SHA-256 of the file.
    pub sha256: String,
    /// `true` if this call downloaded it.
    pub freshly_downloaded: bool,
}

/// Reject versions that are unsafe in a cache path or URL.
///
/// Only `[A-Za-z0-9._-]` is allowed, and the version may not be empty.
///
/// # Errors
/// Returns `UtilError::InvalidVersion` for anything else.
pub fn validate_version(version: &str) -> Result<(), UtilError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');
    if version.is_empty() || !version.chars().all(allowed) {
        return Err(UtilError::InvalidVersion {
            version: version.to_owned(),
        });
    }
    Ok(())
}

fn verify(dest: &Path, expected: Option<&str>, actual: &str) -> Result<(), UtilError> {
    match expected {
        Some(expected) if !expected.eq_ignore_ascii_case(actual) => {
            Err(UtilError::ArtifactHashMismatch {
                path: dest.display().to_string(),
                expected: expected.to_owned(),
                actual: actual.to_owned(),
            })
        }
        _ => Ok(()),
    }
}

/// Make sure the artifact at `url` is present at `dest`.
///
/// A file already at `dest` is only hashed and verified. Otherwise the
/// download goes to a `.part` sibling that is verified and then renamed into
/// place, so `dest` never holds a partial or unverified file. Losing the
/// rename to a concurrent process is fine as long as the winner verifies.
///
/// # Errors
/// Returns an error if the download fails, the hash does not match
/// `expected_sha256`, or the file cannot be written.
pub fn ensure_artifact(
    url: &str,
    dest: &Path,
    expected_sha256: Option<&str>,
    label: &str,
    version: &str,
) -> Result<ArtifactResult, UtilError> {
    if dest.exists() {
        let sha256 = crate::hash::sha256_file(dest)?;
        verify(dest, expected_sha256, &sha256)?;
        return Ok(ArtifactResult {
            path: dest.to_path_buf(),
            sha256,
            freshly_downloaded: false,
        });
    }

    crate::fs::ensure_parent(dest)?;
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = dest.with_file_name(format!(".{file_name}.{}.part", std::process::id()));

    let placed = fetch(url, &partial, label, version).and_then(|sha256| {
        verify(dest, expected_sha256, &sha256)?;
        match std::fs::rename(&partial, dest) {
            Ok(()) => Ok(sha256),
            Err(_) if dest.exists() => {
                let winner = crate::hash::sha256_file(dest)?;
                verify(dest, expected_sha256, &winner)?;
                Ok(winner)
            }
            Err(source) => Err(UtilError::Io {
                path: dest.display().to_string(),
                source,
            }),
        }
    });
    let _ = std::fs::remove_file(&partial);

    Ok(ArtifactResult {
        path: dest.to_path_buf(),
        sha256: placed?,
        freshly_downloaded: true,
    })
}

/// Hashes everything written through it.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        if let Some(written) = buf.get(..n) {
            self.hasher.update(written);
        }
        self.bytes = self.bytes.saturating_add(u64::try_from(n).unwrap_or(u64::MAX));
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Stream `url` into `dest`, returning the SHA-256 of the body.
fn fetch(url: &str, dest: &Path, label: &str, version: &str) -> Result<String, UtilError> {
    let agent = ureq::Agent::new_with_config(
        ureq::config::Config::builder()
            .timeout_connect(Some(Duration::from_secs(30)))
            .timeout_global(Some(Duration::from_secs(600)))
            .build(),
    );

    tracing::debug!(%url, dest = %dest.display(), "downloading");
    let response = agent.get(url).call().map_err(|e| UtilError::Download {
        message: format!("{url}: {e}"),
    })?;
    let mut body = response.into_body();

    let file = std::fs::File::create(dest).map_err(|source| UtilError::Io {
        path: dest.display().to_string(),
        source,
    })?;
    let mut writer = HashingWriter {
        inner: std::io::BufWriter::new(file),
        hasher: Sha256::new(),
        bytes: 0,
    };
    std::io::copy(&mut body.as_reader(), &mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| UtilError::Download {
            message: format!("{url}: {e}"),
        })?;

    let kib = writer.bytes / 1024;
    eprintln!("    Downloaded {label} {version} ({kib} KiB)");
    Ok(format!("{:x}", writer.hasher.finalize()))
}
