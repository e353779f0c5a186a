//! `keeper.lock`: the pinned analyzer jar.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

const HEADER: &str = "# Written by keeper. Pins the analyzer jar; commit it with the project.\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Lockfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<AnalyzerLock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerLock {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar_sha256: Option<String>,
}

impl Lockfile {
    /// Load `path`; a missing file is an empty lockfile.
    ///
    /// # Errors
    /// Fails on unreadable files and malformed TOML.
    pub fn from_path(path: &Path) -> Result<Self, LockfileError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(LockfileError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| LockfileError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn with_analyzer(version: &str, jar_sha256: Option<&str>) -> Self {
        Self {
            analyzer: Some(AnalyzerLock {
                version: version.to_owned(),
                jar_sha256: jar_sha256.map(str::to_owned),
            }),
        }
    }

    /// Pinned jar hash for `version`. A pin for any other version does not count.
    pub fn analyzer_sha256(&self, version: &str) -> Option<&str> {
        let lock = self.analyzer.as_ref()?;
        if lock.version != version {
            return None;
        }
        lock.jar_sha256.as_deref()
    }

    /// Save with a header comment, replacing `path` in one rename.
    ///
    /// # Errors
    /// Fails if the lockfile cannot be serialized or written.
    pub fn write_to(&self, path: &Path) -> Result<(), LockfileError> {
        let body = toml::to_string_pretty(self).map_err(LockfileError::Serialize)?;
        let staging = path.with_extension("lock.tmp");
        let write_err = |at: &Path| {
            let at = at.display().to_string();
            move |source: std::io::Error| LockfileError::Write { path: at, source }
        };
        std::fs::write(&staging, format!("{HEADER}{body}")).map_err(write_err(&staging))?;
        std::fs::rename(&staging, path).map_err(write_err(path))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockfileError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid keeper.lock at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("cannot encode keeper.lock: {0}")]
    Serialize(toml::ser::Error),
    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}
