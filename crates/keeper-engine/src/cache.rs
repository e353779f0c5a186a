//! Declared-input fingerprints for skipping up-to-date work.
//!
//! Every unit of work lists what it reads: scalar values, single files,
//! and directories of classes. Their contents are folded into one SHA-256,
//! stored next to the output as `<output>.fingerprint`. Only contents and
//! paths count, never timestamps.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::layout::sibling_with_suffix;

#[derive(Debug, Clone)]
enum Input {
    Value(String),
    File(PathBuf),
    Dir { path: PathBuf, extension: String },
}

/// The inputs a unit of work declares, in declaration order.
///
/// Order is significant: jar order decides which duplicate entry wins.
#[derive(Debug, Clone, Default)]
pub struct FingerprintInputs {
    inputs: Vec<(String, Input)>,
}

impl FingerprintInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scalar input such as a protocol name or an argument list.
    pub fn value(mut self, label: &str, value: impl Into<String>) -> Self {
        self.inputs
            .push((label.to_owned(), Input::Value(value.into())));
        self
    }

    /// A single file, hashed by content.
    pub fn file(mut self, label: &str, path: &Path) -> Self {
        self.inputs
            .push((label.to_owned(), Input::File(path.to_path_buf())));
        self
    }

    pub fn files(mut self, label: &str, paths: &[PathBuf]) -> Self {
        for path in paths {
            self = self.file(label, path);
        }
        self
    }

    /// Every file under `path` with `extension`, sorted by relative path.
    pub fn dir(mut self, label: &str, path: &Path, extension: &str) -> Self {
        self.inputs.push((
            label.to_owned(),
            Input::Dir {
                path: path.to_path_buf(),
                extension: extension.to_owned(),
            },
        ));
        self
    }
}

/// A SHA-256 over a unit of work's declared inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash the declared inputs.
    ///
    /// # Errors
    /// Returns an error if a declared file or directory cannot be read.
    pub fn compute(inputs: &FingerprintInputs) -> Result<Self, EngineError> {
        let mut parts: Vec<String> = Vec::with_capacity(inputs.inputs.len() * 3);
        for (label, input) in &inputs.inputs {
            parts.push(label.clone());
            match input {
                Input::Value(value) => {
                    parts.push("value".to_owned());
                    parts.push(value.clone());
                }
                Input::File(path) => {
                    parts.push(path.display().to_string());
                    parts.push(keeper_util::hash::sha256_file(path)?);
                }
                Input::Dir { path, extension } => {
                    parts.push(path.display().to_string());
                    parts.push(keeper_util::hash::sha256_dir(path, extension)?);
                }
            }
        }
        let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        Ok(Self(keeper_util::hash::sha256_multi(&refs)))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Whether `output` exists and was produced from exactly these inputs.
    pub fn is_up_to_date(&self, output: &Path) -> bool {
        if !output.exists() {
            return false;
        }
        std::fs::read_to_string(fingerprint_path(output))
            .is_ok_and(|stored| stored.trim() == self.0)
    }

    /// Record this fingerprint as the one `output` was produced from.
    ///
    /// # Errors
    /// Returns an error if the fingerprint file cannot be written.
    pub fn record(&self, output: &Path) -> Result<(), EngineError> {
        keeper_util::fs::write_atomic(&fingerprint_path(output), self.0.as_bytes())?;
        Ok(())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `<output>.fingerprint`.
pub fn fingerprint_path(output: &Path) -> PathBuf {
    sibling_with_suffix(output, "fingerprint")
}

/// Drop the stored fingerprint so the next run rebuilds `output`.
///
/// # Errors
/// Returns an error if the fingerprint file exists but cannot be removed.
pub fn invalidate(output: &Path) -> Result<(), EngineError> {
    keeper_util::fs::remove_file_if_exists(&fingerprint_path(output))?;
    Ok(())
}
