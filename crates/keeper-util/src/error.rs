//! Failures from the shared helpers.

#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The program could not be started at all.
    #[error("cannot execute `{program}`: {source}")]
    CommandExec {
        program: String,
        source: std::io::Error,
    },

    #[error("download failed: {message}")]
    Download { message: String },

    /// Versions end up in cache paths and URLs.
    #[error("invalid version `{version}` (allowed: letters, digits, `.`, `-`, `_`)")]
    InvalidVersion { version: String },

    #[error("hash mismatch for {path}: lockfile pins {expected}, file has {actual}")]
    ArtifactHashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("cannot process jar {path}: {message}")]
    Jar { path: String, message: String },

    #[error("no home directory; set HOME")]
    NoHomeDir,
}
