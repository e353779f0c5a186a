//! Error types for keeper-engine.

use std::path::PathBuf;

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] keeper_util::error::UtilError),

    /// `keeper.toml` could not be loaded or is inconsistent.
    #[error("{0}")]
    Manifest(#[from] keeper_config::manifest::ManifestError),

    /// The host variant model could not be loaded or is unsupported.
    #[error("{0}")]
    Variants(#[from] keeper_config::variants::VariantsError),

    /// `keeper.lock` could not be read or written.
    #[error("{0}")]
    Lockfile(#[from] keeper_config::lockfile::LockfileError),

    /// The Android SDK or a platform jar could not be resolved.
    #[error("{0}")]
    Sdk(#[from] keeper_sdk::SdkError),

    /// Java detection or analyzer command construction failed.
    #[error("{0}")]
    Tracer(#[from] keeper_tracer::TracerError),

    /// An `[ignore]` glob pattern is malformed.
    #[error("invalid ignore pattern `{pattern}`: {message}")]
    IgnorePattern { pattern: String, message: String },

    /// A declared input of an archive or analyzer run does not exist.
    #[error("{kind} {path} does not exist: build the host outputs before running keeper")]
    MissingInput { kind: String, path: PathBuf },

    /// The analyzer exited unsuccessfully.
    #[error("analyzer failed ({}){}", describe_exit(.exit_code), captured(.stdout, .stderr))]
    AnalyzerFailed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// `print-uses` succeeded but printed nothing.
    #[error("analyzer produced no keep rules for test archive {test_archive} against app archive {app_archive}: the archives may be empty or passed in the wrong order")]
    EmptyRules {
        app_archive: PathBuf,
        test_archive: PathBuf,
    },

    /// A desugared-library output directory could not be cleared or recreated.
    #[error("cannot clear desugared-library output {path}: {source}")]
    ClearOutput {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No variant with the requested name.
    #[error("no variant named `{name}` in the variant model")]
    UnknownVariant { name: String },

    /// No task with the requested name.
    #[error("no task named `{name}`")]
    UnknownTask { name: String },

    /// The lockfile does not pin the analyzer and `--locked` forbids updating it.
    #[error("keeper.lock does not pin analyzer {version}: run without --locked to update it")]
    LockfileUpdateRequired { version: String },

    /// `--locked` forbids downloading an analyzer that is not cached.
    #[error("analyzer {version} is not downloaded and --locked prevents downloads")]
    AnalyzerNotCached { version: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_owned(),
    }
}

fn captured(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    for (label, text) in [("stdout", stdout), ("stderr", stderr)] {
        let text = text.trim_end();
        if !text.is_empty() {
            out.push_str(&format!("\n--- {label} ---\n{text}"));
        }
    }
    out
}
