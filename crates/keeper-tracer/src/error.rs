//! Error types for keeper-tracer.

use std::path::PathBuf;

/// Errors produced by Java detection and analyzer invocation.
#[derive(Debug, thiserror::Error)]
pub enum TracerError {
    /// No `java` binary was found.
    #[error("java not found: install a JDK and add it to PATH, set JAVA_HOME, or set [analyzer] java_home in keeper.toml")]
    JavaNotFound,

    /// A `java_home` or `JAVA_HOME` was set but holds no `bin/java`.
    #[error("no java binary at {path}: check [analyzer] java_home or JAVA_HOME")]
    JavaMissingAt { path: PathBuf },

    /// The launcher binary exists but is not executable.
    #[error("{path} is not executable: check file permissions")]
    NotExecutable { path: PathBuf },

    /// An explicit analyzer command was configured with no program.
    #[error("[analyzer] command is empty: give the program as its first element")]
    EmptyCommand,

    #[error("no app archive specified")]
    NoAppArchive,

    #[error("no test archive specified")]
    NoTestArchive,

    #[error("no platform jar specified for --lib")]
    NoLibrary,

    /// trace-references needs somewhere to write its keep rules.
    #[error("no keep-rules output path specified for tracereferences")]
    NoRulesOutput,

    /// An error propagated from keeper-util.
    #[error("{0}")]
    Util(#[from] keeper_util::error::UtilError),
}
