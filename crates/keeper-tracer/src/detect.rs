//! Java detection and version parsing.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::TracerError;

/// A detected `java` launcher.
#[derive(Debug, Clone)]
pub struct JavaInfo {
    /// Absolute path to the `java` binary.
    pub path: PathBuf,
}

/// Locate the `java` binary used to launch the analyzer jar.
///
/// Resolution order:
/// 1. `java_home` from `keeper.toml` (`<java_home>/bin/java`)
/// 2. `JAVA_HOME` environment variable
/// 3. `PATH` lookup via `which`
///
/// A configured home that holds no `bin/java` is an error rather than a
/// fallthrough.
///
/// # Errors
/// Returns an error if no java is found or the binary is not executable.
pub fn detect_java(java_home: Option<&Path>) -> Result<JavaInfo, TracerError> {
    let env_home = std::env::var_os("JAVA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let path = resolve_java_path(java_home, env_home.as_deref())?;
    check_executable(&path)?;
    tracing::debug!(java = %path.display(), "detected java");
    Ok(JavaInfo { path })
}

fn resolve_java_path(
    configured: Option<&Path>,
    env_home: Option<&Path>,
) -> Result<PathBuf, TracerError> {
    if let Some(home) = configured.or(env_home) {
        let p = home.join("bin").join("java");
        if p.exists() {
            return Ok(p);
        }
        return Err(TracerError::JavaMissingAt { path: p });
    }
    which_java().ok_or(TracerError::JavaNotFound)
}

fn which_java() -> Option<PathBuf> {
    let output = Command::new("which").arg("java").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path_str = String::from_utf8_lossy(&output.stdout);
    let trimmed = path_str.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

/// Fail unless `path` carries an execute bit.
///
/// # Errors
/// Returns `TracerError::NotExecutable` if the file is missing or not executable.
pub fn check_executable(path: &Path) -> Result<(), TracerError> {
    let metadata = std::fs::metadata(path).map_err(|_| TracerError::NotExecutable {
        path: path.to_path_buf(),
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(TracerError::NotExecutable {
                path: path.to_path_buf(),
            });
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;
    Ok(())
}

/// Run `java -version` and return the reported version, if any.
///
/// # Errors
/// Returns an error if the binary cannot be spawned.
pub fn query_version(java: &JavaInfo) -> Result<Option<String>, TracerError> {
    let output = keeper_util::process::run_command(Command::new(&java.path).arg("-version"))?;
    // `java -version` reports on stderr.
    let raw = if output.stderr.trim().is_empty() {
        output.stdout
    } else {
        output.stderr
    };
    Ok(parse_java_version(&raw))
}

/// Extract the quoted version from `java -version` output.
///
/// Handles formats like:
/// - `openjdk version "17.0.2" 2022-01-18`
/// - `java version "1.8.0_292"`
pub fn parse_java_version(raw: &str) -> Option<String> {
    raw.lines()
        .find(|line| line.contains(" version \""))
        .and_then(|line| line.split('"').nth(1))
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}
