//! Analyzer resolution: which jar or command runs, and how it is launched.
//!
//! With automatic repository management the R8 jar is fetched into
//! `~/.keeper/cache/maven` and its SHA-256 pinned in `keeper.lock`.

use std::path::{Path, PathBuf};

use keeper_config::lockfile::Lockfile;
use keeper_config::manifest::{Manifest, ProtocolConfig};
use keeper_tracer::Launcher;
use keeper_util::maven::MavenCoordinate;

use crate::error::EngineError;

/// R8 version used with the `print-uses` protocol unless configured.
pub const DEFAULT_PRINT_USES_VERSION: &str = "1.6.53";

/// R8 version used with the `tracereferences` protocol unless configured.
pub const DEFAULT_TRACE_REFERENCES_VERSION: &str = "3.0.9-dev";

/// The Maven coordinate of an R8 release.
pub fn analyzer_coordinate(version: &str) -> MavenCoordinate {
    MavenCoordinate::new("com.android.tools", "r8", version)
}

/// The configured analyzer version, or the protocol's default.
pub fn analyzer_version<'a>(manifest: &'a Manifest, protocol: &ProtocolConfig) -> &'a str {
    manifest
        .analyzer
        .version
        .as_deref()
        .unwrap_or(match protocol {
            ProtocolConfig::PrintUses(_) => DEFAULT_PRINT_USES_VERSION,
            ProtocolConfig::TraceReferences(_) => DEFAULT_TRACE_REFERENCES_VERSION,
        })
}

/// `~/.keeper/cache/maven`.
///
/// # Errors
/// Returns an error if the home directory cannot be determined.
pub fn maven_cache_root() -> Result<PathBuf, EngineError> {
    Ok(keeper_util::fs::keeper_home()?.join("cache").join("maven"))
}

/// Where a downloaded analyzer lives, and where its pin is recorded.
#[derive(Debug, Clone)]
pub struct AnalyzerStore {
    pub cache_root: PathBuf,
    pub lockfile: PathBuf,
    pub repository: String,
}

impl AnalyzerStore {
    /// Path of the cached jar for `version`.
    pub fn jar_path(&self, version: &str) -> PathBuf {
        analyzer_coordinate(version).cache_path(&self.cache_root)
    }

    pub fn is_cached(&self, version: &str) -> bool {
        self.jar_path(version).exists()
    }

    /// Ensure the analyzer jar for `version` is cached and verified.
    ///
    /// The pinned hash in `keeper.lock` is only trusted when the lockfile pins
    /// this exact version. A fresh pin is written after the first download.
    ///
    /// With `locked`, the lockfile must already pin this version and the jar
    /// must already be cached: nothing is downloaded or rewritten.
    ///
    /// # Errors
    /// Returns an error if the version is unsafe, the lockfile cannot be read,
    /// `locked` forbids the needed update, the download fails, or the jar
    /// does not match its pinned hash.
    pub fn ensure(&self, version: &str, locked: bool) -> Result<PathBuf, EngineError> {
        keeper_util::artifact::validate_version(version)?;
        let lockfile = Lockfile::from_path(&self.lockfile)?;
        let expected = lockfile.analyzer_sha256(version).map(str::to_owned);

        if locked {
            if expected.is_none() {
                return Err(EngineError::LockfileUpdateRequired {
                    version: version.to_owned(),
                });
            }
            if !self.is_cached(version) {
                return Err(EngineError::AnalyzerNotCached {
                    version: version.to_owned(),
                });
            }
        }

        let coordinate = analyzer_coordinate(version);
        let dest = coordinate.cache_path(&self.cache_root);
        if !dest.exists() {
            eprintln!("    Downloading {coordinate}");
        }
        let result = keeper_util::artifact::ensure_artifact(
            &coordinate.to_url(&self.repository),
            &dest,
            expected.as_deref(),
            "r8",
            version,
        )?;

        if expected.is_none() {
            let pinned = Lockfile::with_analyzer(version, Some(&result.sha256));
            if let Err(e) = pinned.write_to(&self.lockfile) {
                tracing::warn!("could not pin analyzer hash in keeper.lock: {e}");
            } else {
                tracing::info!(%version, sha256 = %result.sha256, "pinned analyzer in keeper.lock");
            }
        }
        Ok(result.path)
    }
}

/// Settings for [`resolve_launcher`].
#[derive(Debug, Clone)]
pub struct LauncherRequest<'a> {
    pub root: &'a Path,
    pub manifest: &'a Manifest,
    pub protocol: &'a ProtocolConfig,
    pub store: &'a AnalyzerStore,
    pub locked: bool,
}

/// Decide how the analyzer is started.
///
/// An explicit `command` wins, then an explicit `jar`, then a jar resolved
/// through the repository. Jars are run with the detected `java`.
///
/// # Errors
/// Returns an error if no analyzer is configured, an explicit jar is
/// missing, resolution fails, or java cannot be found.
pub fn resolve_launcher(request: &LauncherRequest<'_>) -> Result<Launcher, EngineError> {
    let analyzer = &request.manifest.analyzer;
    if !analyzer.command.is_empty() {
        return Ok(Launcher::from_command(&analyzer.command)?);
    }

    let jar = if let Some(jar) = &analyzer.jar {
        let jar = keeper_util::fs::resolve_against(request.root, jar);
        if !jar.is_file() {
            return Err(EngineError::MissingInput {
                kind: "analyzer jar".to_owned(),
                path: jar,
            });
        }
        jar
    } else if analyzer.automatic_repository_management {
        let version = analyzer_version(request.manifest, request.protocol);
        request.store.ensure(version, request.locked)?
    } else {
        return Err(keeper_config::manifest::ManifestError::AnalyzerNotConfigured.into());
    };

    let java_home = analyzer
        .java_home
        .as_deref()
        .map(|home| keeper_util::fs::resolve_against(request.root, home));
    let java = keeper_tracer::detect_java(java_home.as_deref())?;
    if tracing::enabled!(tracing::Level::DEBUG) {
        if let Ok(Some(version)) = keeper_tracer::detect::query_version(&java) {
            tracing::debug!(java = %java.path.display(), %version, "analyzer JVM");
        }
    }

    Ok(Launcher::Jvm {
        java: java.path,
        jar,
        jvm_args: analyzer.jvm_args.clone(),
        enable_assertions: analyzer.enable_assertions,
    })
}
