//! The `keeper.toml` options file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Repository that publishes R8 builds, including `-dev` versions that never
/// reach Google Maven.
pub const R8_RELEASES_REPOSITORY: &str = "https://storage.googleapis.com/r8-releases/raw";

/// The `keeper.toml` options file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub analyzer: AnalyzerSection,
    /// Presence selects the `printuses` protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_uses: Option<PrintUsesSection>,
    /// Presence selects the `tracereferences` protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_references: Option<TraceReferencesSection>,
    #[serde(default)]
    pub diagnostics: DiagnosticsSection,
    #[serde(default)]
    pub ignore: IgnoreSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    /// Root of build outputs; Keeper writes under `<build_dir>/intermediates/keeper`.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    /// Host-written variant model.
    #[serde(default = "default_variants_path")]
    pub variants: PathBuf,
    /// Android SDK root. Falls back to the environment and `local.properties`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_dir: Option<PathBuf>,
    /// Overrides the compile SDK reported by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_sdk: Option<String>,
    /// Engine name used in `minify<Variant>With<Engine>` task names.
    #[serde(default = "default_minifier")]
    pub minifier: String,
    /// Put `optional/android.test.base.jar` on the analyzer's library path.
    #[serde(default)]
    pub use_test_base: bool,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            variants: default_variants_path(),
            sdk_dir: None,
            compile_sdk: None,
            minifier: default_minifier(),
            use_test_base: false,
        }
    }
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_variants_path() -> PathBuf {
    PathBuf::from("build/keeper/variants.json")
}

fn default_minifier() -> String {
    "R8".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzerSection {
    /// R8 version to resolve. Defaults depend on the protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Use this jar instead of resolving one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar: Option<PathBuf>,
    /// Launch this command instead of `java -cp <jar>`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// JDK to launch the analyzer with. Falls back to `JAVA_HOME`, then `PATH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_home: Option<PathBuf>,
    /// Download the analyzer into Keeper's own Maven cache.
    #[serde(default = "default_true")]
    pub automatic_repository_management: bool,
    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jvm_args: Vec<String>,
    #[serde(default = "default_true")]
    pub enable_assertions: bool,
}

impl Default for AnalyzerSection {
    fn default() -> Self {
        Self {
            version: None,
            jar: None,
            command: Vec::new(),
            java_home: None,
            automatic_repository_management: true,
            repository: default_repository(),
            jvm_args: Vec::new(),
            enable_assertions: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_repository() -> String {
    R8_RELEASES_REPOSITORY.to_owned()
}

/// Keep-rule flavour printed by the legacy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeepRuleSyntax {
    #[default]
    #[serde(rename = "keeprules")]
    KeepRules,
    #[serde(rename = "keeprules-allowobfuscation")]
    KeepRulesAllowObfuscation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrintUsesSection {
    #[serde(default)]
    pub syntax: KeepRuleSyntax,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceReferencesSection {
    /// Extra arguments appended after the standard `tracereferences` ones.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsSection {
    /// Write argument lists, input manifests and merged L8 rules next to outputs.
    #[serde(default)]
    pub emit_debug_info: bool,
}

/// Glob patterns deciding which variants Keeper leaves alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IgnoreSection {
    #[serde(default)]
    pub variants: Vec<String>,
    #[serde(default)]
    pub build_types: Vec<String>,
    #[serde(default)]
    pub flavors: Vec<String>,
}

impl IgnoreSection {
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty() && self.build_types.is_empty() && self.flavors.is_empty()
    }
}

/// The selected analyzer protocol with its protocol-specific options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolConfig {
    PrintUses(PrintUsesSection),
    TraceReferences(TraceReferencesSection),
}

impl Manifest {
    /// Read and parse a `keeper.toml` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content, path)
    }

    /// Parse `keeper.toml` content; `path` only labels errors.
    ///
    /// # Errors
    /// Returns an error if the content is not valid TOML for this schema.
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ManifestError> {
        toml::from_str(content).map_err(|e| ManifestError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Resolve which protocol the analyzer runs with.
    ///
    /// Neither table present selects `printuses` with default options.
    ///
    /// # Errors
    /// Returns `ManifestError::AmbiguousProtocol` when both tables are present.
    pub fn protocol(&self) -> Result<ProtocolConfig, ManifestError> {
        match (&self.print_uses, &self.trace_references) {
            (Some(_), Some(_)) => Err(ManifestError::AmbiguousProtocol),
            (_, Some(trace)) => Ok(ProtocolConfig::TraceReferences(trace.clone())),
            (Some(print), None) => Ok(ProtocolConfig::PrintUses(print.clone())),
            (None, None) => Ok(ProtocolConfig::PrintUses(PrintUsesSection::default())),
        }
    }

    /// Check option combinations that can be rejected without touching disk.
    ///
    /// # Errors
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), ManifestError> {
        self.protocol()?;
        let analyzer = &self.analyzer;
        if analyzer.jar.is_some() && !analyzer.command.is_empty() {
            return Err(ManifestError::ConflictingAnalyzer);
        }
        if analyzer.jar.is_none()
            && analyzer.command.is_empty()
            && !analyzer.automatic_repository_management
        {
            return Err(ManifestError::AnalyzerNotConfigured);
        }
        if self.project.minifier.is_empty() {
            return Err(ManifestError::Invalid {
                field: "project.minifier".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid keeper.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("both [print_uses] and [trace_references] are configured, keep exactly one")]
    AmbiguousProtocol,
    #[error("[analyzer] sets both `jar` and `command`, keep exactly one")]
    ConflictingAnalyzer,
    #[error("no analyzer available: set [analyzer] `jar` or `command`, or enable `automatic_repository_management`")]
    AnalyzerNotConfigured,
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Manifest, ManifestError> {
        Manifest::from_toml(content, Path::new("keeper.toml"))
    }

    #[test]
    fn empty_file_uses_defaults() {
        let manifest = parse("").unwrap();
        assert_eq!(manifest.project.build_dir, PathBuf::from("build"));
        assert_eq!(manifest.project.minifier, "R8");
        assert!(manifest.analyzer.automatic_repository_management);
        assert!(manifest.analyzer.enable_assertions);
        assert_eq!(manifest.analyzer.repository, R8_RELEASES_REPOSITORY);
        assert!(!manifest.diagnostics.emit_debug_info);
        assert!(manifest.ignore.is_empty());
    }

    #[test]
    fn default_protocol_is_print_uses() {
        let manifest = parse("").unwrap();
        assert_eq!(
            manifest.protocol().unwrap(),
            ProtocolConfig::PrintUses(PrintUsesSection::default())
        );
    }

    #[test]
    fn trace_references_table_selects_protocol() {
        let manifest = parse(
            r#"
[trace_references]
args = ["--map-diagnostics:MissingDefinitionsDiagnostic", "error", "info"]
"#,
        )
        .unwrap();
        let ProtocolConfig::TraceReferences(trace) = manifest.protocol().unwrap() else {
            panic!("expected trace-references");
        };
        assert_eq!(trace.args.len(), 3);
    }

    #[test]
    fn print_uses_syntax_parses() {
        let manifest = parse(
            r#"
[print_uses]
syntax = "keeprules-allowobfuscation"
"#,
        )
        .unwrap();
        assert_eq!(
            manifest.protocol().unwrap(),
            ProtocolConfig::PrintUses(PrintUsesSection {
                syntax: KeepRuleSyntax::KeepRulesAllowObfuscation
            })
        );
    }

    #[test]
    fn both_protocols_are_ambiguous() {
        let manifest = parse("[print_uses]\n[trace_references]\n").unwrap();
        assert!(matches!(
            manifest.protocol(),
            Err(ManifestError::AmbiguousProtocol)
        ));
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn unknown_field_rejected() {
        let err = parse("[analyzer]\nversoin = \"1.0\"\n").unwrap_err();
        assert!(err.to_string().contains("invalid keeper.toml"), "error was: {err}");
    }

    #[test]
    fn jar_and_command_conflict() {
        let manifest = parse(
            r#"
[analyzer]
jar = "r8.jar"
command = ["r8"]
"#,
        )
        .unwrap();
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::ConflictingAnalyzer)
        ));
    }

    #[test]
    fn manual_repository_needs_an_analyzer() {
        let manifest = parse("[analyzer]\nautomatic_repository_management = false\n").unwrap();
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::AnalyzerNotConfigured)
        ));

        let with_jar = parse(
            "[analyzer]\nautomatic_repository_management = false\njar = \"tools/r8.jar\"\n",
        )
        .unwrap();
        assert!(with_jar.validate().is_ok());
    }

    #[test]
    fn ignore_patterns_parse() {
        let manifest = parse(
            r#"
[ignore]
variants = ["*Debug"]
build_types = ["staging"]
flavors = ["internal"]
"#,
        )
        .unwrap();
        assert_eq!(manifest.ignore.variants, vec!["*Debug".to_owned()]);
        assert!(!manifest.ignore.is_empty());
    }

    #[test]
    fn missing_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Manifest::from_path(&tmp.path().join("keeper.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read"), "error was: {err}");
    }
}
