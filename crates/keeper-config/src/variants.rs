//! The host build's variant model, written as `variants.json`.
//!
//! The host owns variant discovery; Keeper only reads what it is handed here.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Oldest host build version whose task layout Keeper understands.
pub const MIN_HOST_VERSION: &str = "4.1.0";

/// Every app variant the host discovered, with its paired test variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_version: Option<String>,
    /// e.g. `"android-30"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_sdk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_dir: Option<PathBuf>,
    #[serde(default)]
    pub variants: Vec<AppVariant>,
}

/// An app build variant as seen by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppVariant {
    pub name: String,
    pub build_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    #[serde(default)]
    pub minify_enabled: bool,
    #[serde(default)]
    pub core_library_desugaring: bool,
    /// Compiled class output directories.
    #[serde(default)]
    pub classes: Vec<PathBuf>,
    /// Resolved runtime classpath jars.
    #[serde(default)]
    pub runtime_jars: Vec<PathBuf>,
    /// Configuration files the minifier already consumes.
    #[serde(default)]
    pub proguard_files: Vec<PathBuf>,
    /// Keep rules the desugared-library dexing step already consumes.
    #[serde(default)]
    pub l8_keep_rules: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l8_output_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<TestVariant>,
}

/// The instrumented-test variant compiled against an app variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestVariant {
    pub name: String,
    #[serde(default)]
    pub classes: Vec<PathBuf>,
    #[serde(default)]
    pub runtime_jars: Vec<PathBuf>,
    /// Keep rules shipped by the test runtime's own dependencies.
    #[serde(default)]
    pub runtime_keep_rules: Vec<PathBuf>,
    /// Desugared-library keep rules emitted by the test variant's minifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desugar_keep_rules: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l8_output_dir: Option<PathBuf>,
}

impl VariantModel {
    /// Read and parse a `variants.json` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON for this
    /// schema, or names a variant twice.
    pub fn from_path(path: &Path) -> Result<Self, VariantsError> {
        let content = std::fs::read_to_string(path).map_err(|e| VariantsError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let model: VariantModel =
            serde_json::from_str(&content).map_err(|e| VariantsError::Parse {
                path: path.display().to_string(),
                source: e,
            })?;
        model.check_unique_names()?;
        Ok(model)
    }

    fn check_unique_names(&self) -> Result<(), VariantsError> {
        let mut seen = BTreeSet::new();
        let names = self.variants.iter().flat_map(|v| {
            std::iter::once(v.name.as_str()).chain(v.test.as_ref().map(|t| t.name.as_str()))
        });
        for name in names {
            if !seen.insert(name) {
                return Err(VariantsError::DuplicateVariant {
                    name: name.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Look up an app variant by name.
    pub fn find(&self, name: &str) -> Option<&AppVariant> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Rewrite every relative path in the model against `root`.
    pub fn resolve_relative_to(&mut self, root: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        if let Some(sdk) = self.sdk_dir.as_mut() {
            fix(sdk);
        }
        for variant in &mut self.variants {
            variant.classes.iter_mut().for_each(fix);
            variant.runtime_jars.iter_mut().for_each(fix);
            variant.proguard_files.iter_mut().for_each(fix);
            variant.l8_keep_rules.iter_mut().for_each(fix);
            variant.l8_output_dir.iter_mut().for_each(fix);
            if let Some(test) = variant.test.as_mut() {
                test.classes.iter_mut().for_each(fix);
                test.runtime_jars.iter_mut().for_each(fix);
                test.runtime_keep_rules.iter_mut().for_each(fix);
                test.desugar_keep_rules.iter_mut().for_each(fix);
                test.l8_output_dir.iter_mut().for_each(fix);
            }
        }
    }

    /// Reject host builds older than [`MIN_HOST_VERSION`].
    ///
    /// A model without a version is accepted.
    ///
    /// # Errors
    /// Returns `VariantsError::UnsupportedHostVersion` for older hosts and
    /// `VariantsError::InvalidHostVersion` for unparseable version strings.
    pub fn check_host_version(&self) -> Result<(), VariantsError> {
        let Some(version) = self.host_version.as_deref() else {
            return Ok(());
        };
        let actual = parse_version_triple(version).ok_or_else(|| {
            VariantsError::InvalidHostVersion {
                version: version.to_owned(),
            }
        })?;
        let minimum = parse_version_triple(MIN_HOST_VERSION).unwrap_or((0, 0, 0));
        if actual < minimum {
            return Err(VariantsError::UnsupportedHostVersion {
                version: version.to_owned(),
                minimum: MIN_HOST_VERSION.to_owned(),
            });
        }
        Ok(())
    }
}

/// Parse the numeric `major.minor.patch` prefix of a version like `7.0.0-beta02`.
///
/// Missing minor or patch components count as zero.
pub fn parse_version_triple(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.trim().split('.');
    let mut next = |required: bool| -> Option<u32> {
        match parts.next() {
            Some(part) => {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().ok()
            }
            None if required => None,
            None => Some(0),
        }
    };
    let major = next(true)?;
    let minor = next(false)?;
    let patch = next(false)?;
    Some((major, minor, patch))
}

#[derive(Debug, thiserror::Error)]
pub enum VariantsError {
    #[error("cannot read variant model {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid variant model at {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("variant `{name}` appears more than once in the variant model")]
    DuplicateVariant { name: String },
    #[error("cannot parse host version \"{version}\"")]
    InvalidHostVersion { version: String },
    #[error("host build version {version} is not supported, {minimum} or newer is required")]
    UnsupportedHostVersion { version: String, minimum: String },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MODEL: &str = r#"{
  "host_version": "7.0.0",
  "compile_sdk": "android-30",
  "variants": [
    {
      "name": "externalRelease",
      "build_type": "release",
      "flavor": "external",
      "minify_enabled": true,
      "core_library_desugaring": true,
      "classes": ["app/build/intermediates/javac/externalRelease/classes"],
      "runtime_jars": ["/gradle/caches/okio-2.10.0.jar"],
      "test": {
        "name": "externalReleaseAndroidTest",
        "classes": ["app/build/intermediates/javac/externalReleaseAndroidTest/classes"],
        "runtime_keep_rules": ["/gradle/caches/espresso/proguard.txt"]
      }
    },
    {
      "name": "externalDebug",
      "build_type": "debug",
      "flavor": "external"
    }
  ]
}"#;

    fn write_model(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("variants.json");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn parses_pairs_and_defaults() {
        let (_tmp, path) = write_model(MODEL);
        let model = VariantModel::from_path(&path).unwrap();
        assert_eq!(model.variants.len(), 2);

        let release = model.find("externalRelease").unwrap();
        assert!(release.minify_enabled);
        assert_eq!(
            release.test.as_ref().map(|t| t.name.as_str()),
            Some("externalReleaseAndroidTest")
        );

        let debug = model.find("externalDebug").unwrap();
        assert!(!debug.minify_enabled);
        assert!(debug.test.is_none());
        assert!(debug.classes.is_empty());
    }

    #[test]
    fn duplicate_names_rejected() {
        let (_tmp, path) = write_model(
            r#"{"variants": [
                {"name": "release", "build_type": "release"},
                {"name": "release", "build_type": "release"}
            ]}"#,
        );
        let err = VariantModel::from_path(&path).unwrap_err();
        assert!(matches!(err, VariantsError::DuplicateVariant { .. }));
    }

    #[test]
    fn test_name_clashing_with_app_name_rejected() {
        let (_tmp, path) = write_model(
            r#"{"variants": [
                {"name": "release", "build_type": "release", "test": {"name": "release"}}
            ]}"#,
        );
        assert!(VariantModel::from_path(&path).is_err());
    }

    #[test]
    fn unknown_field_rejected() {
        let (_tmp, path) = write_model(r#"{"variants": [], "flavours": []}"#);
        let err = VariantModel::from_path(&path).unwrap_err().to_string();
        assert!(err.contains("invalid variant model"), "error was: {err}");
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let (_tmp, path) = write_model(MODEL);
        let mut model = VariantModel::from_path(&path).unwrap();
        model.resolve_relative_to(Path::new("/project"));

        let release = model.find("externalRelease").unwrap();
        assert_eq!(
            release.classes.first().unwrap(),
            Path::new("/project/app/build/intermediates/javac/externalRelease/classes")
        );
        assert_eq!(
            release.runtime_jars.first().unwrap(),
            Path::new("/gradle/caches/okio-2.10.0.jar")
        );
    }

    #[test]
    fn host_version_gate() {
        let mut model = VariantModel::default();
        assert!(model.check_host_version().is_ok());

        model.host_version = Some("7.0.0-beta02".to_owned());
        assert!(model.check_host_version().is_ok());

        model.host_version = Some("4.1".to_owned());
        assert!(model.check_host_version().is_ok());

        model.host_version = Some("4.0.2".to_owned());
        assert!(matches!(
            model.check_host_version(),
            Err(VariantsError::UnsupportedHostVersion { .. })
        ));

        model.host_version = Some("latest".to_owned());
        assert!(matches!(
            model.check_host_version(),
            Err(VariantsError::InvalidHostVersion { .. })
        ));
    }

    #[test]
    fn parse_version_triple_variants() {
        assert_eq!(parse_version_triple("7.0.0"), Some((7, 0, 0)));
        assert_eq!(parse_version_triple("4.2.0-alpha07"), Some((4, 2, 0)));
        assert_eq!(parse_version_triple("8"), Some((8, 0, 0)));
        assert_eq!(parse_version_triple(""), None);
    }
}
