//! Android SDK location and platform-jar resolution.

use std::fmt;
use std::path::{Path, PathBuf};

/// A compile SDK platform directory name, e.g. `android-30`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub name: String,
}

impl Platform {
    /// Normalize a compile SDK value into its platform directory name.
    ///
    /// A bare API level (`"30"`) becomes `"android-30"`; anything else is
    /// taken as a directory name already (`"android-30"`, `"android-S"`).
    ///
    /// # Errors
    /// Returns `SdkError::InvalidCompileSdk` for an empty value or one that
    /// contains a path separator.
    pub fn parse(value: &str) -> Result<Self, SdkError> {
        let value = value.trim();
        if value.is_empty() || value.contains(['/', '\\']) || value == ".." {
            return Err(SdkError::InvalidCompileSdk {
                value: value.to_owned(),
            });
        }
        let name = if value.chars().all(|c| c.is_ascii_digit()) {
            format!("android-{value}")
        } else {
            value.to_owned()
        };
        Ok(Self { name })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Inputs to SDK directory resolution.
///
/// Built from the process environment by [`SdkLocator::from_env`]; tests
/// construct it directly.
#[derive(Debug, Clone, Default)]
pub struct SdkLocator {
    /// `[project] sdk_dir` or the host model's `sdk_dir`.
    pub configured: Option<PathBuf>,
    pub android_sdk_root: Option<PathBuf>,
    pub android_home: Option<PathBuf>,
    /// Directory holding `local.properties`.
    pub project_root: PathBuf,
}

impl SdkLocator {
    /// Capture `ANDROID_SDK_ROOT` and `ANDROID_HOME` from the environment.
    pub fn from_env(configured: Option<PathBuf>, project_root: &Path) -> Self {
        let var = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            configured,
            android_sdk_root: var("ANDROID_SDK_ROOT"),
            android_home: var("ANDROID_HOME"),
            project_root: project_root.to_path_buf(),
        }
    }

    /// Locate the SDK directory.
    ///
    /// Resolution order:
    /// 1. the configured directory
    /// 2. `ANDROID_SDK_ROOT`
    /// 3. `ANDROID_HOME`
    /// 4. `sdk.dir` in `<project_root>/local.properties`
    ///
    /// The first candidate that is set wins; it must exist.
    ///
    /// # Errors
    /// Returns `SdkError::NotFound` if no candidate is set,
    /// `SdkError::MissingSdkDir` if the chosen one does not exist, and
    /// `SdkError::Io` if `local.properties` exists but cannot be read.
    pub fn locate(&self) -> Result<PathBuf, SdkError> {
        let (source, dir) = if let Some(dir) = &self.configured {
            ("configuration", dir.clone())
        } else if let Some(dir) = &self.android_sdk_root {
            ("ANDROID_SDK_ROOT", dir.clone())
        } else if let Some(dir) = &self.android_home {
            ("ANDROID_HOME", dir.clone())
        } else if let Some(dir) = self.local_properties_sdk_dir()? {
            ("local.properties", dir)
        } else {
            return Err(SdkError::NotFound);
        };

        let dir = if dir.is_relative() {
            self.project_root.join(dir)
        } else {
            dir
        };
        if !dir.is_dir() {
            return Err(SdkError::MissingSdkDir {
                path: dir,
                source_name: source.to_owned(),
            });
        }
        tracing::debug!(sdk = %dir.display(), from = source, "located Android SDK");
        Ok(dir)
    }

    fn local_properties_sdk_dir(&self) -> Result<Option<PathBuf>, SdkError> {
        let path = self.project_root.join("local.properties");
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|source| SdkError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(property(&content, "sdk.dir").map(PathBuf::from))
    }
}

/// Look up `key` in Java-properties text, undoing `\:`, `\=` and `\\` escapes.
pub fn property(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let line = line.trim_start();
        if line.starts_with('#') || line.starts_with('!') {
            return None;
        }
        let (k, v) = line.split_once('=').or_else(|| line.split_once(':'))?;
        if k.trim() != key {
            return None;
        }
        let mut out = String::with_capacity(v.len());
        let mut chars = v.trim().chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else {
                out.push(c);
            }
        }
        Some(out)
    })
}

/// Platform jars passed to the analyzer as `--lib`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformJars {
    pub android_jar: PathBuf,
    /// `optional/android.test.base.jar`, when requested and present.
    pub test_base_jar: Option<PathBuf>,
}

impl PlatformJars {
    /// Resolve the platform jars of `platform` under `sdk_dir`.
    ///
    /// A missing `android.jar` is fatal. A missing test base jar only logs a
    /// warning, since older platforms do not ship one.
    ///
    /// # Errors
    /// Returns `SdkError::MissingPlatformJar` naming the expected path.
    pub fn resolve(
        sdk_dir: &Path,
        platform: &Platform,
        use_test_base: bool,
    ) -> Result<Self, SdkError> {
        let platform_dir = sdk_dir.join("platforms").join(&platform.name);
        let android_jar = platform_dir.join("android.jar");
        if !android_jar.is_file() {
            return Err(SdkError::MissingPlatformJar { path: android_jar });
        }

        let test_base_jar = if use_test_base {
            let jar = platform_dir.join("optional").join("android.test.base.jar");
            if jar.is_file() {
                Some(jar)
            } else {
                tracing::warn!(
                    path = %jar.display(),
                    "android.test.base.jar not found, continuing without it"
                );
                None
            }
        } else {
            None
        };

        Ok(Self {
            android_jar,
            test_base_jar,
        })
    }

    /// Jars in `--lib` order.
    pub fn library_jars(&self) -> Vec<&Path> {
        std::iter::once(self.android_jar.as_path())
            .chain(self.test_base_jar.as_deref())
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("Android SDK not found: set [project] sdk_dir in keeper.toml, ANDROID_SDK_ROOT, ANDROID_HOME, or sdk.dir in local.properties")]
    NotFound,

    #[error("Android SDK directory {path} (from {source_name}) does not exist")]
    MissingSdkDir { path: PathBuf, source_name: String },

    #[error("invalid compile SDK \"{value}\", expected an API level like \"30\" or a platform like \"android-30\"")]
    InvalidCompileSdk { value: String },

    #[error("no compile SDK configured: set [project] compile_sdk in keeper.toml or compile_sdk in the variant model")]
    NoCompileSdk,

    #[error("platform jar not found at {path}: install the platform with sdkmanager")]
    MissingPlatformJar { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_sdk(root: &Path, platform: &str, test_base: bool) -> PathBuf {
        let sdk = root.join("sdk");
        let dir = sdk.join("platforms").join(platform);
        fs::create_dir_all(dir.join("optional")).unwrap();
        fs::write(dir.join("android.jar"), b"jar").unwrap();
        if test_base {
            fs::write(dir.join("optional").join("android.test.base.jar"), b"jar").unwrap();
        }
        sdk
    }

    #[test]
    fn platform_normalizes_api_level() {
        assert_eq!(Platform::parse("30").unwrap().name, "android-30");
        assert_eq!(Platform::parse(" 29 ").unwrap().name, "android-29");
        assert_eq!(Platform::parse("android-30").unwrap().name, "android-30");
        assert_eq!(Platform::parse("android-S").unwrap().name, "android-S");
    }

    #[test]
    fn platform_rejects_empty_and_paths() {
        assert!(Platform::parse("").is_err());
        assert!(Platform::parse("../android-30").is_err());
        assert!(Platform::parse("..").is_err());
    }

    #[test]
    fn configured_dir_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let configured = tmp.path().join("configured");
        let env_dir = tmp.path().join("env");
        fs::create_dir_all(&configured).unwrap();
        fs::create_dir_all(&env_dir).unwrap();

        let locator = SdkLocator {
            configured: Some(configured.clone()),
            android_sdk_root: Some(env_dir.clone()),
            android_home: Some(env_dir),
            project_root: tmp.path().to_path_buf(),
        };
        assert_eq!(locator.locate().unwrap(), configured);
    }

    #[test]
    fn sdk_root_before_android_home() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        let home = tmp.path().join("home");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&home).unwrap();

        let locator = SdkLocator {
            android_sdk_root: Some(root.clone()),
            android_home: Some(home),
            project_root: tmp.path().to_path_buf(),
            ..SdkLocator::default()
        };
        assert_eq!(locator.locate().unwrap(), root);
    }

    #[test]
    fn falls_back_to_local_properties() {
        let tmp = tempfile::tempdir().unwrap();
        let sdk = tmp.path().join("my sdk");
        fs::create_dir_all(&sdk).unwrap();
        fs::write(
            tmp.path().join("local.properties"),
            format!("# generated\nsdk.dir={}\n", sdk.display()),
        )
        .unwrap();

        let locator = SdkLocator {
            project_root: tmp.path().to_path_buf(),
            ..SdkLocator::default()
        };
        assert_eq!(locator.locate().unwrap(), sdk);
    }

    #[test]
    fn nothing_configured_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = SdkLocator {
            project_root: tmp.path().to_path_buf(),
            ..SdkLocator::default()
        };
        assert!(matches!(locator.locate(), Err(SdkError::NotFound)));
    }

    #[test]
    fn missing_configured_dir_names_source() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = SdkLocator {
            android_home: Some(tmp.path().join("absent")),
            project_root: tmp.path().to_path_buf(),
            ..SdkLocator::default()
        };
        let err = locator.locate().unwrap_err().to_string();
        assert!(err.contains("ANDROID_HOME"), "error was: {err}");
        assert!(err.contains("absent"), "error was: {err}");
    }

    #[test]
    fn property_unescapes_windows_paths() {
        let content = "ndk.dir=/ndk\nsdk.dir=C\\:\\\\Users\\\\dev\\\\sdk\n";
        assert_eq!(
            property(content, "sdk.dir").as_deref(),
            Some("C:\\Users\\dev\\sdk")
        );
        assert_eq!(property(content, "missing"), None);
        assert_eq!(property("#sdk.dir=/x", "sdk.dir"), None);
    }

    #[test]
    fn resolves_platform_jars() {
        let tmp = tempfile::tempdir().unwrap();
        let sdk = fake_sdk(tmp.path(), "android-30", true);
        let platform = Platform::parse("30").unwrap();

        let jars = PlatformJars::resolve(&sdk, &platform, true).unwrap();
        assert!(jars.android_jar.ends_with("platforms/android-30/android.jar"));
        assert!(jars.test_base_jar.is_some());
        assert_eq!(jars.library_jars().len(), 2);

        let without = PlatformJars::resolve(&sdk, &platform, false).unwrap();
        assert!(without.test_base_jar.is_none());
        assert_eq!(without.library_jars(), vec![without.android_jar.as_path()]);
    }

    #[test]
    fn missing_test_base_is_tolerated() {
        let tmp = tempfile::tempdir().unwrap();
        let sdk = fake_sdk(tmp.path(), "android-28", false);
        let jars =
            PlatformJars::resolve(&sdk, &Platform::parse("android-28").unwrap(), true).unwrap();
        assert!(jars.test_base_jar.is_none());
    }

    #[test]
    fn missing_android_jar_names_path() {
        let tmp = tempfile::tempdir().unwrap();
        let sdk = fake_sdk(tmp.path(), "android-30", false);
        let err = PlatformJars::resolve(&sdk, &Platform::parse("31").unwrap(), false)
            .unwrap_err()
            .to_string();
        assert!(err.contains("android-31"), "error was: {err}");
        assert!(err.contains("android.jar"), "error was: {err}");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn api_levels_always_prefixed(level in 1u32..100) {
                let platform = Platform::parse(&level.to_string()).unwrap();
                prop_assert_eq!(platform.name, format!("android-{level}"));
            }

            #[test]
            fn platform_names_are_stable(name in "android-[A-Za-z0-9]{1,8}") {
                let once = Platform::parse(&name).unwrap();
                let twice = Platform::parse(&once.name).unwrap();
                prop_assert_eq!(once, twice);
            }
        }
    }
}
