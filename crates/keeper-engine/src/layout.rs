//! Where Keeper puts its outputs under the build directory.

use std::path::{Path, PathBuf};

/// Output locations, all under `<build_dir>/intermediates/keeper`.
///
/// Per-pair outputs are keyed by the test variant name and per-task outputs
/// by the app variant name, so no two units of work share a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Layout for a project whose build directory is `build_dir`.
    pub fn new(build_dir: &Path) -> Self {
        Self {
            root: build_dir.join("intermediates").join("keeper"),
        }
    }

    /// `<build>/intermediates/keeper`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn variant_dir(&self, variant: &str) -> PathBuf {
        self.root.join(variant)
    }

    pub fn app_archive(&self, test_variant: &str) -> PathBuf {
        self.variant_dir(test_variant).join("app.jar")
    }

    pub fn test_archive(&self, test_variant: &str) -> PathBuf {
        self.variant_dir(test_variant).join("androidTest.jar")
    }

    pub fn rules_file(&self, test_variant: &str) -> PathBuf {
        self.variant_dir(test_variant).join("inferredKeepRules.pro")
    }

    /// Resolved configuration files of an app variant's minify task.
    pub fn minify_configuration_list(&self, app_variant: &str) -> PathBuf {
        self.variant_dir(app_variant)
            .join("minifyConfigurationFiles.txt")
    }

    /// Resolved keep-rule files of an app variant's L8 task.
    pub fn l8_keep_rules_list(&self, app_variant: &str) -> PathBuf {
        self.variant_dir(app_variant).join("l8KeepRulesFiles.txt")
    }

    /// Extra configuration directives of an app variant's L8 task.
    pub fn l8_configurations(&self, app_variant: &str) -> PathBuf {
        self.variant_dir(app_variant).join("l8Configurations.pro")
    }

    pub fn l8_diagnostics(&self, app_variant: &str) -> PathBuf {
        self.root
            .join("l8-diagnostics")
            .join(app_variant)
            .join("mergedL8Rules.pro")
    }
}

/// `<archive-stem>-jars.txt`, next to the archive.
pub fn jar_list_path(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map_or_else(|| "archive".to_owned(), |s| s.to_string_lossy().into_owned());
    archive.with_file_name(format!("{stem}-jars.txt"))
}

/// `<file>.<suffix>`, keeping the full original file name.
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
