//! Packaging a class universe into one deterministic jar.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use keeper_util::jar::JarEntries;

use crate::cache::{Fingerprint, FingerprintInputs};
use crate::error::EngineError;
use crate::layout::{jar_list_path, sibling_with_suffix};

/// One side of the analysis: compiled class directories plus external jars.
///
/// Order matters. When two members carry the same entry name, the one listed
/// first wins, directories before jars.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassUniverse {
    pub class_dirs: Vec<PathBuf>,
    pub jars: Vec<PathBuf>,
}

impl ClassUniverse {
    pub fn new(class_dirs: Vec<PathBuf>, jars: Vec<PathBuf>) -> Self {
        Self { class_dirs, jars }
    }

    pub fn is_empty(&self) -> bool {
        self.class_dirs.is_empty() && self.jars.is_empty()
    }
}

/// Which universe an archive packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSide {
    /// Records the external jars it consumed in `<stem>-jars.txt`.
    App,
    /// Leaves out runtime jars the app archive already consumed.
    Test { app_jar_list: PathBuf },
}

impl ArchiveSide {
    fn name(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Test { .. } => "test",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub output: PathBuf,
    pub side: ArchiveSide,
    /// Also write `<archive>.inputs.txt`.
    pub emit_debug_info: bool,
    /// Rebuild even when the recorded fingerprint matches.
    pub force: bool,
}

/// A built archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    /// `<stem>-jars.txt`, app side only.
    pub jar_list: Option<PathBuf>,
    /// `false` when an up-to-date archive was reused.
    pub rebuilt: bool,
}

/// Package every class of `universe` into a jar at `options.output`.
///
/// Directories contribute their `.class` files keyed by relative path;
/// jars contribute every file entry except the manifest and signature
/// files. The first entry seen under a name wins and later duplicates are
/// dropped.
///
/// # Errors
/// Returns `EngineError::MissingInput` before writing anything if a class
/// directory, a jar, or the app jar list is missing; other errors if a jar
/// cannot be read or the output cannot be written.
pub fn build_archive(
    universe: &ClassUniverse,
    options: &ArchiveOptions,
) -> Result<Archive, EngineError> {
    check_inputs_exist(universe, &options.side)?;

    let jars = match &options.side {
        ArchiveSide::App => universe.jars.clone(),
        ArchiveSide::Test { app_jar_list } => {
            let consumed: BTreeSet<PathBuf> = keeper_util::fs::read_path_list(app_jar_list)?
                .into_iter()
                .collect();
            universe
                .jars
                .iter()
                .filter(|jar| {
                    let shared = consumed.contains(&absolutize(jar));
                    if shared {
                        tracing::debug!(jar = %jar.display(), "left to the app archive");
                    }
                    !shared
                })
                .cloned()
                .collect()
        }
    };

    let jar_list = match options.side {
        ArchiveSide::App => Some(jar_list_path(&options.output)),
        ArchiveSide::Test { .. } => None,
    };

    let mut inputs = FingerprintInputs::new().value("side", options.side.name());
    for dir in &universe.class_dirs {
        inputs = inputs.dir("classes", dir, "class");
    }
    inputs = inputs.files("jar", &jars);
    let fingerprint = Fingerprint::compute(&inputs)?;

    if options.emit_debug_info {
        write_inputs_manifest(&options.output, &universe.class_dirs, &jars)?;
    }

    let outputs_present = jar_list.as_deref().map_or(true, Path::exists);
    if !options.force && outputs_present && fingerprint.is_up_to_date(&options.output) {
        tracing::info!(archive = %options.output.display(), "up to date");
        return Ok(Archive {
            path: options.output.clone(),
            jar_list,
            rebuilt: false,
        });
    }

    let mut entries = JarEntries::new();
    for dir in &universe.class_dirs {
        add_class_dir(&mut entries, dir)?;
    }
    for jar in &jars {
        add_jar(&mut entries, jar)?;
    }

    entries.write_to(&options.output)?;
    if let Some(list) = &jar_list {
        let absolute: Vec<PathBuf> = jars.iter().map(|j| absolutize(j)).collect();
        keeper_util::fs::write_path_list(list, &absolute)?;
    }
    fingerprint.record(&options.output)?;

    tracing::info!(
        archive = %options.output.display(),
        entries = entries.len(),
        "archive written"
    );
    Ok(Archive {
        path: options.output.clone(),
        jar_list,
        rebuilt: true,
    })
}

fn check_inputs_exist(universe: &ClassUniverse, side: &ArchiveSide) -> Result<(), EngineError> {
    for dir in &universe.class_dirs {
        if !dir.is_dir() {
            return Err(EngineError::MissingInput {
                kind: "class directory".to_owned(),
                path: dir.clone(),
            });
        }
    }
    for jar in &universe.jars {
        if !jar.is_file() {
            return Err(EngineError::MissingInput {
                kind: "jar".to_owned(),
                path: jar.clone(),
            });
        }
    }
    if let ArchiveSide::Test { app_jar_list } = side {
        if !app_jar_list.is_file() {
            return Err(EngineError::MissingInput {
                kind: "app jar list".to_owned(),
                path: app_jar_list.clone(),
            });
        }
    }
    Ok(())
}

fn add_class_dir(entries: &mut JarEntries, dir: &Path) -> Result<(), EngineError> {
    for file in keeper_util::fs::collect_files(dir, "class")? {
        let Ok(relative) = file.strip_prefix(dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = std::fs::read(&file).map_err(|source| EngineError::Io {
            path: file.display().to_string(),
            source,
        })?;
        if !entries.insert(&name, bytes) {
            tracing::debug!(entry = %name, from = %dir.display(), "duplicate entry dropped");
        }
    }
    Ok(())
}

fn add_jar(entries: &mut JarEntries, jar: &Path) -> Result<(), EngineError> {
    for (name, bytes) in keeper_util::jar::read_entries(jar)? {
        if is_manifest_or_signature(&name) {
            continue;
        }
        if !entries.insert(&name, bytes) {
            tracing::debug!(entry = %name, from = %jar.display(), "duplicate entry dropped");
        }
    }
    Ok(())
}

/// `META-INF/MANIFEST.MF` and jar signature files, which describe the jar
/// they came from rather than its classes.
pub fn is_manifest_or_signature(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    let Some(meta) = upper.strip_prefix("META-INF/") else {
        return false;
    };
    if meta == "MANIFEST.MF" {
        return true;
    }
    !meta.contains('/')
        && [".SF", ".RSA", ".DSA", ".EC"]
            .iter()
            .any(|ext| meta.ends_with(ext))
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
}

fn write_inputs_manifest(
    archive: &Path,
    class_dirs: &[PathBuf],
    jars: &[PathBuf],
) -> Result<(), EngineError> {
    let mut content = String::new();
    for dir in class_dirs {
        content.push_str("dir ");
        content.push_str(&dir.display().to_string());
        content.push('\n');
    }
    for jar in jars {
        content.push_str("jar ");
        content.push_str(&jar.display().to_string());
        content.push('\n');
    }
    keeper_util::fs::write_atomic(
        &sibling_with_suffix(archive, "inputs.txt"),
        content.as_bytes(),
    )?;
    Ok(())
}
