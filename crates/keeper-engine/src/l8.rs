//! Keeping the app and test copies of the desugared library consistent.
//!
//! When an app desugars the core library, the app and its test APK each dex
//! their own copy of the backport classes, and each copy is minified on its
//! own. The reconciler makes the app's copy the only one: the app's L8 step
//! keeps everything the test code uses and skips obfuscation, and the test's
//! L8 output is emptied after it runs.

use std::path::{Path, PathBuf};

use keeper_config::variants::TestVariant;

use crate::error::EngineError;
use crate::layout::Layout;
use crate::provider::Provider;
use crate::tasks::{l8_task_name, FileList, L8DexTask, TaskContainer};
use crate::variant::VariantPair;

pub const DONT_OBFUSCATE: &str = "-dontobfuscate";

/// The keep rules the test variant's minifier emitted for the desugared
/// library, as a lazy single-file list.
///
/// Resolves to an empty list, with a warning, when the host did not report
/// the file or it has not been produced.
pub fn desugar_rules_provider(test: &TestVariant) -> FileList {
    let test_name = test.name.clone();
    let path = test.desugar_keep_rules.clone();
    Provider::new(&format!("{test_name} desugared-library keep rules"), move || {
        match &path {
            Some(path) if path.is_file() => Ok(vec![path.clone()]),
            Some(path) => {
                tracing::warn!(
                    variant = %test_name,
                    path = %path.display(),
                    "desugared-library keep rules not found, the app's L8 step gets none from the test"
                );
                Ok(Vec::new())
            }
            None => {
                tracing::warn!(
                    variant = %test_name,
                    "host reported no desugared-library keep rules for the test variant"
                );
                Ok(Vec::new())
            }
        }
    })
}

/// What [`reconcile`] attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub app_task: bool,
    pub test_task: bool,
}

/// Wire the desugared-library reconciliation for one pair.
///
/// Does nothing unless the app variant desugars the core library. Missing
/// L8 tasks are skipped with a debug message.
pub fn reconcile(tasks: &mut TaskContainer, pair: &VariantPair) -> Reconciled {
    let mut done = Reconciled::default();
    if !pair.app.core_library_desugaring {
        return done;
    }

    let app_task = l8_task_name(pair.app_name());
    match tasks.l8_mut(&app_task) {
        Some(task) => {
            task.add_keep_rules(desugar_rules_provider(&pair.test));
            task.add_extra_configuration(DONT_OBFUSCATE);
            done.app_task = true;
        }
        None => tracing::debug!(task = %app_task, "no L8 task for the app variant"),
    }

    let test_task = l8_task_name(pair.test_name());
    match tasks.l8_mut(&test_task) {
        Some(task) => match task.output_dir.clone() {
            Some(dir) => {
                task.do_last(move || clear_output(&dir).map(drop));
                done.test_task = true;
            }
            None => tracing::debug!(task = %test_task, "L8 task has no output directory"),
        },
        None => tracing::debug!(task = %test_task, "no L8 task for the test variant"),
    }
    done
}

/// Delete every entry of `dir` and leave it in place, empty.
///
/// Returns how many entries were removed.
///
/// # Errors
/// Returns an error if an entry cannot be removed, and
/// `EngineError::ClearOutput` if the directory cannot be recreated.
pub fn clear_output(dir: &Path) -> Result<usize, EngineError> {
    let removed = if dir.exists() {
        keeper_util::fs::clear_dir_contents(dir)?
    } else {
        0
    };
    std::fs::create_dir_all(dir).map_err(|source| EngineError::ClearOutput {
        path: dir.to_path_buf(),
        source,
    })?;
    tracing::info!(dir = %dir.display(), removed, "cleared desugared-library output");
    Ok(removed)
}

/// Files written for a resolved app L8 task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L8Merge {
    pub keep_rules_list: PathBuf,
    pub configurations: PathBuf,
    /// `mergedL8Rules.pro`, when debug info is on.
    pub diagnostics: Option<PathBuf>,
}

/// Resolve `task` and hand its inputs to the host.
///
/// Writes the keep-rule file list and the extra directives under the
/// variant's directory. With `emit_debug_info`, first writes the merged
/// diagnostics file.
///
/// # Errors
/// Returns the first provider failure, or an error reading a rules file
/// or writing an output.
pub fn merge_inputs(
    task: &L8DexTask,
    layout: &Layout,
    emit_debug_info: bool,
) -> Result<L8Merge, EngineError> {
    let files = task.resolve_keep_rules()?;

    let diagnostics = if emit_debug_info {
        let path = layout.l8_diagnostics(&task.variant);
        let merged = merged_rules(&files, task.extra_configurations())?;
        keeper_util::fs::write_atomic(&path, merged.as_bytes())?;
        Some(path)
    } else {
        None
    };

    let keep_rules_list = layout.l8_keep_rules_list(&task.variant);
    keeper_util::fs::write_path_list(&keep_rules_list, &files)?;

    let configurations = layout.l8_configurations(&task.variant);
    let mut directives = String::new();
    for directive in task.extra_configurations() {
        directives.push_str(directive);
        directives.push('\n');
    }
    keeper_util::fs::write_atomic(&configurations, directives.as_bytes())?;

    tracing::info!(task = %task.name, files = files.len(), "L8 inputs written");
    Ok(L8Merge {
        keep_rules_list,
        configurations,
        diagnostics,
    })
}

/// Every rules file under a `# Source:` header, then the extra directives.
fn merged_rules(files: &[PathBuf], extra: &[String]) -> Result<String, EngineError> {
    let mut out = String::new();
    for file in files {
        let content = std::fs::read_to_string(file).map_err(|source| EngineError::Io {
            path: file.display().to_string(),
            source,
        })?;
        out.push_str("# Source: ");
        out.push_str(&file.display().to_string());
        out.push('\n');
        out.push_str(&content);
        if !content.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str("# Extra configurations\n");
    for directive in extra {
        out.push_str(directive);
        out.push('\n');
    }
    Ok(out)
}
