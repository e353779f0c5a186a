//! Binding inferred rules into the app variant's minify task.

use std::path::PathBuf;

use crate::error::EngineError;
use crate::layout::Layout;
use crate::provider::Provider;
use crate::tasks::{minify_task_name, FileList, MinifyTask, TaskContainer};

/// Append the inferred rules and the test runtime's own keep rules to the
/// `minify<Variant>With<Engine>` task of `app_variant`.
///
/// `rules` stays lazy: nothing is inferred until the task is resolved.
/// Returns `false`, doing nothing, when the host has no such task.
pub fn wire_rules(
    tasks: &mut TaskContainer,
    app_variant: &str,
    engine: &str,
    rules: FileList,
    runtime_keep_rules: &[PathBuf],
) -> bool {
    let name = minify_task_name(app_variant, engine);
    let Some(task) = tasks.minify_mut(&name) else {
        tracing::debug!(task = %name, "no minify task, rules not wired");
        return false;
    };

    task.add_configuration_files(rules);
    if !runtime_keep_rules.is_empty() {
        task.add_configuration_files(Provider::of(
            &format!("{app_variant} test runtime keep rules"),
            runtime_keep_rules.to_vec(),
        ));
    }
    tracing::debug!(task = %name, "inferred rules wired");
    true
}

/// Resolve `task` and write its configuration files, one path per line, to
/// `<build>/intermediates/keeper/<variant>/minifyConfigurationFiles.txt`.
///
/// # Errors
/// Returns the first provider failure, or an error writing the list.
pub fn write_configuration_list(task: &MinifyTask, layout: &Layout) -> Result<PathBuf, EngineError> {
    let files = task.resolve_configuration_files()?;
    let list = layout.minify_configuration_list(&task.variant);
    keeper_util::fs::write_path_list(&list, &files)?;
    tracing::info!(task = %task.name, files = files.len(), "configuration files written");
    Ok(list)
}
