//! The host's downstream tasks, as far as Keeper touches them.
//!
//! Minify tasks consume configuration files; desugared-library (L8) dexing
//! tasks consume keep-rule files and extra directives. Both take their file
//! inputs as providers, so registering an input runs nothing and resolving
//! a task forces only the providers attached to it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use keeper_config::variants::VariantModel;

use crate::error::EngineError;
use crate::provider::Provider;
use crate::variant::capitalize;

/// A lazily produced list of files.
pub type FileList = Provider<Vec<PathBuf>>;

/// `minify<Variant>With<Engine>`.
pub fn minify_task_name(variant: &str, engine: &str) -> String {
    format!("minify{}With{engine}", capitalize(variant))
}

/// `l8DexDesugarLib<Variant>`.
pub fn l8_task_name(variant: &str) -> String {
    format!("l8DexDesugarLib{}", capitalize(variant))
}

fn resolve_all(inputs: &[FileList]) -> Result<Vec<PathBuf>, EngineError> {
    let mut files = Vec::new();
    for input in inputs {
        files.extend(input.get()?.iter().cloned());
    }
    Ok(files)
}

/// An app variant's minification step.
#[derive(Debug)]
pub struct MinifyTask {
    pub name: String,
    pub variant: String,
    configuration_files: Vec<FileList>,
}

impl MinifyTask {
    pub fn new(name: &str, variant: &str) -> Self {
        Self {
            name: name.to_owned(),
            variant: variant.to_owned(),
            configuration_files: Vec::new(),
        }
    }

    pub fn add_configuration_files(&mut self, files: FileList) {
        self.configuration_files.push(files);
    }

    pub fn configuration_inputs(&self) -> &[FileList] {
        &self.configuration_files
    }

    /// Force every configuration-file provider, in registration order.
    ///
    /// # Errors
    /// Returns the first provider failure.
    pub fn resolve_configuration_files(&self) -> Result<Vec<PathBuf>, EngineError> {
        resolve_all(&self.configuration_files)
    }
}

type AfterAction = Box<dyn Fn() -> Result<(), EngineError>>;

/// A variant's desugared-library dexing step.
pub struct L8DexTask {
    pub name: String,
    pub variant: String,
    /// Where the step writes its dex output.
    pub output_dir: Option<PathBuf>,
    keep_rules: Vec<FileList>,
    extra_configurations: Vec<String>,
    after_actions: Vec<AfterAction>,
}

impl L8DexTask {
    pub fn new(name: &str, variant: &str, output_dir: Option<PathBuf>) -> Self {
        Self {
            name: name.to_owned(),
            variant: variant.to_owned(),
            output_dir,
            keep_rules: Vec::new(),
            extra_configurations: Vec::new(),
            after_actions: Vec::new(),
        }
    }

    pub fn add_keep_rules(&mut self, files: FileList) {
        self.keep_rules.push(files);
    }

    /// Append a configuration directive, once.
    pub fn add_extra_configuration(&mut self, directive: &str) {
        if !self.extra_configurations.iter().any(|d| d == directive) {
            self.extra_configurations.push(directive.to_owned());
        }
    }

    pub fn extra_configurations(&self) -> &[String] {
        &self.extra_configurations
    }

    /// Register an action to run after the step has executed.
    pub fn do_last(&mut self, action: impl Fn() -> Result<(), EngineError> + 'static) {
        self.after_actions.push(Box::new(action));
    }

    pub fn after_action_count(&self) -> usize {
        self.after_actions.len()
    }

    /// Force every keep-rules provider, in registration order.
    ///
    /// # Errors
    /// Returns the first provider failure.
    pub fn resolve_keep_rules(&self) -> Result<Vec<PathBuf>, EngineError> {
        resolve_all(&self.keep_rules)
    }

    /// Run the registered after-actions in order, stopping at the first failure.
    ///
    /// # Errors
    /// Returns the failing action's error.
    pub fn run_after_actions(&self) -> Result<(), EngineError> {
        for action in &self.after_actions {
            action()?;
        }
        Ok(())
    }
}

impl fmt::Debug for L8DexTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("L8DexTask")
            .field("name", &self.name)
            .field("variant", &self.variant)
            .field("output_dir", &self.output_dir)
            .field("keep_rules", &self.keep_rules)
            .field("extra_configurations", &self.extra_configurations)
            .field("after_actions", &self.after_actions.len())
            .finish()
    }
}

/// Every host task Keeper may configure, keyed by task name.
#[derive(Debug, Default)]
pub struct TaskContainer {
    minify: BTreeMap<String, MinifyTask>,
    l8: BTreeMap<String, L8DexTask>,
}

impl TaskContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tasks the host runs for `model`.
    ///
    /// Minified app variants get a minify task seeded with their own
    /// configuration files. Variants that desugar the core library get an
    /// L8 task, seeded with their existing keep rules; their test variants
    /// get one too.
    pub fn from_model(model: &VariantModel, engine: &str) -> Self {
        let mut tasks = Self::new();
        for app in &model.variants {
            if app.minify_enabled {
                let mut task = MinifyTask::new(&minify_task_name(&app.name, engine), &app.name);
                if !app.proguard_files.is_empty() {
                    task.add_configuration_files(Provider::of(
                        &format!("{} proguard files", app.name),
                        app.proguard_files.clone(),
                    ));
                }
                tasks.add_minify(task);
            }
            if app.core_library_desugaring {
                let mut task = L8DexTask::new(
                    &l8_task_name(&app.name),
                    &app.name,
                    app.l8_output_dir.clone(),
                );
                if !app.l8_keep_rules.is_empty() {
                    task.add_keep_rules(Provider::of(
                        &format!("{} L8 keep rules", app.name),
                        app.l8_keep_rules.clone(),
                    ));
                }
                tasks.add_l8(task);

                if let Some(test) = &app.test {
                    tasks.add_l8(L8DexTask::new(
                        &l8_task_name(&test.name),
                        &test.name,
                        test.l8_output_dir.clone(),
                    ));
                }
            }
        }
        tasks
    }

    pub fn add_minify(&mut self, task: MinifyTask) {
        self.minify.insert(task.name.clone(), task);
    }

    pub fn add_l8(&mut self, task: L8DexTask) {
        self.l8.insert(task.name.clone(), task);
    }

    pub fn minify(&self, name: &str) -> Option<&MinifyTask> {
        self.minify.get(name)
    }

    pub fn minify_mut(&mut self, name: &str) -> Option<&mut MinifyTask> {
        self.minify.get_mut(name)
    }

    pub fn l8(&self, name: &str) -> Option<&L8DexTask> {
        self.l8.get(name)
    }

    pub fn l8_mut(&mut self, name: &str) -> Option<&mut L8DexTask> {
        self.l8.get_mut(name)
    }

    pub fn minify_tasks(&self) -> impl Iterator<Item = &MinifyTask> {
        self.minify.values()
    }

    pub fn l8_tasks(&self) -> impl Iterator<Item = &L8DexTask> {
        self.l8.values()
    }
}
