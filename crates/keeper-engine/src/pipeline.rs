//! A Keeper run: load the project, lay out lazy units of work per variant
//! pair, and bind them into the host's tasks.

use std::path::{Path, PathBuf};

use keeper_config::manifest::{KeepRuleSyntax, Manifest, ProtocolConfig};
use keeper_config::variants::VariantModel;
use keeper_sdk::{Platform, PlatformJars, SdkError, SdkLocator};
use keeper_tracer::{Launcher, Protocol};
use keeper_util::fs::resolve_against;

use crate::analyzer::{
    analyzer_version, maven_cache_root, resolve_launcher, AnalyzerStore, LauncherRequest,
};
use crate::archive::{build_archive, Archive, ArchiveOptions, ArchiveSide, ClassUniverse};
use crate::error::EngineError;
use crate::l8::{self, L8Merge};
use crate::layout::{jar_list_path, Layout};
use crate::merge;
use crate::provider::Provider;
use crate::tasks::{l8_task_name, MinifyTask, TaskContainer};
use crate::trace::{infer_rules, InvocationSpec, RulesFile};
use crate::variant::{select_pairs, IgnoreRules, VariantPair};

pub const MANIFEST_FILE: &str = "keeper.toml";
pub const LOCKFILE: &str = "keeper.lock";

/// Options shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Redo every unit of work even when its fingerprint matches.
    pub force: bool,
    /// Forbid analyzer downloads and `keeper.lock` changes.
    pub locked: bool,
}

/// A loaded project.
#[derive(Debug)]
pub struct Keeper {
    root: PathBuf,
    manifest: Manifest,
    protocol: ProtocolConfig,
    ignore: IgnoreRules,
    model: VariantModel,
    layout: Layout,
    options: RunOptions,
}

/// The rules inferred for one pair, not yet computed.
#[derive(Debug)]
pub struct PairUnit {
    pub pair: VariantPair,
    pub rules: Provider<RulesFile>,
}

/// Host tasks with Keeper's inputs attached.
#[derive(Debug)]
pub struct Configured {
    pub tasks: TaskContainer,
    units: Vec<PairUnit>,
}

impl Configured {
    pub fn units(&self) -> &[PairUnit] {
        &self.units
    }

    /// The unit whose app or test variant is named `variant`.
    pub fn unit(&self, variant: &str) -> Option<&PairUnit> {
        self.units
            .iter()
            .find(|u| u.pair.app_name() == variant || u.pair.test_name() == variant)
    }
}

/// One line of `keeper check`.
#[derive(Debug)]
pub struct CheckItem {
    pub label: &'static str,
    pub outcome: Result<String, EngineError>,
}

/// Map the configured protocol onto the tracer's.
pub fn tracer_protocol(protocol: &ProtocolConfig) -> Protocol {
    match protocol {
        ProtocolConfig::PrintUses(section) => Protocol::PrintUses {
            allow_obfuscation: section.syntax == KeepRuleSyntax::KeepRulesAllowObfuscation,
        },
        ProtocolConfig::TraceReferences(section) => Protocol::TraceReferences {
            extra_args: section.args.clone(),
        },
    }
}

impl Keeper {
    /// Load the project rooted at `root`.
    ///
    /// Steps:
    /// 1. Read `keeper.toml` (defaults when absent) and validate it
    /// 2. Compile the `[ignore]` patterns
    /// 3. Read the host's variant model and check the host version
    /// 4. Lay out outputs under the build directory
    ///
    /// Nothing is built and no subprocess is started.
    ///
    /// # Errors
    /// Returns configuration errors: unreadable or inconsistent
    /// `keeper.toml`, malformed ignore patterns, an unreadable variant model,
    /// or an unsupported host version.
    pub fn load(root: &Path, options: RunOptions) -> Result<Self, EngineError> {
        // 1. keeper.toml is optional.
        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            Manifest::from_path(&manifest_path)?
        } else {
            tracing::debug!(root = %root.display(), "no keeper.toml, using defaults");
            Manifest::default()
        };
        manifest.validate()?;
        let protocol = manifest.protocol()?;

        // 2. Ignore patterns.
        let ignore = IgnoreRules::from_section(&manifest.ignore)?;

        // 3. Variant model.
        let variants_path = resolve_against(root, &manifest.project.variants);
        let mut model = VariantModel::from_path(&variants_path)?;
        model.check_host_version()?;
        model.resolve_relative_to(root);

        // 4. Layout.
        let layout = Layout::new(&resolve_against(root, &manifest.project.build_dir));

        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            protocol,
            ignore,
            model,
            layout,
            options,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn model(&self) -> &VariantModel {
        &self.model
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Variant pairs that survive the ignore patterns and the minify check.
    pub fn pairs(&self) -> Vec<VariantPair> {
        select_pairs(&self.model, &self.ignore)
    }

    /// Register the host's tasks and bind Keeper's lazy inputs into them.
    ///
    /// For every selected pair, the inferred rules are appended to the app's
    /// minify task and, when the app desugars the core library, the L8 tasks
    /// are reconciled. Nothing runs until a task input is resolved.
    pub fn configure(&self) -> Configured {
        let engine = &self.manifest.project.minifier;
        let mut tasks = TaskContainer::from_model(&self.model, engine);
        let launcher = self.launcher_provider();
        let platform = self.platform_provider();

        let mut units = Vec::new();
        for pair in self.pairs() {
            let rules = self.rules_provider(&pair, &launcher, &platform);
            let files = rules.map(&format!("{} rules file", pair.test_name()), |r: &RulesFile| {
                Ok(vec![r.path.clone()])
            });
            merge::wire_rules(
                &mut tasks,
                pair.app_name(),
                engine,
                files,
                &pair.test.runtime_keep_rules,
            );
            l8::reconcile(&mut tasks, &pair);
            units.push(PairUnit { pair, rules });
        }
        Configured { tasks, units }
    }

    /// Infer rules for every selected pair, or only the one naming `variant`.
    ///
    /// A variant that exists but is not selected yields nothing.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownVariant` for a name the model lacks, or
    /// the first failing unit of work.
    pub fn infer(&self, variant: Option<&str>) -> Result<Vec<RulesFile>, EngineError> {
        let configured = self.configure();
        let units: Vec<&PairUnit> = match variant {
            Some(name) => match configured.unit(name) {
                Some(unit) => vec![unit],
                None => {
                    self.require_variant(name)?;
                    tracing::warn!(
                        variant = name,
                        "variant is not processed: it has no test variant, is ignored, or is not minified"
                    );
                    Vec::new()
                }
            },
            None => configured.units().iter().collect(),
        };

        let mut written = Vec::with_capacity(units.len());
        for unit in units {
            written.push(unit.rules.get()?.clone());
        }
        Ok(written)
    }

    /// Resolve minify tasks and write their configuration-file lists.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownTask` for an unknown task name, or the
    /// first failing unit of work.
    pub fn wire(&self, task: Option<&str>) -> Result<Vec<PathBuf>, EngineError> {
        let configured = self.configure();
        let selected: Vec<&MinifyTask> = match task {
            Some(name) => vec![configured
                .tasks
                .minify(name)
                .ok_or_else(|| EngineError::UnknownTask {
                    name: name.to_owned(),
                })?],
            None => configured.tasks.minify_tasks().collect(),
        };
        selected
            .into_iter()
            .map(|t| merge::write_configuration_list(t, &self.layout))
            .collect()
    }

    /// Resolve the L8 task of app variant `variant` and write its inputs.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownVariant` or `EngineError::UnknownTask`
    /// when there is nothing to merge, or the first failing input.
    pub fn l8_merge(&self, variant: &str) -> Result<L8Merge, EngineError> {
        let app = self.app_variant(variant)?;
        let configured = self.configure();
        let name = l8_task_name(&app.name);
        let task = configured
            .tasks
            .l8(&name)
            .ok_or(EngineError::UnknownTask { name })?;
        l8::merge_inputs(
            task,
            &self.layout,
            self.manifest.diagnostics.emit_debug_info,
        )
    }

    /// Run the after-actions of the L8 task of `variant`'s test variant.
    ///
    /// Returns how many actions ran.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownVariant` or `EngineError::UnknownTask`
    /// when there is no such task, or the first failing action.
    pub fn l8_clear(&self, variant: &str) -> Result<usize, EngineError> {
        let app = self.app_variant(variant)?;
        let Some(test) = &app.test else {
            tracing::warn!(variant, "variant has no test variant, nothing to clear");
            return Ok(0);
        };
        let configured = self.configure();
        let name = l8_task_name(&test.name);
        let task = configured
            .tasks
            .l8(&name)
            .ok_or(EngineError::UnknownTask { name })?;
        task.run_after_actions()?;
        Ok(task.after_action_count())
    }

    /// Remove every Keeper output. Returns whether there was anything to remove.
    ///
    /// # Errors
    /// Returns an error if the output directory cannot be removed.
    pub fn clean(&self) -> Result<bool, EngineError> {
        let root = self.layout.root();
        let existed = root.exists();
        keeper_util::fs::remove_dir_all_if_exists(root)?;
        Ok(existed)
    }

    /// Resolve the pieces a run depends on, reporting each separately.
    ///
    /// Resolving the analyzer may download it unless running locked.
    pub fn check(&self) -> Vec<CheckItem> {
        let pairs = self.pairs();
        let variants = format!(
            "{} of {} variant(s) selected{}",
            pairs.len(),
            self.model.variants.len(),
            self.model
                .host_version
                .as_deref()
                .map(|v| format!(", host {v}"))
                .unwrap_or_default()
        );

        let platform = self.platform_provider();
        let sdk = platform.get().map(|jars| {
            jars.library_jars()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(":")
        });

        let protocol = tracer_protocol(&self.protocol);
        let launcher = self.launcher_provider();
        let analyzer = launcher.get().map(|launcher| {
            let line = keeper_util::process::format_command_line(
                &launcher.program(),
                &launcher.prefix_args(),
            );
            match launcher {
                Launcher::Jvm { .. } if self.manifest.analyzer.jar.is_none() => format!(
                    "{} via r8 {}: {line}",
                    protocol.tool(),
                    analyzer_version(&self.manifest, &self.protocol)
                ),
                _ => format!("{}: {line}", protocol.tool()),
            }
        });

        vec![
            CheckItem {
                label: "variants",
                outcome: Ok(variants),
            },
            CheckItem {
                label: "android sdk",
                outcome: sdk,
            },
            CheckItem {
                label: "analyzer",
                outcome: analyzer,
            },
        ]
    }

    fn app_variant(&self, name: &str) -> Result<&keeper_config::variants::AppVariant, EngineError> {
        self.model
            .find(name)
            .ok_or_else(|| EngineError::UnknownVariant {
                name: name.to_owned(),
            })
    }

    fn require_variant(&self, name: &str) -> Result<(), EngineError> {
        let known = self.model.variants.iter().any(|v| {
            v.name == name || v.test.as_ref().is_some_and(|t| t.name == name)
        });
        if known {
            Ok(())
        } else {
            Err(EngineError::UnknownVariant {
                name: name.to_owned(),
            })
        }
    }

    fn platform_provider(&self) -> Provider<PlatformJars> {
        let configured = self
            .manifest
            .project
            .sdk_dir
            .as_deref()
            .map(|dir| resolve_against(&self.root, dir))
            .or_else(|| self.model.sdk_dir.clone());
        let compile_sdk = self
            .manifest
            .project
            .compile_sdk
            .clone()
            .or_else(|| self.model.compile_sdk.clone());
        let use_test_base = self.manifest.project.use_test_base;
        let root = self.root.clone();

        Provider::new("platform jars", move || {
            let compile_sdk = compile_sdk.as_deref().ok_or(SdkError::NoCompileSdk)?;
            let platform = Platform::parse(compile_sdk)?;
            let sdk = SdkLocator::from_env(configured.clone(), &root).locate()?;
            Ok(PlatformJars::resolve(&sdk, &platform, use_test_base)?)
        })
    }

    fn launcher_provider(&self) -> Provider<Launcher> {
        let root = self.root.clone();
        let manifest = self.manifest.clone();
        let protocol = self.protocol.clone();
        let locked = self.options.locked;

        Provider::new("analyzer launcher", move || {
            let store = AnalyzerStore {
                cache_root: maven_cache_root()?,
                lockfile: root.join(LOCKFILE),
                repository: manifest.analyzer.repository.clone(),
            };
            resolve_launcher(&LauncherRequest {
                root: &root,
                manifest: &manifest,
                protocol: &protocol,
                store: &store,
                locked,
            })
        })
    }

    /// App archive, then test archive, then the analyzer run, as one chain.
    ///
    /// The platform jars and the launcher are forced before any archive so
    /// configuration errors surface before input errors.
    fn rules_provider(
        &self,
        pair: &VariantPair,
        launcher: &Provider<Launcher>,
        platform: &Provider<PlatformJars>,
    ) -> Provider<RulesFile> {
        let test = pair.test_name().to_owned();
        let debug = self.manifest.diagnostics.emit_debug_info;
        let force = self.options.force;

        let app_universe = ClassUniverse::new(pair.app.classes.clone(), pair.app.runtime_jars.clone());
        let app_options = ArchiveOptions {
            output: self.layout.app_archive(&test),
            side: ArchiveSide::App,
            emit_debug_info: debug,
            force,
        };
        let app_archive = Provider::new(&format!("{test} app archive"), move || {
            build_archive(&app_universe, &app_options)
        });

        let test_universe =
            ClassUniverse::new(pair.test.classes.clone(), pair.test.runtime_jars.clone());
        let test_output = self.layout.test_archive(&test);
        let test_archive = app_archive.map(&format!("{test} test archive"), move |app: &Archive| {
            let options = ArchiveOptions {
                output: test_output.clone(),
                side: ArchiveSide::Test {
                    app_jar_list: app
                        .jar_list
                        .clone()
                        .unwrap_or_else(|| jar_list_path(&app.path)),
                },
                emit_debug_info: debug,
                force,
            };
            build_archive(&test_universe, &options)
        });

        let protocol = tracer_protocol(&self.protocol);
        let rules_output = self.layout.rules_file(&test);
        let launcher = launcher.clone();
        let platform = platform.clone();
        Provider::new(&format!("{test} inferred rules"), move || {
            let platform = platform.get()?.clone();
            let launcher = launcher.get()?.clone();
            let spec = InvocationSpec {
                app_archive: app_archive.get()?.path.clone(),
                test_archive: test_archive.get()?.path.clone(),
                platform,
                protocol: protocol.clone(),
                launcher,
                rules_output: rules_output.clone(),
                emit_debug_info: debug,
                force,
            };
            infer_rules(&spec)
        })
    }
}
