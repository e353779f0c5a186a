#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use keeper_engine::{Keeper, RunOptions};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "keeper", about = "Infer keep rules for app code used by instrumentation tests")]
#[command(version)]
struct Cli {
    /// Project directory holding keeper.toml (defaults to the current directory)
    #[arg(long, short = 'C', global = true)]
    project_dir: Option<PathBuf>,
    /// Log debug detail
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build archives and run the analyzer for each variant pair
    Infer {
        /// Only this app or test variant
        #[arg(long)]
        variant: Option<String>,
        /// Redo every step, ignoring recorded fingerprints
        #[arg(long)]
        force: bool,
        /// Require keeper.lock to pin the analyzer; never download
        #[arg(long)]
        locked: bool,
    },
    /// Resolve minify tasks and write their configuration-file lists
    Wire {
        /// Only this task, e.g. minifyReleaseWithR8
        #[arg(long)]
        task: Option<String>,
        /// Redo every step, ignoring recorded fingerprints
        #[arg(long)]
        force: bool,
        /// Require keeper.lock to pin the analyzer; never download
        #[arg(long)]
        locked: bool,
    },
    /// Reconcile desugared-library dexing between app and test
    L8 {
        #[command(subcommand)]
        action: L8Action,
    },
    /// Check configuration, variant model, SDK and analyzer
    Check {
        /// Require keeper.lock to pin the analyzer; never download
        #[arg(long)]
        locked: bool,
    },
    /// Remove Keeper's build outputs
    Clean,
}

#[derive(Debug, Subcommand)]
enum L8Action {
    /// Write the app L8 task's keep-rule list and extra directives
    Merge {
        /// App variant name
        #[arg(long)]
        variant: String,
    },
    /// Empty the test variant's desugared-library output
    Clear {
        /// App variant name
        #[arg(long)]
        variant: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = project_root(cli.project_dir.as_deref()).and_then(|root| match cli.command {
        Command::Infer {
            variant,
            force,
            locked,
        } => cmd_infer(&root, variant.as_deref(), RunOptions { force, locked }),
        Command::Wire {
            task,
            force,
            locked,
        } => cmd_wire(&root, task.as_deref(), RunOptions { force, locked }),
        Command::L8 { action } => cmd_l8(&root, &action),
        Command::Check { locked } => cmd_check(&root, locked),
        Command::Clean => cmd_clean(&root),
    });

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `-q` and `-v` pick the level.
fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn project_root(dir: Option<&Path>) -> Result<PathBuf, Box<dyn Error>> {
    let root = match dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    if !root.is_dir() {
        return Err(format!("project directory {} does not exist", root.display()).into());
    }
    Ok(root)
}

fn cmd_infer(root: &Path, variant: Option<&str>, options: RunOptions) -> CliResult {
    let keeper = Keeper::load(root, options)?;
    let rules = keeper.infer(variant)?;

    for file in &rules {
        let verb = if file.regenerated { "Inferred" } else { "Fresh" };
        eprintln!("    {verb} {}", file.path.display());
        println!("{}", file.path.display());
    }
    eprintln!("    Finished {} variant pair(s)", rules.len());
    Ok(())
}

fn cmd_wire(root: &Path, task: Option<&str>, options: RunOptions) -> CliResult {
    let keeper = Keeper::load(root, options)?;
    let lists = keeper.wire(task)?;

    for list in &lists {
        println!("{}", list.display());
    }
    eprintln!("    Wired {} minify task(s)", lists.len());
    Ok(())
}

fn cmd_l8(root: &Path, action: &L8Action) -> CliResult {
    let keeper = Keeper::load(root, RunOptions::default())?;
    match action {
        L8Action::Merge { variant } => {
            let merge = keeper.l8_merge(variant)?;
            println!("{}", merge.keep_rules_list.display());
            println!("{}", merge.configurations.display());
            if let Some(diagnostics) = &merge.diagnostics {
                eprintln!("    Merged rules written to {}", diagnostics.display());
            }
            eprintln!("    Reconciled desugared library for `{variant}`");
        }
        L8Action::Clear { variant } => {
            let actions = keeper.l8_clear(variant)?;
            eprintln!("    Cleared test desugared-library output for `{variant}` ({actions} action(s))");
        }
    }
    Ok(())
}

fn cmd_check(root: &Path, locked: bool) -> CliResult {
    eprintln!("Checking {}...", root.display());
    eprintln!();

    let keeper = match Keeper::load(
        root,
        RunOptions {
            force: false,
            locked,
        },
    ) {
        Ok(keeper) => {
            eprintln!("  [ok] configuration");
            keeper
        }
        Err(e) => {
            eprintln!("  [!!] configuration: {e}");
            return Err("1 issue found".into());
        }
    };

    let mut issues = 0u32;
    for item in keeper.check() {
        match item.outcome {
            Ok(detail) => eprintln!("  [ok] {}: {detail}", item.label),
            Err(e) => {
                eprintln!("  [!!] {}: {e}", item.label);
                issues = issues.saturating_add(1);
            }
        }
    }

    eprintln!();
    if issues > 0 {
        return Err(format!("{issues} issue(s) found").into());
    }
    eprintln!("All checks passed.");
    Ok(())
}

fn cmd_clean(root: &Path) -> CliResult {
    let keeper = Keeper::load(root, RunOptions::default())?;
    if keeper.clean()? {
        eprintln!("    Cleaned {}", keeper.layout().root().display());
    } else {
        eprintln!("    Nothing to clean");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_infer_defaults() {
        let cli = Cli::try_parse_from(["keeper", "infer"]).unwrap();
        match cli.command {
            Command::Infer {
                variant,
                force,
                locked,
            } => {
                assert!(variant.is_none());
                assert!(!force);
                assert!(!locked);
            }
            other => panic!("expected Infer, got {other:?}"),
        }
        assert!(!cli.verbose);
        assert!(cli.project_dir.is_none());
    }

    #[test]
    fn parse_infer_with_flags() {
        let cli = Cli::try_parse_from([
            "keeper",
            "infer",
            "--variant",
            "externalRelease",
            "--force",
            "--locked",
            "-C",
            "app",
        ])
        .unwrap();
        match cli.command {
            Command::Infer {
                variant,
                force,
                locked,
            } => {
                assert_eq!(variant.as_deref(), Some("externalRelease"));
                assert!(force);
                assert!(locked);
            }
            other => panic!("expected Infer, got {other:?}"),
        }
        assert_eq!(cli.project_dir, Some(PathBuf::from("app")));
    }

    #[test]
    fn parse_wire_task() {
        let cli =
            Cli::try_parse_from(["keeper", "wire", "--task", "minifyReleaseWithR8"]).unwrap();
        match cli.command {
            Command::Wire { task, .. } => assert_eq!(task.as_deref(), Some("minifyReleaseWithR8")),
            other => panic!("expected Wire, got {other:?}"),
        }
    }

    #[test]
    fn parse_l8_actions() {
        let cli = Cli::try_parse_from(["keeper", "l8", "merge", "--variant", "release"]).unwrap();
        match cli.command {
            Command::L8 {
                action: L8Action::Merge { variant },
            } => assert_eq!(variant, "release"),
            other => panic!("expected L8 Merge, got {other:?}"),
        }

        let cli = Cli::try_parse_from(["keeper", "l8", "clear", "--variant", "release"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::L8 {
                action: L8Action::Clear { .. }
            }
        ));
    }

    #[test]
    fn l8_requires_variant() {
        let err = Cli::try_parse_from(["keeper", "l8", "merge"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        let err = Cli::try_parse_from(["keeper", "-v", "-q", "clean"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn unknown_subcommand_rejected() {
        let err = Cli::try_parse_from(["keeper", "shrink"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn missing_project_dir_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let err = project_root(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn project_dir_used_as_root() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(project_root(Some(tmp.path())).unwrap(), tmp.path());
    }
}
