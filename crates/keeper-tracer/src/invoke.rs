//! Analyzer command construction and execution.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::TracerError;

/// Entry point of the analyzer jar that dispatches on the tool name.
pub const R8_MAIN_CLASS: &str = "com.android.tools.r8.SwissArmyKnife";

/// Which analyzer protocol to speak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// The legacy `print-uses` tool: rules are printed on stdout.
    PrintUses { allow_obfuscation: bool },
    /// The `tracereferences` tool: rules are written to a file.
    TraceReferences { extra_args: Vec<String> },
}

impl Default for Protocol {
    fn default() -> Self {
        Self::PrintUses {
            allow_obfuscation: false,
        }
    }
}

impl Protocol {
    /// The tool name passed as the first analyzer argument.
    pub fn tool(&self) -> &'static str {
        match self {
            Self::PrintUses { .. } => "print-uses",
            Self::TraceReferences { .. } => "tracereferences",
        }
    }

    /// Whether rules arrive on stdout rather than in an output file.
    pub fn rules_on_stdout(&self) -> bool {
        matches!(self, Self::PrintUses { .. })
    }
}

/// How the analyzer process is started.
#[derive(Debug, Clone)]
pub enum Launcher {
    /// `java [jvm_args] [-ea] -cp <jar> <main class>`.
    Jvm {
        java: PathBuf,
        jar: PathBuf,
        jvm_args: Vec<String>,
        enable_assertions: bool,
    },
    /// A user-supplied program and leading arguments.
    Command { program: String, args: Vec<String> },
}

impl Launcher {
    /// Build a launcher from an `[analyzer] command` list.
    ///
    /// # Errors
    /// Returns `TracerError::EmptyCommand` if the list is empty.
    pub fn from_command(command: &[String]) -> Result<Self, TracerError> {
        let Some((program, args)) = command.split_first() else {
            return Err(TracerError::EmptyCommand);
        };
        Ok(Self::Command {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// The program to spawn.
    pub fn program(&self) -> String {
        match self {
            Self::Jvm { java, .. } => java.display().to_string(),
            Self::Command { program, .. } => program.clone(),
        }
    }

    /// Arguments that precede the tool arguments.
    pub fn prefix_args(&self) -> Vec<String> {
        match self {
            Self::Jvm {
                jar,
                jvm_args,
                enable_assertions,
                ..
            } => {
                let mut args = jvm_args.clone();
                if *enable_assertions {
                    args.push("-ea".to_owned());
                }
                args.push("-cp".to_owned());
                args.push(jar.display().to_string());
                args.push(R8_MAIN_CLASS.to_owned());
                args
            }
            Self::Command { args, .. } => args.clone(),
        }
    }
}

/// Result of one analyzer run.
#[derive(Debug)]
pub struct TraceOutput {
    pub success: bool,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Program followed by every argument, as spawned.
    pub command_line: Vec<String>,
}

/// Builder for one analyzer invocation.
#[derive(Debug, Default)]
pub struct TracerCommand {
    app_archive: Option<PathBuf>,
    test_archive: Option<PathBuf>,
    libraries: Vec<PathBuf>,
    protocol: Protocol,
    rules_output: Option<PathBuf>,
}

impl TracerCommand {
    /// Create a new empty command builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the archive whose definitions are kept.
    pub fn app_archive(mut self, path: &Path) -> Self {
        self.app_archive = Some(path.to_path_buf());
        self
    }

    /// Set the archive whose references are traced.
    pub fn test_archive(mut self, path: &Path) -> Self {
        self.test_archive = Some(path.to_path_buf());
        self
    }

    /// Set the `--lib` jars, platform jar first.
    pub fn libraries(mut self, paths: &[PathBuf]) -> Self {
        self.libraries = paths.to_vec();
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Where `tracereferences` writes its keep rules. Unused by `print-uses`.
    pub fn rules_output(mut self, path: &Path) -> Self {
        self.rules_output = Some(path.to_path_buf());
        self
    }

    /// Build the tool argument list, without the launcher prefix.
    ///
    /// # Errors
    /// Returns an error if an archive, the platform jar, or (for
    /// trace-references) the rules output path is not set.
    pub fn build_args(&self) -> Result<Vec<String>, TracerError> {
        let Some(app) = &self.app_archive else {
            return Err(TracerError::NoAppArchive);
        };
        let Some(test) = &self.test_archive else {
            return Err(TracerError::NoTestArchive);
        };
        if self.libraries.is_empty() {
            return Err(TracerError::NoLibrary);
        }
        let lib = self
            .libraries
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");

        let mut args = vec![self.protocol.tool().to_owned()];
        match &self.protocol {
            Protocol::PrintUses { allow_obfuscation } => {
                let syntax = if *allow_obfuscation {
                    "keeprules-allowobfuscation"
                } else {
                    "keeprules"
                };
                args.push("--pg".to_owned());
                args.push(syntax.to_owned());
                args.push("--lib".to_owned());
                args.push(lib);
                // The tool reports symbols used by the first archive that
                // are defined in the second.
                args.push(test.display().to_string());
                args.push(app.display().to_string());
            }
            Protocol::TraceReferences { extra_args } => {
                let Some(output) = &self.rules_output else {
                    return Err(TracerError::NoRulesOutput);
                };
                args.push("--lib".to_owned());
                args.push(lib);
                args.push("--target".to_owned());
                args.push(app.display().to_string());
                args.push("--source".to_owned());
                args.push(test.display().to_string());
                args.push("--proguard-keep-rules-output".to_owned());
                args.push(output.display().to_string());
                args.extend(extra_args.iter().cloned());
            }
        }
        Ok(args)
    }

    /// The full command line: program, launcher prefix, tool arguments.
    ///
    /// # Errors
    /// Returns an error if the tool arguments cannot be built.
    pub fn command_line(&self, launcher: &Launcher) -> Result<Vec<String>, TracerError> {
        let mut line = vec![launcher.program()];
        line.extend(launcher.prefix_args());
        line.extend(self.build_args()?);
        Ok(line)
    }

    /// Run the analyzer and capture its output.
    ///
    /// A non-zero exit is reported through `TraceOutput::success`, not as an error.
    ///
    /// # Errors
    /// Returns an error if the arguments are incomplete or the process cannot
    /// be spawned.
    pub fn execute(&self, launcher: &Launcher) -> Result<TraceOutput, TracerError> {
        let command_line = self.command_line(launcher)?;
        let Some((program, args)) = command_line.split_first() else {
            return Err(TracerError::EmptyCommand);
        };

        tracing::debug!(
            command = %keeper_util::process::format_command_line(program, args),
            "running analyzer"
        );
        let mut cmd = Command::new(program);
        cmd.args(args);
        let output = keeper_util::process::run_command(&mut cmd)?;

        Ok(TraceOutput {
            success: output.success,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            command_line,
        })
    }
}
