//! Running external tools to completion.

use std::process::{Command, Stdio};

use crate::error::UtilError;

/// What a finished process left behind.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    /// `None` when the process died from a signal.
    pub exit_code: Option<i32>,
}

/// Run `cmd` with stdin closed and both output streams captured.
///
/// A non-zero exit is reported through [`CommandOutput::success`], not as an
/// error.
///
/// # Errors
/// Returns `UtilError::CommandExec` if the program cannot be started.
pub fn run_command(cmd: &mut Command) -> Result<CommandOutput, UtilError> {
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|source| UtilError::CommandExec {
            program: cmd.get_program().to_string_lossy().into_owned(),
            source,
        })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
        exit_code: output.status.code(),
    })
}

/// One-line rendering of a command for logs and `check` output.
///
/// Words with whitespace or quotes are single-quoted, POSIX style.
pub fn format_command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_word(word: &str) -> String {
    let plain = !word.is_empty()
        && !word
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '\'' | '"'));
    if plain {
        word.to_owned()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
