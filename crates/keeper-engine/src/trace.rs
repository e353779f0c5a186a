//! Running the analyzer over an app/test archive pair and writing the rules file.

use std::path::{Path, PathBuf};

use keeper_sdk::PlatformJars;
use keeper_tracer::{Launcher, Protocol, TracerCommand};

use crate::cache::{Fingerprint, FingerprintInputs};
use crate::error::EngineError;
use crate::layout::sibling_with_suffix;

/// Everything one analyzer run needs.
#[derive(Debug, Clone)]
pub struct InvocationSpec {
    pub app_archive: PathBuf,
    pub test_archive: PathBuf,
    pub platform: PlatformJars,
    pub protocol: Protocol,
    pub launcher: Launcher,
    pub rules_output: PathBuf,
    /// Also write `<rules>.args.txt` with the full command line.
    pub emit_debug_info: bool,
    pub force: bool,
}

/// A written rules file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesFile {
    pub path: PathBuf,
    /// `false` when an up-to-date file was reused.
    pub regenerated: bool,
}

fn fingerprint_inputs(spec: &InvocationSpec, command_line: &[String]) -> FingerprintInputs {
    FingerprintInputs::new()
        .file("app archive", &spec.app_archive)
        .file("test archive", &spec.test_archive)
        .files(
            "library",
            &spec
                .platform
                .library_jars()
                .into_iter()
                .map(Path::to_path_buf)
                .collect::<Vec<_>>(),
        )
        .value("command", command_line.join("\n"))
}

/// Run the analyzer and write the inferred keep rules to `spec.rules_output`.
///
/// Under `print-uses` the rules are the tool's stdout, which must not be
/// blank. Under `tracereferences` the tool writes the file itself; if it
/// writes nothing an empty file is created, since an empty rule set is a
/// valid outcome there.
///
/// # Errors
/// Returns `EngineError::MissingInput` if an archive is missing,
/// `EngineError::AnalyzerFailed` on a non-zero exit, `EngineError::EmptyRules`
/// when `print-uses` succeeds without output, and I/O errors otherwise.
pub fn infer_rules(spec: &InvocationSpec) -> Result<RulesFile, EngineError> {
    for (kind, path) in [
        ("app archive", &spec.app_archive),
        ("test archive", &spec.test_archive),
    ] {
        if !path.is_file() {
            return Err(EngineError::MissingInput {
                kind: kind.to_owned(),
                path: path.clone(),
            });
        }
    }

    let library: Vec<PathBuf> = spec
        .platform
        .library_jars()
        .into_iter()
        .map(Path::to_path_buf)
        .collect();
    let command = TracerCommand::new()
        .app_archive(&spec.app_archive)
        .test_archive(&spec.test_archive)
        .libraries(&library)
        .protocol(spec.protocol.clone())
        .rules_output(&spec.rules_output);
    let command_line = command.command_line(&spec.launcher)?;

    if spec.emit_debug_info {
        let mut args = command_line.join("\n");
        args.push('\n');
        keeper_util::fs::write_atomic(
            &sibling_with_suffix(&spec.rules_output, "args.txt"),
            args.as_bytes(),
        )?;
    }

    let fingerprint = Fingerprint::compute(&fingerprint_inputs(spec, &command_line))?;
    if !spec.force && fingerprint.is_up_to_date(&spec.rules_output) {
        tracing::info!(rules = %spec.rules_output.display(), "up to date");
        return Ok(RulesFile {
            path: spec.rules_output.clone(),
            regenerated: false,
        });
    }

    keeper_util::fs::ensure_parent(&spec.rules_output)?;
    crate::cache::invalidate(&spec.rules_output)?;
    keeper_util::fs::remove_file_if_exists(&spec.rules_output)?;

    tracing::info!(
        tool = spec.protocol.tool(),
        app = %spec.app_archive.display(),
        test = %spec.test_archive.display(),
        "tracing references"
    );
    let output = command.execute(&spec.launcher)?;
    if !output.success {
        return Err(EngineError::AnalyzerFailed {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    if !output.stderr.trim().is_empty() {
        tracing::debug!(stderr = %output.stderr.trim_end(), "analyzer diagnostics");
    }

    if spec.protocol.rules_on_stdout() {
        if output.stdout.trim().is_empty() {
            return Err(EngineError::EmptyRules {
                app_archive: spec.app_archive.clone(),
                test_archive: spec.test_archive.clone(),
            });
        }
        keeper_util::fs::write_atomic(&spec.rules_output, output.stdout.as_bytes())?;
    } else if !spec.rules_output.exists() {
        tracing::debug!(rules = %spec.rules_output.display(), "analyzer wrote no rules file");
        keeper_util::fs::write_atomic(&spec.rules_output, b"")?;
    }

    fingerprint.record(&spec.rules_output)?;
    Ok(RulesFile {
        path: spec.rules_output.clone(),
        regenerated: true,
    })
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let root = tmp.path().to_path_buf();
            fs::write(root.join("app.jar"), b"app").unwrap();
            fs::write(root.join("androidTest.jar"), b"test").unwrap();
            fs::write(root.join("android.jar"), b"platform").unwrap();
            Self { _tmp: tmp, root }
        }

        /// An analyzer that runs `script` with the tool arguments as `$@`.
        fn spec(&self, protocol: Protocol, script: &str) -> InvocationSpec {
            InvocationSpec {
                app_archive: self.root.join("app.jar"),
                test_archive: self.root.join("androidTest.jar"),
                platform: PlatformJars {
                    android_jar: self.root.join("android.jar"),
                    test_base_jar: None,
                },
                protocol,
                launcher: Launcher::Command {
                    program: "sh".to_owned(),
                    args: vec!["-c".to_owned(), script.to_owned(), "r8".to_owned()],
                },
                rules_output: self.root.join("out").join("inferredKeepRules.pro"),
                emit_debug_info: false,
                force: false,
            }
        }
    }

    fn print_uses() -> Protocol {
        Protocol::PrintUses {
            allow_obfuscation: false,
        }
    }

    fn trace_references() -> Protocol {
        Protocol::TraceReferences { extra_args: vec![] }
    }

    #[test]
    fn print_uses_stdout_becomes_rules() {
        let fx = Fixture::new();
        let spec = fx.spec(print_uses(), "echo '-keep class com.example.Api { void foo(); }'");
        let rules = infer_rules(&spec).unwrap();

        assert!(rules.regenerated);
        assert_eq!(
            fs::read_to_string(&rules.path).unwrap(),
            "-keep class com.example.Api { void foo(); }\n"
        );
    }

    #[test]
    fn print_uses_blank_output_is_empty_rules() {
        let fx = Fixture::new();
        let spec = fx.spec(print_uses(), "printf '\\n  \\n'");
        let err = infer_rules(&spec).unwrap_err();
        assert!(matches!(err, EngineError::EmptyRules { .. }));
        assert!(!spec.rules_output.exists());
    }

    #[test]
    fn non_zero_exit_is_analyzer_failure() {
        let fx = Fixture::new();
        let spec = fx.spec(print_uses(), "echo partial; echo 'Missing class' >&2; exit 2");
        match infer_rules(&spec).unwrap_err() {
            EngineError::AnalyzerFailed {
                exit_code,
                stdout,
                stderr,
            } => {
                assert_eq!(exit_code, Some(2));
                assert_eq!(stdout.trim(), "partial");
                assert_eq!(stderr.trim(), "Missing class");
            }
            other => unreachable!("unexpected error: {other}"),
        }
    }

    #[test]
    fn archives_passed_test_first() {
        let fx = Fixture::new();
        // $6 and $7 are the two archives after `print-uses --pg keeprules --lib <jar>`.
        let spec = fx.spec(print_uses(), "echo \"# $6\"; echo \"# $7\"");
        let rules = infer_rules(&spec).unwrap();
        let content = fs::read_to_string(rules.path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines.first().unwrap().ends_with("androidTest.jar"));
        assert!(lines.get(1).unwrap().ends_with("app.jar"));
    }

    #[test]
    fn trace_references_writes_its_own_file() {
        let fx = Fixture::new();
        // The output path follows `--proguard-keep-rules-output`, the 9th tool argument.
        let spec = fx.spec(trace_references(), "echo '-keep class A' > \"$9\"");
        let rules = infer_rules(&spec).unwrap();
        assert_eq!(fs::read_to_string(rules.path).unwrap(), "-keep class A\n");
    }

    #[test]
    fn trace_references_without_output_gets_empty_file() {
        let fx = Fixture::new();
        let spec = fx.spec(trace_references(), "exit 0");
        let rules = infer_rules(&spec).unwrap();
        assert_eq!(fs::read_to_string(rules.path).unwrap(), "");
    }

    #[test]
    fn unchanged_inputs_skip_the_analyzer() {
        let fx = Fixture::new();
        let counter = fx.root.join("runs");
        let script = format!("echo run >> '{}'; echo '-keep class A'", counter.display());
        let spec = fx.spec(print_uses(), &script);

        assert!(infer_rules(&spec).unwrap().regenerated);
        assert!(!infer_rules(&spec).unwrap().regenerated);
        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 1);

        fs::write(fx.root.join("app.jar"), b"app v2").unwrap();
        assert!(infer_rules(&spec).unwrap().regenerated);

        let forced = InvocationSpec {
            force: true,
            ..spec
        };
        assert!(infer_rules(&forced).unwrap().regenerated);
        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 3);
    }

    #[test]
    fn debug_info_writes_arguments() {
        let fx = Fixture::new();
        let spec = InvocationSpec {
            emit_debug_info: true,
            ..fx.spec(print_uses(), "echo '-keep class A'")
        };
        infer_rules(&spec).unwrap();

        let args =
            fs::read_to_string(fx.root.join("out").join("inferredKeepRules.pro.args.txt")).unwrap();
        let lines: Vec<&str> = args.lines().collect();
        assert_eq!(lines.first(), Some(&"sh"));
        assert!(lines.contains(&"print-uses"));
        assert!(lines.contains(&"--pg"));
    }

    #[test]
    fn enabling_debug_info_on_up_to_date_rules_writes_arguments() {
        let fx = Fixture::new();
        let spec = fx.spec(print_uses(), "echo '-keep class A'");
        assert!(infer_rules(&spec).unwrap().regenerated);

        let debug = InvocationSpec {
            emit_debug_info: true,
            ..spec
        };
        assert!(!infer_rules(&debug).unwrap().regenerated);

        let args =
            fs::read_to_string(fx.root.join("out").join("inferredKeepRules.pro.args.txt")).unwrap();
        assert!(args.lines().any(|line| line == "print-uses"), "args were: {args}");
    }

    #[test]
    fn missing_archive_fails_before_running() {
        let fx = Fixture::new();
        fs::remove_file(fx.root.join("androidTest.jar")).unwrap();
        let marker = fx.root.join("ran");
        let spec = fx.spec(print_uses(), &format!("touch '{}'", marker.display()));

        let err = infer_rules(&spec).unwrap_err();
        assert!(matches!(err, EngineError::MissingInput { .. }));
        assert!(!marker.exists());
    }
}
