//! Running external tools for the stage wrappers.
//!
//! Stages build their invocations as argument vectors; the runner renders them
//! to a shell transcript (commands may carry redirections), logs it under the
//! stage name, and either runs each command through its own `sh -c` or, in
//! debug mode, stops after printing.

use crate::error::PipelineError;
use anyhow::{Context, Result};
use log::{debug, info};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Render a command list to the transcript that will be executed.
pub fn render_commands(cmds: &[Vec<String>]) -> String {
    cmds.iter()
        .map(|cmd| cmd.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Log and run a list of shell commands for a stage.
///
/// Each command runs as its own `sh -c` invocation and is checked
/// individually, so a failing early command stops the stage instead of being
/// masked by a later one. With `debug` the transcript is printed and nothing
/// is executed. With `logfile` the transcript and the commands' output are
/// appended to that file. A nonzero exit surfaces as
/// [`PipelineError::PipelineStep`], distinguishable from the
/// coordinate-mapping failures.
pub fn command_runner(
    cmds: &[Vec<String>],
    stage: &str,
    quiet: bool,
    logfile: Option<&Path>,
    debug: bool,
) -> Result<()> {
    let script = render_commands(cmds);
    if !quiet {
        info!("[--- {} ---] commands:\n{}", stage, script);
    }
    if debug {
        println!("{}", script);
        return Ok(());
    }

    let log = match logfile {
        Some(path) => {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open logfile: {}", path.display()))?;
            writeln!(file, "[--- {} ---] commands:\n{}", stage, script)?;
            Some(file)
        }
        None => None,
    };

    for line in cmds.iter().map(|cmd| cmd.join(" ")) {
        let mut command = Command::new("sh");
        command.arg("-c").arg(&line);
        match &log {
            Some(file) => {
                command.stdout(file.try_clone()?).stderr(file.try_clone()?);
            }
            None if quiet => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
            None => {}
        }
        let status = command
            .status()
            .with_context(|| format!("Failed to spawn shell for stage '{}'", stage))?;

        if !status.success() {
            return Err(PipelineError::PipelineStep {
                stage: stage.to_string(),
                status: status.code().unwrap_or(-1),
            }
            .into());
        }
    }
    Ok(())
}

/// Verify that an external program is available on PATH.
pub fn check_dependency(program: &str) -> Result<(), PipelineError> {
    let path = std::env::var_os("PATH")
        .ok_or_else(|| PipelineError::MissingDependency(program.to_string()))?;
    if find_on_path(program, &path) {
        Ok(())
    } else {
        Err(PipelineError::MissingDependency(program.to_string()))
    }
}

/// Scan a PATH-style value for an executable regular file named `program`.
fn find_on_path(program: &str, path: &std::ffi::OsStr) -> bool {
    std::env::split_paths(path).any(|dir| is_executable(&dir.join(program)))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Create a per-stage temporary working directory.
pub fn create_tempdir(stage: &str) -> Result<TempDir> {
    let tmp = tempfile::Builder::new()
        .prefix(&format!("tmp_{}_", stage))
        .tempdir()
        .context("Failed to create temporary directory")?;
    debug!("[--- {} ---] created tempdir {}", stage, tmp.path().display());
    Ok(tmp)
}

/// Keep or discard a stage tempdir once the stage finishes.
pub fn finish_tempdir(tmp: TempDir, stage: &str, keep: bool) -> Result<()> {
    if keep {
        let path: PathBuf = tmp.keep();
        info!("[--- {} ---] temporary files kept in {}", stage, path.display());
    } else {
        tmp.close().context("Failed to remove temporary directory")?;
    }
    Ok(())
}
