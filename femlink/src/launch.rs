//! Solver process invocation
//!
//! The exchange protocol is transport-level; something still has to start
//! the solver. The launcher runs a solver script to completion and reports
//! the outcome without interpreting it: a non-zero exit is a solver result,
//! not a transport failure, and the caller decides what to do with it.

use crate::error::{ExchangeError, ExchangeResult};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Result of one solver run
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    /// Whether the solver exited with status zero
    pub success: bool,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Exit code, if the process exited normally
    pub exit_status: Option<i32>,
}

/// Maps host-side paths into what the solver command line expects
///
/// Exchange names and spool paths are derived host-side; a solver running
/// in a different filesystem view (a container, a remote mount) may need
/// them rewritten before they appear on its command line.
pub trait PathTranslator {
    /// Translate a host path for the solver's view of the filesystem
    fn translate(&self, path: &Path) -> PathBuf;
}

/// Translator for solvers sharing the host filesystem
pub struct IdentityPaths;

impl PathTranslator for IdentityPaths {
    fn translate(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// Runs a solver script and reports its outcome
pub trait SolverLauncher {
    /// Run `script` to completion
    ///
    /// Returns an error only when the process cannot be started at all.
    /// A started solver that fails is a `LaunchOutcome` with
    /// `success == false`.
    fn run_script(&self, script: &Path) -> ExchangeResult<LaunchOutcome>;
}

/// Launcher invoking a solver executable with the script as its argument
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandLauncher {
    /// New launcher for `program`, e.g. the solver interpreter binary
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Extra arguments placed before the script path
    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Working directory for the solver process
    pub fn with_working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }
}

impl SolverLauncher for CommandLauncher {
    fn run_script(&self, script: &Path) -> ExchangeResult<LaunchOutcome> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(script);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        debug!(program = %self.program, script = %script.display(), "launching solver");

        let output = command.output().map_err(|e| ExchangeError::TransportUnavailable {
            reason: format!("solver '{}' could not be started: {}", self.program, e),
        })?;

        let outcome = LaunchOutcome {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_status: output.status.code(),
        };
        if outcome.success {
            info!(script = %script.display(), "solver run complete");
        } else {
            warn!(
                script = %script.display(),
                status = ?outcome.exit_status,
                "solver run failed"
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_run_captures_stdout() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("ok.sh");
        std::fs::write(&script, "echo solver output\n").unwrap();

        let launcher = CommandLauncher::new("sh");
        let outcome = launcher.run_script(&script).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_status, Some(0));
        assert_eq!(outcome.stdout.trim(), "solver output");
    }

    #[test]
    fn failing_solver_is_an_outcome_not_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fail.sh");
        std::fs::write(&script, "echo broken >&2\nexit 3\n").unwrap();

        let launcher = CommandLauncher::new("sh");
        let outcome = launcher.run_script(&script).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_status, Some(3));
        assert!(outcome.stderr.contains("broken"));
    }

    #[test]
    fn unstartable_program_is_an_error() {
        let launcher = CommandLauncher::new("/nonexistent/solver-binary");
        let result = launcher.run_script(Path::new("anything.edp"));
        assert!(matches!(
            result,
            Err(ExchangeError::TransportUnavailable { .. })
        ));
    }

    #[test]
    fn identity_paths_pass_through() {
        let translator = IdentityPaths;
        let path = Path::new("/tmp/run/field.dat");
        assert_eq!(translator.translate(path), path);
    }
}
