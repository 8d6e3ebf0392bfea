//! Process-execution port
//!
//! Every component that shells out to `kubectl`, `docker`, or `talosctl`
//! goes through the `ProcessRunner` trait: production binds it to
//! `tokio::process::Command`, tests bind it to a scripted stub so executor
//! behavior can be observed without spawning anything.

use std::io;

use crate::error::CommandError;

/// Captured result of one external process invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Stderr if non-empty, otherwise stdout. What gets surfaced in errors.
    pub fn detail(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// One method: run argv, return exit code plus captured stdout/stderr.
pub trait ProcessRunner {
    fn run(&self, argv: &[String]) -> impl std::future::Future<Output = io::Result<RunOutput>>;
}

/// Production runner backed by real process spawning.
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    async fn run(&self, argv: &[String]) -> io::Result<RunOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argv"))?;

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await?;

        Ok(RunOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Render an argv the way it is echoed to the user and recorded in the
/// command log.
pub fn render_command(argv: &[String]) -> String {
    argv.join(" ")
}

/// Verify that the given executables are reachable on PATH before a
/// non-dry-run command starts executing.
pub fn require_tools(tools: &[&str], action: &str) -> Result<(), CommandError> {
    let missing: Vec<&str> = tools
        .iter()
        .copied()
        .filter(|tool| which::which(tool).is_err())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CommandError::MissingTools {
            action: action.to_string(),
            missing: missing.join(", "),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    type OutcomeFn = Box<dyn Fn(&[String]) -> RunOutput + Send + Sync>;

    /// Scripted stand-in for `SystemRunner`. Records every argv it is
    /// handed and answers with a caller-provided outcome.
    pub(crate) struct ScriptedRunner {
        pub calls: Mutex<Vec<Vec<String>>>,
        outcome: OutcomeFn,
    }

    impl ScriptedRunner {
        pub fn succeeding() -> Self {
            Self::with(|_| RunOutput {
                code: 0,
                stdout: "done".to_string(),
                stderr: String::new(),
            })
        }

        pub fn failing(code: i32, stderr: &str) -> Self {
            let stderr = stderr.to_string();
            Self::with(move |_| RunOutput {
                code,
                stdout: String::new(),
                stderr: stderr.clone(),
            })
        }

        pub fn with(outcome: impl Fn(&[String]) -> RunOutput + Send + Sync + 'static) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome: Box::new(outcome),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn rendered_calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|argv| render_command(argv))
                .collect()
        }
    }

    impl ProcessRunner for ScriptedRunner {
        async fn run(&self, argv: &[String]) -> io::Result<RunOutput> {
            self.calls.lock().unwrap().push(argv.to_vec());
            Ok((self.outcome)(argv))
        }
    }
}
