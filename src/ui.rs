//! Terminal output sink for step-by-step progress.
//!
//! A single `Reporter` is selected once at startup: decorated (spinner per
//! step) when stdout is an interactive terminal, plain text otherwise, and
//! quiet for tests. Commands drive it through `begin`/`Step::done` and call
//! `summarize` before exiting.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use colored::Colorize;
use console::Term;
use indicatif::{ProgressBar, ProgressStyle};

/// Outcome of a single reported step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Ok,
    Skipped,
    Running,
    Failed,
}

impl StepStatus {
    fn word(self) -> &'static str {
        match self {
            StepStatus::Ok => "ok",
            StepStatus::Skipped => "skipped",
            StepStatus::Running => "running",
            StepStatus::Failed => "fail",
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            StepStatus::Ok => "✅",
            StepStatus::Skipped => "⏭️",
            StepStatus::Running => "🔄",
            StepStatus::Failed => "❌",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Decorated,
    Plain,
    Quiet,
}

struct StepRecord {
    label: String,
    status: StepStatus,
    elapsed: Duration,
}

/// Progress sink shared by all command executors.
///
/// The step log is append-only; `summarize` reads it back once at the end.
pub struct Reporter {
    mode: Mode,
    log: Mutex<Vec<StepRecord>>,
    notes: Mutex<Vec<String>>,
}

impl Reporter {
    /// Pick decorated or plain output based on terminal capabilities.
    pub fn auto() -> Self {
        let mode = if Term::stdout().features().is_attended() {
            Mode::Decorated
        } else {
            Mode::Plain
        };
        Self::with_mode(mode)
    }

    pub fn quiet() -> Self {
        Self::with_mode(Mode::Quiet)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            log: Mutex::new(Vec::new()),
            notes: Mutex::new(Vec::new()),
        }
    }

    /// Pass raw subprocess output through to the user. Used by the
    /// executors in verbose mode after a step succeeds; blank output is
    /// dropped.
    pub fn note(&self, text: &str) {
        let trimmed = text.trim_end();
        if trimmed.is_empty() {
            return;
        }
        self.notes
            .lock()
            .expect("note log poisoned")
            .push(trimmed.to_string());
        if self.mode != Mode::Quiet {
            println!("{trimmed}");
        }
    }

    /// Start a new step. The returned guard records `Failed` if dropped
    /// without an explicit status (i.e. on an error path).
    pub fn begin(&self, label: impl Into<String>) -> Step<'_> {
        let label = label.into();
        let bar = match self.mode {
            Mode::Decorated => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
                {
                    bar.set_style(style);
                }
                bar.set_message(label.clone());
                bar.enable_steady_tick(Duration::from_millis(100));
                Some(bar)
            }
            Mode::Plain | Mode::Quiet => None,
        };
        Step {
            reporter: self,
            label,
            started: Instant::now(),
            bar,
            finished: false,
        }
    }

    pub fn summarize(&self) {
        if self.mode == Mode::Quiet {
            return;
        }
        let log = self.log.lock().expect("step log poisoned");
        if log.is_empty() {
            return;
        }
        let failed = log.iter().filter(|r| r.status == StepStatus::Failed).count();
        let total: Duration = log.iter().map(|r| r.elapsed).sum();
        let line = format!(
            "{} step(s), {} failed, {:.1}s total",
            log.len(),
            failed,
            total.as_secs_f64()
        );
        match self.mode {
            Mode::Decorated if failed == 0 => println!("{}", line.dimmed()),
            Mode::Decorated => println!("{}", line.bright_red()),
            _ => println!("{line}"),
        }
    }

    fn record(&self, label: &str, status: StepStatus, elapsed: Duration) {
        self.log.lock().expect("step log poisoned").push(StepRecord {
            label: label.to_string(),
            status,
            elapsed,
        });
    }

    #[cfg(test)]
    pub(crate) fn notes(&self) -> Vec<String> {
        self.notes.lock().expect("note log poisoned").clone()
    }

    #[cfg(test)]
    pub(crate) fn statuses(&self) -> Vec<(String, StepStatus)> {
        self.log
            .lock()
            .expect("step log poisoned")
            .iter()
            .map(|r| (r.label.clone(), r.status))
            .collect()
    }
}

/// Guard for one in-flight step.
pub struct Step<'a> {
    reporter: &'a Reporter,
    label: String,
    started: Instant,
    bar: Option<ProgressBar>,
    finished: bool,
}

impl Step<'_> {
    pub fn done(mut self, status: StepStatus) {
        self.finish(status);
    }

    fn finish(&mut self, status: StepStatus) {
        if self.finished {
            return;
        }
        self.finished = true;
        let elapsed = self.started.elapsed();
        self.reporter.record(&self.label, status, elapsed);

        match self.reporter.mode {
            Mode::Decorated => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_with_message(format!("{} {}", status.symbol(), self.label));
                }
            }
            Mode::Plain => {
                let line = format!("- {} ... {}", self.label, status.word());
                if status == StepStatus::Failed {
                    eprintln!("{line}");
                } else {
                    println!("{line}");
                }
            }
            Mode::Quiet => {}
        }
    }
}

impl Drop for Step<'_> {
    fn drop(&mut self) {
        // A step abandoned mid-flight means its operation errored out.
        self.finish(StepStatus::Failed);
    }
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{}", format!("❌ {}", message).bright_red().bold());
}

pub fn print_info(message: &str) {
    println!("{}", format!("ℹ️  {}", message).bright_cyan());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {}", message).bright_yellow());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_log_appends_in_order() {
        let reporter = Reporter::quiet();
        reporter.begin("first").done(StepStatus::Ok);
        reporter.begin("second").done(StepStatus::Skipped);

        let log = reporter.statuses();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], ("first".to_string(), StepStatus::Ok));
        assert_eq!(log[1], ("second".to_string(), StepStatus::Skipped));
    }

    #[test]
    fn test_dropped_step_records_failure() {
        let reporter = Reporter::quiet();
        {
            let _step = reporter.begin("doomed");
            // dropped without done()
        }
        let log = reporter.statuses();
        assert_eq!(log[0].1, StepStatus::Failed);
    }

    #[test]
    fn test_note_drops_blank_output() {
        let reporter = Reporter::quiet();
        reporter.note("applied\n");
        reporter.note("   \n");
        reporter.note("");
        assert_eq!(reporter.notes(), vec!["applied"]);
    }

    #[test]
    fn test_explicit_status_wins_over_drop() {
        let reporter = Reporter::quiet();
        reporter.begin("tunnel").done(StepStatus::Running);
        assert_eq!(reporter.statuses()[0].1, StepStatus::Running);
    }
}
