//! Startup stage output for the binaries.
//!
//! On a terminal each stage shows a spinner that resolves to a check mark (or a cross when
//! the stage reports a failure). Elsewhere stages are plain `==>` lines on stderr.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    /// Resolve `mode` against whether stderr is a terminal. `NO_COLOR` forces plain output
    /// in auto mode.
    pub fn new(mode: UiMode) -> Self {
        let is_tty = std::io::stderr().is_terminal();
        let no_color = std::env::var_os("NO_COLOR").is_some();
        Self::resolve(mode, is_tty, no_color)
    }

    fn resolve(mode: UiMode, is_tty: bool, no_color: bool) -> Self {
        let pretty = is_tty
            && match mode {
                UiMode::Pretty => true,
                UiMode::Auto => !no_color,
                UiMode::Plain => false,
            };
        Self { pretty }
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = if self.pretty {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            Some(spinner)
        } else {
            eprintln!("==> {}", name);
            None
        };
        StageGuard {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
            outcome: None,
        }
    }
}

/// Finishes its stage line when dropped.
pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    outcome: Option<Result<String, String>>,
}

impl StageGuard {
    /// Append a detail to the success line.
    pub fn done(mut self, detail: impl Into<String>) {
        self.outcome = Some(Ok(detail.into()));
    }

    /// Mark the stage as failed (degraded) with a reason.
    pub fn fail(mut self, reason: impl Into<String>) {
        self.outcome = Some(Err(reason.into()));
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = format_duration(self.start.elapsed());
        let message = match self.outcome.take() {
            Some(Err(reason)) => format!("✘ {} ({}): {}", self.name, elapsed, reason),
            Some(Ok(detail)) if !detail.is_empty() => {
                format!("✔ {} ({}): {}", self.name, elapsed, detail)
            }
            _ => format!("✔ {} ({})", self.name, elapsed),
        };
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
