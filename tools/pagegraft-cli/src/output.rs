//! Human and JSON output for the CLI.
//!
//! In JSON mode only [`Output::json`] and errors reach the terminal; every
//! other message is suppressed so stdout stays machine-readable.

use std::fmt::Display;

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} {msg} [{bar:32.cyan/blue}] {pos}/{len} steps";

/// Where a line goes.
#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Output handler for CLI messages.
#[derive(Clone)]
pub struct Output {
    verbose: bool,
    json: bool,
}

impl Output {
    pub fn new(verbose: bool, json: bool) -> Self {
        Self { verbose, json }
    }

    fn human(&self, stream: Stream, line: impl Display) {
        if self.json {
            return;
        }
        match stream {
            Stream::Stdout => println!("{line}"),
            Stream::Stderr => eprintln!("{line}"),
        }
    }

    /// Print a success message.
    pub fn success(&self, msg: &str) {
        self.human(Stream::Stdout, format!("{} {}", style("✓").green(), msg));
    }

    /// Print a warning to stderr.
    pub fn warn(&self, msg: &str) {
        self.human(Stream::Stderr, format!("{} {}", style("!").yellow().bold(), msg));
    }

    /// Print an error. Errors are reported in JSON mode too.
    pub fn error(&self, msg: &str) {
        if self.json {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        } else {
            eprintln!("{} {}", style("error:").red().bold(), msg);
        }
    }

    /// Print a message only with `--verbose`.
    pub fn debug(&self, msg: &str) {
        if self.verbose {
            self.human(Stream::Stderr, style(msg).dim());
        }
    }

    pub fn header(&self, msg: &str) {
        self.human(Stream::Stdout, format!("\n{}", style(msg).bold().underlined()));
    }

    /// Print a numbered step line.
    pub fn step(&self, num: usize, total: usize, msg: &str) {
        let counter = style(format!("{num:>width$}/{total}", width = total.to_string().len())).dim();
        self.human(Stream::Stdout, format!("{counter} {msg}"));
    }

    /// Print a value as pretty JSON, regardless of mode.
    pub fn json<T: serde::Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => self.error(&format!("failed to encode output: {e}")),
        }
    }

    /// Print an indented `key: value` line.
    pub fn kv(&self, key: &str, value: &str) {
        self.human(Stream::Stdout, format!("  {}: {}", style(key).cyan(), value));
    }

    /// A progress bar over `len` steps; hidden in JSON mode.
    pub fn progress(&self, len: u64, msg: &str) -> ProgressBar {
        if self.json {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(len).with_message(msg.to_string());
        if let Ok(bar_style) = ProgressStyle::with_template(BAR_TEMPLATE) {
            bar.set_style(bar_style.progress_chars("=> "));
        }
        bar
    }

    pub fn is_json(&self) -> bool {
        self.json
    }
}

/// Colored label for a replay step outcome.
pub fn outcome_badge(outcome: &str) -> String {
    let styled: StyledObject<&str> = match outcome {
        "current" | "ok" => style(outcome).green(),
        "superseded" => style(outcome).yellow(),
        "failed" => style(outcome).red().bold(),
        _ => style(outcome),
    };
    format!("[{styled}]")
}
