use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use stepkit::{BoundStep, ProgressCallback};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a bold success line, used for run banners
pub fn success_bold(msg: &str) {
    println!("{}", msg.green().bold());
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

/// Skipped-steps summary line
pub fn skipped_message(count: usize) -> String {
    if count == 1 {
        "1 step was skipped because it was already run.".to_string()
    } else {
        format!("{count} steps were skipped because they were already run.")
    }
}

// ============================================================================
// Step Progress
// ============================================================================

/// Terminal progress for a setup run
///
/// Decorated output shows a spinner per step and indents step results.
/// Plain output prints one line per step, which keeps command output
/// readable with `--verbose` or `--no-roots`.
pub struct StepReporter {
    decorated: bool,
    spinner: Option<ProgressBar>,
}

impl StepReporter {
    pub fn new(decorated: bool) -> Self {
        Self {
            decorated,
            spinner: None,
        }
    }

    fn finish_spinner(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }

    fn prefix(&self) -> &'static str {
        if self.decorated { "  " } else { "" }
    }
}

impl ProgressCallback for StepReporter {
    fn on_step_start(&mut self, step: &BoundStep, total: usize) {
        if !self.decorated {
            step_line(step, total);
            return;
        }
        let label = format!("[{}/{}] {}", step.position, total, step.description());
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(label);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(pb);
    }

    fn on_step_skipped(&mut self, step: &BoundStep, total: usize) {
        log::info!(
            "Step {}/{} ({}) already run",
            step.position,
            total,
            step.step_type
        );
    }

    fn on_step_complete(&mut self, step: &BoundStep, total: usize) {
        self.finish_spinner();
        println!(
            "{}{} {} {}",
            self.prefix(),
            "✓".green(),
            format!("[{}/{}]", step.position, total).dimmed(),
            step.description()
        );
    }

    fn on_step_failed(&mut self, step: &BoundStep, total: usize, error: &str) {
        self.finish_spinner();
        eprintln!(
            "{}{} {} {}: {}",
            self.prefix(),
            "✗".red(),
            format!("[{}/{}]", step.position, total).dimmed(),
            step.description(),
            error.red()
        );
    }
}

fn step_line(step: &BoundStep, total: usize) {
    let elevated = if step.requires_elevation() {
        " (sudo)".dimmed().to_string()
    } else {
        String::new()
    };
    self::step(
        step.position,
        total,
        &format!("{}{elevated}", step.description()),
    );
}
