//! Live metrics line for an active session.

use crate::domain::{MetricsSnapshot, SessionSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct MetricsSpinner {
    bar: ProgressBar,
    name: String,
}

impl MetricsSpinner {
    pub fn new(name: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.magenta} {elapsed_precise} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        let spinner = Self {
            bar,
            name: name.to_string(),
        };
        spinner.update(&MetricsSnapshot::default());
        spinner
    }

    pub fn update(&self, metrics: &MetricsSnapshot) {
        self.bar.set_message(format_metrics(&self.name, metrics));
    }

    pub fn finish(self, summary: &SessionSummary) {
        self.bar.finish_with_message(format!(
            "✓ {} done: {} steps, {:.2} km, {:.0} kcal in {} min",
            summary.name,
            summary.steps,
            summary.distance_km,
            summary.calories_burned,
            summary.elapsed_minutes
        ));
    }

    /// Leaves the session running; clears the line.
    pub fn detach(self) {
        self.bar.finish_and_clear();
    }
}

fn format_metrics(name: &str, m: &MetricsSnapshot) -> String {
    format!(
        "{}  {} steps  {:.2} km  {:.0} kcal",
        name, m.steps, m.distance_km, m.calories_burned
    )
}
