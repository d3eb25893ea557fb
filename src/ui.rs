//! Terminal output for the drive loop — spinner and styled result lines.
//!
//! Uses `indicatif` for the phase spinner and `console` for color. One
//! [`PhaseProgress`] accompanies one scheduler run.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::TickOutcome;
use crate::model::{AutomationState, ItemStatus, Phase};

pub struct PhaseProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl PhaseProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Refresh the spinner with the current phase and queue counts.
    pub fn update(&self, state: &AutomationState) {
        let message = match state.phase {
            Phase::Scraping => format!(
                "SCRAPING {}/{}",
                state.records.len(),
                state.scrape.original_count
            ),
            Phase::Capture => format!(
                "CAPTURE {}/{} ({} failed)",
                state.capture.count_success(),
                state.capture.len(),
                state.capture.count(ItemStatus::Failed)
            ),
            Phase::Validation => format!(
                "VALIDATION {}/{} ({} failed)",
                state.validation.count(ItemStatus::Done),
                state.validation.len(),
                state.validation.count(ItemStatus::Failed)
            ),
            Phase::WageEdit => format!(
                "WAGE_EDIT {}/{}",
                state.wage_edit.count(ItemStatus::Done),
                state.wage_edit.len()
            ),
            other => other.to_string(),
        };
        self.pb.set_message(message);
    }

    /// Stop the spinner and print how the run came to rest.
    pub fn finish(&self, state: &AutomationState, outcome: &TickOutcome) {
        self.pb.finish_and_clear();
        match outcome {
            TickOutcome::PhaseChanged(Phase::Complete) => {
                println!("  {} phase complete", self.green.apply_to("✓"));
            }
            TickOutcome::PhaseChanged(Phase::Idle) => {
                println!(
                    "  {} scraping finished: {} records, {} set aside",
                    self.green.apply_to("✓"),
                    state.records.len(),
                    state.scrape.set_aside.len()
                );
            }
            TickOutcome::Paused => {
                println!(
                    "  {} paused — `declabot resume` to continue",
                    self.yellow.apply_to("⏸")
                );
            }
            TickOutcome::Intervention => {
                let message = state.intervention.as_deref().unwrap_or("unknown");
                println!("  {} intervention required: {message}", self.red.apply_to("✗"));
                println!("    resolve on the portal, then `declabot resume` or `declabot skip`");
            }
            other => {
                println!("  {} stopped: {other:?}", self.yellow.apply_to("•"));
            }
        }
    }
}
