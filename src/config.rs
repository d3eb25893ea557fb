//! Configuration loaded from `declabot.toml`.
//!
//! Every field has a default so a missing file still yields a usable
//! config. The `DECLABOT_PERIOD` environment variable takes precedence over
//! the file for the target period.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::engine::EngineSettings;
use crate::model::Period;

#[derive(Debug, Clone, Deserialize)]
pub struct DeclabotConfig {
    /// Calendar period the run files for, as a `YYYY-MM` token.
    #[serde(default)]
    pub target_period: String,

    /// Where the persisted state document lives.
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Scraping tick interval in milliseconds.
    #[serde(default = "default_scrape_tick_ms")]
    pub scrape_tick_ms: u64,

    /// Capture/validation/wage-edit tick interval in milliseconds.
    #[serde(default = "default_step_tick_ms")]
    pub step_tick_ms: u64,

    /// Seconds to wait for a response dialog before the retry policy kicks in.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    /// No-progress ticks before an item is forced failed.
    #[serde(default = "default_stuck_limit")]
    pub stuck_limit: u32,

    /// Full not-found passes per validation item before the phase halts.
    #[serde(default = "default_not_found_limit")]
    pub not_found_limit: u32,

    /// Search attempts per employer number during scraping.
    #[serde(default = "default_search_attempt_limit")]
    pub search_attempt_limit: u32,

    /// Per-unit minimum value every sub-record must meet.
    #[serde(default = "default_wage_floor")]
    pub wage_floor: f64,

    /// Toggle the post-after-submit preference when submitting validation.
    #[serde(default)]
    pub post_after_submit: bool,

    /// Categorical selections for the filing form.
    #[serde(default = "default_medium")]
    pub medium: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_sector")]
    pub sector: String,
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

fn default_state_path() -> String {
    "declabot-state.json".to_string()
}

fn default_scrape_tick_ms() -> u64 {
    2000
}

fn default_step_tick_ms() -> u64 {
    2500
}

fn default_response_timeout_secs() -> u64 {
    30
}

fn default_stuck_limit() -> u32 {
    5
}

fn default_not_found_limit() -> u32 {
    3
}

fn default_search_attempt_limit() -> u32 {
    5
}

fn default_wage_floor() -> f64 {
    79.35
}

fn default_medium() -> String {
    "Electronic".to_string()
}

fn default_mode() -> String {
    "Online".to_string()
}

fn default_sector() -> String {
    "Standard".to_string()
}

fn default_schedule() -> String {
    "Monthly".to_string()
}

impl Default for DeclabotConfig {
    fn default() -> Self {
        Self {
            target_period: String::new(),
            state_path: default_state_path(),
            scrape_tick_ms: default_scrape_tick_ms(),
            step_tick_ms: default_step_tick_ms(),
            response_timeout_secs: default_response_timeout_secs(),
            stuck_limit: default_stuck_limit(),
            not_found_limit: default_not_found_limit(),
            search_attempt_limit: default_search_attempt_limit(),
            wage_floor: default_wage_floor(),
            post_after_submit: false,
            medium: default_medium(),
            mode: default_mode(),
            sector: default_sector(),
            schedule: default_schedule(),
        }
    }
}

impl DeclabotConfig {
    /// Load configuration from the given path, falling back to defaults
    /// when the file does not exist. `DECLABOT_PERIOD` overrides the file.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<DeclabotConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(period) = std::env::var("DECLABOT_PERIOD")
            && !period.is_empty()
        {
            config.target_period = period;
        }

        Ok(config)
    }

    /// The configured target period. Errors when neither the file nor the
    /// environment provided one.
    pub fn target_period(&self) -> Result<Period> {
        if self.target_period.is_empty() {
            anyhow::bail!(
                "no target period configured; set target_period in declabot.toml or DECLABOT_PERIOD"
            );
        }
        self.target_period
            .parse()
            .with_context(|| format!("invalid target_period {:?}", self.target_period))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            response_timeout: chrono::Duration::seconds(self.response_timeout_secs as i64),
            stuck_limit: self.stuck_limit,
            not_found_limit: self.not_found_limit,
            search_attempt_limit: self.search_attempt_limit,
            wage_floor: self.wage_floor,
            post_after_submit: self.post_after_submit,
            medium: self.medium.clone(),
            mode: self.mode.clone(),
            sector: self.sector.clone(),
            schedule: self.schedule.clone(),
        }
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_millis(self.scrape_tick_ms)
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_tick_ms)
    }
}
