use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::period::Period;
use super::queue::{CaptureItem, ItemStatus, ValidationItem, WageEditItem, WorkQueue};
use super::record::EmployerRecord;
use crate::error::{PhaseTransitionError, QueueError};

/// The top-level phases of the filing workflow.
///
/// Transitions are one-directional except VALIDATION ⇄ WAGE_EDIT, which may
/// cycle until the edit queue drains. COMPLETE is re-enterable: a new phase
/// can be started from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Scraping,
    Capture,
    Validation,
    WageEdit,
    Complete,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Scraping => "SCRAPING",
            Phase::Capture => "CAPTURE",
            Phase::Validation => "VALIDATION",
            Phase::WageEdit => "WAGE_EDIT",
            Phase::Complete => "COMPLETE",
        }
    }

    /// The phase transition table. `stop()` resets to IDLE outside of it.
    pub fn allows(&self, to: Phase) -> bool {
        match (self, to) {
            (Phase::Idle | Phase::Complete, Phase::Scraping) => true,
            (Phase::Idle | Phase::Complete, Phase::Capture) => true,
            (Phase::Idle | Phase::Complete, Phase::Validation) => true,
            (Phase::Scraping, Phase::Idle) => true,
            (Phase::Capture, Phase::Complete) => true,
            (Phase::Validation, Phase::WageEdit) => true,
            (Phase::Validation, Phase::Complete) => true,
            (Phase::WageEdit, Phase::Validation) => true,
            _ => false,
        }
    }

    /// A phase a human may start a run from.
    pub fn accepts_start(&self) -> bool {
        matches!(self, Phase::Idle | Phase::Complete)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How the validation queue was seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationMode {
    /// This run's successfully captured records.
    CaptureSet,
    /// Every 9-digit identifier visible on the review list, ignoring capture
    /// history ("force" mode). Seeded on the first validation tick.
    FullList,
}

/// The scraping work list: raw employer numbers still to process, plus the
/// original batch size for progress display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeQueue {
    pub numbers: Vec<String>,
    pub original_count: usize,
    /// Search attempts for the number at the front of the queue.
    #[serde(default)]
    pub search_attempts: u32,
    /// Numbers set aside after the search bound, with the reason.
    #[serde(default)]
    pub set_aside: Vec<(String, String)>,
}

/// The single persisted state document. Everything the engine needs to
/// resume after a full process restart round-trips through the store as
/// this one value; no loop holds authoritative state in memory beyond one
/// tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationState {
    pub phase: Phase,
    pub target_period: Period,
    pub is_paused: bool,
    pub intervention: Option<String>,
    pub login_pending: bool,
    pub active_worker_id: Option<String>,
    pub records: Vec<EmployerRecord>,
    pub scrape: ScrapeQueue,
    pub capture: WorkQueue<CaptureItem>,
    pub validation: WorkQueue<ValidationItem>,
    pub validation_mode: ValidationMode,
    /// FullList seeding has run (it needs the review list on screen).
    pub validation_seeded: bool,
    pub wage_edit: WorkQueue<WageEditItem>,
}

impl AutomationState {
    pub fn new(target_period: Period) -> Self {
        Self {
            phase: Phase::Idle,
            target_period,
            is_paused: false,
            intervention: None,
            login_pending: false,
            active_worker_id: None,
            records: Vec::new(),
            scrape: ScrapeQueue::default(),
            capture: WorkQueue::default(),
            validation: WorkQueue::default(),
            validation_mode: ValidationMode::CaptureSet,
            validation_seeded: false,
            wage_edit: WorkQueue::default(),
        }
    }

    /// Move to another phase, enforcing the transition table. Loop code uses
    /// this for its internal handoffs (SCRAPING→IDLE, CAPTURE→COMPLETE,
    /// VALIDATION⇄WAGE_EDIT, VALIDATION→COMPLETE).
    pub fn transition(&mut self, to: Phase) -> Result<(), PhaseTransitionError> {
        if !self.phase.allows(to) {
            return Err(PhaseTransitionError {
                from: self.phase.name(),
                to: to.name(),
            });
        }
        self.phase = to;
        Ok(())
    }

    fn check_start(&self, to: Phase) -> Result<(), PhaseTransitionError> {
        if !self.phase.accepts_start() {
            return Err(PhaseTransitionError {
                from: self.phase.name(),
                to: to.name(),
            });
        }
        Ok(())
    }

    /// Begin the scraping phase over a batch of employer numbers.
    pub fn start_scraping(&mut self, numbers: Vec<String>) -> Result<(), PhaseTransitionError> {
        self.check_start(Phase::Scraping)?;
        self.scrape = ScrapeQueue {
            original_count: numbers.len(),
            numbers,
            search_attempts: 0,
            set_aside: Vec::new(),
        };
        self.intervention = None;
        self.phase = Phase::Scraping;
        Ok(())
    }

    /// Begin the capture phase. The queue is populated once, here, from the
    /// records that pass the eligibility filter.
    pub fn start_capture(&mut self, now: DateTime<Utc>) -> Result<(), PhaseTransitionError> {
        self.check_start(Phase::Capture)?;
        let items: Vec<CaptureItem> = self
            .records
            .iter()
            .filter(|r| r.capture_eligible())
            .map(|r| CaptureItem::new(r, now))
            .collect();
        self.capture = WorkQueue::new(items);
        self.intervention = None;
        self.phase = Phase::Capture;
        Ok(())
    }

    /// Begin the validation phase. CaptureSet mode seeds from this run's
    /// successfully captured items; FullList mode leaves the queue empty for
    /// the loop to seed from the review list on its first tick.
    pub fn start_validation(
        &mut self,
        mode: ValidationMode,
        now: DateTime<Utc>,
    ) -> Result<(), PhaseTransitionError> {
        self.check_start(Phase::Validation)?;
        let items = match mode {
            ValidationMode::CaptureSet => self
                .capture
                .items()
                .iter()
                .filter(|i| i.status.is_success())
                .map(|i| {
                    ValidationItem::from_number(&i.employer_number, Some(i.record_id.clone()), now)
                })
                .collect(),
            ValidationMode::FullList => Vec::new(),
        };
        self.validation = WorkQueue::new(items);
        self.validation_mode = mode;
        self.validation_seeded = mode == ValidationMode::CaptureSet;
        self.wage_edit = WorkQueue::default();
        self.intervention = None;
        self.phase = Phase::Validation;
        Ok(())
    }

    pub fn pause(&mut self) {
        self.is_paused = true;
    }

    /// Resume also clears any pending intervention — the human has looked.
    pub fn resume(&mut self) {
        self.is_paused = false;
        self.intervention = None;
    }

    /// Reset to IDLE and clear all work queues. Safe from any state,
    /// including mid-step: the next tick reads IDLE and no-ops. Scraped
    /// records survive; only queue progress is discarded.
    pub fn stop(&mut self) {
        self.phase = Phase::Idle;
        self.is_paused = false;
        self.intervention = None;
        self.login_pending = false;
        self.scrape = ScrapeQueue::default();
        self.capture = WorkQueue::default();
        self.validation = WorkQueue::default();
        self.validation_seeded = false;
        self.wage_edit = WorkQueue::default();
    }

    /// Halt ticking until a human resumes or skips.
    pub fn require_intervention(&mut self, message: impl Into<String>) {
        self.intervention = Some(message.into());
    }

    pub fn intervention_required(&self) -> bool {
        self.intervention.is_some()
    }

    /// Mark the current item of the active phase as skipped and move on;
    /// clears the intervention so ticking can continue. The explicit "skip"
    /// human action.
    pub fn skip_current(&mut self, now: DateTime<Utc>) -> Result<(), QueueError> {
        match self.phase {
            Phase::Scraping => {
                if self.scrape.numbers.is_empty() {
                    return Err(QueueError::Empty);
                }
                self.scrape.numbers.remove(0);
            }
            Phase::Capture => {
                self.capture
                    .set_current_status(ItemStatus::Skipped, Some("skipped by user".into()), now)?;
                self.capture.advance();
            }
            Phase::Validation => {
                self.validation
                    .set_current_status(ItemStatus::Skipped, Some("skipped by user".into()), now)?;
                self.validation.advance();
            }
            Phase::WageEdit => {
                self.wage_edit
                    .set_current_status(ItemStatus::Skipped, Some("skipped by user".into()), now)?;
                self.wage_edit.advance();
            }
            Phase::Idle | Phase::Complete => return Err(QueueError::Empty),
        }
        self.intervention = None;
        Ok(())
    }

    /// Find a record by its employer number.
    pub fn record_by_number(&self, employer_number: &str) -> Option<&EmployerRecord> {
        self.records
            .iter()
            .find(|r| r.employer_number == employer_number)
    }
}
