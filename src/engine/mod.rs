//! The orchestration engine.
//!
//! One [`Engine`] owns the store, the page adapter and the arbiter, and
//! exposes a single [`Engine::tick`]: read the authoritative state document,
//! run exactly one bounded unit of work for the current phase, write the
//! document back. The scheduler drives ticks on a fixed interval; tests call
//! `tick` synchronously with a fixed clock. A reentrancy guard silently
//! skips ticks that would overlap a step still in flight.

mod capture;
mod classifier;
mod scheduler;
mod scrape;
mod validate;
mod wage_edit;

pub use classifier::{DialogKind, classify, is_duplicate_message};
pub use scheduler::StepScheduler;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::arbiter::SurfaceArbiter;
use crate::model::{AutomationState, Phase};
use crate::page::PageAdapter;
use crate::store::StateStore;

/// Tunables the loops consult every tick. Built from the config file.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How long to wait for a response dialog after a submission.
    pub response_timeout: Duration,
    /// Bound on the no-progress counter before an item is forced failed.
    pub stuck_limit: u32,
    /// Full not-found passes per validation item before the phase halts.
    pub not_found_limit: u32,
    /// Search attempts per employer number during scraping before the
    /// number is set aside.
    pub search_attempt_limit: u32,
    /// Per-unit minimum value every sub-record must meet.
    pub wage_floor: f64,
    /// Toggle the post-after-submit preference when submitting validation.
    pub post_after_submit: bool,
    /// Categorical form selections for a new filing.
    pub medium: String,
    pub mode: String,
    pub sector: String,
    pub schedule: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            response_timeout: Duration::seconds(30),
            stuck_limit: 5,
            not_found_limit: 3,
            search_attempt_limit: 5,
            wage_floor: 79.35,
            post_after_submit: false,
            medium: "Electronic".into(),
            mode: "Online".into(),
            sector: "Standard".into(),
            schedule: "Monthly".into(),
        }
    }
}

/// Cooperative pause signal shared between the control surface and the
/// engine. Checked at the top of each tick and between form-field writes,
/// so a pause mid-form-fill halts further writes without submitting.
#[derive(Clone, Default)]
pub struct PauseFlag(Arc<AtomicBool>);

impl PauseFlag {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a tick did, for the drive loop and for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A step was already in flight; this tick was skipped.
    Skipped,
    /// This surface is not the elected worker; nothing was done.
    Inactive,
    Paused,
    LoginPending,
    /// No phase is active.
    Idle,
    /// An action went out; awaiting the remote application.
    Waiting,
    /// Queue or record state advanced.
    Worked,
    PhaseChanged(Phase),
    /// The engine halted for human intervention.
    Intervention,
}

pub struct Engine<S, P, A> {
    store: S,
    page: P,
    arbiter: A,
    settings: EngineSettings,
    worker_id: String,
    pause: PauseFlag,
    in_flight: bool,
}

impl<S: StateStore, P: PageAdapter, A: SurfaceArbiter> Engine<S, P, A> {
    pub fn new(store: S, page: P, arbiter: A, settings: EngineSettings, worker_id: String) -> Self {
        Self {
            store,
            page,
            arbiter,
            settings,
            worker_id,
            pause: PauseFlag::default(),
            in_flight: false,
        }
    }

    pub fn pause_flag(&self) -> PauseFlag {
        self.pause.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    /// Current persisted state, for observers.
    pub async fn snapshot(&self) -> Result<Option<AutomationState>> {
        Ok(self.store.load().await?)
    }

    /// Execute at most one bounded unit of work. Overlapping invocations
    /// are skipped, not queued.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome> {
        if self.in_flight {
            return Ok(TickOutcome::Skipped);
        }
        self.in_flight = true;
        let outcome = self.step(now).await;
        self.in_flight = false;
        outcome
    }

    async fn step(&mut self, now: DateTime<Utc>) -> Result<TickOutcome> {
        if !self.arbiter.is_active() {
            return Ok(TickOutcome::Inactive);
        }

        let Some(mut state) = self.store.load().await? else {
            return Ok(TickOutcome::Idle);
        };

        // Externally requested pause lands in the document before anything
        // else happens this tick.
        if self.pause.is_requested() && !state.is_paused {
            state.pause();
            self.store.save(&state).await?;
            return Ok(TickOutcome::Paused);
        }

        if self.page.login_interstitial() {
            if !state.login_pending {
                state.login_pending = true;
                self.store.save(&state).await?;
            }
            return Ok(TickOutcome::LoginPending);
        }
        if state.login_pending {
            state.login_pending = false;
            self.store.save(&state).await?;
        }

        if state.is_paused || state.intervention_required() {
            return Ok(TickOutcome::Paused);
        }

        if state.active_worker_id.as_deref() != Some(self.worker_id.as_str()) {
            if !self.arbiter.claim() {
                return Ok(TickOutcome::Inactive);
            }
            state.active_worker_id = Some(self.worker_id.clone());
        }

        let outcome = match state.phase {
            Phase::Idle | Phase::Complete => TickOutcome::Idle,
            Phase::Scraping => scrape::step(&mut self.page, &self.settings, &mut state, now)?,
            Phase::Capture => {
                capture::step(&mut self.page, &self.settings, &self.pause, &mut state, now)?
            }
            Phase::Validation => validate::step(&mut self.page, &self.settings, &mut state, now)?,
            Phase::WageEdit => wage_edit::step(&mut self.page, &self.settings, &mut state, now)?,
        };

        self.store.save(&state).await?;
        Ok(outcome)
    }
}
