//! Fixed-interval tick driver.
//!
//! One scheduler drives one engine: tick, observe, sleep, repeat. Phase
//! intervals differ (scraping polls faster than the submission loops), and
//! the engine's own reentrancy guard keeps a slow step from overlapping the
//! next tick. The run ends when the engine reaches a resting state — IDLE,
//! COMPLETE, a pause, or an intervention — leaving the persisted document
//! ready for the next command.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use super::{Engine, TickOutcome};
use crate::arbiter::SurfaceArbiter;
use crate::model::{AutomationState, Phase};
use crate::page::PageAdapter;
use crate::store::StateStore;

pub struct StepScheduler {
    scrape_interval: Duration,
    step_interval: Duration,
}

impl Default for StepScheduler {
    fn default() -> Self {
        Self {
            scrape_interval: Duration::from_millis(2000),
            step_interval: Duration::from_millis(2500),
        }
    }
}

impl StepScheduler {
    pub fn new(scrape_interval: Duration, step_interval: Duration) -> Self {
        Self {
            scrape_interval,
            step_interval,
        }
    }

    /// Drive the engine until it rests. The observer sees the persisted
    /// state after every tick, for progress display.
    pub async fn run<S, P, A, F>(
        &self,
        engine: &mut Engine<S, P, A>,
        mut observe: F,
    ) -> Result<TickOutcome>
    where
        S: StateStore,
        P: PageAdapter,
        A: SurfaceArbiter,
        F: FnMut(&AutomationState, &TickOutcome),
    {
        loop {
            let outcome = engine.tick(Utc::now()).await?;

            let Some(state) = engine.snapshot().await? else {
                return Ok(outcome);
            };
            observe(&state, &outcome);

            match outcome {
                TickOutcome::Idle | TickOutcome::Paused | TickOutcome::Intervention => {
                    return Ok(outcome);
                }
                TickOutcome::PhaseChanged(Phase::Idle | Phase::Complete) => {
                    return Ok(outcome);
                }
                _ => {}
            }

            let interval = match state.phase {
                Phase::Scraping => self.scrape_interval,
                _ => self.step_interval,
            };
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::SoloArbiter;
    use crate::engine::EngineSettings;
    use crate::model::{ObservationKind, Period, ScrapedObservation};
    use crate::page::{Fixture, FixtureEmployer, PageKind, ScriptedPortal};
    use crate::store::MemoryStore;

    fn fast() -> StepScheduler {
        StepScheduler::new(Duration::from_millis(1), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn run_drives_scraping_to_completion() {
        let period: Period = "2025-07".parse().unwrap();
        let fixture = Fixture {
            employers: vec![FixtureEmployer {
                employer_number: "123456789".into(),
                name: "Acme Ltd".into(),
                observations: vec![ScrapedObservation {
                    period_label: "June 2025".into(),
                    kind: ObservationKind::Normal,
                    count: 4,
                    amount: 1600.0,
                    self_capture: false,
                }],
                on_review_list: true,
                review_after_search: false,
                import_labels: vec![],
                sub_records: vec![],
                sub_records_after_edit: None,
                capture_outcome: Default::default(),
                validate_outcome: Default::default(),
                edit_outcome: Default::default(),
            }],
        };

        let mut state = AutomationState::new(period);
        state.start_scraping(vec!["123456789".into()]).unwrap();

        let mut engine = Engine::new(
            MemoryStore::new(state),
            ScriptedPortal::new(fixture, PageKind::SearchResults),
            SoloArbiter,
            EngineSettings::default(),
            "worker-1".into(),
        );

        let mut observed = 0usize;
        let outcome = fast()
            .run(&mut engine, |_, _| observed += 1)
            .await
            .unwrap();

        assert_eq!(outcome, TickOutcome::PhaseChanged(Phase::Idle));
        assert!(observed >= 2);
        let state = engine.snapshot().await.unwrap().unwrap();
        assert_eq!(state.records.len(), 1);
        assert_eq!(state.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn run_rests_on_pause() {
        let period: Period = "2025-07".parse().unwrap();
        let mut state = AutomationState::new(period);
        state.start_scraping(vec!["123456789".into()]).unwrap();

        let mut engine = Engine::new(
            MemoryStore::new(state),
            ScriptedPortal::new(Fixture::default(), PageKind::SearchResults),
            SoloArbiter,
            EngineSettings::default(),
            "worker-1".into(),
        );
        engine.pause_flag().request();

        let outcome = fast().run(&mut engine, |_, _| {}).await.unwrap();
        assert_eq!(outcome, TickOutcome::Paused);
    }
}
