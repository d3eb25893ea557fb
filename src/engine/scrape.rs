//! Scraping loop: one employer number per pass, search → extract → dequeue.

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::{EngineSettings, TickOutcome};
use crate::model::{AutomationState, EmployerRecord, Phase, is_employer_number};
use crate::page::{Control, PageAdapter};

pub fn step<P: PageAdapter>(
    page: &mut P,
    settings: &EngineSettings,
    state: &mut AutomationState,
    now: DateTime<Utc>,
) -> Result<TickOutcome> {
    let Some(number) = state.scrape.numbers.first().cloned() else {
        // Batch exhausted: back to IDLE, capture-ready.
        state.transition(Phase::Idle)?;
        return Ok(TickOutcome::PhaseChanged(Phase::Idle));
    };

    if !is_employer_number(&number) {
        set_aside(state, &number, "not a 9-digit employer number");
        return Ok(TickOutcome::Worked);
    }

    // Idempotence guard: a number already captured in this run is never
    // extracted twice.
    if state.record_by_number(&number).is_some() {
        dequeue_front(state);
        return Ok(TickOutcome::Worked);
    }

    if !page.results_show(&number) {
        if state.scrape.search_attempts >= settings.search_attempt_limit {
            set_aside(state, &number, "results never reflected the number");
            return Ok(TickOutcome::Worked);
        }
        state.scrape.search_attempts += 1;

        let (Some(field), Some(button)) = (
            page.find_control(Control::SearchField),
            page.find_control(Control::SearchButton),
        ) else {
            return Ok(TickOutcome::Waiting);
        };
        page.set_field(&field, &number)?;
        page.click(&button)?;
        // Extraction happens on a later tick, once results are visible.
        return Ok(TickOutcome::Waiting);
    }

    let name = page.result_employer_name().unwrap_or_default();
    let rows = page.observation_rows();
    let record = EmployerRecord::from_scrape(&number, &name, state.target_period, &rows, now)?;
    state.records.push(record);
    dequeue_front(state);
    Ok(TickOutcome::Worked)
}

fn dequeue_front(state: &mut AutomationState) {
    state.scrape.numbers.remove(0);
    state.scrape.search_attempts = 0;
}

fn set_aside(state: &mut AutomationState, number: &str, reason: &str) {
    state
        .scrape
        .set_aside
        .push((number.to_string(), reason.to_string()));
    dequeue_front(state);
}
