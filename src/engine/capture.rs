//! Capture loop: submit one new filing per eligible record through the
//! three-stage page flow, gated by dialog classification and the
//! single-retry timeout policy.

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::classifier::{DialogKind, classify, is_duplicate_message};
use super::{EngineSettings, PauseFlag, TickOutcome};
use crate::model::{AutomationState, ItemStatus, Phase};
use crate::page::{Control, PageAdapter, PageKind};

pub fn step<P: PageAdapter>(
    page: &mut P,
    settings: &EngineSettings,
    pause: &PauseFlag,
    state: &mut AutomationState,
    now: DateTime<Utc>,
) -> Result<TickOutcome> {
    if state.capture.is_exhausted() {
        state.transition(Phase::Complete)?;
        return Ok(TickOutcome::PhaseChanged(Phase::Complete));
    }
    if state.capture.current().map(|i| i.status) == Some(ItemStatus::Pending) {
        state
            .capture
            .set_current_status(ItemStatus::InProgress, None, now)?;
    }

    // The dialog gate runs before anything else: the remote application may
    // still be answering the previous action.
    if let Some(dialog) = page.response_dialog() {
        return match classify(&dialog) {
            DialogKind::Consent => {
                page.accept_dialog()?;
                Ok(TickOutcome::Waiting)
            }
            DialogKind::Receipt | DialogKind::Success => {
                page.dismiss_dialog()?;
                state
                    .capture
                    .set_current_status(ItemStatus::Done, Some("success".into()), now)?;
                advance(state)
            }
            DialogKind::KnownError(message) if is_duplicate_message(&message) => {
                page.dismiss_dialog()?;
                state
                    .capture
                    .set_current_status(ItemStatus::Duplicate, Some(message), now)?;
                advance(state)
            }
            DialogKind::KnownError(message) => {
                page.dismiss_dialog()?;
                state
                    .capture
                    .set_current_status(ItemStatus::Failed, Some(message), now)?;
                advance(state)
            }
            DialogKind::Unknown(message) => {
                state.require_intervention(format!("unrecognized response dialog: {message}"));
                Ok(TickOutcome::Intervention)
            }
        };
    }

    let item = state.capture.current().expect("queue not exhausted");
    if let Some(submitted_at) = item.submitted_at {
        if now - submitted_at < settings.response_timeout {
            return Ok(TickOutcome::Waiting);
        }
        if !item.retried {
            // First silent timeout: clear the outstanding mark so the flow
            // below re-drives the submission once.
            let item = state.capture.current_mut().expect("queue not exhausted");
            item.retried = true;
            item.submitted_at = None;
            return Ok(TickOutcome::Waiting);
        }
        state.capture.set_current_status(
            ItemStatus::Failed,
            Some("no response after retry".into()),
            now,
        )?;
        return advance(state);
    }

    let number = item.employer_number.clone();
    match page.current_page() {
        Some(PageKind::EmployerIdentification) => {
            let (Some(field), Some(proceed)) = (
                page.find_control(Control::EmployerNumberField),
                page.find_control(Control::ProceedButton),
            ) else {
                return note_stuck(settings, state, now);
            };
            if !page.is_enabled(&field) || !page.is_enabled(&proceed) {
                return note_stuck(settings, state, now);
            }
            page.set_field(&field, &number)?;
            page.click(&proceed)?;
            Ok(TickOutcome::Waiting)
        }
        Some(PageKind::FilingForm) => {
            if page.displayed_employer().as_deref() != Some(number.as_str()) {
                // Wrong record on screen: navigate back rather than filing
                // against it.
                if let Some(back) = page.find_control(Control::BackButton) {
                    page.click(&back)?;
                }
                return note_stuck(settings, state, now);
            }
            fill_and_submit(page, settings, pause, state, now)
        }
        _ => note_stuck(settings, state, now),
    }
}

/// Populate the filing form and submit it. The pause flag is honored
/// between field writes, so a pause lands before submission.
fn fill_and_submit<P: PageAdapter>(
    page: &mut P,
    settings: &EngineSettings,
    pause: &PauseFlag,
    state: &mut AutomationState,
    now: DateTime<Utc>,
) -> Result<TickOutcome> {
    let item = state.capture.current().expect("queue not exhausted");
    let Some((unit_count, amount)) = state
        .records
        .iter()
        .find(|r| r.id == item.record_id)
        .map(|r| (r.unit_count, r.amount))
    else {
        state.capture.set_current_status(
            ItemStatus::Failed,
            Some("record missing from state".into()),
            now,
        )?;
        return advance(state);
    };

    let fields = [
        (Control::PeriodField, state.target_period.token()),
        (Control::MediumSelect, settings.medium.clone()),
        (Control::ModeSelect, settings.mode.clone()),
        (Control::SectorSelect, settings.sector.clone()),
        (Control::ScheduleSelect, settings.schedule.clone()),
        (Control::UnitCountField, unit_count.to_string()),
        (Control::AmountField, format!("{amount:.2}")),
    ];
    for (control, value) in fields {
        if pause.is_requested() {
            return Ok(TickOutcome::Paused);
        }
        let Some(handle) = page.find_control(control) else {
            return note_stuck(settings, state, now);
        };
        if !page.is_enabled(&handle) {
            return note_stuck(settings, state, now);
        }
        page.set_field(&handle, &value)?;
    }

    if pause.is_requested() {
        return Ok(TickOutcome::Paused);
    }
    let Some(submit) = page.find_control(Control::SubmitButton) else {
        return note_stuck(settings, state, now);
    };
    if !page.is_enabled(&submit) {
        return note_stuck(settings, state, now);
    }
    page.click(&submit)?;

    let item = state.capture.current_mut().expect("queue not exhausted");
    item.submitted_at = Some(now);
    Ok(TickOutcome::Waiting)
}

fn advance(state: &mut AutomationState) -> Result<TickOutcome> {
    state.capture.advance();
    if state.capture.is_exhausted() {
        state.transition(Phase::Complete)?;
        Ok(TickOutcome::PhaseChanged(Phase::Complete))
    } else {
        Ok(TickOutcome::Worked)
    }
}

/// Bound the no-progress paths so the loop cannot hang on a page that never
/// reaches an expected state.
fn note_stuck(
    settings: &EngineSettings,
    state: &mut AutomationState,
    now: DateTime<Utc>,
) -> Result<TickOutcome> {
    let item = state.capture.current_mut().expect("queue not exhausted");
    item.stuck += 1;
    if item.stuck >= settings.stuck_limit {
        state.capture.set_current_status(
            ItemStatus::Failed,
            Some("page stuck, no progress".into()),
            now,
        )?;
        return advance(state);
    }
    Ok(TickOutcome::Waiting)
}
