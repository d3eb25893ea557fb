//! Wage-edit loop: open each flagged record in its edit context, overwrite
//! the aggregate with the precomputed adjusted total, and hand the item
//! back to validation once the queue drains.

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::classifier::{DialogKind, classify};
use super::{EngineSettings, TickOutcome};
use crate::model::{AutomationState, ItemStatus, Phase, ValidationItem};
use crate::page::{Control, PageAdapter, PageKind};

pub fn step<P: PageAdapter>(
    page: &mut P,
    settings: &EngineSettings,
    state: &mut AutomationState,
    now: DateTime<Utc>,
) -> Result<TickOutcome> {
    if state.wage_edit.is_exhausted() {
        // Every originally-adjusted item re-enters the validation queue —
        // appended, never replacing what is already there.
        let handed_back: Vec<ValidationItem> = state
            .wage_edit
            .items()
            .iter()
            .map(|i| ValidationItem::from_number(&i.employer_number, None, now))
            .collect();
        for item in handed_back {
            state.validation.append(item);
        }
        state.transition(Phase::Validation)?;
        return Ok(TickOutcome::PhaseChanged(Phase::Validation));
    }
    if state.wage_edit.current().map(|i| i.status) == Some(ItemStatus::Pending) {
        state
            .wage_edit
            .set_current_status(ItemStatus::InProgress, None, now)?;
    }

    if let Some(dialog) = page.response_dialog() {
        return match classify(&dialog) {
            DialogKind::Consent => {
                page.accept_dialog()?;
                Ok(TickOutcome::Waiting)
            }
            DialogKind::Receipt | DialogKind::Success => {
                page.dismiss_dialog()?;
                state
                    .wage_edit
                    .set_current_status(ItemStatus::Done, Some("updated".into()), now)?;
                state.wage_edit.advance();
                Ok(TickOutcome::Worked)
            }
            DialogKind::KnownError(message) => {
                page.dismiss_dialog()?;
                state
                    .wage_edit
                    .set_current_status(ItemStatus::Failed, Some(message), now)?;
                state.wage_edit.advance();
                Ok(TickOutcome::Worked)
            }
            DialogKind::Unknown(message) => {
                state.require_intervention(format!("unrecognized response dialog: {message}"));
                Ok(TickOutcome::Intervention)
            }
        };
    }

    let item = state.wage_edit.current().expect("queue not exhausted");
    if let Some(submitted_at) = item.submitted_at {
        if now - submitted_at < settings.response_timeout {
            return Ok(TickOutcome::Waiting);
        }
        if !item.retried {
            let item = state.wage_edit.current_mut().expect("queue not exhausted");
            item.retried = true;
            item.submitted_at = None;
            return Ok(TickOutcome::Waiting);
        }
        state.wage_edit.set_current_status(
            ItemStatus::Failed,
            Some("no response after retry".into()),
            now,
        )?;
        state.wage_edit.advance();
        return Ok(TickOutcome::Worked);
    }

    let number = item.employer_number.clone();
    let adjusted = item.adjustment.adjusted_amount;
    match page.current_page() {
        Some(PageKind::ReviewList) => {
            if let Some(row) = page
                .review_rows()
                .into_iter()
                .find(|r| r.employer_number == number)
            {
                page.open_row(&row.handle)?;
                return Ok(TickOutcome::Waiting);
            }
            // Not visible: drive the search, bounded by the shared stuck
            // counter rather than a not-found counter.
            if let (Some(field), Some(button)) = (
                page.find_control(Control::SearchField),
                page.find_control(Control::SearchButton),
            ) {
                page.set_field(&field, &number)?;
                page.click(&button)?;
            }
            note_stuck(settings, state, now)
        }
        Some(PageKind::RecordEntry) => {
            if page.displayed_employer().as_deref() != Some(number.as_str()) {
                if let Some(back) = page.find_control(Control::BackButton) {
                    page.click(&back)?;
                }
                return note_stuck(settings, state, now);
            }

            let Some(amount_field) = page.find_control(Control::AggregateAmountField) else {
                return note_stuck(settings, state, now);
            };
            if !page.is_enabled(&amount_field) {
                return note_stuck(settings, state, now);
            }
            // Scoped focus→set→blur so the application registers the edit.
            page.focus(&amount_field)?;
            page.set_field(&amount_field, &format!("{adjusted:.2}"))?;
            page.blur(&amount_field)?;

            let Some(save) = page.find_control(Control::SaveButton) else {
                return note_stuck(settings, state, now);
            };
            if !page.is_enabled(&save) {
                return note_stuck(settings, state, now);
            }
            page.click(&save)?;

            let item = state.wage_edit.current_mut().expect("queue not exhausted");
            item.submitted_at = Some(now);
            Ok(TickOutcome::Waiting)
        }
        _ => note_stuck(settings, state, now),
    }
}

fn note_stuck(
    settings: &EngineSettings,
    state: &mut AutomationState,
    now: DateTime<Utc>,
) -> Result<TickOutcome> {
    let item = state.wage_edit.current_mut().expect("queue not exhausted");
    item.stuck += 1;
    if item.stuck >= settings.stuck_limit {
        state.wage_edit.set_current_status(
            ItemStatus::Failed,
            Some("page stuck, no progress".into()),
            now,
        )?;
        state.wage_edit.advance();
        return Ok(TickOutcome::Worked);
    }
    Ok(TickOutcome::Waiting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Period, SubRecordValue, WageEditItem, evaluate_wage_floor};
    use crate::page::{Fixture, FixtureEmployer, PageKind, ScriptedOutcome, ScriptedPortal};

    fn period() -> Period {
        "2025-07".parse().unwrap()
    }

    fn employer(number: &str, values: &[f64]) -> FixtureEmployer {
        FixtureEmployer {
            employer_number: number.into(),
            name: format!("Employer {number}"),
            observations: vec![],
            on_review_list: true,
            review_after_search: false,
            import_labels: vec![],
            sub_records: values
                .iter()
                .enumerate()
                .map(|(i, v)| SubRecordValue {
                    id: format!("e{i}"),
                    value: *v,
                })
                .collect(),
            sub_records_after_edit: None,
            capture_outcome: Default::default(),
            validate_outcome: Default::default(),
            edit_outcome: ScriptedOutcome::Success,
        }
    }

    fn wage_edit_state(employers: &[(&str, &[f64])]) -> AutomationState {
        let now = Utc::now();
        let mut state = AutomationState::new(period());
        state.phase = Phase::WageEdit;
        state.validation_seeded = true;
        for (number, values) in employers {
            let subs: Vec<SubRecordValue> = values
                .iter()
                .enumerate()
                .map(|(i, v)| SubRecordValue {
                    id: format!("e{i}"),
                    value: *v,
                })
                .collect();
            let adj = evaluate_wage_floor(number, &subs, 79.35).expect("values below floor");
            state.wage_edit.append(WageEditItem::new(adj, now));
        }
        state
    }

    fn run(
        portal: &mut ScriptedPortal,
        state: &mut AutomationState,
        settings: &EngineSettings,
        max_ticks: usize,
    ) {
        for _ in 0..max_ticks {
            if state.phase != Phase::WageEdit || state.intervention_required() {
                return;
            }
            step(portal, settings, state, Utc::now()).unwrap();
        }
        panic!("wage edit did not settle within {max_ticks} ticks");
    }

    #[test]
    fn successful_edit_saves_adjusted_aggregate() {
        let fixture = Fixture {
            employers: vec![employer("111111111", &[40.0, 100.0])],
        };
        let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
        let mut state = wage_edit_state(&[("111111111", &[40.0, 100.0])]);
        run(&mut portal, &mut state, &EngineSettings::default(), 20);

        assert_eq!(state.wage_edit.items()[0].status, ItemStatus::Done);
        assert_eq!(
            state.wage_edit.items()[0].message.as_deref(),
            Some("updated")
        );
        // 40 raised to 79.35, 100 kept: aggregate 179.35.
        assert!(portal.action_log.contains(&"save:111111111:179.35".into()));
    }

    #[test]
    fn exhausted_queue_hands_items_back_to_validation() {
        let fixture = Fixture {
            employers: vec![employer("111111111", &[40.0])],
        };
        let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
        let mut state = wage_edit_state(&[("111111111", &[40.0])]);
        // Pre-existing validation work must survive the hand-back.
        state
            .validation
            .append(ValidationItem::from_number("999999999", None, Utc::now()));

        run(&mut portal, &mut state, &EngineSettings::default(), 20);
        assert_eq!(state.phase, Phase::Validation);
        let numbers: Vec<_> = state
            .validation
            .items()
            .iter()
            .map(|i| i.employer_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["999999999", "111111111"]);
    }

    #[test]
    fn missing_record_exhausts_stuck_counter() {
        let mut e = employer("111111111", &[40.0]);
        e.on_review_list = false;
        let fixture = Fixture { employers: vec![e] };
        let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
        let mut state = wage_edit_state(&[("111111111", &[40.0])]);
        let settings = EngineSettings {
            stuck_limit: 3,
            ..EngineSettings::default()
        };

        for _ in 0..3 {
            step(&mut portal, &settings, &mut state, Utc::now()).unwrap();
        }
        assert_eq!(state.wage_edit.items()[0].status, ItemStatus::Failed);
        // The search action was still driven each pass.
        assert!(
            portal
                .action_log
                .iter()
                .filter(|a| a.starts_with("review-search"))
                .count()
                >= 1
        );
    }

    #[test]
    fn edit_error_fails_item() {
        let mut e = employer("111111111", &[40.0]);
        e.edit_outcome = ScriptedOutcome::KnownError {
            message: "Record is locked".into(),
        };
        let fixture = Fixture { employers: vec![e] };
        let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
        let mut state = wage_edit_state(&[("111111111", &[40.0])]);
        run(&mut portal, &mut state, &EngineSettings::default(), 20);

        // The failed item still hands back to validation on exhaustion.
        assert_eq!(state.phase, Phase::Validation);
        assert_eq!(state.wage_edit.items()[0].status, ItemStatus::Failed);
        assert_eq!(
            state.wage_edit.items()[0].message.as_deref(),
            Some("Record is locked")
        );
    }
}
