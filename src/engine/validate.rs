//! Validation loop: open each captured record on the review list, import
//! the preceding period's data, check the wage floor, and submit for
//! validation — routing floor violations to the wage-edit phase.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::classifier::{DialogKind, classify};
use super::{EngineSettings, TickOutcome};
use crate::model::{
    AutomationState, ItemStatus, Phase, ValidationItem, WageEditItem, evaluate_wage_floor,
    is_employer_number,
};
use crate::page::{Control, PageAdapter, PageKind};
use crate::textmatch;

pub fn step<P: PageAdapter>(
    page: &mut P,
    settings: &EngineSettings,
    state: &mut AutomationState,
    now: DateTime<Utc>,
) -> Result<TickOutcome> {
    if !state.validation_seeded {
        return seed_from_review_list(page, state, now);
    }

    if state.validation.is_exhausted() {
        state.transition(Phase::Complete)?;
        return Ok(TickOutcome::PhaseChanged(Phase::Complete));
    }
    if state.validation.current().map(|i| i.status) == Some(ItemStatus::Pending) {
        state
            .validation
            .set_current_status(ItemStatus::InProgress, None, now)?;
    }

    if let Some(dialog) = page.response_dialog() {
        return match classify(&dialog) {
            // A confirmation prompt, not an outcome: accept it and let the
            // next tick read what follows.
            DialogKind::Consent => {
                page.accept_dialog()?;
                Ok(TickOutcome::Waiting)
            }
            DialogKind::Receipt | DialogKind::Success => {
                page.dismiss_dialog()?;
                state
                    .validation
                    .set_current_status(ItemStatus::Done, Some("validated".into()), now)?;
                advance(state)
            }
            DialogKind::KnownError(message) => {
                page.dismiss_dialog()?;
                state
                    .validation
                    .set_current_status(ItemStatus::Failed, Some(message), now)?;
                advance(state)
            }
            DialogKind::Unknown(message) => {
                state.require_intervention(format!("unrecognized response dialog: {message}"));
                Ok(TickOutcome::Intervention)
            }
        };
    }

    let item = state.validation.current().expect("queue not exhausted");
    if let Some(submitted_at) = item.submitted_at {
        if now - submitted_at < settings.response_timeout {
            return Ok(TickOutcome::Waiting);
        }
        if !item.retried {
            let item = state.validation.current_mut().expect("queue not exhausted");
            item.retried = true;
            item.submitted_at = None;
            return Ok(TickOutcome::Waiting);
        }
        state.validation.set_current_status(
            ItemStatus::Failed,
            Some("no response after retry".into()),
            now,
        )?;
        return advance(state);
    }

    let number = item.employer_number.clone();
    match page.current_page() {
        Some(PageKind::ReviewList) => review_list_step(page, settings, state, &number, now),
        Some(PageKind::RecordEntry) => entry_step(page, settings, state, &number, now),
        _ => Ok(TickOutcome::Waiting),
    }
}

/// Force mode: build the queue from every 9-digit identifier visible on the
/// review list, ignoring this run's capture history.
fn seed_from_review_list<P: PageAdapter>(
    page: &mut P,
    state: &mut AutomationState,
    now: DateTime<Utc>,
) -> Result<TickOutcome> {
    if page.current_page() != Some(PageKind::ReviewList) {
        return Ok(TickOutcome::Waiting);
    }

    let mut seen = HashSet::new();
    for row in page.review_rows() {
        if is_employer_number(&row.employer_number) && seen.insert(row.employer_number.clone()) {
            state
                .validation
                .append(ValidationItem::from_number(&row.employer_number, None, now));
        }
    }
    state.validation_seeded = true;

    if state.validation.is_empty() {
        state.transition(Phase::Complete)?;
        return Ok(TickOutcome::PhaseChanged(Phase::Complete));
    }
    Ok(TickOutcome::Worked)
}

fn review_list_step<P: PageAdapter>(
    page: &mut P,
    settings: &EngineSettings,
    state: &mut AutomationState,
    number: &str,
    now: DateTime<Utc>,
) -> Result<TickOutcome> {
    // Exact-match scan of the visible rows.
    if let Some(row) = page
        .review_rows()
        .into_iter()
        .find(|r| r.employer_number == number)
    {
        page.open_row(&row.handle)?;
        return Ok(TickOutcome::Waiting);
    }

    let item = state.validation.current_mut().expect("queue not exhausted");
    if !item.search_attempted {
        item.search_attempted = true;
        let (Some(field), Some(button)) = (
            page.find_control(Control::SearchField),
            page.find_control(Control::SearchButton),
        ) else {
            return Ok(TickOutcome::Waiting);
        };
        page.set_field(&field, number)?;
        page.click(&button)?;
        return Ok(TickOutcome::Waiting);
    }

    // Searched and still absent: cycle the item to the back and try the
    // rest of the queue first.
    item.not_found_count += 1;
    item.search_attempted = false;
    state.validation.requeue_current_to_back(now)?;

    let all_exhausted = {
        let open = state.validation.remaining();
        !open.is_empty()
            && open
                .iter()
                .all(|i| i.not_found_count >= settings.not_found_limit)
    };
    if all_exhausted {
        state.require_intervention(
            "no remaining record can be found on the review list; check the list filters",
        );
        return Ok(TickOutcome::Intervention);
    }
    Ok(TickOutcome::Waiting)
}

fn entry_step<P: PageAdapter>(
    page: &mut P,
    settings: &EngineSettings,
    state: &mut AutomationState,
    number: &str,
    now: DateTime<Utc>,
) -> Result<TickOutcome> {
    if page.displayed_employer().as_deref() != Some(number) {
        // Wrong entry opened: back to the list and rescan.
        if let Some(back) = page.find_control(Control::BackButton) {
            page.click(&back)?;
        }
        return Ok(TickOutcome::Waiting);
    }

    if let Some(rows) = page.import_rows() {
        let wanted = state.target_period.prev();
        let Some(row) = rows
            .iter()
            .find(|r| textmatch::matches_period(&r.label, &wanted))
        else {
            state.require_intervention(format!(
                "no import row matches period {wanted} for employer {number}"
            ));
            return Ok(TickOutcome::Intervention);
        };
        page.open_row(&row.handle)?;
        let Some(confirm) = page.find_control(Control::ImportConfirmButton) else {
            return Ok(TickOutcome::Waiting);
        };
        page.click(&confirm)?;
        return Ok(TickOutcome::Waiting);
    }

    // Import done (or not offered): check the wage floor over the imported
    // sub-records.
    let subs = page.sub_record_rows();
    if let Some(adjustment) = evaluate_wage_floor(number, &subs, settings.wage_floor) {
        state.wage_edit.append(WageEditItem::new(adjustment, now));
        state.validation.remove_current();
        if let Some(back) = page.find_control(Control::BackButton) {
            page.click(&back)?;
        }
        state.transition(Phase::WageEdit)?;
        return Ok(TickOutcome::PhaseChanged(Phase::WageEdit));
    }

    if settings.post_after_submit {
        if let Some(toggle) = page.find_control(Control::PostToggle) {
            page.click(&toggle)?;
        }
    }
    let Some(validate) = page.find_control(Control::ValidateButton) else {
        // Structural mismatch: this entry offers no submission; back off
        // and rescan the list.
        if let Some(back) = page.find_control(Control::BackButton) {
            page.click(&back)?;
        }
        return Ok(TickOutcome::Waiting);
    };
    page.click(&validate)?;

    let item = state.validation.current_mut().expect("queue not exhausted");
    item.submitted_at = Some(now);
    Ok(TickOutcome::Waiting)
}

fn advance(state: &mut AutomationState) -> Result<TickOutcome> {
    state.validation.advance();
    if state.validation.is_exhausted() {
        state.transition(Phase::Complete)?;
        Ok(TickOutcome::PhaseChanged(Phase::Complete))
    } else {
        Ok(TickOutcome::Worked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Period, SubRecordValue, ValidationMode};
    use crate::page::{Fixture, FixtureEmployer, PageKind, ScriptedOutcome, ScriptedPortal};

    fn period() -> Period {
        "2025-07".parse().unwrap()
    }

    fn employer(number: &str) -> FixtureEmployer {
        FixtureEmployer {
            employer_number: number.into(),
            name: format!("Employer {number}"),
            observations: vec![],
            on_review_list: true,
            review_after_search: false,
            import_labels: vec!["June 2025".into()],
            sub_records: vec![
                SubRecordValue {
                    id: "e1".into(),
                    value: 100.0,
                },
                SubRecordValue {
                    id: "e2".into(),
                    value: 90.0,
                },
            ],
            sub_records_after_edit: None,
            capture_outcome: Default::default(),
            validate_outcome: ScriptedOutcome::ConsentThen {
                then: Box::new(ScriptedOutcome::Success),
            },
            edit_outcome: Default::default(),
        }
    }

    fn validation_state(numbers: &[&str]) -> AutomationState {
        let now = Utc::now();
        let mut state = AutomationState::new(period());
        state.phase = Phase::Validation;
        state.validation_mode = ValidationMode::CaptureSet;
        state.validation_seeded = true;
        for n in numbers {
            state
                .validation
                .append(ValidationItem::from_number(n, None, now));
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
            if state.phase != Phase::Validation || state.intervention_required() {
                return;
            }
            step(portal, settings, state, Utc::now()).unwrap();
        }
        panic!("validation did not settle within {max_ticks} ticks");
    }

    #[test]
    fn full_flow_import_consent_validate() {
        let fixture = Fixture {
            employers: vec![employer("111111111")],
        };
        let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
        let mut state = validation_state(&["111111111"]);
        run(&mut portal, &mut state, &EngineSettings::default(), 20);

        assert_eq!(state.phase, Phase::Complete);
        assert_eq!(state.validation.items()[0].status, ItemStatus::Done);
        assert!(portal.action_log.contains(&"open-entry:111111111".into()));
        assert!(portal.action_log.contains(&"import-confirm".into()));
        assert!(portal.action_log.contains(&"validate:111111111".into()));
        assert!(portal.action_log.contains(&"consent-accept".into()));
    }

    #[test]
    fn wage_floor_violation_routes_to_wage_edit() {
        let mut e = employer("111111111");
        e.sub_records = vec![
            SubRecordValue {
                id: "e1".into(),
                value: 40.0,
            },
            SubRecordValue {
                id: "e2".into(),
                value: 100.0,
            },
        ];
        let fixture = Fixture { employers: vec![e] };
        let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
        let mut state = validation_state(&["111111111"]);
        run(&mut portal, &mut state, &EngineSettings::default(), 20);

        assert_eq!(state.phase, Phase::WageEdit);
        // The validation item moved out of its queue into the edit queue.
        assert!(state.validation.is_empty());
        assert_eq!(state.wage_edit.len(), 1);
        let item = &state.wage_edit.items()[0];
        assert_eq!(item.employer_number, "111111111");
        assert!((item.adjustment.adjusted_amount - (79.35 + 100.0)).abs() < 1e-9);
        assert!((item.adjustment.affected[0].shortfall - 39.35).abs() < 1e-9);
        assert!(portal.action_log.contains(&"back".into()));
    }

    #[test]
    fn missing_record_searches_once_then_cycles() {
        let mut e = employer("111111111");
        e.on_review_list = false;
        e.review_after_search = true;
        let fixture = Fixture { employers: vec![e] };
        let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
        let mut state = validation_state(&["111111111"]);
        let settings = EngineSettings::default();
        let now = Utc::now();

        // Not visible: the one search action for this pass goes out.
        step(&mut portal, &settings, &mut state, now).unwrap();
        assert!(state.validation.items()[0].search_attempted);
        assert!(
            portal
                .action_log
                .contains(&"review-search:111111111".into())
        );

        // Now visible thanks to the search.
        step(&mut portal, &settings, &mut state, now).unwrap();
        assert!(portal.action_log.contains(&"open-entry:111111111".into()));
    }

    #[test]
    fn unfindable_records_raise_intervention_after_bound() {
        let mut e = employer("111111111");
        e.on_review_list = false;
        let fixture = Fixture { employers: vec![e] };
        let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
        let mut state = validation_state(&["111111111"]);
        let settings = EngineSettings {
            not_found_limit: 3,
            ..EngineSettings::default()
        };
        run(&mut portal, &mut state, &settings, 30);

        assert!(state.intervention_required());
        assert_eq!(state.validation.items()[0].not_found_count, 3);
    }

    #[test]
    fn unmatched_import_rows_raise_intervention() {
        let mut e = employer("111111111");
        e.import_labels = vec!["March 2019".into(), "April 2019".into()];
        let fixture = Fixture { employers: vec![e] };
        let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
        let mut state = validation_state(&["111111111"]);
        run(&mut portal, &mut state, &EngineSettings::default(), 20);

        assert!(state.intervention_required());
        let message = state.intervention.clone().unwrap();
        assert!(message.contains("2025-06"));
    }

    #[test]
    fn import_rows_match_across_formats() {
        for label in ["Jun 2025", "2025-06-01", "06/2025", "june 2025"] {
            let mut e = employer("111111111");
            e.import_labels = vec!["May 2025".into(), label.into()];
            let fixture = Fixture { employers: vec![e] };
            let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
            let mut state = validation_state(&["111111111"]);
            run(&mut portal, &mut state, &EngineSettings::default(), 20);

            assert_eq!(state.phase, Phase::Complete, "label {label:?} did not match");
            assert!(portal.action_log.contains(&"import-select:1".into()));
        }
    }

    #[test]
    fn force_mode_seeds_from_review_list() {
        let fixture = Fixture {
            employers: vec![employer("111111111"), employer("222222222")],
        };
        let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
        let now = Utc::now();
        let mut state = AutomationState::new(period());
        state
            .start_validation(ValidationMode::FullList, now)
            .unwrap();
        assert!(!state.validation_seeded);

        let out = step(&mut portal, &EngineSettings::default(), &mut state, now).unwrap();
        assert_eq!(out, TickOutcome::Worked);
        assert!(state.validation_seeded);
        assert_eq!(state.validation.len(), 2);
        assert!(state.validation.items()[0].record_id.is_none());
    }

    #[test]
    fn known_error_fails_item_with_message() {
        let mut e = employer("111111111");
        e.validate_outcome = ScriptedOutcome::KnownError {
            message: "Validation rejected by assessor".into(),
        };
        let fixture = Fixture { employers: vec![e] };
        let mut portal = ScriptedPortal::new(fixture, PageKind::ReviewList);
        let mut state = validation_state(&["111111111"]);
        run(&mut portal, &mut state, &EngineSettings::default(), 20);

        assert_eq!(state.phase, Phase::Complete);
        assert_eq!(state.validation.items()[0].status, ItemStatus::Failed);
        assert_eq!(
            state.validation.items()[0].message.as_deref(),
            Some("Validation rejected by assessor")
        );
    }
}
