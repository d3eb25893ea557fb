mod arbiter;
mod cli;
mod config;
mod engine;
mod error;
mod model;
mod page;
mod report;
mod store;
mod textmatch;
mod ui;

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use uuid::Uuid;

use arbiter::SoloArbiter;
use cli::{Cli, Command};
use config::DeclabotConfig;
use engine::{Engine, StepScheduler};
use model::{
    AutomationState, EmployerRecord, ObservationKind, Period, Phase, ScrapedObservation,
    SubRecordValue, ValidationMode, is_employer_number,
};
use page::{Fixture, FixtureEmployer, PageKind, ScriptedOutcome, ScriptedPortal};
use report::Summary;
use store::{JsonFileStore, MemoryStore, StateStore};
use ui::PhaseProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DeclabotConfig::load(&cli.config)?;
    if cli.verbose {
        eprintln!(
            "config: {} (state at {})",
            cli.config.display(),
            config.state_path
        );
    }
    let store = JsonFileStore::new(&config.state_path);
    let now = Utc::now();

    match cli.command {
        Command::Scrape {
            numbers,
            file,
            fixture,
        } => {
            let mut batch = numbers;
            if let Some(path) = file {
                batch.extend(read_numbers(&path)?);
            }

            let mut state = load_or_new(&store, &config).await?;
            if state.phase.accepts_start() {
                if batch.is_empty() {
                    bail!("no employer numbers provided");
                }
                for number in batch.iter().filter(|n| !is_employer_number(n)) {
                    eprintln!("warning: {number:?} is not a 9-digit employer number");
                }
                state.target_period = config.target_period()?;
                state.start_scraping(batch)?;
                store.save(&state).await?;
            } else if state.phase != Phase::Scraping {
                bail!(
                    "a {} phase is active; finish it or run `declabot stop`",
                    state.phase
                );
            }
            drive(&config, store, &fixture, PageKind::SearchResults).await
        }

        Command::Capture { fixture } => {
            let mut state = load_or_new(&store, &config).await?;
            if state.phase.accepts_start() {
                state.start_capture(now)?;
                if state.capture.is_empty() {
                    println!("no records are eligible for capture");
                }
                store.save(&state).await?;
            } else if state.phase != Phase::Capture {
                bail!(
                    "a {} phase is active; finish it or run `declabot stop`",
                    state.phase
                );
            }
            drive(&config, store, &fixture, PageKind::EmployerIdentification).await
        }

        Command::Validate { fixture, force } => {
            let mut state = load_or_new(&store, &config).await?;
            if state.phase.accepts_start() {
                let mode = if force {
                    ValidationMode::FullList
                } else {
                    ValidationMode::CaptureSet
                };
                state.start_validation(mode, now)?;
                store.save(&state).await?;
            } else if !matches!(state.phase, Phase::Validation | Phase::WageEdit) {
                bail!(
                    "a {} phase is active; finish it or run `declabot stop`",
                    state.phase
                );
            }
            drive(&config, store, &fixture, PageKind::ReviewList).await
        }

        Command::Add {
            number,
            name,
            count,
            amount,
        } => {
            let mut state = load_or_new(&store, &config).await?;
            if state.record_by_number(&number).is_some() {
                bail!("a record for {number} already exists");
            }
            let record =
                EmployerRecord::manual(&number, &name, state.target_period, count, amount, now)?;
            state.records.push(record);
            store.save(&state).await?;
            println!("added manual record for {number}");
            Ok(())
        }

        Command::Edit {
            number,
            name,
            count,
            amount,
        } => {
            let mut state = require_state(&store).await?;
            let record = state
                .records
                .iter_mut()
                .find(|r| r.employer_number == number)
                .with_context(|| format!("no record for {number}"))?;
            let name = name.unwrap_or_else(|| record.name.clone());
            let count = count.unwrap_or(record.unit_count);
            let amount = amount.unwrap_or(record.amount);
            record.edit(&name, count, amount, now);
            store.save(&state).await?;
            println!("updated record for {number}");
            Ok(())
        }

        Command::Delete { number } => {
            let mut state = require_state(&store).await?;
            let before = state.records.len();
            state.records.retain(|r| r.employer_number != number);
            if state.records.len() == before {
                bail!("no record for {number}");
            }
            store.save(&state).await?;
            println!("deleted record for {number}");
            Ok(())
        }

        Command::Pause => {
            let mut state = require_state(&store).await?;
            state.pause();
            store.save(&state).await?;
            println!("paused");
            Ok(())
        }

        Command::Resume => {
            let mut state = require_state(&store).await?;
            state.resume();
            store.save(&state).await?;
            println!("resumed; rerun the phase command to continue");
            Ok(())
        }

        Command::Skip => {
            let mut state = require_state(&store).await?;
            state.skip_current(now)?;
            store.save(&state).await?;
            println!("skipped the current item");
            Ok(())
        }

        Command::Stop => {
            let mut state = require_state(&store).await?;
            state.stop();
            store.save(&state).await?;
            println!("stopped; all queues cleared");
            Ok(())
        }

        Command::Status => {
            let state = require_state(&store).await?;
            print_status(&state);
            Ok(())
        }

        Command::Report { csv } => {
            let state = require_state(&store).await?;
            let summary = Summary::build(&state, now);
            match csv {
                Some(path) => {
                    std::fs::write(&path, summary.to_delimited())
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("report written to {}", path.display());
                }
                None => println!("{}", summary.to_json()?),
            }
            Ok(())
        }

        Command::Demo => demo(&config).await,
    }
}

async fn load_or_new(store: &JsonFileStore, config: &DeclabotConfig) -> Result<AutomationState> {
    match store.load().await? {
        Some(state) => Ok(state),
        None => Ok(AutomationState::new(config.target_period()?)),
    }
}

async fn require_state(store: &JsonFileStore) -> Result<AutomationState> {
    store
        .load()
        .await?
        .context("no state document; start a run with `declabot scrape` first")
}

fn read_numbers(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn load_fixture(path: &Path) -> Result<Fixture> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse fixture {}", path.display()))
}

/// Drive the active phase until the engine rests.
async fn drive(
    config: &DeclabotConfig,
    store: JsonFileStore,
    fixture_path: &Path,
    home: PageKind,
) -> Result<()> {
    let fixture = load_fixture(fixture_path)?;
    let portal = ScriptedPortal::new(fixture, home);
    let mut engine = Engine::new(
        store,
        portal,
        SoloArbiter,
        config.engine_settings(),
        worker_id(),
    );

    // Ctrl-C requests a cooperative pause; the engine persists it and the
    // scheduler comes to rest without submitting anything further.
    let pause = engine.pause_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            pause.request();
        }
    });

    let scheduler = StepScheduler::new(config.scrape_interval(), config.step_interval());
    let progress = PhaseProgress::start("starting");
    let outcome = scheduler
        .run(&mut engine, |state, _| progress.update(state))
        .await?;
    let state = engine.snapshot().await?.context("state document missing")?;
    progress.finish(&state, &outcome);
    Ok(())
}

fn print_status(state: &AutomationState) {
    println!("phase:         {}", state.phase);
    println!("target period: {}", state.target_period);
    println!("paused:        {}", state.is_paused);
    println!(
        "intervention:  {}",
        state.intervention.as_deref().unwrap_or("none")
    );
    println!("login pending: {}", state.login_pending);
    println!(
        "records:       {} scraped, {} set aside, {} numbers queued",
        state.records.len(),
        state.scrape.set_aside.len(),
        state.scrape.numbers.len()
    );
    println!(
        "capture:       {}/{} succeeded, {} failed",
        state.capture.count_success(),
        state.capture.len(),
        state.capture.count(model::ItemStatus::Failed)
    );
    println!(
        "validation:    {}/{} validated, {} failed",
        state.validation.count(model::ItemStatus::Done),
        state.validation.len(),
        state.validation.count(model::ItemStatus::Failed)
    );
    println!(
        "wage edit:     {}/{} updated, {} failed",
        state.wage_edit.count(model::ItemStatus::Done),
        state.wage_edit.len(),
        state.wage_edit.count(model::ItemStatus::Failed)
    );
}

fn worker_id() -> String {
    format!("cli-{}", Uuid::new_v4())
}

/// Rehearse the complete workflow in memory against a built-in fixture:
/// scrape, capture, validation with one wage-floor correction, report.
async fn demo(config: &DeclabotConfig) -> Result<()> {
    let period: Period = config
        .target_period()
        .unwrap_or_else(|_| "2025-07".parse().expect("valid period"));
    let fixture = demo_fixture(&period);
    let numbers: Vec<String> = fixture
        .employers
        .iter()
        .map(|e| e.employer_number.clone())
        .collect();

    let mut engine = Engine::new(
        MemoryStore::new(AutomationState::new(period)),
        ScriptedPortal::new(fixture, PageKind::SearchResults),
        SoloArbiter,
        config.engine_settings(),
        worker_id(),
    );
    let scheduler = StepScheduler::new(
        std::time::Duration::from_millis(10),
        std::time::Duration::from_millis(10),
    );

    // Scraping.
    let mut state = engine.snapshot().await?.expect("seeded state");
    state.start_scraping(numbers)?;
    engine.store().save(&state).await?;
    run_demo_phase(&scheduler, &mut engine, "demo: scraping").await?;

    // Capture.
    engine.page_mut().goto(PageKind::EmployerIdentification);
    let mut state = engine.snapshot().await?.expect("seeded state");
    state.start_capture(Utc::now())?;
    engine.store().save(&state).await?;
    run_demo_phase(&scheduler, &mut engine, "demo: capture").await?;

    // Validation (wage edits included).
    engine.page_mut().goto(PageKind::ReviewList);
    let mut state = engine.snapshot().await?.expect("seeded state");
    state.start_validation(ValidationMode::CaptureSet, Utc::now())?;
    engine.store().save(&state).await?;
    run_demo_phase(&scheduler, &mut engine, "demo: validation").await?;

    let state = engine.snapshot().await?.expect("seeded state");
    let summary = Summary::build(&state, Utc::now());
    println!("{}", summary.to_json()?);
    Ok(())
}

async fn run_demo_phase(
    scheduler: &StepScheduler,
    engine: &mut Engine<MemoryStore, ScriptedPortal, SoloArbiter>,
    label: &str,
) -> Result<()> {
    let progress = PhaseProgress::start(label);
    let outcome = scheduler
        .run(engine, |state, _| progress.update(state))
        .await?;
    let state = engine.snapshot().await?.context("state document missing")?;
    progress.finish(&state, &outcome);
    Ok(())
}

fn demo_fixture(period: &Period) -> Fixture {
    let p1 = period.prev();
    let p2 = p1.prev();
    let p1_label = month_label(&p1);
    let p2_label = month_label(&p2);

    let normal = |label: &str, count: u32, amount: f64| ScrapedObservation {
        period_label: label.to_string(),
        kind: ObservationKind::Normal,
        count,
        amount,
        self_capture: false,
    };
    let sub = |id: &str, value: f64| SubRecordValue {
        id: id.to_string(),
        value,
    };

    Fixture {
        employers: vec![
            FixtureEmployer {
                employer_number: "111111111".into(),
                name: "Mokoena Textiles".into(),
                observations: vec![normal(&p1_label, 12, 54_000.0), normal(&p2_label, 12, 52_800.0)],
                on_review_list: true,
                review_after_search: false,
                import_labels: vec![p2_label.clone(), p1_label.clone()],
                sub_records: vec![sub("m1", 95.0), sub("m2", 110.0), sub("m3", 102.5)],
                sub_records_after_edit: None,
                capture_outcome: ScriptedOutcome::Success,
                validate_outcome: ScriptedOutcome::ConsentThen {
                    then: Box::new(ScriptedOutcome::Success),
                },
                edit_outcome: ScriptedOutcome::Success,
            },
            FixtureEmployer {
                employer_number: "222222222".into(),
                name: "Kruger Logistics".into(),
                observations: vec![normal(&p1_label, 3, 9_600.0)],
                on_review_list: true,
                review_after_search: false,
                import_labels: vec![p1_label.clone()],
                sub_records: vec![sub("k1", 40.0), sub("k2", 95.0), sub("k3", 120.0)],
                sub_records_after_edit: Some(vec![
                    sub("k1", 79.35),
                    sub("k2", 95.0),
                    sub("k3", 120.0),
                ]),
                capture_outcome: ScriptedOutcome::Success,
                validate_outcome: ScriptedOutcome::ConsentThen {
                    then: Box::new(ScriptedOutcome::Success),
                },
                edit_outcome: ScriptedOutcome::Success,
            },
            FixtureEmployer {
                employer_number: "333333333".into(),
                name: "Dlamini Catering".into(),
                // Only the older period: a continuity gap, excluded from
                // capture.
                observations: vec![normal(&p2_label, 6, 18_000.0)],
                on_review_list: false,
                review_after_search: false,
                import_labels: vec![],
                sub_records: vec![],
                sub_records_after_edit: None,
                capture_outcome: ScriptedOutcome::Success,
                validate_outcome: ScriptedOutcome::Success,
                edit_outcome: ScriptedOutcome::Success,
            },
            FixtureEmployer {
                employer_number: "444444444".into(),
                name: "Van Wyk Motors".into(),
                observations: vec![normal(&p1_label, 5, 21_500.0)],
                on_review_list: true,
                review_after_search: false,
                import_labels: vec![p1_label.clone()],
                sub_records: vec![sub("v1", 88.0), sub("v2", 91.0)],
                sub_records_after_edit: None,
                capture_outcome: ScriptedOutcome::Duplicate,
                validate_outcome: ScriptedOutcome::Success,
                edit_outcome: ScriptedOutcome::Success,
            },
        ],
    }
}

fn month_label(period: &Period) -> String {
    let name = period.month_name();
    let mut chars = name.chars();
    let capitalized = match chars.next() {
        Some(c) => c.to_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    };
    format!("{capitalized} {}", period.year())
}
