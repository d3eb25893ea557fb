//! A fixture-driven portal double.
//!
//! `ScriptedPortal` implements [`PageAdapter`] over a declarative
//! [`Fixture`]: which employers exist, what their observation and
//! sub-record rows look like, and how the portal answers each submission.
//! The demo command rehearses the whole workflow against it, and the engine
//! tests drive their scenarios through it with synchronous ticks. A real
//! portal adapter replaces it behind the same trait.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{
    ActionStyle, Control, ControlHandle, ImportRow, PageAdapter, PageKind, RawDialog, ReviewRow,
    RowHandle,
};
use crate::error::PageError;
use crate::model::{ScrapedObservation, SubRecordValue};

/// How the portal answers a submission for one employer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedOutcome {
    Success,
    /// A receipt/acknowledgement view instead of a plain success dialog.
    Receipt,
    /// The filing already exists remotely.
    Duplicate,
    KnownError { message: String },
    /// No dialog ever appears; exercises the timeout path.
    Silence,
    /// A dialog the classifier cannot place; exercises intervention.
    Unknown { message: String },
    /// A consent prompt first, then the inner outcome once accepted.
    ConsentThen { then: Box<ScriptedOutcome> },
}

impl Default for ScriptedOutcome {
    fn default() -> Self {
        ScriptedOutcome::Success
    }
}

fn default_true() -> bool {
    true
}

/// One employer as the portal knows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureEmployer {
    pub employer_number: String,
    pub name: String,
    #[serde(default)]
    pub observations: Vec<ScrapedObservation>,
    /// Visible on the review list without searching.
    #[serde(default = "default_true")]
    pub on_review_list: bool,
    /// Appears on the review list only after the search action runs.
    #[serde(default)]
    pub review_after_search: bool,
    /// Rows of the import dialog that opens on entry; empty means the entry
    /// opens with no import dialog.
    #[serde(default)]
    pub import_labels: Vec<String>,
    #[serde(default)]
    pub sub_records: Vec<SubRecordValue>,
    /// Values the portal swaps in after a save, so a re-validation pass
    /// observes the correction.
    #[serde(default)]
    pub sub_records_after_edit: Option<Vec<SubRecordValue>>,
    #[serde(default)]
    pub capture_outcome: ScriptedOutcome,
    #[serde(default)]
    pub validate_outcome: ScriptedOutcome,
    #[serde(default)]
    pub edit_outcome: ScriptedOutcome,
}

/// The declarative script the portal plays back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    pub employers: Vec<FixtureEmployer>,
}

impl Fixture {
    pub fn employer(&self, number: &str) -> Option<&FixtureEmployer> {
        self.employers.iter().find(|e| e.employer_number == number)
    }
}

/// Simulated portal state. Page flow: search results for scraping, the
/// identification→form pair for capture, the review list and entries for
/// validation and wage edits. Dismissing a dialog lands back on the home
/// page of the current flow, like the real portal does.
pub struct ScriptedPortal {
    fixture: Fixture,
    page: PageKind,
    home: PageKind,
    login_wall: bool,
    searched: Option<String>,
    review_searched: Option<String>,
    form_employer: Option<String>,
    entry_employer: Option<String>,
    import_open: bool,
    import_selected: Option<usize>,
    imported: HashSet<String>,
    fields: HashMap<&'static str, String>,
    dialog: Option<RawDialog>,
    after_consent: Option<ScriptedOutcome>,
    disabled: HashSet<&'static str>,
    /// Every mutating action, for assertions: "search:…", "submit:…".
    pub action_log: Vec<String>,
}

impl ScriptedPortal {
    pub fn new(fixture: Fixture, home: PageKind) -> Self {
        Self {
            fixture,
            page: home,
            home,
            login_wall: false,
            searched: None,
            review_searched: None,
            form_employer: None,
            entry_employer: None,
            import_open: false,
            import_selected: None,
            imported: HashSet::new(),
            fields: HashMap::new(),
            dialog: None,
            after_consent: None,
            disabled: HashSet::new(),
            action_log: Vec::new(),
        }
    }

    /// Navigate the portal to a flow's home page, as a human would between
    /// phases.
    pub fn goto(&mut self, page: PageKind) {
        self.page = page;
        self.home = page;
        self.form_employer = None;
        self.entry_employer = None;
        self.import_open = false;
        self.import_selected = None;
        self.fields.clear();
    }

    pub fn set_login_wall(&mut self, up: bool) {
        self.login_wall = up;
    }

    /// Disable a control to exercise the stuck-counter path.
    #[allow(dead_code)]
    pub fn disable(&mut self, control: Control) {
        self.disabled.insert(control.name());
    }

    fn log(&mut self, entry: String) {
        self.action_log.push(entry);
    }

    fn visible_review(&self) -> Vec<&FixtureEmployer> {
        self.fixture
            .employers
            .iter()
            .filter(|e| {
                e.on_review_list
                    || (e.review_after_search
                        && self.review_searched.as_deref() == Some(e.employer_number.as_str()))
            })
            .collect()
    }

    fn play_outcome(&mut self, outcome: ScriptedOutcome) {
        self.dialog = match outcome {
            ScriptedOutcome::Success => Some(RawDialog {
                success_marker: true,
                action_style: Some(ActionStyle::Success),
                body: "Declaration submitted successfully".into(),
                ..RawDialog::default()
            }),
            ScriptedOutcome::Receipt => Some(RawDialog {
                header: Some("Submission Receipt".into()),
                body: "Reference 00042".into(),
                ..RawDialog::default()
            }),
            ScriptedOutcome::Duplicate => Some(RawDialog {
                error_marker: true,
                action_style: Some(ActionStyle::Error),
                body: "Declaration already exists for this period".into(),
                ..RawDialog::default()
            }),
            ScriptedOutcome::KnownError { message } => Some(RawDialog {
                error_marker: true,
                action_style: Some(ActionStyle::Error),
                body: message,
                ..RawDialog::default()
            }),
            ScriptedOutcome::Silence => None,
            ScriptedOutcome::Unknown { message } => Some(RawDialog {
                body: message,
                ..RawDialog::default()
            }),
            ScriptedOutcome::ConsentThen { then } => {
                self.after_consent = Some(*then);
                Some(RawDialog {
                    has_consent_control: true,
                    body: "Do you want to continue?".into(),
                    ..RawDialog::default()
                })
            }
        };
    }

    fn close_flow(&mut self) {
        self.page = self.home;
        self.form_employer = None;
        self.entry_employer = None;
        self.import_open = false;
        self.import_selected = None;
        self.fields.clear();
    }
}

impl PageAdapter for ScriptedPortal {
    fn current_page(&self) -> Option<PageKind> {
        if self.login_wall {
            return None;
        }
        Some(self.page)
    }

    fn login_interstitial(&self) -> bool {
        self.login_wall
    }

    fn find_control(&self, control: Control) -> Option<ControlHandle> {
        let available: &[Control] = match self.page {
            PageKind::SearchResults => &[Control::SearchField, Control::SearchButton],
            PageKind::EmployerIdentification => {
                &[Control::EmployerNumberField, Control::ProceedButton]
            }
            PageKind::FilingForm => &[
                Control::PeriodField,
                Control::MediumSelect,
                Control::ModeSelect,
                Control::SectorSelect,
                Control::ScheduleSelect,
                Control::UnitCountField,
                Control::AmountField,
                Control::SubmitButton,
                Control::BackButton,
            ],
            PageKind::ReviewList => &[Control::SearchField, Control::SearchButton],
            PageKind::RecordEntry => &[
                Control::ImportConfirmButton,
                Control::ValidateButton,
                Control::PostToggle,
                Control::AggregateAmountField,
                Control::SaveButton,
                Control::BackButton,
            ],
        };
        if available.contains(&control) {
            Some(ControlHandle(control))
        } else {
            None
        }
    }

    fn is_enabled(&self, handle: &ControlHandle) -> bool {
        !self.disabled.contains(handle.0.name())
    }

    fn set_field(&mut self, handle: &ControlHandle, value: &str) -> Result<(), PageError> {
        if !self.is_enabled(handle) {
            return Err(PageError::ActionRejected(format!(
                "{} is disabled",
                handle.0.name()
            )));
        }
        self.fields.insert(handle.0.name(), value.to_string());
        Ok(())
    }

    fn focus(&mut self, _handle: &ControlHandle) -> Result<(), PageError> {
        Ok(())
    }

    fn blur(&mut self, _handle: &ControlHandle) -> Result<(), PageError> {
        Ok(())
    }

    fn click(&mut self, handle: &ControlHandle) -> Result<(), PageError> {
        if !self.is_enabled(handle) {
            return Err(PageError::ActionRejected(format!(
                "{} is disabled",
                handle.0.name()
            )));
        }
        match handle.0 {
            Control::SearchButton => {
                let term = self.fields.get(Control::SearchField.name()).cloned();
                if let Some(term) = term {
                    match self.page {
                        PageKind::ReviewList => {
                            self.review_searched = Some(term.clone());
                            self.log(format!("review-search:{term}"));
                        }
                        _ => {
                            self.searched = Some(term.clone());
                            self.log(format!("search:{term}"));
                        }
                    }
                }
            }
            Control::ProceedButton => {
                let number = self
                    .fields
                    .get(Control::EmployerNumberField.name())
                    .cloned()
                    .unwrap_or_default();
                if self.fixture.employer(&number).is_some() {
                    self.page = PageKind::FilingForm;
                    self.form_employer = Some(number.clone());
                    self.log(format!("proceed:{number}"));
                } else {
                    self.play_outcome(ScriptedOutcome::KnownError {
                        message: format!("Employer {number} could not be found"),
                    });
                }
            }
            Control::SubmitButton => {
                if let Some(number) = self.form_employer.clone() {
                    let outcome = self
                        .fixture
                        .employer(&number)
                        .map(|e| e.capture_outcome.clone())
                        .unwrap_or_default();
                    self.log(format!("submit:{number}"));
                    self.play_outcome(outcome);
                }
            }
            Control::BackButton => {
                self.log("back".into());
                self.close_flow();
            }
            Control::ImportConfirmButton => {
                self.import_open = false;
                self.import_selected = None;
                if let Some(number) = self.entry_employer.clone() {
                    self.imported.insert(number);
                }
                self.log("import-confirm".into());
            }
            Control::ValidateButton => {
                if let Some(number) = self.entry_employer.clone() {
                    let outcome = self
                        .fixture
                        .employer(&number)
                        .map(|e| e.validate_outcome.clone())
                        .unwrap_or_default();
                    self.log(format!("validate:{number}"));
                    self.play_outcome(outcome);
                }
            }
            Control::PostToggle => {
                self.log("post-toggle".into());
            }
            Control::SaveButton => {
                if let Some(number) = self.entry_employer.clone() {
                    let amount = self
                        .fields
                        .get(Control::AggregateAmountField.name())
                        .cloned()
                        .unwrap_or_default();
                    let outcome = self
                        .fixture
                        .employer(&number)
                        .map(|e| e.edit_outcome.clone())
                        .unwrap_or_default();
                    if let Some(e) = self
                        .fixture
                        .employers
                        .iter_mut()
                        .find(|e| e.employer_number == number)
                        && let Some(after) = e.sub_records_after_edit.take()
                    {
                        e.sub_records = after;
                    }
                    self.log(format!("save:{number}:{amount}"));
                    self.play_outcome(outcome);
                }
            }
            other => {
                return Err(PageError::ActionRejected(format!(
                    "{} is not clickable",
                    other.name()
                )));
            }
        }
        Ok(())
    }

    fn open_row(&mut self, handle: &RowHandle) -> Result<(), PageError> {
        if self.page == PageKind::RecordEntry && self.import_open {
            self.import_selected = Some(handle.0);
            self.log(format!("import-select:{}", handle.0));
            return Ok(());
        }
        if self.page == PageKind::ReviewList {
            let number = self
                .visible_review()
                .get(handle.0)
                .map(|e| e.employer_number.clone())
                .ok_or_else(|| PageError::StaleHandle(format!("review row {}", handle.0)))?;
            let has_import = self
                .fixture
                .employer(&number)
                .is_some_and(|e| !e.import_labels.is_empty())
                && !self.imported.contains(&number);
            self.page = PageKind::RecordEntry;
            self.entry_employer = Some(number.clone());
            self.import_open = has_import;
            self.log(format!("open-entry:{number}"));
            return Ok(());
        }
        Err(PageError::StaleHandle(format!("row {}", handle.0)))
    }

    fn results_show(&self, employer_number: &str) -> bool {
        self.searched.as_deref() == Some(employer_number)
            && self.fixture.employer(employer_number).is_some()
    }

    fn result_employer_name(&self) -> Option<String> {
        let number = self.searched.as_deref()?;
        self.fixture.employer(number).map(|e| e.name.clone())
    }

    fn observation_rows(&self) -> Vec<ScrapedObservation> {
        let Some(number) = self.searched.as_deref() else {
            return Vec::new();
        };
        self.fixture
            .employer(number)
            .map(|e| e.observations.clone())
            .unwrap_or_default()
    }

    fn review_rows(&self) -> Vec<ReviewRow> {
        if self.page != PageKind::ReviewList {
            return Vec::new();
        }
        self.visible_review()
            .iter()
            .enumerate()
            .map(|(i, e)| ReviewRow {
                employer_number: e.employer_number.clone(),
                name: e.name.clone(),
                handle: RowHandle(i),
            })
            .collect()
    }

    fn import_rows(&self) -> Option<Vec<ImportRow>> {
        if self.page != PageKind::RecordEntry || !self.import_open {
            return None;
        }
        let employer = self.fixture.employer(self.entry_employer.as_deref()?)?;
        Some(
            employer
                .import_labels
                .iter()
                .enumerate()
                .map(|(i, label)| ImportRow {
                    label: label.clone(),
                    handle: RowHandle(i),
                })
                .collect(),
        )
    }

    fn sub_record_rows(&self) -> Vec<SubRecordValue> {
        let Some(number) = self.entry_employer.as_deref() else {
            return Vec::new();
        };
        self.fixture
            .employer(number)
            .map(|e| e.sub_records.clone())
            .unwrap_or_default()
    }

    fn displayed_employer(&self) -> Option<String> {
        match self.page {
            PageKind::FilingForm => self.form_employer.clone(),
            PageKind::RecordEntry => self.entry_employer.clone(),
            _ => None,
        }
    }

    fn response_dialog(&self) -> Option<RawDialog> {
        self.dialog.clone()
    }

    fn accept_dialog(&mut self) -> Result<(), PageError> {
        let Some(dialog) = &self.dialog else {
            return Err(PageError::ActionRejected("no dialog visible".into()));
        };
        if !dialog.has_consent_control {
            return Err(PageError::ActionRejected(
                "dialog has no consent control".into(),
            ));
        }
        self.log("consent-accept".into());
        match self.after_consent.take() {
            Some(outcome) => self.play_outcome(outcome),
            None => self.dialog = None,
        }
        Ok(())
    }

    fn dismiss_dialog(&mut self) -> Result<(), PageError> {
        if self.dialog.take().is_none() {
            return Err(PageError::ActionRejected("no dialog visible".into()));
        }
        self.log("dismiss".into());
        self.close_flow();
        Ok(())
    }
}
