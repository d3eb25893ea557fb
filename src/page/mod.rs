//! The capability seam between the engine and the remote application.
//!
//! The engine never assumes page structure. Everything it can observe or do
//! goes through [`PageAdapter`]: identify the current page, locate a named
//! control, read a table's rows in typed form, detect a response dialog,
//! and perform scoped set/click actions. A concrete adapter owns the
//! mapping from these names to one application's markup; the fixture-driven
//! [`ScriptedPortal`] ships with the crate for rehearsal and tests.

mod scripted;

pub use scripted::{Fixture, FixtureEmployer, ScriptedOutcome, ScriptedPortal};

use crate::error::PageError;
use crate::model::{ScrapedObservation, SubRecordValue};

/// The page contexts the engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Baseline search view with an observation table per employer.
    SearchResults,
    /// First stage of a new filing: identify the employer.
    EmployerIdentification,
    /// Second stage: the filing form itself.
    FilingForm,
    /// The review list previously captured filings appear on.
    ReviewList,
    /// An opened review entry (also the edit context for wage corrections).
    RecordEntry,
}

/// Named controls the engine drives. The adapter owns the mapping from each
/// name to concrete markup, including the change events a real user action
/// would fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    SearchField,
    SearchButton,
    EmployerNumberField,
    ProceedButton,
    PeriodField,
    MediumSelect,
    ModeSelect,
    SectorSelect,
    ScheduleSelect,
    UnitCountField,
    AmountField,
    SubmitButton,
    BackButton,
    ImportConfirmButton,
    ValidateButton,
    PostToggle,
    AggregateAmountField,
    SaveButton,
}

impl Control {
    pub fn name(&self) -> &'static str {
        match self {
            Control::SearchField => "search-field",
            Control::SearchButton => "search-button",
            Control::EmployerNumberField => "employer-number-field",
            Control::ProceedButton => "proceed-button",
            Control::PeriodField => "period-field",
            Control::MediumSelect => "medium-select",
            Control::ModeSelect => "mode-select",
            Control::SectorSelect => "sector-select",
            Control::ScheduleSelect => "schedule-select",
            Control::UnitCountField => "unit-count-field",
            Control::AmountField => "amount-field",
            Control::SubmitButton => "submit-button",
            Control::BackButton => "back-button",
            Control::ImportConfirmButton => "import-confirm-button",
            Control::ValidateButton => "validate-button",
            Control::PostToggle => "post-toggle",
            Control::AggregateAmountField => "aggregate-amount-field",
            Control::SaveButton => "save-button",
        }
    }
}

/// Handle to a located control, valid until the page changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHandle(pub Control);

/// Handle to a located table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowHandle(pub usize);

/// One review-list row in typed form.
#[derive(Debug, Clone)]
pub struct ReviewRow {
    pub employer_number: String,
    pub name: String,
    pub handle: RowHandle,
}

/// One row of an open import dialog.
#[derive(Debug, Clone)]
pub struct ImportRow {
    pub label: String,
    pub handle: RowHandle,
}

/// Styling of a dialog's primary action control, used as a classification
/// fallback when no structural marker is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStyle {
    Error,
    Success,
}

/// A visible response dialog, reduced to the signals the classifier needs.
/// The adapter extracts these from whatever the application rendered; the
/// classifier decides what they mean.
#[derive(Debug, Clone, Default)]
pub struct RawDialog {
    pub header: Option<String>,
    pub body: String,
    /// An explicit confirmation affordance (accept/decline pair).
    pub has_consent_control: bool,
    pub error_marker: bool,
    pub success_marker: bool,
    pub action_style: Option<ActionStyle>,
}

/// The capability set the engine consumes. Implementations must make
/// [`set_field`](PageAdapter::set_field) observable to the application the
/// way a real user edit would be — the remote side reacts to change events,
/// not to raw value assignment.
pub trait PageAdapter {
    fn current_page(&self) -> Option<PageKind>;

    /// A login interstitial is covering the application.
    fn login_interstitial(&self) -> bool;

    fn find_control(&self, control: Control) -> Option<ControlHandle>;

    fn is_enabled(&self, handle: &ControlHandle) -> bool;

    fn set_field(&mut self, handle: &ControlHandle, value: &str) -> Result<(), PageError>;

    fn focus(&mut self, handle: &ControlHandle) -> Result<(), PageError>;

    fn blur(&mut self, handle: &ControlHandle) -> Result<(), PageError>;

    fn click(&mut self, handle: &ControlHandle) -> Result<(), PageError>;

    /// Open a located table row (review list or import dialog).
    fn open_row(&mut self, handle: &RowHandle) -> Result<(), PageError>;

    /// The results view currently reflects this employer number.
    fn results_show(&self, employer_number: &str) -> bool;

    /// Display name of the employer on the results view.
    fn result_employer_name(&self) -> Option<String>;

    /// Observation rows visible on the results view.
    fn observation_rows(&self) -> Vec<ScrapedObservation>;

    /// Rows visible on the review list.
    fn review_rows(&self) -> Vec<ReviewRow>;

    /// Rows of the import dialog, or `None` when no import dialog is open.
    fn import_rows(&self) -> Option<Vec<ImportRow>>;

    /// Per-employee sub-record values on an opened entry.
    fn sub_record_rows(&self) -> Vec<SubRecordValue>;

    /// The employer the identification/form/entry page currently reflects.
    fn displayed_employer(&self) -> Option<String>;

    fn response_dialog(&self) -> Option<RawDialog>;

    /// Click the dialog's affirmative control (consent prompts).
    fn accept_dialog(&mut self) -> Result<(), PageError>;

    /// Close the dialog without accepting anything.
    fn dismiss_dialog(&mut self) -> Result<(), PageError>;
}
