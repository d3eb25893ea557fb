mod period;
mod queue;
mod record;
mod state;
mod wage;

pub use period::{MONTH_NAMES, Period, PeriodParseError};
pub use queue::{
    CaptureItem, ItemStatus, QueueEntry, ValidationItem, WageEditItem, WorkQueue,
};
pub use record::{
    EmployerRecord, Observation, ObservationKind, ObservationSource, RecordError,
    ScrapedObservation, is_employer_number,
};
pub use state::{AutomationState, Phase, ScrapeQueue, ValidationMode};
pub use wage::{SubAdjustment, SubRecordValue, WageAdjustment, evaluate_wage_floor};
