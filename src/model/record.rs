use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::period::Period;
use crate::textmatch;

/// The observation kinds the portal reports on a results view. Only normal
/// declarations feed the zero-value check and the filing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationKind {
    Normal,
    Adjustment,
}

/// Where an observation's values came from, kept for audit display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationSource {
    Scraped,
    Edited,
    Manual,
}

/// A single prior-period observation attached to an employer record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub period_label: String,
    pub kind: ObservationKind,
    pub count: u32,
    pub amount: f64,
    pub source: ObservationSource,
}

/// One observation row as read off the results view, before period
/// bucketing. The page adapter maps the portal's markup into this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedObservation {
    pub period_label: String,
    pub kind: ObservationKind,
    pub count: u32,
    pub amount: f64,
    pub self_capture: bool,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("employer number must be exactly 9 digits, got {0:?}")]
    InvalidEmployerNumber(String),

    #[error("manual records require a positive unit count and amount")]
    NonPositiveValues,
}

/// True for the 9-digit employer identifiers the portal uses.
pub fn is_employer_number(s: &str) -> bool {
    s.len() == 9 && s.bytes().all(|b| b.is_ascii_digit())
}

/// The unit of work: one employer's filing data for a target period.
///
/// Created during scraping or manually by a user. The two error flags are
/// computed once at creation and only cleared by an edit that makes the
/// values valid again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployerRecord {
    pub id: String,
    pub employer_number: String,
    pub name: String,
    pub target_period: Period,
    /// Observations from the immediately preceding period.
    pub p1: Vec<Observation>,
    /// Observations from the period before that.
    pub p2: Vec<Observation>,
    /// Unit count to file, derived from p1 normal observations.
    pub unit_count: u32,
    /// Aggregate amount to file, derived from p1 normal observations.
    pub amount: f64,
    /// No p1 observation existed.
    pub continuity_error: bool,
    /// A normal p1 observation carried a zero count or amount.
    pub zero_value_error: bool,
    /// The employer already self-reports; excluded from capture.
    pub self_capture_flag: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmployerRecord {
    /// Build a record from rows scraped off the results view, bucketing each
    /// row into p1/p2 by matching its period label against the computed
    /// prior periods and computing the error flags.
    pub fn from_scrape(
        employer_number: &str,
        name: &str,
        target_period: Period,
        rows: &[ScrapedObservation],
        now: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        if !is_employer_number(employer_number) {
            return Err(RecordError::InvalidEmployerNumber(
                employer_number.to_string(),
            ));
        }

        let p1_period = target_period.prev();
        let p2_period = p1_period.prev();

        let mut p1 = Vec::new();
        let mut p2 = Vec::new();
        let mut self_capture = false;

        for row in rows {
            if row.self_capture {
                self_capture = true;
            }
            let obs = Observation {
                period_label: row.period_label.clone(),
                kind: row.kind,
                count: row.count,
                amount: row.amount,
                source: ObservationSource::Scraped,
            };
            if textmatch::matches_period(&row.period_label, &p1_period) {
                p1.push(obs);
            } else if textmatch::matches_period(&row.period_label, &p2_period) {
                p2.push(obs);
            }
            // Rows for other periods are not relevant to this run.
        }

        let continuity_error = p1.is_empty();
        let zero_value_error = p1
            .iter()
            .any(|o| o.kind == ObservationKind::Normal && (o.count == 0 || o.amount == 0.0));
        let (unit_count, amount) = filing_values(&p1);

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            employer_number: employer_number.to_string(),
            name: name.to_string(),
            target_period,
            p1,
            p2,
            unit_count,
            amount,
            continuity_error,
            zero_value_error,
            self_capture_flag: self_capture,
            created_at: now,
            updated_at: now,
        })
    }

    /// Build a record from user-entered values, bypassing extraction.
    /// Manual records require positive filing values up front.
    pub fn manual(
        employer_number: &str,
        name: &str,
        target_period: Period,
        unit_count: u32,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        if !is_employer_number(employer_number) {
            return Err(RecordError::InvalidEmployerNumber(
                employer_number.to_string(),
            ));
        }
        if unit_count == 0 || amount <= 0.0 {
            return Err(RecordError::NonPositiveValues);
        }

        let p1_period = target_period.prev();
        let p1 = vec![Observation {
            period_label: p1_period.token(),
            kind: ObservationKind::Normal,
            count: unit_count,
            amount,
            source: ObservationSource::Manual,
        }];

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            employer_number: employer_number.to_string(),
            name: name.to_string(),
            target_period,
            p1,
            p2: Vec::new(),
            unit_count,
            amount,
            continuity_error: false,
            zero_value_error: false,
            self_capture_flag: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a user edit to name and filing values. When the values become
    /// valid both error flags are cleared, and the p1 entry is tagged as
    /// edited (or created as manual if the record had none) so the audit
    /// display shows where the numbers came from.
    pub fn edit(&mut self, name: &str, unit_count: u32, amount: f64, now: DateTime<Utc>) {
        self.name = name.to_string();
        self.unit_count = unit_count;
        self.amount = amount;
        self.updated_at = now;

        match self
            .p1
            .iter_mut()
            .find(|o| o.kind == ObservationKind::Normal)
        {
            Some(obs) => {
                obs.count = unit_count;
                obs.amount = amount;
                obs.source = ObservationSource::Edited;
            }
            None => {
                self.p1.push(Observation {
                    period_label: self.target_period.prev().token(),
                    kind: ObservationKind::Normal,
                    count: unit_count,
                    amount,
                    source: ObservationSource::Manual,
                });
            }
        }

        if unit_count > 0 && amount > 0.0 {
            self.continuity_error = false;
            self.zero_value_error = false;
        }
    }

    /// Eligible for the capture queue: no error flags, not self-reporting,
    /// and positive filing values.
    pub fn capture_eligible(&self) -> bool {
        !self.continuity_error
            && !self.zero_value_error
            && !self.self_capture_flag
            && self.unit_count > 0
            && self.amount > 0.0
    }
}

/// Filing values are the sums over p1 normal observations.
fn filing_values(p1: &[Observation]) -> (u32, f64) {
    let mut count = 0u32;
    let mut amount = 0f64;
    for obs in p1 {
        if obs.kind == ObservationKind::Normal {
            count += obs.count;
            amount += obs.amount;
        }
    }
    (count, amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn july() -> Period {
        "2025-07".parse().unwrap()
    }

    fn row(label: &str, kind: ObservationKind, count: u32, amount: f64) -> ScrapedObservation {
        ScrapedObservation {
            period_label: label.into(),
            kind,
            count,
            amount,
            self_capture: false,
        }
    }

    #[test]
    fn employer_number_validation() {
        assert!(is_employer_number("123456789"));
        assert!(!is_employer_number("12345678"));
        assert!(!is_employer_number("1234567890"));
        assert!(!is_employer_number("12345678a"));
        assert!(!is_employer_number(""));
    }

    #[test]
    fn scrape_buckets_rows_into_p1_and_p2() {
        let rows = vec![
            row("June 2025", ObservationKind::Normal, 12, 4800.0),
            row("May 2025", ObservationKind::Normal, 11, 4400.0),
            row("April 2025", ObservationKind::Normal, 10, 4000.0),
        ];
        let rec =
            EmployerRecord::from_scrape("123456789", "Acme Ltd", july(), &rows, Utc::now()).unwrap();

        assert_eq!(rec.p1.len(), 1);
        assert_eq!(rec.p1[0].period_label, "June 2025");
        assert_eq!(rec.p2.len(), 1);
        assert_eq!(rec.p2[0].period_label, "May 2025");
        assert_eq!(rec.unit_count, 12);
        assert_eq!(rec.amount, 4800.0);
        assert!(!rec.continuity_error);
        assert!(!rec.zero_value_error);
    }

    #[test]
    fn continuity_error_iff_p1_empty() {
        let rows = vec![row("May 2025", ObservationKind::Normal, 5, 2000.0)];
        let rec = EmployerRecord::from_scrape("123456789", "Gap Co", july(), &rows, Utc::now())
            .unwrap();
        assert!(rec.continuity_error);

        let rows = vec![row("June 2025", ObservationKind::Normal, 5, 2000.0)];
        let rec = EmployerRecord::from_scrape("123456789", "Ok Co", july(), &rows, Utc::now())
            .unwrap();
        assert!(!rec.continuity_error);
    }

    #[test]
    fn zero_value_error_only_for_normal_kind() {
        let rows = vec![
            row("June 2025", ObservationKind::Normal, 0, 2000.0),
            row("June 2025", ObservationKind::Normal, 5, 1000.0),
        ];
        let rec = EmployerRecord::from_scrape("123456789", "Zero Co", july(), &rows, Utc::now())
            .unwrap();
        assert!(rec.zero_value_error);

        // An adjustment row with zero values does not trip the flag.
        let rows = vec![
            row("June 2025", ObservationKind::Adjustment, 0, 0.0),
            row("June 2025", ObservationKind::Normal, 5, 1000.0),
        ];
        let rec = EmployerRecord::from_scrape("123456789", "Adj Co", july(), &rows, Utc::now())
            .unwrap();
        assert!(!rec.zero_value_error);
    }

    #[test]
    fn self_capture_flag_from_row_indicator() {
        let mut rows = vec![row("June 2025", ObservationKind::Normal, 5, 1000.0)];
        rows[0].self_capture = true;
        let rec = EmployerRecord::from_scrape("123456789", "Self Co", july(), &rows, Utc::now())
            .unwrap();
        assert!(rec.self_capture_flag);
        assert!(!rec.capture_eligible());
    }

    #[test]
    fn filing_values_sum_normal_p1_rows() {
        let rows = vec![
            row("June 2025", ObservationKind::Normal, 5, 1000.0),
            row("June 2025", ObservationKind::Normal, 3, 600.0),
            row("June 2025", ObservationKind::Adjustment, 99, 9999.0),
        ];
        let rec = EmployerRecord::from_scrape("123456789", "Sum Co", july(), &rows, Utc::now())
            .unwrap();
        assert_eq!(rec.unit_count, 8);
        assert_eq!(rec.amount, 1600.0);
    }

    #[test]
    fn manual_record_requires_positive_values() {
        assert!(EmployerRecord::manual("123456789", "M", july(), 0, 100.0, Utc::now()).is_err());
        assert!(EmployerRecord::manual("123456789", "M", july(), 3, 0.0, Utc::now()).is_err());
        assert!(EmployerRecord::manual("12345", "M", july(), 3, 100.0, Utc::now()).is_err());

        let rec = EmployerRecord::manual("123456789", "M", july(), 3, 100.0, Utc::now()).unwrap();
        assert!(rec.capture_eligible());
        assert_eq!(rec.p1[0].source, ObservationSource::Manual);
    }

    #[test]
    fn edit_clears_flags_and_tags_observation() {
        let rows = vec![row("June 2025", ObservationKind::Normal, 0, 0.0)];
        let mut rec =
            EmployerRecord::from_scrape("123456789", "Fix Co", july(), &rows, Utc::now()).unwrap();
        assert!(rec.zero_value_error);
        assert!(!rec.capture_eligible());

        rec.edit("Fix Co", 4, 1600.0, Utc::now());
        assert!(!rec.zero_value_error);
        assert!(!rec.continuity_error);
        assert!(rec.capture_eligible());
        assert_eq!(rec.p1[0].source, ObservationSource::Edited);
        assert_eq!(rec.p1[0].count, 4);
    }

    #[test]
    fn edit_on_empty_p1_creates_manual_observation() {
        let mut rec =
            EmployerRecord::from_scrape("123456789", "Gap Co", july(), &[], Utc::now()).unwrap();
        assert!(rec.continuity_error);

        rec.edit("Gap Co", 2, 500.0, Utc::now());
        assert!(!rec.continuity_error);
        assert_eq!(rec.p1.len(), 1);
        assert_eq!(rec.p1[0].source, ObservationSource::Manual);
    }

    #[test]
    fn eligibility_tracks_flag_changes() {
        let rows = vec![row("June 2025", ObservationKind::Normal, 6, 2400.0)];
        let rec = EmployerRecord::from_scrape("123456789", "El Co", july(), &rows, Utc::now())
            .unwrap();
        assert!(rec.capture_eligible());

        let mut flagged = rec.clone();
        flagged.continuity_error = true;
        assert!(!flagged.capture_eligible());
    }

    #[test]
    fn record_serialization_roundtrip() {
        let rows = vec![row("June 2025", ObservationKind::Normal, 6, 2400.0)];
        let rec = EmployerRecord::from_scrape("123456789", "Ser Co", july(), &rows, Utc::now())
            .unwrap();
        let json = serde_json::to_string(&rec).unwrap();
        let back: EmployerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, rec.id);
        assert_eq!(back.employer_number, "123456789");
        assert_eq!(back.p1.len(), 1);
    }
}
