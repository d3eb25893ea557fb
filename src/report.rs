//! Terminal report over the persisted state: summary counts plus itemized
//! outcome lines, exportable as a delimited table or JSON.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{AutomationState, ItemStatus, Period};

/// One itemized outcome row.
#[derive(Debug, Clone, Serialize)]
pub struct ReportLine {
    pub employer_number: String,
    pub name: String,
    pub unit_count: u32,
    pub amount: f64,
    pub result: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The summary document a terminal consumer reads after a run.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub generated_at: DateTime<Utc>,
    pub target_period: Period,
    pub scraped: usize,
    pub set_aside: usize,
    pub queued: usize,
    pub captured: usize,
    pub validated: usize,
    pub failed: usize,
    pub capture_lines: Vec<ReportLine>,
    pub validation_lines: Vec<ReportLine>,
    pub wage_edit_lines: Vec<ReportLine>,
}

impl Summary {
    pub fn build(state: &AutomationState, now: DateTime<Utc>) -> Self {
        let capture_lines: Vec<ReportLine> = state
            .capture
            .items()
            .iter()
            .map(|i| {
                let record = state.record_by_number(&i.employer_number);
                ReportLine {
                    employer_number: i.employer_number.clone(),
                    name: record.map(|r| r.name.clone()).unwrap_or_default(),
                    unit_count: record.map(|r| r.unit_count).unwrap_or_default(),
                    amount: record.map(|r| r.amount).unwrap_or_default(),
                    result: i.status.name().to_string(),
                    message: i.message.clone().unwrap_or_default(),
                    timestamp: i.updated_at,
                }
            })
            .collect();

        let validation_lines: Vec<ReportLine> = state
            .validation
            .items()
            .iter()
            .map(|i| {
                let record = state.record_by_number(&i.employer_number);
                ReportLine {
                    employer_number: i.employer_number.clone(),
                    name: record.map(|r| r.name.clone()).unwrap_or_default(),
                    unit_count: record.map(|r| r.unit_count).unwrap_or_default(),
                    amount: record.map(|r| r.amount).unwrap_or_default(),
                    result: i.status.name().to_string(),
                    message: i.message.clone().unwrap_or_default(),
                    timestamp: i.updated_at,
                }
            })
            .collect();

        let wage_edit_lines: Vec<ReportLine> = state
            .wage_edit
            .items()
            .iter()
            .map(|i| ReportLine {
                employer_number: i.employer_number.clone(),
                name: state
                    .record_by_number(&i.employer_number)
                    .map(|r| r.name.clone())
                    .unwrap_or_default(),
                unit_count: i.adjustment.affected.len() as u32,
                amount: i.adjustment.adjusted_amount,
                result: i.status.name().to_string(),
                message: i.message.clone().unwrap_or_default(),
                timestamp: i.updated_at,
            })
            .collect();

        let failed = state.capture.count(ItemStatus::Failed)
            + state.validation.count(ItemStatus::Failed)
            + state.wage_edit.count(ItemStatus::Failed);

        Self {
            generated_at: now,
            target_period: state.target_period,
            scraped: state.records.len(),
            set_aside: state.scrape.set_aside.len(),
            queued: state.capture.len(),
            captured: state.capture.count_success(),
            validated: state.validation.count(ItemStatus::Done),
            failed,
            capture_lines,
            validation_lines,
            wage_edit_lines,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Flat delimited table of every itemized line, capture first.
    pub fn to_delimited(&self) -> String {
        let mut out = String::from("employer_number,name,unit_count,amount,result,message,timestamp\n");
        for line in self
            .capture_lines
            .iter()
            .chain(&self.validation_lines)
            .chain(&self.wage_edit_lines)
        {
            out.push_str(&format!(
                "{},{},{},{:.2},{},{},{}\n",
                csv_field(&line.employer_number),
                csv_field(&line.name),
                line.unit_count,
                line.amount,
                csv_field(&line.result),
                csv_field(&line.message),
                line.timestamp.to_rfc3339(),
            ));
        }
        out
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
