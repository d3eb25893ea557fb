use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::EmployerRecord;
use super::wage::WageAdjustment;
use crate::error::QueueError;

/// Lifecycle status of a queue item within its phase.
///
/// Statuses are monotonic: once an item is terminal it is never revisited in
/// that phase. `Duplicate` is terminal success — the remote system already
/// holds the filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Skipped,
    Duplicate,
}

impl ItemStatus {
    pub fn name(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in-progress",
            ItemStatus::Done => "done",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Duplicate => "duplicate",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Done | ItemStatus::Failed | ItemStatus::Skipped | ItemStatus::Duplicate
        )
    }

    /// Terminal statuses that count as success for completion purposes.
    pub fn is_success(&self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Duplicate)
    }

    /// The allowed-transition table. `InProgress -> Pending` is the
    /// requeue-to-back path; terminal statuses allow nothing.
    pub fn allows(&self, to: ItemStatus) -> bool {
        match self {
            ItemStatus::Pending => matches!(to, ItemStatus::InProgress | ItemStatus::Skipped),
            ItemStatus::InProgress => matches!(
                to,
                ItemStatus::Pending
                    | ItemStatus::Done
                    | ItemStatus::Failed
                    | ItemStatus::Skipped
                    | ItemStatus::Duplicate
            ),
            _ => false,
        }
    }
}

/// The progress fields every phase queue item carries.
pub trait QueueEntry {
    fn status(&self) -> ItemStatus;
    fn set_status(&mut self, status: ItemStatus);
    fn set_message(&mut self, message: Option<String>);
    fn touch(&mut self, now: DateTime<Utc>);
    /// Identifier used in error messages and the report.
    fn label(&self) -> &str;
}

macro_rules! impl_queue_entry {
    ($ty:ty) => {
        impl QueueEntry for $ty {
            fn status(&self) -> ItemStatus {
                self.status
            }
            fn set_status(&mut self, status: ItemStatus) {
                self.status = status;
            }
            fn set_message(&mut self, message: Option<String>) {
                self.message = message;
            }
            fn touch(&mut self, now: DateTime<Utc>) {
                self.updated_at = now;
            }
            fn label(&self) -> &str {
                &self.employer_number
            }
        }
    };
}

/// One capture-phase work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureItem {
    pub record_id: String,
    pub employer_number: String,
    pub status: ItemStatus,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Set when a submission went out and no dialog has answered it yet.
    pub submitted_at: Option<DateTime<Utc>>,
    /// The one silent-timeout retry has been spent.
    pub retried: bool,
    /// Bounded no-progress counter.
    pub stuck: u32,
}

impl CaptureItem {
    pub fn new(record: &EmployerRecord, now: DateTime<Utc>) -> Self {
        Self {
            record_id: record.id.clone(),
            employer_number: record.employer_number.clone(),
            status: ItemStatus::Pending,
            message: None,
            updated_at: now,
            submitted_at: None,
            retried: false,
            stuck: 0,
        }
    }
}

impl_queue_entry!(CaptureItem);

/// One validation-phase work item. `record_id` is absent for items seeded by
/// a full review-list scan rather than this run's capture set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationItem {
    pub record_id: Option<String>,
    pub employer_number: String,
    pub status: ItemStatus,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub retried: bool,
    /// How many full passes failed to find this record on the review list.
    pub not_found_count: u32,
    /// The one search action for this pass has been driven.
    pub search_attempted: bool,
}

impl ValidationItem {
    pub fn from_number(employer_number: &str, record_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            record_id,
            employer_number: employer_number.to_string(),
            status: ItemStatus::Pending,
            message: None,
            updated_at: now,
            submitted_at: None,
            retried: false,
            not_found_count: 0,
            search_attempted: false,
        }
    }
}

impl_queue_entry!(ValidationItem);

/// One wage-edit work item, created from a computed [`WageAdjustment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WageEditItem {
    pub employer_number: String,
    pub adjustment: WageAdjustment,
    pub status: ItemStatus,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub retried: bool,
    pub stuck: u32,
}

impl WageEditItem {
    pub fn new(adjustment: WageAdjustment, now: DateTime<Utc>) -> Self {
        Self {
            employer_number: adjustment.employer_number.clone(),
            adjustment,
            status: ItemStatus::Pending,
            message: None,
            updated_at: now,
            submitted_at: None,
            retried: false,
            stuck: 0,
        }
    }
}

impl_queue_entry!(WageEditItem);

/// Ordered per-phase work list with a cursor. Status changes go through
/// [`WorkQueue::set_current_status`] so the transition table is enforced in
/// one place rather than by convention at every call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkQueue<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            cursor: 0,
        }
    }
}

impl<T: QueueEntry> WorkQueue<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// The item the loop is working on, if any remain.
    pub fn current(&self) -> Option<&T> {
        self.items.get(self.cursor)
    }

    pub fn current_mut(&mut self) -> Option<&mut T> {
        self.items.get_mut(self.cursor)
    }

    /// Move past the current item. Call only after it reached a terminal
    /// status (or was requeued).
    pub fn advance(&mut self) {
        if self.cursor < self.items.len() {
            self.cursor += 1;
        }
    }

    pub fn append(&mut self, item: T) {
        self.items.push(item);
    }

    /// Apply a status change to the current item, enforcing the allowed-
    /// transition table.
    pub fn set_current_status(
        &mut self,
        status: ItemStatus,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let item = self.items.get_mut(self.cursor).ok_or(QueueError::Empty)?;
        let from = item.status();
        if !from.allows(status) {
            return Err(QueueError::IllegalTransition {
                item: item.label().to_string(),
                from: from.name(),
                to: status.name(),
            });
        }
        item.set_status(status);
        item.set_message(message);
        item.touch(now);
        Ok(())
    }

    /// Move the current item to the back of the queue, resetting it to
    /// pending. Used when a record cannot be located yet.
    pub fn requeue_current_to_back(&mut self, now: DateTime<Utc>) -> Result<(), QueueError> {
        self.set_current_status(ItemStatus::Pending, None, now)?;
        let item = self.items.remove(self.cursor);
        self.items.push(item);
        Ok(())
    }

    /// Remove and return the current item without a terminal status — the
    /// validation loop hands items over to wage-edit this way.
    pub fn remove_current(&mut self) -> Option<T> {
        if self.cursor < self.items.len() {
            Some(self.items.remove(self.cursor))
        } else {
            None
        }
    }

    /// All items past the cursor, the set still awaiting work.
    pub fn remaining(&self) -> &[T] {
        &self.items[self.cursor.min(self.items.len())..]
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.items.len()
    }

    pub fn all_terminal(&self) -> bool {
        self.items.iter().all(|i| i.status().is_terminal())
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|i| i.status() == status).count()
    }

    pub fn count_success(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status().is_success())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Period;

    fn record(number: &str) -> EmployerRecord {
        let period: Period = "2025-07".parse().unwrap();
        EmployerRecord::manual(number, "Test", period, 3, 900.0, Utc::now()).unwrap()
    }

    fn queue(numbers: &[&str]) -> WorkQueue<CaptureItem> {
        let now = Utc::now();
        WorkQueue::new(
            numbers
                .iter()
                .map(|n| CaptureItem::new(&record(n), now))
                .collect(),
        )
    }

    #[test]
    fn status_table_terminal_states_allow_nothing() {
        for terminal in [
            ItemStatus::Done,
            ItemStatus::Failed,
            ItemStatus::Skipped,
            ItemStatus::Duplicate,
        ] {
            assert!(terminal.is_terminal());
            for to in [
                ItemStatus::Pending,
                ItemStatus::InProgress,
                ItemStatus::Done,
                ItemStatus::Failed,
                ItemStatus::Skipped,
                ItemStatus::Duplicate,
            ] {
                assert!(!terminal.allows(to), "{terminal:?} must not allow {to:?}");
            }
        }
    }

    #[test]
    fn status_table_pending_and_in_progress() {
        assert!(ItemStatus::Pending.allows(ItemStatus::InProgress));
        assert!(ItemStatus::Pending.allows(ItemStatus::Skipped));
        assert!(!ItemStatus::Pending.allows(ItemStatus::Done));

        assert!(ItemStatus::InProgress.allows(ItemStatus::Done));
        assert!(ItemStatus::InProgress.allows(ItemStatus::Failed));
        assert!(ItemStatus::InProgress.allows(ItemStatus::Duplicate));
        assert!(ItemStatus::InProgress.allows(ItemStatus::Pending));
        assert!(!ItemStatus::InProgress.allows(ItemStatus::InProgress));
    }

    #[test]
    fn duplicate_counts_as_success() {
        assert!(ItemStatus::Duplicate.is_success());
        assert!(ItemStatus::Done.is_success());
        assert!(!ItemStatus::Failed.is_success());
        assert!(!ItemStatus::Skipped.is_success());
    }

    #[test]
    fn queue_enforces_transition_table() {
        let mut q = queue(&["111111111"]);
        let now = Utc::now();

        // Pending -> Done is not allowed directly.
        let err = q.set_current_status(ItemStatus::Done, None, now).unwrap_err();
        assert!(matches!(err, QueueError::IllegalTransition { .. }));

        q.set_current_status(ItemStatus::InProgress, None, now).unwrap();
        q.set_current_status(ItemStatus::Done, Some("success".into()), now)
            .unwrap();

        // Terminal: nothing further.
        assert!(q.set_current_status(ItemStatus::Failed, None, now).is_err());
    }

    #[test]
    fn advance_moves_past_current() {
        let mut q = queue(&["111111111", "222222222"]);
        assert_eq!(q.current().unwrap().employer_number, "111111111");
        q.advance();
        assert_eq!(q.current().unwrap().employer_number, "222222222");
        q.advance();
        assert!(q.current().is_none());
        assert!(q.is_exhausted());
        // Advancing past the end stays put.
        q.advance();
        assert!(q.is_exhausted());
    }

    #[test]
    fn requeue_moves_item_to_back() {
        let now = Utc::now();
        let mut q = queue(&["111111111", "222222222"]);
        q.set_current_status(ItemStatus::InProgress, None, now).unwrap();
        q.requeue_current_to_back(now).unwrap();

        assert_eq!(q.current().unwrap().employer_number, "222222222");
        assert_eq!(q.items()[1].employer_number, "111111111");
        assert_eq!(q.items()[1].status, ItemStatus::Pending);
    }

    #[test]
    fn requeue_from_pending_is_rejected() {
        let now = Utc::now();
        let mut q = queue(&["111111111"]);
        // Pending -> Pending is not in the table.
        assert!(q.requeue_current_to_back(now).is_err());
    }

    #[test]
    fn all_terminal_and_counts() {
        let now = Utc::now();
        let mut q = queue(&["111111111", "222222222"]);
        assert!(!q.all_terminal());

        q.set_current_status(ItemStatus::InProgress, None, now).unwrap();
        q.set_current_status(ItemStatus::Done, None, now).unwrap();
        q.advance();
        q.set_current_status(ItemStatus::InProgress, None, now).unwrap();
        q.set_current_status(ItemStatus::Duplicate, None, now).unwrap();
        q.advance();

        assert!(q.all_terminal());
        assert_eq!(q.count(ItemStatus::Done), 1);
        assert_eq!(q.count(ItemStatus::Duplicate), 1);
        assert_eq!(q.count_success(), 2);
    }

    #[test]
    fn remove_current_hands_item_over() {
        let mut q = queue(&["111111111", "222222222"]);
        let removed = q.remove_current().unwrap();
        assert_eq!(removed.employer_number, "111111111");
        assert_eq!(q.len(), 1);
        assert_eq!(q.current().unwrap().employer_number, "222222222");
    }

    #[test]
    fn queue_serialization_roundtrip() {
        let q = queue(&["111111111"]);
        let json = serde_json::to_string(&q).unwrap();
        let back: WorkQueue<CaptureItem> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.current().unwrap().employer_number, "111111111");
    }
}
