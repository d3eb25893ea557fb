//! Reduces a visible response dialog to a closed classification.
//!
//! The priority order is deliberate and fixed: consent > receipt header >
//! structural error marker > structural success marker > styled action
//! control > known text phrases > unknown. First match wins. Anything that
//! matches nothing is [`DialogKind::Unknown`], which always halts the active
//! loop for human intervention — the engine never guesses on unrecognized
//! remote feedback.

use crate::page::{ActionStyle, RawDialog};

/// What a visible dialog means to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogKind {
    /// A confirmation prompt that must be accepted, not an outcome.
    Consent,
    /// A receipt/acknowledgement view; terminal success.
    Receipt,
    Success,
    KnownError(String),
    Unknown(String),
}

/// Headers that mark a receipt/acknowledgement view.
const RECEIPT_HEADERS: [&str; 3] = ["receipt", "acknowledgement", "acknowledgment"];

/// Phrases the application is known to use in error dialogs.
const ERROR_PHRASES: [&str; 8] = [
    "already exists",
    "duplicate",
    "error",
    "failed",
    "could not",
    "unable to",
    "invalid",
    "rejected",
];

/// Phrases the application is known to use in success dialogs.
const SUCCESS_PHRASES: [&str; 4] = [
    "successfully",
    "success",
    "has been submitted",
    "has been saved",
];

pub fn classify(dialog: &RawDialog) -> DialogKind {
    if dialog.has_consent_control {
        return DialogKind::Consent;
    }

    if let Some(header) = &dialog.header {
        let header = header.to_lowercase();
        if RECEIPT_HEADERS.iter().any(|h| header.contains(h)) {
            return DialogKind::Receipt;
        }
    }

    if dialog.error_marker {
        return DialogKind::KnownError(dialog.body.clone());
    }
    if dialog.success_marker {
        return DialogKind::Success;
    }

    match dialog.action_style {
        Some(ActionStyle::Error) => return DialogKind::KnownError(dialog.body.clone()),
        Some(ActionStyle::Success) => return DialogKind::Success,
        None => {}
    }

    let body = dialog.body.to_lowercase();
    if ERROR_PHRASES.iter().any(|p| body.contains(p)) {
        return DialogKind::KnownError(dialog.body.clone());
    }
    if SUCCESS_PHRASES.iter().any(|p| body.contains(p)) {
        return DialogKind::Success;
    }

    DialogKind::Unknown(dialog.body.clone())
}

/// A known-error message that means the filing already exists remotely.
/// Treated as success for completion purposes.
pub fn is_duplicate_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("already exists") || lower.contains("duplicate")
}
