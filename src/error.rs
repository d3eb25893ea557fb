use thiserror::Error;

/// Errors surfaced by the persistent state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to decode state document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by a page adapter while driving the remote application.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("stale handle: {0}")]
    StaleHandle(String),

    #[error("action rejected by the page: {0}")]
    ActionRejected(String),
}

/// Errors raised at the queue boundary when an item status change would
/// violate the allowed-transition table.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("illegal status transition {from} -> {to} for item {item}")]
    IllegalTransition {
        item: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("no current item in queue")]
    Empty,
}

/// Error from the phase controller when a requested phase change is not in
/// the transition table.
#[derive(Debug, Error)]
#[error("illegal phase transition {from} -> {to}")]
pub struct PhaseTransitionError {
    pub from: &'static str,
    pub to: &'static str,
}
