//! Active-surface arbitration.
//!
//! Several automation surfaces may be open against the same portal session.
//! Exactly one of them may execute mutating steps; the rest must observe
//! that they are not elected and do nothing. The engine checks the arbiter
//! at the top of every tick, before any page action.

/// Answers "is this the single active automation surface?".
pub trait SurfaceArbiter {
    fn is_active(&self) -> bool;

    /// Attempt to become the active surface. Returns whether this surface
    /// now holds the election.
    fn claim(&mut self) -> bool;
}

/// The single-process arbiter: one surface, always elected.
#[derive(Debug, Default)]
pub struct SoloArbiter;

impl SurfaceArbiter for SoloArbiter {
    fn is_active(&self) -> bool {
        true
    }

    fn claim(&mut self) -> bool {
        true
    }
}

/// An arbiter whose election is flipped externally. Lets rehearsals and
/// tests exercise the not-elected path.
#[derive(Debug)]
#[allow(dead_code)]
pub struct ScriptedArbiter {
    pub active: bool,
}

impl SurfaceArbiter for ScriptedArbiter {
    fn is_active(&self) -> bool {
        self.active
    }

    fn claim(&mut self) -> bool {
        self.active
    }
}
