//! The accept/undo rule that drives labelled digitisation.
//!
//! Every stylus press is checked against the distance between the stylus and
//! head reference receivers. A press close enough to the head is a real
//! contact and advances to the next label. A press far away is the operator's
//! way of saying "that last one was wrong": the previous point is undone and
//! its label offered again.

/// Default maximum receiver-to-receiver distance for an accepted press, in
/// tracker units (centimetres in metric mode).
pub const DEFAULT_LIMIT: f64 = 30.0;

/// Result of feeding one press into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Index of the label to capture next.
    pub index: usize,
    /// Whether the press was kept. When it was not and `index` went down,
    /// the most recently kept point has to be removed.
    pub accepted: bool,
}

impl Step {
    /// True when this step asks the caller to remove the previous point.
    pub fn undoes(&self, previous_index: usize) -> bool {
        !self.accepted && self.index < previous_index
    }
}

/// Decides what a press at `distance` from the head reference means while
/// `index` is the label being captured.
///
/// - `distance > limit` rejects the press. At index 0 there is nothing to
///   undo and the index stays put, otherwise it goes back by one.
/// - anything else accepts the press and moves on to the next index.
pub fn next_index(distance: f64, index: usize, limit: f64) -> Step {
    if distance > limit {
        Step {
            index: index.saturating_sub(1),
            accepted: false,
        }
    } else {
        Step {
            index: index + 1,
            accepted: true,
        }
    }
}
