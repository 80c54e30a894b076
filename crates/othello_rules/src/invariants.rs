//! Invariants every legal move must preserve.
//!
//! Each invariant compares the state before a move with the state after it.
//! They are testable on their own and checked by the session layer before a
//! new state is committed.

use crate::board::BoardState;

/// A property relating a state to its successor.
pub trait TransitionInvariant {
    /// Checks if the invariant holds for this transition.
    fn holds(before: &BoardState, after: &BoardState) -> bool;

    /// Human-readable description of the invariant.
    fn description() -> &'static str;
}

/// Violation of a transition invariant.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display("{description}")]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub description: String,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// A group of invariants checked together.
pub trait InvariantSet {
    /// Returns every violated invariant, or `Ok(())` if all hold.
    fn check_all(before: &BoardState, after: &BoardState) -> Result<(), Vec<InvariantViolation>>;
}

impl<I1, I2, I3, I4> InvariantSet for (I1, I2, I3, I4)
where
    I1: TransitionInvariant,
    I2: TransitionInvariant,
    I3: TransitionInvariant,
    I4: TransitionInvariant,
{
    fn check_all(before: &BoardState, after: &BoardState) -> Result<(), Vec<InvariantViolation>> {
        let checks = [
            (I1::holds(before, after), I1::description()),
            (I2::holds(before, after), I2::description()),
            (I3::holds(before, after), I3::description()),
            (I4::holds(before, after), I4::description()),
        ];
        let violations: Vec<_> = checks
            .into_iter()
            .filter(|(holds, _)| !holds)
            .map(|(_, description)| InvariantViolation::new(description))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Exactly one new piece lands on the board.
pub struct OnePiecePlaced;

impl TransitionInvariant for OnePiecePlaced {
    fn holds(before: &BoardState, after: &BoardState) -> bool {
        after.occupied() == before.occupied() + 1
    }

    fn description() -> &'static str {
        "A move places exactly one piece"
    }
}

/// The mover flips at least one opponent piece.
pub struct CapturesSomething;

impl TransitionInvariant for CapturesSomething {
    fn holds(before: &BoardState, after: &BoardState) -> bool {
        let opponent = before.turn().opponent();
        after.score_of(opponent) < before.score_of(opponent)
    }

    fn description() -> &'static str {
        "A move captures at least one piece"
    }
}

/// The mover gains its placed piece plus every captured piece.
pub struct CapturesChangeSides;

impl TransitionInvariant for CapturesChangeSides {
    fn holds(before: &BoardState, after: &BoardState) -> bool {
        let mover = before.turn();
        let opponent = mover.opponent();
        let lost = before.score_of(opponent).saturating_sub(after.score_of(opponent));
        after.score_of(mover) == before.score_of(mover) + 1 + lost
    }

    fn description() -> &'static str {
        "Every captured piece changes to the mover's color"
    }
}

/// Moves never change who plays Black.
pub struct AssignmentUnchanged;

impl TransitionInvariant for AssignmentUnchanged {
    fn holds(before: &BoardState, after: &BoardState) -> bool {
        before.black_player() == after.black_player()
    }

    fn description() -> &'static str {
        "A move keeps the Black participant assignment"
    }
}

/// All move invariants.
pub type MoveInvariants = (
    OnePiecePlaced,
    CapturesSomething,
    CapturesChangeSides,
    AssignmentUnchanged,
);
