//! Assertions over unit outcomes.

use crate::context::Context;
use crate::units::UnitOutcome;

/// Asserts the outcome is an emission and returns its context and `has_more`.
///
/// # Panics
///
/// Panics if the outcome is not [`UnitOutcome::Emit`].
#[track_caller]
pub fn assert_emitted(outcome: UnitOutcome) -> (Context, bool) {
    match outcome {
        UnitOutcome::Emit { context, has_more } => (context, has_more),
        other => panic!("Expected an emission, got {other:?}"),
    }
}

/// Asserts the outcome filtered the activation.
///
/// # Panics
///
/// Panics if the outcome is not [`UnitOutcome::Filtered`].
#[track_caller]
pub fn assert_filtered(outcome: &UnitOutcome) {
    assert!(
        matches!(outcome, UnitOutcome::Filtered { .. }),
        "Expected the activation to be filtered, got {outcome:?}"
    );
}

/// Asserts the unit reported it is exhausted.
///
/// # Panics
///
/// Panics if the outcome is not [`UnitOutcome::Done`].
#[track_caller]
pub fn assert_done(outcome: &UnitOutcome) {
    assert!(
        matches!(outcome, UnitOutcome::Done),
        "Expected the unit to be done, got {outcome:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_emitted_returns_context() {
        let (ctx, has_more) = assert_emitted(UnitOutcome::emit(Context::new().with("a", 1)));
        assert_eq!(ctx.get_string("a"), "1");
        assert!(!has_more);
    }

    #[test]
    #[should_panic(expected = "Expected an emission")]
    fn test_assert_emitted_panics_on_done() {
        assert_emitted(UnitOutcome::Done);
    }

    #[test]
    fn test_assert_filtered_and_done() {
        assert_filtered(&UnitOutcome::Filtered { has_more: false });
        assert_done(&UnitOutcome::Done);
    }
}
