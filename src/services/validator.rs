//! Status transition rules
//!
//! A pilgrim can move to a status only if they are not already in it.
//! Targets outside the two statuses cannot be expressed: text input goes
//! through `PilgrimStatus::from_str`, which rejects anything else.

use crate::domain::errors::FailureKind;
use crate::domain::types::PilgrimStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    AlreadyInTargetState,
}

#[inline]
pub fn validate(current: PilgrimStatus, target: PilgrimStatus) -> Verdict {
    if current == target {
        Verdict::AlreadyInTargetState
    } else {
        Verdict::Approved
    }
}

impl Verdict {
    /// Failure kind for a rejected transition toward `target`
    pub fn failure_for(&self, target: PilgrimStatus) -> Option<FailureKind> {
        match (self, target) {
            (Verdict::Approved, _) => None,
            (Verdict::AlreadyInTargetState, PilgrimStatus::Onboard) => {
                Some(FailureKind::AlreadyOnboard)
            }
            (Verdict::AlreadyInTargetState, PilgrimStatus::Offboard) => {
                Some(FailureKind::AlreadyOffboard)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use PilgrimStatus::{Offboard, Onboard};

        assert_eq!(validate(Offboard, Onboard), Verdict::Approved);
        assert_eq!(validate(Onboard, Offboard), Verdict::Approved);
        assert_eq!(validate(Onboard, Onboard), Verdict::AlreadyInTargetState);
        assert_eq!(validate(Offboard, Offboard), Verdict::AlreadyInTargetState);
    }

    #[test]
    fn test_failure_kind_by_target() {
        assert_eq!(
            Verdict::AlreadyInTargetState.failure_for(PilgrimStatus::Onboard),
            Some(FailureKind::AlreadyOnboard)
        );
        assert_eq!(
            Verdict::AlreadyInTargetState.failure_for(PilgrimStatus::Offboard),
            Some(FailureKind::AlreadyOffboard)
        );
        assert_eq!(Verdict::Approved.failure_for(PilgrimStatus::Onboard), None);
    }

    #[test]
    fn test_unknown_target_text_fails_fast() {
        let parsed = "boarded".parse::<PilgrimStatus>();
        assert!(parsed.is_err());
    }
}
