//! Admin-driven approval workflow shared by products and farmer accounts.
use crate::error::RemoteError;
use crate::types::{ApprovalStatus, Role};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which status moves an admin may make.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Any status may move to any other.
    #[default]
    Free,
    /// Only `pending -> approved | rejected`. Decisions are final.
    Monotone,
}

impl TransitionPolicy {
    /// Re-asserting the current status is always permitted.
    pub fn permits(&self, from: ApprovalStatus, to: ApprovalStatus) -> bool {
        if from == to {
            return true;
        }
        match self {
            TransitionPolicy::Free => true,
            TransitionPolicy::Monotone => {
                from == ApprovalStatus::Pending && to != ApprovalStatus::Pending
            }
        }
    }

    pub fn check(&self, from: ApprovalStatus, to: ApprovalStatus) -> Result<(), RemoteError> {
        if self.permits(from, to) {
            Ok(())
        } else {
            Err(RemoteError::InvalidTransition { from, to })
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(TransitionPolicy::Free),
            "monotone" => Ok(TransitionPolicy::Monotone),
            other => Err(anyhow::anyhow!("unknown transition policy: {other}")),
        }
    }
}

/// A record whose status is moved by an admin.
pub trait Moderated {
    fn status(&self) -> ApprovalStatus;
    /// Assign the status along with anything that must change in the same write.
    fn apply_status(&mut self, status: ApprovalStatus);
}

/// Move `subject` to `to` on behalf of `actor`. Returns the previous status.
pub fn transition<M: Moderated>(
    subject: &mut M,
    actor: Role,
    to: ApprovalStatus,
    policy: TransitionPolicy,
) -> Result<ApprovalStatus, RemoteError> {
    if actor != Role::Admin {
        return Err(RemoteError::Forbidden(
            "only an admin may change approval status".into(),
        ));
    }

    let from = subject.status();
    policy.check(from, to)?;
    subject.apply_status(to);

    Ok(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ApprovalStatus::*;

    struct Flag(ApprovalStatus);

    impl Moderated for Flag {
        fn status(&self) -> ApprovalStatus {
            self.0
        }
        fn apply_status(&mut self, status: ApprovalStatus) {
            self.0 = status;
        }
    }

    #[test]
    fn free_policy_allows_every_move() {
        for from in [Pending, Approved, Rejected] {
            for to in [Pending, Approved, Rejected] {
                assert!(TransitionPolicy::Free.permits(from, to));
            }
        }
    }

    #[test]
    fn monotone_policy_only_leaves_pending() {
        let policy = TransitionPolicy::Monotone;
        assert!(policy.permits(Pending, Approved));
        assert!(policy.permits(Pending, Rejected));
        assert!(policy.permits(Approved, Approved));
        assert!(!policy.permits(Approved, Rejected));
        assert!(!policy.permits(Rejected, Pending));
    }

    #[test]
    fn non_admin_is_forbidden() {
        let mut flag = Flag(Pending);
        let err = transition(&mut flag, Role::Farmer, Approved, TransitionPolicy::Free).unwrap_err();

        assert!(matches!(err, RemoteError::Forbidden(_)));
        assert_eq!(flag.0, Pending);
    }

    #[test]
    fn rejected_move_leaves_status_alone() {
        let mut flag = Flag(Approved);
        let err = transition(&mut flag, Role::Admin, Pending, TransitionPolicy::Monotone).unwrap_err();

        assert_eq!(err, RemoteError::InvalidTransition { from: Approved, to: Pending });
        assert_eq!(flag.0, Approved);
    }
}
