//! Subscription status state machine.
//!
//! `Canceled` is terminal. A scheduled cancellation is not a state of its
//! own; it is the `cancel_at_period_end` flag on an active or past-due
//! subscription.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Locally recorded status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Provider created the subscription but the first invoice is unpaid.
    Pending,

    /// Paid and in good standing.
    Active,

    /// Latest invoice failed; the provider is retrying.
    PastDue,

    /// Ended. Kept for history, never reopened.
    Canceled,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 4] = [
        SubscriptionStatus::Pending,
        SubscriptionStatus::Active,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Canceled,
    ];

    /// Statuses that occupy the one-live-subscription slot for a
    /// (user, community) pair. Every non-terminal status does, so an unpaid
    /// first invoice still blocks a second provider subscription.
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Maps a provider status string onto the local vocabulary.
    ///
    /// Returns `None` for statuses with no local meaning (e.g. `paused`).
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "active" | "trialing" => Some(SubscriptionStatus::Active),
            "past_due" | "unpaid" => Some(SubscriptionStatus::PastDue),
            "canceled" | "incomplete_expired" => Some(SubscriptionStatus::Canceled),
            "incomplete" => Some(SubscriptionStatus::Pending),
            _ => None,
        }
    }

    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubscriptionStatus::Pending),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown subscription status '{}'", other),
            )),
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From PENDING
            (Pending, Active)
                | (Pending, PastDue)
                | (Pending, Canceled)
            // From ACTIVE
                | (Active, Active) // Renewal
                | (Active, PastDue)
                | (Active, Canceled)
            // From PAST_DUE
                | (PastDue, Active)
                | (PastDue, PastDue) // Further retry failed
                | (PastDue, Canceled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Pending => vec![Active, PastDue, Canceled],
            Active => vec![Active, PastDue, Canceled],
            PastDue => vec![Active, PastDue, Canceled],
            Canceled => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn past_due_recovers_to_active() {
        assert_eq!(
            SubscriptionStatus::PastDue.transition_to(SubscriptionStatus::Active),
            Ok(SubscriptionStatus::Active)
        );
    }

    #[test]
    fn active_can_fall_past_due() {
        assert!(SubscriptionStatus::Active.can_transition_to(&SubscriptionStatus::PastDue));
    }

    #[test]
    fn canceled_is_terminal() {
        assert!(SubscriptionStatus::Canceled.is_terminal());
        assert!(SubscriptionStatus::Canceled
            .transition_to(SubscriptionStatus::Active)
            .is_err());
    }

    #[test]
    fn nothing_returns_to_pending() {
        for status in SubscriptionStatus::ALL {
            if status != SubscriptionStatus::Pending {
                assert!(!status.can_transition_to(&SubscriptionStatus::Pending));
            }
        }
    }

    #[test]
    fn every_non_terminal_status_is_live() {
        assert!(SubscriptionStatus::Active.is_live());
        assert!(SubscriptionStatus::PastDue.is_live());
        assert!(SubscriptionStatus::Pending.is_live());
        assert!(!SubscriptionStatus::Canceled.is_live());
    }

    #[test]
    fn provider_statuses_map_onto_local_vocabulary() {
        use SubscriptionStatus::*;
        assert_eq!(SubscriptionStatus::from_provider("trialing"), Some(Active));
        assert_eq!(SubscriptionStatus::from_provider("unpaid"), Some(PastDue));
        assert_eq!(
            SubscriptionStatus::from_provider("incomplete_expired"),
            Some(Canceled)
        );
        assert_eq!(SubscriptionStatus::from_provider("incomplete"), Some(Pending));
        assert_eq!(SubscriptionStatus::from_provider("paused"), None);
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
    }

    fn any_status() -> impl Strategy<Value = SubscriptionStatus> {
        prop::sample::select(SubscriptionStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn can_transition_agrees_with_valid_transitions(from in any_status(), to in any_status()) {
            prop_assert_eq!(
                from.can_transition_to(&to),
                from.valid_transitions().contains(&to)
            );
        }

        #[test]
        fn storage_spelling_parses_back(status in any_status()) {
            prop_assert_eq!(status.as_str().parse::<SubscriptionStatus>().unwrap(), status);
        }

        #[test]
        fn no_walk_escapes_canceled(steps in prop::collection::vec(any_status(), 0..12)) {
            let mut current = SubscriptionStatus::Canceled;
            for target in steps {
                if let Ok(next) = current.transition_to(target) {
                    current = next;
                }
            }
            prop_assert_eq!(current, SubscriptionStatus::Canceled);
        }
    }
}
