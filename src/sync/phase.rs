//! Protocol phase of a synchronizer.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Phase
// ============================================================================

/// Which operation the synchronizer currently permits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Idle; the next operation must be a send.
    #[default]
    ExpectingSend,
    /// A message is outstanding; the next operation must be a receive.
    ExpectingReceive,
    /// An unsolicited message arrived. Terminal.
    Faulted,
}

impl Phase {
    /// Returns `true` if the synchronizer is poisoned.
    #[inline]
    #[must_use]
    pub const fn is_faulted(self) -> bool {
        matches!(self, Self::Faulted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExpectingSend => "expecting send",
            Self::ExpectingReceive => "expecting receive",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

// ============================================================================
// TimeoutPolicy
// ============================================================================

/// What a timed-out receive does to the phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Stay in [`Phase::ExpectingReceive`] and keep the armed signal.
    ///
    /// A later receive can still collect a late reply; a send fails
    /// with a protocol violation until it does.
    #[default]
    KeepExpectingReceive,
    /// Discard the exchange and return to [`Phase::ExpectingSend`].
    ///
    /// A reply that arrives afterwards is unsolicited and faults the
    /// synchronizer.
    ResetToSend,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase() {
        assert_eq!(Phase::default(), Phase::ExpectingSend);
    }

    #[test]
    fn test_is_faulted() {
        assert!(Phase::Faulted.is_faulted());
        assert!(!Phase::ExpectingSend.is_faulted());
        assert!(!Phase::ExpectingReceive.is_faulted());
    }

    #[test]
    fn test_display() {
        assert_eq!(Phase::ExpectingReceive.to_string(), "expecting receive");
    }

    #[test]
    fn test_timeout_policy_serde() {
        let json = serde_json::to_string(&TimeoutPolicy::ResetToSend).unwrap();
        assert_eq!(json, "\"reset_to_send\"");

        let policy: TimeoutPolicy = serde_json::from_str("\"keep_expecting_receive\"").unwrap();
        assert_eq!(policy, TimeoutPolicy::KeepExpectingReceive);
    }
}
