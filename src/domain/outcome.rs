use super::status::ProviderResponse;
use std::time::Duration;

/// Lifecycle of a single collection as seen by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Pending,
    Succeeded,
    Failed,
    RetryExceeded,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Pending)
    }
}

/// Error fields reported with a failed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FailureDetail {
    pub code: Option<String>,
    pub description: Option<String>,
    pub information: Option<String>,
}

/// What a single provider response says about a transaction, before the retry
/// schedule is taken into account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Settled { external_ref: Option<String> },
    Failed(FailureDetail),
    Pending { last_response: Option<ProviderResponse> },
}

/// The outcome handed to the correlation gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pending {
        attempt_count: u32,
        next_delay: Duration,
    },
    Succeeded {
        external_ref: Option<String>,
    },
    Failed(FailureDetail),
    RetryExceeded {
        attempt_count: u32,
    },
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_) | Outcome::RetryExceeded { .. })
    }

    pub fn retry_exceeded(&self) -> bool {
        matches!(self, Outcome::RetryExceeded { .. })
    }

    pub fn state(&self) -> TransactionState {
        match self {
            Outcome::Pending { .. } => TransactionState::Pending,
            Outcome::Succeeded { .. } => TransactionState::Succeeded,
            Outcome::Failed(_) => TransactionState::Failed,
            Outcome::RetryExceeded { .. } => TransactionState::RetryExceeded,
        }
    }
}

/// Where a signal came from. Poll signals carry the orchestrator handle needed to
/// reschedule and the raw provider answer; callback signals carry the raw payload
/// for the completion message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOrigin {
    Poll {
        element_instance_key: String,
        attempt: u32,
        last_response: Option<ProviderResponse>,
    },
    Callback {
        payload: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeSignal {
    pub transaction_id: String,
    pub origin: SignalOrigin,
    pub outcome: Outcome,
}

impl OutcomeSignal {
    pub fn from_poll(
        transaction_id: impl Into<String>,
        element_instance_key: impl Into<String>,
        attempt: u32,
        last_response: Option<ProviderResponse>,
        outcome: Outcome,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            origin: SignalOrigin::Poll {
                element_instance_key: element_instance_key.into(),
                attempt,
                last_response,
            },
            outcome,
        }
    }

    pub fn from_callback(
        transaction_id: impl Into<String>,
        payload: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            origin: SignalOrigin::Callback {
                payload: payload.into(),
            },
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_flags() {
        let exceeded = Outcome::RetryExceeded { attempt_count: 6 };
        assert!(exceeded.is_failed());
        assert!(exceeded.retry_exceeded());
        assert!(!exceeded.is_pending());
        assert_eq!(exceeded.state(), TransactionState::RetryExceeded);

        let pending = Outcome::Pending {
            attempt_count: 1,
            next_delay: Duration::from_secs(64),
        };
        assert!(pending.is_pending());
        assert!(!pending.is_failed());
        assert!(!pending.state().is_terminal());

        let settled = Outcome::Succeeded { external_ref: None };
        assert!(!settled.is_failed());
        assert!(settled.state().is_terminal());
    }
}
