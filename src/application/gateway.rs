use crate::domain::outcome::{Outcome, OutcomeSignal, SignalOrigin, TransactionState};
use crate::domain::ports::{CompletionMessage, OrchestratorRef};
use crate::domain::variables::{CompletionVariables, PendingVariables, TRANSFER_MESSAGE};
use crate::error::{ConnectorError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What the gateway knows about an in-flight transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub state: TransactionState,
    pub attempt_count: u32,
    pub backoff: Option<Duration>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    fn new() -> Self {
        Self {
            state: TransactionState::Pending,
            attempt_count: 0,
            backoff: None,
            updated_at: Utc::now(),
        }
    }
}

/// How a report was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportReceipt {
    /// Retry counter and timer were updated on the waiting task.
    Rescheduled {
        attempt_count: u32,
        next_delay: Duration,
    },
    /// The terminal message was published and acknowledged.
    Published(TransactionState),
    /// The transaction was already terminal; nothing was sent.
    Duplicate(TransactionState),
    /// Nobody is waiting on this correlation key.
    UnknownCorrelation {
        variables: Option<CompletionVariables>,
    },
    /// A pending signal that cannot reschedule anything.
    Ignored,
}

/// Delivers outcomes to the orchestrator, at most one terminal message per
/// transaction id.
///
/// Each id owns a mutex; checking for a terminal state, publishing, and
/// recording the new state all happen under it, so a poll and a callback for the
/// same id cannot both publish.
pub struct CorrelationGateway {
    orchestrator: OrchestratorRef,
    message_ttl: Duration,
    records: DashMap<String, Arc<Mutex<TransactionRecord>>>,
}

impl CorrelationGateway {
    pub fn new(orchestrator: OrchestratorRef, message_ttl: Duration) -> Self {
        Self {
            orchestrator,
            message_ttl,
            records: DashMap::new(),
        }
    }

    /// Registers `transaction_id` if it is not known yet.
    pub fn track(&self, transaction_id: &str) -> Arc<Mutex<TransactionRecord>> {
        self.slot(transaction_id).0
    }

    /// The record for `transaction_id`, and whether this call created it.
    fn slot(&self, transaction_id: &str) -> (Arc<Mutex<TransactionRecord>>, bool) {
        match self.records.entry(transaction_id.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let slot = Arc::new(Mutex::new(TransactionRecord::new()));
                entry.insert(slot.clone());
                (slot, true)
            }
        }
    }

    pub async fn record(&self, transaction_id: &str) -> Option<TransactionRecord> {
        let slot = self.records.get(transaction_id)?.value().clone();
        let record = slot.lock().await;
        Some(record.clone())
    }

    pub async fn state(&self, transaction_id: &str) -> Option<TransactionState> {
        self.record(transaction_id).await.map(|r| r.state)
    }

    /// Marks a transaction terminal without publishing, for outcomes the
    /// orchestrator already learns through job completion.
    ///
    /// Returns `false` when the transaction was already terminal.
    pub async fn close(&self, transaction_id: &str, state: TransactionState) -> bool {
        let slot = self.track(transaction_id);
        let mut record = slot.lock().await;
        if record.state.is_terminal() {
            return false;
        }
        record.state = state;
        record.updated_at = Utc::now();
        true
    }

    #[tracing::instrument(skip(self, signal), fields(transaction_id = %signal.transaction_id))]
    pub async fn report(&self, signal: OutcomeSignal) -> Result<ReportReceipt> {
        let (slot, created) = self.slot(&signal.transaction_id);
        let mut record = slot.lock().await;
        if record.state.is_terminal() {
            info!(state = ?record.state, "Transaction already reported, dropping duplicate signal");
            return Ok(ReportReceipt::Duplicate(record.state));
        }

        match &signal.outcome {
            Outcome::Pending {
                attempt_count,
                next_delay,
            } => {
                let SignalOrigin::Poll {
                    element_instance_key,
                    last_response,
                    ..
                } = &signal.origin
                else {
                    debug!("Pending signal without a poll handle, nothing to reschedule");
                    return Ok(ReportReceipt::Ignored);
                };

                let variables =
                    PendingVariables::new(*attempt_count, *next_delay, last_response.as_ref());
                info!(
                    attempt = attempt_count,
                    timer = %variables.timer,
                    "Updating retry count and timer"
                );
                self.orchestrator
                    .set_variables(element_instance_key, &variables)
                    .await?;

                record.attempt_count = *attempt_count;
                record.backoff = Some(*next_delay);
                record.updated_at = Utc::now();
                Ok(ReportReceipt::Rescheduled {
                    attempt_count: *attempt_count,
                    next_delay: *next_delay,
                })
            }
            outcome => {
                let Some(variables) = CompletionVariables::from_signal(&signal, Utc::now()) else {
                    return Ok(ReportReceipt::Ignored);
                };
                let message = CompletionMessage {
                    name: TRANSFER_MESSAGE.to_string(),
                    correlation_key: signal.transaction_id.clone(),
                    time_to_live: self.message_ttl,
                    variables,
                };

                match self.orchestrator.publish_message(&message).await {
                    Ok(()) => {
                        let state = outcome.state();
                        info!(?state, "Published transaction outcome");
                        record.state = state;
                        if let SignalOrigin::Poll { attempt, .. } = &signal.origin {
                            record.attempt_count = *attempt;
                        }
                        record.updated_at = Utc::now();
                        Ok(ReportReceipt::Published(state))
                    }
                    Err(ConnectorError::UnknownCorrelation(key)) => {
                        warn!(correlation_key = %key, "Orchestrator has no subscription for this key");
                        // A callback for a key nobody waits on leaves no record behind.
                        if created && matches!(signal.origin, SignalOrigin::Callback { .. }) {
                            self.records
                                .remove_if(&signal.transaction_id, |_, v| Arc::ptr_eq(v, &slot));
                        }
                        Ok(ReportReceipt::UnknownCorrelation {
                            variables: Some(message.variables),
                        })
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Drops terminal records last touched before `now - retention`. Records that
    /// are currently locked are kept.
    pub fn prune(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(retention)
            .map(|r| now - r)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let before = self.records.len();
        self.records.retain(|_, slot| match slot.try_lock() {
            Ok(record) => !(record.state.is_terminal() && record.updated_at < cutoff),
            Err(_) => true,
        });
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::FailureDetail;
    use crate::domain::status::ProviderResponse;
    use crate::infrastructure::in_memory::InMemoryOrchestrator;

    fn gateway() -> (Arc<InMemoryOrchestrator>, CorrelationGateway) {
        let orchestrator = Arc::new(InMemoryOrchestrator::new());
        let gateway = CorrelationGateway::new(orchestrator.clone(), Duration::from_millis(300));
        (orchestrator, gateway)
    }

    fn settled_poll(id: &str, attempt: u32) -> OutcomeSignal {
        OutcomeSignal::from_poll(
            id,
            "100",
            attempt,
            Some(ProviderResponse::new(200, "ts-body")),
            Outcome::Succeeded {
                external_ref: Some("MP1".to_string()),
            },
        )
    }

    #[tokio::test]
    async fn test_pending_updates_variables_without_publishing() {
        let (orchestrator, gateway) = gateway();
        let signal = OutcomeSignal::from_poll(
            "tx-1",
            "100",
            1,
            Some(ProviderResponse::new(200, "tip-body")),
            Outcome::Pending {
                attempt_count: 1,
                next_delay: Duration::from_secs(64),
            },
        );

        let receipt = gateway.report(signal).await.unwrap();
        assert_eq!(
            receipt,
            ReportReceipt::Rescheduled {
                attempt_count: 1,
                next_delay: Duration::from_secs(64)
            }
        );
        assert!(orchestrator.published().is_empty());

        let updates = orchestrator.variable_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "100");
        assert_eq!(updates[0].1.timer, "PT64S");

        let record = gateway.record("tx-1").await.unwrap();
        assert_eq!(record.state, TransactionState::Pending);
        assert_eq!(record.backoff, Some(Duration::from_secs(64)));
    }

    #[tokio::test]
    async fn test_terminal_published_once() {
        let (orchestrator, gateway) = gateway();

        let first = gateway.report(settled_poll("tx-1", 2)).await.unwrap();
        let second = gateway.report(settled_poll("tx-1", 3)).await.unwrap();

        assert_eq!(first, ReportReceipt::Published(TransactionState::Succeeded));
        assert_eq!(second, ReportReceipt::Duplicate(TransactionState::Succeeded));

        let published = orchestrator.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].correlation_key, "tx-1");
        assert_eq!(published[0].name, TRANSFER_MESSAGE);
        assert_eq!(published[0].time_to_live, Duration::from_millis(300));
        assert_eq!(published[0].variables.external_id.as_deref(), Some("MP1"));
    }

    #[tokio::test]
    async fn test_callback_without_local_record_is_published() {
        let (orchestrator, gateway) = gateway();
        let signal = OutcomeSignal::from_callback(
            "tx-2",
            "{}",
            Outcome::Failed(FailureDetail::default()),
        );

        let receipt = gateway.report(signal).await.unwrap();
        assert_eq!(receipt, ReportReceipt::Published(TransactionState::Failed));
        assert_eq!(orchestrator.published_for("tx-2").len(), 1);
        assert_eq!(gateway.state("tx-2").await, Some(TransactionState::Failed));
    }

    #[tokio::test]
    async fn test_callback_for_unknown_key_is_diagnostic() {
        let (orchestrator, gateway) = gateway();
        orchestrator.reject_correlation_key("ghost");
        let signal = OutcomeSignal::from_callback(
            "ghost",
            "{}",
            Outcome::Failed(FailureDetail::default()),
        );

        let receipt = gateway.report(signal).await.unwrap();
        assert!(matches!(
            receipt,
            ReportReceipt::UnknownCorrelation { variables: Some(_) }
        ));
        assert!(orchestrator.published().is_empty());
        assert!(gateway.is_empty());
    }

    #[tokio::test]
    async fn test_orchestrator_rejecting_key_leaves_record_pending() {
        let (orchestrator, gateway) = gateway();
        orchestrator.reject_correlation_key("tx-1");

        let receipt = gateway.report(settled_poll("tx-1", 1)).await.unwrap();
        assert!(matches!(receipt, ReportReceipt::UnknownCorrelation { .. }));
        assert_eq!(gateway.state("tx-1").await, Some(TransactionState::Pending));
    }

    #[tokio::test]
    async fn test_failed_publish_can_be_retried() {
        let (orchestrator, gateway) = gateway();
        orchestrator.fail_next_publish();

        assert!(gateway.report(settled_poll("tx-1", 1)).await.is_err());
        assert_eq!(gateway.state("tx-1").await, Some(TransactionState::Pending));

        let receipt = gateway.report(settled_poll("tx-1", 2)).await.unwrap();
        assert_eq!(receipt, ReportReceipt::Published(TransactionState::Succeeded));
        assert_eq!(orchestrator.published().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_transaction_rejects_later_signals() {
        let (orchestrator, gateway) = gateway();
        assert!(gateway.close("tx-1", TransactionState::Failed).await);
        assert!(!gateway.close("tx-1", TransactionState::Succeeded).await);

        let receipt = gateway.report(settled_poll("tx-1", 1)).await.unwrap();
        assert_eq!(receipt, ReportReceipt::Duplicate(TransactionState::Failed));
        assert!(orchestrator.published().is_empty());
    }

    #[tokio::test]
    async fn test_prune_drops_old_terminal_records() {
        let (_orchestrator, gateway) = gateway();
        gateway.track("open");
        gateway.report(settled_poll("done", 1)).await.unwrap();

        let pruned_now = gateway.prune(Utc::now(), Duration::from_secs(3600));
        assert_eq!(pruned_now, 0);

        let later = Utc::now() + chrono::Duration::hours(2);
        assert_eq!(gateway.prune(later, Duration::from_secs(3600)), 1);
        assert_eq!(gateway.len(), 1);
        assert!(gateway.record("open").await.is_some());
    }
}
