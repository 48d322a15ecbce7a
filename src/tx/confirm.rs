//! Bounded, cancellable polling for transaction inclusion
//!
//! After broadcast the transaction is looked up by hash until the node no
//! longer reports it as pending. The wait is bounded by an attempt count
//! and an optional deadline, and can be cancelled from another task.

use crate::chain::LedgerRpc;
use crate::config::ConfirmationConfig;
use crate::error::{ClientError, ClientResult};

use ethers::types::H256;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Wait strategy between pending checks
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay after the first pending check
    pub interval: Duration,
    /// Total number of pending checks, including the first
    pub max_attempts: u32,
    /// Multiplier applied to the delay after every attempt
    pub backoff_factor: f64,
    /// Upper bound for the delay
    pub max_interval: Option<Duration>,
    /// Bound on the whole wait
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&ConfirmationConfig::default())
    }
}

impl From<&ConfirmationConfig> for PollPolicy {
    fn from(config: &ConfirmationConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_attempts.max(1),
            backoff_factor: config.backoff_factor.max(1.0),
            max_interval: config.max_interval_ms.map(Duration::from_millis),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Longest delay between checks when no `max_interval` is set
pub const MAX_POLL_DELAY: Duration = Duration::from_secs(3_600);

impl PollPolicy {
    /// Delay to wait after `attempt` (1-based) reported pending
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let ceiling = self.max_interval.unwrap_or(MAX_POLL_DELAY);
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);

        // Clamp in f64: the uncapped backoff overflows Duration quickly
        let secs = self.interval.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs.min(ceiling.as_secs_f64())).unwrap_or(ceiling)
    }
}

/// Handle used to cancel waits observing the paired `CancelSignal`
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Cancellation flag observed by waits
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// A linked handle and signal
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle(Arc::new(tx)), CancelSignal(rx))
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        CancelSignal(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is gone
    async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// How the pending-status polling ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// The node stopped reporting the transaction as pending
    Included { attempts: u32 },
    /// Attempts or deadline ran out while still pending
    Exhausted { attempts: u32 },
}

impl PollResult {
    pub fn attempts(&self) -> u32 {
        match self {
            PollResult::Included { attempts } | PollResult::Exhausted { attempts } => *attempts,
        }
    }
}

/// Polls a transaction's pending status under a `PollPolicy`
#[derive(Debug, Clone, Default)]
pub struct ConfirmationPoller {
    policy: PollPolicy,
}

impl ConfirmationPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Check the transaction until it is no longer pending or the policy
    /// runs out. Lookup errors and unknown transactions are fatal;
    /// exhaustion is reported, not raised.
    pub async fn wait(
        &self,
        rpc: &dyn LedgerRpc,
        tx_hash: H256,
        mut cancel: CancelSignal,
    ) -> ClientResult<PollResult> {
        let deadline = self.policy.timeout.map(|t| Instant::now() + t);
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(tx_hash));
            }

            attempts += 1;
            crate::metrics::record_poll_attempt();
            let lookup = rpc
                .transaction_by_hash(tx_hash)
                .await?
                .ok_or(ClientError::TransactionNotFound { tx_hash })?;

            if !lookup.is_pending {
                debug!("Transaction {:?} included after {} check(s)", tx_hash, attempts);
                return Ok(PollResult::Included { attempts });
            }

            if attempts >= self.policy.max_attempts {
                break;
            }

            let mut wake = Instant::now() + self.policy.delay_after(attempts);
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
                wake = wake.min(deadline);
            }

            debug!(
                "Transaction {:?} pending (check {}/{}), waiting",
                tx_hash, attempts, self.policy.max_attempts
            );
            tokio::select! {
                _ = sleep_until(wake) => {}
                _ = cancel.cancelled() => return Err(cancelled(tx_hash)),
            }
        }

        warn!(
            "Transaction {:?} still pending after {} check(s)",
            tx_hash, attempts
        );
        Ok(PollResult::Exhausted { attempts })
    }
}

fn cancelled(tx_hash: H256) -> ClientError {
    ClientError::Cancelled {
        operation: format!("confirmation of {:?}", tx_hash),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MockLedgerRpc, TransactionLookup};
    use ethers::types::{Transaction, U64};

    fn lookup(pending: bool) -> TransactionLookup {
        TransactionLookup::new(Transaction {
            block_number: if pending { None } else { Some(U64::from(1)) },
            ..Default::default()
        })
    }

    /// A ledger that reports pending for the first `pending_checks` lookups
    fn ledger(pending_checks: usize, expected_checks: usize) -> MockLedgerRpc {
        let mut rpc = MockLedgerRpc::new();
        let mut seq = mockall::Sequence::new();
        if pending_checks > 0 {
            rpc.expect_transaction_by_hash()
                .times(pending_checks.min(expected_checks))
                .in_sequence(&mut seq)
                .returning(|_| Ok(Some(lookup(true))));
        }
        if expected_checks > pending_checks {
            rpc.expect_transaction_by_hash()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(Some(lookup(false))));
        }
        rpc
    }

    #[test]
    fn test_default_policy_matches_fixed_schedule() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 31);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(30), Duration::from_secs(1));
        assert!(policy.timeout.is_none());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = PollPolicy {
            interval: Duration::from_millis(100),
            max_attempts: 10,
            backoff_factor: 2.0,
            max_interval: Some(Duration::from_millis(500)),
            timeout: None,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_never_overflows() {
        let capped = PollPolicy {
            interval: Duration::from_secs(1),
            max_attempts: 100,
            backoff_factor: 2.0,
            max_interval: Some(Duration::from_secs(5)),
            timeout: None,
        };
        assert_eq!(capped.delay_after(99), Duration::from_secs(5));
        assert_eq!(capped.delay_after(u32::MAX), Duration::from_secs(5));

        let uncapped = PollPolicy {
            max_interval: None,
            ..capped
        };
        assert_eq!(uncapped.delay_after(2_000), MAX_POLL_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_capped_backoff_exhausts() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_transaction_by_hash()
            .times(100)
            .returning(|_| Ok(Some(lookup(true))));
        let poller = ConfirmationPoller::new(PollPolicy {
            interval: Duration::from_secs(1),
            max_attempts: 100,
            backoff_factor: 2.0,
            max_interval: Some(Duration::from_secs(5)),
            timeout: None,
        });

        let started = Instant::now();
        let result = poller
            .wait(&rpc, H256::zero(), CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(result, PollResult::Exhausted { attempts: 100 });
        // 1 + 2 + 4, then 96 waits at the cap
        assert_eq!(started.elapsed(), Duration::from_secs(7 + 96 * 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_k_pending_checks_then_included() {
        let rpc = ledger(3, 4);
        let poller = ConfirmationPoller::default();

        let started = Instant::now();
        let result = poller
            .wait(&rpc, H256::repeat_byte(1), CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(result, PollResult::Included { attempts: 4 });
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediately_included() {
        let rpc = ledger(0, 1);
        let result = ConfirmationPoller::default()
            .wait(&rpc, H256::zero(), CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(result, PollResult::Included { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_at_attempt_bound() {
        let rpc = ledger(100, 31);
        let result = ConfirmationPoller::default()
            .wait(&rpc, H256::zero(), CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(result, PollResult::Exhausted { attempts: 31 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_wait() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_transaction_by_hash()
            .returning(|_| Ok(Some(lookup(true))));
        let poller = ConfirmationPoller::new(PollPolicy {
            timeout: Some(Duration::from_millis(2_500)),
            ..PollPolicy::default()
        });

        let started = Instant::now();
        let result = poller
            .wait(&rpc, H256::zero(), CancelSignal::never())
            .await
            .unwrap();

        // checks at 0s, 1s, 2s and 2.5s
        assert_eq!(result, PollResult::Exhausted { attempts: 4 });
        assert_eq!(started.elapsed(), Duration::from_millis(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_transaction_by_hash()
            .times(1)
            .returning(|_| Ok(Some(lookup(true))));
        let (handle, signal) = CancelSignal::pair();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            handle.cancel();
        });
        let result = ConfirmationPoller::default()
            .wait(&rpc, H256::zero(), signal)
            .await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(ClientError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_unknown_transaction_is_fatal() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_transaction_by_hash().times(1).returning(|_| Ok(None));
        let result = ConfirmationPoller::default()
            .wait(&rpc, H256::zero(), CancelSignal::never())
            .await;
        assert!(matches!(result, Err(ClientError::TransactionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_lookup_error_is_fatal() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_transaction_by_hash().times(1).returning(|_| {
            Err(ClientError::Rpc {
                operation: "eth_getTransactionByHash".to_string(),
                message: "bad gateway".to_string(),
            })
        });
        let result = ConfirmationPoller::default()
            .wait(&rpc, H256::zero(), CancelSignal::never())
            .await;
        assert!(matches!(result, Err(ClientError::Rpc { .. })));
    }
}
