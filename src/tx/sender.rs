//! Transaction broadcast and receipt resolution

use super::confirm::{CancelSignal, ConfirmationPoller, PollResult};
use super::types::{Receipt, SignedTransaction, TxOutcome};
use crate::chain::LedgerRpc;
use crate::error::{ClientError, ClientResult};

use ethers::types::H256;
use tokio::time::Instant;
use tracing::{info, warn};

/// Submits signed transactions and resolves them to receipts
#[derive(Debug, Clone, Default)]
pub struct TransactionSender {
    poller: ConfirmationPoller,
}

impl TransactionSender {
    /// Create a new transaction sender
    pub fn new(poller: ConfirmationPoller) -> Self {
        Self { poller }
    }

    pub fn poller(&self) -> &ConfirmationPoller {
        &self.poller
    }

    /// Broadcast a signed transaction. Submission is attempted exactly once.
    pub async fn broadcast(
        &self,
        rpc: &dyn LedgerRpc,
        signed: &SignedTransaction,
    ) -> ClientResult<H256> {
        let tx_hash = signed.hash();
        info!("Signed transaction hash: {:?}", tx_hash);

        let node_hash = match rpc.send_raw_transaction(signed.raw().clone()).await {
            Ok(hash) => hash,
            Err(e) => {
                crate::metrics::record_tx_rejected(signed.chain_id());
                return Err(match e {
                    ClientError::Broadcast { message, .. } => {
                        ClientError::Broadcast { tx_hash, message }
                    }
                    ClientError::Closed => ClientError::Closed,
                    other => ClientError::Broadcast {
                        tx_hash,
                        message: other.to_string(),
                    },
                });
            }
        };

        if node_hash != tx_hash {
            warn!(
                "Node reported hash {:?} for transaction {:?}; tracking the local hash",
                node_hash, tx_hash
            );
        }

        crate::metrics::record_tx_submitted(signed.chain_id());
        info!(
            "Transaction sent: {:?} (nonce {}, chain {})",
            tx_hash,
            signed.nonce(),
            signed.chain_id()
        );
        Ok(tx_hash)
    }

    /// Broadcast, wait for inclusion and return the receipt
    pub async fn send(
        &self,
        rpc: &dyn LedgerRpc,
        signed: &SignedTransaction,
        cancel: CancelSignal,
    ) -> ClientResult<Receipt> {
        self.broadcast(rpc, signed).await?;
        self.track(rpc, signed, cancel).await
    }

    /// Resolve an already broadcast transaction to its receipt
    pub async fn track(
        &self,
        rpc: &dyn LedgerRpc,
        signed: &SignedTransaction,
        cancel: CancelSignal,
    ) -> ClientResult<Receipt> {
        let started = Instant::now();
        let receipt = self.confirm(rpc, signed.hash(), cancel).await?;

        let chain_id = signed.chain_id();
        crate::metrics::record_tx_latency(chain_id, started.elapsed().as_secs_f64());
        match receipt.outcome {
            TxOutcome::Succeeded => crate::metrics::record_tx_confirmed(chain_id),
            TxOutcome::Failed => crate::metrics::record_tx_failed(chain_id),
        }
        Ok(receipt)
    }

    /// Poll until the transaction leaves the pool, then fetch its receipt.
    ///
    /// The receipt is fetched once even when polling ran out, since the
    /// transaction may have been mined after the last check.
    pub async fn confirm(
        &self,
        rpc: &dyn LedgerRpc,
        tx_hash: H256,
        cancel: CancelSignal,
    ) -> ClientResult<Receipt> {
        let poll = self.poller.wait(rpc, tx_hash, cancel).await?;

        let receipt = match rpc.transaction_receipt(tx_hash).await? {
            Some(receipt) => Receipt::from_rpc(receipt)?,
            None => {
                return Err(match poll {
                    PollResult::Included { .. } => ClientError::ReceiptNotFound { tx_hash },
                    PollResult::Exhausted { attempts } => {
                        ClientError::ConfirmationTimeout { tx_hash, attempts }
                    }
                });
            }
        };

        match receipt.outcome {
            TxOutcome::Succeeded => info!(
                "Transaction succeeded: {:?} (block {:?})",
                tx_hash, receipt.block_number
            ),
            TxOutcome::Failed => warn!(
                "Transaction failed: {:?} (block {:?})",
                tx_hash, receipt.block_number
            ),
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::chain::{MockLedgerRpc, TransactionLookup};
    use crate::tx::confirm::PollPolicy;
    use crate::tx::signer::sign_transaction;
    use crate::tx::types::UnsignedTransaction;
    use ethers::types::{Address, Bytes, Transaction, TransactionReceipt, U256, U64};
    use std::time::Duration;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn signed() -> SignedTransaction {
        let account = Account::from_private_key(TEST_KEY).unwrap();
        let unsigned = UnsignedTransaction {
            from: account.address(),
            nonce: 3,
            to: Some(Address::repeat_byte(0x42)),
            value: U256::zero(),
            gas_limit: U256::from(50_000),
            gas_price: U256::from(1_000),
            data: Bytes::from(vec![0xd0, 0xe3, 0x0d, 0xb0]),
        };
        sign_transaction(&account, unsigned, 31337).unwrap()
    }

    fn lookup(pending: bool) -> TransactionLookup {
        TransactionLookup::new(Transaction {
            block_number: if pending { None } else { Some(U64::from(8)) },
            ..Default::default()
        })
    }

    fn receipt(hash: H256, status: u64) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(U64::from(8)),
            status: Some(U64::from(status)),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_fetched_only_after_pending_resolves() {
        let tx = signed();
        let hash = tx.hash();
        let k: usize = 5;

        let mut rpc = MockLedgerRpc::new();
        let mut seq = mockall::Sequence::new();
        rpc.expect_send_raw_transaction()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(hash));
        rpc.expect_transaction_by_hash()
            .times(k)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(lookup(true))));
        rpc.expect_transaction_by_hash()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(lookup(false))));
        rpc.expect_transaction_receipt()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |h| Ok(Some(receipt(h, 1))));

        let receipt = TransactionSender::default()
            .send(&rpc, &tx, CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(receipt.transaction_hash, hash);
        assert_eq!(receipt.outcome, TxOutcome::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_fetched_once_after_exhaustion() {
        let tx = signed();
        let hash = tx.hash();

        let mut rpc = MockLedgerRpc::new();
        let mut seq = mockall::Sequence::new();
        rpc.expect_send_raw_transaction()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(hash));
        rpc.expect_transaction_by_hash()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(lookup(true))));
        rpc.expect_transaction_receipt()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |h| Ok(Some(receipt(h, 0))));

        let sender = TransactionSender::new(ConfirmationPoller::new(PollPolicy {
            max_attempts: 3,
            interval: Duration::from_millis(10),
            ..PollPolicy::default()
        }));
        let receipt = sender.send(&rpc, &tx, CancelSignal::never()).await.unwrap();

        assert_eq!(receipt.outcome, TxOutcome::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_receipt_after_exhaustion_times_out() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_transaction_by_hash()
            .times(2)
            .returning(|_| Ok(Some(lookup(true))));
        rpc.expect_transaction_receipt().times(1).returning(|_| Ok(None));

        let sender = TransactionSender::new(ConfirmationPoller::new(PollPolicy {
            max_attempts: 2,
            ..PollPolicy::default()
        }));
        let err = sender
            .confirm(&rpc, H256::repeat_byte(3), CancelSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::ConfirmationTimeout { attempts: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_receipt_after_inclusion_is_fatal() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_transaction_by_hash()
            .returning(|_| Ok(Some(lookup(false))));
        rpc.expect_transaction_receipt().returning(|_| Ok(None));

        let err = TransactionSender::default()
            .confirm(&rpc, H256::repeat_byte(3), CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ReceiptNotFound { .. }));
    }

    #[tokio::test]
    async fn test_unrecognized_status_surfaces() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_transaction_by_hash()
            .returning(|_| Ok(Some(lookup(false))));
        rpc.expect_transaction_receipt()
            .returning(|h| Ok(Some(receipt(h, 2))));

        let err = TransactionSender::default()
            .confirm(&rpc, H256::repeat_byte(3), CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnknownReceiptStatus { status: Some(2), .. }
        ));
    }

    #[tokio::test]
    async fn test_broadcast_rejection_skips_polling() {
        let tx = signed();
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_send_raw_transaction().times(1).returning(|_| {
            Err(ClientError::Broadcast {
                tx_hash: H256::zero(),
                message: "nonce too low".to_string(),
            })
        });
        rpc.expect_transaction_by_hash().never();
        rpc.expect_transaction_receipt().never();

        let err = TransactionSender::default()
            .send(&rpc, &tx, CancelSignal::never())
            .await
            .unwrap_err();

        match err {
            ClientError::Broadcast { tx_hash, message } => {
                assert_eq!(tx_hash, tx.hash());
                assert_eq!(message, "nonce too low");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
