//! Construction of unsigned transactions from caller intent

use super::gas::GasEstimator;
use super::nonce::NonceManager;
use super::types::UnsignedTransaction;
use crate::chain::{CallRequest, LedgerRpc};
use crate::error::ClientResult;

use ethers::types::{Address, Bytes, U256};
use std::sync::Arc;
use tracing::debug;

/// Assembles nonce, gas price and gas limit around a call
pub struct TransactionBuilder {
    nonce_manager: Arc<NonceManager>,
    gas_estimator: GasEstimator,
}

impl TransactionBuilder {
    pub fn new(nonce_manager: Arc<NonceManager>, gas_estimator: GasEstimator) -> Self {
        Self {
            nonce_manager,
            gas_estimator,
        }
    }

    pub fn nonce_manager(&self) -> &Arc<NonceManager> {
        &self.nonce_manager
    }

    /// Build a transaction from the managed account.
    ///
    /// Fails without side effects if any query fails: an allocated nonce is
    /// released before the error is returned.
    pub async fn build(
        &self,
        rpc: &dyn LedgerRpc,
        to: Option<Address>,
        data: Bytes,
        value: U256,
    ) -> ClientResult<UnsignedTransaction> {
        let from = self.nonce_manager.address();
        let nonce = self.nonce_manager.allocate(rpc).await?;

        let call = CallRequest {
            from,
            to,
            data: data.clone(),
            value,
        };
        let gas = async {
            let gas_price = self.gas_estimator.gas_price(rpc).await?;
            let gas_limit = self.gas_estimator.gas_limit(rpc, call).await?;
            ClientResult::Ok((gas_price, gas_limit))
        };

        let (gas_price, gas_limit) = match gas.await {
            Ok(gas) => gas,
            Err(e) => {
                self.nonce_manager.release(nonce).await;
                return Err(e);
            }
        };

        let tx = UnsignedTransaction {
            from,
            nonce,
            to,
            value,
            gas_limit,
            gas_price,
            data,
        };
        debug!(
            "Built transaction nonce {} to {:?}: value {}, gas {} @ {}",
            nonce, to, value, gas_limit, gas_price
        );
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockLedgerRpc;
    use crate::error::ClientError;

    fn builder(address: Address) -> TransactionBuilder {
        TransactionBuilder::new(Arc::new(NonceManager::new(address)), GasEstimator::default())
    }

    #[tokio::test]
    async fn test_build_populates_all_fields() {
        let from = Address::repeat_byte(0xaa);
        let to = Address::repeat_byte(0xbb);

        let mut rpc = MockLedgerRpc::new();
        rpc.expect_pending_nonce()
            .withf(move |addr| *addr == from)
            .returning(|_| Ok(4));
        rpc.expect_gas_price().returning(|| Ok(U256::from(7)));
        rpc.expect_estimate_gas()
            .withf(move |call| {
                call.from == from && call.to == Some(to) && call.value == U256::from(100)
            })
            .returning(|_| Ok(U256::from(30_000)));

        let tx = builder(from)
            .build(&rpc, Some(to), Bytes::from(vec![1, 2, 3, 4]), U256::from(100))
            .await
            .unwrap();

        assert_eq!(tx.from, from);
        assert_eq!(tx.nonce, 4);
        assert_eq!(tx.to, Some(to));
        assert_eq!(tx.gas_price, U256::from(7));
        assert_eq!(tx.gas_limit, U256::from(30_000));
        assert_eq!(tx.data.to_vec(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failed_estimate_releases_nonce() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_pending_nonce().returning(|_| Ok(0));
        rpc.expect_gas_price().returning(|| Ok(U256::one()));
        let mut seq = mockall::Sequence::new();
        rpc.expect_estimate_gas()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ClientError::GasEstimation("reverted".to_string())));
        rpc.expect_estimate_gas()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(U256::from(21_000)));

        let builder = builder(Address::zero());
        let err = builder
            .build(&rpc, Some(Address::zero()), Bytes::default(), U256::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::GasEstimation(_)));

        let tx = builder
            .build(&rpc, Some(Address::zero()), Bytes::default(), U256::zero())
            .await
            .unwrap();
        assert_eq!(tx.nonce, 0);
    }

    #[tokio::test]
    async fn test_nonce_failure_is_hard_error() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_pending_nonce().returning(|_| {
            Err(ClientError::Rpc {
                operation: "eth_getTransactionCount".to_string(),
                message: "connection refused".to_string(),
            })
        });
        rpc.expect_gas_price().never();
        rpc.expect_estimate_gas().never();

        let result = builder(Address::zero())
            .build(&rpc, None, Bytes::default(), U256::zero())
            .await;
        assert!(matches!(result, Err(ClientError::Rpc { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_builds_get_distinct_nonces() {
        let mut rpc = MockLedgerRpc::new();
        // the ledger keeps reporting the same pending nonce
        rpc.expect_pending_nonce().returning(|_| Ok(11));
        rpc.expect_gas_price().returning(|| Ok(U256::one()));
        rpc.expect_estimate_gas().returning(|_| Ok(U256::from(21_000)));

        let builder = builder(Address::zero());
        let to = Some(Address::repeat_byte(2));
        let (a, b) = tokio::join!(
            builder.build(&rpc, to, Bytes::default(), U256::zero()),
            builder.build(&rpc, to, Bytes::default(), U256::zero()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.nonce, b.nonce);
        let mut nonces = vec![a.nonce, b.nonce];
        nonces.sort_unstable();
        assert_eq!(nonces, vec![11, 12]);
    }
}
