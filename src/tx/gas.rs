//! Gas price and gas limit estimation

use crate::chain::{CallRequest, LedgerRpc};
use crate::config::GasConfig;
use crate::error::ClientResult;

use ethers::types::U256;
use tracing::debug;

/// Gas estimator for legacy transactions
#[derive(Debug, Clone, Default)]
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(config: &GasConfig) -> Self {
        Self {
            gas_limit_buffer_percent: config.limit_buffer_percent,
            gas_price_buffer_percent: config.price_buffer_percent,
        }
    }

    /// Network-suggested gas price plus the configured buffer
    pub async fn gas_price(&self, rpc: &dyn LedgerRpc) -> ClientResult<U256> {
        let suggested = rpc.gas_price().await?;
        let price = with_buffer(suggested, self.gas_price_buffer_percent);
        debug!("Gas price: suggested {}, using {}", suggested, price);
        Ok(price)
    }

    /// Simulated gas usage plus the configured buffer
    pub async fn gas_limit(&self, rpc: &dyn LedgerRpc, call: CallRequest) -> ClientResult<U256> {
        let estimated = rpc.estimate_gas(call).await?;
        let limit = with_buffer(estimated, self.gas_limit_buffer_percent);
        debug!("Gas limit: estimated {}, using {}", estimated, limit);
        Ok(limit)
    }
}

fn with_buffer(amount: U256, percent: u64) -> U256 {
    amount + amount * percent / 100
}
