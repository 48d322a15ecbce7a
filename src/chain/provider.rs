//! Chain provider with multi-RPC support and automatic failover

use super::{CallRequest, LedgerRpc, TransactionLookup};
use crate::config::RpcConfig;
use crate::error::{ClientError, ClientResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Endpoint URLs, index-aligned with `http_providers`
    urls: Vec<String>,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Per-request timeout
    request_timeout: Duration,
    closed: AtomicBool,
}

impl ChainProvider {
    /// Create a provider for a single endpoint
    pub fn connect(endpoint: &str) -> ClientResult<Self> {
        Self::new(&RpcConfig {
            urls: vec![endpoint.to_string()],
            request_timeout_secs: 30,
        })
    }

    /// Create a provider from configuration
    pub fn new(config: &RpcConfig) -> ClientResult<Self> {
        let mut urls = Vec::new();
        let mut http_providers = Vec::new();

        for url in &config.urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider.interval(Duration::from_millis(100)));
                    urls.push(url.clone());
                    debug!("Added HTTP provider: {}", url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(ClientError::Connection {
                endpoint: config.urls.join(","),
                message: "No valid RPC providers".to_string(),
            });
        }

        info!("Connected to {} RPC endpoint(s), primary {}", urls.len(), urls[0]);

        Ok(Self {
            urls,
            http_providers,
            current_provider: AtomicUsize::new(0),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            closed: AtomicBool::new(false),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// URL of the active provider
    pub fn endpoint(&self) -> &str {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.urls[idx % self.urls.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        if self.http_providers.len() > 1 {
            warn!("Failover to provider {} ({})", next, self.urls[next]);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> ClientResult<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    /// Run a read-only query, failing over across providers.
    ///
    /// An error response from the node is returned as `ClientError::Node`
    /// without failover; transport failures and timeouts rotate providers
    /// and end as `ClientError::Rpc`.
    async fn query<T, F, Fut>(&self, operation: &'static str, call: F) -> ClientResult<T>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.ensure_open()?;

        let mut last_error = String::from("no provider attempted");
        for _ in 0..self.http_providers.len() {
            match timeout(self.request_timeout, call(self.http().clone())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    if let Some(response) = RpcError::as_error_response(&e) {
                        debug!("{} rejected by {}: {}", operation, self.endpoint(), response);
                        return Err(ClientError::Node {
                            operation: operation.to_string(),
                            code: response.code,
                            message: response.message.clone(),
                        });
                    }
                    warn!("{} failed on {}: {}", operation, self.endpoint(), e);
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!("{} timed out on {}", operation, self.endpoint());
                    last_error = format!("timed out after {:?}", self.request_timeout);
                }
            }
            self.failover();
        }

        Err(ClientError::Rpc {
            operation: operation.to_string(),
            message: last_error,
        })
    }
}

/// Node refusals become `GasEstimation`; `Closed` and transport errors keep
/// their classification
fn gas_error(e: ClientError) -> ClientError {
    match e {
        ClientError::Node { message, .. } => ClientError::GasEstimation(message),
        other => other,
    }
}

fn number_id(number: u64) -> BlockId {
    BlockId::Number(BlockNumber::Number(U64::from(number)))
}

#[async_trait]
impl LedgerRpc for ChainProvider {
    async fn block_number(&self) -> ClientResult<u64> {
        let block = self
            .query("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await?;
        Ok(block.as_u64())
    }

    async fn block_by_number(&self, number: u64) -> ClientResult<Option<Block<Transaction>>> {
        self.query("eth_getBlockByNumber", |p| async move {
            p.get_block_with_txs(number_id(number)).await
        })
        .await
    }

    async fn block_by_hash(&self, hash: H256) -> ClientResult<Option<Block<Transaction>>> {
        self.query("eth_getBlockByHash", |p| async move {
            p.get_block_with_txs(BlockId::Hash(hash)).await
        })
        .await
    }

    async fn header_by_number(&self, number: u64) -> ClientResult<Option<Block<H256>>> {
        self.query("eth_getBlockByNumber", |p| async move {
            p.get_block(number_id(number)).await
        })
        .await
    }

    async fn header_by_hash(&self, hash: H256) -> ClientResult<Option<Block<H256>>> {
        self.query("eth_getBlockByHash", |p| async move {
            p.get_block(BlockId::Hash(hash)).await
        })
        .await
    }

    async fn pending_nonce(&self, address: Address) -> ClientResult<u64> {
        let nonce = self
            .query("eth_getTransactionCount", |p| async move {
                p.get_transaction_count(address, Some(BlockId::Number(BlockNumber::Pending)))
                    .await
            })
            .await
            .map_err(|e| match e {
                ClientError::Node { message, .. } => ClientError::Nonce {
                    address: format!("{:?}", address),
                    message,
                },
                other => other,
            })?;
        Ok(nonce.as_u64())
    }

    async fn gas_price(&self) -> ClientResult<U256> {
        self.query("eth_gasPrice", |p| async move { p.get_gas_price().await })
            .await
            .map_err(gas_error)
    }

    async fn estimate_gas(&self, call: CallRequest) -> ClientResult<U256> {
        let mut request = TransactionRequest::new()
            .from(call.from)
            .value(call.value)
            .data(call.data.clone());
        if let Some(to) = call.to {
            request = request.to(to);
        }
        let tx: TypedTransaction = request.into();

        self.query("eth_estimateGas", |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(&tx, None).await }
        })
        .await
        .map_err(gas_error)
    }

    async fn chain_id(&self) -> ClientResult<u64> {
        let chain_id = self
            .query("eth_chainId", |p| async move { p.get_chainid().await })
            .await?;
        Ok(chain_id.as_u64())
    }

    async fn balance(&self, address: Address) -> ClientResult<U256> {
        self.query("eth_getBalance", |p| async move {
            p.get_balance(address, None).await
        })
        .await
    }

    async fn transaction_by_hash(&self, hash: H256) -> ClientResult<Option<TransactionLookup>> {
        let tx = self
            .query("eth_getTransactionByHash", |p| async move {
                p.get_transaction(hash).await
            })
            .await?;
        Ok(tx.map(TransactionLookup::new))
    }

    async fn transaction_in_block(
        &self,
        block_hash: H256,
        index: u64,
    ) -> ClientResult<Option<Transaction>> {
        self.query("eth_getTransactionByBlockHashAndIndex", |p| async move {
            p.get_transaction_by_block_and_index(BlockId::Hash(block_hash), U64::from(index))
                .await
        })
        .await
    }

    async fn code_at(&self, address: Address) -> ClientResult<Bytes> {
        self.query("eth_getCode", |p| async move { p.get_code(address, None).await })
            .await
    }

    async fn transaction_receipt(&self, hash: H256) -> ClientResult<Option<TransactionReceipt>> {
        self.query("eth_getTransactionReceipt", |p| async move {
            p.get_transaction_receipt(hash).await
        })
        .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ClientResult<H256> {
        self.ensure_open()?;

        // Submissions go to the active provider once; no failover
        let local_hash = H256::from(ethers::utils::keccak256(&raw));
        let provider = self.http().clone();
        let result = timeout(self.request_timeout, async move {
            provider
                .send_raw_transaction(raw)
                .await
                .map(|pending| pending.tx_hash())
        })
        .await;

        match result {
            Ok(Ok(tx_hash)) => Ok(tx_hash),
            Ok(Err(e)) => Err(ClientError::Broadcast {
                tx_hash: local_hash,
                message: e.to_string(),
            }),
            Err(_) => Err(ClientError::Broadcast {
                tx_hash: local_hash,
                message: format!("send timed out after {:?}", self.request_timeout),
            }),
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Closed connection to {}", self.endpoint());
        }
    }
}
