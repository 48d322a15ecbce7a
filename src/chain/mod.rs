//! Chain module - the ledger RPC surface the transaction pipeline talks to
//!
//! This module provides:
//! - The `LedgerRpc` trait, one method per JSON-RPC query the client needs
//! - `ChainProvider`, the HTTP implementation with read failover
//! - Parsing of address and hash strings supplied by callers

pub mod provider;

pub use provider::ChainProvider;

use crate::error::{ClientError, ClientResult};

use async_trait::async_trait;
use ethers::types::{Address, Block, Bytes, Transaction, TransactionReceipt, H256, U256};

/// A transaction as returned by `eth_getTransactionByHash`
#[derive(Debug, Clone, Default)]
pub struct TransactionLookup {
    pub transaction: Transaction,
    /// True while the transaction has not been included in a block
    pub is_pending: bool,
}

impl TransactionLookup {
    pub fn new(transaction: Transaction) -> Self {
        let is_pending = transaction.block_number.is_none();
        Self {
            transaction,
            is_pending,
        }
    }
}

/// Simulated call used for gas estimation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    /// `None` simulates a contract creation
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
}

/// Remote ledger queries and submission.
///
/// Every method is a single round trip; implementations may fail over
/// between endpoints but never retry a submission.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Current block height
    async fn block_number(&self) -> ClientResult<u64>;

    /// Block with full transactions
    async fn block_by_number(&self, number: u64) -> ClientResult<Option<Block<Transaction>>>;

    async fn block_by_hash(&self, hash: H256) -> ClientResult<Option<Block<Transaction>>>;

    /// Block header with transaction hashes only
    async fn header_by_number(&self, number: u64) -> ClientResult<Option<Block<H256>>>;

    async fn header_by_hash(&self, hash: H256) -> ClientResult<Option<Block<H256>>>;

    /// Next nonce for the account, counting pool transactions
    async fn pending_nonce(&self, address: Address) -> ClientResult<u64>;

    async fn gas_price(&self) -> ClientResult<U256>;

    async fn estimate_gas(&self, call: CallRequest) -> ClientResult<U256>;

    async fn chain_id(&self) -> ClientResult<u64>;

    /// Balance at the latest block
    async fn balance(&self, address: Address) -> ClientResult<U256>;

    async fn transaction_by_hash(&self, hash: H256) -> ClientResult<Option<TransactionLookup>>;

    async fn transaction_in_block(
        &self,
        block_hash: H256,
        index: u64,
    ) -> ClientResult<Option<Transaction>>;

    /// Deployed byte code at the latest block
    async fn code_at(&self, address: Address) -> ClientResult<Bytes>;

    async fn transaction_receipt(&self, hash: H256) -> ClientResult<Option<TransactionReceipt>>;

    /// Submit RLP-encoded signed transaction, returning the hash the node reports
    async fn send_raw_transaction(&self, raw: Bytes) -> ClientResult<H256>;

    /// Release the connection; later calls fail with `ClientError::Closed`
    fn close(&self);
}

/// Parse a hex address, with or without `0x`
pub fn parse_address(input: &str) -> ClientResult<Address> {
    input
        .trim()
        .parse::<Address>()
        .map_err(|e| ClientError::InvalidAddress {
            input: input.to_string(),
            message: e.to_string(),
        })
}

/// Parse a 32-byte hex transaction or block hash
pub fn parse_hash(input: &str) -> ClientResult<H256> {
    input
        .trim()
        .parse::<H256>()
        .map_err(|e| ClientError::InvalidHash {
            input: input.to_string(),
            message: e.to_string(),
        })
}
