//! Error types for the ledger client

use ethers::types::H256;
use thiserror::Error;

/// Main error type for the ledger client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error for endpoint {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid address '{input}': {message}")]
    InvalidAddress { input: String, message: String },

    #[error("Invalid transaction hash '{input}': {message}")]
    InvalidHash { input: String, message: String },

    #[error("RPC call {operation} failed: {message}")]
    Rpc { operation: String, message: String },

    #[error("Node rejected {operation} (code {code}): {message}")]
    Node {
        operation: String,
        code: i64,
        message: String,
    },

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Nonce error for account {address}: {message}")]
    Nonce { address: String, message: String },

    #[error("ABI encoding error: {0}")]
    Abi(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Broadcast of transaction {tx_hash:?} rejected: {message}")]
    Broadcast { tx_hash: H256, message: String },

    #[error("Transaction {tx_hash:?} not found")]
    TransactionNotFound { tx_hash: H256 },

    #[error("Receipt for transaction {tx_hash:?} not found")]
    ReceiptNotFound { tx_hash: H256 },

    #[error("Transaction {tx_hash:?} still pending after {attempts} checks, no receipt")]
    ConfirmationTimeout { tx_hash: H256, attempts: u32 },

    #[error("Unrecognized receipt status {status:?} for transaction {tx_hash:?}")]
    UnknownReceiptStatus { tx_hash: H256, status: Option<u64> },

    #[error("Waiting for {operation} was cancelled")]
    Cancelled { operation: String },

    #[error("Connection is closed")]
    Closed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Connection { .. }
                | ClientError::Rpc { .. }
                | ClientError::ConfirmationTimeout { .. }
        )
    }

    /// Check if the error happened after the ledger accepted the transaction
    pub fn is_post_broadcast(&self) -> bool {
        matches!(
            self,
            ClientError::TransactionNotFound { .. }
                | ClientError::ReceiptNotFound { .. }
                | ClientError::ConfirmationTimeout { .. }
                | ClientError::UnknownReceiptStatus { .. }
                | ClientError::Cancelled { .. }
        )
    }
}

/// Result type for ledger client operations
pub type ClientResult<T> = Result<T, ClientError>;
