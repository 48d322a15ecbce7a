//! Transaction values flowing through the pipeline

use crate::error::{ClientError, ClientResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, NameOrAddress, Signature, TransactionReceipt, TransactionRequest, H256, U256,
    U64,
};
use serde::Serialize;

/// Fully parameterized legacy transaction, ready for signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsignedTransaction {
    pub from: Address,
    pub nonce: u64,
    /// `None` for contract creation
    pub to: Option<Address>,
    pub value: U256,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub data: Bytes,
}

impl UnsignedTransaction {
    /// Upper bound on the fee in wei
    pub fn max_fee(&self) -> U256 {
        self.gas_limit.saturating_mul(self.gas_price)
    }

    /// Legacy typed transaction bound to `chain_id`
    pub fn to_typed(&self, chain_id: u64) -> TypedTransaction {
        let mut request = TransactionRequest::new()
            .from(self.from)
            .nonce(self.nonce)
            .value(self.value)
            .gas(self.gas_limit)
            .gas_price(self.gas_price)
            .data(self.data.clone())
            .chain_id(chain_id);
        if let Some(to) = self.to {
            request = request.to(NameOrAddress::Address(to));
        }
        TypedTransaction::Legacy(request)
    }
}

/// A transaction signed for one chain id. Fields are read-only.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    unsigned: UnsignedTransaction,
    chain_id: u64,
    signature: Signature,
    raw: Bytes,
    hash: H256,
}

impl SignedTransaction {
    pub(crate) fn new(
        unsigned: UnsignedTransaction,
        chain_id: u64,
        signature: Signature,
        raw: Bytes,
        hash: H256,
    ) -> Self {
        Self {
            unsigned,
            chain_id,
            signature,
            raw,
            hash,
        }
    }

    pub fn unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// RLP encoding submitted with `eth_sendRawTransaction`
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn hash(&self) -> H256 {
        self.hash
    }

    pub fn nonce(&self) -> u64 {
        self.unsigned.nonce
    }
}

/// Execution result recorded in a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxOutcome {
    Succeeded,
    Failed,
}

impl TxOutcome {
    /// Map a receipt status code; `None` for anything but 0 and 1
    pub fn from_status(status: u64) -> Option<Self> {
        match status {
            0 => Some(TxOutcome::Failed),
            1 => Some(TxOutcome::Succeeded),
            _ => None,
        }
    }
}

/// Final inclusion record of a transaction
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub outcome: TxOutcome,
    pub block_number: Option<u64>,
    pub block_hash: Option<H256>,
    pub gas_used: Option<U256>,
    #[serde(skip)]
    pub inner: TransactionReceipt,
}

impl Receipt {
    /// Interpret a node receipt, rejecting unrecognized status codes
    pub fn from_rpc(inner: TransactionReceipt) -> ClientResult<Self> {
        let status = inner.status.map(|s: U64| s.as_u64());
        let outcome = status
            .and_then(TxOutcome::from_status)
            .ok_or(ClientError::UnknownReceiptStatus {
                tx_hash: inner.transaction_hash,
                status,
            })?;

        Ok(Self {
            transaction_hash: inner.transaction_hash,
            outcome,
            block_number: inner.block_number.map(|n| n.as_u64()),
            block_hash: inner.block_hash,
            gas_used: inner.gas_used,
            inner,
        })
    }

    pub fn is_success(&self) -> bool {
        self.outcome == TxOutcome::Succeeded
    }
}
