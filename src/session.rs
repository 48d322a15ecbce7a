//! Session: one account bound to one ledger connection
//!
//! The session is the caller-facing surface. It exposes the pass-through
//! ledger queries and composes the transaction pipeline
//! (build -> sign -> broadcast -> confirm) for contract calls, transfers
//! and deployments.

use crate::abi::MethodCall;
use crate::account::Account;
use crate::chain::{
    parse_address, parse_hash, CallRequest, ChainProvider, LedgerRpc, TransactionLookup,
};
use crate::config::Settings;
use crate::error::ClientResult;
use crate::tx::{
    sign_transaction, CancelSignal, ConfirmationPoller, GasEstimator, NonceManager, PollPolicy,
    Receipt, SignedTransaction, TransactionBuilder, TransactionSender, UnsignedTransaction,
};
use crate::units;

use ethers::types::{Address, Block, Bytes, Transaction, H256, U256};
use std::sync::Arc;
use tracing::{debug, info};

/// Account plus connection plus pipeline state
pub struct Session {
    account: Account,
    rpc: Arc<dyn LedgerRpc>,
    builder: TransactionBuilder,
    sender: TransactionSender,
}

impl Session {
    /// Connect to a single endpoint with default settings
    pub fn connect(endpoint: &str, private_key: &str) -> ClientResult<Self> {
        Self::from_settings(&Settings::for_endpoint(endpoint), private_key)
    }

    /// Connect using configuration
    pub fn from_settings(settings: &Settings, private_key: &str) -> ClientResult<Self> {
        let account = Account::from_private_key(private_key)?;
        let provider = ChainProvider::new(&settings.rpc)?;
        Ok(Self::with_rpc(account, Arc::new(provider), settings))
    }

    /// Bind an account to an existing ledger connection
    pub fn with_rpc(account: Account, rpc: Arc<dyn LedgerRpc>, settings: &Settings) -> Self {
        let nonce_manager = Arc::new(NonceManager::new(account.address()));
        let builder = TransactionBuilder::new(nonce_manager, GasEstimator::new(&settings.gas));
        let sender = TransactionSender::new(ConfirmationPoller::new(PollPolicy::from(
            &settings.confirmation,
        )));

        info!("Session opened for account {}", account.address_hex());
        Self {
            account,
            rpc,
            builder,
            sender,
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn address(&self) -> Address {
        self.account.address()
    }

    /// Checksummed session address
    pub fn address_hex(&self) -> String {
        self.account.address_hex()
    }

    pub fn rpc(&self) -> &dyn LedgerRpc {
        self.rpc.as_ref()
    }

    // ---- pass-through queries ----

    pub async fn block_number(&self) -> ClientResult<u64> {
        self.rpc.block_number().await
    }

    pub async fn block_by_number(&self, number: u64) -> ClientResult<Option<Block<Transaction>>> {
        self.rpc.block_by_number(number).await
    }

    pub async fn block_by_hash(&self, hash: &str) -> ClientResult<Option<Block<Transaction>>> {
        self.rpc.block_by_hash(parse_hash(hash)?).await
    }

    pub async fn header_by_number(&self, number: u64) -> ClientResult<Option<Block<H256>>> {
        self.rpc.header_by_number(number).await
    }

    pub async fn header_by_hash(&self, hash: &str) -> ClientResult<Option<Block<H256>>> {
        self.rpc.header_by_hash(parse_hash(hash)?).await
    }

    /// Pending nonce of the session account, as the ledger reports it
    pub async fn nonce(&self) -> ClientResult<u64> {
        self.rpc.pending_nonce(self.address()).await
    }

    pub async fn gas_price(&self) -> ClientResult<U256> {
        self.rpc.gas_price().await
    }

    /// Simulate a call from the session account and return its gas usage
    pub async fn estimate_gas(&self, to: &str, data: Bytes, value: U256) -> ClientResult<U256> {
        let call = CallRequest {
            from: self.address(),
            to: Some(parse_address(to)?),
            data,
            value,
        };
        self.rpc.estimate_gas(call).await
    }

    pub async fn chain_id(&self) -> ClientResult<u64> {
        self.rpc.chain_id().await
    }

    /// Balance in wei of any address
    pub async fn balance(&self, address: &str) -> ClientResult<U256> {
        self.rpc.balance(parse_address(address)?).await
    }

    pub async fn my_balance(&self) -> ClientResult<U256> {
        self.rpc.balance(self.address()).await
    }

    /// Balance of any address as a decimal ether string
    pub async fn ether_balance(&self, address: &str) -> ClientResult<String> {
        Ok(units::balance_to_ether(self.balance(address).await?))
    }

    pub async fn transaction_by_hash(&self, hash: &str) -> ClientResult<Option<TransactionLookup>> {
        let tx_hash = parse_hash(hash)?;
        let lookup = self.rpc.transaction_by_hash(tx_hash).await?;
        if let Some(lookup) = &lookup {
            debug!(
                "Transaction {:?} is {}",
                tx_hash,
                if lookup.is_pending { "pending" } else { "included" }
            );
        }
        Ok(lookup)
    }

    pub async fn transaction_in_block(
        &self,
        block_hash: &str,
        index: u64,
    ) -> ClientResult<Option<Transaction>> {
        self.rpc
            .transaction_in_block(parse_hash(block_hash)?, index)
            .await
    }

    /// Deployed code at an address, hex encoded without prefix
    pub async fn byte_code(&self, address: &str) -> ClientResult<String> {
        let code = self.rpc.code_at(parse_address(address)?).await?;
        Ok(hex::encode(code))
    }

    /// Wait for an already submitted transaction and return its receipt
    pub async fn wait_for_receipt(&self, hash: &str) -> ClientResult<Receipt> {
        self.sender
            .confirm(self.rpc.as_ref(), parse_hash(hash)?, CancelSignal::never())
            .await
    }

    // ---- transaction pipeline ----

    /// Build an unsigned call to `to`
    pub async fn create_tx(
        &self,
        to: &str,
        data: Bytes,
        value: U256,
    ) -> ClientResult<UnsignedTransaction> {
        let to = parse_address(to)?;
        self.build(Some(to), data, value).await
    }

    async fn build(
        &self,
        to: Option<Address>,
        data: Bytes,
        value: U256,
    ) -> ClientResult<UnsignedTransaction> {
        self.builder.build(self.rpc.as_ref(), to, data, value).await
    }

    /// Sign for the chain the connection currently points at
    pub async fn sign_tx(&self, unsigned: UnsignedTransaction) -> ClientResult<SignedTransaction> {
        let chain_id = self.rpc.chain_id().await?;
        sign_transaction(&self.account, unsigned, chain_id)
    }

    /// Sign, broadcast and wait for the receipt
    pub async fn send_tx(&self, unsigned: UnsignedTransaction) -> ClientResult<Receipt> {
        self.send_tx_with_cancel(unsigned, CancelSignal::never()).await
    }

    /// `send_tx` whose confirmation wait can be cancelled
    pub async fn send_tx_with_cancel(
        &self,
        unsigned: UnsignedTransaction,
        cancel: CancelSignal,
    ) -> ClientResult<Receipt> {
        let nonces = self.builder.nonce_manager();
        let nonce = unsigned.nonce;

        let signed = match self.sign_tx(unsigned).await {
            Ok(signed) => signed,
            Err(e) => {
                nonces.release(nonce).await;
                return Err(e);
            }
        };

        let tx_hash = match self.sender.broadcast(self.rpc.as_ref(), &signed).await {
            Ok(hash) => hash,
            Err(e) => {
                nonces.release(nonce).await;
                return Err(e);
            }
        };
        nonces.mark_pending(nonce, tx_hash);

        let receipt = self.sender.track(self.rpc.as_ref(), &signed, cancel).await?;
        nonces.confirm(nonce).await;
        Ok(receipt)
    }

    /// Call a contract method that takes no arguments
    pub async fn invoke_contract_without_args(
        &self,
        contract: &str,
        method: &str,
        value: U256,
    ) -> ClientResult<Receipt> {
        self.invoke_contract(contract, &MethodCall::new(method), value)
            .await
    }

    /// Call a contract method with ABI-encoded arguments
    pub async fn invoke_contract(
        &self,
        contract: &str,
        call: &MethodCall,
        value: U256,
    ) -> ClientResult<Receipt> {
        let data = call.encode()?;
        info!("Invoking {} on {}", call.signature(), contract);
        let unsigned = self.create_tx(contract, data, value).await?;
        self.send_tx(unsigned).await
    }

    /// Plain value transfer
    pub async fn transfer(&self, to: &str, value: U256) -> ClientResult<Receipt> {
        let unsigned = self.create_tx(to, Bytes::default(), value).await?;
        self.send_tx(unsigned).await
    }

    /// Contract creation; the receipt carries the new contract address
    pub async fn deploy(&self, bytecode: Bytes, value: U256) -> ClientResult<Receipt> {
        let unsigned = self.build(None, bytecode, value).await?;
        self.send_tx(unsigned).await
    }

    /// Re-read the pending nonce from the ledger, dropping local state
    pub async fn sync_nonce(&self) -> ClientResult<u64> {
        self.builder.nonce_manager().sync(self.rpc.as_ref()).await
    }

    /// Close the connection and hand back the account for reuse
    pub fn close(self) -> Account {
        self.rpc.close();
        info!("Session closed for account {}", self.account.address_hex());
        self.account
    }
}
