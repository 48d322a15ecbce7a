//! Nonce management for reliable transaction submission
//!
//! Handles:
//! - Serialized allocation so concurrent builds never share a nonce
//! - Reuse of nonces released when a build or broadcast fails
//! - Tracking of submitted, unconfirmed transactions

use crate::chain::LedgerRpc;
use crate::error::ClientResult;

use dashmap::DashMap;
use ethers::types::{Address, H256};
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Local nonce state
#[derive(Debug, Default)]
struct NonceState {
    /// Next nonce to hand out, once anything was allocated
    next: Option<u64>,
    /// Last nonce the chain reported as used
    confirmed: Option<u64>,
    /// Nonces handed out and then given back below `next`
    released: BTreeSet<u64>,
}

/// Allocates nonces for one account
pub struct NonceManager {
    /// Account address
    address: Address,
    state: Mutex<NonceState>,
    /// Submitted transactions: nonce -> tx_hash
    pending: DashMap<u64, H256>,
}

impl NonceManager {
    /// Create a new nonce manager
    pub fn new(address: Address) -> Self {
        Self {
            address,
            state: Mutex::new(NonceState::default()),
            pending: DashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Allocate the next nonce.
    ///
    /// The chain's pending nonce is read under the lock and combined with
    /// the local counter, so two allocations racing on the same account
    /// always receive distinct, consecutive values.
    pub async fn allocate(&self, rpc: &dyn LedgerRpc) -> ClientResult<u64> {
        let mut state = self.state.lock().await;
        let on_chain = rpc.pending_nonce(self.address).await?;

        state.released.retain(|nonce| *nonce >= on_chain);
        if let Some(nonce) = state.released.pop_first() {
            debug!("Reissued released nonce {} for {:?}", nonce, self.address);
            return Ok(nonce);
        }

        let nonce = match state.next {
            Some(local) if local > on_chain => local,
            _ => on_chain,
        };
        state.next = Some(nonce + 1);

        debug!("Allocated nonce {} for {:?} (chain reports {})", nonce, self.address, on_chain);
        Ok(nonce)
    }

    /// Mark a nonce as pending with transaction hash
    pub fn mark_pending(&self, nonce: u64, tx_hash: H256) {
        self.pending.insert(nonce, tx_hash);
    }

    /// Confirm a nonce (transaction mined)
    pub async fn confirm(&self, nonce: u64) {
        let mut state = self.state.lock().await;
        self.pending.remove(&nonce);
        if state.confirmed.map_or(true, |c| nonce > c) {
            state.confirmed = Some(nonce);
        }
    }

    /// Release a nonce (transaction never reached the ledger, can be reused)
    pub async fn release(&self, nonce: u64) {
        let mut state = self.state.lock().await;
        self.pending.remove(&nonce);

        match state.next {
            Some(next) if next == nonce + 1 => {
                // Shrink the counter past any released nonces directly below
                let mut next = nonce;
                while next > 0 && state.released.remove(&(next - 1)) {
                    next -= 1;
                }
                state.next = Some(next);
            }
            Some(next) if nonce < next => {
                state.released.insert(nonce);
            }
            _ => {
                warn!("Nonce {} for {:?} was never allocated", nonce, self.address);
                return;
            }
        }
        debug!("Released nonce {} for {:?}", nonce, self.address);
    }

    /// Sync nonces with on-chain state
    pub async fn sync(&self, rpc: &dyn LedgerRpc) -> ClientResult<u64> {
        let mut state = self.state.lock().await;
        let on_chain = rpc.pending_nonce(self.address).await?;

        // Detect gaps
        if let Some(next) = state.next {
            if next > on_chain && self.pending.is_empty() {
                warn!(
                    "Nonce gap detected for {:?}: local {}, chain {}",
                    self.address, next, on_chain
                );
            }
        }

        // Clear pending transactions that have been mined
        self.pending.retain(|nonce, _| *nonce >= on_chain);
        state.released.retain(|nonce| *nonce >= on_chain);

        state.confirmed = on_chain.checked_sub(1);
        if self.pending.is_empty() {
            state.next = Some(on_chain);
            state.released.clear();
        } else if state.next.map_or(true, |next| next < on_chain) {
            state.next = Some(on_chain);
        }

        Ok(on_chain)
    }

    /// Get pending count
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Highest nonce known to be mined
    pub async fn last_confirmed(&self) -> Option<u64> {
        self.state.lock().await.confirmed
    }
}
