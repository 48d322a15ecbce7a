//! Account: a private key and the address derived from it

use crate::error::{ClientError, ClientResult};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use ethers::utils::to_checksum;
use std::fmt;

/// Signing capability bound to its derived address.
///
/// The address is always computed from the key. The key is never logged
/// or formatted.
#[derive(Clone)]
pub struct Account {
    wallet: LocalWallet,
}

impl Account {
    /// Parse a hex private key, with or without `0x`
    pub fn from_private_key(private_key: &str) -> ClientResult<Self> {
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| ClientError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// EIP-55 checksummed address
    pub fn address_hex(&self) -> String {
        to_checksum(&self.address(), None)
    }

    pub(crate) fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address_hex())
            .finish()
    }
}

/// Derive the checksummed address for a private key without any RPC
pub fn derive_address(private_key: &str) -> ClientResult<String> {
    Ok(Account::from_private_key(private_key)?.address_hex())
}
