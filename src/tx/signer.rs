//! EIP-155 signing of legacy transactions

use super::types::{SignedTransaction, UnsignedTransaction};
use crate::account::Account;
use crate::error::{ClientError, ClientResult};

use ethers::signers::Signer;
use tracing::debug;

/// Sign `unsigned` for `chain_id` with the account's key.
///
/// The chain id is embedded both in the signed payload and in `v`, so the
/// result is only valid on that chain.
pub fn sign_transaction(
    account: &Account,
    unsigned: UnsignedTransaction,
    chain_id: u64,
) -> ClientResult<SignedTransaction> {
    if unsigned.from != account.address() {
        return Err(ClientError::Signing(format!(
            "transaction sender {:?} does not match account {:?}",
            unsigned.from,
            account.address()
        )));
    }

    let typed = unsigned.to_typed(chain_id);
    let wallet = account.wallet().clone().with_chain_id(chain_id);
    let signature = wallet
        .sign_transaction_sync(&typed)
        .map_err(|e| ClientError::Signing(e.to_string()))?;

    let raw = typed.rlp_signed(&signature);
    let hash = typed.hash(&signature);
    debug!(
        "Signed transaction {:?} (nonce {}, chain {})",
        hash, unsigned.nonce, chain_id
    );

    Ok(SignedTransaction::new(unsigned, chain_id, signature, raw, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, Bytes, H256, U256};
    use ethers::utils::keccak256;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn unsigned(from: Address) -> UnsignedTransaction {
        UnsignedTransaction {
            from,
            nonce: 0,
            to: Some(Address::repeat_byte(0x42)),
            value: U256::from(1_000),
            gas_limit: U256::from(21_000),
            gas_price: U256::from(1_000_000_000u64),
            data: Bytes::default(),
        }
    }

    #[test]
    fn test_signature_recovers_account() {
        let account = Account::from_private_key(TEST_KEY).unwrap();
        let signed = sign_transaction(&account, unsigned(account.address()), 31337).unwrap();

        let typed = signed.unsigned().to_typed(31337);
        let recovered = signed.signature().recover(typed.sighash()).unwrap();
        assert_eq!(recovered, account.address());
        assert_eq!(signed.hash(), H256::from(keccak256(signed.raw())));
    }

    #[test]
    fn test_signature_bound_to_chain_id() {
        let account = Account::from_private_key(TEST_KEY).unwrap();
        let mainnet = sign_transaction(&account, unsigned(account.address()), 1).unwrap();
        let testnet = sign_transaction(&account, unsigned(account.address()), 5).unwrap();

        // EIP-155: v = recovery_id + chain_id * 2 + 35
        assert!(mainnet.signature().v == 37 || mainnet.signature().v == 38);
        assert!(testnet.signature().v == 45 || testnet.signature().v == 46);
        assert_ne!(mainnet.hash(), testnet.hash());
        assert_eq!(mainnet.chain_id(), 1);
    }

    #[test]
    fn test_signing_is_deterministic() {
        let account = Account::from_private_key(TEST_KEY).unwrap();
        let a = sign_transaction(&account, unsigned(account.address()), 1).unwrap();
        let b = sign_transaction(&account, unsigned(account.address()), 1).unwrap();
        assert_eq!(a.raw(), b.raw());
    }

    #[test]
    fn test_rejects_foreign_sender() {
        let account = Account::from_private_key(TEST_KEY).unwrap();
        let result = sign_transaction(&account, unsigned(Address::repeat_byte(9)), 1);
        assert!(matches!(result, Err(ClientError::Signing(_))));
    }
}
