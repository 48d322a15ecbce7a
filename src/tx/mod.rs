//! Transaction pipeline: build, sign, broadcast, confirm

mod builder;
mod confirm;
mod gas;
mod nonce;
mod sender;
mod signer;
mod types;

pub use builder::TransactionBuilder;
pub use confirm::{CancelHandle, CancelSignal, ConfirmationPoller, PollPolicy, PollResult};
pub use gas::GasEstimator;
pub use nonce::NonceManager;
pub use sender::TransactionSender;
pub use signer::sign_transaction;
pub use types::{Receipt, SignedTransaction, TxOutcome, UnsignedTransaction};
