//! Ledger client - build, sign, broadcast and confirm transactions against
//! an EVM-compatible JSON-RPC node.

pub mod abi;
pub mod account;
pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod session;
pub mod tx;
pub mod units;

pub use abi::MethodCall;
pub use account::{derive_address, Account};
pub use chain::{ChainProvider, LedgerRpc};
pub use config::Settings;
pub use error::{ClientError, ClientResult};
pub use session::Session;
pub use tx::{CancelHandle, CancelSignal, PollPolicy, Receipt, TxOutcome};
