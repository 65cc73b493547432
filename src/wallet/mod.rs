//! Session accounts and transaction signing

mod signer;

pub use signer::SecureWallet;
