//! Session account signer
//!
//! The signing key of a chat account lives here and nowhere else. Other
//! modules see the address and the signed bytes of staged transactions,
//! never the key. There is no `Serialize` impl and `Debug` is redacted.

use crate::dex::TxRequest;
use crate::{Error, Result};
use alloy::consensus::{SignableTransaction, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use secrecy::{ExposeSecret, SecretString};

/// Account that signs confirmed transactions for one chat session
pub struct SecureWallet {
    signer: PrivateKeySigner,
    address: Address,
}

impl SecureWallet {
    /// Key as loaded from `PRIVATE_KEY` (hex, optional `0x`)
    pub fn from_secret(key: &SecretString) -> Result<Self> {
        Self::from_hex(key.expose_secret())
    }

    pub fn from_hex(key: &str) -> Result<Self> {
        let key = key.trim();
        let signer = key
            .strip_prefix("0x")
            .unwrap_or(key)
            .parse::<PrivateKeySigner>()
            .map_err(|e| Error::Wallet(format!("malformed account key: {}", e)))?;

        Ok(Self::from_signer(signer))
    }

    /// Generate a fresh random account
    pub fn random() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    fn from_signer(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        Self { signer, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-55 checksummed address, as shown to the user
    pub fn address_string(&self) -> String {
        self.address.to_checksum(None)
    }

    /// Sign `tx` with `nonce` as a chain-id bound legacy transaction.
    ///
    /// Returns the EIP-2718 encoding ready for `eth_sendRawTransaction` and
    /// the transaction hash.
    pub fn sign_transaction(&self, tx: &TxRequest, nonce: u64) -> Result<(Bytes, B256)> {
        let unsigned = tx.to_legacy(nonce);
        let signature = self
            .signer
            .sign_hash_sync(&unsigned.signature_hash())
            .map_err(|e| Error::Wallet(format!("Signing failed: {}", e)))?;
        let signed = unsigned.into_signed(signature);
        let hash = *signed.hash();
        let envelope = TxEnvelope::Legacy(signed);
        Ok((envelope.encoded_2718().into(), hash))
    }
}

impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureWallet({}, key: [REDACTED])", self.address)
    }
}
