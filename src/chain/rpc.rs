//! JSON-RPC chain client over alloy's `RootProvider`

use super::ChainClient;
use crate::config::RpcSettings;
use crate::{Error, Result};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::TransactionRequest;
use alloy::transports::http::Http;
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use std::future::Future;

/// Chain client backed by an HTTP JSON-RPC endpoint.
///
/// Every call is bounded by `RpcSettings::timeout`. Reads are retried on
/// transport failures; submissions are attempted exactly once.
pub struct RpcChain {
    provider: RootProvider,
    chain_id: u64,
    settings: RpcSettings,
}

impl RpcChain {
    pub fn new(rpc_url: &str, chain_id: u64, settings: RpcSettings) -> Result<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| Error::Config(format!("invalid RPC url {}: {}", rpc_url, e)))?;
        // No client-level deadline: expiry must come from the tokio timeout
        // below so it is reported as `RpcTimeout`.
        let client = reqwest::Client::builder().build()?;
        let provider = RootProvider::new(RpcClient::new(Http::with_client(client, url), false));

        Ok(Self {
            provider,
            chain_id,
            settings,
        })
    }

    /// Run a read-only request with timeout and bounded retries.
    async fn read<T, F, Fut>(&self, method: &'static str, request: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, TransportError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(self.settings.timeout(), request()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => classify_read_error(method, e),
                Err(_) => Error::RpcTimeout(method.to_string()),
            };

            if !err.is_transient() || attempt > self.settings.read_retries {
                return Err(err);
            }
            tracing::debug!(method, attempt, error = %err, "Retrying RPC read");
            tokio::time::sleep(self.settings.retry_backoff() * attempt).await;
        }
    }
}

/// A JSON-RPC error response to `eth_call` is a revert; anything else is transport.
fn classify_read_error(method: &str, err: TransportError) -> Error {
    match err {
        RpcError::ErrorResp(payload) => Error::Reverted(format!("{}: {}", method, payload.message)),
        other => Error::Rpc(format!("{}: {}", method, other)),
    }
}

#[async_trait]
impl ChainClient for RpcChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        let provider = &self.provider;
        self.read("eth_getBalance", || async move {
            provider.get_balance(address).await
        })
        .await
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64> {
        let provider = &self.provider;
        self.read("eth_getTransactionCount", || async move {
            provider.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn gas_price(&self) -> Result<u128> {
        let provider = &self.provider;
        self.read("eth_gasPrice", || async move { provider.get_gas_price().await })
            .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let provider = &self.provider;
        let tx = TransactionRequest::default().with_to(to).with_input(data);
        self.read("eth_call", || {
            let tx = tx.clone();
            async move { provider.call(tx).await }
        })
        .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        let sent = tokio::time::timeout(
            self.settings.timeout(),
            self.provider.send_raw_transaction(&raw),
        )
        .await
        .map_err(|_| Error::RpcTimeout("eth_sendRawTransaction".to_string()))?;

        match sent {
            Ok(pending) => Ok(*pending.tx_hash()),
            Err(RpcError::ErrorResp(payload)) => {
                Err(Error::RpcRejected(payload.message.to_string()))
            }
            Err(e) => Err(Error::Rpc(format!("eth_sendRawTransaction: {}", e))),
        }
    }

    async fn transaction_status(&self, hash: B256) -> Result<Option<bool>> {
        let provider = &self.provider;
        let receipt = self
            .read("eth_getTransactionReceipt", || async move {
                provider.get_transaction_receipt(hash).await
            })
            .await?;
        Ok(receipt.map(|r| r.status()))
    }
}
