//! Scripted in-memory chain for tests

use super::ChainClient;
use crate::{Error, Result};
use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type CallHandler = dyn Fn(Address, [u8; 4], &[u8]) -> Result<Bytes> + Send + Sync;

/// Encode a single return value the way a contract would
pub fn abi_ok<T: SolValue>(value: T) -> Result<Bytes> {
    Ok((value,).abi_encode_params().into())
}

/// How the mock answers `send_raw_transaction`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendBehavior {
    Accept,
    Reject,
    Timeout,
}

pub struct MockChain {
    chain_id: u64,
    handler: Box<CallHandler>,
    pending_nonce: Mutex<u64>,
    gas_price: u128,
    send_behavior: Mutex<SendBehavior>,
    /// Status reported for every accepted transaction (`None` = never mined)
    mined_status: Mutex<Option<bool>>,
    sent: Mutex<Vec<TxEnvelope>>,
    statuses: Mutex<HashMap<B256, Option<bool>>>,
    calls: AtomicUsize,
    send_attempts: AtomicUsize,
}

impl MockChain {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(Address, [u8; 4], &[u8]) -> Result<Bytes> + Send + Sync + 'static,
    {
        Self {
            chain_id: 14,
            handler: Box::new(handler),
            pending_nonce: Mutex::new(0),
            gas_price: 25_000_000_000,
            send_behavior: Mutex::new(SendBehavior::Accept),
            mined_status: Mutex::new(Some(true)),
            sent: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            send_attempts: AtomicUsize::new(0),
        }
    }

    pub fn set_pending_nonce(&self, nonce: u64) {
        *self.pending_nonce.lock().unwrap() = nonce;
    }

    pub fn set_send_behavior(&self, behavior: SendBehavior) {
        *self.send_behavior.lock().unwrap() = behavior;
    }

    pub fn set_mined_status(&self, status: Option<bool>) {
        *self.mined_status.lock().unwrap() = status;
    }

    /// Transactions accepted so far, decoded
    pub fn sent(&self) -> Vec<TxEnvelope> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of `eth_call`s served
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `send_raw_transaction` calls, whatever their outcome
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_balance(&self, _address: Address) -> Result<U256> {
        Ok(U256::ZERO)
    }

    async fn get_transaction_count(&self, _address: Address) -> Result<u64> {
        Ok(*self.pending_nonce.lock().unwrap())
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(self.gas_price)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut selector = [0u8; 4];
        if data.len() >= 4 {
            selector.copy_from_slice(&data[..4]);
        }
        (self.handler)(to, selector, &data)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        match *self.send_behavior.lock().unwrap() {
            SendBehavior::Reject => {
                return Err(Error::RpcRejected("nonce too low".to_string()));
            }
            SendBehavior::Timeout => {
                return Err(Error::RpcTimeout("eth_sendRawTransaction".to_string()));
            }
            SendBehavior::Accept => {}
        }
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| Error::RpcRejected(format!("undecodable transaction: {}", e)))?;
        let hash = *envelope.tx_hash();
        let status = *self.mined_status.lock().unwrap();
        self.statuses.lock().unwrap().insert(hash, status);
        self.sent.lock().unwrap().push(envelope);
        Ok(hash)
    }

    async fn transaction_status(&self, hash: B256) -> Result<Option<bool>> {
        Ok(self.statuses.lock().unwrap().get(&hash).copied().flatten())
    }
}
