//! Chain adapter
//!
//! `ChainClient` is the I/O boundary to the RPC node. It carries no business
//! logic; the free functions below encode and decode the handful of contract
//! reads the agent needs on top of the raw `call`.

pub mod abi;
#[cfg(test)]
pub mod mock;
mod rpc;

pub use rpc::RpcChain;

use crate::{Error, Result};
use abi::{IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router02, IERC20};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::time::Duration;

/// Minimal JSON-RPC surface used by the agent
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain id transactions are signed for
    fn chain_id(&self) -> u64;

    /// Native balance in base units
    async fn get_balance(&self, address: Address) -> Result<U256>;

    /// Pending transaction count (next usable nonce as seen by the node)
    async fn get_transaction_count(&self, address: Address) -> Result<u64>;

    /// Current gas price in wei
    async fn gas_price(&self) -> Result<u128>;

    /// Read-only contract call. A revert surfaces as `Error::Reverted`.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    /// Broadcast a signed transaction. Never retried.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256>;

    /// `None` while the transaction is unmined, otherwise whether it succeeded
    async fn transaction_status(&self, hash: B256) -> Result<Option<bool>>;
}

fn decode_err(what: &str, e: impl std::fmt::Display) -> Error {
    Error::Rpc(format!("failed to decode {} result: {}", what, e))
}

/// ERC20 `decimals()`
pub async fn erc20_decimals(chain: &dyn ChainClient, token: Address) -> Result<u8> {
    let data = IERC20::decimalsCall {}.abi_encode();
    let out = chain.call(token, data.into()).await?;
    IERC20::decimalsCall::abi_decode_returns(&out).map_err(|e| decode_err("decimals", e))
}

/// ERC20 `balanceOf(owner)`
pub async fn erc20_balance(
    chain: &dyn ChainClient,
    token: Address,
    owner: Address,
) -> Result<U256> {
    let data = IERC20::balanceOfCall { owner }.abi_encode();
    let out = chain.call(token, data.into()).await?;
    IERC20::balanceOfCall::abi_decode_returns(&out).map_err(|e| decode_err("balanceOf", e))
}

/// ERC20 `allowance(owner, spender)`
pub async fn erc20_allowance(
    chain: &dyn ChainClient,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256> {
    let data = IERC20::allowanceCall { owner, spender }.abi_encode();
    let out = chain.call(token, data.into()).await?;
    IERC20::allowanceCall::abi_decode_returns(&out).map_err(|e| decode_err("allowance", e))
}

/// Router `getAmountsOut(amountIn, path)`
pub async fn router_amounts_out(
    chain: &dyn ChainClient,
    router: Address,
    amount_in: U256,
    path: Vec<Address>,
) -> Result<Vec<U256>> {
    let data = IUniswapV2Router02::getAmountsOutCall {
        amountIn: amount_in,
        path,
    }
    .abi_encode();
    let out = chain.call(router, data.into()).await?;
    IUniswapV2Router02::getAmountsOutCall::abi_decode_returns(&out)
        .map_err(|e| decode_err("getAmountsOut", e))
}

/// Factory `getPair(a, b)`; the zero address means no pair exists
pub async fn factory_pair(
    chain: &dyn ChainClient,
    factory: Address,
    token_a: Address,
    token_b: Address,
) -> Result<Address> {
    let data = IUniswapV2Factory::getPairCall {
        tokenA: token_a,
        tokenB: token_b,
    }
    .abi_encode();
    let out = chain.call(factory, data.into()).await?;
    IUniswapV2Factory::getPairCall::abi_decode_returns(&out).map_err(|e| decode_err("getPair", e))
}

/// Pair reserves ordered as `(reserve of token_a, reserve of token_b)`
pub async fn pair_reserves(
    chain: &dyn ChainClient,
    pair: Address,
    token_a: Address,
) -> Result<(U256, U256)> {
    let data = IUniswapV2Pair::token0Call {}.abi_encode();
    let out = chain.call(pair, data.into()).await?;
    let token0 =
        IUniswapV2Pair::token0Call::abi_decode_returns(&out).map_err(|e| decode_err("token0", e))?;

    let data = IUniswapV2Pair::getReservesCall {}.abi_encode();
    let out = chain.call(pair, data.into()).await?;
    let reserves = IUniswapV2Pair::getReservesCall::abi_decode_returns(&out)
        .map_err(|e| decode_err("getReserves", e))?;

    let reserve0 = U256::from(reserves.reserve0.to::<u128>());
    let reserve1 = U256::from(reserves.reserve1.to::<u128>());
    if token0 == token_a {
        Ok((reserve0, reserve1))
    } else {
        Ok((reserve1, reserve0))
    }
}

/// Poll until the transaction is mined or `timeout` elapses.
///
/// Returns the execution status; `RpcTimeout` when it never showed up.
pub async fn wait_for_receipt(
    chain: &dyn ChainClient,
    hash: B256,
    timeout: Duration,
    poll: Duration,
) -> Result<bool> {
    let start = tokio::time::Instant::now();
    loop {
        if let Some(success) = chain.transaction_status(hash).await? {
            return Ok(success);
        }
        if start.elapsed() >= timeout {
            return Err(Error::RpcTimeout(format!(
                "transaction {} not mined after {:?}",
                hash, timeout
            )));
        }
        tokio::time::sleep(poll).await;
    }
}
