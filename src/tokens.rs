//! Token registry
//!
//! Static symbol → address mapping taken from the selected router
//! configuration, plus a lazily filled decimals cache. Symbols are
//! case-insensitive and stored uppercase. The zero address denotes the
//! chain's native asset.

use crate::chain::{self, ChainClient};
use crate::dex::RouterConfig;
use crate::units::NATIVE_DECIMALS;
use crate::{Error, Result};
use alloy::primitives::Address;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// A resolved token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Uppercase symbol
    pub symbol: String,
    pub address: Address,
}

impl Token {
    pub fn is_native(&self) -> bool {
        self.address == Address::ZERO
    }
}

/// Token registry for one router/network
#[derive(Debug)]
pub struct TokenRegistry {
    tokens: BTreeMap<String, Address>,
    native_symbol: String,
    wrapped_native: Address,
    /// Decimals by contract address; an entry is never overwritten
    decimals: RwLock<HashMap<Address, u8>>,
}

impl TokenRegistry {
    /// Build the registry, registering `native_symbol` at the zero address
    pub fn new(router: &RouterConfig, native_symbol: &str) -> Self {
        let native_symbol = native_symbol.to_uppercase();
        let mut tokens = router.tokens.clone();
        tokens.insert(native_symbol.clone(), Address::ZERO);

        Self {
            tokens,
            native_symbol,
            wrapped_native: router.wrapped_native,
            decimals: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a symbol (case-insensitive)
    pub fn resolve(&self, symbol: &str) -> Result<Token> {
        let key = symbol.trim().to_uppercase();
        self.tokens
            .get(&key)
            .map(|address| Token {
                symbol: key.clone(),
                address: *address,
            })
            .ok_or(Error::UnknownToken(key))
    }

    /// The chain's native asset
    pub fn native(&self) -> Token {
        Token {
            symbol: self.native_symbol.clone(),
            address: Address::ZERO,
        }
    }

    pub fn native_symbol(&self) -> &str {
        &self.native_symbol
    }

    /// Address to use inside a router path (native → wrapped native)
    pub fn path_address(&self, token: &Token) -> Address {
        if token.is_native() {
            self.wrapped_native
        } else {
            token.address
        }
    }

    /// Token decimals, read from the contract on first use and cached.
    pub async fn decimals(&self, chain: &dyn ChainClient, token: &Token) -> Result<u8> {
        if token.is_native() {
            return Ok(NATIVE_DECIMALS);
        }
        if let Some(decimals) = self.decimals.read().await.get(&token.address) {
            return Ok(*decimals);
        }

        let fetched = chain::erc20_decimals(chain, token.address).await?;
        let mut cache = self.decimals.write().await;
        let decimals = *cache.entry(token.address).or_insert(fetched);
        tracing::debug!(token = %token.symbol, decimals, "Cached token decimals");
        Ok(decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::abi::IERC20;
    use crate::chain::mock::{abi_ok, MockChain};
    use alloy::sol_types::SolCall;

    fn registry() -> TokenRegistry {
        TokenRegistry::new(&RouterConfig::blazeswap(), "FLR")
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let reg = registry();
        let token = reg.resolve("usdc.e").unwrap();
        assert_eq!(token.symbol, "USDC.E");
        assert!(!token.is_native());
        assert!(reg.resolve(" flr ").unwrap().is_native());
    }

    #[test]
    fn unknown_symbol_is_typed_error() {
        let reg = registry();
        match reg.resolve("doge") {
            Err(Error::UnknownToken(symbol)) => assert_eq!(symbol, "DOGE"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn native_maps_to_wrapped_in_paths() {
        let reg = registry();
        let flr = reg.native();
        assert_eq!(reg.path_address(&flr), RouterConfig::blazeswap().wrapped_native);
        let bnz = reg.resolve("BNZ").unwrap();
        assert_eq!(reg.path_address(&bnz), bnz.address);
    }

    #[tokio::test]
    async fn decimals_fetched_once() {
        let chain = MockChain::new(|_, selector, _| {
            assert_eq!(selector, IERC20::decimalsCall::SELECTOR);
            abi_ok(6u16)
        });
        let reg = registry();
        let usdt = reg.resolve("USDT").unwrap();

        assert_eq!(reg.decimals(&chain, &usdt).await.unwrap(), 6);
        assert_eq!(reg.decimals(&chain, &usdt).await.unwrap(), 6);
        assert_eq!(chain.call_count(), 1);

        assert_eq!(reg.decimals(&chain, &reg.native()).await.unwrap(), 18);
        assert_eq!(chain.call_count(), 1);
    }
}
