//! Quote engine
//!
//! Prices a swap through the router's `getAmountsOut` along a two-hop path.
//! Quotes are computed on demand and never cached.

use super::RouterConfig;
use crate::chain::{self, ChainClient};
use crate::config::SimulationMode;
use crate::tokens::{Token, TokenRegistry};
use crate::units::{from_base_units, to_base_units};
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Where a quote's output amount came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    Router,
    /// Configured fixed rate; only ever produced for price quotes
    Simulated,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub from: String,
    pub to: String,
    pub input_amount: Decimal,
    pub output_amount: Decimal,
    /// Best-effort estimate; zero when reserves are unavailable
    pub price_impact_percent: Decimal,
    pub source: QuoteSource,
}

impl Quote {
    pub fn is_simulated(&self) -> bool {
        self.source == QuoteSource::Simulated
    }
}

/// Reserves of a pool, in token units
#[derive(Debug, Clone, Serialize)]
pub struct LiquidityInfo {
    pub pair: Address,
    pub token_a: String,
    pub token_b: String,
    pub reserve_a: Decimal,
    pub reserve_b: Decimal,
}

pub struct QuoteEngine {
    chain: Arc<dyn ChainClient>,
    registry: Arc<TokenRegistry>,
    router: RouterConfig,
    simulation: SimulationMode,
    simulated_rate: Decimal,
}

impl QuoteEngine {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        registry: Arc<TokenRegistry>,
        router: RouterConfig,
    ) -> Self {
        Self {
            chain,
            registry,
            router,
            simulation: SimulationMode::Off,
            simulated_rate: Decimal::ONE,
        }
    }

    /// Enable the labelled fallback for price quotes
    pub fn with_simulation(mut self, mode: SimulationMode, rate: Decimal) -> Self {
        self.simulation = mode;
        self.simulated_rate = rate;
        self
    }

    pub fn router(&self) -> &RouterConfig {
        &self.router
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    /// Router path for a direct swap; native is replaced by wrapped native
    pub fn path(&self, from: &Token, to: &Token) -> Vec<Address> {
        vec![self.registry.path_address(from), self.registry.path_address(to)]
    }

    /// Raw router call: expected output in base units for `amount_in`.
    ///
    /// A revert, a short amounts array or a zero output is `NoLiquidity`.
    pub async fn expected_output(&self, path: &[Address], amount_in: U256) -> Result<U256> {
        let amounts = chain::router_amounts_out(
            self.chain.as_ref(),
            self.router.router,
            amount_in,
            path.to_vec(),
        )
        .await
        .map_err(|e| match e {
            Error::Reverted(reason) => Error::NoLiquidity(reason),
            other => other,
        })?;

        match amounts.get(path.len().saturating_sub(1)) {
            Some(out) if amounts.len() == path.len() && !out.is_zero() => Ok(*out),
            _ => Err(Error::NoLiquidity(format!(
                "router returned {} amounts for a {}-token path",
                amounts.len(),
                path.len()
            ))),
        }
    }

    /// Quote `amount` of `from_symbol` in units of `to_symbol`
    pub async fn get_quote(
        &self,
        from_symbol: &str,
        to_symbol: &str,
        amount: Decimal,
    ) -> Result<Quote> {
        let from = self.registry.resolve(from_symbol)?;
        let to = self.registry.resolve(to_symbol)?;
        if from.address == to.address {
            return Err(Error::InvalidArgument(format!(
                "cannot quote {} against itself",
                from.symbol
            )));
        }

        let chain = self.chain.as_ref();
        let (from_decimals, to_decimals) = futures::try_join!(
            self.registry.decimals(chain, &from),
            self.registry.decimals(chain, &to)
        )?;
        let amount_in = to_base_units(amount, from_decimals)?;
        let path = self.path(&from, &to);

        let amount_out = match self.expected_output(&path, amount_in).await {
            Ok(out) => out,
            Err(e) if self.simulation == SimulationMode::LabeledFallback && !e.is_validation() => {
                tracing::warn!(
                    from = %from.symbol,
                    to = %to.symbol,
                    error = %e,
                    "Router quote failed, returning simulated quote"
                );
                let output_amount = amount.checked_mul(self.simulated_rate).ok_or_else(|| {
                    Error::InvalidAmount(format!(
                        "{} {} at the simulated rate overflows",
                        amount, from.symbol
                    ))
                })?;
                return Ok(Quote {
                    from: from.symbol,
                    to: to.symbol,
                    input_amount: amount,
                    output_amount,
                    price_impact_percent: Decimal::ZERO,
                    source: QuoteSource::Simulated,
                });
            }
            Err(e) => return Err(e),
        };

        let price_impact_percent = self.price_impact(&path, amount_in, amount_out).await;
        Ok(Quote {
            input_amount: from_base_units(amount_in, from_decimals)?,
            output_amount: from_base_units(amount_out, to_decimals)?,
            from: from.symbol,
            to: to.symbol,
            price_impact_percent,
            source: QuoteSource::Router,
        })
    }

    /// Execution price against the pool's spot price, in percent.
    ///
    /// Falls back to zero whenever the reserves cannot be read.
    pub async fn price_impact(
        &self,
        path: &[Address],
        amount_in: U256,
        amount_out: U256,
    ) -> Decimal {
        let [token_in, token_out] = path else {
            return Decimal::ZERO;
        };
        let reserves = async {
            let pair =
                chain::factory_pair(self.chain.as_ref(), self.router.factory, *token_in, *token_out)
                    .await?;
            if pair == Address::ZERO {
                return Err(Error::NoLiquidity("no pair".to_string()));
            }
            chain::pair_reserves(self.chain.as_ref(), pair, *token_in).await
        }
        .await;

        match reserves {
            Ok((reserve_in, reserve_out)) => {
                impact_percent(amount_in, amount_out, reserve_in, reserve_out)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Price impact unavailable");
                Decimal::ZERO
            }
        }
    }

    /// Pool reserves for a token pair
    pub async fn check_liquidity(&self, symbol_a: &str, symbol_b: &str) -> Result<LiquidityInfo> {
        let a = self.registry.resolve(symbol_a)?;
        let b = self.registry.resolve(symbol_b)?;
        let chain = self.chain.as_ref();
        let (addr_a, addr_b) = (self.registry.path_address(&a), self.registry.path_address(&b));

        let pair = chain::factory_pair(chain, self.router.factory, addr_a, addr_b).await?;
        if pair == Address::ZERO {
            return Err(Error::NoLiquidity(format!("{}/{}", a.symbol, b.symbol)));
        }
        let (reserve_a, reserve_b) = chain::pair_reserves(chain, pair, addr_a).await?;
        let (decimals_a, decimals_b) = futures::try_join!(
            self.registry.decimals(chain, &a),
            self.registry.decimals(chain, &b)
        )?;

        Ok(LiquidityInfo {
            pair,
            token_a: a.symbol,
            token_b: b.symbol,
            reserve_a: from_base_units(reserve_a, decimals_a)?,
            reserve_b: from_base_units(reserve_b, decimals_b)?,
        })
    }
}

/// `(1 - (out / in) / (reserve_out / reserve_in)) * 100`, two decimal places
fn impact_percent(
    amount_in: U256,
    amount_out: U256,
    reserve_in: U256,
    reserve_out: U256,
) -> Decimal {
    const SCALE: u64 = 1_000_000;
    let numerator = amount_out
        .checked_mul(reserve_in)
        .and_then(|v| v.checked_mul(U256::from(SCALE)));
    let denominator = amount_in.checked_mul(reserve_out);
    let (Some(numerator), Some(denominator)) = (numerator, denominator) else {
        return Decimal::ZERO;
    };
    if denominator.is_zero() {
        return Decimal::ZERO;
    }

    let ratio = numerator / denominator;
    if ratio >= U256::from(SCALE) {
        return Decimal::ZERO;
    }
    let shortfall = SCALE - ratio.to::<u64>();
    // shortfall / SCALE * 100 = shortfall / 10^4
    Decimal::new(shortfall as i64, 4).round_dp(2)
}
