//! Trade builder
//!
//! Produces fully specified, unsigned transactions for native transfers and
//! router swaps. Nonces are left empty; they are assigned at submission.

use super::{AllowanceGate, QuoteEngine, RouterConfig};
use crate::chain::abi::IUniswapV2Router02;
use crate::chain::ChainClient;
use crate::config::{GasLimits, RiskConfig, SimulationMode};
use crate::sanctions::SanctionsScreen;
use crate::tokens::{Token, TokenRegistry};
use crate::units::{apply_slippage, format_units, from_base_units, to_base_units, NATIVE_DECIMALS};
use crate::{Error, Result};
use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::sol_types::SolCall;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Seconds a swap stays valid after it was built
pub const SWAP_DEADLINE_SECS: i64 = 1200;

/// A built, unsigned transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxRequest {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas: u64,
    pub gas_price: u128,
    /// Assigned at submission time
    pub nonce: Option<u64>,
    pub chain_id: u64,
}

impl TxRequest {
    /// Legacy (chain id bound) transaction for signing
    pub fn to_legacy(&self, nonce: u64) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas,
            to: TxKind::Call(self.to),
            value: self.value,
            input: self.data.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    NativeToToken,
    TokenToNative,
    TokenToToken,
}

impl SwapDirection {
    pub fn between(from: &Token, to: &Token) -> Result<Self> {
        match (from.is_native(), to.is_native()) {
            (true, true) => Err(Error::InvalidArgument(format!(
                "cannot swap {} to {}: both are the native asset",
                from.symbol, to.symbol
            ))),
            (true, false) => Ok(SwapDirection::NativeToToken),
            (false, true) => Ok(SwapDirection::TokenToNative),
            (false, false) => Ok(SwapDirection::TokenToToken),
        }
    }

    /// Router function used for this direction
    pub fn router_function(&self) -> &'static str {
        match self {
            SwapDirection::NativeToToken => "swapExactETHForTokens",
            SwapDirection::TokenToNative => "swapExactTokensForETH",
            SwapDirection::TokenToToken => "swapExactTokensForTokens",
        }
    }
}

/// A swap transaction and the numbers it was built from
#[derive(Debug, Clone)]
pub struct BuiltSwap {
    pub tx: TxRequest,
    pub direction: SwapDirection,
    pub from: Token,
    pub to: Token,
    pub amount_in: U256,
    pub expected_out: U256,
    pub min_out: U256,
    pub deadline: u64,
    pub expected_output: Decimal,
    pub minimum_output: Decimal,
}

pub struct TradeBuilder {
    chain: Arc<dyn ChainClient>,
    registry: Arc<TokenRegistry>,
    quotes: QuoteEngine,
    allowance: AllowanceGate,
    sanctions: Arc<dyn SanctionsScreen>,
    gas: GasLimits,
    risk: RiskConfig,
}

impl TradeBuilder {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        registry: Arc<TokenRegistry>,
        router: RouterConfig,
        sanctions: Arc<dyn SanctionsScreen>,
        gas: GasLimits,
        risk: RiskConfig,
    ) -> Self {
        let allowance =
            AllowanceGate::new(chain.clone(), registry.clone(), router.router, gas.approve);
        let quotes = QuoteEngine::new(chain.clone(), registry.clone(), router);
        Self {
            chain,
            registry,
            quotes,
            allowance,
            sanctions,
            gas,
            risk,
        }
    }

    /// Configure the labelled fallback used for price quotes only
    pub fn with_simulation(mut self, mode: SimulationMode, rate: Decimal) -> Self {
        self.quotes = self.quotes.with_simulation(mode, rate);
        self
    }

    pub fn quotes(&self) -> &QuoteEngine {
        &self.quotes
    }

    pub fn allowance(&self) -> &AllowanceGate {
        &self.allowance
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn default_slippage(&self) -> Decimal {
        self.risk.default_slippage_percent
    }

    /// Native transfer of `amount` to `to`.
    ///
    /// The recipient is screened before anything is built.
    pub async fn build_transfer(&self, to: &str, amount: Decimal) -> Result<TxRequest> {
        let recipient = parse_address(to)?;

        match self.sanctions.is_sanctioned(recipient).await {
            Ok(false) => {}
            Ok(true) => return Err(Error::SanctionedRecipient(recipient.to_string())),
            Err(e) => {
                tracing::warn!(error = %e, "Sanctions screen unavailable, refusing transfer");
                return Err(Error::SanctionedRecipient(recipient.to_string()));
            }
        }

        let value = to_base_units(amount, NATIVE_DECIMALS)?;
        let gas_price = self.chain.gas_price().await?;
        tracing::info!(
            to = %recipient,
            value = %format_units(value, NATIVE_DECIMALS),
            "Built transfer"
        );

        Ok(TxRequest {
            to: recipient,
            value,
            data: Bytes::new(),
            gas: self.gas.transfer,
            gas_price,
            nonce: None,
            chain_id: self.chain.chain_id(),
        })
    }

    /// Reject slippage outside `[0, max_slippage_percent]`
    pub fn check_slippage(&self, slippage_percent: Decimal) -> Result<()> {
        let max = self.risk.max_slippage_percent;
        if slippage_percent < Decimal::ZERO || slippage_percent > max {
            return Err(Error::Blocked(format!(
                "Requested slippage {:.2}% exceeds maximum allowed {:.2}%",
                slippage_percent, max
            )));
        }
        tracing::debug!(
            requested_slippage = %slippage_percent,
            max_slippage = %max,
            "Slippage check passed"
        );
        Ok(())
    }

    /// Router swap of `amount` `from_symbol` into `to_symbol` for `trader`.
    ///
    /// A non-native source must already be approved for the full amount;
    /// otherwise this fails with `InsufficientAllowance`.
    pub async fn build_swap(
        &self,
        from_symbol: &str,
        to_symbol: &str,
        amount: Decimal,
        trader: Address,
        slippage_percent: Decimal,
    ) -> Result<BuiltSwap> {
        self.check_slippage(slippage_percent)?;

        let from = self.registry.resolve(from_symbol)?;
        let to = self.registry.resolve(to_symbol)?;
        if from.address == to.address {
            return Err(Error::InvalidArgument(format!(
                "cannot swap {} into itself",
                from.symbol
            )));
        }
        let direction = SwapDirection::between(&from, &to)?;

        let chain = self.chain.as_ref();
        let (from_decimals, to_decimals) = futures::try_join!(
            self.registry.decimals(chain, &from),
            self.registry.decimals(chain, &to)
        )?;
        let amount_in = to_base_units(amount, from_decimals)?;

        if !from.is_native() {
            let status = self.allowance.status(&from, amount_in, trader).await?;
            if !status.sufficient {
                return Err(Error::InsufficientAllowance {
                    token: from.symbol.clone(),
                    current: format_units(status.current_allowance, from_decimals),
                    required: format_units(status.required_amount, from_decimals),
                });
            }
        }

        let path = self.quotes.path(&from, &to);
        let expected_out = self
            .quotes
            .expected_output(&path, amount_in)
            .await
            .map_err(|e| match e {
                Error::NoLiquidity(reason) => Error::QuoteUnavailable(format!(
                    "{} -> {}: {}",
                    from.symbol, to.symbol, reason
                )),
                other => other,
            })?;
        let min_out = apply_slippage(expected_out, slippage_percent)?;
        let deadline = u64::try_from(chrono::Utc::now().timestamp() + SWAP_DEADLINE_SECS)
            .map_err(|_| Error::InvalidArgument("system clock is before the epoch".to_string()))?;

        let (value, data) = encode_swap(direction, amount_in, min_out, path, trader, deadline);
        let gas_price = chain.gas_price().await?;

        tracing::info!(
            from = %from.symbol,
            to = %to.symbol,
            amount_in = %amount_in,
            expected_out = %expected_out,
            min_out = %min_out,
            function = direction.router_function(),
            "Built swap"
        );

        Ok(BuiltSwap {
            tx: TxRequest {
                to: self.quotes.router().router,
                value,
                data,
                gas: self.gas.swap,
                gas_price,
                nonce: None,
                chain_id: chain.chain_id(),
            },
            direction,
            expected_output: from_base_units(expected_out, to_decimals)?,
            minimum_output: from_base_units(min_out, to_decimals)?,
            from,
            to,
            amount_in,
            expected_out,
            min_out,
            deadline,
        })
    }
}

fn encode_swap(
    direction: SwapDirection,
    amount_in: U256,
    min_out: U256,
    path: Vec<Address>,
    trader: Address,
    deadline: u64,
) -> (U256, Bytes) {
    let deadline = U256::from(deadline);
    match direction {
        SwapDirection::NativeToToken => {
            let call = IUniswapV2Router02::swapExactETHForTokensCall {
                amountOutMin: min_out,
                path,
                to: trader,
                deadline,
            };
            (amount_in, call.abi_encode().into())
        }
        SwapDirection::TokenToNative => {
            let call = IUniswapV2Router02::swapExactTokensForETHCall {
                amountIn: amount_in,
                amountOutMin: min_out,
                path,
                to: trader,
                deadline,
            };
            (U256::ZERO, call.abi_encode().into())
        }
        SwapDirection::TokenToToken => {
            let call = IUniswapV2Router02::swapExactTokensForTokensCall {
                amountIn: amount_in,
                amountOutMin: min_out,
                path,
                to: trader,
                deadline,
            };
            (U256::ZERO, call.abi_encode().into())
        }
    }
}

/// Strict address format: `0x` followed by exactly 40 hex digits
pub fn parse_address(input: &str) -> Result<Address> {
    let valid = input.len() == 42
        && input.starts_with("0x")
        && input[2..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(Error::InvalidAddress(input.to_string()));
    }
    input
        .parse::<Address>()
        .map_err(|_| Error::InvalidAddress(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::super::testing::{dex_chain, DexState};
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::sanctions::DenylistScreen;
    use alloy::primitives::address;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    const TRADER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    const DEAD: Address = address!("000000000000000000000000000000000000dead");

    struct Fixture {
        state: Arc<Mutex<DexState>>,
        builder: TradeBuilder,
        router: RouterConfig,
    }

    fn fixture_with(sanctions: Arc<dyn SanctionsScreen>) -> Fixture {
        let router = RouterConfig::blazeswap();
        let registry = Arc::new(TokenRegistry::new(&router, "FLR"));
        let state = Arc::new(Mutex::new(DexState::default()));
        {
            let mut s = state.lock().unwrap();
            s.decimals.insert(router.tokens["USDT"], 6);
            s.decimals.insert(router.tokens["USDC.E"], 6);
            s.decimals.insert(router.tokens["BNZ"], 18);
        }
        let chain: Arc<MockChain> = Arc::new(dex_chain(state.clone()));
        let builder = TradeBuilder::new(
            chain,
            registry,
            router.clone(),
            sanctions,
            GasLimits::default(),
            RiskConfig::default(),
        );
        Fixture {
            state,
            builder,
            router,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(DenylistScreen::new([DEAD])))
    }

    #[tokio::test]
    async fn native_to_token_swap_applies_slippage() {
        let f = fixture();
        let usdt = f.router.tokens["USDT"];
        f.state
            .lock()
            .unwrap()
            .amounts_out
            .insert(usdt, U256::from(9_980_000u64));

        let swap = f
            .builder
            .build_swap("FLR", "USDT", dec!(10), TRADER, dec!(0.5))
            .await
            .unwrap();

        assert_eq!(swap.direction, SwapDirection::NativeToToken);
        assert_eq!(swap.min_out, U256::from(9_930_100u64));
        assert_eq!(swap.minimum_output, dec!(9.9301));
        assert_eq!(swap.tx.to, f.router.router);
        assert_eq!(swap.tx.value, U256::from(10_000_000_000_000_000_000u128));
        assert_eq!(swap.tx.gas, 200_000);
        assert!(swap.tx.nonce.is_none());

        let call =
            IUniswapV2Router02::swapExactETHForTokensCall::abi_decode(&swap.tx.data).unwrap();
        assert_eq!(call.amountOutMin, U256::from(9_930_100u64));
        assert_eq!(call.path, vec![f.router.wrapped_native, usdt]);
        assert_eq!(call.to, TRADER);

        let now = chrono::Utc::now().timestamp() as u64;
        let deadline = call.deadline.to::<u64>();
        assert!(deadline > now + 1100 && deadline <= now + 1200);
    }

    #[tokio::test]
    async fn token_swap_waits_for_allowance() {
        let f = fixture();
        let bnz = f.router.tokens["BNZ"];
        let usdc = f.router.tokens["USDC.E"];
        f.state
            .lock()
            .unwrap()
            .amounts_out
            .insert(usdc, U256::from(25_000_000u64));
        let required = U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64));

        let err = f
            .builder
            .build_swap("BNZ", "USDC.e", dec!(100), TRADER, dec!(0.5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientAllowance { .. }));

        // allowance one base unit short is still insufficient
        f.state
            .lock()
            .unwrap()
            .allowances
            .insert(bnz, required - U256::from(1u64));
        assert!(f
            .builder
            .build_swap("BNZ", "USDC.e", dec!(100), TRADER, dec!(0.5))
            .await
            .is_err());

        f.state.lock().unwrap().allowances.insert(bnz, required);
        let swap = f
            .builder
            .build_swap("BNZ", "USDC.e", dec!(100), TRADER, dec!(0.5))
            .await
            .unwrap();
        assert_eq!(swap.direction, SwapDirection::TokenToToken);
        assert_eq!(swap.tx.value, U256::ZERO);
        let call =
            IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(&swap.tx.data).unwrap();
        assert_eq!(call.amountIn, required);
        assert_eq!(call.path, vec![bnz, usdc]);
    }

    #[tokio::test]
    async fn token_to_native_uses_eth_variant() {
        let f = fixture();
        let usdt = f.router.tokens["USDT"];
        {
            let mut s = f.state.lock().unwrap();
            s.allowances.insert(usdt, U256::MAX);
            let fifty = U256::from(50u64) * U256::from(10u64).pow(U256::from(18u64));
            s.amounts_out.insert(f.router.wrapped_native, fifty);
        }

        let swap = f
            .builder
            .build_swap("usdt", "flr", dec!(1), TRADER, dec!(1))
            .await
            .unwrap();
        assert_eq!(swap.direction, SwapDirection::TokenToNative);
        let call =
            IUniswapV2Router02::swapExactTokensForETHCall::abi_decode(&swap.tx.data).unwrap();
        assert_eq!(call.amountIn, U256::from(1_000_000u64));
        assert_eq!(call.path, vec![usdt, f.router.wrapped_native]);
        assert_eq!(swap.expected_output, dec!(50));
        assert_eq!(swap.minimum_output, dec!(49.5));
    }

    #[tokio::test]
    async fn unpriceable_path_is_quote_unavailable() {
        let f = fixture();
        f.state.lock().unwrap().router_reverts = true;
        let err = f
            .builder
            .build_swap("FLR", "USDT", dec!(1), TRADER, dec!(0.5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuoteUnavailable(_)));
    }

    #[tokio::test]
    async fn swap_rejects_bad_requests() {
        let f = fixture();
        let err = f
            .builder
            .build_swap("FLR", "USDT", dec!(1), TRADER, dec!(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Blocked(_)));

        let err = f
            .builder
            .build_swap("FLR", "C2FLR", dec!(1), TRADER, dec!(0.5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = f
            .builder
            .build_swap("FLR", "XYZ", dec!(1), TRADER, dec!(0.5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownToken(_)));

        let err = f
            .builder
            .build_swap("FLR", "USDT", dec!(0), TRADER, dec!(0.5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn transfer_builds_native_value() {
        let f = fixture();
        let tx = f
            .builder
            .build_transfer("0x70997970C51812dc3A010C7d01b50e0d17dc79C8", dec!(1.5))
            .await
            .unwrap();
        assert_eq!(tx.to, address!("70997970c51812dc3a010c7d01b50e0d17dc79c8"));
        assert_eq!(tx.value, U256::from(1_500_000_000_000_000_000u128));
        assert!(tx.data.is_empty());
        assert_eq!(tx.gas, 21_000);
        assert_eq!(tx.chain_id, 14);
    }

    #[tokio::test]
    async fn transfer_rejects_malformed_addresses() {
        let f = fixture();
        let cases = [
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C",   // 41 chars
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8a", // 43 chars
            "0070997970C51812dc3A010C7d01b50e0d17dc79C8",  // no 0x prefix
            "0x70997970C51812dc3A010C7d01b50e0d17dc79Zz",  // non-hex
            "",
        ];
        for case in cases {
            let err = f.builder.build_transfer(case, dec!(1)).await.unwrap_err();
            assert!(matches!(err, Error::InvalidAddress(_)), "{}", case);
        }
    }

    #[tokio::test]
    async fn transfer_to_sanctioned_recipient_is_refused() {
        let f = fixture();
        let err = f
            .builder
            .build_transfer("0x000000000000000000000000000000000000dEaD", dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SanctionedRecipient(_)));
    }

    struct BrokenScreen;

    #[async_trait]
    impl SanctionsScreen for BrokenScreen {
        async fn is_sanctioned(&self, _address: Address) -> Result<bool> {
            Err(Error::Rpc("screen offline".to_string()))
        }
    }

    #[tokio::test]
    async fn unavailable_screen_fails_closed() {
        let f = fixture_with(Arc::new(BrokenScreen));
        let err = f
            .builder
            .build_transfer("0x70997970C51812dc3A010C7d01b50e0d17dc79C8", dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SanctionedRecipient(_)));
    }
}
