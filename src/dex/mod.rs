//! Uniswap V2 style DEX integration
//!
//! One implementation parameterized by `RouterConfig`:
//! - `quote`: router pricing, price impact and liquidity reads
//! - `allowance`: ERC20 allowance checks and approval construction
//! - `builder`: transfer and swap transaction construction

pub mod allowance;
pub mod builder;
pub mod quote;
pub mod router;

pub use allowance::{AllowanceCheck, AllowanceGate, AllowanceStatus};
pub use builder::{SwapDirection, TradeBuilder, TxRequest, SWAP_DEADLINE_SECS};
pub use quote::{LiquidityInfo, Quote, QuoteEngine, QuoteSource};
pub use router::{DexPreset, RouterConfig};
