//! DeFi Chat Agent Core
//!
//! Transaction lifecycle and DEX trade construction for a chat-driven agent
//! on Flare:
//! - Classify each chat message and route it to a handler
//! - Build native transfers and Uniswap-V2-style router swaps
//! - Stage every transaction until the user repeats the exact request
//! - Gate token swaps on an ERC-20 approval, staged as its own step
//!
//! # Security Model
//!
//! - Nothing is signed before an explicit, exact-match confirmation
//! - A staged transaction is broadcast at most once, whatever the outcome
//! - Recipients are screened before a transfer is built; screening failures refuse
//! - Private keys never leave the wallet module
//! - Full audit trail of staged, sent, replaced and refused transactions

pub mod audit;
pub mod chain;
pub mod config;
pub mod dex;
pub mod dispatcher;
pub mod intents;
pub mod sanctions;
pub mod session;
pub mod tokens;
pub mod units;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::{Config, Network, RpcConfig, PRIVATE_KEY_ENV};
pub use dispatcher::{Dispatcher, Response};
pub use error::{Error, Result};
pub use session::SessionId;
