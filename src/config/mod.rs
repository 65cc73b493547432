//! Configuration for the DeFi agent

pub mod rpc;

use crate::dex::RouterConfig;
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Environment variable holding the signing key
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Flare,
    Coston2,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Flare => 14,
            Network::Coston2 => 114,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Flare => "flare",
            Network::Coston2 => "coston2",
        }
    }

    /// Symbol of the chain's base currency
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Network::Flare => "FLR",
            Network::Coston2 => "C2FLR",
        }
    }

    pub fn explorer_url(&self) -> &'static str {
        match self {
            Network::Flare => "https://flare-explorer.flare.network/",
            Network::Coston2 => "https://coston2-explorer.flare.network/",
        }
    }
}

/// Risk management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Slippage applied when the request does not specify one (e.g. 0.5 for 0.5%)
    pub default_slippage_percent: Decimal,
    /// Maximum slippage tolerance accepted by the trade builder
    pub max_slippage_percent: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            default_slippage_percent: Decimal::new(5, 1),
            max_slippage_percent: Decimal::new(3, 0),
        }
    }
}

/// RPC call behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSettings {
    /// Per-call timeout (milliseconds)
    pub timeout_ms: u64,
    /// Extra attempts for read-only calls on transient failures
    pub read_retries: u32,
    /// Delay between read attempts, multiplied by the attempt number (milliseconds)
    pub retry_backoff_ms: u64,
    /// How long to wait for a submitted approval to be mined (seconds)
    pub receipt_timeout_secs: u64,
    /// Receipt polling interval (milliseconds)
    pub receipt_poll_ms: u64,
}

impl RpcSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            read_retries: 2,
            retry_backoff_ms: 500,
            receipt_timeout_secs: 120,
            receipt_poll_ms: 1_000,
        }
    }
}

/// Gas limits for the transactions the builder produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasLimits {
    pub transfer: u64,
    pub approve: u64,
    pub swap: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            transfer: 21_000,
            approve: 100_000,
            swap: 200_000,
        }
    }
}

/// Behaviour when the router cannot price a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// Surface the RPC failure to the user
    #[default]
    Off,
    /// Answer price quotes with a clearly labelled simulated value.
    /// Never used for building transactions.
    LabeledFallback,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network to operate on
    pub network: Network,
    /// DEX router selection
    #[serde(default)]
    pub dex: RouterConfig,
    /// Risk management settings
    #[serde(default)]
    pub risk: RiskConfig,
    /// RPC timeouts and retries
    #[serde(default)]
    pub rpc: RpcSettings,
    /// Gas limits
    #[serde(default)]
    pub gas: GasLimits,
    /// Recipient addresses that must never receive funds
    #[serde(default)]
    pub sanctions: Vec<String>,
    /// Remote intent classifier endpoint (rule-based classifier when unset)
    #[serde(default)]
    pub classifier_url: Option<String>,
    /// Quote fallback behaviour
    #[serde(default)]
    pub simulation: SimulationMode,
    /// Output per unit of input used for labelled simulated quotes
    #[serde(default = "default_simulated_rate")]
    pub simulated_rate: Decimal,
    /// Path to audit log file
    pub audit_log_path: Option<String>,
}

fn default_simulated_rate() -> Decimal {
    Decimal::ONE
}

impl Config {
    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the trade builder unusable
    pub fn validate(&self) -> Result<()> {
        let risk = &self.risk;
        if risk.max_slippage_percent < Decimal::ZERO
            || risk.max_slippage_percent >= Decimal::ONE_HUNDRED
        {
            return Err(Error::Config(format!(
                "max_slippage_percent must be in [0, 100), got {}",
                risk.max_slippage_percent
            )));
        }
        if risk.default_slippage_percent < Decimal::ZERO
            || risk.default_slippage_percent > risk.max_slippage_percent
        {
            return Err(Error::Config(format!(
                "default_slippage_percent {} must be between 0 and max_slippage_percent {}",
                risk.default_slippage_percent, risk.max_slippage_percent
            )));
        }
        if self.rpc.timeout_ms == 0 {
            return Err(Error::Config("rpc.timeout_ms must be non-zero".to_string()));
        }
        if self.simulated_rate <= Decimal::ZERO {
            return Err(Error::Config("simulated_rate must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Flare,
            dex: RouterConfig::default(),
            risk: RiskConfig::default(),
            rpc: RpcSettings::default(),
            gas: GasLimits::default(),
            sanctions: Vec::new(),
            classifier_url: None,
            simulation: SimulationMode::Off,
            simulated_rate: default_simulated_rate(),
            audit_log_path: Some("audit.jsonl".to_string()),
        }
    }
}
