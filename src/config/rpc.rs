//! Flare JSON-RPC endpoints
//!
//! Resolution order:
//! 1. Per-chain env vars (FLARE_RPC_URL, COSTON2_RPC_URL) - highest priority
//! 2. FLARE_API_KEY - appended to the official Flare API endpoints
//! 3. Public RPC fallbacks - rate limited
//!
//! # Examples
//!
//! ```bash
//! # Dedicated endpoint per network
//! export FLARE_RPC_URL="https://rpc.ankr.com/flare/YOUR_KEY"
//!
//! # Official Flare API, key appended as x-apikey
//! export FLARE_API_KEY="YOUR_KEY"
//!
//! # Nothing set: public endpoints
//! ```

use crate::config::Network;
use std::collections::HashMap;

/// RPC configuration for the supported networks
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Endpoint per chain id
    urls: HashMap<u64, String>,
}

mod env_vars {
    pub const FLARE_RPC_URL: &str = "FLARE_RPC_URL";
    pub const COSTON2_RPC_URL: &str = "COSTON2_RPC_URL";
    pub const FLARE_API_KEY: &str = "FLARE_API_KEY";
}

/// Public RPC endpoints (rate limited)
mod public_rpcs {
    pub const FLARE: &str = "https://flare-api.flare.network/ext/C/rpc";
    pub const COSTON2: &str = "https://coston2-api.flare.network/ext/C/rpc";
}

impl RpcConfig {
    /// Resolve endpoints for both networks from the environment
    pub fn from_env() -> Self {
        let mut urls = HashMap::new();

        // Priority 1: per-chain env vars
        if let Ok(url) = std::env::var(env_vars::FLARE_RPC_URL) {
            tracing::debug!("Using FLARE_RPC_URL for Flare");
            urls.insert(Network::Flare.chain_id(), url);
        }
        if let Ok(url) = std::env::var(env_vars::COSTON2_RPC_URL) {
            tracing::debug!("Using COSTON2_RPC_URL for Coston2");
            urls.insert(Network::Coston2.chain_id(), url);
        }

        // Priority 2: official endpoints with an API key
        if let Ok(key) = std::env::var(env_vars::FLARE_API_KEY) {
            tracing::info!("Building RPC URLs from FLARE_API_KEY");
            urls.entry(Network::Flare.chain_id())
                .or_insert_with(|| format!("{}?x-apikey={}", public_rpcs::FLARE, key));
            urls.entry(Network::Coston2.chain_id())
                .or_insert_with(|| format!("{}?x-apikey={}", public_rpcs::COSTON2, key));
        }

        // Priority 3: public fallbacks
        if !urls.contains_key(&Network::Flare.chain_id()) {
            tracing::warn!("No RPC configured for Flare, using public RPC (rate limited)");
        }
        urls.entry(Network::Flare.chain_id())
            .or_insert_with(|| public_rpcs::FLARE.to_string());
        urls.entry(Network::Coston2.chain_id())
            .or_insert_with(|| public_rpcs::COSTON2.to_string());

        Self { urls }
    }

    pub fn with_urls(urls: HashMap<u64, String>) -> Self {
        Self { urls }
    }

    pub fn get(&self, chain_id: u64) -> Option<&str> {
        self.urls.get(&chain_id).map(|s| s.as_str())
    }

    /// Get RPC URL for a network
    pub fn for_network(&self, network: Network) -> Option<&str> {
        self.get(network.chain_id())
    }
}
