//! Router configuration: which DEX the trade builder talks to

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Built-in router presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DexPreset {
    Blazeswap,
    Sparkdex,
}

/// Wrapped FLR, shared by both Flare DEXes
const WFLR: Address = address!("1D80c49BbBCd1C0911346656B529DF9E5c2F783d");

/// A Uniswap V2 compatible router and the tokens it trades.
///
/// Token symbols are stored uppercase. The zero address denotes the native
/// asset; it is swapped for `wrapped_native` whenever a path is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RouterSpec")]
pub struct RouterConfig {
    pub name: String,
    pub factory: Address,
    pub router: Address,
    pub wrapped_native: Address,
    pub tokens: BTreeMap<String, Address>,
}

/// Accepted configuration shapes: a preset name or a full router definition
#[derive(Deserialize)]
#[serde(untagged)]
enum RouterSpec {
    Preset(DexPreset),
    Custom {
        #[serde(default = "custom_name")]
        name: String,
        factory: Address,
        router: Address,
        wrapped_native: Address,
        tokens: BTreeMap<String, Address>,
    },
}

fn custom_name() -> String {
    "custom".to_string()
}

impl TryFrom<RouterSpec> for RouterConfig {
    type Error = String;

    fn try_from(spec: RouterSpec) -> Result<Self, Self::Error> {
        match spec {
            RouterSpec::Preset(preset) => Ok(Self::preset(preset)),
            RouterSpec::Custom {
                name,
                factory,
                router,
                wrapped_native,
                tokens,
            } => Self::custom(name, factory, router, wrapped_native, tokens),
        }
    }
}

impl RouterConfig {
    pub fn preset(preset: DexPreset) -> Self {
        match preset {
            DexPreset::Blazeswap => Self::blazeswap(),
            DexPreset::Sparkdex => Self::sparkdex(),
        }
    }

    /// BlazeSwap on Flare
    pub fn blazeswap() -> Self {
        let tokens = [
            ("FLR", Address::ZERO),
            ("C2FLR", Address::ZERO),
            ("WFLR", WFLR),
            ("BNZ", address!("fD3449E8Ee31117a848D41Ee20F497a9bCb53164")),
            ("BUNNY", address!("1aa5282692398c078e71Fb3e4A85660d1BF8F586")),
            ("EUSDT", address!("96B41289D90444B8adD57e6F265DB5aE8651DF29")),
            ("EETH", address!("a76DCDdcE60a442d69Bac7158F3660f50921b122")),
            ("FINU", address!("282b88514A52FcAdCD92b742745398f3574697d4")),
            ("FLX", address!("22757fb83836e3F9F0F353126cACD3B1Dc82a387")),
            ("GEMIN", address!("b56718d45cffc7ca9d6b8b9e631f0657b971043f")),
            ("GFLR", address!("90e157A979074f9f2fe8B124Ba08e6F72dc812FC")),
            ("JOULE", address!("E6505f92583103AF7ed9974DEC451A7Af4e3A3bE")),
            ("PFL", address!("B5010D5Eb31AA8776b52C7394B76D6d627501C73")),
            ("PHIL", address!("932E691aA8c8306C4bB0b19F3f00a284371be8Ba")),
            ("POODLE", address!("C18f99CE6DD6278BE2D3f1e738Ed11623444aE33")),
            ("SFLR", address!("12e605bc104e93B45e1aD99F9e555f659051c2BB")),
            ("USDC.E", address!("FbDa5F676cB37624f28265A144A48B0d6e87d3b6")),
            ("USDT", address!("0B38e83B86d491735fEaa0a791F65c2B99535396")),
            ("USDX", address!("4A771Cc1a39FDd8AA08B8EA51F7Fd412e73B3d2B")),
        ];
        Self {
            name: "blazeswap".to_string(),
            factory: address!("440602f459D7Dd500a74528003e6A20A46d6e2A6"),
            router: address!("e3A1b355ca63abCBC9589334B5e609583C7BAa06"),
            wrapped_native: WFLR,
            tokens: tokens.iter().map(|(s, a)| (s.to_string(), *a)).collect(),
        }
    }

    /// SparkDEX (V2 pools) on Flare
    pub fn sparkdex() -> Self {
        let tokens = [
            ("FLR", Address::ZERO),
            ("WFLR", WFLR),
            ("USDC", address!("cD75D6d2Ea389BFE55ECf8Ee9B83dDc5E5513C1d")),
            ("USDT", address!("9Bf3C5E5c9F78a3DBf33d216d5Bc5EEa3e095BF5")),
            ("WETH", address!("5D3c0F4cA5EE99f8E8F59Ff9A5fAb04F6a7e007f")),
            ("SFLR", address!("02f0826ef6aD107Cfc861152B32B52fD11BaB9ED")),
        ];
        Self {
            name: "sparkdex".to_string(),
            factory: address!("16b619B04c961E8f4F06C10B42FDAbb328980A89"),
            router: address!("4a1E5A90e9943467FAd1acea1E7F0e5e88472a1e"),
            wrapped_native: WFLR,
            tokens: tokens.iter().map(|(s, a)| (s.to_string(), *a)).collect(),
        }
    }

    /// Validate and normalize a user supplied router definition
    pub fn custom(
        name: String,
        factory: Address,
        router: Address,
        wrapped_native: Address,
        tokens: BTreeMap<String, Address>,
    ) -> Result<Self, String> {
        if router == Address::ZERO || factory == Address::ZERO {
            return Err("router and factory addresses must be non-zero".to_string());
        }
        if wrapped_native == Address::ZERO {
            return Err("wrapped_native must be a token contract, not the zero address".to_string());
        }

        let mut normalized = BTreeMap::new();
        for (symbol, address) in tokens {
            let key = symbol.trim().to_uppercase();
            if key.is_empty() {
                return Err("token symbols must not be empty".to_string());
            }
            if normalized.insert(key.clone(), address).is_some() {
                return Err(format!("duplicate token symbol {}", key));
            }
        }

        Ok(Self {
            name,
            factory,
            router,
            wrapped_native,
            tokens: normalized,
        })
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::blazeswap()
    }
}
