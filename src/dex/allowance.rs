//! Allowance gate
//!
//! Decides whether the router may already move the tokens a swap needs and,
//! when it may not, builds an approval for exactly the requested amount.

use super::TxRequest;
use crate::chain::{self, abi::IERC20, ChainClient};
use crate::tokens::{Token, TokenRegistry};
use crate::units::to_base_units;
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowanceStatus {
    pub current_allowance: U256,
    pub required_amount: U256,
    pub sufficient: bool,
}

#[derive(Debug, Clone)]
pub enum AllowanceCheck {
    Sufficient(AllowanceStatus),
    ApprovalNeeded {
        status: AllowanceStatus,
        approval_tx: TxRequest,
    },
}

impl AllowanceCheck {
    pub fn status(&self) -> &AllowanceStatus {
        match self {
            AllowanceCheck::Sufficient(status) => status,
            AllowanceCheck::ApprovalNeeded { status, .. } => status,
        }
    }
}

pub struct AllowanceGate {
    chain: Arc<dyn ChainClient>,
    registry: Arc<TokenRegistry>,
    spender: Address,
    approve_gas: u64,
}

impl AllowanceGate {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        registry: Arc<TokenRegistry>,
        spender: Address,
        approve_gas: u64,
    ) -> Self {
        Self {
            chain,
            registry,
            spender,
            approve_gas,
        }
    }

    /// Compare the on-chain allowance with `required` base units.
    ///
    /// Always reads fresh; allowances can change between calls.
    pub async fn status(
        &self,
        token: &Token,
        required: U256,
        owner: Address,
    ) -> Result<AllowanceStatus> {
        if token.is_native() {
            return Err(Error::NotApprovable(token.symbol.clone()));
        }
        let current =
            chain::erc20_allowance(self.chain.as_ref(), token.address, owner, self.spender).await?;
        Ok(AllowanceStatus {
            current_allowance: current,
            required_amount: required,
            sufficient: current >= required,
        })
    }

    pub async fn ensure_allowance(
        &self,
        token: &Token,
        amount: Decimal,
        owner: Address,
    ) -> Result<AllowanceCheck> {
        if token.is_native() {
            return Err(Error::NotApprovable(token.symbol.clone()));
        }
        let decimals = self.registry.decimals(self.chain.as_ref(), token).await?;
        let required = to_base_units(amount, decimals)?;
        let status = self.status(token, required, owner).await?;

        if status.sufficient {
            tracing::debug!(
                token = %token.symbol,
                allowance = %status.current_allowance,
                "Allowance sufficient"
            );
            return Ok(AllowanceCheck::Sufficient(status));
        }

        let data = IERC20::approveCall {
            spender: self.spender,
            amount: required,
        }
        .abi_encode();
        let approval_tx = TxRequest {
            to: token.address,
            value: U256::ZERO,
            data: data.into(),
            gas: self.approve_gas,
            gas_price: self.chain.gas_price().await?,
            nonce: None,
            chain_id: self.chain.chain_id(),
        };
        tracing::info!(
            token = %token.symbol,
            current = %status.current_allowance,
            required = %required,
            "Approval required before swap"
        );
        Ok(AllowanceCheck::ApprovalNeeded { status, approval_tx })
    }
}
