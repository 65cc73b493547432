//! Command dispatcher
//!
//! Owns every chat session and turns one raw message into one response.
//! Per message the checks run in this order:
//! 1. slash commands (`/reset`)
//! 2. exact repeat of the staged trigger message: confirm and send
//! 3. pending attestation: the message is the attestation nonce
//! 4. intent classifier, then the routing table

use crate::audit::AuditLog;
use crate::chain::{self, ChainClient};
use crate::config::{Config, RpcSettings};
use crate::dex::{AllowanceCheck, TradeBuilder, TxRequest};
use crate::intents::{
    Attestor, Conversation, HttpIntentClassifier, IntentClassifier, ParameterExtractor,
    RouteLabel, RuleBasedIntents,
};
use crate::sanctions::{DenylistScreen, SanctionsScreen};
use crate::session::{
    NonceAllocator, SentTransaction, Session, SessionId, SwapRequest, TxPurpose,
};
use crate::tokens::TokenRegistry;
use crate::units::{format_units, NATIVE_DECIMALS};
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::primitives::B256;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Fixed reply for routes without a configured handler
pub const UNSUPPORTED_RESPONSE: &str = "Unsupported route";

/// Prefix on any answer built from a simulated quote
pub const SIMULATED_PREFIX: &str = "[SIMULATED]";

const RESET_COMMAND: &str = "/reset";

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub text: String,
    /// Classified route; `None` for commands, confirmations and attestations
    pub route: Option<RouteLabel>,
    /// Hash of a transaction broadcast while handling the message
    pub tx_hash: Option<B256>,
}

impl Response {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            route: None,
            tx_hash: None,
        }
    }
}

pub struct Dispatcher {
    chain: Arc<dyn ChainClient>,
    builder: TradeBuilder,
    classifier: Arc<dyn IntentClassifier>,
    extractor: Arc<dyn ParameterExtractor>,
    sanctions: Arc<dyn SanctionsScreen>,
    attestor: Option<Arc<dyn Attestor>>,
    conversation: Option<Arc<dyn Conversation>>,
    audit: AuditLog,
    nonces: NonceAllocator,
    default_wallet: Option<Arc<SecureWallet>>,
    rpc: RpcSettings,
    dex_name: String,
    explorer_url: String,
    sessions: HashMap<SessionId, Session>,
}

impl Dispatcher {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        builder: TradeBuilder,
        classifier: Arc<dyn IntentClassifier>,
        extractor: Arc<dyn ParameterExtractor>,
        sanctions: Arc<dyn SanctionsScreen>,
    ) -> Self {
        let dex_name = builder.quotes().router().name.clone();
        Self {
            chain,
            builder,
            classifier,
            extractor,
            sanctions,
            attestor: None,
            conversation: None,
            audit: AuditLog::disabled(),
            nonces: NonceAllocator::new(),
            default_wallet: None,
            rpc: RpcSettings::default(),
            dex_name,
            explorer_url: String::new(),
            sessions: HashMap::new(),
        }
    }

    /// Wire up the default collaborators from configuration
    pub fn from_config(
        config: &Config,
        chain: Arc<dyn ChainClient>,
        wallet: Option<SecureWallet>,
    ) -> Result<Self> {
        let registry = Arc::new(TokenRegistry::new(&config.dex, config.network.native_symbol()));
        let sanctions: Arc<dyn SanctionsScreen> =
            Arc::new(DenylistScreen::from_config(&config.sanctions)?);
        let builder = TradeBuilder::new(
            chain.clone(),
            registry,
            config.dex.clone(),
            sanctions.clone(),
            config.gas.clone(),
            config.risk.clone(),
        )
        .with_simulation(config.simulation, config.simulated_rate);

        let rules = Arc::new(RuleBasedIntents::new());
        let classifier: Arc<dyn IntentClassifier> = match &config.classifier_url {
            Some(url) => Arc::new(HttpIntentClassifier::new(url, config.rpc.timeout())?),
            None => rules.clone(),
        };
        let audit = match &config.audit_log_path {
            Some(path) => AuditLog::new(path),
            None => AuditLog::disabled(),
        };

        let mut dispatcher = Self::new(chain, builder, classifier, rules, sanctions)
            .with_audit(audit)
            .with_rpc_settings(config.rpc.clone())
            .with_explorer(config.network.explorer_url());
        if let Some(wallet) = wallet {
            dispatcher = dispatcher.with_wallet(wallet);
        }
        Ok(dispatcher)
    }

    pub fn with_attestor(mut self, attestor: Arc<dyn Attestor>) -> Self {
        self.attestor = Some(attestor);
        self
    }

    pub fn with_conversation(mut self, conversation: Arc<dyn Conversation>) -> Self {
        self.conversation = Some(conversation);
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// Account every new session starts with
    pub fn with_wallet(mut self, wallet: SecureWallet) -> Self {
        self.default_wallet = Some(Arc::new(wallet));
        self
    }

    pub fn with_rpc_settings(mut self, rpc: RpcSettings) -> Self {
        self.rpc = rpc;
        self
    }

    pub fn with_explorer(mut self, explorer_url: impl Into<String>) -> Self {
        self.explorer_url = explorer_url.into();
        self
    }

    pub fn open_session(&mut self) -> SessionId {
        let id = SessionId::new();
        self.sessions
            .insert(id, Session::new(id, self.default_wallet.clone()));
        id
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// End a session, discarding anything it had staged.
    pub async fn close_session(&mut self, id: SessionId) -> bool {
        let Some(mut session) = self.sessions.remove(&id) else {
            return false;
        };
        if let Some(outcome) = session.reset() {
            self.audit.stage_cleared(id, &outcome).await;
        }
        tracing::info!(session = %id, "Session closed");
        true
    }

    /// Handle one message for `session`, opening the session if needed.
    pub async fn handle(&mut self, session_id: SessionId, message: &str) -> Response {
        let mut session = self
            .sessions
            .remove(&session_id)
            .unwrap_or_else(|| Session::new(session_id, self.default_wallet.clone()));
        let response = self.process(&mut session, message).await;
        self.sessions.insert(session_id, session);
        response
    }

    async fn process(&self, session: &mut Session, message: &str) -> Response {
        if message.trim_start().starts_with('/') {
            return self.command(session, message.trim()).await;
        }
        if session.staging.confirm_if_matches(message).is_some() {
            return self.confirm(session).await;
        }
        if session.attestation_pending {
            return self.attestation_response(session, message).await;
        }

        let route = self.classifier.classify(message).await;
        tracing::info!(session = %session.id(), route = %route, "Routing message");
        let result = match route {
            RouteLabel::GenerateAccount => Ok(self.generate_account(session)),
            RouteLabel::SendToken => self.send_token(session, message).await,
            RouteLabel::TokenSwap => self.token_swap(session, message).await,
            RouteLabel::PriceQuote => self.price_quote(message).await,
            RouteLabel::RequestAttestation => Ok(self.request_attestation(session)),
            RouteLabel::CheckLiquidity => self.check_liquidity(message).await,
            RouteLabel::CheckSanctions => self.check_sanctions(session, message).await,
            RouteLabel::Conversation => self.conversation(message).await,
        };

        let text = match result {
            Ok(text) => text,
            Err(e) => self.error_text(session, route, e).await,
        };
        Response {
            text,
            route: Some(route),
            tx_hash: None,
        }
    }

    async fn command(&self, session: &mut Session, command: &str) -> Response {
        match command {
            RESET_COMMAND => {
                if let Some(outcome) = session.reset() {
                    self.audit.stage_cleared(session.id(), &outcome).await;
                }
                tracing::info!(session = %session.id(), "Session reset");
                Response::text("Session reset. Any staged transaction was discarded.")
            }
            other => Response::text(format!("Unknown command {}", other)),
        }
    }

    async fn error_text(&self, session: &Session, route: RouteLabel, error: Error) -> String {
        tracing::warn!(session = %session.id(), route = %route, error = %error, "Request failed");
        match error {
            Error::SanctionedRecipient(address) => {
                self.audit.sanctioned_recipient(session.id(), &address).await;
                "I can't send funds to that recipient.".to_string()
            }
            e if e.is_validation() => format!("Invalid request: {}", e),
            e => format!("Sorry, I couldn't process your request: {}", e),
        }
    }

    async fn stage(&self, session: &mut Session, trigger: &str, tx: TxRequest, purpose: TxPurpose) {
        if let Some(displaced) = session.staging.stage(trigger, tx, purpose) {
            self.audit.stage_cleared(session.id(), &displaced).await;
        }
        if let Some(pending) = session.staging.pending() {
            self.audit.tx_staged(session.id(), pending).await;
        }
    }

    fn confirm_hint(trigger: &str) -> String {
        format!("To confirm, send exactly: \"{}\"", trigger)
    }

    fn generate_account(&self, session: &mut Session) -> String {
        let (wallet, created) = session.ensure_wallet();
        if created {
            format!(
                "Account created - {}\nFund it with {} before sending transactions.",
                wallet.address_string(),
                self.builder.registry().native_symbol()
            )
        } else {
            format!("Account exists - {}", wallet.address_string())
        }
    }

    async fn send_token(&self, session: &mut Session, message: &str) -> Result<String> {
        let native = self.builder.registry().native_symbol().to_string();
        let Some(params) = self.extractor.transfer(message).await else {
            return Ok(format!(
                "I need more information to process your transfer. Please specify the \
                 destination address and the amount of {} you want to send.",
                native
            ));
        };
        session.ensure_wallet();

        let tx = self.builder.build_transfer(&params.to, params.amount).await?;
        let preview = format!(
            "Transaction Preview: Sending {} {} to {}\n{}",
            format_units(tx.value, NATIVE_DECIMALS),
            native,
            tx.to.to_checksum(None),
            Self::confirm_hint(message)
        );
        self.stage(session, message, tx, TxPurpose::Transfer).await;
        Ok(preview)
    }

    async fn token_swap(&self, session: &mut Session, message: &str) -> Result<String> {
        let Some(params) = self.extractor.swap(message).await else {
            return Ok("I need more information to process your swap. Please specify the \
                       token you want to swap from, the token you want to swap to, and the amount."
                .to_string());
        };
        let request = SwapRequest {
            from: params.from,
            to: params.to,
            amount: params.amount,
            slippage_percent: params
                .slippage_percent
                .unwrap_or_else(|| self.builder.default_slippage()),
        };
        self.prepare_swap(session, &request, message).await
    }

    /// Quote, gate on allowance, then stage either the approval or the swap.
    async fn prepare_swap(
        &self,
        session: &mut Session,
        request: &SwapRequest,
        trigger: &str,
    ) -> Result<String> {
        let (wallet, _) = session.ensure_wallet();
        self.builder.check_slippage(request.slippage_percent)?;

        // A swap that cannot be priced is never staged
        let quote = self
            .builder
            .quotes()
            .get_quote(&request.from, &request.to, request.amount)
            .await
            .map_err(|e| match e {
                Error::NoLiquidity(reason) => Error::QuoteUnavailable(reason),
                other => other,
            })?;
        if quote.is_simulated() {
            return Err(Error::QuoteUnavailable(format!(
                "{} -> {} cannot be priced by the router",
                quote.from, quote.to
            )));
        }

        let from = self.builder.registry().resolve(&request.from)?;
        if !from.is_native() {
            let check = self
                .builder
                .allowance()
                .ensure_allowance(&from, request.amount, wallet.address())
                .await?;
            if let AllowanceCheck::ApprovalNeeded { approval_tx, .. } = check {
                let preview = format!(
                    "Transaction Preview (1/2): Approve {} {} for trading on {}\n\
                     Next: swap for approximately {:.6} {} (Price Impact: {:.2}%)\n{}",
                    quote.input_amount,
                    quote.from,
                    self.dex_name,
                    quote.output_amount,
                    quote.to,
                    quote.price_impact_percent,
                    Self::confirm_hint(trigger)
                );
                let purpose = TxPurpose::Approval {
                    follow_up: request.clone(),
                };
                self.stage(session, trigger, approval_tx, purpose).await;
                return Ok(preview);
            }
        }

        let swap = self
            .builder
            .build_swap(
                &request.from,
                &request.to,
                request.amount,
                wallet.address(),
                request.slippage_percent,
            )
            .await?;
        let preview = format!(
            "Transaction Preview: Swap {} {} for approximately {:.6} {} \
             (minimum {} {}, Price Impact: {:.2}%)\n{}",
            quote.input_amount,
            swap.from.symbol,
            swap.expected_output,
            swap.to.symbol,
            swap.minimum_output,
            swap.to.symbol,
            quote.price_impact_percent,
            Self::confirm_hint(trigger)
        );
        self.stage(session, trigger, swap.tx, TxPurpose::Swap).await;
        Ok(preview)
    }

    async fn confirm(&self, session: &mut Session) -> Response {
        let Some(wallet) = session.wallet().cloned() else {
            session.staging.reset();
            return Response::text("No account is loaded for this session.");
        };
        let purpose = session
            .staging
            .pending()
            .map(|p| p.purpose().clone())
            .unwrap_or(TxPurpose::Transfer);

        let sent = match session
            .staging
            .send_staged(self.chain.as_ref(), &wallet, &self.nonces)
            .await
        {
            Ok(sent) => sent,
            Err(e) => {
                self.audit.tx_failed(session.id(), purpose.label(), &e).await;
                tracing::warn!(session = %session.id(), error = %e, "Staged transaction failed");
                return Response::text(format!(
                    "Transaction failed: {}\n\
                     Nothing is staged any more; send your request again to retry.",
                    e
                ));
            }
        };
        self.audit.tx_sent(session.id(), &sent).await;

        let mut response = match &sent.purpose {
            TxPurpose::Approval { follow_up } => {
                let follow_up = follow_up.clone();
                Response::text(self.after_approval(session, &sent, &follow_up).await)
            }
            _ => Response::text(format!(
                "Transaction sent: {}\nExplorer: {}tx/{}",
                sent.hash, self.explorer_url, sent.hash
            )),
        };
        response.tx_hash = Some(sent.hash);
        response
    }

    /// Wait for the approval to be mined, then stage the swap it unlocks
    async fn after_approval(
        &self,
        session: &mut Session,
        approval: &SentTransaction,
        request: &SwapRequest,
    ) -> String {
        let mined = chain::wait_for_receipt(
            self.chain.as_ref(),
            approval.hash,
            self.rpc.receipt_timeout(),
            self.rpc.receipt_poll(),
        )
        .await;

        match mined {
            Ok(true) => {}
            Ok(false) => {
                let error = Error::RpcRejected(format!("approval {} reverted", approval.hash));
                self.audit.tx_failed(session.id(), "approval", &error).await;
                return format!("{}\nSend your swap request again to retry.", error);
            }
            Err(e) => {
                return format!(
                    "Approval {} submitted but not confirmed yet ({}). \
                     Send your swap request again once it is mined.",
                    approval.hash, e
                );
            }
        }

        match self
            .prepare_swap(session, request, &approval.trigger_message)
            .await
        {
            Ok(preview) => format!(
                "Approval confirmed: {}\n{}",
                approval.hash,
                preview.replacen("Transaction Preview:", "Transaction Preview (2/2):", 1)
            ),
            Err(e) => format!(
                "Approval confirmed: {}\nBut the swap could not be prepared: {}",
                approval.hash, e
            ),
        }
    }

    async fn price_quote(&self, message: &str) -> Result<String> {
        let Some((from, to)) = self.extractor.token_pair(message).await else {
            return Ok("Which pair should I quote? For example: price of FLR in USDT".to_string());
        };
        let amount = Decimal::ONE;
        let quote = self.builder.quotes().get_quote(&from, &to, amount).await?;

        let text = format!(
            "Price Quote: {} {} ≈ {:.6} {}\nRate: 1 {} ≈ {:.6} {}\nPrice Impact: {:.2}%\n\n\
             To execute this swap, say: \"Swap {} {} to {}\"",
            amount,
            quote.from,
            quote.output_amount,
            quote.to,
            quote.from,
            quote.output_amount / amount,
            quote.to,
            quote.price_impact_percent,
            amount,
            quote.from,
            quote.to
        );
        if quote.is_simulated() {
            Ok(format!("{} {}", SIMULATED_PREFIX, text))
        } else {
            Ok(text)
        }
    }

    fn request_attestation(&self, session: &mut Session) -> String {
        if self.attestor.is_none() {
            return UNSUPPORTED_RESPONSE.to_string();
        }
        session.attestation_pending = true;
        "Please send the nonce to include in the attestation.".to_string()
    }

    async fn attestation_response(&self, session: &mut Session, message: &str) -> Response {
        session.attestation_pending = false;
        let Some(attestor) = &self.attestor else {
            return Response::text(UNSUPPORTED_RESPONSE);
        };
        match attestor.attest(&[message.to_string()]).await {
            Ok(token) => Response::text(token),
            Err(e) => {
                tracing::warn!(session = %session.id(), error = %e, "Attestation failed");
                Response::text(format!("Attestation failed: {}", e))
            }
        }
    }

    async fn check_liquidity(&self, message: &str) -> Result<String> {
        let Some((a, b)) = self.extractor.token_pair(message).await else {
            return Ok("Which pair should I check? For example: liquidity FLR/USDT".to_string());
        };
        let info = self.builder.quotes().check_liquidity(&a, &b).await?;
        Ok(format!(
            "Liquidity for {}/{} on {} (pair {}): {} {} / {} {}",
            info.token_a,
            info.token_b,
            self.dex_name,
            info.pair,
            info.reserve_a,
            info.token_a,
            info.reserve_b,
            info.token_b
        ))
    }

    async fn check_sanctions(&self, session: &Session, message: &str) -> Result<String> {
        let Some(address) = self.extractor.address(message).await else {
            return Ok("Which address should I check?".to_string());
        };
        let address = crate::dex::builder::parse_address(&address)?;
        match self.sanctions.is_sanctioned(address).await {
            Ok(false) => Ok(format!("No sanctions match found for {}.", address)),
            Ok(true) => {
                self.audit
                    .sanctioned_recipient(session.id(), &address.to_string())
                    .await;
                Ok("This address is not allowed to receive funds.".to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sanctions screen unavailable");
                Ok("I can't screen that address right now, so transfers to it are blocked."
                    .to_string())
            }
        }
    }

    async fn conversation(&self, message: &str) -> Result<String> {
        match &self.conversation {
            Some(conversation) => conversation.reply(message).await,
            None => Ok(UNSUPPORTED_RESPONSE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockChain, SendBehavior};
    use crate::chain::abi::{IUniswapV2Router02, IERC20};
    use crate::config::{GasLimits, RiskConfig, SimulationMode};
    use crate::dex::testing::{dex_chain, DexState};
    use crate::dex::RouterConfig;
    use alloy::consensus::Transaction;
    use alloy::primitives::{address, Address, U256};
    use alloy::sol_types::SolCall;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const RECIPIENT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const DEAD: Address = address!("000000000000000000000000000000000000dead");

    struct Harness {
        dispatcher: Dispatcher,
        chain: Arc<MockChain>,
        state: Arc<Mutex<DexState>>,
        router: RouterConfig,
        session: SessionId,
        trader: Address,
    }

    fn harness_with(simulation: SimulationMode, audit: AuditLog) -> Harness {
        let router = RouterConfig::blazeswap();
        let state = Arc::new(Mutex::new(DexState::default()));
        {
            let mut s = state.lock().unwrap();
            s.decimals.insert(router.tokens["USDT"], 6);
            s.decimals.insert(router.tokens["USDC.E"], 6);
            s.decimals.insert(router.tokens["BNZ"], 18);
            s.amounts_out.insert(router.tokens["USDT"], U256::from(9_980_000u64));
            s.amounts_out.insert(router.tokens["USDC.E"], U256::from(25_000_000u64));
        }
        let chain = Arc::new(dex_chain(state.clone()));
        let registry = Arc::new(TokenRegistry::new(&router, "FLR"));
        let sanctions: Arc<dyn SanctionsScreen> = Arc::new(DenylistScreen::new([DEAD]));
        let builder = TradeBuilder::new(
            chain.clone(),
            registry,
            router.clone(),
            sanctions.clone(),
            GasLimits::default(),
            RiskConfig::default(),
        )
        .with_simulation(simulation, dec!(0.02));
        let rules = Arc::new(RuleBasedIntents::new());
        let wallet = SecureWallet::from_hex(TEST_KEY).unwrap();
        let trader = wallet.address();

        let mut dispatcher = Dispatcher::new(
            chain.clone(),
            builder,
            rules.clone(),
            rules,
            sanctions,
        )
        .with_wallet(wallet)
        .with_audit(audit)
        .with_rpc_settings(RpcSettings {
            receipt_timeout_secs: 1,
            receipt_poll_ms: 10,
            ..RpcSettings::default()
        })
        .with_explorer("https://flare-explorer.flare.network/");
        let session = dispatcher.open_session();

        Harness {
            dispatcher,
            chain,
            state,
            router,
            session,
            trader,
        }
    }

    fn harness() -> Harness {
        harness_with(SimulationMode::Off, AuditLog::disabled())
    }

    #[tokio::test]
    async fn native_swap_is_staged_then_sent_on_exact_repeat() {
        let mut h = harness();
        let message = "Swap 10 FLR to USDT";

        let preview = h.dispatcher.handle(h.session, message).await;
        assert_eq!(preview.route, Some(RouteLabel::TokenSwap));
        assert!(preview.text.starts_with("Transaction Preview: Swap 10 FLR"), "{}", preview.text);
        assert!(h.chain.sent().is_empty());

        // case differs: not a confirmation, re-staged instead
        h.dispatcher.handle(h.session, "swap 10 FLR to USDT").await;
        assert!(h.chain.sent().is_empty());

        let confirmed = h.dispatcher.handle(h.session, "swap 10 FLR to USDT").await;
        assert!(confirmed.tx_hash.is_some(), "{}", confirmed.text);

        let sent = h.chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to(), Some(h.router.router));
        assert_eq!(sent[0].value(), U256::from(10_000_000_000_000_000_000u128));
        let call =
            IUniswapV2Router02::swapExactETHForTokensCall::abi_decode(sent[0].input()).unwrap();
        assert_eq!(call.amountOutMin, U256::from(9_930_100u64));
        assert_eq!(call.to, h.trader);
        assert!(h.dispatcher.session(h.session).unwrap().staging.is_empty());
    }

    #[tokio::test]
    async fn token_swap_stages_approval_first() {
        let mut h = harness();
        let bnz = h.router.tokens["BNZ"];
        let message = "swap 100 BNZ to USDC.e";
        let required = U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64));

        let preview = h.dispatcher.handle(h.session, message).await;
        assert!(
            preview.text.starts_with("Transaction Preview (1/2): Approve 100 BNZ"),
            "{}",
            preview.text
        );
        let pending = h.dispatcher.session(h.session).unwrap().staging.pending().unwrap();
        assert!(matches!(pending.purpose(), TxPurpose::Approval { .. }));
        assert_eq!(pending.tx().to, bnz);
        let approve = IERC20::approveCall::abi_decode(&pending.tx().data).unwrap();
        assert_eq!(approve.spender, h.router.router);
        assert_eq!(approve.amount, required);

        // the approval is mined and the allowance moves on chain
        h.state.lock().unwrap().allowances.insert(bnz, required);
        let confirmed = h.dispatcher.handle(h.session, message).await;
        assert!(confirmed.text.contains("Approval confirmed"), "{}", confirmed.text);
        assert!(confirmed.text.contains("Transaction Preview (2/2): Swap"), "{}", confirmed.text);

        let pending = h.dispatcher.session(h.session).unwrap().staging.pending().unwrap();
        assert_eq!(pending.purpose(), &TxPurpose::Swap);
        assert_eq!(pending.trigger_message(), message);

        h.dispatcher.handle(h.session, message).await;
        let sent = h.chain.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to(), Some(bnz));
        assert_eq!(sent[1].to(), Some(h.router.router));
        assert_eq!((sent[0].nonce(), sent[1].nonce()), (0, 1));
        let swap =
            IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(sent[1].input()).unwrap();
        assert_eq!(swap.amountIn, required);
    }

    #[tokio::test]
    async fn approval_without_allowance_change_is_reevaluated() {
        let mut h = harness();
        let message = "swap 100 BNZ to USDC.e";
        h.dispatcher.handle(h.session, message).await;

        // approval mined but the allowance never moved: approval is staged again
        let response = h.dispatcher.handle(h.session, message).await;
        assert!(response.text.contains("(1/2): Approve"), "{}", response.text);
        assert_eq!(h.chain.sent().len(), 1);
        let pending = h.dispatcher.session(h.session).unwrap().staging.pending().unwrap();
        assert!(matches!(pending.purpose(), TxPurpose::Approval { .. }));
    }

    #[tokio::test]
    async fn reverted_approval_stops_the_flow() {
        let mut h = harness();
        let message = "swap 100 BNZ to USDC.e";
        h.dispatcher.handle(h.session, message).await;
        h.chain.set_mined_status(Some(false));

        let response = h.dispatcher.handle(h.session, message).await;
        assert!(response.text.contains("reverted"), "{}", response.text);
        assert!(h.dispatcher.session(h.session).unwrap().staging.is_empty());
    }

    #[tokio::test]
    async fn transfer_preview_and_replacement() {
        let mut h = harness();
        let first = format!("send 1 FLR to {}", RECIPIENT);
        let second = format!("send 2 FLR to {}", RECIPIENT);

        let preview = h.dispatcher.handle(h.session, &first).await;
        assert!(
            preview
                .text
                .starts_with(&format!("Transaction Preview: Sending 1 FLR to {}", RECIPIENT)),
            "{}",
            preview.text
        );
        h.dispatcher.handle(h.session, &second).await;

        // the first stage was displaced, repeating it only stages it again
        h.dispatcher.handle(h.session, &first).await;
        assert!(h.chain.sent().is_empty());

        h.dispatcher.handle(h.session, &first).await;
        let sent = h.chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].value(), U256::from(1_000_000_000_000_000_000u128));
    }

    #[tokio::test]
    async fn rejected_send_clears_stage() {
        let mut h = harness();
        let message = format!("send 1 FLR to {}", RECIPIENT);
        h.dispatcher.handle(h.session, &message).await;
        h.chain.set_send_behavior(SendBehavior::Reject);

        let response = h.dispatcher.handle(h.session, &message).await;
        assert!(response.text.starts_with("Transaction failed"), "{}", response.text);
        assert!(response.tx_hash.is_none());
        assert!(h.dispatcher.session(h.session).unwrap().staging.is_empty());

        // the next identical message is a new request, not a resubmission
        h.chain.set_send_behavior(SendBehavior::Accept);
        let response = h.dispatcher.handle(h.session, &message).await;
        assert!(response.text.starts_with("Transaction Preview"));
        assert!(h.chain.sent().is_empty());
    }

    #[tokio::test]
    async fn sanctioned_recipient_gets_generic_refusal() {
        let audit_file = NamedTempFile::new().unwrap();
        let mut h = harness_with(SimulationMode::Off, AuditLog::new(audit_file.path()));

        let response = h
            .dispatcher
            .handle(h.session, "send 1 FLR to 0x000000000000000000000000000000000000dEaD")
            .await;
        assert_eq!(response.text, "I can't send funds to that recipient.");
        assert!(h.dispatcher.session(h.session).unwrap().staging.is_empty());

        let audit = std::fs::read_to_string(audit_file.path()).unwrap();
        assert!(audit.contains("sanctioned_recipient"));
        assert!(audit.to_lowercase().contains("0x000000000000000000000000000000000000dead"));
    }

    #[tokio::test]
    async fn invalid_address_is_reported() {
        let mut h = harness();
        let response = h.dispatcher.handle(h.session, "send 1 FLR to 0x1234").await;
        assert!(response.text.starts_with("Invalid request"), "{}", response.text);
        assert!(h.dispatcher.session(h.session).unwrap().staging.is_empty());
    }

    #[tokio::test]
    async fn reset_discards_stage() {
        let mut h = harness();
        let message = format!("send 1 FLR to {}", RECIPIENT);
        h.dispatcher.handle(h.session, &message).await;

        let response = h.dispatcher.handle(h.session, "/reset").await;
        assert!(response.text.starts_with("Session reset"));
        assert!(h.dispatcher.session(h.session).unwrap().staging.is_empty());

        h.dispatcher.handle(h.session, &message).await;
        assert!(h.chain.sent().is_empty());
    }

    #[tokio::test]
    async fn closing_a_session_discards_its_stage() {
        let audit_file = NamedTempFile::new().unwrap();
        let mut h = harness_with(SimulationMode::Off, AuditLog::new(audit_file.path()));
        let message = format!("send 1 FLR to {}", RECIPIENT);
        h.dispatcher.handle(h.session, &message).await;

        assert!(h.dispatcher.close_session(h.session).await);
        assert!(h.dispatcher.session(h.session).is_none());
        assert!(!h.dispatcher.close_session(h.session).await);

        let audit = std::fs::read_to_string(audit_file.path()).unwrap();
        assert!(audit.contains("stage_reset"));

        // the same id starts over, so the repeat is staged rather than sent
        let response = h.dispatcher.handle(h.session, &message).await;
        assert!(response.text.starts_with("Transaction Preview"));
        assert!(h.chain.sent().is_empty());
    }

    #[tokio::test]
    async fn sessions_do_not_share_stages() {
        let mut h = harness();
        let other = h.dispatcher.open_session();
        let message = format!("send 1 FLR to {}", RECIPIENT);
        h.dispatcher.handle(h.session, &message).await;

        let response = h.dispatcher.handle(other, &message).await;
        assert!(response.text.starts_with("Transaction Preview"));
        assert!(h.chain.sent().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_routes_are_unsupported() {
        let mut h = harness();
        let response = h.dispatcher.handle(h.session, "hello there").await;
        assert_eq!(response.route, Some(RouteLabel::Conversation));
        assert_eq!(response.text, UNSUPPORTED_RESPONSE);

        let response = h.dispatcher.handle(h.session, "please attest").await;
        assert_eq!(response.text, UNSUPPORTED_RESPONSE);
    }

    struct EchoAttestor;

    #[async_trait]
    impl Attestor for EchoAttestor {
        async fn attest(&self, nonces: &[String]) -> Result<String> {
            Ok(format!("token:{}", nonces.join(",")))
        }
    }

    #[tokio::test]
    async fn attestation_consumes_next_message() {
        let h = harness();
        let mut dispatcher = h.dispatcher.with_attestor(Arc::new(EchoAttestor));
        let session = h.session;

        let response = dispatcher.handle(session, "please attest").await;
        assert_eq!(response.route, Some(RouteLabel::RequestAttestation));
        let response = dispatcher.handle(session, "swap 1 FLR to USDT").await;
        assert_eq!(response.text, "token:swap 1 FLR to USDT");
        assert!(dispatcher.session(session).unwrap().staging.is_empty());
    }

    #[tokio::test]
    async fn account_generation_reports_existing() {
        let mut h = harness();
        let response = h.dispatcher.handle(h.session, "create an account").await;
        assert!(response.text.starts_with("Account exists - 0xf39F"), "{}", response.text);
    }

    #[tokio::test]
    async fn price_quote_uses_router() {
        let mut h = harness();
        let response = h.dispatcher.handle(h.session, "price of FLR in USDT").await;
        assert!(
            response.text.starts_with("Price Quote: 1 FLR ≈ 9.980000 USDT"),
            "{}",
            response.text
        );
    }

    #[tokio::test]
    async fn simulated_quotes_are_labelled_and_never_traded() {
        let mut h = harness_with(SimulationMode::LabeledFallback, AuditLog::disabled());
        h.state.lock().unwrap().router_reverts = true;

        let response = h.dispatcher.handle(h.session, "price of FLR in USDT").await;
        assert!(response.text.starts_with(SIMULATED_PREFIX), "{}", response.text);

        let response = h.dispatcher.handle(h.session, "swap 10 FLR to USDT").await;
        assert!(response.text.contains("Quote unavailable"), "{}", response.text);
        assert!(h.dispatcher.session(h.session).unwrap().staging.is_empty());
    }

    #[tokio::test]
    async fn router_failure_surfaces_without_simulation() {
        let mut h = harness();
        h.state.lock().unwrap().router_reverts = true;
        let response = h.dispatcher.handle(h.session, "price of FLR in USDT").await;
        assert!(response.text.contains("No liquidity"), "{}", response.text);

        let response = h.dispatcher.handle(h.session, "swap 10 FLR to USDT").await;
        assert!(response.text.contains("Quote unavailable"), "{}", response.text);
        assert!(h.dispatcher.session(h.session).unwrap().staging.is_empty());
        assert!(h.chain.sent().is_empty());
    }

    #[tokio::test]
    async fn sanctions_check_route() {
        let mut h = harness();
        let response = h
            .dispatcher
            .handle(h.session, "is 0x000000000000000000000000000000000000dead sanctioned?")
            .await;
        assert_eq!(response.text, "This address is not allowed to receive funds.");
        let response = h
            .dispatcher
            .handle(h.session, &format!("is {} sanctioned?", RECIPIENT))
            .await;
        assert!(response.text.starts_with("No sanctions match"));
    }
}
