//! Bridge flow
//!
//! Binds the components into the one coherent flow a page load runs:
//! host bridge initializes, the negotiator resolves an address, then
//! (in pay mode) a payment is built and carried through signing, and the
//! host gets the outcome. One flow object per page load; a stale flow is
//! discarded, never resumed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::WalletCache;
use crate::config::Config;
use crate::connect::{ConnectedWallet, ConnectionNegotiator};
use crate::error::{Error, Result};
use crate::host::{BridgeEnvelope, HostBridge, HostChannel};
use crate::ledger::LedgerGateway;
use crate::mode::{LaunchMode, LaunchParams};
use crate::session::{PaymentOutcome, SigningSession};
use crate::signer::SigningAuthority;
use crate::txn::TransactionBuilder;

/// Source of manual address entries (clipboard read or typed text).
///
/// Reading is a suspension point like any network call. `None` means the
/// user abandoned manual entry.
#[async_trait]
pub trait ManualEntrySource: Send + Sync {
    async fn next_entry(&self) -> Option<String>;
}

/// What the page shows when the flow settles
#[derive(Debug)]
pub enum FlowResult {
    Connected(ConnectedWallet),
    Payment {
        wallet: ConnectedWallet,
        outcome: PaymentOutcome,
    },
    Abandoned,
    Failed(Error),
}

/// One page load's worth of bridge work
pub struct BridgeFlow {
    gateway: Arc<dyn LedgerGateway>,
    authority: Arc<dyn SigningAuthority>,
    manual: Arc<dyn ManualEntrySource>,
    host: HostBridge,
    cache: WalletCache,
    params: LaunchParams,
    genesis_id: String,
    signing_timeout: Duration,
    max_rounds: u64,
    cancel: CancellationToken,
}

impl BridgeFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        params: LaunchParams,
        gateway: Arc<dyn LedgerGateway>,
        authority: Arc<dyn SigningAuthority>,
        manual: Arc<dyn ManualEntrySource>,
        channel: Arc<dyn HostChannel>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            authority,
            manual,
            host: HostBridge::new(channel),
            cache: WalletCache::new(&config.cache.dir),
            params,
            genesis_id: config.network.genesis_id.clone(),
            signing_timeout: Duration::from_secs(config.signing.timeout_secs),
            max_rounds: config.confirmation.max_rounds,
            cancel,
        }
    }

    /// Run the flow to completion. Every failure path settles into a
    /// displayed state - nothing here is fatal to the hosting page.
    pub async fn run(self) -> FlowResult {
        let wallet = match self.negotiate().await {
            Ok(Some(wallet)) => wallet,
            Ok(None) => return FlowResult::Abandoned,
            Err(e) => return FlowResult::Failed(e),
        };

        self.host.deliver_connected(&wallet);
        if let Some(user_id) = &self.params.user_id {
            if let Err(e) = self.cache.store(user_id, &wallet.address, wallet.source) {
                warn!(error = %e, "address cache write failed");
            }
        }

        let (receiver, amount_micro, note) = match &self.params.mode {
            LaunchMode::ConnectOnly => {
                self.host.request_close();
                return FlowResult::Connected(wallet);
            }
            LaunchMode::ConnectAndPay {
                receiver,
                amount_micro,
                note,
            } => (
                receiver.clone(),
                *amount_micro,
                note.clone().unwrap_or_default(),
            ),
        };

        let outcome = self
            .execute_payment(&wallet, &receiver, amount_micro, note.as_bytes())
            .await;

        let envelope = BridgeEnvelope::payment_outcome(
            &outcome,
            amount_micro,
            wallet.address.as_str(),
            &receiver,
        );
        self.host.deliver_result(&envelope);

        FlowResult::Payment { wallet, outcome }
    }

    /// Resolve an address: extension strategy first, manual entries until
    /// one verifies or the user walks away.
    async fn negotiate(&self) -> Result<Option<ConnectedWallet>> {
        let mut negotiator = ConnectionNegotiator::new(
            self.gateway.clone(),
            self.authority.clone(),
            self.genesis_id.clone(),
        );

        if let Some(wallet) = negotiator.connect_extension().await? {
            return Ok(Some(wallet));
        }

        // Fallback strategy: manual paste, recoverable per attempt
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let entry = tokio::select! {
                entry = self.manual.next_entry() => entry,
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            };
            let Some(entry) = entry else {
                negotiator.abandon();
                info!("manual entry abandoned");
                return Ok(None);
            };
            match negotiator.submit_manual(&entry).await {
                Ok(Some(wallet)) => return Ok(Some(wallet)),
                Ok(None) => continue,
                Err(e @ Error::InvalidAddress(_)) => {
                    // Shown to the user, session stays live
                    info!(message = %e.user_message(), "bad manual entry");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute_payment(
        &self,
        wallet: &ConnectedWallet,
        receiver: &str,
        amount_micro: u64,
        note: &[u8],
    ) -> PaymentOutcome {
        let builder = TransactionBuilder::new(self.gateway.clone());
        let payment = match builder
            .build(wallet.address.as_str(), receiver, amount_micro, note)
            .await
        {
            Ok(payment) => payment,
            Err(e) => return PaymentOutcome::Failed { error: e },
        };

        SigningSession::new(
            self.gateway.clone(),
            self.authority.clone(),
            self.signing_timeout,
            self.max_rounds,
            self.cancel.clone(),
        )
        .execute(payment)
        .await
    }

    /// Explicit disconnect: clear the cached address and drop the authority
    /// link.
    pub async fn disconnect(&self) {
        if let Some(user_id) = &self.params.user_id {
            if let Err(e) = self.cache.clear(user_id) {
                warn!(error = %e, "cache clear failed");
            }
        }
        self.authority.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{encode_address, Address};
    use crate::connect::WalletSource;
    use crate::ledger::{AccountInfo, ConfirmedTransaction, SuggestedParams};
    use base64::Engine;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    struct HappyGateway {
        submit_calls: AtomicU32,
    }

    #[async_trait]
    impl LedgerGateway for HappyGateway {
        async fn account_info(&self, _address: &Address) -> Result<AccountInfo> {
            Ok(AccountInfo {
                balance_micro: 1_000_000,
                exists: true,
            })
        }

        async fn suggested_params(&self) -> Result<SuggestedParams> {
            Ok(SuggestedParams {
                fee: 0,
                min_fee: 1000,
                first_valid: 100,
                last_valid: 1100,
                genesis_id: "testnet-v1.0".into(),
                genesis_hash: base64::engine::general_purpose::STANDARD.encode([7u8; 32]),
            })
        }

        async fn submit_raw(&self, _signed: &[u8]) -> Result<String> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            Ok("FLOWTX".into())
        }

        async fn wait_for_confirmation(
            &self,
            tx_id: &str,
            _max_rounds: u64,
            _cancel: &CancellationToken,
        ) -> Result<ConfirmedTransaction> {
            Ok(ConfirmedTransaction {
                tx_id: tx_id.to_string(),
                confirmed_round: 77,
            })
        }

        async fn last_round(&self) -> Result<u64> {
            Ok(100)
        }
    }

    struct NoExtension;

    #[async_trait]
    impl SigningAuthority for NoExtension {
        async fn enable(&self, _genesis_id: &str) -> Result<Vec<Address>> {
            Err(Error::AuthorityUnavailable("sandboxed".into()))
        }

        async fn sign_txns(&self, txns_b64: &[String]) -> Result<Vec<Option<String>>> {
            Ok(vec![Some(
                base64::engine::general_purpose::STANDARD
                    .encode(format!("signed:{}", txns_b64[0])),
            )])
        }

        async fn disconnect(&self) {}
    }

    struct ScriptedEntries {
        entries: Mutex<VecDeque<Option<String>>>,
    }

    impl ScriptedEntries {
        fn new(entries: Vec<Option<String>>) -> Self {
            Self {
                entries: Mutex::new(entries.into()),
            }
        }
    }

    #[async_trait]
    impl ManualEntrySource for ScriptedEntries {
        async fn next_entry(&self) -> Option<String> {
            self.entries.lock().unwrap().pop_front().flatten()
        }
    }

    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
        closed: AtomicBool,
    }

    impl RecordingChannel {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }
        }
    }

    impl HostChannel for RecordingChannel {
        fn send_data(&self, json: &str) -> Result<()> {
            self.sent.lock().unwrap().push(json.to_string());
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn config(cache_dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.cache.dir = cache_dir.to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_connect_only_flow_with_manual_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let good = encode_address(&[5; 32]);
        let params = LaunchParams::from_url("https://x/bridge?mode=connect&user=42").unwrap();

        let flow = BridgeFlow::new(
            &config(dir.path()),
            params,
            Arc::new(HappyGateway {
                submit_calls: AtomicU32::new(0),
            }),
            Arc::new(NoExtension),
            // First paste is garbage, second verifies
            Arc::new(ScriptedEntries::new(vec![
                Some("not-an-address".into()),
                Some(good.clone()),
            ])),
            channel.clone(),
            CancellationToken::new(),
        );

        let result = flow.run().await;
        match result {
            FlowResult::Connected(wallet) => {
                assert_eq!(wallet.address.as_str(), good);
                assert_eq!(wallet.source, WalletSource::Manual);
            }
            other => panic!("expected Connected, got {other:?}"),
        }

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(value["action"], "wallet_connected");
        assert!(channel.closed.load(Ordering::SeqCst));

        // Cache holds the connected address for user 42
        let cache = WalletCache::new(dir.path());
        assert_eq!(cache.load("42").unwrap().address.as_str(), good);
    }

    #[tokio::test]
    async fn test_pay_flow_delivers_success_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let sender = encode_address(&[5; 32]);
        let receiver = encode_address(&[6; 32]);
        let params = LaunchParams::from_url(&format!(
            "https://x/bridge?mode=pay&to={receiver}&amount=500000&note=hi&user=7"
        ))
        .unwrap();

        let flow = BridgeFlow::new(
            &config(dir.path()),
            params,
            Arc::new(HappyGateway {
                submit_calls: AtomicU32::new(0),
            }),
            Arc::new(NoExtension),
            Arc::new(ScriptedEntries::new(vec![Some(sender.clone())])),
            channel.clone(),
            CancellationToken::new(),
        );

        let result = flow.run().await;
        assert!(matches!(
            result,
            FlowResult::Payment {
                outcome: PaymentOutcome::Confirmed { .. },
                ..
            }
        ));

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let connected: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(connected["action"], "wallet_connected");
        let outcome: serde_json::Value = serde_json::from_str(&sent[1]).unwrap();
        assert_eq!(outcome["status"], "success");
        assert_eq!(outcome["txId"], "FLOWTX");
        assert_eq!(outcome["amount"], 500_000);
        assert_eq!(outcome["from"], sender);
        assert_eq!(outcome["to"], receiver);
        assert!(channel.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_abandoned_manual_entry_settles_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(RecordingChannel::new());
        let params = LaunchParams::from_url("https://x/bridge").unwrap();

        let flow = BridgeFlow::new(
            &config(dir.path()),
            params,
            Arc::new(HappyGateway {
                submit_calls: AtomicU32::new(0),
            }),
            Arc::new(NoExtension),
            Arc::new(ScriptedEntries::new(vec![None])),
            channel.clone(),
            CancellationToken::new(),
        );

        assert!(matches!(flow.run().await, FlowResult::Abandoned));
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_clears_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WalletCache::new(dir.path());
        let addr = Address::parse(&encode_address(&[9; 32])).unwrap();
        cache.store("42", &addr, WalletSource::Manual).unwrap();

        let params = LaunchParams::from_url("https://x/bridge?user=42").unwrap();
        let flow = BridgeFlow::new(
            &config(dir.path()),
            params,
            Arc::new(HappyGateway {
                submit_calls: AtomicU32::new(0),
            }),
            Arc::new(NoExtension),
            Arc::new(ScriptedEntries::new(vec![])),
            Arc::new(RecordingChannel::new()),
            CancellationToken::new(),
        );
        flow.disconnect().await;
        assert!(cache.load("42").is_none());
    }
}
