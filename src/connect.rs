//! Wallet connection negotiation
//!
//! Establishes the link to a signing authority and produces a verified
//! address plus balance. Two strategies: extension handshake first, manual
//! paste as the mandatory fallback (the host container may sandbox
//! extension injection entirely). Callback firings from the extension are
//! fed in as method calls; transition guards keep duplicates idempotent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::address::{self, Address};
use crate::error::{Error, Result};
use crate::ledger::LedgerGateway;
use crate::signer::SigningAuthority;

/// Where the connected address came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletSource {
    Extension,
    Manual,
}

/// A verified wallet, created once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedWallet {
    pub address: Address,
    /// Balance in microAlgos at verification time
    pub balance_micro: u64,
    pub source: WalletSource,
}

/// Negotiation strategy in play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Extension,
    ManualEntry,
}

/// Negotiator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatorState {
    Idle,
    Negotiating { strategy: Strategy },
    Verifying,
    Connected,
    Failed,
}

/// Drives `Idle -> Negotiating -> Verifying -> Connected | Failed`
pub struct ConnectionNegotiator {
    gateway: Arc<dyn LedgerGateway>,
    authority: Arc<dyn SigningAuthority>,
    genesis_id: String,
    state: NegotiatorState,
}

impl ConnectionNegotiator {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        authority: Arc<dyn SigningAuthority>,
        genesis_id: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            authority,
            genesis_id: genesis_id.into(),
            state: NegotiatorState::Idle,
        }
    }

    pub fn state(&self) -> NegotiatorState {
        self.state
    }

    /// Strategy A: extension handshake.
    ///
    /// On handshake failure or missing capability the machine falls back to
    /// manual entry instead of terminating - `Ok(None)` with the state left
    /// in `Negotiating { ManualEntry }`. A duplicate firing after the
    /// session is already connected is suppressed.
    pub async fn connect_extension(&mut self) -> Result<Option<ConnectedWallet>> {
        if self.state == NegotiatorState::Connected {
            debug!("duplicate extension callback suppressed");
            return Ok(None);
        }
        self.state = NegotiatorState::Negotiating {
            strategy: Strategy::Extension,
        };

        match self.authority.enable(&self.genesis_id).await {
            Ok(accounts) => match accounts.into_iter().next() {
                Some(account) => self.verify(account, WalletSource::Extension).await,
                None => {
                    warn!("extension enabled but returned no accounts, falling back to manual");
                    self.state = NegotiatorState::Negotiating {
                        strategy: Strategy::ManualEntry,
                    };
                    Ok(None)
                }
            },
            Err(e) => {
                warn!(error = %e, "extension handshake failed, falling back to manual");
                self.state = NegotiatorState::Negotiating {
                    strategy: Strategy::ManualEntry,
                };
                Ok(None)
            }
        }
    }

    /// Strategy B: user-supplied address string.
    ///
    /// A bad paste is recoverable: the error is returned for display and
    /// the machine stays in `Negotiating { ManualEntry }` awaiting another
    /// attempt. Only explicit abandonment ends in `Failed`.
    pub async fn submit_manual(&mut self, pasted: &str) -> Result<Option<ConnectedWallet>> {
        if self.state == NegotiatorState::Connected {
            debug!("manual submission after connect suppressed");
            return Ok(None);
        }
        self.state = NegotiatorState::Negotiating {
            strategy: Strategy::ManualEntry,
        };

        if !address::is_valid(pasted) {
            return Err(Error::InvalidAddress("manual entry failed validation".into()));
        }
        let parsed = Address::parse(pasted)?;
        self.verify(parsed, WalletSource::Manual).await
    }

    /// User abandoned the session
    pub fn abandon(&mut self) {
        if self.state != NegotiatorState::Connected {
            self.state = NegotiatorState::Failed;
        }
    }

    /// Verify the resolved address against the ledger. One automatic retry
    /// on a transport error, then `Failed` with a retry affordance upstream.
    async fn verify(
        &mut self,
        address: Address,
        source: WalletSource,
    ) -> Result<Option<ConnectedWallet>> {
        self.state = NegotiatorState::Verifying;

        let info = match self.gateway.account_info(&address).await {
            Ok(info) => info,
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "account lookup failed, retrying once");
                match self.gateway.account_info(&address).await {
                    Ok(info) => info,
                    Err(e) => {
                        self.state = NegotiatorState::Failed;
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                self.state = NegotiatorState::Failed;
                return Err(e);
            }
        };

        // An unfunded account is queryable and connects with a zero balance.
        if !info.exists {
            debug!(address = %address, "connecting unfunded account");
        }

        self.state = NegotiatorState::Connected;
        info!(address = %address, balance = info.balance_micro, ?source, "wallet connected");
        Ok(Some(ConnectedWallet {
            address,
            balance_micro: info.balance_micro,
            source,
        }))
    }
}
