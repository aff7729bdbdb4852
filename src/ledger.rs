//! Algod REST gateway
//!
//! Thin adapter over the ledger node's public JSON API: account lookup,
//! suggested transaction parameters, raw submission, and round-by-round
//! confirmation polling. Everything network-bound in the bridge funnels
//! through the [`LedgerGateway`] trait so the flows can be driven against
//! mocks in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::config::AlgodConfig;
use crate::error::{Error, Result};

/// How many rounds a transaction stays valid after its first-valid round.
/// Matches the ledger's maximum validity window.
pub const VALIDITY_WINDOW: u64 = 1000;

/// Account state relevant to the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Balance in microAlgos
    pub balance_micro: u64,
    /// False for a well-formed address the ledger has never seen funded.
    /// That is a normal state, not an error.
    pub exists: bool,
}

/// Suggested transaction parameters, fetched fresh per build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedParams {
    /// Suggested fee per byte (0 means "use min_fee")
    pub fee: u64,
    /// Minimum flat fee in microAlgos
    pub min_fee: u64,
    /// First round the transaction is valid
    pub first_valid: u64,
    /// Last round the transaction is valid
    pub last_valid: u64,
    /// Network genesis id, e.g. "testnet-v1.0"
    pub genesis_id: String,
    /// Base64-encoded 32-byte genesis hash
    pub genesis_hash: String,
}

/// Ledger acknowledgment that a transaction is in the canonical chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransaction {
    pub tx_id: String,
    pub confirmed_round: u64,
}

/// Interface to the distributed ledger
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Look up balance and existence for an address.
    ///
    /// Only a verified [`Address`] can be passed here - format failures are
    /// caught at the input boundary and never reach the network.
    async fn account_info(&self, address: &Address) -> Result<AccountInfo>;

    /// Fetch fresh suggested params. Never cache across a confirmed
    /// transaction - the validity window moves with the chain.
    async fn suggested_params(&self) -> Result<SuggestedParams>;

    /// Submit a signed transaction, returning its tx id. Ledger rejections
    /// surface as [`Error::Submission`] with the node's reason verbatim.
    async fn submit_raw(&self, signed: &[u8]) -> Result<String>;

    /// Poll for confirmation at round cadence, up to `max_rounds` elapsed
    /// rounds. Cancellation resolves to [`Error::Cancelled`] quietly.
    async fn wait_for_confirmation(
        &self,
        tx_id: &str,
        max_rounds: u64,
        cancel: &CancellationToken,
    ) -> Result<ConfirmedTransaction>;

    /// Current last round, used for health checks
    async fn last_round(&self) -> Result<u64>;
}

/// Production gateway speaking to an algod node
pub struct AlgodGateway {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    amount: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ParamsResponse {
    fee: u64,
    min_fee: u64,
    last_round: u64,
    genesis_id: String,
    genesis_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    tx_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StatusResponse {
    last_round: u64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
struct PendingResponse {
    confirmed_round: u64,
    pool_error: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

impl AlgodGateway {
    pub fn new(config: &AlgodConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        info!("Algod gateway initialized for {}", config.base_url);

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .header("X-Algo-API-Token", &self.token)
    }

    /// Extract the node's error message from a non-success response,
    /// falling back to the raw body.
    async fn rejection_reason(response: reqwest::Response) -> String {
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => err.message,
            Err(_) => body,
        }
    }

    /// Block until the round after `round` is committed. algod's
    /// wait-for-block endpoint returns at the ledger's native cadence.
    async fn wait_for_round_after(&self, round: u64) -> Result<u64> {
        let response = self
            .get(&format!("/v2/status/wait-for-block-after/{round}"))
            .send()
            .await?
            .error_for_status()?;
        let status: StatusResponse = response.json().await?;
        Ok(status.last_round)
    }
}

#[async_trait]
impl LedgerGateway for AlgodGateway {
    async fn account_info(&self, address: &Address) -> Result<AccountInfo> {
        let response = self
            .get(&format!("/v2/accounts/{}", address.as_str()))
            .send()
            .await?;

        // A never-funded address is a normal state, folded into exists=false
        // rather than surfaced as an error.
        if response.status() == StatusCode::NOT_FOUND {
            debug!(address = %address, "account not found on ledger");
            return Ok(AccountInfo {
                balance_micro: 0,
                exists: false,
            });
        }

        let response = response.error_for_status()?;
        let account: AccountResponse = response.json().await?;
        Ok(AccountInfo {
            balance_micro: account.amount,
            exists: true,
        })
    }

    async fn suggested_params(&self) -> Result<SuggestedParams> {
        let response = self
            .get("/v2/transactions/params")
            .send()
            .await
            .map_err(|e| Error::ParamsFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::ParamsFetch(e.to_string()))?;

        let params: ParamsResponse = response
            .json()
            .await
            .map_err(|e| Error::ParamsFetch(e.to_string()))?;

        Ok(SuggestedParams {
            fee: params.fee,
            min_fee: params.min_fee,
            first_valid: params.last_round,
            last_valid: params.last_round + VALIDITY_WINDOW,
            genesis_id: params.genesis_id,
            genesis_hash: params.genesis_hash,
        })
    }

    async fn submit_raw(&self, signed: &[u8]) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/v2/transactions", self.base_url))
            .header("X-Algo-API-Token", &self.token)
            .header("Content-Type", "application/x-binary")
            .body(signed.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let reason = Self::rejection_reason(response).await;
            warn!(%reason, "ledger rejected raw transaction");
            return Err(Error::Submission { reason });
        }

        let submit: SubmitResponse = response.json().await?;
        info!(tx_id = %submit.tx_id, "transaction submitted");
        Ok(submit.tx_id)
    }

    async fn wait_for_confirmation(
        &self,
        tx_id: &str,
        max_rounds: u64,
        cancel: &CancellationToken,
    ) -> Result<ConfirmedTransaction> {
        let status: StatusResponse = self
            .get("/v2/status")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let start_round = status.last_round;
        let mut current_round = start_round;

        while current_round < start_round + max_rounds {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let response = self
                .get(&format!("/v2/transactions/pending/{tx_id}"))
                .send()
                .await?;

            // An unknown tx id just means the pool has not seen it yet on
            // this node; keep polling until the round budget runs out.
            if response.status() != StatusCode::NOT_FOUND {
                let pending: PendingResponse =
                    response.error_for_status()?.json().await?;

                if pending.confirmed_round > 0 {
                    info!(
                        %tx_id,
                        round = pending.confirmed_round,
                        "transaction confirmed"
                    );
                    return Ok(ConfirmedTransaction {
                        tx_id: tx_id.to_string(),
                        confirmed_round: pending.confirmed_round,
                    });
                }
                if !pending.pool_error.is_empty() {
                    return Err(Error::Submission {
                        reason: pending.pool_error,
                    });
                }
            }

            debug!(%tx_id, round = current_round, "not yet confirmed, waiting a round");
            tokio::select! {
                round = self.wait_for_round_after(current_round) => {
                    current_round = round?.max(current_round + 1);
                }
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }

        Err(Error::ConfirmationTimeout { rounds: max_rounds })
    }

    async fn last_round(&self) -> Result<u64> {
        let status: StatusResponse = self
            .get("/v2/status")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status.last_round)
    }
}
