//! Command handlers for the bridge CLI
//!
//! Diagnostic surface against a real node: address validation, account
//! lookup, param inspection, and a manual-entry payment run. The extension
//! strategy is unavailable from a terminal, so `pay` goes straight through
//! the manual fallback with a stdin signing handoff.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::address::{self, Address};
use crate::config::Config;
use crate::error::{Error, Result as BridgeResult};
use crate::flow::ManualEntrySource;
use crate::host::HostChannel;
use crate::ledger::{AlgodGateway, LedgerGateway};
use crate::signer::SigningAuthority;

/// `validate` - offline address check
pub fn validate(candidate: &str) {
    if address::is_valid(candidate) {
        println!("VALID   {candidate}");
    } else {
        println!("INVALID {candidate}");
    }
}

/// `account` - balance and existence lookup
pub async fn account(config: &Config, candidate: &str) -> Result<()> {
    let addr = Address::parse(candidate)?;
    let gateway = AlgodGateway::new(&config.algod)?;
    let info = gateway.account_info(&addr).await?;
    println!("address: {addr}");
    println!("exists:  {}", info.exists);
    println!(
        "balance: {} microAlgos ({:.6} ALGO)",
        info.balance_micro,
        info.balance_micro as f64 / 1_000_000.0
    );
    Ok(())
}

/// `params` - current suggested transaction parameters
pub async fn params(config: &Config) -> Result<()> {
    let gateway = AlgodGateway::new(&config.algod)?;
    let params = gateway.suggested_params().await?;
    println!("genesis_id:  {}", params.genesis_id);
    println!("fee:         {} (min {})", params.fee, params.min_fee);
    println!("valid:       {}..{}", params.first_valid, params.last_valid);
    Ok(())
}

/// `health` - node reachability
pub async fn health(config: &Config) -> Result<()> {
    let gateway = AlgodGateway::new(&config.algod)?;
    let round = gateway.last_round().await?;
    println!("node OK, last round {round}");
    Ok(())
}

/// `config` - show effective configuration with secrets masked
pub fn show_config(config: &Config) {
    println!("{}", config.masked_display());
}

/// Stdin-backed manual address entry
pub struct StdinEntry;

#[async_trait]
impl ManualEntrySource for StdinEntry {
    async fn next_entry(&self) -> Option<String> {
        let line = tokio::task::spawn_blocking(|| {
            let mut buf = String::new();
            std::io::stdin().read_line(&mut buf).ok().map(|_| buf)
        })
        .await
        .ok()
        .flatten()?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// No extension can inject into a terminal; the handshake always falls
/// back to manual entry, and signatures are pasted from a cold signer.
pub struct StdinAuthority;

#[async_trait]
impl SigningAuthority for StdinAuthority {
    async fn enable(&self, _genesis_id: &str) -> BridgeResult<Vec<Address>> {
        Err(Error::AuthorityUnavailable(
            "no extension in a terminal session".into(),
        ))
    }

    async fn sign_txns(&self, txns_b64: &[String]) -> BridgeResult<Vec<Option<String>>> {
        println!("unsigned transaction (base64): {}", txns_b64[0]);
        println!("paste signed transaction base64 (empty line to decline):");
        let entry = StdinEntry.next_entry().await;
        Ok(vec![entry])
    }

    async fn disconnect(&self) {}
}

/// Terminal stand-in for the host container channel
pub struct StdoutChannel;

impl HostChannel for StdoutChannel {
    fn send_data(&self, json: &str) -> BridgeResult<()> {
        println!("host <- {json}");
        Ok(())
    }

    fn close(&self) {
        info!("host close requested");
    }
}

/// `pay` - run the full bridge flow from the terminal
pub async fn pay(
    config: &Config,
    to: &str,
    amount_micro: u64,
    note: Option<String>,
    user: Option<String>,
) -> Result<()> {
    use crate::flow::{BridgeFlow, FlowResult};
    use crate::mode::{LaunchMode, LaunchParams};
    use crate::session::PaymentOutcome;

    let params = LaunchParams {
        mode: LaunchMode::ConnectAndPay {
            receiver: to.to_string(),
            amount_micro,
            // Default note recovered from the backend's payment builder
            note: Some(note.unwrap_or_else(|| "X10V DeFi Agent".to_string())),
        },
        user_id: user,
    };

    let gateway: Arc<dyn LedgerGateway> = Arc::new(AlgodGateway::new(&config.algod)?);
    println!("paste your sender address:");
    let flow = BridgeFlow::new(
        config,
        params,
        gateway,
        Arc::new(StdinAuthority),
        Arc::new(StdinEntry),
        Arc::new(StdoutChannel),
        CancellationToken::new(),
    );

    match flow.run().await {
        FlowResult::Payment { outcome, .. } => match outcome {
            PaymentOutcome::Confirmed { tx, .. } => {
                println!("confirmed in round {}: {}", tx.confirmed_round, tx.tx_id);
            }
            PaymentOutcome::Rejected { reason } => println!("rejected: {reason}"),
            PaymentOutcome::Unknown { tx_id, .. } => {
                println!("outcome unknown for {tx_id} - check before retrying");
            }
            PaymentOutcome::Failed { error } => println!("{}", error.user_message()),
            PaymentOutcome::Cancelled => println!("cancelled"),
        },
        FlowResult::Connected(wallet) => println!("connected {}", wallet.address),
        FlowResult::Abandoned => println!("abandoned"),
        FlowResult::Failed(error) => println!("{}", error.user_message()),
    }
    Ok(())
}
