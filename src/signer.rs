//! Signing-authority capability
//!
//! The page never holds keys. It resolves one [`SigningAuthority`] at
//! session start - either the discovery/connect style extension library or
//! the injected `enable`/`signTxns` object - and passes it explicitly
//! through the component chain. Business logic never reaches for an
//! ambient global.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, warn};

use crate::address::Address;
use crate::error::{Error, Result};

/// External agent holding private keys and exposing a sign operation
#[async_trait]
pub trait SigningAuthority: Send + Sync {
    /// Handshake: discover/connect for the given network, returning the
    /// accounts the authority is willing to sign for.
    async fn enable(&self, genesis_id: &str) -> Result<Vec<Address>>;

    /// Request signatures for base64-encoded unsigned transactions.
    /// A `None` entry means the user declined that transaction.
    async fn sign_txns(&self, txns_b64: &[String]) -> Result<Vec<Option<String>>>;

    /// Tear down the link. Best effort, never fails the flow.
    async fn disconnect(&self);
}

/// Outcome of one signature request. Produced exactly once per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningResult {
    /// Signed transaction bytes, ready for raw submission
    Signed(Vec<u8>),
    /// Explicit user rejection; terminal, never retried automatically
    Rejected(String),
    /// No response within the bounded wait
    TimedOut,
}

/// Hand one encoded unsigned transaction to the authority and wait.
///
/// The wait is bounded: an unresponsive extension resolves to
/// [`SigningResult::TimedOut`] rather than hanging the session.
pub async fn request_signature(
    authority: &dyn SigningAuthority,
    encoded_txn: &[u8],
    timeout: Duration,
) -> Result<SigningResult> {
    let b64 = base64::engine::general_purpose::STANDARD.encode(encoded_txn);
    debug!(bytes = encoded_txn.len(), "requesting signature");

    let outcome = tokio::time::timeout(timeout, authority.sign_txns(&[b64])).await;

    match outcome {
        Err(_) => {
            warn!(?timeout, "signing authority did not respond");
            Ok(SigningResult::TimedOut)
        }
        Ok(Err(Error::AuthorityRejected(reason))) => Ok(SigningResult::Rejected(reason)),
        Ok(Err(e)) => Err(e),
        Ok(Ok(signed)) => match signed.into_iter().next().flatten() {
            None => Ok(SigningResult::Rejected(
                "declined in signing authority".into(),
            )),
            Some(b64) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(&b64)
                    .map_err(|e| {
                        Error::Serialization(format!("authority returned bad base64: {e}"))
                    })?;
                Ok(SigningResult::Signed(bytes))
            }
        },
    }
}
