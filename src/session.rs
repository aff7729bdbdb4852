//! Signing session
//!
//! Drives one payment from built through signature, broadcast, and
//! confirmation. Stages run strictly in order; nothing is skipped or
//! reordered, and a fresh session object is required per attempt - stale
//! sessions are discarded, never resumed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::ledger::{ConfirmedTransaction, LedgerGateway};
use crate::signer::{request_signature, SigningAuthority, SigningResult};
use crate::txn::{TransactionBuilder, UnsignedPayment};

/// Session stages, strictly ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Built,
    AwaitingSignature,
    Broadcasting,
    AwaitingConfirmation,
    Confirmed,
    Rejected,
    Failed,
}

/// Terminal outcome of a session
#[derive(Debug)]
pub enum PaymentOutcome {
    /// Confirmed on-chain; balance is the sender's post-confirmation balance
    Confirmed {
        tx: ConfirmedTransaction,
        sender_balance_micro: u64,
    },
    /// User declined in the signing authority
    Rejected { reason: String },
    /// Submitted but not confirmed within the round budget. The transaction
    /// may still land - this is explicitly not a failure.
    Unknown { tx_id: String, rounds: u64 },
    /// Any other terminal failure
    Failed { error: Error },
    /// Session torn down mid-flight
    Cancelled,
}

/// One payment attempt, consumed by [`SigningSession::execute`]
pub struct SigningSession {
    gateway: Arc<dyn LedgerGateway>,
    authority: Arc<dyn SigningAuthority>,
    builder: TransactionBuilder,
    signing_timeout: Duration,
    max_rounds: u64,
    cancel: CancellationToken,
    stage: SessionStage,
}

impl SigningSession {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        authority: Arc<dyn SigningAuthority>,
        signing_timeout: Duration,
        max_rounds: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            builder: TransactionBuilder::new(gateway.clone()),
            gateway,
            authority,
            signing_timeout,
            max_rounds,
            cancel,
            stage: SessionStage::Built,
        }
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    /// Run the payment to a terminal outcome. Consumes the session - a
    /// retry needs a new `Built` state with a freshly built payment.
    pub async fn execute(mut self, payment: UnsignedPayment) -> PaymentOutcome {
        let outcome = self.run(payment).await;
        self.stage = match &outcome {
            PaymentOutcome::Confirmed { .. } => SessionStage::Confirmed,
            PaymentOutcome::Rejected { .. } => SessionStage::Rejected,
            _ => SessionStage::Failed,
        };
        outcome
    }

    async fn run(&mut self, payment: UnsignedPayment) -> PaymentOutcome {
        let mut payment = payment;
        let mut rebuilt_once = false;

        // Sign-and-broadcast loop: runs at most twice, the second pass only
        // for a stale-params rejection with a rebuilt payment. A rebuilt
        // payment has fresh validity rounds and therefore needs a fresh
        // signature.
        let tx_id = loop {
            if self.cancel.is_cancelled() {
                return PaymentOutcome::Cancelled;
            }

            self.stage = SessionStage::AwaitingSignature;
            let encoded = match payment.encode() {
                Ok(encoded) => encoded,
                Err(e) => return PaymentOutcome::Failed { error: e },
            };

            let signed = match request_signature(
                self.authority.as_ref(),
                &encoded,
                self.signing_timeout,
            )
            .await
            {
                Ok(SigningResult::Signed(bytes)) => bytes,
                Ok(SigningResult::Rejected(reason)) => {
                    info!(%reason, "payment rejected in signing authority");
                    return PaymentOutcome::Rejected { reason };
                }
                Ok(SigningResult::TimedOut) => {
                    return PaymentOutcome::Failed {
                        error: Error::SigningTimeout(self.signing_timeout),
                    }
                }
                Err(e) => return PaymentOutcome::Failed { error: e },
            };

            self.stage = SessionStage::Broadcasting;
            match self.gateway.submit_raw(&signed).await {
                Ok(tx_id) => break tx_id,
                Err(e) if e.is_stale_params() && !rebuilt_once => {
                    warn!(error = %e, "stale params, rebuilding and resubmitting once");
                    rebuilt_once = true;
                    payment = match self.builder.rebuild(&payment).await {
                        Ok(fresh) => fresh,
                        Err(e) => return PaymentOutcome::Failed { error: e },
                    };
                }
                Err(e) => {
                    error!(error = %e, "submission failed");
                    return PaymentOutcome::Failed { error: e };
                }
            }
        };

        self.stage = SessionStage::AwaitingConfirmation;
        let confirmed = match self
            .gateway
            .wait_for_confirmation(&tx_id, self.max_rounds, &self.cancel)
            .await
        {
            Ok(confirmed) => confirmed,
            Err(Error::ConfirmationTimeout { rounds }) => {
                warn!(%tx_id, rounds, "confirmation window elapsed, outcome unknown");
                return PaymentOutcome::Unknown { tx_id, rounds };
            }
            Err(Error::Cancelled) => return PaymentOutcome::Cancelled,
            Err(e @ Error::Submission { .. }) => {
                // Definitive pool verdict; the transaction will not land
                error!(%tx_id, error = %e, "transaction rejected after broadcast");
                return PaymentOutcome::Failed { error: e };
            }
            Err(e) => {
                // The transaction is already broadcast and may still land, so
                // a polling failure must never read as a retryable error
                warn!(%tx_id, error = %e, "confirmation polling failed, outcome unknown");
                return PaymentOutcome::Unknown {
                    tx_id,
                    rounds: self.max_rounds,
                };
            }
        };

        // Refresh the sender balance before reporting success; a lookup
        // hiccup here must not turn a confirmed payment into a failure.
        let sender_balance_micro = match self.gateway.account_info(payment.sender()).await {
            Ok(info) => info.balance_micro,
            Err(e) => {
                warn!(error = %e, "post-confirmation balance refresh failed");
                0
            }
        };

        info!(
            tx_id = %confirmed.tx_id,
            round = confirmed.confirmed_round,
            "payment confirmed"
        );
        PaymentOutcome::Confirmed {
            tx: confirmed,
            sender_balance_micro,
        }
    }
}
