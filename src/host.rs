//! Host-container bridge
//!
//! Serializes a result envelope, pushes it through the narrow host channel
//! (`sendData` + `close`), and guarantees at-most-once delivery per logical
//! event. The envelope field names are a compatibility contract with the
//! external host-side consumer - do not rename them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::connect::ConnectedWallet;
use crate::error::{Error, Result};
use crate::session::PaymentOutcome;

/// Narrow messaging channel into the host container
pub trait HostChannel: Send + Sync {
    /// Deliver a JSON payload to the host
    fn send_data(&self, json: &str) -> Result<()>;
    /// Ask the host to end the embedded session
    fn close(&self);
}

/// Payload crossing the host-container boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEnvelope {
    WalletConnected {
        address: String,
        balance_micro: u64,
    },
    PaymentSuccess {
        tx_id: String,
        amount_micro: u64,
        from: String,
        to: String,
    },
    PaymentError {
        message: String,
        tx_id: Option<String>,
    },
}

impl BridgeEnvelope {
    pub fn wallet_connected(wallet: &ConnectedWallet) -> Self {
        Self::WalletConnected {
            address: wallet.address.to_string(),
            balance_micro: wallet.balance_micro,
        }
    }

    /// Map a terminal payment outcome to its envelope. An unknown outcome
    /// rides the error shape but keeps its tx id and "unknown" wording.
    pub fn payment_outcome(
        outcome: &PaymentOutcome,
        amount_micro: u64,
        from: &str,
        to: &str,
    ) -> Self {
        match outcome {
            PaymentOutcome::Confirmed { tx, .. } => Self::PaymentSuccess {
                tx_id: tx.tx_id.clone(),
                amount_micro,
                from: from.to_string(),
                to: to.to_string(),
            },
            PaymentOutcome::Rejected { .. } => Self::PaymentError {
                message: Error::AuthorityRejected(String::new()).user_message(),
                tx_id: None,
            },
            PaymentOutcome::Unknown { tx_id, rounds } => Self::PaymentError {
                message: Error::ConfirmationTimeout { rounds: *rounds }.user_message(),
                tx_id: Some(tx_id.clone()),
            },
            PaymentOutcome::Failed { error } => Self::PaymentError {
                message: error.user_message(),
                tx_id: None,
            },
            PaymentOutcome::Cancelled => Self::PaymentError {
                message: Error::Cancelled.user_message(),
                tx_id: None,
            },
        }
    }

    /// The exact JSON shape the host consumer expects
    pub fn to_json(&self) -> String {
        let value = match self {
            Self::WalletConnected {
                address,
                balance_micro,
            } => serde_json::json!({
                "action": "wallet_connected",
                "address": address,
                "balance": balance_micro,
            }),
            Self::PaymentSuccess {
                tx_id,
                amount_micro,
                from,
                to,
            } => serde_json::json!({
                "status": "success",
                "txId": tx_id,
                "amount": amount_micro,
                "from": from,
                "to": to,
            }),
            Self::PaymentError { message, tx_id } => match tx_id {
                Some(tx_id) => serde_json::json!({
                    "status": "error",
                    "message": message,
                    "txId": tx_id,
                }),
                None => serde_json::json!({
                    "status": "error",
                    "message": message,
                }),
            },
        };
        value.to_string()
    }
}

/// Delivers envelopes to the host with per-event one-shot guards.
///
/// The guards are tied to session identity, not to any rendering instance:
/// a component re-initialization reuses the same bridge and cannot
/// re-deliver an event the host already saw.
pub struct HostBridge {
    channel: Arc<dyn HostChannel>,
    session_id: Uuid,
    connected_sent: AtomicBool,
    result_sent: AtomicBool,
}

impl HostBridge {
    pub fn new(channel: Arc<dyn HostChannel>) -> Self {
        Self {
            channel,
            session_id: Uuid::new_v4(),
            connected_sent: AtomicBool::new(false),
            result_sent: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Deliver the wallet-connected event. Returns true if this call was
    /// the one that delivered it.
    pub fn deliver_connected(&self, wallet: &ConnectedWallet) -> bool {
        if self.connected_sent.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.send(&BridgeEnvelope::wallet_connected(wallet));
        true
    }

    /// Deliver the payment result and request session close. Returns true
    /// if this call delivered it.
    pub fn deliver_result(&self, envelope: &BridgeEnvelope) -> bool {
        if self.result_sent.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.send(envelope);
        self.channel.close();
        true
    }

    /// Request session close without a result envelope (connect-only flow,
    /// where wallet_connected is the final event).
    pub fn request_close(&self) {
        self.channel.close();
    }

    /// Push through the channel. Delivery failure is non-fatal: the page
    /// still shows the result, the host just missed the message.
    fn send(&self, envelope: &BridgeEnvelope) {
        let json = envelope.to_json();
        match self.channel.send_data(&json) {
            Ok(()) => info!(session = %self.session_id, "delivered envelope to host"),
            Err(e) => {
                let e = Error::HostDelivery(e.to_string());
                warn!(session = %self.session_id, error = %e, "continuing in-page");
            }
        }
    }
}
