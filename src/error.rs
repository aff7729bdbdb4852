//! Error types for the wallet bridge

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the wallet bridge
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Local validation errors - handled at the input boundary,
    // never retried, never reach the network
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid note: {0}")]
    InvalidNote(String),

    // Transport errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Suggested params fetch failed: {0}")]
    ParamsFetch(String),

    // Signing authority errors
    #[error("Signing authority unavailable: {0}")]
    AuthorityUnavailable(String),

    #[error("Signing rejected: {0}")]
    AuthorityRejected(String),

    #[error("No response from signing authority within {0:?}")]
    SigningTimeout(Duration),

    // Ledger submission errors - reason carries the node's message verbatim
    #[error("Transaction rejected by ledger: {reason}")]
    Submission { reason: String },

    #[error("No confirmation after {rounds} rounds")]
    ConfirmationTimeout { rounds: u64 },

    // Host channel errors - never fatal to the flow
    #[error("Host delivery failed: {0}")]
    HostDelivery(String),

    #[error("Session cancelled")]
    Cancelled,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Check if this error is retryable (transient transport failure)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// Check if this is a ledger rejection caused by stale suggested params.
    ///
    /// algod reports expired validity windows as "txn dead" (current round
    /// outside first/last valid) or "transaction ... expired". Only this
    /// sub-case is eligible for the one automatic rebuild-and-resubmit cycle.
    pub fn is_stale_params(&self) -> bool {
        match self {
            Error::Submission { reason } => {
                reason.contains("txn dead") || reason.contains("expired")
            }
            _ => false,
        }
    }

    /// User-facing message, scrubbed of internals.
    ///
    /// A confirmation timeout is deliberately worded as an unknown outcome:
    /// the transaction may still land, and implying failure invites a
    /// double-spend attempt.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidAddress(_) => "That address is not a valid Algorand address.".into(),
            Error::InvalidAmount(_) => "The payment amount is invalid.".into(),
            Error::InvalidNote(_) => "The payment note is too long.".into(),
            Error::Network(_) | Error::ParamsFetch(_) => {
                "Could not reach the Algorand network. Please try again.".into()
            }
            Error::AuthorityUnavailable(_) => {
                "No wallet extension was found. Paste your address instead.".into()
            }
            Error::AuthorityRejected(_) => "The request was declined in your wallet.".into(),
            Error::SigningTimeout(_) => {
                "Your wallet did not respond in time. Nothing was sent.".into()
            }
            Error::Submission { reason } => format!("The network rejected the payment: {reason}"),
            Error::ConfirmationTimeout { .. } => {
                "Confirmation is taking longer than expected. The outcome is unknown - \
                 check your wallet before trying again."
                    .into()
            }
            Error::Cancelled => "The session was closed before finishing.".into(),
            _ => "Something went wrong. Please try again.".into(),
        }
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
