//! Launch mode
//!
//! The host container launches the page with the flow encoded in the URL
//! query string. Read once at page load; there is no runtime switching.

use url::Url;

use crate::error::{Error, Result};

/// Which flow this page load runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// Link a wallet and report the address back to the host
    ConnectOnly,
    /// Link a wallet, then carry one payment through signing
    ConnectAndPay {
        receiver: String,
        amount_micro: u64,
        note: Option<String>,
    },
}

/// Launch parameters parsed from the page URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    pub mode: LaunchMode,
    /// Host-container user id, keys the durable address cache
    pub user_id: Option<String>,
}

impl LaunchParams {
    /// Parse the launch URL.
    ///
    /// `mode=connect` (the default) or `mode=pay` with `to` and `amount`
    /// (microAlgos, integer) and an optional `note`. The receiver is only
    /// format-checked later, at build time - no network is touched here.
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| Error::Config(format!("bad launch URL: {e}")))?;

        let mut mode_param = None;
        let mut to = None;
        let mut amount = None;
        let mut note = None;
        let mut user_id = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "mode" => mode_param = Some(value.into_owned()),
                "to" => to = Some(value.into_owned()),
                "amount" => amount = Some(value.into_owned()),
                "note" => note = Some(value.into_owned()),
                "user" => user_id = Some(value.into_owned()),
                _ => {}
            }
        }

        let mode = match mode_param.as_deref() {
            None | Some("connect") => LaunchMode::ConnectOnly,
            Some("pay") => {
                let receiver =
                    to.ok_or_else(|| Error::Config("pay mode requires `to`".into()))?;
                let amount_raw =
                    amount.ok_or_else(|| Error::Config("pay mode requires `amount`".into()))?;
                let amount_micro: u64 = amount_raw.parse().map_err(|_| {
                    Error::InvalidAmount(format!("not an integer microAlgo amount: {amount_raw}"))
                })?;
                if amount_micro == 0 {
                    return Err(Error::InvalidAmount("amount must be positive".into()));
                }
                LaunchMode::ConnectAndPay {
                    receiver,
                    amount_micro,
                    note,
                }
            }
            Some(other) => return Err(Error::Config(format!("unknown mode: {other}"))),
        };

        Ok(Self { mode, user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_connect_only() {
        let params = LaunchParams::from_url("https://app.example/bridge?user=42").unwrap();
        assert_eq!(params.mode, LaunchMode::ConnectOnly);
        assert_eq!(params.user_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_pay_mode_parses_amount_verbatim() {
        let params = LaunchParams::from_url(
            "https://app.example/bridge?mode=pay&to=RECV&amount=500000&note=hi",
        )
        .unwrap();
        match params.mode {
            LaunchMode::ConnectAndPay {
                receiver,
                amount_micro,
                note,
            } => {
                assert_eq!(receiver, "RECV");
                assert_eq!(amount_micro, 500_000);
                assert_eq!(note.as_deref(), Some("hi"));
            }
            other => panic!("expected pay mode, got {other:?}"),
        }
    }

    #[test]
    fn test_pay_mode_rejects_fractional_and_zero_amounts() {
        let fractional =
            LaunchParams::from_url("https://x/bridge?mode=pay&to=R&amount=0.5").unwrap_err();
        assert!(matches!(fractional, Error::InvalidAmount(_)));

        let zero = LaunchParams::from_url("https://x/bridge?mode=pay&to=R&amount=0").unwrap_err();
        assert!(matches!(zero, Error::InvalidAmount(_)));
    }

    #[test]
    fn test_pay_mode_requires_receiver() {
        let err = LaunchParams::from_url("https://x/bridge?mode=pay&amount=5").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = LaunchParams::from_url("https://x/bridge?mode=swap").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
