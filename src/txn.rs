//! Unsigned payment construction and canonical encoding
//!
//! A payment serializes via the ledger's canonical msgpack before signing:
//! string keys sorted lexicographically, zero and empty fields omitted.
//! The signing authority and the node both re-derive this encoding, so it
//! has to match byte for byte.

use std::sync::Arc;

use tracing::debug;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::ledger::{LedgerGateway, SuggestedParams};

/// Ledger cap on the note field, in bytes
pub const MAX_NOTE_LEN: usize = 1024;

/// A fully-specified, not-yet-authorized payment.
///
/// Immutable once built. A retry (e.g. after a stale-params rejection) must
/// go through [`TransactionBuilder::build`] again for a fresh instance -
/// mutate-and-resend is not a thing.
#[derive(Debug, Clone)]
pub struct UnsignedPayment {
    sender: Address,
    receiver: Address,
    amount_micro: u64,
    note: Vec<u8>,
    params: SuggestedParams,
}

impl UnsignedPayment {
    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn receiver(&self) -> &Address {
        &self.receiver
    }

    pub fn amount_micro(&self) -> u64 {
        self.amount_micro
    }

    pub fn note(&self) -> &[u8] {
        &self.note
    }

    pub fn params(&self) -> &SuggestedParams {
        &self.params
    }

    /// Flat fee in microAlgos. The suggested per-byte fee is 0 on a quiet
    /// network, in which case the node's min fee applies.
    pub fn fee(&self) -> u64 {
        if self.params.fee == 0 {
            self.params.min_fee
        } else {
            self.params.fee
        }
    }

    /// Canonical msgpack encoding of the unsigned transaction.
    pub fn encode(&self) -> Result<Vec<u8>> {
        use base64::Engine;

        let genesis_hash = base64::engine::general_purpose::STANDARD
            .decode(&self.params.genesis_hash)
            .map_err(|e| Error::Serialization(format!("bad genesis hash: {e}")))?;

        // Fields present in a payment, in sorted key order:
        //   amt, fee, fv, gen, gh, lv, note, rcv, snd, type
        // amt is always > 0 here (enforced at build) and gen/note may be
        // empty, so the entry count varies.
        let mut entries = 0u8;
        let mut body = Vec::with_capacity(192);

        write_str(&mut body, "amt");
        write_uint(&mut body, self.amount_micro);
        entries += 1;

        write_str(&mut body, "fee");
        write_uint(&mut body, self.fee());
        entries += 1;

        write_str(&mut body, "fv");
        write_uint(&mut body, self.params.first_valid);
        entries += 1;

        if !self.params.genesis_id.is_empty() {
            write_str(&mut body, "gen");
            write_str(&mut body, &self.params.genesis_id);
            entries += 1;
        }

        write_str(&mut body, "gh");
        write_bin(&mut body, &genesis_hash)?;
        entries += 1;

        write_str(&mut body, "lv");
        write_uint(&mut body, self.params.last_valid);
        entries += 1;

        if !self.note.is_empty() {
            write_str(&mut body, "note");
            write_bin(&mut body, &self.note)?;
            entries += 1;
        }

        write_str(&mut body, "rcv");
        write_bin(&mut body, self.receiver.public_key())?;
        entries += 1;

        write_str(&mut body, "snd");
        write_bin(&mut body, self.sender.public_key())?;
        entries += 1;

        write_str(&mut body, "type");
        write_str(&mut body, "pay");
        entries += 1;

        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(0x80 | entries); // fixmap
        out.extend_from_slice(&body);
        Ok(out)
    }
}

/// Builds canonical unsigned payments, fetching fresh params per build
pub struct TransactionBuilder {
    gateway: Arc<dyn LedgerGateway>,
}

impl TransactionBuilder {
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self { gateway }
    }

    /// Construct an unsigned payment.
    ///
    /// Address and amount problems fail before any network call; the only
    /// network access is the suggested-params fetch. The amount is taken
    /// verbatim in microAlgos - never rounded, never truncated.
    pub async fn build(
        &self,
        sender: &str,
        receiver: &str,
        amount_micro: u64,
        note: &[u8],
    ) -> Result<UnsignedPayment> {
        let sender = Address::parse(sender)?;
        let receiver = Address::parse(receiver)?;

        if amount_micro == 0 {
            return Err(Error::InvalidAmount("amount must be positive".into()));
        }

        if note.len() > MAX_NOTE_LEN {
            return Err(Error::InvalidNote(format!(
                "note is {} bytes, maximum {MAX_NOTE_LEN}",
                note.len()
            )));
        }

        let params = self.gateway.suggested_params().await?;
        debug!(
            first_valid = params.first_valid,
            last_valid = params.last_valid,
            "built unsigned payment"
        );

        Ok(UnsignedPayment {
            sender,
            receiver,
            amount_micro,
            note: note.to_vec(),
            params,
        })
    }

    /// Rebuild the same logical payment with fresh params.
    pub async fn rebuild(&self, stale: &UnsignedPayment) -> Result<UnsignedPayment> {
        let params = self.gateway.suggested_params().await?;
        Ok(UnsignedPayment {
            sender: stale.sender.clone(),
            receiver: stale.receiver.clone(),
            amount_micro: stale.amount_micro,
            note: stale.note.clone(),
            params,
        })
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    debug_assert!(bytes.len() < 256);
    if bytes.len() < 32 {
        out.push(0xa0 | bytes.len() as u8); // fixstr
    } else {
        out.push(0xd9); // str8
        out.push(bytes.len() as u8);
    }
    out.extend_from_slice(bytes);
}

fn write_bin(out: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    if data.len() <= u8::MAX as usize {
        out.push(0xc4); // bin8
        out.push(data.len() as u8);
    } else if data.len() <= u16::MAX as usize {
        out.push(0xc5); // bin16
        out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    } else {
        return Err(Error::Serialization(format!(
            "binary field too long: {} bytes",
            data.len()
        )));
    }
    out.extend_from_slice(data);
    Ok(())
}

fn write_uint(out: &mut Vec<u8>, v: u64) {
    if v < 0x80 {
        out.push(v as u8); // positive fixint
    } else if v <= u8::MAX as u64 {
        out.push(0xcc);
        out.push(v as u8);
    } else if v <= u16::MAX as u64 {
        out.push(0xcd);
        out.extend_from_slice(&(v as u16).to_be_bytes());
    } else if v <= u32::MAX as u64 {
        out.push(0xce);
        out.extend_from_slice(&(v as u32).to_be_bytes());
    } else {
        out.push(0xcf);
        out.extend_from_slice(&v.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::encode_address;
    use crate::ledger::{AccountInfo, ConfirmedTransaction};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_util::sync::CancellationToken;

    /// Gateway that counts calls and serves canned params
    struct CountingGateway {
        params_calls: AtomicU32,
    }

    impl CountingGateway {
        fn new() -> Self {
            Self {
                params_calls: AtomicU32::new(0),
            }
        }

        fn params() -> SuggestedParams {
            SuggestedParams {
                fee: 0,
                min_fee: 1000,
                first_valid: 41_000_000,
                last_valid: 41_001_000,
                genesis_id: "testnet-v1.0".into(),
                genesis_hash: {
                    use base64::Engine;
                    base64::engine::general_purpose::STANDARD.encode([7u8; 32])
                },
            }
        }
    }

    #[async_trait]
    impl LedgerGateway for CountingGateway {
        async fn account_info(&self, _address: &Address) -> Result<AccountInfo> {
            unreachable!("builder must not look up accounts")
        }

        async fn suggested_params(&self) -> Result<SuggestedParams> {
            self.params_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::params())
        }

        async fn submit_raw(&self, _signed: &[u8]) -> Result<String> {
            unreachable!()
        }

        async fn wait_for_confirmation(
            &self,
            _tx_id: &str,
            _max_rounds: u64,
            _cancel: &CancellationToken,
        ) -> Result<ConfirmedTransaction> {
            unreachable!()
        }

        async fn last_round(&self) -> Result<u64> {
            unreachable!()
        }
    }

    fn addr(seed: u8) -> String {
        encode_address(&[seed; 32])
    }

    #[tokio::test]
    async fn test_zero_amount_fails_before_network() {
        let gateway = Arc::new(CountingGateway::new());
        let builder = TransactionBuilder::new(gateway.clone());

        let err = builder
            .build(&addr(1), &addr(2), 0, b"")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
        assert_eq!(gateway.params_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_address_fails_before_network() {
        let gateway = Arc::new(CountingGateway::new());
        let builder = TransactionBuilder::new(gateway.clone());

        let err = builder.build("A", &addr(2), 500_000, b"").await.unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
        assert_eq!(gateway.params_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversize_note_fails_before_network() {
        let gateway = Arc::new(CountingGateway::new());
        let builder = TransactionBuilder::new(gateway.clone());

        let note = vec![b'x'; MAX_NOTE_LEN + 1];
        let err = builder
            .build(&addr(1), &addr(2), 500_000, &note)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidNote(_)));
        assert_eq!(gateway.params_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_max_length_note_encodes_as_bin16() {
        let builder = TransactionBuilder::new(Arc::new(CountingGateway::new()));
        let note = vec![b'x'; MAX_NOTE_LEN];
        let payment = builder
            .build(&addr(1), &addr(2), 500_000, &note)
            .await
            .unwrap();
        let encoded = payment.encode().unwrap();

        // bin16 header: 0xc5 followed by the big-endian length (1024)
        assert!(encoded.windows(3).any(|w| w == [0xc5, 0x04, 0x00]));
    }

    #[tokio::test]
    async fn test_build_fetches_fresh_params() {
        let gateway = Arc::new(CountingGateway::new());
        let builder = TransactionBuilder::new(gateway.clone());

        let payment = builder
            .build(&addr(1), &addr(2), 500_000, b"hello")
            .await
            .unwrap();
        assert_eq!(payment.amount_micro(), 500_000);
        assert_eq!(payment.fee(), 1000);
        assert_eq!(gateway.params_calls.load(Ordering::SeqCst), 1);

        let rebuilt = builder.rebuild(&payment).await.unwrap();
        assert_eq!(rebuilt.amount_micro(), payment.amount_micro());
        assert_eq!(gateway.params_calls.load(Ordering::SeqCst), 2);
    }

    fn key_position(encoded: &[u8], key: &str) -> usize {
        let mut pattern = vec![0xa0 | key.len() as u8];
        pattern.extend_from_slice(key.as_bytes());
        encoded
            .windows(pattern.len())
            .position(|w| w == pattern.as_slice())
            .unwrap_or_else(|| panic!("key {key} not found"))
    }

    #[tokio::test]
    async fn test_encoding_is_canonical() {
        let builder = TransactionBuilder::new(Arc::new(CountingGateway::new()));
        let payment = builder
            .build(&addr(1), &addr(2), 500_000, b"hi")
            .await
            .unwrap();
        let encoded = payment.encode().unwrap();

        // 10 entries with a note present
        assert_eq!(encoded[0], 0x8a);

        // Keys appear in sorted order
        let order = ["amt", "fee", "fv", "gen", "gh", "lv", "note", "rcv", "snd", "type"];
        let positions: Vec<usize> = order.iter().map(|k| key_position(&encoded, k)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        // Sender/receiver are the raw 32-byte keys, not the encoded strings
        assert!(encoded
            .windows(34)
            .any(|w| w[0] == 0xc4 && w[1] == 32 && w[2..] == [1u8; 32]));
    }

    #[tokio::test]
    async fn test_empty_note_is_omitted() {
        let builder = TransactionBuilder::new(Arc::new(CountingGateway::new()));
        let payment = builder
            .build(&addr(1), &addr(2), 500_000, b"")
            .await
            .unwrap();
        let encoded = payment.encode().unwrap();
        assert_eq!(encoded[0], 0x89); // 9 entries, no note key
        assert!(!encoded
            .windows(5)
            .any(|w| w == [0xa4, b'n', b'o', b't', b'e']));
    }

    #[test]
    fn test_uint_encoding_widths() {
        let mut out = Vec::new();
        write_uint(&mut out, 5);
        assert_eq!(out, [0x05]);

        out.clear();
        write_uint(&mut out, 1000);
        assert_eq!(out, [0xcd, 0x03, 0xe8]);

        out.clear();
        write_uint(&mut out, 41_000_000);
        assert_eq!(out, [0xce, 0x02, 0x71, 0x9c, 0x40]);

        out.clear();
        write_uint(&mut out, u64::MAX);
        assert_eq!(out[0], 0xcf);
        assert_eq!(out.len(), 9);
    }
}
