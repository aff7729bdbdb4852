//! Durable connected-address cache
//!
//! One JSON file per host-container user, holding the last verified address
//! only - never a balance, never key material. Writes fully overwrite the
//! file; an explicit disconnect removes it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};
use tracing::{debug, warn};

use crate::address::Address;
use crate::connect::WalletSource;
use crate::error::Result;

/// On-disk record for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedWallet {
    pub address: Address,
    pub source: WalletSource,
    pub updated_at: DateTime<Utc>,
}

/// File-backed cache keyed by host-container user id
pub struct WalletCache {
    dir: PathBuf,
}

impl WalletCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        // User ids come from the host container. Filesystem-safe ids keep a
        // readable filename; any other id gets a stable hash key, so a
        // hostile id cannot escape the directory and distinct ids never
        // collide on one file.
        let safe = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        let key: String = if safe {
            user_id.to_string()
        } else {
            Sha512_256::digest(user_id.as_bytes())
                .iter()
                .take(16)
                .map(|b| format!("{b:02x}"))
                .collect()
        };
        self.dir.join(format!("wallet-{key}.json"))
    }

    /// Last connected address for this user, if any. A corrupt record is
    /// treated as absent (the next connect overwrites it).
    pub fn load(&self, user_id: &str) -> Option<CachedWallet> {
        let path = self.path_for(user_id);
        let data = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(?path, error = %e, "discarding corrupt cache record");
                None
            }
        }
    }

    /// Overwrite the record for this user. Address only - callers never
    /// pass balances through here.
    pub fn store(&self, user_id: &str, address: &Address, source: WalletSource) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let record = CachedWallet {
            address: address.clone(),
            source,
            updated_at: Utc::now(),
        };
        let path = self.path_for(user_id);
        std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        debug!(?path, "cached connected address");
        Ok(())
    }

    /// Explicit disconnect
    pub fn clear(&self, user_id: &str) -> Result<()> {
        let path = self.path_for(user_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::encode_address;

    fn addr(seed: u8) -> Address {
        Address::parse(&encode_address(&[seed; 32])).unwrap()
    }

    #[test]
    fn test_store_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WalletCache::new(dir.path());

        assert!(cache.load("user1").is_none());

        cache
            .store("user1", &addr(1), WalletSource::Extension)
            .unwrap();
        let loaded = cache.load("user1").unwrap();
        assert_eq!(loaded.address, addr(1));
        assert_eq!(loaded.source, WalletSource::Extension);

        cache.clear("user1").unwrap();
        assert!(cache.load("user1").is_none());
        // Clearing again is fine
        cache.clear("user1").unwrap();
    }

    #[test]
    fn test_reconnect_overwrites_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WalletCache::new(dir.path());

        cache
            .store("user1", &addr(1), WalletSource::Extension)
            .unwrap();
        cache.store("user1", &addr(2), WalletSource::Manual).unwrap();

        let loaded = cache.load("user1").unwrap();
        assert_eq!(loaded.address, addr(2));
        assert_eq!(loaded.source, WalletSource::Manual);
    }

    #[test]
    fn test_users_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WalletCache::new(dir.path());

        cache
            .store("alice", &addr(1), WalletSource::Manual)
            .unwrap();
        cache.store("bob", &addr(2), WalletSource::Manual).unwrap();

        assert_eq!(cache.load("alice").unwrap().address, addr(1));
        assert_eq!(cache.load("bob").unwrap().address, addr(2));
    }

    #[test]
    fn test_hostile_user_id_stays_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WalletCache::new(dir.path());

        cache
            .store("../../etc/passwd", &addr(3), WalletSource::Manual)
            .unwrap();
        // The record is reachable under the sanitized key and nothing was
        // written outside the cache directory.
        assert!(cache.load("../../etc/passwd").is_some());
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_unsafe_ids_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WalletCache::new(dir.path());

        cache.store("!!!", &addr(1), WalletSource::Manual).unwrap();
        cache.store("???", &addr(2), WalletSource::Manual).unwrap();

        assert_eq!(cache.load("!!!").unwrap().address, addr(1));
        assert_eq!(cache.load("???").unwrap().address, addr(2));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_corrupt_record_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WalletCache::new(dir.path());
        std::fs::write(dir.path().join("wallet-user1.json"), "{not json").unwrap();
        assert!(cache.load("user1").is_none());
    }
}
