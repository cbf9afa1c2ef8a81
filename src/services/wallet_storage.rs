use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::WalletError;
use crate::models::{ConnectedWalletSet, Ecosystem, WalletHandle};

/// Persists the connected wallet set as a JSON object keyed by ecosystem:
///
/// ```json
/// { "evm": { "address": "0x...", "type": "evm" }, "solana": null }
/// ```
pub struct WalletStorage {
    path: PathBuf,
}

impl WalletStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored set. A missing file yields the empty set. An
    /// unreadable document is removed, and invalid slots are dropped one by
    /// one.
    pub fn load(&self) -> ConnectedWalletSet {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return ConnectedWalletSet::default(),
            Err(err) => {
                tracing::warn!("Failed to read wallet state {}: {}", self.path.display(), err);
                return ConnectedWalletSet::default();
            }
        };

        let document = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                self.discard("stored wallet state is not an object");
                return ConnectedWalletSet::default();
            }
            Err(err) => {
                self.discard(&err.to_string());
                return ConnectedWalletSet::default();
            }
        };

        let mut set = ConnectedWalletSet::default();
        for ecosystem in Ecosystem::ALL {
            match parse_slot(ecosystem, &document) {
                Ok(Some(handle)) => set.set(handle),
                Ok(None) => {}
                Err(err) => tracing::warn!("Discarding stored {} wallet: {}", ecosystem.label(), err),
            }
        }
        set
    }

    /// Writes the set atomically through a sibling temp file.
    pub fn save(&self, set: &ConnectedWalletSet) -> std::io::Result<()> {
        let body = serde_json::to_string_pretty(set).map_err(std::io::Error::other)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)
    }

    // Internal helper that removes a corrupt state file.
    fn discard(&self, reason: &str) {
        tracing::warn!(
            "{}",
            WalletError::MalformedPersistedState(format!("{}: {}", self.path.display(), reason))
        );
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove wallet state {}: {}", self.path.display(), err);
        }
    }
}

// Internal helper that validates one stored slot.
fn parse_slot(
    ecosystem: Ecosystem,
    document: &Map<String, Value>,
) -> Result<Option<WalletHandle>, WalletError> {
    let slot = match document.get(ecosystem.as_str()) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(slot)) => slot,
        Some(_) => {
            return Err(WalletError::MalformedPersistedState(
                "slot is not an object".to_string(),
            ))
        }
    };

    let address = slot
        .get("address")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| WalletError::MalformedPersistedState("missing address".to_string()))?;

    match slot.get("type").and_then(Value::as_str) {
        Some(kind) if kind == ecosystem.as_str() => {}
        other => {
            return Err(WalletError::MalformedPersistedState(format!(
                "type {:?} does not match slot {}",
                other,
                ecosystem.as_str()
            )))
        }
    }

    Ok(Some(WalletHandle::new(ecosystem, address)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "wallet-storage-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("connected_wallets.json")
    }

    #[test]
    fn save_then_load_restores_set() {
        // Memastikan set wallet tersimpan dan terbaca kembali
        let storage = WalletStorage::new(temp_path("roundtrip"));
        let mut set = ConnectedWalletSet::default();
        set.set(WalletHandle::new(Ecosystem::Evm, "0xAbC"));
        set.set(WalletHandle::new(Ecosystem::Bitcoin, "bc1qxyz"));
        storage.save(&set).unwrap();
        assert_eq!(storage.load(), set);
    }

    #[test]
    fn missing_file_is_empty_set() {
        // Memastikan file yang tidak ada menghasilkan set kosong
        let storage = WalletStorage::new(temp_path("missing").with_file_name("absent.json"));
        assert!(storage.load().is_empty());
    }

    #[test]
    fn corrupt_file_is_removed() {
        // Memastikan file rusak dihapus dan set kosong dikembalikan
        let path = temp_path("corrupt");
        std::fs::write(&path, "{not json").unwrap();
        let storage = WalletStorage::new(&path);
        assert!(storage.load().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn invalid_slots_are_dropped_individually() {
        // Memastikan slot tidak valid dibuang tanpa mengganggu slot lain
        let path = temp_path("slots");
        std::fs::write(
            &path,
            r#"{
                "evm": { "address": "0xabc", "type": "evm" },
                "solana": { "address": "", "type": "solana" },
                "bitcoin": { "address": "bc1q", "type": "evm" }
            }"#,
        )
        .unwrap();
        let set = WalletStorage::new(&path).load();
        assert_eq!(set.evm.as_ref().map(|w| w.address.as_str()), Some("0xabc"));
        assert!(set.solana.is_none());
        assert!(set.bitcoin.is_none());
    }
}
