//! Durable account snapshot: one JSON document, rewritten wholesale after
//! every mutation. Memory stays authoritative; a failed write is the
//! caller's to log, not to crash on.

use crate::account::{
    now_ms, AccountKind, AccountRecord, AddressBook, DerivationPathSet, WalletProvider,
    ACCOUNT_PALETTE,
};
use crate::errors::AccountError;
use crate::paths::EmberkeepPaths;
use eyre::Context as _;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub accounts: Vec<AccountRecord>,
    pub current_account_id: Option<String>,
    pub last_saved: i64,
    pub version: u32,
}

/// Result of loading durable state, whichever file supplied it.
#[derive(Debug, Clone, Default)]
pub struct LoadedAccounts {
    pub accounts: Vec<AccountRecord>,
    pub current_account_id: Option<String>,
    /// Count of records discarded by shape validation.
    pub dropped_invalid: usize,
    /// True when the state came from the pre-multi-account wallet file.
    pub migrated_legacy: bool,
}

/// Shape of the single-wallet file written before accounts existed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyWalletFile {
    name: String,
    addresses: AddressBook,
    paths: DerivationPathSet,
    created_at: i64,
    seed_hash: String,
    is_import: bool,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    snapshot_path: PathBuf,
    legacy_path: PathBuf,
    lock_path: PathBuf,
}

impl SnapshotStore {
    pub fn new(paths: &EmberkeepPaths) -> Self {
        Self {
            snapshot_path: paths.snapshot_file(),
            legacy_path: paths.legacy_wallet_file(),
            lock_path: paths.lock_file(),
        }
    }

    pub fn snapshot_exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    pub fn legacy_exists(&self) -> bool {
        self.legacy_path.exists()
    }

    /// Loads the snapshot, dropping records that fail shape validation and
    /// repairing a dangling current pointer. Falls back to migrating the
    /// legacy single-wallet file when no snapshot exists yet.
    pub fn load(&self) -> eyre::Result<LoadedAccounts> {
        if !self.snapshot_path.exists() {
            if self.legacy_path.exists() {
                return self.migrate_legacy();
            }
            return Ok(LoadedAccounts::default());
        }

        let doc: Value =
            crate::fsutil::read_json(&self.snapshot_path).context("read accounts snapshot")?;

        let version = doc.get("version").and_then(Value::as_u64).unwrap_or(0);
        if version > u64::from(SNAPSHOT_VERSION) {
            warn!(version, "accounts snapshot written by a newer version; loading best-effort");
        }

        let mut accounts: Vec<AccountRecord> = vec![];
        let mut dropped_invalid = 0_usize;
        let mut seen_ids: HashSet<String> = HashSet::new();
        if let Some(items) = doc.get("accounts").and_then(Value::as_array) {
            for (index, item) in items.iter().enumerate() {
                match serde_json::from_value::<AccountRecord>(item.clone()) {
                    Ok(record) if record.has_valid_shape() => {
                        if seen_ids.insert(record.id.clone()) {
                            accounts.push(record);
                        } else {
                            dropped_invalid += 1;
                            warn!(index, id = %record.id, "dropping account record with duplicate id");
                        }
                    }
                    Ok(_) => {
                        dropped_invalid += 1;
                        warn!(index, "dropping account record with empty id or name");
                    }
                    Err(e) => {
                        dropped_invalid += 1;
                        warn!(index, error = %e, "dropping malformed account record");
                    }
                }
            }
        }

        let stored_current = doc
            .get("currentAccountId")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let current_account_id = stored_current
            .filter(|id| accounts.iter().any(|a| a.id == *id))
            .or_else(|| accounts.first().map(|a| a.id.clone()));

        Ok(LoadedAccounts {
            accounts,
            current_account_id,
            dropped_invalid,
            migrated_legacy: false,
        })
    }

    fn migrate_legacy(&self) -> eyre::Result<LoadedAccounts> {
        let legacy: LegacyWalletFile =
            crate::fsutil::read_json(&self.legacy_path).context("read legacy wallet file")?;

        let created_at = if legacy.created_at > 0 {
            legacy.created_at
        } else {
            now_ms()
        };
        let name = if legacy.name.trim().is_empty() {
            "Account 1".to_owned()
        } else {
            legacy.name
        };
        let record = AccountRecord {
            id: Uuid::new_v4().to_string(),
            name,
            color: ACCOUNT_PALETTE[0].to_owned(),
            addresses: legacy.addresses,
            paths: legacy.paths,
            kind: if legacy.is_import {
                AccountKind::Imported
            } else {
                AccountKind::Generated
            },
            wallet_type: WalletProvider::Standard,
            created_at,
            last_used: created_at,
            is_import: legacy.is_import,
            seed_hash: legacy.seed_hash,
            balances: BTreeMap::new(),
        };

        let current_account_id = Some(record.id.clone());
        Ok(LoadedAccounts {
            accounts: vec![record],
            current_account_id,
            dropped_invalid: 0,
            migrated_legacy: true,
        })
    }

    /// Overwrites the snapshot. Serialized across processes by a file lock;
    /// a concurrent writer makes this fail fast rather than block.
    pub fn save(
        &self,
        accounts: &[AccountRecord],
        current_account_id: Option<&str>,
    ) -> eyre::Result<()> {
        let lock = self.acquire_write_lock()?;
        let snapshot = AccountSnapshot {
            accounts: accounts.to_vec(),
            current_account_id: current_account_id.map(str::to_owned),
            last_saved: now_ms(),
            version: SNAPSHOT_VERSION,
        };
        let res = crate::fsutil::write_json_private(&self.snapshot_path, &snapshot);
        Self::release_lock(lock)?;
        res
    }

    fn acquire_write_lock(&self) -> eyre::Result<File> {
        if let Some(parent) = self.lock_path.parent() {
            crate::fsutil::ensure_private_dir(parent)?;
        }
        let f = {
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .truncate(false)
                    .mode(0o600)
                    .open(&self.lock_path)
                    .context("open lock file")?
            }
            #[cfg(not(unix))]
            {
                OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .truncate(false)
                    .open(&self.lock_path)
                    .context("open lock file")?
            }
        };
        match f.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(AccountError::SnapshotBusy.into());
            }
            Err(e) => return Err(eyre::Report::new(e).wrap_err("lock exclusive")),
        }
        Ok(f)
    }

    fn release_lock(f: File) -> eyre::Result<()> {
        FileExt::unlock(&f).context("unlock")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::EmberkeepPaths;

    fn test_paths(dir: &std::path::Path) -> EmberkeepPaths {
        EmberkeepPaths {
            config_dir: dir.join("config"),
            data_dir: dir.join("data"),
            log_file: dir.join("data").join("emberkeep.log.jsonl"),
        }
    }

    fn record(id: &str, name: &str) -> AccountRecord {
        AccountRecord {
            id: id.to_owned(),
            name: name.to_owned(),
            color: ACCOUNT_PALETTE[0].to_owned(),
            addresses: AddressBook {
                segwit: "bc1qaaa".to_owned(),
                taproot: "bc1paaa".to_owned(),
                legacy: "1aaa".to_owned(),
                nested_segwit: "3aaa".to_owned(),
                spark: "sp1aaa".to_owned(),
            },
            paths: DerivationPathSet::default(),
            kind: AccountKind::Generated,
            wallet_type: WalletProvider::Standard,
            created_at: 1_700_000_000_000,
            last_used: 1_700_000_000_000,
            is_import: false,
            seed_hash: "aabbccdd00112233".to_owned(),
            balances: BTreeMap::new(),
        }
    }

    #[test]
    fn round_trip_preserves_records_and_current() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SnapshotStore::new(&test_paths(dir.path()));

        let accounts = vec![record("a", "Alpha"), record("b", "Beta")];
        store.save(&accounts, Some("b"))?;

        let loaded = store.load()?;
        assert_eq!(loaded.accounts.len(), 2);
        assert_eq!(loaded.current_account_id.as_deref(), Some("b"));
        assert_eq!(loaded.dropped_invalid, 0);
        assert!(!loaded.migrated_legacy);
        let first = loaded
            .accounts
            .first()
            .ok_or_else(|| eyre::eyre!("missing first account"))?;
        assert_eq!(first.name, "Alpha");
        assert_eq!(first.addresses.spark, "sp1aaa");
        Ok(())
    }

    #[test]
    fn malformed_records_are_dropped_and_current_falls_back() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let paths = test_paths(dir.path());
        let store = SnapshotStore::new(&paths);

        // One valid record, one with an empty name, one missing addresses.
        let doc = serde_json::json!({
            "accounts": [
                serde_json::to_value(record("good", "Good"))?,
                { "id": "noname", "name": "", "addresses": {} },
                { "id": "nobook", "name": "NoBook" },
            ],
            "currentAccountId": "noname",
            "lastSaved": 0,
            "version": SNAPSHOT_VERSION,
        });
        crate::fsutil::ensure_private_dir(&paths.data_dir)?;
        std::fs::write(paths.snapshot_file(), serde_json::to_string(&doc)?)?;

        let loaded = store.load()?;
        assert_eq!(loaded.accounts.len(), 1);
        assert_eq!(loaded.dropped_invalid, 2);
        // Pointer at a dropped record falls back to the first survivor.
        assert_eq!(loaded.current_account_id.as_deref(), Some("good"));
        Ok(())
    }

    #[test]
    fn duplicate_ids_keep_the_first_record() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let paths = test_paths(dir.path());
        let store = SnapshotStore::new(&paths);

        let doc = serde_json::json!({
            "accounts": [
                serde_json::to_value(record("dup", "First"))?,
                serde_json::to_value(record("dup", "Second"))?,
            ],
            "currentAccountId": "dup",
            "lastSaved": 0,
            "version": SNAPSHOT_VERSION,
        });
        crate::fsutil::ensure_private_dir(&paths.data_dir)?;
        std::fs::write(paths.snapshot_file(), serde_json::to_string(&doc)?)?;

        let loaded = store.load()?;
        assert_eq!(loaded.accounts.len(), 1);
        assert_eq!(
            loaded.accounts.first().map(|a| a.name.as_str()),
            Some("First")
        );
        assert_eq!(loaded.dropped_invalid, 1);
        Ok(())
    }

    #[test]
    fn legacy_wallet_file_migrates_to_one_account() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let paths = test_paths(dir.path());
        let store = SnapshotStore::new(&paths);

        let legacy = serde_json::json!({
            "name": "My Wallet",
            "addresses": {
                "segwit": "bc1qlegacy",
                "taproot": "",
                "legacy": "",
                "nestedSegwit": "",
                "spark": "sp1legacy",
            },
            "createdAt": 1_600_000_000_000_i64,
            "isImport": false,
        });
        crate::fsutil::ensure_private_dir(&paths.data_dir)?;
        std::fs::write(paths.legacy_wallet_file(), serde_json::to_string(&legacy)?)?;

        let loaded = store.load()?;
        assert!(loaded.migrated_legacy);
        assert_eq!(loaded.accounts.len(), 1);
        let rec = loaded
            .accounts
            .first()
            .ok_or_else(|| eyre::eyre!("missing migrated account"))?;
        assert_eq!(rec.name, "My Wallet");
        assert_eq!(rec.addresses.segwit, "bc1qlegacy");
        assert_eq!(rec.created_at, 1_600_000_000_000_i64);
        assert!(rec.needs_repair());
        assert_eq!(loaded.current_account_id.as_deref(), Some(rec.id.as_str()));
        Ok(())
    }

    #[test]
    fn empty_state_when_no_files_exist() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SnapshotStore::new(&test_paths(dir.path()));
        let loaded = store.load()?;
        assert!(loaded.accounts.is_empty());
        assert!(loaded.current_account_id.is_none());
        Ok(())
    }
}
