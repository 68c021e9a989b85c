//! In-memory authoritative account collection plus the current-account
//! pointer. All mutation goes through the setters here so every subscriber
//! observes every change; callers never index into the collection directly.

use crate::account::AccountRecord;
use crate::events::{AccountEvent, AccountEventBus, EventReceiver};

#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: Vec<AccountRecord>,
    current_account_id: Option<String>,
    bus: AccountEventBus,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounts(&self) -> &[AccountRecord] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn current_account_id(&self) -> Option<&str> {
        self.current_account_id.as_deref()
    }

    pub fn current_account(&self) -> Option<&AccountRecord> {
        let id = self.current_account_id.as_deref()?;
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&AccountRecord> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.accounts.iter().any(|a| a.id == id)
    }

    /// Matches a previously stored mnemonic fingerprint. Empty fingerprints
    /// never match anything.
    pub fn find_by_seed_hash(&self, seed_hash: &str) -> Option<&AccountRecord> {
        if seed_hash.is_empty() {
            return None;
        }
        self.accounts.iter().find(|a| a.seed_hash == seed_hash)
    }

    pub fn subscribe(&self) -> EventReceiver<AccountEvent> {
        self.bus.subscribe()
    }

    /// Wholesale replacement, used at load time. Emits both change events.
    pub fn replace(&mut self, accounts: Vec<AccountRecord>, current_account_id: Option<String>) {
        self.accounts = accounts;
        self.current_account_id = current_account_id;
        self.emit_accounts_changed();
        self.bus.emit(AccountEvent::CurrentAccountChanged {
            current_id: self.current_account_id.clone(),
        });
    }

    /// Appends a record and makes it current. Ids must stay unique.
    pub fn insert(&mut self, record: AccountRecord) -> eyre::Result<()> {
        if self.contains(&record.id) {
            eyre::bail!("duplicate account id: {}", record.id);
        }
        let id = record.id.clone();
        self.accounts.push(record);
        self.emit_accounts_changed();
        self.current_account_id = Some(id);
        self.bus.emit(AccountEvent::CurrentAccountChanged {
            current_id: self.current_account_id.clone(),
        });
        Ok(())
    }

    /// Applies `mutate` to the record with the given id. Returns false and
    /// emits nothing when the id is unknown.
    pub fn update<F>(&mut self, id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut AccountRecord),
    {
        let Some(record) = self.accounts.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        mutate(record);
        self.emit_accounts_changed();
        true
    }

    /// Removes a record. When it was current, the pointer moves to the first
    /// record of the post-removal ordering. The minimum-membership rule is
    /// enforced by the lifecycle layer, not here.
    pub fn remove(&mut self, id: &str) -> Option<AccountRecord> {
        let pos = self.accounts.iter().position(|a| a.id == id)?;
        let removed = self.accounts.remove(pos);
        self.emit_accounts_changed();
        if self.current_account_id.as_deref() == Some(id) {
            self.current_account_id = self.accounts.first().map(|a| a.id.clone());
            self.bus.emit(AccountEvent::CurrentAccountChanged {
                current_id: self.current_account_id.clone(),
            });
        }
        Some(removed)
    }

    /// Moves the current pointer. Unknown ids leave the store untouched.
    pub fn set_current(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.current_account_id = Some(id.to_owned());
        self.bus.emit(AccountEvent::CurrentAccountChanged {
            current_id: self.current_account_id.clone(),
        });
        true
    }

    /// Announces a completed switch with the record attached.
    pub fn emit_switched(&self, account: AccountRecord) {
        self.bus.emit(AccountEvent::AccountSwitched { account });
    }

    fn emit_accounts_changed(&self) {
        self.bus.emit(AccountEvent::AccountsChanged {
            accounts: self.accounts.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountKind, AddressBook, DerivationPathSet, WalletProvider};
    use std::collections::BTreeMap;

    fn record(id: &str, name: &str) -> AccountRecord {
        AccountRecord {
            id: id.to_owned(),
            name: name.to_owned(),
            color: "#F87171".to_owned(),
            addresses: AddressBook::default(),
            paths: DerivationPathSet::default(),
            kind: AccountKind::Generated,
            wallet_type: WalletProvider::Standard,
            created_at: 0,
            last_used: 0,
            is_import: false,
            seed_hash: String::new(),
            balances: BTreeMap::new(),
        }
    }

    #[test]
    fn insert_sets_current_and_rejects_duplicate_ids() -> eyre::Result<()> {
        let mut store = AccountStore::new();
        store.insert(record("a", "Alpha"))?;
        assert_eq!(store.current_account_id(), Some("a"));
        store.insert(record("b", "Beta"))?;
        assert_eq!(store.current_account_id(), Some("b"));
        assert!(store.insert(record("a", "Clone")).is_err());
        assert_eq!(store.len(), 2);
        Ok(())
    }

    #[test]
    fn remove_reassigns_current_to_first_remaining() -> eyre::Result<()> {
        let mut store = AccountStore::new();
        store.insert(record("a", "Alpha"))?;
        store.insert(record("b", "Beta"))?;
        store.insert(record("c", "Gamma"))?;
        assert_eq!(store.current_account_id(), Some("c"));

        // Removing a non-current record leaves the pointer alone.
        assert!(store.remove("a").is_some());
        assert_eq!(store.current_account_id(), Some("c"));

        // Removing the current record falls back to index 0.
        assert!(store.remove("c").is_some());
        assert_eq!(store.current_account_id(), Some("b"));
        Ok(())
    }

    #[test]
    fn set_current_rejects_unknown_ids() -> eyre::Result<()> {
        let mut store = AccountStore::new();
        store.insert(record("a", "Alpha"))?;
        assert!(!store.set_current("nope"));
        assert_eq!(store.current_account_id(), Some("a"));
        assert!(store.set_current("a"));
        Ok(())
    }

    #[test]
    fn seed_hash_lookup_ignores_empty_fingerprints() -> eyre::Result<()> {
        let mut store = AccountStore::new();
        let mut a = record("a", "Alpha");
        a.seed_hash = "deadbeefdeadbeef".to_owned();
        store.insert(a)?;
        store.insert(record("b", "Beta"))?;

        assert_eq!(
            store.find_by_seed_hash("deadbeefdeadbeef").map(|r| r.id.as_str()),
            Some("a")
        );
        assert!(store.find_by_seed_hash("").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn mutations_notify_subscribers() -> eyre::Result<()> {
        let mut store = AccountStore::new();
        let mut rx = store.subscribe();

        store.insert(record("a", "Alpha"))?;
        let Some(AccountEvent::AccountsChanged { accounts }) = rx.try_recv() else {
            eyre::bail!("expected AccountsChanged first");
        };
        assert_eq!(accounts.len(), 1);
        let Some(AccountEvent::CurrentAccountChanged { current_id }) = rx.try_recv() else {
            eyre::bail!("expected CurrentAccountChanged second");
        };
        assert_eq!(current_id.as_deref(), Some("a"));

        store.update("a", |r| r.name = "Renamed".to_owned());
        let Some(AccountEvent::AccountsChanged { accounts }) = rx.try_recv() else {
            eyre::bail!("expected AccountsChanged after update");
        };
        assert_eq!(accounts.first().map(|r| r.name.as_str()), Some("Renamed"));
        Ok(())
    }
}
