//! Account lifecycle orchestration.
//!
//! The [`AccountLifecycleManager`] owns the sequencing rules around the
//! in-memory [`AccountStore`]: derivation and detection calls happen outside
//! the store lock, records enter the collection only once fully assembled,
//! and every successful mutation is written through to the snapshot file.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::account::{
    now_ms, pick_color, seed_fingerprint, validate_account_name, validate_mnemonic, AccountKind,
    AccountRecord, AddressBook, AddressKind, WalletProvider, ACCOUNT_PALETTE,
};
use crate::account_store::AccountStore;
use crate::derivation::{AddressDeriver, BitcoinDerivation, SparkDerivation, TaprootVariant};
use crate::detector::{DetectionReport, WalletTypeDetector};
use crate::errors::AccountError;
use crate::events::{AccountEvent, EventReceiver};
use crate::persistence::{LoadedAccounts, SnapshotStore};
use crate::vault::SeedVault;

/// A record admitted to the collection, plus what the caller should do next.
#[derive(Debug, Clone)]
pub struct CreatedAccount {
    pub record: AccountRecord,
    /// Some address or path fields came back empty; a repair pass can fill
    /// them later from the sealed seed.
    pub needs_repair: bool,
    /// Id of an existing account sharing this seed fingerprint. Advisory
    /// only; the import went through regardless.
    pub duplicate_of: Option<String>,
}

/// One selectable taproot convention surfaced by an ambiguous import.
#[derive(Debug, Clone, PartialEq)]
pub struct TaprootCandidate {
    pub provider: String,
    pub address: String,
    pub path: String,
    /// Largest balance detection saw under this provider's paths.
    pub balance: f64,
}

/// Result of [`AccountLifecycleManager::import`].
#[derive(Debug, Clone)]
pub enum ImportOutcome {
    Created(CreatedAccount),
    /// Detection saw activity under more than one provider convention and
    /// nothing was admitted. The caller picks a candidate and imports again
    /// with [`ImportOptions::selected_variant`] set.
    VariantRequired(Vec<TaprootCandidate>),
}

/// The caller's resolution of a [`ImportOutcome::VariantRequired`] outcome.
#[derive(Debug, Clone)]
pub struct SelectedVariant {
    pub provider: String,
    pub address: String,
    pub path: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Probe the detection service for the originating wallet software.
    pub detect: bool,
    /// Known provider convention; skips detection entirely.
    pub wallet_type_hint: Option<String>,
    /// Resolution of an earlier ambiguous outcome. Takes precedence over
    /// both detection and the hint.
    pub selected_variant: Option<SelectedVariant>,
}

/// What bootstrap found on disk.
#[derive(Debug, Clone, Copy)]
pub struct LoadReport {
    pub account_count: usize,
    pub dropped_invalid: usize,
    pub migrated_legacy: bool,
    /// Records that loaded with address or path gaps.
    pub needs_repair: usize,
}

pub struct AccountLifecycleManager {
    store: Arc<Mutex<AccountStore>>,
    snapshots: SnapshotStore,
    deriver: Arc<dyn AddressDeriver>,
    detector: Arc<dyn WalletTypeDetector>,
    vault: Arc<dyn SeedVault>,
    request_timeout: Duration,
    /// Single permit; repair passes queue behind it instead of interleaving.
    repair_gate: Semaphore,
}

impl AccountLifecycleManager {
    pub fn new(
        store: Arc<Mutex<AccountStore>>,
        snapshots: SnapshotStore,
        deriver: Arc<dyn AddressDeriver>,
        detector: Arc<dyn WalletTypeDetector>,
        vault: Arc<dyn SeedVault>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            snapshots,
            deriver,
            detector,
            vault,
            request_timeout,
            repair_gate: Semaphore::new(1),
        }
    }

    /// Load the snapshot (or migrate the legacy single-wallet file) into the
    /// store. Rewrites the snapshot immediately when the load changed shape.
    pub fn bootstrap(&self) -> eyre::Result<LoadReport> {
        let LoadedAccounts {
            accounts,
            current_account_id,
            dropped_invalid,
            migrated_legacy,
        } = self.snapshots.load()?;

        let needs_repair = accounts.iter().filter(|a| a.needs_repair()).count();
        let report = LoadReport {
            account_count: accounts.len(),
            dropped_invalid,
            migrated_legacy,
            needs_repair,
        };

        {
            let mut store = self.store_guard()?;
            store.replace(accounts, current_account_id);
        }
        if migrated_legacy || dropped_invalid > 0 {
            self.persist();
        }
        info!(
            accounts = report.account_count,
            dropped = report.dropped_invalid,
            migrated = report.migrated_legacy,
            "account collection loaded"
        );
        Ok(report)
    }

    /// Create a brand-new account from a (typically freshly generated)
    /// mnemonic. Validation happens before any service call; the record is
    /// admitted only once both derivations succeed.
    pub async fn create(&self, name: &str, mnemonic: &str) -> eyre::Result<CreatedAccount> {
        let name = validate_account_name(name)?;
        let mnemonic = validate_mnemonic(mnemonic)?;

        let (spark, bitcoin) = self.derive_bundle(&mnemonic, None).await?;

        let record = self.admit_record(
            name,
            &mnemonic,
            &spark,
            &bitcoin,
            AccountKind::Generated,
            WalletProvider::Standard,
        )?;

        if let Err(e) = self.vault.store_seed(false, &mnemonic).await {
            warn!(error = %e, "failed to seal generated seed in the vault");
        }
        self.persist();

        let needs_repair = record.needs_repair();
        if needs_repair {
            warn_address_gaps(&record);
        }
        Ok(CreatedAccount {
            record,
            needs_repair,
            duplicate_of: None,
        })
    }

    /// Import an existing mnemonic, optionally detecting which wallet
    /// software produced it so derivation can follow that convention.
    pub async fn import(
        &self,
        name: &str,
        mnemonic: &str,
        options: ImportOptions,
    ) -> eyre::Result<ImportOutcome> {
        let name = validate_account_name(name)?;
        let mnemonic = validate_mnemonic(mnemonic)?;

        let fingerprint = seed_fingerprint(&mnemonic);
        let duplicate_of = {
            let store = self.store_guard()?;
            store.find_by_seed_hash(&fingerprint).map(|a| a.id.clone())
        };
        if let Some(existing) = &duplicate_of {
            info!(existing = %existing, "importing a seed already present in the collection");
        }

        let provider = if let Some(selected) = &options.selected_variant {
            WalletProvider::from(selected.provider.clone())
        } else if let Some(hint) = &options.wallet_type_hint {
            WalletProvider::from(hint.clone())
        } else if options.detect {
            match self.resolve_provider(&mnemonic).await? {
                ProviderResolution::Single(provider) => provider,
                ProviderResolution::Ambiguous(candidates) => {
                    info!(
                        count = candidates.len(),
                        "import suspended pending taproot variant selection"
                    );
                    return Ok(ImportOutcome::VariantRequired(candidates));
                }
            }
        } else {
            WalletProvider::Standard
        };

        let (spark, mut bitcoin) = self
            .derive_bundle(&mnemonic, provider_hint(&provider))
            .await?;
        if let Some(selected) = &options.selected_variant {
            // The chosen variant wins exactly, whatever the service returned.
            selected.address.clone_into(&mut bitcoin.addresses.taproot);
            selected.path.clone_into(&mut bitcoin.paths.taproot);
        }

        let record = self.admit_record(
            name,
            &mnemonic,
            &spark,
            &bitcoin,
            AccountKind::Imported,
            provider,
        )?;

        if let Err(e) = self.vault.store_seed(true, &mnemonic).await {
            warn!(error = %e, "failed to seal imported seed in the vault");
        }
        self.persist();

        let needs_repair = record.needs_repair();
        if needs_repair {
            warn_address_gaps(&record);
        }
        Ok(ImportOutcome::Created(CreatedAccount {
            record,
            needs_repair,
            duplicate_of,
        }))
    }

    /// Make `id` the current account and stamp its last-used time. Unknown
    /// ids return `Ok(false)` without touching disk or emitting anything.
    pub fn switch_account(&self, id: &str) -> eyre::Result<bool> {
        let switched = {
            let mut store = self.store_guard()?;
            if !store.contains(id) {
                return Ok(false);
            }
            store.update(id, AccountRecord::touch);
            store.set_current(id);
            store.get(id).cloned()
        };
        let Some(record) = switched else {
            return Ok(false);
        };
        self.persist();
        {
            let store = self.store_guard()?;
            store.emit_switched(record);
        }
        Ok(true)
    }

    /// Rename an account. The new name passes the same validation as create.
    pub fn rename_account(&self, id: &str, new_name: &str) -> eyre::Result<bool> {
        let name = validate_account_name(new_name)?;
        let updated = {
            let mut store = self.store_guard()?;
            store.update(id, |record| record.name = name)
        };
        if updated {
            self.persist();
        }
        Ok(updated)
    }

    /// Assign a display color from the fixed palette.
    pub fn set_account_color(&self, id: &str, color: &str) -> eyre::Result<bool> {
        let color = color.trim();
        if !ACCOUNT_PALETTE.contains(&color) {
            return Err(AccountError::InvalidColor(format!(
                "{color} is not in the account palette"
            ))
            .into());
        }
        let updated = {
            let mut store = self.store_guard()?;
            store.update(id, |record| color.clone_into(&mut record.color))
        };
        if updated {
            self.persist();
        }
        Ok(updated)
    }

    /// Replace the cached per-currency balances on a record.
    pub fn record_balances(
        &self,
        id: &str,
        balances: BTreeMap<String, f64>,
    ) -> eyre::Result<bool> {
        let updated = {
            let mut store = self.store_guard()?;
            store.update(id, |record| record.balances = balances)
        };
        if updated {
            self.persist();
        }
        Ok(updated)
    }

    /// Remove an account. The collection never drops below one member; with
    /// exactly one left this fails regardless of which id was asked for.
    pub fn delete_account(&self, id: &str) -> eyre::Result<bool> {
        let removed = {
            let mut store = self.store_guard()?;
            if store.len() == 1 {
                return Err(AccountError::LastAccount.into());
            }
            store.remove(id).is_some()
        };
        if removed {
            self.persist();
        }
        Ok(removed)
    }

    /// Fill address and path gaps from the sealed seeds. Waits for any
    /// in-flight pass to finish first; returns how many records were fixed.
    pub async fn repair_missing_addresses(&self) -> eyre::Result<usize> {
        let _permit = self
            .repair_gate
            .acquire()
            .await
            .map_err(|e| eyre::eyre!("repair gate closed: {e}"))?;
        self.repair_pass().await
    }

    /// Like [`Self::repair_missing_addresses`] but fails fast with
    /// [`AccountError::RepairBusy`] when a pass is already running.
    pub async fn try_repair_missing_addresses(&self) -> eyre::Result<usize> {
        let permit = match self.repair_gate.try_acquire() {
            Ok(permit) => permit,
            Err(tokio::sync::TryAcquireError::NoPermits) => {
                return Err(AccountError::RepairBusy.into());
            }
            Err(e) => return Err(eyre::eyre!("repair gate closed: {e}")),
        };
        let fixed = self.repair_pass().await;
        drop(permit);
        fixed
    }

    /// A snapshot of every record, in insertion order.
    pub fn accounts(&self) -> eyre::Result<Vec<AccountRecord>> {
        let store = self.store_guard()?;
        Ok(store.accounts().to_vec())
    }

    pub fn current_account(&self) -> eyre::Result<Option<AccountRecord>> {
        let store = self.store_guard()?;
        Ok(store.current_account().cloned())
    }

    #[cfg(test)]
    pub fn account_count(&self) -> eyre::Result<usize> {
        let store = self.store_guard()?;
        Ok(store.len())
    }

    /// Resolve a user-supplied needle to a record: exact id first, then a
    /// unique case-insensitive name match.
    pub fn resolve_account(&self, needle: &str) -> eyre::Result<Option<AccountRecord>> {
        let store = self.store_guard()?;
        if store.is_empty() {
            return Ok(None);
        }
        if let Some(record) = store.get(needle) {
            return Ok(Some(record.clone()));
        }
        let mut matches = store
            .accounts()
            .iter()
            .filter(|a| a.name.eq_ignore_ascii_case(needle));
        let first = matches.next();
        if matches.next().is_some() {
            return Ok(None);
        }
        Ok(first.cloned())
    }

    pub fn subscribe(&self) -> eyre::Result<EventReceiver<AccountEvent>> {
        let store = self.store_guard()?;
        Ok(store.subscribe())
    }

    async fn repair_pass(&self) -> eyre::Result<usize> {
        let pending: Vec<(String, bool)> = {
            let store = self.store_guard()?;
            store
                .accounts()
                .iter()
                .filter(|a| a.needs_repair())
                .map(|a| (a.id.clone(), a.is_import))
                .collect()
        };
        if pending.is_empty() {
            debug!("no address gaps to repair");
            return Ok(0);
        }

        let mut fixed = 0_usize;
        for (id, is_import) in pending {
            match self.repair_one(&id, is_import).await {
                Ok(true) => fixed += 1,
                Ok(false) => {}
                Err(e) => warn!(id = %id, error = %e, "address repair failed for account"),
            }
        }
        if fixed > 0 {
            self.persist();
        }
        info!(fixed, "address repair pass finished");
        Ok(fixed)
    }

    async fn repair_one(&self, id: &str, is_import: bool) -> eyre::Result<bool> {
        let Some(mnemonic) = self.vault.retrieve_seed(is_import).await? else {
            warn!(id = %id, "no sealed seed for this account class; skipping repair");
            return Ok(false);
        };

        // Re-read under the lock; the record may have changed or gone away
        // since the pass scanned it.
        let (provider, seed_hash) = {
            let store = self.store_guard()?;
            let Some(record) = store.get(id) else {
                return Ok(false);
            };
            if !record.needs_repair() {
                return Ok(false);
            }
            (record.wallet_type.clone(), record.seed_hash.clone())
        };

        // The vault keeps one seed per account class, so a newer same-class
        // account overwrites an older one's. A record is only ever filled
        // from its own seed.
        if seed_fingerprint(&mnemonic) != seed_hash {
            warn!(id = %id, "sealed seed belongs to a different account; skipping repair");
            return Ok(false);
        }

        let (spark, bitcoin) = self
            .derive_bundle(&mnemonic, provider_hint(&provider))
            .await?;
        let fresh = merge_addresses(&spark, &bitcoin);

        let filled = {
            let mut store = self.store_guard()?;
            let mut filled = 0_usize;
            store.update(id, |record| {
                filled = record.addresses.fill_missing_from(&fresh)
                    + record.paths.fill_missing_from(&bitcoin.paths);
            });
            filled
        };
        Ok(filled > 0)
    }

    /// Run both derivations concurrently under the request timeout.
    async fn derive_bundle(
        &self,
        mnemonic: &str,
        provider_hint: Option<&str>,
    ) -> eyre::Result<(SparkDerivation, BitcoinDerivation)> {
        let spark_fut =
            tokio::time::timeout(self.request_timeout, self.deriver.derive_spark(mnemonic));
        let bitcoin_fut = tokio::time::timeout(
            self.request_timeout,
            self.deriver.derive_bitcoin(mnemonic, provider_hint),
        );
        let (spark_res, bitcoin_res) = tokio::join!(spark_fut, bitcoin_fut);
        let spark = flatten_service_result(spark_res, "spark derivation")?;
        let bitcoin = flatten_service_result(bitcoin_res, "bitcoin derivation")?;
        Ok((spark, bitcoin))
    }

    /// Ask the detector which wallet software the seed came from, and turn
    /// an ambiguous answer into selectable taproot candidates.
    async fn resolve_provider(&self, mnemonic: &str) -> eyre::Result<ProviderResolution> {
        let report = flatten_service_result(
            tokio::time::timeout(self.request_timeout, self.detector.detect(mnemonic)).await,
            "wallet detection",
        )?;

        let providers = report.plausible_providers();
        match providers.as_slice() {
            [] => Ok(ProviderResolution::Single(WalletProvider::Standard)),
            [only] => Ok(ProviderResolution::Single(WalletProvider::from(
                only.clone(),
            ))),
            _ => {
                let candidates = self.enumerate_variants(mnemonic, &report).await?;
                match candidates.as_slice() {
                    [] => Ok(ProviderResolution::Single(WalletProvider::Standard)),
                    [only] => Ok(ProviderResolution::Single(WalletProvider::from(
                        only.provider.clone(),
                    ))),
                    _ => Ok(ProviderResolution::Ambiguous(candidates)),
                }
            }
        }
    }

    /// The detector reports names and paths but no addresses. One standard
    /// derivation call carries the per-provider taproot table; intersect it
    /// with the detected providers to build the candidate list.
    async fn enumerate_variants(
        &self,
        mnemonic: &str,
        report: &DetectionReport,
    ) -> eyre::Result<Vec<TaprootCandidate>> {
        let bitcoin = flatten_service_result(
            tokio::time::timeout(
                self.request_timeout,
                self.deriver.derive_bitcoin(mnemonic, None),
            )
            .await,
            "variant enumeration",
        )?;

        let mut candidates = Vec::new();
        for provider in report.plausible_providers() {
            let Some(variant) = lookup_variant(&bitcoin.taproot_variants, &provider) else {
                warn!(provider = %provider, "no taproot variant for detected provider");
                continue;
            };
            let balance = report
                .active_paths
                .iter()
                .filter(|p| p.wallet_name.eq_ignore_ascii_case(&provider))
                .map(|p| p.balance)
                .fold(0.0_f64, f64::max);
            candidates.push(TaprootCandidate {
                provider,
                address: variant.address.clone(),
                path: variant.path.clone(),
                balance,
            });
        }
        Ok(candidates)
    }

    /// Assemble the record and hand it to the store, picking a palette color
    /// that avoids those already in use.
    fn admit_record(
        &self,
        name: String,
        mnemonic: &str,
        spark: &SparkDerivation,
        bitcoin: &BitcoinDerivation,
        kind: AccountKind,
        wallet_type: WalletProvider,
    ) -> eyre::Result<AccountRecord> {
        let mut store = self.store_guard()?;
        let color = pick_color(store.accounts().iter().map(|a| a.color.as_str()));
        let now = now_ms();
        let record = AccountRecord {
            id: Uuid::new_v4().to_string(),
            name,
            color,
            addresses: merge_addresses(spark, bitcoin),
            paths: bitcoin.paths.clone(),
            kind,
            is_import: kind == AccountKind::Imported,
            wallet_type,
            created_at: now,
            last_used: now,
            seed_hash: seed_fingerprint(mnemonic),
            balances: BTreeMap::new(),
        };
        store.insert(record.clone())?;
        Ok(record)
    }

    /// Clone the collection out of the lock and write it through. Failure is
    /// logged, not raised; memory stays authoritative either way.
    fn persist(&self) {
        let snapshot = match self.store_guard() {
            Ok(store) => (
                store.accounts().to_vec(),
                store.current_account_id().map(str::to_owned),
            ),
            Err(e) => {
                warn!(error = %e, "skipping snapshot write");
                return;
            }
        };
        if let Err(e) = self.snapshots.save(&snapshot.0, snapshot.1.as_deref()) {
            warn!(error = %e, "failed to persist account snapshot");
        }
    }

    fn store_guard(&self) -> eyre::Result<MutexGuard<'_, AccountStore>> {
        self.store
            .lock()
            .map_err(|e| eyre::eyre!("account store mutex poisoned: {e}"))
    }
}

enum ProviderResolution {
    Single(WalletProvider),
    Ambiguous(Vec<TaprootCandidate>),
}

fn provider_hint(provider: &WalletProvider) -> Option<&str> {
    match provider {
        WalletProvider::Standard => None,
        WalletProvider::Other(name) => Some(name.as_str()),
    }
}

fn warn_address_gaps(record: &AccountRecord) {
    let missing: Vec<&str> = record
        .addresses
        .missing_kinds()
        .into_iter()
        .map(AddressKind::as_str)
        .collect();
    warn!(id = %record.id, missing = ?missing, "account admitted with address gaps");
}

fn merge_addresses(spark: &SparkDerivation, bitcoin: &BitcoinDerivation) -> AddressBook {
    AddressBook {
        segwit: bitcoin.addresses.segwit.clone(),
        taproot: bitcoin.addresses.taproot.clone(),
        legacy: bitcoin.addresses.legacy.clone(),
        nested_segwit: bitcoin.addresses.nested_segwit.clone(),
        spark: spark.address.clone(),
    }
}

/// Provider names are matched case-insensitively against the variant table.
fn lookup_variant<'a>(
    variants: &'a BTreeMap<String, TaprootVariant>,
    provider: &str,
) -> Option<&'a TaprootVariant> {
    variants.get(provider).or_else(|| {
        variants
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(provider))
            .map(|(_, variant)| variant)
    })
}

/// Collapse `timeout(..) -> Result<eyre::Result<T>, Elapsed>` into a domain
/// derivation error so callers see one failure shape.
fn flatten_service_result<T>(
    result: Result<eyre::Result<T>, tokio::time::error::Elapsed>,
    operation: &str,
) -> eyre::Result<T> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(operation, error = %e, "service call failed");
            Err(AccountError::Derivation(format!("{operation} failed: {e}")).into())
        }
        Err(_) => {
            warn!(operation, "service call timed out");
            Err(AccountError::Derivation(format!("{operation} timed out")).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::DerivationPathSet;
    use crate::derivation::BitcoinAddressSet;
    use crate::detector::ActivePath;
    use crate::paths::EmberkeepPaths;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MNEMONIC_A: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const MNEMONIC_B: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    #[derive(Default)]
    struct FakeDeriver {
        spark_calls: AtomicUsize,
        bitcoin_calls: AtomicUsize,
        fail_spark: bool,
        hang_bitcoin: bool,
        empty_spark: bool,
        variants: BTreeMap<String, TaprootVariant>,
    }

    #[async_trait::async_trait]
    impl AddressDeriver for FakeDeriver {
        async fn derive_spark(&self, mnemonic: &str) -> eyre::Result<SparkDerivation> {
            self.spark_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_spark {
                eyre::bail!("spark backend unavailable");
            }
            if self.empty_spark {
                return Ok(SparkDerivation {
                    address: String::new(),
                });
            }
            Ok(SparkDerivation {
                address: format!("sp1{}", seed_fingerprint(mnemonic)),
            })
        }

        async fn derive_bitcoin(
            &self,
            mnemonic: &str,
            provider_hint: Option<&str>,
        ) -> eyre::Result<BitcoinDerivation> {
            self.bitcoin_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_bitcoin {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            let tag = seed_fingerprint(mnemonic);
            let taproot = provider_hint
                .and_then(|hint| lookup_variant(&self.variants, hint))
                .map_or_else(|| format!("bc1p{tag}"), |v| v.address.clone());
            Ok(BitcoinDerivation {
                addresses: BitcoinAddressSet {
                    segwit: format!("bc1q{tag}"),
                    taproot,
                    legacy: format!("1{tag}"),
                    nested_segwit: format!("3{tag}"),
                },
                paths: DerivationPathSet {
                    segwit: "m/84'/0'/0'/0/0".to_owned(),
                    taproot: "m/86'/0'/0'/0/0".to_owned(),
                    legacy: "m/44'/0'/0'/0/0".to_owned(),
                    nested_segwit: "m/49'/0'/0'/0/0".to_owned(),
                },
                taproot_variants: self.variants.clone(),
            })
        }
    }

    #[derive(Default)]
    struct FakeDetector {
        calls: AtomicUsize,
        report: DetectionReport,
    }

    #[async_trait::async_trait]
    impl WalletTypeDetector for FakeDetector {
        async fn detect(&self, _mnemonic: &str) -> eyre::Result<DetectionReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.report.clone())
        }
    }

    #[derive(Default)]
    struct FakeVault {
        seeds: Mutex<BTreeMap<bool, String>>,
    }

    #[async_trait::async_trait]
    impl SeedVault for FakeVault {
        async fn retrieve_seed(
            &self,
            is_import: bool,
        ) -> eyre::Result<Option<zeroize::Zeroizing<String>>> {
            let seeds = self
                .seeds
                .lock()
                .map_err(|e| eyre::eyre!("fake vault poisoned: {e}"))?;
            Ok(seeds.get(&is_import).cloned().map(zeroize::Zeroizing::new))
        }

        async fn store_seed(&self, is_import: bool, mnemonic: &str) -> eyre::Result<()> {
            let mut seeds = self
                .seeds
                .lock()
                .map_err(|e| eyre::eyre!("fake vault poisoned: {e}"))?;
            seeds.insert(is_import, mnemonic.to_owned());
            Ok(())
        }
    }

    struct Harness {
        manager: AccountLifecycleManager,
        deriver: Arc<FakeDeriver>,
        detector: Arc<FakeDetector>,
        vault: Arc<FakeVault>,
        paths: EmberkeepPaths,
        _dir: tempfile::TempDir,
    }

    fn harness() -> eyre::Result<Harness> {
        harness_with(FakeDeriver::default(), FakeDetector::default())
    }

    fn harness_with(deriver: FakeDeriver, detector: FakeDetector) -> eyre::Result<Harness> {
        let dir = tempfile::tempdir()?;
        let paths = EmberkeepPaths {
            config_dir: dir.path().join("config"),
            data_dir: dir.path().join("data"),
            log_file: dir.path().join("data").join("emberkeep.log.jsonl"),
        };
        paths.ensure_private_dirs()?;

        let deriver = Arc::new(deriver);
        let detector = Arc::new(detector);
        let vault = Arc::new(FakeVault::default());
        let manager = AccountLifecycleManager::new(
            Arc::new(Mutex::new(AccountStore::new())),
            SnapshotStore::new(&paths),
            Arc::clone(&deriver) as Arc<dyn AddressDeriver>,
            Arc::clone(&detector) as Arc<dyn WalletTypeDetector>,
            Arc::clone(&vault) as Arc<dyn SeedVault>,
            Duration::from_millis(200),
        );
        Ok(Harness {
            manager,
            deriver,
            detector,
            vault,
            paths,
            _dir: dir,
        })
    }

    fn two_provider_detector() -> FakeDetector {
        FakeDetector {
            calls: AtomicUsize::new(0),
            report: DetectionReport {
                detected: true,
                wallet_type: Some("xverse".to_owned()),
                wallet_name: Some("Xverse".to_owned()),
                active_paths: vec![
                    ActivePath {
                        wallet_name: "Xverse".to_owned(),
                        path: "m/86'/0'/0'/0/0".to_owned(),
                        balance: 0.4,
                    },
                    ActivePath {
                        wallet_name: "Unisat".to_owned(),
                        path: "m/86'/0'/0/0".to_owned(),
                        balance: 1.25,
                    },
                ],
                suggested_path: None,
            },
        }
    }

    fn two_variants() -> BTreeMap<String, TaprootVariant> {
        let mut variants = BTreeMap::new();
        variants.insert(
            "Xverse".to_owned(),
            TaprootVariant {
                address: "bc1p-xverse".to_owned(),
                path: "m/86'/0'/0'/0/0".to_owned(),
            },
        );
        variants.insert(
            "Unisat".to_owned(),
            TaprootVariant {
                address: "bc1p-unisat".to_owned(),
                path: "m/86'/0'/0/0".to_owned(),
            },
        );
        variants
    }

    fn domain_error(err: &eyre::Report) -> Option<&AccountError> {
        err.downcast_ref::<AccountError>()
    }

    #[tokio::test]
    async fn create_populates_every_address_and_becomes_current() -> eyre::Result<()> {
        let h = harness()?;
        let created = h.manager.create("Alpha", MNEMONIC_A).await?;

        assert!(!created.needs_repair);
        assert!(created.duplicate_of.is_none());
        let record = &created.record;
        assert!(record.addresses.is_complete());
        assert_eq!(record.kind, AccountKind::Generated);
        assert!(!record.is_import);
        assert_eq!(record.wallet_type, WalletProvider::Standard);
        assert_eq!(record.seed_hash, seed_fingerprint(MNEMONIC_A));

        let current = h
            .manager
            .current_account()?
            .ok_or_else(|| eyre::eyre!("no current account after create"))?;
        assert_eq!(current.id, record.id);
        assert_eq!(h.manager.account_count()?, 1);

        // Written through to disk.
        let loaded = SnapshotStore::new(&h.paths).load()?;
        assert_eq!(loaded.accounts.len(), 1);
        assert_eq!(loaded.current_account_id.as_deref(), Some(record.id.as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn create_validates_before_any_service_call() -> eyre::Result<()> {
        let h = harness()?;

        let Err(err) = h.manager.create("  ", MNEMONIC_A).await else {
            eyre::bail!("blank name accepted");
        };
        assert!(matches!(
            domain_error(&err),
            Some(AccountError::InvalidName(_))
        ));

        let Err(err) = h.manager.create("Alpha", "only three words").await else {
            eyre::bail!("short mnemonic accepted");
        };
        assert!(matches!(
            domain_error(&err),
            Some(AccountError::InvalidMnemonic(_))
        ));

        let Err(err) = h.manager.create("<script>", MNEMONIC_A).await else {
            eyre::bail!("markup name accepted");
        };
        assert!(matches!(
            domain_error(&err),
            Some(AccountError::InvalidName(_))
        ));

        assert_eq!(h.deriver.spark_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.deriver.bitcoin_calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_derivation_admits_nothing() -> eyre::Result<()> {
        let h = harness_with(
            FakeDeriver {
                fail_spark: true,
                ..FakeDeriver::default()
            },
            FakeDetector::default(),
        )?;

        let Err(err) = h.manager.create("Alpha", MNEMONIC_A).await else {
            eyre::bail!("create succeeded despite failing derivation");
        };
        assert!(matches!(
            domain_error(&err),
            Some(AccountError::Derivation(_))
        ));
        assert_eq!(h.manager.account_count()?, 0);
        assert!(!SnapshotStore::new(&h.paths).snapshot_exists());
        Ok(())
    }

    #[tokio::test]
    async fn timed_out_derivation_admits_nothing() -> eyre::Result<()> {
        let h = harness_with(
            FakeDeriver {
                hang_bitcoin: true,
                ..FakeDeriver::default()
            },
            FakeDetector::default(),
        )?;

        let Err(err) = h.manager.create("Alpha", MNEMONIC_A).await else {
            eyre::bail!("create succeeded despite hung derivation");
        };
        let Some(AccountError::Derivation(detail)) = domain_error(&err) else {
            eyre::bail!("unexpected error: {err}");
        };
        assert!(detail.contains("timed out"));
        assert_eq!(h.manager.account_count()?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn create_assigns_unused_palette_colors_in_order() -> eyre::Result<()> {
        let h = harness()?;
        let first = h.manager.create("Alpha", MNEMONIC_A).await?;
        let second = h.manager.create("Beta", MNEMONIC_B).await?;
        assert_eq!(first.record.color, ACCOUNT_PALETTE[0]);
        assert_eq!(second.record.color, ACCOUNT_PALETTE[1]);
        assert_ne!(first.record.id, second.record.id);
        Ok(())
    }

    #[tokio::test]
    async fn delete_never_removes_the_last_account() -> eyre::Result<()> {
        let h = harness()?;
        let only = h.manager.create("Alpha", MNEMONIC_A).await?;

        for id in [only.record.id.as_str(), "no-such-id"] {
            let Err(err) = h.manager.delete_account(id) else {
                eyre::bail!("delete of last account succeeded");
            };
            assert!(matches!(domain_error(&err), Some(AccountError::LastAccount)));
        }
        assert_eq!(h.manager.account_count()?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn delete_moves_current_to_first_remaining() -> eyre::Result<()> {
        let h = harness()?;
        let a = h.manager.create("Alpha", MNEMONIC_A).await?;
        let b = h.manager.create("Beta", MNEMONIC_B).await?;
        let c = h
            .manager
            .create(
                "Gamma",
                "zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo wrong",
            )
            .await?;

        // Deleting a non-current member leaves the pointer alone.
        assert!(h.manager.delete_account(&b.record.id)?);
        let current = h
            .manager
            .current_account()?
            .ok_or_else(|| eyre::eyre!("current account missing"))?;
        assert_eq!(current.id, c.record.id);

        // Deleting the current member moves the pointer to the first survivor.
        assert!(h.manager.delete_account(&c.record.id)?);
        let current = h
            .manager
            .current_account()?
            .ok_or_else(|| eyre::eyre!("current account missing"))?;
        assert_eq!(current.id, a.record.id);

        let loaded = SnapshotStore::new(&h.paths).load()?;
        assert_eq!(loaded.current_account_id, Some(a.record.id.clone()));

        // One member left: a further delete is refused outright.
        let Err(err) = h.manager.delete_account(&a.record.id) else {
            eyre::bail!("delete of last account succeeded");
        };
        assert!(matches!(domain_error(&err), Some(AccountError::LastAccount)));
        assert_eq!(h.manager.account_count()?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn switch_stamps_last_used_and_emits_after_persist() -> eyre::Result<()> {
        let h = harness()?;
        let a = h.manager.create("Alpha", MNEMONIC_A).await?;
        drop(h.manager.create("Beta", MNEMONIC_B).await?);

        let mut rx = h.manager.subscribe()?;
        assert!(h.manager.switch_account(&a.record.id)?);

        let current = h
            .manager
            .current_account()?
            .ok_or_else(|| eyre::eyre!("current account missing"))?;
        assert_eq!(current.id, a.record.id);
        assert!(current.last_used >= a.record.last_used);

        let mut saw_switched = false;
        while let Some(event) = rx.try_recv() {
            if let AccountEvent::AccountSwitched { account } = event {
                assert_eq!(account.id, a.record.id);
                saw_switched = true;
            }
        }
        assert!(saw_switched);

        let loaded = SnapshotStore::new(&h.paths).load()?;
        assert_eq!(loaded.current_account_id, Some(a.record.id));
        Ok(())
    }

    #[tokio::test]
    async fn switch_to_unknown_id_changes_nothing() -> eyre::Result<()> {
        let h = harness()?;
        let a = h.manager.create("Alpha", MNEMONIC_A).await?;
        let before = SnapshotStore::new(&h.paths).load()?;

        let mut rx = h.manager.subscribe()?;
        assert!(!h.manager.switch_account("no-such-id")?);

        let current = h
            .manager
            .current_account()?
            .ok_or_else(|| eyre::eyre!("current account missing"))?;
        assert_eq!(current.id, a.record.id);
        assert!(rx.try_recv().is_none());

        let after = SnapshotStore::new(&h.paths).load()?;
        assert_eq!(before.current_account_id, after.current_account_id);
        assert_eq!(before.accounts.len(), after.accounts.len());
        Ok(())
    }

    #[tokio::test]
    async fn rename_applies_the_same_validation_as_create() -> eyre::Result<()> {
        let h = harness()?;
        let a = h.manager.create("Alpha", MNEMONIC_A).await?;

        assert!(h.manager.rename_account(&a.record.id, "Spending")?);
        let renamed = h
            .manager
            .resolve_account("Spending")?
            .ok_or_else(|| eyre::eyre!("renamed account not found"))?;
        assert_eq!(renamed.id, a.record.id);

        let Err(err) = h.manager.rename_account(&a.record.id, "a <b> c") else {
            eyre::bail!("markup name accepted on rename");
        };
        assert!(matches!(
            domain_error(&err),
            Some(AccountError::InvalidName(_))
        ));

        assert!(!h.manager.rename_account("no-such-id", "Fine")?);
        Ok(())
    }

    #[tokio::test]
    async fn set_color_rejects_values_outside_the_palette() -> eyre::Result<()> {
        let h = harness()?;
        let a = h.manager.create("Alpha", MNEMONIC_A).await?;

        assert!(h.manager.set_account_color(&a.record.id, ACCOUNT_PALETTE[3])?);
        let updated = h
            .manager
            .current_account()?
            .ok_or_else(|| eyre::eyre!("current account missing"))?;
        assert_eq!(updated.color, ACCOUNT_PALETTE[3]);

        let Err(err) = h.manager.set_account_color(&a.record.id, "#123456") else {
            eyre::bail!("arbitrary color accepted");
        };
        assert!(matches!(
            domain_error(&err),
            Some(AccountError::InvalidColor(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn record_balances_replaces_the_cache() -> eyre::Result<()> {
        let h = harness()?;
        let a = h.manager.create("Alpha", MNEMONIC_A).await?;

        let mut balances = BTreeMap::new();
        balances.insert("btc".to_owned(), 0.5);
        balances.insert("spark".to_owned(), 12.0);
        assert!(h.manager.record_balances(&a.record.id, balances)?);

        let current = h
            .manager
            .current_account()?
            .ok_or_else(|| eyre::eyre!("current account missing"))?;
        assert_eq!(current.balances.len(), 2);
        assert!(current.balances.contains_key("btc"));

        assert!(!h.manager.record_balances("no-such-id", BTreeMap::new())?);
        Ok(())
    }

    #[tokio::test]
    async fn import_with_single_detected_provider_uses_its_convention() -> eyre::Result<()> {
        let detector = FakeDetector {
            calls: AtomicUsize::new(0),
            report: DetectionReport {
                detected: true,
                wallet_type: Some("xverse".to_owned()),
                wallet_name: Some("Xverse".to_owned()),
                active_paths: vec![ActivePath {
                    wallet_name: "Xverse".to_owned(),
                    path: "m/86'/0'/0'/0/0".to_owned(),
                    balance: 0.4,
                }],
                suggested_path: None,
            },
        };
        let h = harness_with(
            FakeDeriver {
                variants: two_variants(),
                ..FakeDeriver::default()
            },
            detector,
        )?;

        let outcome = h
            .manager
            .import(
                "Recovered",
                MNEMONIC_A,
                ImportOptions {
                    detect: true,
                    ..ImportOptions::default()
                },
            )
            .await?;
        let ImportOutcome::Created(created) = outcome else {
            eyre::bail!("single-provider import did not admit a record");
        };
        assert_eq!(
            created.record.wallet_type,
            WalletProvider::Other("Xverse".to_owned())
        );
        assert_eq!(created.record.kind, AccountKind::Imported);
        assert!(created.record.is_import);
        assert_eq!(created.record.addresses.taproot, "bc1p-xverse");
        assert_eq!(h.detector.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn ambiguous_import_suspends_and_selected_variant_wins() -> eyre::Result<()> {
        let h = harness_with(
            FakeDeriver {
                variants: two_variants(),
                ..FakeDeriver::default()
            },
            two_provider_detector(),
        )?;

        let outcome = h
            .manager
            .import(
                "Recovered",
                MNEMONIC_A,
                ImportOptions {
                    detect: true,
                    ..ImportOptions::default()
                },
            )
            .await?;
        let ImportOutcome::VariantRequired(candidates) = outcome else {
            eyre::bail!("ambiguous import admitted a record");
        };
        assert_eq!(candidates.len(), 2);
        assert_eq!(h.manager.account_count()?, 0);

        let unisat = candidates
            .iter()
            .find(|c| c.provider == "Unisat")
            .ok_or_else(|| eyre::eyre!("unisat candidate missing"))?;
        assert_eq!(unisat.address, "bc1p-unisat");
        assert!(unisat.balance > 1.0);

        let outcome = h
            .manager
            .import(
                "Recovered",
                MNEMONIC_A,
                ImportOptions {
                    detect: true,
                    selected_variant: Some(SelectedVariant {
                        provider: unisat.provider.clone(),
                        address: unisat.address.clone(),
                        path: unisat.path.clone(),
                    }),
                    ..ImportOptions::default()
                },
            )
            .await?;
        let ImportOutcome::Created(created) = outcome else {
            eyre::bail!("resumed import did not admit a record");
        };
        // The chosen variant is applied verbatim.
        assert_eq!(created.record.addresses.taproot, "bc1p-unisat");
        assert_eq!(created.record.paths.taproot, "m/86'/0'/0/0");
        assert_eq!(
            created.record.wallet_type,
            WalletProvider::Other("Unisat".to_owned())
        );
        // The resume path never re-runs detection.
        assert_eq!(h.detector.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn import_without_detection_defaults_to_standard() -> eyre::Result<()> {
        let h = harness()?;
        let outcome = h
            .manager
            .import("Plain", MNEMONIC_A, ImportOptions::default())
            .await?;
        let ImportOutcome::Created(created) = outcome else {
            eyre::bail!("plain import did not admit a record");
        };
        assert_eq!(created.record.wallet_type, WalletProvider::Standard);
        assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn importing_the_same_seed_twice_reports_the_duplicate() -> eyre::Result<()> {
        let h = harness()?;
        let first = h
            .manager
            .import("One", MNEMONIC_A, ImportOptions::default())
            .await?;
        let ImportOutcome::Created(first) = first else {
            eyre::bail!("first import did not admit a record");
        };
        assert!(first.duplicate_of.is_none());

        let second = h
            .manager
            .import("Two", MNEMONIC_A, ImportOptions::default())
            .await?;
        let ImportOutcome::Created(second) = second else {
            eyre::bail!("second import did not admit a record");
        };
        assert_eq!(second.duplicate_of, Some(first.record.id.clone()));
        assert_ne!(second.record.id, first.record.id);
        assert_eq!(h.manager.account_count()?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn repair_fills_only_the_missing_fields() -> eyre::Result<()> {
        let h = harness_with(
            FakeDeriver {
                empty_spark: true,
                ..FakeDeriver::default()
            },
            FakeDetector::default(),
        )?;

        let created = h.manager.create("Gappy", MNEMONIC_A).await?;
        assert!(created.needs_repair);
        assert!(created.record.addresses.spark.is_empty());
        let kept_segwit = created.record.addresses.segwit.clone();

        // The backend recovers before the repair pass runs.
        let healed = AccountLifecycleManager::new(
            Arc::new(Mutex::new(AccountStore::new())),
            SnapshotStore::new(&h.paths),
            Arc::new(FakeDeriver::default()),
            Arc::new(FakeDetector::default()),
            Arc::clone(&h.vault) as Arc<dyn SeedVault>,
            Duration::from_millis(200),
        );
        let report = healed.bootstrap()?;
        assert_eq!(report.needs_repair, 1);

        let fixed = healed.repair_missing_addresses().await?;
        assert_eq!(fixed, 1);

        let repaired = healed
            .current_account()?
            .ok_or_else(|| eyre::eyre!("current account missing"))?;
        assert!(repaired.addresses.is_complete());
        assert!(!repaired.needs_repair());
        // Populated fields are never overwritten.
        assert_eq!(repaired.addresses.segwit, kept_segwit);

        // A second pass has nothing left to do.
        assert_eq!(healed.repair_missing_addresses().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn repair_never_fills_a_record_from_another_accounts_seed() -> eyre::Result<()> {
        let h = harness_with(
            FakeDeriver {
                empty_spark: true,
                ..FakeDeriver::default()
            },
            FakeDetector::default(),
        )?;

        // Two same-class imports; the vault slot now holds only the second
        // seed.
        let first = h
            .manager
            .import("One", MNEMONIC_A, ImportOptions::default())
            .await?;
        let ImportOutcome::Created(first) = first else {
            eyre::bail!("first import did not admit a record");
        };
        assert!(first.needs_repair);
        let second = h
            .manager
            .import("Two", MNEMONIC_B, ImportOptions::default())
            .await?;
        let ImportOutcome::Created(second) = second else {
            eyre::bail!("second import did not admit a record");
        };
        assert!(second.needs_repair);

        let healed = AccountLifecycleManager::new(
            Arc::new(Mutex::new(AccountStore::new())),
            SnapshotStore::new(&h.paths),
            Arc::new(FakeDeriver::default()),
            Arc::new(FakeDetector::default()),
            Arc::clone(&h.vault) as Arc<dyn SeedVault>,
            Duration::from_millis(200),
        );
        let report = healed.bootstrap()?;
        assert_eq!(report.needs_repair, 2);

        // Only the record whose seed is still sealed can be fixed.
        assert_eq!(healed.repair_missing_addresses().await?, 1);

        let accounts = healed.accounts()?;
        let one = accounts
            .iter()
            .find(|a| a.name == "One")
            .ok_or_else(|| eyre::eyre!("first record missing"))?;
        let two = accounts
            .iter()
            .find(|a| a.name == "Two")
            .ok_or_else(|| eyre::eyre!("second record missing"))?;

        // The older record keeps its gap rather than taking the newer
        // account's addresses.
        assert!(one.needs_repair());
        assert!(one.addresses.spark.is_empty());
        assert_eq!(
            two.addresses.spark,
            format!("sp1{}", seed_fingerprint(MNEMONIC_B))
        );
        Ok(())
    }

    #[tokio::test]
    async fn repair_skips_records_without_a_sealed_seed() -> eyre::Result<()> {
        let h = harness_with(
            FakeDeriver {
                empty_spark: true,
                ..FakeDeriver::default()
            },
            FakeDetector::default(),
        )?;
        drop(h.manager.create("Gappy", MNEMONIC_A).await?);

        // Empty the vault; the gap can no longer be repaired.
        {
            let mut seeds = h
                .vault
                .seeds
                .lock()
                .map_err(|e| eyre::eyre!("fake vault poisoned: {e}"))?;
            seeds.clear();
        }

        assert_eq!(h.manager.repair_missing_addresses().await?, 0);
        let still_gappy = h
            .manager
            .current_account()?
            .ok_or_else(|| eyre::eyre!("current account missing"))?;
        assert!(still_gappy.needs_repair());
        Ok(())
    }

    #[tokio::test]
    async fn try_repair_reports_busy_while_a_pass_holds_the_gate() -> eyre::Result<()> {
        let h = harness()?;
        drop(h.manager.create("Alpha", MNEMONIC_A).await?);

        let _held = h
            .manager
            .repair_gate
            .try_acquire()
            .map_err(|e| eyre::eyre!("gate unexpectedly held: {e}"))?;
        let Err(err) = h.manager.try_repair_missing_addresses().await else {
            eyre::bail!("try_repair ran despite a held gate");
        };
        assert!(matches!(domain_error(&err), Some(AccountError::RepairBusy)));
        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_round_trips_through_the_snapshot() -> eyre::Result<()> {
        let h = harness()?;
        let a = h.manager.create("Alpha", MNEMONIC_A).await?;
        drop(h.manager.create("Beta", MNEMONIC_B).await?);
        assert!(h.manager.switch_account(&a.record.id)?);
        assert!(h.manager.rename_account(&a.record.id, "Renamed")?);

        let fresh = AccountLifecycleManager::new(
            Arc::new(Mutex::new(AccountStore::new())),
            SnapshotStore::new(&h.paths),
            Arc::clone(&h.deriver) as Arc<dyn AddressDeriver>,
            Arc::clone(&h.detector) as Arc<dyn WalletTypeDetector>,
            Arc::clone(&h.vault) as Arc<dyn SeedVault>,
            Duration::from_millis(200),
        );
        let report = fresh.bootstrap()?;
        assert_eq!(report.account_count, 2);
        assert!(!report.migrated_legacy);

        let current = fresh
            .current_account()?
            .ok_or_else(|| eyre::eyre!("current account missing after bootstrap"))?;
        assert_eq!(current.id, a.record.id);
        assert_eq!(current.name, "Renamed");
        Ok(())
    }

    #[tokio::test]
    async fn resolve_account_matches_id_then_unique_name() -> eyre::Result<()> {
        let h = harness()?;
        let a = h.manager.create("Alpha", MNEMONIC_A).await?;
        let b = h.manager.create("Beta", MNEMONIC_B).await?;

        let by_id = h
            .manager
            .resolve_account(&a.record.id)?
            .ok_or_else(|| eyre::eyre!("id lookup failed"))?;
        assert_eq!(by_id.id, a.record.id);

        let by_name = h
            .manager
            .resolve_account("beta")?
            .ok_or_else(|| eyre::eyre!("name lookup failed"))?;
        assert_eq!(by_name.id, b.record.id);

        // Ambiguous names resolve to nothing.
        assert!(h.manager.rename_account(&b.record.id, "Alpha")?);
        assert!(h.manager.resolve_account("alpha")?.is_none());
        Ok(())
    }
}
