use crate::errors::AccountError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fixed palette cycled through at account creation. The first entry not
/// already in use is assigned; past eight accounts a random entry is picked
/// (visual duplicates are acceptable).
pub const ACCOUNT_PALETTE: [&str; 8] = [
    "#F87171", "#FB923C", "#FBBF24", "#4ADE80", "#2DD4BF", "#60A5FA", "#A78BFA", "#F472B6",
];

pub const MAX_NAME_LEN: usize = 50;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccountKind {
    #[default]
    Generated,
    Imported,
}

/// Provider whose derivation conventions an account follows. Open set: the
/// detector reports free-form provider names for wallets imported from other
/// software.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WalletProvider {
    Standard,
    Other(String),
}

impl WalletProvider {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Standard => "standard",
            Self::Other(name) => name,
        }
    }
}

impl Default for WalletProvider {
    fn default() -> Self {
        Self::Standard
    }
}

impl From<String> for WalletProvider {
    fn from(s: String) -> Self {
        if s.is_empty() || s == "standard" {
            Self::Standard
        } else {
            Self::Other(s)
        }
    }
}

impl From<WalletProvider> for String {
    fn from(p: WalletProvider) -> Self {
        p.as_str().to_owned()
    }
}

impl std::fmt::Display for WalletProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AddressKind {
    Segwit,
    Taproot,
    Legacy,
    NestedSegwit,
    Spark,
}

impl AddressKind {
    pub const ALL: [Self; 5] = [
        Self::Segwit,
        Self::Taproot,
        Self::Legacy,
        Self::NestedSegwit,
        Self::Spark,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Segwit => "segwit",
            Self::Taproot => "taproot",
            Self::Legacy => "legacy",
            Self::NestedSegwit => "nestedSegwit",
            Self::Spark => "spark",
        }
    }
}

/// One address per kind. Empty string means "not derived yet"; the repair
/// pass fills gaps without touching populated entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressBook {
    pub segwit: String,
    pub taproot: String,
    pub legacy: String,
    pub nested_segwit: String,
    pub spark: String,
}

impl AddressBook {
    pub fn get(&self, kind: AddressKind) -> &str {
        match kind {
            AddressKind::Segwit => &self.segwit,
            AddressKind::Taproot => &self.taproot,
            AddressKind::Legacy => &self.legacy,
            AddressKind::NestedSegwit => &self.nested_segwit,
            AddressKind::Spark => &self.spark,
        }
    }

    fn slot(&mut self, kind: AddressKind) -> &mut String {
        match kind {
            AddressKind::Segwit => &mut self.segwit,
            AddressKind::Taproot => &mut self.taproot,
            AddressKind::Legacy => &mut self.legacy,
            AddressKind::NestedSegwit => &mut self.nested_segwit,
            AddressKind::Spark => &mut self.spark,
        }
    }

    pub fn missing_kinds(&self) -> Vec<AddressKind> {
        AddressKind::ALL
            .into_iter()
            .filter(|&k| self.get(k).is_empty())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        AddressKind::ALL.into_iter().all(|k| !self.get(k).is_empty())
    }

    /// Copies entries from `fresh` into slots that are still empty here.
    /// Populated slots are never overwritten. Returns how many were filled.
    pub fn fill_missing_from(&mut self, fresh: &Self) -> usize {
        let mut filled = 0;
        for kind in AddressKind::ALL {
            let slot = self.slot(kind);
            if slot.is_empty() {
                let candidate = fresh.get(kind);
                if !candidate.is_empty() {
                    *slot = candidate.to_owned();
                    filled += 1;
                }
            }
        }
        filled
    }
}

/// Derivation paths for the four Bitcoin address kinds. Spark addresses are
/// identity-based and carry no path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DerivationPathSet {
    pub segwit: String,
    pub taproot: String,
    pub legacy: String,
    pub nested_segwit: String,
}

impl DerivationPathSet {
    /// Copy non-empty paths into empty slots, returning how many were filled.
    pub fn fill_missing_from(&mut self, fresh: &Self) -> usize {
        let slots = [
            (&mut self.segwit, &fresh.segwit),
            (&mut self.taproot, &fresh.taproot),
            (&mut self.legacy, &fresh.legacy),
            (&mut self.nested_segwit, &fresh.nested_segwit),
        ];
        let mut filled = 0;
        for (slot, candidate) in slots {
            if slot.is_empty() && !candidate.is_empty() {
                candidate.clone_into(slot);
                filled += 1;
            }
        }
        filled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    /// UUIDv4, immutable for the record's lifetime.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    pub addresses: AddressBook,
    #[serde(default)]
    pub paths: DerivationPathSet,
    #[serde(rename = "type", default)]
    pub kind: AccountKind,
    #[serde(default)]
    pub wallet_type: WalletProvider,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub last_used: i64,
    #[serde(default)]
    pub is_import: bool,
    /// Non-cryptographic mnemonic fingerprint; only ever used to notice
    /// identical re-imports. Never treat as a security value.
    #[serde(default)]
    pub seed_hash: String,
    /// Cached per-currency balances, refreshed out of band. Advisory only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub balances: BTreeMap<String, f64>,
}

impl AccountRecord {
    /// Minimal shape check applied when loading persisted snapshots.
    /// Records failing it are dropped rather than surfaced as errors.
    pub fn has_valid_shape(&self) -> bool {
        !self.id.trim().is_empty() && !self.name.trim().is_empty()
    }

    pub fn needs_repair(&self) -> bool {
        !self.addresses.is_complete()
    }

    pub fn touch(&mut self) {
        self.last_used = now_ms();
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Trims and validates a display name: 1–50 chars, no markup-like `<...>`
/// sequences.
pub fn validate_account_name(name: &str) -> Result<String, AccountError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AccountError::InvalidName("name is empty".to_owned()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(AccountError::InvalidName(format!(
            "name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if contains_markup(trimmed) {
        return Err(AccountError::InvalidName(
            "name must not contain markup".to_owned(),
        ));
    }
    Ok(trimmed.to_owned())
}

fn contains_markup(s: &str) -> bool {
    let mut open = false;
    for c in s.chars() {
        match c {
            '<' => open = true,
            '>' if open => return true,
            _ => {}
        }
    }
    false
}

/// Normalizes whitespace and requires at least twelve words. Checksum
/// verification is left to the derivation service, which has to parse the
/// phrase anyway.
pub fn validate_mnemonic(mnemonic: &str) -> Result<String, AccountError> {
    let words: Vec<&str> = mnemonic.split_whitespace().collect();
    if words.is_empty() {
        return Err(AccountError::InvalidMnemonic("mnemonic is empty".to_owned()));
    }
    if words.len() < 12 {
        return Err(AccountError::InvalidMnemonic(format!(
            "expected at least 12 words, got {}",
            words.len()
        )));
    }
    Ok(words.join(" "))
}

/// FNV-1a 64 over the normalized phrase. Collisions are tolerable; this only
/// powers the duplicate-import notice.
pub fn seed_fingerprint(mnemonic: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let normalized = mnemonic.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hash = FNV_OFFSET;
    for byte in normalized.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}

/// First palette entry not yet in use, falling back to a random entry once
/// the palette is exhausted.
pub fn pick_color<'a>(used: impl IntoIterator<Item = &'a str>) -> String {
    let used: Vec<&str> = used.into_iter().collect();
    for color in ACCOUNT_PALETTE {
        if !used.contains(&color) {
            return color.to_owned();
        }
    }
    let idx = usize::from(rand::random::<u8>()) % ACCOUNT_PALETTE.len();
    ACCOUNT_PALETTE
        .get(idx)
        .copied()
        .unwrap_or(ACCOUNT_PALETTE[0])
        .to_owned()
}
