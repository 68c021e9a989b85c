//! Machine-bound seed storage. One sealed mnemonic per account class
//! (generated vs imported), mirroring how the repair pass looks seeds up:
//! by the record's import flag, not by account id.

pub mod crypto;

use crate::paths::EmberkeepPaths;
use async_trait::async_trait;
use eyre::Context as _;
use std::fs;
use std::path::PathBuf;
use zeroize::Zeroizing;

#[async_trait]
pub trait SeedVault: Send + Sync {
    /// The mnemonic for the given account class, or `None` when the vault
    /// has nothing stored for it.
    async fn retrieve_seed(&self, is_import: bool) -> eyre::Result<Option<Zeroizing<String>>>;

    async fn store_seed(&self, is_import: bool, mnemonic: &str) -> eyre::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileSeedVault {
    vault_dir: PathBuf,
    machine_secret_path: PathBuf,
}

impl FileSeedVault {
    pub fn new(paths: &EmberkeepPaths) -> Self {
        Self {
            vault_dir: paths.vault_dir(),
            machine_secret_path: paths.machine_secret_file(),
        }
    }

    fn class_name(is_import: bool) -> &'static str {
        if is_import {
            "imported"
        } else {
            "generated"
        }
    }

    fn seed_path(&self, is_import: bool) -> PathBuf {
        self.vault_dir
            .join(format!("seed.{}.json", Self::class_name(is_import)))
    }

    /// Whether a sealed seed exists for this class, without decrypting it.
    pub fn has_sealed_seed(&self, is_import: bool) -> bool {
        self.seed_path(is_import).exists()
    }

    fn ensure_machine_secret(&self) -> eyre::Result<[u8; 32]> {
        let p = &self.machine_secret_path;
        if p.exists() {
            let buf = fs::read(p).context("read machine secret")?;
            if buf.len() != 32 {
                eyre::bail!("machine secret wrong length");
            }
            let mut out = [0_u8; 32];
            out.copy_from_slice(&buf);
            return Ok(out);
        }

        let mut secret = [0_u8; 32];
        crypto::random_bytes(&mut secret);

        if let Some(parent) = p.parent() {
            crate::fsutil::ensure_private_dir(parent)?;
        }

        // Best-effort restrictive perms (Unix). Windows ignores.
        #[cfg(unix)]
        {
            use std::io::Write as _;
            use std::os::unix::fs::OpenOptionsExt as _;
            let mut f = fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .mode(0o600)
                .open(p)
                .context("create machine secret")?;
            f.write_all(&secret).context("write machine secret")?;
        }
        #[cfg(not(unix))]
        {
            fs::write(p, secret).context("write machine secret")?;
        }

        Ok(secret)
    }
}

#[async_trait]
impl SeedVault for FileSeedVault {
    async fn retrieve_seed(&self, is_import: bool) -> eyre::Result<Option<Zeroizing<String>>> {
        let path = self.seed_path(is_import);
        if !path.exists() {
            return Ok(None);
        }
        let sealed: crypto::SealedSeed = crate::fsutil::read_json(&path)?;
        let machine = self.ensure_machine_secret()?;
        let key = crypto::class_key(&machine, Self::class_name(is_import))?;
        let pt = crypto::open(&key, &sealed)?;
        let phrase = String::from_utf8(pt)
            .map_err(|e| eyre::eyre!("sealed seed is not valid utf-8: {e}"))?;
        Ok(Some(Zeroizing::new(phrase)))
    }

    async fn store_seed(&self, is_import: bool, mnemonic: &str) -> eyre::Result<()> {
        let machine = self.ensure_machine_secret()?;
        let key = crypto::class_key(&machine, Self::class_name(is_import))?;
        let sealed = crypto::seal(&key, mnemonic.as_bytes())?;
        crate::fsutil::write_json_private(&self.seed_path(is_import), &sealed)
            .context("write sealed seed")?;
        Ok(())
    }
}
