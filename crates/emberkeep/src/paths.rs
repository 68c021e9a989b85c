use directories::ProjectDirs;
use eyre::ContextCompat as _;
use std::path::PathBuf;

const LOG_FILE_NAME: &str = "emberkeep.log.jsonl";

#[derive(Debug, Clone)]
pub struct EmberkeepPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl EmberkeepPaths {
    /// Platform config and data directories via the `directories` crate.
    /// `EMBERKEEP_CONFIG_DIR` and `EMBERKEEP_DATA_DIR` each override their
    /// directory independently, which is how tests sandbox the CLI.
    pub fn discover() -> eyre::Result<Self> {
        let config_override = env_dir("EMBERKEEP_CONFIG_DIR");
        let data_override = env_dir("EMBERKEEP_DATA_DIR");

        let (config_dir, data_dir) = match (config_override, data_override) {
            (Some(c), Some(d)) => (c, d),
            (c, d) => {
                let proj = ProjectDirs::from("", "", "emberkeep")
                    .context("no home directory to place emberkeep state in")?;
                (
                    c.unwrap_or_else(|| proj.config_dir().to_path_buf()),
                    d.unwrap_or_else(|| proj.data_dir().to_path_buf()),
                )
            }
        };
        Ok(Self::with_dirs(config_dir, data_dir))
    }

    fn with_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        let log_file = data_dir.join(LOG_FILE_NAME);
        Self {
            config_dir,
            data_dir,
            log_file,
        }
    }

    pub fn ensure_private_dirs(&self) -> eyre::Result<()> {
        crate::fsutil::ensure_private_dir(&self.config_dir)?;
        crate::fsutil::ensure_private_dir(&self.data_dir)?;
        Ok(())
    }

    /// Durable account snapshot, overwritten on every mutation.
    pub fn snapshot_file(&self) -> PathBuf {
        self.data_dir.join("accounts.json")
    }

    /// Pre-multi-account single-wallet file, migrated on first load.
    pub fn legacy_wallet_file(&self) -> PathBuf {
        self.data_dir.join("wallet.json")
    }

    /// Exclusive lock serializing snapshot writes across processes.
    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join("emberkeep.lock")
    }

    pub fn machine_secret_file(&self) -> PathBuf {
        self.config_dir.join("machine_secret.bin")
    }

    /// Sealed mnemonics live here, one file per account class.
    pub fn vault_dir(&self) -> PathBuf {
        self.data_dir.join("vault")
    }
}
