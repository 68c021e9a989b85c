use crate::{config::EmberkeepConfig, paths::EmberkeepPaths};
use eyre::Context as _;
use std::{fs, path::PathBuf};

/// Loads and materialises `config.toml`. Environment overrides are applied
/// in memory only and never written back to the file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

fn env_trimmed(var: &str) -> Option<String> {
    let v = std::env::var(var).ok()?;
    let t = v.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_owned())
    }
}

fn is_truthy(v: &str) -> bool {
    ["1", "true", "yes", "on"]
        .iter()
        .any(|t| v.eq_ignore_ascii_case(t))
}

pub(crate) fn apply_env_overrides(cfg: &mut EmberkeepConfig) {
    if let Some(v) = env_trimmed("EMBERKEEP_DERIVATION_BASE_URL") {
        cfg.service.derivation_base_url = v;
    }
    if let Some(v) = env_trimmed("EMBERKEEP_DETECTOR_BASE_URL") {
        cfg.service.detector_base_url = v;
    }
    if let Some(n) = env_trimmed("EMBERKEEP_REQUEST_TIMEOUT_SECONDS")
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|n| *n > 0)
    {
        cfg.service.request_timeout_seconds = n;
    }
    if let Some(v) = env_trimmed("EMBERKEEP_REPAIR_ON_STARTUP") {
        cfg.repair_on_startup = is_truthy(&v);
    }
}

impl ConfigStore {
    pub fn new(paths: &EmberkeepPaths) -> Self {
        Self {
            path: paths.config_dir.join("config.toml"),
        }
    }

    pub fn load_or_init_default(&self) -> eyre::Result<EmberkeepConfig> {
        let mut cfg = match fs::read_to_string(&self.path) {
            Ok(body) => toml::from_str(&body).context("parse config.toml")?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let defaults = EmberkeepConfig::default();
                self.save(&defaults)?;
                defaults
            }
            Err(e) => return Err(eyre::Report::new(e).wrap_err("read config.toml")),
        };
        apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    pub fn save(&self, cfg: &EmberkeepConfig) -> eyre::Result<()> {
        let body = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        crate::fsutil::write_text_private(&self.path, &body).context("write config.toml")
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}
