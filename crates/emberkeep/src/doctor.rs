use crate::{
    config::EmberkeepConfig, paths::EmberkeepPaths, persistence::SnapshotStore,
    store::ConfigStore, vault::FileSeedVault,
};
use eyre::Context as _;
use serde_json::json;
use std::{fs, path::Path, path::PathBuf};

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

fn try_parse_config(path: &Path) -> eyre::Result<EmberkeepConfig> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EmberkeepConfig = toml::from_str(&s).context("parse config.toml")?;
    Ok(cfg)
}

struct PathsReport {
    config_dir: PathBuf,
    data_dir: PathBuf,
    log_file: PathBuf,
}

struct ConfigReport {
    path: PathBuf,
    exists: bool,
    parse_ok: bool,
    error: Option<String>,
}

/// Effective service endpoints after env overrides, plus whether each one
/// passes the https-or-loopback guard. No network traffic is sent.
struct ServicesReport {
    derivation_base_url: String,
    derivation_url_ok: bool,
    detector_base_url: String,
    detector_url_ok: bool,
    request_timeout_seconds: u64,
    repair_on_startup: bool,
}

struct AccountsReport {
    snapshot_path: PathBuf,
    snapshot_exists: bool,
    legacy_path: PathBuf,
    legacy_exists: bool,
    count: usize,
    current_account_id: Option<String>,
    needs_repair: usize,
    dropped_invalid: usize,
    load_error: Option<String>,
}

struct VaultReport {
    vault_dir: PathBuf,
    machine_secret_exists: bool,
    generated_seed_sealed: bool,
    imported_seed_sealed: bool,
}

struct DoctorReport {
    version: &'static str,
    paths: PathsReport,
    config: ConfigReport,
    services: ServicesReport,
    accounts: AccountsReport,
    vault: VaultReport,
    env: serde_json::Value,
}

fn collect(paths: &EmberkeepPaths) -> eyre::Result<DoctorReport> {
    let config_path = ConfigStore::new(paths).path().to_path_buf();
    let config_exists = config_path.exists();
    let (config_ok, config_err, cfg) = if config_exists {
        match try_parse_config(&config_path) {
            Ok(cfg) => (true, None, Some(cfg)),
            Err(e) => (false, Some(format!("{e:#}")), None),
        }
    } else {
        (false, None, None)
    };

    // Effective view: parsed config (or defaults) plus env overrides.
    let mut effective = cfg.unwrap_or_default();
    crate::store::apply_env_overrides(&mut effective);
    let services = ServicesReport {
        derivation_url_ok: crate::derivation::ensure_https_or_loopback(
            &effective.service.derivation_base_url,
            "derivation_base_url",
        )
        .is_ok(),
        detector_url_ok: crate::derivation::ensure_https_or_loopback(
            &effective.service.detector_base_url,
            "detector_base_url",
        )
        .is_ok(),
        derivation_base_url: effective.service.derivation_base_url.clone(),
        detector_base_url: effective.service.detector_base_url.clone(),
        request_timeout_seconds: effective.service.request_timeout_seconds,
        repair_on_startup: effective.repair_on_startup,
    };

    let snapshots = SnapshotStore::new(paths);
    let snapshot_path = paths.snapshot_file();
    let legacy_path = paths.legacy_wallet_file();
    let accounts = match snapshots.load() {
        Ok(loaded) => AccountsReport {
            snapshot_exists: snapshots.snapshot_exists(),
            legacy_exists: snapshots.legacy_exists(),
            count: loaded.accounts.len(),
            current_account_id: loaded.current_account_id,
            needs_repair: loaded.accounts.iter().filter(|a| a.needs_repair()).count(),
            dropped_invalid: loaded.dropped_invalid,
            load_error: None,
            snapshot_path,
            legacy_path,
        },
        Err(e) => AccountsReport {
            snapshot_exists: snapshots.snapshot_exists(),
            legacy_exists: snapshots.legacy_exists(),
            count: 0,
            current_account_id: None,
            needs_repair: 0,
            dropped_invalid: 0,
            load_error: Some(format!("{e:#}")),
            snapshot_path,
            legacy_path,
        },
    };

    let vault = FileSeedVault::new(paths);
    let vault = VaultReport {
        vault_dir: paths.vault_dir(),
        machine_secret_exists: paths.machine_secret_file().exists(),
        generated_seed_sealed: vault.has_sealed_seed(false),
        imported_seed_sealed: vault.has_sealed_seed(true),
    };

    let env = json!({
      "EMBERKEEP_CONFIG_DIR": env_opt("EMBERKEEP_CONFIG_DIR"),
      "EMBERKEEP_DATA_DIR": env_opt("EMBERKEEP_DATA_DIR"),
      "EMBERKEEP_DERIVATION_BASE_URL": env_opt("EMBERKEEP_DERIVATION_BASE_URL"),
      "EMBERKEEP_DETECTOR_BASE_URL": env_opt("EMBERKEEP_DETECTOR_BASE_URL"),
      "EMBERKEEP_REQUEST_TIMEOUT_SECONDS": env_opt("EMBERKEEP_REQUEST_TIMEOUT_SECONDS"),
      "EMBERKEEP_REPAIR_ON_STARTUP": env_opt("EMBERKEEP_REPAIR_ON_STARTUP"),
    });

    Ok(DoctorReport {
        version: env!("CARGO_PKG_VERSION"),
        paths: PathsReport {
            config_dir: paths.config_dir.clone(),
            data_dir: paths.data_dir.clone(),
            log_file: paths.log_file.clone(),
        },
        config: ConfigReport {
            path: config_path,
            exists: config_exists,
            parse_ok: config_ok,
            error: config_err,
        },
        services,
        accounts,
        vault,
        env,
    })
}

fn print_json(out: &mut impl std::io::Write, r: &DoctorReport) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(&json!({
      "ok": true,
      "version": r.version,
      "paths": {
        "config_dir": r.paths.config_dir,
        "data_dir": r.paths.data_dir,
        "log_file": r.paths.log_file,
      },
      "config": {
        "path": r.config.path,
        "exists": r.config.exists,
        "parse_ok": r.config.parse_ok,
        "error": r.config.error,
      },
      "services": {
        "derivation_base_url": r.services.derivation_base_url,
        "derivation_url_ok": r.services.derivation_url_ok,
        "detector_base_url": r.services.detector_base_url,
        "detector_url_ok": r.services.detector_url_ok,
        "request_timeout_seconds": r.services.request_timeout_seconds,
        "repair_on_startup": r.services.repair_on_startup,
      },
      "accounts": {
        "snapshot_path": r.accounts.snapshot_path,
        "snapshot_exists": r.accounts.snapshot_exists,
        "legacy_path": r.accounts.legacy_path,
        "legacy_exists": r.accounts.legacy_exists,
        "count": r.accounts.count,
        "current_account_id": r.accounts.current_account_id,
        "needs_repair": r.accounts.needs_repair,
        "dropped_invalid": r.accounts.dropped_invalid,
        "load_error": r.accounts.load_error,
      },
      "vault": {
        "vault_dir": r.vault.vault_dir,
        "machine_secret_exists": r.vault.machine_secret_exists,
        "generated_seed_sealed": r.vault.generated_seed_sealed,
        "imported_seed_sealed": r.vault.imported_seed_sealed,
      },
      "env": r.env,
      "hints": [
        "If accounts.needs_repair > 0, run `emberkeep account repair` once the derivation service is reachable.",
        "Accounts live in accounts.json; sealed seeds stay in the vault and never leave this machine.",
        "Point EMBERKEEP_DERIVATION_BASE_URL at http://127.0.0.1:<port> to test against a local stack.",
      ]
    }))
    .context("serialize doctor json")?;
    writeln!(out, "{s}").context("write doctor json")?;
    Ok(())
}

fn print_human(out: &mut impl std::io::Write, r: &DoctorReport) -> eyre::Result<()> {
    writeln!(out, "Emberkeep doctor (v{})", r.version).context("write header")?;
    writeln!(out).context("write newline")?;

    writeln!(out, "Paths:").context("write paths header")?;
    writeln!(out, "  config_dir: {}", r.paths.config_dir.display()).context("write paths")?;
    writeln!(out, "  data_dir:   {}", r.paths.data_dir.display()).context("write paths")?;
    writeln!(out, "  log_file:   {}", r.paths.log_file.display()).context("write paths")?;
    writeln!(out).context("write newline")?;

    writeln!(out, "Config:").context("write config header")?;
    writeln!(out, "  config.toml: {}", r.config.path.display()).context("write config")?;
    if !r.config.exists {
        writeln!(out, "  status: missing (will be created on first run)")
            .context("write config")?;
    } else if r.config.parse_ok {
        writeln!(out, "  status: ok").context("write config")?;
    } else {
        writeln!(out, "  status: parse failed").context("write config")?;
        if let Some(e) = &r.config.error {
            let first = e.lines().next().unwrap_or("parse error");
            writeln!(out, "  error: {first}").context("write config")?;
        }
    }
    writeln!(out).context("write newline")?;

    writeln!(out, "Services:").context("write services header")?;
    writeln!(
        out,
        "  derivation: {} (url_ok: {})",
        r.services.derivation_base_url, r.services.derivation_url_ok
    )
    .context("write services")?;
    writeln!(
        out,
        "  detector:   {} (url_ok: {})",
        r.services.detector_base_url, r.services.detector_url_ok
    )
    .context("write services")?;
    writeln!(
        out,
        "  request_timeout_seconds: {}",
        r.services.request_timeout_seconds
    )
    .context("write services")?;
    writeln!(
        out,
        "  repair_on_startup: {}",
        r.services.repair_on_startup
    )
    .context("write services")?;
    writeln!(out).context("write newline")?;

    writeln!(out, "Accounts:").context("write accounts header")?;
    writeln!(
        out,
        "  accounts.json: {}",
        r.accounts.snapshot_path.display()
    )
    .context("write accounts")?;
    writeln!(out, "  snapshot_exists: {}", r.accounts.snapshot_exists)
        .context("write accounts")?;
    writeln!(out, "  legacy_wallet_exists: {}", r.accounts.legacy_exists)
        .context("write accounts")?;
    if let Some(e) = &r.accounts.load_error {
        let first = e.lines().next().unwrap_or("load error");
        writeln!(out, "  load_error: {first}").context("write accounts")?;
    } else {
        writeln!(out, "  count: {}", r.accounts.count).context("write accounts")?;
        writeln!(
            out,
            "  current_account_id: {}",
            r.accounts.current_account_id.as_deref().unwrap_or("-")
        )
        .context("write accounts")?;
        writeln!(out, "  needs_repair: {}", r.accounts.needs_repair).context("write accounts")?;
        if r.accounts.dropped_invalid > 0 {
            writeln!(out, "  dropped_invalid: {}", r.accounts.dropped_invalid)
                .context("write accounts")?;
        }
    }
    writeln!(out).context("write newline")?;

    writeln!(out, "Vault:").context("write vault header")?;
    writeln!(out, "  vault_dir: {}", r.vault.vault_dir.display()).context("write vault")?;
    writeln!(
        out,
        "  machine_secret_exists: {}",
        r.vault.machine_secret_exists
    )
    .context("write vault")?;
    writeln!(
        out,
        "  generated_seed_sealed: {}",
        r.vault.generated_seed_sealed
    )
    .context("write vault")?;
    writeln!(
        out,
        "  imported_seed_sealed: {}",
        r.vault.imported_seed_sealed
    )
    .context("write vault")?;
    writeln!(out).context("write newline")?;

    writeln!(out, "Env:").context("write env header")?;
    writeln!(
        out,
        "  EMBERKEEP_CONFIG_DIR: {:?}",
        r.env.get("EMBERKEEP_CONFIG_DIR").and_then(|v| v.as_str())
    )
    .context("write env")?;
    writeln!(
        out,
        "  EMBERKEEP_DATA_DIR:   {:?}",
        r.env.get("EMBERKEEP_DATA_DIR").and_then(|v| v.as_str())
    )
    .context("write env")?;
    writeln!(
        out,
        "  EMBERKEEP_DERIVATION_BASE_URL: {:?}",
        r.env
            .get("EMBERKEEP_DERIVATION_BASE_URL")
            .and_then(|v| v.as_str())
    )
    .context("write env")?;
    writeln!(
        out,
        "  EMBERKEEP_DETECTOR_BASE_URL: {:?}",
        r.env
            .get("EMBERKEEP_DETECTOR_BASE_URL")
            .and_then(|v| v.as_str())
    )
    .context("write env")?;
    Ok(())
}

pub fn run(as_json: bool) -> eyre::Result<()> {
    let paths = EmberkeepPaths::discover()?;
    let report = collect(&paths).context("collect doctor report")?;
    let mut out = std::io::stdout().lock();
    if as_json {
        print_json(&mut out, &report)?;
    } else {
        print_human(&mut out, &report)?;
    }
    Ok(())
}
