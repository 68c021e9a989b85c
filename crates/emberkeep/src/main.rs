#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use clap::{Parser, Subcommand};
use eyre::Context as _;
use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use zeroize::Zeroizing;

mod account;
mod account_store;
mod cli_output;
mod config;
mod derivation;
mod detector;
mod doctor;
mod errors;
mod events;
mod fsutil;
mod lifecycle;
mod paths;
mod persistence;
mod store;
mod vault;

#[derive(Parser, Debug)]
#[command(name = "emberkeep", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage wallet accounts.
    Account {
        #[command(subcommand)]
        cmd: AccountCommand,
    },

    /// Print resolved paths (useful for debugging).
    Paths,

    /// Print a quick self-diagnostic report (safe to paste; contains no secrets).
    Doctor {
        /// Emit JSON to stdout (machine-readable).
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Create a new account from a mnemonic.
    ///
    /// Prompts for the mnemonic without echoing it. Pass `--generate` to
    /// mint a fresh 12-word phrase instead.
    Create {
        /// Display name for the new account.
        name: String,

        /// Read the mnemonic from stdin instead of prompting (for pipes).
        #[arg(long, default_value_t = false)]
        mnemonic_stdin: bool,

        /// Generate a fresh mnemonic instead of asking for one.
        #[arg(long, default_value_t = false)]
        generate: bool,

        /// Print the generated mnemonic to stdout (implies --generate).
        ///
        /// Write it down; the sealed copy in the vault is machine-local.
        #[arg(long, default_value_t = false)]
        show_mnemonic: bool,
    },

    /// Import an account from an existing mnemonic.
    Import {
        /// Display name for the imported account.
        name: String,

        /// Read the mnemonic from stdin instead of prompting (for pipes).
        #[arg(long, default_value_t = false)]
        mnemonic_stdin: bool,

        /// Probe the detection service for the originating wallet software.
        #[arg(long, default_value_t = false)]
        detect: bool,

        /// Known provider convention; skips detection.
        #[arg(long)]
        wallet_type: Option<String>,

        /// Taproot variant provider chosen after an ambiguous import.
        #[arg(long)]
        variant: Option<String>,
    },

    /// List all accounts (the current one is starred).
    List {
        /// Emit JSON to stdout (machine-readable).
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show one account as JSON (defaults to the current one).
    Show {
        /// Account id or name; omit for the current account.
        target: Option<String>,
    },

    /// Make an account current.
    Switch {
        /// Account id or name.
        target: String,
    },

    /// Rename an account.
    Rename {
        /// Account id or name.
        target: String,
        new_name: String,
    },

    /// Assign a display color from the fixed palette.
    SetColor {
        /// Account id or name.
        target: String,
        /// Hex color, e.g. "#F87171".
        color: String,
    },

    /// Record advisory balances reported by an out-of-band refresher.
    SetBalances {
        /// Account id or name.
        target: String,
        /// `currency=amount` pairs, e.g. `btc=0.5 spark=12`.
        #[arg(required = true)]
        balances: Vec<String>,
    },

    /// Delete an account. The last remaining account can never be deleted.
    Delete {
        /// Account id or name.
        target: String,

        /// Skip the confirmation prompt (required for non-interactive shells).
        #[arg(long, default_value_t = false)]
        yes: bool,
    },

    /// Fill address gaps from the sealed seeds in the vault.
    Repair,
}

fn init_logging(paths: &paths::EmberkeepPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("emberkeep.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

/// The manager plus what bootstrap saw, for commands that want to react to it.
struct App {
    manager: lifecycle::AccountLifecycleManager,
    config: config::EmberkeepConfig,
    load: lifecycle::LoadReport,
}

fn open_app(paths: &paths::EmberkeepPaths) -> eyre::Result<App> {
    let config = store::ConfigStore::new(paths).load_or_init_default()?;
    let timeout = config.service.request_timeout();

    let deriver = derivation::HttpDeriver::new(&config.service.derivation_base_url, timeout)?;
    let detector = detector::HttpDetector::new(&config.service.detector_base_url, timeout)?;
    let vault = vault::FileSeedVault::new(paths);

    let manager = lifecycle::AccountLifecycleManager::new(
        Arc::new(Mutex::new(account_store::AccountStore::new())),
        persistence::SnapshotStore::new(paths),
        Arc::new(deriver),
        Arc::new(detector),
        Arc::new(vault),
        timeout,
    );
    let load = manager.bootstrap().context("load accounts")?;
    Ok(App {
        manager,
        config,
        load,
    })
}

/// Opportunistic gap fill before a network-bound command. Failures are
/// logged; the command proceeds either way.
async fn maybe_startup_repair(app: &App) {
    if !app.config.repair_on_startup || app.load.needs_repair == 0 {
        return;
    }
    match app.manager.repair_missing_addresses().await {
        Ok(fixed) if fixed > 0 => tracing::info!(fixed, "repaired address gaps at startup"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "startup repair failed"),
    }
}

fn emit_json(value: &impl serde::Serialize) -> eyre::Result<()> {
    use std::io::Write as _;
    let s = serde_json::to_string_pretty(value).context("serialize output")?;
    writeln!(std::io::stdout().lock(), "{s}").context("write output")?;
    Ok(())
}

/// Resolve `target` to a record or fail with a uniform message.
fn resolve_or_bail(app: &App, target: &str) -> eyre::Result<account::AccountRecord> {
    app.manager
        .resolve_account(target)?
        .ok_or_else(|| eyre::eyre!("no account matching '{target}'"))
}

async fn run_create(
    app: &App,
    name: &str,
    mnemonic_stdin: bool,
    generate: bool,
    show_mnemonic: bool,
) -> eyre::Result<()> {
    let mnemonic: Zeroizing<String> = if generate || show_mnemonic {
        let phrase = bip39::Mnemonic::generate_in(bip39::Language::English, 12)
            .context("generate mnemonic")?;
        Zeroizing::new(phrase.to_string())
    } else {
        cli_output::read_mnemonic(mnemonic_stdin)?
    };

    let created = app.manager.create(name, &mnemonic).await?;
    if show_mnemonic {
        use std::io::Write as _;
        writeln!(std::io::stdout().lock(), "{}", mnemonic.as_str()).context("write mnemonic")?;
    }
    cli_output::print_account_created(
        &created.record.name,
        &created.record.id,
        created.needs_repair,
    );
    emit_json(&created.record)
}

async fn run_import(
    app: &App,
    name: &str,
    mnemonic_stdin: bool,
    detect: bool,
    wallet_type: Option<String>,
    variant: Option<String>,
) -> eyre::Result<()> {
    let mnemonic = cli_output::read_mnemonic(mnemonic_stdin)?;
    let options = lifecycle::ImportOptions {
        detect: detect || variant.is_some(),
        wallet_type_hint: wallet_type,
        selected_variant: None,
    };

    let outcome = app.manager.import(name, &mnemonic, options).await?;
    let created = match outcome {
        lifecycle::ImportOutcome::Created(created) => created,
        lifecycle::ImportOutcome::VariantRequired(candidates) => {
            resume_with_variant(app, name, &mnemonic, &candidates, variant).await?
        }
    };

    if let Some(existing) = &created.duplicate_of {
        cli_output::print_duplicate_notice(existing);
    }
    cli_output::print_account_created(
        &created.record.name,
        &created.record.id,
        created.needs_repair,
    );
    emit_json(&created.record)
}

/// Second leg of an ambiguous import: match `--variant` against the
/// candidates and re-import with the chosen one applied.
async fn resume_with_variant(
    app: &App,
    name: &str,
    mnemonic: &str,
    candidates: &[lifecycle::TaprootCandidate],
    variant: Option<String>,
) -> eyre::Result<lifecycle::CreatedAccount> {
    let Some(wanted) = variant else {
        cli_output::print_variant_candidates(candidates);
        eyre::bail!("multiple taproot conventions detected; re-run with --variant <provider>");
    };
    let Some(chosen) = candidates
        .iter()
        .find(|c| c.provider.eq_ignore_ascii_case(&wanted))
    else {
        cli_output::print_variant_candidates(candidates);
        eyre::bail!("no detected variant named '{wanted}'");
    };

    let options = lifecycle::ImportOptions {
        detect: false,
        wallet_type_hint: None,
        selected_variant: Some(lifecycle::SelectedVariant {
            provider: chosen.provider.clone(),
            address: chosen.address.clone(),
            path: chosen.path.clone(),
        }),
    };
    match app.manager.import(name, mnemonic, options).await? {
        lifecycle::ImportOutcome::Created(created) => Ok(created),
        lifecycle::ImportOutcome::VariantRequired(_) => {
            eyre::bail!("variant selection did not resolve the import")
        }
    }
}

fn run_list(app: &App, json: bool) -> eyre::Result<()> {
    let accounts = app.manager.accounts()?;
    if json {
        return emit_json(&accounts);
    }
    use std::io::Write as _;
    let current_id = app.manager.current_account()?.map(|a| a.id);
    let mut out = std::io::stdout().lock();
    for account in &accounts {
        let marker = if current_id.as_deref() == Some(account.id.as_str()) {
            "*"
        } else {
            " "
        };
        let kind = if account.is_import {
            "imported"
        } else {
            "generated"
        };
        writeln!(
            out,
            "{marker} {}  {}  {} {} ({kind})",
            account.id, account.name, account.color, account.wallet_type
        )
        .context("write account list")?;
    }
    Ok(())
}

/// Switch, then print the stamped record off the switch notification rather
/// than re-querying the store.
async fn run_switch(app: &App, target: &str) -> eyre::Result<()> {
    let record = resolve_or_bail(app, target)?;
    let mut rx = app.manager.subscribe()?;
    if !app.manager.switch_account(&record.id)? {
        eyre::bail!("no account matching '{target}'");
    }
    // The switch event is already buffered once switch_account returns true.
    let switched = loop {
        match rx.recv().await? {
            events::AccountEvent::AccountSwitched { account } => break account,
            events::AccountEvent::AccountsChanged { accounts } => {
                tracing::debug!(count = accounts.len(), "account collection changed");
            }
            events::AccountEvent::CurrentAccountChanged { current_id } => {
                tracing::debug!(current = ?current_id, "current pointer moved");
            }
        }
    };
    emit_json(&switched)
}

fn run_delete(app: &App, target: &str, yes: bool) -> eyre::Result<()> {
    let record = resolve_or_bail(app, target)?;
    cli_output::confirm_delete_or_bail(&record.name, yes)?;
    if app.manager.delete_account(&record.id)? {
        emit_json(&serde_json::json!({ "deleted": record.id }))
    } else {
        eyre::bail!("no account matching '{target}'")
    }
}

async fn run_account_command(
    paths: &paths::EmberkeepPaths,
    cmd: AccountCommand,
) -> eyre::Result<()> {
    let app = open_app(paths)?;
    match cmd {
        AccountCommand::Create {
            name,
            mnemonic_stdin,
            generate,
            show_mnemonic,
        } => {
            maybe_startup_repair(&app).await;
            run_create(&app, &name, mnemonic_stdin, generate, show_mnemonic).await
        }

        AccountCommand::Import {
            name,
            mnemonic_stdin,
            detect,
            wallet_type,
            variant,
        } => {
            maybe_startup_repair(&app).await;
            run_import(&app, &name, mnemonic_stdin, detect, wallet_type, variant).await
        }

        AccountCommand::List { json } => run_list(&app, json),

        AccountCommand::Show { target } => {
            let record = match target {
                Some(t) => resolve_or_bail(&app, &t)?,
                None => app.manager.current_account()?.ok_or_else(|| {
                    eyre::eyre!("no accounts yet; run `emberkeep account create`")
                })?,
            };
            emit_json(&record)
        }

        AccountCommand::Switch { target } => run_switch(&app, &target).await,

        AccountCommand::Rename { target, new_name } => {
            let record = resolve_or_bail(&app, &target)?;
            if !app.manager.rename_account(&record.id, &new_name)? {
                eyre::bail!("no account matching '{target}'");
            }
            emit_json(&resolve_or_bail(&app, &record.id)?)
        }

        AccountCommand::SetColor { target, color } => {
            let record = resolve_or_bail(&app, &target)?;
            if !app.manager.set_account_color(&record.id, &color)? {
                eyre::bail!("no account matching '{target}'");
            }
            emit_json(&resolve_or_bail(&app, &record.id)?)
        }

        AccountCommand::SetBalances { target, balances } => {
            let record = resolve_or_bail(&app, &target)?;
            let balances = cli_output::parse_balance_pairs(&balances)?;
            if !app.manager.record_balances(&record.id, balances)? {
                eyre::bail!("no account matching '{target}'");
            }
            emit_json(&resolve_or_bail(&app, &record.id)?)
        }

        AccountCommand::Delete { target, yes } => run_delete(&app, &target, yes),

        AccountCommand::Repair => {
            let fixed = app.manager.try_repair_missing_addresses().await?;
            emit_json(&serde_json::json!({ "fixed": fixed }))
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = paths::EmberkeepPaths::discover()?;
    paths.ensure_private_dirs().context("prepare data dirs")?;
    let _log_guard = init_logging(&paths);

    let result = match cli.cmd {
        Command::Account { cmd } => run_account_command(&paths, cmd).await,
        Command::Paths => {
            use std::io::Write as _;
            let s = serde_json::to_string(&serde_json::json!({
              "config_dir": paths.config_dir,
              "data_dir": paths.data_dir,
              "log_file": paths.log_file,
            }))
            .context("serialize paths")?;
            writeln!(std::io::stdout().lock(), "{s}").context("write paths")?;
            Ok(())
        }
        Command::Doctor { json } => doctor::run(json).context("doctor failed"),
    };
    if let Err(report) = &result {
        // Domain failures get a stable machine-readable code in the log.
        if let Some(domain) = report.downcast_ref::<errors::AccountError>() {
            tracing::error!(code = domain.code(), error = %domain, "command failed");
        }
    }
    result
}
