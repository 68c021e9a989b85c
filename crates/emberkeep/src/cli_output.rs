//! Human-facing notices on stderr, keeping stdout clean for JSON output.
//! Write failures (closed pipes) are swallowed rather than surfaced.

use crate::lifecycle::TaprootCandidate;
use std::collections::BTreeMap;
use std::io::{BufRead as _, IsTerminal as _, Write as _};
use zeroize::Zeroizing;

fn note(line: impl AsRef<str>) {
    let mut stderr = std::io::stderr().lock();
    let _ignored = stderr
        .write_all(line.as_ref().as_bytes())
        .and_then(|()| stderr.write_all(b"\n"))
        .and_then(|()| stderr.flush());
}

fn prompt(text: &str) {
    let mut stderr = std::io::stderr().lock();
    let _ignored = stderr
        .write_all(text.as_bytes())
        .and_then(|()| stderr.flush());
}

/// Print an account-created notice to stderr (human-operator info only).
pub fn print_account_created(name: &str, id: &str, needs_repair: bool) {
    if needs_repair {
        note(format!(
            "Emberkeep: created account '{name}' ({id}) with address gaps; run `emberkeep account repair` once the derivation service is reachable."
        ));
    } else {
        note(format!("Emberkeep: created account '{name}' ({id})."));
    }
}

/// Advisory notice when an imported seed already backs another account.
pub fn print_duplicate_notice(existing_id: &str) {
    note(format!(
        "Emberkeep: this seed already backs account {existing_id}; both entries stay usable."
    ));
}

/// List the selectable taproot conventions after an ambiguous import.
pub fn print_variant_candidates(candidates: &[TaprootCandidate]) {
    note("Multiple wallet conventions detected for this seed:");
    for candidate in candidates {
        note(format!(
            "  --variant {:<12} {} ({}, detected balance {})",
            candidate.provider, candidate.address, candidate.path, candidate.balance
        ));
    }
    note("Re-run the import with --variant <provider> to choose one.");
}

/// Prompt the user on stderr to confirm an account delete, or bail if
/// non-interactive.
pub fn confirm_delete_or_bail(name: &str, yes: bool) -> eyre::Result<()> {
    if yes {
        return Ok(());
    }
    let interactive = std::io::stdin().is_terminal() && std::io::stderr().is_terminal();
    if !interactive {
        eyre::bail!("refusing to delete an account non-interactively; pass --yes");
    }

    note(format!(
        "Deleting account '{name}' removes it from this machine; the sealed seed stays in the vault."
    ));
    prompt("Continue? [y/N] ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| eyre::eyre!("read confirmation: {e}"))?;
    let ans = line.trim().to_ascii_lowercase();
    if ans == "y" || ans == "yes" {
        Ok(())
    } else {
        eyre::bail!("delete cancelled")
    }
}

/// Read a mnemonic without echoing it, or from stdin when piped.
pub fn read_mnemonic(from_stdin: bool) -> eyre::Result<Zeroizing<String>> {
    if from_stdin {
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| eyre::eyre!("read mnemonic from stdin: {e}"))?;
        return Ok(Zeroizing::new(line));
    }
    if !std::io::stdin().is_terminal() {
        eyre::bail!("stdin is not a terminal; pass --mnemonic-stdin and pipe the phrase in");
    }
    let phrase = rpassword::prompt_password("Mnemonic (input hidden): ")
        .map_err(|e| eyre::eyre!("read mnemonic: {e}"))?;
    Ok(Zeroizing::new(phrase))
}

/// Parse `currency=amount` pairs into a balances map. Currencies are
/// lowercased; a repeated currency keeps the last amount.
pub fn parse_balance_pairs(pairs: &[String]) -> eyre::Result<BTreeMap<String, f64>> {
    let mut balances = BTreeMap::new();
    for pair in pairs {
        let Some((currency, amount)) = pair.split_once('=') else {
            eyre::bail!("expected currency=amount, got '{pair}'");
        };
        let currency = currency.trim();
        if currency.is_empty() {
            eyre::bail!("expected currency=amount, got '{pair}'");
        }
        let amount: f64 = amount
            .trim()
            .parse()
            .map_err(|e| eyre::eyre!("bad amount in '{pair}': {e}"))?;
        balances.insert(currency.to_ascii_lowercase(), amount);
    }
    Ok(balances)
}
