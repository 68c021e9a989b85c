//! Filesystem discipline for emberkeep's on-disk state. Directories are
//! owner-only, files land at 0600 through a scratch file plus an atomic
//! rename, and symlinks are refused on both the read and the write side.

use eyre::Context as _;
use rand::Rng as _;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt as _, PermissionsExt as _};

const MODE_DIR_PRIVATE: u32 = 0o700;
const MODE_FILE_PRIVATE: u32 = 0o600;

fn refuse_symlink(p: &Path, action: &str) -> eyre::Result<()> {
    let md = fs::symlink_metadata(p).with_context(|| format!("stat {}", p.display()))?;
    if md.file_type().is_symlink() {
        eyre::bail!("refusing to {action} symlink at {}", p.display());
    }
    Ok(())
}

/// Create `dir` if needed and clamp it to owner-only permissions.
pub fn ensure_private_dir(dir: &Path) -> eyre::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    } else {
        refuse_symlink(dir, "use")?;
        let md = fs::metadata(dir).with_context(|| format!("stat {}", dir.display()))?;
        if !md.is_dir() {
            eyre::bail!("expected a directory at {}", dir.display());
        }
    }

    // Unix only; other platforms keep whatever the OS gave us.
    #[cfg(unix)]
    {
        let perms = fs::metadata(dir)
            .with_context(|| format!("stat {}", dir.display()))?
            .permissions();
        if perms.mode() & 0o077 != 0 {
            fs::set_permissions(dir, fs::Permissions::from_mode(MODE_DIR_PRIVATE))
                .with_context(|| format!("tighten permissions on {}", dir.display()))?;
        }
    }

    Ok(())
}

/// Scratch name alongside the target, hidden and uniquely suffixed so a
/// crashed writer never leaves a half-written file under the real name.
fn scratch_path(parent: &Path, target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("state");
    let mut tag = [0_u8; 8];
    rand::rng().fill_bytes(&mut tag);
    parent.join(format!(".{name}.{}.partial", hex::encode(tag)))
}

fn open_exclusive_private(path: &Path) -> eyre::Result<fs::File> {
    let mut opts = OpenOptions::new();
    opts.create_new(true).write(true);
    #[cfg(unix)]
    opts.mode(MODE_FILE_PRIVATE);
    opts.open(path)
        .with_context(|| format!("open scratch {}", path.display()))
}

fn write_private(path: &Path, bytes: &[u8]) -> eyre::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| eyre::eyre!("no parent directory for {}", path.display()))?;
    ensure_private_dir(parent)?;
    if path.exists() {
        refuse_symlink(path, "overwrite")?;
    }

    let scratch = scratch_path(parent, path);
    let mut f = open_exclusive_private(&scratch)?;
    f.write_all(bytes)
        .and_then(|()| f.flush())
        .and_then(|()| f.sync_all())
        .with_context(|| format!("write {}", scratch.display()))?;
    drop(f);

    // Atomic on Unix. Windows refuses to rename over an existing file, so
    // clear the destination first and accept the tiny non-atomic window.
    #[cfg(windows)]
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("clear {}", path.display()))?;
    }
    fs::rename(&scratch, path)
        .with_context(|| format!("move {} into place", scratch.display()))?;
    Ok(())
}

pub fn write_text_private(path: &Path, text: &str) -> eyre::Result<()> {
    write_private(path, text.as_bytes())
}

/// Pretty-printed JSON behind the same scratch-and-rename discipline.
pub fn write_json_private(path: &Path, value: &impl Serialize) -> eyre::Result<()> {
    let body = serde_json::to_string_pretty(value).context("serialize json")?;
    write_private(path, body.as_bytes()).with_context(|| format!("write {}", path.display()))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> eyre::Result<T> {
    refuse_symlink(path, "read")?;
    let body = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("parse {}", path.display()))
}
