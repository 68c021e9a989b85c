//! Sealing primitives for the seed vault: AES-256-GCM under keys expanded
//! from the machine secret with HKDF-SHA256. The sealed record is what
//! lands on disk, so its field names are part of the vault file format.

use aes_gcm::{
    aead::{Aead as _, KeyInit as _},
    Aes256Gcm, Nonce,
};
use base64::Engine as _;
use eyre::Context as _;
use hkdf::Hkdf;
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

const SEAL_FORMAT: u8 = 1;
const NONCE_LEN: usize = 12;

/// On-disk shape of one sealed mnemonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedSeed {
    pub version: u8,
    pub nonce: String,
    pub payload: String,
}

pub fn random_bytes(buf: &mut [u8]) {
    rand::rng().fill_bytes(buf);
}

fn b64(bytes: impl AsRef<[u8]>) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn unb64(s: &str, what: &str) -> eyre::Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .with_context(|| format!("decode {what}"))
}

/// Expand the machine secret into the sealing key for one account class.
/// Same secret and label always yield the same key.
pub fn class_key(machine_secret: &[u8; 32], label: &str) -> eyre::Result<[u8; 32]> {
    let mut key = [0_u8; 32];
    Hkdf::<Sha256>::new(None, machine_secret)
        .expand(format!("emberkeep/seed-vault/{label}").as_bytes(), &mut key)
        .map_err(|e| eyre::eyre!("hkdf expand: {e}"))?;
    Ok(key)
}

pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> eyre::Result<SealedSeed> {
    let mut nonce = [0_u8; NONCE_LEN];
    random_bytes(&mut nonce);

    let ciphertext = Aes256Gcm::new_from_slice(key)
        .context("aes init")?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| eyre::eyre!("seal: {e}"))?;

    Ok(SealedSeed {
        version: SEAL_FORMAT,
        nonce: b64(nonce),
        payload: b64(ciphertext),
    })
}

pub fn open(key: &[u8; 32], sealed: &SealedSeed) -> eyre::Result<Vec<u8>> {
    if sealed.version != SEAL_FORMAT {
        eyre::bail!("unknown sealed seed version {}", sealed.version);
    }
    let nonce = unb64(&sealed.nonce, "nonce")?;
    if nonce.len() != NONCE_LEN {
        eyre::bail!("sealed seed nonce has wrong length");
    }
    let ciphertext = unb64(&sealed.payload, "payload")?;

    Aes256Gcm::new_from_slice(key)
        .context("aes init")?
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|e| eyre::eyre!("open: {e}"))
}
