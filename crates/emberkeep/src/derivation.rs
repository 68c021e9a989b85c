//! Address derivation collaborator. The cryptographic derivation itself
//! happens in a remote service; this side owns transport, timeouts, and the
//! wire shapes.

use crate::account::DerivationPathSet;
use async_trait::async_trait;
use eyre::Context as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

fn is_loopback_http(url: &str) -> bool {
    fn host_prefix_ok(s: &str, prefix: &str) -> bool {
        if !s.starts_with(prefix) {
            return false;
        }
        matches!(s.as_bytes().get(prefix.len()), None | Some(b':' | b'/'))
    }
    let u = url.trim();
    host_prefix_ok(u, "http://127.0.0.1")
        || host_prefix_ok(u, "http://localhost")
        || host_prefix_ok(u, "http://[::1]")
}

pub(crate) fn ensure_https_or_loopback(url: &str, name: &str) -> eyre::Result<()> {
    let u = url.trim();
    if u.starts_with("https://") || is_loopback_http(u) {
        return Ok(());
    }
    eyre::bail!("{name} must use https (or http://localhost for local testing)");
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkDerivation {
    pub address: String,
}

/// The four Bitcoin address kinds; Spark arrives separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BitcoinAddressSet {
    pub segwit: String,
    pub taproot: String,
    pub legacy: String,
    pub nested_segwit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaprootVariant {
    pub address: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BitcoinDerivation {
    pub addresses: BitcoinAddressSet,
    pub paths: DerivationPathSet,
    /// Taproot address per known provider convention, keyed by provider
    /// name. Present when the service was asked to enumerate variants.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub taproot_variants: BTreeMap<String, TaprootVariant>,
}

/// Both calls are idempotent and safe to re-issue; the lifecycle layer runs
/// them concurrently.
#[async_trait]
pub trait AddressDeriver: Send + Sync {
    async fn derive_spark(&self, mnemonic: &str) -> eyre::Result<SparkDerivation>;

    /// `provider_hint` selects which provider's taproot convention lands in
    /// `addresses.taproot`. Omitted means the standard convention.
    async fn derive_bitcoin(
        &self,
        mnemonic: &str,
        provider_hint: Option<&str>,
    ) -> eyre::Result<BitcoinDerivation>;
}

#[derive(Debug, Clone)]
pub struct HttpDeriver {
    base_url: String,
    timeout: Duration,
}

impl HttpDeriver {
    pub fn new(base_url: &str, timeout: Duration) -> eyre::Result<Self> {
        ensure_https_or_loopback(base_url, "derivation_base_url")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        })
    }

    fn client(&self) -> eyre::Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .context("build http client")
    }
}

#[async_trait]
impl AddressDeriver for HttpDeriver {
    async fn derive_spark(&self, mnemonic: &str) -> eyre::Result<SparkDerivation> {
        let client = self.client()?;
        let url = format!("{}/v1/spark/address", self.base_url);
        let resp = client
            .post(url)
            .json(&serde_json::json!({ "mnemonic": mnemonic }))
            .send()
            .await
            .context("request spark address")?;
        if !resp.status().is_success() {
            eyre::bail!("derivation service returned http {}", resp.status());
        }
        let v: SparkDerivation = resp.json().await.context("decode spark address json")?;
        Ok(v)
    }

    async fn derive_bitcoin(
        &self,
        mnemonic: &str,
        provider_hint: Option<&str>,
    ) -> eyre::Result<BitcoinDerivation> {
        let client = self.client()?;
        let url = format!("{}/v1/bitcoin/addresses", self.base_url);
        let mut body = serde_json::json!({ "mnemonic": mnemonic });
        if let Some(hint) = provider_hint {
            body["walletTypeHint"] = serde_json::Value::String(hint.to_owned());
        }
        let resp = client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("request bitcoin addresses")?;
        if !resp.status().is_success() {
            eyre::bail!("derivation service returned http {}", resp.status());
        }
        let v: BitcoinDerivation = resp.json().await.context("decode bitcoin addresses json")?;
        Ok(v)
    }
}
