//! Wallet-type detection collaborator: scans known provider derivation
//! conventions for prior on-chain activity so imports can follow the
//! convention the funds actually live under.

use crate::derivation::ensure_https_or_loopback;
use async_trait::async_trait;
use eyre::Context as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One derivation path with observed activity, attributed to a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivePath {
    pub wallet_name: String,
    pub path: String,
    pub balance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionReport {
    pub detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_name: Option<String>,
    pub active_paths: Vec<ActivePath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_path: Option<String>,
}

impl DetectionReport {
    /// Distinct providers with observed activity, in report order.
    pub fn plausible_providers(&self) -> Vec<String> {
        let mut out: Vec<String> = vec![];
        for p in &self.active_paths {
            let name = p.wallet_name.trim();
            if name.is_empty() {
                continue;
            }
            if !out.iter().any(|existing| existing == name) {
                out.push(name.to_owned());
            }
        }
        out
    }
}

#[async_trait]
pub trait WalletTypeDetector: Send + Sync {
    async fn detect(&self, mnemonic: &str) -> eyre::Result<DetectionReport>;
}

#[derive(Debug, Clone)]
pub struct HttpDetector {
    base_url: String,
    timeout: Duration,
}

impl HttpDetector {
    pub fn new(base_url: &str, timeout: Duration) -> eyre::Result<Self> {
        ensure_https_or_loopback(base_url, "detector_base_url")?;
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
impl WalletTypeDetector for HttpDetector {
    async fn detect(&self, mnemonic: &str) -> eyre::Result<DetectionReport> {
        let client = self.client()?;
        let url = format!("{}/v1/detect", self.base_url);
        let resp = client
            .post(url)
            .json(&serde_json::json!({ "mnemonic": mnemonic }))
            .send()
            .await
            .context("request wallet detection")?;
        if !resp.status().is_success() {
            eyre::bail!("detector service returned http {}", resp.status());
        }
        let v: DetectionReport = resp.json().await.context("decode detection json")?;
        Ok(v)
    }
}
