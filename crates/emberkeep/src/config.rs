use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DERIVATION_BASE_URL: &str = "https://api.emberkeep.dev";
pub const DEFAULT_DETECTOR_BASE_URL: &str = "https://api.emberkeep.dev";

/// Per-request ceiling for derivation/detection calls. Anything slower is
/// treated as a failure.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address-derivation service base URL.
    ///
    /// Must be `https`, except `<http://localhost>` / `<http://127.0.0.1>` /
    /// `<http://[::1]>` for local testing.
    pub derivation_base_url: String,
    /// Wallet-type detector base URL. Same scheme rules as above.
    pub detector_base_url: String,
    /// Timeout applied to each derivation/detection request (seconds).
    pub request_timeout_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            derivation_base_url: DEFAULT_DERIVATION_BASE_URL.into(),
            detector_base_url: DEFAULT_DETECTOR_BASE_URL.into(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        // A zero timeout would fail every request; clamp to the default.
        let secs = if self.request_timeout_seconds == 0 {
            DEFAULT_REQUEST_TIMEOUT_SECONDS
        } else {
            self.request_timeout_seconds
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmberkeepConfig {
    pub service: ServiceConfig,

    /// Run an address-repair pass right after load when any account has
    /// address gaps.
    pub repair_on_startup: bool,
}

impl Default for EmberkeepConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            repair_on_startup: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_clamps_to_default() {
        let cfg = ServiceConfig {
            request_timeout_seconds: 0,
            ..Default::default()
        };
        assert_eq!(
            cfg.request_timeout(),
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS)
        );
    }

    #[test]
    fn defaults_survive_a_toml_round_trip() -> eyre::Result<()> {
        let cfg = EmberkeepConfig::default();
        let s = toml::to_string_pretty(&cfg)?;
        let back: EmberkeepConfig = toml::from_str(&s)?;
        assert_eq!(
            back.service.derivation_base_url,
            DEFAULT_DERIVATION_BASE_URL
        );
        assert!(back.repair_on_startup);
        Ok(())
    }

    #[test]
    fn partial_files_fill_in_defaults() -> eyre::Result<()> {
        let cfg: EmberkeepConfig =
            toml::from_str("[service]\nderivation_base_url = \"http://127.0.0.1:9701\"\n")?;
        assert_eq!(cfg.service.derivation_base_url, "http://127.0.0.1:9701");
        assert_eq!(cfg.service.detector_base_url, DEFAULT_DETECTOR_BASE_URL);
        assert_eq!(
            cfg.service.request_timeout_seconds,
            DEFAULT_REQUEST_TIMEOUT_SECONDS
        );
        Ok(())
    }
}
