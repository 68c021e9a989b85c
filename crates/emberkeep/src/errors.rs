use thiserror::Error;

/// Domain errors for account lifecycle operations.
///
/// Infrastructure failures (filesystem, config parsing) travel as
/// `eyre::Report`; these variants are the cases callers branch on.
#[derive(Debug, Error, Clone)]
pub enum AccountError {
    #[error("invalid account name: {0}")]
    InvalidName(String),

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid account color: {0}")]
    InvalidColor(String),

    #[error("address derivation failed: {0}")]
    Derivation(String),

    #[error("cannot delete the last remaining account")]
    LastAccount,

    #[error("an address repair pass is already running")]
    RepairBusy,

    #[error("account snapshot is locked by another process")]
    SnapshotBusy,
}

impl AccountError {
    /// Stable machine-readable code for CLI/JSON surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidName(_) => "invalid_name",
            Self::InvalidMnemonic(_) => "invalid_mnemonic",
            Self::InvalidColor(_) => "invalid_color",
            Self::Derivation(_) => "derivation_failed",
            Self::LastAccount => "last_account",
            Self::RepairBusy => "repair_busy",
            Self::SnapshotBusy => "snapshot_busy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Codes are a published contract; renaming one breaks embedders.
    #[test]
    fn error_codes_are_stable() {
        assert_eq!(AccountError::InvalidName(String::new()).code(), "invalid_name");
        assert_eq!(
            AccountError::InvalidMnemonic(String::new()).code(),
            "invalid_mnemonic"
        );
        assert_eq!(AccountError::InvalidColor(String::new()).code(), "invalid_color");
        assert_eq!(
            AccountError::Derivation(String::new()).code(),
            "derivation_failed"
        );
        assert_eq!(AccountError::LastAccount.code(), "last_account");
        assert_eq!(AccountError::RepairBusy.code(), "repair_busy");
        assert_eq!(AccountError::SnapshotBusy.code(), "snapshot_busy");
    }
}
