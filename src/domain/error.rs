//! Domain error types.

/// Top-level error type for macross.
#[derive(Debug, thiserror::Error)]
pub enum MacrossError {
    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Universe(#[from] crate::domain::universe::UniverseError),

    #[error("no data for {code} on {exchange}")]
    NoData { code: String, exchange: String },

    #[error("insufficient data for {code} on {exchange}: have {bars} bars, need {minimum}")]
    InsufficientData {
        code: String,
        exchange: String,
        bars: usize,
        minimum: usize,
    },

    /// A price window shorter than `window + 1` was handed to the engine.
    #[error("insufficient history for {code}: window {window} needs {need} closes, have {have}")]
    InsufficientHistory {
        code: String,
        window: usize,
        have: usize,
        need: usize,
    },

    /// A held instrument has no price in the active feed nor through the fallback lookup.
    #[error("no price available for held instrument {code}")]
    MissingPrice { code: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&MacrossError> for std::process::ExitCode {
    fn from(err: &MacrossError) -> Self {
        let code: u8 = match err {
            MacrossError::Io(_) => 1,
            MacrossError::ConfigParse { .. }
            | MacrossError::ConfigMissing { .. }
            | MacrossError::ConfigInvalid { .. } => 2,
            MacrossError::Data { .. } => 3,
            MacrossError::Universe(_) => 4,
            MacrossError::NoData { .. } | MacrossError::InsufficientData { .. } => 5,
            MacrossError::InsufficientHistory { .. } | MacrossError::MissingPrice { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::universe::UniverseError;

    #[test]
    fn insufficient_history_message_names_window() {
        let err = MacrossError::InsufficientHistory {
            code: "AAPL".into(),
            window: 35,
            have: 20,
            need: 36,
        };
        assert_eq!(
            err.to_string(),
            "insufficient history for AAPL: window 35 needs 36 closes, have 20"
        );
    }

    #[test]
    fn missing_price_message() {
        let err = MacrossError::MissingPrice { code: "XOM".into() };
        assert_eq!(err.to_string(), "no price available for held instrument XOM");
    }

    #[test]
    fn universe_error_converts() {
        let err: MacrossError = UniverseError::DuplicateCode("MSFT".into()).into();
        assert!(matches!(err, MacrossError::Universe(_)));
        assert_eq!(err.to_string(), "duplicate code: MSFT");
    }

    #[test]
    fn exit_codes_by_category() {
        use std::process::ExitCode;

        let cases = [
            (
                MacrossError::ConfigMissing {
                    section: "strategy".into(),
                    key: "long_window".into(),
                },
                ExitCode::from(2),
            ),
            (
                MacrossError::Data {
                    reason: "bad csv".into(),
                },
                ExitCode::from(3),
            ),
            (
                MacrossError::MissingPrice { code: "XOM".into() },
                ExitCode::from(6),
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ExitCode::from(&err), expected);
        }
    }
}
