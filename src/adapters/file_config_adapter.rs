//! INI file configuration adapter.

use crate::domain::error::MacrossError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MacrossError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| MacrossError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, MacrossError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| MacrossError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const SAMPLE: &str = r#"
[backtest]
start_date = 2022-01-04
initial_capital = 1000000
benchmark = SPY

[strategy]
name = MA Crossover
short_window = 5
stop_loss = 0.015

[universe]
codes = AAPL, MSFT ,XOM
categories = Domestic Common Stock
"#;

    #[test]
    fn reads_every_section() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("backtest", "benchmark"),
            Some("SPY".to_string())
        );
        assert_eq!(adapter.get_int("strategy", "short_window", 0), 5);
        assert_eq!(adapter.get_double("strategy", "stop_loss", 0.0), 0.015);
        assert_eq!(
            adapter.get_double("backtest", "initial_capital", 0.0),
            1_000_000.0
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("execution", "commission"), None);
    }

    #[test]
    fn numeric_getters_fall_back_to_default() {
        let adapter =
            FileConfigAdapter::from_string("[strategy]\nlong_window = abc\n").unwrap();
        assert_eq!(adapter.get_int("strategy", "long_window", 35), 35);
        assert_eq!(adapter.get_double("strategy", "take_profit", 0.03), 0.03);
    }

    #[test]
    fn get_list_splits_and_trims() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_list("universe", "codes"),
            vec!["AAPL", "MSFT", "XOM"]
        );
        assert_eq!(
            adapter.get_list("universe", "categories"),
            vec!["Domestic Common Stock"]
        );
        assert!(adapter.get_list("universe", "missing").is_empty());
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[x]\na = true\nb = Yes\nc = off\nd = maybe\n").unwrap();
        assert!(adapter.get_bool("x", "a", false));
        assert!(adapter.get_bool("x", "b", false));
        assert!(!adapter.get_bool("x", "c", true));
        assert!(adapter.get_bool("x", "d", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config(SAMPLE);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("strategy", "name"),
            Some("MA Crossover".to_string())
        );
    }

    #[test]
    fn from_file_missing_is_config_parse_error() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(
            result,
            Err(MacrossError::ConfigParse { file, .. }) if file.contains("config.ini")
        ));
    }
}
