// Settings loaded once at startup
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Maximum retained entries per history file
pub const DEFAULT_HISTORY_CAP: usize = 5000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid parameter `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Trading logic parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameters {
    /// Instrument: "USD_JPY", "EUR_USD", ...
    pub instrument: String,
    /// Bar granularity label: "M1", "M5", "H4", ...
    pub granularity: String,
    /// Granularity in seconds ("M5" -> 300)
    pub granularity_secs: u64,
    /// Number of completed bars in the breakout window
    pub span: usize,
    /// Minimum range width before a reversal is allowed
    pub threshold: f64,
    pub profit_rate: f64,
    pub loss_rate: f64,
    /// Maximum acceptable ask - bid
    pub max_spread: f64,
    /// Order size for new positions
    pub units: u64,
}

impl Parameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instrument.is_empty() {
            return Err(invalid("instrument", "must not be empty"));
        }
        if self.granularity_secs == 0 {
            return Err(invalid("granularity_secs", "must be greater than zero"));
        }
        if self.span == 0 {
            return Err(invalid("span", "must be greater than zero"));
        }
        if self.units == 0 {
            return Err(invalid("units", "must be greater than zero"));
        }
        for (field, value) in [
            ("threshold", self.threshold),
            ("profit_rate", self.profit_rate),
            ("loss_rate", self.loss_rate),
            ("max_spread", self.max_spread),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, &format!("must be a non-negative number, got {}", value)));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Process-wide values the engine receives explicitly
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeSettings {
    /// Account balance when the bot started; bot P/L is measured against it
    pub initial_balance: f64,
    #[serde(default = "default_balance_file")]
    pub balance_file: PathBuf,
    #[serde(default = "default_trade_file")]
    pub trade_file: PathBuf,
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Period of the summary notification (4h by default)
    #[serde(default = "default_notify_interval")]
    pub notify_interval_secs: u64,
}

fn default_balance_file() -> PathBuf {
    PathBuf::from("./balance.json")
}

fn default_trade_file() -> PathBuf {
    PathBuf::from("./trade.json")
}

fn default_history_cap() -> usize {
    DEFAULT_HISTORY_CAP
}

fn default_notify_interval() -> u64 {
    4 * 60 * 60
}

/// Polling budgets for order legs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionSettings {
    /// How long to wait for an acceptable spread
    pub spread_wait_secs: u64,
    pub spread_poll_ms: u64,
    /// How long to wait for a submitted order to fill
    pub fill_timeout_ms: u64,
    pub fill_poll_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            spread_wait_secs: 15,
            spread_poll_ms: 1000,
            fill_timeout_ms: 6000,
            fill_poll_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub params: Parameters,
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params.validate()?;
        if self.runtime.history_cap == 0 {
            return Err(invalid("history_cap", "must be greater than zero"));
        }
        if self.runtime.notify_interval_secs == 0 {
            return Err(invalid("notify_interval_secs", "must be greater than zero"));
        }
        if self.execution.spread_poll_ms == 0 {
            return Err(invalid("spread_poll_ms", "must be greater than zero"));
        }
        if self.execution.fill_poll_ms == 0 {
            return Err(invalid("fill_poll_ms", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Load settings from a TOML/JSON file, overridden by `FXBOT__*` variables
///
/// # Example
/// `FXBOT__PARAMS__UNITS=1000` overrides `params.units`.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let settings: Settings = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(
            Environment::with_prefix("FXBOT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    settings.validate()?;

    tracing::debug!(?settings, "Loaded settings from {}", path.display());

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> Parameters {
        Parameters {
            instrument: "EUR_USD".to_string(),
            granularity: "M1".to_string(),
            granularity_secs: 60,
            span: 3,
            threshold: 0.001,
            profit_rate: 0.001,
            loss_rate: 0.001,
            max_spread: 0.0002,
            units: 100,
        }
    }

    #[test]
    fn test_valid_params() {
        assert!(sample_params().validate().is_ok());
    }

    #[test]
    fn test_zero_span_rejected() {
        let params = Parameters {
            span: 0,
            ..sample_params()
        };

        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("span"));
    }

    #[test]
    fn test_negative_rate_rejected() {
        let params = Parameters {
            loss_rate: -0.001,
            ..sample_params()
        };

        assert!(matches!(
            params.validate(),
            Err(ConfigError::Invalid {
                field: "loss_rate",
                ..
            })
        ));
    }

    #[test]
    fn test_load_settings_from_toml() {
        let path = std::env::temp_dir().join(format!("fxbot-settings-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"
[params]
instrument = "USD_JPY"
granularity = "M5"
granularity_secs = 300
span = 12
threshold = 0.002
profit_rate = 0.001
loss_rate = 0.001
max_spread = 0.008
units = 1000

[runtime]
initial_balance = 500000.0
"#,
        )
        .unwrap();

        let settings = load_settings(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.params.instrument, "USD_JPY");
        assert_eq!(settings.params.span, 12);
        assert_eq!(settings.runtime.history_cap, DEFAULT_HISTORY_CAP);
        assert_eq!(settings.runtime.notify_interval_secs, 14400);
        assert_eq!(settings.runtime.balance_file, PathBuf::from("./balance.json"));
        assert_eq!(settings.execution, ExecutionSettings::default());
    }

    #[test]
    fn test_execution_section_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("fxbot-settings-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"
[params]
instrument = "EUR_USD"
granularity = "M1"
granularity_secs = 60
span = 3
threshold = 0.001
profit_rate = 0.001
loss_rate = 0.001
max_spread = 0.0002
units = 100

[runtime]
initial_balance = 1000.0

[execution]
fill_timeout_ms = 3000
fill_poll_ms = 500
"#,
        )
        .unwrap();

        let settings = load_settings(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.execution.fill_timeout_ms, 3000);
        assert_eq!(settings.execution.fill_poll_ms, 500);
        assert_eq!(settings.execution.spread_wait_secs, 15);
    }
}
