//! Frontend configuration and the per-request render context.
//!
//! Configuration is loaded once (from `trigmap.toml` or defaults) and carried
//! into every map/query operation through [`RenderContext`], so nothing in
//! the core re-reads configuration while iterating elements.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "trigmap.toml";
pub const DEFAULT_BLINK_PERIOD_SECS: i64 = 1800;
pub const DEFAULT_OK_PERIOD_SECS: i64 = 1800;
pub const DEFAULT_SEARCH_LIMIT: usize = 1000;
pub const UNRESOLVED_MACRO_STRING: &str = "*UNKNOWN*";

/// Named colours used for status lines and link overrides (hex RGB).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub red: String,
    pub dark_red: String,
    pub dark_green: String,
    pub orange: String,
    pub black: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            red: "FF0000".to_string(),
            dark_red: "960000".to_string(),
            dark_green: "009600".to_string(),
            orange: "EE6000".to_string(),
            black: "000000".to_string(),
        }
    }
}

impl Palette {
    fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("red", &self.red),
            ("dark_red", &self.dark_red),
            ("dark_green", &self.dark_green),
            ("orange", &self.orange),
            ("black", &self.black),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Window in which a changed trigger marks its element "lately changed".
    pub blink_period_secs: i64,
    /// How long a recovered trigger still counts for `only_true` queries.
    pub ok_period_secs: i64,
    pub event_ack_enable: bool,
    pub search_limit: usize,
    pub unresolved_marker: String,
    pub palette: Palette,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            blink_period_secs: DEFAULT_BLINK_PERIOD_SECS,
            ok_period_secs: DEFAULT_OK_PERIOD_SECS,
            event_ack_enable: true,
            search_limit: DEFAULT_SEARCH_LIMIT,
            unresolved_marker: UNRESOLVED_MACRO_STRING.to_string(),
            palette: Palette::default(),
        }
    }
}

impl FrontendConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: FrontendConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Load `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blink_period_secs < 0 {
            return Err(ConfigError::Invalid(format!(
                "blink_period_secs must be >= 0, got {}",
                self.blink_period_secs
            )));
        }
        if self.ok_period_secs < 0 {
            return Err(ConfigError::Invalid(format!(
                "ok_period_secs must be >= 0, got {}",
                self.ok_period_secs
            )));
        }
        for (name, value) in self.palette.entries() {
            if value.len() != 6 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::Invalid(format!(
                    "palette.{name} must be a 6-digit hex colour, got `{value}`"
                )));
            }
        }
        Ok(())
    }
}

/// Everything a single request needs besides the store: configuration and
/// the clock it is evaluated at.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub config: FrontendConfig,
    pub now: i64,
}

impl RenderContext {
    pub fn new(config: FrontendConfig, now: i64) -> Self {
        Self { config, now }
    }

    pub fn palette(&self) -> &Palette {
        &self.config.palette
    }

    pub fn unresolved_marker(&self) -> &str {
        &self.config.unresolved_marker
    }
}
