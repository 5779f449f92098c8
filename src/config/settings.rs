use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::utils::error::ConsoleError;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_HIGHLIGHT_REGISTER: u32 = 44602;
const SESSION_FILE_NAME: &str = "powermeter_session.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Console,
    Html,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" | "text" => Ok(OutputFormat::Console),
            "html" => Ok(OutputFormat::Html),
            "json" => Ok(OutputFormat::Json),
            other => Err(ConsoleError::ConfigError(format!(
                "Unknown output format '{}' (expected console, html or json)",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Console => "console",
            OutputFormat::Html => "html",
            OutputFormat::Json => "json",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where the current session is kept between invocations.
    pub store_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub format: OutputFormat,
    /// Register emphasised in range tables.
    pub highlight_register: u32,
    pub refresh_interval_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            session: SessionConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_path: std::env::temp_dir().join(SESSION_FILE_NAME),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Console,
            highlight_register: DEFAULT_HIGHLIGHT_REGISTER,
            refresh_interval_seconds: 5,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConsoleError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConsoleError::ConfigError(format!(
                "Cannot read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;

        info!("⚙️  Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConsoleError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        info!("💾 Configuration written to {}", path.as_ref().display());
        Ok(())
    }

    /// Loads the file given with `--config`, or the defaults, then applies
    /// command line overrides.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConsoleError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => {
                debug!("⚙️  No configuration file given, using defaults");
                Self::default()
            }
        };
        config.apply_matches(matches)?;
        Ok(config)
    }

    pub fn apply_matches(&mut self, matches: &ArgMatches) -> Result<(), ConsoleError> {
        if let Some(url) = matches.get_one::<String>("api-url") {
            self.api.base_url = url.clone();
        }
        if let Some(format) = matches.get_one::<String>("format") {
            self.display.format = format.parse()?;
        }
        if let Some(path) = matches.get_one::<String>("session-file") {
            self.session.store_path = PathBuf::from(path);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConsoleError> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConsoleError::ConfigError(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            )));
        }
        if self.api.timeout_seconds == 0 {
            return Err(ConsoleError::ConfigError(
                "api.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.display.refresh_interval_seconds == 0 {
            return Err(ConsoleError::ConfigError(
                "display.refresh_interval_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
