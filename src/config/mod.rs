pub mod settings;
pub mod config_commands;

pub use settings::{ApiConfig, Config, DisplayConfig, OutputFormat, SessionConfig};
pub use config_commands::{handle_config_commands, DEFAULT_CONFIG_PATH};
