use clap::ArgMatches;
use log::info;
use std::path::Path;

use crate::config::settings::Config;
use crate::utils::error::ConsoleError;

pub const DEFAULT_CONFIG_PATH: &str = "powermeter.toml";

/// Handles `config show` and `config init`. Returns the text to print.
pub fn handle_config_commands(matches: &ArgMatches, config: &Config) -> Result<String, ConsoleError> {
    if matches.subcommand_matches("show").is_some() {
        return handle_show_command(config);
    }

    if let Some(init_matches) = matches.subcommand_matches("init") {
        let path = init_matches
            .get_one::<String>("path")
            .map(String::as_str)
            .unwrap_or(DEFAULT_CONFIG_PATH);
        let force = init_matches.get_flag("force");
        return handle_init_command(Path::new(path), force);
    }

    Err(ConsoleError::ConfigError(
        "Unknown config command (expected show or init)".to_string(),
    ))
}

fn handle_show_command(config: &Config) -> Result<String, ConsoleError> {
    Ok(toml::to_string_pretty(config)?)
}

fn handle_init_command(path: &Path, force: bool) -> Result<String, ConsoleError> {
    if path.exists() && !force {
        return Err(ConsoleError::ConfigError(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    info!("📝 Writing default configuration to {}", path.display());
    Config::default().save_to_file(path)?;
    Ok(format!("✅ Default configuration written to {}", path.display()))
}
