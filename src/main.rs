use anyhow::Result;
use log::{debug, error};

use powermeter_console::cli::{build_cli, handle_subcommands};
use powermeter_console::config::{handle_config_commands, Config};
use powermeter_console::ConsoleService;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let config = Config::from_matches(&matches)?;
    debug!("⚙️  Effective configuration: {:?}", config);

    if let Some(config_matches) = matches.subcommand_matches("config") {
        println!("{}", handle_config_commands(config_matches, &config)?);
        return Ok(());
    }

    let service = ConsoleService::new(config)?;
    match handle_subcommands(&matches, &service).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            build_cli().print_help()?;
            Ok(())
        }
        Err(e) => {
            error!("❌ {}", e);
            Err(e.into())
        }
    }
}
