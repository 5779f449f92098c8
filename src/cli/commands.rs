use clap::ArgMatches;
use log::{info, warn};

use crate::modbus::protocol::{ModbusRequest, RequestData};
use crate::services::ConsoleService;
use crate::utils::error::ConsoleError;

/// Runs the selected subcommand and prints its output. Returns `false` when
/// no known subcommand was given.
pub async fn handle_subcommands(
    matches: &ArgMatches,
    service: &ConsoleService,
) -> Result<bool, ConsoleError> {
    if matches.subcommand_matches("status").is_some() {
        info!("🔌 Checking server status...");
        println!("{}", service.status().await);
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("login") {
        let username = required_str(matches, "username")?;
        let password = secret_or_prompt(matches, "password", "Password: ")?;

        info!("🔐 Logging in as '{}'...", username);
        println!("{}", service.login(username, &password).await?);
        return Ok(true);
    }

    if matches.subcommand_matches("logout").is_some() {
        println!("{}", service.logout().await?);
        return Ok(true);
    }

    if matches.subcommand_matches("whoami").is_some() {
        println!("{}", service.whoami().await?);
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("change-password") {
        let old_password = secret_or_prompt(matches, "old", "Current password: ")?;
        let new_password = secret_or_prompt(matches, "new", "New password: ")?;
        println!("{}", service.change_password(&old_password, &new_password).await?);
        return Ok(true);
    }

    if matches.subcommand_matches("sessions").is_some() {
        println!("{}", service.active_sessions().await?);
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("power") {
        if matches.get_flag("watch") {
            watch_power(service).await?;
        } else {
            println!("{}", service.power().await?);
        }
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("read-register") {
        let register = *matches
            .get_one::<u32>("register")
            .ok_or_else(|| missing("register"))?;

        info!("📖 Reading register {}...", register);
        println!("{}", service.read_register(register).await?);
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("read-registers") {
        let start = *matches.get_one::<u32>("start").ok_or_else(|| missing("start"))?;
        let count = matches.get_one::<usize>("count").copied().unwrap_or(1);

        info!("📖 Reading {} registers from {}...", count, start);
        println!("{}", service.read_registers(start, count).await?);
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("build") {
        let request = request_from_matches(matches)?;
        println!("{}", service.build(&request)?);
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("send") {
        let request = request_from_matches(matches)?;

        info!(
            "📤 Sending function {} to device {} register {}...",
            request.function_code, request.device_address, request.register_address
        );
        println!("{}", service.send(&request).await?);
        return Ok(true);
    }

    if let Some(matches) = matches.subcommand_matches("parse") {
        let hex = required_str(matches, "hex")?;
        let start = matches.get_one::<u32>("start").copied().unwrap_or(1);
        println!("{}", service.parse(hex, start)?);
        return Ok(true);
    }

    Ok(false)
}

/// Reads the `build`/`send` arguments into a request. The payload is picked
/// from whichever of `--values`, `--value` or `--count` was given; the codec
/// decides whether it fits the function code.
pub fn request_from_matches(matches: &ArgMatches) -> Result<ModbusRequest, ConsoleError> {
    let device = matches.get_one::<u8>("device").copied().unwrap_or(1);
    let function = matches.get_one::<u8>("function").copied().unwrap_or(3);
    let register = *matches
        .get_one::<u32>("register")
        .ok_or_else(|| missing("register"))?;

    let data = if let Some(values) = matches.get_one::<String>("values") {
        let values = values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(parse_register_value)
            .collect::<Result<Vec<_>, _>>()?;
        RequestData::Values(values)
    } else if let Some(value) = matches.get_one::<String>("value") {
        RequestData::Value(parse_register_value(value)?)
    } else {
        RequestData::Count(matches.get_one::<u16>("count").copied().unwrap_or(1))
    };

    Ok(ModbusRequest::new(device, function, register, data))
}

/// Decimal or `0x` prefixed hex.
fn parse_register_value(input: &str) -> Result<u16, ConsoleError> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => input.parse::<u16>(),
    };
    parsed.map_err(|_| {
        ConsoleError::InvalidData(format!(
            "'{}' is not a register value (0-65535 or 0x0000-0xFFFF)",
            input
        ))
    })
}

/// Refreshes power data every `refresh_interval_seconds` until Ctrl-C.
/// A missing or rejected session ends the watch; other failures are logged.
async fn watch_power(service: &ConsoleService) -> Result<(), ConsoleError> {
    let period = service.refresh_interval();
    info!("👀 Watching power readings every {}s, press Ctrl-C to stop", period.as_secs());

    // One listener for the whole watch, also raced against slow fetches.
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => break,
        }

        tokio::select! {
            result = service.power() => match result {
                Ok(text) => println!("{}", text),
                Err(e) if ends_watch(&e) => return Err(e),
                Err(e) => warn!("⚠️  Refresh failed: {}", e),
            },
            _ = &mut shutdown => break,
        }
    }

    info!("🛑 Stopping watch");
    Ok(())
}

fn ends_watch(error: &ConsoleError) -> bool {
    error.is_auth_failure() || matches!(error, ConsoleError::NotLoggedIn)
}

/// Takes a secret from its flag, or asks for it on the terminal without echo.
fn secret_or_prompt(matches: &ArgMatches, id: &str, prompt: &str) -> Result<String, ConsoleError> {
    match matches.get_one::<String>(id) {
        Some(value) => Ok(value.clone()),
        None => Ok(rpassword::prompt_password(prompt)?),
    }
}

fn required_str<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str, ConsoleError> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| missing(id))
}

fn missing(id: &str) -> ConsoleError {
    ConsoleError::InvalidData(format!("Missing argument '{}'", id))
}
