pub mod commands;

use clap::{value_parser, Arg, ArgAction, Command};

pub use commands::{handle_subcommands, request_from_matches};

fn modbus_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("device")
                .long("device")
                .short('d')
                .help("Device (slave) address")
                .value_parser(value_parser!(u8))
                .default_value("1"),
        )
        .arg(
            Arg::new("function")
                .long("function")
                .short('f')
                .help("Function code: 3, 4, 6 or 16")
                .value_parser(value_parser!(u8))
                .default_value("3"),
        )
        .arg(
            Arg::new("register")
                .long("register")
                .short('r')
                .help("Register number, starting at 1")
                .value_parser(value_parser!(u32))
                .required(true),
        )
        .arg(
            Arg::new("count")
                .long("count")
                .short('c')
                .help("Number of registers to read")
                .value_parser(value_parser!(u16))
                .default_value("1")
                .conflicts_with_all(["value", "values"]),
        )
        .arg(
            Arg::new("value")
                .long("value")
                .help("Value for write single register (decimal or 0x hex)")
                .conflicts_with("values"),
        )
        .arg(
            Arg::new("values")
                .long("values")
                .help("Comma separated values for write multiple registers"),
        )
}

pub fn build_cli() -> Command {
    Command::new("powermeter")
        .version(crate::VERSION)
        .about("Operator console for the power meter API")
        .arg(
            Arg::new("config")
                .long("config")
                .help("Path to a TOML configuration file")
                .global(true),
        )
        .arg(
            Arg::new("api-url")
                .long("api-url")
                .help("Base URL of the power meter API")
                .global(true),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .help("Output format: console, html or json")
                .global(true),
        )
        .arg(
            Arg::new("session-file")
                .long("session-file")
                .help("Where the login session is kept")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(Command::new("status").about("Check whether the API server is reachable"))
        .subcommand(
            Command::new("login")
                .about("Log in and keep the session for later commands")
                .arg(Arg::new("username").long("username").short('u').required(true))
                .arg(
                    Arg::new("password")
                        .long("password")
                        .short('p')
                        .help("Password (prompted without echo when omitted)"),
                ),
        )
        .subcommand(Command::new("logout").about("End the current session"))
        .subcommand(Command::new("whoami").about("Validate the session and show the current user"))
        .subcommand(
            Command::new("change-password")
                .about("Change the current user's password")
                .arg(
                    Arg::new("old")
                        .long("old")
                        .help("Current password (prompted when omitted)"),
                )
                .arg(
                    Arg::new("new")
                        .long("new")
                        .help("New password (prompted when omitted)"),
                ),
        )
        .subcommand(Command::new("sessions").about("List active sessions (admin only)"))
        .subcommand(
            Command::new("power").about("Show power meter readings").arg(
                Arg::new("watch")
                    .long("watch")
                    .short('w')
                    .help("Keep refreshing until Ctrl-C")
                    .action(ArgAction::SetTrue),
            ),
        )
        .subcommand(
            Command::new("read-register")
                .about("Read a single register")
                .arg(
                    Arg::new("register")
                        .required(true)
                        .value_parser(value_parser!(u32)),
                ),
        )
        .subcommand(
            Command::new("read-registers")
                .about("Read a range of registers")
                .arg(
                    Arg::new("start")
                        .long("start")
                        .short('s')
                        .required(true)
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    Arg::new("count")
                        .long("count")
                        .short('c')
                        .default_value("1")
                        .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(modbus_args(
            Command::new("build").about("Build a Modbus command frame without sending it"),
        ))
        .subcommand(modbus_args(
            Command::new("send").about("Build a Modbus command, send it and parse the reply"),
        ))
        .subcommand(
            Command::new("parse")
                .about("Parse a raw Modbus reply")
                .arg(
                    Arg::new("hex")
                        .long("hex")
                        .help("Reply bytes, e.g. \"01 03 02 00 2A\"")
                        .required(true),
                )
                .arg(
                    Arg::new("start")
                        .long("start")
                        .short('s')
                        .help("Register number of the first value")
                        .default_value("1")
                        .value_parser(value_parser!(u32)),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Inspect or create the configuration file")
                .subcommand_required(true)
                .subcommand(Command::new("show").about("Print the effective configuration"))
                .subcommand(
                    Command::new("init")
                        .about("Write a default configuration file")
                        .arg(Arg::new("path").help("Target file (default powermeter.toml)"))
                        .arg(
                            Arg::new("force")
                                .long("force")
                                .action(ArgAction::SetTrue),
                        ),
                ),
        )
}
