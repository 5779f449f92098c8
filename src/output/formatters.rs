use chrono::{DateTime, Local};
use serde_json::{json, Value};

use crate::api::models::{PowerData, RegisterRange, RegisterReading, ServerStatus, SessionsResponse};
use crate::auth::session::SessionContext;
use crate::config::settings::OutputFormat;
use crate::modbus::client::CommandExchange;
use crate::modbus::protocol::{ModbusCommand, ModbusResponse, ParsedResult};
use crate::utils::error::CodecError;

/// Turns structured results into display text. Formatters never parse; they
/// only lay out what the codec and the API already produced.
pub trait ResponseFormatter: Send + Sync {
    fn format_command(&self, command: &ModbusCommand) -> String;
    fn format_parsed(&self, response: &ModbusResponse) -> String;
    fn format_parse_error(&self, raw: &[u8], error: &CodecError) -> String;
    fn format_register(&self, reading: &RegisterReading) -> String;
    fn format_register_range(&self, range: &RegisterRange, highlight: u32) -> String;
    fn format_power(&self, data: &PowerData) -> String;
    fn format_session(&self, session: &SessionContext) -> String;
    fn format_active_sessions(&self, sessions: &SessionsResponse) -> String;
    fn format_status(&self, status: &ServerStatus) -> String;
    fn format_message(&self, message: &str) -> String;

    fn format_raw(&self, raw: &[u8]) -> String {
        hex_bytes(raw)
    }

    fn format_exchange(&self, exchange: &CommandExchange) -> String {
        let parsed = match &exchange.parsed {
            Ok(response) => self.format_parsed(response),
            Err(error) => self.format_parse_error(&exchange.reply, error),
        };
        format!(
            "{}\n{}\n{}",
            self.format_command(&exchange.command),
            self.format_raw(&exchange.reply),
            parsed
        )
    }
}

pub fn formatter_for(format: OutputFormat) -> Box<dyn ResponseFormatter> {
    match format {
        OutputFormat::Console => Box::new(ConsoleFormatter),
        OutputFormat::Html => Box::new(HtmlFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Uppercase, space separated: `01 03 04`.
pub fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn word_hex(value: u32) -> String {
    format!("0x{:04X}", value)
}

fn short_hex(value: u32) -> String {
    format!("0x{:X}", value)
}

/// Server hex when it sent one, otherwise computed.
fn reading_hex(reading: &RegisterReading) -> String {
    reading
        .hex_value
        .clone()
        .unwrap_or_else(|| short_hex(reading.value))
}

fn format_timestamp(timestamp: f64) -> String {
    let secs = timestamp.trunc() as i64;
    let nanos = (timestamp.fract().abs() * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos)
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "--".to_string())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn unknown_text(response: &ModbusResponse, function_code: u8) -> String {
    match response.exception_code() {
        Some(exception) => format!(
            "Unknown or error function code: {} (exception: {})",
            function_code,
            exception.description()
        ),
        None => format!("Unknown or error function code: {}", function_code),
    }
}

pub struct ConsoleFormatter;

impl ResponseFormatter for ConsoleFormatter {
    fn format_command(&self, command: &ModbusCommand) -> String {
        format!(
            "📤 Command: {}\n   Register: {}, Modbus Address: {} ({})\n   High Byte: {}, Low Byte: {}",
            hex_bytes(&command.bytes),
            command.original_address,
            command.wire_address,
            command.hex_address(),
            command.high_byte,
            command.low_byte
        )
    }

    fn format_raw(&self, raw: &[u8]) -> String {
        format!("📥 Response: {}", hex_bytes(raw))
    }

    fn format_parsed(&self, response: &ModbusResponse) -> String {
        match &response.result {
            ParsedResult::ReadRegisters {
                byte_count,
                registers,
            } => {
                let mut output = format!(
                    "Device: {}, Function: {}, Byte Count: {}\n",
                    response.device_address, response.function_code, byte_count
                );
                output.push_str(&format!("{:<10} {:<12} {}\n", "Register", "Value (Dec)", "Value (Hex)"));
                for register in registers {
                    output.push_str(&format!(
                        "{:<10} {:<12} {}\n",
                        register.address,
                        register.value,
                        word_hex(u32::from(register.value))
                    ));
                }
                output
            }
            ParsedResult::WriteSingle { address, value } => format!(
                "Device: {}, Function: {}\nRegister Address: {}, Value: {} ({})",
                response.device_address,
                response.function_code,
                address,
                value,
                short_hex(u32::from(*value))
            ),
            ParsedResult::WriteMultiple { address, count } => format!(
                "Device: {}, Function: {}\nStarting Address: {}, Registers Written: {}",
                response.device_address, response.function_code, address, count
            ),
            ParsedResult::Unknown { function_code } => unknown_text(response, *function_code),
        }
    }

    fn format_parse_error(&self, _raw: &[u8], error: &CodecError) -> String {
        format!("❌ Error parsing response: {}", error)
    }

    fn format_register(&self, reading: &RegisterReading) -> String {
        format!(
            "🔹 Register {}\n   Value: {} ({})\n   Modbus Address: {}\n   Read at: {}",
            reading.register,
            reading.value,
            reading_hex(reading),
            reading.modbus_address,
            format_timestamp(reading.timestamp)
        )
    }

    fn format_register_range(&self, range: &RegisterRange, highlight: u32) -> String {
        let mut output = format!(
            "📊 Registers {} - {} ({} values)\n",
            range.start_register,
            range
                .start_register
                .saturating_add(range.values.len().saturating_sub(1) as u32),
            range.values.len()
        );
        output.push_str(&format!("  {:<10} {:<12} {}\n", "Register", "Value", "Hex"));
        for (register, value) in range.labelled() {
            let marker = if register == highlight { "▶" } else { " " };
            output.push_str(&format!(
                "{} {:<10} {:<12} {}\n",
                marker,
                register,
                value,
                short_hex(value)
            ));
        }
        output
    }

    fn format_power(&self, data: &PowerData) -> String {
        let mut output = format!(
            "⚡ Power Meter Data - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        output.push_str(&"═".repeat(40));
        output.push('\n');
        for (name, value) in &data.readings {
            output.push_str(&format!("{}: {}\n", name, value_text(value)));
        }
        if let (Some(user), Some(role)) = (&data.user, &data.role) {
            output.push_str(&format!("(viewed by {} [{}])\n", user, role));
        }
        output
    }

    fn format_session(&self, session: &SessionContext) -> String {
        let mut output = format!("👤 User: {} ({})", session.username(), session.role());
        if !session.user.permissions.is_empty() {
            output.push_str(&format!("\n   Permissions: {}", session.user.permissions.join(", ")));
        }
        if let Some(expires) = session.expires_at {
            output.push_str(&format!("\n   Session expires: {}", expires.format("%Y-%m-%d %H:%M:%S")));
        }
        if let Some(warning) = session.access().warning() {
            output.push_str(&format!("\n⚠️  WARNING: {}", warning));
        }
        output
    }

    fn format_active_sessions(&self, sessions: &SessionsResponse) -> String {
        let mut output = format!("🔑 Active sessions: {}\n", sessions.count);
        for (token, session) in &sessions.sessions {
            output.push_str(&format!(
                "  {}... {} ({}) last seen {}, expires {}\n",
                token.get(..8).unwrap_or(token.as_str()),
                session.user.username,
                session.user.role,
                session.last_accessed.format("%Y-%m-%d %H:%M:%S"),
                session.expires_at.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        output
    }

    fn format_status(&self, status: &ServerStatus) -> String {
        let dot = match status {
            ServerStatus::Unreachable(_) => "🔴",
            _ => "🟢",
        };
        match status {
            ServerStatus::Unreachable(detail) => format!(
                "{} {}\n   {} ({})",
                dot,
                status.headline(),
                status.description(),
                detail
            ),
            _ => format!("{} {}\n   {}", dot, status.headline(), status.description()),
        }
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// Markup fragments matching the dashboard's tables and banners.
pub struct HtmlFormatter;

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl ResponseFormatter for HtmlFormatter {
    fn format_command(&self, command: &ModbusCommand) -> String {
        format!(
            "<pre id=\"modbusCommand\">{}</pre>\n<div class=\"register-note\">\
             <p><small>Register: {}, Modbus Address: {} ({})</small></p>\
             <p><small>High Byte: {}, Low Byte: {}</small></p></div>",
            hex_bytes(&command.bytes),
            command.original_address,
            command.wire_address,
            command.hex_address(),
            command.high_byte,
            command.low_byte
        )
    }

    fn format_raw(&self, raw: &[u8]) -> String {
        format!("<pre id=\"modbusResponse\">{}</pre>", hex_bytes(raw))
    }

    fn format_parsed(&self, response: &ModbusResponse) -> String {
        match &response.result {
            ParsedResult::ReadRegisters {
                byte_count,
                registers,
            } => {
                let mut html = format!(
                    "<p>Device: {}, Function: {}, Byte Count: {}</p>",
                    response.device_address, response.function_code, byte_count
                );
                html.push_str("<table><thead><tr><th>Register</th><th>Value (Dec)</th><th>Value (Hex)</th></tr></thead><tbody>");
                for register in registers {
                    html.push_str(&format!(
                        "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                        register.address,
                        register.value,
                        word_hex(u32::from(register.value))
                    ));
                }
                html.push_str("</tbody></table>");
                html
            }
            ParsedResult::WriteSingle { address, value } => format!(
                "<p>Device: {}, Function: {}</p><p>Register Address: {}, Value: {} ({})</p>",
                response.device_address,
                response.function_code,
                address,
                value,
                short_hex(u32::from(*value))
            ),
            ParsedResult::WriteMultiple { address, count } => format!(
                "<p>Device: {}, Function: {}</p><p>Starting Address: {}, Registers Written: {}</p>",
                response.device_address, response.function_code, address, count
            ),
            ParsedResult::Unknown { function_code } => {
                format!("<p>{}</p>", escape_html(&unknown_text(response, *function_code)))
            }
        }
    }

    fn format_parse_error(&self, _raw: &[u8], error: &CodecError) -> String {
        format!(
            "<p class=\"error\">Error parsing response: {}</p>",
            escape_html(&error.to_string())
        )
    }

    fn format_register(&self, reading: &RegisterReading) -> String {
        format!(
            "<dl class=\"register\"><dt>Register</dt><dd id=\"registerNumber\">{}</dd>\
             <dt>Value</dt><dd id=\"registerValue\">{} ({})</dd>\
             <dt>Timestamp</dt><dd id=\"registerTimestamp\">{}</dd></dl>",
            reading.register,
            reading.value,
            escape_html(&reading_hex(reading)),
            format_timestamp(reading.timestamp)
        )
    }

    fn format_register_range(&self, range: &RegisterRange, highlight: u32) -> String {
        let mut html = String::from("<table><thead><tr><th>Register</th><th>Value</th><th>Hex</th></tr></thead><tbody id=\"registerTableBody\">");
        for (register, value) in range.labelled() {
            let class = if register == highlight {
                " class=\"highlighted\""
            } else {
                ""
            };
            html.push_str(&format!(
                "<tr{}><td>{}</td><td>{}</td><td>{}</td></tr>",
                class,
                register,
                value,
                short_hex(value)
            ));
        }
        html.push_str("</tbody></table>");
        html
    }

    fn format_power(&self, data: &PowerData) -> String {
        let mut html = String::from("<table class=\"power-data\"><tbody>");
        for (name, value) in &data.readings {
            html.push_str(&format!(
                "<tr><th>{}</th><td>{}</td></tr>",
                escape_html(name),
                escape_html(&value_text(value))
            ));
        }
        html.push_str("</tbody></table>");
        html
    }

    fn format_session(&self, session: &SessionContext) -> String {
        let mut html = format!(
            "<div id=\"authHeader\"><div><h1>Power Monitor Dashboard</h1>\
             <small>Real-time power monitoring system</small></div>\
             <div class=\"user-badge\">User: {} ({})</div></div>",
            escape_html(session.username()),
            escape_html(session.role().as_str())
        );
        if let Some(warning) = session.access().warning() {
            html.push_str(&format!(
                "\n<div class=\"role-warning\"><span>WARNING:</span><span>{}</span></div>",
                warning
            ));
        }
        html
    }

    fn format_active_sessions(&self, sessions: &SessionsResponse) -> String {
        let mut html = format!(
            "<p>Active sessions: {}</p><table><thead><tr><th>User</th><th>Role</th><th>Last accessed</th><th>Expires</th></tr></thead><tbody>",
            sessions.count
        );
        for session in sessions.sessions.values() {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&session.user.username),
                escape_html(session.user.role.as_str()),
                session.last_accessed.format("%Y-%m-%d %H:%M:%S"),
                session.expires_at.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        html.push_str("</tbody></table>");
        html
    }

    fn format_status(&self, status: &ServerStatus) -> String {
        let class = match status {
            ServerStatus::Unreachable(_) => "status-dot error",
            _ => "status-dot connected",
        };
        format!(
            "<div class=\"status\"><span class=\"{}\"></span><span id=\"statusText\">{}</span>\
             <p id=\"deviceInfo\">{}</p></div>",
            class,
            status.headline(),
            status.description()
        )
    }

    fn format_message(&self, message: &str) -> String {
        format!("<p>{}</p>", escape_html(message))
    }
}

pub struct JsonFormatter;

impl JsonFormatter {
    fn render(value: Value) -> String {
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }

    fn parsed_value(response: &ModbusResponse) -> Value {
        let mut value = serde_json::to_value(response).unwrap_or(Value::Null);
        if let (Some(exception), Value::Object(map)) = (response.exception_code(), &mut value) {
            map.insert("exception".to_string(), json!(exception.description()));
        }
        value
    }
}

impl ResponseFormatter for JsonFormatter {
    fn format_command(&self, command: &ModbusCommand) -> String {
        let mut value = serde_json::to_value(command).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("hex_address".to_string(), json!(command.hex_address()));
        }
        Self::render(value)
    }

    fn format_raw(&self, raw: &[u8]) -> String {
        Self::render(json!({ "response": raw, "response_hex": hex::encode(raw) }))
    }

    fn format_parsed(&self, response: &ModbusResponse) -> String {
        Self::render(Self::parsed_value(response))
    }

    fn format_parse_error(&self, raw: &[u8], error: &CodecError) -> String {
        Self::render(json!({
            "response": raw,
            "error": error.to_string(),
        }))
    }

    fn format_exchange(&self, exchange: &CommandExchange) -> String {
        let parsed = match &exchange.parsed {
            Ok(response) => json!({ "result": Self::parsed_value(response) }),
            Err(error) => json!({ "error": error.to_string() }),
        };
        Self::render(json!({
            "command": exchange.command,
            "response": exchange.reply,
            "response_hex": hex::encode(&exchange.reply),
            "parsed": parsed,
        }))
    }

    fn format_register(&self, reading: &RegisterReading) -> String {
        Self::render(serde_json::to_value(reading).unwrap_or(Value::Null))
    }

    fn format_register_range(&self, range: &RegisterRange, highlight: u32) -> String {
        let registers: Vec<Value> = range
            .labelled()
            .map(|(register, value)| {
                json!({
                    "register": register,
                    "value": value,
                    "hex": short_hex(value),
                    "highlighted": register == highlight,
                })
            })
            .collect();
        Self::render(json!({
            "start_register": range.start_register,
            "count": range.values.len(),
            "timestamp": range.timestamp,
            "registers": registers,
        }))
    }

    fn format_power(&self, data: &PowerData) -> String {
        Self::render(serde_json::to_value(data).unwrap_or(Value::Null))
    }

    fn format_session(&self, session: &SessionContext) -> String {
        let access = session.access();
        Self::render(json!({
            "user": session.user,
            "expires_at": session.expires_at,
            "read_only": access.is_read_only(),
            "admin": access.is_admin(),
            "allowed_functions": access.allowed_functions(),
        }))
    }

    fn format_active_sessions(&self, sessions: &SessionsResponse) -> String {
        let entries: Vec<Value> = sessions
            .sessions
            .values()
            .map(|session| {
                json!({
                    "user": session.user,
                    "created_at": session.created_at,
                    "expires_at": session.expires_at,
                    "last_accessed": session.last_accessed,
                })
            })
            .collect();
        Self::render(json!({ "count": sessions.count, "sessions": entries }))
    }

    fn format_status(&self, status: &ServerStatus) -> String {
        Self::render(json!({
            "status": status,
            "headline": status.headline(),
            "description": status.description(),
        }))
    }

    fn format_message(&self, message: &str) -> String {
        Self::render(json!({ "message": message }))
    }
}
