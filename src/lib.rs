//! Power Meter Operator Console Library
//!
//! Builds and parses Modbus register frames, and talks to the power meter
//! HTTP API on behalf of a logged-in operator: session handling, role based
//! access, register reads and raw command exchange, rendered as console
//! text, HTML or JSON.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use api::{ApiClient, ServerStatus};
pub use auth::{AccessPolicy, Role, SessionContext, SessionStore};
pub use config::{Config, OutputFormat};
pub use modbus::{build_command, parse_response, ModbusCommand, ModbusRequest, ModbusResponse};
pub use output::{ConsoleFormatter, HtmlFormatter, JsonFormatter, ResponseFormatter};
pub use services::ConsoleService;
pub use utils::error::{CodecError, ConsoleError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
