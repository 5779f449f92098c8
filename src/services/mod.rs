pub mod console_service;

pub use console_service::{decode_hex_frame, ConsoleService};
