pub mod formatters;

pub use formatters::{
    formatter_for, hex_bytes, ConsoleFormatter, HtmlFormatter, JsonFormatter, ResponseFormatter,
};
