pub mod error;

pub use error::{CodecError, ConsoleError};
