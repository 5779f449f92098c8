use thiserror::Error;

/// Errors raised by the Modbus frame codec.
///
/// Build-time variants describe bad caller input; parse-time variants describe
/// a corrupted or unexpected reply. None of them are retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid register address {0}: registers are numbered from 1 to 65536")]
    InvalidAddress(u32),

    #[error("Unsupported function code: {0}")]
    InvalidFunctionCode(u8),

    #[error("Invalid register count {count} (allowed 1..={max})")]
    InvalidCount { count: usize, max: usize },

    #[error("Payload does not match function code {0}")]
    PayloadMismatch(u8),

    #[error("Truncated response: expected at least {expected} bytes, got {actual}")]
    TruncatedResponse { expected: usize, actual: usize },

    #[error("Malformed byte count {0} in read response")]
    MalformedByteCount(u8),
}

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Modbus codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Not logged in - run `powermeter login` first")]
    NotLoggedIn,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConsoleError {
    /// True when the server rejected the credential and the local session
    /// must be torn down.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ConsoleError::AuthRequired(_))
    }
}

impl From<reqwest::Error> for ConsoleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ConsoleError::Timeout
        } else if err.is_decode() {
            ConsoleError::SerializationError(format!("Response decode error: {}", err))
        } else {
            ConsoleError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(err: serde_json::Error) -> Self {
        ConsoleError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for ConsoleError {
    fn from(err: toml::de::Error) -> Self {
        ConsoleError::ConfigError(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for ConsoleError {
    fn from(err: toml::ser::Error) -> Self {
        ConsoleError::ConfigError(format!("TOML write error: {}", err))
    }
}

impl From<hex::FromHexError> for ConsoleError {
    fn from(err: hex::FromHexError) -> Self {
        ConsoleError::InvalidData(format!("Invalid hex string: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_converts_into_console_error() {
        let err: ConsoleError = CodecError::InvalidFunctionCode(5).into();
        assert!(matches!(err, ConsoleError::Codec(CodecError::InvalidFunctionCode(5))));
        assert_eq!(err.to_string(), "Modbus codec error: Unsupported function code: 5");
    }

    #[test]
    fn test_only_auth_required_is_auth_failure() {
        assert!(ConsoleError::AuthRequired("expired".into()).is_auth_failure());
        assert!(!ConsoleError::NotLoggedIn.is_auth_failure());
        assert!(!ConsoleError::Http { status: 403, message: "no".into() }.is_auth_failure());
    }
}
