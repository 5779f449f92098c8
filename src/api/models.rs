use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::auth::session::{SessionContext, UserInfo};

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ChangePasswordRequest<'a> {
    pub old_password: &'a str,
    pub new_password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
    #[serde(default)]
    pub expires_at: Option<NaiveDateTime>,
}

impl From<LoginResponse> for SessionContext {
    fn from(response: LoginResponse) -> Self {
        SessionContext::new(response.token, response.user, response.expires_at)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default)]
    pub user: Option<UserInfo>,
    #[serde(default)]
    pub expires_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error body the API sends with non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSession {
    pub token: String,
    pub user: UserInfo,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub last_accessed: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: BTreeMap<String, ActiveSession>,
    pub count: usize,
}

/// Dashboard payload. Meter readings are whatever the server's data
/// manager publishes, so they are kept as a JSON map (sorted by key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerData {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub readings: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReading {
    pub register: u32,
    pub modbus_address: u32,
    #[serde(default)]
    pub modbus_address_hex: Option<String>,
    pub value: u32,
    #[serde(default)]
    pub hex_value: Option<String>,
    pub timestamp: f64,
    #[serde(default)]
    pub read_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRange {
    pub start_register: u32,
    pub modbus_start: u32,
    pub count: usize,
    pub values: Vec<u32>,
    #[serde(default)]
    pub hex_values: Vec<String>,
    pub timestamp: f64,
    #[serde(default)]
    pub read_by: Option<String>,
}

impl RegisterRange {
    /// Register labels paired with their values, in order.
    pub fn labelled(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.values
            .iter()
            .zip(0u32..)
            .map(|(value, index)| (self.start_register.saturating_add(index), *value))
    }
}

/// Reply of the raw-command endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply {
    pub command: Vec<u8>,
    pub command_hex: String,
    pub response: Vec<u8>,
    pub response_hex: String,
    #[serde(default)]
    pub parsed: Value,
    pub timestamp: f64,
    #[serde(default)]
    pub executed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ServerStatus {
    /// Server answered and requires authentication.
    Ready,
    /// Server answered without asking for credentials.
    Open,
    Unreachable(String),
}

impl ServerStatus {
    pub fn headline(&self) -> &'static str {
        match self {
            ServerStatus::Ready => "Server Ready",
            ServerStatus::Open => "Server Connected",
            ServerStatus::Unreachable(_) => "Connection Error",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ServerStatus::Ready => "Power meter API server is running",
            ServerStatus::Open => "Power meter server accessible",
            ServerStatus::Unreachable(_) => "Cannot connect to power meter server",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::Role;

    #[test]
    fn test_power_data_separates_readings() {
        let json = r#"{"voltage": 230.1, "current": 4.2, "authenticated": true, "user": "admin", "role": "admin", "scalar": 7}"#;
        let data: PowerData = serde_json::from_str(json).unwrap();
        assert!(data.authenticated);
        assert_eq!(data.user.as_deref(), Some("admin"));
        let keys: Vec<&String> = data.readings.keys().collect();
        assert_eq!(keys, vec!["current", "scalar", "voltage"]);
    }

    #[test]
    fn test_login_response_becomes_session() {
        let json = r#"{"token":"f00dfeed","user":{"username":"viewer","role":"viewer","permissions":["read"],"last_login":null},"expires_at":"2024-05-01T16:00:00.000001"}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        let session = SessionContext::from(response);
        assert_eq!(session.token(), "f00dfeed");
        assert_eq!(session.role(), &Role::Viewer);
        assert!(session.expires_at.is_some());
    }

    #[test]
    fn test_register_range_labels() {
        let range = RegisterRange {
            start_register: 44601,
            modbus_start: 4600,
            count: 3,
            values: vec![1, 2, 3],
            hex_values: Vec::new(),
            timestamp: 0.0,
            read_by: None,
        };
        let labelled: Vec<(u32, u32)> = range.labelled().collect();
        assert_eq!(labelled, vec![(44601, 1), (44602, 2), (44603, 3)]);
    }
}
