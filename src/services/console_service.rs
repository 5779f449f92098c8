use log::{info, warn};
use std::time::Duration;

use crate::api::client::ApiClient;
use crate::auth::access::Operation;
use crate::auth::session::{SessionContext, SessionStore};
use crate::config::settings::Config;
use crate::modbus::client::send_request;
use crate::modbus::protocol::{build_command, parse_response, ModbusRequest};
use crate::output::formatters::{formatter_for, ResponseFormatter};
use crate::utils::error::ConsoleError;

/// Runs one operator action end to end: loads the session, calls the API,
/// tears the session down on 401, and renders the result.
pub struct ConsoleService {
    config: Config,
    client: ApiClient,
    store: SessionStore,
    formatter: Box<dyn ResponseFormatter>,
}

impl ConsoleService {
    pub fn new(config: Config) -> Result<Self, ConsoleError> {
        info!("🚀 Initializing console for {}", config.api.base_url);

        let client = ApiClient::new(&config.api)?;
        let store = SessionStore::new(&config.session.store_path);
        let formatter = formatter_for(config.display.format);

        Ok(Self {
            config,
            client,
            store,
            formatter,
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.config.display.refresh_interval_seconds)
    }

    fn current_session(&self) -> Result<SessionContext, ConsoleError> {
        let session = self.store.load()?.ok_or(ConsoleError::NotLoggedIn)?;
        if session.is_expired() {
            self.store.clear()?;
            return Err(ConsoleError::AuthRequired("Session expired".to_string()));
        }
        Ok(session)
    }

    /// Clears the stored session when the server rejected it.
    fn guard<T>(&self, result: Result<T, ConsoleError>) -> Result<T, ConsoleError> {
        if let Err(e) = &result {
            if e.is_auth_failure() {
                if let Err(clear_err) = self.store.clear() {
                    warn!("⚠️  Could not clear stored session: {}", clear_err);
                }
            }
        }
        result
    }

    pub async fn status(&self) -> String {
        let status = self.client.server_status().await;
        self.formatter.format_status(&status)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String, ConsoleError> {
        let session = self.client.login(username, password).await.map_err(|e| {
            warn!("❌ Failed login attempt for user '{}': {}", username, e);
            e
        })?;
        self.store.save(&session)?;
        Ok(self.formatter.format_session(&session))
    }

    /// Notifies the server (ignoring its answer) and clears the local session.
    pub async fn logout(&self) -> Result<String, ConsoleError> {
        let Some(session) = self.store.load()? else {
            return Ok(self.formatter.format_message("Not logged in"));
        };

        if let Err(e) = self.client.logout(&session).await {
            warn!("⚠️  Logout notification failed, clearing session anyway: {}", e);
        }
        self.store.clear()?;
        info!("👋 User '{}' logged out", session.username());
        Ok(self.formatter.format_message("Logged out successfully"))
    }

    /// Validates the stored session with the server, refreshing user and
    /// expiry.
    pub async fn whoami(&self) -> Result<String, ConsoleError> {
        let mut session = self.current_session()?;
        self.guard(self.client.validate(&mut session).await)?;
        self.store.save(&session)?;
        Ok(self.formatter.format_session(&session))
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<String, ConsoleError> {
        let session = self.current_session()?;
        session.access().check(Operation::ChangePassword)?;
        let message = self.guard(
            self.client
                .change_password(&session, old_password, new_password)
                .await,
        )?;
        Ok(self.formatter.format_message(&message))
    }

    pub async fn active_sessions(&self) -> Result<String, ConsoleError> {
        let session = self.current_session()?;
        session.access().check(Operation::ListSessions)?;
        let sessions = self.guard(self.client.active_sessions(&session).await)?;
        Ok(self.formatter.format_active_sessions(&sessions))
    }

    pub async fn power(&self) -> Result<String, ConsoleError> {
        let session = self.current_session()?;
        let data = self.guard(self.client.fetch_power(&session).await)?;
        Ok(self.formatter.format_power(&data))
    }

    pub async fn read_register(&self, register: u32) -> Result<String, ConsoleError> {
        let session = self.current_session()?;
        let reading = self.guard(self.client.read_register(&session, register).await)?;
        Ok(self.formatter.format_register(&reading))
    }

    pub async fn read_registers(&self, start: u32, count: usize) -> Result<String, ConsoleError> {
        let session = self.current_session()?;
        let range = self.guard(self.client.read_registers(&session, start, count).await)?;
        Ok(self
            .formatter
            .format_register_range(&range, self.config.display.highlight_register))
    }

    /// Builds a frame without sending it. Works offline; a stored read-only
    /// session is still honoured.
    pub fn build(&self, request: &ModbusRequest) -> Result<String, ConsoleError> {
        if let Some(session) = self.store.load()? {
            session.access().check(Operation::BuildCommand)?;
        }
        let command = build_command(request)?;
        Ok(self.formatter.format_command(&command))
    }

    pub async fn send(&self, request: &ModbusRequest) -> Result<String, ConsoleError> {
        let session = self.current_session()?;
        let exchange = self.guard(send_request(&self.client, &session, request).await)?;
        Ok(self.formatter.format_exchange(&exchange))
    }

    /// Parses a reply captured elsewhere.
    pub fn parse(&self, hex_frame: &str, start_register: u32) -> Result<String, ConsoleError> {
        let raw = decode_hex_frame(hex_frame)?;
        let response = parse_response(&raw, start_register)?;
        Ok(format!(
            "{}\n{}",
            self.formatter.format_raw(&raw),
            self.formatter.format_parsed(&response)
        ))
    }
}

/// Accepts `010304`, `01 03 04`, `0x01,0x03,0x04` and mixes of those.
pub fn decode_hex_frame(input: &str) -> Result<Vec<u8>, ConsoleError> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
        })
        .collect();
    Ok(hex::decode(digits)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::{Role, UserInfo};
    use crate::config::settings::OutputFormat;
    use crate::utils::error::CodecError;

    fn service(dir: &tempfile::TempDir) -> ConsoleService {
        let mut config = Config::default();
        config.session.store_path = dir.path().join("session.json");
        config.display.format = OutputFormat::Console;
        ConsoleService::new(config).unwrap()
    }

    fn viewer_session() -> SessionContext {
        SessionContext::new(
            "viewer-token-0001".to_string(),
            UserInfo {
                username: "viewer".to_string(),
                role: Role::Viewer,
                permissions: vec!["read".to_string()],
                last_login: None,
            },
            None,
        )
    }

    #[test]
    fn test_decode_hex_frame_formats() {
        assert_eq!(decode_hex_frame("010304").unwrap(), vec![1, 3, 4]);
        assert_eq!(decode_hex_frame("01 03 04").unwrap(), vec![1, 3, 4]);
        assert_eq!(decode_hex_frame("0x01,0x03, 0x2C").unwrap(), vec![1, 3, 0x2C]);
        assert!(matches!(decode_hex_frame("0g"), Err(ConsoleError::InvalidData(_))));
    }

    #[test]
    fn test_offline_parse_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);

        let text = service.parse("01 03 04 01 2C 00 05", 100).unwrap();
        assert!(text.contains("📥 Response: 01 03 04 01 2C 00 05"));
        assert!(text.contains("100        300"));

        let err = service.parse("01 63", 0).unwrap_err();
        assert!(matches!(
            err,
            ConsoleError::Codec(CodecError::TruncatedResponse { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_build_offline_and_read_only_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);
        let request = ModbusRequest::read_holding_registers(1, 100, 2);

        assert!(service.build(&request).unwrap().contains("01 03 00 63 00 02"));

        service.store().save(&viewer_session()).unwrap();
        assert!(matches!(
            service.build(&request),
            Err(ConsoleError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_commands_require_login() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);

        assert!(matches!(service.power().await, Err(ConsoleError::NotLoggedIn)));
        assert_eq!(service.logout().await.unwrap(), "Not logged in");
    }
}
