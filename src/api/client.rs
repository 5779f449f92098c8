use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::api::models::{
    ChangePasswordRequest, CommandReply, ErrorBody, LoginRequest, LoginResponse, MessageResponse,
    PowerData, RegisterRange, RegisterReading, ServerStatus, SessionsResponse, ValidateResponse,
};
use crate::auth::session::SessionContext;
use crate::config::settings::ApiConfig;
use crate::modbus::client::ModbusGateway;
use crate::modbus::protocol::MAX_READ_REGISTERS;
use crate::utils::error::ConsoleError;

/// HTTP client for the power meter API.
///
/// Every authenticated call goes through [`ApiClient::authorize`] and
/// [`ApiClient::execute`]; nothing else touches credentials or status codes.
/// Each call is a single attempt.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ConsoleError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(|e| ConsoleError::ConfigError(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attaches the session credential to an outgoing request.
    pub fn authorize(&self, request: RequestBuilder, session: &SessionContext) -> RequestBuilder {
        request.bearer_auth(session.token())
    }

    /// Sends a request and classifies the status: 401 becomes
    /// `AuthRequired`, any other failure becomes `Http`.
    async fn execute(&self, request: RequestBuilder) -> Result<Response, ConsoleError> {
        let response = request.send().await.map_err(|e| {
            error!("❌ Request to {} failed: {}", self.base_url, e);
            ConsoleError::from(e)
        })?;

        let status = response.status();
        debug!("📨 {} -> {}", response.url().path(), status);

        if status == StatusCode::UNAUTHORIZED {
            let message = error_message(response)
                .await
                .unwrap_or_else(|| "Authentication required".to_string());
            warn!("🔒 Server rejected credentials: {}", message);
            return Err(ConsoleError::AuthRequired(message));
        }

        if !status.is_success() {
            let message = error_message(response)
                .await
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());
            return Err(ConsoleError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        session: &SessionContext,
    ) -> Result<T, ConsoleError> {
        let request = self.authorize(self.http.get(self.url(path)), session);
        let response = self.execute(request).await?;
        Ok(response.json::<T>().await?)
    }

    /// Probes the API without credentials: a 401 means the server is up and
    /// guarding its data.
    pub async fn server_status(&self) -> ServerStatus {
        match self.http.get(self.url("/power")).send().await {
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => ServerStatus::Ready,
            Ok(response) if response.status().is_success() => ServerStatus::Open,
            Ok(response) => ServerStatus::Unreachable(format!("HTTP {}", response.status().as_u16())),
            Err(e) => {
                error!("❌ System status check failed: {}", e);
                ServerStatus::Unreachable(e.to_string())
            }
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<SessionContext, ConsoleError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ConsoleError::InvalidData(
                "Username and password required".to_string(),
            ));
        }

        info!("🔐 Logging in as '{}'", username);
        let request = self
            .http
            .post(self.url("/auth/login"))
            .json(&LoginRequest { username, password });
        let response: LoginResponse = self.execute(request).await?.json().await?;
        let session = SessionContext::from(response);

        info!(
            "✅ Logged in as '{}' ({}), session {}...",
            session.username(),
            session.role(),
            session.token_prefix()
        );
        Ok(session)
    }

    /// Re-validates the session with the server and refreshes it in place.
    pub async fn validate(&self, session: &mut SessionContext) -> Result<(), ConsoleError> {
        let response: ValidateResponse = self.get_json("/auth/validate", session).await?;

        match (response.valid, response.user) {
            (true, Some(user)) => {
                session.refresh(user, response.expires_at);
                Ok(())
            }
            _ => Err(ConsoleError::AuthRequired(
                response
                    .error
                    .unwrap_or_else(|| "Invalid or expired session".to_string()),
            )),
        }
    }

    pub async fn logout(&self, session: &SessionContext) -> Result<String, ConsoleError> {
        let request = self.authorize(self.http.post(self.url("/auth/logout")), session);
        let response: MessageResponse = self.execute(request).await?.json().await?;
        info!("👋 Session {}... closed on server", session.token_prefix());
        Ok(response.message)
    }

    pub async fn change_password(
        &self,
        session: &SessionContext,
        old_password: &str,
        new_password: &str,
    ) -> Result<String, ConsoleError> {
        if old_password.is_empty() || new_password.is_empty() {
            return Err(ConsoleError::InvalidData(
                "Old and new passwords required".to_string(),
            ));
        }

        let request = self
            .authorize(self.http.post(self.url("/auth/change_password")), session)
            .json(&ChangePasswordRequest {
                old_password,
                new_password,
            });
        let response: MessageResponse = self.execute(request).await?.json().await?;
        Ok(response.message)
    }

    pub async fn active_sessions(&self, session: &SessionContext) -> Result<SessionsResponse, ConsoleError> {
        self.get_json("/auth/sessions", session).await
    }

    pub async fn fetch_power(&self, session: &SessionContext) -> Result<PowerData, ConsoleError> {
        self.get_json("/power", session).await
    }

    pub async fn read_register(
        &self,
        session: &SessionContext,
        register: u32,
    ) -> Result<RegisterReading, ConsoleError> {
        info!("📊 Reading register {}", register);
        self.get_json(&format!("/register/{}", register), session).await
    }

    pub async fn read_registers(
        &self,
        session: &SessionContext,
        start: u32,
        count: usize,
    ) -> Result<RegisterRange, ConsoleError> {
        if count == 0 {
            return Err(ConsoleError::InvalidData("Register count must be at least 1".to_string()));
        }
        let count = if count > MAX_READ_REGISTERS {
            warn!("⚠️  Register count {} limited to {}", count, MAX_READ_REGISTERS);
            MAX_READ_REGISTERS
        } else {
            count
        };

        info!("📊 Reading {} registers starting at {}", count, start);
        self.get_json(&format!("/read_registers?start={}&count={}", start, count), session)
            .await
    }

    pub async fn send_modbus_command(
        &self,
        session: &SessionContext,
        frame: &[u8],
    ) -> Result<CommandReply, ConsoleError> {
        let command = hex::encode(frame);
        info!("📤 Sending Modbus command: {}", command);
        let reply: CommandReply = self
            .get_json(&format!("/modbus_command?command={}", command), session)
            .await?;
        debug!("📥 Modbus reply: {}", reply.response_hex);
        Ok(reply)
    }
}

#[async_trait]
impl ModbusGateway for ApiClient {
    async fn transmit(&self, session: &SessionContext, frame: &[u8]) -> Result<Vec<u8>, ConsoleError> {
        let reply = self.send_modbus_command(session, frame).await?;
        Ok(reply.response)
    }
}

async fn error_message(response: Response) -> Option<String> {
    response.json::<ErrorBody>().await.ok().map(|body| body.error)
}
