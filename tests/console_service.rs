use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use powermeter_console::auth::{Role, SessionContext, UserInfo};
use powermeter_console::modbus::ModbusRequest;
use powermeter_console::{Config, ConsoleError, ConsoleService, OutputFormat};

fn service_for(server: &MockServer, dir: &TempDir) -> ConsoleService {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.session.store_path = dir.path().join("session.json");
    config.display.format = OutputFormat::Console;
    ConsoleService::new(config).unwrap()
}

fn session_for(role: Role, token: &str) -> SessionContext {
    let permissions: &[&str] = match role {
        Role::Admin => &["read", "write", "admin", "config", "modbus"],
        Role::Viewer => &["read"],
        _ => &["read", "write", "modbus"],
    };
    SessionContext::new(
        token.to_string(),
        UserInfo {
            username: role.as_str().to_string(),
            role,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            last_login: None,
        },
        None,
    )
}

async fn mount_login(server: &MockServer, role: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "0123456789abcdef",
            "user": {"username": role, "role": role, "permissions": ["read"]},
            "expires_at": "2099-01-01T00:00:00"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_persists_session_for_later_commands() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_login(&server, "operator").await;
    Mock::given(method("GET"))
        .and(path("/power"))
        .and(header("authorization", "Bearer 0123456789abcdef"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "voltage": 230.5,
            "authenticated": true,
            "user": "operator",
            "role": "operator"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server, &dir);
    let text = service.login("operator", "secret").await.unwrap();
    assert!(text.contains("operator"));
    assert_eq!(
        service.store().load().unwrap().map(|s| s.token().to_string()),
        Some("0123456789abcdef".to_string())
    );

    let power = service.power().await.unwrap();
    assert!(power.contains("voltage: 230.5"));
}

#[tokio::test]
async fn test_unauthorized_reply_clears_session() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/power"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid or expired session"})))
        .mount(&server)
        .await;

    let service = service_for(&server, &dir);
    service
        .store()
        .save(&session_for(Role::Operator, "stale-token-0000"))
        .unwrap();

    let err = service.power().await.unwrap_err();
    assert!(matches!(err, ConsoleError::AuthRequired(_)));
    assert!(service.store().load().unwrap().is_none());
    assert!(matches!(service.power().await, Err(ConsoleError::NotLoggedIn)));
}

#[tokio::test]
async fn test_viewer_cannot_send_commands() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/modbus_command"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let service = service_for(&server, &dir);
    service
        .store()
        .save(&session_for(Role::Viewer, "viewer-token-0000"))
        .unwrap();

    let request = ModbusRequest::write_single_register(1, 11, 42);
    assert!(matches!(
        service.send(&request).await,
        Err(ConsoleError::PermissionDenied(_))
    ));
    // Denial is local; the session stays valid.
    assert!(service.store().load().unwrap().is_some());
}

#[tokio::test]
async fn test_session_listing_is_admin_only() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/auth/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessions": {
                "0123456789abcdef": {
                    "token": "0123456789abcdef",
                    "user": {"username": "admin", "role": "admin", "permissions": ["admin"]},
                    "created_at": "2024-05-01T08:00:00",
                    "expires_at": "2024-05-01T16:00:00",
                    "last_accessed": "2024-05-01T09:30:00"
                }
            },
            "count": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server, &dir);
    service
        .store()
        .save(&session_for(Role::Operator, "operator-token-00"))
        .unwrap();
    assert!(matches!(
        service.active_sessions().await,
        Err(ConsoleError::PermissionDenied(_))
    ));

    service
        .store()
        .save(&session_for(Role::Admin, "0123456789abcdef"))
        .unwrap();
    let text = service.active_sessions().await.unwrap();
    assert!(text.contains("Active sessions: 1"));
    assert!(text.contains("01234567..."));
}

#[tokio::test]
async fn test_logout_clears_session_even_when_server_fails() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let service = service_for(&server, &dir);
    service
        .store()
        .save(&session_for(Role::Operator, "operator-token-00"))
        .unwrap();

    let text = service.logout().await.unwrap();
    assert_eq!(text, "Logged out successfully");
    assert!(service.store().load().unwrap().is_none());
}

#[tokio::test]
async fn test_send_renders_unparseable_reply() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/modbus_command"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "command": [1, 3, 0, 0, 0, 1],
            "command_hex": "010300000001",
            "response": [1, 3],
            "response_hex": "0103",
            "parsed": {},
            "timestamp": 1714567890.0
        })))
        .mount(&server)
        .await;

    let service = service_for(&server, &dir);
    service
        .store()
        .save(&session_for(Role::Operator, "operator-token-00"))
        .unwrap();

    let text = service
        .send(&ModbusRequest::read_holding_registers(1, 1, 1))
        .await
        .unwrap();
    assert!(text.contains("📤 Command: 01 03 00 00 00 01"));
    assert!(text.contains("📥 Response: 01 03"));
    assert!(text.contains("❌ Error parsing response"));
}
