use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use powermeter_console::auth::{Role, SessionContext, UserInfo};
use powermeter_console::config::ApiConfig;
use powermeter_console::modbus::{send_request, ModbusRequest, ParsedResult, RegisterValue};
use powermeter_console::{ApiClient, ConsoleError, ServerStatus};

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(&ApiConfig {
        base_url: server.uri(),
        timeout_seconds: 5,
    })
    .unwrap()
}

fn operator_session() -> SessionContext {
    SessionContext::new(
        "operator-token-1234".to_string(),
        UserInfo {
            username: "operator".to_string(),
            role: Role::Operator,
            permissions: vec!["read".to_string(), "write".to_string()],
            last_login: None,
        },
        None,
    )
}

#[tokio::test]
async fn test_server_status_probe() {
    let guarded = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/power"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Authentication required"})))
        .mount(&guarded)
        .await;
    assert_eq!(client_for(&guarded).server_status().await, ServerStatus::Ready);

    let open = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/power"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"voltage": 230.0})))
        .mount(&open)
        .await;
    assert_eq!(client_for(&open).server_status().await, ServerStatus::Open);

    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/power"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&broken)
        .await;
    assert!(matches!(
        client_for(&broken).server_status().await,
        ServerStatus::Unreachable(_)
    ));
}

#[tokio::test]
async fn test_login_builds_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "abcdef0123456789",
            "user": {"username": "admin", "role": "admin", "permissions": ["read", "write", "admin"]},
            "expires_at": "2099-01-01T00:00:00"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client_for(&server).login("admin", "secret").await.unwrap();
    assert_eq!(session.token(), "abcdef0123456789");
    assert_eq!(session.token_prefix(), "abcdef01");
    assert_eq!(session.role(), &Role::Admin);
    assert!(!session.is_expired());
}

#[tokio::test]
async fn test_login_rejected_and_empty_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid credentials"})))
        .mount(&server)
        .await;
    let client = client_for(&server);

    match client.login("admin", "wrong").await {
        Err(ConsoleError::AuthRequired(message)) => assert_eq!(message, "Invalid credentials"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(matches!(
        client.login("", "secret").await,
        Err(ConsoleError::InvalidData(_))
    ));
}

#[tokio::test]
async fn test_authenticated_calls_carry_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/register/44602"))
        .and(header("authorization", "Bearer operator-token-1234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "register": 44602,
            "modbus_address": 44601,
            "modbus_address_hex": "0xAE39",
            "value": 1234,
            "hex_value": "0x4D2",
            "timestamp": 1714567890.5,
            "read_by": "operator"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reading = client_for(&server)
        .read_register(&operator_session(), 44602)
        .await
        .unwrap();
    assert_eq!(reading.value, 1234);
    assert_eq!(reading.modbus_address, 44601);
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/power"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid or expired session"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/register/7"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "Modbus read failed"})))
        .mount(&server)
        .await;
    let client = client_for(&server);
    let session = operator_session();

    let err = client.fetch_power(&session).await.unwrap_err();
    assert!(err.is_auth_failure());

    match client.read_register(&session, 7).await {
        Err(ConsoleError::Http { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "Modbus read failed");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_read_registers_limits_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/read_registers"))
        .and(query_param("start", "1"))
        .and(query_param("count", "125"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "start_register": 1,
            "modbus_start": 0,
            "count": 2,
            "values": [10, 20],
            "timestamp": 1714567890.0
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);
    let session = operator_session();

    let range = client.read_registers(&session, 1, 500).await.unwrap();
    assert_eq!(range.values, vec![10, 20]);

    assert!(matches!(
        client.read_registers(&session, 1, 0).await,
        Err(ConsoleError::InvalidData(_))
    ));
}

#[tokio::test]
async fn test_modbus_command_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/modbus_command"))
        .and(query_param("command", "010300630002"))
        .and(header("authorization", "Bearer operator-token-1234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "command": [1, 3, 0, 99, 0, 2],
            "command_hex": "010300630002",
            "response": [1, 3, 4, 1, 44, 0, 5],
            "response_hex": "010304012c0005",
            "parsed": {},
            "timestamp": 1714567890.0,
            "executed_by": "operator"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = ModbusRequest::read_holding_registers(1, 100, 2);
    let exchange = send_request(&client, &operator_session(), &request)
        .await
        .unwrap();

    assert_eq!(exchange.command.bytes, vec![0x01, 0x03, 0x00, 0x63, 0x00, 0x02]);
    assert_eq!(exchange.reply, vec![0x01, 0x03, 0x04, 0x01, 0x2C, 0x00, 0x05]);
    let response = exchange.parsed.unwrap();
    assert_eq!(
        response.result,
        ParsedResult::ReadRegisters {
            byte_count: 4,
            registers: vec![
                RegisterValue { address: 100, value: 300 },
                RegisterValue { address: 101, value: 5 },
            ],
        }
    );
}
