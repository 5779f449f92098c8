use async_trait::async_trait;
use log::{info, warn};

use super::protocol::{build_command, parse_response, ModbusCommand, ModbusRequest, ModbusResponse};
use crate::auth::access::{Operation, WRITE_PERMISSION};
use crate::auth::session::SessionContext;
use crate::utils::error::{CodecError, ConsoleError};

/// Anything that can carry a built frame to the meter and hand back the raw
/// reply bytes.
#[async_trait]
pub trait ModbusGateway: Send + Sync {
    async fn transmit(
        &self,
        session: &SessionContext,
        frame: &[u8],
    ) -> Result<Vec<u8>, ConsoleError>;
}

/// One sent command with its raw reply. A reply that fails to parse is kept
/// next to the error so it can still be shown.
#[derive(Debug, Clone)]
pub struct CommandExchange {
    pub command: ModbusCommand,
    pub reply: Vec<u8>,
    pub parsed: Result<ModbusResponse, CodecError>,
}

/// Builds, authorizes, sends and parses one request.
pub async fn send_request(
    gateway: &dyn ModbusGateway,
    session: &SessionContext,
    request: &ModbusRequest,
) -> Result<CommandExchange, ConsoleError> {
    let access = session.access();
    access.check(Operation::BuildCommand)?;

    let command = build_command(request)?;
    access.check(Operation::SendCommand(command.function_code))?;
    if !session.has_permission(WRITE_PERMISSION) {
        return Err(ConsoleError::PermissionDenied(format!(
            "sending Modbus commands requires the '{}' permission",
            WRITE_PERMISSION
        )));
    }

    info!(
        "📊 {} on device {}: register {} (wire 0x{:04x}), frame {}",
        command.function_code.name(),
        command.device_address,
        command.original_address,
        command.wire_address,
        command.hex_command
    );

    let reply = gateway.transmit(session, &command.bytes).await?;
    let parsed = parse_response(&reply, command.original_address);

    match &parsed {
        Ok(response) => info!(
            "✅ Reply from device {} ({} bytes)",
            response.device_address,
            reply.len()
        ),
        Err(e) => warn!("⚠️  Reply could not be parsed: {}", e),
    }

    Ok(CommandExchange {
        command,
        reply,
        parsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::{Role, UserInfo};
    use crate::modbus::protocol::ParsedResult;
    use std::sync::Mutex;

    struct ScriptedGateway {
        reply: Vec<u8>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedGateway {
        fn new(reply: Vec<u8>) -> Self {
            Self {
                reply,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModbusGateway for ScriptedGateway {
        async fn transmit(
            &self,
            _session: &SessionContext,
            frame: &[u8],
        ) -> Result<Vec<u8>, ConsoleError> {
            self.sent.lock().unwrap().push(frame.to_vec());
            Ok(self.reply.clone())
        }
    }

    fn session_with(role: Role, permissions: &[&str]) -> SessionContext {
        SessionContext::new(
            "0123456789abcdef".to_string(),
            UserInfo {
                username: "tester".to_string(),
                role,
                permissions: permissions.iter().map(|p| p.to_string()).collect(),
                last_login: None,
            },
            None,
        )
    }

    fn session(role: Role) -> SessionContext {
        session_with(role, &["read", "write"])
    }

    #[tokio::test]
    async fn test_send_request_parses_reply_against_start_register() {
        let gateway = ScriptedGateway::new(vec![1, 3, 4, 0x01, 0x2C, 0x00, 0x05]);
        let request = ModbusRequest::read_holding_registers(1, 100, 2);

        let exchange = send_request(&gateway, &session(Role::Operator), &request)
            .await
            .unwrap();

        assert_eq!(gateway.sent.lock().unwrap()[0], vec![1, 3, 0, 99, 0, 2]);
        let parsed = exchange.parsed.unwrap();
        match parsed.result {
            ParsedResult::ReadRegisters { registers, .. } => {
                assert_eq!(registers[0].address, 100);
                assert_eq!(registers[0].value, 300);
                assert_eq!(registers[1].address, 101);
                assert_eq!(registers[1].value, 5);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_kept_with_error() {
        let gateway = ScriptedGateway::new(vec![1, 3]);
        let request = ModbusRequest::read_holding_registers(1, 10, 1);

        let exchange = send_request(&gateway, &session(Role::Admin), &request)
            .await
            .unwrap();

        assert_eq!(exchange.reply, vec![1, 3]);
        assert_eq!(
            exchange.parsed,
            Err(CodecError::TruncatedResponse { expected: 3, actual: 2 })
        );
    }

    #[tokio::test]
    async fn test_viewer_cannot_send_frames() {
        let gateway = ScriptedGateway::new(vec![1, 6, 0, 10, 0, 42]);
        let request = ModbusRequest::write_single_register(1, 11, 42);

        let err = send_request(&gateway, &session(Role::Viewer), &request)
            .await
            .unwrap_err();

        assert!(matches!(err, ConsoleError::PermissionDenied(_)));
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_write_permission_blocks_send() {
        let gateway = ScriptedGateway::new(vec![1, 3, 2, 0, 1]);
        let request = ModbusRequest::read_holding_registers(1, 1, 1);

        let err = send_request(&gateway, &session_with(Role::Operator, &["read"]), &request)
            .await
            .unwrap_err();

        assert!(matches!(err, ConsoleError::PermissionDenied(_)));
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_gateway() {
        let gateway = ScriptedGateway::new(Vec::new());
        let request = ModbusRequest::read_holding_registers(1, 0, 1);

        let err = send_request(&gateway, &session(Role::Operator), &request)
            .await
            .unwrap_err();

        assert!(matches!(err, ConsoleError::Codec(CodecError::InvalidAddress(0))));
        assert!(gateway.sent.lock().unwrap().is_empty());
    }
}
