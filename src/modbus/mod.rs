pub mod client;
pub mod protocol;

pub use client::{send_request, CommandExchange, ModbusGateway};
pub use protocol::{
    build_command, parse_response, FunctionCode, ModbusCommand, ModbusRequest, ModbusResponse,
    ParsedResult, RegisterValue, RequestData,
};
