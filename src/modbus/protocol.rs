//! Modbus frame codec.
//!
//! Builds request frames from operator input and parses raw reply frames back
//! into typed register values. Frames exclude transport framing: the CRC is
//! appended by whatever sits between the API server and the meter.

use serde::Serialize;
use std::fmt;

use crate::utils::error::CodecError;

/// Registers are shown to operators starting at 1; the wire address is the
/// logical number minus this offset.
pub const REGISTER_NUMBERING_OFFSET: u32 = 1;

/// Largest register count a single read may request.
pub const MAX_READ_REGISTERS: usize = 125;

/// Largest register count a single write-multiple frame may carry.
pub const MAX_WRITE_REGISTERS: usize = 123;

const MIN_RESPONSE_LEN: usize = 3;
const ECHO_RESPONSE_LEN: usize = 6;
const READ_HEADER_LEN: usize = 3;
const MAX_READ_BYTE_COUNT: u8 = (MAX_READ_REGISTERS * 2) as u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u8")]
pub enum FunctionCode {
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleRegister,
    WriteMultipleRegisters,
}

impl FunctionCode {
    pub const ALL: [FunctionCode; 4] = [
        FunctionCode::ReadHoldingRegisters,
        FunctionCode::ReadInputRegisters,
        FunctionCode::WriteSingleRegister,
        FunctionCode::WriteMultipleRegisters,
    ];

    pub fn code(self) -> u8 {
        match self {
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::ReadInputRegisters => 0x04,
            FunctionCode::WriteSingleRegister => 0x06,
            FunctionCode::WriteMultipleRegisters => 0x10,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FunctionCode::ReadHoldingRegisters => "Read Holding Registers",
            FunctionCode::ReadInputRegisters => "Read Input Registers",
            FunctionCode::WriteSingleRegister => "Write Single Register",
            FunctionCode::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            FunctionCode::WriteSingleRegister | FunctionCode::WriteMultipleRegisters
        )
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = CodecError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        FunctionCode::ALL
            .into_iter()
            .find(|function| function.code() == code)
            .ok_or(CodecError::InvalidFunctionCode(code))
    }
}

impl From<FunctionCode> for u8 {
    fn from(function: FunctionCode) -> Self {
        function.code()
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Exception codes a device reports in a reply whose function code has the
/// high bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    GatewayPathUnavailable,
    GatewayTargetFailedToRespond,
    Other(u8),
}

impl ExceptionCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::ServerDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::ServerDeviceBusy,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailedToRespond,
            other => ExceptionCode::Other(other),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => "Illegal function",
            ExceptionCode::IllegalDataAddress => "Illegal data address",
            ExceptionCode::IllegalDataValue => "Illegal data value",
            ExceptionCode::ServerDeviceFailure => "Server device failure",
            ExceptionCode::Acknowledge => "Acknowledge",
            ExceptionCode::ServerDeviceBusy => "Server device busy",
            ExceptionCode::GatewayPathUnavailable => "Gateway path unavailable",
            ExceptionCode::GatewayTargetFailedToRespond => "Gateway target device failed to respond",
            ExceptionCode::Other(_) => "Unrecognized exception",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestData {
    /// Number of registers to read (codes 3 and 4).
    Count(u16),
    /// Register value to write (code 6).
    Value(u16),
    /// Register values to write in order (code 16).
    Values(Vec<u16>),
}

/// Operator input for one command, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    pub device_address: u8,
    pub function_code: u8,
    /// Logical register number, 1-based.
    pub register_address: u32,
    pub data: RequestData,
}

impl ModbusRequest {
    pub fn new(device_address: u8, function_code: u8, register_address: u32, data: RequestData) -> Self {
        Self {
            device_address,
            function_code,
            register_address,
            data,
        }
    }

    pub fn read_holding_registers(device_address: u8, register_address: u32, count: u16) -> Self {
        Self::new(
            device_address,
            FunctionCode::ReadHoldingRegisters.code(),
            register_address,
            RequestData::Count(count),
        )
    }

    pub fn read_input_registers(device_address: u8, register_address: u32, count: u16) -> Self {
        Self::new(
            device_address,
            FunctionCode::ReadInputRegisters.code(),
            register_address,
            RequestData::Count(count),
        )
    }

    pub fn write_single_register(device_address: u8, register_address: u32, value: u16) -> Self {
        Self::new(
            device_address,
            FunctionCode::WriteSingleRegister.code(),
            register_address,
            RequestData::Value(value),
        )
    }

    pub fn write_multiple_registers(device_address: u8, register_address: u32, values: Vec<u16>) -> Self {
        Self::new(
            device_address,
            FunctionCode::WriteMultipleRegisters.code(),
            register_address,
            RequestData::Values(values),
        )
    }
}

/// A validated request frame, with everything a caller needs to transmit or
/// display it without recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModbusCommand {
    pub device_address: u8,
    pub function_code: FunctionCode,
    pub original_address: u32,
    pub wire_address: u16,
    pub high_byte: u8,
    pub low_byte: u8,
    pub bytes: Vec<u8>,
    /// Lowercase hex of `bytes`, the form the API expects.
    pub hex_command: String,
}

impl ModbusCommand {
    pub fn hex_address(&self) -> String {
        format!("0x{:04X}", self.wire_address)
    }
}

/// Maps a 1-based register number to its zero-based wire address.
pub fn wire_address(register_address: u32) -> Result<u16, CodecError> {
    register_address
        .checked_sub(REGISTER_NUMBERING_OFFSET)
        .and_then(|wire| u16::try_from(wire).ok())
        .ok_or(CodecError::InvalidAddress(register_address))
}

fn check_count(count: usize, max: usize) -> Result<(), CodecError> {
    if count == 0 || count > max {
        return Err(CodecError::InvalidCount { count, max });
    }
    Ok(())
}

pub fn build_command(request: &ModbusRequest) -> Result<ModbusCommand, CodecError> {
    let function = FunctionCode::try_from(request.function_code)?;
    let wire = wire_address(request.register_address)?;
    let [high_byte, low_byte] = wire.to_be_bytes();

    let mut bytes = vec![request.device_address, function.code(), high_byte, low_byte];

    match (function, &request.data) {
        (
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters,
            RequestData::Count(count),
        ) => {
            check_count(usize::from(*count), MAX_READ_REGISTERS)?;
            bytes.extend_from_slice(&count.to_be_bytes());
        }
        (FunctionCode::WriteSingleRegister, RequestData::Value(value)) => {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        (FunctionCode::WriteMultipleRegisters, RequestData::Values(values)) => {
            check_count(values.len(), MAX_WRITE_REGISTERS)?;
            // Both fit: at most 123 registers, 246 payload bytes.
            let quantity = values.len() as u16;
            bytes.extend_from_slice(&quantity.to_be_bytes());
            bytes.push((values.len() * 2) as u8);
            for value in values {
                bytes.extend_from_slice(&value.to_be_bytes());
            }
        }
        _ => return Err(CodecError::PayloadMismatch(function.code())),
    }

    let hex_command = hex::encode(&bytes);

    Ok(ModbusCommand {
        device_address: request.device_address,
        function_code: function,
        original_address: request.register_address,
        wire_address: wire,
        high_byte,
        low_byte,
        bytes,
        hex_command,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterValue {
    /// Logical register label, counted from the caller's start register.
    pub address: u32,
    pub value: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedResult {
    ReadRegisters {
        byte_count: u8,
        registers: Vec<RegisterValue>,
    },
    WriteSingle {
        address: u16,
        value: u16,
    },
    WriteMultiple {
        address: u16,
        count: u16,
    },
    /// Function code outside the supported set, exception replies included.
    Unknown {
        function_code: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModbusResponse {
    pub raw: Vec<u8>,
    pub device_address: u8,
    pub function_code: u8,
    pub result: ParsedResult,
}

impl ModbusResponse {
    /// Exception reported by the device, if this is an exception reply to a
    /// supported function.
    pub fn exception_code(&self) -> Option<ExceptionCode> {
        if self.function_code & 0x80 == 0 {
            return None;
        }
        FunctionCode::try_from(self.function_code & 0x7F).ok()?;
        self.raw.get(2).map(|code| ExceptionCode::from_u8(*code))
    }
}

/// Parses a raw reply frame. `start_register` labels the first register of a
/// read reply; it is ignored for other function codes.
pub fn parse_response(response: &[u8], start_register: u32) -> Result<ModbusResponse, CodecError> {
    let (device_address, function_code, byte_count) = match response {
        [device, function, third, ..] => (*device, *function, *third),
        _ => {
            return Err(CodecError::TruncatedResponse {
                expected: MIN_RESPONSE_LEN,
                actual: response.len(),
            })
        }
    };

    let result = match FunctionCode::try_from(function_code) {
        Ok(FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters) => {
            parse_read_registers(response, byte_count, start_register)?
        }
        Ok(FunctionCode::WriteSingleRegister) => {
            let (address, value) = parse_echo(response)?;
            ParsedResult::WriteSingle { address, value }
        }
        Ok(FunctionCode::WriteMultipleRegisters) => {
            let (address, count) = parse_echo(response)?;
            ParsedResult::WriteMultiple { address, count }
        }
        Err(_) => ParsedResult::Unknown { function_code },
    };

    Ok(ModbusResponse {
        raw: response.to_vec(),
        device_address,
        function_code,
        result,
    })
}

fn parse_read_registers(
    response: &[u8],
    byte_count: u8,
    start_register: u32,
) -> Result<ParsedResult, CodecError> {
    if byte_count % 2 != 0 || byte_count > MAX_READ_BYTE_COUNT {
        return Err(CodecError::MalformedByteCount(byte_count));
    }

    let end = READ_HEADER_LEN + usize::from(byte_count);
    let payload = response
        .get(READ_HEADER_LEN..end)
        .ok_or(CodecError::TruncatedResponse {
            expected: end,
            actual: response.len(),
        })?;

    let registers = payload
        .chunks_exact(2)
        .zip(0u32..)
        .map(|(pair, index)| RegisterValue {
            address: start_register.saturating_add(index),
            value: u16::from_be_bytes([pair[0], pair[1]]),
        })
        .collect();

    Ok(ParsedResult::ReadRegisters {
        byte_count,
        registers,
    })
}

/// Address and value/count words of a write echo.
fn parse_echo(response: &[u8]) -> Result<(u16, u16), CodecError> {
    match response {
        [_, _, address_hi, address_lo, word_hi, word_lo, ..] => Ok((
            u16::from_be_bytes([*address_hi, *address_lo]),
            u16::from_be_bytes([*word_hi, *word_lo]),
        )),
        _ => Err(CodecError::TruncatedResponse {
            expected: ECHO_RESPONSE_LEN,
            actual: response.len(),
        }),
    }
}
