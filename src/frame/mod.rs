// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frames: the PDU model, its factories and the two ADU envelopes.

use core::fmt;
use std::{sync::Arc, time::SystemTime};

use crate::error::Error;

pub mod factory;
mod pdu;
#[cfg(feature = "rtu")]
pub mod rtu;
#[cfg(feature = "tcp")]
pub mod tcp;

pub use self::pdu::{Pdu, RequestView, ResponseView};

/// A Modbus address is represented by 16 bit (from `0` to `65535`).
pub type Address = u16;

/// Modbus uses 16 bit for its data items (big-endian representation).
pub type Word = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// Address of a device on the bus (unit id for MBAP, slave id for RTU).
pub type DeviceAddress = u8;

/// Bit set on the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// One complete, self delimited unit of wire data.
///
/// A packet is immutable. It carries the time it was created, either by a
/// factory or by a transport read.
pub trait Packet: fmt::Debug + Clone + Send + Sync + 'static {
    /// The bytes as they appear on the wire.
    fn rawdata(&self) -> &[u8];

    /// Creation time.
    fn timestamp(&self) -> SystemTime;

    /// Whether `self` may be the response to `request`.
    ///
    /// Packets without addressing answer any request.
    fn answers(&self, _request: &Self) -> bool {
        true
    }
}

/// An application data unit: a PDU wrapped with addressing and framing.
pub trait Adu: Packet {
    /// Unit id or slave id.
    fn device_address(&self) -> DeviceAddress;

    /// Copy of the wrapped PDU.
    fn pdu(&self) -> Pdu;
}

/// Uninterpreted bytes, as delivered by a buffered transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    data: Arc<[u8]>,
    timestamp: SystemTime,
}

impl RawPacket {
    #[must_use]
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            timestamp: SystemTime::now(),
        }
    }
}

impl Packet for RawPacket {
    fn rawdata(&self) -> &[u8] {
        &self.data
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

/// A Modbus function code.
///
/// It is represented by an unsigned 8 bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// Modbus Function Code: `01` (`0x01`).
    ReadCoils,

    /// Modbus Function Code: `02` (`0x02`).
    ReadDiscreteInputs,

    /// Modbus Function Code: `03` (`0x03`).
    ReadHoldingRegisters,

    /// Modbus Function Code: `04` (`0x04`).
    ReadInputRegisters,

    /// Modbus Function Code: `05` (`0x05`).
    WriteSingleCoil,

    /// Modbus Function Code: `06` (`0x06`).
    WriteSingleRegister,

    /// Modbus Function Code: `07` (`0x07`).
    ReadExceptionStatus,

    /// Modbus Function Code: `08` (`0x08`).
    Diagnostics,

    /// Modbus Function Code: `11` (`0x0B`).
    GetCommEventCounter,

    /// Modbus Function Code: `12` (`0x0C`).
    GetCommEventLog,

    /// Modbus Function Code: `15` (`0x0F`).
    WriteMultipleCoils,

    /// Modbus Function Code: `16` (`0x10`).
    WriteMultipleRegisters,

    /// Modbus Function Code: `17` (`0x11`).
    ReportSlaveId,

    /// Modbus Function Code: `22` (`0x16`).
    MaskWriteRegister,

    /// Modbus Function Code: `23` (`0x17`).
    ReadWriteMultipleRegisters,

    /// Modbus Function Code: `24` (`0x18`).
    ReadFifoQueue,

    /// Modbus Function Code: `43` (`0x2B`).
    ReadDeviceIdentification,

    /// Custom Modbus Function Code.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    ///
    /// The exception flag is not stripped: `0x83` yields `Custom(0x83)`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x07 => Self::ReadExceptionStatus,
            0x08 => Self::Diagnostics,
            0x0B => Self::GetCommEventCounter,
            0x0C => Self::GetCommEventLog,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            0x11 => Self::ReportSlaveId,
            0x16 => Self::MaskWriteRegister,
            0x17 => Self::ReadWriteMultipleRegisters,
            0x18 => Self::ReadFifoQueue,
            0x2B => Self::ReadDeviceIdentification,
            code => Self::Custom(code),
        }
    }

    /// Get the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::ReadExceptionStatus => 0x07,
            Self::Diagnostics => 0x08,
            Self::GetCommEventCounter => 0x0B,
            Self::GetCommEventLog => 0x0C,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::ReportSlaveId => 0x11,
            Self::MaskWriteRegister => 0x16,
            Self::ReadWriteMultipleRegisters => 0x17,
            Self::ReadFifoQueue => 0x18,
            Self::ReadDeviceIdentification => 0x2B,
            Self::Custom(code) => code,
        }
    }
}

impl From<u8> for FunctionCode {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<FunctionCode> for u8 {
    fn from(code: FunctionCode) -> Self {
        code.value()
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:0>2X}", self.value())
    }
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDevice = 0x0B,
}

impl Exception {
    const fn get_name(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::ServerDeviceFailure => "Server device failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server device busy",
            Self::MemoryParityError => "Memory parity error",
            Self::GatewayPathUnavailable => "Gateway path unavailable",
            Self::GatewayTargetDevice => "Gateway target device failed to respond",
        }
    }

    /// The code as it is carried on the wire.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Exception {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        let ex = match code {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::ServerDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::ServerDeviceBusy,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayTargetDevice,
            _ => return Err(Error::ExceptionCode(code)),
        };
        Ok(ex)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.get_name())
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn function_code_into_u8() {
        let x: u8 = FunctionCode::WriteMultipleCoils.value();
        assert_eq!(x, 15);
        let x: u8 = FunctionCode::Custom(0xBB).value();
        assert_eq!(x, 0xBB);
        assert_eq!(u8::from(FunctionCode::ReadFifoQueue), 0x18);
    }

    #[test]
    fn function_code_from_u8() {
        assert_eq!(FunctionCode::new(15), FunctionCode::WriteMultipleCoils);
        assert_eq!(FunctionCode::new(0x2B), FunctionCode::ReadDeviceIdentification);
        assert_eq!(FunctionCode::new(0xBB), FunctionCode::Custom(0xBB));
        assert_eq!(FunctionCode::new(0x83), FunctionCode::Custom(0x83));
    }

    #[test]
    fn function_code_value_is_inverse_of_new() {
        for code in 0..=u8::MAX {
            assert_eq!(FunctionCode::new(code).value(), code);
        }
    }

    #[test]
    fn display_function_code() {
        assert_eq!(FunctionCode::ReadHoldingRegisters.to_string(), "0x03");
        assert_eq!(FunctionCode::Custom(0x41).to_string(), "0x41");
    }

    #[test]
    fn exception_from_code() {
        assert_eq!(Exception::try_from(0x01).unwrap(), Exception::IllegalFunction);
        assert_eq!(
            Exception::try_from(0x04).unwrap(),
            Exception::ServerDeviceFailure
        );
        assert!(matches!(
            Exception::try_from(0x07),
            Err(Error::ExceptionCode(0x07))
        ));
        assert_eq!(Exception::GatewayTargetDevice.code(), 0x0B);
        assert_eq!(
            Exception::IllegalDataValue.to_string(),
            "Illegal data value"
        );
    }

    #[test]
    fn raw_packet_keeps_bytes() {
        let packet = RawPacket::new(vec![0x01, 0x02]);
        assert_eq!(packet.rawdata(), &[0x01, 0x02]);
        assert!(packet.timestamp() <= SystemTime::now());
    }
}
