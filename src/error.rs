// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{io, sync::Arc, time::Duration};

use thiserror::Error;

/// modbus-link Result
pub type Result<T> = core::result::Result<T, Error>;

/// modbus-link Error
///
/// The error is cheap to clone so the same value can be published to
/// several subscribers and handed back to a waiting master.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Underlying stream failure, including a premature end of stream.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// Buffer access outside of the available bytes.
    #[error("Out of bounds: offset = {offset}, width = {width}, length = {len}")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },

    /// Invalid coil value
    #[error("Invalid coil value: 0x{0:0>4X}")]
    CoilValue(u16),

    /// Invalid (unknown) function code
    #[error("Invalid function code: 0x{0:0>2X}")]
    FnCode(u8),

    /// Invalid exception code
    #[error("Invalid exception code: 0x{0:0>2X}")]
    ExceptionCode(u8),

    /// Invalid CRC
    #[error("Invalid CRC: expected = 0x{expected:0>4X}, received = 0x{received:0>4X}")]
    Crc { expected: u16, received: u16 },

    /// Invalid byte count
    #[error("Invalid byte count: {0}")]
    ByteCount(u8),

    /// Frame too short or too long for its header.
    #[error("Invalid frame length: {0}")]
    FrameLength(usize),

    /// Length Mismatch
    #[error("Length Mismatch: Length Field: {0}, PDU Len + 1: {1}")]
    LengthMismatch(usize, usize),

    /// Protocol not Modbus
    #[error("Protocol not Modbus(0), received {0} instead")]
    ProtocolNotModbus(u16),

    /// A factory argument is outside of the protocol range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No request slot or no response within the deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// A slave received a request no command accepts.
    #[error("No slave command found for request")]
    CommandNotFound,

    /// A slave command failed to produce a response.
    #[error("Command failed: {0}")]
    Command(String),

    /// The transport has not been initialized with a connection.
    #[error("Not connected")]
    NotConnected,
}

impl Error {
    /// Stream level failure that ends the current protocol run.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::NotConnected)
    }

    /// Deadline exceeded while waiting on a master request.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Recoverable decode error of a single frame.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::FnCode(_)
                | Self::Crc { .. }
                | Self::ByteCount(_)
                | Self::FrameLength(_)
                | Self::LengthMismatch(..)
                | Self::ProtocolNotModbus(_)
                | Self::ExceptionCode(_)
                | Self::CoilValue(_)
        )
    }

    /// A read that timed out before any byte arrived.
    pub(crate) fn is_idle(&self) -> bool {
        match self {
            Self::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
