// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU
//!
//! RTU frames carry no length field. The frame length is derived from the
//! function code, and the lookup differs between the two directions: a
//! master reads responses ([`client`]), a slave reads requests ([`server`]).

use super::{Input, Stream, Transport, read_framed};
use crate::error::{Error, Result};

pub mod client;
pub mod server;

pub use crate::frame::rtu::*;

/// Slave id and function code.
const MIN_HEADER_LEN: usize = 2;

/// Length of a complete frame, slave id and CRC included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLen {
    Fixed(usize),
    /// `header` bytes are needed to find the byte count at `count_at`,
    /// the frame is `header + count + 2` bytes long.
    Counted {
        header: usize,
        count_at: usize,
        wide: bool,
    },
}

impl FrameLen {
    /// Bytes required before [`FrameLen::resolve`] can be called.
    #[must_use]
    pub const fn header_len(self) -> usize {
        match self {
            Self::Fixed(_) => MIN_HEADER_LEN,
            Self::Counted { header, .. } => header,
        }
    }

    /// Frame length from a buffer holding at least `header_len()` bytes.
    #[must_use]
    pub fn resolve(self, buf: &[u8]) -> usize {
        match self {
            Self::Fixed(len) => len,
            Self::Counted {
                header,
                count_at,
                wide,
            } => {
                let count = if wide {
                    usize::from(u16::from_be_bytes([buf[count_at], buf[count_at + 1]]))
                } else {
                    usize::from(buf[count_at])
                };
                header + count + 2
            }
        }
    }
}

/// The direction a transport reads.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Reads responses.
    Master,
    /// Reads requests.
    Slave,
}

impl Role {
    /// Frame length lookup for frames this role receives.
    #[must_use]
    pub fn frame_len(self, fn_code: u8) -> Option<FrameLen> {
        match self {
            Self::Master => client::response_len(fn_code),
            Self::Slave => server::request_len(fn_code),
        }
    }
}

/// Reads CRC protected RTU frames.
#[derive(Debug)]
pub struct RtuTransport {
    stream: Stream,
    role: Role,
}

impl RtuTransport {
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            stream: Stream::new(),
            role,
        }
    }

    /// Transport of a master, reading responses.
    #[must_use]
    pub fn master() -> Self {
        Self::new(Role::Master)
    }

    /// Transport of a slave, reading requests.
    #[must_use]
    pub fn slave() -> Self {
        Self::new(Role::Slave)
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }
}

fn read_frame(input: &mut Input, role: Role) -> Result<Rtu> {
    let mut frame = [0; MAX_FRAME_LEN];
    let mut count = input.read_min(&mut frame, MIN_HEADER_LEN)?;
    let fn_code = frame[1];
    let Some(frame_len) = role.frame_len(fn_code) else {
        input.reset();
        input.skip(MIN_HEADER_LEN)?;
        return Err(Error::FnCode(fn_code));
    };
    let header = frame_len.header_len();
    if count < header {
        count += input.read_min(&mut frame[count..], header - count)?;
    }
    let length = frame_len.resolve(&frame);
    if length > MAX_FRAME_LEN {
        input.reset();
        input.skip(MIN_HEADER_LEN)?;
        return Err(Error::FrameLength(length));
    }
    if count > length {
        input.reset();
        input.skip(length)?;
    } else if count < length {
        count += input.read_min(&mut frame[count..length], length - count)?;
    }
    debug_assert!(count >= length);
    trace!("Received RTU frame: {:02X?}", &frame[..length]);
    Rtu::from_raw(frame[..length].to_vec())
}

impl Transport for RtuTransport {
    type Frame = Rtu;

    fn stream(&self) -> &Stream {
        &self.stream
    }

    fn read(&self) -> Result<Rtu> {
        read_framed(&self.stream, |input| read_frame(input, self.role))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::{
        codec::testing::ChunkedReader,
        frame::{Adu, Packet},
    };

    // read holding registers, slave 0x01, two registers
    const READ_REQUEST: [u8; 8] = [0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B];
    const READ_RESPONSE: [u8; 9] = [0x01, 0x03, 0x04, 0x89, 0x02, 0x42, 0xC7, 0x00, 0x9D];

    fn transport(role: Role, reader: ChunkedReader) -> RtuTransport {
        let transport = RtuTransport::new(role);
        transport.initialize(Box::new(reader), Box::new(io::sink()));
        transport
    }

    #[test]
    fn resolve_frame_len() {
        assert_eq!(FrameLen::Fixed(8).resolve(&[]), 8);
        let counted = FrameLen::Counted {
            header: 3,
            count_at: 2,
            wide: false,
        };
        assert_eq!(counted.header_len(), 3);
        assert_eq!(counted.resolve(&[0x01, 0x03, 0x04]), 9);
        let wide = FrameLen::Counted {
            header: 4,
            count_at: 2,
            wide: true,
        };
        assert_eq!(wide.resolve(&[0x01, 0x18, 0x00, 0x06]), 12);
    }

    #[test]
    fn slave_reads_request_with_short_first_read() {
        let transport = transport(
            Role::Slave,
            ChunkedReader::new([READ_REQUEST[..1].to_vec(), READ_REQUEST[1..].to_vec()]),
        );
        let frame = transport.read().unwrap();
        assert_eq!(frame.rawdata(), &READ_REQUEST);
        assert_eq!(frame.pdu().request().read_quantity(), Some(2));
    }

    #[test]
    fn master_reads_counted_response_in_pieces() {
        let transport = transport(
            Role::Master,
            ChunkedReader::new([
                READ_RESPONSE[..2].to_vec(),
                READ_RESPONSE[2..5].to_vec(),
                READ_RESPONSE[5..].to_vec(),
            ]),
        );
        let frame = transport.read().unwrap();
        assert_eq!(frame.slave(), 0x01);
        assert_eq!(frame.pdu().response().values(), Some(vec![0x8902, 0x42C7]));
    }

    #[test]
    fn master_reads_back_to_back_frames() {
        let exception = [0x01, 0x83, 0x04, 0x40, 0xF3];
        let mut bytes = READ_RESPONSE.to_vec();
        bytes.extend_from_slice(&exception);
        let transport = transport(Role::Master, ChunkedReader::new([bytes]));
        assert_eq!(transport.read().unwrap().rawdata(), &READ_RESPONSE);
        let frame = transport.read().unwrap();
        assert_eq!(frame.rawdata(), &exception);
        assert_eq!(frame.pdu().response().exception_code(), Some(0x04));
    }

    #[test]
    fn unknown_function_code_skips_two_bytes() {
        let mut bytes = vec![0x01, 0x42];
        bytes.extend_from_slice(&READ_REQUEST);
        let transport = transport(Role::Slave, ChunkedReader::new([bytes]));
        let err = transport.read().unwrap_err();
        assert!(matches!(err, Error::FnCode(0x42)));
        assert!(err.is_protocol());
        assert_eq!(transport.read().unwrap().rawdata(), &READ_REQUEST);
    }

    #[test]
    fn crc_mismatch_consumes_the_frame() {
        let mut bytes = READ_REQUEST.to_vec();
        bytes[7] = 0x00;
        bytes.extend_from_slice(&READ_REQUEST);
        let transport = transport(Role::Slave, ChunkedReader::new([bytes]));
        assert!(matches!(
            transport.read(),
            Err(Error::Crc {
                expected: 0xC40B,
                received: 0xC400
            })
        ));
        assert_eq!(transport.read().unwrap().rawdata(), &READ_REQUEST);
    }

    #[test]
    fn roles_use_separate_tables() {
        // a request is not a valid response of the same length
        let transport = transport(Role::Master, ChunkedReader::new([READ_REQUEST.to_vec()]));
        // byte count 0x00 makes the response 5 bytes long
        assert!(matches!(transport.read(), Err(Error::Crc { .. })));
    }

    #[test]
    fn end_of_stream_inside_frame() {
        let transport = transport(Role::Slave, ChunkedReader::new([READ_REQUEST[..5].to_vec()]));
        assert!(transport.read().unwrap_err().is_io());
    }
}
