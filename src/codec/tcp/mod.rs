// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP

use super::{Input, Stream, Transport, read_framed};
use crate::error::{Error, Result};

pub use crate::frame::tcp::*;

// [MODBUS MESSAGING ON TCP/IP IMPLEMENTATION GUIDE V1.0b](http://modbus.org/docs/Modbus_Messaging_Implementation_Guide_V1_0b.pdf), page 18
// "a MODBUS request needs a maximum of 256 bytes + the MBAP header size"
pub const MAX_FRAME_LEN: usize = 260;

/// Transaction id, protocol id and the length field.
const LENGTH_PREFIX_LEN: usize = 6;

/// Reads length prefixed MBAP frames.
///
/// The same reader serves masters and slaves: the frame length is carried
/// in the header.
#[derive(Debug, Default)]
pub struct MbapTransport {
    stream: Stream,
}

impl MbapTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn read_frame(input: &mut Input) -> Result<Mbap> {
    let mut frame = [0; MAX_FRAME_LEN];
    let mut count = input.read_min(&mut frame, LENGTH_PREFIX_LEN)?;
    let length = LENGTH_PREFIX_LEN + usize::from(u16::from_be_bytes([frame[4], frame[5]]));
    if length <= HEADER_LEN || length > MAX_FRAME_LEN {
        input.reset();
        input.skip(LENGTH_PREFIX_LEN)?;
        return Err(Error::FrameLength(length));
    }
    if count > length {
        input.reset();
        input.skip(length)?;
    } else if count < length {
        count += input.read_min(&mut frame[count..length], length - count)?;
    }
    debug_assert!(count >= length);
    trace!("Received MBAP frame: {:02X?}", &frame[..length]);
    Mbap::from_raw(frame[..length].to_vec())
}

impl Transport for MbapTransport {
    type Frame = Mbap;

    fn stream(&self) -> &Stream {
        &self.stream
    }

    fn read(&self) -> Result<Mbap> {
        read_framed(&self.stream, read_frame)
    }
}
