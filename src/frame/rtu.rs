// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::SystemTime;

use super::{Adu, DeviceAddress, EXCEPTION_FLAG, Packet, Pdu};
use crate::error::{Error, Result};

/// Slave ID
pub type SlaveId = DeviceAddress;

// [MODBUS over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13
// "The maximum size of a MODBUS RTU frame is 256 bytes."
pub const MAX_FRAME_LEN: usize = 256;

/// Serial line frame: `[SlaveID, PDU..., CRC, CRC]`.
#[derive(Debug, Clone)]
pub struct Rtu {
    data: Vec<u8>,
    timestamp: SystemTime,
}

impl Rtu {
    #[must_use]
    pub fn new(slave: SlaveId, pdu: &Pdu) -> Self {
        let pdu = pdu.rawdata();
        let mut data = Vec::with_capacity(pdu.len() + 3);
        data.push(slave);
        data.extend_from_slice(pdu);
        let crc = crc16(&data);
        data.extend_from_slice(&crc.to_be_bytes());
        Self {
            data,
            timestamp: SystemTime::now(),
        }
    }

    /// Verify the trailing CRC of a complete frame read from the wire.
    pub fn from_raw(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::FrameLength(data.len()));
        }
        let (adu, trailer) = data.split_at(data.len() - 2);
        let expected = crc16(adu);
        let received = u16::from_be_bytes([trailer[0], trailer[1]]);
        if expected != received {
            return Err(Error::Crc { expected, received });
        }
        Ok(Self {
            data,
            timestamp: SystemTime::now(),
        })
    }

    #[must_use]
    pub fn slave(&self) -> SlaveId {
        self.data[0]
    }

    /// The trailer as carried on the wire.
    #[must_use]
    pub fn crc(&self) -> u16 {
        let len = self.data.len();
        u16::from_be_bytes([self.data[len - 2], self.data[len - 1]])
    }
}

impl Packet for Rtu {
    fn rawdata(&self) -> &[u8] {
        &self.data
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    fn answers(&self, request: &Self) -> bool {
        self.slave() == request.slave() && self.data[1] & !EXCEPTION_FLAG == request.data[1]
    }
}

impl Adu for Rtu {
    fn device_address(&self) -> DeviceAddress {
        self.slave()
    }

    fn pdu(&self) -> Pdu {
        Pdu::from_parts(self.data[1..self.data.len() - 2].to_vec(), self.timestamp)
    }
}

/// Calculate the CRC (Cyclic Redundancy Check) sum.
///
/// The result has its bytes swapped, so writing it big-endian puts the low
/// CRC byte on the wire first.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            // the shift has to happen before the test of the next bit
            #[allow(clippy::branches_sharing_code)]
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc.rotate_right(8)
}
