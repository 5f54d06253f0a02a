// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::SystemTime;

use super::{Adu, DeviceAddress, Packet, Pdu};
use crate::{
    cursor::{be, be_mut},
    error::{Error, Result},
};

pub type TransactionId = u16;
pub type ProtocolId = u16;
pub type UnitId = DeviceAddress;

/// Transaction id, protocol id, length and unit id.
pub const HEADER_LEN: usize = 7;

/// MBAP header fields, the length field excluded.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub protocol_id: ProtocolId,
    pub unit_id: UnitId,
}

impl Header {
    /// Header of a Modbus (protocol `0`) frame.
    #[must_use]
    pub const fn new(transaction_id: TransactionId, unit_id: UnitId) -> Self {
        Self {
            transaction_id,
            protocol_id: 0,
            unit_id,
        }
    }
}

/// Modbus application protocol frame:
/// `[TxID, TxID, ProtoID, ProtoID, Len, Len, UnitID, PDU...]`
/// with `Len = 1 + len(PDU)`.
#[derive(Debug, Clone)]
pub struct Mbap {
    data: Vec<u8>,
    timestamp: SystemTime,
}

impl Mbap {
    pub fn new(hdr: Header, pdu: &Pdu) -> Result<Self> {
        let pdu = pdu.rawdata();
        let length = u16::try_from(pdu.len() + 1).map_err(|_| Error::FrameLength(pdu.len()))?;
        let mut data = vec![0; HEADER_LEN + pdu.len()];
        be_mut(&mut data)
            .put_u16(hdr.transaction_id)?
            .put_u16(hdr.protocol_id)?
            .put_u16(length)?
            .put_u8(hdr.unit_id)?
            .put_bytes(pdu)?;
        Ok(Self {
            data,
            timestamp: SystemTime::now(),
        })
    }

    /// Validate a complete frame read from the wire.
    pub fn from_raw(data: Vec<u8>) -> Result<Self> {
        if data.len() <= HEADER_LEN {
            return Err(Error::FrameLength(data.len()));
        }
        let mut reader = be(&data).offset(2);
        let protocol_id = reader.get_u16()?;
        if protocol_id != 0 {
            return Err(Error::ProtocolNotModbus(protocol_id));
        }
        let length = usize::from(reader.get_u16()?);
        let pdu_len = data.len() - HEADER_LEN;
        if length != pdu_len + 1 {
            return Err(Error::LengthMismatch(length, pdu_len + 1));
        }
        Ok(Self {
            data,
            timestamp: SystemTime::now(),
        })
    }

    #[must_use]
    pub fn header(&self) -> Header {
        Header {
            transaction_id: self.transaction_id(),
            protocol_id: self.protocol_id(),
            unit_id: self.unit_id(),
        }
    }

    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }

    #[must_use]
    pub fn protocol_id(&self) -> ProtocolId {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    /// The length field: unit id plus PDU.
    #[must_use]
    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.data[4], self.data[5]])
    }

    #[must_use]
    pub fn unit_id(&self) -> UnitId {
        self.data[6]
    }
}

impl Packet for Mbap {
    fn rawdata(&self) -> &[u8] {
        &self.data
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    fn answers(&self, request: &Self) -> bool {
        self.transaction_id() == request.transaction_id() && self.unit_id() == request.unit_id()
    }
}

impl Adu for Mbap {
    fn device_address(&self) -> DeviceAddress {
        self.unit_id()
    }

    fn pdu(&self) -> Pdu {
        Pdu::from_parts(self.data[HEADER_LEN..].to_vec(), self.timestamp)
    }
}
