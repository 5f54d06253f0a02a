// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::SystemTime;

use super::{Address, EXCEPTION_FLAG, Exception, FunctionCode, Packet, Quantity, Word};
use crate::{
    cursor::{Width, be},
    error::{Error, Result},
    util::{packed_coils_len, u16_coil_to_bool, unpack_coils},
};

/// Protocol data unit: a function code followed by its payload.
///
/// The bytes are interpreted on demand through [`Pdu::request`] and
/// [`Pdu::response`].
#[derive(Debug, Clone)]
pub struct Pdu {
    data: Vec<u8>,
    timestamp: SystemTime,
}

impl Pdu {
    /// Wrap `data`; the first byte is the function code.
    pub fn new(data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(Error::FrameLength(0));
        }
        Ok(Self::from_parts(data, SystemTime::now()))
    }

    pub(crate) const fn from_parts(data: Vec<u8>, timestamp: SystemTime) -> Self {
        Self { data, timestamp }
    }

    /// The raw function code, including the exception flag.
    #[must_use]
    pub fn function_code(&self) -> u8 {
        self.data[0]
    }

    #[must_use]
    pub fn is_exception(&self) -> bool {
        self.function_code() & EXCEPTION_FLAG != 0
    }

    /// Interpret the bytes as a request from a master.
    #[must_use]
    pub fn request(&self) -> RequestView<'_> {
        RequestView {
            data: &self.data,
            layout: request_layout(self.function_code()),
        }
    }

    /// Interpret the bytes as a response from a slave.
    #[must_use]
    pub fn response(&self) -> ResponseView<'_> {
        ResponseView {
            data: &self.data,
            layout: response_layout(self.function_code()),
        }
    }
}

impl Packet for Pdu {
    fn rawdata(&self) -> &[u8] {
        &self.data
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

/// Where a list of values is found inside a PDU.
#[derive(Debug, Clone, Copy)]
enum Values {
    /// One register at a fixed offset.
    Single(usize),
    /// A byte count followed by items of `width`.
    Counted { count_at: usize, width: Width },
}

#[derive(Debug, Clone, Copy)]
struct RequestLayout {
    read_address: Option<usize>,
    write_address: Option<usize>,
    read_quantity: Option<usize>,
    write_quantity: Option<usize>,
    values: Option<Values>,
    masks: Option<usize>,
    sub_function: Option<usize>,
    fifo_pointer: Option<usize>,
}

const NO_REQUEST_FIELDS: RequestLayout = RequestLayout {
    read_address: None,
    write_address: None,
    read_quantity: None,
    write_quantity: None,
    values: None,
    masks: None,
    sub_function: None,
    fifo_pointer: None,
};

const fn request_layout(code: u8) -> RequestLayout {
    match code {
        0x01..=0x04 => RequestLayout {
            read_address: Some(1),
            read_quantity: Some(3),
            ..NO_REQUEST_FIELDS
        },
        0x05 | 0x06 => RequestLayout {
            write_address: Some(1),
            values: Some(Values::Single(3)),
            ..NO_REQUEST_FIELDS
        },
        0x08 => RequestLayout {
            sub_function: Some(1),
            ..NO_REQUEST_FIELDS
        },
        0x0F => RequestLayout {
            write_address: Some(1),
            write_quantity: Some(3),
            values: Some(Values::Counted {
                count_at: 5,
                width: Width::Byte,
            }),
            ..NO_REQUEST_FIELDS
        },
        0x10 => RequestLayout {
            write_address: Some(1),
            write_quantity: Some(3),
            values: Some(Values::Counted {
                count_at: 5,
                width: Width::Short,
            }),
            ..NO_REQUEST_FIELDS
        },
        0x16 => RequestLayout {
            write_address: Some(1),
            masks: Some(3),
            ..NO_REQUEST_FIELDS
        },
        0x17 => RequestLayout {
            read_address: Some(1),
            read_quantity: Some(3),
            write_address: Some(5),
            write_quantity: Some(7),
            values: Some(Values::Counted {
                count_at: 9,
                width: Width::Short,
            }),
            ..NO_REQUEST_FIELDS
        },
        0x18 => RequestLayout {
            read_address: Some(1),
            fifo_pointer: Some(1),
            ..NO_REQUEST_FIELDS
        },
        _ => NO_REQUEST_FIELDS,
    }
}

#[derive(Debug, Clone, Copy)]
struct ResponseLayout {
    exception_code: Option<usize>,
    address: Option<usize>,
    quantity: Option<usize>,
    values: Option<Values>,
    masks: Option<usize>,
    coils: bool,
    exception_status: Option<usize>,
    event_counter: Option<usize>,
}

const NO_RESPONSE_FIELDS: ResponseLayout = ResponseLayout {
    exception_code: None,
    address: None,
    quantity: None,
    values: None,
    masks: None,
    coils: false,
    exception_status: None,
    event_counter: None,
};

const fn response_layout(code: u8) -> ResponseLayout {
    if code & EXCEPTION_FLAG != 0 {
        return ResponseLayout {
            exception_code: Some(1),
            ..NO_RESPONSE_FIELDS
        };
    }
    match code {
        0x01 | 0x02 => ResponseLayout {
            values: Some(Values::Counted {
                count_at: 1,
                width: Width::Byte,
            }),
            coils: true,
            ..NO_RESPONSE_FIELDS
        },
        0x03 | 0x04 | 0x17 => ResponseLayout {
            values: Some(Values::Counted {
                count_at: 1,
                width: Width::Short,
            }),
            ..NO_RESPONSE_FIELDS
        },
        0x05 | 0x06 => ResponseLayout {
            address: Some(1),
            values: Some(Values::Single(3)),
            ..NO_RESPONSE_FIELDS
        },
        0x07 => ResponseLayout {
            exception_status: Some(1),
            ..NO_RESPONSE_FIELDS
        },
        0x0B => ResponseLayout {
            event_counter: Some(1),
            ..NO_RESPONSE_FIELDS
        },
        0x0F | 0x10 => ResponseLayout {
            address: Some(1),
            quantity: Some(3),
            ..NO_RESPONSE_FIELDS
        },
        0x16 => ResponseLayout {
            address: Some(1),
            masks: Some(3),
            ..NO_RESPONSE_FIELDS
        },
        _ => NO_RESPONSE_FIELDS,
    }
}

fn word_at(data: &[u8], offset: Option<usize>) -> Option<Word> {
    be(data).offset(offset?).get_u16().ok()
}

fn byte_at(data: &[u8], offset: Option<usize>) -> Option<u8> {
    be(data).offset(offset?).get_u8().ok()
}

fn read_values(data: &[u8], values: Option<Values>) -> Option<Vec<Word>> {
    match values? {
        Values::Single(at) => word_at(data, Some(at)).map(|v| vec![v]),
        Values::Counted { count_at, width } => {
            let mut reader = be(data).offset(count_at);
            let count = usize::from(reader.get_u8().ok()?) / width.len();
            (0..count)
                .map(|_| reader.get(width).ok().map(|v| v as Word))
                .collect()
        }
    }
}

/// Field accessors of a request PDU.
///
/// Every accessor yields `None` when the function code does not define the
/// field or the frame is too short to carry it.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'p> {
    data: &'p [u8],
    layout: RequestLayout,
}

impl RequestView<'_> {
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        FunctionCode::new(self.data[0])
    }

    #[must_use]
    pub fn read_address(&self) -> Option<Address> {
        word_at(self.data, self.layout.read_address)
    }

    #[must_use]
    pub fn write_address(&self) -> Option<Address> {
        word_at(self.data, self.layout.write_address)
    }

    #[must_use]
    pub fn read_quantity(&self) -> Option<Quantity> {
        word_at(self.data, self.layout.read_quantity)
    }

    #[must_use]
    pub fn write_quantity(&self) -> Option<Quantity> {
        word_at(self.data, self.layout.write_quantity)
    }

    /// Register values, coil bytes or the single value of a write.
    #[must_use]
    pub fn values(&self) -> Option<Vec<Word>> {
        read_values(self.data, self.layout.values)
    }

    /// Coil states of a write single or write multiple coils request.
    #[must_use]
    pub fn coils(&self) -> Option<Vec<bool>> {
        match self.function_code() {
            FunctionCode::WriteSingleCoil => {
                let value = word_at(self.data, Some(3))?;
                u16_coil_to_bool(value).ok().map(|state| vec![state])
            }
            FunctionCode::WriteMultipleCoils => {
                let quantity = usize::from(self.write_quantity()?);
                let byte_count = usize::from(byte_at(self.data, Some(5))?);
                if byte_count < packed_coils_len(quantity) {
                    return None;
                }
                let bytes = be(self.data).offset(6).get_bytes(byte_count).ok()?;
                unpack_coils(bytes, quantity).ok()
            }
            _ => None,
        }
    }

    /// Check the byte count of a write multiple request against its
    /// quantity and the bytes that follow it.
    ///
    /// Requests without a byte count pass.
    pub fn check_byte_count(&self) -> Result<()> {
        let Some(Values::Counted { count_at, .. }) = self.layout.values else {
            return Ok(());
        };
        let Some(quantity) = self.write_quantity().map(usize::from) else {
            return Err(Error::FrameLength(self.data.len()));
        };
        let expected = match self.function_code() {
            FunctionCode::WriteMultipleCoils => packed_coils_len(quantity),
            _ => quantity * 2,
        };
        let count = byte_at(self.data, Some(count_at))
            .ok_or(Error::FrameLength(self.data.len()))?;
        if usize::from(count) != expected || self.data.len() != count_at + 1 + usize::from(count) {
            return Err(Error::ByteCount(count));
        }
        Ok(())
    }

    #[must_use]
    pub fn and_mask(&self) -> Option<Word> {
        word_at(self.data, self.layout.masks)
    }

    #[must_use]
    pub fn or_mask(&self) -> Option<Word> {
        word_at(self.data, self.layout.masks.map(|at| at + 2))
    }

    /// Diagnostics sub-function.
    #[must_use]
    pub fn sub_function(&self) -> Option<Word> {
        word_at(self.data, self.layout.sub_function)
    }

    /// Diagnostics data following the sub-function.
    #[must_use]
    pub fn diagnostic_data(&self) -> Option<Word> {
        word_at(self.data, self.layout.sub_function.map(|at| at + 2))
    }

    #[must_use]
    pub fn fifo_pointer(&self) -> Option<Address> {
        word_at(self.data, self.layout.fifo_pointer)
    }
}

/// Field accessors of a response PDU.
///
/// Every accessor yields `None` when the function code does not define the
/// field or the frame is too short to carry it.
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'p> {
    data: &'p [u8],
    layout: ResponseLayout,
}

impl ResponseView<'_> {
    /// Function code without the exception flag.
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        FunctionCode::new(self.data[0] & !EXCEPTION_FLAG)
    }

    #[must_use]
    pub fn is_exception(&self) -> bool {
        self.layout.exception_code.is_some()
    }

    #[must_use]
    pub fn exception_code(&self) -> Option<u8> {
        byte_at(self.data, self.layout.exception_code)
    }

    /// The exception code if it is one defined by the protocol.
    #[must_use]
    pub fn exception(&self) -> Option<Exception> {
        self.exception_code()
            .and_then(|code| Exception::try_from(code).ok())
    }

    #[must_use]
    pub fn address(&self) -> Option<Address> {
        word_at(self.data, self.layout.address)
    }

    #[must_use]
    pub fn quantity(&self) -> Option<Quantity> {
        word_at(self.data, self.layout.quantity)
    }

    #[must_use]
    pub fn values(&self) -> Option<Vec<Word>> {
        read_values(self.data, self.layout.values)
    }

    /// All bits of a read coils or read discrete inputs response.
    ///
    /// The response does not carry the requested quantity, so the result is
    /// padded to a multiple of eight.
    #[must_use]
    pub fn coils(&self) -> Option<Vec<bool>> {
        if !self.layout.coils {
            return None;
        }
        let mut reader = be(self.data).offset(1);
        let byte_count = usize::from(reader.get_u8().ok()?);
        let bytes = reader.get_bytes(byte_count).ok()?;
        unpack_coils(bytes, byte_count * 8).ok()
    }

    #[must_use]
    pub fn and_mask(&self) -> Option<Word> {
        word_at(self.data, self.layout.masks)
    }

    #[must_use]
    pub fn or_mask(&self) -> Option<Word> {
        word_at(self.data, self.layout.masks.map(|at| at + 2))
    }

    #[must_use]
    pub fn exception_status(&self) -> Option<u8> {
        byte_at(self.data, self.layout.exception_status)
    }

    /// Status word and event count of a comm event counter response.
    #[must_use]
    pub fn event_counter(&self) -> Option<(Word, Word)> {
        let at = self.layout.event_counter?;
        Some((word_at(self.data, Some(at))?, word_at(self.data, Some(at + 2))?))
    }
}
