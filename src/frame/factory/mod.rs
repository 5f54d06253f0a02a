// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PDU factories.
//!
//! [`master`] builds requests, [`slave`] builds responses and exception
//! frames. Arguments outside of the protocol limits are rejected with
//! [`Error::InvalidArgument`]; nothing is clamped.

use std::time::SystemTime;

use byteorder::BigEndian;

use super::Pdu;
use crate::{
    cursor::{ByteWriter, be_mut},
    error::{Error, Result},
};

pub mod master;
pub mod slave;

/// Allocate `len` bytes, fill them and wrap them into a [`Pdu`].
fn encode<F>(len: usize, write: F) -> Result<Pdu>
where
    F: FnOnce(&mut ByteWriter<'_, BigEndian>) -> Result<()>,
{
    let mut data = vec![0; len];
    write(&mut be_mut(&mut data))?;
    Ok(Pdu::from_parts(data, SystemTime::now()))
}

fn check_count(what: &str, count: usize, min: usize, max: usize) -> Result<()> {
    if count < min || count > max {
        return Err(Error::invalid_argument(format!(
            "Expected number of {what} [{min}..{max}], got {count}"
        )));
    }
    Ok(())
}

/// Byte count field for `len` payload bytes.
fn byte_count(len: usize) -> Result<u8> {
    u8::try_from(len).map_err(|_| Error::invalid_argument(format!("Payload too long: {len} bytes")))
}
