// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cursor based integer codec over byte slices.
//!
//! A [`ByteReader`] borrows a slice immutably, a [`ByteWriter`] mutably.
//! Both advance their offset by the width of every value. Reads are masked
//! to the requested width, so a two byte value is never sign extended unless
//! it is explicitly read with [`ByteReader::get_signed`].
//!
//! ```
//! use modbus_link::cursor::{be, be_mut};
//!
//! let mut raw = [0u8; 5];
//! be_mut(&mut raw).put_u8(0x03)?.put_u16(0xABCD)?.put_u16(12)?;
//! assert_eq!(raw, [0x03, 0xAB, 0xCD, 0x00, 0x0C]);
//!
//! let mut reader = be(&raw).offset(1);
//! assert_eq!(reader.get_u16()?, 0xABCD);
//! # Ok::<(), modbus_link::Error>(())
//! ```

use core::marker::PhantomData;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Width of an encoded integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte = 1,
    Short = 2,
    Int = 4,
    Long = 8,
}

impl Width {
    /// Number of bytes.
    #[must_use]
    pub const fn len(self) -> usize {
        self as usize
    }

    const fn mask(self) -> u64 {
        match self {
            Self::Long => u64::MAX,
            w => (1u64 << (w.len() * 8)) - 1,
        }
    }
}

/// Read cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'b, E> {
    buf: &'b [u8],
    offset: usize,
    _order: PhantomData<E>,
}

/// Write cursor over a mutably borrowed byte slice.
#[derive(Debug)]
pub struct ByteWriter<'b, E> {
    buf: &'b mut [u8],
    offset: usize,
    _order: PhantomData<E>,
}

/// Big-endian reader starting at offset `0`.
#[must_use]
pub const fn be(buf: &[u8]) -> ByteReader<'_, BigEndian> {
    ByteReader::new(buf)
}

/// Big-endian writer starting at offset `0`.
pub fn be_mut(buf: &mut [u8]) -> ByteWriter<'_, BigEndian> {
    ByteWriter::new(buf)
}

/// Little-endian reader starting at offset `0`.
#[must_use]
pub const fn le(buf: &[u8]) -> ByteReader<'_, LittleEndian> {
    ByteReader::new(buf)
}

/// Little-endian writer starting at offset `0`.
pub fn le_mut(buf: &mut [u8]) -> ByteWriter<'_, LittleEndian> {
    ByteWriter::new(buf)
}

fn bounds(offset: usize, width: usize, len: usize) -> Result<core::ops::Range<usize>> {
    match offset.checked_add(width) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(Error::OutOfBounds { offset, width, len }),
    }
}

impl<'b, E: ByteOrder> ByteReader<'b, E> {
    #[must_use]
    pub const fn new(buf: &'b [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            _order: PhantomData,
        }
    }

    /// Move the cursor to an absolute `offset`.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Current cursor position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.offset
    }

    /// Number of bytes left behind the cursor.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    /// Read an unsigned value of `width` bytes.
    pub fn get(&mut self, width: Width) -> Result<u64> {
        let range = bounds(self.offset, width.len(), self.buf.len())?;
        let value = E::read_uint(&self.buf[range], width.len()) & width.mask();
        self.offset += width.len();
        Ok(value)
    }

    /// Read a sign extended value of `width` bytes.
    pub fn get_signed(&mut self, width: Width) -> Result<i64> {
        let range = bounds(self.offset, width.len(), self.buf.len())?;
        let value = E::read_int(&self.buf[range], width.len());
        self.offset += width.len();
        Ok(value)
    }

    /// Borrow the next `len` bytes.
    pub fn get_bytes(&mut self, len: usize) -> Result<&'b [u8]> {
        let range = bounds(self.offset, len, self.buf.len())?;
        self.offset += len;
        Ok(&self.buf[range])
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.get(Width::Byte).map(|v| v as u8)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        self.get(Width::Short).map(|v| v as u16)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.get(Width::Int).map(|v| v as u32)
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        self.get(Width::Long)
    }

    pub fn get_i8(&mut self) -> Result<i8> {
        self.get_signed(Width::Byte).map(|v| v as i8)
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        self.get_signed(Width::Short).map(|v| v as i16)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        self.get_signed(Width::Int).map(|v| v as i32)
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        self.get_signed(Width::Long)
    }
}

impl<'b, E: ByteOrder> ByteWriter<'b, E> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            _order: PhantomData,
        }
    }

    /// Move the cursor to an absolute `offset`.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Current cursor position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.offset
    }

    /// Write the low `width` bytes of `value`.
    pub fn put(&mut self, value: u64, width: Width) -> Result<&mut Self> {
        let range = bounds(self.offset, width.len(), self.buf.len())?;
        E::write_uint(&mut self.buf[range], value & width.mask(), width.len());
        self.offset += width.len();
        Ok(self)
    }

    /// Write the two's complement of `value` truncated to `width` bytes.
    pub fn put_signed(&mut self, value: i64, width: Width) -> Result<&mut Self> {
        self.put(value as u64, width)
    }

    /// Copy `bytes` verbatim.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        let range = bounds(self.offset, bytes.len(), self.buf.len())?;
        self.buf[range].copy_from_slice(bytes);
        self.offset += bytes.len();
        Ok(self)
    }

    pub fn put_u8(&mut self, value: u8) -> Result<&mut Self> {
        self.put(u64::from(value), Width::Byte)
    }

    pub fn put_u16(&mut self, value: u16) -> Result<&mut Self> {
        self.put(u64::from(value), Width::Short)
    }

    pub fn put_u32(&mut self, value: u32) -> Result<&mut Self> {
        self.put(u64::from(value), Width::Int)
    }

    pub fn put_u64(&mut self, value: u64) -> Result<&mut Self> {
        self.put(value, Width::Long)
    }

    pub fn put_i16(&mut self, value: i16) -> Result<&mut Self> {
        self.put_signed(i64::from(value), Width::Short)
    }

    pub fn put_i32(&mut self, value: i32) -> Result<&mut Self> {
        self.put_signed(i64::from(value), Width::Int)
    }

    pub fn put_i64(&mut self, value: i64) -> Result<&mut Self> {
        self.put_signed(value, Width::Long)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read_big_endian() {
        let buf = &mut [0u8; 15];
        be_mut(buf)
            .put_u8(0x01)
            .unwrap()
            .put_u16(0x0203)
            .unwrap()
            .put_u32(0x0405_0607)
            .unwrap()
            .put_u64(0x0809_0A0B_0C0D_0E0F)
            .unwrap();
        assert_eq!(
            buf,
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F]
        );

        let mut reader = be(buf);
        assert_eq!(reader.get_u8().unwrap(), 0x01);
        assert_eq!(reader.get_u16().unwrap(), 0x0203);
        assert_eq!(reader.get_u32().unwrap(), 0x0405_0607);
        assert_eq!(reader.get_u64().unwrap(), 0x0809_0A0B_0C0D_0E0F);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn write_and_read_little_endian() {
        let buf = &mut [0u8; 6];
        le_mut(buf)
            .put_u16(0xABCD)
            .unwrap()
            .put_u32(0x1122_3344)
            .unwrap();
        assert_eq!(buf, &[0xCD, 0xAB, 0x44, 0x33, 0x22, 0x11]);
        let mut reader = le(buf);
        assert_eq!(reader.get_u16().unwrap(), 0xABCD);
        assert_eq!(reader.get_u32().unwrap(), 0x1122_3344);
    }

    #[test]
    fn reads_are_masked_to_width() {
        let buf = &[0xFF, 0xFE];
        assert_eq!(be(buf).get(Width::Short).unwrap(), 0xFFFE);
        assert_eq!(be(buf).get_signed(Width::Short).unwrap(), -2);
        assert_eq!(be(buf).get_i8().unwrap(), -1);
        assert_eq!(be(buf).get_u8().unwrap(), 0xFF);
    }

    #[test]
    fn writes_truncate_to_width() {
        let buf = &mut [0u8; 3];
        be_mut(buf)
            .put(0x1_2345, Width::Short)
            .unwrap()
            .put_signed(-1, Width::Byte)
            .unwrap();
        assert_eq!(buf, &[0x23, 0x45, 0xFF]);
    }

    #[test]
    fn offset_positions_the_cursor() {
        let buf = &[0x10, 0x00, 0x06, 0x00, 0x02];
        let mut reader = be(buf).offset(3);
        assert_eq!(reader.position(), 3);
        assert_eq!(reader.get_u16().unwrap(), 2);
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn out_of_bounds() {
        let buf = &[0x01, 0x02];
        let mut reader = be(buf).offset(1);
        assert!(matches!(
            reader.get_u16(),
            Err(Error::OutOfBounds {
                offset: 1,
                width: 2,
                len: 2
            })
        ));
        // a failed read leaves the cursor in place
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.get_u8().unwrap(), 0x02);

        let buf = &mut [0u8; 1];
        assert!(be_mut(buf).put_u16(1).is_err());
        assert!(be_mut(buf).put_bytes(&[1, 2]).is_err());
    }

    #[test]
    fn offset_near_usize_max_is_out_of_bounds() {
        let buf = &[0x01, 0x02];
        assert!(matches!(
            be(buf).offset(usize::MAX).get_u16(),
            Err(Error::OutOfBounds {
                offset: usize::MAX,
                width: 2,
                len: 2
            })
        ));
        assert!(be(buf).offset(usize::MAX - 1).get_bytes(4).is_err());
        let buf = &mut [0u8; 2];
        assert!(be_mut(buf).offset(usize::MAX).put_u8(1).is_err());
    }

    #[test]
    fn copy_bytes() {
        let buf = &mut [0u8; 4];
        be_mut(buf).put_u8(0x0F).unwrap().put_bytes(&[0xCD, 0x6B]).unwrap();
        assert_eq!(buf, &[0x0F, 0xCD, 0x6B, 0x00]);
        assert_eq!(be(buf).offset(1).get_bytes(2).unwrap(), &[0xCD, 0x6B]);
    }
}
