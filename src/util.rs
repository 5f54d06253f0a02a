// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common helpers

use crate::error::Error;

/// Turn a bool into a u16 coil value
#[must_use]
pub const fn bool_to_u16_coil(state: bool) -> u16 {
    if state { 0xFF00 } else { 0x0000 }
}

/// Turn a u16 coil value into a boolean value.
pub const fn u16_coil_to_bool(coil: u16) -> Result<bool, Error> {
    match coil {
        0xFF00 => Ok(true),
        0x0000 => Ok(false),
        _ => Err(Error::CoilValue(coil)),
    }
}

/// Calculate the number of bytes required for a given number of coils.
#[must_use]
pub const fn packed_coils_len(bitcount: usize) -> usize {
    bitcount.div_ceil(8)
}

/// Pack coils into bytes, LSB first.
#[must_use]
pub fn pack_coils(coils: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0; packed_coils_len(coils.len())];
    coils
        .iter()
        .enumerate()
        .filter(|(_, state)| **state)
        .for_each(|(i, _)| bytes[i / 8] |= 1 << (i % 8));
    bytes
}

/// Unpack `count` coils from bytes.
///
/// Fails if `bytes` holds fewer than `count` bits.
pub fn unpack_coils(bytes: &[u8], count: usize) -> Result<Vec<bool>, Error> {
    if bytes.len() < packed_coils_len(count) {
        return Err(Error::OutOfBounds {
            offset: 0,
            width: packed_coils_len(count),
            len: bytes.len(),
        });
    }
    Ok((0..count)
        .map(|i| (bytes[i / 8] >> (i % 8)) & 0b1 > 0)
        .collect())
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn convert_bool_to_coil() {
        assert_eq!(bool_to_u16_coil(true), 0xFF00);
        assert_eq!(bool_to_u16_coil(false), 0x0000);
    }

    #[test]
    fn convert_coil_to_bool() {
        assert!(u16_coil_to_bool(0xFF00).unwrap());
        assert!(!u16_coil_to_bool(0x0000).unwrap());
        assert!(matches!(
            u16_coil_to_bool(0x1234),
            Err(Error::CoilValue(0x1234))
        ));
    }

    #[test]
    fn pack_coils_into_bytes() {
        assert!(pack_coils(&[]).is_empty());
        assert_eq!(pack_coils(&[true]), &[0b_1]);
        assert_eq!(pack_coils(&[false]), &[0b_0]);
        assert_eq!(pack_coils(&[true, false]), &[0b_01]);
        assert_eq!(pack_coils(&[false, true]), &[0b_10]);
        assert_eq!(pack_coils(&[true; 8]), &[0b_1111_1111]);
        assert_eq!(pack_coils(&[false; 8]), &[0]);
        assert_eq!(pack_coils(&[true; 9]), &[0xff, 1]);
    }

    #[test]
    fn pack_nineteen_coils() {
        let states = [
            true, false, true, true, false, false, true, true, // 0xCD
            true, true, false, true, false, true, true, false, // 0x6B
            true, false, true, // 0x05
        ];
        assert_eq!(pack_coils(&states), &[0xCD, 0x6B, 0x05]);
    }

    #[test]
    fn unpack_coils_from_bytes() {
        assert!(unpack_coils(&[], 0).unwrap().is_empty());
        assert!(unpack_coils(&[1, 2, 3], 0).unwrap().is_empty());
        assert!(unpack_coils(&[], 1).is_err());
        assert!(unpack_coils(&[0xFF], 9).is_err());

        assert_eq!(unpack_coils(&[0b1], 1).unwrap(), &[true]);
        assert_eq!(unpack_coils(&[0b01], 2).unwrap(), &[true, false]);
        assert_eq!(unpack_coils(&[0b10], 2).unwrap(), &[false, true]);
        assert_eq!(unpack_coils(&[0b101], 3).unwrap(), &[true, false, true]);
        assert_eq!(unpack_coils(&[0xff, 0b11], 10).unwrap(), &[true; 10]);
    }

    #[test]
    fn coils_round_trip() {
        for n in [0, 1, 7, 8, 9, 16, 17] {
            let coils: Vec<bool> = (0..n).map(|i| (i * 7 + 3) % 5 < 2).collect();
            let packed = pack_coils(&coils);
            assert_eq!(packed.len(), packed_coils_len(n));
            assert_eq!(unpack_coils(&packed, n).unwrap(), coils, "n = {n}");
        }
    }
}
