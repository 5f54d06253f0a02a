// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU server (slave) specific functions.

use super::FrameLen;

/// Length of a request frame a slave receives, by function code.
#[must_use]
pub const fn request_len(fn_code: u8) -> Option<FrameLen> {
    let len = match fn_code {
        0x01..=0x06 | 0x08 => FrameLen::Fixed(8),
        0x07 | 0x0B | 0x0C | 0x11 => FrameLen::Fixed(4),
        0x0F | 0x10 => FrameLen::Counted {
            header: 7,
            count_at: 6,
            wide: false,
        },
        0x16 => FrameLen::Fixed(10),
        0x17 => FrameLen::Counted {
            header: 11,
            count_at: 10,
            wide: false,
        },
        0x18 => FrameLen::Fixed(6),
        // MEI type, read device id code and object id
        0x2B => FrameLen::Fixed(7),
        _ => return None,
    };
    Some(len)
}
