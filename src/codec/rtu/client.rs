// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU client (master) specific functions.

use super::FrameLen;
use crate::frame::EXCEPTION_FLAG;

/// Length of a response frame a master receives, by function code.
#[must_use]
pub const fn response_len(fn_code: u8) -> Option<FrameLen> {
    if fn_code & EXCEPTION_FLAG != 0 {
        return Some(FrameLen::Fixed(5));
    }
    let len = match fn_code {
        0x01..=0x04 | 0x0C | 0x11 | 0x17 => FrameLen::Counted {
            header: 3,
            count_at: 2,
            wide: false,
        },
        0x05 | 0x06 | 0x08 | 0x0B | 0x0F | 0x10 => FrameLen::Fixed(8),
        0x07 => FrameLen::Fixed(5),
        0x16 => FrameLen::Fixed(10),
        0x18 => FrameLen::Counted {
            header: 4,
            count_at: 2,
            wide: true,
        },
        _ => return None,
    };
    Some(len)
}
