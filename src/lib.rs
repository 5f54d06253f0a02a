// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![doc = include_str!("../README.md")]

#[macro_use]
extern crate log;

pub mod codec;
pub mod connection;
pub mod cursor;
mod error;
pub mod event;
pub mod frame;
pub mod protocol;
pub mod server;
pub mod util;

#[cfg(feature = "rtu")]
pub use codec::rtu;
#[cfg(feature = "tcp")]
pub use codec::tcp;
pub use error::{Error, Result};
pub use frame::*;
