// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connections provide the raw byte channels a transport works on.

use std::io;

use crate::codec::{BoxedInput, BoxedOutput};

#[cfg(feature = "serial")]
mod serial;
mod tcp;

#[cfg(feature = "serial")]
pub use self::serial::{SerialConfig, SerialConnection, SerialParity};
pub use self::tcp::{TcpConfig, TcpConnection};

/// Lifecycle of a byte stream connection.
///
/// A connection neither buffers nor interprets bytes.
pub trait Connection: Send {
    /// Establish the channels. Does nothing if already connected.
    fn open(&mut self) -> io::Result<()>;

    /// Release the channels. A read blocked on the input should return.
    fn close(&mut self);

    fn is_connected(&self) -> bool;

    fn input(&self) -> io::Result<BoxedInput>;

    fn output(&self) -> io::Result<BoxedOutput>;
}

pub(crate) fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "Connection is closed")
}
