// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{io, time::Duration};

use serialport::{DataBits, Parity, SerialPort, StopBits};

use super::{Connection, not_connected};
use crate::{
    codec::{BoxedInput, BoxedOutput},
    error::{Error, Result},
};

/// Serial port parity
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerialParity {
    None,
    Odd,
    /// Modbus RTU default
    #[default]
    Even,
}

/// Serial port configuration
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    pub parity: SerialParity,
    /// A blocked read returns after this duration
    pub read_timeout: Duration,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::default(),
            read_timeout: Duration::from_millis(100),
        }
    }

    #[must_use]
    pub fn data_bits(mut self, bits: u8) -> Self {
        self.data_bits = bits;
        self
    }

    #[must_use]
    pub fn stop_bits(mut self, bits: u8) -> Self {
        self.stop_bits = bits;
        self
    }

    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Data and stop bits as the port expects them.
    pub fn framing(&self) -> Result<(DataBits, StopBits)> {
        let data_bits = match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            bits => return Err(Error::invalid_argument(format!("{bits} data bits"))),
        };
        let stop_bits = match self.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            bits => return Err(Error::invalid_argument(format!("{bits} stop bits"))),
        };
        Ok((data_bits, stop_bits))
    }

    fn open(&self) -> io::Result<Box<dyn SerialPort>> {
        let (data_bits, stop_bits) = self
            .framing()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let parity = match self.parity {
            SerialParity::None => Parity::None,
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
        };
        let port = serialport::new(&self.port, self.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(self.read_timeout)
            .open()?;
        Ok(port)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0", 19200)
    }
}

/// A serial line, opened from a [`SerialConfig`].
pub struct SerialConnection {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialConnection {
    #[must_use]
    pub const fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    #[must_use]
    pub const fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn port(&self) -> io::Result<Box<dyn SerialPort>> {
        let port = self.port.as_ref().ok_or_else(not_connected)?;
        Ok(port.try_clone()?)
    }
}

impl Connection for SerialConnection {
    fn open(&mut self) -> io::Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = self.config.open()?;
        debug!(
            "Opened serial port {} at {} baud",
            self.config.port, self.config.baud_rate
        );
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.config.port);
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn input(&self) -> io::Result<BoxedInput> {
        Ok(Box::new(self.port()?))
    }

    fn output(&self) -> io::Result<BoxedOutput> {
        Ok(Box::new(self.port()?))
    }
}

impl std::fmt::Debug for SerialConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialConnection")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}
