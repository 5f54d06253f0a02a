// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    io,
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use super::{Connection, not_connected};
use crate::codec::{BoxedInput, BoxedOutput};

/// TCP connection configuration
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// `host:port`
    pub endpoint: String,
    /// Give up connecting after this duration
    pub connect_timeout: Option<Duration>,
    /// A blocked read returns after this duration, so that a protocol
    /// can notice a stop request without closing the socket.
    pub read_timeout: Option<Duration>,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl TcpConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: None,
            read_timeout: None,
            nodelay: true,
        }
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    fn connect(&self) -> io::Result<TcpStream> {
        let Some(timeout) = self.connect_timeout else {
            return TcpStream::connect(&self.endpoint);
        };
        let mut last_err = None;
        for addr in self.endpoint.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("No address found for {}", self.endpoint),
            )
        }))
    }
}

type Connector = Box<dyn FnMut() -> io::Result<TcpStream> + Send>;

/// A TCP socket obtained from a connector on every [`Connection::open`].
pub struct TcpConnection {
    connector: Connector,
    socket: Option<TcpStream>,
    read_timeout: Option<Duration>,
    nodelay: bool,
}

impl TcpConnection {
    #[must_use]
    pub fn new(config: TcpConfig) -> Self {
        let read_timeout = config.read_timeout;
        let nodelay = config.nodelay;
        let mut conn = Self::with_connector(move || config.connect());
        conn.read_timeout = read_timeout;
        conn.nodelay = nodelay;
        conn
    }

    /// Obtain sockets from `connector`.
    pub fn with_connector<F>(connector: F) -> Self
    where
        F: FnMut() -> io::Result<TcpStream> + Send + 'static,
    {
        Self {
            connector: Box::new(connector),
            socket: None,
            read_timeout: None,
            nodelay: false,
        }
    }

    /// Wrap a socket that is already connected, e.g. an accepted one.
    ///
    /// Once closed it cannot be opened again.
    #[must_use]
    pub fn from_stream(socket: TcpStream) -> Self {
        let mut conn = Self::with_connector(|| {
            Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "Accepted socket cannot be reopened",
            ))
        });
        conn.socket = Some(socket);
        conn
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn socket(&self) -> io::Result<&TcpStream> {
        self.socket.as_ref().ok_or_else(not_connected)
    }
}

impl Connection for TcpConnection {
    fn open(&mut self) -> io::Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let socket = (self.connector)()?;
        socket.set_read_timeout(self.read_timeout)?;
        if self.nodelay {
            socket.set_nodelay(true)?;
        }
        debug!("Connected to {:?}", socket.peer_addr());
        self.socket = Some(socket);
        Ok(())
    }

    fn close(&mut self) {
        let Some(socket) = self.socket.take() else {
            return;
        };
        if let Err(err) = socket.shutdown(Shutdown::Both) {
            debug!("Failed to shut down socket: {err}");
        }
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn input(&self) -> io::Result<BoxedInput> {
        let socket = self.socket()?.try_clone()?;
        socket.set_read_timeout(self.read_timeout)?;
        Ok(Box::new(socket))
    }

    fn output(&self) -> io::Result<BoxedOutput> {
        Ok(Box::new(self.socket()?.try_clone()?))
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("socket", &self.socket)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::TcpListener,
    };

    use super::*;

    #[test]
    fn open_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut opened = 0;
        let mut conn = TcpConnection::with_connector(move || {
            opened += 1;
            assert_eq!(opened, 1, "connector called twice");
            TcpStream::connect(addr)
        });
        assert!(!conn.is_connected());
        conn.open().unwrap();
        conn.open().unwrap();
        assert!(conn.is_connected());
    }

    #[test]
    fn exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = TcpConfig::new(listener.local_addr().unwrap().to_string())
            .connect_timeout(Duration::from_secs(1));
        let mut conn = TcpConnection::new(config);
        conn.open().unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        conn.output().unwrap().write_all(&[1, 2, 3]).unwrap();
        let buf = &mut [0; 3];
        peer.read_exact(buf).unwrap();
        assert_eq!(buf, &[1, 2, 3]);

        peer.write_all(&[4, 5]).unwrap();
        let mut input = conn.input().unwrap();
        let buf = &mut [0; 2];
        input.read_exact(buf).unwrap();
        assert_eq!(buf, &[4, 5]);

        conn.close();
        assert!(!conn.is_connected());
        // the peer sees the end of stream
        assert_eq!(peer.read(&mut [0; 1]).unwrap(), 0);
    }

    #[test]
    fn close_unblocks_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut conn = TcpConnection::new(TcpConfig::new(
            listener.local_addr().unwrap().to_string(),
        ));
        conn.open().unwrap();
        let _peer = listener.accept().unwrap();
        let mut input = conn.input().unwrap();
        let reader = std::thread::spawn(move || input.read(&mut [0; 1]));
        std::thread::sleep(Duration::from_millis(50));
        conn.close();
        assert_eq!(reader.join().unwrap().unwrap(), 0);
    }

    #[test]
    fn failed_open_stays_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let mut conn = TcpConnection::new(TcpConfig::new(addr.to_string()));
        assert!(conn.open().is_err());
        assert!(!conn.is_connected());
        assert_eq!(
            conn.input().err().map(|err| err.kind()),
            Some(io::ErrorKind::NotConnected)
        );
    }

    #[test]
    fn read_timeout_applies_to_input() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = TcpConfig::new(listener.local_addr().unwrap().to_string())
            .read_timeout(Duration::from_millis(20));
        let mut conn = TcpConnection::new(config);
        conn.open().unwrap();
        let _peer = listener.accept().unwrap();
        let err = conn.input().unwrap().read(&mut [0; 1]).unwrap_err();
        assert!(matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ));
    }

    #[test]
    fn accepted_socket_cannot_reopen() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let mut conn = TcpConnection::from_stream(client);
        assert!(conn.is_connected());
        conn.open().unwrap();
        conn.close();
        assert!(conn.open().is_err());
    }
}
