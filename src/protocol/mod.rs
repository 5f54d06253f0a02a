// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The protocol engine.
//!
//! A [`Protocol`] owns a [`Connection`] and a [`Transport`]. Its read loop
//! runs on one thread and publishes every frame it reads, while frames may
//! be sent from any thread. Everything that happens is reported through
//! four [`Event`]s: frames received, frames sent, connection changes and
//! errors.

use std::{
    fmt, io,
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{
    codec::Transport,
    connection::Connection,
    error::{Error, Result},
    event::{Dispatch, Event},
};

mod master;
mod slave;

pub use self::{
    master::Master,
    slave::{Command, Slave},
};

/// Lifecycle of a [`Protocol`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Never started.
    Idle,
    Connecting,
    /// The read loop is running.
    Reading,
    /// Termination was requested.
    Stopping,
    /// The read loop has ended.
    Disconnected,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// How long [`Protocol::stop`] waits for the read loop before the
    /// connection is closed underneath it.
    pub stop_timeout: Duration,
    pub dispatch: Dispatch,
}

impl ProtocolConfig {
    pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

    #[must_use]
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    #[must_use]
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            stop_timeout: Self::DEFAULT_STOP_TIMEOUT,
            dispatch: Dispatch::default(),
        }
    }
}

/// Drives a transport over a connection.
pub struct Protocol<T: Transport> {
    connection: Mutex<Box<dyn Connection>>,
    transport: T,
    state: Mutex<State>,
    state_changed: Condvar,
    stop_timeout: Mutex<Duration>,
    worker: Mutex<Option<ThreadId>>,
    received: Event<T::Frame>,
    sent: Event<T::Frame>,
    connection_changed: Event<ConnectionEvent>,
    errors: Event<Error>,
}

impl<T: Transport> Protocol<T> {
    pub fn new(connection: impl Connection + 'static, transport: T) -> Self {
        Self::with_config(connection, transport, ProtocolConfig::default())
    }

    pub fn with_config(
        connection: impl Connection + 'static,
        transport: T,
        config: ProtocolConfig,
    ) -> Self {
        let protocol = Self {
            connection: Mutex::new(Box::new(connection)),
            transport,
            state: Mutex::new(State::Idle),
            state_changed: Condvar::new(),
            stop_timeout: Mutex::new(config.stop_timeout),
            worker: Mutex::new(None),
            received: Event::new("frame-received"),
            sent: Event::new("frame-sent"),
            connection_changed: Event::new("connection-changed"),
            errors: Event::new("error"),
        };
        protocol.set_dispatch(config.dispatch);
        protocol
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Frames read by the read loop, in stream order.
    pub const fn frame_received(&self) -> &Event<T::Frame> {
        &self.received
    }

    /// Frames written successfully.
    pub const fn frame_sent(&self) -> &Event<T::Frame> {
        &self.sent
    }

    pub const fn connection_changed(&self) -> &Event<ConnectionEvent> {
        &self.connection_changed
    }

    /// Decode errors and I/O failures.
    pub const fn errors(&self) -> &Event<Error> {
        &self.errors
    }

    #[must_use]
    pub fn state(&self) -> State {
        *self.state.lock()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_connected()
    }

    pub fn set_timeout(&self, stop_timeout: Duration) {
        *self.stop_timeout.lock() = stop_timeout;
    }

    /// Change the dispatch policy of all four events.
    pub fn set_dispatch(&self, dispatch: Dispatch) {
        self.received.set_dispatch(dispatch);
        self.sent.set_dispatch(dispatch);
        self.connection_changed.set_dispatch(dispatch);
        self.errors.set_dispatch(dispatch);
    }

    /// Open the connection and hand its channels to the transport.
    ///
    /// Does nothing if the connection is already open and attached.
    pub fn connect(&self) -> Result<()> {
        {
            let mut connection = self.connection.lock();
            if connection.is_connected() && self.transport.stream().is_attached() {
                return Ok(());
            }
            connection.open()?;
            let channels = connection
                .input()
                .and_then(|input| Ok((input, connection.output()?)));
            let (input, output) = match channels {
                Ok(channels) => channels,
                Err(err) => {
                    connection.close();
                    return Err(err.into());
                }
            };
            self.transport.initialize(input, output);
        }
        debug!("Connected");
        self.connection_changed.publish(ConnectionEvent::Connected);
        Ok(())
    }

    /// Close the connection. Does nothing if it is closed already.
    pub fn disconnect(&self) {
        {
            let mut connection = self.connection.lock();
            if !connection.is_connected() {
                return;
            }
            connection.close();
        }
        debug!("Disconnected");
        self.connection_changed
            .publish(ConnectionEvent::Disconnected);
    }

    /// Connect and read frames until stopped or the connection fails.
    ///
    /// Blocks the calling thread. Returns the I/O error that ended the
    /// read loop, if any.
    pub fn run(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, State::Idle | State::Disconnected) {
                return Err(Error::invalid_argument(format!(
                    "Protocol is already running ({:?})",
                    *state
                )));
            }
            *state = State::Connecting;
        }
        *self.worker.lock() = Some(thread::current().id());
        let result = match self.connect().and_then(|()| self.read_loop()) {
            // closing the connection is how a blocked read gets stopped
            Err(err) if err.is_io() && self.state() == State::Stopping => {
                debug!("Read loop ended while stopping: {err}");
                Ok(())
            }
            Err(err) => {
                error!("Protocol terminated: {err}");
                self.errors.publish(err.clone());
                Err(err)
            }
            Ok(()) => Ok(()),
        };
        self.disconnect();
        self.transport.stream().detach();
        self.worker.lock().take();
        self.set_state(State::Disconnected);
        result
    }

    /// Run the read loop on a thread of its own.
    pub fn start(self: &Arc<Self>) -> io::Result<JoinHandle<Result<()>>> {
        let protocol = Arc::clone(self);
        thread::Builder::new()
            .name("protocol-reader".into())
            .spawn(move || protocol.run())
    }

    fn read_loop(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != State::Connecting {
                return Ok(());
            }
            *state = State::Reading;
        }
        debug!("Reading frames");
        while self.state() == State::Reading {
            match self.transport.read() {
                Ok(frame) => self.received.publish(frame),
                Err(err) if err.is_idle() => {}
                Err(err) if err.is_io() => return Err(err),
                Err(err) => {
                    warn!("Discarded invalid frame: {err}");
                    self.errors.publish(err);
                }
            }
        }
        Ok(())
    }

    /// Write one frame.
    ///
    /// A failed write stops the read loop.
    pub fn send(&self, frame: &T::Frame) -> Result<()> {
        if let Err(err) = self.transport.write(frame) {
            error!("Failed to send frame: {err}");
            self.request_stop();
            self.disconnect();
            self.errors.publish(err.clone());
            return Err(err);
        }
        self.sent.publish(frame.clone());
        Ok(())
    }

    /// End the read loop and close the connection.
    ///
    /// Waits up to the stop timeout for the read loop to notice, then
    /// closes the connection to release a blocked read.
    pub fn stop(&self) {
        let running = self.request_stop();
        let on_worker = *self.worker.lock() == Some(thread::current().id());
        if running && !on_worker {
            let timeout = *self.stop_timeout.lock();
            if !self.wait_for(State::Disconnected, timeout) {
                debug!("Read loop still running after {timeout:?}, closing connection");
            }
        }
        self.disconnect();
        if running && !on_worker {
            let timeout = *self.stop_timeout.lock();
            self.wait_for(State::Disconnected, timeout);
        }
    }

    /// Returns `true` if the read loop was running.
    fn request_stop(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            State::Connecting | State::Reading => {
                *state = State::Stopping;
                self.state_changed.notify_all();
                true
            }
            State::Stopping => true,
            State::Idle | State::Disconnected => false,
        }
    }

    fn set_state(&self, next: State) {
        let mut state = self.state.lock();
        trace!("State {:?} -> {next:?}", *state);
        *state = next;
        self.state_changed.notify_all();
    }

    fn wait_for(&self, target: State, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state != target {
            if self
                .state_changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return *state == target;
            }
        }
        true
    }
}

impl<T: Transport> fmt::Debug for Protocol<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
