// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus slave dispatching requests by function code.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;

#[cfg(feature = "rtu")]
use crate::codec::rtu::{Rtu, RtuTransport};
#[cfg(feature = "tcp")]
use crate::codec::tcp::{Mbap, MbapTransport};
use crate::{
    codec::Transport,
    error::Result,
    event::Subscription,
    frame::{Adu, DeviceAddress, Exception, FunctionCode, Pdu, factory::slave},
    protocol::Protocol,
};

/// Computes the response PDU of a request PDU.
pub type Handler = Box<dyn Fn(&Pdu) -> Result<Pdu> + Send + Sync>;

/// Wraps a response PDU into the ADU variant of its request.
pub trait ResponseFactory<F>: Send + Sync {
    fn response(&self, request: &F, pdu: &Pdu) -> Result<F>;
}

impl<F, C> ResponseFactory<F> for C
where
    C: Fn(&F, &Pdu) -> Result<F> + Send + Sync,
{
    fn response(&self, request: &F, pdu: &Pdu) -> Result<F> {
        self(request, pdu)
    }
}

/// Answer with the MBAP header of the request.
#[cfg(feature = "tcp")]
pub fn mbap_response(request: &Mbap, pdu: &Pdu) -> Result<Mbap> {
    Mbap::new(request.header(), pdu)
}

/// Answer with the slave id of the request.
#[cfg(feature = "rtu")]
pub fn rtu_response(request: &Rtu, pdu: &Pdu) -> Result<Rtu> {
    Ok(Rtu::new(request.slave(), pdu))
}

struct Dispatcher<F> {
    device: DeviceAddress,
    handlers: RwLock<HashMap<u8, Handler>>,
    factory: Box<dyn ResponseFactory<F>>,
}

impl<F: Adu> Dispatcher<F> {
    fn respond(&self, request: &F) -> Option<Result<F>> {
        if request.device_address() != self.device {
            trace!(
                "Ignored request for device {}",
                request.device_address()
            );
            return None;
        }
        let pdu = request.pdu();
        let function = FunctionCode::new(pdu.function_code());
        if let Err(err) = pdu.request().check_byte_count() {
            debug!("Rejected request of function {function}: {err}");
            let response = slave::exception(function, Exception::IllegalDataValue.code());
            return Some(response.and_then(|pdu| self.factory.response(request, &pdu)));
        }
        let response = match self.handlers.read().get(&function.value()) {
            Some(handler) => handler(&pdu).or_else(|err| {
                warn!("Handler of function {function} failed: {err}");
                slave::exception(function, Exception::ServerDeviceFailure.code())
            }),
            None => {
                debug!("No handler for function {function}");
                slave::exception(function, Exception::IllegalFunction.code())
            }
        };
        Some(response.and_then(|pdu| self.factory.response(request, &pdu)))
    }
}

/// Answers requests addressed to one device with the handler registered
/// for their function code.
///
/// Requests without a handler are answered with an illegal function
/// exception, failing handlers with a server device failure.
pub struct Server<T: Transport>
where
    T::Frame: Adu,
{
    protocol: Arc<Protocol<T>>,
    dispatcher: Arc<Dispatcher<T::Frame>>,
    subscription: Subscription,
}

impl<T> Server<T>
where
    T: Transport,
    T::Frame: Adu,
{
    pub fn new(
        protocol: Arc<Protocol<T>>,
        device: DeviceAddress,
        factory: impl ResponseFactory<T::Frame> + 'static,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher {
            device,
            handlers: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
        });
        let subscription = {
            let dispatcher = Arc::clone(&dispatcher);
            let weak = Arc::downgrade(&protocol);
            protocol
                .frame_received()
                .subscribe(move |request: &T::Frame| serve(&weak, &dispatcher, request))
        };
        Self {
            protocol,
            dispatcher,
            subscription,
        }
    }

    pub const fn protocol(&self) -> &Arc<Protocol<T>> {
        &self.protocol
    }

    #[must_use]
    pub fn device(&self) -> DeviceAddress {
        self.dispatcher.device
    }

    /// Register the handler of `function`, replacing a previous one.
    pub fn register<H>(&self, function: FunctionCode, handler: H)
    where
        H: Fn(&Pdu) -> Result<Pdu> + Send + Sync + 'static,
    {
        self.dispatcher
            .handlers
            .write()
            .insert(function.value(), Box::new(handler));
    }

    /// The response to `request`, or `None` if it is addressed to another
    /// device.
    pub fn respond(&self, request: &T::Frame) -> Option<Result<T::Frame>> {
        self.dispatcher.respond(request)
    }
}

#[cfg(feature = "tcp")]
impl Server<MbapTransport> {
    pub fn mbap(protocol: Arc<Protocol<MbapTransport>>, unit_id: DeviceAddress) -> Self {
        Self::new(protocol, unit_id, mbap_response)
    }
}

#[cfg(feature = "rtu")]
impl Server<RtuTransport> {
    pub fn rtu(protocol: Arc<Protocol<RtuTransport>>, slave: DeviceAddress) -> Self {
        Self::new(protocol, slave, rtu_response)
    }
}

fn serve<T>(
    protocol: &Weak<Protocol<T>>,
    dispatcher: &Dispatcher<T::Frame>,
    request: &T::Frame,
) where
    T: Transport,
    T::Frame: Adu,
{
    let Some(protocol) = protocol.upgrade() else {
        return;
    };
    match dispatcher.respond(request) {
        None => {}
        Some(Ok(response)) => {
            // a failed send is published by the protocol
            let _ = protocol.send(&response);
        }
        Some(Err(err)) => {
            warn!("Failed to build response: {err}");
            protocol.errors().publish(err);
        }
    }
}

impl<T> Drop for Server<T>
where
    T: Transport,
    T::Frame: Adu,
{
    fn drop(&mut self) {
        self.protocol.frame_received().unsubscribe(self.subscription);
    }
}

impl<T> fmt::Debug for Server<T>
where
    T: Transport,
    T::Frame: Adu,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("device", &self.dispatcher.device)
            .field("functions", &self.dispatcher.handlers.read().len())
            .finish_non_exhaustive()
    }
}
