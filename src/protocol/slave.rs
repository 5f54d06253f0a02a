// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;

use super::Protocol;
use crate::{
    codec::Transport,
    error::{Error, Result},
    event::Subscription,
    frame::Packet,
};

/// Answers the requests it supports.
pub trait Command<F>: Send + Sync {
    fn is_supported(&self, request: &F) -> bool;

    fn execute(&self, request: &F) -> Result<F>;
}

/// A predicate and a handler.
impl<F, P, H> Command<F> for (P, H)
where
    P: Fn(&F) -> bool + Send + Sync,
    H: Fn(&F) -> Result<F> + Send + Sync,
{
    fn is_supported(&self, request: &F) -> bool {
        (self.0)(request)
    }

    fn execute(&self, request: &F) -> Result<F> {
        (self.1)(request)
    }
}

type Commands<F> = RwLock<Vec<Box<dyn Command<F>>>>;

/// Dispatches every received frame to the first command supporting it
/// and sends the result back unmodified.
///
/// Requests no command supports and failing commands are published as
/// errors of the protocol.
pub struct Slave<T: Transport> {
    protocol: Arc<Protocol<T>>,
    commands: Arc<Commands<T::Frame>>,
    subscription: Subscription,
}

impl<T: Transport> Slave<T> {
    pub fn new(protocol: Arc<Protocol<T>>) -> Self {
        let commands: Arc<Commands<T::Frame>> = Arc::new(RwLock::new(Vec::new()));
        let subscription = {
            let commands = Arc::clone(&commands);
            // the protocol owns the handler, a strong reference would leak both
            let weak = Arc::downgrade(&protocol);
            protocol
                .frame_received()
                .subscribe(move |request: &T::Frame| handle(&weak, &commands, request))
        };
        Self {
            protocol,
            commands,
            subscription,
        }
    }

    pub const fn protocol(&self) -> &Arc<Protocol<T>> {
        &self.protocol
    }

    /// Append a command. Earlier commands take precedence.
    pub fn register_command(&self, command: impl Command<T::Frame> + 'static) {
        self.commands.write().push(Box::new(command));
    }
}

fn handle<T: Transport>(
    protocol: &Weak<Protocol<T>>,
    commands: &Commands<T::Frame>,
    request: &T::Frame,
) {
    let Some(protocol) = protocol.upgrade() else {
        return;
    };
    let response = {
        let commands = commands.read();
        let Some(command) = commands.iter().find(|command| command.is_supported(request)) else {
            warn!("No command for request: {:02X?}", request.rawdata());
            protocol.errors().publish(Error::CommandNotFound);
            return;
        };
        command.execute(request)
    };
    match response {
        // a failed send is published by the protocol
        Ok(response) => {
            let _ = protocol.send(&response);
        }
        Err(err) => {
            warn!("Command failed: {err}");
            protocol.errors().publish(err);
        }
    }
}

impl<T: Transport> Drop for Slave<T> {
    fn drop(&mut self) {
        self.protocol.frame_received().unsubscribe(self.subscription);
    }
}

impl<T: Transport> fmt::Debug for Slave<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slave")
            .field("protocol", &self.protocol)
            .field("commands", &self.commands.read().len())
            .finish()
    }
}
