// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multicast notification.
//!
//! An [`Event`] keeps a list of handlers and hands every published payload
//! to each of them, either on the publishing thread or on a thread of its
//! own. A panicking handler is logged and does not keep the others from
//! running.
//!
//! ```
//! use modbus_link::event::Event;
//!
//! let event = Event::new("greeting");
//! let (_, rx) = event.channel();
//! event.publish(String::from("hello"));
//! assert_eq!(rx.recv().unwrap(), "hello");
//! ```

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
};

use crossbeam_channel::Receiver;
use parking_lot::RwLock;

/// Where handlers run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// On the publishing thread, one after the other, in subscription order.
    #[default]
    Inline,
    /// Each handler on a thread of its own.
    Detached,
}

/// Identifies a subscribed handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Returns `false` once it wants no further payloads.
type Handler<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

type Handlers<T> = Arc<RwLock<Vec<(Subscription, Handler<T>)>>>;

/// An observer list with a dispatch policy.
pub struct Event<T> {
    name: &'static str,
    handlers: Handlers<T>,
    next_id: AtomicU64,
    dispatch: RwLock<Dispatch>,
}

impl<T: Send + Sync + 'static> Event<T> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(0),
            dispatch: RwLock::new(Dispatch::default()),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.attach(Arc::new(move |payload: &T| {
            handler(payload);
            true
        }))
    }

    fn attach(&self, handler: Handler<T>) -> Subscription {
        let id = Subscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, handler));
        id
    }

    /// Remove a handler. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: Subscription) -> bool {
        remove(&self.handlers, id)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    #[must_use]
    pub fn dispatch(&self) -> Dispatch {
        *self.dispatch.read()
    }

    pub fn set_dispatch(&self, dispatch: Dispatch) {
        *self.dispatch.write() = dispatch;
    }

    /// Hand `payload` to every handler subscribed at this moment.
    pub fn publish(&self, payload: T) {
        let handlers: Vec<(Subscription, Handler<T>)> = self
            .handlers
            .read()
            .iter()
            .map(|(id, handler)| (*id, Arc::clone(handler)))
            .collect();
        if handlers.is_empty() {
            return;
        }
        let payload = Arc::new(payload);
        match self.dispatch() {
            Dispatch::Inline => {
                for (id, handler) in &handlers {
                    if !invoke(self.name, handler, &payload) {
                        remove(&self.handlers, *id);
                    }
                }
            }
            Dispatch::Detached => {
                for (id, handler) in handlers {
                    let payload = Arc::clone(&payload);
                    let list = Arc::downgrade(&self.handlers);
                    let name = self.name;
                    let spawned = thread::Builder::new()
                        .name(format!("{name}-handler"))
                        .spawn(move || {
                            if !invoke(name, &handler, &payload) {
                                if let Some(list) = list.upgrade() {
                                    remove(&list, id);
                                }
                            }
                        });
                    if let Err(err) = spawned {
                        error!("Failed to spawn handler thread for {name} event: {err}");
                    }
                }
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Event<T> {
    /// Subscribe a channel that receives a copy of every payload.
    ///
    /// The subscription ends with the first payload published after the
    /// receiver has been dropped.
    pub fn channel(&self) -> (Subscription, Receiver<T>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let name = self.name;
        let id = self.attach(Arc::new(move |payload: &T| {
            let open = tx.send(payload.clone()).is_ok();
            if !open {
                trace!("Receiver of {name} event dropped");
            }
            open
        }));
        (id, rx)
    }
}

impl<T> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("subscribers", &self.handlers.read().len())
            .field("dispatch", &*self.dispatch.read())
            .finish()
    }
}

fn remove<T>(handlers: &RwLock<Vec<(Subscription, Handler<T>)>>, id: Subscription) -> bool {
    let mut handlers = handlers.write();
    let len = handlers.len();
    handlers.retain(|(sub, _)| *sub != id);
    handlers.len() < len
}

/// Run `handler`, returning whether it stays subscribed.
fn invoke<T>(name: &str, handler: &Handler<T>, payload: &T) -> bool {
    catch_unwind(AssertUnwindSafe(|| handler(payload))).unwrap_or_else(|panic| {
        error!(
            "Handler of {name} event panicked: {}",
            panic_message(panic.as_ref())
        );
        true
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}
