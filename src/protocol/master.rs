// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt, sync::Arc, time::Duration};

use crossbeam_channel::Sender;
use parking_lot::{FairMutex, Mutex};

use super::Protocol;
use crate::{
    codec::Transport,
    error::{Error, Result},
    event::Subscription,
    frame::Packet,
};

/// The request in flight and where its outcome goes.
struct Waiting<F> {
    request: F,
    tx: Sender<Result<F>>,
}

type Pending<F> = Arc<Mutex<Option<Waiting<F>>>>;

/// Request/response correlation on top of a [`Protocol`].
///
/// Only one request is in flight at a time. The first frame answering the
/// waiting request, or the first error the protocol publishes, completes
/// it. Frames answering another request and anything arriving while no
/// request waits are dropped.
pub struct Master<T: Transport> {
    protocol: Arc<Protocol<T>>,
    slot: FairMutex<()>,
    pending: Pending<T::Frame>,
    subscriptions: [Subscription; 2],
}

impl<T: Transport> Master<T> {
    pub fn new(protocol: Arc<Protocol<T>>) -> Self {
        let pending: Pending<T::Frame> = Arc::new(Mutex::new(None));
        let on_frame = {
            let pending = Arc::clone(&pending);
            protocol
                .frame_received()
                .subscribe(move |frame: &T::Frame| complete(&pending, Ok(frame.clone())))
        };
        let on_error = {
            let pending = Arc::clone(&pending);
            protocol
                .errors()
                .subscribe(move |err: &Error| complete(&pending, Err(err.clone())))
        };
        Self {
            protocol,
            slot: FairMutex::new(()),
            pending,
            subscriptions: [on_frame, on_error],
        }
    }

    pub const fn protocol(&self) -> &Arc<Protocol<T>> {
        &self.protocol
    }

    /// Send `request` and wait for the next frame.
    ///
    /// Both waiting for a previous request to finish and waiting for the
    /// response are bounded by `timeout`. A request that times out while
    /// queued is never sent.
    pub fn request(&self, request: &T::Frame, timeout: Duration) -> Result<T::Frame> {
        let Some(_slot) = self.slot.try_lock_for(timeout) else {
            debug!("No request slot within {timeout:?}");
            return Err(Error::Timeout(timeout));
        };
        let (tx, rx) = crossbeam_channel::bounded(1);
        *self.pending.lock() = Some(Waiting {
            request: request.clone(),
            tx,
        });
        let result = self.protocol.send(request).and_then(|()| {
            rx.recv_timeout(timeout).unwrap_or_else(|_| {
                debug!("No response within {timeout:?}");
                Err(Error::Timeout(timeout))
            })
        });
        self.pending.lock().take();
        result
    }
}

impl<T: Transport> Drop for Master<T> {
    fn drop(&mut self) {
        let [on_frame, on_error] = self.subscriptions;
        self.protocol.frame_received().unsubscribe(on_frame);
        self.protocol.errors().unsubscribe(on_error);
    }
}

impl<T: Transport> fmt::Debug for Master<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Master")
            .field("protocol", &self.protocol)
            .field("waiting", &self.pending.lock().is_some())
            .finish()
    }
}

fn complete<F: Packet>(pending: &Mutex<Option<Waiting<F>>>, result: Result<F>) {
    let mut pending = pending.lock();
    let Some(waiting) = pending.as_ref() else {
        trace!("Dropped {} without a waiting request", describe(&result));
        return;
    };
    if let Ok(frame) = &result {
        if !frame.answers(&waiting.request) {
            debug!(
                "Dropped frame not answering the waiting request: {:02X?}",
                frame.rawdata()
            );
            return;
        }
    }
    if let Some(waiting) = pending.take() {
        // the channel is fresh and holds one value, the receiver may be gone
        let _ = waiting.tx.try_send(result);
    }
}

const fn describe<F>(result: &Result<F>) -> &'static str {
    match result {
        Ok(_) => "frame",
        Err(_) => "error",
    }
}

#[cfg(all(test, feature = "tcp"))]
mod tests {
    use std::{
        io::{self, Read, Write},
        net::{TcpListener, TcpStream},
        thread,
    };

    use super::*;
    use crate::codec::testing::init_logging;
    use crate::{
        codec::tcp::{Header, Mbap, MbapTransport},
        connection::{TcpConfig, TcpConnection},
        frame::{Adu, Packet, factory},
        protocol::ConnectionEvent,
    };

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn started_master() -> (Master<MbapTransport>, TcpStream, thread::JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = TcpConfig::new(listener.local_addr().unwrap().to_string())
            .read_timeout(Duration::from_millis(20));
        let protocol = Arc::new(Protocol::new(
            TcpConnection::new(config),
            MbapTransport::new(),
        ));
        let (_, connections) = protocol.connection_changed().channel();
        let master = Master::new(Arc::clone(&protocol));
        let worker = protocol.start().unwrap();
        let (peer, _) = listener.accept().unwrap();
        assert_eq!(
            connections.recv_timeout(TIMEOUT).unwrap(),
            ConnectionEvent::Connected
        );
        (master, peer, worker)
    }

    fn request(transaction_id: u16) -> Mbap {
        let pdu = factory::master::read_holding_registers(0x0000, 1).unwrap();
        Mbap::new(Header::new(transaction_id, 0x01), &pdu).unwrap()
    }

    /// Read one request from the peer and answer it with one register.
    fn respond(peer: &mut TcpStream) -> u16 {
        let mut raw = [0; 12];
        peer.read_exact(&mut raw).unwrap();
        let request = Mbap::from_raw(raw.to_vec()).unwrap();
        let pdu = factory::slave::read_holding_registers(&[request.transaction_id()]).unwrap();
        let response = Mbap::new(request.header(), &pdu).unwrap();
        peer.write_all(response.rawdata()).unwrap();
        request.transaction_id()
    }

    #[test]
    fn request_returns_response() {
        init_logging();
        let (master, mut peer, worker) = started_master();
        let server = thread::spawn(move || {
            respond(&mut peer);
            peer
        });
        let response = master.request(&request(7), TIMEOUT).unwrap();
        assert_eq!(response.transaction_id(), 7);
        assert_eq!(response.pdu().response().values(), Some(vec![7]));
        let _peer = server.join().unwrap();
        master.protocol().stop();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn concurrent_requests_are_serialized() {
        init_logging();
        let (master, mut peer, worker) = started_master();
        let master = Arc::new(master);
        let server = thread::spawn(move || {
            let first = respond_after_quiet(&mut peer);
            let second = respond(&mut peer);
            (first, second, peer)
        });

        let clients: Vec<_> = [1, 2]
            .into_iter()
            .map(|id| {
                let master = Arc::clone(&master);
                thread::spawn(move || master.request(&request(id), TIMEOUT).unwrap())
            })
            .collect();
        for (client, id) in clients.into_iter().zip([1, 2]) {
            let response = client.join().unwrap();
            assert_eq!(response.transaction_id(), id);
        }
        let (first, second, _peer) = server.join().unwrap();
        assert_ne!(first, second);

        master.protocol().stop();
        worker.join().unwrap().unwrap();
    }

    /// Like [`respond`], but first makes sure no second request is on the
    /// wire while the first one is still unanswered.
    fn respond_after_quiet(peer: &mut TcpStream) -> u16 {
        let mut raw = [0; 12];
        peer.read_exact(&mut raw).unwrap();
        peer.set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let err = peer.read(&mut [0; 1]).unwrap_err();
        assert!(matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ));
        peer.set_read_timeout(None).unwrap();
        let request = Mbap::from_raw(raw.to_vec()).unwrap();
        let pdu = factory::slave::read_holding_registers(&[request.transaction_id()]).unwrap();
        peer.write_all(Mbap::new(request.header(), &pdu).unwrap().rawdata())
            .unwrap();
        request.transaction_id()
    }

    #[test]
    fn late_response_is_dropped() {
        init_logging();
        let (master, mut peer, worker) = started_master();
        let (_, frames) = master.protocol().frame_received().channel();

        let err = master
            .request(&request(1), Duration::from_millis(100))
            .unwrap_err();
        assert!(err.is_timeout());

        // answer the timed out request, the master handler runs before the
        // channel subscribed after it
        assert_eq!(respond(&mut peer), 1);
        assert_eq!(frames.recv_timeout(TIMEOUT).unwrap().transaction_id(), 1);

        let server = thread::spawn(move || {
            respond(&mut peer);
            peer
        });
        let response = master.request(&request(2), TIMEOUT).unwrap();
        assert_eq!(response.transaction_id(), 2);
        let _peer = server.join().unwrap();

        master.protocol().stop();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn stale_response_is_not_delivered_to_next_request() {
        init_logging();
        let (master, mut peer, worker) = started_master();
        let master = Arc::new(master);
        let (_, sent) = master.protocol().frame_sent().channel();

        let err = master
            .request(&request(1), Duration::from_millis(100))
            .unwrap_err();
        assert!(err.is_timeout());
        sent.recv_timeout(TIMEOUT).unwrap();

        let next = {
            let master = Arc::clone(&master);
            thread::spawn(move || master.request(&request(2), TIMEOUT))
        };
        assert_eq!(sent.recv_timeout(TIMEOUT).unwrap().transaction_id(), 2);
        // both answers arrive while the second request waits
        assert_eq!(respond(&mut peer), 1);
        assert_eq!(respond(&mut peer), 2);
        let response = next.join().unwrap().unwrap();
        assert_eq!(response.transaction_id(), 2);
        assert_eq!(response.pdu().response().values(), Some(vec![2]));

        master.protocol().stop();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn queued_request_times_out_unsent() {
        init_logging();
        let (master, mut peer, worker) = started_master();
        let master = Arc::new(master);
        let (_, sent) = master.protocol().frame_sent().channel();

        let holder = {
            let master = Arc::clone(&master);
            thread::spawn(move || master.request(&request(1), Duration::from_millis(500)))
        };
        assert_eq!(sent.recv_timeout(TIMEOUT).unwrap().transaction_id(), 1);
        let err = master
            .request(&request(2), Duration::from_millis(50))
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(holder.join().unwrap().unwrap_err().is_timeout());
        assert!(sent.try_recv().is_err());

        let mut raw = [0; 12];
        peer.read_exact(&mut raw).unwrap();
        assert_eq!(Mbap::from_raw(raw.to_vec()).unwrap().transaction_id(), 1);

        master.protocol().stop();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn decode_error_completes_request() {
        init_logging();
        let (master, mut peer, worker) = started_master();
        let server = thread::spawn(move || {
            let mut raw = [0; 12];
            peer.read_exact(&mut raw).unwrap();
            // protocol id 1
            peer.write_all(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x02, 0x01, 0x07])
                .unwrap();
            peer
        });
        let err = master.request(&request(1), TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::ProtocolNotModbus(1)));
        let _peer = server.join().unwrap();

        master.protocol().stop();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn unsubscribe_on_drop() {
        init_logging();
        let (master, _peer, worker) = started_master();
        let protocol = Arc::clone(master.protocol());
        assert_eq!(protocol.frame_received().subscriber_count(), 1);
        drop(master);
        assert_eq!(protocol.frame_received().subscriber_count(), 0);
        assert_eq!(protocol.errors().subscriber_count(), 0);
        protocol.stop();
        worker.join().unwrap().unwrap();
    }
}
