use std::collections::VecDeque;

use ignore_result::Ignore;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::request::{self, MarshalledRequest, StateReceiver, StateResponser};
use super::sequence::SequenceTracker;
use crate::error::Error;
use crate::proto::{ByteOrder, Event, PacketHeader, PacketKind, ProtocolError};

/// Maximum number of requests sent in a row without one expecting a reply.
///
/// A sync request is inserted beyond this, so that every widened sequence lies within 16 bits of
/// the previous one read.
pub const SYNC_INTERVAL: u64 = 0xffff - 1;

#[derive(Debug)]
struct PendingRequest {
    sequence: u64,
    expects_reply: bool,
    checked: bool,
    responser: StateResponser,
}

/// Outstanding requests of a connection and routing of packets to them.
///
/// All submissions go through depot under its lock, so sequence order is queue order is wire
/// order.
pub struct Depot {
    order: ByteOrder,
    sequences: SequenceTracker,
    last_reply_bearing: u64,
    sync_request: Vec<u8>,
    pending: VecDeque<PendingRequest>,
    closed: Option<Error>,
    requester: Option<mpsc::UnboundedSender<MarshalledRequest>>,
    error_sender: Option<mpsc::UnboundedSender<ProtocolError>>,
    event_sender: Option<mpsc::UnboundedSender<Event>>,
}

impl Depot {
    pub fn new(
        order: ByteOrder,
        sync_request: Vec<u8>,
        requester: mpsc::UnboundedSender<MarshalledRequest>,
        error_sender: mpsc::UnboundedSender<ProtocolError>,
        event_sender: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Depot {
            order,
            sequences: SequenceTracker::default(),
            last_reply_bearing: 0,
            sync_request,
            pending: VecDeque::with_capacity(128),
            closed: None,
            requester: Some(requester),
            error_sender: Some(error_sender),
            event_sender: Some(event_sender),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    #[cfg(test)]
    fn last_sent(&self) -> u64 {
        self.sequences.last_sent()
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn check_open(&self) -> Result<(), Error> {
        match &self.closed {
            None => Ok(()),
            Some(err) => Err(err.clone()),
        }
    }

    fn enqueue(&mut self, request: MarshalledRequest) -> Result<(), Error> {
        let sent = self.requester.as_ref().map_or(false, |requester| requester.send(request).is_ok());
        if !sent {
            self.error(Error::ConnectionClosed);
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    fn push_sync(&mut self) -> Result<(), Error> {
        let sequence = self.sequences.next();
        self.last_reply_bearing = sequence;
        trace!(sequence, "insert sync request");
        self.pending.push_back(PendingRequest {
            sequence,
            expects_reply: true,
            checked: false,
            responser: StateResponser::none(),
        });
        self.enqueue(MarshalledRequest(self.sync_request.clone()))
    }

    /// Assigns sequence to request, records expectation for it and queues it for writing.
    ///
    /// Unchecked void requests are not tracked and get no receiver.
    pub fn submit(
        &mut self,
        request: MarshalledRequest,
        expects_reply: bool,
        checked: bool,
    ) -> Result<(u64, Option<StateReceiver>), Error> {
        self.check_open()?;
        if self.sequences.last_sent() - self.last_reply_bearing >= SYNC_INTERVAL {
            self.push_sync()?;
        }
        let sequence = self.sequences.next();
        if expects_reply {
            self.last_reply_bearing = sequence;
        }
        let receiver = if expects_reply || checked {
            let (responser, receiver) = request::channel(sequence);
            self.pending.push_back(PendingRequest { sequence, expects_reply, checked, responser });
            Some(receiver)
        } else {
            None
        };
        trace!(sequence, opcode = request.major_opcode(), expects_reply, checked, "queue request");
        self.enqueue(request)?;
        Ok((sequence, receiver))
    }

    /// Makes sure a reply-bearing request follows `sequence`, so that it gets completed.
    pub fn sync_after(&mut self, sequence: u64) -> Result<(), Error> {
        self.check_open()?;
        if self.last_reply_bearing > sequence {
            return Ok(());
        }
        self.push_sync()
    }

    /// Completes all tracked requests with sequence below given one.
    fn complete_before(&mut self, sequence: u64) {
        while let Some(request) = self.pending.pop_front() {
            if request.sequence >= sequence {
                self.pending.push_front(request);
                break;
            }
            if request.expects_reply {
                let err = Error::UnexpectedError(format!("no reply for request {}", request.sequence));
                request.responser.send(Err(err));
            } else {
                request.responser.send_empty();
            }
        }
    }

    fn pop_request(&mut self, sequence: u64) -> Option<PendingRequest> {
        self.complete_before(sequence);
        match self.pending.front() {
            Some(request) if request.sequence == sequence => self.pending.pop_front(),
            _ => None,
        }
    }

    fn publish_error(&self, err: ProtocolError) {
        debug!(sequence = err.sequence, %err, "publish error to connection error stream");
        if let Some(sender) = self.error_sender.as_ref() {
            sender.send(err).ignore();
        }
    }

    fn handle_reply(&mut self, sequence: u64, bytes: Vec<u8>) {
        match self.pop_request(sequence) {
            None => trace!(sequence, "drop reply of untracked or discarded request"),
            Some(request) if !request.expects_reply => {
                warn!(sequence, "got reply for void request");
                request.responser.send_empty();
            },
            Some(request) => {
                request.responser.send(Ok(bytes));
            },
        }
    }

    fn handle_error(&mut self, err: ProtocolError) {
        let sequence = err.sequence;
        match self.pop_request(sequence) {
            None => self.publish_error(err),
            Some(request) if request.checked => {
                if !request.responser.send(Err(Error::Protocol(err))) {
                    self.publish_error(err);
                }
            },
            Some(request) => {
                self.publish_error(err);
                if request.expects_reply {
                    request.responser.send(Err(Error::UncheckedError { sequence }));
                }
            },
        }
    }

    fn handle_event(&mut self, event: Event) {
        if let Some(sequence) = event.sequence() {
            self.complete_before(sequence);
        }
        if let Some(sender) = self.event_sender.as_ref() {
            sender.send(event).ignore();
        }
    }

    /// Routes a server packet, `bytes` including its 32-byte header.
    pub fn dispatch(&mut self, header: PacketHeader, bytes: Vec<u8>) {
        let sequence = header.sequence.map(|wire| self.sequences.widen(wire));
        match (header.kind, sequence) {
            (PacketKind::Reply, Some(sequence)) => self.handle_reply(sequence, bytes),
            (PacketKind::Error, Some(sequence)) => {
                let err = ProtocolError::decode(&bytes, sequence, self.order);
                self.handle_error(err);
            },
            (_, sequence) => self.handle_event(Event::new(bytes, sequence)),
        }
    }

    /// Fails all outstanding and future requests, and closes error and event streams.
    pub fn error(&mut self, err: Error) {
        if self.closed.is_none() {
            debug!(%err, pending = self.pending.len(), "close connection");
            self.closed = Some(err.clone());
        }
        self.pending.drain(..).for_each(|request| {
            request.responser.send(Err(err.clone()));
        });
        self.requester = None;
        self.error_sender = None;
        self.event_sender = None;
    }
}
