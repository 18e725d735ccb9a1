use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::Error;

/// Request bytes ready for the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarshalledRequest(pub Vec<u8>);

impl MarshalledRequest {
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn major_opcode(&self) -> u8 {
        self.0[0]
    }
}

pub type ReplyResult = Result<Vec<u8>, Error>;

type StateSender = oneshot::Sender<ReplyResult>;

/// Sending half of a cookie.
#[derive(Default, Debug)]
pub struct StateResponser(Option<StateSender>);

impl StateResponser {
    pub fn new(sender: StateSender) -> Self {
        StateResponser(Some(sender))
    }

    pub fn none() -> Self {
        StateResponser(None)
    }

    /// Delivers result, returns whether someone received it.
    pub fn send(mut self, result: ReplyResult) -> bool {
        match self.0.take() {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }

    pub fn send_empty(self) -> bool {
        self.send(Ok(Vec::new()))
    }
}

/// Receiving half of a cookie.
#[derive(Debug)]
pub struct StateReceiver {
    sequence: u64,
    receiver: oneshot::Receiver<ReplyResult>,
}

impl StateReceiver {
    pub fn new(sequence: u64, receiver: oneshot::Receiver<ReplyResult>) -> Self {
        Self { sequence, receiver }
    }

    #[cfg(test)]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Future for StateReceiver {
    type Output = ReplyResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Pending => Poll::Pending,
            // Responser is dropped only when connection is torn down.
            Poll::Ready(Err(_)) => {
                trace!(sequence = self.sequence, "request dropped by closed connection");
                Poll::Ready(Err(Error::ConnectionClosed))
            },
            Poll::Ready(Ok(result)) => Poll::Ready(result),
        }
    }
}

pub fn channel(sequence: u64) -> (StateResponser, StateReceiver) {
    let (sender, receiver) = oneshot::channel();
    (StateResponser::new(sender), StateReceiver::new(sequence, receiver))
}
