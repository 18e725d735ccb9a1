use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;

use ignore_result::Ignore;

use super::Connection;
use crate::error::Error;
use crate::proto::{self, Reply};
use crate::session::StateReceiver;

/// Handle to the outcome of a submitted request.
///
/// A cookie is consumed exactly once, either by [Cookie::wait] or [Cookie::discard].
#[must_use = "cookie must be waited or discarded"]
pub struct Cookie<T> {
    sequence: u64,
    checked: bool,
    is_void: bool,
    receiver: Option<StateReceiver>,
    connection: Connection,
    _reply: PhantomData<fn() -> T>,
}

impl<T> Debug for Cookie<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("sequence", &self.sequence)
            .field("checked", &self.checked)
            .field("void", &self.is_void)
            .finish()
    }
}

impl<T: Reply> Cookie<T> {
    pub(crate) fn new(
        sequence: u64,
        checked: bool,
        is_void: bool,
        receiver: Option<StateReceiver>,
        connection: Connection,
    ) -> Self {
        Cookie { sequence, checked, is_void, receiver, connection, _reply: PhantomData }
    }

    /// Sequence number of the request on its connection.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Waits for reply of request, or its completion for void request.
    ///
    /// Waiting on a checked void request sends a sync request if no reply-bearing request follows
    /// it, so it always resolves. Unchecked void requests resolve immediately.
    ///
    /// # Notable errors
    /// * [Error::Protocol] if server failed a checked request
    /// * [Error::UncheckedError] if server failed an unchecked request, whose error then went to
    ///   [Connection::wait_for_error]
    /// * [Error::ConnectionClosed] if connection was torn down
    pub async fn wait(self) -> Result<T, Error> {
        let order = self.connection.byte_order();
        let receiver = match self.receiver {
            None => return proto::decode_reply(&[], order),
            Some(receiver) => receiver,
        };
        if self.is_void {
            // Closed connection is reported by receiver too.
            self.connection.sync_after(self.sequence).ignore();
        }
        let bytes = receiver.await?;
        proto::decode_reply(&bytes, order)
    }

    /// Drops interest in outcome. Reply is dropped silently, while error of a checked request
    /// goes to [Connection::wait_for_error].
    pub fn discard(self) {}
}
