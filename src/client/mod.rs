mod cookie;
mod extension;

use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use static_assertions::assert_impl_all;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{self, mpsc};
use tracing::debug;

pub use self::cookie::Cookie;
use self::extension::ExtensionRegistry;
pub use self::extension::ExtensionInfo;
use crate::display::DisplayName;
use crate::error::Error;
use crate::proto::xproto::{GetInputFocus, QueryExtension, QueryExtensionReply};
use crate::proto::{self, ByteOrder, Event, ProtocolError, Reply, Request, RequestDescriptor, Setup};
use crate::session::{self, Depot, MarshalledRequest, Session, SharedDepot, Transport, Xid};

pub type Result<T, E = Error> = std::result::Result<T, E>;

struct Shared {
    depot: SharedDepot,
    session: Session,
    setup: Setup,
    byte_order: ByteOrder,
    max_request_len: usize,
    extensions: ExtensionRegistry,
    xid: Mutex<Xid>,
    errors: sync::Mutex<mpsc::UnboundedReceiver<ProtocolError>>,
    events: sync::Mutex<mpsc::UnboundedReceiver<Event>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.depot.lock().error(Error::ConnectionClosed);
        self.session.stop();
    }
}

fn try_recv<T>(receiver: &sync::Mutex<mpsc::UnboundedReceiver<T>>) -> Result<Option<T>> {
    // Someone is waiting on the stream, so nothing is there for us.
    let Ok(mut receiver) = receiver.try_lock() else {
        return Ok(None);
    };
    match receiver.try_recv() {
        Ok(item) => Ok(Some(item)),
        Err(TryRecvError::Empty) => Ok(None),
        Err(TryRecvError::Disconnected) => Err(Error::ConnectionClosed),
    }
}

/// Client connection to an X server.
///
/// Clones share the same connection, which is closed when all of them and their cookies are
/// dropped, or on [Connection::disconnect].
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

assert_impl_all!(Connection: Send, Sync);

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("byte_order", &self.shared.byte_order)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Connects to X server of given display name, or of `DISPLAY` if it is empty.
    pub async fn connect(display: &str) -> Result<Self> {
        Self::connector().connect(display).await
    }

    /// Creates a builder with configurable options in connecting to X server.
    pub fn connector() -> Connector {
        Connector::new()
    }

    fn new<S>(stream: S, byte_order: ByteOrder, setup: Setup) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static, {
        let sync_request = proto::build_request(&GetInputFocus, GetInputFocus::DESCRIPTOR.opcode, 0, byte_order)?;
        let (requester, requests) = mpsc::unbounded_channel();
        let (error_sender, errors) = mpsc::unbounded_channel();
        let (event_sender, events) = mpsc::unbounded_channel();
        let depot = SharedDepot::new(Depot::new(byte_order, sync_request, requester, error_sender, event_sender));
        let session = Session::start(stream, byte_order, depot.clone(), requests);
        let xid = Xid::new(setup.resource_id_base, setup.resource_id_mask);
        let max_request_len = setup.maximum_request_bytes();
        let shared = Shared {
            depot,
            session,
            setup,
            byte_order,
            max_request_len,
            extensions: ExtensionRegistry::default(),
            xid: Mutex::new(xid),
            errors: sync::Mutex::new(errors),
            events: sync::Mutex::new(events),
        };
        Ok(Connection { shared: Arc::new(shared) })
    }

    /// Setup information server sent in accepting this connection.
    pub fn setup(&self) -> &Setup {
        &self.shared.setup
    }

    /// Byte order of integers on this connection.
    pub fn byte_order(&self) -> ByteOrder {
        self.shared.byte_order
    }

    /// Maximum request length in bytes.
    pub fn maximum_request_length(&self) -> usize {
        self.shared.max_request_len
    }

    pub fn is_closed(&self) -> bool {
        self.shared.depot.lock().is_closed()
    }

    /// Allocates an id for a new resource.
    ///
    /// # Notable errors
    /// * [Error::IdsExhausted] if id range given by server is used up
    pub fn generate_id(&self) -> Result<u32> {
        self.shared.xid.lock().unwrap_or_else(PoisonError::into_inner).next()
    }

    /// Resolves opcodes of extension `name`.
    ///
    /// Server is queried at most once per name, absence included.
    ///
    /// # Notable errors
    /// * [Error::ExtensionNotPresent] if server does not support extension
    pub async fn extension(&self, name: &str) -> Result<ExtensionInfo> {
        let query = move || async move {
            let request = QueryExtension { name };
            let bytes = proto::build_request(&request, QueryExtension::DESCRIPTOR.opcode, 0, self.byte_order())?;
            let cookie = self.submit_marshalled::<QueryExtensionReply>(bytes, &QueryExtension::DESCRIPTOR, true)?;
            cookie.wait().await
        };
        self.shared.extensions.resolve(name, query).await
    }

    fn submit_marshalled<T: Reply>(
        &self,
        bytes: Vec<u8>,
        descriptor: &RequestDescriptor,
        checked: bool,
    ) -> Result<Cookie<T>> {
        let max = self.shared.max_request_len;
        if bytes.len() > max {
            return Err(Error::RequestTooLarge { request: descriptor.name, len: bytes.len(), max });
        }
        let is_void = descriptor.is_void;
        let (sequence, receiver) = self.shared.depot.lock().submit(MarshalledRequest(bytes), !is_void, checked)?;
        Ok(Cookie::new(sequence, checked, is_void, receiver, self.clone()))
    }

    async fn submit<R: Request>(&self, request: &R, checked: bool) -> Result<Cookie<R::Reply>> {
        let descriptor = &R::DESCRIPTOR;
        let (major_opcode, minor_or_detail) = match descriptor.extension {
            None => (descriptor.opcode, request.detail()),
            Some(name) => (self.extension(name).await?.major_opcode, descriptor.opcode),
        };
        let bytes = proto::build_request(request, major_opcode, minor_or_detail, self.byte_order())?;
        self.submit_marshalled(bytes, descriptor, checked)
    }

    /// Sends a checked request. Its error, if any, is delivered through returned cookie.
    ///
    /// # Notable errors
    /// * [Error::ExtensionNotPresent] if request belongs to an extension server does not support
    /// * [Error::RequestTooLarge] if request exceeds [Self::maximum_request_length]
    /// * [Error::BadArguments] if request is malformed
    /// * [Error::ConnectionClosed] if connection was torn down
    pub async fn send<R: Request>(&self, request: &R) -> Result<Cookie<R::Reply>> {
        self.submit(request, true).await
    }

    /// Sends an unchecked request. Its error, if any, is delivered through
    /// [Self::wait_for_error].
    pub async fn send_unchecked<R: Request>(&self, request: &R) -> Result<Cookie<R::Reply>> {
        self.submit(request, false).await
    }

    pub(crate) fn sync_after(&self, sequence: u64) -> Result<()> {
        self.shared.depot.lock().sync_after(sequence)
    }

    /// Round-trips with server, so all requests sent before are processed.
    pub async fn sync(&self) -> Result<()> {
        self.send(&GetInputFocus).await?.wait().await?;
        Ok(())
    }

    /// Waits for error of unchecked or discarded requests.
    ///
    /// Buffered errors are drained before [Error::ConnectionClosed] is reported.
    pub async fn wait_for_error(&self) -> Result<ProtocolError> {
        self.shared.errors.lock().await.recv().await.ok_or(Error::ConnectionClosed)
    }

    /// Polls error of unchecked or discarded requests without waiting.
    pub fn poll_for_error(&self) -> Result<Option<ProtocolError>> {
        try_recv(&self.shared.errors)
    }

    /// Waits for next event.
    pub async fn wait_for_event(&self) -> Result<Event> {
        self.shared.events.lock().await.recv().await.ok_or(Error::ConnectionClosed)
    }

    /// Polls next event without waiting.
    pub fn poll_for_event(&self) -> Result<Option<Event>> {
        try_recv(&self.shared.events)
    }

    /// Closes connection. All outstanding and future cookies fail with [Error::ConnectionClosed].
    pub fn disconnect(&self) {
        debug!("disconnect from X server");
        self.shared.depot.lock().error(Error::ConnectionClosed);
        self.shared.session.stop();
    }
}

/// Builder for [Connection] with more options than [Connection::connect].
#[derive(Clone, Debug)]
pub struct Connector {
    auth_name: Vec<u8>,
    auth_data: Vec<u8>,
    byte_order: ByteOrder,
    connection_timeout: Duration,
}

impl Connector {
    fn new() -> Self {
        Self {
            auth_name: Vec::new(),
            auth_data: Vec::new(),
            byte_order: ByteOrder::native(),
            connection_timeout: Duration::from_secs(10),
        }
    }

    /// Specifies authorization protocol name and data, passed to server as is.
    pub fn auth(&mut self, name: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.auth_name = name.into();
        self.auth_data = data.into();
        self
    }

    /// Specifies byte order of connection.
    ///
    /// Defaults to native byte order.
    pub fn byte_order(&mut self, order: ByteOrder) -> &mut Self {
        self.byte_order = order;
        self
    }

    /// Specifies timeout for transport connect and setup handshake. Zero means no timeout.
    ///
    /// Defaults to 10s.
    pub fn connection_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.connection_timeout = timeout;
        self
    }

    async fn with_timeout<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        if self.connection_timeout.is_zero() {
            return future.await;
        }
        tokio::time::timeout(self.connection_timeout, future).await.unwrap_or(Err(Error::Timeout))
    }

    async fn establish<S>(&self, mut stream: S) -> Result<Connection>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static, {
        let setup = session::handshake(&mut stream, self.byte_order, &self.auth_name, &self.auth_data).await?;
        Connection::new(stream, self.byte_order, setup)
    }

    /// Connects to X server.
    ///
    /// Parameter `display` has form `[protocol/][host]:display[.screen]`. Empty host or host
    /// `unix` connects to local unix socket, others connect over tcp. Empty `display` takes
    /// display name from environment variable `DISPLAY`.
    ///
    /// # Notable errors
    /// * [Error::ParseError] if display name is malformed
    /// * [Error::SetupRefused] if server refused connection
    /// * [Error::AuthenticationRequired] if server requires further authentication
    /// * [Error::Timeout] if not connected within [Self::connection_timeout]
    pub async fn connect(&self, display: &str) -> Result<Connection> {
        let display = if display.is_empty() { DisplayName::from_env()? } else { DisplayName::parse(display)? };
        self.with_timeout(async {
            let transport = Transport::connect(&display)
                .await
                .map_err(|err| Error::with_other(format!("fail to connect to display {}", display), err))?;
            self.establish(transport).await
        })
        .await
    }

    /// Performs setup handshake over an established stream.
    pub async fn connect_with_stream<S>(&self, stream: S) -> Result<Connection>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static, {
        self.with_timeout(self.establish(stream)).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::io::duplex;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_connect_timeout() {
        let (client, _server) = duplex(1024);
        let err = Connection::connector()
            .connection_timeout(Duration::from_millis(10))
            .connect_with_stream(client)
            .await
            .unwrap_err();
        assert_eq!(err, Error::Timeout);
    }

    #[test_log::test(tokio::test)]
    async fn test_connect_auth_too_long() {
        let (client, _server) = duplex(1024);
        let err = Connection::connector()
            .auth("MIT-MAGIC-COOKIE-1", vec![0u8; 70000])
            .connect_with_stream(client)
            .await
            .unwrap_err();
        assert_eq!(err, Error::BadArguments(&"authorization data longer than 65535 bytes"));
    }

    #[test_log::test(tokio::test)]
    async fn test_connect_bad_display() {
        assert_eq!(Connection::connect("nohost").await.unwrap_err(), Error::ParseError(&"no display number"));
    }
}
