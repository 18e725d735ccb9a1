mod connection;
mod depot;
mod request;
mod sequence;
mod xid;

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ignore_result::Ignore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

pub use self::connection::Transport;
pub use self::depot::Depot;
pub use self::request::{MarshalledRequest, StateReceiver};
pub use self::xid::Xid;
use crate::error::Error;
use crate::proto::{self, ByteOrder, PacketHeader, Setup, PACKET_LEN, SETUP_HEADER_LEN};

/// Depot shared by submitters and I/O tasks.
#[derive(Clone)]
pub struct SharedDepot(Arc<Mutex<Depot>>);

impl SharedDepot {
    pub fn new(depot: Depot) -> Self {
        SharedDepot(Arc::new(Mutex::new(depot)))
    }

    /// Depot mutations keep it consistent at every step, so a poisoned lock is still usable.
    pub fn lock(&self) -> MutexGuard<'_, Depot> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn io_error(message: &'static str) -> impl FnOnce(io::Error) -> Error {
    move |err| Error::with_other(message, err)
}

/// Performs connection setup on a fresh stream.
pub async fn handshake<S>(stream: &mut S, order: ByteOrder, auth_name: &[u8], auth_data: &[u8]) -> Result<Setup, Error>
where
    S: AsyncRead + AsyncWrite + Unpin, {
    let request = proto::build_setup_request(order, auth_name, auth_data)?;
    stream.write_all(&request).await.map_err(io_error("fail to send setup request"))?;
    stream.flush().await.map_err(io_error("fail to send setup request"))?;
    let mut header = [0u8; SETUP_HEADER_LEN];
    stream.read_exact(&mut header).await.map_err(io_error("fail to read setup reply"))?;
    let mut body = vec![0u8; proto::setup_body_len(&header, order)];
    stream.read_exact(&mut body).await.map_err(io_error("fail to read setup reply"))?;
    let setup = proto::decode_setup(&header, &body, order)?;
    debug!(
        vendor = %setup.vendor,
        release = setup.release_number,
        max_request_len = setup.maximum_request_length,
        "connection setup accepted"
    );
    Ok(setup)
}

/// Reader and writer tasks serving one connection.
///
/// Writer task ends by itself once depot closes and drops its request sender.
pub struct Session {
    reader: JoinHandle<()>,
}

impl Session {
    pub fn start<S>(
        stream: S,
        order: ByteOrder,
        depot: SharedDepot,
        requests: mpsc::UnboundedReceiver<MarshalledRequest>,
    ) -> Session
    where
        S: AsyncRead + AsyncWrite + Send + 'static, {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader = tokio::spawn(serve_reads(read_half, order, depot.clone()));
        tokio::spawn(serve_writes(write_half, requests, depot));
        Session { reader }
    }

    pub fn stop(&self) {
        self.reader.abort();
    }
}

async fn read_packet<R>(reader: &mut R, order: ByteOrder) -> io::Result<(PacketHeader, Vec<u8>)>
where
    R: AsyncRead + Unpin, {
    let mut head = [0u8; PACKET_LEN];
    reader.read_exact(&mut head).await?;
    let header = PacketHeader::parse(&head, order);
    let mut bytes = Vec::with_capacity(PACKET_LEN + header.extra_len);
    bytes.extend_from_slice(&head);
    bytes.resize(PACKET_LEN + header.extra_len, 0);
    reader.read_exact(&mut bytes[PACKET_LEN..]).await?;
    Ok((header, bytes))
}

async fn serve_reads<R>(mut reader: R, order: ByteOrder, depot: SharedDepot)
where
    R: AsyncRead + Unpin, {
    loop {
        match read_packet(&mut reader, order).await {
            Ok((header, bytes)) => {
                trace!(kind = ?header.kind, sequence = ?header.sequence, len = bytes.len(), "recv packet");
                depot.lock().dispatch(header, bytes);
            },
            Err(err) => {
                debug!(%err, "connection read failed");
                depot.lock().error(Error::ConnectionClosed);
                return;
            },
        }
    }
}

async fn write_batch<W>(
    writer: &mut BufWriter<W>,
    first: MarshalledRequest,
    requests: &mut mpsc::UnboundedReceiver<MarshalledRequest>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin, {
    writer.write_all(first.as_slice()).await?;
    while let Ok(request) = requests.try_recv() {
        writer.write_all(request.as_slice()).await?;
    }
    writer.flush().await
}

async fn serve_writes<W>(writer: W, mut requests: mpsc::UnboundedReceiver<MarshalledRequest>, depot: SharedDepot)
where
    W: AsyncWrite + Unpin, {
    let mut writer = BufWriter::new(writer);
    while let Some(request) = requests.recv().await {
        if let Err(err) = write_batch(&mut writer, request, &mut requests).await {
            debug!(%err, "connection write failed");
            depot.lock().error(Error::ConnectionClosed);
            return;
        }
    }
    writer.shutdown().await.ignore();
}
