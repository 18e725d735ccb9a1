use std::collections::BTreeSet;

use assert_matches::assert_matches;
use ignore_result::Ignore;
use pretty_assertions::assert_eq;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use x11::proto::xfixes::{
    ChangeSaveSet,
    CreateRegion,
    GetCursorImage,
    SaveSetMapping,
    SaveSetMode,
    SaveSetTarget,
};
use x11::proto::xproto::{GetInputFocus, Rectangle};
use x11::proto::{render, ErrorCode, Request, RequestDescriptor};
use x11::record::Writer;
use x11_wire_client as x11;

const RESOURCE_ID_BASE: u32 = 0x0040_0000;
const RESOURCE_ID_MASK: u32 = 0x001f_ffff;
const XFIXES_OPCODE: u8 = 138;
const BAD_WINDOW: u8 = 3;
const EXPOSE: u8 = 12;

/// Core request the fake server answers with an event.
struct NoOperation;

impl Request for NoOperation {
    type Reply = ();

    const DESCRIPTOR: RequestDescriptor = RequestDescriptor {
        name: "NoOperation",
        extension: None,
        opcode: 127,
        fixed_len: 4,
        lists: &[],
        is_void: true,
    };

    fn serialize_fixed(&self, _buf: &mut Writer<'_>) {}
}

fn setup_reply() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&1u32.to_le_bytes());
    body.extend_from_slice(&RESOURCE_ID_BASE.to_le_bytes());
    body.extend_from_slice(&RESOURCE_ID_MASK.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&4u16.to_le_bytes());
    body.extend_from_slice(&u16::MAX.to_le_bytes());
    body.extend_from_slice(&[0, 0, 0, 0, 32, 32, 8, 255, 0, 0, 0, 0]);
    body.extend_from_slice(b"fake");
    let mut reply = vec![1, 0, 11, 0, 0, 0];
    reply.extend_from_slice(&((body.len() / 4) as u16).to_le_bytes());
    reply.extend(body);
    reply
}

/// Reply packet with `body` placed from byte 8 on.
fn reply(sequence: u16, body: &[u8]) -> Vec<u8> {
    let extra = body.len().saturating_sub(24);
    assert_eq!(extra % 4, 0);
    let mut packet = vec![0u8; 8 + body.len().max(24)];
    packet[0] = 1;
    packet[2..4].copy_from_slice(&sequence.to_le_bytes());
    packet[4..8].copy_from_slice(&((extra / 4) as u32).to_le_bytes());
    packet[8..8 + body.len()].copy_from_slice(body);
    packet
}

fn error(sequence: u16, code: u8, bad_value: u32, minor_opcode: u16, major_opcode: u8) -> Vec<u8> {
    let mut packet = vec![0u8; 32];
    packet[1] = code;
    packet[2..4].copy_from_slice(&sequence.to_le_bytes());
    packet[4..8].copy_from_slice(&bad_value.to_le_bytes());
    packet[8..10].copy_from_slice(&minor_opcode.to_le_bytes());
    packet[10] = major_opcode;
    packet
}

fn respond(sequence: u16, request: &[u8]) -> Option<Vec<u8>> {
    match (request[0], request[1]) {
        (98, _) => {
            let len = u16::from_le_bytes([request[4], request[5]]) as usize;
            let body: &[u8] = match &request[8..8 + len] {
                b"XFIXES" => &[1, XFIXES_OPCODE, 87, 140],
                _ => &[0, 0, 0, 0],
            };
            Some(reply(sequence, body))
        },
        (43, _) => {
            let mut packet = reply(sequence, &u32::from(sequence).to_le_bytes());
            packet[1] = 2;
            Some(packet)
        },
        (127, _) => {
            let mut event = vec![0u8; 32];
            event[0] = EXPOSE;
            event[2..4].copy_from_slice(&sequence.to_le_bytes());
            Some(event)
        },
        (XFIXES_OPCODE, 1) => {
            let window = u32::from_le_bytes([request[8], request[9], request[10], request[11]]);
            (window == 0).then(|| error(sequence, BAD_WINDOW, window, 1, XFIXES_OPCODE))
        },
        (XFIXES_OPCODE, 4) => {
            let mut body = Vec::new();
            body.extend_from_slice(&(-1i16).to_le_bytes());
            body.extend_from_slice(&2i16.to_le_bytes());
            body.extend_from_slice(&2u16.to_le_bytes());
            body.extend_from_slice(&1u16.to_le_bytes());
            body.extend_from_slice(&[0; 4]);
            body.extend_from_slice(&7u32.to_le_bytes());
            body.extend_from_slice(&[0; 8]);
            body.extend_from_slice(&0xff00ff00u32.to_le_bytes());
            body.extend_from_slice(&0x11223344u32.to_le_bytes());
            Some(reply(sequence, &body))
        },
        _ => None,
    }
}

/// Serves setup and requests, forwarding every request it reads.
async fn serve(mut stream: DuplexStream, requests: mpsc::UnboundedSender<Vec<u8>>) {
    let mut setup = [0u8; 12];
    stream.read_exact(&mut setup).await.unwrap();
    assert_eq!(setup[0], b'l');
    stream.write_all(&setup_reply()).await.unwrap();
    let mut sequence = 0u16;
    loop {
        let mut request = vec![0u8; 4];
        if stream.read_exact(&mut request).await.is_err() {
            return;
        }
        let len = u16::from_le_bytes([request[2], request[3]]) as usize * 4;
        request.resize(len, 0);
        stream.read_exact(&mut request[4..]).await.unwrap();
        sequence = sequence.wrapping_add(1);
        let response = respond(sequence, &request);
        requests.send(request).ignore();
        if let Some(response) = response {
            stream.write_all(&response).await.unwrap();
        }
    }
}

async fn connect() -> (x11::Connection, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (client, server) = duplex(64 * 1024);
    let (sender, requests) = mpsc::unbounded_channel();
    tokio::spawn(serve(server, sender));
    let connection = x11::Connection::connector()
        .byte_order(x11::ByteOrder::LsbFirst)
        .connect_with_stream(client)
        .await
        .unwrap();
    (connection, requests)
}

fn drain(requests: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut drained = Vec::new();
    while let Ok(request) = requests.try_recv() {
        drained.push(request);
    }
    drained
}

#[test_log::test(tokio::test)]
async fn test_setup() {
    let (connection, _requests) = connect().await;
    let setup = connection.setup();
    assert_eq!(setup.vendor, "fake");
    assert_eq!(setup.protocol_major_version, 11);
    assert_eq!(setup.resource_id_base, RESOURCE_ID_BASE);
    assert!(setup.roots.is_empty());
    assert_eq!(connection.maximum_request_length(), u16::MAX as usize * 4);
    assert_eq!(connection.generate_id().unwrap(), RESOURCE_ID_BASE | 1);
    assert_eq!(connection.generate_id().unwrap(), RESOURCE_ID_BASE | 2);
}

#[test_log::test(tokio::test)]
async fn test_round_trip() {
    let (connection, _requests) = connect().await;
    let first = connection.send(&GetInputFocus).await.unwrap();
    let second = connection.send(&GetInputFocus).await.unwrap();
    assert_eq!(first.sequence(), 1);
    assert_eq!(second.sequence(), 2);

    let reply = second.wait().await.unwrap();
    assert_eq!(reply.focus, 2);
    assert_eq!(reply.revert_to, 2);
    assert_eq!(first.wait().await.unwrap().focus, 1);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_concurrent_sequences() {
    let (connection, _requests) = connect().await;
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let connection = connection.clone();
            tokio::spawn(async move {
                let mut sequences = Vec::new();
                for _ in 0..16 {
                    let cookie = connection.send(&GetInputFocus).await.unwrap();
                    let sequence = cookie.sequence();
                    assert_eq!(cookie.wait().await.unwrap().focus as u64, sequence);
                    sequences.push(sequence);
                }
                sequences
            })
        })
        .collect();
    let mut all = BTreeSet::new();
    for task in tasks {
        let sequences = task.await.unwrap();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
        all.extend(sequences);
    }
    assert_eq!(all, (1..=128).collect::<BTreeSet<u64>>());
}

#[test_log::test(tokio::test)]
async fn test_extension_queried_once() {
    let (connection, mut requests) = connect().await;
    let info = connection.extension("XFIXES").await.unwrap();
    assert_eq!(info, x11::ExtensionInfo { major_opcode: XFIXES_OPCODE, first_event: 87, first_error: 140 });
    assert_eq!(connection.extension("XFIXES").await.unwrap(), info);

    let image = connection.send(&GetCursorImage).await.unwrap().wait().await.unwrap();
    assert_eq!((image.x, image.y, image.width, image.height), (-1, 2, 2, 1));
    assert_eq!(image.cursor_serial, 7);
    assert_eq!(image.cursor_image, vec![0xff00ff00, 0x11223344]);

    let opcodes: Vec<_> = drain(&mut requests).into_iter().map(|request| (request[0], request[1])).collect();
    assert_eq!(opcodes, vec![(98, 0), (XFIXES_OPCODE, 4)]);
}

#[test_log::test(tokio::test)]
async fn test_extension_not_present() {
    let (connection, mut requests) = connect().await;
    for _ in 0..2 {
        assert_eq!(connection.extension("RENDER").await.unwrap_err(), x11::Error::ExtensionNotPresent("RENDER".into()));
    }
    let query_version = render::QueryVersion { client_major_version: 0, client_minor_version: 11 };
    assert_matches!(connection.send(&query_version).await, Err(x11::Error::ExtensionNotPresent(_)));
    connection.sync().await.unwrap();
    assert_eq!(drain(&mut requests).len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_create_region() {
    let (connection, mut requests) = connect().await;
    let region = connection.generate_id().unwrap();
    let rectangles = vec![Rectangle::new(0, 0, 10, 10), Rectangle::new(-5, 5, 1, 2), Rectangle::new(3, 4, 5, 6)];
    let cookie = connection.send(&CreateRegion { region, rectangles }).await.unwrap();
    cookie.wait().await.unwrap();

    let requests = drain(&mut requests);
    assert_eq!(requests.len(), 3);
    let request = &requests[1];
    assert_eq!(request.len(), 32);
    assert_eq!(&request[..8], &[XFIXES_OPCODE, 5, 8, 0, 1, 0, 0x40, 0]);
    assert_eq!(&request[8..16], &[0, 0, 0, 0, 10, 0, 10, 0]);
    assert_eq!(&request[16..24], &[0xfb, 0xff, 5, 0, 1, 0, 2, 0]);
    assert_eq!(&request[24..32], &[3, 0, 4, 0, 5, 0, 6, 0]);
    assert_eq!(requests[2], vec![43, 0, 1, 0]);
}

#[test_log::test(tokio::test)]
async fn test_checked_error() {
    let (connection, _requests) = connect().await;
    let request = ChangeSaveSet {
        mode: SaveSetMode::Insert,
        target: SaveSetTarget::Nearest,
        map: SaveSetMapping::Map,
        window: 0,
    };
    let cookie = connection.send(&request).await.unwrap();
    let sequence = cookie.sequence();
    let err = cookie.wait().await.unwrap_err();
    let protocol_error = err.protocol_error().unwrap();
    assert_eq!(protocol_error.sequence, sequence);
    assert_eq!(protocol_error.code(), Some(ErrorCode::Window));
    assert_eq!((protocol_error.major_opcode, protocol_error.minor_opcode), (XFIXES_OPCODE, 1));
    assert_eq!(connection.poll_for_error().unwrap(), None);

    let request = ChangeSaveSet { window: 0x0040_0001, ..request };
    connection.send(&request).await.unwrap().wait().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_unchecked_error() {
    let (connection, _requests) = connect().await;
    let request =
        ChangeSaveSet { mode: SaveSetMode::Delete, target: SaveSetTarget::Root, map: SaveSetMapping::Unmap, window: 0 };
    let cookie = connection.send_unchecked(&request).await.unwrap();
    let sequence = cookie.sequence();
    cookie.wait().await.unwrap();

    let err = connection.wait_for_error().await.unwrap();
    assert_eq!(err.sequence, sequence);
    assert_eq!(err.error_code, BAD_WINDOW);
    assert_eq!(err.bad_value, 0);
}

#[test_log::test(tokio::test)]
async fn test_discarded_error() {
    let (connection, _requests) = connect().await;
    let request =
        ChangeSaveSet { mode: SaveSetMode::Insert, target: SaveSetTarget::Root, map: SaveSetMapping::Map, window: 0 };
    let cookie = connection.send(&request).await.unwrap();
    let sequence = cookie.sequence();
    cookie.discard();
    connection.sync().await.unwrap();
    assert_eq!(connection.poll_for_error().unwrap().unwrap().sequence, sequence);
}

#[test_log::test(tokio::test)]
async fn test_event() {
    let (connection, _requests) = connect().await;
    assert_eq!(connection.poll_for_event().unwrap(), None);
    let cookie = connection.send(&NoOperation).await.unwrap();
    let event = connection.wait_for_event().await.unwrap();
    assert_eq!(event.response_type(), EXPOSE);
    assert_eq!(event.sequence(), Some(cookie.sequence()));
    assert!(!event.is_send_event());
    assert_eq!(event.into_bytes().len(), 32);
    cookie.wait().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_disconnect() {
    let (connection, _requests) = connect().await;
    let cookie = connection.send(&GetInputFocus).await.unwrap();
    assert_eq!(format!("{:?}", connection), "Connection { byte_order: LsbFirst, closed: false }");
    connection.disconnect();
    assert!(connection.is_closed());
    assert_eq!(format!("{:?}", connection), "Connection { byte_order: LsbFirst, closed: true }");
    assert_eq!(cookie.wait().await.unwrap_err(), x11::Error::ConnectionClosed);
    assert_matches!(connection.send(&GetInputFocus).await, Err(x11::Error::ConnectionClosed));
    assert_eq!(connection.wait_for_error().await.unwrap_err(), x11::Error::ConnectionClosed);
    assert_eq!(connection.wait_for_event().await.unwrap_err(), x11::Error::ConnectionClosed);
    assert_eq!(connection.generate_id().unwrap(), RESOURCE_ID_BASE | 1);
}
