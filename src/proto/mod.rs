mod error_code;
mod packet;
pub mod render;
mod setup;
pub mod xfixes;
pub mod xproto;

pub use self::error_code::ErrorCode;
pub use self::packet::{Event, PacketHeader, PacketKind, ProtocolError, PACKET_LEN};
pub use self::setup::{
    build_setup_request,
    decode_setup,
    setup_body_len,
    Depth,
    PixmapFormat,
    Screen,
    Setup,
    VisualType,
    SETUP_HEADER_LEN,
};
pub use crate::record::ByteOrder;
use crate::error::Error;
use crate::record::{self, Cursor, DeserializeError, Writer};

/// Alignment of list segments in requests.
pub const REQUEST_ALIGN: usize = 4;

/// Maximum request length expressible in 16-bit length header, in bytes.
pub const MAX_REQUEST_LEN: usize = u16::MAX as usize * 4;

/// Layout of one variable-length list trailing a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ListDescriptor {
    pub name: &'static str,
    pub element_size: usize,
    pub align: usize,
}

impl ListDescriptor {
    pub const fn new(name: &'static str, element_size: usize) -> Self {
        Self { name, element_size, align: REQUEST_ALIGN }
    }
}

/// Static layout and routing data of a request type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub name: &'static str,
    /// Extension name, `None` for core requests.
    pub extension: Option<&'static str>,
    /// Major opcode for core requests, minor opcode for extension requests.
    pub opcode: u8,
    /// Size of fixed part including 4-byte header.
    pub fixed_len: usize,
    pub lists: &'static [ListDescriptor],
    pub is_void: bool,
}

impl RequestDescriptor {
    /// Serialized size of a request with given element counts for its lists.
    pub fn sizeof(&self, counts: &[usize]) -> usize {
        assert_eq!(counts.len(), self.lists.len(), "{} expects {} list counts", self.name, self.lists.len());
        let mut len = self.fixed_len;
        for (list, count) in self.lists.iter().zip(counts) {
            let list_len = count * list.element_size;
            len += list_len + record::pad(list_len, list.align);
        }
        len
    }
}

/// Typed request with its static descriptor.
pub trait Request {
    const DESCRIPTOR: RequestDescriptor;

    type Reply: Reply;

    /// Second header byte of core requests.
    fn detail(&self) -> u8 {
        0
    }

    fn validate(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Writes fixed part after 4-byte header, pad bytes zeroed.
    fn serialize_fixed(&self, buf: &mut Writer<'_>);

    /// Element count of list at `index`.
    fn list_count(&self, index: usize) -> usize {
        unreachable!("{} has no list {}", Self::DESCRIPTOR.name, index)
    }

    fn serialize_list(&self, index: usize, _buf: &mut Writer<'_>) {
        unreachable!("{} has no list {}", Self::DESCRIPTOR.name, index)
    }
}

/// Reply decoded from a complete reply packet, header included.
pub trait Reply: Sized + Send + 'static {
    fn decode(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError>;
}

impl Reply for () {
    fn decode(_buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        Ok(())
    }
}

/// Serializes a request into bytes ready for the wire.
///
/// Fails before producing any byte if request is malformed.
pub fn build_request<R: Request>(
    request: &R,
    major_opcode: u8,
    minor_or_detail: u8,
    order: ByteOrder,
) -> Result<Vec<u8>, Error> {
    let descriptor = &R::DESCRIPTOR;
    request.validate()?;
    let counts: Vec<usize> = (0..descriptor.lists.len()).map(|i| request.list_count(i)).collect();
    let len = descriptor.sizeof(&counts);
    if len > MAX_REQUEST_LEN {
        return Err(Error::RequestTooLarge { request: descriptor.name, len, max: MAX_REQUEST_LEN });
    }
    let mut buf = Vec::with_capacity(len);
    let mut writer = Writer::new(&mut buf, order);
    writer.put_u8(major_opcode);
    writer.put_u8(minor_or_detail);
    writer.put_u16((len / 4) as u16);
    request.serialize_fixed(&mut writer);
    assert_eq!(writer.written(), descriptor.fixed_len, "{} fixed part", descriptor.name);
    for (i, (list, count)) in descriptor.lists.iter().zip(&counts).enumerate() {
        let start = writer.written();
        request.serialize_list(i, &mut writer);
        let list_len = writer.written() - start;
        assert_eq!(list_len, count * list.element_size, "{}.{} element count mismatch", descriptor.name, list.name);
        writer.put_zeros(record::pad(list_len, list.align));
    }
    assert_eq!(writer.written(), len, "{} computed size", descriptor.name);
    assert_eq!(len % 4, 0, "{} length not multiple of 4", descriptor.name);
    Ok(buf)
}

/// Decodes a reply, mapping codec errors to [Error::UnmarshalError].
pub fn decode_reply<R: Reply>(buf: &[u8], order: ByteOrder) -> Result<R, Error> {
    let mut cursor = Cursor::new(buf, order);
    R::decode(&mut cursor).map_err(|e| e.with_entity(std::any::type_name::<R>()))
}
