//! RENDER extension requests.

use num_enum::IntoPrimitive;

use super::xproto::REPLY_HEADER_LEN;
use super::{ListDescriptor, Reply, Request, RequestDescriptor};
use crate::record::{Cursor, DeserializeError, ValueList, Writer};

pub const EXTENSION_NAME: &str = "RENDER";

/// Bits of `CreatePicture` value mask.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive)]
pub enum PictureAttribute {
    Repeat = 1,
    AlphaMap = 1 << 1,
    AlphaXOrigin = 1 << 2,
    AlphaYOrigin = 1 << 3,
    ClipXOrigin = 1 << 4,
    ClipYOrigin = 1 << 5,
    ClipMask = 1 << 6,
    GraphicsExposure = 1 << 7,
    SubwindowMode = 1 << 8,
    PolyEdge = 1 << 9,
    PolyMode = 1 << 10,
    Dither = 1 << 11,
    ComponentAlpha = 1 << 12,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueryVersion {
    pub client_major_version: u32,
    pub client_minor_version: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueryVersionReply {
    pub major_version: u32,
    pub minor_version: u32,
}

impl Request for QueryVersion {
    type Reply = QueryVersionReply;

    const DESCRIPTOR: RequestDescriptor = RequestDescriptor {
        name: "RenderQueryVersion",
        extension: Some(EXTENSION_NAME),
        opcode: 0,
        fixed_len: 12,
        lists: &[],
        is_void: false,
    };

    fn serialize_fixed(&self, buf: &mut Writer<'_>) {
        buf.put_u32(self.client_major_version);
        buf.put_u32(self.client_minor_version);
    }
}

impl Reply for QueryVersionReply {
    fn decode(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        buf.skip(REPLY_HEADER_LEN)?;
        Ok(QueryVersionReply { major_version: buf.get_u32()?, minor_version: buf.get_u32()? })
    }
}

/// Creates a picture. Value list length is popcount of its mask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatePicture {
    pub pid: u32,
    pub drawable: u32,
    pub format: u32,
    pub values: ValueList,
}

impl CreatePicture {
    pub fn new(pid: u32, drawable: u32, format: u32) -> Self {
        CreatePicture { pid, drawable, format, values: ValueList::new() }
    }

    pub fn with(mut self, attribute: PictureAttribute, value: u32) -> Self {
        self.values.set(attribute.into(), value);
        self
    }
}

impl Request for CreatePicture {
    type Reply = ();

    const DESCRIPTOR: RequestDescriptor = RequestDescriptor {
        name: "RenderCreatePicture",
        extension: Some(EXTENSION_NAME),
        opcode: 4,
        fixed_len: 20,
        lists: &[ListDescriptor::new("value_list", 4)],
        is_void: true,
    };

    fn serialize_fixed(&self, buf: &mut Writer<'_>) {
        buf.put_u32(self.pid);
        buf.put_u32(self.drawable);
        buf.put_u32(self.format);
        buf.put_u32(self.values.mask());
    }

    fn list_count(&self, _index: usize) -> usize {
        self.values.len()
    }

    fn serialize_list(&self, _index: usize, buf: &mut Writer<'_>) {
        self.values.values().for_each(|value| buf.put_u32(value));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;
    use crate::proto::{build_request, decode_reply, ByteOrder};
    use crate::record::popcount;

    #[test_case(&[]; "no values")]
    #[test_case(&[(PictureAttribute::Repeat, 1)]; "one value")]
    #[test_case(
        &[(PictureAttribute::ComponentAlpha, 1), (PictureAttribute::Repeat, 2), (PictureAttribute::PolyEdge, 0)];
        "three values"
    )]
    fn test_create_picture_read_back(attributes: &[(PictureAttribute, u32)]) {
        let request = attributes
            .iter()
            .fold(CreatePicture::new(1, 2, 3), |request, &(attribute, value)| request.with(attribute, value));
        let buf = build_request(&request, 139, 4, ByteOrder::LsbFirst).unwrap();
        let mut cursor = Cursor::new(&buf, ByteOrder::LsbFirst);
        assert_eq!((cursor.get_u8().unwrap(), cursor.get_u8().unwrap()), (139, 4));
        assert_eq!(cursor.get_u16().unwrap() as usize * 4, buf.len());
        assert_eq!([cursor.get_u32().unwrap(), cursor.get_u32().unwrap(), cursor.get_u32().unwrap()], [1, 2, 3]);
        let mask = cursor.get_u32().unwrap();
        assert_eq!(popcount(mask), attributes.len());
        let values = cursor.read_list::<u32>(popcount(mask)).unwrap();
        assert_eq!(values, request.values.values().collect::<Vec<_>>());
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_create_picture() {
        let request = CreatePicture::new(0x20_0001, 0x7b4, 0x23)
            .with(PictureAttribute::ComponentAlpha, 1)
            .with(PictureAttribute::Repeat, 2);
        assert_eq!(popcount(request.values.mask()), 2);
        let buf = build_request(&request, 139, 4, ByteOrder::MsbFirst).unwrap();
        assert_eq!(buf.len(), 28);
        assert_eq!(&buf[..4], &[139, 4, 0, 7]);
        assert_eq!(&buf[16..20], &[0, 0, 0x10, 0x01]);
        assert_eq!(&buf[20..], &[0, 0, 0, 2, 0, 0, 0, 1]);
    }

    #[test]
    fn test_create_picture_without_values() {
        let request = CreatePicture::new(1, 2, 3);
        let buf = build_request(&request, 139, 4, ByteOrder::LsbFirst).unwrap();
        assert_eq!(buf.len(), 20);
        assert_eq!(&buf[16..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_query_version_reply() {
        let mut buf = [0u8; 32];
        buf[8..16].copy_from_slice(&[0, 0, 0, 0, 11, 0, 0, 0]);
        let reply: QueryVersionReply = decode_reply(&buf, ByteOrder::LsbFirst).unwrap();
        assert_eq!(reply, QueryVersionReply { major_version: 0, minor_version: 11 });
    }
}
