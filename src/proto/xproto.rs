//! Core protocol requests used by connection machinery and callers.

use super::{ListDescriptor, Reply, Request, RequestDescriptor};
use crate::error::Error;
use crate::record::{Cursor, DeserializableRecord, DeserializeError, SerializableRecord, StaticRecord, Writer};

/// Bytes preceding reply-specific fields: type, data byte, sequence and length.
pub(crate) const REPLY_HEADER_LEN: usize = 8;

const NAME: ListDescriptor = ListDescriptor::new("name", 1);

fn validate_name(name: &str) -> Result<(), Error> {
    if name.len() > u16::MAX as usize {
        return Err(Error::BadArguments(&"name longer than 65535 bytes"));
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rectangle {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

impl Rectangle {
    pub const fn new(x: i16, y: i16, width: u16, height: u16) -> Self {
        Rectangle { x, y, width, height }
    }
}

impl StaticRecord for Rectangle {
    fn record_len() -> usize {
        8
    }

    fn record_align() -> usize {
        2
    }
}

impl SerializableRecord for Rectangle {
    fn serialize(&self, buf: &mut Writer<'_>) {
        buf.put_i16(self.x);
        buf.put_i16(self.y);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
    }
}

impl DeserializableRecord for Rectangle {
    fn deserialize(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        Ok(Rectangle { x: buf.get_i16()?, y: buf.get_i16()?, width: buf.get_u16()?, height: buf.get_u16()? })
    }
}

/// Queries presence and opcodes of an extension.
#[derive(Copy, Clone, Debug)]
pub struct QueryExtension<'a> {
    pub name: &'a str,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueryExtensionReply {
    pub present: bool,
    pub major_opcode: u8,
    pub first_event: u8,
    pub first_error: u8,
}

impl Request for QueryExtension<'_> {
    type Reply = QueryExtensionReply;

    const DESCRIPTOR: RequestDescriptor = RequestDescriptor {
        name: "QueryExtension",
        extension: None,
        opcode: 98,
        fixed_len: 8,
        lists: &[NAME],
        is_void: false,
    };

    fn validate(&self) -> Result<(), Error> {
        validate_name(self.name)
    }

    fn serialize_fixed(&self, buf: &mut Writer<'_>) {
        buf.put_u16(self.name.len() as u16);
        buf.put_zeros(2);
    }

    fn list_count(&self, _index: usize) -> usize {
        self.name.len()
    }

    fn serialize_list(&self, _index: usize, buf: &mut Writer<'_>) {
        buf.put_slice(self.name.as_bytes());
    }
}

impl Reply for QueryExtensionReply {
    fn decode(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        buf.skip(REPLY_HEADER_LEN)?;
        Ok(QueryExtensionReply {
            present: buf.get_u8()? != 0,
            major_opcode: buf.get_u8()?,
            first_event: buf.get_u8()?,
            first_error: buf.get_u8()?,
        })
    }
}

/// Cheapest reply-bearing request, used to round-trip with server.
#[derive(Copy, Clone, Debug, Default)]
pub struct GetInputFocus;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GetInputFocusReply {
    pub revert_to: u8,
    pub focus: u32,
}

impl Request for GetInputFocus {
    type Reply = GetInputFocusReply;

    const DESCRIPTOR: RequestDescriptor = RequestDescriptor {
        name: "GetInputFocus",
        extension: None,
        opcode: 43,
        fixed_len: 4,
        lists: &[],
        is_void: false,
    };

    fn serialize_fixed(&self, _buf: &mut Writer<'_>) {}
}

impl Reply for GetInputFocusReply {
    fn decode(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        buf.skip(1)?;
        let revert_to = buf.get_u8()?;
        buf.skip(6)?;
        let focus = buf.get_u32()?;
        Ok(GetInputFocusReply { revert_to, focus })
    }
}

#[derive(Copy, Clone, Debug)]
pub struct InternAtom<'a> {
    pub only_if_exists: bool,
    pub name: &'a str,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InternAtomReply {
    /// `0` when atom does not exist and `only_if_exists` was set.
    pub atom: u32,
}

impl Request for InternAtom<'_> {
    type Reply = InternAtomReply;

    const DESCRIPTOR: RequestDescriptor = RequestDescriptor {
        name: "InternAtom",
        extension: None,
        opcode: 16,
        fixed_len: 8,
        lists: &[NAME],
        is_void: false,
    };

    fn detail(&self) -> u8 {
        u8::from(self.only_if_exists)
    }

    fn validate(&self) -> Result<(), Error> {
        validate_name(self.name)
    }

    fn serialize_fixed(&self, buf: &mut Writer<'_>) {
        buf.put_u16(self.name.len() as u16);
        buf.put_zeros(2);
    }

    fn list_count(&self, _index: usize) -> usize {
        self.name.len()
    }

    fn serialize_list(&self, _index: usize, buf: &mut Writer<'_>) {
        buf.put_slice(self.name.as_bytes());
    }
}

impl Reply for InternAtomReply {
    fn decode(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        buf.skip(REPLY_HEADER_LEN)?;
        Ok(InternAtomReply { atom: buf.get_u32()? })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;
    use crate::proto::{build_request, decode_reply, ByteOrder};
    use crate::record::pad;

    #[test_case(""; "empty")]
    #[test_case("X"; "one byte")]
    #[test_case("MIT-SHM"; "odd length")]
    #[test_case("XFIXES"; "even length")]
    #[test_case("XINERAMA"; "aligned")]
    fn test_query_extension_read_back(name: &str) {
        let buf = build_request(&QueryExtension { name }, 98, 0, ByteOrder::MsbFirst).unwrap();
        let mut cursor = Cursor::new(&buf, ByteOrder::MsbFirst);
        assert_eq!(cursor.order(), ByteOrder::MsbFirst);
        assert_eq!(cursor.get_u8().unwrap(), 98);
        cursor.skip(1).unwrap();
        assert_eq!(cursor.get_u16().unwrap() as usize * 4, buf.len());
        let len = cursor.get_u16().unwrap() as usize;
        cursor.skip(2).unwrap();
        assert_eq!(cursor.read_list::<u8>(len).unwrap(), name.as_bytes());
        let remaining = cursor.remaining();
        assert_eq!(remaining, pad(len, 4));
        assert!(cursor.get_bytes(remaining).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_query_extension() {
        let request = QueryExtension { name: "XFIXES" };
        let buf = build_request(&request, 98, 0, ByteOrder::LsbFirst).unwrap();
        assert_eq!(buf, [98, 0, 4, 0, 6, 0, 0, 0, b'X', b'F', b'I', b'X', b'E', b'S', 0, 0]);

        let mut reply = [0u8; 32];
        reply[0] = 1;
        reply[8..12].copy_from_slice(&[1, 138, 87, 140]);
        let reply: QueryExtensionReply = decode_reply(&reply, ByteOrder::LsbFirst).unwrap();
        assert_eq!(reply, QueryExtensionReply { present: true, major_opcode: 138, first_event: 87, first_error: 140 });
    }

    #[test]
    fn test_intern_atom() {
        let request = InternAtom { only_if_exists: true, name: "WM_NAME" };
        let buf = build_request(&request, 16, request.detail(), ByteOrder::MsbFirst).unwrap();
        assert_eq!(&buf[..8], &[16, 1, 0, 4, 0, 7, 0, 0]);
        assert_eq!(&buf[8..], b"WM_NAME\0");

        let mut reply = [0u8; 32];
        reply[8..12].copy_from_slice(&[0, 0, 0, 39]);
        let reply: InternAtomReply = decode_reply(&reply, ByteOrder::MsbFirst).unwrap();
        assert_eq!(reply.atom, 39);
    }

    #[test]
    fn test_get_input_focus() {
        let buf = build_request(&GetInputFocus, 43, 0, ByteOrder::LsbFirst).unwrap();
        assert_eq!(buf, [43, 0, 1, 0]);

        let mut reply = [0u8; 32];
        reply[1] = 2;
        reply[8..12].copy_from_slice(&[0x01, 0x02, 0x00, 0x00]);
        let reply: GetInputFocusReply = decode_reply(&reply, ByteOrder::LsbFirst).unwrap();
        assert_eq!(reply, GetInputFocusReply { revert_to: 2, focus: 0x201 });
    }

    #[test]
    fn test_name_too_long() {
        let name = "x".repeat(70000);
        let request = QueryExtension { name: &name };
        assert_eq!(
            build_request(&request, 98, 0, ByteOrder::LsbFirst).unwrap_err(),
            Error::BadArguments(&"name longer than 65535 bytes")
        );
    }
}
