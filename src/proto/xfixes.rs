//! XFIXES extension requests.

use num_enum::IntoPrimitive;

use super::xproto::{Rectangle, REPLY_HEADER_LEN};
use super::{ListDescriptor, Reply, Request, RequestDescriptor};
use crate::record::{Cursor, DeserializeError, Writer};

pub const EXTENSION_NAME: &str = "XFIXES";

const REGION_LISTS: &[ListDescriptor] = &[ListDescriptor::new("rectangles", 8)];

const fn descriptor(name: &'static str, opcode: u8, fixed_len: usize, is_void: bool) -> RequestDescriptor {
    RequestDescriptor { name, extension: Some(EXTENSION_NAME), opcode, fixed_len, lists: &[], is_void }
}

/// Region plus trailing rectangles.
const fn region_descriptor(name: &'static str, opcode: u8) -> RequestDescriptor {
    RequestDescriptor { lists: REGION_LISTS, ..descriptor(name, opcode, 8, true) }
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

    const DESCRIPTOR: RequestDescriptor = descriptor("XFixesQueryVersion", 0, 12, false);

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

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive)]
pub enum SaveSetMode {
    Insert = 0,
    Delete = 1,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive)]
pub enum SaveSetTarget {
    Nearest = 0,
    Root = 1,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive)]
pub enum SaveSetMapping {
    Map = 0,
    Unmap = 1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChangeSaveSet {
    pub mode: SaveSetMode,
    pub target: SaveSetTarget,
    pub map: SaveSetMapping,
    pub window: u32,
}

impl Request for ChangeSaveSet {
    type Reply = ();

    const DESCRIPTOR: RequestDescriptor = descriptor("XFixesChangeSaveSet", 1, 12, true);

    fn serialize_fixed(&self, buf: &mut Writer<'_>) {
        buf.put_u8(self.mode.into());
        buf.put_u8(self.target.into());
        buf.put_u8(self.map.into());
        buf.put_u8(0);
        buf.put_u32(self.window);
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GetCursorImage;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetCursorImageReply {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub xhot: u16,
    pub yhot: u16,
    pub cursor_serial: u32,
    /// ARGB pixels, `width * height` of them.
    pub cursor_image: Vec<u32>,
}

impl Request for GetCursorImage {
    type Reply = GetCursorImageReply;

    const DESCRIPTOR: RequestDescriptor = descriptor("XFixesGetCursorImage", 4, 4, false);

    fn serialize_fixed(&self, _buf: &mut Writer<'_>) {}
}

impl Reply for GetCursorImageReply {
    fn decode(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        buf.skip(REPLY_HEADER_LEN)?;
        let x = buf.get_i16()?;
        let y = buf.get_i16()?;
        let width = buf.get_u16()?;
        let height = buf.get_u16()?;
        let xhot = buf.get_u16()?;
        let yhot = buf.get_u16()?;
        let cursor_serial = buf.get_u32()?;
        buf.skip(8)?;
        let cursor_image = buf.read_list(width as usize * height as usize)?;
        Ok(GetCursorImageReply { x, y, width, height, xhot, yhot, cursor_serial, cursor_image })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateRegion {
    pub region: u32,
    pub rectangles: Vec<Rectangle>,
}

impl Request for CreateRegion {
    type Reply = ();

    const DESCRIPTOR: RequestDescriptor = region_descriptor("XFixesCreateRegion", 5);

    fn serialize_fixed(&self, buf: &mut Writer<'_>) {
        buf.put_u32(self.region);
    }

    fn list_count(&self, _index: usize) -> usize {
        self.rectangles.len()
    }

    fn serialize_list(&self, _index: usize, buf: &mut Writer<'_>) {
        buf.put_list(&self.rectangles);
    }
}

/// Replaces region content with given rectangles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetRegion {
    pub region: u32,
    pub rectangles: Vec<Rectangle>,
}

impl Request for SetRegion {
    type Reply = ();

    const DESCRIPTOR: RequestDescriptor = region_descriptor("XFixesSetRegion", 11);

    fn serialize_fixed(&self, buf: &mut Writer<'_>) {
        buf.put_u32(self.region);
    }

    fn list_count(&self, _index: usize) -> usize {
        self.rectangles.len()
    }

    fn serialize_list(&self, _index: usize, buf: &mut Writer<'_>) {
        buf.put_list(&self.rectangles);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DestroyRegion {
    pub region: u32,
}

impl Request for DestroyRegion {
    type Reply = ();

    const DESCRIPTOR: RequestDescriptor = descriptor("XFixesDestroyRegion", 10, 8, true);

    fn serialize_fixed(&self, buf: &mut Writer<'_>) {
        buf.put_u32(self.region);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FetchRegion {
    pub region: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRegionReply {
    pub extents: Rectangle,
    pub rectangles: Vec<Rectangle>,
}

impl Request for FetchRegion {
    type Reply = FetchRegionReply;

    const DESCRIPTOR: RequestDescriptor = descriptor("XFixesFetchRegion", 19, 8, false);

    fn serialize_fixed(&self, buf: &mut Writer<'_>) {
        buf.put_u32(self.region);
    }
}

impl Reply for FetchRegionReply {
    fn decode(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        buf.skip(4)?;
        let length = buf.get_u32()? as usize;
        let extents = buf.get::<Rectangle>()?;
        buf.skip(16)?;
        // Each rectangle takes two 4-byte units of reply length.
        let rectangles = buf.read_list(length / 2)?;
        Ok(FetchRegionReply { extents, rectangles })
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GetCursorImageAndName;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetCursorImageAndNameReply {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub xhot: u16,
    pub yhot: u16,
    pub cursor_serial: u32,
    pub cursor_atom: u32,
    pub name: Vec<u8>,
    pub cursor_image: Vec<u32>,
}

impl Request for GetCursorImageAndName {
    type Reply = GetCursorImageAndNameReply;

    const DESCRIPTOR: RequestDescriptor = descriptor("XFixesGetCursorImageAndName", 25, 4, false);

    fn serialize_fixed(&self, _buf: &mut Writer<'_>) {}
}

impl Reply for GetCursorImageAndNameReply {
    fn decode(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        buf.skip(REPLY_HEADER_LEN)?;
        let x = buf.get_i16()?;
        let y = buf.get_i16()?;
        let width = buf.get_u16()?;
        let height = buf.get_u16()?;
        let xhot = buf.get_u16()?;
        let yhot = buf.get_u16()?;
        let cursor_serial = buf.get_u32()?;
        let cursor_atom = buf.get_u32()?;
        let nbytes = buf.get_u16()? as usize;
        buf.skip(2)?;
        let name = buf.read_list::<u8>(nbytes)?;
        let cursor_image = buf.read_list(width as usize * height as usize)?;
        Ok(GetCursorImageAndNameReply {
            x,
            y,
            width,
            height,
            xhot,
            yhot,
            cursor_serial,
            cursor_atom,
            name,
            cursor_image,
        })
    }
}
