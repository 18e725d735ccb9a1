use crate::error::Error;
use crate::record::{self, ByteOrder, Cursor, DeserializableRecord, DeserializeError, StaticRecord, Writer};

pub const PROTOCOL_MAJOR_VERSION: u16 = 11;
pub const PROTOCOL_MINOR_VERSION: u16 = 0;

/// Fixed prefix of every setup reply, which carries its remaining length.
pub const SETUP_HEADER_LEN: usize = 8;

const SETUP_FAILED: u8 = 0;
const SETUP_SUCCESS: u8 = 1;
const SETUP_AUTHENTICATE: u8 = 2;

/// Builds connection setup request, passing authorization opaquely.
///
/// Fails if authorization name or data does not fit its 16-bit length field.
pub fn build_setup_request(order: ByteOrder, auth_name: &[u8], auth_data: &[u8]) -> Result<Vec<u8>, Error> {
    if auth_name.len() > u16::MAX as usize {
        return Err(Error::BadArguments(&"authorization name longer than 65535 bytes"));
    } else if auth_data.len() > u16::MAX as usize {
        return Err(Error::BadArguments(&"authorization data longer than 65535 bytes"));
    }
    let len = 12 + record::padded_len(auth_name.len(), 4) + record::padded_len(auth_data.len(), 4);
    let mut buf = Vec::with_capacity(len);
    let mut writer = Writer::new(&mut buf, order);
    writer.put_u8(order.setup_byte());
    writer.put_u8(0);
    writer.put_u16(PROTOCOL_MAJOR_VERSION);
    writer.put_u16(PROTOCOL_MINOR_VERSION);
    writer.put_u16(auth_name.len() as u16);
    writer.put_u16(auth_data.len() as u16);
    writer.put_zeros(2);
    writer.put_slice(auth_name);
    writer.put_padding(4);
    writer.put_slice(auth_data);
    writer.put_padding(4);
    Ok(buf)
}

/// Bytes following setup reply header.
pub fn setup_body_len(header: &[u8; SETUP_HEADER_LEN], order: ByteOrder) -> usize {
    let bytes = [header[6], header[7]];
    let units = match order {
        ByteOrder::LsbFirst => u16::from_le_bytes(bytes),
        ByteOrder::MsbFirst => u16::from_be_bytes(bytes),
    };
    units as usize * 4
}

fn reason(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Decodes setup reply into [Setup] or the refusal it carries.
pub fn decode_setup(header: &[u8; SETUP_HEADER_LEN], body: &[u8], order: ByteOrder) -> Result<Setup, Error> {
    match header[0] {
        SETUP_FAILED => {
            let len = (header[1] as usize).min(body.len());
            Err(Error::SetupRefused(reason(&body[..len])))
        },
        SETUP_AUTHENTICATE => Err(Error::AuthenticationRequired(reason(body))),
        SETUP_SUCCESS => {
            let mut cursor = Cursor::new(header, order);
            let mut versions = || -> Result<(u16, u16), DeserializeError> {
                cursor.skip(2)?;
                Ok((cursor.get_u16()?, cursor.get_u16()?))
            };
            let (major, minor) = versions().map_err(|e| e.with_entity("setup"))?;
            let mut cursor = Cursor::new(body, order);
            let mut setup = record::unmarshal::<Setup>(&mut cursor)?;
            setup.protocol_major_version = major;
            setup.protocol_minor_version = minor;
            Ok(setup)
        },
        status => Err(Error::UnexpectedError(format!("unknown setup status {}", status))),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixmapFormat {
    pub depth: u8,
    pub bits_per_pixel: u8,
    pub scanline_pad: u8,
}

impl StaticRecord for PixmapFormat {
    fn record_len() -> usize {
        8
    }

    fn record_align() -> usize {
        4
    }
}

impl DeserializableRecord for PixmapFormat {
    fn deserialize(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        let depth = buf.get_u8()?;
        let bits_per_pixel = buf.get_u8()?;
        let scanline_pad = buf.get_u8()?;
        buf.skip(5)?;
        Ok(PixmapFormat { depth, bits_per_pixel, scanline_pad })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisualType {
    pub visual_id: u32,
    pub class: u8,
    pub bits_per_rgb_value: u8,
    pub colormap_entries: u16,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
}

impl StaticRecord for VisualType {
    fn record_len() -> usize {
        24
    }

    fn record_align() -> usize {
        4
    }
}

impl DeserializableRecord for VisualType {
    fn deserialize(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        let visual = VisualType {
            visual_id: buf.get_u32()?,
            class: buf.get_u8()?,
            bits_per_rgb_value: buf.get_u8()?,
            colormap_entries: buf.get_u16()?,
            red_mask: buf.get_u32()?,
            green_mask: buf.get_u32()?,
            blue_mask: buf.get_u32()?,
        };
        buf.skip(4)?;
        Ok(visual)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Depth {
    pub depth: u8,
    pub visuals: Vec<VisualType>,
}

impl DeserializableRecord for Depth {
    fn deserialize(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        let depth = buf.get_u8()?;
        buf.skip(1)?;
        let visuals_len = buf.get_u16()? as usize;
        buf.skip(4)?;
        let visuals = buf.read_list(visuals_len)?;
        Ok(Depth { depth, visuals })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Screen {
    pub root: u32,
    pub default_colormap: u32,
    pub white_pixel: u32,
    pub black_pixel: u32,
    pub current_input_masks: u32,
    pub width_in_pixels: u16,
    pub height_in_pixels: u16,
    pub width_in_millimeters: u16,
    pub height_in_millimeters: u16,
    pub min_installed_maps: u16,
    pub max_installed_maps: u16,
    pub root_visual: u32,
    pub backing_stores: u8,
    pub save_unders: bool,
    pub root_depth: u8,
    pub allowed_depths: Vec<Depth>,
}

impl DeserializableRecord for Screen {
    fn deserialize(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        let root = buf.get_u32()?;
        let default_colormap = buf.get_u32()?;
        let white_pixel = buf.get_u32()?;
        let black_pixel = buf.get_u32()?;
        let current_input_masks = buf.get_u32()?;
        let width_in_pixels = buf.get_u16()?;
        let height_in_pixels = buf.get_u16()?;
        let width_in_millimeters = buf.get_u16()?;
        let height_in_millimeters = buf.get_u16()?;
        let min_installed_maps = buf.get_u16()?;
        let max_installed_maps = buf.get_u16()?;
        let root_visual = buf.get_u32()?;
        let backing_stores = buf.get_u8()?;
        let save_unders = buf.get_bool()?;
        let root_depth = buf.get_u8()?;
        let depths_len = buf.get_u8()? as usize;
        let mut allowed_depths = Vec::with_capacity(depths_len);
        for _ in 0..depths_len {
            allowed_depths.push(buf.get::<Depth>()?);
        }
        Ok(Screen {
            root,
            default_colormap,
            white_pixel,
            black_pixel,
            current_input_masks,
            width_in_pixels,
            height_in_pixels,
            width_in_millimeters,
            height_in_millimeters,
            min_installed_maps,
            max_installed_maps,
            root_visual,
            backing_stores,
            save_unders,
            root_depth,
            allowed_depths,
        })
    }
}

/// Accepted connection setup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Setup {
    pub protocol_major_version: u16,
    pub protocol_minor_version: u16,
    pub release_number: u32,
    pub resource_id_base: u32,
    pub resource_id_mask: u32,
    pub motion_buffer_size: u32,
    /// Maximum request length in 4-byte units.
    pub maximum_request_length: u16,
    pub image_byte_order: u8,
    pub bitmap_format_bit_order: u8,
    pub bitmap_format_scanline_unit: u8,
    pub bitmap_format_scanline_pad: u8,
    pub min_keycode: u8,
    pub max_keycode: u8,
    pub vendor: String,
    pub pixmap_formats: Vec<PixmapFormat>,
    pub roots: Vec<Screen>,
}

impl DeserializableRecord for Setup {
    fn deserialize(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
        let release_number = buf.get_u32()?;
        let resource_id_base = buf.get_u32()?;
        let resource_id_mask = buf.get_u32()?;
        let motion_buffer_size = buf.get_u32()?;
        let vendor_len = buf.get_u16()? as usize;
        let maximum_request_length = buf.get_u16()?;
        let roots_len = buf.get_u8()? as usize;
        let pixmap_formats_len = buf.get_u8()? as usize;
        let image_byte_order = buf.get_u8()?;
        let bitmap_format_bit_order = buf.get_u8()?;
        let bitmap_format_scanline_unit = buf.get_u8()?;
        let bitmap_format_scanline_pad = buf.get_u8()?;
        let min_keycode = buf.get_u8()?;
        let max_keycode = buf.get_u8()?;
        buf.skip(4)?;
        let vendor = String::from_utf8_lossy(buf.get_bytes(vendor_len)?).into_owned();
        let pixmap_formats = buf.read_list(pixmap_formats_len)?;
        let mut roots = Vec::with_capacity(roots_len);
        for _ in 0..roots_len {
            roots.push(buf.get::<Screen>()?);
        }
        Ok(Setup {
            protocol_major_version: PROTOCOL_MAJOR_VERSION,
            protocol_minor_version: PROTOCOL_MINOR_VERSION,
            release_number,
            resource_id_base,
            resource_id_mask,
            motion_buffer_size,
            maximum_request_length,
            image_byte_order,
            bitmap_format_bit_order,
            bitmap_format_scanline_unit,
            bitmap_format_scanline_pad,
            min_keycode,
            max_keycode,
            vendor,
            pixmap_formats,
            roots,
        })
    }
}

impl Setup {
    /// Maximum request length in bytes.
    pub fn maximum_request_bytes(&self) -> usize {
        self.maximum_request_length as usize * 4
    }
}
