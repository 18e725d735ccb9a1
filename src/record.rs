use std::borrow::Cow;

use bytes::{Buf, BufMut};

use super::error::Error;

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum DeserializeError {
    #[error("insufficient buf: need {needed} bytes at offset {offset}, got {len}")]
    InsufficientBuf { offset: usize, needed: usize, len: usize },

    #[error("{0}")]
    UnmarshalError(String),
}

impl DeserializeError {
    pub fn with_entity(self, entity: &'static str) -> Error {
        let reason = match self {
            err @ DeserializeError::InsufficientBuf { .. } => Cow::Owned(err.to_string()),
            DeserializeError::UnmarshalError(reason) => Cow::Owned(reason),
        };
        Error::UnmarshalError { entity, reason }
    }
}

/// Byte order of multi-byte integers on a connection, chosen by client in connection setup.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    LsbFirst,
    MsbFirst,
}

impl ByteOrder {
    pub const fn native() -> ByteOrder {
        if cfg!(target_endian = "little") {
            ByteOrder::LsbFirst
        } else {
            ByteOrder::MsbFirst
        }
    }

    /// Byte leading connection setup request.
    pub const fn setup_byte(self) -> u8 {
        match self {
            ByteOrder::LsbFirst => b'l',
            ByteOrder::MsbFirst => b'B',
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        ByteOrder::native()
    }
}

/// Zero bytes to append after `len` bytes to reach next multiple of `align`.
///
/// `align` must be a power of two.
pub const fn pad(len: usize, align: usize) -> usize {
    len.wrapping_neg() & (align - 1)
}

pub const fn padded_len(len: usize, align: usize) -> usize {
    len + pad(len, align)
}

/// Start offset of a field following one ending at `end`.
pub const fn locate_field(end: usize, align: usize) -> usize {
    padded_len(end, align)
}

/// Number of list values selected by a value mask.
pub const fn popcount(mask: u32) -> usize {
    mask.count_ones() as usize
}

/// Values keyed by single mask bits, kept in ascending bit order.
///
/// Wire order of values follows bit order, and value count always equals `popcount(mask)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValueList {
    entries: Vec<(u32, u32)>,
}

impl ValueList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets value for `bit`, replacing previous one.
    pub fn set(&mut self, bit: u32, value: u32) -> &mut Self {
        assert!(bit.is_power_of_two(), "value list key {:#x} is not a single bit", bit);
        match self.entries.binary_search_by_key(&bit, |(bit, _)| *bit) {
            Ok(i) => self.entries[i].1 = value,
            Err(i) => self.entries.insert(i, (bit, value)),
        }
        self
    }

    pub fn with(mut self, bit: u32, value: u32) -> Self {
        self.set(bit, value);
        self
    }

    pub fn mask(&self) -> u32 {
        self.entries.iter().fold(0, |mask, (bit, _)| mask | bit)
    }

    pub fn values(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(_, value)| *value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Byte-order aware writer appending to a request buffer.
pub struct Writer<'a> {
    buf: &'a mut Vec<u8>,
    order: ByteOrder,
    start: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut Vec<u8>, order: ByteOrder) -> Self {
        let start = buf.len();
        Writer { buf, order, start }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Bytes written through this writer.
    pub fn written(&self) -> usize {
        self.buf.len() - self.start
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.put_u8(u8::from(v));
    }

    pub fn put_u16(&mut self, v: u16) {
        match self.order {
            ByteOrder::LsbFirst => self.buf.put_u16_le(v),
            ByteOrder::MsbFirst => self.buf.put_u16(v),
        }
    }

    pub fn put_i16(&mut self, v: i16) {
        match self.order {
            ByteOrder::LsbFirst => self.buf.put_i16_le(v),
            ByteOrder::MsbFirst => self.buf.put_i16(v),
        }
    }

    pub fn put_u32(&mut self, v: u32) {
        match self.order {
            ByteOrder::LsbFirst => self.buf.put_u32_le(v),
            ByteOrder::MsbFirst => self.buf.put_u32(v),
        }
    }

    pub fn put_i32(&mut self, v: i32) {
        match self.order {
            ByteOrder::LsbFirst => self.buf.put_i32_le(v),
            ByteOrder::MsbFirst => self.buf.put_i32(v),
        }
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn put_zeros(&mut self, n: usize) {
        self.buf.put_bytes(0, n);
    }

    /// Zero pads written bytes to multiple of `align`, returns number of padding bytes.
    pub fn put_padding(&mut self, align: usize) -> usize {
        let n = pad(self.written(), align);
        self.put_zeros(n);
        n
    }

    pub fn put<T: SerializableRecord + ?Sized>(&mut self, record: &T) {
        record.serialize(self);
    }

    pub fn put_list<T: SerializableRecord>(&mut self, records: &[T]) {
        records.iter().for_each(|record| record.serialize(self));
    }
}

/// Cursor over a received packet tracking consumed bytes.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    offset: usize,
    order: ByteOrder,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8], order: ByteOrder) -> Self {
        Cursor { buf, offset: 0, order }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DeserializeError> {
        if n > self.remaining() {
            return Err(DeserializeError::InsufficientBuf { offset: self.offset, needed: n, len: self.buf.len() });
        }
        let bytes = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DeserializeError> {
        self.take(n).map(|_| ())
    }

    /// Moves to start of next field aligned to `align`, returns new offset.
    ///
    /// Padding past end of buffer is tolerated as trailing padding is not always transmitted.
    pub fn align_to(&mut self, align: usize) -> usize {
        self.offset = locate_field(self.offset, align).min(self.buf.len());
        self.offset
    }

    /// Consumes `n` bytes of a field and moves to next field aligned to `align`.
    pub fn advance(&mut self, n: usize, align: usize) -> Result<usize, DeserializeError> {
        self.skip(n)?;
        Ok(self.align_to(align))
    }

    pub fn get_u8(&mut self) -> Result<u8, DeserializeError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_bool(&mut self) -> Result<bool, DeserializeError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            u => Err(DeserializeError::UnmarshalError(format!("invalid value {} for bool", u))),
        }
    }

    pub fn get_u16(&mut self) -> Result<u16, DeserializeError> {
        let mut bytes = self.take(2)?;
        Ok(match self.order {
            ByteOrder::LsbFirst => bytes.get_u16_le(),
            ByteOrder::MsbFirst => bytes.get_u16(),
        })
    }

    pub fn get_i16(&mut self) -> Result<i16, DeserializeError> {
        let mut bytes = self.take(2)?;
        Ok(match self.order {
            ByteOrder::LsbFirst => bytes.get_i16_le(),
            ByteOrder::MsbFirst => bytes.get_i16(),
        })
    }

    pub fn get_u32(&mut self) -> Result<u32, DeserializeError> {
        let mut bytes = self.take(4)?;
        Ok(match self.order {
            ByteOrder::LsbFirst => bytes.get_u32_le(),
            ByteOrder::MsbFirst => bytes.get_u32(),
        })
    }

    pub fn get_i32(&mut self) -> Result<i32, DeserializeError> {
        let mut bytes = self.take(4)?;
        Ok(match self.order {
            ByteOrder::LsbFirst => bytes.get_i32_le(),
            ByteOrder::MsbFirst => bytes.get_i32(),
        })
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], DeserializeError> {
        self.take(n)
    }

    pub fn get<T: DeserializableRecord>(&mut self) -> Result<T, DeserializeError> {
        T::deserialize(self)
    }

    /// Reads `count` records starting at next offset aligned for `T`.
    pub fn read_list<T>(&mut self, count: usize) -> Result<Vec<T>, DeserializeError>
    where
        T: DeserializableRecord + StaticRecord, {
        self.align_to(T::record_align());
        let needed = count.saturating_mul(T::record_len());
        if needed > self.remaining() {
            return Err(DeserializeError::InsufficientBuf { offset: self.offset, needed, len: self.buf.len() });
        }
        let mut list = Vec::with_capacity(count);
        for _ in 0..count {
            list.push(T::deserialize(self)?);
        }
        Ok(list)
    }
}

pub trait SerializableRecord {
    fn serialize(&self, buf: &mut Writer<'_>);
}

pub trait StaticRecord {
    fn record_len() -> usize;

    /// Natural alignment of record on wire.
    fn record_align() -> usize {
        Self::record_len()
    }
}

pub trait DeserializableRecord: Sized {
    fn deserialize(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError>;
}

pub fn unmarshal<T: DeserializableRecord>(buf: &mut Cursor<'_>) -> Result<T, Error> {
    T::deserialize(buf).map_err(|e| e.with_entity(std::any::type_name::<T>()))
}

impl<T> SerializableRecord for &T
where
    T: SerializableRecord + ?Sized,
{
    fn serialize(&self, buf: &mut Writer<'_>) {
        (*self).serialize(buf)
    }
}

impl SerializableRecord for [u8] {
    fn serialize(&self, buf: &mut Writer<'_>) {
        buf.put_slice(self);
    }
}

impl SerializableRecord for str {
    fn serialize(&self, buf: &mut Writer<'_>) {
        buf.put_slice(self.as_bytes());
    }
}

macro_rules! impl_primitive_record {
    ($ty:ty, $len:expr, $put:ident, $get:ident) => {
        impl SerializableRecord for $ty {
            fn serialize(&self, buf: &mut Writer<'_>) {
                buf.$put(*self);
            }
        }

        impl StaticRecord for $ty {
            fn record_len() -> usize {
                $len
            }
        }

        impl DeserializableRecord for $ty {
            fn deserialize(buf: &mut Cursor<'_>) -> Result<Self, DeserializeError> {
                buf.$get()
            }
        }
    };
}

impl_primitive_record!(u8, 1, put_u8, get_u8);
impl_primitive_record!(u16, 2, put_u16, get_u16);
impl_primitive_record!(i16, 2, put_i16, get_i16);
impl_primitive_record!(u32, 4, put_u32, get_u32);
impl_primitive_record!(i32, 4, put_i32, get_i32);
