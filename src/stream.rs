//! Little-endian byte stream primitives.
//!
//! [`ByteWriter`] and [`ByteReader`] are the only code that touches raw
//! bytes; everything above them works in terms of tags, ids, and
//! length-prefixed strings. All integers are little-endian and strings are
//! `u32` length + UTF-8 bytes. Reading past the end of the buffer is a
//! fatal [`DeserializeError::UnexpectedEof`].

use crate::error::DeserializeError;

/// Reference tag: a null value.
pub const TAG_NULL: u8 = 0;
/// Reference tag: the same logical object as an already assigned id.
pub const TAG_BACKREF: u8 = 1;
/// Reference tag: an id in the caller-managed registration table.
pub const TAG_REGISTERED: u8 = 2;
/// Reference tag: a new definition; the id is assigned before the payload
/// is written so cyclic payloads can back-reference it mid-walk.
pub const TAG_NEW: u8 = 8;

/// Growable little-endian byte sink.
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i128(&mut self, v: i128) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_string(&mut self, v: &str) {
        self.write_u32(v.len() as u32);
        self.buf.extend_from_slice(v.as_bytes());
    }
}

/// Bounds-checked little-endian byte source over a borrowed buffer.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! read_fixed {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty, DeserializeError> {
            const N: usize = std::mem::size_of::<$ty>();
            let bytes = self.take(N)?;
            let mut arr = [0u8; N];
            arr.copy_from_slice(bytes);
            Ok(<$ty>::from_le_bytes(arr))
        }
    };
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DeserializeError> {
        if self.remaining() < n {
            return Err(DeserializeError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DeserializeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, DeserializeError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DeserializeError::Corrupt(format!(
                "invalid boolean byte {other:#04x}"
            ))),
        }
    }

    read_fixed!(read_u16, u16);
    read_fixed!(read_u32, u32);
    read_fixed!(read_u64, u64);
    read_fixed!(read_i8, i8);
    read_fixed!(read_i16, i16);
    read_fixed!(read_i32, i32);
    read_fixed!(read_i64, i64);
    read_fixed!(read_i128, i128);
    read_fixed!(read_f32, f32);
    read_fixed!(read_f64, f64);

    /// Length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, DeserializeError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DeserializeError::InvalidString)
    }
}
