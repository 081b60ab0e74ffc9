use crate::error::ExtractError;
use anyhow::Result;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Bounds-checked reader over an in-memory buffer.
///
/// Every primitive read maps a short buffer to `ExtractError::TruncatedInput`
/// with the caller-supplied label, so parse errors name the field that fell
/// off the end instead of a bare EOF.
pub struct Reader<'a> {
    cur: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { cur: Cursor::new(buf) }
    }

    pub fn pos(&self) -> u64 {
        self.cur.position()
    }

    pub fn seek(&mut self, pos: u64) {
        self.cur.set_position(pos);
    }

    pub fn len(&self) -> u64 {
        self.cur.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.cur.get_ref().is_empty()
    }

    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.pos())
    }

    fn short(&self, what: &str) -> anyhow::Error {
        ExtractError::TruncatedInput(format!("{} at offset {}", what, self.pos())).into()
    }

    pub fn u8(&mut self, what: &str) -> Result<u8> {
        self.cur.read_u8().map_err(|_| self.short(what))
    }

    pub fn u16_le(&mut self, what: &str) -> Result<u16> {
        self.cur.read_u16::<LittleEndian>().map_err(|_| self.short(what))
    }

    pub fn u16_be(&mut self, what: &str) -> Result<u16> {
        self.cur.read_u16::<BigEndian>().map_err(|_| self.short(what))
    }

    pub fn u32_le(&mut self, what: &str) -> Result<u32> {
        self.cur.read_u32::<LittleEndian>().map_err(|_| self.short(what))
    }

    pub fn u32_be(&mut self, what: &str) -> Result<u32> {
        self.cur.read_u32::<BigEndian>().map_err(|_| self.short(what))
    }

    pub fn i32_le(&mut self, what: &str) -> Result<i32> {
        self.cur.read_i32::<LittleEndian>().map_err(|_| self.short(what))
    }

    pub fn u64_le(&mut self, what: &str) -> Result<u64> {
        self.cur.read_u64::<LittleEndian>().map_err(|_| self.short(what))
    }

    pub fn i64_le(&mut self, what: &str) -> Result<i64> {
        self.cur.read_i64::<LittleEndian>().map_err(|_| self.short(what))
    }

    pub fn f32_le(&mut self, what: &str) -> Result<f32> {
        self.cur.read_f32::<LittleEndian>().map_err(|_| self.short(what))
    }

    pub fn f64_le(&mut self, what: &str) -> Result<f64> {
        self.cur.read_f64::<LittleEndian>().map_err(|_| self.short(what))
    }

    /// 24-bit big-endian, as used by the ESFM sector descriptors.
    pub fn u24_be(&mut self, what: &str) -> Result<u32> {
        let hi = self.u8(what)? as u32;
        let mid = self.u8(what)? as u32;
        let lo = self.u8(what)? as u32;
        Ok((hi << 16) | (mid << 8) | lo)
    }

    pub fn bytes(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let start = self.pos() as usize;
        let buf = *self.cur.get_ref();
        if start + n > buf.len() {
            return Err(self.short(what));
        }
        self.cur.set_position((start + n) as u64);
        Ok(&buf[start..start + n])
    }

    pub fn array16(&mut self, what: &str) -> Result<[u8; 16]> {
        let mut out = [0u8; 16];
        out.copy_from_slice(self.bytes(16, what)?);
        Ok(out)
    }

    /// UTF-8 string with a u16 LE length prefix. Rejects declared lengths
    /// that exceed the remaining buffer.
    pub fn lp_utf8(&mut self, what: &str) -> Result<String> {
        let n = self.u16_le(what)? as usize;
        let raw = self.bytes(n, what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| ExtractError::CorruptOrWrongKey(format!("{}: invalid UTF-8", what)).into())
    }

    /// UTF-8 string with a u8 length prefix (ESFM convention).
    pub fn lp8_utf8(&mut self, what: &str) -> Result<String> {
        let n = self.u8(what)? as usize;
        let raw = self.bytes(n, what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| ExtractError::CorruptOrWrongKey(format!("{}: invalid UTF-8", what)).into())
    }

    /// Advance to the next multiple of `n` (counted from buffer start).
    pub fn align(&mut self, n: u64) {
        let rem = self.pos() % n;
        if rem != 0 {
            self.cur.set_position(self.pos() + (n - rem));
        }
    }
}
