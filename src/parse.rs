use byteorder::{ByteOrder, LittleEndian};

use crate::error::MalformedReply;

/// Bounds-checked cursor over a reply payload.
///
/// Every read either advances past the bytes it consumed or fails with
/// [`MalformedReply`] and leaves the position untouched.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, offset: 0 }
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread tail of the payload.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    /// Take the next `n` bytes.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], MalformedReply> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(MalformedReply::Truncated {
                offset: self.offset,
                needed: n,
            })?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), MalformedReply> {
        self.bytes(n).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8, MalformedReply> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, MalformedReply> {
        Ok(LittleEndian::read_u16(self.bytes(2)?))
    }

    pub fn i32(&mut self) -> Result<i32, MalformedReply> {
        Ok(LittleEndian::read_i32(self.bytes(4)?))
    }

    pub fn u64(&mut self) -> Result<u64, MalformedReply> {
        Ok(LittleEndian::read_u64(self.bytes(8)?))
    }

    pub fn f32(&mut self) -> Result<f32, MalformedReply> {
        Ok(LittleEndian::read_f32(self.bytes(4)?))
    }

    /// Read a NUL-terminated UTF-8 string, consuming the terminator.
    pub fn cstring(&mut self) -> Result<String, MalformedReply> {
        let start = self.offset;
        let len = self.data[start..]
            .iter()
            .position(|c| *c == 0)
            .ok_or(MalformedReply::Unterminated { offset: start })?;
        let text = std::str::from_utf8(&self.data[start..start + len])?.to_owned();
        self.offset = start + len + 1;
        Ok(text)
    }

    /// Read a byte as an ASCII flag character (`d`, `l`, `w`, ...).
    pub fn ascii(&mut self) -> Result<char, MalformedReply> {
        self.u8().map(char::from)
    }

    pub fn bool(&mut self) -> Result<bool, MalformedReply> {
        self.u8().map(|b| b == 1)
    }
}
