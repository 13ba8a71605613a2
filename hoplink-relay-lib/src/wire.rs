//! Little-endian cursors over byte slices.
//!
//! Every read validates the remaining length up front: packet data comes from
//! the network and may be malicious, so an overrun is a recoverable decode
//! error in release builds (and a debug assertion while developing).

use crate::error::{RelayError, Result};

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, count: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(RelayError::ReadOverrun(what));
        }
        let out = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2, "u16")?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4, "u32")?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8, "u64")?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.take(count, "bytes")
    }

    /// Length-prefixed string: u32 length followed by that many bytes.
    pub fn read_string(&mut self, max_length: usize) -> Result<String> {
        let length = self.read_u32()? as usize;
        if length > max_length {
            return Err(RelayError::ReadOverrun("string"));
        }
        let bytes = self.take(length, "string")?;
        String::from_utf8(bytes.to_vec()).map_err(|_| RelayError::ReadOverrun("string"))
    }
}

pub struct WireWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn put(&mut self, bytes: &[u8], what: &'static str) -> Result<()> {
        debug_assert!(self.remaining() >= bytes.len(), "wire write overrun: {what}");
        if self.remaining() < bytes.len() {
            return Err(RelayError::WriteOverrun(what));
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.put(&[value], "u8")
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.put(&value.to_le_bytes(), "u16")
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.put(&value.to_le_bytes(), "u32")
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.put(&value.to_le_bytes(), "u64")
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_u32(value.to_bits())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_u64(value.to_bits())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put(bytes, "bytes")
    }

    /// Length-prefixed string: u32 length followed by the bytes.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_u32(value.len() as u32)?;
        self.put(value.as_bytes(), "string")
    }
}
