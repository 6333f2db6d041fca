//! Bounds-checked view over one mutable record or block buffer.
//!
//! This is the "pointer arithmetic over a typed stream" abstraction called
//! for in the design notes: every read and every write is checked against
//! the slice length before touching memory, and nothing outside the slice
//! passed to [`Cursor::new`] is ever reachable through it.

use byteorder::{ByteOrder, LittleEndian};

/// A checked view over a byte buffer. All multi-byte fields in this format
/// are little-endian.
pub struct Cursor<'a> {
    buf: &'a mut [u8],
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn read_u8(&self, at: usize) -> Option<u8> {
        self.buf.get(at).copied()
    }

    pub fn read_u16(&self, at: usize) -> Option<u16> {
        self.buf.get(at..at + 2).map(LittleEndian::read_u16)
    }

    pub fn read_u32(&self, at: usize) -> Option<u32> {
        self.buf.get(at..at + 4).map(LittleEndian::read_u32)
    }

    pub fn read_u64(&self, at: usize) -> Option<u64> {
        self.buf.get(at..at + 8).map(LittleEndian::read_u64)
    }

    pub fn write_u16(&mut self, at: usize, value: u16) -> bool {
        match self.buf.get_mut(at..at + 2) {
            Some(slice) => {
                LittleEndian::write_u16(slice, value);
                true
            }
            None => false,
        }
    }

    pub fn write_u32(&mut self, at: usize, value: u32) -> bool {
        match self.buf.get_mut(at..at + 4) {
            Some(slice) => {
                LittleEndian::write_u32(slice, value);
                true
            }
            None => false,
        }
    }

    pub fn write_u64(&mut self, at: usize, value: u64) -> bool {
        match self.buf.get_mut(at..at + 8) {
            Some(slice) => {
                LittleEndian::write_u64(slice, value);
                true
            }
            None => false,
        }
    }

    pub fn or_u8(&mut self, at: usize, mask: u8) -> bool {
        match self.buf.get_mut(at) {
            Some(byte) => {
                *byte |= mask;
                true
            }
            None => false,
        }
    }
}
