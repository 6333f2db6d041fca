//! Data blocks: the unit of I/O and of fan-out to the worker pool.
//!
//! Each block carries a small header (`type`, `NumRecords`, `size`) followed
//! by `size` bytes holding exactly `NumRecords` back-to-back records. `size`
//! never includes the block header itself.

use byteorder::{ByteOrder, LittleEndian};

use crate::record::Cursor;

/// `{ block_type: u16, reserved: u16, num_records: u32, size: u32 }`
pub const BLOCK_HEADER_LEN: usize = 12;

const BLOCK_TYPE_1: u16 = 1;
const BLOCK_TYPE_2: u16 = 2;
const BLOCK_TYPE_3: u16 = 3;

/// Which kind of payload a block's `type` tag names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBlockType {
    /// Legacy flow record layout, passed through untouched.
    Type1,
    /// Current flow record layout: a run of TLV records, some anonymizable.
    Type2,
    /// Extended flow record layout: same record framing as `Type2`.
    Type3,
    Other(u16),
}

impl From<u16> for DataBlockType {
    fn from(tag: u16) -> Self {
        match tag {
            BLOCK_TYPE_1 => DataBlockType::Type1,
            BLOCK_TYPE_2 => DataBlockType::Type2,
            BLOCK_TYPE_3 => DataBlockType::Type3,
            other => DataBlockType::Other(other),
        }
    }
}

impl From<DataBlockType> for u16 {
    fn from(block_type: DataBlockType) -> Self {
        match block_type {
            DataBlockType::Type1 => BLOCK_TYPE_1,
            DataBlockType::Type2 => BLOCK_TYPE_2,
            DataBlockType::Type3 => BLOCK_TYPE_3,
            DataBlockType::Other(tag) => tag,
        }
    }
}

impl DataBlockType {
    /// Blocks whose records are candidates for record-level anonymization.
    pub fn carries_flow_records(self) -> bool {
        matches!(self, DataBlockType::Type2 | DataBlockType::Type3)
    }
}

/// One block read from (or about to be written to) an archive file: its
/// header fields plus the owned bytes of its record area.
pub struct DataBlock {
    pub block_type: DataBlockType,
    pub num_records: u32,
    pub bytes: Vec<u8>,
}

impl DataBlock {
    /// Parses a block header from the first [`BLOCK_HEADER_LEN`] bytes of
    /// `header`. Returns `None` if fewer bytes are available.
    pub fn read_header(header: &[u8]) -> Option<(DataBlockType, u32, u32)> {
        if header.len() < BLOCK_HEADER_LEN {
            return None;
        }
        let block_type = DataBlockType::from(LittleEndian::read_u16(&header[0..2]));
        let num_records = LittleEndian::read_u32(&header[4..8]);
        let size = LittleEndian::read_u32(&header[8..12]);
        Some((block_type, num_records, size))
    }

    /// Serializes this block's header into a fresh [`BLOCK_HEADER_LEN`]-byte
    /// buffer, ready to be written immediately ahead of `self.bytes`.
    pub fn write_header(&self) -> [u8; BLOCK_HEADER_LEN] {
        let mut header = [0u8; BLOCK_HEADER_LEN];
        let mut cursor = Cursor::new(&mut header);
        cursor.write_u16(0, self.block_type.into());
        cursor.write_u32(4, self.num_records);
        cursor.write_u32(8, self.bytes.len() as u32);
        header
    }

    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }
}
