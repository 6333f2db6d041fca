//! The common tag-length-value record header shared by every record kind.

use super::cursor::Cursor;

/// `{ type: u16, size: u16 }`, the minimum any record frame must have.
pub const RECORD_HEADER_LEN: usize = 4;

const REC_V3: u16 = 10;
const REC_EXPORTER_INFO: u16 = 2;
const REC_EXPORTER_STAT: u16 = 3;
const REC_SAMPLER: u16 = 4;
const REC_NBAR: u16 = 5;

/// Which record variant a common header's `type` tag names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    V3,
    ExporterInfo,
    ExporterStat,
    Sampler,
    Nbar,
    /// Anything else: passed through with a warning, bytes unmodified.
    Other(u16),
}

impl From<u16> for RecordType {
    fn from(tag: u16) -> Self {
        match tag {
            REC_V3 => RecordType::V3,
            REC_EXPORTER_INFO => RecordType::ExporterInfo,
            REC_EXPORTER_STAT => RecordType::ExporterStat,
            REC_SAMPLER => RecordType::Sampler,
            REC_NBAR => RecordType::Nbar,
            other => RecordType::Other(other),
        }
    }
}

impl RecordType {
    /// Types that are silently skipped by the anonymizer rather than
    /// flagged as unknown.
    pub fn is_recognized_passthrough(self) -> bool {
        matches!(
            self,
            RecordType::ExporterInfo | RecordType::ExporterStat | RecordType::Sampler | RecordType::Nbar
        )
    }
}

/// The common header read at the start of every record frame.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub record_type: RecordType,
    /// Total size of the record, header included.
    pub size: u16,
}

impl RecordHeader {
    /// Reads a record header at `at`. Returns `None` if the buffer does not
    /// have `RECORD_HEADER_LEN` bytes available there.
    pub fn read(cursor: &Cursor, at: usize) -> Option<Self> {
        let raw_type = cursor.read_u16(at)?;
        let size = cursor.read_u16(at + 2)?;
        Some(Self {
            record_type: RecordType::from(raw_type),
            size,
        })
    }
}
