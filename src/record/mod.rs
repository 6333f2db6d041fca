//! Record-level parsing and in-place anonymization.

pub mod cursor;
pub mod header;
pub mod v3;

pub use cursor::Cursor;
pub use header::{RecordHeader, RecordType, RECORD_HEADER_LEN};
