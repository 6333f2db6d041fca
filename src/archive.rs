//! The on-disk archive format: a fixed file header (identity + statistics)
//! followed by a sequence of length-prefixed [`DataBlock`]s, optionally
//! deflate-compressed.
//!
//! This is the concrete implementation of the file-interface contract the
//! core pipeline is written against: [`ArchiveReader`]/[`ArchiveWriter`]
//! never appear in `worker.rs` or `partition.rs`, only in [`crate::pipeline`].

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use flate2::Compression as DeflateLevel;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::block::{BLOCK_HEADER_LEN, DataBlock, DataBlockType};

const MAGIC: [u8; 4] = *b"NFA1";
const FORMAT_VERSION: u16 = 1;
const IDENTITY_LEN: usize = 128;
const STAT_RECORD_LEN: usize = 48;

/// Which compression mode an archive file was written with. Propagated
/// verbatim from input to output (§8 property 10, compression metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Deflate,
}

impl Compression {
    fn tag(self) -> u16 {
        match self {
            Compression::None => 0,
            Compression::Deflate => 1,
        }
    }

    fn from_tag(tag: u16) -> io::Result<Self> {
        match tag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Deflate),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unrecognized compression tag {other}"),
            )),
        }
    }
}

/// Aggregate counters copied byte-exact from input to output. The pipeline
/// never inspects the individual fields; it only round-trips the 48 raw
/// bytes, so the precise layout here only needs to be internally
/// consistent.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StatRecord(pub [u8; STAT_RECORD_LEN]);

impl StatRecord {
    pub fn zeroed() -> Self {
        Self([0u8; STAT_RECORD_LEN])
    }
}

/// An archive's identity string: an operator-chosen free-text label,
/// bounded to [`IDENTITY_LEN`] bytes on disk and stored UTF-8, lossily
/// truncated at construction rather than at write time so callers see the
/// same string they will get back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(String);

impl Identity {
    pub fn new(raw: impl Into<String>) -> Self {
        let mut s = raw.into();
        if s.len() > IDENTITY_LEN {
            s.truncate(IDENTITY_LEN);
        }
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn write_into(&self, buf: &mut [u8; IDENTITY_LEN]) {
        buf.fill(0);
        let bytes = self.0.as_bytes();
        let n = bytes.len().min(IDENTITY_LEN);
        buf[..n].copy_from_slice(&bytes[..n]);
    }

    fn read_from(buf: &[u8; IDENTITY_LEN]) -> Self {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(IDENTITY_LEN);
        Self(String::from_utf8_lossy(&buf[..end]).into_owned())
    }
}

/// Reads one archive file: the fixed header, then a stream of blocks via
/// repeated [`ArchiveReader::read_block`].
pub struct ArchiveReader {
    reader: BufReader<File>,
    identity: Identity,
    stat_record: StatRecord,
    compression: Compression,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: not an nfanon archive", path.display()),
            ));
        }

        let mut u16_buf = [0u8; 2];
        reader.read_exact(&mut u16_buf)?;
        let _version = LittleEndian::read_u16(&u16_buf);
        reader.read_exact(&mut u16_buf)?;
        let compression = Compression::from_tag(LittleEndian::read_u16(&u16_buf))?;

        let mut stat_bytes = [0u8; STAT_RECORD_LEN];
        reader.read_exact(&mut stat_bytes)?;

        let mut identity_bytes = [0u8; IDENTITY_LEN];
        reader.read_exact(&mut identity_bytes)?;

        Ok(Self {
            reader,
            identity: Identity::read_from(&identity_bytes),
            stat_record: StatRecord(stat_bytes),
            compression,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn stat_record(&self) -> &StatRecord {
        &self.stat_record
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Reads one framed block. Returns `Ok(None)` at a clean end of file
    /// (nothing left to read before the next block's header).
    pub fn read_block(&mut self) -> io::Result<Option<DataBlock>> {
        let mut header = [0u8; BLOCK_HEADER_LEN];
        match self.reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }

        let (block_type, num_records, on_disk_len) =
            DataBlock::read_header(&header).expect("header buffer is exactly BLOCK_HEADER_LEN");

        let mut stored = vec![0u8; on_disk_len as usize];
        self.reader.read_exact(&mut stored)?;

        let bytes = match self.compression {
            Compression::None => stored,
            Compression::Deflate => {
                let mut decoder = DeflateDecoder::new(&stored[..]);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out)?;
                out
            }
        };

        Ok(Some(DataBlock {
            block_type,
            num_records,
            bytes,
        }))
    }
}

/// Writes one archive file: the fixed header up front, then a stream of
/// blocks via repeated [`ArchiveWriter::write_block`].
pub struct ArchiveWriter {
    writer: BufWriter<File>,
    compression: Compression,
    path: PathBuf,
}

impl ArchiveWriter {
    /// Opens `path` for writing and immediately emits the file header.
    /// `creator` is not persisted on disk in this format (there is no
    /// creator-tag field distinct from identity) but is accepted to match
    /// the file-interface contract's `openOutput(..., creator, ...)`
    /// signature; callers pass `"nfanon"` per §6.
    pub fn create(
        path: &Path,
        identity: &Identity,
        stat_record: &StatRecord,
        compression: Compression,
        _creator: &str,
    ) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&MAGIC)?;
        let mut u16_buf = [0u8; 2];
        LittleEndian::write_u16(&mut u16_buf, FORMAT_VERSION);
        writer.write_all(&u16_buf)?;
        LittleEndian::write_u16(&mut u16_buf, compression.tag());
        writer.write_all(&u16_buf)?;
        writer.write_all(&stat_record.0)?;

        let mut identity_buf = [0u8; IDENTITY_LEN];
        identity.write_into(&mut identity_buf);
        writer.write_all(&identity_buf)?;

        Ok(Self {
            writer,
            compression,
            path: path.to_path_buf(),
        })
    }

    /// Non-flow-record blocks use `DataBlockType::Type1`/`Other`; those and
    /// anonymized `Type2`/`Type3` blocks all go through the same framing.
    pub fn write_block(&mut self, block: &DataBlock) -> io::Result<()> {
        let stored = match self.compression {
            Compression::None => block.bytes.clone(),
            Compression::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), DeflateLevel::default());
                encoder.write_all(&block.bytes)?;
                encoder.finish()?
            }
        };

        let mut header = block.write_header();
        LittleEndian::write_u32(&mut header[8..12], stored.len() as u32);
        self.writer.write_all(&header)?;
        self.writer.write_all(&stored)?;
        Ok(())
    }

    /// Flushes and closes the underlying file. On failure the caller should
    /// treat this as a per-file error (§7): the current file is abandoned
    /// and the in-place rename, if any, must not run.
    pub fn finalize(mut self) -> io::Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Atomically replaces `dst` with `src`. `std::fs::rename` is atomic for a
/// same-filesystem rename on both POSIX and Windows, which this tool's
/// in-place mode depends on (§9 design note).
pub fn rename(src: &Path, dst: &Path) -> io::Result<()> {
    fs::rename(src, dst)
}

/// Implements the enumeration half of `openNext`: `path` is either a single
/// file, or a directory whose direct (non-recursive) regular-file children
/// are all treated as inputs, sorted for determinism.
pub fn discover_inputs(path: &Path) -> io::Result<Vec<PathBuf>> {
    let metadata = fs::metadata(path)?;
    if metadata.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            entries.push(entry.path());
        }
    }
    entries.sort();
    Ok(entries)
}
