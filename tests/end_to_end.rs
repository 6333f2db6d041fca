//! End-to-end scenarios from the design's testable-properties section,
//! exercised through the public pipeline API rather than the CLI binary.

use std::sync::Arc;

use nfanon::anonymizer::{Anonymizer, CryptoPan};
use nfanon::archive::{ArchiveReader, ArchiveWriter, Compression, Identity, StatRecord};
use nfanon::block::{DataBlock, DataBlockType};
use nfanon::pipeline::{self, RunConfig};
use tempfile::tempdir;

/// Offset, within any V3 record, of the `ANON` flag byte (see
/// `record::v3`'s `FLAGS_OFFSET`).
const ANON_FLAG_OFFSET: usize = 8;
/// Offset, within any V3 record, of the first extension.
const V3_HEADER_LEN: usize = 12;

fn v3_header(size: u16, num_elements: u16) -> Vec<u8> {
    let mut h = Vec::with_capacity(V3_HEADER_LEN);
    h.extend_from_slice(&10u16.to_le_bytes()); // record type: V3
    h.extend_from_slice(&size.to_le_bytes());
    h.extend_from_slice(&num_elements.to_le_bytes());
    h.push(0); // engineType
    h.push(0); // engineId
    h.extend_from_slice(&0u16.to_le_bytes()); // exporterId / flags byte
    h.push(0); // flags
    h.push(0); // nfVersion
    h
}

fn ext_header(tag: u16, payload_len: u16) -> Vec<u8> {
    let mut h = Vec::with_capacity(4);
    h.extend_from_slice(&tag.to_le_bytes());
    h.extend_from_slice(&(payload_len + 4).to_le_bytes());
    h
}

fn ipv4_record(src: u32, dst: u32) -> Vec<u8> {
    let total = (V3_HEADER_LEN + 4 + 8) as u16;
    let mut r = v3_header(total, 1);
    r.extend(ext_header(0x2, 8));
    r.extend_from_slice(&src.to_le_bytes());
    r.extend_from_slice(&dst.to_le_bytes());
    r
}

fn ipv6_record(src: [u64; 2], dst: [u64; 2]) -> Vec<u8> {
    let total = (V3_HEADER_LEN + 4 + 32) as u16;
    let mut r = v3_header(total, 1);
    r.extend(ext_header(0x3, 32));
    r.extend_from_slice(&src[0].to_le_bytes());
    r.extend_from_slice(&src[1].to_le_bytes());
    r.extend_from_slice(&dst[0].to_le_bytes());
    r.extend_from_slice(&dst[1].to_le_bytes());
    r
}

fn as_routing_record(src_as: u32, dst_as: u32) -> Vec<u8> {
    let total = (V3_HEADER_LEN + 4 + 8) as u16;
    let mut r = v3_header(total, 1);
    r.extend(ext_header(0x7, 8));
    r.extend_from_slice(&src_as.to_le_bytes());
    r.extend_from_slice(&dst_as.to_le_bytes());
    r
}

fn write_archive(path: &std::path::Path, identity: &str, stat: StatRecord, blocks: &[DataBlock]) {
    let identity = Identity::new(identity);
    let mut writer = ArchiveWriter::create(path, &identity, &stat, Compression::None, "nfanon").unwrap();
    for block in blocks {
        writer
            .write_block(&DataBlock {
                block_type: block.block_type,
                num_records: block.num_records,
                bytes: block.bytes.clone(),
            })
            .unwrap();
    }
    writer.finalize().unwrap();
}

fn run_config(anonymizer: Arc<dyn Anonymizer>, input: &std::path::Path, output: &std::path::Path) -> RunConfig {
    RunConfig {
        anonymizer,
        input: input.to_path_buf(),
        output: Some(output.to_path_buf()),
        num_workers: 4,
        quiet: true,
    }
}

/// S1 — single IPv4 flow, single worker.
#[test]
fn s1_single_ipv4_flow_single_worker() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("s1-in.nfa");
    let output = dir.path().join("s1-out.nfa");

    let src = 0x0A00_0001u32;
    let dst = 0x0A00_0002u32;
    let record = ipv4_record(src, dst);
    write_archive(
        &input,
        "s1",
        StatRecord::zeroed(),
        &[DataBlock {
            block_type: DataBlockType::Type2,
            num_records: 1,
            bytes: record,
        }],
    );

    let anonymizer: Arc<dyn Anonymizer> = Arc::new(CryptoPan::from_key_str("s1-key").unwrap());
    let mut config = run_config(Arc::clone(&anonymizer), &input, &output);
    config.num_workers = 1;
    pipeline::run(config).unwrap();

    let mut reader = ArchiveReader::open(&output).unwrap();
    let block = reader.read_block().unwrap().unwrap();
    assert_eq!(block.bytes.len(), V3_HEADER_LEN + 4 + 8);
    let payload = V3_HEADER_LEN + 4;
    let got_src = u32::from_le_bytes(block.bytes[payload..payload + 4].try_into().unwrap());
    let got_dst = u32::from_le_bytes(block.bytes[payload + 4..payload + 8].try_into().unwrap());
    assert_eq!(got_src, anonymizer.anon4(src));
    assert_eq!(got_dst, anonymizer.anon4(dst));
    assert_eq!(block.bytes[ANON_FLAG_OFFSET] & 0b1, 1, "ANON flag must be set");
}

/// S2 — mixed IPv4/IPv6/AS records, four workers.
#[test]
fn s2_mixed_records_four_workers() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("s2-in.nfa");
    let output = dir.path().join("s2-out.nfa");

    let mut bytes = Vec::new();
    let mut record_offsets = Vec::new();
    for i in 0..12u32 {
        record_offsets.push(bytes.len());
        match i % 3 {
            0 => bytes.extend(ipv4_record(0x0A00_0000 + i, 0x0B00_0000 + i)),
            1 => bytes.extend(ipv6_record(
                [0x2001_0db8_0000_0000, i as u64],
                [0x2001_0db8_0000_0001, i as u64],
            )),
            _ => bytes.extend(as_routing_record(100 + i, 200 + i)),
        }
    }

    write_archive(
        &input,
        "s2",
        StatRecord::zeroed(),
        &[DataBlock {
            block_type: DataBlockType::Type2,
            num_records: 12,
            bytes,
        }],
    );

    let anonymizer: Arc<dyn Anonymizer> = Arc::new(CryptoPan::from_key_str("s2-key").unwrap());
    let config = run_config(anonymizer, &input, &output);
    pipeline::run(config).unwrap();

    let mut reader = ArchiveReader::open(&output).unwrap();
    let block = reader.read_block().unwrap().unwrap();
    for (i, &offset) in record_offsets.iter().enumerate() {
        assert_eq!(
            block.bytes[offset + ANON_FLAG_OFFSET] & 0b1,
            1,
            "record {i} ANON flag must be set"
        );
        if i % 3 == 2 {
            let payload = offset + V3_HEADER_LEN + 4;
            let src_as = u32::from_le_bytes(block.bytes[payload..payload + 4].try_into().unwrap());
            let dst_as = u32::from_le_bytes(block.bytes[payload + 4..payload + 8].try_into().unwrap());
            assert_eq!(src_as, 0);
            assert_eq!(dst_as, 0);
        }
    }
}

/// S3 — a pass-through block (unrecognized type) is written unchanged.
#[test]
fn s3_passthrough_block() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("s3-in.nfa");
    let output = dir.path().join("s3-out.nfa");

    let original = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
    write_archive(
        &input,
        "s3",
        StatRecord::zeroed(),
        &[DataBlock {
            block_type: DataBlockType::Type1,
            num_records: 0,
            bytes: original.clone(),
        }],
    );

    let anonymizer: Arc<dyn Anonymizer> = Arc::new(CryptoPan::from_key_str("s3-key").unwrap());
    let config = run_config(anonymizer, &input, &output);
    pipeline::run(config).unwrap();

    let mut reader = ArchiveReader::open(&output).unwrap();
    let block = reader.read_block().unwrap().unwrap();
    assert_eq!(block.bytes, original);
}

/// S4 — two-file in-place run: both files end up anonymized at their
/// original paths, no `*-tmp` files remain.
#[test]
fn s4_two_file_in_place_run() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.nfa");
    let b = dir.path().join("b.nfa");

    for (path, label) in [(&a, "a"), (&b, "b")] {
        write_archive(
            path,
            label,
            StatRecord::zeroed(),
            &[DataBlock {
                block_type: DataBlockType::Type2,
                num_records: 1,
                bytes: ipv4_record(0x0A00_0001, 0x0A00_0002),
            }],
        );
    }

    let anonymizer: Arc<dyn Anonymizer> = Arc::new(CryptoPan::from_key_str("s4-key").unwrap());
    let config = RunConfig {
        anonymizer,
        input: dir.path().to_path_buf(),
        output: None,
        num_workers: 2,
        quiet: true,
    };
    pipeline::run(config).unwrap();

    assert!(a.exists());
    assert!(b.exists());
    assert!(!dir.path().join("a.nfa-tmp").exists());
    assert!(!dir.path().join("b.nfa-tmp").exists());

    let mut reader = ArchiveReader::open(&a).unwrap();
    assert_eq!(reader.identity().as_str(), "a");
    let block = reader.read_block().unwrap().unwrap();
    assert_eq!(block.bytes[ANON_FLAG_OFFSET] & 0b1, 1);
}

/// S5 — an unknown extension tag between two known ones is tolerated and
/// its bytes preserved verbatim.
#[test]
fn s5_unknown_extension_preserved() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("s5-in.nfa");
    let output = dir.path().join("s5-out.nfa");

    let total = (V3_HEADER_LEN + (4 + 8) * 3) as u16;
    let mut bytes = v3_header(total, 3);
    bytes.extend(ext_header(0x2, 8));
    bytes.extend_from_slice(&0x0A00_0001u32.to_le_bytes());
    bytes.extend_from_slice(&0x0A00_0002u32.to_le_bytes());
    let unknown_payload = [0xAAu8, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x11, 0x22];
    bytes.extend(ext_header(0x9999, 8));
    bytes.extend_from_slice(&unknown_payload);
    bytes.extend(ext_header(0x2, 8));
    bytes.extend_from_slice(&0x0B00_0001u32.to_le_bytes());
    bytes.extend_from_slice(&0x0B00_0002u32.to_le_bytes());

    write_archive(
        &input,
        "s5",
        StatRecord::zeroed(),
        &[DataBlock {
            block_type: DataBlockType::Type2,
            num_records: 1,
            bytes,
        }],
    );

    let anonymizer: Arc<dyn Anonymizer> = Arc::new(CryptoPan::from_key_str("s5-key").unwrap());
    let config = run_config(anonymizer, &input, &output);
    pipeline::run(config).unwrap();

    let mut reader = ArchiveReader::open(&output).unwrap();
    let block = reader.read_block().unwrap().unwrap();
    let unknown_start = V3_HEADER_LEN + (4 + 8) + 4;
    assert_eq!(&block.bytes[unknown_start..unknown_start + 8], &unknown_payload);
}

/// S6 — a record declaring a size past the block end is fatal corruption;
/// no output is finalized and the original input survives untouched.
#[test]
fn s6_corruption_detection() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("s6.nfa");

    let mut bad = vec![0u8; 8];
    bad[0..2].copy_from_slice(&10u16.to_le_bytes());
    bad[2..4].copy_from_slice(&255u16.to_le_bytes());

    write_archive(
        &input,
        "s6",
        StatRecord::zeroed(),
        &[DataBlock {
            block_type: DataBlockType::Type2,
            num_records: 1,
            bytes: bad,
        }],
    );

    let anonymizer: Arc<dyn Anonymizer> = Arc::new(CryptoPan::from_key_str("s6-key").unwrap());
    let config = RunConfig {
        anonymizer,
        input: input.clone(),
        output: None,
        num_workers: 2,
        quiet: true,
    };
    assert!(pipeline::run(config).is_err());
    assert!(input.exists(), "original input must survive a corruption abort");
}

/// Determinism (§8 property 6): running the pipeline twice with the same
/// key over the same input yields byte-identical output.
#[test]
fn determinism_across_runs() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("det-in.nfa");
    let out_a = dir.path().join("det-out-a.nfa");
    let out_b = dir.path().join("det-out-b.nfa");

    write_archive(
        &input,
        "det",
        StatRecord::zeroed(),
        &[DataBlock {
            block_type: DataBlockType::Type2,
            num_records: 1,
            bytes: ipv4_record(0x0A00_0001, 0x0A00_0002),
        }],
    );

    for output in [&out_a, &out_b] {
        let anonymizer: Arc<dyn Anonymizer> = Arc::new(CryptoPan::from_key_str("det-key").unwrap());
        let config = run_config(anonymizer, &input, output);
        pipeline::run(config).unwrap();
    }

    assert_eq!(std::fs::read(&out_a).unwrap(), std::fs::read(&out_b).unwrap());
}
