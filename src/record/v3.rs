//! The anonymizable V3 flow record: header plus a variable list of
//! tag-length-value extensions, some of which carry addresses or AS
//! numbers.

use super::cursor::Cursor;
use super::header::RECORD_HEADER_LEN;
use crate::anonymizer::Anonymizer;

/// `numElements:u16, engineType:u8, engineId:u8, exporterId:u16, flags:u8, nfVersion:u8`
const V3_FIXED_HEADER_LEN: usize = 8;
/// Offset, within the record, of the flags byte.
const FLAGS_OFFSET: usize = RECORD_HEADER_LEN + 4;
/// Offset, within the record, of `numElements`.
const NUM_ELEMENTS_OFFSET: usize = RECORD_HEADER_LEN;
/// Total length of the V3 header (common header + V3-specific fields).
pub const V3_HEADER_LEN: usize = RECORD_HEADER_LEN + V3_FIXED_HEADER_LEN;

/// Set once a record has been successfully walked by the anonymizer.
const ANON_FLAG: u8 = 0b0000_0001;

/// Extension tags recognized by this implementation. Unlisted tags are
/// tolerated and skipped using only their declared length.
mod ext {
    pub const IPV4_FLOW: u16 = 0x2;
    pub const IPV6_FLOW: u16 = 0x3;
    pub const AS_ROUTING: u16 = 0x7;
    pub const BGP_NEXT_HOP_V4: u16 = 0x8;
    pub const BGP_NEXT_HOP_V6: u16 = 0x9;
    pub const IP_NEXT_HOP_V4: u16 = 0xa;
    pub const IP_NEXT_HOP_V6: u16 = 0xb;
    pub const IP_RECEIVED_V4: u16 = 0xc;
    pub const IP_RECEIVED_V6: u16 = 0xd;
    pub const NSEL_XLATE_IPV4: u16 = 0x14;
    pub const NSEL_XLATE_IPV6: u16 = 0x15;
    pub const AS_ADJACENT: u16 = 0x1e;
}

/// Walks every extension in one V3 record, anonymizing address-bearing
/// fields in place and setting the `ANON` flag.
///
/// `record` is the full record frame (common header included) belonging to
/// exactly one caller. Returns `Err` with a human-readable reason on any
/// bounds violation, which the caller must treat as fatal stream
/// corruption.
pub fn walk(record: &mut [u8], anonymizer: &dyn Anonymizer) -> Result<(), String> {
    let mut cur = Cursor::new(record);
    let end = cur.len();

    if end < V3_HEADER_LEN {
        return Err(format!(
            "V3 record of {end} bytes is smaller than the {V3_HEADER_LEN}-byte header"
        ));
    }

    let num_elements = cur
        .read_u16(NUM_ELEMENTS_OFFSET)
        .expect("bounds already checked");
    cur.or_u8(FLAGS_OFFSET, ANON_FLAG);

    let mut pos = V3_HEADER_LEN;
    for idx in 0..num_elements {
        let Some(ext_type) = cur.read_u16(pos) else {
            return Err(format!("extension {idx} header at {pos} exceeds record end {end}"));
        };
        let Some(ext_len) = cur.read_u16(pos + 2) else {
            return Err(format!("extension {idx} header at {pos} exceeds record end {end}"));
        };
        let ext_len = ext_len as usize;

        if ext_len < RECORD_HEADER_LEN {
            return Err(format!(
                "extension {idx} at {pos} declares length {ext_len} smaller than its own header"
            ));
        }
        let ext_end = pos + ext_len;
        if ext_end > end {
            return Err(format!(
                "extension {idx} at {pos} (length {ext_len}) would end at {ext_end}, past record end {end}"
            ));
        }

        let payload = pos + RECORD_HEADER_LEN;
        dispatch(&mut cur, ext_type, payload, ext_end, anonymizer, idx);

        pos = ext_end;
    }

    Ok(())
}

fn dispatch(
    cur: &mut Cursor,
    tag: u16,
    payload: usize,
    limit: usize,
    anonymizer: &dyn Anonymizer,
    idx: u16,
) {
    match tag {
        ext::IPV4_FLOW => {
            anon4_at(cur, payload, limit, anonymizer, tag, idx);
            anon4_at(cur, payload + 4, limit, anonymizer, tag, idx);
        }
        ext::IPV6_FLOW => {
            anon6_at(cur, payload, limit, anonymizer, tag, idx);
            anon6_at(cur, payload + 16, limit, anonymizer, tag, idx);
        }
        ext::AS_ROUTING | ext::AS_ADJACENT => {
            zero_u32_at(cur, payload, limit, tag, idx);
            zero_u32_at(cur, payload + 4, limit, tag, idx);
        }
        ext::BGP_NEXT_HOP_V4 | ext::IP_NEXT_HOP_V4 | ext::IP_RECEIVED_V4 => {
            anon4_at(cur, payload, limit, anonymizer, tag, idx);
        }
        ext::BGP_NEXT_HOP_V6 | ext::IP_NEXT_HOP_V6 | ext::IP_RECEIVED_V6 => {
            anon6_at(cur, payload, limit, anonymizer, tag, idx);
        }
        ext::NSEL_XLATE_IPV4 => {
            anon4_at(cur, payload, limit, anonymizer, tag, idx);
            anon4_at(cur, payload + 4, limit, anonymizer, tag, idx);
        }
        ext::NSEL_XLATE_IPV6 => {
            anon6_at(cur, payload, limit, anonymizer, tag, idx);
            anon6_at(cur, payload + 16, limit, anonymizer, tag, idx);
        }
        other => {
            log::trace!("unrecognized V3 extension tag {other:#x} at element {idx}, skipping");
        }
    }
}

fn anon4_at(cur: &mut Cursor, at: usize, limit: usize, anonymizer: &dyn Anonymizer, tag: u16, idx: u16) {
    if at + 4 > limit {
        return;
    }
    if let Some(addr) = cur.read_u32(at) {
        let anon = anonymizer.anon4(addr);
        cur.write_u32(at, anon);
        log::trace!("extension {idx} (tag {tag:#x}): anonymized v4 field at offset {at}");
    }
}

fn anon6_at(cur: &mut Cursor, at: usize, limit: usize, anonymizer: &dyn Anonymizer, tag: u16, idx: u16) {
    if at + 16 > limit {
        return;
    }
    if let (Some(hi), Some(lo)) = (cur.read_u64(at), cur.read_u64(at + 8)) {
        let [anon_hi, anon_lo] = anonymizer.anon6([hi, lo]);
        cur.write_u64(at, anon_hi);
        cur.write_u64(at + 8, anon_lo);
        log::trace!("extension {idx} (tag {tag:#x}): anonymized v6 field at offset {at}");
    }
}

fn zero_u32_at(cur: &mut Cursor, at: usize, limit: usize, tag: u16, idx: u16) {
    if at + 4 > limit {
        return;
    }
    cur.write_u32(at, 0);
    log::trace!("extension {idx} (tag {tag:#x}): zeroed AS field at offset {at}");
}

/// Returns whether a record's `ANON` flag is set. Exposed for tests and for
/// the idempotence property (§8.7): re-walking an already-anonymized record
/// must leave the flag set and the record structurally valid.
pub fn is_anonymized(record: &[u8]) -> bool {
    record
        .get(FLAGS_OFFSET)
        .is_some_and(|flags| flags & ANON_FLAG != 0)
}
