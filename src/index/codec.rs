//! Index Codec
//!
//! Pure encode/decode of header and entry slots. No I/O.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{LogError, Result};

use super::{
    IndexEntry, IndexHeader, TimeSource, CHECKSUM_OFFSET, ENTRY_SIZE, HEADER_SIZE, INDEX_VERSION,
    MAGIC,
};

// =============================================================================
// Header
// =============================================================================

/// Encode a header into a 64-byte slot
pub fn encode_header(header: &IndexHeader) -> [u8; HEADER_SIZE as usize] {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize);
    buf.put_u32_le(header.version);
    buf.put_u32_le(header.file_number);
    buf.put_u64_le(header.global_line_offset);
    buf.put_slice(MAGIC);

    seal_slot(buf)
}

/// Decode a header slot
pub fn decode_header(bytes: &[u8]) -> Result<IndexHeader> {
    let mut body = open_slot(bytes, HEADER_SIZE, "header")?;

    let version = body.get_u32_le();
    let file_number = body.get_u32_le();
    let global_line_offset = body.get_u64_le();

    if &body[..MAGIC.len()] != MAGIC {
        return Err(LogError::CorruptIndex(format!(
            "invalid header magic: expected MLIX, got {:?}",
            &body[..MAGIC.len()]
        )));
    }

    if version != INDEX_VERSION {
        return Err(LogError::CorruptIndex(format!(
            "unsupported index version: {}",
            version
        )));
    }

    Ok(IndexHeader {
        version,
        file_number,
        global_line_offset,
    })
}

// =============================================================================
// Entry
// =============================================================================

/// Encode an entry into a 64-byte slot
pub fn encode_entry(entry: &IndexEntry) -> [u8; ENTRY_SIZE as usize] {
    let mut buf = BytesMut::with_capacity(ENTRY_SIZE as usize);
    buf.put_u32_le(entry.line_number_local);
    buf.put_u64_le(entry.line_number_global);
    buf.put_u64_le(entry.start_byte);
    buf.put_u64_le(entry.end_byte);
    buf.put_i64_le(entry.message_time);
    buf.put_u8(entry.time_source as u8);

    seal_slot(buf)
}

/// Decode an entry slot
pub fn decode_entry(bytes: &[u8]) -> Result<IndexEntry> {
    let mut body = open_slot(bytes, ENTRY_SIZE, "entry")?;

    let line_number_local = body.get_u32_le();
    let line_number_global = body.get_u64_le();
    let start_byte = body.get_u64_le();
    let end_byte = body.get_u64_le();
    let message_time = body.get_i64_le();
    let raw_source = body.get_u8();

    let time_source = TimeSource::from_u8(raw_source).ok_or_else(|| {
        LogError::CorruptIndex(format!("unknown time source tag: {}", raw_source))
    })?;

    if end_byte < start_byte {
        return Err(LogError::CorruptIndex(format!(
            "entry byte range inverted: {}..{}",
            start_byte, end_byte
        )));
    }

    Ok(IndexEntry {
        line_number_local,
        line_number_global,
        start_byte,
        end_byte,
        message_time,
        time_source,
    })
}

// =============================================================================
// Slot framing
// =============================================================================

/// Zero-pad the body to 60 bytes and append its CRC32
fn seal_slot<const N: usize>(mut buf: BytesMut) -> [u8; N] {
    buf.resize(CHECKSUM_OFFSET, 0);
    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);

    let mut slot = [0u8; N];
    slot.copy_from_slice(&buf);
    slot
}

/// Check size and CRC, return the checksummed body
fn open_slot<'a>(bytes: &'a [u8], size: u64, what: &str) -> Result<&'a [u8]> {
    if bytes.len() as u64 != size {
        return Err(LogError::CorruptIndex(format!(
            "{} slot size mismatch: expected {} bytes, got {}",
            what,
            size,
            bytes.len()
        )));
    }

    let (body, mut trailer) = bytes.split_at(CHECKSUM_OFFSET);
    let stored = trailer.get_u32_le();
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(LogError::CorruptIndex(format!(
            "{} checksum mismatch: stored {:#010x}, computed {:#010x}",
            what, stored, computed
        )));
    }

    Ok(body)
}
