//! Monolithic boot image (DOL) encoder.
//!
//! Layout: a fixed 0x100-byte big-endian header (18 file offsets, 18 load
//! addresses, 18 sizes, bss range, entry point) followed by the segment
//! payloads. The loader copies each segment to its load address, zeroes the
//! bss range, and jumps to the entry point.

use crate::{align_up, put_u32, Error, Result};

/// At most 7 text segments.
pub const MAX_TEXT: usize = 7;
/// At most 11 data segments.
pub const MAX_DATA: usize = 11;

const HEADER_SIZE: u32 = 0x100;
/// Segment payloads are 32-byte aligned in the file.
const SEGMENT_ALIGN: u32 = 0x20;

const OFFSETS_AT: usize = 0x00;
const ADDRS_AT: usize = 0x48;
const SIZES_AT: usize = 0x90;
const BSS_ADDR_AT: usize = 0xD8;
const BSS_SIZE_AT: usize = 0xDC;
const ENTRY_AT: usize = 0xE0;

/// One loadable segment: target address plus file payload.
#[derive(Debug, Clone)]
pub struct DolSegment {
    pub addr: u32,
    pub data: Vec<u8>,
}

/// A boot image ready to be encoded.
#[derive(Debug, Clone, Default)]
pub struct DolImage {
    pub text: Vec<DolSegment>,
    pub data: Vec<DolSegment>,
    pub bss_addr: u32,
    pub bss_size: u32,
    pub entry: u32,
}

impl DolImage {
    /// Encode the image. Deterministic: the same image always produces the
    /// same bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.text.len() > MAX_TEXT {
            return Err(Error::TooManySegments {
                kind: "text",
                count: self.text.len(),
                limit: MAX_TEXT,
            });
        }
        if self.data.len() > MAX_DATA {
            return Err(Error::TooManySegments {
                kind: "data",
                count: self.data.len(),
                limit: MAX_DATA,
            });
        }

        let mut header = vec![0u8; HEADER_SIZE as usize];
        let mut payload = Vec::new();
        let mut cursor = HEADER_SIZE;

        // Text segments fill slots 0..7, data segments slots 7..18, in order.
        let text = self.text.iter().enumerate();
        let data = self.data.iter().enumerate().map(|(i, s)| (MAX_TEXT + i, s));
        for (slot, segment) in text.chain(data) {
            let size = align_up(segment.data.len() as u32, SEGMENT_ALIGN);
            put_u32(&mut header, OFFSETS_AT + slot * 4, cursor);
            put_u32(&mut header, ADDRS_AT + slot * 4, segment.addr);
            put_u32(&mut header, SIZES_AT + slot * 4, size);

            payload.extend_from_slice(&segment.data);
            payload.resize((cursor + size - HEADER_SIZE) as usize, 0);
            cursor += size;
        }

        put_u32(&mut header, BSS_ADDR_AT, self.bss_addr);
        put_u32(&mut header, BSS_SIZE_AT, self.bss_size);
        put_u32(&mut header, ENTRY_AT, self.entry);

        header.extend_from_slice(&payload);
        Ok(header)
    }
}
