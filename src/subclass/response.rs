//! SCSI response payloads

use crate::block::{BlockInfo, MAX_LUNS};
use core::cmp::min;

pub const INQUIRY_LEN: usize = 36;
pub const SENSE_LEN: usize = 18;
pub const MODE_SENSE_6_LEN: usize = 4;
pub const MODE_SENSE_10_LEN: usize = 8;
pub const READ_FORMAT_CAPACITIES_LEN: usize = 12;
pub const READ_CAPACITY_10_LEN: usize = 8;
pub const READ_CAPACITY_16_LEN: usize = 32;

const LUN_LIST_HEADER_LEN: usize = 8;
const LUN_ENTRY_LEN: usize = 8;

/// Largest generated payload: a REPORT LUNS list of every addressable unit
pub const MAX_PAYLOAD_LEN: usize = LUN_LIST_HEADER_LEN + MAX_LUNS * LUN_ENTRY_LEN;

/// Standard INQUIRY identification strings
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Identity {
    vendor: [u8; 8],
    product: [u8; 16],
    revision: [u8; 4],
}

impl Identity {
    /// ASCII strings are truncated or padded with spaces to 8, 16 and 4 bytes
    pub const fn new(vendor: &str, product: &str, revision: &str) -> Self {
        Identity {
            vendor: pad(vendor),
            product: pad(product),
            revision: pad(revision),
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Identity::new("Generic", "Storage Media", "0.1")
    }
}

const fn pad<const N: usize>(s: &str) -> [u8; N] {
    let bytes = s.as_bytes();
    let mut out = [b' '; N];
    let mut i = 0;
    while i < N && i < bytes.len() {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

/// Generated response data
///
/// Holds up to [MAX_PAYLOAD_LEN] meaningful bytes, anything past them up to [len] is
/// sent as zeros. That way a response padded to a large transfer length doesn't need
/// a large buffer.
///
/// [len]: Payload::len
#[derive(Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: [u8; MAX_PAYLOAD_LEN],
    filled: usize,
    len: usize,
}

impl Payload {
    fn new(src: &[u8]) -> Self {
        let filled = min(src.len(), MAX_PAYLOAD_LEN);
        let mut bytes = [0u8; MAX_PAYLOAD_LEN];
        bytes[..filled].copy_from_slice(&src[..filled]);
        Payload {
            bytes,
            filled,
            len: filled,
        }
    }

    /// Zero pads or truncates to exactly `len` bytes
    fn resize(mut self, len: usize) -> Self {
        self.filled = min(self.filled, len);
        self.len = len;
        self
    }

    /// Truncates to at most `len` bytes
    fn truncate(self, len: usize) -> Self {
        let len = min(self.len, len);
        self.resize(len)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies bytes starting at `offset` into `dst` returning the number of bytes copied
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> usize {
        let count = min(self.len.saturating_sub(offset), dst.len());
        let filled = min(self.filled.saturating_sub(offset), count);
        if filled > 0 {
            dst[..filled].copy_from_slice(&self.bytes[offset..offset + filled]);
        }
        dst[filled..count].fill(0);
        count
    }
}

impl core::fmt::Debug for Payload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Payload")
            .field("bytes", &&self.bytes[..self.filled])
            .field("len", &self.len)
            .finish()
    }
}

/// Standard INQUIRY data, zero padded or truncated to `transfer_len`
///
/// SPC-3, 6.4.2
pub fn inquiry(identity: &Identity, transfer_len: usize) -> Payload {
    let mut data = [0u8; INQUIRY_LEN];
    data[0] = 0x00; // device connected, direct access block device
    data[1] = 0x80; // removable medium
    data[2] = 0x05; // SPC-3 compliance
    data[3] = 0x02; // response data format
    data[4] = (INQUIRY_LEN - 5) as u8; // additional length
    data[8..16].copy_from_slice(&identity.vendor);
    data[16..32].copy_from_slice(&identity.product);
    data[32..36].copy_from_slice(&identity.revision);
    Payload::new(&data).resize(transfer_len)
}

/// Fixed format sense data without a sense key
///
/// SPC-3, 4.5.3
pub fn sense() -> Payload {
    let mut data = [0u8; SENSE_LEN];
    data[0] = 0x70; // current errors, fixed format
    data[7] = (SENSE_LEN - 8) as u8; // additional sense length
    Payload::new(&data)
}

/// Mode parameter header without pages or block descriptors.
/// Zero padded or truncated to `len`, the mode data length only counts the header.
///
/// SPC-3, 7.4.3
pub fn mode_sense_6(len: usize) -> Payload {
    let mut data = [0u8; MODE_SENSE_6_LEN];
    data[0] = (MODE_SENSE_6_LEN - 1) as u8; // mode data length
    Payload::new(&data).resize(len)
}

pub fn mode_sense_10(len: usize) -> Payload {
    let mut data = [0u8; MODE_SENSE_10_LEN];
    data[..2].copy_from_slice(&((MODE_SENSE_10_LEN - 2) as u16).to_be_bytes());
    Payload::new(&data).resize(len)
}

/// Capacity list with a single current capacity descriptor
///
/// UFI, 4.10
pub fn read_format_capacities(info: &BlockInfo, alloc_len: usize) -> Payload {
    const FORMATTED_MEDIA: u32 = 0b10;

    let mut data = [0u8; READ_FORMAT_CAPACITIES_LEN];
    data[..4].copy_from_slice(&8u32.to_be_bytes()); // capacity list length
    data[4..8].copy_from_slice(&saturating_u32(info.block_count).to_be_bytes());
    let descriptor = (FORMATTED_MEDIA << 24) | (info.block_size & 0xFFFFFF);
    data[8..12].copy_from_slice(&descriptor.to_be_bytes());
    Payload::new(&data).truncate(alloc_len)
}

/// Returns `None` when the unit has no blocks
///
/// SBC-3, 5.15
pub fn read_capacity_10(info: &BlockInfo) -> Option<Payload> {
    let last_lba = info.block_count.checked_sub(1)?;

    let mut data = [0u8; READ_CAPACITY_10_LEN];
    data[..4].copy_from_slice(&saturating_u32(last_lba).to_be_bytes());
    data[4..].copy_from_slice(&info.block_size.to_be_bytes());
    Some(Payload::new(&data))
}

/// Returns `None` when the unit has no blocks
///
/// SBC-3, 5.16
pub fn read_capacity_16(info: &BlockInfo, alloc_len: usize) -> Option<Payload> {
    let last_lba = info.block_count.checked_sub(1)?;

    let mut data = [0u8; READ_CAPACITY_16_LEN];
    data[..8].copy_from_slice(&last_lba.to_be_bytes());
    data[8..12].copy_from_slice(&info.block_size.to_be_bytes());
    Some(Payload::new(&data).truncate(alloc_len))
}

/// LUN list using the single level, peripheral device addressing
///
/// SPC-3, 6.21 and SAM-3, 4.9.5
pub fn report_luns(luns: usize, alloc_len: usize) -> Payload {
    let luns = min(luns, MAX_LUNS);

    let mut data = [0u8; MAX_PAYLOAD_LEN];
    data[..4].copy_from_slice(&((luns * LUN_ENTRY_LEN) as u32).to_be_bytes());
    for (lun, entry) in data[LUN_LIST_HEADER_LEN..]
        .chunks_exact_mut(LUN_ENTRY_LEN)
        .take(luns)
        .enumerate()
    {
        entry[1] = lun as u8;
    }

    let len = LUN_LIST_HEADER_LEN + luns * LUN_ENTRY_LEN;
    Payload::new(&data[..len]).truncate(alloc_len)
}

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
