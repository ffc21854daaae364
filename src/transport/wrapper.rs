//! Bulk Only Transport wrappers. Refer to USB-MS BBB doc, section 5.

use crate::transport::CommandStatus;

/// `USBC` little endian
pub const CBW_SIGNATURE: u32 = 0x43425355;
/// `USBS` little endian
pub const CSW_SIGNATURE: u32 = 0x53425355;

pub const CBW_LEN: usize = 31;
pub const CSW_LEN: usize = 13;

/// Max Command Block length
pub const CB_MAX_LEN: usize = 16;
const CB_MIN_LEN: u8 = 6;

/// Reason a CBW was rejected
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CbwError {
    /// Frame is not exactly [CBW_LEN] bytes long
    Length(usize),
    /// `dCBWSignature` mismatch
    Signature(u32),
    /// `bCBWCBLength` outside of `6..=16`
    BlockLength(u8),
}

/// Data phase direction derived from the CBW flags and transfer length
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataDirection {
    /// Host to device
    Out,
    /// Device to host
    In,
    #[default]
    NotExpected,
}

/// Command Block Wrapper
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cbw {
    pub tag: u32,
    pub data_transfer_len: u32,
    pub flags: u8,
    pub lun: u8,
    pub block_len: u8,
    /// Zero padded Command Descriptor Block
    pub block: [u8; CB_MAX_LEN],
}

impl Cbw {
    /// Parses a CBW out of a single OUT delivery.
    ///
    /// An empty delivery carries no CBW and yields `Ok(None)`.
    pub fn parse(bytes: &[u8]) -> Result<Option<Cbw>, CbwError> {
        if bytes.is_empty() {
            return Ok(None);
        }
        if bytes.len() != CBW_LEN {
            return Err(CbwError::Length(bytes.len()));
        }

        let signature = le_u32(&bytes[..4]);
        if signature != CBW_SIGNATURE {
            return Err(CbwError::Signature(signature));
        }

        let block_len = bytes[14];
        if !(CB_MIN_LEN..=CB_MAX_LEN as u8).contains(&block_len) {
            return Err(CbwError::BlockLength(block_len));
        }

        let mut block = [0u8; CB_MAX_LEN];
        block.copy_from_slice(&bytes[15..]);

        Ok(Some(Cbw {
            tag: le_u32(&bytes[4..8]),
            data_transfer_len: le_u32(&bytes[8..12]),
            flags: bytes[12],
            lun: bytes[13] & 0b00001111,
            block_len,
            block,
        }))
    }

    /// Returns the tag and the transfer length of a frame that has a CBW size but failed
    /// validation, so that the host still gets a status for it.
    pub fn peek(bytes: &[u8]) -> Option<(u32, u32)> {
        (bytes.len() == CBW_LEN).then(|| (le_u32(&bytes[4..8]), le_u32(&bytes[8..12])))
    }

    pub fn to_bytes(&self) -> [u8; CBW_LEN] {
        let mut bytes = [0u8; CBW_LEN];
        bytes[..4].copy_from_slice(&CBW_SIGNATURE.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.tag.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.data_transfer_len.to_le_bytes());
        bytes[12] = self.flags;
        bytes[13] = self.lun;
        bytes[14] = self.block_len;
        bytes[15..].copy_from_slice(&self.block);
        bytes
    }

    pub fn direction(&self) -> DataDirection {
        if self.data_transfer_len == 0 {
            DataDirection::NotExpected
        } else if self.flags & (1 << 7) != 0 {
            DataDirection::In
        } else {
            DataDirection::Out
        }
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        self.block[0]
    }
}

/// Command Status Wrapper
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Csw {
    pub tag: u32,
    pub residue: u32,
    pub status: CommandStatus,
}

impl Csw {
    pub fn passed(tag: u32) -> Self {
        Csw {
            tag,
            residue: 0,
            status: CommandStatus::Passed,
        }
    }

    pub fn failed(tag: u32, residue: u32) -> Self {
        Csw {
            tag,
            residue,
            status: CommandStatus::Failed,
        }
    }

    pub fn to_bytes(&self) -> [u8; CSW_LEN] {
        let mut csw = [0u8; CSW_LEN];
        csw[..4].copy_from_slice(CSW_SIGNATURE.to_le_bytes().as_slice());
        csw[4..8].copy_from_slice(self.tag.to_le_bytes().as_slice());
        csw[8..12].copy_from_slice(self.residue.to_le_bytes().as_slice());
        csw[12] = self.status as u8;
        csw
    }
}

#[inline]
fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
