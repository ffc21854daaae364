//! Mass Storage errors

use crate::transport::wrapper::{Cbw, CbwError};

/// Mass Storage protocol error
///
/// `E` is the error type of the underlying [BlockDevice].
///
/// Every variant but [QueueFull] terminates the current command. The core has already
/// queued a failed `CSW` carrying the full residue by the time the error is returned,
/// the caller only needs to log it.
///
/// [BlockDevice]: crate::block::BlockDevice
/// [QueueFull]: Error::QueueFull
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Invalid CBW size, signature or Command Block length
    MalformedCommand(CbwError),
    /// LUN is not present in the registry
    InvalidLun(u8),
    /// Unknown operation code, service action or page
    UnsupportedCommand { opcode: u8, cbw: Cbw },
    /// CBW transfer length doesn't match the response size or `block_size * blocks`
    TransferLengthMismatch { expected: u64, requested: u32 },
    /// Write payload delivery exceeds the bytes still expected
    ShortOrLongWrite { expected: usize, received: usize },
    /// Logical unit reports zero blocks
    EmptyMedium,
    /// Block range lies past the end of the logical unit
    LbaOutOfRange { lba: u32, blocks: u16 },
    /// Block device read, write or flush failure
    StorageIo(E),
    /// Response queue can't take a full command reply. The delivery was not consumed
    QueueFull,
    /// No logical units registered. Get Max LUN is unsupported
    NoLogicalUnits,
    /// More logical units than Bulk Only Transport can address
    TooManyLogicalUnits,
    /// Block size is zero or doesn't fit the write staging buffer
    UnsupportedBlockSize(u32),
}

impl<E> From<CbwError> for Error<E> {
    fn from(value: CbwError) -> Self {
        Error::MalformedCommand(value)
    }
}
