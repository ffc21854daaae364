//! WRITE payload reassembly
//!
//! A WRITE(10) payload may arrive in one OUT delivery or be fragmented into many (down to
//! single USB packets). Whole blocks are written as soon as they are available, a trailing
//! partial block is staged until the rest of it arrives.

use crate::block::{BlockDevice, MAX_BLOCK_SIZE};
use crate::error::Error;
use crate::fmt::trace;
use crate::subclass::scsi::WriteRequest;
use crate::transport::wrapper::Csw;
use core::cmp::min;

/// The single in-flight WRITE command
pub(crate) struct PendingWrite {
    request: WriteRequest,
    /// Next block to write. Wraps to 0 past the last addressable block, once nothing is left
    lba: u32,
    received: usize,
    /// Deferred status, sent once the whole payload is written
    csw: Csw,
    staging: heapless::Vec<u8, MAX_BLOCK_SIZE>,
}

impl PendingWrite {
    pub fn new(request: WriteRequest, csw: Csw) -> Self {
        PendingWrite {
            request,
            lba: request.lba,
            received: 0,
            csw,
            staging: heapless::Vec::new(),
        }
    }

    pub fn lun(&self) -> u8 {
        self.request.lun
    }

    pub fn csw(&self) -> Csw {
        self.csw
    }

    /// The CBW transfer length of the WRITE
    pub fn transfer_len(&self) -> u32 {
        self.request.size as u32
    }

    /// Bytes still expected from the host
    pub fn remaining(&self) -> usize {
        self.request.size - self.received
    }

    /// Consumes a payload delivery, returning the bytes still expected or `None` once the
    /// whole payload has been written.
    ///
    /// # Errors
    /// * [Error::ShortOrLongWrite] - the delivery exceeds the remaining bytes. Nothing of it
    ///   is written
    /// * [Error::StorageIo]
    pub fn feed<D: BlockDevice>(
        &mut self,
        device: &mut D,
        mut bytes: &[u8],
    ) -> Result<Option<usize>, Error<D::Error>> {
        let remaining = self.remaining();
        if bytes.len() > remaining {
            return Err(Error::ShortOrLongWrite {
                expected: remaining,
                received: bytes.len(),
            });
        }
        self.received += bytes.len();

        let block_size = self.request.block_size as usize;
        while !bytes.is_empty() {
            if self.staging.is_empty() && bytes.len() >= block_size {
                let whole = bytes.len() - bytes.len() % block_size;
                self.commit(device, &bytes[..whole])?;
                bytes = &bytes[whole..];
            } else {
                let count = min(block_size - self.staging.len(), bytes.len());
                // staging never grows past block_size <= MAX_BLOCK_SIZE
                let _ = self.staging.extend_from_slice(&bytes[..count]);
                bytes = &bytes[count..];

                if self.staging.len() == block_size {
                    trace!("ums: write: LBA {} from staging", self.lba);
                    device
                        .write_blocks(self.lba, &self.staging)
                        .map_err(Error::StorageIo)?;
                    self.lba = self.lba.wrapping_add(1);
                    self.staging.clear();
                }
            }
        }

        Ok(match self.remaining() {
            0 => None,
            remaining => Some(remaining),
        })
    }

    fn commit<D: BlockDevice>(
        &mut self,
        device: &mut D,
        blocks: &[u8],
    ) -> Result<(), Error<D::Error>> {
        let count = (blocks.len() / self.request.block_size as usize) as u32;
        trace!("ums: write: LBA {} + {}", self.lba, count);
        device
            .write_blocks(self.lba, blocks)
            .map_err(Error::StorageIo)?;
        self.lba = self.lba.wrapping_add(count);
        Ok(())
    }
}
