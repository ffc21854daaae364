//! Block devices and the Logical Unit registry

use crate::error::Error;
use crate::fmt::{info, warning};
use core::fmt::Debug;

/// Max number of Logical Units addressable by Bulk Only Transport (`MAX_LUN` is 0x0F)
pub const MAX_LUNS: usize = 16;

/// Largest supported block size. Partially delivered write blocks are staged in a buffer
/// of this size.
pub const MAX_BLOCK_SIZE: usize = 4096;

/// Block device geometry
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockInfo {
    pub block_size: u32,
    pub block_count: u64,
}

impl BlockInfo {
    /// Capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.block_size as u64 * self.block_count
    }
}

/// Block storage exposed as a Logical Unit.
///
/// Implemented by the storage driver. No retries are performed by the mass storage core,
/// a driver wanting them retries internally.
pub trait BlockDevice {
    type Error: Debug;

    /// Owned buffer returned by [read_blocks]. It is handed over to the response queue and
    /// dropped once the transport has sent it, so a driver may hand out DMA regions here.
    ///
    /// [read_blocks]: BlockDevice::read_blocks
    type Buffer: AsRef<[u8]>;

    /// Probes the device. Called once by [LogicalUnits::detect].
    fn detect(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn info(&self) -> BlockInfo;

    /// Reads `count` blocks starting at `lba`. The returned buffer must be exactly
    /// `count * block_size` bytes long.
    fn read_blocks(&mut self, lba: u32, count: u16) -> Result<Self::Buffer, Self::Error>;

    /// Writes `data` starting at `lba`. `data` is always a whole number of blocks.
    fn write_blocks(&mut self, lba: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Commits any internally cached writes. Called on `SYNCHRONIZE CACHE`.
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Logical Unit registry
///
/// Populated once at startup, a unit's index is its LUN.
pub struct LogicalUnits<D: BlockDevice> {
    units: heapless::Vec<D, MAX_LUNS>,
}

impl<D: BlockDevice> Default for LogicalUnits<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: BlockDevice> LogicalUnits<D> {
    pub const fn new() -> Self {
        Self {
            units: heapless::Vec::new(),
        }
    }

    /// Runs detection on every device, registering the ones that respond.
    ///
    /// Undetected or unsupported devices are skipped with a warning, so LUNs are assigned
    /// densely to the devices actually present.
    pub fn detect<I>(devices: I) -> Self
    where
        I: IntoIterator<Item = D>,
    {
        let mut units = Self::new();
        for mut device in devices {
            if device.detect().is_err() {
                warning!("ums: block device not detected, skipping");
                continue;
            }
            if units.push(device).is_err() {
                warning!("ums: block device rejected, skipping");
            }
        }
        units
    }

    /// Registers a device under the next LUN and returns that LUN
    ///
    /// # Errors
    /// * [Error::TooManyLogicalUnits]
    /// * [Error::UnsupportedBlockSize]
    pub fn push(&mut self, device: D) -> Result<u8, Error<D::Error>> {
        let info = device.info();
        if info.block_size == 0 || info.block_size as usize > MAX_BLOCK_SIZE {
            return Err(Error::UnsupportedBlockSize(info.block_size));
        }

        let lun = self.units.len() as u8;
        self.units
            .push(device)
            .map_err(|_| Error::TooManyLogicalUnits)?;

        info!(
            "ums: LUN {} registered: {} blocks of {} bytes, {} MiB",
            lun,
            info.block_count,
            info.block_size,
            info.capacity() / (1024 * 1024)
        );
        Ok(lun)
    }

    pub fn get(&self, lun: u8) -> Option<&D> {
        self.units.get(lun as usize)
    }

    pub fn get_mut(&mut self, lun: u8) -> Option<&mut D> {
        self.units.get_mut(lun as usize)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// The highest registered LUN, as reported by Get Max LUN
    pub fn max_lun(&self) -> Option<u8> {
        self.units.len().checked_sub(1).map(|lun| lun as u8)
    }

    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.units.iter()
    }
}
