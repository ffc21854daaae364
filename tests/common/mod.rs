#![allow(dead_code)]

use std::sync::mpsc::sync_channel;
use std::thread;
use std::time::Duration;
use usbd_ums::queue::Response;
use usbd_ums::transport::wrapper::{Cbw, CSW_LEN, CSW_SIGNATURE};
use usbd_ums::transport::CommandStatus;
use usbd_ums::{BlockDevice, BlockInfo, Identity, LogicalUnits, MassStorage};

pub mod bbb;
pub mod scsi;

pub const PACKET_SIZE: [u16; 5] = [8, 16, 32, 64, 512];

pub const BLOCK_SIZE: u32 = 512;
pub const BLOCK_COUNT: u64 = 64;

pub const IDENTITY: Identity = Identity::new("Acme", "Test Disk", "1.0");

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DiskError;

/// In-memory block device
pub struct RamDisk {
    pub data: Vec<u8>,
    pub block_size: u32,
    /// Fail every read, write and flush
    pub fail: bool,
    pub writes: usize,
    pub flushes: usize,
}

impl RamDisk {
    pub fn new(block_size: u32, block_count: u64) -> Self {
        Self {
            data: vec![0u8; (block_size as u64 * block_count) as usize],
            block_size,
            fail: false,
            writes: 0,
            flushes: 0,
        }
    }

    /// Disk with every block filled with its own LBA
    pub fn patterned(block_size: u32, block_count: u64) -> Self {
        let mut disk = Self::new(block_size, block_count);
        for (lba, block) in disk.data.chunks_mut(block_size as usize).enumerate() {
            block.fill(lba as u8);
        }
        disk
    }

    pub fn block(&self, lba: u32) -> &[u8] {
        let start = (lba * self.block_size) as usize;
        &self.data[start..start + self.block_size as usize]
    }

    fn check(&self) -> Result<(), DiskError> {
        if self.fail {
            Err(DiskError)
        } else {
            Ok(())
        }
    }
}

impl BlockDevice for RamDisk {
    type Error = DiskError;
    type Buffer = Vec<u8>;

    fn info(&self) -> BlockInfo {
        BlockInfo {
            block_size: self.block_size,
            block_count: self.data.len() as u64 / self.block_size as u64,
        }
    }

    fn read_blocks(&mut self, lba: u32, count: u16) -> Result<Vec<u8>, DiskError> {
        self.check()?;
        let start = (lba * self.block_size) as usize;
        let end = start + count as usize * self.block_size as usize;
        Ok(self.data[start..end].to_vec())
    }

    fn write_blocks(&mut self, lba: u32, data: &[u8]) -> Result<(), DiskError> {
        self.check()?;
        assert_eq!(0, data.len() % self.block_size as usize);
        let start = (lba * self.block_size) as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DiskError> {
        self.check()?;
        self.flushes += 1;
        Ok(())
    }
}

/// Core with a single [BLOCK_COUNT] blocks LUN
pub fn storage() -> MassStorage<RamDisk> {
    storage_with([RamDisk::patterned(BLOCK_SIZE, BLOCK_COUNT)])
}

pub fn storage_with<const L: usize>(disks: [RamDisk; L]) -> MassStorage<RamDisk> {
    let mut units = LogicalUnits::new();
    for disk in disks {
        units.push(disk).unwrap();
    }
    MassStorage::new(units, IDENTITY)
}

/// Device to host data direction flag
pub const DIR_IN: u8 = 1 << 7;
pub const DIR_OUT: u8 = 0;

pub fn cbw(tag: u32, lun: u8, data_transfer_len: u32, flags: u8, cb: &[u8]) -> Cbw {
    assert!((1..=16).contains(&cb.len()));
    let mut block = [0u8; 16];
    block[..cb.len()].copy_from_slice(cb);
    Cbw {
        tag,
        data_transfer_len,
        flags,
        lun,
        block_len: cb.len() as u8,
        block,
    }
}

/// Host side view of a Command Status Wrapper
#[derive(Debug, Eq, PartialEq)]
pub struct Status {
    pub tag: u32,
    pub residue: u32,
    pub status: CommandStatus,
}

impl Status {
    pub fn passed(tag: u32) -> Self {
        Self {
            tag,
            residue: 0,
            status: CommandStatus::Passed,
        }
    }

    pub fn failed(tag: u32, residue: u32) -> Self {
        Self {
            tag,
            residue,
            status: CommandStatus::Failed,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(CSW_LEN, bytes.len());
        assert_eq!(CSW_SIGNATURE.to_le_bytes(), bytes[..4]);

        let status = match bytes[12] {
            0x00 => CommandStatus::Passed,
            0x01 => CommandStatus::Failed,
            _ => panic!("invalid status code"),
        };

        Self {
            tag: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            residue: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            status,
        }
    }
}

/// Flattens a response into the bytes the host would see
pub fn response_bytes(response: &Response<Vec<u8>>) -> Vec<u8> {
    let mut bytes = vec![0u8; response.len()];
    assert_eq!(response.len(), response.read_at(0, &mut bytes));
    bytes
}

/// Takes every queued response
pub fn drain(storage: &mut MassStorage<RamDisk>) -> Vec<Vec<u8>> {
    std::iter::from_fn(|| storage.on_in())
        .map(|response| response_bytes(&response))
        .collect()
}

pub fn timeout<F, T>(timeout: Duration, f: F)
where
    F: FnOnce() -> T,
    F: Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = sync_channel(0);
    thread::spawn(move || {
        f();
        tx.send(()).unwrap();
    });
    rx.recv_timeout(timeout).expect("timeout");
}
