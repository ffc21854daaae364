//! USB SCSI

use crate::block::{BlockDevice, LogicalUnits};
use crate::error::Error;
use crate::fmt::{debug, error, warning};
use crate::subclass::response::{self, Identity, Payload};
use crate::transport::wrapper::{Cbw, CB_MAX_LEN};
use num_enum::TryFromPrimitive;

/// SCSI operation codes
///
/// Refer to specifications (SPC,SBC,MMC,UFI)
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpCode {
    /* SPC */
    TestUnitReady = 0x00,
    RequestSense = 0x03,
    Inquiry = 0x12,
    ModeSense6 = 0x1A,
    PreventAllowMediumRemoval = 0x1E,
    ModeSense10 = 0x5A,
    ReportLuns = 0xA0,

    /* SBC */
    StartStopUnit = 0x1B,
    ReadCapacity10 = 0x25,
    Read10 = 0x28,
    Write10 = 0x2A,
    Verify10 = 0x2F,
    SynchronizeCache10 = 0x35,
    ServiceActionIn16 = 0x9E,

    /* MMC, UFI */
    ReadFormatCapacities = 0x23,
}

/// SERVICE ACTION IN(16) service action for READ CAPACITY(16)
const SA_READ_CAPACITY_16: u8 = 0x10;

/// SCSI command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScsiCommand {
    /* SPC */
    TestUnitReady,
    RequestSense {
        desc: bool,
        alloc_len: u8,
    },
    Inquiry {
        evpd: bool,
        page_code: u8,
        alloc_len: u16,
    },
    ModeSense6 {
        dbd: bool,
        page_control: PageControl,
        page_code: u8,
        subpage_code: u8,
        alloc_len: u8,
    },
    ModeSense10 {
        dbd: bool,
        page_control: PageControl,
        page_code: u8,
        subpage_code: u8,
        alloc_len: u16,
    },
    PreventAllowMediumRemoval {
        prevent: bool,
    },
    ReportLuns {
        alloc_len: u32,
    },

    /* SBC */
    StartStopUnit {
        start: bool,
        load_eject: bool,
    },
    ReadCapacity10,
    ReadCapacity16 {
        alloc_len: u32,
    },
    Read10 {
        lba: u32,
        len: u16,
    },
    Write10 {
        lba: u32,
        len: u16,
    },
    Verify10 {
        lba: u32,
        len: u16,
    },
    SynchronizeCache10,

    /* MMC */
    ReadFormatCapacities {
        alloc_len: u16,
    },
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PageControl {
    CurrentValues = 0b00,
    ChangeableValues = 0b01,
    DefaultValues = 0b10,
    SavedValues = 0b11,
}

impl From<u8> for PageControl {
    /// Takes the two most significant bits of a MODE SENSE page byte
    fn from(value: u8) -> Self {
        match value >> 6 {
            0b00 => PageControl::CurrentValues,
            0b01 => PageControl::ChangeableValues,
            0b10 => PageControl::DefaultValues,
            _ => PageControl::SavedValues,
        }
    }
}

/// Decodes a Command Descriptor Block
///
/// Returns the operation code back if it's unknown or its service action isn't supported.
pub fn parse_cb(cb: &[u8; CB_MAX_LEN]) -> Result<ScsiCommand, u8> {
    let opcode = OpCode::try_from_primitive(cb[0]).map_err(|err| err.number)?;
    Ok(match opcode {
        OpCode::TestUnitReady => ScsiCommand::TestUnitReady,
        OpCode::RequestSense => ScsiCommand::RequestSense {
            desc: (cb[1] & 0b00000001) != 0,
            alloc_len: cb[4],
        },
        OpCode::Inquiry => ScsiCommand::Inquiry {
            evpd: (cb[1] & 0b00000001) != 0,
            page_code: cb[2],
            alloc_len: u16::from_be_bytes([cb[3], cb[4]]),
        },
        OpCode::ModeSense6 => ScsiCommand::ModeSense6 {
            dbd: (cb[1] & 0b00001000) != 0,
            page_control: PageControl::from(cb[2]),
            page_code: cb[2] & 0b00111111,
            subpage_code: cb[3],
            alloc_len: cb[4],
        },
        OpCode::ModeSense10 => ScsiCommand::ModeSense10 {
            dbd: (cb[1] & 0b00001000) != 0,
            page_control: PageControl::from(cb[2]),
            page_code: cb[2] & 0b00111111,
            subpage_code: cb[3],
            alloc_len: u16::from_be_bytes([cb[7], cb[8]]),
        },
        OpCode::PreventAllowMediumRemoval => ScsiCommand::PreventAllowMediumRemoval {
            prevent: (cb[4] & 0b00000001) != 0,
        },
        OpCode::ReportLuns => ScsiCommand::ReportLuns {
            alloc_len: u32::from_be_bytes([cb[6], cb[7], cb[8], cb[9]]),
        },
        OpCode::StartStopUnit => ScsiCommand::StartStopUnit {
            start: (cb[4] & 0b00000001) != 0,
            load_eject: (cb[4] & 0b00000010) != 0,
        },
        OpCode::ReadCapacity10 => ScsiCommand::ReadCapacity10,
        OpCode::ServiceActionIn16 => match cb[1] & 0b00011111 {
            SA_READ_CAPACITY_16 => ScsiCommand::ReadCapacity16 {
                alloc_len: u32::from_be_bytes([cb[10], cb[11], cb[12], cb[13]]),
            },
            _ => return Err(cb[0]),
        },
        OpCode::Read10 => ScsiCommand::Read10 {
            lba: u32::from_be_bytes([cb[2], cb[3], cb[4], cb[5]]),
            len: u16::from_be_bytes([cb[7], cb[8]]),
        },
        OpCode::Write10 => ScsiCommand::Write10 {
            lba: u32::from_be_bytes([cb[2], cb[3], cb[4], cb[5]]),
            len: u16::from_be_bytes([cb[7], cb[8]]),
        },
        OpCode::Verify10 => ScsiCommand::Verify10 {
            lba: u32::from_be_bytes([cb[2], cb[3], cb[4], cb[5]]),
            len: u16::from_be_bytes([cb[7], cb[8]]),
        },
        OpCode::SynchronizeCache10 => ScsiCommand::SynchronizeCache10,
        OpCode::ReadFormatCapacities => ScsiCommand::ReadFormatCapacities {
            alloc_len: u16::from_be_bytes([cb[7], cb[8]]),
        },
    })
}

/// Host to device data a WRITE command waits for
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct WriteRequest {
    pub lun: u8,
    pub lba: u32,
    pub blocks: u16,
    pub block_size: u32,
    /// `blocks * block_size`, equals the CBW transfer length
    pub size: usize,
}

/// Outcome of a successfully dispatched command
pub(crate) enum Reply<B> {
    /// No data phase
    Status,
    /// Generated data to send before the status
    Payload(Payload),
    /// Blocks read from a logical unit to send before the status
    Blocks(B),
    /// Status is deferred until the payload is received
    Write(WriteRequest),
}

/// Executes a CBW's command against the addressed logical unit
pub(crate) fn dispatch<D: BlockDevice>(
    units: &mut LogicalUnits<D>,
    identity: &Identity,
    cbw: &Cbw,
) -> Result<Reply<D::Buffer>, Error<D::Error>> {
    let luns = units.len();
    let Some(unit) = units.get_mut(cbw.lun) else {
        warning!("ums: scsi: Invalid LUN {}, {} registered", cbw.lun, luns);
        return Err(Error::InvalidLun(cbw.lun));
    };

    let command = parse_cb(&cbw.block).map_err(|opcode| unsupported(opcode, cbw))?;
    debug!("ums: scsi: LUN {} command: {}", cbw.lun, command);

    let transfer_len = cbw.data_transfer_len;
    let info = unit.info();

    let reply = match command {
        ScsiCommand::TestUnitReady
        | ScsiCommand::PreventAllowMediumRemoval { .. }
        | ScsiCommand::StartStopUnit { .. }
        | ScsiCommand::Verify10 { .. } => Reply::Status,
        ScsiCommand::SynchronizeCache10 => {
            unit.flush().map_err(Error::StorageIo)?;
            Reply::Status
        }
        ScsiCommand::RequestSense { .. } => {
            let data = response::sense();
            if (transfer_len as usize) < data.len() {
                return Err(Error::TransferLengthMismatch {
                    expected: data.len() as u64,
                    requested: transfer_len,
                });
            }
            Reply::Payload(data)
        }
        ScsiCommand::Inquiry { evpd: true, .. } => return Err(unsupported(cbw.opcode(), cbw)),
        ScsiCommand::Inquiry { .. } => {
            Reply::Payload(response::inquiry(identity, transfer_len as usize))
        }
        ScsiCommand::ModeSense6 { alloc_len, .. } => {
            Reply::Payload(response::mode_sense_6(requested(alloc_len, transfer_len)))
        }
        ScsiCommand::ModeSense10 { alloc_len, .. } => {
            Reply::Payload(response::mode_sense_10(requested(alloc_len, transfer_len)))
        }
        ScsiCommand::ReadFormatCapacities { alloc_len } => Reply::Payload(
            response::read_format_capacities(&info, requested(alloc_len, transfer_len)),
        ),
        ScsiCommand::ReadCapacity10 => {
            Reply::Payload(response::read_capacity_10(&info).ok_or(Error::EmptyMedium)?)
        }
        ScsiCommand::ReadCapacity16 { alloc_len } => Reply::Payload(
            response::read_capacity_16(&info, requested(alloc_len, transfer_len))
                .ok_or(Error::EmptyMedium)?,
        ),
        ScsiCommand::ReportLuns { alloc_len } => {
            Reply::Payload(response::report_luns(luns, requested(alloc_len, transfer_len)))
        }
        ScsiCommand::Read10 { lba, len } => {
            check_blocks(info.block_count, lba, len)?;
            check_transfer_len(info.block_size, len, transfer_len)?;
            if len == 0 {
                Reply::Status
            } else {
                Reply::Blocks(unit.read_blocks(lba, len).map_err(Error::StorageIo)?)
            }
        }
        ScsiCommand::Write10 { lba, len } => {
            check_blocks(info.block_count, lba, len)?;
            check_transfer_len(info.block_size, len, transfer_len)?;
            if len == 0 {
                Reply::Status
            } else {
                Reply::Write(WriteRequest {
                    lun: cbw.lun,
                    lba,
                    blocks: len,
                    block_size: info.block_size,
                    size: transfer_len as usize,
                })
            }
        }
    };

    Ok(reply)
}

fn unsupported<E>(opcode: u8, cbw: &Cbw) -> Error<E> {
    error!("ums: scsi: Unsupported command {:#x}, CBW: {}", opcode, cbw);
    Error::UnsupportedCommand { opcode, cbw: *cbw }
}

/// Response length: the allocation length capped by the CBW transfer length
fn requested(alloc_len: impl Into<u32>, transfer_len: u32) -> usize {
    core::cmp::min(alloc_len.into(), transfer_len) as usize
}

/// Blocks past this one aren't addressable by 10-byte CDBs
const CDB10_BLOCK_LIMIT: u64 = 1 << 32;

fn check_blocks<E>(block_count: u64, lba: u32, len: u16) -> Result<(), Error<E>> {
    let end = lba as u64 + len as u64;
    if end > block_count || end > CDB10_BLOCK_LIMIT {
        warning!("ums: scsi: LBA {} + {} out of range", lba, len);
        return Err(Error::LbaOutOfRange { lba, blocks: len });
    }
    Ok(())
}

fn check_transfer_len<E>(block_size: u32, len: u16, transfer_len: u32) -> Result<(), Error<E>> {
    let expected = block_size as u64 * len as u64;
    if expected != transfer_len as u64 {
        warning!(
            "ums: scsi: {} blocks need {} bytes, host transfers {}",
            len, expected, transfer_len
        );
        return Err(Error::TransferLengthMismatch {
            expected,
            requested: transfer_len,
        });
    }
    Ok(())
}
