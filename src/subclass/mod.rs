//! USB Mass Storage subclass: SCSI transparent command set

pub mod response;
pub mod scsi;

/// SCSI device subclass code
pub const SUBCLASS_SCSI: u8 = 0x06; // SCSI Transparent command set
