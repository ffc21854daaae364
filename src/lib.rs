//! USB Mass Storage gadget for [usb-device]
//!
//! Exposes one or more block devices as SCSI logical units to a USB host over
//! the Bulk-Only Transport.
//!
//! # Layers
//! * [BlockDevice] - implemented by the storage driver (SD/MMC card, RAM disk, flash)
//! * [LogicalUnits] - LUN registry, index is the LUN
//! * [MassStorage] - transport-agnostic protocol core. Feed it OUT deliveries via
//!   [on_out] and drain IN responses via [on_in]
//! * [BulkOnly] - [usb-device] class driving the core from bulk endpoints
//!
//! # Features
//! | Feature | Description                           |
//! | ------- |---------------------------------------|
//! | `bbb` | Include the [usb-device] Bulk Only Transport class |
//! | `defmt` | Enable logging via [defmt](https://crates.io/crates/defmt) crate |
//!
//! [usb-device]: https://crates.io/crates/usb-device
//! [BlockDevice]: crate::block::BlockDevice
//! [LogicalUnits]: crate::block::LogicalUnits
//! [MassStorage]: crate::storage::MassStorage
//! [on_out]: crate::storage::MassStorage::on_out
//! [on_in]: crate::storage::MassStorage::on_in
//! [BulkOnly]: crate::transport::bbb::BulkOnly

#![no_std]

pub mod block;
#[cfg(feature = "bbb")]
pub(crate) mod buffer;
pub mod error;
pub(crate) mod fmt;
pub(crate) mod pending;
pub mod queue;
pub mod storage;
pub mod subclass;
pub mod transport;

pub use block::{BlockDevice, BlockInfo, LogicalUnits};
pub use error::Error;
pub use storage::MassStorage;
pub use subclass::response::Identity;

/// USB Mass Storage Class code
pub const CLASS_MASS_STORAGE: u8 = 0x08;
