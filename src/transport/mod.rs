//! USB Mass Storage transports

use core::fmt::Debug;
use usb_device::UsbError;

#[cfg(feature = "bbb")]
pub mod bbb;
pub mod wrapper;

/// Bulk Only Transport interface protocol
pub const TRANSPORT_BBB: u8 = 0x50;

/// Generic error type returned by transport implementations.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError<E: Debug> {
    /// USB stack error
    Usb(UsbError),
    /// Transport-specific error
    Error(E),
}

/// The status of a Mass Storage command.
///
/// Refer to the USB-MS BBB doc, section 5.2.
#[repr(u8)]
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandStatus {
    #[default]
    Passed = 0x00,
    Failed = 0x01,
}
