//! Bulk Only Transport (BBB/BOT)

use crate::block::BlockDevice;
use crate::buffer::Buffer;
use crate::fmt::{info, trace, warning};
use crate::queue::{Response, DEFAULT_QUEUE_DEPTH};
use crate::storage::MassStorage;
use crate::subclass::SUBCLASS_SCSI;
use crate::transport::wrapper::{Cbw, DataDirection, CBW_LEN};
use crate::transport::{TransportError, TRANSPORT_BBB};
use crate::CLASS_MASS_STORAGE;
use core::borrow::BorrowMut;
use usb_device::bus::{InterfaceNumber, UsbBus, UsbBusAllocator};
use usb_device::class::{ControlIn, ControlOut, UsbClass};
use usb_device::class_prelude::DescriptorWriter;
use usb_device::control::{Recipient, Request, RequestType};
use usb_device::endpoint::{Endpoint, In, Out};
use usb_device::UsbError;

const CLASS_SPECIFIC_BULK_ONLY_MASS_STORAGE_RESET: u8 = 0xFF;
const CLASS_SPECIFIC_GET_MAX_LUN: u8 = 0xFE;

/// Largest bulk packet (High Speed)
pub const MAX_PACKET_SIZE: usize = 512;

/// Bulk Only Transport error
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BulkOnlyError {
    /// Not enough space to fit additional data
    IoBufferOverflow,
    /// The IO buffer cannot fit a CBW followed by a single full packet
    BufferTooSmall,
    /// Bulk packet size other than 8, 16, 32, 64 or 512
    InvalidPacketSize,
}

type BulkOnlyTransportResult<T> = Result<T, TransportError<BulkOnlyError>>;

/// Bulk Only Transport bound to a [MassStorage] core
///
/// OUT packets are assembled in the IO buffer and handed to the core once a whole CBW or a
/// WRITE payload chunk is available. Queued responses are written to the IN endpoint one
/// packet at a time. Expected to be driven via [poll] on every USB event.
///
/// [poll]: crate::transport::bbb::BulkOnly::poll
pub struct BulkOnly<
    'alloc,
    Bus: UsbBus,
    D: BlockDevice,
    Buf: BorrowMut<[u8]>,
    const N: usize = DEFAULT_QUEUE_DEPTH,
> {
    interface: InterfaceNumber,
    in_ep: Endpoint<'alloc, Bus, In>,
    out_ep: Endpoint<'alloc, Bus, Out>,
    buf: Buffer<Buf>,
    storage: MassStorage<D, N>,
    /// Payload bytes the pending WRITE still expects
    expect: Option<usize>,
    /// Response being sent and the number of bytes already written
    current: Option<(Response<D::Buffer>, usize)>,
    /// Length of the data sent for the current command
    data_len: usize,
}

impl<'alloc, Bus, D, Buf, const N: usize> BulkOnly<'alloc, Bus, D, Buf, N>
where
    Bus: UsbBus,
    D: BlockDevice,
    Buf: BorrowMut<[u8]>,
{
    /// Creates a Bulk Only Transport instance
    ///
    /// # Arguments
    /// * `alloc` - [UsbBusAllocator]
    /// * `packet_size` - Maximum USB packet size. Allowed values: 8,16,32,64,512
    /// * `storage` - the Mass Storage core commands are dispatched to
    /// * `buf` - The underlying IO buffer. It is **required** to fit a partially received
    /// `CBW` followed by a full packet
    ///
    /// # Errors
    /// * [InvalidPacketSize]
    /// * [BufferTooSmall]
    ///
    /// # Panics
    /// Panics if endpoint allocations fails.
    ///
    /// [InvalidPacketSize]: crate::transport::bbb::BulkOnlyError::InvalidPacketSize
    /// [BufferTooSmall]: crate::transport::bbb::BulkOnlyError::BufferTooSmall
    /// [UsbBusAllocator]: usb_device::bus::UsbBusAllocator
    pub fn new(
        alloc: &'alloc UsbBusAllocator<Bus>,
        packet_size: u16,
        storage: MassStorage<D, N>,
        buf: Buf,
    ) -> Result<BulkOnly<'alloc, Bus, D, Buf, N>, BulkOnlyError> {
        if !matches!(packet_size, 8 | 16 | 32 | 64 | 512) {
            return Err(BulkOnlyError::InvalidPacketSize);
        }

        let buf_len = buf.borrow().len();
        if buf_len < CBW_LEN - 1 + packet_size as usize {
            return Err(BulkOnlyError::BufferTooSmall);
        }

        Ok(BulkOnly {
            interface: alloc.interface(),
            in_ep: alloc.bulk(packet_size),
            out_ep: alloc.bulk(packet_size),
            buf: Buffer::new(buf),
            storage,
            expect: None,
            current: None,
            data_len: 0,
        })
    }

    pub fn storage(&self) -> &MassStorage<D, N> {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut MassStorage<D, N> {
        &mut self.storage
    }

    /// Drives the transport in both directions
    ///
    /// Transport specific errors are logged and swallowed, only USB errors are returned.
    pub fn poll(&mut self) -> Result<(), UsbError> {
        fn map_ignore<T>(res: BulkOnlyTransportResult<T>) -> Result<(), UsbError> {
            match res {
                Ok(_)
                | Err(TransportError::Usb(UsbError::WouldBlock))
                | Err(TransportError::Error(_)) => Ok(()),
                Err(TransportError::Usb(err)) => Err(err),
            }
        }

        map_ignore(self.read())?;
        map_ignore(self.write())?;
        Ok(())
    }

    /// Drives the transport by reading a single packet
    pub fn read(&mut self) -> BulkOnlyTransportResult<()> {
        // packets stay in the endpoint (NAK) until IN drains the queue
        if !self.storage.can_accept() {
            return Err(TransportError::Usb(UsbError::WouldBlock));
        }

        self.read_packet()?; // propagate if error or WouldBlock

        if self.expect.is_some() {
            self.forward_payload();
        } else if self.buf.available_read() >= CBW_LEN {
            self.forward_cbw();
        }
        Ok(())
    }

    /// Drives the transport by writing a single packet
    pub fn write(&mut self) -> BulkOnlyTransportResult<()> {
        let packet_size = self.packet_size();
        if self.current.is_none() {
            let mut next = self.storage.on_in();
            // a short packet has already ended the data stage
            if matches!(next, Some(Response::ShortTransfer)) && self.data_len % packet_size != 0 {
                next = self.storage.on_in();
            }
            self.current = next.map(|response| (response, 0));
        }

        let Some((response, sent)) = self.current.as_mut() else {
            return Err(TransportError::Usb(UsbError::WouldBlock));
        };

        let mut packet = [0u8; MAX_PACKET_SIZE];
        let count = response.read_at(*sent, &mut packet[..packet_size]);
        let written = self
            .in_ep
            .write(&packet[..count])
            .map_err(TransportError::Usb)?;

        *sent += written;
        trace!(
            "usb: bbb: Wrote bytes: {}, left: {}",
            written,
            response.len() - *sent
        );

        if *sent >= response.len() {
            self.data_len = match response {
                Response::Data(_) | Response::Payload(_) => response.len(),
                Response::ShortTransfer | Response::Status(_) => 0,
            };
            // done, a block buffer is released here
            self.current = None;
        }
        Ok(())
    }

    fn forward_cbw(&mut self) {
        let storage = &mut self.storage;
        let (cbw, result) = self.buf.drain(|bytes| {
            let cbw = Cbw::parse(bytes).ok().flatten();
            (cbw, storage.on_out(bytes))
        });

        match result {
            Ok(expect) => self.expect = expect,
            Err(_) => {
                warning!("usb: bbb: Command failed");
                self.expect = None;
                // 6.7.2 and 6.7.3, the host expected a data stage that won't happen
                if let Some(cbw) = cbw.filter(|cbw| cbw.data_transfer_len > 0) {
                    match cbw.direction() {
                        DataDirection::In => self.stall_in_ep(),
                        DataDirection::Out => self.stall_out_ep(),
                        DataDirection::NotExpected => {}
                    }
                }
            }
        }
    }

    fn forward_payload(&mut self) {
        let expected = self.expect.unwrap_or_default();
        let storage = &mut self.storage;
        let (delivered, result) = self
            .buf
            .drain(|bytes| (bytes.len(), storage.on_out(bytes)));

        match result {
            Ok(expect) => self.expect = expect,
            Err(_) => {
                warning!("usb: bbb: Write failed");
                self.expect = None;
                if delivered < expected {
                    self.stall_out_ep();
                }
            }
        }
    }

    #[inline]
    fn packet_size(&self) -> usize {
        self.in_ep.max_packet_size() as usize // same for both In and Out EPs
    }

    fn read_packet(&mut self) -> BulkOnlyTransportResult<usize> {
        let count = self.buf.fill(
            self.packet_size(),
            TransportError::Error(BulkOnlyError::IoBufferOverflow),
            |buf| match self.out_ep.read(buf) {
                Ok(count) => Ok(count),
                Err(UsbError::WouldBlock) => Ok(0),
                Err(err) => Err(TransportError::Usb(err)),
            },
        )?;

        trace!(
            "usb: bbb: Read bytes: {}, buf available: {}",
            count,
            self.buf.available_read()
        );

        if count == 0 {
            Err(TransportError::Usb(UsbError::WouldBlock))
        } else {
            Ok(count)
        }
    }

    #[inline]
    fn stall_in_ep(&self) {
        info!("usb: bbb: Stall IN ep");
        self.in_ep.stall();
    }

    #[inline]
    fn stall_out_ep(&self) {
        info!("usb: bbb: Stall OUT ep");
        self.out_ep.stall();
    }

    fn is_own_request(&self, req: &Request) -> bool {
        req.request_type == RequestType::Class
            && req.recipient == Recipient::Interface
            && req.index == u8::from(self.interface) as u16
    }
}

impl<Bus, D, Buf, const N: usize> UsbClass<Bus> for BulkOnly<'_, Bus, D, Buf, N>
where
    Bus: UsbBus,
    D: BlockDevice,
    Buf: BorrowMut<[u8]>,
{
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        writer.iad(
            self.interface,
            1,
            CLASS_MASS_STORAGE,
            SUBCLASS_SCSI,
            TRANSPORT_BBB,
            None,
        )?;
        writer.interface(
            self.interface,
            CLASS_MASS_STORAGE,
            SUBCLASS_SCSI,
            TRANSPORT_BBB,
        )?;
        writer.endpoint(&self.in_ep)?;
        writer.endpoint(&self.out_ep)?;
        Ok(())
    }

    fn reset(&mut self) {
        info!("usb: bbb: Recv reset");
        self.in_ep.unstall();
        self.out_ep.unstall();
        self.buf.clean();
        self.expect = None;
        self.current = None;
        self.data_len = 0;
        self.storage.reset();
    }

    fn control_in(&mut self, xfer: ControlIn<Bus>) {
        let req = xfer.request();

        // not interested in this request
        if !self.is_own_request(req) || req.request != CLASS_SPECIFIC_GET_MAX_LUN {
            return;
        }

        info!("usb: bbb: Recv Get Max LUN");
        let _ = match self.storage.max_lun() {
            Ok(max_lun) => xfer.accept_with(&[max_lun]),
            Err(_) => xfer.reject(),
        };
    }

    fn control_out(&mut self, xfer: ControlOut<Bus>) {
        let req = xfer.request();

        if !self.is_own_request(req) || req.request != CLASS_SPECIFIC_BULK_ONLY_MASS_STORAGE_RESET
        {
            return;
        }

        self.storage.mass_storage_reset();
        let _ = xfer.accept();
    }
}
