use crate::common::Status;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use usb_device::bus::{PollResult, UsbBus};
use usb_device::class_prelude::{EndpointAddress, EndpointType};
use usb_device::{UsbDirection, UsbError};
use usbd_ums::transport::wrapper::{Cbw, CSW_LEN};

pub struct DummyEp {
    addr: EndpointAddress,
    max_packet_size: u16,
    stalled: bool,
    bytes_written: usize,
    bytes_read: usize,
    packets_written: usize,
    packets: VecDeque<Vec<u8>>,
}

impl DummyEp {
    pub fn new(addr: EndpointAddress, max_packet_size: u16) -> Self {
        Self {
            addr,
            max_packet_size,
            stalled: false,
            bytes_written: 0,
            bytes_read: 0,
            packets_written: 0,
            packets: VecDeque::new(),
        }
    }

    /// Splits `bytes` into packets the way a host controller would
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(self.max_packet_size as usize) {
            self.packets.push_back(chunk.to_vec());
        }
        self.bytes_written += bytes.len();
    }

    pub fn read_packet(&mut self) -> Option<Vec<u8>> {
        let packet = self.packets.pop_front();
        if let Some(len) = packet.as_ref().map(|p| p.len()) {
            self.bytes_read += len;
        }
        packet
    }
}

#[derive(Eq, PartialEq, Debug)]
pub struct BytesProcessed {
    /// (written, read)
    ep_in: (usize, usize),
    /// (written, read)
    ep_out: (usize, usize),
    /// Packets written by the device, zero-length ones included
    in_packets: usize,
}

#[derive(Clone)]
pub struct DummyUsbBus {
    inner: Arc<Mutex<Inner>>,
}

impl DummyUsbBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
        }
    }

    /// Write Command Block Wrapper as if it was written by a USB host
    pub fn write_cbw(&self, cbw: Cbw) {
        self.write_data(cbw.to_bytes().as_slice());
    }

    /// Write some data as if it was written by a USB host during Host to Device data transfer
    pub fn write_data(&self, data: &[u8]) {
        let mut lock = self.inner.lock().unwrap();
        let ep = lock.ep_out.as_mut().unwrap();
        ep.write_bytes(data);
    }

    /// Read Command Status as if it was read by a USB host
    pub fn read_status(&self) -> Option<Status> {
        let mut bytes = vec![];
        while bytes.len() < CSW_LEN {
            let mut packet = self.read_packet()?;
            bytes.append(&mut packet);
        }
        Some(Status::from_bytes(bytes.as_slice()))
    }

    /// Read a single packet as if it was read by a USB host during Device to Host data transfer
    pub fn read_packet(&self) -> Option<Vec<u8>> {
        let mut lock = self.inner.lock().unwrap();
        let ep = lock.ep_in.as_mut().unwrap();
        ep.read_packet()
    }

    /// Reads whole packets until `n` bytes are collected or no packets are left
    pub fn read_n_bytes(&self, n: usize) -> Vec<u8> {
        let mut bytes = vec![];
        while bytes.len() < n {
            match self.read_packet() {
                None => break,
                Some(mut packet) => bytes.append(&mut packet),
            }
        }
        bytes
    }

    /// Packets waiting for the host on the IN endpoint
    pub fn pending_in_packets(&self) -> usize {
        let lock = self.inner.lock().unwrap();
        lock.ep_in.as_ref().map(|ep| ep.packets.len()).unwrap()
    }

    /// Packets the device hasn't taken from the OUT endpoint yet
    pub fn pending_out_packets(&self) -> usize {
        let lock = self.inner.lock().unwrap();
        lock.ep_out.as_ref().map(|ep| ep.packets.len()).unwrap()
    }

    pub fn max_packet_size(&self) -> usize {
        let lock = self.inner.lock().unwrap();
        lock.ep_in.as_ref().map(|ep| ep.max_packet_size).unwrap() as usize
    }

    pub fn in_stalled(&self) -> bool {
        let lock = self.inner.lock().unwrap();
        lock.ep_in.as_ref().map(|ep| ep.stalled).unwrap()
    }

    pub fn out_stalled(&self) -> bool {
        let lock = self.inner.lock().unwrap();
        lock.ep_out.as_ref().map(|ep| ep.stalled).unwrap()
    }

    /// CLEAR_FEATURE(ENDPOINT_HALT) on both bulk endpoints
    pub fn clear_halt(&self) {
        let mut lock = self.inner.lock().unwrap();
        lock.ep_in.as_mut().unwrap().stalled = false;
        lock.ep_out.as_mut().unwrap().stalled = false;
    }

    pub fn bytes_processed(&self) -> BytesProcessed {
        let lock = self.inner.lock().unwrap();
        BytesProcessed {
            ep_in: (lock
                .ep_in
                .as_ref()
                .map(|ep| (ep.bytes_written, ep.bytes_read))
                .unwrap()),
            ep_out: (lock
                .ep_out
                .as_ref()
                .map(|ep| (ep.bytes_written, ep.bytes_read))
                .unwrap()),
            in_packets: lock.ep_in.as_ref().map(|ep| ep.packets_written).unwrap(),
        }
    }
}

struct Inner {
    enabled: bool,
    ep_in: Option<DummyEp>,
    ep_out: Option<DummyEp>,
}

impl Inner {
    fn new() -> Self {
        Self {
            enabled: false,
            ep_in: None,
            ep_out: None,
        }
    }
}

impl UsbBus for DummyUsbBus {
    fn alloc_ep(
        &mut self,
        ep_dir: UsbDirection,
        _ep_addr: Option<EndpointAddress>,
        ep_type: EndpointType,
        max_packet_size: u16,
        _interval: u8,
    ) -> usb_device::Result<EndpointAddress> {
        assert!(!self.inner.lock().unwrap().enabled);

        const EP_OUT_ADDR: u8 = 0x01;
        const EP_IN_ADDR: u8 = 0x81;
        const EP_CTRL: u8 = 0;

        if matches!(ep_type, EndpointType::Control) {
            return Ok(EndpointAddress::from(EP_CTRL));
        }

        let mut lock = self.inner.lock().unwrap();
        let addr = match ep_dir {
            UsbDirection::Out => {
                let addr = EndpointAddress::from(EP_OUT_ADDR);
                lock.ep_out.replace(DummyEp::new(addr, max_packet_size));
                addr
            }
            UsbDirection::In => {
                let addr = EndpointAddress::from(EP_IN_ADDR);
                lock.ep_in.replace(DummyEp::new(addr, max_packet_size));
                addr
            }
        };

        Ok(addr)
    }

    fn enable(&mut self) {
        self.inner.lock().unwrap().enabled = true;
    }

    fn reset(&self) {}

    fn set_device_address(&self, _addr: u8) {}

    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> usb_device::Result<usize> {
        let mut lock = self.inner.lock().unwrap();
        let ep = lock.ep_in.as_mut().unwrap();

        if ep.addr != ep_addr {
            return Err(UsbError::InvalidEndpoint);
        }

        if buf.len() > ep.max_packet_size as usize {
            return Err(UsbError::BufferOverflow);
        }

        // one device write is one host packet
        ep.packets.push_back(buf.to_vec());
        ep.bytes_written += buf.len();
        ep.packets_written += 1;

        Ok(buf.len())
    }

    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> usb_device::Result<usize> {
        let mut lock = self.inner.lock().unwrap();
        let ep = lock.ep_out.as_mut().unwrap();

        if ep.addr != ep_addr {
            return Err(UsbError::InvalidEndpoint);
        }

        if let Some(n) = ep.packets.front().map(|p| p.len()) {
            if n > buf.len() {
                return Err(UsbError::BufferOverflow);
            }
        }

        match ep.read_packet() {
            Some(packet) => {
                let n = packet.len();
                buf[..n].copy_from_slice(packet.as_slice());
                Ok(n)
            }
            None => Err(UsbError::WouldBlock),
        }
    }

    fn set_stalled(&self, ep_addr: EndpointAddress, stalled: bool) {
        let mut lock = self.inner.lock().unwrap();

        if let Some(ep) = lock.ep_in.as_mut() {
            if ep.addr == ep_addr {
                return ep.stalled = stalled;
            }
        }

        if let Some(ep) = lock.ep_out.as_mut() {
            if ep.addr == ep_addr {
                return ep.stalled = stalled;
            }
        }
    }

    fn is_stalled(&self, ep_addr: EndpointAddress) -> bool {
        let lock = self.inner.lock().unwrap();

        if let Some(ep) = lock.ep_in.as_ref() {
            if ep.addr == ep_addr {
                return ep.stalled;
            }
        }

        if let Some(ep) = lock.ep_out.as_ref() {
            if ep.addr == ep_addr {
                return ep.stalled;
            }
        }

        false
    }

    fn suspend(&self) {}

    fn resume(&self) {}

    fn poll(&self) -> PollResult {
        PollResult::None
    }
}
