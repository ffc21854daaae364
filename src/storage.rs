//! Transport-agnostic Mass Storage core
//!
//! Driven through two entry points: [on_out] for every host to device delivery and
//! [on_in] whenever the host asks for data. Both run on the caller's context, nothing here
//! blocks. When the core is shared between interrupt handlers it is expected to live in a
//! `critical_section::Mutex<RefCell<_>>`.
//!
//! [on_out]: MassStorage::on_out
//! [on_in]: MassStorage::on_in

use crate::block::{BlockDevice, LogicalUnits};
use crate::error::Error;
use crate::fmt::{debug, info, trace, warning};
use crate::pending::PendingWrite;
use crate::queue::{Response, ResponseQueue, COMMAND_SLOTS, DEFAULT_QUEUE_DEPTH};
use crate::subclass::response::Identity;
use crate::subclass::scsi::{self, Reply};
use crate::transport::wrapper::{Cbw, Csw, DataDirection};

/// Mass Storage protocol core
///
/// Owns the Logical Unit registry, the single pending WRITE and the response queue.
/// `N` is the response queue depth, it must fit at least a data transfer, its end marker and
/// a status.
pub struct MassStorage<D: BlockDevice, const N: usize = DEFAULT_QUEUE_DEPTH> {
    units: LogicalUnits<D>,
    identity: Identity,
    pending: Option<PendingWrite>,
    queue: ResponseQueue<D::Buffer, N>,
}

impl<D: BlockDevice, const N: usize> MassStorage<D, N> {
    const DEPTH_OK: () = assert!(N >= COMMAND_SLOTS, "queue must fit a whole command reply");

    pub fn new(units: LogicalUnits<D>, identity: Identity) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::DEPTH_OK;

        MassStorage {
            units,
            identity,
            pending: None,
            queue: ResponseQueue::new(),
        }
    }

    pub fn units(&self) -> &LogicalUnits<D> {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut LogicalUnits<D> {
        &mut self.units
    }

    /// Whether an OUT delivery can be processed now.
    ///
    /// While this is `false` the transport should leave host data where it is (NAK the OUT
    /// endpoint) and retry once the IN side has drained the queue.
    pub fn can_accept(&self) -> bool {
        self.queue.free() >= COMMAND_SLOTS
    }

    /// Whether OUT deliveries are currently treated as WRITE payload
    pub fn is_write_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Handles a host to device delivery
    ///
    /// While a WRITE is pending the delivery is payload, otherwise it must be a CBW. An empty
    /// delivery outside of a WRITE is ignored.
    ///
    /// Returns the number of bytes the transport should request on the next OUT transfer,
    /// if any.
    ///
    /// # Errors
    /// * [Error::QueueFull] - the delivery wasn't consumed and must be retried
    /// * any other variant - the command failed. A failed CSW is already queued and the core
    ///   is ready for the next CBW
    pub fn on_out(&mut self, bytes: &[u8]) -> Result<Option<usize>, Error<D::Error>> {
        if !self.can_accept() {
            return Err(Error::QueueFull);
        }

        if self.pending.is_some() {
            return self.continue_write(bytes);
        }

        match Cbw::parse(bytes) {
            Ok(Some(cbw)) => self.on_cbw(&cbw),
            Ok(None) => Ok(None),
            Err(err) => {
                warning!("ums: Malformed CBW: {}", err);
                if let Some((tag, data_transfer_len)) = Cbw::peek(bytes) {
                    self.enqueue(Response::Status(Csw::failed(tag, data_transfer_len)))?;
                }
                Err(err.into())
            }
        }
    }

    /// Handles an already parsed CBW. Same contract as [on_out].
    ///
    /// [on_out]: MassStorage::on_out
    pub fn on_cbw(&mut self, cbw: &Cbw) -> Result<Option<usize>, Error<D::Error>> {
        if !self.can_accept() {
            return Err(Error::QueueFull);
        }
        debug!("ums: Recv CBW: {}", cbw);

        // a new CBW while a WRITE is still waiting means the host gave up on it
        if self.pending.take().is_some() {
            warning!("ums: Pending write dropped by a new CBW");
        }

        match scsi::dispatch(&mut self.units, &self.identity, cbw) {
            Ok(Reply::Status) => {
                self.end_data_stage(cbw, 0)?;
                self.enqueue(Response::Status(Csw::passed(cbw.tag)))?;
                Ok(None)
            }
            Ok(Reply::Payload(payload)) => {
                let len = payload.len();
                if !payload.is_empty() {
                    self.enqueue(Response::Payload(payload))?;
                }
                self.end_data_stage(cbw, len)?;
                self.enqueue(Response::Status(Csw::passed(cbw.tag)))?;
                Ok(None)
            }
            Ok(Reply::Blocks(buf)) => {
                let len = buf.as_ref().len();
                self.enqueue(Response::Data(buf))?;
                self.end_data_stage(cbw, len)?;
                self.enqueue(Response::Status(Csw::passed(cbw.tag)))?;
                Ok(None)
            }
            Ok(Reply::Write(request)) => {
                trace!("ums: Awaiting {} bytes of payload", request.size);
                self.pending = Some(PendingWrite::new(request, Csw::passed(cbw.tag)));
                Ok(Some(request.size))
            }
            Err(err) => {
                self.enqueue(Response::Status(Csw::failed(cbw.tag, cbw.data_transfer_len)))?;
                Err(err)
            }
        }
    }

    /// Takes the next response to send to the host, never blocks
    pub fn on_in(&mut self) -> Option<Response<D::Buffer>> {
        self.queue.pop()
    }

    /// Get Max LUN class request
    ///
    /// # Errors
    /// [Error::NoLogicalUnits] - the request is unsupported without logical units
    pub fn max_lun(&self) -> Result<u8, Error<D::Error>> {
        self.units.max_lun().ok_or(Error::NoLogicalUnits)
    }

    /// Bulk Only Mass Storage Reset class request
    ///
    /// Acknowledged without touching the command state.
    pub fn mass_storage_reset(&mut self) {
        info!("ums: Recv Bulk-Only Mass Storage Reset");
    }

    /// USB bus reset: drops the pending WRITE and every queued response
    pub fn reset(&mut self) {
        info!("ums: Reset");
        self.pending = None;
        self.queue.clear();
    }

    fn continue_write(&mut self, bytes: &[u8]) -> Result<Option<usize>, Error<D::Error>> {
        let Some(mut pending) = self.pending.take() else {
            return Ok(None);
        };

        let result = match self.units.get_mut(pending.lun()) {
            Some(unit) => pending.feed(unit, bytes),
            None => Err(Error::InvalidLun(pending.lun())),
        };

        match result {
            Ok(Some(remaining)) => {
                trace!("ums: Awaiting {} bytes of payload", remaining);
                self.pending = Some(pending);
                Ok(Some(remaining))
            }
            Ok(None) => {
                debug!("ums: Write complete");
                let mut csw = pending.csw();
                csw.residue = 0;
                self.enqueue(Response::Status(csw))?;
                Ok(None)
            }
            Err(err) => {
                warning!("ums: Write failed, {} bytes outstanding", pending.remaining());
                let csw = Csw::failed(pending.csw().tag, pending.transfer_len());
                self.enqueue(Response::Status(csw))?;
                Err(err)
            }
        }
    }

    /// Marks an IN data stage that carried less than the host asked for
    fn end_data_stage(&mut self, cbw: &Cbw, len: usize) -> Result<(), Error<D::Error>> {
        if cbw.direction() == DataDirection::In && len < cbw.data_transfer_len as usize {
            trace!("ums: Short data stage: {} of {} bytes", len, cbw.data_transfer_len);
            self.enqueue(Response::ShortTransfer)?;
        }
        Ok(())
    }

    fn enqueue(&mut self, response: Response<D::Buffer>) -> Result<(), Error<D::Error>> {
        // callers check can_accept() before producing a command's responses
        self.queue.push(response).map_err(|_| Error::QueueFull)
    }
}
