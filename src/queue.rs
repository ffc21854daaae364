//! Response queue
//!
//! Ordered, bounded FIFO of outbound transfers. The OUT path is its only producer and the
//! IN path its only consumer.

use crate::subclass::response::Payload;
use crate::transport::wrapper::{Csw, CSW_LEN};
use core::cmp::min;

/// Default queue depth. Bulk Only Transport keeps a single command in flight, which queues
/// at most a data transfer, its end marker and a status.
pub const DEFAULT_QUEUE_DEPTH: usize = 6;

/// Queue slots a single command may need
pub(crate) const COMMAND_SLOTS: usize = 3;

/// A single device to host transfer
#[derive(Debug)]
pub enum Response<B> {
    /// Blocks read from a logical unit. The buffer is dropped once transferred
    Data(B),
    /// Generated SCSI response data
    Payload(Payload),
    /// The data stage carried less than the CBW transfer length. The transport ends it with
    /// a zero-length packet unless the data already ended with a short packet
    ShortTransfer,
    /// Command Status Wrapper
    Status(Csw),
}

impl<B: AsRef<[u8]>> Response<B> {
    pub fn len(&self) -> usize {
        match self {
            Response::Data(buf) => buf.as_ref().len(),
            Response::Payload(payload) => payload.len(),
            Response::ShortTransfer => 0,
            Response::Status(_) => CSW_LEN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies bytes starting at `offset` into `dst` returning the number of bytes copied
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> usize {
        match self {
            Response::Data(buf) => copy_at(buf.as_ref(), offset, dst),
            Response::Payload(payload) => payload.read_at(offset, dst),
            Response::ShortTransfer => 0,
            Response::Status(csw) => copy_at(&csw.to_bytes(), offset, dst),
        }
    }
}

fn copy_at(src: &[u8], offset: usize, dst: &mut [u8]) -> usize {
    let src = src.get(offset..).unwrap_or_default();
    let count = min(src.len(), dst.len());
    dst[..count].copy_from_slice(&src[..count]);
    count
}

/// Bounded FIFO of [Response]s
pub struct ResponseQueue<B, const N: usize> {
    inner: heapless::Deque<Response<B>, N>,
}

impl<B, const N: usize> Default for ResponseQueue<B, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B, const N: usize> ResponseQueue<B, N> {
    pub const fn new() -> Self {
        ResponseQueue {
            inner: heapless::Deque::new(),
        }
    }

    /// Appends a response, handing it back if the queue is full
    pub fn push(&mut self, response: Response<B>) -> Result<(), Response<B>> {
        self.inner.push_back(response)
    }

    /// Takes the oldest response without blocking
    pub fn pop(&mut self) -> Option<Response<B>> {
        self.inner.pop_front()
    }

    /// Number of responses that can still be pushed
    pub fn free(&self) -> usize {
        N - self.inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear()
    }
}
