use core::borrow::BorrowMut;

/// OUT packet assembly buffer
///
/// Packets are appended until a CBW or a payload chunk is complete, then drained as a whole.
pub struct Buffer<T: BorrowMut<[u8]>> {
    inner: T,
    len: usize, // next byte to write into
}

impl<T: BorrowMut<[u8]>> Buffer<T> {
    pub fn new(inner: T) -> Buffer<T> {
        Buffer { inner, len: 0 }
    }

    pub fn available_read(&self) -> usize {
        self.len
    }

    pub fn available_write(&self) -> usize {
        self.inner.borrow().len() - self.len
    }

    /// Lets `f` append up to `max_count` bytes returning the number of bytes appended
    ///
    /// Fails with `overflow_err` if `max_count` bytes don't fit.
    pub fn fill<E>(
        &mut self,
        max_count: usize,
        overflow_err: E,
        f: impl FnOnce(&mut [u8]) -> Result<usize, E>,
    ) -> Result<usize, E> {
        if self.available_write() < max_count {
            return Err(overflow_err);
        }

        let start = self.len;
        let inner = self.inner.borrow_mut();
        f(&mut inner[start..(start + max_count)]).map(|count| {
            let count = count.min(max_count);
            self.len += count;
            debug_assert!(self.len <= inner.len());
            count
        })
    }

    /// Hands every buffered byte to `f` and empties the buffer
    pub fn drain<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> R {
        let result = f(&self.inner.borrow()[..self.len]);
        self.len = 0;
        result
    }

    pub fn clean(&mut self) {
        self.len = 0;
    }
}
