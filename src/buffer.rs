//! A bounded pool of pre-allocated I/O buffers.
//!
//! A fixed number of buffers is allocated up front; `checkout` hands one out
//! and falls back to a fresh heap allocation once the pool runs dry. Overflow
//! buffers are marked non-pooled so `checkin` releases them instead of
//! growing the pool past its capacity. This puts an upper bound on the memory
//! permanently parked in I/O buffers while never refusing a checkout.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

use bytes::BytesMut;
use parking_lot::Mutex;

pub struct BufferPool {
    queue: Mutex<VecDeque<BytesMut>>,
    buffer_size: usize,
    capacity: usize,
}

/// A buffer handed out by [`BufferPool::checkout`]. Pooled buffers return to
/// the pool on checkin; overflow buffers are simply dropped.
pub struct PoolBuffer {
    bytes: BytesMut,
    pooled: bool,
}

impl BufferPool {
    /// Create a pool holding `count` buffers of `size` bytes each.
    pub fn with_capacity(count: usize, size: usize) -> Self {
        let mut queue = VecDeque::with_capacity(count);
        for _ in 0..count {
            queue.push_back(BytesMut::with_capacity(size));
        }
        Self { queue: Mutex::new(queue), buffer_size: size, capacity: count }
    }

    /// Take a buffer out of the pool, allocating a fresh one when the pool
    /// is empty.
    pub fn checkout(&self) -> PoolBuffer {
        match self.queue.lock().pop_front() {
            Some(bytes) => PoolBuffer { bytes, pooled: true },
            None => PoolBuffer { bytes: BytesMut::with_capacity(self.buffer_size), pooled: false },
        }
    }

    /// Return a buffer. Overflow buffers are released rather than pooled, so
    /// the pooled count never exceeds the construction-time capacity.
    pub fn checkin(&self, mut buffer: PoolBuffer) {
        if buffer.pooled {
            buffer.bytes.clear();
            self.queue.lock().push_back(buffer.bytes);
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffers currently parked in the pool.
    pub fn available(&self) -> usize {
        self.queue.lock().len()
    }
}

impl PoolBuffer {
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }
}

impl Deref for PoolBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.bytes
    }
}

impl DerefMut for PoolBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_drains_then_overflows() {
        let pool = BufferPool::with_capacity(2, 1024);
        assert_eq!(pool.available(), 2);

        let a = pool.checkout();
        let b = pool.checkout();
        let c = pool.checkout();

        assert!(a.is_pooled());
        assert!(b.is_pooled());
        assert!(!c.is_pooled());
        assert_eq!(pool.available(), 0);
        assert_eq!(c.capacity(), 1024);

        pool.checkin(a);
        pool.checkin(b);
        pool.checkin(c);

        // the overflow buffer was dropped, not pooled
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn checkin_clears_the_buffer() {
        let pool = BufferPool::with_capacity(1, 64);

        let mut buffer = pool.checkout();
        buffer.extend_from_slice(b"leftovers");
        pool.checkin(buffer);

        let buffer = pool.checkout();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 64);
    }

    #[test]
    fn zero_capacity_pool_always_allocates() {
        let pool = BufferPool::with_capacity(0, 512);

        let buffer = pool.checkout();
        assert!(!buffer.is_pooled());
        pool.checkin(buffer);
        assert_eq!(pool.available(), 0);
    }
}
