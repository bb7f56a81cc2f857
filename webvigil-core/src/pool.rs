//! Small free-list of reusable byte buffers.
//!
//! Transient reads (error-body excerpts, serialization scratch) borrow a
//! buffer and return it on drop, so release happens on error paths for
//! free. The resource limiter drops the free list entirely when it needs
//! memory back.

use std::fmt;
use std::sync::Mutex;

const DEFAULT_MAX_POOLED: usize = 32;
/// Buffers that grew past this are dropped instead of pooled.
const MAX_RETAINED_CAPACITY: usize = 256 * 1024;

/// Lock-guarded free list of `Vec<u8>` scratch buffers.
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("BufferPool");
        match self.free.try_lock() {
            Ok(free) => debug.field("pooled", &free.len()),
            Err(_) => debug.field("pooled", &"<locked>"),
        };
        debug.field("max_pooled", &self.max_pooled).finish()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOLED)
    }
}

impl BufferPool {
    pub fn new(max_pooled: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_pooled: max_pooled.max(1),
        }
    }

    /// Borrow a cleared buffer; it returns to the pool when dropped.
    pub fn acquire(&self) -> PooledBuf<'_> {
        let buf = self.lock().pop().unwrap_or_default();
        PooledBuf { pool: self, buf }
    }

    /// Drop every pooled buffer. Called by the resource limiter during
    /// forced reclamation.
    pub fn clear(&self) -> usize {
        let mut free = self.lock();
        let dropped = free.len();
        free.clear();
        free.shrink_to_fit();
        dropped
    }

    pub fn pooled(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();
        let mut free = self.lock();
        if free.len() < self.max_pooled {
            free.push(buf);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<u8>>> {
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Scratch buffer borrowed from a [`BufferPool`].
pub struct PooledBuf<'a> {
    pool: &'a BufferPool,
    buf: Vec<u8>,
}

impl std::ops::Deref for PooledBuf<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl fmt::Debug for PooledBuf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuf")
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .finish()
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
