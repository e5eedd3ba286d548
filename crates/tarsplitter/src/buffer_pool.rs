//! Pooled copy buffers.
//!
//! Copying entry content goes through a 4 MiB buffer. Buffers are kept in a
//! process-wide free list so repeated splits do not allocate a fresh one each
//! time; a [`PooledBuffer`] goes back to the list when dropped.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

/// Size of each copy buffer.
pub(crate) const COPY_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Upper bound on idle buffers kept around.
const MAX_IDLE_BUFFERS: usize = 4;

static IDLE_BUFFERS: Mutex<Vec<Box<[u8]>>> = Mutex::new(Vec::new());

/// A copy buffer borrowed from the pool.
#[derive(Debug)]
pub(crate) struct PooledBuffer {
    buf: Option<Box<[u8]>>,
}

impl PooledBuffer {
    /// Take a buffer from the pool, allocating one if none is idle.
    pub(crate) fn get() -> Self {
        let buf = IDLE_BUFFERS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| vec![0u8; COPY_BUFFER_SIZE].into_boxed_slice());
        Self { buf: Some(buf) }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let mut idle = IDLE_BUFFERS.lock().unwrap_or_else(PoisonError::into_inner);
            if idle.len() < MAX_IDLE_BUFFERS {
                idle.push(buf);
            }
        }
    }
}
