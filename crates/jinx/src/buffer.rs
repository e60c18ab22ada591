//! The `Buffer` value type: a shared, resizable byte array.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A resizable byte array exposed to scripts and native functions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes stored.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Allocated capacity in bytes, always >= [`size`](Self::size).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Returns true if the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Discards all content, retaining capacity.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Ensures capacity for at least `size` bytes.
    pub fn reserve(&mut self, size: usize) {
        if size > self.data.capacity() {
            self.data.reserve(size - self.data.len());
        }
    }

    /// Appends bytes at the end of the buffer.
    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Writes bytes at `pos`, extending the buffer as needed, and advances
    /// `pos` past the written range.
    pub fn write_at(&mut self, pos: &mut usize, bytes: &[u8]) {
        let end = *pos + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[*pos..end].copy_from_slice(bytes);
        *pos = end;
    }

    /// Reads `out.len()` bytes starting at `pos`, advancing `pos`.
    ///
    /// Returns false without side effects when the read would run past the
    /// end of the buffer.
    pub fn read_at(&self, pos: &mut usize, out: &mut [u8]) -> bool {
        let end = *pos + out.len();
        if end > self.data.len() {
            return false;
        }
        out.copy_from_slice(&self.data[*pos..end]);
        *pos = end;
        true
    }

    /// Borrow the content as a byte slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

/// Shared handle to a [`Buffer`]; mutations through one handle are visible
/// through all.
pub type BufferRef = Arc<RwLock<Buffer>>;

/// Creates a new, empty shared buffer.
#[must_use]
pub fn create_buffer() -> BufferRef {
    Arc::new(RwLock::new(Buffer::new()))
}

/// Read-locks a shared buffer, ignoring lock poisoning.
pub(crate) fn buffer_read(buffer: &BufferRef) -> RwLockReadGuard<'_, Buffer> {
    buffer.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-locks a shared buffer, ignoring lock poisoning.
pub(crate) fn buffer_write(buffer: &BufferRef) -> RwLockWriteGuard<'_, Buffer> {
    buffer.write().unwrap_or_else(PoisonError::into_inner)
}
