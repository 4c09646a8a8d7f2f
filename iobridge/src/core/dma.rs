//! Buffers handed to the engine must be aligned to the block size of the
//! device. DmaBuf is a zeroed, aligned heap allocation that can be attached
//! to an I/O descriptor.

use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    ffi::c_void,
    ops::{Deref, DerefMut},
    slice::{from_raw_parts, from_raw_parts_mut},
};

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum DmaError {
    #[snafu(display("Failed to allocate DMA buffer"))]
    Alloc {},
}

#[derive(Debug)]
pub struct DmaBuf {
    /// a raw pointer to the buffer
    buf: *mut c_void,
    /// the length of the allocated buffer
    length: usize,
    /// layout the buffer was allocated with
    layout: Layout,
}

impl DmaBuf {
    /// convert the buffer to a slice
    pub fn as_slice(&self) -> &[u8] {
        unsafe { from_raw_parts(self.buf as *mut u8, self.length) }
    }

    /// convert the buffer to a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { from_raw_parts_mut(self.buf as *mut u8, self.length) }
    }

    /// fill the buffer with the given value
    pub fn fill(&mut self, val: u8) {
        self.as_mut_slice().fill(val);
    }

    /// Allocate a zeroed buffer of `size` bytes aligned to `1 << alignment`.
    pub fn new(size: usize, alignment: u8) -> Result<Self, DmaError> {
        let align = 1usize
            .checked_shl(alignment as u32)
            .ok_or(DmaError::Alloc {})?;
        let layout = Layout::from_size_align(size.max(1), align)
            .map_err(|_| DmaError::Alloc {})?;

        let buf = unsafe { alloc_zeroed(layout) } as *mut c_void;
        if buf.is_null() {
            Err(DmaError::Alloc {})
        } else {
            Ok(DmaBuf {
                buf,
                length: size,
                layout,
            })
        }
    }

    /// Return length of the allocated buffer.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns if the length of the allocated buffer is empty.
    /// Pretty useless but the best friends len and is_empty cannot be parted.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl Deref for DmaBuf {
    type Target = *mut c_void;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for DmaBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for DmaBuf {
    fn drop(&mut self) {
        if cfg!(debug_assertions) {
            trace!("dropping Dmabuf {:?}", self);
        }
        unsafe { dealloc(self.buf as *mut u8, self.layout) }
    }
}
