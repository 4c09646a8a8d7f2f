use std::{
    ffi::CStr,
    fmt::{Debug, Formatter},
    ptr::NonNull,
};

use iobridge_sys::bridge_bdev;

/// Handle to a block device owned by the engine.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Bdev(NonNull<bridge_bdev>);

impl From<NonNull<bridge_bdev>> for Bdev {
    fn from(bdev: NonNull<bridge_bdev>) -> Self {
        Bdev(bdev)
    }
}

impl Bdev {
    /// create a Bdev from a raw pointer, None when the pointer is null
    pub fn from_null_checked(bdev: *mut bridge_bdev) -> Option<Bdev> {
        NonNull::new(bdev).map(Bdev)
    }

    /// return the name of the bdev
    pub fn name(&self) -> String {
        let name = unsafe { self.0.as_ref().name };
        if name.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(name).to_string_lossy().into_owned() }
    }

    /// the block size of the underlying device
    pub fn block_len(&self) -> u32 {
        unsafe { self.0.as_ref().blocklen }
    }

    /// number of blocks for this device
    pub fn num_blocks(&self) -> u64 {
        unsafe { self.0.as_ref().blockcnt }
    }

    /// returns the size in bytes
    pub fn size_in_bytes(&self) -> u64 {
        self.num_blocks() * self.block_len() as u64
    }

    pub fn as_ptr(&self) -> *mut bridge_bdev {
        self.0.as_ptr()
    }
}

impl Debug for Bdev {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "name: {}, block_len: {}, num_blocks: {}",
            self.name(),
            self.block_len(),
            self.num_blocks()
        )
    }
}
