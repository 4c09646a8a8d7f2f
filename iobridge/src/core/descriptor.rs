use std::{
    fmt::{Debug, Error, Formatter},
    ptr::NonNull,
};

use iobridge_sys::bridge_bdev_desc;

use crate::core::Bdev;

/// NewType around a descriptor, multiple descriptors to the same bdev are
/// allowed. The descriptor is owned by the engine and outlives every I/O
/// issued through it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Descriptor(NonNull<bridge_bdev_desc>);

impl Descriptor {
    /// create a Descriptor from a raw pointer, None when the pointer is null
    /// or the descriptor is not bound to a bdev
    pub fn from_null_checked(desc: *mut bridge_bdev_desc) -> Option<Descriptor> {
        let desc = NonNull::new(desc)?;
        if unsafe { desc.as_ref().bdev }.is_null() {
            return None;
        }
        Some(Descriptor(desc))
    }

    /// returns the underling ptr
    pub fn as_ptr(&self) -> *mut bridge_bdev_desc {
        self.0.as_ptr()
    }

    /// Return the bdev associated with this descriptor, a descriptor cannot
    /// exist without a bdev
    pub fn get_bdev(&self) -> Bdev {
        Bdev::from(unsafe { NonNull::new_unchecked(self.0.as_ref().bdev) })
    }

    /// true if the descriptor was opened for writing
    pub fn is_writable(&self) -> bool {
        unsafe { self.0.as_ref().write }
    }
}

impl Debug for Descriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "Descriptor {:p} for bdev: {}",
            self.as_ptr(),
            self.get_bdev().name()
        )
    }
}
