use std::{
    fmt::{Debug, Error, Formatter},
    mem::size_of,
    ptr::NonNull,
};

use iobridge_sys::{bridge_bdev_channel, bridge_io_channel};

/// Handle to a per thread I/O channel. The channel is owned by the engine,
/// this is only a borrowed view of it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IoChannel(NonNull<bridge_io_channel>);

impl From<NonNull<bridge_io_channel>> for IoChannel {
    fn from(ch: NonNull<bridge_io_channel>) -> Self {
        IoChannel(ch)
    }
}

impl IoChannel {
    /// create an IoChannel from a raw pointer, None when the pointer is null
    pub fn from_null_checked(ch: *mut bridge_io_channel) -> Option<IoChannel> {
        NonNull::new(ch).map(IoChannel)
    }

    /// return the ptr
    pub fn as_ptr(&self) -> *mut bridge_io_channel {
        self.0.as_ptr()
    }

    /// The bdev channel context. The engine allocates every channel as a
    /// header directly followed by its context, so the context starts
    /// `size_of::<bridge_io_channel>()` bytes past the handle.
    pub fn context(&self) -> NonNull<bridge_bdev_channel> {
        unsafe {
            NonNull::new_unchecked(
                (self.0.as_ptr() as *mut u8).add(size_of::<bridge_io_channel>())
                    as *mut bridge_bdev_channel,
            )
        }
    }

    /// number of descriptors taken from this channel and not yet returned
    pub fn io_outstanding(&self) -> u64 {
        unsafe { self.context().as_ref().io_outstanding }
    }
}

impl Debug for IoChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "io channel {:p} to dev {:p}",
            self.0.as_ptr(),
            unsafe { self.0.as_ref().dev }
        )
    }
}
