use std::ptr::NonNull;

use iobridge_sys::{bridge_bdev_channel, bridge_bdev_io};

use crate::core::{Bdev, Descriptor, IoChannel};

/// The part of the engine's device/channel API the bridge consumes. The
/// engine owns devices, descriptors, channels and the per channel descriptor
/// pools; every method must be called from the thread that owns the channel.
pub trait BdevEngine {
    /// Channel context of `ch`.
    fn io_channel_get_ctx(&self, ch: &IoChannel) -> NonNull<bridge_bdev_channel> {
        ch.context()
    }

    /// Device the descriptor was opened on.
    fn desc_get_bdev(&self, desc: &Descriptor) -> Bdev {
        desc.get_bdev()
    }

    /// Take a free I/O descriptor from the pool of `channel`. Returns None
    /// when the pool is empty; must never block.
    fn channel_get_io(
        &self,
        channel: NonNull<bridge_bdev_channel>,
    ) -> Option<NonNull<bridge_bdev_io>>;

    /// Return an I/O descriptor to the pool it was taken from.
    fn put_io(&self, io: NonNull<bridge_bdev_io>);
}
