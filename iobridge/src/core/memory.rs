//! An in-process engine. It owns bdevs, descriptors and channels, and gives
//! every channel a fixed size pool of I/O descriptors. There is no data path:
//! descriptors are handed out and taken back, which is the part of the engine
//! the bridge interacts with. All handles it returns stay valid until the
//! engine is dropped.

use std::{ffi::CString, ptr::NonNull};

use parking_lot::Mutex;

use iobridge_sys::{
    bridge_bdev,
    bridge_bdev_channel,
    bridge_bdev_desc,
    bridge_bdev_io,
    bridge_io_channel,
};

use crate::core::{Bdev, BdevEngine, CoreError, Descriptor, IoChannel};

struct BdevSlot {
    raw: bridge_bdev,
    name: CString,
}

#[repr(C)]
struct ChannelAlloc {
    header: bridge_io_channel,
    ctx: bridge_bdev_channel,
}

struct IoPool {
    all: Vec<NonNull<bridge_bdev_io>>,
    free: Mutex<Vec<NonNull<bridge_bdev_io>>>,
}

impl IoPool {
    fn new(size: usize) -> Self {
        let all = (0 .. size)
            .map(|_| {
                let io = Box::new(bridge_bdev_io::default());
                unsafe { NonNull::new_unchecked(Box::into_raw(io)) }
            })
            .collect::<Vec<_>>();

        Self {
            free: Mutex::new(all.clone()),
            all,
        }
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        for io in self.all.drain(..) {
            drop(unsafe { Box::from_raw(io.as_ptr()) });
        }
    }
}

fn into_raw<T>(v: T) -> NonNull<T> {
    unsafe { NonNull::new_unchecked(Box::into_raw(Box::new(v))) }
}

#[derive(Default)]
pub struct MemoryEngine {
    bdevs: Mutex<Vec<NonNull<BdevSlot>>>,
    descriptors: Mutex<Vec<NonNull<bridge_bdev_desc>>>,
    channels: Mutex<Vec<NonNull<ChannelAlloc>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// create a bdev with the given geometry
    pub fn create_bdev(
        &self,
        name: &str,
        block_len: u32,
        num_blocks: u64,
    ) -> Result<Bdev, CoreError> {
        let cname = CString::new(name).map_err(|_| CoreError::InvalidName {
            name: name.into(),
        })?;

        if block_len == 0 || num_blocks == 0 {
            return Err(CoreError::InvalidGeometry {
                name: name.into(),
                block_len,
                num_blocks,
            });
        }

        if self.lookup(name).is_some() {
            return Err(CoreError::BdevExists {
                name: name.into(),
            });
        }

        let slot = into_raw(BdevSlot {
            raw: bridge_bdev {
                blocklen: block_len,
                blockcnt: num_blocks,
                ..Default::default()
            },
            name: cname,
        });

        unsafe {
            let slot = slot.as_ptr();
            (*slot).raw.name = (*slot).name.as_ptr() as *mut _;
        }

        self.bdevs.lock().push(slot);
        debug!("created bdev {} ({} x {})", name, num_blocks, block_len);

        Ok(Self::bdev_of(slot))
    }

    fn bdev_of(slot: NonNull<BdevSlot>) -> Bdev {
        Bdev::from(unsafe { NonNull::new_unchecked(&mut (*slot.as_ptr()).raw) })
    }

    /// lookup a bdev by its name
    pub fn lookup(&self, name: &str) -> Option<Bdev> {
        self.bdevs
            .lock()
            .iter()
            .find(|slot| unsafe { slot.as_ref().name.as_bytes() } == name.as_bytes())
            .map(|slot| Self::bdev_of(*slot))
    }

    /// open a descriptor to the bdev called `name`
    pub fn open(&self, name: &str, write: bool) -> Result<Descriptor, CoreError> {
        let bdev = self.lookup(name).ok_or_else(|| CoreError::BdevNotFound {
            name: name.into(),
        })?;

        let desc = into_raw(bridge_bdev_desc {
            bdev: bdev.as_ptr(),
            write,
        });
        self.descriptors.lock().push(desc);

        Descriptor::from_null_checked(desc.as_ptr()).ok_or_else(|| {
            CoreError::BdevNotFound {
                name: name.into(),
            }
        })
    }

    /// Get a channel to the bdev behind `desc` with a pool of `pool_size`
    /// I/O descriptors.
    pub fn get_io_channel(&self, desc: &Descriptor, pool_size: usize) -> IoChannel {
        let bdev = desc.get_bdev();
        let pool = into_raw(IoPool::new(pool_size));

        let alloc = into_raw(ChannelAlloc {
            header: bridge_io_channel {
                dev: bdev.as_ptr() as *mut _,
                ref_: 1,
                ..Default::default()
            },
            ctx: bridge_bdev_channel {
                bdev: bdev.as_ptr(),
                pool: pool.as_ptr() as *mut _,
                io_outstanding: 0,
            },
        });
        self.channels.lock().push(alloc);

        debug!(
            "created channel {:p} to bdev {} with {} I/O descriptors",
            alloc.as_ptr(),
            bdev.name(),
            pool_size
        );

        IoChannel::from(unsafe {
            NonNull::new_unchecked(&mut (*alloc.as_ptr()).header)
        })
    }

    /// number of free I/O descriptors left in the pool of `ch`
    pub fn free_ios(&self, ch: &IoChannel) -> usize {
        Self::pool(self.io_channel_get_ctx(ch)).free.lock().len()
    }

    /// Complete a submitted I/O: record the status, run the completion
    /// callback the caller attached, if any, and recycle the descriptor.
    pub fn complete(&self, io: NonNull<bridge_bdev_io>, success: bool) {
        let (cb, ctx) = unsafe {
            let internal = &mut (*io.as_ptr()).internal;
            internal.status = if success { 1 } else { -1 };
            (internal.cb, internal.caller_ctx)
        };

        if let Some(cb) = cb {
            unsafe { cb(io.as_ptr(), success, ctx) };
        }
        self.put_io(io);
    }

    fn pool<'a>(ctx: NonNull<bridge_bdev_channel>) -> &'a IoPool {
        unsafe { &*(ctx.as_ref().pool as *const IoPool) }
    }
}

impl BdevEngine for MemoryEngine {
    fn channel_get_io(
        &self,
        channel: NonNull<bridge_bdev_channel>,
    ) -> Option<NonNull<bridge_bdev_io>> {
        // the outstanding count is only touched with the free list locked
        let mut free = Self::pool(channel).free.lock();
        let io = free.pop()?;
        unsafe { (*channel.as_ptr()).io_outstanding += 1 };
        Some(io)
    }

    fn put_io(&self, io: NonNull<bridge_bdev_io>) {
        let channel = match NonNull::new(unsafe { io.as_ref().internal.ch }) {
            Some(channel) => channel,
            None => {
                warn!("I/O {:p} does not belong to any channel", io.as_ptr());
                return;
            }
        };

        unsafe { *io.as_ptr() = bridge_bdev_io::default() };

        let mut free = Self::pool(channel).free.lock();
        unsafe {
            let ctx = channel.as_ptr();
            (*ctx).io_outstanding = (*ctx).io_outstanding.saturating_sub(1);
        }
        free.push(io);
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        for ch in self.channels.get_mut().drain(..) {
            unsafe {
                let alloc = Box::from_raw(ch.as_ptr());
                drop(Box::from_raw(alloc.ctx.pool as *mut IoPool));
            }
        }
        for desc in self.descriptors.get_mut().drain(..) {
            drop(unsafe { Box::from_raw(desc.as_ptr()) });
        }
        for bdev in self.bdevs.get_mut().drain(..) {
            drop(unsafe { Box::from_raw(bdev.as_ptr()) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn create_and_open() {
        let engine = MemoryEngine::new();
        let bdev = engine.create_bdev("mem0", 512, 2048).unwrap();
        assert_eq!(bdev.name(), "mem0");
        assert_eq!(bdev.size_in_bytes(), 1024 * 1024);

        let desc = engine.open("mem0", true).unwrap();
        assert_eq!(desc.get_bdev(), bdev);
        assert!(desc.is_writable());
        assert_eq!(engine.desc_get_bdev(&desc), bdev);
    }

    #[test]
    fn bdev_errors() {
        let engine = MemoryEngine::new();
        engine.create_bdev("mem0", 512, 8).unwrap();

        assert_matches!(
            engine.create_bdev("mem0", 512, 8),
            Err(CoreError::BdevExists { .. })
        );
        assert_matches!(
            engine.create_bdev("bad\0name", 512, 8),
            Err(CoreError::InvalidName { .. })
        );
        assert_matches!(
            engine.create_bdev("mem1", 512, 0),
            Err(CoreError::InvalidGeometry { num_blocks: 0, .. })
        );
        assert_matches!(
            engine.create_bdev("mem1", 0, 8),
            Err(CoreError::InvalidGeometry { block_len: 0, .. })
        );
        assert_matches!(
            engine.open("mem1", false),
            Err(CoreError::BdevNotFound { .. })
        );
    }

    #[test]
    fn pool_hands_out_and_takes_back() {
        let engine = MemoryEngine::new();
        engine.create_bdev("mem0", 512, 8).unwrap();
        let desc = engine.open("mem0", false).unwrap();
        let ch = engine.get_io_channel(&desc, 2);
        let ctx = engine.io_channel_get_ctx(&ch);

        let a = engine.channel_get_io(ctx).unwrap();
        let b = engine.channel_get_io(ctx).unwrap();
        assert_ne!(a, b);
        assert!(engine.channel_get_io(ctx).is_none());
        assert_eq!(ch.io_outstanding(), 2);

        unsafe { (*a.as_ptr()).internal.ch = ctx.as_ptr() };
        engine.put_io(a);
        assert_eq!(engine.free_ios(&ch), 1);
        assert_eq!(ch.io_outstanding(), 1);
    }

    unsafe extern "C" fn done(
        io: *mut bridge_bdev_io,
        success: bool,
        ctx: *mut std::os::raw::c_void,
    ) {
        let seen = &mut *(ctx as *mut Vec<(i8, bool)>);
        seen.push(((*io).internal.status, success));
    }

    #[test]
    fn completion_runs_callback_and_recycles() {
        let engine = MemoryEngine::new();
        engine.create_bdev("mem0", 512, 8).unwrap();
        let desc = engine.open("mem0", false).unwrap();
        let ch = engine.get_io_channel(&desc, 1);
        let ctx = engine.io_channel_get_ctx(&ch);
        let mut seen: Vec<(i8, bool)> = Vec::new();

        let io = engine.channel_get_io(ctx).unwrap();
        unsafe {
            (*io.as_ptr()).internal.ch = ctx.as_ptr();
            (*io.as_ptr()).internal.cb = Some(done);
            (*io.as_ptr()).internal.caller_ctx = &mut seen as *mut _ as *mut _;
        }
        engine.complete(io, false);

        assert_eq!(seen, vec![(-1, false)]);
        assert_eq!(engine.free_ios(&ch), 1);
        assert_eq!(unsafe { io.as_ref().internal.status }, 0);
    }

    #[test]
    fn outstanding_count_survives_concurrent_use() {
        let engine = MemoryEngine::new();
        engine.create_bdev("mem0", 512, 8).unwrap();
        let desc = engine.open("mem0", false).unwrap();
        let ch = engine.get_io_channel(&desc, 64);
        let ctx = engine.io_channel_get_ctx(&ch);

        struct Shared<'a>(&'a MemoryEngine, NonNull<bridge_bdev_channel>);
        unsafe impl Sync for Shared<'_> {}

        impl Shared<'_> {
            fn cycle(&self) {
                let io = self.0.channel_get_io(self.1).unwrap();
                unsafe { (*io.as_ptr()).internal.ch = self.1.as_ptr() };
                self.0.put_io(io);
            }
        }

        let shared = Shared(&engine, ctx);
        std::thread::scope(|s| {
            for _ in 0 .. 4 {
                s.spawn(|| (0 .. 1000).for_each(|_| shared.cycle()));
            }
        });

        assert_eq!(ch.io_outstanding(), 0);
        assert_eq!(engine.free_ios(&ch), 64);
    }
}
