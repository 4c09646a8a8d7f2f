use std::{
    fmt::{self, Debug, Formatter},
    os::raw::c_void,
    ptr::{self, NonNull},
    slice,
};

use snafu::{ensure, OptionExt};

use iobridge_sys::{bridge_bdev_io, bridge_bdev_io_completion_cb, iovec};

use crate::core::{
    BdevEngine,
    BufferOverflow,
    CoreError,
    Descriptor,
    DmaBuf,
    EngineExhausted,
    IoChannel,
};

#[derive(Debug, Copy, Clone, PartialOrd, PartialEq, Eq)]
pub enum IoType {
    Invalid,
    Read,
    Write,
    Unmap,
    Flush,
    Reset,
    NvmeAdmin,
    NvmeIo,
    NvmeIoMd,
    WriteZeros,
    ZeroCopy,
    ZoneInfo,
    ZoneManagement,
    ZoneAppend,
    Compare,
    CompareAndWrite,
    Abort,
}

impl From<IoType> for u8 {
    fn from(t: IoType) -> Self {
        match t {
            IoType::Invalid => 0,
            IoType::Read => 1,
            IoType::Write => 2,
            IoType::Unmap => 3,
            IoType::Flush => 4,
            IoType::Reset => 5,
            IoType::NvmeAdmin => 6,
            IoType::NvmeIo => 7,
            IoType::NvmeIoMd => 8,
            IoType::WriteZeros => 9,
            IoType::ZeroCopy => 10,
            IoType::ZoneInfo => 11,
            IoType::ZoneManagement => 12,
            IoType::ZoneAppend => 13,
            IoType::Compare => 14,
            IoType::CompareAndWrite => 15,
            IoType::Abort => 16,
        }
    }
}

/// Opcodes the bridge does not know about read back as `Invalid`.
impl From<u8> for IoType {
    fn from(u: u8) -> Self {
        match u {
            1 => Self::Read,
            2 => Self::Write,
            3 => Self::Unmap,
            4 => Self::Flush,
            5 => Self::Reset,
            6 => Self::NvmeAdmin,
            7 => Self::NvmeIo,
            8 => Self::NvmeIoMd,
            9 => Self::WriteZeros,
            10 => Self::ZeroCopy,
            11 => Self::ZoneInfo,
            12 => Self::ZoneManagement,
            13 => Self::ZoneAppend,
            14 => Self::Compare,
            15 => Self::CompareAndWrite,
            16 => Self::Abort,
            _ => Self::Invalid,
        }
    }
}

/// A caller supplied data buffer: its address and how many bytes may be
/// transferred through it.
#[derive(Debug, Clone, Copy)]
pub struct IoBuf {
    base: *mut c_void,
    capacity: u64,
}

impl IoBuf {
    pub fn new(base: *mut c_void, capacity: u64) -> Self {
        Self {
            base,
            capacity,
        }
    }

    /// no buffer attached, the caller sets one before submission
    pub fn null() -> Self {
        Self::new(ptr::null_mut(), 0)
    }

    pub fn base(&self) -> *mut c_void {
        self.base
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

impl From<&mut DmaBuf> for IoBuf {
    fn from(buf: &mut DmaBuf) -> Self {
        IoBuf::new(**buf, buf.len() as u64)
    }
}

impl From<&mut [u8]> for IoBuf {
    fn from(buf: &mut [u8]) -> Self {
        IoBuf::new(buf.as_mut_ptr() as *mut c_void, buf.len() as u64)
    }
}

/// An I/O descriptor taken from a channel pool. It is intentionally
/// incomplete when acquired: the caller sets the length, the block range and
/// the operation before handing it to the engine with [`Bio::into_raw`].
pub struct Bio {
    inner: NonNull<bridge_bdev_io>,
    capacity: u64,
}

/// Take a descriptor from the pool of `ch` and prepare it for I/O to the bdev
/// behind `desc`.
pub fn bdev_get_bio<E: BdevEngine + ?Sized>(
    engine: &E,
    ch: &IoChannel,
    desc: &Descriptor,
    buf: IoBuf,
) -> Result<Bio, CoreError> {
    Bio::acquire(engine, ch, desc, buf)
}

impl Bio {
    /// Take a descriptor from the pool of `ch`. Fails with `EngineExhausted`
    /// when the pool is empty, in which case nothing has been touched. There
    /// is no retry here; backing off is up to the caller.
    ///
    /// On success the descriptor carries the channel context, the descriptor
    /// and its bdev, a single iovec `{buf, 0}`, no metadata buffer, a zero
    /// block range and no operation.
    pub fn acquire<E: BdevEngine + ?Sized>(
        engine: &E,
        ch: &IoChannel,
        desc: &Descriptor,
        buf: IoBuf,
    ) -> Result<Bio, CoreError> {
        let bdev = engine.desc_get_bdev(desc);
        let channel = engine.io_channel_get_ctx(ch);

        let io = engine.channel_get_io(channel).with_context(|| {
            EngineExhausted {
                channel: format!("{:?}", ch),
            }
        })?;

        unsafe {
            let raw = io.as_ptr();
            (*raw).bdev = bdev.as_ptr();
            (*raw).type_ = IoType::Invalid.into();
            (*raw).iov = iovec {
                iov_base: buf.base(),
                iov_len: 0,
            };
            (*raw).u.bdev.iovs = ptr::addr_of_mut!((*raw).iov);
            (*raw).u.bdev.iovcnt = 1;
            (*raw).u.bdev.md_buf = ptr::null_mut();
            (*raw).u.bdev.num_blocks = 0;
            (*raw).u.bdev.offset_blocks = 0;
            (*raw).internal.ch = channel.as_ptr();
            (*raw).internal.desc = desc.as_ptr();
        }

        trace!("acquired I/O {:p} on {:?}", io.as_ptr(), ch);

        Ok(Bio {
            inner: io,
            capacity: buf.capacity(),
        })
    }

    fn io(&self) -> &bridge_bdev_io {
        unsafe { self.inner.as_ref() }
    }

    fn io_mut(&mut self) -> &mut bridge_bdev_io {
        unsafe { self.inner.as_mut() }
    }

    /// descriptor the IO is issued through
    pub fn descriptor(&self) -> Option<Descriptor> {
        Descriptor::from_null_checked(self.io().internal.desc)
    }

    /// the iovecs of this IO
    pub fn iovs(&self) -> &[iovec] {
        let io = self.io();
        if io.u.bdev.iovs.is_null() || io.u.bdev.iovcnt <= 0 {
            return &[];
        }
        unsafe {
            slice::from_raw_parts(io.u.bdev.iovs, io.u.bdev.iovcnt as usize)
        }
    }

    /// number of iovs that are part of this IO
    #[inline]
    pub fn iov_count(&self) -> i32 {
        self.io().u.bdev.iovcnt
    }

    /// base address of the data buffer
    pub fn buf(&self) -> *mut c_void {
        self.iovs().first().map_or(ptr::null_mut(), |iov| iov.iov_base)
    }

    /// number of bytes to transfer
    pub fn len(&self) -> u64 {
        self.iovs().iter().map(|iov| iov.iov_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// capacity of the buffer the IO was prepared with
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// offset where we do the IO on the device
    #[inline]
    pub fn offset(&self) -> u64 {
        self.io().u.bdev.offset_blocks
    }

    /// num of blocks this IO will read/write/unmap
    #[inline]
    pub fn num_blocks(&self) -> u64 {
        self.io().u.bdev.num_blocks
    }

    /// determine the type of this IO
    #[inline]
    pub fn io_type(&self) -> IoType {
        self.io().type_.into()
    }

    pub fn md_buf(&self) -> *mut c_void {
        self.io().u.bdev.md_buf
    }

    /// replace the data buffer, the length is reset to 0
    pub fn set_buf(&mut self, buf: IoBuf) {
        let io = self.io_mut();
        io.iov = iovec {
            iov_base: buf.base(),
            iov_len: 0,
        };
        io.u.bdev.iovs = ptr::addr_of_mut!(io.iov);
        io.u.bdev.iovcnt = 1;
        self.capacity = buf.capacity();
    }

    /// set the number of bytes to transfer, bounded by the buffer capacity
    pub fn set_len(&mut self, len: u64) -> Result<(), CoreError> {
        ensure!(
            len <= self.capacity,
            BufferOverflow {
                len,
                capacity: self.capacity,
            }
        );
        self.io_mut().iov.iov_len = len;
        Ok(())
    }

    pub fn set_offset(&mut self, offset_blocks: u64) {
        self.io_mut().u.bdev.offset_blocks = offset_blocks;
    }

    pub fn set_num_blocks(&mut self, num_blocks: u64) {
        self.io_mut().u.bdev.num_blocks = num_blocks;
    }

    pub fn set_io_type(&mut self, io_type: IoType) {
        self.io_mut().type_ = io_type.into();
    }

    pub fn set_md_buf(&mut self, md_buf: *mut c_void) {
        self.io_mut().u.bdev.md_buf = md_buf;
    }

    /// callback the engine runs once the submitted IO completes
    pub fn set_completion(
        &mut self,
        cb: bridge_bdev_io_completion_cb,
        caller_ctx: *mut c_void,
    ) {
        let io = self.io_mut();
        io.internal.cb = cb;
        io.internal.caller_ctx = caller_ctx;
    }

    /// The IO may only be submitted once its length, block count and
    /// operation have been set.
    pub fn is_ready(&self) -> bool {
        !self.is_empty()
            && self.num_blocks() > 0
            && self.io_type() != IoType::Invalid
    }

    pub fn as_ptr(&self) -> *mut bridge_bdev_io {
        self.inner.as_ptr()
    }

    /// Hand the descriptor over to the engine's submission path. After this
    /// the engine owns it and recycles it on completion.
    pub fn into_raw(self) -> NonNull<bridge_bdev_io> {
        self.inner
    }

    /// Give the descriptor back to its pool without submitting it.
    pub fn release<E: BdevEngine + ?Sized>(self, engine: &E) {
        engine.put_io(self.inner);
    }
}

impl fmt::Pointer for Bio {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.inner.as_ptr())
    }
}

impl Debug for Bio {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "offset: {:?}, num_blocks: {:?}, len: {}, type: {:?}, {:p}",
            self.offset(),
            self.num_blocks(),
            self.len(),
            self.io_type(),
            self.as_ptr(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_type_round_trips_engine_opcodes() {
        for t in [IoType::Read, IoType::Write, IoType::Flush, IoType::Abort] {
            assert_eq!(IoType::from(u8::from(t)), t);
        }
        assert_eq!(u8::from(IoType::Invalid), 0);
        assert_eq!(IoType::from(200), IoType::Invalid);
    }

    #[test]
    fn io_buf_from_slice() {
        let mut data = vec![0u8; 512];
        let buf = IoBuf::from(data.as_mut_slice());
        assert_eq!(buf.capacity(), 512);
        assert_eq!(buf.base(), data.as_mut_ptr() as *mut c_void);
        assert!(IoBuf::null().base().is_null());
    }
}
