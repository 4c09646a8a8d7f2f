//! Raw C ABI shared between the engine and the bridge.
//!
//! The structures below mirror `logwrapper.h` field for field. They are the
//! binary contract of the descriptor handed to the engine's submission path;
//! `bridge_bdev_io_layout` reports the offsets as compiled by the C side so
//! that the two definitions can be compared at startup.
#![allow(
    non_snake_case,
    non_upper_case_globals,
    non_camel_case_types,
    clippy::upper_case_acronyms
)]

use std::os::raw::{c_char, c_int, c_void};

pub const SPDK_LOG_DISABLED: i32 = -1;
pub const SPDK_LOG_ERROR: i32 = 0;
pub const SPDK_LOG_WARN: i32 = 1;
pub const SPDK_LOG_NOTICE: i32 = 2;
pub const SPDK_LOG_INFO: i32 = 3;
pub const SPDK_LOG_DEBUG: i32 = 4;

/// Size of the on-stack buffer `maya_log` renders into, NUL included.
pub const MAYA_LOG_BUF_LEN: usize = 1024;

/// Bumped whenever any of the `#[repr(C)]` structures change.
pub const BRIDGE_LAYOUT_VERSION: u64 = 1;

pub type LogProto = Option<
    extern "C" fn(
        level: i32,
        file: *const c_char,
        line: u32,
        func: *const c_char,
        buf: *const c_char,
        n: i32,
    ),
>;

pub type bridge_bdev_io_completion_cb = Option<
    unsafe extern "C" fn(
        bdev_io: *mut bridge_bdev_io,
        success: bool,
        cb_arg: *mut c_void,
    ),
>;

macro_rules! zeroed_default {
    ($($t:ty),*) => {
        $(
            impl Default for $t {
                fn default() -> Self {
                    unsafe { std::mem::zeroed() }
                }
            }
        )*
    };
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct iovec {
    pub iov_base: *mut c_void,
    pub iov_len: u64,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct bridge_bdev {
    pub name: *mut c_char,
    pub blocklen: u32,
    pub blockcnt: u64,
    pub ctxt: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct bridge_bdev_desc {
    pub bdev: *mut bridge_bdev,
    pub write: bool,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct bridge_bdev_channel {
    pub bdev: *mut bridge_bdev,
    pub pool: *mut c_void,
    pub io_outstanding: u64,
}

/// Header of an I/O channel allocation; the channel context follows it
/// directly in memory.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct bridge_io_channel {
    pub thread: *mut c_void,
    pub dev: *mut c_void,
    pub ref_: u32,
    pub destroy_ref: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct bridge_bdev_io_params {
    pub iovs: *mut iovec,
    pub iovcnt: c_int,
    pub md_buf: *mut c_void,
    pub num_blocks: u64,
    pub offset_blocks: u64,
}

/// Single member union in C, hence a plain struct here.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct bridge_bdev_io_u {
    pub bdev: bridge_bdev_io_params,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct bridge_bdev_io_internal {
    pub ch: *mut bridge_bdev_channel,
    pub desc: *mut bridge_bdev_desc,
    pub caller_ctx: *mut c_void,
    pub cb: bridge_bdev_io_completion_cb,
    pub status: i8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct bridge_bdev_io {
    pub bdev: *mut bridge_bdev,
    pub type_: u8,
    pub iov: iovec,
    pub u: bridge_bdev_io_u,
    pub internal: bridge_bdev_io_internal,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct bridge_layout {
    pub version: u64,
    pub io_size: u64,
    pub io_bdev: u64,
    pub io_type: u64,
    pub io_iov: u64,
    pub io_iovs: u64,
    pub io_iovcnt: u64,
    pub io_md_buf: u64,
    pub io_num_blocks: u64,
    pub io_offset_blocks: u64,
    pub io_internal_ch: u64,
    pub io_internal_desc: u64,
    pub io_internal_status: u64,
    pub iovec_size: u64,
    pub iovec_base: u64,
    pub iovec_len: u64,
    pub channel_size: u64,
}

zeroed_default!(
    iovec,
    bridge_bdev,
    bridge_bdev_desc,
    bridge_bdev_channel,
    bridge_io_channel,
    bridge_bdev_io_params,
    bridge_bdev_io_u,
    bridge_bdev_io_internal,
    bridge_bdev_io
);

extern "C" {
    /// Renders `format` with `vsnprintf` into a `MAYA_LOG_BUF_LEN` buffer and
    /// hands the result to `logfn`, if set.
    pub fn maya_logf(
        level: c_int,
        file: *const c_char,
        line: c_int,
        func: *const c_char,
        format: *const c_char,
        ...
    );

    pub fn bridge_io_channel_get_ctx(ch: *mut bridge_io_channel) -> *mut c_void;

    pub fn bridge_bdev_io_layout(out: *mut bridge_layout);

    pub static mut logfn: LogProto;
}
