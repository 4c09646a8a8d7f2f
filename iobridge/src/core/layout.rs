//! The I/O descriptor is shared with the engine as raw memory, so its layout
//! is a binary contract. The offsets as compiled on the Rust side are compared
//! with the offsets the C side reports; any difference is fatal.

use std::mem::{offset_of, size_of};

use iobridge_sys::{
    bridge_bdev_io,
    bridge_bdev_io_internal,
    bridge_bdev_io_layout,
    bridge_bdev_io_params,
    bridge_bdev_io_u,
    bridge_io_channel,
    bridge_layout,
    iovec,
    BRIDGE_LAYOUT_VERSION,
};

use crate::core::CoreError;

pub type BridgeLayout = bridge_layout;

fn param(field: usize) -> u64 {
    (offset_of!(bridge_bdev_io, u) + offset_of!(bridge_bdev_io_u, bdev) + field)
        as u64
}

fn internal(field: usize) -> u64 {
    (offset_of!(bridge_bdev_io, internal) + field) as u64
}

/// layout of the descriptor structures as compiled by rustc
pub fn rust() -> BridgeLayout {
    bridge_layout {
        version: BRIDGE_LAYOUT_VERSION,
        io_size: size_of::<bridge_bdev_io>() as u64,
        io_bdev: offset_of!(bridge_bdev_io, bdev) as u64,
        io_type: offset_of!(bridge_bdev_io, type_) as u64,
        io_iov: offset_of!(bridge_bdev_io, iov) as u64,
        io_iovs: param(offset_of!(bridge_bdev_io_params, iovs)),
        io_iovcnt: param(offset_of!(bridge_bdev_io_params, iovcnt)),
        io_md_buf: param(offset_of!(bridge_bdev_io_params, md_buf)),
        io_num_blocks: param(offset_of!(bridge_bdev_io_params, num_blocks)),
        io_offset_blocks: param(offset_of!(
            bridge_bdev_io_params,
            offset_blocks
        )),
        io_internal_ch: internal(offset_of!(bridge_bdev_io_internal, ch)),
        io_internal_desc: internal(offset_of!(bridge_bdev_io_internal, desc)),
        io_internal_status: internal(offset_of!(
            bridge_bdev_io_internal,
            status
        )),
        iovec_size: size_of::<iovec>() as u64,
        iovec_base: offset_of!(iovec, iov_base) as u64,
        iovec_len: offset_of!(iovec, iov_len) as u64,
        channel_size: size_of::<bridge_io_channel>() as u64,
    }
}

/// layout of the descriptor structures as compiled by the C compiler
pub fn native() -> BridgeLayout {
    let mut layout = bridge_layout::default();
    unsafe { bridge_bdev_io_layout(&mut layout) };
    layout
}

fn fields(l: &BridgeLayout) -> [(&'static str, u64); 17] {
    [
        ("version", l.version),
        ("bdev_io size", l.io_size),
        ("bdev_io.bdev", l.io_bdev),
        ("bdev_io.type", l.io_type),
        ("bdev_io.iov", l.io_iov),
        ("bdev_io.u.bdev.iovs", l.io_iovs),
        ("bdev_io.u.bdev.iovcnt", l.io_iovcnt),
        ("bdev_io.u.bdev.md_buf", l.io_md_buf),
        ("bdev_io.u.bdev.num_blocks", l.io_num_blocks),
        ("bdev_io.u.bdev.offset_blocks", l.io_offset_blocks),
        ("bdev_io.internal.ch", l.io_internal_ch),
        ("bdev_io.internal.desc", l.io_internal_desc),
        ("bdev_io.internal.status", l.io_internal_status),
        ("iovec size", l.iovec_size),
        ("iovec.iov_base", l.iovec_base),
        ("iovec.iov_len", l.iovec_len),
        ("io_channel size", l.channel_size),
    ]
}

/// compare two layouts, reporting the first field that differs
pub fn compare(
    bridge: &BridgeLayout,
    engine: &BridgeLayout,
) -> Result<(), CoreError> {
    for ((field, b), (_, e)) in fields(bridge).iter().zip(fields(engine).iter())
    {
        if b != e {
            return Err(CoreError::LayoutMismatch {
                field: field.to_string(),
                bridge: *b,
                engine: *e,
            });
        }
    }
    Ok(())
}

/// Fail if the descriptor layout differs from the one the engine was
/// compiled with.
pub fn verify() -> Result<(), CoreError> {
    compare(&rust(), &native())?;
    debug!("descriptor layout v{} verified", BRIDGE_LAYOUT_VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn matches_native_layout() {
        assert_eq!(rust(), native());
        verify().unwrap();
    }

    #[test]
    fn iovec_is_bit_exact() {
        let l = rust();
        assert_eq!(l.iovec_size as usize, size_of::<libc::iovec>());
        assert_eq!(l.iovec_base, 0);
        assert_eq!(l.iovec_len as usize, size_of::<*mut libc::c_void>());
        assert_eq!(size_of::<u64>(), 8);
    }

    #[test]
    fn mismatch_names_the_field() {
        let bridge = rust();
        let engine = BridgeLayout {
            io_num_blocks: bridge.io_num_blocks + 8,
            ..bridge
        };
        assert_matches!(
            compare(&bridge, &engine),
            Err(CoreError::LayoutMismatch { field, .. }) if field == "bdev_io.u.bdev.num_blocks"
        );
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let bridge = rust();
        let engine = BridgeLayout {
            version: BRIDGE_LAYOUT_VERSION + 1,
            ..bridge
        };
        assert!(compare(&bridge, &engine).is_err());
    }
}
