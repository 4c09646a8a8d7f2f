//!
//! core contains the primary abstractions around the engine primitives the
//! bridge touches: devices, descriptors, channels and I/O descriptors.
use snafu::Snafu;

pub use bdev::Bdev;
pub use bio::{bdev_get_bio, Bio, IoBuf, IoType};
pub use channel::IoChannel;
pub use descriptor::Descriptor;
pub use dma::{DmaBuf, DmaError};
pub use engine::BdevEngine;
pub use env::{bridge_env_init, BridgeCliArgs};
pub use memory::MemoryEngine;

mod bdev;
mod bio;
mod channel;
mod descriptor;
mod dma;
mod engine;
mod env;
pub mod layout;
mod memory;
pub mod printf;

#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility = "pub")]
pub enum CoreError {
    #[snafu(display("no free I/O descriptor on {}", channel))]
    EngineExhausted { channel: String },
    #[snafu(display("bdev {} not found", name))]
    BdevNotFound { name: String },
    #[snafu(display("bdev {} already exists", name))]
    BdevExists { name: String },
    #[snafu(display("invalid bdev name {}", name))]
    InvalidName { name: String },
    #[snafu(display(
        "invalid geometry for bdev {}: {} blocks of {} bytes",
        name,
        num_blocks,
        block_len
    ))]
    InvalidGeometry {
        name: String,
        block_len: u32,
        num_blocks: u64,
    },
    #[snafu(display(
        "I/O length {} exceeds the buffer capacity {}",
        len,
        capacity
    ))]
    BufferOverflow { len: u64, capacity: u64 },
    #[snafu(display(
        "descriptor layout mismatch on {}: bridge {} engine {}",
        field,
        bridge,
        engine
    ))]
    LayoutMismatch {
        field: String,
        bridge: u64,
        engine: u64,
    },
}
