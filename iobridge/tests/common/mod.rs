#![allow(dead_code)]

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};

use iobridge::{
    core::{Descriptor, IoChannel, MemoryEngine},
    logger::{self, LogLevel, LogRecord, LogSink},
};

/// The redirector is process wide, tests that register a sink with it take
/// this lock first.
static REDIRECT_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn redirect_lock() -> MutexGuard<'static, ()> {
    REDIRECT_LOCK.lock()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub level: LogLevel,
    pub file: String,
    pub line: u32,
    pub function: String,
    pub message: String,
    pub rendered_len: usize,
}

/// A sink that keeps every record it sees.
#[derive(Default)]
pub struct CollectingSink(Mutex<Vec<Captured>>);

impl CollectingSink {
    /// create a sink and register it with the process wide redirector
    pub fn registered() -> Arc<Self> {
        let sink = Arc::new(Self::default());
        logger::register_sink(&sink);
        sink
    }

    pub fn records(&self) -> Vec<Captured> {
        self.0.lock().clone()
    }
}

impl LogSink for CollectingSink {
    fn log(&self, r: &LogRecord<'_>) {
        self.0.lock().push(Captured {
            level: r.level,
            file: r.file.into(),
            line: r.line,
            function: r.function.into(),
            message: r.message.into(),
            rendered_len: r.rendered_len,
        });
    }
}

/// an engine with one bdev `mem0` of 8 x 512 bytes, opened for writing, and
/// a channel with `pool_size` I/O descriptors
pub fn engine_with_channel(
    pool_size: usize,
) -> (MemoryEngine, Descriptor, IoChannel) {
    let engine = MemoryEngine::new();
    engine.create_bdev("mem0", 512, 8).unwrap();
    let desc = engine.open("mem0", true).unwrap();
    let ch = engine.get_io_channel(&desc, pool_size);
    (engine, desc, ch)
}
