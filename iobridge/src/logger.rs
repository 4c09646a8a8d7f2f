//! Redirect of the engine's logging into Rust.
//!
//! Every log call of the engine ends up at one registered [`LogSink`]. The
//! engine side renders its printf style message into a buffer of
//! `MAYA_LOG_BUF_LEN` bytes and calls [`log_impl`]; Rust code can emit the
//! same records with [`emit`] or the [`maya_log!`](crate::maya_log) macro.
//!
//! The rendered message is truncated to the buffer capacity (the NUL
//! included), but `rendered_len` keeps the length the full message would
//! have had, which is what `vsnprintf` reports. A record whose
//! `rendered_len` exceeds the length of its message was truncated.

use std::{
    ffi::{CStr, CString},
    io::Write,
    os::raw::c_char,
    path::Path,
    sync::{Arc, Weak},
};

use env_logger::{Builder, Env};
use log::{logger, Level, Record};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use iobridge_sys::{
    LogProto,
    MAYA_LOG_BUF_LEN,
    SPDK_LOG_DEBUG,
    SPDK_LOG_DISABLED,
    SPDK_LOG_ERROR,
    SPDK_LOG_INFO,
    SPDK_LOG_NOTICE,
    SPDK_LOG_WARN,
};

use crate::core::printf::{self, Arg};

/// Log levels of the engine, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Warn,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    /// Map an engine level. `DISABLED` yields None; a level unknown to us is
    /// treated as an error.
    pub fn from_engine(level: i32) -> Option<Self> {
        match level {
            SPDK_LOG_DISABLED => None,
            SPDK_LOG_ERROR => Some(Self::Error),
            SPDK_LOG_WARN => Some(Self::Warn),
            SPDK_LOG_NOTICE => Some(Self::Notice),
            SPDK_LOG_INFO => Some(Self::Info),
            SPDK_LOG_DEBUG => Some(Self::Debug),
            _ => Some(Self::Error),
        }
    }

    pub fn as_engine(self) -> i32 {
        match self {
            Self::Error => SPDK_LOG_ERROR,
            Self::Warn => SPDK_LOG_WARN,
            Self::Notice => SPDK_LOG_NOTICE,
            Self::Info => SPDK_LOG_INFO,
            Self::Debug => SPDK_LOG_DEBUG,
        }
    }
}

/// The levels between the engine and rust do not exactly match, NOTICE
/// messages are mostly noise and are mapped to debug.
impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::Error,
            LogLevel::Warn => Level::Warn,
            LogLevel::Info => Level::Info,
            LogLevel::Notice => Level::Debug,
            LogLevel::Debug => Level::Trace,
        }
    }
}

/// One log call of the engine. Records are handed to the sink by reference
/// and are gone once the sink returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord<'a> {
    pub level: LogLevel,
    pub file: &'a str,
    pub line: u32,
    pub function: &'a str,
    /// rendered message, at most `MAYA_LOG_BUF_LEN - 1` bytes
    pub message: &'a str,
    /// length of the message before truncation
    pub rendered_len: usize,
}

impl LogRecord<'_> {
    pub fn is_truncated(&self) -> bool {
        self.rendered_len > self.message.len()
    }
}

/// Receiver of redirected log records. Runs inline on the logging thread.
pub trait LogSink: Send + Sync {
    fn log(&self, record: &LogRecord<'_>);
}

impl<F> LogSink for F
where
    F: Fn(&LogRecord<'_>) + Send + Sync,
{
    fn log(&self, record: &LogRecord<'_>) {
        self(record)
    }
}

/// Holds the one registered sink. The sink is not owned: once the caller
/// drops it, emitting becomes a no-op.
#[derive(Default)]
pub struct Redirector {
    sink: RwLock<Option<Weak<dyn LogSink>>>,
}

impl Redirector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink`, replacing any earlier one.
    pub fn register_sink<S: LogSink + 'static>(&self, sink: &Arc<S>) {
        let weak = Arc::downgrade(sink);
        let weak: Weak<dyn LogSink> = weak;
        *self.sink.write() = Some(weak);
    }

    fn sink(&self) -> Option<Arc<dyn LogSink>> {
        self.sink.read().as_ref().and_then(Weak::upgrade)
    }

    /// true if a live sink is registered
    pub fn has_sink(&self) -> bool {
        self.sink().is_some()
    }

    /// Render `template` with `args` and pass the record to the sink.
    pub fn emit(
        &self,
        level: LogLevel,
        file: &str,
        line: u32,
        function: &str,
        template: &str,
        args: &[Arg<'_>],
    ) {
        let sink = match self.sink() {
            Some(sink) => sink,
            None => return,
        };

        let rendered = printf::render(template, args);
        sink.log(&LogRecord {
            level,
            file,
            line,
            function,
            message: truncate(&rendered),
            rendered_len: rendered.len(),
        });
    }

    /// Pass an already rendered message to the sink.
    pub fn deliver(
        &self,
        level: LogLevel,
        file: &str,
        line: u32,
        function: &str,
        message: &str,
        rendered_len: usize,
    ) {
        if let Some(sink) = self.sink() {
            sink.log(&LogRecord {
                level,
                file,
                line,
                function,
                message: truncate(message),
                rendered_len,
            });
        }
    }
}

/// Cut `message` to what fits the log buffer next to its NUL, on a char
/// boundary.
pub fn truncate(message: &str) -> &str {
    let max = MAYA_LOG_BUF_LEN - 1;
    if message.len() <= max {
        return message;
    }
    let mut end = max;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[.. end]
}

static REDIRECTOR: Lazy<Redirector> = Lazy::new(Redirector::new);

/// the process wide redirector the engine logs into
pub fn redirector() -> &'static Redirector {
    &REDIRECTOR
}

/// Register `sink` with the process wide redirector. Meant to be called once
/// during startup, before the engine starts logging.
pub fn register_sink<S: LogSink + 'static>(sink: &Arc<S>) {
    REDIRECTOR.register_sink(sink)
}

/// Emit a record through the process wide redirector.
pub fn emit(
    level: LogLevel,
    file: &str,
    line: u32,
    function: &str,
    template: &str,
    args: &[Arg<'_>],
) {
    REDIRECTOR.emit(level, file, line, function, template, args)
}

unsafe fn lossy<'a>(s: *const c_char) -> std::borrow::Cow<'a, str> {
    if s.is_null() {
        "".into()
    } else {
        CStr::from_ptr(s).to_string_lossy()
    }
}

/// Log messages originating from the engine are processed by this function.
///
/// The function should have been unsafe because we dereference raw pointer
/// arguments, but the pointer in iobridge_sys where this fn is assigned
/// expects a safe function.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn log_impl(
    level: i32,
    file: *const c_char,
    line: u32,
    func: *const c_char,
    buf: *const c_char,
    n: i32, // the number of bytes the message wanted, not what is in buf
) {
    let level = match LogLevel::from_engine(level) {
        Some(level) => level,
        None => return,
    };

    if !REDIRECTOR.has_sink() {
        return;
    }

    let (file, func, msg) = unsafe { (lossy(file), lossy(func), lossy(buf)) };
    REDIRECTOR.deliver(level, &file, line, &func, &msg, n.max(0) as usize);
}

/// Point the engine's log trampoline at [`log_impl`].
pub fn install() {
    unsafe {
        iobridge_sys::logfn = Some(log_impl);
    }
}

/// A sink that hands records to a C function of the trampoline shape.
pub struct TrampolineSink {
    func: extern "C" fn(
        i32,
        *const c_char,
        u32,
        *const c_char,
        *const c_char,
        i32,
    ),
}

impl TrampolineSink {
    /// None if `proto` is not set
    pub fn new(proto: LogProto) -> Option<Self> {
        proto.map(|func| Self {
            func,
        })
    }
}

fn c_string(s: &str) -> CString {
    let s = s.split('\0').next().unwrap_or_default();
    CString::new(s).unwrap_or_default()
}

impl LogSink for TrampolineSink {
    fn log(&self, record: &LogRecord<'_>) {
        let file = c_string(record.file);
        let func = c_string(record.function);
        let msg = c_string(record.message);
        (self.func)(
            record.level.as_engine(),
            file.as_ptr(),
            record.line,
            func.as_ptr(),
            msg.as_ptr(),
            i32::try_from(record.rendered_len).unwrap_or(i32::MAX),
        );
    }
}

/// A sink that republishes engine records through the `log` facade.
#[derive(Debug, Default)]
pub struct LogForwarder;

impl LogSink for LogForwarder {
    fn log(&self, record: &LogRecord<'_>) {
        let level = Level::from(record.level);
        if level > log::max_level() {
            return;
        }

        // remove new line characters from the log messages if any
        logger().log(
            &Record::builder()
                .args(format_args!("{}", record.message.trim_end()))
                .level(level)
                .target("iobridge::engine")
                .module_path(Some(record.function))
                .file(Some(record.file))
                .line(Some(record.line))
                .build(),
        );
    }
}

static FORWARDER: Lazy<Arc<LogForwarder>> =
    Lazy::new(|| Arc::new(LogForwarder::default()));

/// Register the [`LogForwarder`] as the process wide sink.
pub fn forward_to_log() {
    register_sink(&*FORWARDER);
}

/// This function configures the logging format. The loglevel is also processed
/// here i.e `RUST_LOG=iobridge=TRACE` will print all trace!() and higher
/// messages to the console.
pub fn init(level: &str) {
    let mut builder =
        Builder::from_env(Env::default().default_filter_or(level.to_string()));

    builder.format(|buf, record| {
        let mut level_style = buf.default_level_style(record.level());
        level_style.set_intense(true);
        writeln!(
            buf,
            "[{} {} {}:{}] {}",
            buf.timestamp_nanos(),
            level_style.value(record.level()),
            record
                .file()
                .and_then(|f| Path::new(f).file_name())
                .and_then(|f| f.to_str())
                .unwrap_or("?"),
            record.line().unwrap_or_default(),
            record.args()
        )
    });

    if builder.try_init().is_err() {
        debug!("logger already initialized");
    }
}

/// Emit a log record through the process wide redirector from the call site.
/// The calling function must be annotated with `#[named]` from the
/// `function_name` crate, which provides the function name of the record.
///
/// ```
/// use function_name::named;
/// use iobridge::{logger::LogLevel, maya_log};
///
/// #[named]
/// fn check_disk() {
///     maya_log!(LogLevel::Warn, "disk %d failed", 7i32);
/// }
/// check_disk();
/// ```
#[macro_export]
macro_rules! maya_log {
    ($level:expr, $template:expr $(, $arg:expr)* $(,)?) => {
        $crate::logger::emit(
            $level,
            file!(),
            line!(),
            function_name!(),
            $template,
            &[$($crate::core::printf::Arg::from($arg)),*],
        )
    };
}
