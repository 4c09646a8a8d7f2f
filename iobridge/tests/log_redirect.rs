use std::{ffi::CString, sync::Arc};

use function_name::named;

use iobridge::{
    core::printf::Arg,
    logger::{self, LogLevel, TrampolineSink},
    maya_log,
};
use iobridge_sys::{
    maya_logf,
    MAYA_LOG_BUF_LEN,
    SPDK_LOG_DISABLED,
    SPDK_LOG_NOTICE,
    SPDK_LOG_WARN,
};
use parking_lot::Mutex;

pub mod common;
use common::{redirect_lock, Captured, CollectingSink};

#[test]
fn disk_failure_is_delivered_once() {
    let _lock = redirect_lock();
    let sink = CollectingSink::registered();

    logger::emit(
        LogLevel::Warn,
        "x.c",
        42,
        "f",
        "disk %d failed",
        &[Arg::from(7i32)],
    );

    assert_eq!(
        sink.records(),
        vec![Captured {
            level: LogLevel::Warn,
            file: "x.c".into(),
            line: 42,
            function: "f".into(),
            message: "disk 7 failed".into(),
            rendered_len: 13,
        }]
    );
}

#[test]
fn oversized_messages_are_truncated() {
    let _lock = redirect_lock();
    let sink = CollectingSink::registered();

    let long = "x".repeat(2000);
    logger::emit(LogLevel::Info, "x.c", 1, "f", "%s", &[Arg::from(&long)]);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message.len(), MAYA_LOG_BUF_LEN - 1);
    assert_eq!(records[0].rendered_len, 2000);
}

#[test]
fn nothing_happens_after_the_sink_is_gone() {
    let _lock = redirect_lock();
    let sink = CollectingSink::registered();
    let weak = Arc::downgrade(&sink);
    drop(sink);

    logger::emit(LogLevel::Error, "x.c", 1, "f", "gone", &[]);
    assert!(weak.upgrade().is_none());
    assert!(!logger::redirector().has_sink());
}

#[test]
#[named]
fn replacing_the_sink() {
    let _lock = redirect_lock();
    let first = CollectingSink::registered();
    let second = CollectingSink::registered();

    maya_log!(LogLevel::Info, "%s and %s", "this", "that");

    assert!(first.records().is_empty());
    let records = second.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "this and that");
    assert_eq!(records[0].function, "replacing_the_sink");
    assert!(records[0].file.ends_with("log_redirect.rs"));
}

fn native_log(level: i32, file: &str, line: i32, func: &str, fmt: &str) {
    let file = CString::new(file).unwrap();
    let func = CString::new(func).unwrap();
    let fmt = CString::new(fmt).unwrap();
    unsafe {
        maya_logf(
            level,
            file.as_ptr(),
            line,
            func.as_ptr(),
            fmt.as_ptr(),
            7 as libc::c_int,
        );
    }
}

#[test]
fn engine_records_reach_the_sink() {
    let _lock = redirect_lock();
    logger::install();
    let sink = CollectingSink::registered();

    native_log(SPDK_LOG_WARN, "x.c", 42, "f", "disk %d failed");

    assert_eq!(
        sink.records(),
        vec![Captured {
            level: LogLevel::Warn,
            file: "x.c".into(),
            line: 42,
            function: "f".into(),
            message: "disk 7 failed".into(),
            rendered_len: 13,
        }]
    );
}

#[test]
fn engine_records_are_truncated_to_the_buffer() {
    let _lock = redirect_lock();
    logger::install();
    let sink = CollectingSink::registered();

    let fmt = format!("{}%d", "y".repeat(1999));
    native_log(SPDK_LOG_NOTICE, "x.c", 1, "f", &fmt);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, LogLevel::Notice);
    assert_eq!(records[0].message, "y".repeat(MAYA_LOG_BUF_LEN - 1));
    assert_eq!(records[0].rendered_len, 2000);
}

#[test]
fn disabled_engine_records_are_dropped() {
    let _lock = redirect_lock();
    logger::install();
    let sink = CollectingSink::registered();

    native_log(SPDK_LOG_DISABLED, "x.c", 1, "f", "quiet");
    native_log(99, "x.c", 2, "f", "odd level");

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, LogLevel::Error);
    assert_eq!(records[0].line, 2);
}

static SEEN: Mutex<Vec<(i32, u32, String, i32)>> =
    parking_lot::const_mutex(Vec::new());

extern "C" fn capture(
    level: i32,
    _file: *const libc::c_char,
    line: u32,
    _func: *const libc::c_char,
    buf: *const libc::c_char,
    n: i32,
) {
    let msg = unsafe { std::ffi::CStr::from_ptr(buf) }
        .to_string_lossy()
        .into_owned();
    SEEN.lock().push((level, line, msg, n));
}

#[test]
fn records_can_be_handed_to_c() {
    let _lock = redirect_lock();
    let sink = Arc::new(TrampolineSink::new(Some(capture)).unwrap());
    logger::register_sink(&sink);

    logger::emit(LogLevel::Warn, "x.c", 42, "f", "disk %d failed", &[Arg::from(7i32)]);

    assert_eq!(
        SEEN.lock().as_slice(),
        &[(SPDK_LOG_WARN, 42, "disk 7 failed".to_string(), 13)]
    );
    assert!(TrampolineSink::new(None).is_none());
}
