use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

use iobridge::logger::{LogForwarder, LogLevel, LogRecord, LogSink};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Forwarded {
    level: Level,
    target: String,
    message: String,
    file: Option<String>,
    line: Option<u32>,
    module: Option<String>,
}

struct Capture(Mutex<Vec<Forwarded>>);

impl Log for Capture {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if record.target() != "iobridge::engine" {
            return;
        }
        self.0.lock().push(Forwarded {
            level: record.level(),
            target: record.target().into(),
            message: record.args().to_string(),
            file: record.file().map(Into::into),
            line: record.line(),
            module: record.module_path().map(Into::into),
        });
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture(parking_lot::const_mutex(Vec::new()));

fn record(level: LogLevel, line: u32, message: &str) -> LogRecord<'_> {
    LogRecord {
        level,
        file: "bdev.c",
        line,
        function: "bdev_open",
        message,
        rendered_len: message.len(),
    }
}

// single test, the logger and the max level are process wide
#[test]
fn engine_records_are_republished() {
    log::set_logger(&CAPTURE).unwrap();
    log::set_max_level(LevelFilter::Info);

    let forwarder = LogForwarder::default();
    forwarder.log(&record(LogLevel::Error, 1, "open failed\n"));
    forwarder.log(&record(LogLevel::Warn, 2, "slow device"));
    forwarder.log(&record(LogLevel::Info, 3, "opened"));
    // NOTICE maps to debug and DEBUG to trace, both below the max level
    forwarder.log(&record(LogLevel::Notice, 4, "noise"));
    forwarder.log(&record(LogLevel::Debug, 5, "more noise"));

    let seen = CAPTURE.0.lock().clone();
    assert_eq!(
        seen.iter().map(|f| f.level).collect::<Vec<_>>(),
        vec![Level::Error, Level::Warn, Level::Info]
    );
    assert_eq!(
        seen[0],
        Forwarded {
            level: Level::Error,
            target: "iobridge::engine".into(),
            message: "open failed".into(),
            file: Some("bdev.c".into()),
            line: Some(1),
            module: Some("bdev_open".into()),
        }
    );
    assert_eq!(seen[2].message, "opened");

    CAPTURE.0.lock().clear();
    log::set_max_level(LevelFilter::Trace);
    forwarder.log(&record(LogLevel::Notice, 6, "notice"));
    forwarder.log(&record(LogLevel::Debug, 7, "debug"));

    assert_eq!(
        CAPTURE
            .0
            .lock()
            .iter()
            .map(|f| (f.level, f.line))
            .collect::<Vec<_>>(),
        vec![(Level::Debug, Some(6)), (Level::Trace, Some(7))]
    );
}
