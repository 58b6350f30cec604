use crate::qemu_fmt::qemu_write;
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicUsize, Ordering};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("a logger is already installed")]
    AlreadyInstalled(#[from] SetLoggerError),
}

/// Milliseconds since boot, for record prefixes.
pub type ClockFn = fn() -> u64;

/// `log` backend writing to the QEMU debug port.
///
/// Records look like `[   12.345 INFO  kernel_sched::kernel] spawned shell`;
/// the timestamp is omitted until a clock is registered.
pub struct QemuLogger {
    max_level: LevelFilter,
    clock: AtomicUsize,
}

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            clock: AtomicUsize::new(0),
        }
    }

    /// Installs this logger. Call once during early init.
    pub fn init(&'static self) -> Result<(), LoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    /// Starts prefixing records with `clock()`.
    pub fn set_clock(&self, clock: ClockFn) {
        self.clock.store(clock as usize, Ordering::Release);
    }

    fn clock(&self) -> Option<ClockFn> {
        let raw = self.clock.load(Ordering::Acquire);
        // SAFETY: only ever stored from a `ClockFn` in `set_clock`.
        (raw != 0).then(|| unsafe { core::mem::transmute::<usize, ClockFn>(raw) })
    }
}

/// Formats one record the way [`QemuLogger`] prints it.
pub fn format_record(
    out: &mut impl Write,
    uptime_ms: Option<u64>,
    level: Level,
    target: &str,
    args: &fmt::Arguments,
) -> fmt::Result {
    out.write_char('[')?;
    if let Some(ms) = uptime_ms {
        write!(out, "{:>5}.{:03} ", ms / 1000, ms % 1000)?;
    }
    writeln!(out, "{level:<5} {target}] {args}")
}

impl Log for QemuLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let uptime = self.clock().map(|clock| clock());
        qemu_write(format_args!("{}", Formatted { uptime, record }));
    }

    fn flush(&self) {}
}

struct Formatted<'a, 'r> {
    uptime: Option<u64>,
    record: &'a Record<'r>,
}

impl fmt::Display for Formatted<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_record(
            f,
            self.uptime,
            self.record.level(),
            self.record.target(),
            self.record.args(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(uptime: Option<u64>, level: Level, args: fmt::Arguments) -> String {
        let mut out = String::new();
        format_record(&mut out, uptime, level, "kernel", &args).unwrap();
        out
    }

    #[test]
    fn record_without_clock() {
        assert_eq!(
            render(None, Level::Warn, format_args!("low on {}", "memory")),
            "[WARN  kernel] low on memory\n"
        );
    }

    #[test]
    fn record_with_uptime() {
        assert_eq!(
            render(Some(12_345), Level::Info, format_args!("tick")),
            "[   12.345 INFO  kernel] tick\n"
        );
    }

    #[test]
    fn level_filter_applies() {
        let logger = QemuLogger::new(LevelFilter::Info);
        let debug = Metadata::builder().level(Level::Debug).build();
        let error = Metadata::builder().level(Level::Error).build();
        assert!(!logger.enabled(&debug));
        assert!(logger.enabled(&error));
    }

    fn fixed() -> u64 {
        7
    }

    #[test]
    fn clock_is_registered_once_set() {
        let logger = QemuLogger::new(LevelFilter::Trace);
        assert!(logger.clock().is_none());
        logger.set_clock(fixed);
        assert_eq!(logger.clock().map(|c| c()), Some(7));
    }
}
