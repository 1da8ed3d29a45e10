//! Logging setup.
//!
//! Binaries call [`init_journald_or_stdout`] once at startup. Library code
//! logs through `use crate::tracing::prelude::*` and never installs a
//! subscriber itself.

use std::fmt;

use time::OffsetDateTime;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{
        FmtContext, FormatEvent, FormatFields,
        format::{DefaultFields, Writer},
        time::FormatTime,
    },
    prelude::*,
    registry::LookupSpan,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Prefix stripped from our own event targets.
const CRATE_TARGET: &str = "spi_temperature::";

/// Whether stderr is the stream systemd set up for the journal.
///
/// `JOURNAL_STREAM` holds `device:inode` of that stream; it is only
/// trusted when it matches what stderr actually is.
#[cfg(target_os = "linux")]
fn stderr_is_journal_stream() -> bool {
    use std::env;
    use std::os::unix::io::AsRawFd;

    use nix::libc;

    let Ok(journal_stream) = env::var("JOURNAL_STREAM") else {
        return false;
    };
    let Some((dev, ino)) = journal_stream.split_once(':') else {
        return false;
    };
    let (Ok(dev), Ok(ino)) = (dev.parse::<u64>(), ino.parse::<u64>()) else {
        return false;
    };

    let fd = std::io::stderr().as_raw_fd();
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut stat) } != 0 {
        return false;
    }

    stat.st_dev as u64 == dev && stat.st_ino as u64 == ino
}

/// Install a subscriber: journald under systemd, stdout otherwise.
pub fn init_journald_or_stdout() {
    #[cfg(target_os = "linux")]
    {
        if stderr_is_journal_stream() {
            match tracing_journald::layer() {
                Ok(layer) => {
                    tracing_subscriber::registry().with(layer).init();
                    return;
                }
                Err(e) => eprintln!("Failed to connect to journald ({}), using stdout", e),
            }
        }
    }

    init_stdout();
}

/// Log to stdout at INFO unless `RUST_LOG` says otherwise.
pub fn init_stdout() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .fmt_fields(DefaultFields::new())
                .event_format(LineFormatter),
        )
        .init();

    trace!("Logging to stdout");
}

/// One line per event: time, level, short target, message, then fields.
struct LineFormatter;

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.push((field.name(), format!("{:?}", value)));
        }
    }
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        LocalTimer.format_time(&mut writer)?;

        let level = match *event.metadata().level() {
            Level::ERROR => "\x1b[31mERROR\x1b[0m",
            Level::WARN => "\x1b[33mWARN \x1b[0m",
            Level::INFO => "\x1b[32mINFO \x1b[0m",
            Level::DEBUG => "\x1b[34mDEBUG\x1b[0m",
            Level::TRACE => "\x1b[35mTRACE\x1b[0m",
        };
        let target = event.metadata().target();
        let target = target.strip_prefix(CRATE_TARGET).unwrap_or(target);
        write!(writer, " {} {}: ", level, target)?;

        if let Some(message) = &visitor.message {
            write!(writer, "{}", message)?;
        }

        let fields: Vec<_> = visitor
            .fields
            .iter()
            .filter(|(name, _)| !name.starts_with("log."))
            .collect();
        if !fields.is_empty() {
            write!(writer, " \x1b[90m")?;
            for (i, (name, value)) in fields.iter().enumerate() {
                if i > 0 {
                    write!(writer, " ")?;
                }
                write!(writer, "{}={}", name, value)?;
            }
            write!(writer, "\x1b[0m")?;
        }

        writeln!(writer)
    }
}

/// Local wall-clock time to the second.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let formatted = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| fmt::Error)?;
        write!(w, "{}", formatted)
    }
}
