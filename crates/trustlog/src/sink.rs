//! Delivery sinks for formatted audit records.
//!
//! Sinks form a closed, explicit registry: every output mechanism is a
//! variant of [`Sink`], resolved at configuration time. A sink treats the
//! record as read-only and reports failure instead of hanging.

use std::fmt;
use std::io::{self, Write};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::broker::BrokerSink;
use crate::error::{Result, TrustLogError};
use crate::record::AuditRecord;

/// The kind of a configured sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Writes records to standard output.
    Console,
    /// Publishes records to a message-broker topic.
    Broker,
}

impl SinkKind {
    /// Returns the lowercase wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Broker => "broker",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of delivering one record to one sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The sink that processed the record.
    pub sink: SinkKind,
    /// The failure reason, or `None` on success.
    pub error: Option<String>,
}

impl Delivery {
    /// Creates a successful outcome.
    #[must_use]
    pub const fn ok(sink: SinkKind) -> Self {
        Self { sink, error: None }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(sink: SinkKind, reason: impl Into<String>) -> Self {
        Self {
            sink,
            error: Some(reason.into()),
        }
    }

    /// Returns true when delivery succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A configured delivery target.
///
/// The variant set is closed; unknown sink names are rejected with a
/// configuration error before a `Sink` ever exists.
#[derive(Debug)]
pub enum Sink {
    /// Standard-output sink.
    Console(ConsoleSink),
    /// Message-broker sink.
    Broker(BrokerSink),
}

impl Sink {
    /// Returns the kind of this sink.
    #[must_use]
    pub const fn kind(&self) -> SinkKind {
        match self {
            Self::Console(_) => SinkKind::Console,
            Self::Broker(_) => SinkKind::Broker,
        }
    }

    /// Delivers one record to this sink.
    ///
    /// # Errors
    ///
    /// Returns [`TrustLogError::DeliveryFailed`] when the sink could not
    /// accept the record; the record itself is left untouched.
    pub async fn deliver(&self, record: &AuditRecord) -> Result<()> {
        match self {
            Self::Console(sink) => sink.deliver(record),
            Self::Broker(sink) => sink.deliver(record).await,
        }
    }
}

enum ConsoleTarget {
    Stdout,
    Writer(Box<dyn Write + Send>),
}

/// Sink that writes each record as one `+ <json>` line to standard output.
///
/// An injected writer replaces stdout in tests. Write errors surface as
/// [`TrustLogError::DeliveryFailed`]; whether an unusable output stream is
/// fatal is the embedding process's decision.
pub struct ConsoleSink {
    target: Mutex<ConsoleTarget>,
}

impl ConsoleSink {
    /// Creates a sink writing to standard output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            target: Mutex::new(ConsoleTarget::Stdout),
        }
    }

    /// Creates a sink writing to the given writer instead of stdout.
    #[must_use]
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            target: Mutex::new(ConsoleTarget::Writer(writer)),
        }
    }

    fn deliver(&self, record: &AuditRecord) -> Result<()> {
        let line = record.console_line()?;
        let mut target = self.target.lock();
        let written = match &mut *target {
            ConsoleTarget::Stdout => {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                writeln!(handle, "{line}").and_then(|()| handle.flush())
            }
            ConsoleTarget::Writer(writer) => writeln!(writer, "{line}"),
        };
        drop(target);

        written.map_err(|err| TrustLogError::DeliveryFailed {
            sink: SinkKind::Console,
            reason: err.to_string(),
        })?;
        debug!(sink = %SinkKind::Console, "audit record delivered");
        Ok(())
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &*self.target.lock() {
            ConsoleTarget::Stdout => "stdout",
            ConsoleTarget::Writer(_) => "writer",
        };
        f.debug_struct("ConsoleSink").field("target", &target).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Category, Status};
    use std::sync::Arc;

    fn sample_record() -> AuditRecord {
        AuditRecord {
            time: "2024-05-01T12:00:00.000Z".parse().unwrap(),
            source_name: "user-service".to_string(),
            source_ip: "203.0.113.7".to_string(),
            user_name: "alice".to_string(),
            user_ip: "1.2.3.4".to_string(),
            session: "s1".to_string(),
            category: Category::Login,
            priority: 1,
            status: Status::Success,
            data_owner: "-".to_string(),
            data_id: "-".to_string(),
            data_name: None,
            reason: "login".to_string(),
        }
    }

    /// Shared buffer writer so tests can inspect what the sink wrote.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Writer that always fails.
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"))
        }
    }

    #[test]
    fn sink_kind_wire_names() {
        assert_eq!(SinkKind::Console.to_string(), "console");
        assert_eq!(SinkKind::Broker.to_string(), "broker");
        assert_eq!(serde_json::to_string(&SinkKind::Broker).unwrap(), "\"broker\"");
    }

    #[test]
    fn delivery_outcomes() {
        let ok = Delivery::ok(SinkKind::Console);
        assert!(ok.is_ok());
        let failed = Delivery::failed(SinkKind::Broker, "timeout");
        assert!(!failed.is_ok());
        assert_eq!(failed.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn console_sink_writes_one_prefixed_line() {
        let buffer = SharedBuffer::default();
        let sink = Sink::Console(ConsoleSink::with_writer(Box::new(buffer.clone())));

        let record = sample_record();
        sink.deliver(&record).await.unwrap();

        let written = buffer.contents();
        assert!(written.starts_with("+ {\"time\":"));
        assert!(written.ends_with("}\n"));
        assert_eq!(written.trim_end(), record.console_line().unwrap());
        assert_eq!(written.lines().count(), 1);
    }

    #[tokio::test]
    async fn console_sink_surfaces_stream_errors() {
        let sink = ConsoleSink::with_writer(Box::new(BrokenPipe));
        let err = sink.deliver(&sample_record()).unwrap_err();
        assert!(matches!(
            err,
            TrustLogError::DeliveryFailed {
                sink: SinkKind::Console,
                ..
            }
        ));
    }

    #[test]
    fn sinks_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConsoleSink>();
        assert_send_sync::<Sink>();
    }
}
