//! # trustlog
//!
//! Risk-ranked audit-event logging with pluggable delivery sinks.
//!
//! Application code reports a security-relevant action together with the
//! acting user, the data owner, and an outcome; `trustlog` produces a
//! standardized, risk-ranked [`AuditRecord`] and delivers it to every
//! configured sink (a message-broker topic, the console).
//!
//! ## Features
//!
//! - [`RecordFormatter`] — validates the payload contract, normalizes the
//!   category, and derives a priority from category and ownership
//!   (cross-owner access always escalates to the maximum of 4)
//! - [`Sink`] — a closed registry of delivery targets: [`ConsoleSink`] and
//!   [`BrokerSink`]
//! - [`TrustLogger`] — facade that formats once and fans out to every
//!   sink, isolating failures per sink
//! - `kafka` cargo feature — wires in an `rdkafka`-backed [`Producer`] for
//!   broker sinks
//!
//! ## Example
//!
//! ```rust,no_run
//! use trustlog::{DataItem, LoggerConfig, Payload, SinkConfig, Status, TrustLogger};
//!
//! # async fn example() -> trustlog::Result<()> {
//! let config = LoggerConfig::new("user-service").with_sink(SinkConfig::Console);
//! let logger = TrustLogger::new(config)?;
//!
//! let payload = Payload::new("alice", "1.2.3.4", "s1", Status::Success, "requested")
//!     .with_data(DataItem::new("bob", "d1"));
//!
//! let report = logger.log("share", &payload).await?;
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod error;
pub mod format;
pub mod logger;
pub mod net;
pub mod record;
pub mod request;
pub mod sink;

// Re-export primary public types at the crate root for convenience.
#[cfg(feature = "kafka")]
pub use broker::KafkaProducer;
pub use broker::{BrokerConfig, BrokerSink, Producer, ROUTING_KEY};
pub use error::{Result, TrustLogError};
pub use format::{DataItem, NO_DATA, Payload, RecordFormatter, priority_for};
pub use logger::{
    BrokerOptions, FormatKind, LogReport, LoggerConfig, ProducerFactory, SinkConfig, TrustLogger,
};
pub use net::SourceIpResolver;
pub use record::{AuditRecord, Category, Status};
pub use request::Identity;
pub use sink::{ConsoleSink, Delivery, Sink, SinkKind};
