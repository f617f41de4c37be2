//! The logger facade and its configuration surface.
//!
//! [`TrustLogger`] holds an immutable configuration snapshot (format,
//! source name, sink set). `log` runs the formatter once and fans the
//! resulting records out to every configured sink; `configure` swaps the
//! whole snapshot atomically, so concurrent `log` calls never observe a
//! partially-updated configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::broker::{BrokerConfig, BrokerSink, Producer};
use crate::error::{Result, TrustLogError};
use crate::format::{Payload, RecordFormatter};
use crate::net::SourceIpResolver;
use crate::sink::{ConsoleSink, Delivery, Sink};

/// The record format to apply.
///
/// Formats are a closed registry resolved at configuration time; unknown
/// names are rejected with [`TrustLogError::ConfigurationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    /// The standard audit-record format.
    #[default]
    Standard,
}

impl FormatKind {
    /// Returns the lowercase wire name of this format.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FormatKind {
    type Err = TrustLogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            _ => Err(TrustLogError::ConfigurationError {
                reason: format!("unknown format: {s}"),
            }),
        }
    }
}

/// Broker sink options as they appear on the configuration surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerOptions {
    /// Broker address.
    pub addr: String,
    /// Client identifier announced to the broker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Destination topic.
    pub topic: String,
    /// Per-operation timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl BrokerOptions {
    fn to_config(&self) -> Result<BrokerConfig> {
        let mut config = BrokerConfig::new(&self.addr, &self.topic)?;
        if let Some(client_id) = &self.client_id {
            config = config.with_client_id(client_id);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

/// One configured sink: its kind plus kind-specific options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "options", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Standard-output sink; takes no options.
    Console,
    /// Message-broker sink.
    Broker(BrokerOptions),
}

/// The full logger configuration.
///
/// Read-only once applied; `configure` replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Record format.
    #[serde(default)]
    pub format: FormatKind,
    /// Name of the emitting service.
    pub source: String,
    /// Sinks to deliver each record to, in order.
    pub sinks: Vec<SinkConfig>,
}

impl LoggerConfig {
    /// Creates a configuration with the standard format and no sinks.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            format: FormatKind::Standard,
            source: source.into(),
            sinks: Vec::new(),
        }
    }

    /// Appends a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: SinkConfig) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Parses the JSON configuration surface
    /// `{format, source, sinks: [{kind, options}]}`.
    ///
    /// # Errors
    ///
    /// Returns [`TrustLogError::ConfigurationError`] for malformed JSON,
    /// unknown format or sink names, or missing sink options.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| TrustLogError::ConfigurationError {
            reason: err.to_string(),
        })
    }
}

/// Aggregated outcome of one `log` call.
///
/// The call as a whole succeeds once formatting succeeded; individual sink
/// failures are listed here rather than raised, so one broken sink never
/// hides the outcome of its siblings.
#[derive(Debug, Clone)]
pub struct LogReport {
    /// Number of records produced by the formatter.
    pub records: usize,
    /// One outcome per record per configured sink, in delivery order.
    pub deliveries: Vec<Delivery>,
}

impl LogReport {
    /// Returns true when every sink received every record.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.deliveries.iter().all(Delivery::is_ok)
    }

    /// Returns the failed deliveries.
    #[must_use]
    pub fn failures(&self) -> Vec<&Delivery> {
        self.deliveries.iter().filter(|d| !d.is_ok()).collect()
    }
}

/// Builds broker producers for configured broker sinks.
///
/// The default factory wires in the Kafka client when the `kafka` feature
/// is enabled; tests and alternative broker clients supply their own.
pub type ProducerFactory = Arc<dyn Fn(&BrokerConfig) -> Result<Arc<dyn Producer>> + Send + Sync>;

fn default_producer_factory() -> ProducerFactory {
    Arc::new(|config: &BrokerConfig| {
        #[cfg(feature = "kafka")]
        {
            Ok(Arc::new(crate::broker::KafkaProducer::new(config)) as Arc<dyn Producer>)
        }
        #[cfg(not(feature = "kafka"))]
        {
            let _ = config;
            Err(TrustLogError::ConfigurationError {
                reason: "no broker client available; enable the `kafka` feature or set a \
                         producer factory"
                    .to_string(),
            })
        }
    })
}

/// Everything one `log` call needs, resolved at configuration time.
#[derive(Debug)]
struct Snapshot {
    config: LoggerConfig,
    formatter: RecordFormatter,
    sinks: Vec<Sink>,
}

impl Snapshot {
    fn build(
        config: LoggerConfig,
        producers: &ProducerFactory,
        resolver: &SourceIpResolver,
    ) -> Result<Self> {
        let formatter =
            RecordFormatter::new(&config.source)?.with_resolver(resolver.clone());

        let mut sinks = Vec::with_capacity(config.sinks.len());
        for sink in &config.sinks {
            sinks.push(match sink {
                SinkConfig::Console => Sink::Console(ConsoleSink::new()),
                SinkConfig::Broker(options) => {
                    let broker = options.to_config()?;
                    let producer = producers(&broker)?;
                    Sink::Broker(BrokerSink::new(broker, producer))
                }
            });
        }

        Ok(Self {
            config,
            formatter,
            sinks,
        })
    }
}

/// Configures [`TrustLogger`] construction.
pub struct TrustLoggerBuilder {
    config: LoggerConfig,
    producers: ProducerFactory,
    resolver: SourceIpResolver,
}

impl TrustLoggerBuilder {
    /// Replaces the broker producer factory.
    #[must_use]
    pub fn producer_factory(mut self, producers: ProducerFactory) -> Self {
        self.producers = producers;
        self
    }

    /// Pins the source IP instead of detecting it per call.
    #[must_use]
    pub fn source_ip(mut self, ip: impl Into<String>) -> Self {
        self.resolver = SourceIpResolver::fixed(ip);
        self
    }

    /// Validates the configuration and builds the logger.
    ///
    /// # Errors
    ///
    /// Returns [`TrustLogError::InvalidSource`] or
    /// [`TrustLogError::ConfigurationError`] when the configuration is
    /// rejected; no sink sees any traffic in that case.
    pub fn build(self) -> Result<TrustLogger> {
        let snapshot = Snapshot::build(self.config, &self.producers, &self.resolver)?;
        Ok(TrustLogger {
            inner: RwLock::new(Arc::new(snapshot)),
            producers: self.producers,
            resolver: self.resolver,
        })
    }
}

/// The audit logger facade.
///
/// A single `log` call formats the event once and delivers the resulting
/// record(s) to every configured sink. Sink failures are independent and
/// reported in the returned [`LogReport`].
pub struct TrustLogger {
    inner: RwLock<Arc<Snapshot>>,
    producers: ProducerFactory,
    resolver: SourceIpResolver,
}

impl TrustLogger {
    /// Creates a logger with the default producer factory.
    pub fn new(config: LoggerConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Starts building a logger with custom wiring.
    #[must_use]
    pub fn builder(config: LoggerConfig) -> TrustLoggerBuilder {
        TrustLoggerBuilder {
            config,
            producers: default_producer_factory(),
            resolver: SourceIpResolver::new(),
        }
    }

    /// Returns a copy of the active configuration.
    #[must_use]
    pub fn config(&self) -> LoggerConfig {
        self.inner.read().config.clone()
    }

    /// Replaces the active configuration atomically.
    ///
    /// The new snapshot is fully validated and built before it becomes
    /// visible; concurrent `log` calls see either the old configuration or
    /// the new one, never a mix.
    pub fn configure(&self, config: LoggerConfig) -> Result<()> {
        let snapshot = Snapshot::build(config, &self.producers, &self.resolver)?;
        *self.inner.write() = Arc::new(snapshot);
        debug!("logger reconfigured");
        Ok(())
    }

    /// Logs one audit event.
    ///
    /// Formats the event (one record per affected data item), then
    /// delivers each record to every configured sink. Sinks for one record
    /// run concurrently and are all awaited; a failure in one never stops
    /// the others.
    ///
    /// # Errors
    ///
    /// Returns a formatting error ([`TrustLogError::InvalidCategory`],
    /// [`TrustLogError::InvalidSource`],
    /// [`TrustLogError::MalformedPayload`]) before anything is delivered.
    /// Delivery failures are reported in the [`LogReport`], not raised.
    pub async fn log(&self, category: &str, payload: &Payload) -> Result<LogReport> {
        let snapshot = Arc::clone(&*self.inner.read());
        let records = snapshot.formatter.format(category, payload)?;

        let mut deliveries = Vec::with_capacity(records.len() * snapshot.sinks.len());
        for record in &records {
            let outcomes = join_all(snapshot.sinks.iter().map(|sink| async move {
                match sink.deliver(record).await {
                    Ok(()) => Delivery::ok(sink.kind()),
                    Err(err) => {
                        warn!(sink = %sink.kind(), error = %err, "audit delivery failed");
                        Delivery::failed(sink.kind(), err.to_string())
                    }
                }
            }))
            .await;
            deliveries.extend(outcomes);
        }

        debug!(
            records = records.len(),
            sinks = snapshot.sinks.len(),
            "audit event dispatched"
        );

        Ok(LogReport {
            records: records.len(),
            deliveries,
        })
    }

    /// Logs one audit event supplied as an untyped JSON payload.
    ///
    /// # Errors
    ///
    /// As [`TrustLogger::log`], plus [`TrustLogError::MalformedPayload`]
    /// when a required payload field is missing.
    pub async fn log_value(&self, category: &str, payload: &Value) -> Result<LogReport> {
        let payload = Payload::from_value(payload)?;
        self.log(category, &payload).await
    }
}

impl fmt::Debug for TrustLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.inner.read();
        f.debug_struct("TrustLogger")
            .field("source", &snapshot.config.source)
            .field("sinks", &snapshot.sinks.len())
            .finish_non_exhaustive()
    }
}
