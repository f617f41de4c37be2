//! Message-broker delivery.
//!
//! The broker client is an opaque collaborator behind the [`Producer`]
//! trait: the sink only ever asks it to connect, publish one message, and
//! disconnect. [`BrokerSink`] owns the delivery semantics: every step runs
//! under the configured timeout and the connection is released on every
//! exit path. Retry and backoff are deliberately not implemented here.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, TrustLogError};
use crate::record::AuditRecord;
use crate::sink::SinkKind;

/// Routing key attached to every published record.
pub const ROUTING_KEY: &str = "log";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Boxed future returned by [`Producer`] operations.
pub type ProducerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// An opaque broker client.
///
/// Implementations manage their own wire protocol and connection state;
/// the sink drives them through this narrow surface. Operations must be
/// cancel-safe: the sink bounds each one with a timeout and drops the
/// future on expiry.
pub trait Producer: Send + Sync + fmt::Debug {
    /// Acquires a connection to the broker.
    fn connect(&self) -> ProducerFuture<'_>;

    /// Publishes one message to `topic` with the given routing key.
    fn send<'a>(&'a self, topic: &'a str, key: &'a str, payload: &'a [u8]) -> ProducerFuture<'a>;

    /// Releases the connection. Must be safe to call after a failed
    /// connect or send.
    fn disconnect(&self) -> ProducerFuture<'_>;
}

/// Connection parameters for a broker sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Broker address, e.g. `localhost:9092`.
    pub addr: String,
    /// Client identifier announced to the broker.
    pub client_id: Option<String>,
    /// Destination topic for audit records.
    pub topic: String,
    /// Per-operation timeout for connect, publish, and disconnect.
    pub timeout: Duration,
}

impl BrokerConfig {
    /// Creates a configuration with the default timeout and no client id.
    ///
    /// # Errors
    ///
    /// Returns [`TrustLogError::ConfigurationError`] when the address or
    /// topic is empty.
    pub fn new(addr: impl Into<String>, topic: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let topic = topic.into();
        if addr.trim().is_empty() {
            return Err(TrustLogError::ConfigurationError {
                reason: "broker address cannot be empty".to_string(),
            });
        }
        if topic.trim().is_empty() {
            return Err(TrustLogError::ConfigurationError {
                reason: "broker topic cannot be empty".to_string(),
            });
        }
        Ok(Self {
            addr,
            client_id: None,
            topic,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Sets the client identifier.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Sink that publishes each record to a broker topic.
///
/// `deliver` is a scoped operation: connect, publish one message whose
/// payload is the canonical record serialization and whose key is
/// [`ROUTING_KEY`], then disconnect unconditionally. No connection is kept
/// across calls.
#[derive(Debug)]
pub struct BrokerSink {
    config: BrokerConfig,
    producer: Arc<dyn Producer>,
}

impl BrokerSink {
    /// Creates a sink over the given producer.
    #[must_use]
    pub fn new(config: BrokerConfig, producer: Arc<dyn Producer>) -> Self {
        Self { config, producer }
    }

    /// Returns the sink configuration.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Delivers one record to the configured topic.
    ///
    /// # Errors
    ///
    /// Returns [`TrustLogError::DeliveryFailed`] when connecting or
    /// publishing fails or times out. The connection is released on every
    /// exit path.
    pub async fn deliver(&self, record: &AuditRecord) -> Result<()> {
        let outcome = self.publish(record).await;

        // Release the connection no matter how publishing went. After a
        // successful publish the message is already on the wire, so a
        // disconnect error only gets logged.
        if let Err(reason) = bounded(self.config.timeout, self.producer.disconnect()).await {
            if outcome.is_ok() {
                warn!(topic = %self.config.topic, %reason, "broker disconnect failed after publish");
            }
        }

        match outcome {
            Ok(()) => {
                debug!(topic = %self.config.topic, "audit record published");
                Ok(())
            }
            Err(reason) => Err(TrustLogError::DeliveryFailed {
                sink: SinkKind::Broker,
                reason,
            }),
        }
    }

    async fn publish(&self, record: &AuditRecord) -> std::result::Result<(), String> {
        let payload = record.to_json().map_err(|err| err.to_string())?;

        bounded(self.config.timeout, self.producer.connect()).await?;
        bounded(
            self.config.timeout,
            self.producer
                .send(&self.config.topic, ROUTING_KEY, payload.as_bytes()),
        )
        .await
    }
}

async fn bounded(
    limit: Duration,
    operation: ProducerFuture<'_>,
) -> std::result::Result<(), String> {
    match tokio::time::timeout(limit, operation).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("broker operation timed out after {limit:?}")),
    }
}

#[cfg(feature = "kafka")]
pub use kafka::KafkaProducer;

#[cfg(feature = "kafka")]
mod kafka {
    //! Kafka implementation of the opaque [`Producer`] contract.

    use super::{BrokerConfig, Producer, ProducerFuture};
    use crate::error::TrustLogError;
    use crate::sink::SinkKind;

    use std::fmt;
    use std::time::Duration;

    use parking_lot::Mutex;
    use rdkafka::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
    use rdkafka::util::Timeout;

    /// Kafka producer driven through `rdkafka`.
    ///
    /// `connect` builds the underlying client; `disconnect` flushes any
    /// in-flight messages and drops it.
    pub struct KafkaProducer {
        addr: String,
        client_id: Option<String>,
        inner: Mutex<Option<FutureProducer>>,
    }

    impl KafkaProducer {
        /// Creates a producer for the given broker configuration.
        #[must_use]
        pub fn new(config: &BrokerConfig) -> Self {
            Self {
                addr: config.addr.clone(),
                client_id: config.client_id.clone(),
                inner: Mutex::new(None),
            }
        }

        fn failure(reason: impl fmt::Display) -> TrustLogError {
            TrustLogError::DeliveryFailed {
                sink: SinkKind::Broker,
                reason: reason.to_string(),
            }
        }
    }

    impl fmt::Debug for KafkaProducer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("KafkaProducer")
                .field("addr", &self.addr)
                .field("client_id", &self.client_id)
                .finish_non_exhaustive()
        }
    }

    impl Producer for KafkaProducer {
        fn connect(&self) -> ProducerFuture<'_> {
            Box::pin(async move {
                let mut config = ClientConfig::new();
                config.set("bootstrap.servers", &self.addr);
                if let Some(client_id) = &self.client_id {
                    config.set("client.id", client_id);
                }
                let producer: FutureProducer = config.create().map_err(Self::failure)?;
                *self.inner.lock() = Some(producer);
                Ok(())
            })
        }

        fn send<'a>(
            &'a self,
            topic: &'a str,
            key: &'a str,
            payload: &'a [u8],
        ) -> ProducerFuture<'a> {
            Box::pin(async move {
                // Clone out of the lock; the guard must not live across
                // the await below.
                let producer = self
                    .inner
                    .lock()
                    .clone()
                    .ok_or_else(|| Self::failure("producer is not connected"))?;

                producer
                    .send(
                        FutureRecord::to(topic).key(key).payload(payload),
                        Timeout::Never,
                    )
                    .await
                    .map(|_| ())
                    .map_err(|(err, _)| Self::failure(err))
            })
        }

        fn disconnect(&self) -> ProducerFuture<'_> {
            Box::pin(async move {
                if let Some(producer) = self.inner.lock().take() {
                    producer
                        .flush(Timeout::After(Duration::from_secs(5)))
                        .map_err(Self::failure)?;
                }
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Category, Status};
    use parking_lot::Mutex;

    fn sample_record() -> AuditRecord {
        AuditRecord {
            time: "2024-05-01T12:00:00.000Z".parse().unwrap(),
            source_name: "user-service".to_string(),
            source_ip: "203.0.113.7".to_string(),
            user_name: "alice".to_string(),
            user_ip: "1.2.3.4".to_string(),
            session: "s1".to_string(),
            category: Category::Store,
            priority: 1,
            status: Status::Success,
            data_owner: "alice".to_string(),
            data_id: "d1".to_string(),
            data_name: None,
            reason: "saved".to_string(),
        }
    }

    /// Producer double that records every operation it sees.
    #[derive(Debug, Default)]
    struct RecordingProducer {
        ops: Mutex<Vec<String>>,
        fail_connect: bool,
        fail_send: bool,
    }

    impl RecordingProducer {
        fn failing_send() -> Self {
            Self {
                fail_send: true,
                ..Self::default()
            }
        }

        fn failing_connect() -> Self {
            Self {
                fail_connect: true,
                ..Self::default()
            }
        }

        fn ops(&self) -> Vec<String> {
            self.ops.lock().clone()
        }

        fn fail(reason: &str) -> TrustLogError {
            TrustLogError::DeliveryFailed {
                sink: SinkKind::Broker,
                reason: reason.to_string(),
            }
        }
    }

    impl Producer for RecordingProducer {
        fn connect(&self) -> ProducerFuture<'_> {
            Box::pin(async move {
                self.ops.lock().push("connect".to_string());
                if self.fail_connect {
                    return Err(Self::fail("connection refused"));
                }
                Ok(())
            })
        }

        fn send<'a>(
            &'a self,
            topic: &'a str,
            key: &'a str,
            payload: &'a [u8],
        ) -> ProducerFuture<'a> {
            Box::pin(async move {
                let payload = String::from_utf8_lossy(payload).to_string();
                self.ops.lock().push(format!("send {topic} {key} {payload}"));
                if self.fail_send {
                    return Err(Self::fail("partition unavailable"));
                }
                Ok(())
            })
        }

        fn disconnect(&self) -> ProducerFuture<'_> {
            Box::pin(async move {
                self.ops.lock().push("disconnect".to_string());
                Ok(())
            })
        }
    }

    /// Producer whose send never completes.
    #[derive(Debug, Default)]
    struct StalledProducer {
        ops: Mutex<Vec<String>>,
    }

    impl Producer for StalledProducer {
        fn connect(&self) -> ProducerFuture<'_> {
            Box::pin(async move {
                self.ops.lock().push("connect".to_string());
                Ok(())
            })
        }

        fn send<'a>(
            &'a self,
            _topic: &'a str,
            _key: &'a str,
            _payload: &'a [u8],
        ) -> ProducerFuture<'a> {
            Box::pin(futures::future::pending::<Result<()>>())
        }

        fn disconnect(&self) -> ProducerFuture<'_> {
            Box::pin(async move {
                self.ops.lock().push("disconnect".to_string());
                Ok(())
            })
        }
    }

    fn sink_with(producer: Arc<dyn Producer>) -> BrokerSink {
        let config = BrokerConfig::new("localhost:9092", "audit")
            .unwrap()
            .with_client_id("user-service")
            .with_timeout(Duration::from_millis(50));
        BrokerSink::new(config, producer)
    }

    // ===================
    // BrokerConfig Tests
    // ===================

    #[test]
    fn config_rejects_empty_addr() {
        let err = BrokerConfig::new("", "audit").unwrap_err();
        assert!(matches!(err, TrustLogError::ConfigurationError { .. }));
    }

    #[test]
    fn config_rejects_empty_topic() {
        let err = BrokerConfig::new("localhost:9092", "  ").unwrap_err();
        assert!(matches!(err, TrustLogError::ConfigurationError { .. }));
    }

    #[test]
    fn config_defaults() {
        let config = BrokerConfig::new("localhost:9092", "audit").unwrap();
        assert_eq!(config.client_id, None);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    // ===================
    // Delivery Tests
    // ===================

    #[tokio::test]
    async fn deliver_publishes_then_disconnects() {
        let producer = Arc::new(RecordingProducer::default());
        let sink = sink_with(Arc::clone(&producer) as Arc<dyn Producer>);

        let record = sample_record();
        sink.deliver(&record).await.unwrap();

        let expected_send = format!("send audit log {}", record.to_json().unwrap());
        assert_eq!(
            producer.ops(),
            vec!["connect".to_string(), expected_send, "disconnect".to_string()]
        );
    }

    #[tokio::test]
    async fn publish_failure_still_releases_connection() {
        let producer = Arc::new(RecordingProducer::failing_send());
        let sink = sink_with(Arc::clone(&producer) as Arc<dyn Producer>);

        let err = sink.deliver(&sample_record()).await.unwrap_err();
        assert!(matches!(
            err,
            TrustLogError::DeliveryFailed {
                sink: SinkKind::Broker,
                ..
            }
        ));
        assert_eq!(producer.ops().last().map(String::as_str), Some("disconnect"));
    }

    #[tokio::test]
    async fn connect_failure_still_releases_connection() {
        let producer = Arc::new(RecordingProducer::failing_connect());
        let sink = sink_with(Arc::clone(&producer) as Arc<dyn Producer>);

        let err = sink.deliver(&sample_record()).await.unwrap_err();
        assert!(matches!(err, TrustLogError::DeliveryFailed { .. }));
        assert_eq!(
            producer.ops(),
            vec!["connect".to_string(), "disconnect".to_string()]
        );
    }

    #[tokio::test]
    async fn stalled_publish_times_out_and_releases_connection() {
        let producer = Arc::new(StalledProducer::default());
        let sink = sink_with(Arc::clone(&producer) as Arc<dyn Producer>);

        let err = sink.deliver(&sample_record()).await.unwrap_err();
        match err {
            TrustLogError::DeliveryFailed { sink, reason } => {
                assert_eq!(sink, SinkKind::Broker);
                assert!(reason.contains("timed out"), "unexpected reason: {reason}");
            }
            other => panic!("expected DeliveryFailed, got {other:?}"),
        }
        assert_eq!(
            producer.ops.lock().clone(),
            vec!["connect".to_string(), "disconnect".to_string()]
        );
    }
}
