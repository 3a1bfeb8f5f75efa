//! MQTT transport backed by rumqttc
//!
//! Each `open()` builds a fresh client and event loop so the worker's own
//! backoff state machine governs reconnection; rumqttc's internal retry
//! never runs because a lost connection is torn down and reopened from
//! scratch.

use std::fs;
use std::time::Duration;

use rumqttc::{Client, Connection, Event, MqttOptions, Packet, TlsConfiguration, Transport};

use crate::config::BrokerConfig;
use crate::error::{Result, ResultExt, TwinLinkError};
use crate::link::transport::{BrokerTransport, TransportEvent};
use crate::types::QosLevel;

/// Outbound channel capacity handed to rumqttc; the crate's own bounded
/// queues sit in front of this, so it only needs headroom for a flush
/// burst.
const CLIENT_CHANNEL_CAPACITY: usize = 128;

pub struct MqttTransport {
    config: BrokerConfig,
    session: Option<(Client, Connection)>,
}

impl MqttTransport {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Unique-enough client id: configured prefix plus pid and timestamp,
    /// so parallel instances against one broker do not evict each other.
    fn client_id(&self) -> String {
        format!(
            "{}-{}-{}",
            self.config.client_id_prefix,
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        )
    }

    fn build_options(&self) -> Result<MqttOptions> {
        let mut options = MqttOptions::new(self.client_id(), &self.config.host, self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            options.set_credentials(username.clone(), password.clone());
        }
        if self.config.tls.enabled {
            let ca_path = self.config.tls.ca_cert.as_ref().ok_or_else(|| {
                TwinLinkError::Config("tls enabled but no CA certificate configured".into())
            })?;
            let ca = fs::read(ca_path).context("reading CA certificate")?;
            let client_auth = match (&self.config.tls.client_cert, &self.config.tls.client_key) {
                (Some(cert), Some(key)) => Some((
                    fs::read(cert).context("reading client certificate")?,
                    fs::read(key).context("reading client key")?,
                )),
                (None, None) => None,
                _ => {
                    return Err(TwinLinkError::Config(
                        "client_cert and client_key must be configured together".into(),
                    ))
                }
            };
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth,
            }));
        }
        Ok(options)
    }
}

impl BrokerTransport for MqttTransport {
    fn open(&mut self) -> Result<()> {
        self.close();
        let options = self.build_options()?;
        tracing::debug!(
            host = %self.config.host,
            port = self.config.port,
            tls = self.config.tls.enabled,
            "opening broker connection"
        );
        self.session = Some(Client::new(options, CLIENT_CHANNEL_CAPACITY));
        Ok(())
    }

    fn close(&mut self) {
        if let Some((client, _connection)) = self.session.take() {
            // best effort; the session is dropped either way
            let _ = client.disconnect();
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QosLevel, retain: bool) -> Result<()> {
        let (client, _) = self.session.as_mut().ok_or(TwinLinkError::NotConnected)?;
        client.publish(topic, qos.into(), retain, payload)?;
        Ok(())
    }

    fn subscribe(&mut self, pattern: &str, qos: QosLevel) -> Result<()> {
        let (client, _) = self.session.as_mut().ok_or(TwinLinkError::NotConnected)?;
        client.subscribe(pattern, qos.into())?;
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Option<TransportEvent> {
        let (_, connection) = self.session.as_mut()?;
        match connection.recv_timeout(timeout) {
            Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => Some(TransportEvent::Connected),
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => Some(TransportEvent::Message {
                topic: publish.topic.clone(),
                payload: publish.payload.to_vec(),
                qos: publish.qos.into(),
                retain: publish.retain,
            }),
            Ok(Ok(_)) => None,
            Ok(Err(err)) => Some(TransportEvent::ConnectionLost(err.to_string())),
            Err(_timeout) => None,
        }
    }
}
