//! Startup configuration, resolved once from flags and environment.
//!
use std::{
    collections::HashSet,
    net::{SocketAddr, ToSocketAddrs},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use common::labels::split_labels;

use crate::{connector::ReconnectPolicy, error::RelayError};

const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default limit for prediction bodies and inbound broker payloads.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[clap(author, version)]
pub struct Args {
    /// Topic whose messages are cached for `GET /get-data`
    #[clap(long, env = "MQTT_TOPIC_SUBS")]
    pub subscribe_topic: String,

    /// Topic that `POST /prediction` payloads are published to
    #[clap(long, env = "MQTT_TOPIC_PUBLISH")]
    pub publish_topic: String,

    /// Broker address as `host`, `host:port` or `mqtt://host[:port]`
    #[clap(long, env = "MQTT_BROKER", default_value = "test.mosquitto.org:1883")]
    pub broker: String,

    /// Client id presented to the broker (defaults to one derived from the pid)
    #[clap(long, env = "MQTT_CLIENT_ID")]
    pub client_id: Option<String>,

    /// MQTT keep-alive in seconds
    #[clap(long, env = "MQTT_KEEP_ALIVE_SECS", default_value_t = 30)]
    pub keep_alive_secs: u64,

    /// Address or hostname the HTTP server listens on
    #[clap(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port the HTTP server listens on
    #[clap(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Public URL prefix, only used in the startup log line
    #[clap(long, env = "APP_URL")]
    pub app_url: Option<String>,

    /// Directory served at `/`
    #[clap(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Comma-separated list of accepted labels; any text is accepted when unset
    #[clap(long, env = "ALLOWED_LABELS")]
    pub allowed_labels: Option<String>,

    /// Largest accepted payload in bytes, for both directions
    #[clap(long, env = "MAX_PAYLOAD_BYTES", default_value_t = DEFAULT_MAX_PAYLOAD_BYTES)]
    pub max_payload_bytes: usize,

    /// Delay before the first reconnect attempt, in milliseconds
    #[clap(long, env = "RECONNECT_INITIAL_MS", default_value_t = 1000)]
    pub reconnect_initial_ms: u64,

    /// Upper bound for the reconnect delay, in milliseconds
    #[clap(long, env = "RECONNECT_MAX_MS", default_value_t = 30_000)]
    pub reconnect_max_ms: u64,

    /// Give up after this many failed attempts in a row (retry forever when unset)
    #[clap(long, env = "RECONNECT_MAX_ATTEMPTS")]
    pub reconnect_max_attempts: Option<u32>,
}

/// The two fixed topics of the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub subscribe: String,
    pub publish: String,
}

/// Broker endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub fn parse(address: &str) -> Result<Self, RelayError> {
        let address = address.trim();
        let address = address.strip_prefix("mqtt://").unwrap_or(address);
        let address = address.trim_end_matches('/');

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| RelayError::Config(format!("invalid broker port '{port}'")))?;
                (host, port)
            }
            None => (address, DEFAULT_MQTT_PORT),
        };

        if host.is_empty() {
            return Err(RelayError::Config("broker host is empty".into()));
        }

        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub address: BrokerAddress,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Largest payload sent or accepted on the session.
    pub max_payload: usize,
}

/// Accepted labels for `POST /prediction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVocabulary {
    labels: HashSet<String>,
}

impl LabelVocabulary {
    pub fn parse(list: &str) -> Option<Self> {
        let labels: HashSet<String> = split_labels(list).map(str::to_owned).collect();
        (!labels.is_empty()).then_some(Self { labels })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

/// Fully resolved configuration of the relay process.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub topics: TopicConfig,
    pub broker: BrokerSettings,
    pub listen: SocketAddr,
    pub app_url: Option<String>,
    pub static_dir: Option<PathBuf>,
    pub vocabulary: Option<LabelVocabulary>,
    pub reconnect: ReconnectPolicy,
}

impl Args {
    pub fn into_config(self) -> Result<RelayConfig, RelayError> {
        let subscribe = self.subscribe_topic.trim().to_owned();
        let publish = self.publish_topic.trim().to_owned();
        if subscribe.is_empty() || publish.is_empty() {
            return Err(RelayError::Config(
                "subscribe and publish topics must not be empty".into(),
            ));
        }

        if publish.contains(|c| c == '+' || c == '#') {
            return Err(RelayError::Config(format!(
                "publish topic '{publish}' must not contain wildcards"
            )));
        }

        if self.max_payload_bytes == 0 {
            return Err(RelayError::Config("max payload must not be zero".into()));
        }

        if self.reconnect_max_ms < self.reconnect_initial_ms {
            return Err(RelayError::Config(
                "reconnect max delay is shorter than the initial delay".into(),
            ));
        }

        let client_id = self
            .client_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("mqtt-relay-{}", std::process::id()));

        Ok(RelayConfig {
            topics: TopicConfig { subscribe, publish },
            broker: BrokerSettings {
                address: BrokerAddress::parse(&self.broker)?,
                client_id,
                keep_alive: Duration::from_secs(self.keep_alive_secs.max(5)),
                max_payload: self.max_payload_bytes,
            },
            listen: resolve_listen_address(&self.host, self.port)?,
            app_url: self.app_url,
            static_dir: self.static_dir,
            vocabulary: self.allowed_labels.as_deref().and_then(LabelVocabulary::parse),
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(self.reconnect_initial_ms),
                max_delay: Duration::from_millis(self.reconnect_max_ms),
                max_attempts: self.reconnect_max_attempts,
            },
        })
    }
}

fn resolve_listen_address(host: &str, port: u16) -> Result<SocketAddr, RelayError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| RelayError::Config(format!("cannot resolve listen host '{host}': {e}")))?
        .next()
        .ok_or_else(|| RelayError::Config(format!("listen host '{host}' has no address")))
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(extra: &[&str]) -> Result<RelayConfig, RelayError> {
        let mut argv = vec![
            "relay_server",
            "--subscribe-topic",
            "door/commands",
            "--publish-topic",
            "camera/predictions",
            "--broker",
            "mqtt://test.mosquitto.org",
            "--port",
            "3000",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap().into_config()
    }

    #[test]
    fn test_broker_address_forms() {
        assert_eq!(
            BrokerAddress::parse("mqtt://test.mosquitto.org").unwrap(),
            BrokerAddress {
                host: "test.mosquitto.org".into(),
                port: 1883
            }
        );
        assert_eq!(
            BrokerAddress::parse("localhost:1884").unwrap(),
            BrokerAddress {
                host: "localhost".into(),
                port: 1884
            }
        );
        assert!(BrokerAddress::parse("localhost:mqtt").is_err());
        assert!(BrokerAddress::parse("mqtt://").is_err());
    }

    #[test]
    fn test_topics_and_listen_address() {
        let config = parse(&["--client-id", "relay-test"]).unwrap();

        assert_eq!(config.topics.subscribe, "door/commands");
        assert_eq!(config.topics.publish, "camera/predictions");
        assert_eq!(config.broker.client_id, "relay-test");
        assert_eq!(config.broker.address.port, 1883);
        assert_eq!(config.listen.port(), 3000);
    }

    #[test]
    fn test_blank_topic_is_rejected() {
        let err = Args::try_parse_from([
            "relay_server",
            "--subscribe-topic",
            " ",
            "--publish-topic",
            "camera/predictions",
        ])
        .unwrap()
        .into_config();
        assert!(matches!(err, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_wildcard_publish_topic_is_rejected() {
        for topic in ["camera/+/predictions", "camera/#"] {
            let err = Args::try_parse_from([
                "relay_server",
                "--subscribe-topic",
                "door/#",
                "--publish-topic",
                topic,
            ])
            .unwrap()
            .into_config();
            assert!(matches!(err, Err(RelayError::Config(_))), "{topic}");
        }
    }

    #[test]
    fn test_listen_host_may_be_a_hostname() {
        let config = parse(&["--host", "localhost"]).unwrap();
        assert!(config.listen.ip().is_loopback());
        assert_eq!(config.listen.port(), 3000);

        let config = parse(&["--host", "127.0.0.1"]).unwrap();
        assert_eq!(config.listen, "127.0.0.1:3000".parse().unwrap());
    }

    #[test]
    fn test_max_payload() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.broker.max_payload, DEFAULT_MAX_PAYLOAD_BYTES);

        let config = parse(&["--max-payload-bytes", "1024"]).unwrap();
        assert_eq!(config.broker.max_payload, 1024);

        assert!(parse(&["--max-payload-bytes", "0"]).is_err());
    }

    #[test]
    fn test_reconnect_bounds_are_checked() {
        let err = parse(&["--reconnect-initial-ms", "5000", "--reconnect-max-ms", "100"]);
        assert!(matches!(err, Err(RelayError::Config(_))));

        let config = parse(&["--reconnect-max-attempts", "3"]).unwrap();
        assert_eq!(config.reconnect.max_attempts, Some(3));
    }

    #[test]
    fn test_vocabulary() {
        let vocabulary = LabelVocabulary::parse("mask, no-mask").unwrap();
        assert!(vocabulary.contains("mask"));
        assert!(vocabulary.contains("no-mask"));
        assert!(!vocabulary.contains("hat"));

        assert!(LabelVocabulary::parse(" , ").is_none());
    }
}
