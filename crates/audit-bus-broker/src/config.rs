//! Broker configuration.
//!
//! Recognized environment options:
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `BROKER_URL` | broker connection target (`RABBITMQ_URL` accepted as fallback) | `amqp://localhost:5672` |
//! | `SERVICE_NAME` | tags published events and log lines | `unknown-service` |

use crate::topology::QueueTopology;

/// Default broker URL.
pub const DEFAULT_BROKER_URL: &str = "amqp://localhost:5672";

/// Default service name when `SERVICE_NAME` is unset.
pub const DEFAULT_SERVICE_NAME: &str = "unknown-service";

/// Default consumer prefetch (at most one unacknowledged delivery).
pub const DEFAULT_PREFETCH: u16 = 1;

/// Configuration shared by the publisher and the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Broker URL, possibly containing credentials.
    pub url: String,

    /// Identity of this process, attached to published events.
    pub service_name: String,

    /// Consumer prefetch applied when the channel is opened.
    pub prefetch: u16,

    /// Queue the audit bus publishes to and consumes from.
    pub topology: QueueTopology,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_URL)
    }
}

impl BrokerConfig {
    /// Creates a configuration for the given broker URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use audit_bus_broker::BrokerConfig;
    ///
    /// let config = BrokerConfig::new("amqp://rabbitmq:5672")
    ///     .with_service_name("facturas-service");
    /// assert_eq!(config.service_name, "facturas-service");
    /// assert_eq!(config.prefetch, 1);
    /// ```
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            prefetch: DEFAULT_PREFETCH,
            topology: QueueTopology::audit_events(),
        }
    }

    /// Reads `BROKER_URL` / `RABBITMQ_URL` and `SERVICE_NAME` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = get("BROKER_URL")
            .or_else(|| get("RABBITMQ_URL"))
            .unwrap_or_else(|| DEFAULT_BROKER_URL.to_string());

        let mut config = Self::new(url);
        if let Some(service) = get("SERVICE_NAME") {
            config.service_name = service;
        }
        config
    }

    /// Sets the service name.
    #[must_use]
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    /// Sets the consumer prefetch.
    #[must_use]
    pub const fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Sets the queue topology.
    #[must_use]
    pub fn with_topology(mut self, topology: QueueTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Returns the broker URL with any password replaced, safe for logs.
    pub fn redacted_url(&self) -> String {
        redact_url(&self.url)
    }
}

/// Replaces the password component of `raw` with `***`.
///
/// Unparseable input is not echoed back, since it may still hold secrets.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable broker url>".to_string(),
    }
}
