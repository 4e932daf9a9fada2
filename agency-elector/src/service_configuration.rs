use agency_core::agency::AgencyKey;
use agency_election::ElectionConfig;
use agency_store::{ConnectionConfig, DEFAULT_ROOT};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// configuration settings loaded from the config file
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LoadConfiguration {
    /// Agency connection
    pub(crate) agency: AgencyConfig,
    /// Election settings
    pub(crate) election: ElectionSection,
    /// Prometheus exporter address (optional)
    #[serde(default)]
    pub(crate) prom_exporter: Option<String>,
}

/// Agency connection settings
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AgencyConfig {
    /// Base address of an agency agent, an in-memory agency is used when missing
    #[serde(default)]
    pub(crate) endpoint: Option<String>,
    /// Prefix of every agency path
    #[serde(default)]
    pub(crate) root: Option<String>,
    /// Value of the Authorization header
    #[serde(default)]
    pub(crate) auth: Option<String>,
    #[serde(default)]
    pub(crate) request_timeout_ms: Option<u64>,
}

/// Election settings, unset durations fall back to the election defaults
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ElectionSection {
    /// Agency path of the leader record, e.g. `/a/leader`
    pub(crate) key: String,
    /// Payload published while this process leads
    pub(crate) value: String,
    pub(crate) lease_seconds: Option<u64>,
    pub(crate) call_timeout_ms: Option<u64>,
    pub(crate) min_update_delay_ms: Option<u64>,
    pub(crate) error_backoff_ms: Option<u64>,
}

/// validated settings of one elector process
#[derive(Debug)]
pub(crate) struct ServiceConfiguration {
    /// Agency agent address, None selects the in-memory agency
    pub(crate) endpoint: Option<String>,
    pub(crate) root: String,
    pub(crate) auth: Option<String>,
    pub(crate) request_timeout: Duration,
    /// Leader record key
    pub(crate) key: AgencyKey,
    /// Candidate payload
    pub(crate) value: String,
    pub(crate) election: ElectionConfig,
    /// Prometheus exporter address
    pub(crate) prom_exporter: Option<SocketAddr>,
}

impl ServiceConfiguration {
    /// Connection settings for the HTTP agency, if an endpoint is configured.
    pub(crate) fn connection_config(&self) -> Option<ConnectionConfig> {
        self.endpoint.as_ref().map(|host| ConnectionConfig {
            host: host.clone(),
            auth: self.auth.clone(),
            request_timeout: self.request_timeout,
        })
    }
}

/// Implementing the TryFrom trait to transform LoadConfiguration into ServiceConfiguration
impl TryFrom<LoadConfiguration> for ServiceConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        let endpoint = config
            .agency
            .endpoint
            .map(|endpoint| parse_endpoint(&endpoint))
            .transpose()?;

        let key = AgencyKey::parse(&config.election.key);
        if key.is_root() {
            return Err(anyhow!("election key must not be the agency root"));
        }

        if config.election.value.is_empty() {
            return Err(anyhow!("election value must not be empty"));
        }

        let defaults = ElectionConfig::default();
        let section = &config.election;
        let election = ElectionConfig {
            lease: section
                .lease_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease),
            call_timeout: section
                .call_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_timeout),
            min_update_delay: section
                .min_update_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_update_delay),
            error_backoff: section
                .error_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.error_backoff),
        };
        election.validate().context("invalid election settings")?;

        let prom_exporter = config
            .prom_exporter
            .map(|addr| parse_socket_addr(&addr))
            .transpose()?;

        Ok(ServiceConfiguration {
            endpoint,
            root: config.agency.root.unwrap_or_else(|| DEFAULT_ROOT.to_string()),
            auth: config.agency.auth,
            request_timeout: Duration::from_millis(
                config.agency.request_timeout_ms.unwrap_or(10_000),
            ),
            key,
            value: config.election.value,
            election,
            prom_exporter,
        })
    }
}

pub(crate) fn parse_endpoint(endpoint: &str) -> Result<String> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.to_string())
    } else {
        Err(anyhow!(
            "agency endpoint {} must start with http:// or https://",
            endpoint
        ))
    }
}

pub(crate) fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    addr.parse()
        .context(format!("Failed to parse into Socket address: {}", addr))
}
