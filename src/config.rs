use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ChorusError, Result};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_CORRELATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_ECHO_WINDOW_MS: u64 = 3_000;
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PLAYED_CAPACITY: usize = 256;

const DEFAULT_PROXY_TEMPLATE: &str = "/api/audio-proxy?cid={cid}";
const DEFAULT_GATEWAYS: [&str; 4] = [
    "https://ipfs.io/ipfs/{cid}",
    "https://cloudflare-ipfs.com/ipfs/{cid}",
    "https://gateway.pinata.cloud/ipfs/{cid}",
    "https://dweb.link/ipfs/{cid}",
];
const DEFAULT_LOCAL_PREFIXES: [&str; 3] = ["/", "file://", "assets/"];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IdentityConfig {
    pub own_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelConfig {
    Memory,
    Relay {
        base_url: String,
        token: Option<String>,
        conversation_id: String,
    },
    Gossip {
        listen: Vec<String>,
        bootstrap: Option<Vec<String>>,
        topic: Option<String>,
        /// Counterparty identity carried in frame headers.
        peer_id: String,
        /// Base64 x25519 public key of the counterparty.
        peer_public_key: String,
        key_path: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CorrelationConfig {
    pub poll_interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub echo_window_ms: Option<u64>,
    pub accept_raw_text: Option<bool>,
    pub positive_keywords: Option<Vec<String>>,
    pub negative_keywords: Option<Vec<String>>,
}

impl CorrelationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
                .max(1),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_CORRELATION_TIMEOUT_MS))
    }

    pub fn echo_window_ms(&self) -> i64 {
        self.echo_window_ms.unwrap_or(DEFAULT_ECHO_WINDOW_MS) as i64
    }

    pub fn accept_raw_text(&self) -> bool {
        self.accept_raw_text.unwrap_or(true)
    }

    pub fn positive_keywords(&self) -> Vec<String> {
        self.positive_keywords.clone().unwrap_or_else(|| {
            ["correct", "right", "well done", "nailed it"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        })
    }

    pub fn negative_keywords(&self) -> Vec<String> {
        self.negative_keywords.clone().unwrap_or_else(|| {
            ["incorrect", "not correct", "not quite", "wrong", "not right"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResourceConfig {
    pub proxy_template: Option<String>,
    pub gateway_templates: Option<Vec<String>>,
    pub attempt_timeout_ms: Option<u64>,
    pub local_prefixes: Option<Vec<String>>,
    pub played_capacity: Option<usize>,
    /// Origin that relative proxy URLs are fetched from.
    pub proxy_base_url: Option<String>,
}

impl ResourceConfig {
    /// Proxy first, then gateways, in configured order.
    pub fn endpoint_templates(&self) -> Vec<String> {
        let mut templates = vec![self
            .proxy_template
            .clone()
            .unwrap_or_else(|| DEFAULT_PROXY_TEMPLATE.to_string())];
        match &self.gateway_templates {
            Some(gateways) => templates.extend(gateways.iter().cloned()),
            None => templates.extend(DEFAULT_GATEWAYS.iter().map(|s| s.to_string())),
        }
        templates
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(
            self.attempt_timeout_ms
                .unwrap_or(DEFAULT_ATTEMPT_TIMEOUT_MS)
                .max(1),
        )
    }

    pub fn local_prefixes(&self) -> Vec<String> {
        self.local_prefixes.clone().unwrap_or_else(|| {
            DEFAULT_LOCAL_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect()
        })
    }

    pub fn played_capacity(&self) -> usize {
        self.played_capacity
            .unwrap_or(DEFAULT_PLAYED_CAPACITY)
            .max(1)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub identity: Option<IdentityConfig>,
    pub channel: Option<ChannelConfig>,
    pub correlation: Option<CorrelationConfig>,
    pub resources: Option<ResourceConfig>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ChorusError::Config(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ChorusError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ChannelConfig::Relay {
            base_url,
            conversation_id,
            ..
        }) = &self.channel
        {
            if base_url.trim().is_empty() {
                return Err(ChorusError::Config("relay base_url is empty".to_string()));
            }
            if conversation_id.trim().is_empty() {
                return Err(ChorusError::Config(
                    "relay conversation_id is empty".to_string(),
                ));
            }
        }
        if let Some(resources) = &self.resources {
            if let Some(template) = resources
                .endpoint_templates()
                .iter()
                .find(|t| !t.contains("{cid}"))
            {
                return Err(ChorusError::Config(format!(
                    "endpoint template without {{cid}}: {template}"
                )));
            }
        }
        Ok(())
    }

    pub fn own_id(&self) -> Option<String> {
        self.identity
            .as_ref()
            .and_then(|identity| identity.own_id.clone())
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    pub fn correlation(&self) -> CorrelationConfig {
        self.correlation.clone().unwrap_or_default()
    }

    pub fn resources(&self) -> ResourceConfig {
        self.resources.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_sections_missing() {
        let config: Config = serde_json::from_str("{}").unwrap();
        let correlation = config.correlation();
        assert_eq!(correlation.poll_interval(), Duration::from_secs(1));
        assert_eq!(correlation.timeout(), Duration::from_secs(30));
        assert!(correlation.accept_raw_text());

        let templates = config.resources().endpoint_templates();
        assert_eq!(templates[0], DEFAULT_PROXY_TEMPLATE);
        assert_eq!(templates.len(), 1 + DEFAULT_GATEWAYS.len());
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let config: Config = serde_json::from_str(
            r#"{"resources": {"gateway_templates": ["https://example.com/static"]}}"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ChorusError::Config(_)));
    }
}
