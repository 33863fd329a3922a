use std::path::Path;
use std::sync::Arc;

use libp2p::Multiaddr;

use crate::config::{ChannelConfig, Config};
use crate::e2e::identity_store::{decode_key, load_or_create_identity};
use crate::error::{ChorusError, Result};
use crate::interfaces::channel::MessageChannel;
use crate::services::gossip::{GossipChannel, GossipSettings};
use crate::services::memory_channel::MemoryChannel;
use crate::services::relay_channel::RelayChannel;

pub const DEFAULT_TOPIC: &str = "chorus-bridge";
pub const DEFAULT_KEY_DIR: &str = ".chorus-bridge/keys";
const FALLBACK_LOCAL_ID: &str = "client";

pub struct ChannelFactory;

impl ChannelFactory {
    /// `token_override` replaces the relay token from the file when set.
    pub async fn create_from_config(
        config: &Config,
        token_override: Option<String>,
    ) -> Result<Arc<dyn MessageChannel>> {
        let local_id = config
            .own_id()
            .unwrap_or_else(|| FALLBACK_LOCAL_ID.to_string());
        match config.channel.clone().unwrap_or(ChannelConfig::Memory) {
            ChannelConfig::Memory => Ok(Arc::new(MemoryChannel::new(local_id))),
            ChannelConfig::Relay {
                base_url,
                token,
                conversation_id,
            } => {
                let token = token_override.or(token).unwrap_or_default();
                let channel = RelayChannel::new(base_url, token, conversation_id)?
                    .with_sender_id(config.own_id());
                Ok(Arc::new(channel))
            }
            ChannelConfig::Gossip {
                listen,
                bootstrap,
                topic,
                peer_id,
                peer_public_key,
                key_path,
            } => {
                let key_dir = key_path.unwrap_or_else(|| DEFAULT_KEY_DIR.to_string());
                let identity = load_or_create_identity(&key_file(&key_dir, "identity.key"))?;
                let settings = GossipSettings {
                    listen: parse_addrs(&listen)?,
                    bootstrap: parse_addrs(&bootstrap.unwrap_or_default())?,
                    topic: topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
                    local_id,
                    peer_id,
                    peer_public_key: decode_key(&peer_public_key)?,
                    swarm_key_path: key_file(&key_dir, "swarm.key"),
                };
                let channel = GossipChannel::start(settings, &identity).await?;
                Ok(Arc::new(channel))
            }
        }
    }
}

pub fn key_file(dir: &str, name: &str) -> String {
    Path::new(dir).join(name).to_string_lossy().to_string()
}

fn parse_addrs(raw: &[String]) -> Result<Vec<Multiaddr>> {
    raw.iter()
        .map(|addr| {
            addr.parse::<Multiaddr>()
                .map_err(|e| ChorusError::Config(format!("bad multiaddr {addr}: {e}")))
        })
        .collect()
}
