use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::BoxStream;
use futures::StreamExt;
use libp2p::gossipsub::{
    self, AllowAllSubscriptionFilter, IdentTopic, IdentityTransform, MessageAuthenticity,
    ValidationMode,
};
use libp2p::swarm::SwarmEvent;
use libp2p::{identity, noise, tcp, yamux, Multiaddr, PeerId, Swarm, Transport};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use crate::domains::message::{
    new_message_id, now_ms, Direction, Message, MessageContent,
};
use crate::e2e::{ConversationCipher, IdentityKeypair, SealedEnvelope};
use crate::error::{ChorusError, Result};
use crate::interfaces::channel::MessageChannel;

const FRAME_KIND: &str = "chat";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipFrame {
    pub kind: String,
    pub to: String,
    pub from: String,
    pub message_id: String,
    pub sent_at: i64,
    pub envelope: SealedEnvelope,
    pub signature: String,
    pub public_key: String,
}

#[derive(Serialize)]
struct SignableFrame<'a> {
    kind: &'a str,
    to: &'a str,
    from: &'a str,
    message_id: &'a str,
    sent_at: i64,
    envelope: &'a SealedEnvelope,
}

impl GossipFrame {
    fn signable_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&SignableFrame {
            kind: &self.kind,
            to: &self.to,
            from: &self.from,
            message_id: &self.message_id,
            sent_at: self.sent_at,
            envelope: &self.envelope,
        })
        .map_err(|e| ChorusError::Serialization(e.to_string()))
    }
}

fn verify_frame(frame: &GossipFrame) -> Result<()> {
    if frame.signature.trim().is_empty() || frame.public_key.trim().is_empty() {
        return Err(ChorusError::Runtime("missing signature".to_string()));
    }
    let payload = frame.signable_bytes()?;
    let signature = BASE64
        .decode(frame.signature.as_bytes())
        .map_err(|e| ChorusError::Runtime(e.to_string()))?;
    let public_key_bytes = BASE64
        .decode(frame.public_key.as_bytes())
        .map_err(|e| ChorusError::Runtime(e.to_string()))?;
    let public_key = identity::PublicKey::try_decode_protobuf(&public_key_bytes)
        .map_err(|e: identity::DecodingError| ChorusError::Runtime(e.to_string()))?;
    if !public_key.verify(&payload, &signature) {
        return Err(ChorusError::Runtime("invalid signature".to_string()));
    }
    Ok(())
}

enum GossipCommand {
    Publish {
        frame: GossipFrame,
        respond_to: oneshot::Sender<Result<()>>,
    },
}

// Kept in its own module so the derive's generated `Result` is not shadowed
// by `crate::error::Result`.
mod behaviour {
    use super::ChatBehaviourEvent;
    use libp2p::gossipsub::{self, AllowAllSubscriptionFilter, IdentityTransform};
    use libp2p::swarm::NetworkBehaviour;

    #[derive(NetworkBehaviour)]
    #[behaviour(to_swarm = "ChatBehaviourEvent")]
    pub(super) struct ChatBehaviour {
        pub(super) gossipsub: gossipsub::Behaviour<IdentityTransform, AllowAllSubscriptionFilter>,
    }
}
use behaviour::ChatBehaviour;

enum ChatBehaviourEvent {
    Gossipsub(gossipsub::Event),
}

impl From<gossipsub::Event> for ChatBehaviourEvent {
    fn from(event: gossipsub::Event) -> Self {
        Self::Gossipsub(event)
    }
}

#[derive(Debug, Clone)]
pub struct GossipSettings {
    pub listen: Vec<Multiaddr>,
    pub bootstrap: Vec<Multiaddr>,
    pub topic: String,
    /// Our name in frame headers.
    pub local_id: String,
    pub peer_id: String,
    pub peer_public_key: [u8; 32],
    pub swarm_key_path: String,
}

/// Frames addressed between us and the counterparty, decrypted, in arrival
/// order. This is the append-only log the channel exposes.
struct ConversationLog {
    local_id: String,
    peer_id: String,
    cipher: ConversationCipher,
    messages: RwLock<Vec<Message>>,
    events: broadcast::Sender<Message>,
}

impl ConversationLog {
    async fn record(&self, message: Message) {
        self.messages.write().await.push(message.clone());
        let _ = self.events.send(message);
    }

    async fn accept(&self, frame: GossipFrame) {
        if frame.kind != FRAME_KIND || frame.to != self.local_id || frame.from != self.peer_id {
            return;
        }
        match self.cipher.open(&frame.envelope, frame.message_id.as_bytes()) {
            Ok(content) => {
                self.record(Message {
                    id: frame.message_id,
                    content,
                    sender_hint: Some(frame.from),
                    sent_at: frame.sent_at,
                    direction_hint: Some(Direction::Received),
                })
                .await;
            }
            Err(err) => debug!(message_id = %frame.message_id, error = %err, "dropping frame"),
        }
    }
}

/// Conversation with one counterparty over a libp2p gossipsub topic. Bodies
/// are sealed end to end; frames are signed with the swarm key. Snapshots are
/// oldest first.
pub struct GossipChannel {
    cmd_tx: mpsc::Sender<GossipCommand>,
    log: Arc<ConversationLog>,
    keypair: identity::Keypair,
}

impl GossipChannel {
    pub async fn start(settings: GossipSettings, identity: &IdentityKeypair) -> Result<Self> {
        let local_key = load_or_create_swarm_key(&settings.swarm_key_path)?;
        let peer_id = PeerId::from(local_key.public());

        let transport = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true))
            .upgrade(libp2p::core::upgrade::Version::V1Lazy)
            .authenticate(
                noise::Config::new(&local_key)
                    .map_err(|e| ChorusError::ChannelUnavailable(e.to_string()))?,
            )
            .multiplex(yamux::Config::default())
            .boxed();

        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .validation_mode(ValidationMode::Strict)
            .heartbeat_interval(Duration::from_secs(10))
            .build()
            .map_err(|e| ChorusError::Config(e.to_string()))?;

        let mut gossip = gossipsub::Behaviour::<IdentityTransform, AllowAllSubscriptionFilter>::new(
            MessageAuthenticity::Signed(local_key.clone()),
            gossipsub_config,
        )
        .map_err(|e| ChorusError::ChannelUnavailable(e.to_string()))?;

        let topic = IdentTopic::new(settings.topic.as_str());
        gossip
            .subscribe(&topic)
            .map_err(|e| ChorusError::ChannelUnavailable(e.to_string()))?;

        let mut swarm = Swarm::new(
            transport,
            ChatBehaviour { gossipsub: gossip },
            peer_id,
            libp2p::swarm::Config::with_tokio_executor(),
        );

        for addr in settings.listen.iter().cloned() {
            swarm
                .listen_on(addr)
                .map_err(|e| ChorusError::ChannelUnavailable(e.to_string()))?;
        }
        for addr in settings.bootstrap.iter().cloned() {
            if let Err(err) = swarm.dial(addr.clone()) {
                warn!(%addr, error = %err, "bootstrap dial failed");
            }
        }

        info!(%peer_id, topic = %settings.topic, "gossip channel started");
        let cipher = ConversationCipher::new(identity, settings.peer_public_key, &settings.topic)?;
        let (events, _) = broadcast::channel(256);
        let log = Arc::new(ConversationLog {
            local_id: settings.local_id,
            peer_id: settings.peer_id,
            cipher,
            messages: RwLock::new(Vec::new()),
            events,
        });

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<GossipCommand>(64);
        let log_task = log.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(GossipCommand::Publish { frame, respond_to }) = cmd else {
                            break;
                        };
                        let result = serde_json::to_vec(&frame)
                            .map_err(|e| ChorusError::Serialization(e.to_string()))
                            .and_then(|data| {
                                swarm
                                    .behaviour_mut()
                                    .gossipsub
                                    .publish(topic.clone(), data)
                                    .map(|_| ())
                                    .map_err(|e| ChorusError::ChannelUnavailable(e.to_string()))
                            });
                        let _ = respond_to.send(result);
                    }
                    event = swarm.select_next_some() => {
                        match event {
                            SwarmEvent::Behaviour(ChatBehaviourEvent::Gossipsub(
                                gossipsub::Event::Message { message, .. },
                            )) => {
                                match serde_json::from_slice::<GossipFrame>(&message.data) {
                                    Ok(frame) if verify_frame(&frame).is_ok() => {
                                        log_task.accept(frame).await;
                                    }
                                    Ok(frame) => {
                                        debug!(message_id = %frame.message_id, "unsigned frame dropped");
                                    }
                                    Err(err) => debug!(error = %err, "undecodable frame dropped"),
                                }
                            }
                            SwarmEvent::NewListenAddr { address, .. } => {
                                info!(%address, "gossip listening");
                            }
                            _ => {}
                        }
                    }
                }
            }
        });

        Ok(Self {
            cmd_tx,
            log,
            keypair: local_key,
        })
    }

    fn sign(&self, mut frame: GossipFrame) -> Result<GossipFrame> {
        let payload = frame.signable_bytes()?;
        let signature = self
            .keypair
            .sign(&payload)
            .map_err(|e| ChorusError::Runtime(e.to_string()))?;
        frame.signature = BASE64.encode(signature);
        frame.public_key = BASE64.encode(self.keypair.public().encode_protobuf());
        Ok(frame)
    }
}

#[async_trait]
impl MessageChannel for GossipChannel {
    async fn append(&self, content: MessageContent) -> Result<Message> {
        let message_id = new_message_id();
        let sent_at = now_ms();
        let envelope = self.log.cipher.seal(&content, message_id.as_bytes())?;
        let frame = self.sign(GossipFrame {
            kind: FRAME_KIND.to_string(),
            to: self.log.peer_id.clone(),
            from: self.log.local_id.clone(),
            message_id: message_id.clone(),
            sent_at,
            envelope,
            signature: String::new(),
            public_key: String::new(),
        })?;

        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(GossipCommand::Publish {
                frame,
                respond_to: tx,
            })
            .await
            .map_err(|e| ChorusError::ChannelUnavailable(e.to_string()))?;
        rx.await
            .map_err(|e| ChorusError::ChannelUnavailable(e.to_string()))??;

        let message = Message {
            id: message_id,
            content,
            sender_hint: Some(self.log.local_id.clone()),
            sent_at,
            direction_hint: Some(Direction::Sent),
        };
        self.log.record(message.clone()).await;
        Ok(message)
    }

    async fn snapshot(&self) -> Result<Vec<Message>> {
        Ok(self.log.messages.read().await.clone())
    }

    fn subscribe(&self) -> Option<BoxStream<'static, Message>> {
        let mut events = self.log.events.subscribe();
        Some(Box::pin(async_stream::stream! {
            loop {
                match events.recv().await {
                    Ok(message) => yield message,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

fn load_or_create_swarm_key(path: &str) -> Result<identity::Keypair> {
    if let Ok(encoded) = fs::read_to_string(path) {
        if let Ok(raw) = BASE64.decode(encoded.trim()) {
            if let Ok(keypair) = identity::Keypair::from_protobuf_encoding(&raw) {
                return Ok(keypair);
            }
        }
    }

    if let Some(parent) = Path::new(path).parent() {
        let _ = fs::create_dir_all(parent);
    }
    let keypair = identity::Keypair::generate_ed25519();
    match keypair.to_protobuf_encoding() {
        Ok(raw) => {
            if let Err(err) = fs::write(path, BASE64.encode(raw)) {
                warn!(path, error = %err, "swarm key not persisted");
            }
        }
        Err(err) => warn!(error = %err, "swarm key not encodable"),
    }
    Ok(keypair)
}
