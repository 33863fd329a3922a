use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::{broadcast, RwLock};

use crate::domains::message::{new_message_id, now_ms, Message, MessageContent};
use crate::error::{ChorusError, Result};
use crate::interfaces::channel::MessageChannel;

struct SharedLog {
    messages: RwLock<Vec<Message>>,
    events: broadcast::Sender<Message>,
    available: AtomicBool,
}

/// In-process conversation log. Endpoints created with [`counterpart`]
/// share one log; snapshots are oldest first.
///
/// [`counterpart`]: MemoryChannel::counterpart
pub struct MemoryChannel {
    log: Arc<SharedLog>,
    identity: String,
    loopback: bool,
}

impl MemoryChannel {
    pub fn new(identity: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            log: Arc::new(SharedLog {
                messages: RwLock::new(Vec::new()),
                events,
                available: AtomicBool::new(true),
            }),
            identity: identity.into(),
            loopback: false,
        }
    }

    pub fn counterpart(&self, identity: impl Into<String>) -> Self {
        Self {
            log: self.log.clone(),
            identity: identity.into(),
            loopback: false,
        }
    }

    /// Every append is followed by a second copy under a fresh id, the way
    /// some transports reflect a sender's own messages.
    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn set_available(&self, available: bool) {
        self.log.available.store(available, Ordering::SeqCst);
    }

    /// Insert a message exactly as given.
    pub async fn push(&self, message: Message) {
        self.log.messages.write().await.push(message.clone());
        let _ = self.log.events.send(message);
    }

    pub async fn len(&self) -> usize {
        self.log.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn append(&self, content: MessageContent) -> Result<Message> {
        if !self.log.available.load(Ordering::SeqCst) {
            return Err(ChorusError::ChannelUnavailable(format!(
                "memory channel for {} is offline",
                self.identity
            )));
        }
        let message = Message {
            id: new_message_id(),
            content,
            sender_hint: Some(self.identity.clone()),
            sent_at: now_ms(),
            direction_hint: None,
        };
        self.push(message.clone()).await;
        if self.loopback {
            self.push(Message {
                id: new_message_id(),
                sent_at: message.sent_at + 1,
                ..message.clone()
            })
            .await;
        }
        Ok(message)
    }

    async fn snapshot(&self) -> Result<Vec<Message>> {
        if !self.log.available.load(Ordering::SeqCst) {
            return Err(ChorusError::ChannelUnavailable(format!(
                "memory channel for {} is offline",
                self.identity
            )));
        }
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
