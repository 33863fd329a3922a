use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domains::message::{Message, MessageContent};
use crate::error::Result;

/// Shared append-only log between the caller and one counterparty.
///
/// `append` fails with `ChorusError::ChannelUnavailable` when the transport
/// cannot be reached. A message appended here is not guaranteed to show up
/// in the very next `snapshot`; propagation is asynchronous.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn append(&self, content: MessageContent) -> Result<Message>;

    /// Every message visible to the caller right now. Implementations document
    /// their ordering; consumers must not depend on it.
    async fn snapshot(&self) -> Result<Vec<Message>>;

    /// Push notifications for transports that have them.
    fn subscribe(&self) -> Option<BoxStream<'static, Message>> {
        None
    }
}
