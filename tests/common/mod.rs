#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use chorus_bridge::domains::message::{Message, MessageContent};
use chorus_bridge::error::{ChorusError, Result};
use chorus_bridge::interfaces::channel::MessageChannel;
use chorus_bridge::interfaces::media::MediaPlayer;

/// Channel whose snapshots are played back from a script. The last scripted
/// snapshot repeats once the script runs out.
pub struct ScriptedChannel {
    pub appended: Mutex<Vec<MessageContent>>,
    snapshots: Mutex<VecDeque<Result<Vec<Message>>>>,
    last: Mutex<Vec<Message>>,
    append_error: Option<String>,
    pub snapshot_calls: AtomicUsize,
}

impl ScriptedChannel {
    pub fn new(snapshots: Vec<Result<Vec<Message>>>) -> Self {
        Self {
            appended: Mutex::new(Vec::new()),
            snapshots: Mutex::new(VecDeque::from(snapshots)),
            last: Mutex::new(Vec::new()),
            append_error: None,
            snapshot_calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        let mut channel = Self::new(Vec::new());
        channel.append_error = Some(reason.to_string());
        channel
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageChannel for ScriptedChannel {
    async fn append(&self, content: MessageContent) -> Result<Message> {
        if let Some(reason) = &self.append_error {
            return Err(ChorusError::ChannelUnavailable(reason.clone()));
        }
        self.appended.lock().await.push(content.clone());
        Ok(Message {
            id: "sent-1".to_string(),
            content,
            sender_hint: Some("me".to_string()),
            sent_at: 0,
            direction_hint: None,
        })
    }

    async fn snapshot(&self) -> Result<Vec<Message>> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.snapshots.lock().await.pop_front();
        match next {
            Some(Ok(messages)) => {
                *self.last.lock().await = messages.clone();
                Ok(messages)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.last.lock().await.clone()),
        }
    }
}

pub fn peer_response(id: &str, correlation_id: &str, value: &str, sent_at: i64) -> Message {
    Message {
        id: id.to_string(),
        content: MessageContent::Structured(json!({
            "correlationId": correlation_id,
            "value": value,
            "explanation": format!("the answer was {value}"),
        })),
        sender_hint: Some("agent".to_string()),
        sent_at,
        direction_hint: None,
    }
}

pub fn own_request(id: &str, correlation_id: &str, sent_at: i64) -> Message {
    Message {
        id: id.to_string(),
        content: MessageContent::Structured(json!({
            "correlationId": correlation_id,
            "selectedValue": "b",
            "contextId": "song-7",
        })),
        sender_hint: Some("me".to_string()),
        sent_at,
        direction_hint: None,
    }
}

#[derive(Debug, Clone)]
pub enum LoadBehaviour {
    Ready,
    /// Ready after the given delay.
    Slow(Duration),
    Fail(String),
    Hang,
}

/// Player that records every call and answers per URI. Unscripted URIs fail.
pub struct RecordingPlayer {
    behaviours: HashMap<String, LoadBehaviour>,
    pub loads: Mutex<Vec<String>>,
    pub teardowns: AtomicUsize,
}

impl RecordingPlayer {
    pub fn new(behaviours: Vec<(&str, LoadBehaviour)>) -> Self {
        Self {
            behaviours: behaviours
                .into_iter()
                .map(|(uri, behaviour)| (uri.to_string(), behaviour))
                .collect(),
            loads: Mutex::new(Vec::new()),
            teardowns: AtomicUsize::new(0),
        }
    }

    pub async fn loads(&self) -> Vec<String> {
        self.loads.lock().await.clone()
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaPlayer for RecordingPlayer {
    async fn load(&self, uri: &str) -> Result<()> {
        self.loads.lock().await.push(uri.to_string());
        match self.behaviours.get(uri) {
            Some(LoadBehaviour::Ready) => Ok(()),
            Some(LoadBehaviour::Slow(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            Some(LoadBehaviour::Fail(reason)) => Err(ChorusError::Http(reason.clone())),
            Some(LoadBehaviour::Hang) => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(())
            }
            None => Err(ChorusError::Http(format!("no route to {uri}"))),
        }
    }

    async fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}
