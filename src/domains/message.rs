use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ChorusError, Result};

/// Provenance hint some transports attach to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// Message body as carried by the channel. The channel never looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Structured(Value),
}

impl MessageContent {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Structured(other),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_hint: Option<String>,
    /// Unix milliseconds.
    pub sent_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_hint: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    pub correlation_id: String,
    pub selected_value: String,
    pub context_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub correlation_id: String,
    pub value: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A request issued by the caller. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    body: RequestBody,
    issued_at: i64,
}

impl Request {
    pub fn new(selected_value: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self::with_correlation_id(new_correlation_id(), selected_value, context_id)
    }

    pub fn with_correlation_id(
        correlation_id: impl Into<String>,
        selected_value: impl Into<String>,
        context_id: impl Into<String>,
    ) -> Self {
        Self {
            body: RequestBody {
                correlation_id: correlation_id.into(),
                selected_value: selected_value.into(),
                context_id: context_id.into(),
                extra: Map::new(),
            },
            issued_at: now_ms(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.body.extra.insert(key.into(), value);
        self
    }

    pub fn correlation_id(&self) -> &str {
        &self.body.correlation_id
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    pub fn to_content(&self) -> Result<MessageContent> {
        let value = serde_json::to_value(&self.body)
            .map_err(|e| ChorusError::Serialization(e.to_string()))?;
        Ok(MessageContent::Structured(value))
    }
}

/// Result of interpreting a message body. Structured shapes are tried first,
/// anything else is kept verbatim as text.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedContent {
    Response(ResponseBody),
    Request(RequestBody),
    RawText(String),
}

impl ParsedContent {
    pub fn parse(content: &MessageContent) -> Self {
        let value = match content {
            MessageContent::Structured(value) => Some(value.clone()),
            MessageContent::Text(text) => {
                let trimmed = text.trim();
                if trimmed.starts_with('{') {
                    serde_json::from_str::<Value>(trimmed).ok()
                } else {
                    None
                }
            }
        };

        if let Some(value) = value.filter(Value::is_object) {
            if let Ok(response) = serde_json::from_value::<ResponseBody>(value.clone()) {
                return Self::Response(response);
            }
            if let Ok(request) = serde_json::from_value::<RequestBody>(value) {
                return Self::Request(request);
            }
        }
        Self::RawText(content.as_text())
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Response(body) => Some(&body.correlation_id),
            Self::Request(body) => Some(&body.correlation_id),
            Self::RawText(_) => None,
        }
    }
}

pub fn new_correlation_id() -> String {
    format!("q-{}", Uuid::new_v4())
}

pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
