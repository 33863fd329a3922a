use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use crate::domains::message::{Message, MessageContent};
use crate::error::{ChorusError, Result};
use crate::interfaces::channel::MessageChannel;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppendBody<'a> {
    content: &'a MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct MessagePage {
    messages: Vec<Message>,
}

/// Conversation log kept by an HTTP relay.
///
/// `POST {base}/conversations/{id}/messages` appends and answers with the
/// stored message; `GET` on the same path lists the log in relay order
/// (oldest first for the reference relay).
pub struct RelayChannel {
    client: reqwest::Client,
    base_url: String,
    token: String,
    conversation_id: String,
    sender_id: Option<String>,
}

impl RelayChannel {
    pub fn new(base_url: String, token: String, conversation_id: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ChorusError::Runtime(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            token,
            conversation_id,
            sender_id: None,
        })
    }

    pub fn with_sender_id(mut self, sender_id: Option<String>) -> Self {
        self.sender_id = sender_id;
        self
    }

    fn messages_url(&self) -> String {
        let path = format!(
            "conversations/{}/messages",
            urlencoding::encode(&self.conversation_id)
        );
        join_url(&self.base_url, &path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.trim().is_empty() {
            request
        } else {
            request.header(AUTHORIZATION, format!("Bearer {}", self.token))
        }
    }
}

#[async_trait]
impl MessageChannel for RelayChannel {
    async fn append(&self, content: MessageContent) -> Result<Message> {
        let body = AppendBody {
            content: &content,
            sender_id: self.sender_id.as_deref(),
        };
        let response = self
            .authorize(self.client.post(self.messages_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e: reqwest::Error| ChorusError::ChannelUnavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChorusError::ChannelUnavailable(format!(
                "relay rejected append with {status}"
            )));
        }
        response
            .json::<Message>()
            .await
            .map_err(|e: reqwest::Error| ChorusError::Serialization(e.to_string()))
    }

    async fn snapshot(&self) -> Result<Vec<Message>> {
        let response = self
            .authorize(self.client.get(self.messages_url()))
            .send()
            .await
            .map_err(|e: reqwest::Error| ChorusError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChorusError::Http(format!("relay snapshot returned {status}")));
        }
        let page = response
            .json::<MessagePage>()
            .await
            .map_err(|e: reqwest::Error| ChorusError::Serialization(e.to_string()))?;
        Ok(page.messages)
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_is_encoded_into_path() {
        let channel = RelayChannel::new(
            "http://relay.local/".to_string(),
            String::new(),
            "quiz/7".to_string(),
        )
        .unwrap();
        assert_eq!(
            channel.messages_url(),
            "http://relay.local/conversations/quiz%2F7/messages"
        );
    }
}
