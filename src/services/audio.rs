use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::RwLock;

use crate::error::{ChorusError, Result};
use crate::interfaces::media::MediaPlayer;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedAudio {
    pub uri: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

enum Source {
    Remote(String),
    File(PathBuf),
}

/// Buffers the whole asset; "ready" means the body arrived and is non-empty.
pub struct HttpAudioPlayer {
    client: reqwest::Client,
    base_url: Option<String>,
    current: RwLock<Option<LoadedAudio>>,
}

impl HttpAudioPlayer {
    pub fn new(base_url: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .build()
            .map_err(|e| ChorusError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            current: RwLock::new(None),
        })
    }

    pub async fn current(&self) -> Option<LoadedAudio> {
        self.current.read().await.clone()
    }

    fn source(&self, uri: &str) -> Source {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Source::Remote(uri.to_string());
        }
        if let Some(path) = uri.strip_prefix("file://") {
            return Source::File(PathBuf::from(path));
        }
        match &self.base_url {
            Some(base) => Source::Remote(format!("{base}/{}", uri.trim_start_matches('/'))),
            None => Source::File(PathBuf::from(uri)),
        }
    }

    async fn fetch(&self, url: &str) -> Result<(Option<String>, Bytes)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e: reqwest::Error| ChorusError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChorusError::Http(format!("{url} returned {status}")));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e: reqwest::Error| ChorusError::Http(e.to_string()))?;
        Ok((content_type, bytes))
    }
}

async fn read_file(path: PathBuf) -> Result<Bytes> {
    tokio::task::spawn_blocking(move || std::fs::read(&path).map(Bytes::from))
        .await
        .map_err(|e| ChorusError::Runtime(e.to_string()))?
        .map_err(|e| ChorusError::Runtime(e.to_string()))
}

#[async_trait]
impl MediaPlayer for HttpAudioPlayer {
    async fn load(&self, uri: &str) -> Result<()> {
        let (content_type, bytes) = match self.source(uri) {
            Source::Remote(url) => self.fetch(&url).await?,
            Source::File(path) => (None, read_file(path).await?),
        };
        if bytes.is_empty() {
            return Err(ChorusError::Http(format!("{uri} returned an empty body")));
        }
        let mut current = self.current.write().await;
        *current = Some(LoadedAudio {
            uri: uri.to_string(),
            content_type,
            bytes,
        });
        Ok(())
    }

    async fn teardown(&self) {
        self.current.write().await.take();
    }
}
