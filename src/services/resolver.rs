use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ResourceConfig;
use crate::domains::resource::{
    AttemptFailure, AttemptState, ResolveMode, ResolveOutcome, ResourceAttempt,
};
use crate::interfaces::media::MediaPlayer;
use crate::services::correlator::CancelFlag;
use crate::session::Session;

pub type LocalCheck = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Delivery endpoint with a `{cid}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate(String);

impl EndpointTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn expand(&self, content_id: &str) -> String {
        self.0
            .replace("{cid}", urlencoding::encode(content_id).as_ref())
    }
}

/// Strip scheme decoration so every gateway sees the bare identifier.
pub fn normalize_content_id(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("ipfs://ipfs/")
        .or_else(|| trimmed.strip_prefix("ipfs://"))
        .unwrap_or(trimmed)
        .trim_matches('/')
}

pub struct ResourceResolver {
    player: Arc<dyn MediaPlayer>,
    endpoints: Vec<EndpointTemplate>,
    attempt_timeout: Duration,
    is_local: LocalCheck,
    playback: Mutex<()>,
}

impl ResourceResolver {
    pub fn new(player: Arc<dyn MediaPlayer>, config: &ResourceConfig) -> Self {
        let prefixes = config.local_prefixes();
        Self {
            player,
            endpoints: config
                .endpoint_templates()
                .into_iter()
                .map(EndpointTemplate::new)
                .collect(),
            attempt_timeout: config.attempt_timeout(),
            is_local: Arc::new(move |content_id: &str| {
                prefixes
                    .iter()
                    .any(|prefix| content_id.starts_with(prefix.as_str()))
            }),
            playback: Mutex::new(()),
        }
    }

    pub fn with_local_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.is_local = Arc::new(check);
        self
    }

    pub fn endpoints_for(&self, content_id: &str) -> Vec<String> {
        let content_id = normalize_content_id(content_id);
        self.endpoints
            .iter()
            .map(|template| template.expand(content_id))
            .collect()
    }

    pub async fn resolve(
        &self,
        session: &Session,
        content_id: &str,
        mode: ResolveMode,
    ) -> ResolveOutcome {
        self.resolve_with_cancel(session, content_id, mode, &CancelFlag::new())
            .await
    }

    /// Walk the endpoint list until one loads. Never fails; exhaustion is an
    /// outcome the caller uses to disable playback.
    pub async fn resolve_with_cancel(
        &self,
        session: &Session,
        content_id: &str,
        mode: ResolveMode,
        cancel: &CancelFlag,
    ) -> ResolveOutcome {
        let content_id = content_id.trim();
        let is_local = (self.is_local)(content_id);
        let content_id = if is_local {
            content_id
        } else {
            normalize_content_id(content_id)
        };
        if content_id.is_empty() {
            return ResolveOutcome::Exhausted {
                attempts: Vec::new(),
            };
        }
        if mode == ResolveMode::Once && session.has_played(content_id) {
            debug!(content_id, "already played; replay not requested");
            return ResolveOutcome::AlreadyPlayed;
        }

        let _playback = self.playback.lock().await;
        // a concurrent resolve of the same id may have finished while we waited
        if mode == ResolveMode::Once && session.has_played(content_id) {
            debug!(content_id, "played while waiting for the player");
            return ResolveOutcome::AlreadyPlayed;
        }
        self.player.teardown().await;

        if is_local {
            return self.load_local(session, content_id).await;
        }

        let mut attempts: Vec<ResourceAttempt> = self
            .endpoints_for(content_id)
            .into_iter()
            .map(|endpoint| ResourceAttempt {
                endpoint,
                state: AttemptState::Pending,
            })
            .collect();

        for index in 0..attempts.len() {
            if cancel.is_cancelled() {
                self.player.teardown().await;
                return ResolveOutcome::Cancelled { attempts };
            }
            let endpoint = attempts[index].endpoint.clone();
            debug!(content_id, %endpoint, attempt = index + 1, "loading resource");

            let loaded = tokio::time::timeout(self.attempt_timeout, self.player.load(&endpoint)).await;
            if cancel.is_cancelled() {
                self.player.teardown().await;
                return ResolveOutcome::Cancelled { attempts };
            }

            match loaded {
                Ok(Ok(())) => {
                    attempts[index].state = AttemptState::Succeeded;
                    session.mark_played(content_id);
                    info!(content_id, %endpoint, attempt = index + 1, "resource ready");
                    return ResolveOutcome::Succeeded { endpoint, attempts };
                }
                Ok(Err(err)) => {
                    warn!(content_id, %endpoint, error = %err, "endpoint failed");
                    attempts[index].state =
                        AttemptState::Failed(AttemptFailure::LoadError(err.to_string()));
                }
                Err(_) => {
                    warn!(
                        content_id,
                        %endpoint,
                        timeout_ms = self.attempt_timeout.as_millis() as u64,
                        "endpoint timed out"
                    );
                    attempts[index].state = AttemptState::Failed(AttemptFailure::TimedOut);
                }
            }
            self.player.teardown().await;
        }

        warn!(content_id, attempts = attempts.len(), "all endpoints exhausted");
        ResolveOutcome::Exhausted { attempts }
    }

    async fn load_local(&self, session: &Session, content_id: &str) -> ResolveOutcome {
        let failure =
            match tokio::time::timeout(self.attempt_timeout, self.player.load(content_id)).await {
                Ok(Ok(())) => {
                    session.mark_played(content_id);
                    return ResolveOutcome::Local {
                        uri: content_id.to_string(),
                    };
                }
                Ok(Err(err)) => AttemptFailure::LoadError(err.to_string()),
                Err(_) => AttemptFailure::TimedOut,
            };
        warn!(content_id, ?failure, "local asset failed to load");
        self.player.teardown().await;
        ResolveOutcome::Exhausted {
            attempts: vec![ResourceAttempt {
                endpoint: content_id.to_string(),
                state: AttemptState::Failed(failure),
            }],
        }
    }
}
