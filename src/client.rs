use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::domains::correlation::CorrelationOutcome;
use crate::domains::message::Request;
use crate::domains::resource::{ResolveMode, ResolveOutcome};
use crate::error::Result;
use crate::factories::channel_factory::ChannelFactory;
use crate::interfaces::channel::MessageChannel;
use crate::interfaces::media::MediaPlayer;
use crate::services::audio::{HttpAudioPlayer, LoadedAudio};
use crate::services::correlator::{CancelFlag, CorrelationHandle, RequestCorrelator};
use crate::services::resolver::ResourceResolver;
use crate::session::Session;

/// Everything one caller needs: a session, a correlator bound to the
/// configured channel and a resolver bound to a player.
pub struct ChorusClient {
    session: Arc<Session>,
    correlator: Arc<RequestCorrelator>,
    resolver: ResourceResolver,
    audio: Option<Arc<HttpAudioPlayer>>,
}

impl ChorusClient {
    pub async fn from_config(config: Config) -> Result<Self> {
        Self::from_config_with_token(config, None).await
    }

    pub async fn from_config_with_token(config: Config, token: Option<String>) -> Result<Self> {
        let channel = ChannelFactory::create_from_config(&config, token).await?;
        Self::with_channel(channel, &config)
    }

    pub async fn from_config_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::from_file(path)?;
        Self::from_config(config).await
    }

    /// Uses the HTTP player for resources.
    pub fn with_channel(channel: Arc<dyn MessageChannel>, config: &Config) -> Result<Self> {
        let audio = Arc::new(HttpAudioPlayer::new(config.resources().proxy_base_url)?);
        let mut client = Self::with_parts(channel, audio.clone(), config);
        client.audio = Some(audio);
        Ok(client)
    }

    pub fn with_parts(
        channel: Arc<dyn MessageChannel>,
        player: Arc<dyn MediaPlayer>,
        config: &Config,
    ) -> Self {
        let resources = config.resources();
        let session = Arc::new(Session::with_played_capacity(
            config.own_id(),
            resources.played_capacity(),
        ));
        Self {
            session,
            correlator: Arc::new(RequestCorrelator::new(channel, config.correlation())),
            resolver: ResourceResolver::new(player, &resources),
            audio: None,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn resolver(&self) -> &ResourceResolver {
        &self.resolver
    }

    pub async fn ask(&self, request: &Request, cancel: &CancelFlag) -> Result<CorrelationOutcome> {
        self.correlator.correlate(&self.session, request, cancel).await
    }

    pub fn ask_in_background(&self, request: Request) -> Result<CorrelationHandle> {
        self.correlator.spawn(self.session.clone(), request)
    }

    pub async fn fetch_audio(&self, content_id: &str, mode: ResolveMode) -> ResolveOutcome {
        self.resolver.resolve(&self.session, content_id, mode).await
    }

    /// Ask, then load the resource the answer points at, if any. The
    /// resource is only fetched once per session.
    pub async fn ask_and_prepare_audio(
        &self,
        request: &Request,
        cancel: &CancelFlag,
    ) -> Result<(CorrelationOutcome, Option<ResolveOutcome>)> {
        let outcome = self.ask(request, cancel).await?;
        let resource_id = outcome
            .response()
            .and_then(|response| response.body.resource_id.clone());
        let resolved = match resource_id {
            Some(resource_id) => {
                info!(correlation_id = request.correlation_id(), %resource_id, "preparing audio");
                Some(
                    self.resolver
                        .resolve_with_cancel(&self.session, &resource_id, ResolveMode::Once, cancel)
                        .await,
                )
            }
            None => None,
        };
        Ok((outcome, resolved))
    }

    /// The asset the HTTP player holds, when this client owns one.
    pub async fn loaded_audio(&self) -> Option<LoadedAudio> {
        match &self.audio {
            Some(audio) => audio.current().await,
            None => None,
        }
    }
}
