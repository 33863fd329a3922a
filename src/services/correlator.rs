use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Map;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CorrelationConfig;
use crate::domains::correlation::{
    Classification, CorrelationOutcome, CorrelationState, Response, ResponseSource,
};
use crate::domains::message::{Message, ParsedContent, Request, ResponseBody};
use crate::error::{ChorusError, Result};
use crate::interfaces::channel::MessageChannel;
use crate::services::classifier::{ClassifyContext, SenderClassifier};
use crate::services::dedup::{DeduplicationFilter, Verdict};
use crate::session::{Outstanding, Session};

/// Cooperative cancellation, observed before each poll and after each
/// network call.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct RequestCorrelator {
    channel: Arc<dyn MessageChannel>,
    classifier: SenderClassifier,
    config: CorrelationConfig,
}

impl RequestCorrelator {
    pub fn new(channel: Arc<dyn MessageChannel>, config: CorrelationConfig) -> Self {
        Self {
            channel,
            classifier: SenderClassifier::new(),
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: SenderClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Send `request` and wait for the counterparty's answer.
    ///
    /// Returns `DuplicateRequest` if the correlation id is already in flight in
    /// this session and `Cancelled` if `cancel` fired first.
    pub async fn correlate(
        &self,
        session: &Session,
        request: &Request,
        cancel: &CancelFlag,
    ) -> Result<CorrelationOutcome> {
        let _outstanding = Outstanding::begin(session, request.correlation_id())?;
        self.run(session, request, cancel).await
    }

    /// Like [`correlate`](Self::correlate) but on a background task.
    pub fn spawn(
        self: &Arc<Self>,
        session: Arc<Session>,
        request: Request,
    ) -> Result<CorrelationHandle> {
        let outstanding = Outstanding::begin(session, request.correlation_id())?;
        let cancel = CancelFlag::new();
        let correlator = self.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            correlator
                .run(outstanding.session(), &request, &task_cancel)
                .await
        });
        Ok(CorrelationHandle { cancel, task })
    }

    async fn run(
        &self,
        session: &Session,
        request: &Request,
        cancel: &CancelFlag,
    ) -> Result<CorrelationOutcome> {
        let correlation_id = request.correlation_id();
        let content = request.to_content()?;
        if cancel.is_cancelled() {
            return Err(ChorusError::Cancelled(correlation_id.to_string()));
        }

        match self.channel.append(content).await {
            Ok(sent) => {
                session.set_state(correlation_id, CorrelationState::Sent);
                info!(correlation_id, message_id = %sent.id, "request sent");
            }
            Err(ChorusError::ChannelUnavailable(reason)) => {
                warn!(correlation_id, %reason, "channel unavailable");
                session.set_state(correlation_id, CorrelationState::ChannelUnavailable);
                return Ok(CorrelationOutcome::ChannelUnavailable);
            }
            Err(err) => return Err(err),
        }
        if cancel.is_cancelled() {
            return Err(ChorusError::Cancelled(correlation_id.to_string()));
        }

        let started = Instant::now();
        let timeout = self.config.timeout();
        let interval = self.config.poll_interval();
        let mut poll = PollSession::new(request, &self.config);
        let mut wake = self.channel.subscribe();
        session.set_state(correlation_id, CorrelationState::Polling);

        loop {
            if cancel.is_cancelled() {
                debug!(correlation_id, "correlation cancelled");
                return Err(ChorusError::Cancelled(correlation_id.to_string()));
            }
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }

            match tokio::time::timeout(remaining, self.channel.snapshot()).await {
                Ok(Ok(messages)) => {
                    if cancel.is_cancelled() {
                        return Err(ChorusError::Cancelled(correlation_id.to_string()));
                    }
                    let own_identity = session.own_identity();
                    if let Some(response) =
                        poll.evaluate(&self.classifier, own_identity.as_deref(), messages)
                    {
                        info!(
                            correlation_id,
                            message_id = %response.message.id,
                            source = ?response.source,
                            "response correlated"
                        );
                        session.set_state(correlation_id, CorrelationState::Resolved);
                        return Ok(CorrelationOutcome::Resolved(response));
                    }
                }
                Ok(Err(err)) => warn!(correlation_id, error = %err, "snapshot failed"),
                Err(_) => debug!(correlation_id, "snapshot outlived the correlation bound"),
            }

            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            wait_for_next_poll(interval.min(remaining), &mut wake).await;
        }

        info!(correlation_id, elapsed_ms = started.elapsed().as_millis() as u64, "correlation timed out");
        session.set_state(correlation_id, CorrelationState::TimedOut);
        Ok(CorrelationOutcome::TimedOut)
    }
}

/// Push notifications only shorten the wait; the snapshot stays authoritative.
async fn wait_for_next_poll(delay: Duration, wake: &mut Option<BoxStream<'static, Message>>) {
    let closed = match wake {
        Some(stream) => tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            next = stream.next() => next.is_none(),
        },
        None => {
            tokio::time::sleep(delay).await;
            false
        }
    };
    if closed {
        *wake = None;
    }
}

pub struct CorrelationHandle {
    cancel: CancelFlag,
    task: JoinHandle<Result<CorrelationOutcome>>,
}

impl CorrelationHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// `None` when the correlation was cancelled.
    pub async fn join(self) -> Result<Option<CorrelationOutcome>> {
        match self.task.await {
            Ok(Ok(outcome)) => Ok(Some(outcome)),
            Ok(Err(ChorusError::Cancelled(_))) => Ok(None),
            Ok(Err(err)) => Err(err),
            Err(err) => Err(ChorusError::Runtime(err.to_string())),
        }
    }
}

struct Candidate {
    sent_at: i64,
    message: Message,
    body: CandidateBody,
}

enum CandidateBody {
    Structured(ResponseBody),
    Text(String),
}

/// Filtering state for one correlation attempt. Only consumed ids, definite
/// classifications and the last accepted message survive between polls.
struct PollSession {
    correlation_id: String,
    issued_at: i64,
    accept_raw_text: bool,
    positive_keywords: Vec<String>,
    negative_keywords: Vec<String>,
    filter: DeduplicationFilter,
    memo: HashMap<String, Classification>,
    previous: Option<(String, Classification)>,
}

impl PollSession {
    fn new(request: &Request, config: &CorrelationConfig) -> Self {
        Self {
            correlation_id: request.correlation_id().to_string(),
            issued_at: request.issued_at(),
            accept_raw_text: config.accept_raw_text(),
            positive_keywords: lowercase(config.positive_keywords()),
            negative_keywords: lowercase(config.negative_keywords()),
            filter: DeduplicationFilter::new(config.echo_window_ms()),
            memo: HashMap::new(),
            previous: None,
        }
    }

    fn evaluate(
        &mut self,
        classifier: &SenderClassifier,
        own_identity: Option<&str>,
        snapshot: Vec<Message>,
    ) -> Option<Response> {
        self.filter.begin_poll();

        let mut relevant: Vec<(usize, Message, ParsedContent)> = snapshot
            .into_iter()
            .enumerate()
            .filter(|(_, message)| !self.filter.is_consumed(&message.id))
            .filter_map(|(index, message)| {
                let parsed = ParsedContent::parse(&message.content);
                let keep = match parsed.correlation_id() {
                    Some(id) => id == self.correlation_id,
                    None => self.accept_raw_text && message.sent_at >= self.issued_at,
                };
                keep.then_some((index, message, parsed))
            })
            .collect();
        relevant.sort_by_key(|(index, message, _)| (message.sent_at, *index));

        let mut structured: Option<Candidate> = None;
        let mut text: Option<Candidate> = None;

        for (_, message, parsed) in relevant {
            let classification = self.classify(classifier, own_identity, &message, &parsed);
            if let Verdict::Reject(reason) = self.filter.check(&message, classification) {
                debug!(message_id = %message.id, ?reason, "message rejected");
                continue;
            }
            self.previous = Some((message.id.clone(), classification));
            if classification != Classification::Peer {
                continue;
            }

            let (slot, body) = match parsed {
                ParsedContent::Response(body) => (&mut structured, CandidateBody::Structured(body)),
                ParsedContent::RawText(raw) => (&mut text, CandidateBody::Text(raw)),
                ParsedContent::Request(_) => continue,
            };
            let newer = slot
                .as_ref()
                .map_or(true, |current| message.sent_at > current.sent_at);
            if newer {
                *slot = Some(Candidate {
                    sent_at: message.sent_at,
                    message,
                    body,
                });
            }
        }

        structured.or(text).map(|candidate| self.into_response(candidate))
    }

    fn classify(
        &mut self,
        classifier: &SenderClassifier,
        own_identity: Option<&str>,
        message: &Message,
        parsed: &ParsedContent,
    ) -> Classification {
        if let Some(known) = self.memo.get(&message.id) {
            return *known;
        }
        let ctx = ClassifyContext {
            own_identity,
            previous: self
                .previous
                .as_ref()
                .map(|(id, classification)| (id.as_str(), *classification)),
        };
        let classification = classifier.classify(message, parsed, &ctx);
        if classification.is_definite() {
            self.memo.insert(message.id.clone(), classification);
        }
        classification
    }

    fn into_response(&self, candidate: Candidate) -> Response {
        match candidate.body {
            CandidateBody::Structured(body) => Response {
                message: candidate.message,
                body,
                source: ResponseSource::Structured,
            },
            CandidateBody::Text(raw) => {
                debug!(message_id = %candidate.message.id, "falling back to raw text response");
                let trimmed = raw.trim().to_string();
                Response {
                    body: ResponseBody {
                        correlation_id: self.correlation_id.clone(),
                        value: trimmed.clone(),
                        explanation: trimmed,
                        resource_id: None,
                        is_correct: self.infer_correctness(&raw),
                        extra: Map::new(),
                    },
                    message: candidate.message,
                    source: ResponseSource::RawText,
                }
            }
        }
    }

    fn infer_correctness(&self, text: &str) -> Option<bool> {
        let lowered = text.to_lowercase();
        if self
            .negative_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
        {
            return Some(false);
        }
        if self
            .positive_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
        {
            return Some(true);
        }
        None
    }
}

fn lowercase(words: Vec<String>) -> Vec<String> {
    words
        .into_iter()
        .map(|word| word.trim().to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}
