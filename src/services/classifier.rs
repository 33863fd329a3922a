//! Sender classification as an ordered chain of tiers.
//!
//! Each tier is a pure function that either returns a definite
//! [`Classification`] or `None` for "no opinion". The first definite answer
//! wins; if every tier abstains the message stays `Unknown`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domains::correlation::Classification;
use crate::domains::message::{Direction, Message, ParsedContent};

/// Inputs a tier may consult besides the message itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyContext<'a> {
    pub own_identity: Option<&'a str>,
    /// Id and classification of the most recently accepted message.
    pub previous: Option<(&'a str, Classification)>,
}

pub type Tier = fn(&Message, &ParsedContent, &ClassifyContext<'_>) -> Option<Classification>;

pub const DEFAULT_TIERS: [(&str, Tier); 4] = [
    ("direction", by_direction),
    ("identity", by_identity),
    ("sequence", by_sequence),
    ("content", by_content),
];

pub struct SenderClassifier {
    tiers: Vec<(&'static str, Tier)>,
}

impl Default for SenderClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SenderClassifier {
    pub fn new() -> Self {
        Self {
            tiers: DEFAULT_TIERS.to_vec(),
        }
    }

    pub fn with_tiers(tiers: Vec<(&'static str, Tier)>) -> Self {
        Self { tiers }
    }

    pub fn classify(
        &self,
        message: &Message,
        parsed: &ParsedContent,
        ctx: &ClassifyContext<'_>,
    ) -> Classification {
        for (name, tier) in &self.tiers {
            if let Some(found) = tier(message, parsed, ctx) {
                tracing::trace!(message_id = %message.id, tier = *name, ?found, "classified");
                return found;
            }
        }
        Classification::Unknown
    }
}

pub fn by_direction(
    message: &Message,
    _parsed: &ParsedContent,
    _ctx: &ClassifyContext<'_>,
) -> Option<Classification> {
    message.direction_hint.map(|direction| match direction {
        Direction::Sent => Classification::Own,
        Direction::Received => Classification::Peer,
    })
}

pub fn by_identity(
    message: &Message,
    _parsed: &ParsedContent,
    ctx: &ClassifyContext<'_>,
) -> Option<Classification> {
    let sender = message.sender_hint.as_deref().map(str::trim)?;
    let own = ctx.own_identity.map(str::trim)?;
    if sender.is_empty() || own.is_empty() {
        return None;
    }
    if sender.eq_ignore_ascii_case(own) {
        Some(Classification::Own)
    } else {
        Some(Classification::Peer)
    }
}

/// Strict request/reply turn taking: whatever follows our own message is the
/// counterparty's.
pub fn by_sequence(
    message: &Message,
    _parsed: &ParsedContent,
    ctx: &ClassifyContext<'_>,
) -> Option<Classification> {
    match ctx.previous {
        Some((previous_id, Classification::Own)) if previous_id != message.id => {
            Some(Classification::Peer)
        }
        _ => None,
    }
}

static APOLOGY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(sorry|apolog(y|ies|ise|ize)|my bad|unfortunately)\b").unwrap()
});
static VERDICT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(correct|incorrect|not quite|well done|great job|nice try|the (right |correct )?answer (is|was))\b",
    )
    .unwrap()
});
static GREETING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(hi|hello|hey|welcome|greetings|gm)\b").unwrap()
});
static MUSIC_EMOJI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[🎵🎶🎼🎤🎧🎹🎸🎻🎺🥁]").unwrap());

const LONG_TEXT_CHARS: usize = 160;
const SHORT_ANSWER_CHARS: usize = 2;

struct ContentPredicate {
    name: &'static str,
    verdict: Classification,
    matches: fn(&ParsedContent, &str) -> bool,
}

// Tuned to the quiz agent's reply style. Known to misfire; keep it last.
static CONTENT_PREDICATES: [ContentPredicate; 8] = [
    ContentPredicate {
        name: "request_shape",
        verdict: Classification::Own,
        matches: |parsed, _| matches!(parsed, ParsedContent::Request(_)),
    },
    ContentPredicate {
        name: "response_shape",
        verdict: Classification::Peer,
        matches: |parsed, _| matches!(parsed, ParsedContent::Response(_)),
    },
    ContentPredicate {
        name: "apology",
        verdict: Classification::Peer,
        matches: |_, text| APOLOGY_RE.is_match(text),
    },
    ContentPredicate {
        name: "verdict",
        verdict: Classification::Peer,
        matches: |_, text| VERDICT_RE.is_match(text),
    },
    ContentPredicate {
        name: "greeting",
        verdict: Classification::Peer,
        matches: |_, text| GREETING_RE.is_match(text),
    },
    ContentPredicate {
        name: "music_emoji",
        verdict: Classification::Peer,
        matches: |_, text| MUSIC_EMOJI_RE.is_match(text),
    },
    ContentPredicate {
        name: "long_text",
        verdict: Classification::Peer,
        matches: |_, text| text.chars().count() > LONG_TEXT_CHARS,
    },
    ContentPredicate {
        name: "short_answer",
        verdict: Classification::Own,
        matches: |_, text| {
            let len = text.trim().chars().count();
            len > 0 && len <= SHORT_ANSWER_CHARS
        },
    },
];

pub fn by_content(
    _message: &Message,
    parsed: &ParsedContent,
    _ctx: &ClassifyContext<'_>,
) -> Option<Classification> {
    let text = match parsed {
        ParsedContent::Response(body) => body.explanation.as_str(),
        ParsedContent::Request(body) => body.selected_value.as_str(),
        ParsedContent::RawText(text) => text.as_str(),
    };
    CONTENT_PREDICATES
        .iter()
        .find(|predicate| (predicate.matches)(parsed, text))
        .map(|predicate| {
            tracing::trace!(predicate = predicate.name, "content predicate matched");
            predicate.verdict
        })
}
