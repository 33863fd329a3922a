#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Succeeded,
    Failed(AttemptFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    LoadError(String),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAttempt {
    pub endpoint: String,
    pub state: AttemptState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Skip resolution when the identifier already played in this session.
    Once,
    Replay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The identifier named a bundled asset; no endpoint was tried.
    Local { uri: String },
    Succeeded {
        endpoint: String,
        attempts: Vec<ResourceAttempt>,
    },
    Exhausted { attempts: Vec<ResourceAttempt> },
    AlreadyPlayed,
    Cancelled { attempts: Vec<ResourceAttempt> },
}

impl ResolveOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Local { .. } | Self::Succeeded { .. })
    }

    pub fn attempts(&self) -> &[ResourceAttempt] {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::Exhausted { attempts }
            | Self::Cancelled { attempts } => attempts,
            Self::Local { .. } | Self::AlreadyPlayed => &[],
        }
    }
}
