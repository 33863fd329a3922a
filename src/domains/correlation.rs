use crate::domains::message::{Message, ResponseBody};

/// Who authored a message, as far as the classifier can tell.
///
/// `Own` is the caller itself, `Peer` the automated counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Own,
    Peer,
    Unknown,
}

impl Classification {
    pub fn is_definite(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationState {
    Idle,
    Sent,
    Polling,
    Resolved,
    TimedOut,
    ChannelUnavailable,
}

impl CorrelationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Resolved | Self::TimedOut | Self::ChannelUnavailable
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Structured,
    /// Built from plain text because the body did not match the response shape.
    RawText,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub message: Message,
    pub body: ResponseBody,
    pub source: ResponseSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationOutcome {
    Resolved(Response),
    TimedOut,
    ChannelUnavailable,
}

impl CorrelationOutcome {
    pub fn state(&self) -> CorrelationState {
        match self {
            Self::Resolved(_) => CorrelationState::Resolved,
            Self::TimedOut => CorrelationState::TimedOut,
            Self::ChannelUnavailable => CorrelationState::ChannelUnavailable,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Resolved(response) => Some(response),
            _ => None,
        }
    }
}
