use std::collections::HashSet;

use crate::domains::correlation::Classification;
use crate::domains::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DuplicateId,
    /// Loop-back copy of something we already sent.
    Echo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

struct AcceptedOwn {
    content: String,
    sent_at: i64,
}

/// Accept/reject bookkeeping for one polling session.
///
/// Ids accepted with a definite classification, and ids rejected as echoes,
/// are consumed for the rest of the session. `Unknown` messages are only
/// remembered until the next poll so a later snapshot can classify them.
pub struct DeduplicationFilter {
    echo_window_ms: i64,
    consumed: HashSet<String>,
    provisional: HashSet<String>,
    accepted_own: Vec<AcceptedOwn>,
}

impl DeduplicationFilter {
    pub fn new(echo_window_ms: i64) -> Self {
        Self {
            echo_window_ms: echo_window_ms.max(0),
            consumed: HashSet::new(),
            provisional: HashSet::new(),
            accepted_own: Vec::new(),
        }
    }

    pub fn begin_poll(&mut self) {
        self.provisional.clear();
    }

    pub fn is_consumed(&self, id: &str) -> bool {
        self.consumed.contains(id)
    }

    pub fn check(&mut self, message: &Message, classification: Classification) -> Verdict {
        if self.consumed.contains(&message.id) || self.provisional.contains(&message.id) {
            return Verdict::Reject(RejectReason::DuplicateId);
        }

        if classification == Classification::Own {
            let content = message.content.as_text();
            let echoed = self.accepted_own.iter().any(|earlier| {
                let delta = message.sent_at - earlier.sent_at;
                earlier.content == content && (0..=self.echo_window_ms).contains(&delta)
            });
            if echoed {
                self.consumed.insert(message.id.clone());
                return Verdict::Reject(RejectReason::Echo);
            }
            self.accepted_own.push(AcceptedOwn {
                content,
                sent_at: message.sent_at,
            });
        }

        if classification.is_definite() {
            self.consumed.insert(message.id.clone());
        } else {
            self.provisional.insert(message.id.clone());
        }
        Verdict::Accept
    }
}
