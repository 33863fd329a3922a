use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::ops::Deref;
use std::sync::{Mutex, RwLock};

use lru::LruCache;

use crate::config::DEFAULT_PLAYED_CAPACITY;
use crate::domains::correlation::CorrelationState;
use crate::error::{ChorusError, Result};

/// Conversation state owned by the caller and handed to the correlator and
/// resolver. Dropping it discards everything.
pub struct Session {
    own_identity: RwLock<Option<String>>,
    outstanding: Mutex<HashMap<String, CorrelationState>>,
    played: Mutex<LruCache<String, ()>>,
}

/// Registration of one in-flight correlation id. Dropping it releases the
/// id, so a correlation future that is dropped mid-poll leaves nothing behind.
pub(crate) struct Outstanding<S: Deref<Target = Session>> {
    session: S,
    correlation_id: String,
}

impl<S: Deref<Target = Session>> Outstanding<S> {
    pub(crate) fn begin(session: S, correlation_id: &str) -> Result<Self> {
        session.begin_request(correlation_id)?;
        Ok(Self {
            session,
            correlation_id: correlation_id.to_string(),
        })
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }
}

impl<S: Deref<Target = Session>> Drop for Outstanding<S> {
    fn drop(&mut self) {
        self.session.finish_request(&self.correlation_id);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Session {
    pub fn new(own_identity: Option<String>) -> Self {
        Self::with_played_capacity(own_identity, DEFAULT_PLAYED_CAPACITY)
    }

    pub fn with_played_capacity(own_identity: Option<String>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            own_identity: RwLock::new(own_identity),
            outstanding: Mutex::new(HashMap::new()),
            played: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn own_identity(&self) -> Option<String> {
        self.own_identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Identity can be learned mid-conversation; polls after this see it.
    pub fn set_own_identity(&self, identity: impl Into<String>) {
        let mut guard = self.own_identity.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(identity.into());
    }

    pub fn correlation_state(&self, correlation_id: &str) -> Option<CorrelationState> {
        self.outstanding
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(correlation_id)
            .copied()
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub(crate) fn begin_request(&self, correlation_id: &str) -> Result<()> {
        let mut outstanding = self.outstanding.lock().unwrap_or_else(|e| e.into_inner());
        if outstanding.contains_key(correlation_id) {
            return Err(ChorusError::DuplicateRequest(correlation_id.to_string()));
        }
        outstanding.insert(correlation_id.to_string(), CorrelationState::Idle);
        Ok(())
    }

    pub(crate) fn set_state(&self, correlation_id: &str, state: CorrelationState) {
        let mut outstanding = self.outstanding.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = outstanding.get_mut(correlation_id) {
            *entry = state;
        }
    }

    pub(crate) fn finish_request(&self, correlation_id: &str) {
        self.outstanding
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(correlation_id);
    }

    pub fn has_played(&self, content_id: &str) -> bool {
        self.played
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(content_id)
    }

    pub(crate) fn mark_played(&self, content_id: &str) {
        self.played
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(content_id.to_string(), ());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_for_same_id_is_rejected() {
        let session = Session::default();
        session.begin_request("q-1").unwrap();
        let err = session.begin_request("q-1").unwrap_err();
        assert!(matches!(err, ChorusError::DuplicateRequest(id) if id == "q-1"));

        session.finish_request("q-1");
        session.begin_request("q-1").unwrap();
    }

    #[test]
    fn dropping_the_registration_releases_the_id() {
        let session = Session::default();
        let outstanding = Outstanding::begin(&session, "q-1").unwrap();
        assert!(matches!(
            Outstanding::begin(&session, "q-1"),
            Err(ChorusError::DuplicateRequest(_))
        ));
        assert_eq!(session.outstanding_count(), 1);

        drop(outstanding);
        assert_eq!(session.outstanding_count(), 0);
        assert!(Outstanding::begin(&session, "q-1").is_ok());
    }

    #[test]
    fn played_set_is_bounded() {
        let session = Session::with_played_capacity(None, 2);
        session.mark_played("a");
        session.mark_played("b");
        session.mark_played("c");
        assert!(!session.has_played("a"));
        assert!(session.has_played("b"));
        assert!(session.has_played("c"));
    }
}
