//! Per-user upload state.
//!
//! A session exists between "deck received" and "image received". The store
//! only guarantees that each single operation is atomic; callers that need
//! `try_consume` and the work after it to be exclusive per user must hold
//! their own per-user lock.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identity of the user a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a session is in the upload sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// A deck is stored and the background image has not arrived yet.
    AwaitingImage,
}

/// A pending upload for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub pending_deck_path: PathBuf,
    pub state: SessionState,
}

/// Mapping from user to pending session.
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: Mutex<HashMap<UserId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a deck for `user_id`, replacing any earlier one.
    ///
    /// Returns the displaced session so the caller can dispose of its deck.
    pub fn put(&self, user_id: UserId, deck_path: impl AsRef<Path>) -> Option<Session> {
        let session = Session {
            user_id,
            pending_deck_path: deck_path.as_ref().to_path_buf(),
            state: SessionState::AwaitingImage,
        };
        let previous = self.entries.lock().insert(user_id, session);
        log::debug!(
            "Session for user {} awaiting image ({})",
            user_id,
            deck_path.as_ref().display()
        );
        previous
    }

    /// Take the pending deck path for `user_id`, removing the session.
    pub fn try_consume(&self, user_id: UserId) -> Result<PathBuf> {
        self.entries
            .lock()
            .remove(&user_id)
            .map(|session| session.pending_deck_path)
            .ok_or(Error::NotReady(user_id))
    }

    /// Remove any session for `user_id`. Absent entries are fine.
    pub fn clear(&self, user_id: UserId) {
        if self.entries.lock().remove(&user_id).is_some() {
            log::debug!("Cleared session for user {}", user_id);
        }
    }

    /// Current session for `user_id`, if any.
    pub fn get(&self, user_id: UserId) -> Option<Session> {
        self.entries.lock().get(&user_id).cloned()
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.entries.lock().contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_consume() {
        let store = SessionStore::new();
        assert!(store.put(UserId(1), "input_1.pptx").is_none());

        let session = store.get(UserId(1)).unwrap();
        assert_eq!(session.state, SessionState::AwaitingImage);

        assert_eq!(
            store.try_consume(UserId(1)).unwrap(),
            PathBuf::from("input_1.pptx")
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_consume_without_put_is_not_ready() {
        let store = SessionStore::new();
        let err = store.try_consume(UserId(42)).unwrap_err();
        assert!(matches!(err, Error::NotReady(UserId(42))));
    }

    #[test]
    fn test_consume_twice_second_is_not_ready() {
        let store = SessionStore::new();
        store.put(UserId(3), "deck.pptx");
        store.try_consume(UserId(3)).unwrap();
        assert!(matches!(
            store.try_consume(UserId(3)),
            Err(Error::NotReady(_))
        ));
    }

    #[test]
    fn test_put_overwrites_and_returns_previous() {
        let store = SessionStore::new();
        store.put(UserId(5), "first.pptx");
        let previous = store.put(UserId(5), "second.pptx").unwrap();

        assert_eq!(previous.pending_deck_path, PathBuf::from("first.pptx"));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.try_consume(UserId(5)).unwrap(),
            PathBuf::from("second.pptx")
        );
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = SessionStore::new();
        store.put(UserId(9), "deck.pptx");
        store.clear(UserId(9));
        store.clear(UserId(9));
        assert!(!store.contains(UserId(9)));
    }

    #[test]
    fn test_users_are_independent() {
        let store = SessionStore::new();
        store.put(UserId(1), "a.pptx");
        store.put(UserId(2), "b.pptx");
        store.clear(UserId(1));

        assert!(!store.contains(UserId(1)));
        assert!(store.contains(UserId(2)));
    }
}
