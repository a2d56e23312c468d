// Session ownership: the token pair, its persistence, and the guard that
// keeps concurrent refreshes from racing each other.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use finmodel_core::protocol::Session;
use finmodel_core::store::{SessionStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Session lifecycle transitions, published for whoever drives the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    LoggedOut,
    /// The session could not be recovered; the user must log in again.
    Expired,
}

/// Holds the current access/refresh pair in a [`SessionStore`].
///
/// Every token write or clear bumps a generation counter. A request that
/// failed with 401 remembers the generation it started under; if the
/// counter has moved by the time it holds the refresh guard, another task
/// already replaced the tokens and no second refresh is needed.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    refresh_guard: Mutex<()>,
    generation: AtomicU64,
    events: Option<mpsc::Sender<SessionEvent>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            refresh_guard: Mutex::new(()),
            generation: AtomicU64::new(0),
            events: None,
        }
    }

    /// Publish [`SessionEvent`]s on `tx`. Sends never block; events are
    /// dropped when the channel is full or closed.
    pub fn with_events(mut self, tx: mpsc::Sender<SessionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.store.get(REFRESH_TOKEN_KEY)
    }

    /// True only when both tokens are stored.
    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.access_token()?.is_some() && self.refresh_token()?.is_some())
    }

    /// Replace both tokens at once.
    pub fn store_session(&self, session: &Session) -> Result<()> {
        self.store.set_many(&[
            (ACCESS_TOKEN_KEY, session.access_token.as_str()),
            (REFRESH_TOKEN_KEY, session.refresh_token.as_str()),
        ])?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!("session tokens stored");
        Ok(())
    }

    /// Remove both tokens.
    pub fn clear(&self) -> Result<()> {
        self.store
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!("session cleared");
        Ok(())
    }

    /// Counter bumped by every [`store_session`](Self::store_session) and
    /// [`clear`](Self::clear).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Serialises refresh attempts.
    pub(crate) async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_guard.lock().await
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                debug!("session event dropped: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finmodel_core::store::MemorySessionStore;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(MemorySessionStore::new()))
    }

    fn session(access: &str, refresh: &str) -> Session {
        Session {
            access_token: access.into(),
            refresh_token: refresh.into(),
        }
    }

    #[test]
    fn starts_anonymous() {
        let m = manager();
        assert!(!m.is_authenticated().unwrap());
        assert_eq!(m.generation(), 0);
    }

    #[test]
    fn store_and_clear_bump_generation() {
        let m = manager();
        m.store_session(&session("a1", "r1")).unwrap();
        assert_eq!(m.generation(), 1);
        assert!(m.is_authenticated().unwrap());
        assert_eq!(m.refresh_token().unwrap().as_deref(), Some("r1"));

        m.store_session(&session("a2", "r2")).unwrap();
        assert_eq!(m.generation(), 2);
        assert_eq!(m.access_token().unwrap().as_deref(), Some("a2"));

        m.clear().unwrap();
        assert_eq!(m.generation(), 3);
        assert_eq!(m.access_token().unwrap(), None);
        assert_eq!(m.refresh_token().unwrap(), None);
        assert!(!m.is_authenticated().unwrap());
    }

    #[test]
    fn half_a_pair_is_not_a_session() {
        let store = Arc::new(MemorySessionStore::new());
        store.set(ACCESS_TOKEN_KEY, "a1").unwrap();
        let m = SessionManager::new(store);
        assert!(!m.is_authenticated().unwrap());
        assert_eq!(m.access_token().unwrap().as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn events_are_published() {
        let (tx, mut rx) = mpsc::channel(4);
        let m = manager().with_events(tx);
        m.emit(SessionEvent::LoggedIn);
        m.emit(SessionEvent::Expired);
        assert_eq!(rx.recv().await, Some(SessionEvent::LoggedIn));
        assert_eq!(rx.recv().await, Some(SessionEvent::Expired));
    }

    #[tokio::test]
    async fn full_channel_drops_events_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let m = manager().with_events(tx);
        m.emit(SessionEvent::LoggedIn);
        m.emit(SessionEvent::LoggedOut);
        assert_eq!(rx.recv().await, Some(SessionEvent::LoggedIn));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn emit_without_channel_is_noop() {
        manager().emit(SessionEvent::Refreshed);
    }
}
