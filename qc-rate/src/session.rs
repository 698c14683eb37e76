//! Per-rater workflow state keyed by a session cookie
//!
//! The database `sessions` row records who rated what. The state here
//! tracks where the rater is in the show/submit loop and which selection
//! result they are waiting on. It lives in memory and is lost on restart;
//! a rater without state is sent back to the step chooser.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use qc_common::Step;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::dispatcher::TaskHandle;

/// Cookie holding the opaque state token
pub const SESSION_COOKIE: &str = "qc_session";

/// Position in the rating loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Session created, first image not shown yet
    AwaitingFirstImage,
    /// Image shown and awaiting a judgment
    Displaying(i64),
    /// Judgment stored, next image not shown yet
    Submitted(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: i64,
    pub step: Step,
    pub phase: Phase,
    /// Outstanding selection for the next image
    pub pending: Option<TaskHandle>,
}

impl SessionState {
    pub fn new(session_id: i64, step: Step) -> Self {
        Self {
            session_id,
            step,
            phase: Phase::AwaitingFirstImage,
            pending: None,
        }
    }

    /// Image currently on screen
    pub fn displayed_image(&self) -> Option<i64> {
        match self.phase {
            Phase::Displaying(id) => Some(id),
            _ => None,
        }
    }

    /// Most recent image the rater saw, used as the selection exclusion
    pub fn last_image(&self) -> Option<i64> {
        match self.phase {
            Phase::Displaying(id) | Phase::Submitted(id) => Some(id),
            Phase::AwaitingFirstImage => None,
        }
    }
}

/// Idle time after which a rater's workflow state is dropped
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone)]
struct StoredSession {
    state: SessionState,
    touched_at: Instant,
}

/// In-memory map from cookie token to workflow state
///
/// Entries idle for longer than the TTL are pruned whenever a new session
/// is inserted, and are invisible to lookups in the meantime.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, StoredSession>>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
        }
    }

    /// Store a new state under a fresh token
    pub async fn insert(&self, state: SessionState) -> String {
        let token = Uuid::new_v4().to_string();
        let mut sessions = self.inner.write().await;
        self.prune_idle(&mut sessions);
        sessions.insert(
            token.clone(),
            StoredSession {
                state,
                touched_at: Instant::now(),
            },
        );
        debug!(sessions = sessions.len(), "Web session stored");
        token
    }

    pub async fn get(&self, token: &str) -> Option<SessionState> {
        self.inner
            .read()
            .await
            .get(token)
            .filter(|stored| stored.touched_at.elapsed() < self.idle_ttl)
            .map(|stored| stored.state.clone())
    }

    /// Replace the state for an existing token
    pub async fn put(&self, token: &str, state: SessionState) {
        self.inner.write().await.insert(
            token.to_string(),
            StoredSession {
                state,
                touched_at: Instant::now(),
            },
        );
    }

    pub async fn remove(&self, token: &str) -> Option<SessionState> {
        self.inner.write().await.remove(token).map(|stored| stored.state)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    fn prune_idle(&self, sessions: &mut HashMap<String, StoredSession>) {
        let before = sessions.len();
        sessions.retain(|_, stored| stored.touched_at.elapsed() < self.idle_ttl);
        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!(pruned, "Pruned idle web sessions");
        }
    }
}

/// Value of cookie `name` from the request's Cookie headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Set-Cookie value for a state token
pub fn session_cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_value_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; qc_session=abc-123; X-Tapis-Username=\"jdoe\""),
        );

        assert_eq!(cookie_value(&headers, SESSION_COOKIE).as_deref(), Some("abc-123"));
        assert_eq!(cookie_value(&headers, "X-Tapis-Username").as_deref(), Some("jdoe"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_value_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("qc_session=tok"));

        assert_eq!(cookie_value(&headers, SESSION_COOKIE).as_deref(), Some("tok"));
    }

    #[test]
    fn test_phase_helpers() {
        let mut state = SessionState::new(1, Step::Dtifit);
        assert_eq!(state.last_image(), None);

        state.phase = Phase::Displaying(5);
        assert_eq!(state.displayed_image(), Some(5));

        state.phase = Phase::Submitted(5);
        assert_eq!(state.displayed_image(), None);
        assert_eq!(state.last_image(), Some(5));
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let store = SessionStore::new();
        let token = store.insert(SessionState::new(3, Step::Mask)).await;

        let mut state = store.get(&token).await.unwrap();
        state.phase = Phase::Displaying(9);
        store.put(&token, state.clone()).await;

        assert_eq!(store.get(&token).await, Some(state));
        assert_eq!(store.len().await, 1);
        assert!(store.get("other").await.is_none());
    }

    #[tokio::test]
    async fn test_idle_sessions_expire_and_are_pruned() {
        let store = SessionStore::with_idle_ttl(Duration::from_millis(20));
        let stale = store.insert(SessionState::new(1, Step::Mask)).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get(&stale).await.is_none());

        let fresh = store.insert(SessionState::new(2, Step::Mask)).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&fresh).await.map(|s| s.session_id), Some(2));
    }

    #[tokio::test]
    async fn test_remove_returns_state() {
        let store = SessionStore::new();
        let token = store.insert(SessionState::new(4, Step::Dtifit)).await;

        assert_eq!(store.remove(&token).await.map(|s| s.session_id), Some(4));
        assert!(store.remove(&token).await.is_none());
        assert_eq!(store.len().await, 0);
    }
}
