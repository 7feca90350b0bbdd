//! Single-flight session refresh coordination
//!
//! The first request to see a non-exempt 401 becomes the refresher; every
//! other request hitting a 401 while that refresh is in flight parks on a
//! oneshot waiter and receives the same outcome. One expiry event means
//! exactly one refresh call, win or lose: a failed attempt is never
//! retried within the event, only a later request starts a new one.
//!
//! The attempt itself runs on a detached task and the leader waits on a
//! oneshot like everyone else, so cancelling any caller mid-refresh cannot
//! strand the queue in `Refreshing`. The state mutex is only ever held to
//! flip state or collect waiters, never across the refresh call itself.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::{debug, info, warn};

use ryde_auth::{AuthEvent, AuthEvents, Error as AuthError, SessionStore, refresh_session};

use crate::metrics;

/// How one refresh attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Rotated tokens are in the store; replay the original request.
    Refreshed,
    /// The session is gone: store cleared, unauthorized broadcast fired.
    SessionExpired,
    /// Refresh infrastructure failed; the session is untouched.
    Transient(String),
}

impl RefreshOutcome {
    fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Refreshed => "refreshed",
            RefreshOutcome::SessionExpired => "session_expired",
            RefreshOutcome::Transient(_) => "transient",
        }
    }
}

enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

/// Per-client refresh coordinator.
///
/// Owned by the client instance rather than shared globally, so tests and
/// multi-tenant embedders get isolated refresh state per client.
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<RefreshState>,
    http: reqwest::Client,
    base_url: String,
    store: Arc<SessionStore>,
    events: AuthEvents,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        store: Arc<SessionStore>,
        events: AuthEvents,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RefreshState::Idle),
                http,
                base_url,
                store,
                events,
            }),
        }
    }

    /// Resolve the current expiry event, joining one already in flight.
    ///
    /// The caller that flips `Idle` to `Refreshing` spawns the single
    /// network attempt on a detached task; everyone, the leader included,
    /// suspends on a waiter until that attempt's outcome is fanned out.
    /// Once started, an attempt always runs to completion and drains the
    /// queue, even if every caller that was waiting on it is cancelled.
    pub async fn refresh(&self) -> RefreshOutcome {
        let (rx, leader) = {
            let mut state = self.shared.state.lock().await;
            let (tx, rx) = oneshot::channel();
            match &mut *state {
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    (rx, true)
                }
                RefreshState::Refreshing { waiters } => {
                    waiters.push(tx);
                    (rx, false)
                }
            }
        };

        if leader {
            let shared = self.shared.clone();
            tokio::spawn(async move {
                let outcome = shared.run_refresh().await;
                metrics::record_refresh(outcome.label());

                let waiters = {
                    let mut state = shared.state.lock().await;
                    match std::mem::replace(&mut *state, RefreshState::Idle) {
                        RefreshState::Refreshing { waiters } => waiters,
                        RefreshState::Idle => Vec::new(),
                    }
                };
                debug!(waiters = waiters.len(), "refresh resolved, draining queue");
                for tx in waiters {
                    let _ = tx.send(outcome.clone());
                }
            });
        } else {
            debug!("joining in-flight session refresh");
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => {
                RefreshOutcome::Transient("refresh task dropped before resolving".into())
            }
        }
    }

    /// Subscribe to the unauthorized broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.shared.events.subscribe()
    }
}

impl Shared {
    /// The single network attempt for one expiry event.
    async fn run_refresh(&self) -> RefreshOutcome {
        let Some(refresh) = self.store.refresh_token().await else {
            warn!("session expired with no refresh token available");
            return self.expire_session().await;
        };

        match refresh_session(&self.http, &self.base_url, &refresh).await {
            Ok(pair) => {
                if let Err(e) = self
                    .store
                    .rotate_tokens(pair.access_token, pair.refresh_token)
                    .await
                {
                    warn!(error = %e, "rotated tokens could not be persisted");
                }
                info!("session refreshed");
                RefreshOutcome::Refreshed
            }
            Err(AuthError::RefreshRejected(reason)) => {
                warn!(reason = %reason, "refresh token rejected, tearing down session");
                self.expire_session().await
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed, keeping session for retry");
                RefreshOutcome::Transient(e.to_string())
            }
        }
    }

    /// Clear local state and announce the loss.
    async fn expire_session(&self) -> RefreshOutcome {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear session state");
        }
        self.events.unauthorized();
        RefreshOutcome::SessionExpired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ryde_auth::SessionTier;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store_with_tokens(dir: &tempfile::TempDir) -> Arc<SessionStore> {
        let store = SessionStore::load(dir.path().join("session.json"))
            .await
            .unwrap();
        store
            .set_tokens("at_old".into(), "rt_old".into(), SessionTier::Durable)
            .await
            .unwrap();
        Arc::new(store)
    }

    fn coordinator(server: &MockServer, store: Arc<SessionStore>) -> Arc<RefreshCoordinator> {
        Arc::new(RefreshCoordinator::new(
            reqwest::Client::new(),
            server.uri(),
            store,
            AuthEvents::new(),
        ))
    }

    fn refresh_ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "at_new",
            "refreshToken": "rt_new"
        }))
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(refresh_ok().set_delay(Duration::from_millis(50)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with_tokens(&dir).await;
        let coordinator = coordinator(&server, store.clone());

        let mut handles = vec![];
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(
                async move { coordinator.refresh().await },
            ));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), RefreshOutcome::Refreshed);
        }

        assert_eq!(store.access_token().await.as_deref(), Some("at_new"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("rt_new"));
    }

    #[tokio::test]
    async fn aborted_leader_does_not_strand_later_callers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(refresh_ok().set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with_tokens(&dir).await;
        let coordinator = coordinator(&server, store.clone());

        let leader = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        leader.abort();

        // The in-flight attempt keeps running; later callers join it and
        // resolve instead of queueing behind a state that never resets
        let outcome = tokio::time::timeout(Duration::from_secs(2), coordinator.refresh())
            .await
            .expect("refresh must resolve after the first caller was aborted");
        assert_eq!(outcome, RefreshOutcome::Refreshed);
        assert_eq!(store.access_token().await.as_deref(), Some("at_new"));
    }

    #[tokio::test]
    async fn rejection_clears_store_and_signals_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "message": "revoked" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with_tokens(&dir).await;
        let coordinator = coordinator(&server, store.clone());
        let mut events = coordinator.subscribe();

        assert_eq!(coordinator.refresh().await, RefreshOutcome::SessionExpired);

        assert!(store.access_token().await.is_none());
        assert!(store.refresh_token().await.is_none());
        assert_eq!(events.try_recv().unwrap(), AuthEvent::Unauthorized);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn transient_failure_preserves_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(502).set_body_string("gateway sad"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with_tokens(&dir).await;
        let coordinator = coordinator(&server, store.clone());
        let mut events = coordinator.subscribe();

        let outcome = coordinator.refresh().await;
        assert!(
            matches!(outcome, RefreshOutcome::Transient(_)),
            "got: {outcome:?}"
        );

        assert_eq!(store.access_token().await.as_deref(), Some("at_old"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("rt_old"));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn waiters_receive_the_leaders_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({ "message": "revoked" }))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with_tokens(&dir).await;
        let coordinator = coordinator(&server, store);
        let mut events = coordinator.subscribe();

        let mut handles = vec![];
        for _ in 0..3 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(
                async move { coordinator.refresh().await },
            ));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), RefreshOutcome::SessionExpired);
        }

        // The teardown broadcast fired exactly once for the whole storm
        assert_eq!(events.try_recv().unwrap(), AuthEvent::Unauthorized);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn missing_refresh_token_expires_without_a_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(refresh_ok())
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SessionStore::load(dir.path().join("session.json"))
                .await
                .unwrap(),
        );
        let coordinator = coordinator(&server, store);
        let mut events = coordinator.subscribe();

        assert_eq!(coordinator.refresh().await, RefreshOutcome::SessionExpired);
        assert_eq!(events.try_recv().unwrap(), AuthEvent::Unauthorized);
    }

    #[tokio::test]
    async fn a_new_event_can_start_after_a_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(500).set_body_string("blip"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(refresh_ok())
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with_tokens(&dir).await;
        let coordinator = coordinator(&server, store.clone());

        let first = coordinator.refresh().await;
        assert!(matches!(first, RefreshOutcome::Transient(_)), "got: {first:?}");

        let second = coordinator.refresh().await;
        assert_eq!(second, RefreshOutcome::Refreshed);
        assert_eq!(store.access_token().await.as_deref(), Some("at_new"));
    }
}
