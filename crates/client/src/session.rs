//! Session lifecycle and transparent token refresh.
//!
//! The [`SessionManager`] is the single source of truth for "who is logged
//! in and with what privilege". It exclusively owns the [`Session`] value;
//! everything else reads it through queries and never mutates it.
//!
//! Two hooks are installed on the [`ApiClient`] at startup
//! (see [`SessionManager::install`]):
//!
//! - a request decorator that attaches the bearer token to every outgoing
//!   request while a session exists;
//! - a response-recovery handler that answers a first-time 401 with one
//!   silent refresh (`POST /auth/refresh`, no body - the server identifies
//!   the session through an ambient credential opaque to this layer) and
//!   one retry of the original request. A failed refresh, or a second 401
//!   on the retried request, degrades to a forced logout.
//!
//! Concurrent 401s from parallel in-flight requests are collapsed behind a
//! single refresh guard: whoever loses the race for the guard re-checks the
//! token generation and retries with the renewed token instead of issuing
//! another refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use clementine_core::{PrincipalId, Role};

use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest, Recovery, RequestDecorator, ResponseRecovery};
use crate::notify::{Notification, Notifier};
use crate::storage::{ProfileStore, keys};

/// An authenticated session.
///
/// Exists if and only if the backend issued a non-empty access token;
/// absence of a session implies the guest role.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token presented on every request.
    pub access_token: String,
    /// Identity the token was issued for.
    pub principal_id: PrincipalId,
    /// Privilege level of the principal.
    pub role: Role,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("principal_id", &self.principal_id)
            .field("role", &self.role)
            .finish()
    }
}

/// Wire shape of a successful login or registration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    principal_id: PrincipalId,
    role: Role,
}

/// Wire shape of a successful refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct CredentialsBody<'a> {
    username: &'a str,
    password: &'a str,
}

/// Owner of the authentication lifecycle.
///
/// Cheap to clone; clones share the same session slot.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: ApiClient,
    store: ProfileStore,
    notifier: Arc<dyn Notifier>,
    slot: RwLock<Option<Session>>,
    /// Serializes refresh attempts across concurrent 401s.
    refresh_gate: tokio::sync::Mutex<()>,
    /// Bumped whenever the access token changes; lets a request that waited
    /// on the gate detect that someone else already refreshed.
    token_generation: AtomicU64,
}

impl SessionManager {
    /// Create a session manager.
    ///
    /// The manager is inert until [`SessionManager::install`] hooks it into
    /// the API client's interceptor chain and
    /// [`SessionManager::restore_from_storage`] seeds the initial state.
    #[must_use]
    pub fn new(api: ApiClient, store: ProfileStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api,
                store,
                notifier,
                slot: RwLock::new(None),
                refresh_gate: tokio::sync::Mutex::new(()),
                token_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Install the request decorator and response-recovery handler on the
    /// API client. Call exactly once at startup, before any request.
    pub fn install(&self, api: &ApiClient) {
        api.register_decorator(self.inner.clone());
        api.set_recovery(self.inner.clone());
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// True while a session exists.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.slot.read().is_some()
    }

    /// True while the session carries the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.inner
            .slot
            .read()
            .as_ref()
            .is_some_and(|s| s.role == Role::Admin)
    }

    /// Snapshot of the current session, if any.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.inner.slot.read().clone()
    }

    /// Effective role: the session's role, or guest without one.
    #[must_use]
    pub fn role(&self) -> Role {
        self.inner
            .slot
            .read()
            .as_ref()
            .map_or(Role::Guest, |s| s.role)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Reconstruct the session from persisted state.
    ///
    /// Invoked once at startup, before anything depends on the session
    /// state. All three session keys must be present; a present but
    /// unparseable role is treated as corruption and the session keys are
    /// cleared defensively.
    pub fn restore_from_storage(&self) {
        let token = self.inner.store.get(keys::SESSION_TOKEN);
        let principal = self.inner.store.get(keys::SESSION_PRINCIPAL_ID);
        let role = self.inner.store.get(keys::SESSION_ROLE);

        let (Some(token), Some(principal), Some(role)) = (token, principal, role) else {
            debug!("No persisted session to restore");
            return;
        };

        match role.parse::<Role>() {
            Ok(role) => {
                *self.inner.slot.write() = Some(Session {
                    access_token: token,
                    principal_id: PrincipalId::new(principal),
                    role,
                });
                self.inner.token_generation.fetch_add(1, Ordering::AcqRel);
                info!(%role, "Restored session from storage");
            }
            Err(err) => {
                warn!(error = %err, "Persisted session is corrupt, clearing it");
                self.inner.clear_persisted_session();
            }
        }
    }

    /// Log in with a username and password.
    ///
    /// On success the session is established and persisted, and a success
    /// notification is emitted. On failure an error notification carries
    /// the server-provided (or generic) message and any prior session is
    /// left untouched.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn login(&self, username: &str, password: &SecretString) -> bool {
        self.authenticate("/auth/login", username, password, "Logged in successfully!")
            .await
    }

    /// Register a new account and log straight into it.
    ///
    /// Same outcome contract as [`SessionManager::login`].
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn register(&self, username: &str, password: &SecretString) -> bool {
        self.authenticate("/auth/register", username, password, "Account created!")
            .await
    }

    async fn authenticate(
        &self,
        path: &str,
        username: &str,
        password: &SecretString,
        success_message: &str,
    ) -> bool {
        let body = CredentialsBody {
            username,
            password: password.expose_secret(),
        };

        match self.inner.post_auth::<LoginResponse>(path, Some(&body)).await {
            Ok(response) => {
                self.inner.establish(Session {
                    access_token: response.access_token,
                    principal_id: response.principal_id,
                    role: response.role,
                });
                self.inner
                    .notifier
                    .notify(Notification::success(success_message));
                true
            }
            Err(err) => {
                warn!(error = %err, "Authentication failed");
                self.inner
                    .notifier
                    .notify(Notification::error(err.user_message()));
                false
            }
        }
    }

    /// Destroy the session and clear its persisted keys.
    ///
    /// Idempotent: a no-op when already logged out. Safe to call from the
    /// refresh-failure path.
    pub fn logout(&self) {
        self.inner.logout();
    }
}

impl SessionInner {
    /// POST to an auth endpoint through the raw pipeline (decorators only):
    /// a 401 from these endpoints is an answer, not an expired session, so
    /// it must not trigger recovery.
    async fn post_auth<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T, ApiError> {
        let request = match body {
            Some(body) => ApiRequest::post(path, body)?,
            None => ApiRequest::post_empty(path),
        };

        let response = self.api.send_raw(&request).await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                message: crate::http::extract_server_message(&text),
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    fn establish(&self, session: Session) {
        self.persist(&session);
        *self.slot.write() = Some(session);
        self.token_generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Mirror the session to storage. Storage failures degrade to a
    /// memory-only session rather than failing the login.
    fn persist(&self, session: &Session) {
        let result = self
            .store
            .set(keys::SESSION_TOKEN, session.access_token.clone())
            .and_then(|()| {
                self.store
                    .set(keys::SESSION_PRINCIPAL_ID, session.principal_id.as_str())
            })
            .and_then(|()| self.store.set(keys::SESSION_ROLE, session.role.to_string()));

        if let Err(err) = result {
            warn!(error = %err, "Failed to persist session");
        }
    }

    fn clear_persisted_session(&self) {
        let result = self
            .store
            .remove(keys::SESSION_TOKEN)
            .and_then(|()| self.store.remove(keys::SESSION_PRINCIPAL_ID))
            .and_then(|()| self.store.remove(keys::SESSION_ROLE));

        if let Err(err) = result {
            warn!(error = %err, "Failed to clear persisted session");
        }
    }

    fn logout(&self) {
        let had_session = self.slot.write().take().is_some();
        if !had_session {
            return;
        }

        self.clear_persisted_session();
        self.token_generation.fetch_add(1, Ordering::AcqRel);
        info!("Session destroyed");
        self.notifier
            .notify(Notification::info("Logged out successfully!"));
    }

    /// Obtain a fresh access token for the current identity.
    ///
    /// Identity and role are unchanged; only the token is replaced.
    async fn refresh(&self) -> Result<(), ApiError> {
        let response: RefreshResponse = self
            .post_auth("/auth/refresh", None::<&()>)
            .await?;

        {
            let mut slot = self.slot.write();
            if let Some(session) = slot.as_mut() {
                session.access_token = response.access_token.clone();
            }
        }

        if let Err(err) = self.store.set(keys::SESSION_TOKEN, response.access_token) {
            warn!(error = %err, "Failed to persist refreshed token");
        }

        self.token_generation.fetch_add(1, Ordering::AcqRel);
        debug!("Access token refreshed");
        Ok(())
    }
}

impl RequestDecorator for SessionInner {
    fn decorate(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self.slot.read().as_ref().map(|s| s.access_token.clone());
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl ResponseRecovery for SessionInner {
    async fn on_unauthorized(&self) -> Recovery {
        if self.slot.read().is_none() {
            // A guest has nothing to refresh; the 401 stands.
            return Recovery::GiveUp;
        }

        let generation_before = self.token_generation.load(Ordering::Acquire);
        let _guard = self.refresh_gate.lock().await;

        if self.token_generation.load(Ordering::Acquire) != generation_before {
            // Another request refreshed while we waited on the gate; retry
            // with the renewed token instead of refreshing again.
            debug!("Token already refreshed by a concurrent request");
            return Recovery::Retry;
        }

        match self.refresh().await {
            Ok(()) => Recovery::Retry,
            Err(err) => {
                warn!(error = %err, "Token refresh failed, forcing logout");
                self.logout();
                Recovery::GiveUp
            }
        }
    }

    async fn on_retry_unauthorized(&self) {
        warn!("Retried request was rejected again, forcing logout");
        self.logout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::notify::Severity;

    fn manager(dir: &std::path::Path) -> (SessionManager, Arc<RecordingNotifier>, ProfileStore) {
        let store = ProfileStore::open(dir, "default").expect("open store");
        let notifier = RecordingNotifier::shared();
        let api = ApiClient::new(&url::Url::parse("http://localhost:9").expect("url"));
        let manager = SessionManager::new(api, store.clone(), notifier.clone());
        (manager, notifier, store)
    }

    fn seed_session(store: &ProfileStore) {
        store.set(keys::SESSION_TOKEN, "tok-1").expect("set");
        store
            .set(keys::SESSION_PRINCIPAL_ID, "alice")
            .expect("set");
        store.set(keys::SESSION_ROLE, "admin").expect("set");
    }

    #[test]
    fn test_restore_with_all_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (manager, _notifier, store) = manager(dir.path());
        seed_session(&store);

        manager.restore_from_storage();

        assert!(manager.is_authenticated());
        assert!(manager.is_admin());
        assert_eq!(manager.role(), Role::Admin);
        let session = manager.current().expect("session");
        assert_eq!(session.principal_id, PrincipalId::new("alice"));
        assert_eq!(session.access_token, "tok-1");
    }

    #[test]
    fn test_restore_with_any_key_missing_stays_unauthenticated() {
        for missing in [
            keys::SESSION_TOKEN,
            keys::SESSION_PRINCIPAL_ID,
            keys::SESSION_ROLE,
        ] {
            let dir = tempfile::tempdir().expect("tempdir");
            let (manager, _notifier, store) = manager(dir.path());
            seed_session(&store);
            store.remove(missing).expect("remove");

            manager.restore_from_storage();

            assert!(!manager.is_authenticated(), "missing {missing}");
            assert_eq!(manager.role(), Role::Guest);
        }
    }

    #[test]
    fn test_restore_with_corrupt_role_clears_session_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (manager, _notifier, store) = manager(dir.path());
        seed_session(&store);
        store.set(keys::SESSION_ROLE, "overlord").expect("set");

        manager.restore_from_storage();

        assert!(!manager.is_authenticated());
        assert_eq!(store.get(keys::SESSION_TOKEN), None);
        assert_eq!(store.get(keys::SESSION_PRINCIPAL_ID), None);
        assert_eq!(store.get(keys::SESSION_ROLE), None);
    }

    #[test]
    fn test_logout_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (manager, notifier, store) = manager(dir.path());
        seed_session(&store);
        manager.restore_from_storage();

        manager.logout();
        manager.logout();

        assert!(!manager.is_authenticated());
        assert_eq!(store.get(keys::SESSION_TOKEN), None);
        // Only the first logout notifies; the second is a no-op.
        assert_eq!(notifier.messages_with(Severity::Info).len(), 1);
    }

    #[test]
    fn test_logout_without_session_is_silent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (manager, notifier, _store) = manager(dir.path());

        manager.logout();

        assert!(notifier.events().is_empty());
    }

    #[test]
    fn test_session_debug_redacts_token() {
        let session = Session {
            access_token: "super-secret-token".to_owned(),
            principal_id: PrincipalId::new("alice"),
            role: Role::Customer,
        };

        let debug = format!("{session:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-token"));
    }
}
