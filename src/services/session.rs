//! Signed-in state for the admin area.
//!
//! [`SessionService`] sits between an [`AuthProvider`] and the HTTP layer. It
//! hands out bearer tokens, checks them on admin requests and publishes the
//! current user on a `watch` channel. It has an explicit lifecycle: nothing
//! signs in before [`SessionService::init`], and [`SessionService::teardown`]
//! drops every session.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a token stays valid after sign-in.
pub const SESSION_TTL_HOURS: i64 = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("missing or unknown session token")]
    Unauthorized,
    #[error("session expired")]
    Expired,
    #[error("session service is not running")]
    Inactive,
    #[error("auth provider failed: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;

    async fn sign_out(&self, user: &User) -> Result<(), AuthError>;
}

/// A single administrator whose credentials come from configuration.
pub struct ConfiguredAdmin {
    email: String,
    password: String,
}

impl ConfiguredAdmin {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for ConfiguredAdmin {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        // An unset password never matches.
        if self.password.is_empty()
            || !email.trim().eq_ignore_ascii_case(&self.email)
            || !constant_time_eq(password.as_bytes(), self.password.as_bytes())
        {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(User {
            id: "admin".into(),
            email: self.email.clone(),
        })
    }

    async fn sign_out(&self, _user: &User) -> Result<(), AuthError> {
        Ok(())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct SessionService {
    provider: Arc<dyn AuthProvider>,
    sessions: Mutex<HashMap<String, Session>>,
    current: watch::Sender<Option<User>>,
    running: AtomicBool,
    ttl: Duration,
}

impl SessionService {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self::with_ttl(provider, Duration::hours(SESSION_TTL_HOURS))
    }

    pub fn with_ttl(provider: Arc<dyn AuthProvider>, ttl: Duration) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            provider,
            sessions: Mutex::new(HashMap::new()),
            current,
            running: AtomicBool::new(false),
            ttl,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn init(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("session service started");
        }
        self.publish();
    }

    /// Drop every session and publish "signed out".
    pub fn teardown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let dropped = {
            let mut sessions = self.sessions();
            let dropped = sessions.len();
            sessions.clear();
            dropped
        };
        self.current.send_replace(None);
        info!("session service stopped, {} session(s) dropped", dropped);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Observe the signed-in user. The latest sign-in wins; `None` once no
    /// session is left.
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        if !self.is_running() {
            return Err(AuthError::Inactive);
        }
        let user = match self.provider.sign_in(email, password).await {
            Ok(user) => user,
            Err(err) => {
                warn!("sign-in rejected for {}", email);
                return Err(err);
            }
        };

        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            user: user.clone(),
            expires_at: Utc::now() + self.ttl,
        };
        {
            let mut sessions = self.sessions();
            let pruned = prune_expired(&mut sessions);
            if pruned > 0 {
                debug!("{} expired session(s) pruned", pruned);
            }
            sessions.insert(session.token.clone(), session.clone());
        }
        self.current.send_replace(Some(user));
        info!("{} signed in", session.user.email);
        Ok(session)
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let session = self
            .sessions()
            .remove(token)
            .ok_or(AuthError::Unauthorized)?;
        self.publish();
        self.provider.sign_out(&session.user).await?;
        info!("{} signed out", session.user.email);
        Ok(())
    }

    /// Resolve a bearer token to its user. Expired sessions are dropped.
    pub fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        if !self.is_running() {
            return Err(AuthError::Inactive);
        }
        let result = {
            let mut sessions = self.sessions();
            match sessions.get(token) {
                None => Err(AuthError::Unauthorized),
                Some(session) if session.expires_at <= Utc::now() => {
                    sessions.remove(token);
                    Err(AuthError::Expired)
                }
                Some(session) => Ok(session.user.clone()),
            }
        };
        if result == Err(AuthError::Expired) {
            debug!("expired session removed");
            self.publish();
        }
        result
    }

    /// Publish the user of the most recent live session, if any. Expired
    /// sessions are dropped on the way.
    fn publish(&self) {
        let latest = {
            let mut sessions = self.sessions();
            prune_expired(&mut sessions);
            sessions
                .values()
                .max_by_key(|s| s.expires_at)
                .map(|s| s.user.clone())
        };
        self.current.send_replace(latest);
    }
}

fn prune_expired(sessions: &mut HashMap<String, Session>) -> usize {
    let now = Utc::now();
    let before = sessions.len();
    sessions.retain(|_, session| session.expires_at > now);
    before - sessions.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SessionService {
        let service = SessionService::new(Arc::new(ConfiguredAdmin::new(
            "studio@example.com",
            "s3cret",
        )));
        service.init();
        service
    }

    #[tokio::test]
    async fn sign_in_publishes_user_and_issues_token() {
        let service = service();
        let mut updates = service.subscribe();
        assert_eq!(service.current_user(), None);

        let session = service.sign_in("Studio@Example.com ", "s3cret").await.unwrap();
        updates.changed().await.unwrap();
        assert_eq!(
            updates.borrow().as_ref().map(|u| u.email.as_str()),
            Some("studio@example.com")
        );
        assert_eq!(service.authenticate(&session.token).unwrap().id, "admin");

        service.sign_out(&session.token).await.unwrap();
        assert_eq!(service.current_user(), None);
        assert_eq!(
            service.authenticate(&session.token),
            Err(AuthError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn wrong_credentials_are_rejected() {
        let service = service();
        assert_eq!(
            service.sign_in("studio@example.com", "nope").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            service.sign_in("other@example.com", "s3cret").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn unset_password_disables_sign_in() {
        let service = SessionService::new(Arc::new(ConfiguredAdmin::new("a@b.c", "")));
        service.init();
        assert_eq!(
            service.sign_in("a@b.c", "").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn teardown_drops_sessions_and_blocks_sign_in() {
        let service = service();
        let session = service.sign_in("studio@example.com", "s3cret").await.unwrap();

        service.teardown();
        assert_eq!(service.current_user(), None);
        assert_eq!(
            service.sign_in("studio@example.com", "s3cret").await.unwrap_err(),
            AuthError::Inactive
        );

        service.init();
        assert_eq!(
            service.authenticate(&session.token),
            Err(AuthError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn expired_tokens_are_refused() {
        let service = SessionService::with_ttl(
            Arc::new(ConfiguredAdmin::new("a@b.c", "pw")),
            Duration::zero(),
        );
        service.init();
        let session = service.sign_in("a@b.c", "pw").await.unwrap();
        assert_eq!(service.authenticate(&session.token), Err(AuthError::Expired));
        assert_eq!(service.current_user(), None);
    }

    #[tokio::test]
    async fn abandoned_expired_sessions_do_not_accumulate() {
        let service = SessionService::with_ttl(
            Arc::new(ConfiguredAdmin::new("a@b.c", "pw")),
            Duration::zero(),
        );
        service.init();
        for _ in 0..5 {
            service.sign_in("a@b.c", "pw").await.unwrap();
        }
        // Only the newest token is left; its predecessors were never presented.
        assert_eq!(service.sessions().len(), 1);

        service.init();
        assert!(service.sessions().is_empty());
    }
}
