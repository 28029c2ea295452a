// Authentication context
//
// Process-wide sign-in state passed explicitly to the components that need a
// bearer token. The session is initialised when the first subscriber attaches
// and torn down when the last subscription is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No active auth session")]
    NoActiveSession,

    #[error("Failed to read token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Token source returned an empty token")]
    EmptyToken,
}

/// Supplies the bearer token used when opening a connection
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Token for a new connection. `None` means connect anonymously.
    async fn bearer_token(&self) -> AuthResult<Option<String>>;
}

/// Where fresh tokens come from (identity provider, file, env)
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> AuthResult<String>;
}

/// A fixed token, typically from `AUTH_TOKEN`
pub struct StaticTokenSource(String);

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> AuthResult<String> {
        if self.0.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(self.0.clone())
    }
}

/// Re-reads a token file on every fetch so rotated tokens are picked up
pub struct FileTokenSource {
    path: PathBuf,
}

impl FileTokenSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenSource for FileTokenSource {
    async fn fetch_token(&self) -> AuthResult<String> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| AuthError::TokenFile {
                path: self.path.clone(),
                source,
            })?;

        let token = raw.trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(token.to_string())
    }
}

/// Active sign-in session
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub started_at: DateTime<Utc>,
    pub tokens_issued: u64,
}

struct AuthState {
    subscribers: usize,
    session: Option<AuthSession>,
}

struct AuthInner {
    source: Option<Arc<dyn TokenSource>>,
    state: Mutex<AuthState>,
}

/// Shared authentication context, cheap to clone
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<AuthInner>,
}

impl AuthContext {
    /// Context backed by a token source
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self::build(Some(source))
    }

    /// Context without credentials; every connection is anonymous
    pub fn anonymous() -> Self {
        Self::build(None)
    }

    fn build(source: Option<Arc<dyn TokenSource>>) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                source,
                state: Mutex::new(AuthState {
                    subscribers: 0,
                    session: None,
                }),
            }),
        }
    }

    /// Attach a subscriber. The first one starts the session.
    pub fn subscribe(&self) -> AuthSubscription {
        let mut state = self.inner.state.lock();
        state.subscribers += 1;
        if state.subscribers == 1 {
            info!("Auth session started");
            state.session = Some(AuthSession {
                started_at: Utc::now(),
                tokens_issued: 0,
            });
        }

        AuthSubscription {
            context: self.clone(),
        }
    }

    fn unsubscribe(&self) {
        let mut state = self.inner.state.lock();
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers == 0 && state.session.take().is_some() {
            info!("Auth session torn down");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.inner.state.lock().session.clone()
    }

    pub fn is_anonymous(&self) -> bool {
        self.inner.source.is_none()
    }
}

#[async_trait]
impl CredentialProvider for AuthContext {
    async fn bearer_token(&self) -> AuthResult<Option<String>> {
        let Some(source) = self.inner.source.clone() else {
            return Ok(None);
        };

        if self.inner.state.lock().session.is_none() {
            return Err(AuthError::NoActiveSession);
        }

        let token = source.fetch_token().await?;

        // The session may have ended while the fetch was in flight
        let mut state = self.inner.state.lock();
        let session = state.session.as_mut().ok_or(AuthError::NoActiveSession)?;
        session.tokens_issued += 1;
        debug!("Issued bearer token #{}", session.tokens_issued);

        Ok(Some(token))
    }
}

/// Keeps the auth session alive while held
pub struct AuthSubscription {
    context: AuthContext,
}

impl AuthSubscription {
    pub fn context(&self) -> &AuthContext {
        &self.context
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.context.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_anonymous_context_yields_no_token() {
        let auth = AuthContext::anonymous();
        assert!(auth.is_anonymous());
        assert_eq!(auth.bearer_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_token_requires_active_session() {
        let auth = AuthContext::new(Arc::new(StaticTokenSource::new("secret")));
        assert!(matches!(
            auth.bearer_token().await,
            Err(AuthError::NoActiveSession)
        ));

        let _sub = auth.subscribe();
        assert_eq!(
            auth.bearer_token().await.unwrap(),
            Some("secret".to_string())
        );
        assert_eq!(auth.session().unwrap().tokens_issued, 1);
    }

    #[test]
    fn test_session_lifecycle_follows_subscribers() {
        let auth = AuthContext::new(Arc::new(StaticTokenSource::new("t")));
        assert!(auth.session().is_none());

        let first = auth.subscribe();
        let second = auth.subscribe();
        assert_eq!(auth.subscriber_count(), 2);
        assert!(auth.session().is_some());

        drop(first);
        assert!(auth.session().is_some());

        drop(second);
        assert_eq!(auth.subscriber_count(), 0);
        assert!(auth.session().is_none());
    }

    #[tokio::test]
    async fn test_file_token_source_trims_and_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "first\n").unwrap();

        let source = FileTokenSource::new(&path);
        assert_eq!(source.fetch_token().await.unwrap(), "first");

        std::fs::write(&path, "rotated").unwrap();
        assert_eq!(source.fetch_token().await.unwrap(), "rotated");

        std::fs::write(&path, "  \n").unwrap();
        assert!(matches!(
            source.fetch_token().await,
            Err(AuthError::EmptyToken)
        ));
    }
}
