//! Sign-out: best-effort server notification, local purge, navigation.
//!
//! The flow always ends signed out locally and on the login view; the
//! report only says how cleanly it got there.

use std::time::Duration;

use crate::credentials::CredentialStore;
use crate::kv::KeyValueStore;

/// Delay before the post-navigation refresh.
pub const REFRESH_DELAY: Duration = Duration::from_millis(100);

/// Where the user can be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    Photos,
}

impl View {
    pub fn path(self) -> &'static str {
        match self {
            View::Login => "/login",
            View::Photos => "/photos",
        }
    }
}

/// Host-side navigation hooks.
pub trait Navigator {
    /// Client-side navigation to `view`.
    fn push(&mut self, view: View);
    /// Re-renders the current view from a clean state.
    fn refresh(&mut self);
    /// Full reload at `view`, discarding in-memory state.
    fn hard_navigate(&mut self, view: View);
}

/// What the app server said about the logout notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLogout {
    Succeeded,
    Rejected(u16),
    Unavailable,
    /// No logout endpoint was configured; only local data was cleared.
    Skipped,
}

#[derive(Debug)]
pub struct SignOutReport {
    pub server: ServerLogout,
    /// User-facing message when local clearing needed the emergency fallback.
    pub error: Option<String>,
}

impl SignOutReport {
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

struct LogoutEndpoint {
    http: reqwest::Client,
    url: String,
}

pub struct SignOutFlow {
    endpoint: Option<LogoutEndpoint>,
    refresh_delay: Duration,
}

impl SignOutFlow {
    pub fn new(http: reqwest::Client, app_url: &str) -> Self {
        Self {
            endpoint: Some(LogoutEndpoint {
                http,
                url: format!("{}/api/auth/logout", app_url.trim_end_matches('/')),
            }),
            refresh_delay: REFRESH_DELAY,
        }
    }

    /// Sign-out without a server notification, for when the app server
    /// cannot be resolved.
    pub fn local_only() -> Self {
        Self {
            endpoint: None,
            refresh_delay: REFRESH_DELAY,
        }
    }

    #[must_use]
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn logout_url(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|endpoint| endpoint.url.as_str())
    }

    /// Runs the full sign-out. Never fails: a broken local store falls back
    /// to wiping both stores and a hard navigation.
    pub async fn sign_out<L, S, N>(
        &self,
        store: &mut CredentialStore<L, S>,
        navigator: &mut N,
    ) -> SignOutReport
    where
        L: KeyValueStore,
        S: KeyValueStore,
        N: Navigator,
    {
        let token = store.access_token().unwrap_or_else(|e| {
            tracing::warn!(error = %format!("{e:#}"), "Could not read stored token");
            None
        });
        let server = self.notify_server(token.as_deref()).await;

        if let Err(e) = store.clear_all() {
            tracing::error!(error = %format!("{e:#}"), "Sign out failed");
            store.wipe_everything();
            navigator.hard_navigate(View::Login);
            return SignOutReport {
                server,
                error: Some("Sign out failed: Failed to clear local data".to_string()),
            };
        }

        tracing::info!("Redirecting to login view");
        navigator.push(View::Login);
        tokio::time::sleep(self.refresh_delay).await;
        navigator.refresh();

        SignOutReport {
            server,
            error: None,
        }
    }

    async fn notify_server(&self, token: Option<&str>) -> ServerLogout {
        let Some(endpoint) = &self.endpoint else {
            tracing::info!("No logout endpoint, skipping backend logout");
            return ServerLogout::Skipped;
        };
        let mut request = endpoint
            .http
            .post(&endpoint.url)
            .header("content-type", "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Backend logout successful");
                ServerLogout::Succeeded
            }
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::warn!(status, "Backend logout failed, continuing with local cleanup");
                ServerLogout::Rejected(status)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Backend logout endpoint not available, continuing with local cleanup");
                ServerLogout::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::credentials::test_support::FailingStore;
    use crate::credentials::{AUTH_TOKEN_KEY, Session};
    use crate::kv::MemoryStore;

    #[derive(Debug, Default)]
    struct RecordingNavigator {
        events: Vec<String>,
    }

    impl Navigator for RecordingNavigator {
        fn push(&mut self, view: View) {
            self.events.push(format!("push {}", view.path()));
        }

        fn refresh(&mut self) {
            self.events.push("refresh".to_string());
        }

        fn hard_navigate(&mut self, view: View) {
            self.events.push(format!("hard {}", view.path()));
        }
    }

    fn session() -> Session {
        Session {
            user_id: "user-1".to_string(),
            email: "me@example.com".to_string(),
            access_token: "user-token".to_string(),
            refresh_token: Some("refresh".to_string()),
        }
    }

    fn flow(app_url: &str) -> SignOutFlow {
        SignOutFlow::new(reqwest::Client::new(), app_url).with_refresh_delay(Duration::ZERO)
    }

    #[test]
    fn test_logout_url_trims_slash() {
        assert_eq!(
            flow("http://localhost:3000/").logout_url(),
            Some("http://localhost:3000/api/auth/logout")
        );
        assert_eq!(SignOutFlow::local_only().logout_url(), None);
    }

    #[tokio::test]
    async fn test_local_only_sign_out_clears_store() {
        let mut store = CredentialStore::new(MemoryStore::new(), MemoryStore::new());
        store.save(&session());
        let mut nav = RecordingNavigator::default();

        let report = SignOutFlow::local_only()
            .with_refresh_delay(Duration::ZERO)
            .sign_out(&mut store, &mut nav)
            .await;

        assert_eq!(report.server, ServerLogout::Skipped);
        assert!(report.is_clean());
        assert!(store.local().keys().unwrap().is_empty());
        assert_eq!(nav.events, vec!["push /login", "refresh"]);
    }

    #[tokio::test]
    async fn test_sign_out_notifies_server_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .and(header("authorization", "Bearer user-token"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = CredentialStore::new(MemoryStore::new(), MemoryStore::new());
        store.save(&session());
        store.local_mut().set("sb-demo-auth-token", "x").unwrap();
        let mut nav = RecordingNavigator::default();

        let report = flow(&server.uri()).sign_out(&mut store, &mut nav).await;

        assert_eq!(report.server, ServerLogout::Succeeded);
        assert!(report.is_clean());
        assert!(store.local().keys().unwrap().is_empty());
        assert_eq!(nav.events, vec!["push /login", "refresh"]);
    }

    #[tokio::test]
    async fn test_sign_out_with_rejected_logout_still_clears() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut store = CredentialStore::new(MemoryStore::new(), MemoryStore::new());
        store.save(&session());
        let mut nav = RecordingNavigator::default();

        let report = flow(&server.uri()).sign_out(&mut store, &mut nav).await;
        assert_eq!(report.server, ServerLogout::Rejected(404));
        assert_eq!(store.local().get(AUTH_TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_out_with_unreachable_endpoint() {
        let mut store = CredentialStore::new(MemoryStore::new(), MemoryStore::new());
        store.save(&session());
        store.session_store_mut().set("draft", "1").unwrap();
        let mut nav = RecordingNavigator::default();

        let report = SignOutFlow::new(reqwest::Client::new(), "http://127.0.0.1:9")
            .sign_out(&mut store, &mut nav)
            .await;

        assert_eq!(report.server, ServerLogout::Unavailable);
        assert!(report.is_clean());
        assert_eq!(store.load().unwrap(), None);
        assert!(store.session_store_mut().is_empty());
        assert_eq!(nav.events, vec!["push /login", "refresh"]);
    }

    #[tokio::test]
    async fn test_sign_out_without_session_is_noop_success() {
        let mut store = CredentialStore::new(MemoryStore::new(), MemoryStore::new());
        let mut nav = RecordingNavigator::default();

        let report = flow("http://127.0.0.1:9").sign_out(&mut store, &mut nav).await;
        assert!(report.is_clean());
        assert_eq!(nav.events, vec!["push /login", "refresh"]);
    }

    #[tokio::test]
    async fn test_sign_out_fallback_when_clear_fails() {
        let mut failing = FailingStore::default();
        failing.inner.set(AUTH_TOKEN_KEY, "user-token").unwrap();
        failing.inner.set("theme", "dark").unwrap();
        failing.fail_remove = true;
        let mut store = CredentialStore::new(failing, MemoryStore::new());
        let mut nav = RecordingNavigator::default();

        let report = flow("http://127.0.0.1:9").sign_out(&mut store, &mut nav).await;

        assert_eq!(
            report.error.as_deref(),
            Some("Sign out failed: Failed to clear local data")
        );
        assert!(store.local().keys().unwrap().is_empty());
        assert_eq!(nav.events, vec!["hard /login"]);
    }
}
