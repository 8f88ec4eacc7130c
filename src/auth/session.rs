//! Authenticated HTTP sessions.
//!
//! A [`Session`] bundles the HTTP client, its cookie jar and optional bearer
//! token for one [`Host`]. Sessions are cheap to clone; clones share the
//! same jar, so cookies obtained by [`SessionManager::authenticate`] are
//! visible to every worker holding a clone.
//!
//! Sessions are never refreshed mid-batch. If the host expires the login
//! cookie during a long run, requests start failing with HTTP errors and the
//! caller re-runs with a fresh session.

use std::fmt;
use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Method, RequestBuilder};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::credentials::{CredentialPrompt, CredentialStore, Credentials};
use super::error::AuthError;
use crate::config::{CacheConfig, ConfigError};
use crate::download::{DownloadError, build_client};
use crate::host::{AuthScheme, Host};

/// HTTP client plus authentication state for one host.
#[derive(Clone)]
pub struct Session {
    host: Host,
    origin: Url,
    jar: Arc<Jar>,
    client: Client,
    bearer: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("origin", &self.origin.as_str())
            .field("has_cookies", &self.has_cookies())
            .field("bearer", &self.bearer.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates an unauthenticated session whose cookies are scoped to `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the HTTP client cannot be built.
    pub fn new(
        host: Host,
        origin: Url,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let jar = Arc::new(Jar::default());
        let client = build_client(Arc::clone(&jar), connect_timeout_secs, read_timeout_secs)?;
        Ok(Self {
            host,
            origin,
            jar,
            client,
            bearer: None,
        })
    }

    /// Attaches a bearer token sent with every request.
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Host this session talks to.
    #[must_use]
    pub fn host(&self) -> Host {
        self.host
    }

    /// URL whose cookies represent a logged-in state.
    #[must_use]
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Whether the jar holds any cookie for the session origin.
    #[must_use]
    pub fn has_cookies(&self) -> bool {
        self.jar.cookies(&self.origin).is_some()
    }

    /// Starts a request carrying this session's credentials.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Creates sessions and resolves credentials for them.
///
/// Credentials are resolved in order: explicitly supplied, credential store,
/// interactive prompt. With none of these available the result is
/// [`AuthError::MissingCredentials`].
#[derive(Debug, Clone)]
pub struct SessionManager {
    config: CacheConfig,
    store: Arc<dyn CredentialStore>,
    prompt: Option<Arc<dyn CredentialPrompt>>,
}

impl SessionManager {
    /// Creates a manager reading credentials from `store`.
    pub fn new(config: CacheConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            config,
            store,
            prompt: None,
        }
    }

    /// Enables interactive prompting when the store has no entry.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Credential store in use.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Opens an unauthenticated session for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] (wrapped) for hosts that are not configured,
    /// and [`AuthError::Transport`] when the client cannot be built.
    pub fn new_session(&self, host: Host) -> Result<Session, SessionError> {
        let endpoint = self.config.endpoint(host)?;
        Session::new(
            host,
            endpoint.base_url.clone(),
            self.config.connect_timeout_secs(),
            self.config.read_timeout_secs(),
        )
        .map_err(|source| AuthError::Transport { host, source }.into())
    }

    /// Opens a session for `host` and authenticates it when the host
    /// requires authentication.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::new_session`] and
    /// [`SessionManager::authenticate`].
    #[instrument(skip(self, credentials), fields(host = %host))]
    pub async fn acquire(
        &self,
        host: Host,
        credentials: Option<&Credentials>,
    ) -> Result<Session, SessionError> {
        let mut session = self.new_session(host)?;
        self.authenticate(&mut session, credentials, false).await?;
        Ok(session)
    }

    /// Attaches authentication to `session`.
    ///
    /// A session that already holds cookies is left untouched unless
    /// `update` is set. Hosts without authentication are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when credentials are missing or rejected.
    #[instrument(skip(self, session, credentials), fields(host = %session.host()))]
    pub async fn authenticate(
        &self,
        session: &mut Session,
        credentials: Option<&Credentials>,
        update: bool,
    ) -> Result<(), SessionError> {
        let host = session.host();
        match host.auth_scheme() {
            AuthScheme::None => {
                debug!("host needs no authentication");
                Ok(())
            }
            AuthScheme::CookieLogin => {
                if session.has_cookies() && !update {
                    debug!("session already authenticated");
                    return Ok(());
                }
                let credentials = self.resolve_credentials(host, credentials)?;
                match credentials {
                    Credentials::Token(token) => {
                        *session = session.clone().with_bearer(token);
                        info!("bearer token attached");
                        Ok(())
                    }
                    Credentials::Password { username, password } => {
                        self.login(session, &username, &password).await
                    }
                }
            }
        }
    }

    /// Checks `credentials` against `host` with a throwaway session.
    ///
    /// Returns `Ok(false)` when the host rejects them.
    ///
    /// # Errors
    ///
    /// Returns errors other than rejection (configuration, transport).
    pub async fn verify_credentials(
        &self,
        host: Host,
        credentials: &Credentials,
    ) -> Result<bool, SessionError> {
        let mut session = self.new_session(host)?;
        match self.authenticate(&mut session, Some(credentials), true).await {
            Ok(()) => Ok(true),
            Err(SessionError::Auth(AuthError::Rejected { reason, .. })) => {
                warn!(host = %host, reason = %reason, "credentials rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_credentials(
        &self,
        host: Host,
        supplied: Option<&Credentials>,
    ) -> Result<Credentials, AuthError> {
        if let Some(credentials) = supplied {
            return Ok(credentials.clone());
        }
        let service = host.name();
        if let Some(credentials) = self.store.load(service)? {
            debug!(service, "using stored credentials");
            return Ok(credentials);
        }
        match &self.prompt {
            Some(prompt) => prompt.prompt(service),
            None => Err(AuthError::MissingCredentials {
                service: service.to_string(),
            }),
        }
    }

    async fn login(
        &self,
        session: &Session,
        username: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        let host = session.host();
        let login_url = self
            .config
            .endpoint(host)?
            .login_url
            .clone()
            .ok_or(AuthError::NoLoginEndpoint { host })?;
        let request_url = host.login_request_url(&login_url, username, password);

        let response = session
            .request(Method::GET, request_url)
            .send()
            .await
            // The request URL carries the password in its query.
            .map_err(|e| AuthError::Transport {
                host,
                source: DownloadError::network(login_url.as_str(), e.without_url()),
            })?;
        let status = response.status();

        if !session.has_cookies() {
            return Err(AuthError::rejected(
                host,
                format!("login returned HTTP {status} without a session cookie"),
            )
            .into());
        }
        info!(%status, "logged in");
        Ok(())
    }
}

/// Failure to produce an authenticated session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The host is not configured.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Credentials could not be obtained or were refused.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::auth::IniCredentialStore;
    use crate::config::HostEndpoint;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    #[derive(Debug, Default)]
    struct CountingPrompt {
        calls: Mutex<usize>,
    }

    impl CredentialPrompt for CountingPrompt {
        fn prompt(&self, _service: &str) -> Result<Credentials, AuthError> {
            *self.calls.lock().unwrap() += 1;
            Ok(password("prompted", "pw"))
        }
    }

    fn password(username: &str, password: &str) -> Credentials {
        Credentials::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    fn manager(server_uri: &str, dir: &std::path::Path) -> SessionManager {
        let endpoint = HostEndpoint::parse(
            &format!("{server_uri}/data/"),
            Some(&format!("{server_uri}/login")),
        )
        .unwrap();
        let config = CacheConfig::new(dir, dir.join("creds"))
            .unwrap()
            .with_endpoint(Host::Primary, endpoint)
            .with_timeouts(5, 30);
        SessionManager::new(config, Arc::new(IniCredentialStore::new(dir.join("creds"))))
    }

    async fn mount_login(server: &wiremock::MockServer, username: &str, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/login"))
            .and(query_param("josso_cmd", "login"))
            .and(query_param("josso_username", username))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "JOSSO_SESSIONID=abc123; Path=/"),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_acquire_logs_in_with_supplied_credentials() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        mount_login(&server, "ada", 1).await;

        let manager = manager(&server.uri(), dir.path());
        let session = manager
            .acquire(Host::Primary, Some(&password("ada", "pw")))
            .await
            .unwrap();
        assert!(session.has_cookies());
    }

    #[tokio::test]
    async fn test_authenticate_skips_when_cookies_held() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        mount_login(&server, "ada", 2).await;

        let manager = manager(&server.uri(), dir.path());
        let creds = password("ada", "pw");
        let mut session = manager.acquire(Host::Primary, Some(&creds)).await.unwrap();
        manager
            .authenticate(&mut session, Some(&creds), false)
            .await
            .unwrap();
        manager
            .authenticate(&mut session, Some(&creds), true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stored_credentials_are_used_before_prompt() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        mount_login(&server, "stored", 1).await;

        let prompt = Arc::new(CountingPrompt::default());
        let manager = manager(&server.uri(), dir.path()).with_prompt(prompt.clone());
        manager
            .store()
            .set_account("primary", &password("stored", "pw"))
            .unwrap();

        manager.acquire(Host::Primary, None).await.unwrap();
        assert_eq!(*prompt.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prompt_is_last_resort() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        mount_login(&server, "prompted", 1).await;

        let prompt = Arc::new(CountingPrompt::default());
        let manager = manager(&server.uri(), dir.path()).with_prompt(prompt.clone());
        manager.acquire(Host::Primary, None).await.unwrap();
        assert_eq!(*prompt.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_credentials_without_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager("http://127.0.0.1:9", dir.path());
        let err = manager.acquire(Host::Primary, None).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Auth(AuthError::MissingCredentials { ref service }) if service == "primary"
        ));
    }

    #[tokio::test]
    async fn test_login_transport_error_does_not_leak_password() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager("http://127.0.0.1:9", dir.path());
        let err = manager
            .acquire(Host::Primary, Some(&password("ada", "S3CRETPW")))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Auth(AuthError::Transport { .. })));

        let mut chain = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }
        assert!(!chain.contains("S3CRETPW"), "password leaked: {chain}");
        assert!(!format!("{err:?}").contains("S3CRETPW"));
    }

    #[tokio::test]
    async fn test_login_without_cookie_is_rejected() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("bad password"))
            .mount(&server)
            .await;

        let manager = manager(&server.uri(), dir.path());
        let err = manager
            .acquire(Host::Primary, Some(&password("ada", "wrong")))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Auth(AuthError::Rejected { .. })));
        assert!(
            !manager
                .verify_credentials(Host::Primary, &password("ada", "wrong"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_token_credentials_become_bearer_header() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/data/probe"))
            .and(wiremock::matchers::header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager(&server.uri(), dir.path());
        let session = manager
            .acquire(Host::Primary, Some(&Credentials::Token("tok".into())))
            .await
            .unwrap();
        let url = Url::parse(&format!("{}/data/probe", server.uri())).unwrap();
        let response = session.request(Method::GET, url).send().await.unwrap();
        assert!(response.status().is_success());
        assert!(!format!("{session:?}").contains("tok\""));
    }

    #[tokio::test]
    async fn test_unconfigured_mirror_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager("http://127.0.0.1:9", dir.path());
        assert!(matches!(
            manager.new_session(Host::Mirror),
            Err(SessionError::Config(ConfigError::HostNotConfigured { .. }))
        ));
    }
}
