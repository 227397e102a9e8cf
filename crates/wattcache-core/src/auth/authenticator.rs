//! Session lifecycle: reuse a validated session, otherwise log in.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use super::cookies::CookieJar;
use super::credentials::Credential;
use super::error::AuthError;
use super::login::{self, LOGIN_PATH, STATUS_PATH};
use super::session::{Session, SESSION_EXPIRY_SECS};
use super::store::SessionStore;

/// Default site origin
pub const DEFAULT_BASE_URL: &str = "https://zwiftpower.com";

/// Browser-like user agent; the site serves a different login page to bots
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Timeout for login requests in seconds
const LOGIN_TIMEOUT_SECS: u64 = 30;

/// Timeout for the session validation probe in seconds
const PROBE_TIMEOUT_SECS: u64 = 10;

/// Anything that can lend the dispatcher an authenticated session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_session(&self) -> Result<Session, AuthError>;
}

#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// Site origin, e.g. `https://zwiftpower.com`
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub probe_timeout: Duration,
    pub session_expiry: chrono::Duration,
    /// OAuth anchor selectors, tried in order
    pub oauth_selectors: Vec<String>,
    pub login_markers: Vec<String>,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(LOGIN_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
            session_expiry: chrono::Duration::seconds(SESSION_EXPIRY_SECS),
            oauth_selectors: login::default_selectors(),
            login_markers: login::default_markers(),
        }
    }
}

/// Parse a site origin, making sure relative joins land under it
pub fn parse_origin(base_url: &str) -> Result<Url, url::ParseError> {
    if base_url.ends_with('/') {
        Url::parse(base_url)
    } else {
        Url::parse(&format!("{}/", base_url))
    }
}

/// Owns one identity's session: loads, validates, refreshes and persists it.
pub struct Authenticator {
    credential: Option<Credential>,
    store: SessionStore,
    options: AuthOptions,
    current: Mutex<Option<Session>>,
}

impl Authenticator {
    pub fn new(credential: Option<Credential>, store: SessionStore, options: AuthOptions) -> Self {
        if let Some(ref c) = credential {
            info!(identity = %c.identity_hash(), "Credentials configured");
        } else {
            warn!("No credentials configured");
        }
        Self {
            credential,
            store,
            options,
            current: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    /// Return a validated session, logging in when there is none.
    pub async fn get_session(&self) -> Result<Session, AuthError> {
        let credential = self
            .credential
            .as_ref()
            .filter(|c| c.is_complete())
            .ok_or(AuthError::MissingCredentials)?;

        let mut current = self.current.lock().await;

        let candidate = match current.take() {
            Some(session) => Some(session),
            None => self.restore(credential)?,
        };

        if let Some(session) = candidate {
            if session.is_expired(self.options.session_expiry) {
                info!(identity = %session.identity_hash(), "Session is expired");
            } else if self.probe(&session).await {
                debug!(identity = %session.identity_hash(), "Reusing validated session");
                *current = Some(session.clone());
                return Ok(session);
            } else {
                info!(identity = %session.identity_hash(), "Session failed validation");
            }
        }

        let session = self.login(credential).await?;
        if let Err(e) = self.store.save(&session) {
            warn!(error = %e, "Failed to save session");
        }
        *current = Some(session.clone());
        Ok(session)
    }

    /// Drop the session and delete its persisted copy
    pub async fn logout(&self) {
        *self.current.lock().await = None;
        if let Some(ref credential) = self.credential {
            match self.store.delete(credential.identity()) {
                Ok(()) => info!("Session cache cleared"),
                Err(e) => warn!(error = %e, "Failed to clear session cache"),
            }
        }
    }

    /// Probe the current session without ever logging in
    pub async fn check_session_valid(&self) -> bool {
        let Some(ref credential) = self.credential else {
            return false;
        };
        let mut current = self.current.lock().await;
        if current.is_none() {
            *current = self.restore(credential).ok().flatten();
        }
        match current.as_ref() {
            Some(session) if !session.is_expired(self.options.session_expiry) => {
                self.probe(session).await
            }
            _ => false,
        }
    }

    /// Age of the in-memory session, if there is one
    pub async fn session_age(&self) -> Option<chrono::Duration> {
        self.current.lock().await.as_ref().map(Session::age)
    }

    fn restore(&self, credential: &Credential) -> Result<Option<Session>, AuthError> {
        let Some(persisted) = self.store.load(credential.identity()) else {
            return Ok(None);
        };
        let jar = Arc::new(CookieJar::from_cookies(persisted.cookies));
        let client = self.build_client(jar.clone())?;
        Ok(Some(Session::new(
            credential.identity_hash(),
            persisted.created_at,
            jar,
            client,
        )))
    }

    fn build_client(&self, jar: Arc<CookieJar>) -> Result<Client, AuthError> {
        Client::builder()
            .user_agent(self.options.user_agent.as_str())
            .timeout(self.options.timeout)
            .cookie_provider(jar)
            .build()
            .map_err(|e| AuthError::Client(e.to_string()))
    }

    fn origin(&self) -> Result<Url, AuthError> {
        parse_origin(&self.options.base_url)
            .map_err(|e| AuthError::LoginFailed(format!("Invalid base URL: {}", e)))
    }

    fn url(&self, path: &str) -> Result<Url, AuthError> {
        self.origin()?
            .join(path)
            .map_err(|e| AuthError::LoginFailed(format!("Invalid URL {}: {}", path, e)))
    }

    /// One cheap status request; anything but 200 means the session is gone.
    async fn probe(&self, session: &Session) -> bool {
        let Ok(url) = self.url(STATUS_PATH) else {
            return false;
        };
        match session
            .client()
            .get(url)
            .timeout(self.options.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(error = %e, "Session probe failed");
                false
            }
        }
    }

    async fn login(&self, credential: &Credential) -> Result<Session, AuthError> {
        info!(identity = %credential.identity_hash(), "Logging in to ZwiftPower");

        let jar = Arc::new(CookieJar::new());
        let client = self.build_client(jar.clone())?;
        let login_url = self.url(LOGIN_PATH)?;

        let result = self.run_login(&client, credential, &login_url).await;
        if let Err(ref e) = result {
            error!(error = %e, "Login failed");
        }
        result?;

        Ok(Session::new(
            credential.identity_hash(),
            Utc::now(),
            jar,
            client,
        ))
    }

    async fn run_login(
        &self,
        client: &Client,
        credential: &Credential,
        login_url: &Url,
    ) -> Result<(), AuthError> {
        let page = client
            .get(login_url.clone())
            .send()
            .await?
            .error_for_status()?;
        let body = page.text().await?;

        if !login::requires_login(&body, &self.options.login_markers) {
            info!("Already logged in");
            return Ok(());
        }

        match login::find_oauth_anchor(&body, &self.options.oauth_selectors) {
            Some(anchor) => self.oauth_login(client, credential, &anchor.href).await,
            None => self.direct_login(client, credential, &body, login_url).await,
        }
    }

    async fn oauth_login(
        &self,
        client: &Client,
        credential: &Credential,
        href: &str,
    ) -> Result<(), AuthError> {
        let start = self.url(href)?;
        debug!(host = ?start.host_str(), "Following OAuth login");

        let response = client.get(start).send().await?.error_for_status()?;
        let page_url = response.url().clone();
        let body = response.text().await?;

        let form = login::find_form(&body, None).ok_or_else(|| {
            AuthError::LoginFailed("Could not find login form on identity provider page".to_string())
        })?;
        let action = form.action_url(&page_url)?;
        let fields = form.oauth_fields(credential);

        let response = client
            .post(action)
            .form(&fields)
            .send()
            .await?
            .error_for_status()?;

        let landed = response.url();
        if login::oauth_succeeded(landed, &self.origin()?) {
            info!("OAuth login successful");
            Ok(())
        } else {
            Err(AuthError::LoginFailed(format!(
                "OAuth login redirected to {}{}",
                landed.host_str().unwrap_or_default(),
                landed.path()
            )))
        }
    }

    async fn direct_login(
        &self,
        client: &Client,
        credential: &Credential,
        login_page: &str,
        login_url: &Url,
    ) -> Result<(), AuthError> {
        let form = login::find_direct_form(login_page)
            .ok_or_else(|| AuthError::LoginFailed("Could not find login form".to_string()))?;
        let fields = form.direct_fields(credential);

        let response = client
            .post(login_url.clone())
            .form(&fields)
            .send()
            .await?
            .error_for_status()?;
        let landed = response.url().clone();
        let body = response.text().await?;

        login::check_direct_login(&body, &landed)?;
        info!("Direct login successful");
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for Authenticator {
    async fn get_session(&self) -> Result<Session, AuthError> {
        Authenticator::get_session(self).await
    }
}
