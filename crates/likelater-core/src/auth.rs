//! Spotify OAuth token lifecycle (authorization-code flow with PKCE).
//!
//! The state machine is `disconnected -> authorizing -> exchanging ->
//! connected`, with an automatic `refreshing` hop whenever an authenticated
//! call finds the access token expired.  Every failure drops back to the
//! prior stable state with a status message; nothing here panics or leaves
//! half-written token state behind.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::config::SpotifyConfig;
use crate::error::CoreError;

pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Where the token lifecycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthPhase {
    Disconnected,
    Authorizing,
    Exchanging,
    Connected,
    Refreshing,
}

/// Browser/webview hand-off supplied by the host environment.  `present`
/// opens the authorization URL interactively and resolves with the full
/// callback URL once the provider redirects.
#[async_trait]
pub trait AuthPresenter: Send + Sync {
    async fn present(&self, auth_url: &str, callback_scheme: &str) -> Result<String, CoreError>;
}

struct AuthInner {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    phase: AuthPhase,
    /// PKCE verifier minted by `begin_authorization`, consumed by the
    /// exchange.  `None` outside an active flow.
    verifier: Option<String>,
    last_status: String,
}

pub struct SpotifyAuth {
    inner: Arc<RwLock<AuthInner>>,
    http: reqwest::Client,
    config: SpotifyConfig,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

impl SpotifyAuth {
    pub fn new(config: SpotifyConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AuthInner {
                access_token: None,
                refresh_token: None,
                expires_at: None,
                phase: AuthPhase::Disconnected,
                verifier: None,
                last_status: "Not connected.".to_string(),
            })),
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Begin the PKCE flow: mint a verifier/challenge pair and build the
    /// provider authorization URL.  Fails before any network traffic when
    /// the client id is missing.
    pub async fn begin_authorization(&self) -> Result<String, CoreError> {
        if self.config.client_id.trim().is_empty() {
            let mut inner = self.inner.write().await;
            inner.last_status = "Set your Spotify client ID first.".to_string();
            return Err(CoreError::MissingClientId);
        }

        let verifier = pkce_verifier();
        let challenge = pkce_challenge(&verifier);
        let url = self.build_authorize_url(&challenge, &random_state())?;

        let mut inner = self.inner.write().await;
        inner.verifier = Some(verifier);
        inner.phase = AuthPhase::Authorizing;
        inner.last_status = "Opening Spotify login...".to_string();
        Ok(url)
    }

    fn build_authorize_url(&self, challenge: &str, state: &str) -> Result<String, CoreError> {
        let scope = self.config.scopes.join(" ");
        let url = Url::parse_with_params(
            AUTHORIZE_ENDPOINT,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code_challenge_method", "S256"),
                ("code_challenge", challenge),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| CoreError::Decode(format!("authorize url: {}", e)))?;
        Ok(url.into())
    }

    /// Scheme of the redirect URI: what the interactive session watches for.
    pub fn callback_scheme(&self) -> String {
        Url::parse(&self.config.redirect_uri)
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "likelater".to_string())
    }

    /// Drive the whole interactive flow with a host-supplied presenter.
    pub async fn authorize_with(&self, presenter: &dyn AuthPresenter) -> Result<(), CoreError> {
        let auth_url = self.begin_authorization().await?;
        match presenter.present(&auth_url, &self.callback_scheme()).await {
            Ok(callback_url) => self.complete_authorization(&callback_url).await,
            Err(e) => {
                self.cancel_authorization(&e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Handle the provider redirect: pull `code` out of the callback URL
    /// and exchange it, together with the stored verifier, for tokens.
    pub async fn complete_authorization(&self, callback_url: &str) -> Result<(), CoreError> {
        let (code, verifier) = {
            let mut inner = self.inner.write().await;
            let Some(code) = extract_code(callback_url) else {
                inner.phase = AuthPhase::Disconnected;
                inner.verifier = None;
                inner.last_status = "No auth code in callback.".to_string();
                return Err(CoreError::AuthCallback("missing code".to_string()));
            };
            let Some(verifier) = inner.verifier.take() else {
                inner.phase = AuthPhase::Disconnected;
                inner.last_status = "Missing PKCE verifier.".to_string();
                return Err(CoreError::AuthCallback("missing verifier".to_string()));
            };
            inner.phase = AuthPhase::Exchanging;
            (code, verifier)
        };

        let mut form = BTreeMap::new();
        form.insert("client_id", self.config.client_id.as_str());
        form.insert("code", code.as_str());
        form.insert("code_verifier", verifier.as_str());
        form.insert("grant_type", "authorization_code");
        form.insert("redirect_uri", self.config.redirect_uri.as_str());

        match self.request_token(&form).await {
            Ok(token) => {
                let mut inner = self.inner.write().await;
                inner.access_token = Some(token.access_token);
                if token.refresh_token.is_some() {
                    inner.refresh_token = token.refresh_token;
                }
                inner.expires_at = Some(Utc::now() + Duration::seconds(token.expires_in));
                inner.phase = AuthPhase::Connected;
                inner.last_status = "Spotify connected.".to_string();
                info!("token exchange complete");
                Ok(())
            }
            Err(e) => {
                let mut inner = self.inner.write().await;
                inner.phase = AuthPhase::Disconnected;
                inner.last_status = "Token exchange failed.".to_string();
                warn!("token exchange failed: {}", e);
                Err(e)
            }
        }
    }

    /// Refresh the access token.  The refresh token itself is only replaced
    /// when the provider hands back a new one.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let refresh_token = {
            let mut inner = self.inner.write().await;
            let Some(token) = inner.refresh_token.clone() else {
                inner.last_status = "Missing refresh token.".to_string();
                return Err(CoreError::NotConnected);
            };
            inner.phase = AuthPhase::Refreshing;
            token
        };

        let mut form = BTreeMap::new();
        form.insert("client_id", self.config.client_id.as_str());
        form.insert("grant_type", "refresh_token");
        form.insert("refresh_token", refresh_token.as_str());

        match self.request_token(&form).await {
            Ok(token) => {
                let mut inner = self.inner.write().await;
                inner.access_token = Some(token.access_token);
                if let Some(new_refresh) = token.refresh_token {
                    inner.refresh_token = Some(new_refresh);
                }
                inner.expires_at = Some(Utc::now() + Duration::seconds(token.expires_in));
                inner.phase = AuthPhase::Connected;
                inner.last_status = "Spotify token refreshed.".to_string();
                Ok(())
            }
            Err(e) => {
                let mut inner = self.inner.write().await;
                inner.phase = if inner.access_token.is_some() {
                    AuthPhase::Connected
                } else {
                    AuthPhase::Disconnected
                };
                inner.last_status = "Token refresh failed.".to_string();
                warn!("token refresh failed: {}", e);
                Err(e)
            }
        }
    }

    /// Token for an authenticated call.  An absent token fails fast with no
    /// network; an expired one triggers a refresh attempt before use.
    pub async fn bearer_token(&self) -> Result<String, CoreError> {
        let expired = {
            let inner = self.inner.read().await;
            if inner.access_token.is_none() {
                drop(inner);
                self.set_status("Connect Spotify first.").await;
                return Err(CoreError::NotConnected);
            }
            inner.expires_at.map(|t| t < Utc::now()).unwrap_or(false)
        };

        if expired {
            // Best effort: a failed refresh still lets the stale token go
            // out, and the provider's 401 becomes the caller's failure.
            if let Err(e) = self.refresh().await {
                warn!("refresh before use failed: {}", e);
            }
        }

        let inner = self.inner.read().await;
        inner.access_token.clone().ok_or(CoreError::NotConnected)
    }

    /// The interactive session was dismissed or failed.  Drops any
    /// half-built flow state without touching stored tokens.
    pub async fn cancel_authorization(&self, reason: &str) {
        let mut inner = self.inner.write().await;
        inner.verifier = None;
        inner.phase = if inner.access_token.is_some() {
            AuthPhase::Connected
        } else {
            AuthPhase::Disconnected
        };
        inner.last_status = format!("Auth cancelled: {}", reason);
    }

    pub async fn phase(&self) -> AuthPhase {
        self.inner.read().await.phase
    }

    pub async fn last_status(&self) -> String {
        self.inner.read().await.last_status.clone()
    }

    pub async fn set_status(&self, message: impl Into<String>) {
        self.inner.write().await.last_status = message.into();
    }

    async fn request_token(
        &self,
        form: &BTreeMap<&str, &str>,
    ) -> Result<TokenResponse, CoreError> {
        // BTreeMap iterates in key order, so the encoded body is
        // deterministic across runs.
        let resp = self.http.post(TOKEN_ENDPOINT).form(form).send().await?;
        if !resp.status().is_success() {
            return Err(CoreError::Decode(format!(
                "token endpoint returned {}",
                resp.status()
            )));
        }
        resp.json::<TokenResponse>()
            .await
            .map_err(|e| CoreError::Decode(format!("token payload: {}", e)))
    }
}

/// 32 bytes of CSPRNG entropy, URL-safe base64 without padding (43 chars).
fn pkce_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256: URL-safe base64 of the SHA-256 digest of the verifier bytes.
fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn random_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn extract_code(callback_url: &str) -> Option<String> {
    let url = Url::parse(callback_url).ok()?;
    url.query_pairs()
        .find_map(|(name, value)| (name == "code").then(|| value.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> SpotifyConfig {
        SpotifyConfig {
            client_id: "test-client".to_string(),
            ..SpotifyConfig::default()
        }
    }

    #[test]
    fn test_pkce_verifier_shape() {
        let verifier = pkce_verifier();
        assert_eq!(verifier.len(), 43);
        assert!(verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_pkce_challenge_rfc7636_vector() {
        // Appendix B of RFC 7636.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            pkce_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_authorize_url_carries_fixed_params() {
        let auth = SpotifyAuth::new(configured());
        let url = auth.build_authorize_url("challenge123", "state456").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().collect();
        assert_eq!(pairs["client_id"], "test-client");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["code_challenge"], "challenge123");
        assert_eq!(pairs["state"], "state456");
        assert_eq!(
            pairs["scope"],
            "user-read-recently-played user-read-currently-playing"
        );
        assert!(url.starts_with(AUTHORIZE_ENDPOINT));
    }

    #[test]
    fn test_extract_code() {
        assert_eq!(
            extract_code("likelater://spotify-auth?code=abc&state=xyz").as_deref(),
            Some("abc")
        );
        assert!(extract_code("likelater://spotify-auth?state=xyz").is_none());
        assert!(extract_code("not a url").is_none());
    }

    #[tokio::test]
    async fn test_begin_authorization_requires_client_id() {
        let auth = SpotifyAuth::new(SpotifyConfig::default());
        let result = auth.begin_authorization().await;
        assert!(matches!(result, Err(CoreError::MissingClientId)));
        assert_eq!(auth.phase().await, AuthPhase::Disconnected);
        assert_eq!(auth.last_status().await, "Set your Spotify client ID first.");
    }

    #[tokio::test]
    async fn test_begin_authorization_enters_authorizing() {
        let auth = SpotifyAuth::new(configured());
        let url = auth.begin_authorization().await.unwrap();
        assert_eq!(auth.phase().await, AuthPhase::Authorizing);
        let parsed = Url::parse(&url).unwrap();
        assert!(parsed
            .query_pairs()
            .any(|(name, _)| name == "code_challenge"));
    }

    #[tokio::test]
    async fn test_callback_without_code_disconnects() {
        let auth = SpotifyAuth::new(configured());
        auth.begin_authorization().await.unwrap();
        let result = auth
            .complete_authorization("http://127.0.0.1:9788/callback?error=access_denied")
            .await;
        assert!(matches!(result, Err(CoreError::AuthCallback(_))));
        assert_eq!(auth.phase().await, AuthPhase::Disconnected);
        assert_eq!(auth.last_status().await, "No auth code in callback.");
    }

    #[tokio::test]
    async fn test_callback_without_verifier_disconnects() {
        // No begin_authorization first, so no verifier is stored; the
        // exchange must refuse before any network traffic.
        let auth = SpotifyAuth::new(configured());
        let result = auth
            .complete_authorization("http://127.0.0.1:9788/callback?code=abc")
            .await;
        assert!(matches!(result, Err(CoreError::AuthCallback(_))));
        assert_eq!(auth.last_status().await, "Missing PKCE verifier.");
    }

    #[tokio::test]
    async fn test_bearer_token_fails_fast_when_disconnected() {
        let auth = SpotifyAuth::new(configured());
        let result = auth.bearer_token().await;
        assert!(matches!(result, Err(CoreError::NotConnected)));
        assert_eq!(auth.last_status().await, "Connect Spotify first.");
    }

    #[tokio::test]
    async fn test_cancel_authorization_drops_flow_state() {
        let auth = SpotifyAuth::new(configured());
        auth.begin_authorization().await.unwrap();
        auth.cancel_authorization("user dismissed").await;
        assert_eq!(auth.phase().await, AuthPhase::Disconnected);
        assert!(auth.last_status().await.starts_with("Auth cancelled:"));
        // A late callback after cancellation finds no verifier.
        let result = auth
            .complete_authorization("http://127.0.0.1:9788/callback?code=abc")
            .await;
        assert!(matches!(result, Err(CoreError::AuthCallback(_))));
    }
}
