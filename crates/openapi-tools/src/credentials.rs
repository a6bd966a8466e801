//! Credential material and session token lifecycle.
//!
//! Built once at startup from configuration; tool arguments never carry
//! primary credentials. Session-style backends (login once, replay a token
//! header) refresh single-flight: the token cell is an async mutex, and the
//! refresh happens with the lock held, so N callers hitting an expired token
//! produce exactly one login request.

use crate::config::{AuthConfig, SessionAuthConfig};
use crate::error::{BridgeError, Result};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct SessionToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct SessionState {
    cfg: SessionAuthConfig,
    token: Mutex<Option<SessionToken>>,
}

#[derive(Debug)]
pub struct CredentialContext {
    auth: AuthConfig,
    session: Option<SessionState>,
}

impl CredentialContext {
    pub fn new(auth: AuthConfig) -> Self {
        let session = match &auth {
            AuthConfig::Session(cfg) => Some(SessionState {
                cfg: cfg.clone(),
                token: Mutex::new(None),
            }),
            _ => None,
        };
        Self { auth, session }
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    pub fn is_session(&self) -> bool {
        self.session.is_some()
    }

    /// Header name the session token is replayed under.
    pub fn session_header(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.cfg.token_header.as_str())
    }

    /// Return a valid session token, logging in if the cached one is absent
    /// or expired. Callers waiting on the lock reuse the fresh token instead
    /// of logging in again.
    pub async fn session_token(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        timeout: Duration,
    ) -> Result<String> {
        let Some(state) = &self.session else {
            return Err(BridgeError::Config(
                "session token requested but auth is not session-based".to_string(),
            ));
        };

        let mut guard = state.token.lock().await;
        if let Some(token) = guard.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        let value = login(client, base_url, &state.cfg, timeout).await?;
        tracing::info!(
            username = %state.cfg.username,
            token = %mask_secret(&value),
            "refreshed backend session token"
        );
        *guard = Some(SessionToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(state.cfg.ttl_secs),
        });
        Ok(value)
    }

    /// Drop the cached token so the next call logs in again. Used after the
    /// backend rejects a request with 401.
    pub async fn invalidate_session_token(&self) {
        if let Some(state) = &self.session {
            *state.token.lock().await = None;
        }
    }
}

async fn login(
    client: &reqwest::Client,
    base_url: &str,
    cfg: &SessionAuthConfig,
    timeout: Duration,
) -> Result<String> {
    let url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        cfg.login_path.trim_start_matches('/')
    );

    let resp = client
        .post(&url)
        .basic_auth(&cfg.username, Some(&cfg.password))
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                BridgeError::Timeout("session login timed out".to_string())
            } else {
                BridgeError::BackendUnavailable("session login failed to connect".to_string())
            }
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(BridgeError::Authentication(format!(
            "session login returned HTTP {status}"
        )));
    }

    let body: Value = resp
        .json()
        .await
        .map_err(|_| BridgeError::Authentication("session login response is not JSON".to_string()))?;
    body.get(&cfg.token_field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| {
            BridgeError::Authentication(format!(
                "session login response has no '{}' field",
                cfg.token_field
            ))
        })
}

/// Mask a secret for log output: first and last four characters of long
/// values, fully masked otherwise.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
