// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth session for the wearable provider.
//!
//! Owns the single in-memory view of the current token pair and the lock
//! that serializes every refresh exchange. Provider refresh tokens are
//! single-use, so two concurrent refreshes would invalidate each other;
//! callers that arrive while a refresh is in flight wait for it and reuse
//! its result, including its failure.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::time::Instant;

use crate::config::Config;
use crate::db::CredentialStore;
use crate::error::AppError;
use crate::models::Credential;
use crate::services::call_context::CallContext;
use crate::services::cipher::{decrypt_tokens, encrypt_tokens, TokenCipher};
use crate::services::mapper::PROVIDER_NAME;
use crate::services::USER_AGENT;

/// Refresh proactively when the token expires within this margin (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Lifetime of an issued authorization state.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

pub const DEFAULT_SCOPES: &[&str] = &[
    "activity",
    "heartrate",
    "oxygen_saturation",
    "respiratory_rate",
    "sleep",
    "temperature",
    "cardio_fitness",
    "profile",
];

/// Endpoints and client credentials for the authorization flow.
#[derive(Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub scopes: Vec<String>,
    pub request_timeout: Duration,
}

impl OAuthSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client_id: config.fitbit_client_id.clone(),
            client_secret: config.fitbit_client_secret.clone(),
            redirect_uri: config.fitbit_redirect_uri.clone(),
            authorize_url: config.fitbit_authorize_url.clone(),
            token_url: config.fitbit_token_url.clone(),
            revoke_url: config.fitbit_revoke_url.clone(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            request_timeout: config.provider_request_timeout,
        }
    }
}

/// Redirect target plus the state value the callback must echo back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Token endpoint response (both grant types).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Decrypted token pair held in memory.
#[derive(Clone)]
struct TokenView {
    access_token: String,
    refresh_token: String,
    token_type: String,
    expires_at: DateTime<Utc>,
    scopes: Vec<String>,
    extra: BTreeMap<String, String>,
}

impl TokenView {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }

    /// Build from a token response. Missing fields carry over from `previous`.
    fn from_response(
        resp: TokenResponse,
        now: DateTime<Utc>,
        previous: Option<&TokenView>,
    ) -> Result<Self, AppError> {
        let refresh_token = resp
            .refresh_token
            .or_else(|| previous.map(|p| p.refresh_token.clone()))
            .ok_or_else(|| AppError::TokenExchange("response has no refresh token".into()))?;

        let scopes = match resp.scope {
            Some(s) => s.split_whitespace().map(str::to_string).collect(),
            None => previous.map(|p| p.scopes.clone()).unwrap_or_default(),
        };

        let mut extra = previous.map(|p| p.extra.clone()).unwrap_or_default();
        if let Some(user_id) = resp.user_id {
            extra.insert("user_id".to_string(), user_id);
        }

        Ok(Self {
            access_token: resp.access_token,
            refresh_token,
            token_type: resp.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: now + ChronoDuration::seconds(resp.expires_in),
            scopes,
            extra,
        })
    }
}

struct PendingAuthorization {
    code_verifier: String,
    created_at: Instant,
}

/// Shared OAuth session. One instance per process, injected into every
/// consumer behind an `Arc`.
pub struct OAuthSession {
    http: reqwest::Client,
    settings: OAuthSettings,
    store: Arc<dyn CredentialStore>,
    cipher: Arc<TokenCipher>,
    rng: SystemRandom,
    cache: RwLock<Option<TokenView>>,
    /// Serializes exchanges. Holds the failure of the last refresh attempt.
    refresh_lock: Mutex<Option<AppError>>,
    /// Bumped under `refresh_lock` after every refresh attempt.
    refresh_generation: AtomicU64,
    pending: DashMap<String, PendingAuthorization>,
}

impl OAuthSession {
    pub fn new(
        settings: OAuthSettings,
        store: Arc<dyn CredentialStore>,
        cipher: Arc<TokenCipher>,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            settings,
            store,
            cipher,
            rng: SystemRandom::new(),
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(None),
            refresh_generation: AtomicU64::new(0),
            pending: DashMap::new(),
        })
    }

    // ─── Authorization Flow ──────────────────────────────────────

    /// Build the provider redirect URL with a fresh state and PKCE challenge.
    pub fn authorization_url(&self) -> Result<AuthorizationRequest, AppError> {
        self.purge_expired_states();

        let state = hex::encode(self.random_bytes::<16>()?);
        let code_verifier = URL_SAFE_NO_PAD.encode(self.random_bytes::<32>()?);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));

        let url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
            self.settings.authorize_url,
            urlencoding::encode(&self.settings.client_id),
            urlencoding::encode(&self.settings.redirect_uri),
            urlencoding::encode(&self.settings.scopes.join(" ")),
            state,
            challenge,
        );

        self.pending.insert(
            state.clone(),
            PendingAuthorization {
                code_verifier,
                created_at: Instant::now(),
            },
        );

        Ok(AuthorizationRequest { url, state })
    }

    /// Exchange an authorization code for a token pair and persist it.
    ///
    /// The state is consumed whether or not the exchange succeeds.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        ctx: &CallContext,
    ) -> Result<(), AppError> {
        let pending = match self.pending.remove(state) {
            Some((_, p)) if p.created_at.elapsed() <= STATE_TTL => p,
            _ => return Err(AppError::InvalidState),
        };

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("code_verifier", pending.code_verifier.as_str()),
            ("client_id", self.settings.client_id.as_str()),
        ];
        let resp = self
            .post_token_form(&form, ctx)
            .await?
            .map_err(AppError::TokenExchange)?;

        let view = TokenView::from_response(resp, Utc::now(), None)?;

        let mut last_failure = ctx.run(async { Ok(self.refresh_lock.lock().await) }).await?;
        self.persist(&view).await?;
        *self.cache.write().await = Some(view);
        *last_failure = None;

        tracing::info!(provider = PROVIDER_NAME, "Provider connected");
        Ok(())
    }

    // ─── Token Access ────────────────────────────────────────────

    /// Return a valid access token, refreshing first if it is inside the
    /// safety margin.
    pub async fn access_token(&self, ctx: &CallContext) -> Result<String, AppError> {
        // Fast path: no lock, no I/O
        if let Some(view) = self.cache.read().await.as_ref() {
            if view.is_fresh(Utc::now()) {
                return Ok(view.access_token.clone());
            }
        }

        let mut last_failure = self.wait_for_refresh(ctx).await?;

        // Another caller may have refreshed while we waited
        let view = self.current_view().await?;
        if view.is_fresh(Utc::now()) {
            return Ok(view.access_token);
        }

        let refreshed = self.refresh_locked(&view, &mut last_failure, ctx).await?;
        Ok(refreshed.access_token)
    }

    /// No-op unless the token expires within the safety margin.
    pub async fn refresh_if_needed(&self, ctx: &CallContext) -> Result<(), AppError> {
        self.access_token(ctx).await.map(|_| ())
    }

    /// Refresh unconditionally after `rejected` was refused by the provider.
    ///
    /// If another caller already replaced that token, its result is reused
    /// instead of issuing a second exchange.
    pub async fn force_refresh(
        &self,
        rejected: &str,
        ctx: &CallContext,
    ) -> Result<String, AppError> {
        let mut last_failure = self.wait_for_refresh(ctx).await?;

        let view = self.current_view().await?;
        if view.access_token != rejected && view.is_fresh(Utc::now()) {
            tracing::debug!("Token already replaced by a concurrent refresh");
            return Ok(view.access_token);
        }

        let refreshed = self.refresh_locked(&view, &mut last_failure, ctx).await?;
        Ok(refreshed.access_token)
    }

    /// True if a credential exists and can be decrypted.
    pub async fn is_authorized(&self) -> Result<bool, AppError> {
        if self.cache.read().await.is_some() {
            return Ok(true);
        }

        match self.load_view().await {
            Ok(view) => {
                *self.cache.write().await = Some(view);
                Ok(true)
            }
            Err(AppError::NotAuthorized) => Ok(false),
            Err(AppError::Decryption(e)) => {
                tracing::error!(error = %e, "Stored credential cannot be decrypted");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Revoke (best effort) and delete the stored credential.
    pub async fn disconnect(&self, ctx: &CallContext) -> Result<(), AppError> {
        let mut last_failure = ctx.run(async { Ok(self.refresh_lock.lock().await) }).await?;
        *last_failure = None;

        match self.current_view().await {
            Ok(view) => self.revoke(&view.refresh_token, ctx).await,
            Err(AppError::NotAuthorized) => {}
            Err(e) => tracing::warn!(error = %e, "Skipping revoke, credential unreadable"),
        }

        self.store.delete(PROVIDER_NAME).await?;
        *self.cache.write().await = None;

        tracing::info!(provider = PROVIDER_NAME, "Provider disconnected");
        Ok(())
    }

    // ─── Internals ───────────────────────────────────────────────

    /// Cached view, loading from the store on a miss.
    async fn current_view(&self) -> Result<TokenView, AppError> {
        if let Some(view) = self.cache.read().await.as_ref() {
            return Ok(view.clone());
        }

        let view = self.load_view().await?;
        *self.cache.write().await = Some(view.clone());
        Ok(view)
    }

    async fn load_view(&self) -> Result<TokenView, AppError> {
        let cred = self
            .store
            .get(PROVIDER_NAME)
            .await?
            .ok_or(AppError::NotAuthorized)?;

        let (access_token, refresh_token) = decrypt_tokens(
            &self.cipher,
            &cred.access_token_encrypted,
            &cred.refresh_token_encrypted,
        )?;

        Ok(TokenView {
            access_token,
            refresh_token,
            token_type: cred.token_type,
            expires_at: cred.expires_at,
            scopes: cred.scopes,
            extra: cred.extra,
        })
    }

    /// Take the refresh lock. If a refresh attempt finished while this
    /// caller waited and it failed, that failure is returned instead.
    async fn wait_for_refresh(
        &self,
        ctx: &CallContext,
    ) -> Result<MutexGuard<'_, Option<AppError>>, AppError> {
        let seen = self.refresh_generation.load(Ordering::Acquire);
        let guard = ctx.run(async { Ok(self.refresh_lock.lock().await) }).await?;

        if self.refresh_generation.load(Ordering::Acquire) != seen {
            if let Some(e) = guard.as_ref().and_then(replay_failure) {
                tracing::debug!(error = %e, "Concurrent refresh failed, not retrying");
                return Err(e);
            }
        }
        Ok(guard)
    }

    /// One refresh attempt. `last_failure` is the guarded slot of
    /// `refresh_lock`; its outcome is recorded there for waiting callers.
    async fn refresh_locked(
        &self,
        current: &TokenView,
        last_failure: &mut Option<AppError>,
        ctx: &CallContext,
    ) -> Result<TokenView, AppError> {
        let result = self.exchange_refresh_token(current, ctx).await;
        *last_failure = result.as_ref().err().and_then(replay_failure);
        self.refresh_generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn exchange_refresh_token(
        &self,
        current: &TokenView,
        ctx: &CallContext,
    ) -> Result<TokenView, AppError> {
        tracing::info!(provider = PROVIDER_NAME, "Access token expiring, refreshing");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
        ];
        let resp = self
            .post_token_form(&form, ctx)
            .await?
            .map_err(AppError::RefreshFailed)?;

        let view = TokenView::from_response(resp, Utc::now(), Some(current))?;

        // The old refresh token is now spent: keep the new pair in memory
        // even if persisting it fails.
        let persisted = self.persist(&view).await;
        *self.cache.write().await = Some(view.clone());

        if let Err(e) = persisted {
            tracing::error!(error = %e, "Failed to persist refreshed token");
            return Err(e);
        }

        tracing::info!(
            provider = PROVIDER_NAME,
            expires_at = %view.expires_at,
            "Token refreshed"
        );
        Ok(view)
    }

    /// POST to the token endpoint. The inner `Err` carries a rejection from
    /// the provider; the outer one a transport, decode, or context failure.
    async fn post_token_form(
        &self,
        form: &[(&str, &str)],
        ctx: &CallContext,
    ) -> Result<Result<TokenResponse, String>, AppError> {
        ctx.run(async {
            let response = self
                .http
                .post(&self.settings.token_url)
                .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
                .form(form)
                .send()
                .await
                .map_err(|e| AppError::Transport(format!("Token request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(status = %status, "Token endpoint rejected request");
                return Ok(Err(format!("HTTP {}: {}", status, body)));
            }

            let token = response
                .json::<TokenResponse>()
                .await
                .map_err(|e| AppError::Decode(format!("Token response: {}", e)))?;
            Ok::<_, AppError>(Ok(token))
        })
        .await
    }

    async fn persist(&self, view: &TokenView) -> Result<(), AppError> {
        let (access, refresh) =
            encrypt_tokens(&self.cipher, &view.access_token, &view.refresh_token)?;

        let cred = Credential {
            provider: PROVIDER_NAME.to_string(),
            access_token_encrypted: access,
            refresh_token_encrypted: refresh,
            token_type: view.token_type.clone(),
            expires_at: view.expires_at,
            scopes: view.scopes.clone(),
            extra: view.extra.clone(),
            updated_at: Utc::now(),
        };
        self.store.save(&cred).await
    }

    async fn revoke(&self, refresh_token: &str, ctx: &CallContext) {
        let result = ctx
            .run(async {
                self.http
                    .post(&self.settings.revoke_url)
                    .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
                    .form(&[("token", refresh_token)])
                    .send()
                    .await
                    .map_err(|e| AppError::Transport(e.to_string()))
            })
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(provider = PROVIDER_NAME, "Refresh token revoked");
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "Token revoke rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token revoke failed");
            }
        }
    }

    fn random_bytes<const N: usize>(&self) -> Result<[u8; N], AppError> {
        let mut buf = [0u8; N];
        self.rng
            .fill(&mut buf)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
        Ok(buf)
    }

    fn purge_expired_states(&self) {
        self.pending.retain(|_, p| p.created_at.elapsed() <= STATE_TTL);
    }
}

/// Copy of a refresh failure for callers that waited on the same attempt.
///
/// Context failures belong to the caller that hit them, and a persist
/// failure still left a usable token in the cache, so neither is shared.
fn replay_failure(e: &AppError) -> Option<AppError> {
    match e {
        AppError::RefreshFailed(m) => Some(AppError::RefreshFailed(m.clone())),
        AppError::TokenExchange(m) => Some(AppError::TokenExchange(m.clone())),
        AppError::Transport(m) => Some(AppError::Transport(m.clone())),
        AppError::Decode(m) => Some(AppError::Decode(m.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn session() -> OAuthSession {
        let config = Config::test_default("http://127.0.0.1:9");
        let cipher = TokenCipher::from_base64_key(&config.token_encryption_key).unwrap();
        OAuthSession::new(
            OAuthSettings::from_config(&config),
            Arc::new(MemoryStore::new()),
            Arc::new(cipher),
        )
        .unwrap()
    }

    #[test]
    fn test_authorization_url_carries_state_and_challenge() {
        let s = session();
        let req = s.authorization_url().unwrap();

        assert_eq!(req.state.len(), 32);
        assert!(req.url.starts_with("http://127.0.0.1:9/oauth2/authorize?"));
        assert!(req.url.contains(&format!("state={}", req.state)));
        assert!(req.url.contains("code_challenge_method=S256"));
        assert!(req.url.contains("scope=activity%20heartrate"));

        let verifier = s.pending.get(&req.state).unwrap().code_verifier.clone();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        assert!(req.url.contains(&format!("code_challenge={}", challenge)));
    }

    #[test]
    fn test_states_are_unique() {
        let s = session();
        let a = s.authorization_url().unwrap();
        let b = s.authorization_url().unwrap();
        assert_ne!(a.state, b.state);
        assert_eq!(s.pending.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_state_is_rejected() {
        let s = session();
        let res = s
            .exchange_code("code", "not-issued", &CallContext::default())
            .await;
        assert!(matches!(res, Err(AppError::InvalidState)));
    }

    #[tokio::test]
    async fn test_no_credential_is_not_authorized() {
        let s = session();
        assert!(!s.is_authorized().await.unwrap());
        let res = s.access_token(&CallContext::default()).await;
        assert!(matches!(res, Err(AppError::NotAuthorized)));
    }

    #[test]
    fn test_only_exchange_failures_are_replayed() {
        assert!(matches!(
            replay_failure(&AppError::RefreshFailed("HTTP 400".into())),
            Some(AppError::RefreshFailed(m)) if m == "HTTP 400"
        ));
        assert!(matches!(
            replay_failure(&AppError::Transport("reset".into())),
            Some(AppError::Transport(_))
        ));
        assert!(replay_failure(&AppError::Cancelled).is_none());
        assert!(replay_failure(&AppError::DeadlineExceeded).is_none());
        assert!(replay_failure(&AppError::Database("down".into())).is_none());
    }

    #[test]
    fn test_token_view_freshness_margin() {
        let now = Utc::now();
        let mut view = TokenView {
            access_token: "a".into(),
            refresh_token: "r".into(),
            token_type: "Bearer".into(),
            expires_at: now + ChronoDuration::minutes(6),
            scopes: vec![],
            extra: BTreeMap::new(),
        };
        assert!(view.is_fresh(now));
        view.expires_at = now + ChronoDuration::minutes(4);
        assert!(!view.is_fresh(now));
    }

    #[test]
    fn test_refresh_response_keeps_previous_fields() {
        let now = Utc::now();
        let previous = TokenView {
            access_token: "old".into(),
            refresh_token: "old-refresh".into(),
            token_type: "Bearer".into(),
            expires_at: now,
            scopes: vec!["sleep".into()],
            extra: BTreeMap::from([("user_id".to_string(), "ABC".to_string())]),
        };
        let resp = TokenResponse {
            access_token: "new".into(),
            refresh_token: None,
            expires_in: 28800,
            token_type: None,
            scope: None,
            user_id: None,
        };

        let view = TokenView::from_response(resp, now, Some(&previous)).unwrap();
        assert_eq!(view.access_token, "new");
        assert_eq!(view.refresh_token, "old-refresh");
        assert_eq!(view.scopes, vec!["sleep".to_string()]);
        assert_eq!(view.extra["user_id"], "ABC");
        assert_eq!(view.expires_at, now + ChronoDuration::hours(8));
    }
}
