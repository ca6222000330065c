//! Auth token lifecycle
//!
//! Obtains and refreshes bearer tokens through the auth server's
//! password-grant exchange and persists them on the settings record.
//! A failure body reporting undecodable JSON is the remote's way of
//! saying the stored password itself went stale; that triggers the
//! out-of-band password reset flow with a freshly generated strong
//! password.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Method;
use serde::Deserialize;
use taxbridge_core::ports::{RequestLogStore, SettingsStore};
use taxbridge_domain::constants::MIN_GENERATED_PASSWORD_LEN;
use taxbridge_domain::{
    HttpMethod, IntegrationSettings, RequestLog, Result, TaxBridgeError, TokenSet,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::http::HttpClient;

const TOKEN_PATH: &str = "oauth2/token/";
const PASSWORD_CHANGE_PATH: &str = "password_change/";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Manages the bearer-token lifecycle for one or more settings records.
pub struct TokenManager {
    http: HttpClient,
    settings_store: Arc<dyn SettingsStore>,
    request_log: Arc<dyn RequestLogStore>,
}

impl TokenManager {
    pub fn new(
        http: HttpClient,
        settings_store: Arc<dyn SettingsStore>,
        request_log: Arc<dyn RequestLogStore>,
    ) -> Self {
        Self { http, settings_store, request_log }
    }

    /// Current access token, refreshing first when the stored token is
    /// absent or expired.
    ///
    /// # Errors
    /// Returns `TaxBridgeError::Auth` when the exchange fails.
    pub async fn ensure_token(&self, settings: &IntegrationSettings) -> Result<String> {
        if let Some(tokens) = self.settings_store.load_tokens(&settings.name).await? {
            if !tokens.is_expired(0) {
                return Ok(tokens.access_token);
            }
        }

        let tokens = self.refresh(settings).await?;
        Ok(tokens.access_token)
    }

    /// Exchange the stored credentials for a fresh token pair and persist
    /// it with expiry = now + expires_in.
    ///
    /// # Errors
    /// Returns `TaxBridgeError::Auth` when the auth server rejects the
    /// exchange or the response cannot be parsed.
    #[instrument(skip(self, settings), fields(settings = %settings.name))]
    pub async fn refresh(&self, settings: &IntegrationSettings) -> Result<TokenSet> {
        let url = format!("{}/{TOKEN_PATH}", settings.auth_server_url.trim_end_matches('/'));

        let log = RequestLog::new(
            Uuid::new_v4().to_string(),
            "Fiscal service authentication",
            url.clone(),
            HttpMethod::Post,
            None,
        )
        .with_reference("Integration Settings", settings.name.clone());
        self.request_log.create(&log).await?;

        let form = [
            ("grant_type", "password"),
            ("username", settings.username.as_str()),
            ("password", settings.password.as_str()),
            ("client_id", settings.client_id.as_str()),
            ("client_secret", settings.client_secret.as_str()),
        ];

        let builder = self
            .http
            .request(Method::POST, &url)
            .header("Accept", "application/json")
            .form(&form);

        let response = match self.http.send(builder).await {
            Ok(response) => response,
            Err(err) => {
                self.request_log.fail(&log.id, &err.to_string()).await?;
                return Err(TaxBridgeError::Auth(format!("token exchange failed: {err}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error = response
                .json::<AuthErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| "Invalid response".to_string());
            self.request_log.fail(&log.id, &error).await?;
            return Err(TaxBridgeError::Auth(format!("authentication failed: {error}")));
        }

        let token_response: TokenResponse = response.json().await.map_err(|err| {
            TaxBridgeError::Auth(format!("failed to parse token response: {err}"))
        })?;

        let tokens = TokenSet::new(
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
        );
        self.settings_store.store_tokens(&settings.name, &tokens).await?;
        self.request_log.complete(&log.id, Some("token refreshed"), None).await?;

        info!(settings = %settings.name, "access token refreshed");
        Ok(tokens)
    }

    /// Out-of-band password reset: generate a strong random password,
    /// change it on the auth server, and persist it on success.
    ///
    /// # Errors
    /// Returns `TaxBridgeError::Auth` when the change request fails.
    #[instrument(skip(self, settings), fields(settings = %settings.name))]
    pub async fn reset_password(&self, settings: &IntegrationSettings) -> Result<()> {
        let url =
            format!("{}/{PASSWORD_CHANGE_PATH}", settings.auth_server_url.trim_end_matches('/'));
        let new_password = generate_strong_password(MIN_GENERATED_PASSWORD_LEN);

        let log = RequestLog::new(
            Uuid::new_v4().to_string(),
            "Reset fiscal service auth password",
            url.clone(),
            HttpMethod::Post,
            None,
        )
        .with_reference("Integration Settings", settings.name.clone());
        self.request_log.create(&log).await?;

        let token = self.ensure_token(settings).await?;
        let body = serde_json::json!({
            "old_password": settings.password,
            "new_password1": new_password,
            "new_password2": new_password,
        });

        let builder = self
            .http
            .request(Method::POST, &url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .json(&body);

        let response = match self.http.send(builder).await {
            Ok(response) => response,
            Err(err) => {
                self.request_log.fail(&log.id, &err.to_string()).await?;
                return Err(TaxBridgeError::Auth(format!("password change failed: {err}")));
            }
        };

        if response.status().as_u16() == 200 {
            self.settings_store.store_password(&settings.name, &new_password).await?;
            self.request_log.complete(&log.id, Some("password updated"), None).await?;
            info!(settings = %settings.name, "auth password rotated");
            Ok(())
        } else {
            let error = response
                .json::<AuthErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| "Unknown error".to_string());
            self.request_log.fail(&log.id, &error).await?;
            warn!(settings = %settings.name, error = %error, "password change rejected");
            Err(TaxBridgeError::Auth(format!("password update failed: {error}")))
        }
    }
}

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const PUNCT: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Generate a random password with at least one lowercase, uppercase,
/// digit and punctuation character.
pub fn generate_strong_password(length: usize) -> String {
    let length = length.max(MIN_GENERATED_PASSWORD_LEN);
    let mut rng = rand::thread_rng();

    let mut chars: Vec<u8> = Vec::with_capacity(length);
    // One guaranteed character from every class, the rest from the union.
    for class in [LOWER, UPPER, DIGITS, PUNCT] {
        chars.push(class[rng.gen_range(0..class.len())]);
    }
    let all: Vec<u8> = [LOWER, UPPER, DIGITS, PUNCT].concat();
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    String::from_utf8_lossy(&chars).into_owned()
}
