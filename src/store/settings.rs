// src/store/settings.rs — Per-user settings, access snapshots, and codes

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::infra::config::QuotaConfig;
use crate::infra::errors::RelayError;
use crate::store::{quota, settings_key, user_key, KvHandle};

const MASK_PREFIX_LEN: usize = 16;
const MASK_SUFFIX_LEN: usize = 4;
const CODE_TTL_MS: i64 = 15 * 60 * 1000;
const MIN_PASSWORD_LEN: usize = 6;

/// Stored per-user settings record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserSettings {
    pub api_key: Option<String>,
    pub api_key_set_at: Option<i64>,
}

/// What the UI and the quota layer need to know about a user's access.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessSnapshot {
    pub email: String,
    pub has_api_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_masked: Option<String>,
    pub limits_enabled: bool,
    pub daily_limit: u32,
    /// Forced to 0 for key-holders and when limiting is off; their usage
    /// entries are not enforcement-relevant.
    pub daily_count: u64,
    pub email_verified: bool,
}

/// Outcome of requesting a verification code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeIssue {
    /// Code stored; returned to the caller for delivery.
    Issued(String),
    AlreadyVerified,
}

/// Fixed masking contract: 16-char prefix, ellipsis, 4-char suffix.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let prefix: String = chars.iter().take(MASK_PREFIX_LEN).collect();
    let suffix: String = chars
        .iter()
        .skip(chars.len().saturating_sub(MASK_SUFFIX_LEN))
        .collect();
    format!("{prefix}...{suffix}")
}

/// Constant-time byte comparison so code checks don't leak match length.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// 6-digit numeric code.
fn generate_code() -> anyhow::Result<String> {
    let mut buf = [0u8; 4];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow::anyhow!("rng failure: {e}"))?;
    let n = u32::from_le_bytes(buf);
    Ok(format!("{}", 100_000 + n % 900_000))
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Clone)]
pub struct SettingsStore {
    kv: KvHandle,
    quota_config: QuotaConfig,
}

impl SettingsStore {
    pub fn new(kv: KvHandle, quota_config: QuotaConfig) -> Self {
        Self { kv, quota_config }
    }

    pub async fn settings_for(&self, user_id: &str) -> anyhow::Result<UserSettings> {
        let fields = self.kv.hgetall(&settings_key(user_id)).await?;
        Ok(UserSettings {
            api_key: fields.get("apiKey").cloned().filter(|k| !k.is_empty()),
            api_key_set_at: fields.get("apiKeySetAt").and_then(|v| v.parse().ok()),
        })
    }

    pub async fn api_key_for(&self, user_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.settings_for(user_id).await?.api_key)
    }

    /// Save the caller's own API key. Returns the masked form for display.
    pub async fn save_api_key(&self, user_id: &str, key: &str) -> Result<String, RelayError> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(RelayError::validation("Please provide a valid API key."));
        }
        self.kv
            .hset(
                &settings_key(user_id),
                vec![
                    ("apiKey".to_string(), trimmed.to_string()),
                    ("apiKeySetAt".to_string(), now_ms().to_string()),
                ],
            )
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        Ok(mask_api_key(trimmed))
    }

    pub async fn remove_api_key(&self, user_id: &str) -> Result<(), RelayError> {
        self.kv
            .hdel(
                &settings_key(user_id),
                vec!["apiKey".to_string(), "apiKeySetAt".to_string()],
            )
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Build the access snapshot the settings page and quota layer consume.
    /// Read failures degrade to the most restrictive-but-harmless view.
    pub async fn snapshot(&self, user_id: &str, email: &str) -> AccessSnapshot {
        let settings = match self.settings_for(user_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!("settings unavailable for {user_id}: {e}");
                UserSettings::default()
            }
        };
        let has_api_key = settings.api_key.is_some();

        let usage_count = if self.quota_config.enabled {
            match quota::daily_count(&self.kv, user_id).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("usage count unavailable for {user_id}: {e}");
                    0
                }
            }
        } else {
            0
        };

        let email_verified = match self.kv.hget(&user_key(email), "emailVerified").await {
            Ok(v) => matches!(v.as_deref(), Some("true") | Some("1")),
            Err(e) => {
                warn!("user record unavailable for {email}: {e}");
                false
            }
        };

        AccessSnapshot {
            email: email.to_string(),
            api_key_masked: settings.api_key.as_deref().map(mask_api_key),
            has_api_key,
            limits_enabled: self.quota_config.enabled,
            daily_limit: self.quota_config.effective_limit(),
            daily_count: if has_api_key || !self.quota_config.enabled {
                0
            } else {
                usage_count
            },
            email_verified,
        }
    }

    // -- Email verification --

    pub async fn request_email_verification(&self, email: &str) -> Result<CodeIssue, RelayError> {
        let user = self
            .kv
            .hgetall(&user_key(email))
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        if user.is_empty() {
            return Err(RelayError::NotFound);
        }
        if matches!(
            user.get("emailVerified").map(String::as_str),
            Some("true") | Some("1")
        ) {
            return Ok(CodeIssue::AlreadyVerified);
        }

        let code = generate_code().map_err(RelayError::Other)?;
        let expires_at = now_ms() + CODE_TTL_MS;
        self.kv
            .hset(
                &user_key(email),
                vec![
                    ("verificationCode".to_string(), code.clone()),
                    ("verificationExpiresAt".to_string(), expires_at.to_string()),
                ],
            )
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        Ok(CodeIssue::Issued(code))
    }

    pub async fn verify_email(&self, email: &str, code: &str) -> Result<(), RelayError> {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(RelayError::validation("Please enter the verification code."));
        }

        let user = self
            .kv
            .hgetall(&user_key(email))
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        let Some(stored) = user.get("verificationCode").filter(|c| !c.is_empty()) else {
            return Err(RelayError::validation("Request a verification code first."));
        };

        let expires_at: i64 = user
            .get("verificationExpiresAt")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if expires_at != 0 && now_ms() > expires_at {
            return Err(RelayError::CodeExpired);
        }
        if !constant_time_eq(stored.as_bytes(), trimmed.as_bytes()) {
            return Err(RelayError::CodeIncorrect);
        }

        self.kv
            .hset(
                &user_key(email),
                vec![("emailVerified".to_string(), "true".to_string())],
            )
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        self.kv
            .hdel(
                &user_key(email),
                vec![
                    "verificationCode".to_string(),
                    "verificationExpiresAt".to_string(),
                ],
            )
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    // -- Password reset --

    pub async fn request_password_reset(&self, email: &str) -> Result<String, RelayError> {
        let trimmed = email.trim();
        if trimmed.is_empty() {
            return Err(RelayError::validation("Email is required."));
        }
        let user = self
            .kv
            .hgetall(&user_key(trimmed))
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        if user.is_empty() {
            return Err(RelayError::NotFound);
        }

        let code = generate_code().map_err(RelayError::Other)?;
        let expires_at = now_ms() + CODE_TTL_MS;
        self.kv
            .hset(
                &user_key(trimmed),
                vec![
                    ("resetCode".to_string(), code.clone()),
                    ("resetCodeExpiresAt".to_string(), expires_at.to_string()),
                ],
            )
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        Ok(code)
    }

    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), RelayError> {
        let email = email.trim();
        let code = code.trim();
        let password = new_password.trim();
        if email.is_empty() || code.is_empty() || password.is_empty() {
            return Err(RelayError::validation("All fields are required."));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(RelayError::validation(
                "Password must be at least 6 characters long.",
            ));
        }

        let user = self
            .kv
            .hgetall(&user_key(email))
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        let Some(stored) = user.get("resetCode").filter(|c| !c.is_empty()) else {
            return Err(RelayError::validation("Request a reset code first."));
        };

        let expires_at: i64 = user
            .get("resetCodeExpiresAt")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if expires_at != 0 && now_ms() > expires_at {
            return Err(RelayError::CodeExpired);
        }
        if !constant_time_eq(stored.as_bytes(), code.as_bytes()) {
            return Err(RelayError::CodeIncorrect);
        }

        let salt = Uuid::new_v4().to_string();
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hasher.update(salt.as_bytes());
        let hashed = hex::encode(hasher.finalize());

        self.kv
            .hset(
                &user_key(email),
                vec![
                    ("password".to_string(), hashed),
                    ("salt".to_string(), salt),
                ],
            )
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        self.kv
            .hdel(
                &user_key(email),
                vec!["resetCode".to_string(), "resetCodeExpiresAt".to_string()],
            )
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }
}
