// src/store/quota.rs — Daily usage ledger

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use tracing::warn;

use crate::infra::config::QuotaConfig;
use crate::store::{settings_key, usage_key, KvHandle};

/// Result of asking for one question slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub allowed: bool,
    pub has_own_key: bool,
    /// Entries charged today, including this one when admitted. Always 0
    /// for key-holders and when limiting is off — their entries are
    /// analytics, not enforcement.
    pub count: u32,
    pub limit: u32,
}

/// Local-midnight day window in epoch milliseconds, inclusive.
pub(crate) fn day_window_ms(now: DateTime<Local>) -> (i64, i64) {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    let start = Local
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or(now);
    let start_ms = start.timestamp_millis();
    (start_ms, start_ms + 86_400_000 - 1)
}

/// Entries scored within today's window.
pub async fn daily_count(kv: &KvHandle, user_id: &str) -> anyhow::Result<u64> {
    let (start, end) = day_window_ms(Local::now());
    kv.zcount(&usage_key(user_id), start, end).await
}

#[derive(Clone)]
pub struct QuotaLedger {
    kv: KvHandle,
    config: QuotaConfig,
}

impl QuotaLedger {
    pub fn new(kv: KvHandle, config: QuotaConfig) -> Self {
        Self { kv, config }
    }

    pub fn limit(&self) -> u32 {
        self.config.effective_limit()
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Claim one question slot for the user. A caller holding their own
    /// API key is never limited — their usage is recorded but not counted
    /// against anything, and a store outage does not block them. Everyone
    /// else is counted against the daily limit, failing closed when the
    /// count cannot be read.
    ///
    /// Check-then-append is not atomic: concurrent claims near the limit
    /// can briefly over-admit by at most the number of in-flight requests.
    pub async fn claim(&self, user_id: &str, session_id: Option<&str>) -> ClaimOutcome {
        let has_own_key = self.has_own_key(user_id).await;

        if !self.config.enabled {
            return ClaimOutcome {
                allowed: true,
                has_own_key,
                count: 0,
                limit: 0,
            };
        }

        let limit = self.config.effective_limit();

        if has_own_key {
            if let Err(e) = self.record_usage(user_id, session_id).await {
                warn!("usage entry for key-holder {user_id} not recorded: {e}");
            }
            return ClaimOutcome {
                allowed: true,
                has_own_key: true,
                count: 0,
                limit,
            };
        }

        let current = match daily_count(&self.kv, user_id).await {
            Ok(n) => n as u32,
            Err(e) => {
                warn!("usage count unavailable for {user_id}, denying: {e}");
                return ClaimOutcome {
                    allowed: false,
                    has_own_key: false,
                    count: 0,
                    limit,
                };
            }
        };

        if current >= limit {
            return ClaimOutcome {
                allowed: false,
                has_own_key: false,
                count: current,
                limit,
            };
        }

        if let Err(e) = self.record_usage(user_id, session_id).await {
            warn!("usage entry for {user_id} not recorded, denying: {e}");
            return ClaimOutcome {
                allowed: false,
                has_own_key: false,
                count: current,
                limit,
            };
        }

        ClaimOutcome {
            allowed: true,
            has_own_key: false,
            count: current + 1,
            limit,
        }
    }

    async fn record_usage(&self, user_id: &str, session_id: Option<&str>) -> anyhow::Result<()> {
        let now = Utc::now().timestamp_millis();
        let member = format!("{}:{now}", session_id.unwrap_or("unknown"));
        self.kv.zadd(&usage_key(user_id), &member, now).await
    }

    /// Key presence lookup failing reads as "no key" so the limit check
    /// stays the deciding authority.
    async fn has_own_key(&self, user_id: &str) -> bool {
        match self.kv.hget(&settings_key(user_id), "apiKey").await {
            Ok(v) => v.is_some_and(|k| !k.is_empty()),
            Err(e) => {
                warn!("settings unavailable for {user_id}: {e}");
                false
            }
        }
    }
}
