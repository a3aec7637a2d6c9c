// src/store/chats.rs — Per-user chat ledger with soft-delete tombstones

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::infra::errors::RelayError;
use crate::session::events::RawEvent;
use crate::store::kv::WriteOp;
use crate::store::{chat_index_key, chat_key, KvHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Active,
    Deleted,
    Archived,
}

/// The full stored record for one chat. Never physically deleted; removal
/// only tombstones the index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: String,
    pub title: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub path: String,
    pub messages: Vec<RawEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_path: Option<String>,
    pub status: ChatStatus,
    #[serde(default)]
    pub client_info_history: Vec<HashMap<String, String>>,
}

impl ChatRecord {
    pub fn new(id: &str, title: &str, user_id: &str, messages: Vec<RawEvent>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            path: format!("/chat/{id}"),
            messages,
            share_path: None,
            status: ChatStatus::Active,
            client_info_history: Vec::new(),
        }
    }

    fn to_fields(&self) -> anyhow::Result<Vec<(String, String)>> {
        let mut fields = vec![
            ("id".to_string(), self.id.clone()),
            ("title".to_string(), self.title.clone()),
            ("userId".to_string(), self.user_id.clone()),
            ("createdAt".to_string(), self.created_at.to_rfc3339()),
            ("path".to_string(), self.path.clone()),
            (
                "messages".to_string(),
                serde_json::to_string(&self.messages)?,
            ),
            (
                "status".to_string(),
                match self.status {
                    ChatStatus::Active => "active".to_string(),
                    ChatStatus::Deleted => "deleted".to_string(),
                    ChatStatus::Archived => "archived".to_string(),
                },
            ),
            (
                "clientInfoHistory".to_string(),
                serde_json::to_string(&self.client_info_history)?,
            ),
        ];
        if let Some(share_path) = &self.share_path {
            fields.push(("sharePath".to_string(), share_path.clone()));
        }
        Ok(fields)
    }

    fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let id = fields.get("id")?.clone();
        let user_id = fields.get("userId")?.clone();
        let created_at = fields
            .get("createdAt")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let messages = fields
            .get("messages")
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        let client_info_history = fields
            .get("clientInfoHistory")
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        let status = match fields.get("status").map(String::as_str) {
            Some("deleted") => ChatStatus::Deleted,
            Some("archived") => ChatStatus::Archived,
            _ => ChatStatus::Active,
        };
        Some(Self {
            path: fields
                .get("path")
                .cloned()
                .unwrap_or_else(|| format!("/chat/{id}")),
            title: fields.get("title").cloned().unwrap_or_default(),
            share_path: fields.get("sharePath").cloned(),
            id,
            user_id,
            created_at,
            messages,
            status,
            client_info_history,
        })
    }
}

// Index member grammar: `active:chat:{id}`, legacy bare `chat:{id}`, and
// `deleted:chat:{id}` tombstones, scored by event time in ms.

fn active_member(id: &str) -> String {
    format!("active:chat:{id}")
}

fn bare_member(id: &str) -> String {
    format!("chat:{id}")
}

fn deleted_member(id: &str) -> String {
    format!("deleted:chat:{id}")
}

/// Active = explicit `active:` prefix or the bare legacy form.
fn is_active_member(member: &str) -> bool {
    member.starts_with("active:") || !member.contains(":chat:")
}

fn member_chat_id(member: &str) -> &str {
    member
        .strip_prefix("active:")
        .or_else(|| member.strip_prefix("deleted:"))
        .unwrap_or(member)
        .strip_prefix("chat:")
        .unwrap_or(member)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Clone)]
pub struct ChatStore {
    kv: KvHandle,
}

impl ChatStore {
    pub fn new(kv: KvHandle) -> Self {
        Self { kv }
    }

    /// Most-recent-first page of the caller's active chats. The whole index
    /// is fetched and filtered before offset/limit apply; paginating the
    /// raw index would shift page boundaries whenever a tombstone lands
    /// between two active entries.
    pub async fn list(&self, user_id: &str, limit: usize, offset: usize) -> Vec<ChatRecord> {
        let members = match self.kv.zmembers_rev(&chat_index_key(user_id)).await {
            Ok(m) => m,
            Err(e) => {
                warn!("chat index unavailable for {user_id}: {e}");
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for member in page_of_active(&members, limit, offset) {
            let id = member_chat_id(&member);
            match self.kv.hgetall(&chat_key(id)).await {
                Ok(fields) if !fields.is_empty() => {
                    if let Some(record) = ChatRecord::from_fields(&fields) {
                        records.push(record);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("chat record {id} unavailable: {e}");
                }
            }
        }
        records
    }

    /// Number of listable chats, using the same filter as `list`.
    pub async fn count_active(&self, user_id: &str) -> usize {
        match self.kv.zmembers_rev(&chat_index_key(user_id)).await {
            Ok(members) => page_of_active(&members, usize::MAX, 0).len(),
            Err(e) => {
                warn!("chat index unavailable for {user_id}: {e}");
                0
            }
        }
    }

    /// Fetch one chat. Absent, unowned and tombstoned all look the same to
    /// the caller.
    pub async fn get(&self, id: &str, user_id: &str) -> Option<ChatRecord> {
        let fields = match self.kv.hgetall(&chat_key(id)).await {
            Ok(f) => f,
            Err(e) => {
                warn!("chat record {id} unavailable: {e}");
                return None;
            }
        };
        let record = ChatRecord::from_fields(&fields)?;
        if record.user_id != user_id {
            return None;
        }
        if self.is_tombstoned(user_id, id).await {
            return None;
        }
        Some(record)
    }

    /// Upsert the record and (re-)mark it active at the current time.
    /// Recreating a previously deleted chat removes the stale tombstone, so
    /// the recreated chat is listable again.
    pub async fn save(&self, record: &ChatRecord) -> Result<(), RelayError> {
        let fields = record.to_fields().map_err(RelayError::Other)?;
        let index = chat_index_key(&record.user_id);
        let ops = vec![
            WriteOp::HSet {
                key: chat_key(&record.id),
                fields,
            },
            WriteOp::ZRem {
                key: index.clone(),
                member: deleted_member(&record.id),
            },
            WriteOp::ZAdd {
                key: index,
                member: active_member(&record.id),
                score: now_ms(),
            },
        ];
        self.kv
            .apply(ops)
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))
    }

    /// Tombstone one chat. The stored record stays put; only the index
    /// entries change. Safe to retry: removals of absent members are no-ops
    /// and the tombstone add is idempotent.
    pub async fn soft_delete(&self, id: &str, user_id: &str) -> Result<(), RelayError> {
        self.check_owner(id, user_id).await?;

        let index = chat_index_key(user_id);
        let ops = vec![
            WriteOp::ZRem {
                key: index.clone(),
                member: active_member(id),
            },
            WriteOp::ZRem {
                key: index.clone(),
                member: bare_member(id),
            },
            WriteOp::ZAdd {
                key: index,
                member: deleted_member(id),
                score: now_ms(),
            },
        ];
        self.kv
            .apply(ops)
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))
    }

    /// Tombstone every currently active chat in one batch.
    pub async fn clear_all(&self, user_id: &str) -> Result<(), RelayError> {
        let index = chat_index_key(user_id);
        let members = self
            .kv
            .zmembers(&index)
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;

        let mut ops = Vec::new();
        for member in members.iter().filter(|m| is_active_member(m)) {
            let id = member_chat_id(member);
            ops.push(WriteOp::ZRem {
                key: index.clone(),
                member: member.clone(),
            });
            ops.push(WriteOp::ZAdd {
                key: index.clone(),
                member: deleted_member(id),
                score: now_ms(),
            });
        }
        if ops.is_empty() {
            return Ok(());
        }
        self.kv
            .apply(ops)
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))
    }

    /// Mark a chat shared under a deterministic path and persist the whole
    /// record. Tombstone state is re-checked first; a concurrent delete can
    /// still slip between check and write, which is accepted.
    pub async fn share(&self, id: &str, user_id: &str) -> Result<ChatRecord, RelayError> {
        let mut record = self.get(id, user_id).await.ok_or(RelayError::NotFound)?;
        record.share_path = Some(format!("/share/{id}"));

        let fields = record.to_fields().map_err(RelayError::Other)?;
        self.kv
            .hset(&chat_key(id), fields)
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        Ok(record)
    }

    /// Fetch a chat by its share link, for any caller. Only shared and
    /// un-tombstoned chats resolve.
    pub async fn shared(&self, id: &str) -> Option<ChatRecord> {
        let fields = self.kv.hgetall(&chat_key(id)).await.ok()?;
        let record = ChatRecord::from_fields(&fields)?;
        record.share_path.as_ref()?;
        if self.is_tombstoned(&record.user_id, id).await {
            return None;
        }
        Some(record)
    }

    /// Append one client-info map to the record's history. Silently skips
    /// unowned or missing records.
    pub async fn append_client_info(
        &self,
        id: &str,
        user_id: &str,
        info: HashMap<String, String>,
    ) -> Result<(), RelayError> {
        let fields = self
            .kv
            .hgetall(&chat_key(id))
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        let Some(record) = ChatRecord::from_fields(&fields) else {
            return Ok(());
        };
        if record.user_id != user_id {
            return Ok(());
        }
        let mut history = record.client_info_history;
        history.push(info);
        let serialized = serde_json::to_string(&history).map_err(anyhow::Error::from)?;
        self.kv
            .hset(
                &chat_key(id),
                vec![("clientInfoHistory".to_string(), serialized)],
            )
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))
    }

    /// A tombstone anywhere in the index means deleted, regardless of score.
    async fn is_tombstoned(&self, user_id: &str, id: &str) -> bool {
        match self.kv.zmembers(&chat_index_key(user_id)).await {
            Ok(members) => members.iter().any(|m| m == &deleted_member(id)),
            Err(e) => {
                warn!("chat index unavailable for {user_id}: {e}");
                true
            }
        }
    }

    /// Mutations reject on ownership mismatch, independent of tombstones.
    async fn check_owner(&self, id: &str, user_id: &str) -> Result<(), RelayError> {
        let owner = self
            .kv
            .hget(&chat_key(id), "userId")
            .await
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;
        match owner {
            None => Err(RelayError::NotFound),
            Some(owner) if owner != user_id => Err(RelayError::Unauthorized),
            Some(_) => Ok(()),
        }
    }
}

/// Filter the raw index to listable entries, then paginate. An id with a
/// `deleted:` tombstone anywhere in the index is excluded even if an
/// `active:` entry also exists.
fn page_of_active(members: &[String], limit: usize, offset: usize) -> Vec<String> {
    let tombstoned: HashSet<&str> = members
        .iter()
        .filter_map(|m| m.strip_prefix("deleted:"))
        .map(member_chat_id_bare)
        .collect();

    members
        .iter()
        .filter(|m| is_active_member(m))
        .filter(|m| !tombstoned.contains(member_chat_id(m)))
        .skip(offset)
        .take(limit)
        .cloned()
        .collect()
}

fn member_chat_id_bare(member: &str) -> &str {
    member.strip_prefix("chat:").unwrap_or(member)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_grammar() {
        assert!(is_active_member("active:chat:abc"));
        assert!(is_active_member("chat:abc"));
        assert!(!is_active_member("deleted:chat:abc"));
        assert_eq!(member_chat_id("active:chat:abc"), "abc");
        assert_eq!(member_chat_id("deleted:chat:abc"), "abc");
        assert_eq!(member_chat_id("chat:abc"), "abc");
    }

    #[test]
    fn test_page_of_active_filters_before_paginating() {
        let members: Vec<String> = vec![
            "active:chat:a".into(),
            "deleted:chat:b".into(),
            "active:chat:b".into(), // tombstoned elsewhere, must not count
            "chat:c".into(),        // legacy bare form is active
            "active:chat:d".into(),
        ];
        let page = page_of_active(&members, 2, 0);
        assert_eq!(page, vec!["active:chat:a", "chat:c"]);
        let page = page_of_active(&members, 2, 2);
        assert_eq!(page, vec!["active:chat:d"]);
    }

    #[test]
    fn test_record_field_roundtrip() {
        let record = ChatRecord::new(
            "c1",
            "first question",
            "u1",
            vec![RawEvent::user_input("q", &[])],
        );
        let fields: HashMap<String, String> =
            record.to_fields().unwrap().into_iter().collect();
        let back = ChatRecord::from_fields(&fields).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_missing_owner_rejected() {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), "c1".to_string());
        assert!(ChatRecord::from_fields(&fields).is_none());
    }
}
