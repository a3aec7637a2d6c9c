// src/store/mod.rs — Storage manager

pub mod chats;
pub mod handle;
pub mod kv;
pub mod quota;
pub mod schema;
pub mod settings;

use std::path::Path;

use rusqlite::Connection;

pub use handle::{spawn_kv_server, KvHandle};

/// Owns the SQLite connection until it is handed to the store task.
pub struct StoreManager {
    pub kv: kv::Kv,
}

impl StoreManager {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        schema::run_migrations(&conn)?;

        Ok(Self {
            kv: kv::Kv::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            kv: kv::Kv::new(conn),
        })
    }

    /// Spawn the store task, consuming the manager.
    pub fn spawn(self) -> (KvHandle, tokio::task::JoinHandle<()>) {
        spawn_kv_server(self.kv)
    }
}

// Key layout, shared by the domain stores.

pub(crate) fn chat_key(id: &str) -> String {
    format!("chat:{id}")
}

pub(crate) fn chat_index_key(user_id: &str) -> String {
    format!("user:chat:{user_id}")
}

pub(crate) fn settings_key(user_id: &str) -> String {
    format!("user:settings:{user_id}")
}

pub(crate) fn usage_key(user_id: &str) -> String {
    format!("usage:{user_id}")
}

pub(crate) fn user_key(email: &str) -> String {
    format!("user:{email}")
}

pub(crate) fn session_key(token: &str) -> String {
    format!("session:{token}")
}
