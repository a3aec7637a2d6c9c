// src/store/kv.rs — Sorted-set / hash operations over SQLite

use std::collections::HashMap;

use rusqlite::{params, Connection};

/// One write in a pipelined batch. The batch is executed in order on the
/// single store task; it is retryable, not transactional — re-running a
/// whole batch must be harmless.
#[derive(Debug, Clone)]
pub enum WriteOp {
    ZAdd {
        key: String,
        member: String,
        score: i64,
    },
    ZRem {
        key: String,
        member: String,
    },
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    HDel {
        key: String,
        fields: Vec<String>,
    },
}

/// Low-level key-value operations for all data types.
pub struct Kv {
    conn: Connection,
}

impl Kv {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    // -- Sorted sets --

    /// Insert a member or update its score.
    pub fn zadd(&self, key: &str, member: &str, score: i64) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO zset_entries (key, member, score) VALUES (?1, ?2, ?3)
             ON CONFLICT(key, member) DO UPDATE SET score = ?3",
            params![key, member, score],
        )?;
        Ok(())
    }

    pub fn zrem(&self, key: &str, member: &str) -> anyhow::Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM zset_entries WHERE key = ?1 AND member = ?2",
            params![key, member],
        )?;
        Ok(n)
    }

    /// All members, oldest first.
    pub fn zmembers(&self, key: &str) -> anyhow::Result<Vec<String>> {
        self.zrange(key, false)
    }

    /// All members, most recent first.
    pub fn zmembers_rev(&self, key: &str) -> anyhow::Result<Vec<String>> {
        self.zrange(key, true)
    }

    fn zrange(&self, key: &str, rev: bool) -> anyhow::Result<Vec<String>> {
        let sql = if rev {
            "SELECT member FROM zset_entries WHERE key = ?1 ORDER BY score DESC, member DESC"
        } else {
            "SELECT member FROM zset_entries WHERE key = ?1 ORDER BY score ASC, member ASC"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Number of members with `min <= score <= max`.
    pub fn zcount(&self, key: &str, min: i64, max: i64) -> anyhow::Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM zset_entries WHERE key = ?1 AND score BETWEEN ?2 AND ?3",
            params![key, min, max],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // -- Hashes --

    pub fn hset(&self, key: &str, fields: &[(String, String)]) -> anyhow::Result<()> {
        for (field, value) in fields {
            self.conn.execute(
                "INSERT INTO hash_entries (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO UPDATE SET value = ?3",
                params![key, field, value],
            )?;
        }
        Ok(())
    }

    pub fn hget(&self, key: &str, field: &str) -> anyhow::Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM hash_entries WHERE key = ?1 AND field = ?2")?;
        let mut rows = stmt.query_map(params![key, field], |row| row.get::<_, String>(0))?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn hgetall(&self, key: &str) -> anyhow::Result<HashMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT field, value FROM hash_entries WHERE key = ?1")?;
        let rows = stmt.query_map(params![key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut result = HashMap::new();
        for row in rows {
            let (field, value) = row?;
            result.insert(field, value);
        }
        Ok(result)
    }

    pub fn hdel(&self, key: &str, fields: &[String]) -> anyhow::Result<usize> {
        let mut n = 0;
        for field in fields {
            n += self.conn.execute(
                "DELETE FROM hash_entries WHERE key = ?1 AND field = ?2",
                params![key, field],
            )?;
        }
        Ok(n)
    }

    // -- Batches --

    /// Execute a sequence of writes in order.
    pub fn apply(&self, ops: &[WriteOp]) -> anyhow::Result<()> {
        for op in ops {
            match op {
                WriteOp::ZAdd { key, member, score } => self.zadd(key, member, *score)?,
                WriteOp::ZRem { key, member } => {
                    self.zrem(key, member)?;
                }
                WriteOp::HSet { key, fields } => self.hset(key, fields)?,
                WriteOp::HDel { key, fields } => {
                    self.hdel(key, fields)?;
                }
            }
        }
        Ok(())
    }

    /// Get a reference to the underlying connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}
