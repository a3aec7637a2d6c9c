// src/store/handle.rs — Async message passing for the Kv store

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use crate::store::kv::{Kv, WriteOp};

#[derive(Debug)]
pub enum KvCommand {
    ZAdd {
        key: String,
        member: String,
        score: i64,
        resp: oneshot::Sender<anyhow::Result<()>>,
    },
    ZRem {
        key: String,
        member: String,
        resp: oneshot::Sender<anyhow::Result<usize>>,
    },
    ZMembers {
        key: String,
        rev: bool,
        resp: oneshot::Sender<anyhow::Result<Vec<String>>>,
    },
    ZCount {
        key: String,
        min: i64,
        max: i64,
        resp: oneshot::Sender<anyhow::Result<u64>>,
    },
    HSet {
        key: String,
        fields: Vec<(String, String)>,
        resp: oneshot::Sender<anyhow::Result<()>>,
    },
    HGet {
        key: String,
        field: String,
        resp: oneshot::Sender<anyhow::Result<Option<String>>>,
    },
    HGetAll {
        key: String,
        resp: oneshot::Sender<anyhow::Result<HashMap<String, String>>>,
    },
    HDel {
        key: String,
        fields: Vec<String>,
        resp: oneshot::Sender<anyhow::Result<usize>>,
    },
    Apply {
        ops: Vec<WriteOp>,
        resp: oneshot::Sender<anyhow::Result<()>>,
    },
}

/// A handle to the Kv store that uses message passing. Clone-cheap; every
/// caller shares the single connection-owning task.
#[derive(Clone)]
pub struct KvHandle {
    tx: mpsc::Sender<KvCommand>,
}

impl KvHandle {
    pub fn new(tx: mpsc::Sender<KvCommand>) -> Self {
        Self { tx }
    }

    pub async fn zadd(&self, key: &str, member: &str, score: i64) -> anyhow::Result<()> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(KvCommand::ZAdd {
                key: key.to_string(),
                member: member.to_string(),
                score,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn zrem(&self, key: &str, member: &str) -> anyhow::Result<usize> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(KvCommand::ZRem {
                key: key.to_string(),
                member: member.to_string(),
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn zmembers(&self, key: &str) -> anyhow::Result<Vec<String>> {
        self.zmembers_inner(key, false).await
    }

    pub async fn zmembers_rev(&self, key: &str) -> anyhow::Result<Vec<String>> {
        self.zmembers_inner(key, true).await
    }

    async fn zmembers_inner(&self, key: &str, rev: bool) -> anyhow::Result<Vec<String>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(KvCommand::ZMembers {
                key: key.to_string(),
                rev,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn zcount(&self, key: &str, min: i64, max: i64) -> anyhow::Result<u64> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(KvCommand::ZCount {
                key: key.to_string(),
                min,
                max,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn hset(&self, key: &str, fields: Vec<(String, String)>) -> anyhow::Result<()> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(KvCommand::HSet {
                key: key.to_string(),
                fields,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn hget(&self, key: &str, field: &str) -> anyhow::Result<Option<String>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(KvCommand::HGet {
                key: key.to_string(),
                field: field.to_string(),
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn hgetall(&self, key: &str) -> anyhow::Result<HashMap<String, String>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(KvCommand::HGetAll {
                key: key.to_string(),
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn hdel(&self, key: &str, fields: Vec<String>) -> anyhow::Result<usize> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(KvCommand::HDel {
                key: key.to_string(),
                fields,
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    /// Pipelined batch of writes, executed back to back on the store task.
    pub async fn apply(&self, ops: Vec<WriteOp>) -> anyhow::Result<()> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(KvCommand::Apply { ops, resp: resp_tx })
            .await?;
        resp_rx.await?
    }
}

/// Helper to spawn the store server and return a handle.
pub fn spawn_kv_server(kv: Kv) -> (KvHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(100);
    let handle = KvHandle::new(tx);
    let join_handle = tokio::spawn(run_kv_server(kv, rx));
    (handle, join_handle)
}

/// The background task that owns the Kv store.
pub async fn run_kv_server(kv: Kv, mut rx: mpsc::Receiver<KvCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            KvCommand::ZAdd {
                key,
                member,
                score,
                resp,
            } => {
                let res = kv.zadd(&key, &member, score);
                let _ = resp.send(res);
            }
            KvCommand::ZRem { key, member, resp } => {
                let res = kv.zrem(&key, &member);
                let _ = resp.send(res);
            }
            KvCommand::ZMembers { key, rev, resp } => {
                let res = if rev {
                    kv.zmembers_rev(&key)
                } else {
                    kv.zmembers(&key)
                };
                let _ = resp.send(res);
            }
            KvCommand::ZCount {
                key,
                min,
                max,
                resp,
            } => {
                let res = kv.zcount(&key, min, max);
                let _ = resp.send(res);
            }
            KvCommand::HSet { key, fields, resp } => {
                let res = kv.hset(&key, &fields);
                let _ = resp.send(res);
            }
            KvCommand::HGet { key, field, resp } => {
                let res = kv.hget(&key, &field);
                let _ = resp.send(res);
            }
            KvCommand::HGetAll { key, resp } => {
                let res = kv.hgetall(&key);
                let _ = resp.send(res);
            }
            KvCommand::HDel { key, fields, resp } => {
                let res = kv.hdel(&key, &fields);
                let _ = resp.send(res);
            }
            KvCommand::Apply { ops, resp } => {
                let res = kv.apply(&ops);
                let _ = resp.send(res);
            }
        }
    }
}
