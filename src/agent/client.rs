// src/agent/client.rs — Streaming client for the remote agent runnable

use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::Serialize;

use crate::agent::stream::AgentEvent;
use crate::infra::config::AgentConfig;
use crate::infra::errors::RelayError;
use crate::session::events::RawEvent;

/// Per-turn metadata forwarded to the agent alongside the serialized log.
#[derive(Debug, Clone, Serialize)]
pub struct TurnMetadata {
    pub format: String,
    pub session_id: String,
    pub db_name: String,
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl TurnMetadata {
    pub fn new(session_id: &str, model_name: &str, db_name: &str, api_key: Option<String>) -> Self {
        Self {
            format: "events".into(),
            session_id: session_id.to_string(),
            db_name: db_name.to_string(),
            model_name: model_name.to_string(),
            api_key,
        }
    }
}

pub struct AgentClient {
    base_url: String,
    client: reqwest::Client,
}

impl AgentClient {
    pub fn new(config: &AgentConfig) -> Self {
        let client = reqwest::Client::builder()
            // hard wall-clock ceiling for one whole turn
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_default();
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Open one streaming call for a turn. The whole session log travels
    /// with the request; the agent holds no session state of its own.
    pub async fn stream_turn(
        &self,
        events: &[RawEvent],
        metadata: &TurnMetadata,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<AgentEvent, RelayError>> + Send>>, RelayError>
    {
        let wired: Vec<String> = events
            .iter()
            .map(RawEvent::to_wire)
            .collect::<anyhow::Result<_>>()
            .map_err(|e| RelayError::Upstream {
                message: format!("failed to serialize session log: {e}"),
            })?;

        let messages_str =
            serde_json::to_string(&wired).map_err(|e| RelayError::Upstream {
                message: format!("failed to serialize session log: {e}"),
            })?;
        let metadata_str =
            serde_json::to_string(metadata).map_err(|e| RelayError::Upstream {
                message: format!("failed to serialize turn metadata: {e}"),
            })?;

        let body = serde_json::json!({
            "input": {
                "messages_str": messages_str,
                "metadata_str": metadata_str,
            },
            "version": "v2",
        });

        let request_builder = self
            .client
            .post(format!("{}/stream_events", self.base_url))
            .header("content-type", "application/json")
            .json(&body);

        let mut es = request_builder
            .eventsource()
            .map_err(|e| RelayError::Upstream {
                message: format!("failed to open event stream: {e}"),
            })?;

        let stream = async_stream::stream! {
            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(msg)) => {
                        if msg.event == "end" {
                            break;
                        }
                        if msg.event == "error" {
                            yield Err(RelayError::Upstream {
                                message: msg.data.clone(),
                            });
                            break;
                        }
                        let parsed: serde_json::Value = match serde_json::from_str(&msg.data) {
                            Ok(v) => v,
                            Err(e) => {
                                yield Err(RelayError::Upstream {
                                    message: format!("failed to parse stream event: {e}"),
                                });
                                break;
                            }
                        };
                        match AgentEvent::from_value(&parsed) {
                            Ok(ev) => yield Ok(ev),
                            // an undecodable event is dropped, not fatal
                            Err(e) => tracing::warn!("skipping malformed agent event: {e}"),
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        yield Err(RelayError::Upstream {
                            message: format!("agent stream error: {e}"),
                        });
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
