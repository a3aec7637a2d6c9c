// src/agent/mod.rs — Remote agent interface

pub mod client;
pub mod stream;

pub use client::{AgentClient, TurnMetadata};
pub use stream::AgentEvent;
