//! Opaque text-generation service used by the reasoning-backed arbitrator.
//!
//! The simulation only ever sees text in and text out; prompt wording and
//! model choice live with the caller, transport lives with the implementation.

use anyhow::Result;
use async_trait::async_trait;

mod client;

pub use client::HttpTextService;

/// One request/response exchange with the text service.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier understood by the service
    pub model: String,

    /// Fixed instructions (rules preamble)
    pub system: String,

    /// Per-turn context
    pub user: String,

    /// Ask the service for a single JSON object reply
    pub json_object: bool,
}

/// Text-in/text-out completion capability.
#[async_trait]
pub trait TextService: Send + Sync {
    /// Sends one request and returns the reply text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
