mod client;
mod dev;

pub use client::OpenAiAnalyzer;
pub use dev::DevAnalyzer;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the pipeline hands to the analyzer for one message.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub platform: String,
    pub content: String,
    pub user_id: String,
    pub context: serde_json::Value,
}

/// Structured verdict about a message. Fields default to empty so a
/// partial model answer still deserializes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub should_respond: bool,
    #[serde(default)]
    pub suggested_response: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub should_create_task: bool,
    #[serde(default)]
    pub task_title: String,
    #[serde(default)]
    pub task_description: String,
    #[serde(default)]
    pub task_priority: String,
    #[serde(default)]
    pub task_tags: Vec<String>,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub category: String,
}

/// External language-model collaborator. Calls must honor the caller's
/// cancellation; failures are recovered by the pipeline with canned
/// fallbacks.
#[async_trait]
pub trait MessageAnalyzer: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse>;
}
