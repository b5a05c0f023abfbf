use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub url: String,
    pub filename: String,
}

/// One inbound message, normalized across platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Outbound side of a chat platform. Adapters deliver inbound messages by
/// pushing `IncomingMessage` values into the queue handed to them at
/// construction; the dispatch pipeline consumes that queue one message at
/// a time.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn platform(&self) -> &str;

    async fn connect(&self) -> Result<()>;

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<()>;
}

/// Adapter that only logs outbound messages. Used when the gateway runs
/// without a platform connection wired in.
pub struct LoggingAdapter {
    platform: String,
}

impl LoggingAdapter {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for LoggingAdapter {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<()> {
        tracing::info!(
            platform = %self.platform,
            channel_id = %channel_id,
            "outbound: {content}"
        );
        Ok(())
    }
}
