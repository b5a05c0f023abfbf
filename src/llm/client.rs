use super::{AnalysisRequest, AnalysisResponse, MessageAnalyzer};
use crate::config::LlmConfig;
use anyhow::{Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client as OpenAIClient,
};
use async_trait::async_trait;

const SYSTEM_PROMPT: &str = r#"You are a triage assistant for a chat automation backend.
Analyze the user message and answer ONLY with a JSON object of this shape:
{
  "should_respond": boolean,
  "suggested_response": "string",
  "confidence": number,
  "should_create_task": boolean,
  "task_title": "string",
  "task_description": "string",
  "task_priority": "low|medium|high|urgent",
  "task_tags": ["tag"],
  "sentiment": "positive|negative|neutral",
  "category": "question|request|complaint|information|other"
}"#;

/// Analyzer backed by any OpenAI-compatible chat-completion endpoint.
#[derive(Clone)]
pub struct OpenAiAnalyzer {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
}

impl OpenAiAnalyzer {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let mut openai_config = OpenAIConfig::new().with_api_base(&config.base_url);
        if let Some(api_key) = &config.api_key {
            openai_config = openai_config.with_api_key(api_key);
        }

        Ok(Self {
            client: OpenAIClient::with_config(openai_config),
            model: config.model.clone(),
        })
    }

    fn build_prompt(request: &AnalysisRequest) -> String {
        format!(
            "Platform: {}\nUser: {}\nContext: {}\nMessage: \"{}\"",
            request.platform, request.user_id, request.context, request.content
        )
    }
}

#[async_trait]
impl MessageAnalyzer for OpenAiAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(Self::build_prompt(&request))
                .build()?
                .into(),
        ];

        let req = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.2)
            .build()
            .context("Failed to build chat completion request")?;

        let response = self
            .client
            .chat()
            .create(req)
            .await
            .context("Failed to get chat completion")?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .context("No content in chat completion response")?;

        parse_analysis(&content)
    }
}

/// Lenient parse of the model's answer: strips markdown fences and grabs
/// the outermost JSON object before deserializing.
fn parse_analysis(content: &str) -> Result<AnalysisResponse> {
    let trimmed = content.trim();
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');

    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => anyhow::bail!("no JSON object in analyzer response"),
    };

    serde_json::from_str(json).context("Failed to parse analyzer response")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let response = parse_analysis(
            r#"{"should_respond": true, "suggested_response": "oi", "confidence": 0.9, "category": "question"}"#,
        )
        .unwrap();
        assert!(response.should_respond);
        assert_eq!(response.suggested_response, "oi");
        assert_eq!(response.category, "question");
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "```json\n{\"should_respond\": false, \"should_create_task\": true, \"task_title\": \"revisar\"}\n```";
        let response = parse_analysis(content).unwrap();
        assert!(!response.should_respond);
        assert!(response.should_create_task);
        assert_eq!(response.task_title, "revisar");
    }

    #[test]
    fn test_parse_missing_fields_use_defaults() {
        let response = parse_analysis(r#"{"should_respond": true}"#).unwrap();
        assert!(response.task_tags.is_empty());
        assert_eq!(response.confidence, 0.0);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_analysis("sorry, I cannot help").is_err());
    }
}
