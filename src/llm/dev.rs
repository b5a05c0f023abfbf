use super::{AnalysisRequest, AnalysisResponse, MessageAnalyzer};
use anyhow::Result;
use async_trait::async_trait;

/// Deterministic analyzer used when no API key is configured. Responses
/// depend only on the message content and triage category, which keeps
/// local runs and tests reproducible.
pub struct DevAnalyzer;

const CASUAL_RESPONSES: &[&str] = &[
    "Oi! Legal falar com você! Como posso ajudar?",
    "Olá! Tudo bem? Estou aqui se precisar de alguma coisa!",
    "Oi! Sou o assistente do canal. Em que posso ser útil?",
    "Hey! Obrigado por conversar comigo! Posso ajudar com algo?",
    "Entendi! Estou aqui para ajudar sempre que precisar!",
];

#[async_trait]
impl MessageAnalyzer for DevAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse> {
        let content = request.content.to_lowercase();
        let category = request
            .context
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("general")
            .to_string();

        let mut response = AnalysisResponse {
            should_respond: true,
            suggested_response: format!("Entendi sua mensagem: \"{}\"", request.content),
            confidence: 0.85,
            should_create_task: ["task", "tarefa", "criar", "lembrar"]
                .iter()
                .any(|w| content.contains(w)),
            task_title: extract_task_title(&request.content),
            task_description: request.content.clone(),
            task_priority: "medium".to_string(),
            task_tags: vec!["dev".to_string(), request.platform.clone()],
            sentiment: "neutral".to_string(),
            category: category.clone(),
        };

        match category.as_str() {
            "question" => {
                response.suggested_response = format!(
                    "Sua pergunta: {}\n\nBaseado no contexto, posso fornecer informações \
                     relevantes. Precisa de mais detalhes sobre algum aspecto específico?",
                    request.content
                );
            }
            "task_request" => {
                response.should_create_task = true;
            }
            "analysis" => {
                response.suggested_response = format!(
                    "Análise do texto ({} caracteres): sentimento neutro, complexidade média.",
                    request.content.chars().count()
                );
            }
            "casual" => {
                response.suggested_response = CASUAL_RESPONSES
                    [request.content.chars().count() % CASUAL_RESPONSES.len()]
                .to_string();
            }
            _ => {}
        }

        Ok(response)
    }
}

fn extract_task_title(content: &str) -> String {
    let mut title = content.trim();
    for prefix in ["criar ", "preciso ", "quero ", "adicionar ", "task ", "tarefa "] {
        title = title.strip_prefix(prefix).unwrap_or(title);
    }

    let title: String = title.chars().take(50).collect();
    if title.is_empty() {
        "Nova tarefa".to_string()
    } else {
        title
    }
}
