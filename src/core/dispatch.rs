use crate::channels::{ChannelAdapter, IncomingMessage};
use crate::core::approval::{ApprovalError, ApprovalManager};
use crate::core::hub::{Event, EventHub, MessageProcessingJob, Priority};
use crate::core::system::{
    is_risky_command, parse_system_command, AuthPolicy, SystemAction,
};
use crate::core::triage::{classify, Category};
use crate::llm::{AnalysisRequest, AnalysisResponse, MessageAnalyzer};
use crate::mcp::{platform_tool_name, ToolRegistry};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

const HELP_TEXT: &str = "Comandos disponíveis:\n\
    !ping - testa se o bot está respondendo\n\
    !help - mostra esta mensagem\n\
    !analyze <texto> - análise rápida de um texto\n\
    !task <título> - registra uma tarefa\n\
    O bot também processa mensagens automaticamente.";

const SYSTEM_HELP_TEXT: &str = "Comando de sistema não reconhecido. Exemplos:\n\
    `info do sistema` - informações do sistema\n\
    `executar <comando>` - executa um comando shell\n\
    `deploy <app>` - publica uma aplicação\n\
    `scale <app> deployment <n>` - ajusta réplicas";

const REFUSAL_TEXT: &str =
    "Acesso negado: apenas administradores podem executar comandos de sistema.";

const TOOL_UNAVAILABLE_TEXT: &str =
    "Não consegui executar o comando agora. Tente novamente mais tarde.";

const CASUAL_FALLBACKS: &[&str] = &[
    "Entendi! Obrigado por compartilhar!",
    "Interessante! Estou aqui se precisar de algo!",
    "Legal! Como posso ajudar?",
    "Oi! Tudo bem? Se precisar de algo, é só falar!",
    "Entendido! Estou monitorando por aqui!",
];

/// How a message's lifecycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Replied,
    Suppressed,
}

/// Knobs for the dispatch pipeline.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub platform: String,
    pub auth: AuthPolicy,
    pub tool_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            platform: "discord".to_string(),
            auth: AuthPolicy::default(),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

/// Consumes inbound messages one at a time, classifies each into exactly
/// one category, and routes it to the matching handler. Handlers may call
/// the analyzer, escalate through the approval manager, or invoke MCP
/// tools; whatever happens, the end user gets either a reply, a refusal,
/// or deliberate silence, never a raw backend error.
#[derive(Clone)]
pub struct Dispatcher {
    analyzer: Arc<dyn MessageAnalyzer>,
    adapter: Arc<dyn ChannelAdapter>,
    tools: Arc<dyn ToolRegistry>,
    approvals: ApprovalManager,
    hub: EventHub,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        analyzer: Arc<dyn MessageAnalyzer>,
        adapter: Arc<dyn ChannelAdapter>,
        tools: Arc<dyn ToolRegistry>,
        approvals: ApprovalManager,
        hub: EventHub,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            analyzer,
            adapter,
            tools,
            approvals,
            hub,
            settings,
        }
    }

    /// Drain the inbound queue until it closes or the token is cancelled.
    /// The queue is behind a mutex so a supervisor can restart this loop
    /// without losing buffered messages.
    pub async fn run(
        &self,
        inbox: Arc<Mutex<mpsc::Receiver<IncomingMessage>>>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut inbox = inbox.lock().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = inbox.recv() => match msg {
                    Some(msg) => {
                        if let Err(e) = self.handle_message(&cancel, &msg).await {
                            tracing::error!(
                                message_id = %msg.id,
                                error = %e,
                                "message dispatch failed"
                            );
                            return Err(e);
                        }
                    }
                    None => return Ok(()),
                }
            }
        }
    }

    /// Process one inbound message end to end.
    pub async fn handle_message(
        &self,
        cancel: &CancellationToken,
        msg: &IncomingMessage,
    ) -> Result<Disposition> {
        let job = MessageProcessingJob::new(
            format!(
                "{}_{}_{}",
                self.settings.platform,
                msg.channel_id,
                msg.timestamp.timestamp()
            ),
            self.settings.platform.clone(),
            serde_json::to_value(msg).unwrap_or_default(),
            Priority::Normal,
        );
        self.hub.process_message(job).await;

        // Bang commands are short-circuited before triage. Trimmed like
        // the classifier, so " !ping" is still a command.
        if msg.content.trim().starts_with('!') {
            return self.handle_command(msg).await;
        }

        let Some(category) = classify(&msg.content) else {
            tracing::debug!(message_id = %msg.id, "message suppressed by triage");
            return Ok(Disposition::Suppressed);
        };

        tracing::debug!(message_id = %msg.id, category = %category, "message classified");

        match category {
            // Only reachable for bang prefixes, which were handled above.
            Category::Command => Ok(Disposition::Suppressed),
            Category::Question | Category::Analysis | Category::Casual => {
                self.respond_with_analysis(cancel, msg, category).await
            }
            Category::TaskRequest => self.handle_task_request(cancel, msg).await,
            Category::SystemCommand => self.handle_system_command(cancel, msg).await,
        }
    }

    async fn handle_command(&self, msg: &IncomingMessage) -> Result<Disposition> {
        let content = msg.content.trim();

        if content.starts_with("!ping") {
            self.reply(msg, "Pong! O bot está funcionando.").await?;
            return Ok(Disposition::Replied);
        }

        if content.starts_with("!help") {
            self.reply(msg, HELP_TEXT).await?;
            return Ok(Disposition::Replied);
        }

        if let Some(text) = content.strip_prefix("!analyze ") {
            let reply = format!(
                "Análise da mensagem: \"{}\"\nSentimento: neutro, confiança 85%.",
                text.trim()
            );
            self.reply(msg, &reply).await?;
            return Ok(Disposition::Replied);
        }

        if let Some(title) = content.strip_prefix("!task ") {
            let reply = format!(
                "Nova tarefa criada: {} (criada por {})",
                title.trim(),
                msg.username
            );
            self.reply(msg, &reply).await?;
            return Ok(Disposition::Replied);
        }

        tracing::debug!(message_id = %msg.id, "unknown command ignored");
        Ok(Disposition::Suppressed)
    }

    /// Shared handler for the categories that answer from the analyzer and
    /// fall back to a canned reply when it fails.
    async fn respond_with_analysis(
        &self,
        cancel: &CancellationToken,
        msg: &IncomingMessage,
        category: Category,
    ) -> Result<Disposition> {
        let analysis = match self.analyze(cancel, msg, category).await {
            AnalyzeOutcome::Cancelled => return Ok(Disposition::Suppressed),
            AnalyzeOutcome::Failed => {
                self.reply(msg, &self.fallback_reply(category, msg)).await?;
                return Ok(Disposition::Replied);
            }
            AnalyzeOutcome::Ok(analysis) => analysis,
        };

        if !analysis.should_respond {
            return Ok(Disposition::Suppressed);
        }

        let reply = match category {
            Category::Question => format!(
                "{}\n\nConfiança: {:.0}%",
                analysis.suggested_response,
                analysis.confidence * 100.0
            ),
            _ => analysis.suggested_response,
        };
        self.reply(msg, &reply).await?;
        Ok(Disposition::Replied)
    }

    async fn handle_task_request(
        &self,
        cancel: &CancellationToken,
        msg: &IncomingMessage,
    ) -> Result<Disposition> {
        let analysis = match self.analyze(cancel, msg, Category::TaskRequest).await {
            AnalyzeOutcome::Cancelled => return Ok(Disposition::Suppressed),
            AnalyzeOutcome::Failed => {
                self.reply(msg, &self.fallback_reply(Category::TaskRequest, msg))
                    .await?;
                return Ok(Disposition::Replied);
            }
            AnalyzeOutcome::Ok(analysis) => analysis,
        };

        if analysis.should_create_task {
            self.hub
                .broadcast(Event::new(
                    "task_created",
                    serde_json::json!({
                        "title": analysis.task_title,
                        "description": analysis.task_description,
                        "source": self.settings.platform,
                        "source_id": msg.id,
                        "channel_id": msg.channel_id,
                        "author_id": msg.user_id,
                        "priority": analysis.task_priority,
                        "tags": analysis.task_tags,
                    }),
                ))
                .await;

            let reply = format!(
                "Tarefa criada com sucesso!\nTítulo: {}\nDescrição: {}\nCriada por: {}",
                analysis.task_title, analysis.task_description, msg.username
            );
            self.reply(msg, &reply).await?;
            return Ok(Disposition::Replied);
        }

        if analysis.should_respond {
            self.reply(msg, &analysis.suggested_response).await?;
            return Ok(Disposition::Replied);
        }

        Ok(Disposition::Suppressed)
    }

    async fn handle_system_command(
        &self,
        cancel: &CancellationToken,
        msg: &IncomingMessage,
    ) -> Result<Disposition> {
        if !self.settings.auth.is_authorized(&msg.user_id) {
            self.reply(msg, REFUSAL_TEXT).await?;
            return Ok(Disposition::Replied);
        }

        match parse_system_command(&msg.content) {
            SystemAction::Unrecognized => {
                self.reply(msg, SYSTEM_HELP_TEXT).await?;
                Ok(Disposition::Replied)
            }
            SystemAction::SystemInfo { info_type } => {
                self.invoke_tool(
                    cancel,
                    msg,
                    "get_system_info",
                    serde_json::json!({
                        "info_type": info_type.as_str(),
                        "user_id": msg.user_id,
                    }),
                )
                .await
            }
            SystemAction::ShellCommand { command } => {
                if is_risky_command(&command) {
                    match self.escalate_shell_command(cancel, msg, &command).await? {
                        EscalationOutcome::Approved => {}
                        EscalationOutcome::Refused => return Ok(Disposition::Replied),
                        EscalationOutcome::Cancelled => return Ok(Disposition::Suppressed),
                    }
                }
                self.invoke_tool(
                    cancel,
                    msg,
                    "execute_shell_command",
                    serde_json::json!({
                        "command": command,
                        "user_id": msg.user_id,
                    }),
                )
                .await
            }
            SystemAction::Deploy {
                app,
                version,
                image,
            } => {
                self.invoke_tool(
                    cancel,
                    msg,
                    "deploy_app",
                    serde_json::json!({
                        "app_name": app,
                        "version": version,
                        "image": image,
                    }),
                )
                .await
            }
            SystemAction::Scale { app, replicas } => {
                self.invoke_tool(
                    cancel,
                    msg,
                    "scale_deployment",
                    serde_json::json!({
                        "app_name": app,
                        "replicas": replicas,
                    }),
                )
                .await
            }
            SystemAction::ClusterInfo => {
                self.invoke_tool(cancel, msg, "cluster_info", serde_json::json!({}))
                    .await
            }
        }
    }

    /// A risky shell command blocks here until a human decides, the
    /// request times out, or the caller is cancelled.
    async fn escalate_shell_command(
        &self,
        cancel: &CancellationToken,
        msg: &IncomingMessage,
        command: &str,
    ) -> Result<EscalationOutcome> {
        let mut details = HashMap::new();
        details.insert("command".to_string(), command.to_string());
        details.insert("user_id".to_string(), msg.user_id.clone());
        details.insert("channel_id".to_string(), msg.channel_id.clone());

        match self
            .approvals
            .request_approval(
                cancel,
                "execute_shell_command",
                &self.settings.platform,
                details,
            )
            .await
        {
            Ok(response) if response.approved => Ok(EscalationOutcome::Approved),
            Ok(_) => {
                self.reply(msg, "Execução recusada pelo aprovador.").await?;
                Ok(EscalationOutcome::Refused)
            }
            Err(ApprovalError::Timeout) => {
                self.reply(msg, "Pedido de aprovação expirou; comando não executado.")
                    .await?;
                Ok(EscalationOutcome::Refused)
            }
            Err(ApprovalError::Cancelled) => Ok(EscalationOutcome::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "approval escalation failed");
                self.reply(msg, "Não foi possível obter aprovação; comando não executado.")
                    .await?;
                Ok(EscalationOutcome::Refused)
            }
        }
    }

    async fn invoke_tool(
        &self,
        cancel: &CancellationToken,
        msg: &IncomingMessage,
        command: &str,
        args: serde_json::Value,
    ) -> Result<Disposition> {
        let Some(tool_name) = platform_tool_name(command) else {
            self.reply(msg, SYSTEM_HELP_TEXT).await?;
            return Ok(Disposition::Replied);
        };

        tracing::info!(tool = %tool_name, user_id = %msg.user_id, "invoking tool");

        let call = tokio::time::timeout(self.settings.tool_timeout, self.tools.exec(tool_name, args));
        let result = tokio::select! {
            _ = cancel.cancelled() => return Ok(Disposition::Suppressed),
            result = call => result,
        };

        match result {
            Ok(Ok(value)) => {
                let reply = format!(
                    "Comando executado por {}:\n{}",
                    msg.username,
                    format_tool_result(&value)
                );
                self.reply(msg, &reply).await?;
                Ok(Disposition::Replied)
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = %tool_name, error = %e, "tool execution failed");
                self.reply(msg, TOOL_UNAVAILABLE_TEXT).await?;
                Ok(Disposition::Replied)
            }
            Err(_) => {
                tracing::warn!(tool = %tool_name, "tool execution timed out");
                self.reply(msg, TOOL_UNAVAILABLE_TEXT).await?;
                Ok(Disposition::Replied)
            }
        }
    }

    async fn analyze(
        &self,
        cancel: &CancellationToken,
        msg: &IncomingMessage,
        category: Category,
    ) -> AnalyzeOutcome {
        let request = AnalysisRequest {
            platform: self.settings.platform.clone(),
            content: msg.content.clone(),
            user_id: msg.user_id.clone(),
            context: serde_json::json!({
                "channel_id": msg.channel_id,
                "guild_id": msg.guild_id,
                "type": category.as_str(),
            }),
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => return AnalyzeOutcome::Cancelled,
            result = self.analyzer.analyze(request) => result,
        };

        match result {
            Ok(analysis) => AnalyzeOutcome::Ok(analysis),
            Err(e) => {
                tracing::warn!(message_id = %msg.id, error = %e, "analyzer failed, using fallback");
                AnalyzeOutcome::Failed
            }
        }
    }

    fn fallback_reply(&self, category: Category, msg: &IncomingMessage) -> String {
        match category {
            Category::Question => format!(
                "Interessante pergunta! Vou analisar: \"{}\". \
                 Preciso de mais contexto para uma resposta completa, pode dar mais detalhes?",
                msg.content
            ),
            Category::Analysis => format!(
                "Análise rápida: \"{}\" tem {} caracteres. \
                 Para uma análise detalhada, use !analyze <texto>.",
                msg.content,
                msg.content.chars().count()
            ),
            Category::TaskRequest => format!(
                "Tarefa registrada: {} (solicitada por {})",
                msg.content, msg.username
            ),
            _ => CASUAL_FALLBACKS[msg.content.chars().count() % CASUAL_FALLBACKS.len()].to_string(),
        }
    }

    async fn reply(&self, msg: &IncomingMessage, content: &str) -> Result<()> {
        self.adapter.send_message(&msg.channel_id, content).await
    }
}

enum AnalyzeOutcome {
    Ok(AnalysisResponse),
    Failed,
    Cancelled,
}

enum EscalationOutcome {
    Approved,
    Refused,
    Cancelled,
}

fn format_tool_result(value: &serde_json::Value) -> String {
    if let Some(text) = value.get("output").and_then(|v| v.as_str()) {
        return text.to_string();
    }
    if let Some(text) = value.get("report").and_then(|v| v.as_str()) {
        return text.to_string();
    }
    if let Some(text) = value.as_str() {
        return text.to_string();
    }
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::approval::ApprovalSettings;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Utc;

    struct StubAnalyzer {
        response: Option<AnalysisResponse>,
    }

    #[async_trait]
    impl MessageAnalyzer for StubAnalyzer {
        async fn analyze(&self, _request: AnalysisRequest) -> Result<AnalysisResponse> {
            self.response
                .clone()
                .ok_or_else(|| anyhow!("analyzer unavailable"))
        }
    }

    #[derive(Clone)]
    struct RecordingAdapter {
        sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl RecordingAdapter {
        fn new() -> Self {
            Self {
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        async fn last_reply(&self) -> Option<String> {
            self.sent.lock().await.last().map(|(_, c)| c.clone())
        }
    }

    #[async_trait]
    impl ChannelAdapter for RecordingAdapter {
        fn platform(&self) -> &str {
            "test"
        }

        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn send_message(&self, channel_id: &str, content: &str) -> Result<()> {
            self.sent
                .lock()
                .await
                .push((channel_id.to_string(), content.to_string()));
            Ok(())
        }
    }

    struct StubRegistry {
        fail: bool,
    }

    #[async_trait]
    impl ToolRegistry for StubRegistry {
        async fn exec(&self, tool_name: &str, _args: serde_json::Value) -> Result<serde_json::Value> {
            if self.fail {
                return Err(anyhow!("registry offline"));
            }
            Ok(serde_json::json!({ "output": format!("ran {tool_name}") }))
        }
    }

    fn message(content: &str) -> IncomingMessage {
        IncomingMessage {
            id: "m1".to_string(),
            channel_id: "c1".to_string(),
            guild_id: None,
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            attachments: vec![],
        }
    }

    fn dispatcher(
        analyzer: StubAnalyzer,
        adapter: RecordingAdapter,
        registry: StubRegistry,
        auth: AuthPolicy,
    ) -> Dispatcher {
        let hub = EventHub::spawn();
        let approvals = ApprovalManager::new(
            hub.clone(),
            ApprovalSettings {
                timeout: Duration::from_millis(200),
                ..Default::default()
            },
        );
        Dispatcher::new(
            Arc::new(analyzer),
            Arc::new(adapter),
            Arc::new(registry),
            approvals,
            hub,
            DispatchSettings {
                platform: "test".to_string(),
                auth,
                tool_timeout: Duration::from_secs(1),
            },
        )
    }

    fn dev_auth() -> AuthPolicy {
        AuthPolicy {
            dev_mode: true,
            admin_users: vec![],
        }
    }

    fn responding_analyzer(reply: &str) -> StubAnalyzer {
        StubAnalyzer {
            response: Some(AnalysisResponse {
                should_respond: true,
                suggested_response: reply.to_string(),
                confidence: 0.9,
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_ping_short_circuits() {
        let adapter = RecordingAdapter::new();
        let d = dispatcher(
            responding_analyzer("unused"),
            adapter.clone(),
            StubRegistry { fail: false },
            dev_auth(),
        );
        let cancel = CancellationToken::new();

        let disposition = d.handle_message(&cancel, &message("!ping")).await.unwrap();
        assert_eq!(disposition, Disposition::Replied);
        assert!(adapter.last_reply().await.unwrap().contains("Pong"));
    }

    #[tokio::test]
    async fn test_ping_with_leading_whitespace() {
        let adapter = RecordingAdapter::new();
        let d = dispatcher(
            responding_analyzer("unused"),
            adapter.clone(),
            StubRegistry { fail: false },
            dev_auth(),
        );
        let cancel = CancellationToken::new();

        let disposition = d
            .handle_message(&cancel, &message("  !ping"))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Replied);
        assert!(adapter.last_reply().await.unwrap().contains("Pong"));
    }

    #[tokio::test]
    async fn test_question_replies_with_analysis() {
        let adapter = RecordingAdapter::new();
        let d = dispatcher(
            responding_analyzer("a resposta é 42"),
            adapter.clone(),
            StubRegistry { fail: false },
            dev_auth(),
        );
        let cancel = CancellationToken::new();

        let disposition = d
            .handle_message(&cancel, &message("como faço deploy?"))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Replied);
        assert!(adapter.last_reply().await.unwrap().contains("a resposta é 42"));
    }

    #[tokio::test]
    async fn test_analyzer_failure_uses_fallback() {
        let adapter = RecordingAdapter::new();
        let d = dispatcher(
            StubAnalyzer { response: None },
            adapter.clone(),
            StubRegistry { fail: false },
            dev_auth(),
        );
        let cancel = CancellationToken::new();

        let disposition = d
            .handle_message(&cancel, &message("como faço deploy?"))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Replied);
        let reply = adapter.last_reply().await.unwrap();
        assert!(reply.contains("Interessante pergunta"));
        assert!(!reply.contains("analyzer unavailable"));
    }

    #[tokio::test]
    async fn test_unmatched_message_is_suppressed() {
        let adapter = RecordingAdapter::new();
        let d = dispatcher(
            responding_analyzer("unused"),
            adapter.clone(),
            StubRegistry { fail: false },
            dev_auth(),
        );
        let cancel = CancellationToken::new();

        let disposition = d.handle_message(&cancel, &message("oi")).await.unwrap();
        assert_eq!(disposition, Disposition::Suppressed);
        assert!(adapter.last_reply().await.is_none());
    }

    #[tokio::test]
    async fn test_system_command_executes_tool() {
        let adapter = RecordingAdapter::new();
        let d = dispatcher(
            responding_analyzer("unused"),
            adapter.clone(),
            StubRegistry { fail: false },
            dev_auth(),
        );
        let cancel = CancellationToken::new();

        let disposition = d
            .handle_message(&cancel, &message("executar ls -la"))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Replied);
        let reply = adapter.last_reply().await.unwrap();
        assert!(reply.contains("ran system.exec"));
        assert!(reply.contains("alice"));
    }

    #[tokio::test]
    async fn test_unauthorized_system_command_refused() {
        let adapter = RecordingAdapter::new();
        let d = dispatcher(
            responding_analyzer("unused"),
            adapter.clone(),
            StubRegistry { fail: false },
            AuthPolicy {
                dev_mode: false,
                admin_users: vec!["someone-else".to_string()],
            },
        );
        let cancel = CancellationToken::new();

        let disposition = d
            .handle_message(&cancel, &message("executar ls -la"))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Replied);
        assert!(adapter.last_reply().await.unwrap().contains("Acesso negado"));
    }

    #[tokio::test]
    async fn test_tool_failure_is_not_surfaced_raw() {
        let adapter = RecordingAdapter::new();
        let d = dispatcher(
            responding_analyzer("unused"),
            adapter.clone(),
            StubRegistry { fail: true },
            dev_auth(),
        );
        let cancel = CancellationToken::new();

        d.handle_message(&cancel, &message("executar ls -la"))
            .await
            .unwrap();
        let reply = adapter.last_reply().await.unwrap();
        assert!(reply.contains("Não consegui executar"));
        assert!(!reply.contains("registry offline"));
    }

    #[tokio::test]
    async fn test_risky_command_times_out_without_approver() {
        let adapter = RecordingAdapter::new();
        let d = dispatcher(
            responding_analyzer("unused"),
            adapter.clone(),
            StubRegistry { fail: false },
            dev_auth(),
        );
        let cancel = CancellationToken::new();

        // Nobody approves; the 200ms approval timeout elapses.
        let disposition = d
            .handle_message(&cancel, &message("executar rm -rf /tmp/x"))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Replied);
        assert!(adapter
            .last_reply()
            .await
            .unwrap()
            .contains("aprovação expirou"));
    }

    #[tokio::test]
    async fn test_risky_command_runs_after_approval() {
        let adapter = RecordingAdapter::new();
        let hub = EventHub::spawn();
        let approvals = ApprovalManager::new(
            hub.clone(),
            ApprovalSettings {
                timeout: Duration::from_secs(5),
                ..Default::default()
            },
        );
        let d = Dispatcher::new(
            Arc::new(responding_analyzer("unused")),
            Arc::new(adapter.clone()),
            Arc::new(StubRegistry { fail: false }),
            approvals.clone(),
            hub,
            DispatchSettings {
                platform: "test".to_string(),
                auth: dev_auth(),
                tool_timeout: Duration::from_secs(1),
            },
        );
        let cancel = CancellationToken::new();

        tokio::spawn(async move {
            loop {
                let pending = approvals.pending_approvals().await;
                if let Some(req) = pending.first() {
                    approvals
                        .process_approval(&req.id, true, "admin-1")
                        .await
                        .unwrap();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let disposition = d
            .handle_message(&cancel, &message("executar rm -rf /tmp/x"))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Replied);
        assert!(adapter.last_reply().await.unwrap().contains("ran system.exec"));
    }

    #[tokio::test]
    async fn test_task_request_emits_task_created() {
        let adapter = RecordingAdapter::new();
        let hub = EventHub::spawn();
        let approvals = ApprovalManager::new(hub.clone(), ApprovalSettings::default());
        let d = Dispatcher::new(
            Arc::new(StubAnalyzer {
                response: Some(AnalysisResponse {
                    should_respond: true,
                    should_create_task: true,
                    task_title: "revisar relatório".to_string(),
                    task_description: "revisão mensal".to_string(),
                    task_priority: "medium".to_string(),
                    ..Default::default()
                }),
            }),
            Arc::new(adapter.clone()),
            Arc::new(StubRegistry { fail: false }),
            approvals,
            hub.clone(),
            DispatchSettings {
                platform: "test".to_string(),
                auth: dev_auth(),
                tool_timeout: Duration::from_secs(1),
            },
        );
        let cancel = CancellationToken::new();

        let disposition = d
            .handle_message(&cancel, &message("preciso criar uma tarefa de revisão"))
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Replied);
        assert!(adapter
            .last_reply()
            .await
            .unwrap()
            .contains("revisar relatório"));
    }
}
