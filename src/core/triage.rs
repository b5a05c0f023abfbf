//! Rule-ordered message triage. Classification is a pure function of the
//! case-folded message content; first match wins.

/// Handling category assigned by triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Command,
    Question,
    TaskRequest,
    Analysis,
    SystemCommand,
    Casual,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Command => "command",
            Category::Question => "question",
            Category::TaskRequest => "task_request",
            Category::Analysis => "analysis",
            Category::SystemCommand => "system_command",
            Category::Casual => "casual",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const QUESTION_WORDS: &[&str] = &[
    "como", "quando", "onde", "por que", "porque", "quem", "qual", "quanto", "que", "?",
];

const TASK_WORDS: &[&str] = &[
    "criar",
    "fazer",
    "tarefa",
    "task",
    "lembrar",
    "agendar",
    "adicionar",
    "incluir",
    "preciso",
    "quero",
];

const ANALYSIS_WORDS: &[&str] = &[
    "analis", "avali", "review", "opini", "pens", "acha", "considera",
];

const SYSTEM_WORDS: &[&str] = &[
    "status do sistema",
    "info do sistema",
    "system info",
    "cpu",
    "memória",
    "memory",
    "disco",
    "disk",
    "executar",
    "execute",
    "rodar",
    "run",
    "comando",
    "command",
    "shell",
    "backup",
    "restart",
    "reiniciar",
    "parar",
    "stop",
    "deploy",
    "build",
    "compilar",
    "atualizar",
    "update",
];

const BOT_MENTIONS: &[&str] = &["bot", "ia", "ai", "copilot", "assistant", "ajuda", "help"];

const CASUAL_INDICATORS: &[&str] = &[
    "kkk", "rsrs", "haha", "lol", "kk", "nossa", "caramba", "eita",
];

/// Classify one inbound message. Returns `None` when the message should
/// not be processed at all. The rule order is load-bearing: a message
/// matching both a question word and a task word resolves to `Question`.
pub fn classify(content: &str) -> Option<Category> {
    let content = content.trim().to_lowercase();

    // Too short to carry intent.
    if content.chars().count() < 2 {
        return None;
    }

    // Emoji- or symbol-only messages.
    if !content.chars().any(|c| c.is_alphanumeric()) {
        return None;
    }

    if content.starts_with('!') {
        return Some(Category::Command);
    }

    if contains_any(&content, QUESTION_WORDS) {
        return Some(Category::Question);
    }

    if contains_any(&content, TASK_WORDS) {
        return Some(Category::TaskRequest);
    }

    if contains_any(&content, ANALYSIS_WORDS) {
        return Some(Category::Analysis);
    }

    if contains_any(&content, SYSTEM_WORDS) {
        return Some(Category::SystemCommand);
    }

    if contains_any(&content, BOT_MENTIONS) {
        return Some(Category::Casual);
    }

    // Long substantive text defaults to requiring a response.
    if content.chars().count() > 20 {
        if contains_any(&content, CASUAL_INDICATORS) {
            return Some(Category::Casual);
        }
        return Some(Category::Question);
    }

    None
}

fn contains_any(content: &str, words: &[&str]) -> bool {
    words.iter().any(|w| content.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_prefix() {
        assert_eq!(classify("!ping"), Some(Category::Command));
        assert_eq!(classify("!help"), Some(Category::Command));
    }

    #[test]
    fn test_question_keyword() {
        assert_eq!(classify("como faço deploy?"), Some(Category::Question));
        assert_eq!(classify("onde fica o arquivo"), Some(Category::Question));
    }

    #[test]
    fn test_task_keyword() {
        assert_eq!(
            classify("preciso criar uma tarefa de revisão"),
            Some(Category::TaskRequest)
        );
    }

    #[test]
    fn test_analysis_keyword() {
        assert_eq!(classify("analisa esse texto"), Some(Category::Analysis));
    }

    #[test]
    fn test_system_command_keyword() {
        assert_eq!(classify("executar ls -la"), Some(Category::SystemCommand));
        assert_eq!(
            classify("status do sistema"),
            Some(Category::SystemCommand)
        );
    }

    #[test]
    fn test_bot_mention_is_casual() {
        assert_eq!(classify("oi bot"), Some(Category::Casual));
    }

    #[test]
    fn test_short_message_not_processed() {
        assert_eq!(classify("a"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_unmatched_short_message_not_processed() {
        // Length >= 2 but matches no rule.
        assert_eq!(classify("oi"), None);
    }

    #[test]
    fn test_emoji_only_not_processed() {
        assert_eq!(classify("😀😀😀"), None);
        assert_eq!(classify("!!!"), None);
    }

    #[test]
    fn test_question_wins_over_task() {
        // Contains "como" (question) and "criar" (task); question is checked
        // first, so it wins.
        assert_eq!(
            classify("como criar um backup"),
            Some(Category::Question)
        );
    }

    #[test]
    fn test_question_wins_over_system() {
        // "deploy" is a system keyword but the question rule runs earlier.
        assert_eq!(classify("como faço deploy?"), Some(Category::Question));
    }

    #[test]
    fn test_long_casual_text() {
        assert_eq!(
            classify("kkk esse negocio ficou engracado demais"),
            Some(Category::Casual)
        );
    }

    #[test]
    fn test_long_substantive_text_defaults_to_question() {
        assert_eq!(
            classify("o sistema ficou lento depois da madrugada de ontem"),
            Some(Category::Question)
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let samples = [
            "!ping",
            "como faço deploy?",
            "preciso criar uma tarefa de revisão",
            "oi",
            "a",
            "executar ls -la",
            "kkk esse negocio ficou engracado demais",
        ];
        for s in samples {
            assert_eq!(classify(s), classify(s), "unstable result for {s:?}");
        }
    }

    #[test]
    fn test_case_folding() {
        assert_eq!(classify("EXECUTAR LS"), Some(Category::SystemCommand));
        assert_eq!(classify("  Como assim?  "), Some(Category::Question));
    }
}
