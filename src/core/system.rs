//! Second-level classification of `system_command` messages, plus the
//! authorization and risk checks that gate them.

/// What a system-command message is asking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemAction {
    SystemInfo { info_type: InfoType },
    ShellCommand { command: String },
    Deploy { app: String, version: String, image: String },
    Scale { app: String, replicas: u32 },
    ClusterInfo,
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoType {
    Cpu,
    Memory,
    Disk,
    All,
}

impl InfoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoType::Cpu => "cpu",
            InfoType::Memory => "memory",
            InfoType::Disk => "disk",
            InfoType::All => "all",
        }
    }
}

/// Shell-command fragments that require human approval before execution.
const RISKY_COMMANDS: &[&str] = &[
    "rm", "del", "format", "mkfs", "dd", "shutdown", "reboot", "passwd", "userdel", "chmod 777",
];

/// Who may run system commands: everyone in dev mode, otherwise only the
/// admin allow-list.
#[derive(Debug, Clone, Default)]
pub struct AuthPolicy {
    pub dev_mode: bool,
    pub admin_users: Vec<String>,
}

impl AuthPolicy {
    pub fn is_authorized(&self, user_id: &str) -> bool {
        if self.dev_mode {
            tracing::debug!(user_id = %user_id, "dev mode, authorization bypassed");
            return true;
        }
        let authorized = self.admin_users.iter().any(|u| u == user_id);
        if !authorized {
            tracing::warn!(user_id = %user_id, "unauthorized system command attempt");
        }
        authorized
    }
}

/// Pick the target action out of a message already triaged as a system
/// command. Infra requests are matched before plain host commands.
pub fn parse_system_command(content: &str) -> SystemAction {
    let lower = content.to_lowercase();

    if lower.contains("deploy") && lower.contains("app") {
        return parse_deploy(content);
    }
    if lower.contains("scale") && (lower.contains("deployment") || lower.contains("pod")) {
        return parse_scale(content);
    }
    if lower.contains("cluster info") || lower.contains("info do cluster") {
        return SystemAction::ClusterInfo;
    }

    if lower.contains("info do sistema")
        || lower.contains("system info")
        || lower.contains("status do sistema")
    {
        let info_type = if lower.contains("cpu") {
            InfoType::Cpu
        } else if lower.contains("memória") || lower.contains("memory") {
            InfoType::Memory
        } else if lower.contains("disco") || lower.contains("disk") {
            InfoType::Disk
        } else {
            InfoType::All
        };
        return SystemAction::SystemInfo { info_type };
    }

    if let Some(command) = extract_shell_command(content) {
        return SystemAction::ShellCommand { command };
    }

    SystemAction::Unrecognized
}

/// Pull the shell command out of phrasings like "executar ls -la". The
/// command keeps its original casing.
pub fn extract_shell_command(content: &str) -> Option<String> {
    let patterns = ["executar ", "execute ", "rodar ", "run "];

    for pattern in patterns {
        if let Some(start) = find_keyword_end(content, pattern) {
            let command = content[start..].trim();
            if !command.is_empty() {
                return Some(command.to_string());
            }
        }
    }

    None
}

/// Case-insensitive keyword search done on the original string, so the
/// returned byte offset is always a valid boundary to slice with. Searching
/// a lowercased copy instead would misalign offsets whenever case folding
/// changes byte lengths ("İ" lowers to two codepoints).
fn find_keyword_end(content: &str, keyword: &str) -> Option<usize> {
    content.char_indices().find_map(|(i, _)| {
        let rest = &content[i..];
        if rest.len() >= keyword.len()
            && rest.is_char_boundary(keyword.len())
            && rest[..keyword.len()].eq_ignore_ascii_case(keyword)
        {
            Some(i + keyword.len())
        } else {
            None
        }
    })
}

/// Denylist check; matches anywhere in the command string.
pub fn is_risky_command(command: &str) -> bool {
    let lower = command.to_lowercase();
    RISKY_COMMANDS.iter().any(|risky| lower.contains(risky))
}

fn parse_deploy(content: &str) -> SystemAction {
    let parts: Vec<&str> = content.split_whitespace().collect();
    let mut app = String::new();
    let mut version = String::new();
    let mut image = String::new();

    for (i, part) in parts.iter().enumerate() {
        let lower = part.to_lowercase();
        if lower.contains("deploy") && i + 1 < parts.len() {
            app = parts[i + 1].to_string();
        }
        if (lower.contains("versão") || lower.contains("version")) && i + 1 < parts.len() {
            version = parts[i + 1].to_string();
        }
        if part.contains(':') && part.contains('/') {
            image = part.to_string();
        }
    }

    if app.is_empty() {
        return SystemAction::Unrecognized;
    }
    if version.is_empty() {
        version = "latest".to_string();
    }
    if image.is_empty() {
        image = format!("{app}:{version}");
    }

    SystemAction::Deploy {
        app,
        version,
        image,
    }
}

fn parse_scale(content: &str) -> SystemAction {
    let parts: Vec<&str> = content.split_whitespace().collect();
    let mut app = String::new();
    let mut replicas: u32 = 1;

    for (i, part) in parts.iter().enumerate() {
        let lower = part.to_lowercase();
        if lower.contains("scale") && i + 1 < parts.len() {
            app = parts[i + 1].to_string();
        }
        if lower.contains("replica") && i + 1 < parts.len() {
            if let Ok(n) = parts[i + 1].parse() {
                replicas = n;
            }
        }
        if let Ok(n) = part.parse::<u32>() {
            if n > 0 && n < 100 {
                replicas = n;
            }
        }
    }

    if app.is_empty() {
        return SystemAction::Unrecognized;
    }

    SystemAction::Scale { app, replicas }
}
