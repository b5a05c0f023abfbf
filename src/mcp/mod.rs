use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Named, schema-described operations invocable by name with a JSON
/// argument map. The dispatch pipeline talks to this seam only.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn exec(&self, tool_name: &str, args: Value) -> Result<Value>;
}

/// Maps the platform-level command names used by the dispatch pipeline to
/// registry tool names.
pub fn platform_tool_name(command: &str) -> Option<&'static str> {
    match command {
        "get_system_info" => Some("system.status"),
        "execute_shell_command" => Some("system.exec"),
        "deploy_app" => Some("infra.deploy"),
        "scale_deployment" => Some("infra.scale"),
        "cluster_info" => Some("infra.cluster"),
        _ => None,
    }
}

/// Shell commands the local registry will run without escalation.
const SAFE_COMMANDS: &[&str] = &[
    "ls", "pwd", "whoami", "date", "uptime", "ps aux", "df -h", "free -h", "top -bn1",
];

/// In-process registry covering the host-level tools. Infra tools
/// (`infra.*`) live in an external registry and are not implemented here.
pub struct LocalToolRegistry;

#[async_trait]
impl ToolRegistry for LocalToolRegistry {
    async fn exec(&self, tool_name: &str, args: Value) -> Result<Value> {
        match tool_name {
            "system.status" => system_status(&args),
            "system.exec" => system_exec(&args),
            other => Err(anyhow!("unknown tool: {other}")),
        }
    }
}

fn system_status(args: &Value) -> Result<Value> {
    let info_type = args
        .get("info_type")
        .and_then(|v| v.as_str())
        .unwrap_or("all");

    let report = match info_type {
        "cpu" => "CPU: arquitetura Linux, sistema ativo",
        "memory" => "Memória: RAM ativa, swap disponível",
        "disk" => "Disco: sistema de arquivos ativo, espaço disponível",
        "all" => "Sistema: CPU ativa, RAM disponível, disco OK",
        other => return Err(anyhow!("invalid info type: {other}")),
    };

    Ok(serde_json::json!({ "info_type": info_type, "report": report }))
}

/// Allow-list execution. Real command output is intentionally not wired
/// in; the result is a simulated transcript, as the hosted deployment
/// runs the real executor out of process.
fn system_exec(args: &Value) -> Result<Value> {
    let command = args
        .get("command")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("missing command argument"))?;

    let allowed = SAFE_COMMANDS
        .iter()
        .any(|safe| command == *safe || command.starts_with(&format!("{safe} ")));
    if !allowed {
        return Err(anyhow!("command not allowed: {command}"));
    }

    Ok(serde_json::json!({
        "command": command,
        "output": format!("$ {command}\n[saída simulada]"),
    }))
}
