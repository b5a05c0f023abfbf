use crate::core::approval::ApprovalSettings;
use crate::core::dispatch::DispatchSettings;
use crate::core::system::AuthPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be non-zero");
        }
        if self.llm.base_url.is_empty() {
            anyhow::bail!("llm.base_url must not be empty");
        }
        if self.llm.model.is_empty() {
            anyhow::bail!("llm.model must not be empty");
        }
        if self.approval.timeout_secs == 0 {
            anyhow::bail!("approval.timeout_secs must be non-zero");
        }
        if self.dispatch.tool_timeout_secs == 0 {
            anyhow::bail!("dispatch.tool_timeout_secs must be non-zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Absent key selects the deterministic dev analyzer.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_approval_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_approval_retention")]
    pub retention_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_approval_timeout(),
            retention_secs: default_approval_retention(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl ApprovalConfig {
    pub fn settings(&self) -> ApprovalSettings {
        ApprovalSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            retention: Duration::from_secs(self.retention_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default)]
    pub admin_users: Vec<String>,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            dev_mode: false,
            admin_users: Vec::new(),
            tool_timeout_secs: default_tool_timeout(),
        }
    }
}

impl DispatchConfig {
    pub fn settings(&self) -> DispatchSettings {
        DispatchSettings {
            platform: self.platform.clone(),
            auth: AuthPolicy {
                dev_mode: self.dev_mode,
                admin_users: self.admin_users.clone(),
            },
            tool_timeout: Duration::from_secs(self.tool_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_approval_timeout() -> u64 {
    300
}

fn default_approval_retention() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_platform() -> String {
    "discord".to_string()
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_yields_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.approval.timeout_secs, 300);
        assert!(config.llm.api_key.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.approval.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dispatch_settings_conversion() {
        let config = DispatchConfig {
            platform: "slack".to_string(),
            dev_mode: false,
            admin_users: vec!["u1".to_string()],
            tool_timeout_secs: 5,
        };
        let settings = config.settings();
        assert_eq!(settings.platform, "slack");
        assert!(settings.auth.is_authorized("u1"));
        assert!(!settings.auth.is_authorized("u2"));
        assert_eq!(settings.tool_timeout, Duration::from_secs(5));
    }
}
