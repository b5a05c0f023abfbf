use super::schema::Config;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load configuration from an explicit path, or from the default location
/// (`~/.config/opshub/config.yaml`) when none is given. A missing default
/// file is not an error; defaults apply.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                tracing::debug!("no config file, using defaults");
                return Ok(Config::default());
            }
        },
    };

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let expanded = expand_env_vars(&raw);

    let config: Config = serde_yaml::from_str(&expanded)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config.validate()?;

    tracing::info!(path = %path.display(), "configuration loaded");
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("opshub").join("config.yaml"))
}

/// Substitute `${VAR}` references with the environment. Unset variables
/// are left verbatim so validation points at the real problem.
fn expand_env_vars(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => result.push_str(&value),
                    Err(_) => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str("${");
                rest = after;
            }
        }
    }

    result.push_str(rest);
    result
}
