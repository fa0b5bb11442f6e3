use crate::config::Config;
use crate::utils::{ensure_dir, get_zapdesk_home};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_zapdesk_home()?.join("config.json"))
}

pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?;
        return Ok(config);
    }

    Ok(Config::default())
}

pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<()> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    ensure_dir(path.parent().context("Config path has no parent")?)?;

    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    // Restrict permissions (best-effort, may fail on Windows)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.json");
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");

        let mut config = Config::default();
        config.twilio.account_sid = "AC42".into();
        config.chatwoot.inbox_id = 9;
        save_config(&config, Some(&path)).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.twilio.account_sid, "AC42");
        assert_eq!(loaded.chatwoot.inbox_id, 9);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
