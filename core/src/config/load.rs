use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;

/// The taleforge data directory: `$TALEFORGE_HOME`, else `~/.taleforge`.
pub fn get_taleforge_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(v) = std::env::var("TALEFORGE_HOME") {
        if !v.trim().is_empty() {
            return Ok(PathBuf::from(v));
        }
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".taleforge"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str::<AppConfig>(&s)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: <data dir>/config.toml
    let data_dir = get_taleforge_data_dir()?;
    let home_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg = if home_config.exists() {
        load_from_path(&home_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };
    resolve(&mut cfg, &data_dir);
    Ok(cfg)
}

/// Loads an explicitly named config file, then fills the same derived
/// defaults and environment overrides as [`load_default`].
pub fn load_explicit(path: &Path) -> anyhow::Result<AppConfig> {
    let mut cfg = load_from_path(path)?;
    resolve(&mut cfg, &get_taleforge_data_dir()?);
    Ok(cfg)
}

fn resolve(cfg: &mut AppConfig, data_dir: &Path) {
    if cfg
        .store
        .directory
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        cfg.store.directory = Some(data_dir.join("tasks").to_string_lossy().to_string());
    }

    if cfg
        .logging
        .directory
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    apply_env_overrides(cfg);
}

// Environment variables win over every file.
fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Some(v) = env_non_empty("TALEFORGE_STORE_DIR") {
        cfg.store.directory = Some(v);
    }
    if let Some(v) = env_non_empty("TALEFORGE_LLM_BASE_URL") {
        cfg.generation.base_url = v;
    }
    if let Some(v) = env_non_empty("TALEFORGE_LLM_API_KEY") {
        cfg.generation.api_key = v;
    }
    if let Some(v) = env_non_empty("TALEFORGE_LLM_MODEL") {
        cfg.generation.model = v;
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_from_path_reads_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[runner]\nterminal_persist_attempts = 9\n[http_server]\nport = 9191\n",
        )
        .unwrap();

        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.runner.terminal_persist_attempts, 9);
        assert_eq!(cfg.http_server.port, 9191);
    }

    #[test]
    fn resolve_keeps_explicit_directories() {
        let mut cfg: AppConfig = toml::from_str("[store]\ndirectory = \"/srv/tasks\"\n").unwrap();
        resolve(&mut cfg, Path::new("/data/taleforge"));
        let expected_logs = Path::new("/data/taleforge").join("logs");
        assert_eq!(
            cfg.logging.directory,
            Some(expected_logs.to_string_lossy().to_string())
        );
        if std::env::var("TALEFORGE_STORE_DIR").is_err() {
            assert_eq!(cfg.store.directory.as_deref(), Some("/srv/tasks"));
        }
    }

    #[test]
    fn load_from_path_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[runner\n").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }
}
