pub mod merge;
pub mod schema;
pub mod servers;

pub use schema::*;

use crate::cli::ChatArgs;
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "sphere.toml";

/// Load configuration by merging global, workspace, and CLI sources.
/// Precedence: CLI > workspace settings (or `--settings`) > global settings > defaults.
///
/// Missing settings files are handled gracefully (defaults apply); a file
/// that exists but does not parse is an error.
pub fn load_config(args: &ChatArgs) -> Result<AppConfig, ConfigError> {
    let global = match global_config_path() {
        Some(path) => load_toml_file(&path)?.unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    };

    let workspace_path = args
        .settings
        .clone()
        .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE));
    let workspace = match load_toml_file(&workspace_path)? {
        Some(partial) => partial,
        None if args.settings.is_some() => {
            tracing::warn!("Settings file {} not found, using defaults", workspace_path.display());
            PartialConfig::default()
        }
        None => PartialConfig::default(),
    };

    Ok(cli_to_partial(args)
        .with_fallback(workspace)
        .with_fallback(global)
        .finalize())
}

/// Load and parse a TOML settings file into a PartialConfig.
/// Returns `Ok(None)` when the file does not exist.
pub fn load_toml_file(path: &Path) -> Result<Option<PartialConfig>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let config_file =
                toml::from_str::<ConfigFile>(&contents).map_err(|e| ConfigError::ParseError {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            tracing::info!("Loaded settings from {}", path.display());
            Ok(Some(config_file.to_partial()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            Ok(None)
        }
        Err(e) => Err(ConfigError::IoError(e)),
    }
}

/// Resolve the platform-specific global settings path.
/// Linux: ~/.config/sphere/sphere.toml
/// macOS: ~/Library/Application Support/sphere/sphere.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "sphere").map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(args: &ChatArgs) -> PartialConfig {
    PartialConfig {
        model: args.model.clone(),
        mcp_config: args.config.clone(),
        max_history_tokens: args.max_history_tokens,
        log_dir: args.log_dir.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parses_every_section() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sphere.toml");
        fs::write(
            &path,
            r#"
[general]
model = "claude-sonnet-4-5"
mcp_config = "servers.json"

[history]
max_tokens = 12000
max_messages = 20

[agent]
max_supervisor_steps = 3
max_tool_rounds = 5

[mcp]
request_timeout_secs = 10
screenshots_dir = "shots"

[logging]
log_dir = "logs"
"#,
        )
        .unwrap();

        let config = load_toml_file(&path).unwrap().unwrap().finalize();
        assert_eq!(config.model, "claude-sonnet-4-5");
        assert_eq!(config.mcp_config, PathBuf::from("servers.json"));
        assert_eq!(config.max_history_tokens, 12000);
        assert_eq!(config.max_history_messages, 20);
        assert_eq!(config.supervisor_limits().max_steps, 3);
        assert_eq!(config.supervisor_limits().max_tool_rounds, 5);
        assert_eq!(config.mcp_settings().request_timeout.as_secs(), 10);
        assert_eq!(config.mcp_settings().screenshots_dir, PathBuf::from("shots"));
        assert_eq!(config.log_dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn missing_file_is_none_and_bad_file_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(load_toml_file(&tmp.path().join("absent.toml")).unwrap().is_none());

        let bad = tmp.path().join("bad.toml");
        fs::write(&bad, "[general\nmodel = ").unwrap();
        match load_toml_file(&bad) {
            Err(ConfigError::ParseError { path, .. }) => assert_eq!(path, bad),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn cli_overrides_settings_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        fs::write(&path, "[general]\nmodel = \"gpt-4o\"\n[history]\nmax_tokens = 999\n").unwrap();

        let args = ChatArgs {
            settings: Some(path),
            max_history_tokens: Some(500),
            ..Default::default()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.max_history_tokens, 500);
        assert_eq!(config.model, "gpt-4o");
    }
}
