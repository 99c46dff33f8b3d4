//! The agent registry: one sub-agent per enabled MCP server in
//! `mcp_config.json`.
//!
//! The registry is built once at startup and is read-only afterwards. String
//! values in `env`, `headers` and `tool_defaults` may reference environment
//! variables as `${VAR}`; an entry whose variable is unset is dropped with a
//! warning so a missing optional key never takes the whole server down.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::mcp::transport::StdioCommand;

static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern is valid")
});

/// How to reach one MCP server.
#[derive(Debug, Clone)]
pub enum ServerSpec {
    /// A child process speaking newline-delimited JSON-RPC (node, python, docker).
    Stdio(StdioCommand),
    /// A remote server reached over HTTP POST.
    Http {
        url: String,
        headers: HashMap<String, String>,
    },
}

impl ServerSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerSpec::Stdio(_) => "stdio",
            ServerSpec::Http { .. } => "http",
        }
    }
}

/// A sub-agent bound to one MCP server.
#[derive(Debug, Clone)]
pub struct SubAgentSpec {
    pub name: String,
    pub description: String,
    pub server: ServerSpec,
    /// Argument values injected into every call to this server's tools when
    /// the model leaves them out.
    pub tool_defaults: Map<String, Value>,
}

/// Immutable, ordered collection of sub-agent specs.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<SubAgentSpec>,
}

/// On-disk shape of `mcp_config.json`.
#[derive(Debug, Deserialize)]
struct McpConfigFile {
    #[serde(default)]
    mcp_servers: Vec<ServerEntry>,
}

#[derive(Debug, Deserialize)]
struct ServerEntry {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    enabled: bool,
    description: Option<String>,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: Map<String, Value>,
    cwd: Option<String>,
    url: Option<String>,
    #[serde(default)]
    headers: Map<String, Value>,
    #[serde(default)]
    tool_defaults: Map<String, Value>,
}

impl AgentRegistry {
    /// Build a registry directly from specs (tests, embedding).
    pub fn from_specs(specs: Vec<SubAgentSpec>) -> Self {
        Self { agents: specs }
    }

    /// Load `mcp_config.json` from disk, resolving `${VAR}` against the
    /// process environment. A missing file yields an empty registry.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("MCP config {} not found, no sub-agents loaded", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::IoError(e)),
        };
        let registry = Self::from_json_str(&contents, |var| std::env::var(var).ok()).map_err(
            |e| match e {
                ConfigError::ParseError { message, .. } => ConfigError::ParseError {
                    path: path.to_path_buf(),
                    message,
                },
                other => other,
            },
        )?;
        tracing::info!(
            agents = registry.len(),
            "Loaded MCP config from {}",
            path.display()
        );
        Ok(registry)
    }

    /// Parse a config document. `lookup` resolves `${VAR}` references.
    ///
    /// Disabled entries are skipped silently; invalid ones are skipped with a
    /// warning. Only a malformed document is an error.
    pub fn from_json_str(
        json: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file: McpConfigFile =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError {
                path: "mcp_config.json".into(),
                message: e.to_string(),
            })?;

        let mut agents: Vec<SubAgentSpec> = Vec::new();
        for entry in file.mcp_servers {
            if !entry.enabled {
                continue;
            }
            match build_spec(entry, &lookup) {
                Ok(spec) if agents.iter().any(|a| a.name == spec.name) => {
                    tracing::warn!(server = %spec.name, "Duplicate MCP server name, keeping the first");
                }
                Ok(spec) => agents.push(spec),
                Err(e) => tracing::warn!("Skipping MCP server: {e}"),
            }
        }
        Ok(Self { agents })
    }

    pub fn get(&self, name: &str) -> Option<&SubAgentSpec> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubAgentSpec> {
        self.agents.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

fn build_spec(
    entry: ServerEntry,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<SubAgentSpec, ConfigError> {
    let name = entry
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ConfigError::InvalidServer {
            name: "<unnamed>".into(),
            message: "missing `name`".into(),
        })?;
    let invalid = |message: String| ConfigError::InvalidServer {
        name: name.clone(),
        message,
    };

    let env = resolve_map(&name, "env", &entry.env, lookup);
    let kind = entry.kind.as_deref().unwrap_or("").to_ascii_lowercase();

    let server = match kind.as_str() {
        "node" | "python" => {
            let command = match (entry.command, kind.as_str()) {
                (Some(cmd), _) => cmd,
                (None, "python") => "python3".to_string(),
                (None, _) => return Err(invalid("`command` is required for node servers".into())),
            };
            ServerSpec::Stdio(StdioCommand {
                command,
                args: entry.args,
                env,
                cwd: entry.cwd.map(Into::into),
            })
        }
        "docker" => ServerSpec::Stdio(docker_command(&env, &entry.args)),
        "http" | "httpx" => {
            let url = entry
                .url
                .ok_or_else(|| invalid("`url` is required for http servers".into()))?;
            let url = expand_env_vars(&url, lookup)
                .map_err(|var| invalid(format!("url references unset variable {var}")))?;
            ServerSpec::Http {
                url,
                headers: resolve_map(&name, "headers", &entry.headers, lookup),
            }
        }
        "" => return Err(invalid("missing `type`".into())),
        other => return Err(invalid(format!("unknown server type `{other}`"))),
    };

    let mut tool_defaults = Map::new();
    for (key, value) in entry.tool_defaults {
        match value {
            Value::String(s) => match expand_env_vars(&s, lookup) {
                Ok(resolved) => {
                    tool_defaults.insert(key, Value::String(resolved));
                }
                Err(var) => {
                    tracing::warn!(server = %name, "tool default `{key}` dropped: {var} is not set");
                }
            },
            other => {
                tool_defaults.insert(key, other);
            }
        }
    }

    Ok(SubAgentSpec {
        description: entry
            .description
            .unwrap_or_else(|| format!("Tools provided by the {name} MCP server")),
        name,
        server,
        tool_defaults,
    })
}

/// `docker run -i --rm -e K=V ... <user args>`; env travels as `-e` flags
/// because the container does not inherit our environment.
fn docker_command(env: &HashMap<String, String>, user_args: &[String]) -> StdioCommand {
    let mut args: Vec<String> = vec!["run".into(), "-i".into(), "--rm".into()];
    let mut keys: Vec<&String> = env.keys().collect();
    keys.sort();
    for key in keys {
        args.push("-e".into());
        args.push(format!("{key}={}", env[key]));
    }
    args.extend(user_args.iter().cloned());
    StdioCommand {
        command: "docker".into(),
        args,
        env: HashMap::new(),
        cwd: None,
    }
}

/// Resolve a JSON object of string-ish values, dropping entries whose
/// `${VAR}` is unset.
fn resolve_map(
    server: &str,
    section: &str,
    raw: &Map<String, Value>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (key, value) in raw {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Null => continue,
            other => other.to_string(),
        };
        match expand_env_vars(&text, lookup) {
            Ok(resolved) => {
                out.insert(key.clone(), resolved);
            }
            Err(var) => {
                tracing::warn!(server = %server, "{section} `{key}` dropped: {var} is not set");
            }
        }
    }
    out
}

/// Replace every `${VAR}` in `value`. Returns the first unset variable name
/// as the error.
pub fn expand_env_vars(
    value: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<String, String> {
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for caps in ENV_REF.captures_iter(value) {
        let (Some(whole), Some(var)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let resolved = lookup(var.as_str()).ok_or_else(|| var.as_str().to_string())?;
        out.push_str(&value[last..whole.start()]);
        out.push_str(&resolved);
        last = whole.end();
    }
    out.push_str(&value[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn expands_embedded_references() {
        let lookup = env(&[("TOKEN", "abc"), ("USER", "octo")]);
        assert_eq!(
            expand_env_vars("Bearer ${TOKEN}", &lookup).unwrap(),
            "Bearer abc"
        );
        assert_eq!(
            expand_env_vars("${USER}/${USER}", &lookup).unwrap(),
            "octo/octo"
        );
        assert_eq!(expand_env_vars("plain", &lookup).unwrap(), "plain");
        assert_eq!(
            expand_env_vars("${MISSING}", &lookup).unwrap_err(),
            "MISSING"
        );
    }

    #[test]
    fn parses_all_server_kinds() {
        let json = r#"{ "mcp_servers": [
            { "name": "github", "type": "httpx", "enabled": true,
              "description": "GitHub issues and pull requests",
              "url": "https://api.githubcopilot.com/mcp/",
              "headers": { "Authorization": "Bearer ${GITHUB_MCP_TOKEN}" },
              "tool_defaults": { "owner": "${GITHUB_USERNAME}", "per_page": 10 } },
            { "name": "youtube", "type": "node", "enabled": true,
              "command": "npx", "args": ["-y", "youtube-data-mcp-server"],
              "env": { "YOUTUBE_API_KEY": "${YOUTUBE_API_KEY}" } },
            { "name": "notes", "type": "python", "enabled": true, "args": ["-m", "notes_server"] },
            { "name": "off", "type": "node", "enabled": false, "command": "node" }
        ] }"#;
        let lookup = env(&[
            ("GITHUB_MCP_TOKEN", "ghp_1"),
            ("GITHUB_USERNAME", "octo"),
            ("YOUTUBE_API_KEY", "yt"),
        ]);
        let registry = AgentRegistry::from_json_str(json, lookup).unwrap();
        assert_eq!(registry.names(), vec!["github", "youtube", "notes"]);

        let github = registry.get("github").unwrap();
        match &github.server {
            ServerSpec::Http { url, headers } => {
                assert_eq!(url, "https://api.githubcopilot.com/mcp/");
                assert_eq!(headers["Authorization"], "Bearer ghp_1");
            }
            other => panic!("expected http, got {other:?}"),
        }
        assert_eq!(github.tool_defaults["owner"], "octo");
        assert_eq!(github.tool_defaults["per_page"], 10);

        match &registry.get("youtube").unwrap().server {
            ServerSpec::Stdio(cmd) => {
                assert_eq!(cmd.command, "npx");
                assert_eq!(cmd.env["YOUTUBE_API_KEY"], "yt");
            }
            other => panic!("expected stdio, got {other:?}"),
        }
        match &registry.get("notes").unwrap().server {
            ServerSpec::Stdio(cmd) => assert_eq!(cmd.command, "python3"),
            other => panic!("expected stdio, got {other:?}"),
        }
        assert!(registry.get("notes").unwrap().description.contains("notes"));
    }

    #[test]
    fn docker_env_becomes_flags() {
        let json = r#"{ "mcp_servers": [
            { "name": "browser", "type": "docker", "enabled": true,
              "args": ["mcp/playwright:latest"],
              "env": { "B_KEY": "${B}", "A_KEY": "literal", "GONE": "${UNSET}" } }
        ] }"#;
        let registry = AgentRegistry::from_json_str(json, env(&[("B", "bee")])).unwrap();
        let ServerSpec::Stdio(cmd) = &registry.get("browser").unwrap().server else {
            panic!("docker should be stdio");
        };
        assert_eq!(cmd.command, "docker");
        assert_eq!(
            cmd.args,
            vec![
                "run", "-i", "--rm", "-e", "A_KEY=literal", "-e", "B_KEY=bee",
                "mcp/playwright:latest"
            ]
        );
        assert!(cmd.env.is_empty());
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let json = r#"{ "mcp_servers": [
            { "name": "weird", "type": "carrier-pigeon", "enabled": true },
            { "name": "nocmd", "type": "node", "enabled": true },
            { "type": "node", "enabled": true, "command": "node" },
            { "name": "ok", "type": "http", "enabled": true, "url": "http://localhost:1/mcp" },
            { "name": "ok", "type": "http", "enabled": true, "url": "http://localhost:2/mcp" }
        ] }"#;
        let registry = AgentRegistry::from_json_str(json, env(&[])).unwrap();
        assert_eq!(registry.names(), vec!["ok"]);
        let ServerSpec::Http { url, .. } = &registry.get("ok").unwrap().server else {
            panic!("expected http");
        };
        assert!(url.ends_with(":1/mcp"));
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = AgentRegistry::from_json_str("{ not json", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn missing_file_gives_empty_registry() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = AgentRegistry::load(&tmp.path().join("mcp_config.json")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn parse_error_names_the_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("mcp_config.json");
        std::fs::write(&path, "[1, 2").unwrap();
        match AgentRegistry::load(&path) {
            Err(ConfigError::ParseError { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
