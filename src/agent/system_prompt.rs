//! System prompts for the supervisor and the sub-agents.
//!
//! Both prompts are built fresh for every turn from the live agent and tool
//! set, so they always describe exactly what the model can call.

use crate::config::servers::SubAgentSpec;
use crate::mcp::ToolInfo;

/// One line per connected sub-agent: `- name: description (N tools)`.
pub fn agent_roster(agents: &[(&SubAgentSpec, usize)]) -> String {
    if agents.is_empty() {
        return "(no sub-agents are connected)".to_string();
    }
    agents
        .iter()
        .map(|(spec, tools)| format!("- {}: {} ({tools} tools)", spec.name, spec.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The supervisor's system prompt.
pub fn supervisor_prompt(model: &str, roster: &str) -> String {
    format!(
        "\
You are a supervisor assistant talking to a user in a terminal chat.

## Environment
- Model: {model}
- You cannot call external services yourself. Specialised sub-agents can, each
  owning the tools of one service.

## Sub-agents
{roster}

## How to work
- Answer directly when no external data or action is needed.
- Otherwise call the matching `delegate_to_<agent>` tool with a complete,
  self-contained task. Sub-agents do not see the conversation, so include
  names, ids and values the user already gave.
- You may delegate several times, to one or more agents, before answering.
- When a sub-agent reports an error, explain it plainly; do not invent results.
- Your final reply is shown to the user as is. Keep it concise."
    )
}

/// The system prompt for one sub-agent run.
pub fn sub_agent_prompt(spec: &SubAgentSpec, tools: &[ToolInfo]) -> String {
    let tool_lines = if tools.is_empty() {
        "(this server exposes no tools)".to_string()
    } else {
        tools
            .iter()
            .map(|t| {
                if t.description.is_empty() {
                    format!("- {}", t.name)
                } else {
                    format!("- {}: {}", t.name, first_line(&t.description))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let name = &spec.name;
    let description = &spec.description;

    format!(
        "\
You are the {name} agent. {description}

## Tools
{tool_lines}

## How to work
- Complete the task you are given using these tools.
- Arguments marked as injected defaults are filled in for you when omitted.
- If a tool returns an error, adjust and retry when it makes sense, otherwise
  report the error.
- Finish with a short plain-text answer containing the results the supervisor
  needs. Do not ask follow-up questions."
    )
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::servers::ServerSpec;
    use serde_json::json;
    use std::collections::HashMap;

    fn spec(name: &str, description: &str) -> SubAgentSpec {
        SubAgentSpec {
            name: name.into(),
            description: description.into(),
            server: ServerSpec::Http {
                url: "http://localhost/mcp".into(),
                headers: HashMap::new(),
            },
            tool_defaults: Default::default(),
        }
    }

    #[test]
    fn roster_lists_agents_with_tool_counts() {
        let github = spec("github", "Repositories and issues");
        let gmail = spec("gmail", "Email");
        let roster = agent_roster(&[(&github, 12), (&gmail, 3)]);
        assert_eq!(
            roster,
            "- github: Repositories and issues (12 tools)\n- gmail: Email (3 tools)"
        );
        assert!(agent_roster(&[]).contains("no sub-agents"));
    }

    #[test]
    fn supervisor_prompt_embeds_model_and_roster() {
        let prompt = supervisor_prompt("gemini-2.0-flash", "- github: x (1 tools)");
        assert!(prompt.contains("Model: gemini-2.0-flash"));
        assert!(prompt.contains("- github: x (1 tools)"));
        assert!(prompt.contains("delegate_to_<agent>"));
    }

    #[test]
    fn sub_agent_prompt_lists_tools_by_first_line() {
        let tools = vec![ToolInfo {
            name: "search_videos".into(),
            original_name: "search_videos".into(),
            server: "youtube".into(),
            description: "Search YouTube.\nLong details here.".into(),
            input_schema: json!({}),
        }];
        let prompt = sub_agent_prompt(&spec("youtube", "YouTube data"), &tools);
        assert!(prompt.starts_with("You are the youtube agent. YouTube data"));
        assert!(prompt.contains("- search_videos: Search YouTube."));
        assert!(!prompt.contains("Long details"));
    }
}
