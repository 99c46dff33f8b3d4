//! Human-friendly status lines for tool activity.
//!
//! Tool names like `github_search_repositories` or
//! `mcp__gmail__send_email` are turned into "Searching Github
//! repositories..." style text. Status lines go to stderr so stdout stays a
//! clean chat transcript.

/// Action verbs and their progressive form.
const ACTION_VERBS: &[(&str, &str)] = &[
    ("search", "Searching"),
    ("list", "Listing"),
    ("read", "Reading"),
    ("get", "Fetching"),
    ("create", "Creating"),
    ("update", "Updating"),
    ("delete", "Deleting"),
    ("send", "Sending"),
    ("fetch", "Fetching"),
    ("download", "Downloading"),
    ("upload", "Uploading"),
    ("find", "Finding"),
    ("query", "Querying"),
    ("execute", "Executing"),
    ("run", "Running"),
    ("start", "Starting"),
    ("stop", "Stopping"),
    ("open", "Opening"),
    ("close", "Closing"),
    ("write", "Writing"),
    ("edit", "Editing"),
    ("modify", "Modifying"),
    ("remove", "Removing"),
    ("add", "Adding"),
    ("set", "Setting"),
];

const KNOWN_SERVICES: &[&str] = &[
    "github", "gmail", "slack", "discord", "notion", "google", "drive", "calendar",
];

fn verb_for(word: &str) -> Option<&'static str> {
    let lower = word.to_lowercase();
    ACTION_VERBS
        .iter()
        .find(|(verb, _)| *verb == lower)
        .map(|(_, progressive)| *progressive)
}

/// `github` -> `Github` (rest lowercased).
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn progressive(action: &str) -> String {
    verb_for(action)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}ing", capitalize(action)))
}

fn split_words(name: &str) -> Vec<&str> {
    name.split(['_', '-']).filter(|p| !p.is_empty()).collect()
}

fn compose(verb: &str, service: Option<&str>, object: &[&str]) -> String {
    let mut out = verb.to_string();
    if let Some(service) = service {
        out.push(' ');
        out.push_str(service);
    }
    if !object.is_empty() {
        out.push(' ');
        out.push_str(&object.join(" "));
    }
    out
}

/// Status text for a tool invocation, always ending in `...`.
pub fn friendly_message(tool_name: &str) -> String {
    format!("{}...", describe(tool_name))
}

fn describe(tool_name: &str) -> String {
    if tool_name.chars().count() < 2 {
        return format!("Executing {tool_name}");
    }

    // mcp__<server>__<tool>
    if let Some(rest) = tool_name.strip_prefix("mcp__") {
        if let Some((server, tool)) = rest.split_once("__") {
            let service = capitalize(server);
            let words = split_words(tool);
            let Some((action, object)) = words.split_first() else {
                return format!("Using {service}");
            };
            return compose(&progressive(action), Some(service.as_str()), object);
        }
    }

    let words = split_words(tool_name);
    if words.is_empty() {
        return format!("Executing {tool_name}");
    }

    let first = words[0];
    let looks_like_service = words.len() > 1
        && first.chars().all(char::is_alphabetic)
        && first.chars().count() > 2
        && (KNOWN_SERVICES.contains(&first.to_lowercase().as_str()) || verb_for(first).is_none());

    let (service, action_words) = if looks_like_service {
        (Some(capitalize(first)), &words[1..])
    } else {
        (None, &words[..])
    };

    let Some((action, object)) = action_words.split_first() else {
        return match service {
            Some(service) => format!("Using {service}"),
            None => format!("Executing {tool_name}"),
        };
    };
    compose(&progressive(action), service.as_deref(), object)
}

/// Where progress lines go.
pub trait ProgressSink: Send + Sync {
    /// The supervisor handed a task to a sub-agent.
    fn delegating(&self, agent: &str);
    /// A sub-agent is about to call a tool.
    fn tool_started(&self, tool: &str);
}

/// Writes status lines to stderr.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn delegating(&self, agent: &str) {
        eprintln!("  -> asking {agent} agent");
    }

    fn tool_started(&self, tool: &str) {
        eprintln!("  ~ {}", friendly_message(tool));
    }
}

/// Discards status lines.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn delegating(&self, _agent: &str) {}
    fn tool_started(&self, _tool: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_prefixed_names() {
        assert_eq!(
            friendly_message("github_search_repositories"),
            "Searching Github repositories..."
        );
        assert_eq!(friendly_message("gmail_send_email"), "Sending Gmail email...");
        assert_eq!(friendly_message("slack"), "Slacking...");
    }

    #[test]
    fn sdk_style_names() {
        assert_eq!(
            friendly_message("mcp__github__create_issue"),
            "Creating Github issue..."
        );
        assert_eq!(friendly_message("mcp__notion__"), "Using Notion...");
    }

    #[test]
    fn verb_first_names() {
        assert_eq!(friendly_message("get_file_contents"), "Fetching file contents...");
        assert_eq!(friendly_message("list-labels"), "Listing labels...");
        assert_eq!(friendly_message("search"), "Searching...");
    }

    #[test]
    fn unknown_verbs_get_ing_suffix() {
        // "youtube" is not a verb, so it is taken as the service.
        assert_eq!(
            friendly_message("youtube_summarize_video"),
            "Summarizeing Youtube video..."
        );
        assert_eq!(friendly_message("x1_glob"), "X1ing glob...");
    }

    #[test]
    fn degenerate_names() {
        assert_eq!(friendly_message(""), "Executing ...");
        assert_eq!(friendly_message("__"), "Executing __...");
    }
}
