//! Turning a raw `tools/call` result into text a model can read.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::protocol::{McpContent, McpToolResult};

/// Base64 image payloads longer than this are written to disk instead of
/// being handed to the model.
pub const LARGE_IMAGE_THRESHOLD: usize = 10_000;

const RESOURCE_SEPARATOR: &str = "\n\n---\n\n";

/// Render a tool result as model-facing text.
///
/// Embedded resources win: when any are present, only their contents are
/// returned. Large images are saved under `screenshots_dir` and replaced by
/// a path reference. Server-reported failures are prefixed with
/// `Error: Tool execution failed:`.
pub fn render(result: &McpToolResult, screenshots_dir: &Path) -> String {
    let resources: Vec<&str> = result
        .content
        .iter()
        .filter_map(|item| match item {
            McpContent::Resource { resource } => {
                resource.text.as_deref().or(resource.blob.as_deref())
            }
            _ => None,
        })
        .collect();

    let body = if !resources.is_empty() {
        resources.join(RESOURCE_SEPARATOR)
    } else {
        result
            .content
            .iter()
            .filter_map(|item| match item {
                McpContent::Text { text } => Some(text.clone()),
                McpContent::Image { data, mime_type } => {
                    Some(render_image(data, mime_type.as_deref(), screenshots_dir))
                }
                McpContent::Resource { .. } | McpContent::Unsupported => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    if result.is_error {
        return format!("Error: Tool execution failed: {body}");
    }
    if body.is_empty() {
        return "(tool returned no content)".to_string();
    }
    body
}

fn render_image(data: &str, mime_type: Option<&str>, screenshots_dir: &Path) -> String {
    if data.len() <= LARGE_IMAGE_THRESHOLD {
        let mime = mime_type.unwrap_or("image/png");
        return format!("data:{mime};base64,{data}");
    }
    match save_image(data, screenshots_dir) {
        Ok(path) => {
            tracing::info!(path = %path.display(), "Saved tool image");
            format!("[Image saved to {}]", path.display())
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to save tool image");
            "[Image data too large and failed to save]".to_string()
        }
    }
}

/// Decode and write `screenshot_<uuid>.png`, returning its absolute path.
fn save_image(data: &str, screenshots_dir: &Path) -> anyhow::Result<PathBuf> {
    let bytes = STANDARD.decode(data.trim())?;
    std::fs::create_dir_all(screenshots_dir)?;
    let path = screenshots_dir.join(format!("screenshot_{}.png", uuid::Uuid::new_v4()));
    std::fs::write(&path, bytes)?;
    Ok(std::path::absolute(&path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::ResourceContents;
    use tempfile::TempDir;

    fn text(s: &str) -> McpContent {
        McpContent::Text { text: s.into() }
    }

    fn resource(text: &str) -> McpContent {
        McpContent::Resource {
            resource: ResourceContents {
                uri: Some("repo://file".into()),
                text: Some(text.into()),
                blob: None,
                mime_type: None,
            },
        }
    }

    #[test]
    fn text_items_join_with_newlines() {
        let result = McpToolResult {
            content: vec![text("line one"), text("line two")],
            is_error: false,
        };
        assert_eq!(render(&result, Path::new("unused")), "line one\nline two");
    }

    #[test]
    fn resources_replace_wrapper_text() {
        let result = McpToolResult {
            content: vec![text("wrapper"), resource("fn a() {}"), resource("fn b() {}")],
            is_error: false,
        };
        assert_eq!(
            render(&result, Path::new("unused")),
            "fn a() {}\n\n---\n\nfn b() {}"
        );
    }

    #[test]
    fn server_errors_are_prefixed() {
        let result = McpToolResult {
            content: vec![text("repository not found")],
            is_error: true,
        };
        assert_eq!(
            render(&result, Path::new("unused")),
            "Error: Tool execution failed: repository not found"
        );
    }

    #[test]
    fn large_images_are_offloaded() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("screenshots");
        let data = STANDARD.encode(vec![7u8; LARGE_IMAGE_THRESHOLD]);
        let result = McpToolResult {
            content: vec![McpContent::Image {
                data,
                mime_type: Some("image/png".into()),
            }],
            is_error: false,
        };

        let rendered = render(&result, &dir);
        assert!(rendered.starts_with("[Image saved to "), "{rendered}");
        let saved: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(saved.len(), 1);
        let name = saved[0].as_ref().unwrap().file_name();
        let name = name.to_string_lossy();
        assert!(name.starts_with("screenshot_") && name.ends_with(".png"));
    }

    #[test]
    fn undecodable_large_image_reports_failure() {
        let tmp = TempDir::new().unwrap();
        let result = McpToolResult {
            content: vec![McpContent::Image {
                data: "!".repeat(LARGE_IMAGE_THRESHOLD + 1),
                mime_type: None,
            }],
            is_error: false,
        };
        assert_eq!(
            render(&result, tmp.path()),
            "[Image data too large and failed to save]"
        );
    }

    #[test]
    fn small_images_stay_inline() {
        let result = McpToolResult {
            content: vec![McpContent::Image {
                data: "aGk=".into(),
                mime_type: Some("image/gif".into()),
            }],
            is_error: false,
        };
        assert_eq!(
            render(&result, Path::new("unused")),
            "data:image/gif;base64,aGk="
        );
    }
}
