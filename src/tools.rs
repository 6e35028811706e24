/*
 * Pictor - Sandboxed Filesystem & Image Generation Tool Server
 * File Path: src/tools.rs
 * Responsibility: Core tool definitions, dispatch, and tool safety constraints.
 */

use crate::config::Config;
use crate::imagen;
use crate::locator;
use crate::sandbox::AllowedRoots;
use crate::search;
use crate::viewer;
use chrono::Local;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

pub const CORE_TOOL_NAMES: &[&str] = &[
    "read_file",
    "write_file",
    "list_directory",
    "create_directory",
    "search_files",
    "generate_image",
];

fn require_string_arg<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolExecutionResult> {
    args.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            ToolExecutionResult::error(format!("Error: Missing required argument `{}`.", field))
        })
}

fn optional_string_arg<'a>(args: &'a Value, field: &str, default: &'a str) -> &'a str {
    args.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
}

/// Authorize a caller path or fold the failure into a terminal tool error.
/// Every filesystem tool goes through here; I/O only ever sees the returned
/// path, never the caller's string.
fn authorize_or_reject(roots: &AllowedRoots, requested: &str) -> Result<PathBuf, ToolExecutionResult> {
    roots
        .authorize(requested)
        .map_err(|e| ToolExecutionResult::error(format!("Error: {}", e)))
}

pub fn run_read_tool(args: &Value, roots: &AllowedRoots) -> ToolExecutionResult {
    let requested = match require_string_arg(args, "path") {
        Ok(path) => path,
        Err(err) => return err,
    };
    let resolved = match authorize_or_reject(roots, requested) {
        Ok(path) => path,
        Err(err) => return err,
    };

    let offset = args["offset"].as_u64().unwrap_or(1) as usize;
    let limit = args["limit"].as_u64().unwrap_or(800) as usize;
    if offset == 0 {
        return ToolExecutionResult::error("Error: `offset` must be >= 1.");
    }

    if !resolved.exists() {
        return ToolExecutionResult::error(format!("Error: File not found: {}", requested));
    }

    match fs::read_to_string(&resolved) {
        Ok(content) => {
            let lines: Vec<&str> = content.lines().collect();
            if offset > lines.len() && !lines.is_empty() {
                ToolExecutionResult::error(format!(
                    "Error: offset {} is beyond file length {}",
                    offset,
                    lines.len()
                ))
            } else {
                let end = std::cmp::min(offset - 1 + limit, lines.len());
                ToolExecutionResult::success(lines[(offset - 1).min(lines.len())..end].join("\n"))
            }
        }
        Err(e) => ToolExecutionResult::error(format!("Error reading file: {}", e)),
    }
}

pub fn run_write_tool(args: &Value, roots: &AllowedRoots) -> ToolExecutionResult {
    let requested = match require_string_arg(args, "path") {
        Ok(path) => path,
        Err(err) => return err,
    };
    let content = match args.get("content").and_then(Value::as_str) {
        Some(content) => content,
        None => return ToolExecutionResult::error("Error: Missing required argument `content`."),
    };
    let resolved = match authorize_or_reject(roots, requested) {
        Ok(path) => path,
        Err(err) => return err,
    };

    if let Some(parent) = resolved.parent() {
        let _ = fs::create_dir_all(parent);
    }

    match fs::write(&resolved, content) {
        Ok(()) => ToolExecutionResult::success(format!("Successfully wrote to {}", resolved.display())),
        Err(e) => ToolExecutionResult::error(format!("Error writing file: {}", e)),
    }
}

pub fn run_list_tool(args: &Value, roots: &AllowedRoots) -> ToolExecutionResult {
    let requested = optional_string_arg(args, "path", ".");
    let resolved = match authorize_or_reject(roots, requested) {
        Ok(path) => path,
        Err(err) => return err,
    };

    if !resolved.exists() {
        return ToolExecutionResult::error(format!("Error: Path not found: {}", requested));
    }

    if resolved.is_file() {
        return match fs::metadata(&resolved) {
            Ok(meta) => ToolExecutionResult::success(format!(
                "FILE {} ({} bytes)",
                resolved.display(),
                meta.len()
            )),
            Err(e) => ToolExecutionResult::error(format!("Error reading metadata: {}", e)),
        };
    }

    let mut entries: Vec<_> = match fs::read_dir(&resolved) {
        Ok(reader) => reader.filter_map(|entry| entry.ok()).collect(),
        Err(e) => return ToolExecutionResult::error(format!("Error listing path: {}", e)),
    };
    entries.sort_by_key(|entry| entry.file_name());

    if entries.is_empty() {
        return ToolExecutionResult::success(format!("Directory {} is empty.", resolved.display()));
    }

    let lines = entries
        .into_iter()
        .map(|entry| {
            let kind = if entry.path().is_dir() { "DIR" } else { "FILE" };
            format!("{} {}", kind, entry.file_name().to_string_lossy())
        })
        .collect::<Vec<_>>()
        .join("\n");
    ToolExecutionResult::success(lines)
}

pub fn run_mkdir_tool(args: &Value, roots: &AllowedRoots) -> ToolExecutionResult {
    let requested = match require_string_arg(args, "path") {
        Ok(path) => path,
        Err(err) => return err,
    };
    let resolved = match authorize_or_reject(roots, requested) {
        Ok(path) => path,
        Err(err) => return err,
    };

    match fs::create_dir_all(&resolved) {
        Ok(()) => ToolExecutionResult::success(format!(
            "Successfully created directory {}",
            resolved.display()
        )),
        Err(e) => ToolExecutionResult::error(format!("Error creating directory: {}", e)),
    }
}

pub fn run_search_tool(args: &Value, roots: &AllowedRoots) -> ToolExecutionResult {
    let pattern = match require_string_arg(args, "pattern") {
        Ok(pattern) => pattern,
        Err(err) => return err,
    };
    let requested = optional_string_arg(args, "path", ".");
    let resolved = match authorize_or_reject(roots, requested) {
        Ok(path) => path,
        Err(err) => return err,
    };

    let exclude_patterns: Vec<String> = args
        .get("exclude_patterns")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    match search::search_files(roots, &resolved, pattern, &exclude_patterns) {
        Ok(matches) if matches.is_empty() => ToolExecutionResult::success(format!(
            "No matches for `{}` under {}.",
            pattern,
            resolved.display()
        )),
        Ok(matches) => ToolExecutionResult::success(
            matches
                .iter()
                .map(|path| path.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        Err(e) => ToolExecutionResult::error(format!("Error scanning path: {}", e)),
    }
}

fn sanitize_filename(name: &str) -> String {
    let basename = Path::new(name)
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let cleaned: String = basename
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

/// Bare names gain a sortable timestamp suffix so repeated generations never
/// clobber each other.
fn artifact_file_name(requested: &str, extension: &str) -> String {
    let sanitized = sanitize_filename(requested);
    let stem = sanitized
        .strip_suffix(&format!(".{}", extension))
        .unwrap_or(&sanitized);
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    format!("{}-{}.{}", stem, timestamp, extension)
}

fn preview_document(image_file: &str, prompt: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>body{{margin:2em;font-family:sans-serif;background:#111;color:#eee;text-align:center}}\
         img{{max-width:90%;border-radius:8px}}p{{color:#999}}</style>\n</head>\n<body>\n\
         <img src=\"{src}\" alt=\"{title}\">\n<p>{caption}</p>\n</body>\n</html>\n",
        title = image_file,
        src = image_file,
        caption = prompt.replace('<', "&lt;").replace('>', "&gt;"),
    )
}

async fn run_generate_image_tool(args: &Value, config: &Config) -> ToolExecutionResult {
    let prompt = match require_string_arg(args, "prompt") {
        Ok(prompt) => prompt,
        Err(err) => return err,
    };
    let requested_name = optional_string_arg(args, "file_name", "image");

    let image = match imagen::generate_image(prompt, &config.gemini.api_key, &config.gemini.model).await
    {
        Ok(image) => image,
        Err(e) => return ToolExecutionResult::error(format!("Error generating image: {}", e)),
    };

    // The save directory comes from trusted platform facts, not the caller,
    // so it is confined by construction rather than by the allow-list.
    let output_dir = match locator::resolve_output_dir(&config.output) {
        Ok(dir) => dir,
        Err(e) => return ToolExecutionResult::error(format!("Error resolving output directory: {}", e)),
    };

    let file_name = artifact_file_name(requested_name, image.extension());
    let image_path = output_dir.join(&file_name);
    if let Err(e) = fs::write(&image_path, &image.data) {
        return ToolExecutionResult::error(format!("Error saving image: {}", e));
    }

    let preview_name = format!(
        "{}.html",
        image_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "preview".to_string())
    );
    let preview_path = output_dir.join(&preview_name);
    if let Err(e) = fs::write(&preview_path, preview_document(&file_name, prompt)) {
        eprintln!("⚠️ Could not write preview document {:?}: {}", preview_path, e);
    }

    viewer::open_best_effort(&image_path).await;

    ToolExecutionResult::success(format!(
        "Image saved to {} ({} bytes). Preview: {}",
        image_path.display(),
        image.data.len(),
        preview_path.display()
    ))
}

pub fn tool_definitions() -> Value {
    json!([
        {
            "name": "read_file",
            "description": "Read the contents of a file inside the allowed roots. Supports line-based reading with offset and limit.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path to the file to read. `~` expands to the home directory." },
                    "offset": { "type": "number", "description": "Line number to start reading from (1-indexed)" },
                    "limit": { "type": "number", "description": "Maximum number of lines to read" }
                },
                "required": ["path"]
            }
        },
        {
            "name": "write_file",
            "description": "Write content to a file inside the allowed roots. Overwrites existing content. Creates parent directories.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path to the file to write" },
                    "content": { "type": "string", "description": "The content to write" }
                },
                "required": ["path", "content"]
            }
        },
        {
            "name": "list_directory",
            "description": "List files and directories at a path inside the allowed roots. One DIR/FILE line per entry.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path to inspect. Defaults to the current working directory." }
                }
            }
        },
        {
            "name": "create_directory",
            "description": "Create a directory (including missing parents) inside the allowed roots. Succeeds if it already exists.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path of the directory to create" }
                },
                "required": ["path"]
            }
        },
        {
            "name": "search_files",
            "description": "Recursively search for files and directories by name pattern. Matching is case-insensitive; exclude patterns prune whole subtrees.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Root to search under. Defaults to the current working directory." },
                    "pattern": { "type": "string", "description": "Glob matched against entry names, e.g. *.png" },
                    "exclude_patterns": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Globs matched against paths relative to the search root. A plain name excludes that subtree anywhere."
                    }
                },
                "required": ["pattern"]
            }
        },
        {
            "name": "generate_image",
            "description": "Generate an image from a text prompt and save it to the best available output directory, with an HTML preview.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "Description of the image to generate" },
                    "file_name": { "type": "string", "description": "Optional base name for the saved file. A timestamp suffix is always appended." }
                },
                "required": ["prompt"]
            }
        }
    ])
}

pub async fn dispatch_tool(
    name: &str,
    args: &Value,
    roots: &AllowedRoots,
    config: &Config,
) -> ToolExecutionResult {
    let result = match name {
        "read_file" => run_read_tool(args, roots),
        "write_file" => run_write_tool(args, roots),
        "list_directory" => run_list_tool(args, roots),
        "create_directory" => run_mkdir_tool(args, roots),
        "search_files" => run_search_tool(args, roots),
        "generate_image" => run_generate_image_tool(args, config).await,
        _ => ToolExecutionResult::error(format!("Error: Unknown tool `{}`", name)),
    };

    ToolExecutionResult {
        output: mask_sensitive_data(
            &truncate_output(result.output, config.runtime.max_tool_output_bytes),
            config,
        ),
        is_error: result.is_error,
    }
}

pub fn mask_sensitive_data(text: &str, config: &Config) -> String {
    let mut masked = text.to_string();

    if !config.gemini.api_key.is_empty() && config.gemini.api_key.len() > 10 {
        masked = masked.replace(&config.gemini.api_key, "[REDACTED_GEMINI_KEY]");
    }

    masked
}

fn truncate_output(output: String, limit: usize) -> String {
    if limit == 0 {
        return output;
    }

    if output.len() > limit {
        let mut prefix_end = limit / 2;
        while prefix_end > 0 && !output.is_char_boundary(prefix_end) {
            prefix_end -= 1;
        }

        let mut suffix_start = output.len().saturating_sub(limit / 2);
        while suffix_start < output.len() && !output.is_char_boundary(suffix_start) {
            suffix_start += 1;
        }

        let prefix = &output[..prefix_end];
        let suffix = &output[suffix_start..];

        format!(
            "{} ... [TRUNCATED {} bytes] ... {}",
            prefix,
            output.len() - (prefix_end + (output.len() - suffix_start)),
            suffix
        )
    } else {
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config() -> Config {
        Config::default()
    }

    fn rooted(dir: &tempfile::TempDir) -> AllowedRoots {
        AllowedRoots::new(vec![dir.path().to_path_buf()])
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip_through_dispatch() {
        let dir = tempdir().unwrap();
        let roots = rooted(&dir);
        let config = test_config();
        let path = dir.path().join("notes.txt");
        let path = path.to_str().unwrap();

        let write = dispatch_tool(
            "write_file",
            &json!({ "path": path, "content": "line one\nline two" }),
            &roots,
            &config,
        )
        .await;
        assert!(!write.is_error, "{}", write.output);

        let read = dispatch_tool("read_file", &json!({ "path": path }), &roots, &config).await;
        assert!(!read.is_error);
        assert_eq!(read.output, "line one\nline two");
    }

    #[tokio::test]
    async fn test_read_respects_offset_and_limit_window() {
        let dir = tempdir().unwrap();
        let roots = rooted(&dir);
        let config = test_config();
        let path = dir.path().join("lines.txt");
        fs::write(&path, "a\nb\nc\nd\n").unwrap();

        let read = dispatch_tool(
            "read_file",
            &json!({ "path": path.to_str().unwrap(), "offset": 2, "limit": 2 }),
            &roots,
            &config,
        )
        .await;
        assert!(!read.is_error);
        assert_eq!(read.output, "b\nc");
    }

    #[tokio::test]
    async fn test_dispatch_rejects_paths_outside_the_roots() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let roots = rooted(&dir);
        let config = test_config();
        let escape = outside.path().join("escape.txt");

        let result = dispatch_tool(
            "write_file",
            &json!({ "path": escape.to_str().unwrap(), "content": "nope" }),
            &roots,
            &config,
        )
        .await;
        assert!(result.is_error);
        assert!(result.output.contains("Access denied"));
        assert!(!escape.exists());
    }

    #[tokio::test]
    async fn test_dispatch_rejects_missing_write_content() {
        let dir = tempdir().unwrap();
        let roots = rooted(&dir);
        let path = dir.path().join("notes.txt");

        let result = dispatch_tool(
            "write_file",
            &json!({ "path": path.to_str().unwrap() }),
            &roots,
            &test_config(),
        )
        .await;
        assert!(result.is_error);
        assert!(result.output.contains("Missing required argument `content`"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_list_and_mkdir_work_through_dispatch() {
        let dir = tempdir().unwrap();
        let roots = rooted(&dir);
        let config = test_config();
        let nested = dir.path().join("gallery").join("drafts");

        let mkdir = dispatch_tool(
            "create_directory",
            &json!({ "path": nested.to_str().unwrap() }),
            &roots,
            &config,
        )
        .await;
        assert!(!mkdir.is_error);
        assert!(nested.is_dir());

        fs::write(dir.path().join("gallery").join("a.png"), "").unwrap();
        let listing = dispatch_tool(
            "list_directory",
            &json!({ "path": dir.path().join("gallery").to_str().unwrap() }),
            &roots,
            &config,
        )
        .await;
        assert!(!listing.is_error);
        assert!(listing.output.contains("FILE a.png"));
        assert!(listing.output.contains("DIR drafts"));
    }

    #[tokio::test]
    async fn test_search_tool_reports_matches_and_sentinel() {
        let dir = tempdir().unwrap();
        let roots = rooted(&dir);
        let config = test_config();
        fs::write(dir.path().join("a.png"), "").unwrap();

        let hit = dispatch_tool(
            "search_files",
            &json!({ "path": dir.path().to_str().unwrap(), "pattern": "*.png" }),
            &roots,
            &config,
        )
        .await;
        assert!(!hit.is_error);
        assert!(hit.output.contains("a.png"));

        let miss = dispatch_tool(
            "search_files",
            &json!({ "path": dir.path().to_str().unwrap(), "pattern": "*.gif" }),
            &roots,
            &config,
        )
        .await;
        assert!(!miss.is_error);
        assert!(miss.output.contains("No matches"));
    }

    #[tokio::test]
    async fn test_dot_dot_segments_normalize_back_into_the_root() {
        let dir = tempdir().unwrap();
        let data = fs::canonicalize(dir.path()).unwrap().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("x.txt"), "payload").unwrap();
        let roots = AllowedRoots::new(vec![data.clone()]);

        let requested = format!("{}/../data/x.txt", data.display());
        let read = dispatch_tool(
            "read_file",
            &json!({ "path": requested }),
            &roots,
            &test_config(),
        )
        .await;
        assert!(!read.is_error, "{}", read.output);
        assert_eq!(read.output, "payload");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        let dir = tempdir().unwrap();
        let result = dispatch_tool("transmogrify", &json!({}), &rooted(&dir), &test_config()).await;
        assert!(result.is_error);
        assert!(result.output.contains("Unknown tool"));
    }

    #[test]
    fn test_artifact_file_name_appends_sortable_timestamp() {
        let name = artifact_file_name("sunset", "png");
        assert!(name.starts_with("sunset-"));
        assert!(name.ends_with(".png"));

        let already_extended = artifact_file_name("sunset.png", "png");
        assert!(already_extended.starts_with("sunset-"));
        assert!(!already_extended.contains(".png."));
    }

    #[test]
    fn test_sanitize_filename_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/pass wd"), "pass_wd");
        assert_eq!(sanitize_filename(""), "image");
    }

    #[test]
    fn test_preview_document_escapes_the_prompt() {
        let html = preview_document("a.png", "a <scary> prompt");
        assert!(html.contains("src=\"a.png\""));
        assert!(html.contains("&lt;scary&gt;"));
        assert!(!html.contains("<scary>"));
    }

    #[test]
    fn test_truncate_output_clamps_middle_out() {
        let long = "x".repeat(200);
        let clamped = truncate_output(long, 100);
        assert!(clamped.contains("TRUNCATED"));
        assert!(clamped.len() < 200);

        let short = truncate_output("ok".to_string(), 100);
        assert_eq!(short, "ok");
    }

    #[test]
    fn test_tool_definitions_cover_every_core_tool() {
        let definitions = tool_definitions();
        let names: Vec<&str> = definitions
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, CORE_TOOL_NAMES);
    }
}
