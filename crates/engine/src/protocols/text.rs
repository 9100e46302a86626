//! `text` adapter: local files as manuals and as tool results.

use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use utcp_registry::{OpenApiConverter, is_openapi_document, parse_openapi_document_value};
use utcp_types::{
    CallTemplate, CommunicationProtocol, Manual, ProtocolContext, RegisterManualResult, TextCallTemplate, ToolArguments, ToolStream,
    UtcpError,
};
use utcp_util::cancellable;

const FILE_PATH_ARGUMENT: &str = "file_path";

#[derive(Debug, Default)]
pub struct TextProtocol;

impl TextProtocol {
    pub fn new() -> Self {
        Self
    }
}

fn text_template(template: &CallTemplate) -> Result<&TextCallTemplate, UtcpError> {
    match template {
        CallTemplate::Text(text) => Ok(text),
        other => Err(UtcpError::invalid_configuration(format!(
            "text protocol cannot use a '{}' call template",
            other.call_template_type()
        ))),
    }
}

fn check_encoding(template: &TextCallTemplate) -> Result<(), UtcpError> {
    match template.encoding_name.as_deref().map(str::to_ascii_lowercase) {
        None => Ok(()),
        Some(name) if matches!(name.as_str(), "utf-8" | "utf8") => Ok(()),
        Some(name) => Err(UtcpError::invalid_configuration(format!("unsupported text encoding '{name}'"))),
    }
}

/// Folds `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Resolves `file_path` against the root, rejecting escapes when the template asks for it.
fn resolve_file_path(root_dir: &Path, file_path: &str, ensure_under_root: bool) -> Result<PathBuf, UtcpError> {
    let root = normalize_lexically(root_dir);
    let candidate = Path::new(file_path);
    let resolved = if candidate.is_absolute() {
        normalize_lexically(candidate)
    } else {
        normalize_lexically(&root.join(candidate))
    };
    if ensure_under_root && !resolved.starts_with(&root) {
        return Err(UtcpError::invalid_configuration("Resolved path is outside of root directory."));
    }
    Ok(resolved)
}

/// Splits `text` into pieces of at most `size` bytes without cutting a character.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if !current.is_empty() && current.len() + ch.len_utf8() > size {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

async fn read_file(path: &Path, cancel: &CancellationToken) -> Result<String, UtcpError> {
    cancellable(cancel, "text file read", async {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|error| UtcpError::transport(format!("failed to read {}: {error}", path.display())))
    })
    .await
}

impl TextProtocol {
    async fn read_target(
        &self,
        context: &ProtocolContext,
        arguments: &ToolArguments,
        template: &TextCallTemplate,
        cancel: &CancellationToken,
    ) -> Result<String, UtcpError> {
        check_encoding(template)?;
        let file_path = arguments
            .get(FILE_PATH_ARGUMENT)
            .and_then(Value::as_str)
            .or(template.file_path.as_deref())
            .ok_or_else(|| UtcpError::invalid_configuration(format!("text template '{}' has no file_path", template.name)))?;
        let path = resolve_file_path(&context.root_dir, file_path, template.ensure_under_root)?;
        debug!(target: "utcp_client", manual = %template.name, path = %path.display(), "reading text tool file");
        read_file(&path, cancel).await
    }
}

#[async_trait::async_trait]
impl CommunicationProtocol for TextProtocol {
    async fn register_manual(
        &self,
        context: &ProtocolContext,
        manual_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<RegisterManualResult, UtcpError> {
        let template = text_template(manual_call_template)?;
        check_encoding(template)?;
        let Some(file_path) = template.file_path.as_deref() else {
            return Ok(RegisterManualResult::new(manual_call_template.clone(), Manual::empty(), Vec::new()));
        };
        let path = resolve_file_path(&context.root_dir, file_path, template.ensure_under_root)?;
        let contents = read_file(&path, cancel).await?;

        let manual = match parse_openapi_document_value(&contents) {
            Ok(document) if is_openapi_document(&document) => OpenApiConverter::new(&template.name)
                .with_auth(template.auth.clone())
                .convert(&document),
            Ok(document) => serde_json::from_value::<Manual>(document).unwrap_or_else(|error| {
                debug!(target: "utcp_client", manual = %template.name, error = %error, "text file is not a UTCP manual");
                Manual::empty()
            }),
            Err(_) => Manual::empty(),
        };
        Ok(RegisterManualResult::new(manual_call_template.clone(), manual, Vec::new()))
    }

    async fn call_tool(
        &self,
        context: &ProtocolContext,
        _tool_name: &str,
        arguments: &ToolArguments,
        tool_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<Value, UtcpError> {
        let template = text_template(tool_call_template)?;
        let contents = self.read_target(context, arguments, template, cancel).await?;
        if template.chunk_size_bytes > 0 {
            let first = chunk_text(&contents, template.chunk_size_bytes).into_iter().next().unwrap_or_default();
            return Ok(Value::String(first));
        }
        Ok(Value::String(contents))
    }

    async fn call_tool_streaming(
        &self,
        context: &ProtocolContext,
        _tool_name: &str,
        arguments: &ToolArguments,
        tool_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<ToolStream, UtcpError> {
        let template = text_template(tool_call_template)?;
        let contents = self.read_target(context, arguments, template, cancel).await?;
        let pieces = if template.chunk_size_bytes > 0 {
            chunk_text(&contents, template.chunk_size_bytes)
        } else {
            contents.lines().map(str::to_string).collect()
        };
        Ok(ToolStream::from_chunks(pieces.into_iter().map(|piece| Ok(Value::String(piece))).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_escaping_root_are_rejected() {
        let root = Path::new("/srv/tools");
        assert_eq!(
            resolve_file_path(root, "docs/../readme.txt", true).expect("inside"),
            PathBuf::from("/srv/tools/readme.txt")
        );
        let error = resolve_file_path(root, "../secrets.txt", true).expect_err("escape");
        assert_eq!(error.to_string(), "Invalid configuration: Resolved path is outside of root directory.");
        assert!(resolve_file_path(root, "/etc/hosts", false).is_ok());
    }

    #[test]
    fn test_chunks_respect_char_boundaries() {
        assert_eq!(chunk_text("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(chunk_text("héllo", 2), vec!["h", "é", "ll", "o"]);
        assert!(chunk_text("", 3).is_empty());
    }

    #[test]
    fn test_only_utf8_is_accepted() {
        let template = TextCallTemplate {
            name: "notes".into(),
            auth: None,
            file_path: None,
            encoding_name: Some("latin-1".into()),
            chunk_size_bytes: 0,
            ensure_under_root: true,
        };
        assert!(check_encoding(&template).is_err());
    }
}
