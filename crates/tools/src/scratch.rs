//! Scratch-space file tools: a private directory the agent may read and write.
//!
//! Every path the model supplies is relative to the scratch root and is
//! resolved lexically; absolute paths and `..` components are refused before
//! the filesystem is touched. Deleting is gated behind human confirmation.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};
use tollgate_core::error::ToolError;
use tollgate_core::summary::truncate;
use tollgate_core::tool::{HandlerResult, Tool, ToolContext, ToolResult};
use tracing::debug;

/// Largest file `read_file` returns in full.
pub const MAX_READ_BYTES: usize = 64 * 1024;

const CATEGORY: &str = "files";

/// A sandbox directory. Cloning shares the same root.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a model-supplied relative path into the sandbox.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, String> {
        let trimmed = relative.trim();
        if trimmed.is_empty() {
            return Err("path must not be empty".into());
        }

        let mut resolved = self.root.clone();
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(format!("path '{relative}' may not contain '..'"));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(format!("path '{relative}' must be relative to the scratch space"));
                }
            }
        }

        if resolved == self.root {
            return Err(format!("path '{relative}' names the scratch root itself"));
        }
        self.check_links(&resolved, relative)?;
        Ok(resolved)
    }

    /// Follow symlinks in the part of `path` that already exists and make
    /// sure the result is still under the root.
    fn check_links(&self, path: &Path, relative: &str) -> Result<(), String> {
        let Ok(root) = self.root.canonicalize() else {
            // No root yet means no links inside it either.
            return Ok(());
        };

        let mut existing = path;
        while existing.symlink_metadata().is_err() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => return Ok(()),
            }
        }

        let canonical = existing
            .canonicalize()
            .map_err(|e| format!("cannot resolve '{relative}': {e}"))?;
        if !canonical.starts_with(&root) {
            return Err(format!("path '{relative}' leads outside the scratch space"));
        }
        Ok(())
    }

    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

fn failed(tool_name: &str, reason: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool_name.to_string(),
        reason: reason.into(),
    }
}

fn path_arg<'a>(tool_name: &str, arguments: &'a Value) -> Result<&'a str, ToolError> {
    arguments["path"]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments {
            tool_name: tool_name.to_string(),
            reason: "missing 'path'".into(),
        })
}

/// `write_file`: create or overwrite (or append to) a text file.
pub struct WriteFileTool {
    space: ScratchSpace,
}

impl WriteFileTool {
    pub fn new(space: ScratchSpace) -> Self {
        Self { space }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file in the scratch space. Creates the file and any parent \
         directories if needed; overwrites unless 'append' is true."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the scratch space" },
                "content": { "type": "string", "description": "Text to write" },
                "append": { "type": "boolean", "description": "Append instead of overwriting" }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> &str {
        CATEGORY
    }

    async fn execute(&self, arguments: Value, _context: Option<ToolContext>) -> HandlerResult {
        let name = self.name();
        let relative = path_arg(name, &arguments)?;
        let content = arguments["content"].as_str().unwrap_or_default();
        let append = arguments["append"].as_bool().unwrap_or(false);

        let path = self.space.resolve(relative).map_err(|e| failed(name, e))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(name, format!("cannot create directory: {e}")))?;
        }

        if append {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| failed(name, format!("cannot open file: {e}")))?;
            file.write_all(content.as_bytes())
                .await
                .map_err(|e| failed(name, format!("write failed: {e}")))?;
        } else {
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| failed(name, format!("write failed: {e}")))?;
        }

        debug!(path = %path.display(), bytes = content.len(), append, "Scratch file written");
        Ok(ToolResult::ok(json!({
            "path": self.space.display(&path),
            "bytes_written": content.len(),
            "appended": append,
        })))
    }
}

/// `read_file`: return a text file's contents, capped at [`MAX_READ_BYTES`].
pub struct ReadFileTool {
    space: ScratchSpace,
}

impl ReadFileTool {
    pub fn new(space: ScratchSpace) -> Self {
        Self { space }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file from the scratch space."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the scratch space" }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> &str {
        CATEGORY
    }

    async fn execute(&self, arguments: Value, _context: Option<ToolContext>) -> HandlerResult {
        let name = self.name();
        let relative = path_arg(name, &arguments)?;
        let path = self.space.resolve(relative).map_err(|e| failed(name, e))?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| failed(name, format!("cannot read '{relative}': {e}")))?;
        let size = bytes.len();

        let mut end = size.min(MAX_READ_BYTES);
        // Never cut inside a UTF-8 sequence.
        while end < size && end > 0 && (bytes[end] & 0b1100_0000) == 0b1000_0000 {
            end -= 1;
        }
        let content = std::str::from_utf8(&bytes[..end])
            .map_err(|_| failed(name, format!("'{relative}' is not a text file")))?;

        Ok(ToolResult::ok(json!({
            "path": self.space.display(&path),
            "content": content,
            "size": size,
            "truncated": end < size,
        })))
    }
}

/// `list_files`: list one directory of the scratch space.
pub struct ListFilesTool {
    space: ScratchSpace,
}

impl ListFilesTool {
    pub fn new(space: ScratchSpace) -> Self {
        Self { space }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories in the scratch space (or one of its subdirectories)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dir": { "type": "string", "description": "Subdirectory to list; omit for the root" }
            },
            "additionalProperties": false
        })
    }

    fn category(&self) -> &str {
        CATEGORY
    }

    async fn execute(&self, arguments: Value, _context: Option<ToolContext>) -> HandlerResult {
        let name = self.name();
        let dir = match arguments["dir"].as_str().map(str::trim) {
            Some(dir) if !dir.is_empty() && dir != "." => {
                self.space.resolve(dir).map_err(|e| failed(name, e))?
            }
            _ => self.space.root().to_path_buf(),
        };

        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            // A scratch space nobody has written to yet is simply empty.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && dir == self.space.root() => {
                return Ok(ToolResult::ok(json!({ "entries": [] })));
            }
            Err(e) => return Err(failed(name, format!("cannot list directory: {e}"))),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| failed(name, format!("cannot list directory: {e}")))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| failed(name, format!("cannot stat entry: {e}")))?;
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "kind": if metadata.is_dir() { "dir" } else { "file" },
                "size": metadata.len(),
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(ToolResult::ok(json!({ "entries": entries })))
    }
}

/// `delete_file`: remove one file. Requires confirmation.
pub struct DeleteFileTool {
    space: ScratchSpace,
}

impl DeleteFileTool {
    pub fn new(space: ScratchSpace) -> Self {
        Self { space }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file from the scratch space. The user is asked to approve first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the scratch space" }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> &str {
        CATEGORY
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn summarize(&self, arguments: &Value) -> Option<String> {
        let path = arguments["path"].as_str().unwrap_or("?");
        Some(format!("Delete file\nPath: {}", truncate(path, 120)))
    }

    async fn execute(&self, arguments: Value, _context: Option<ToolContext>) -> HandlerResult {
        let name = self.name();
        let relative = path_arg(name, &arguments)?;
        let path = self.space.resolve(relative).map_err(|e| failed(name, e))?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| failed(name, format!("cannot delete '{relative}': {e}")))?;
        if metadata.is_dir() {
            return Err(failed(
                name,
                format!("'{relative}' is a directory; use scratch_wipe to clear everything"),
            ));
        }

        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| failed(name, format!("cannot delete '{relative}': {e}")))?;

        Ok(ToolResult::ok(json!({
            "deleted": self.space.display(&path),
        })))
    }
}

/// `scratch_wipe`: empty the whole scratch space. Requires confirmation.
pub struct WipeScratchTool {
    space: ScratchSpace,
}

impl WipeScratchTool {
    pub fn new(space: ScratchSpace) -> Self {
        Self { space }
    }
}

#[async_trait]
impl Tool for WipeScratchTool {
    fn name(&self) -> &str {
        "scratch_wipe"
    }

    fn description(&self) -> &str {
        "Delete everything in the scratch space. The user is asked to approve first."
    }

    fn category(&self) -> &str {
        CATEGORY
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn summarize(&self, _arguments: &Value) -> Option<String> {
        Some(format!(
            "Wipe scratch space\nEvery file under {} will be deleted",
            self.space.root().display()
        ))
    }

    async fn execute(&self, _arguments: Value, _context: Option<ToolContext>) -> HandlerResult {
        let name = self.name();
        let root = self.space.root();

        let mut removed = 0usize;
        let mut reader = match tokio::fs::read_dir(root).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ToolResult::ok(json!({ "removed": 0 })));
            }
            Err(e) => return Err(failed(name, format!("cannot read scratch space: {e}"))),
        };

        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| failed(name, format!("cannot read scratch space: {e}")))?
        {
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let outcome = if is_dir {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            outcome.map_err(|e| failed(name, format!("cannot remove '{}': {e}", path.display())))?;
            removed += 1;
        }

        Ok(ToolResult::ok(json!({ "removed": removed })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> (tempfile::TempDir, ScratchSpace) {
        let dir = tempfile::tempdir().unwrap();
        let space = ScratchSpace::new(dir.path());
        (dir, space)
    }

    #[test]
    fn resolve_stays_inside_root() {
        let (_dir, space) = space();
        let path = space.resolve("notes/today.txt").unwrap();
        assert!(path.starts_with(space.root()));
        assert!(space.resolve("./a.txt").is_ok());
    }

    #[test]
    fn resolve_rejects_escapes() {
        let (_dir, space) = space();
        assert!(space.resolve("../secret").is_err());
        assert!(space.resolve("notes/../../secret").is_err());
        assert!(space.resolve("/etc/passwd").is_err());
        assert!(space.resolve("").is_err());
        assert!(space.resolve(".").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_symlinks_out_of_root() {
        let (dir, space) = space();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "hidden").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            dir.path().join("file_link"),
        )
        .unwrap();

        assert!(space.resolve("link/secret.txt").is_err());
        assert!(space.resolve("link/new.txt").is_err());
        assert!(space.resolve("file_link").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn resolve_allows_symlinks_within_root() {
        let (dir, space) = space();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();

        let path = space.resolve("alias/a.txt").unwrap();
        assert!(path.starts_with(space.root()));
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_dir, space) = space();
        let write = WriteFileTool::new(space.clone());
        let read = ReadFileTool::new(space.clone());

        let result = write
            .execute(json!({"path": "notes/a.txt", "content": "hello"}), None)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data["bytes_written"], 5);

        write
            .execute(json!({"path": "notes/a.txt", "content": " world", "append": true}), None)
            .await
            .unwrap();

        let result = read.execute(json!({"path": "notes/a.txt"}), None).await.unwrap();
        assert_eq!(result.data["content"], "hello world");
        assert_eq!(result.data["path"], "notes/a.txt");
        assert_eq!(result.data["truncated"], false);
    }

    #[tokio::test]
    async fn read_large_file_is_truncated() {
        let (dir, space) = space();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(MAX_READ_BYTES + 10)).unwrap();

        let result = ReadFileTool::new(space)
            .execute(json!({"path": "big.txt"}), None)
            .await
            .unwrap();
        assert_eq!(result.data["truncated"], true);
        assert_eq!(result.data["content"].as_str().unwrap().len(), MAX_READ_BYTES);
        assert_eq!(result.data["size"], MAX_READ_BYTES + 10);
    }

    #[tokio::test]
    async fn read_missing_file_fails() {
        let (_dir, space) = space();
        let err = ReadFileTool::new(space)
            .execute(json!({"path": "nope.txt"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn write_outside_root_is_refused() {
        let (dir, space) = space();
        let err = WriteFileTool::new(space)
            .execute(json!({"path": "../escape.txt", "content": "x"}), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains(".."));
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn list_files_sorted() {
        let (dir, space) = space();
        std::fs::write(dir.path().join("b.txt"), "bb").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let result = ListFilesTool::new(space).execute(json!({}), None).await.unwrap();
        let entries = result.data["entries"].as_array().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(entries[1]["size"], 2);
        assert_eq!(entries[2]["kind"], "dir");
    }

    #[tokio::test]
    async fn list_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let space = ScratchSpace::new(dir.path().join("not-yet"));
        let result = ListFilesTool::new(space).execute(json!({}), None).await.unwrap();
        assert_eq!(result.data["entries"], json!([]));
    }

    #[tokio::test]
    async fn delete_file_removes_only_files() {
        let (dir, space) = space();
        std::fs::write(dir.path().join("gone.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("keep")).unwrap();
        let tool = DeleteFileTool::new(space);

        assert!(tool.requires_confirmation());
        tool.execute(json!({"path": "gone.txt"}), None).await.unwrap();
        assert!(!dir.path().join("gone.txt").exists());

        let err = tool.execute(json!({"path": "keep"}), None).await.unwrap_err();
        assert!(err.to_string().contains("directory"));
    }

    #[test]
    fn delete_summary_names_the_path() {
        let (_dir, space) = space();
        let summary = DeleteFileTool::new(space)
            .summarize(&json!({"path": "notes/a.txt"}))
            .unwrap();
        assert_eq!(summary, "Delete file\nPath: notes/a.txt");
    }

    #[tokio::test]
    async fn wipe_empties_scratch_space() {
        let (dir, space) = space();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("sub/deeper/b.txt"), "b").unwrap();

        let tool = WipeScratchTool::new(space);
        assert!(tool.requires_confirmation());
        let result = tool.execute(json!({}), None).await.unwrap();

        assert_eq!(result.data["removed"], 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
