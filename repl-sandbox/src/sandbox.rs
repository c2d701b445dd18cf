//! The sandbox: path validation and the three file operations.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use repl_types::{ToolCall, ToolError};
use uuid::Uuid;

/// Listing output is capped at this many entries.
const LIST_LIMIT: usize = 50;

/// `*` stays within one path level; `**` crosses levels.
const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A file-system sandbox rooted at a directory captured at startup.
///
/// All operation paths are relative to the root. Every operation validates
/// its path first: absolute paths, `..` segments, resolutions outside the
/// root, and symlinks anywhere along the resolved path fail with
/// [`ToolError::SecurityViolation`].
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Capture the sandbox root. The directory must exist; it is
    /// canonicalized once so later checks compare against a stable
    /// absolute path.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ToolError> {
        let root = root.into().canonicalize()?;
        Ok(Self { root })
    }

    /// The canonicalized root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List files matching `pattern` (default `*`), lexicographically
    /// sorted, newline-joined, truncated to 50 entries.
    pub async fn list(&self, pattern: &str) -> Result<String, ToolError> {
        let pattern = if pattern.is_empty() { "*" } else { pattern };
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| ToolError::Io(std::io::Error::new(ErrorKind::InvalidInput, e)))?;
        tracing::debug!(pattern = %pattern, "listing sandbox files");

        let mut matches = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_symlink() {
                    continue;
                }
                let path = entry.path();
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                if let Ok(rel) = path.strip_prefix(&self.root) {
                    let rel = rel.to_string_lossy().into_owned();
                    if pattern.matches_with(&rel, MATCH_OPTIONS) {
                        matches.push(rel);
                    }
                }
            }
        }

        matches.sort();
        matches.truncate(LIST_LIMIT);
        Ok(matches.join("\n"))
    }

    /// Read a file's contents.
    pub async fn read(&self, path: &str) -> Result<String, ToolError> {
        let resolved = self.resolve(path).await?;
        tracing::debug!(path, "reading sandbox file");
        match tokio::fs::read_to_string(&resolved).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ToolError::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a file, creating parent directories as needed. The content
    /// lands via write-to-temp + rename so an overwrite is all-or-nothing.
    pub async fn write(&self, path: &str, content: &str) -> Result<String, ToolError> {
        let resolved = self.resolve(path).await?;
        let file_name = resolved
            .file_name()
            .ok_or_else(|| ToolError::SecurityViolation(format!("{path}: no file name")))?
            .to_string_lossy()
            .into_owned();
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = resolved.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &resolved).await?;
        tracing::debug!(path, bytes = content.len(), "wrote sandbox file");
        Ok(format!("wrote {} bytes to {path}", content.len()))
    }

    /// The uniform executor: run a validated [`ToolCall`].
    pub async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        match call {
            ToolCall::ListFiles { pattern } => self.list(pattern).await,
            ToolCall::ReadFile { file_path } => self.read(file_path).await,
            ToolCall::WriteFile { file_path, content } => self.write(file_path, content).await,
        }
    }

    /// Validate `path` and resolve it against the root.
    ///
    /// The target itself may not exist yet (writes create it), but every
    /// component that does exist must be a real directory or file, not a
    /// symlink.
    async fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let rel = Path::new(path);
        if path.is_empty() {
            return Err(ToolError::SecurityViolation("empty path".to_string()));
        }
        if rel.is_absolute() {
            return Err(ToolError::SecurityViolation(format!(
                "{path}: absolute paths are not allowed"
            )));
        }
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(ToolError::SecurityViolation(format!(
                        "{path}: parent traversal is not allowed"
                    )));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::SecurityViolation(format!(
                        "{path}: absolute paths are not allowed"
                    )));
                }
            }
        }

        let resolved = self.root.join(rel);
        if !resolved.starts_with(&self.root) {
            return Err(ToolError::SecurityViolation(format!(
                "{path}: escapes the sandbox root"
            )));
        }

        let mut current = self.root.clone();
        for component in rel.components() {
            if let Component::Normal(part) = component {
                current.push(part);
                match tokio::fs::symlink_metadata(&current).await {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        return Err(ToolError::SecurityViolation(format!(
                            "{path}: traverses a symlink"
                        )));
                    }
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(resolved)
    }
}
