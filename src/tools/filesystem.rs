//! Filesystem tools - read, write, and list files under allowed roots

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{required_str, Tool};
use crate::error::Error;
use crate::Result;

/// Directories the file tools may touch.
///
/// Paths are made absolute and normalized lexically before the check, so
/// `..` segments cannot climb out of an allowed root. An empty policy
/// denies everything.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    roots: Arc<Vec<PathBuf>>,
}

impl PathPolicy {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let roots = roots.iter().map(|r| normalize(r)).collect();
        Self { roots: Arc::new(roots) }
    }

    pub fn is_allowed(&self, path: &Path) -> bool {
        let path = normalize(path);
        self.roots.iter().any(|root| path.starts_with(root))
    }

    /// Resolve `raw` or fail with an access-denied error.
    pub fn check(&self, raw: &str) -> Result<PathBuf> {
        let path = PathBuf::from(raw);
        if raw.is_empty() || !self.is_allowed(&path) {
            debug!("Denied file access to {:?}", raw);
            return Err(Error::Tool(format!("Access denied: {}", raw)));
        }
        Ok(normalize(&path))
    }
}

fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Read file contents
pub struct ReadFileTool {
    policy: PathPolicy,
}

impl ReadFileTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let raw = required_str(&params, "path")?;
        let path = self.policy.check(raw)?;

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Tool(format!("Failed to read {}: {}", raw, e)))
    }
}

/// Write content to a file
pub struct WriteFileTool {
    policy: PathPolicy,
}

impl WriteFileTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path where to write the file"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let raw = required_str(&params, "path")?;
        let content = required_str(&params, "content")?;
        let path = self.policy.check(raw)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Tool(format!("Failed to create directory: {}", e)))?;
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| Error::Tool(format!("Failed to write {}: {}", raw, e)))?;

        Ok(format!("File written: {}", raw))
    }
}

/// List directory contents, directories first
pub struct ListDirectoryTool {
    policy: PathPolicy,
}

impl ListDirectoryTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the contents of a directory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the directory to list"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let raw = required_str(&params, "path")?;
        let path = self.policy.check(raw)?;

        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| Error::Tool(format!("Failed to read directory {}: {}", raw, e)))?;

        let mut entries: Vec<(bool, String)> = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let is_dir = entry.file_type().await.map(|ft| ft.is_dir()).unwrap_or(false);
            entries.push((is_dir, entry.file_name().to_string_lossy().to_string()));
        }

        entries.sort_by(|(a_dir, a_name), (b_dir, b_name)| {
            b_dir
                .cmp(a_dir)
                .then_with(|| a_name.to_lowercase().cmp(&b_name.to_lowercase()))
        });

        Ok(entries
            .into_iter()
            .map(|(is_dir, name)| {
                let tag = if is_dir { "[DIR]" } else { "[FILE]" };
                format!("{} {}", tag, name)
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
