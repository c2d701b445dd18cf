//! On-disk layout of persisted sessions.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Resolves the paths a project's sessions live under:
/// `<base>/projects/<project>/sessions/<uuid>.jsonl`, with `context.json`
/// and `names` beside `sessions/`.
#[derive(Debug, Clone)]
pub struct Layout {
    base: PathBuf,
    project: String,
}

impl Layout {
    /// A layout with an explicit base directory and project name.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            project: sanitize(&project.into()),
        }
    }

    /// The standard layout: `~/.gemini-repl` (or `./logs` in dev mode),
    /// project named after the working directory.
    #[must_use]
    pub fn resolve(dev_mode: bool, cwd: &Path) -> Self {
        let base = if dev_mode {
            PathBuf::from("./logs")
        } else {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".gemini-repl")
        };
        let project = cwd
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        Self::new(base, project)
    }

    /// The sanitized project name.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// `<base>/projects/<project>`.
    #[must_use]
    pub fn project_dir(&self) -> PathBuf {
        self.base.join("projects").join(&self.project)
    }

    /// The directory holding session journals.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.project_dir().join("sessions")
    }

    /// The journal path for a session id.
    #[must_use]
    pub fn session_file(&self, id: Uuid) -> PathBuf {
        self.sessions_dir().join(format!("{id}.jsonl"))
    }

    /// The persisted in-memory context snapshot.
    #[must_use]
    pub fn context_file(&self) -> PathBuf {
        self.project_dir().join("context.json")
    }

    /// The append-only name → uuid mapping.
    #[must_use]
    pub fn names_file(&self) -> PathBuf {
        self.project_dir().join("names")
    }
}

/// Keep project directory names filesystem-safe.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() { "root".to_string() } else { cleaned }
}
