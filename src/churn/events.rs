//! Structured events emitted while churning.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::action::Action;

/// One action a worker decided on and executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnEvent {
    /// Worker name.
    pub actor: String,
    /// Executed action.
    pub action: Action,
    /// Affected path, relative to the worker's base directory.
    pub path: PathBuf,
}

impl ChurnEvent {
    /// Build an event.
    pub fn new(actor: impl Into<String>, action: Action, path: impl Into<PathBuf>) -> Self {
        Self {
            actor: actor.into(),
            action,
            path: path.into(),
        }
    }
}

/// Render a base-relative path; the base itself shows as `.`.
pub fn display_relative(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        ".".to_string()
    } else {
        path.display().to_string()
    }
}

impl fmt::Display for ChurnEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.actor,
            self.action.verb(),
            display_relative(&self.path)
        )
    }
}

/// Receiver of human-readable log lines (mutations and isolated failures).
pub type LogRelay = Arc<dyn Fn(&str) + Send + Sync>;
