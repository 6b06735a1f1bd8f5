//! Churn actions and their relative weights.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One decision a worker can take from the idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Stay inert for a number of ticks.
    Wait,
    /// Create a new file holding one random sentence.
    AddFile,
    /// Remove the first owned file in the current directory.
    DeleteFile,
    /// Truncate the first owned file and append words to it over several ticks.
    ChangeFile,
    /// Create a new empty directory.
    AddDirectory,
    /// Recursively remove the first owned directory in the current directory.
    DeleteDirectory,
    /// Move the cursor into the first owned directory.
    EnterDirectory,
    /// Move the cursor one level up, never above the worker's base.
    ExitDirectory,
}

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Action; 8] = [
        Action::Wait,
        Action::AddFile,
        Action::DeleteFile,
        Action::ChangeFile,
        Action::AddDirectory,
        Action::DeleteDirectory,
        Action::EnterDirectory,
        Action::ExitDirectory,
    ];

    /// Present-participle phrase used in log lines.
    pub fn verb(self) -> &'static str {
        match self {
            Action::Wait => "waiting in",
            Action::AddFile => "creating file",
            Action::DeleteFile => "deleting file",
            Action::ChangeFile => "changing file",
            Action::AddDirectory => "creating directory",
            Action::DeleteDirectory => "deleting directory",
            Action::EnterDirectory => "going into",
            Action::ExitDirectory => "stepping out of",
        }
    }

    /// True when the action touches the filesystem (as opposed to moving the cursor or waiting).
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Action::AddFile
                | Action::DeleteFile
                | Action::ChangeFile
                | Action::AddDirectory
                | Action::DeleteDirectory
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Wait => "wait",
            Action::AddFile => "add_file",
            Action::DeleteFile => "delete_file",
            Action::ChangeFile => "change_file",
            Action::AddDirectory => "add_directory",
            Action::DeleteDirectory => "delete_directory",
            Action::EnterDirectory => "enter_directory",
            Action::ExitDirectory => "exit_directory",
        };
        f.write_str(name)
    }
}

/// Relative selection weight per action.
///
/// Weights are not probabilities: an action's chance of being picked is its weight divided by the
/// sum of the weights of the actions that are candidates at that moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightTable {
    /// Weight of [`Action::Wait`].
    pub wait: u32,
    /// Weight of [`Action::AddFile`].
    pub add_file: u32,
    /// Weight of [`Action::DeleteFile`].
    pub delete_file: u32,
    /// Weight of [`Action::ChangeFile`].
    pub change_file: u32,
    /// Weight of [`Action::AddDirectory`].
    pub add_directory: u32,
    /// Weight of [`Action::DeleteDirectory`].
    pub delete_directory: u32,
    /// Weight of [`Action::EnterDirectory`].
    pub enter_directory: u32,
    /// Weight of [`Action::ExitDirectory`].
    pub exit_directory: u32,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            wait: 20,
            add_file: 4,
            delete_file: 5,
            change_file: 20,
            add_directory: 3,
            delete_directory: 4,
            enter_directory: 20,
            exit_directory: 15,
        }
    }
}

impl WeightTable {
    /// A table where every action has weight zero.
    pub fn zeroed() -> Self {
        Self {
            wait: 0,
            add_file: 0,
            delete_file: 0,
            change_file: 0,
            add_directory: 0,
            delete_directory: 0,
            enter_directory: 0,
            exit_directory: 0,
        }
    }

    /// Weight configured for `action`.
    pub fn weight(&self, action: Action) -> u32 {
        match action {
            Action::Wait => self.wait,
            Action::AddFile => self.add_file,
            Action::DeleteFile => self.delete_file,
            Action::ChangeFile => self.change_file,
            Action::AddDirectory => self.add_directory,
            Action::DeleteDirectory => self.delete_directory,
            Action::EnterDirectory => self.enter_directory,
            Action::ExitDirectory => self.exit_directory,
        }
    }

    /// Return a copy with `action` set to `weight`.
    pub fn with(mut self, action: Action, weight: u32) -> Self {
        let slot = match action {
            Action::Wait => &mut self.wait,
            Action::AddFile => &mut self.add_file,
            Action::DeleteFile => &mut self.delete_file,
            Action::ChangeFile => &mut self.change_file,
            Action::AddDirectory => &mut self.add_directory,
            Action::DeleteDirectory => &mut self.delete_directory,
            Action::EnterDirectory => &mut self.enter_directory,
            Action::ExitDirectory => &mut self.exit_directory,
        };
        *slot = weight;
        self
    }
}
