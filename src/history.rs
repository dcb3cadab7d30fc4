//! Conversation history.
//!
//! An ordered list of timestamped turns with FIFO eviction at a fixed cap,
//! persisted best-effort to a JSON file after every push. Load failures
//! degrade to an empty history (logged) rather than blocking startup.

use crate::persist;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::warn;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Capped, persisted conversation history.
#[derive(Debug)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    max_turns: usize,
    path: Option<PathBuf>,
}

impl ConversationHistory {
    /// Default history file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        persist::default_state_dir().join("history.json")
    }

    /// Create an empty history. `path` = `None` disables persistence.
    #[must_use]
    pub fn new(max_turns: usize, path: Option<PathBuf>) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns: max_turns.max(1),
            path,
        }
    }

    /// Load history from `path`, degrading to empty on any failure.
    #[must_use]
    pub fn load(max_turns: usize, path: PathBuf) -> Self {
        let turns: Vec<Turn> = match persist::load_json(&path) {
            Ok(turns) => turns,
            Err(e) => {
                warn!(error = %e, "cannot load conversation history; starting empty");
                Vec::new()
            }
        };
        let mut history = Self::new(max_turns, Some(path));
        history.turns = turns.into();
        history.trim();
        history
    }

    /// Append a user turn.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into());
    }

    /// Append an assistant turn.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content.into());
    }

    fn push(&mut self, role: Role, content: String) {
        self.turns.push_back(Turn {
            role,
            content,
            timestamp: Utc::now(),
        });
        self.trim();
        self.save();
    }

    /// The most recent `count` turns, oldest first.
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(count);
        self.turns.iter().skip(skip).cloned().collect()
    }

    /// All retained turns, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// Drop all turns (and persist the empty list).
    pub fn clear(&mut self) {
        self.turns.clear();
        self.save();
    }

    /// Number of retained turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn trim(&mut self) {
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let turns: Vec<&Turn> = self.turns.iter().collect();
        if let Err(e) = persist::save_json(path, &turns) {
            warn!(error = %e, "cannot persist conversation history");
        }
    }
}
