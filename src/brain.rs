//! Opaque collaborator seams.
//!
//! The engine treats content generation, speech synthesis, and editor
//! context as black boxes behind traits. Generation never fails outward:
//! implementations degrade internally and either apologize or signal
//! `is_skip`, so callers only branch on the reply shape.

use crate::protocol::{Category, Emotion};
use async_trait::async_trait;
use std::path::PathBuf;

/// One generated reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Text to render in the chat bubble.
    pub text: String,
    /// Affect to display alongside the text.
    pub emotion: Emotion,
    /// Whether the speech pipeline should run for this reply.
    pub should_speak: bool,
    /// Nothing worth sharing; emit no envelope and run no audio.
    pub is_skip: bool,
}

impl Reply {
    /// A spoken reply with the given affect.
    #[must_use]
    pub fn say(text: impl Into<String>, emotion: Emotion) -> Self {
        Self {
            text: text.into(),
            emotion,
            should_speak: true,
            is_skip: false,
        }
    }

    /// A reply that suppresses any output.
    #[must_use]
    pub fn skip() -> Self {
        Self {
            text: String::new(),
            emotion: Emotion::Calm,
            should_speak: false,
            is_skip: true,
        }
    }

    /// A user-visible apology with a worried affect (the degraded form of
    /// any failed generation).
    #[must_use]
    pub fn apology(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emotion: Emotion::Worried,
            should_speak: true,
            is_skip: false,
        }
    }
}

/// Completion function behind the companion's voice.
#[async_trait]
pub trait CompanionBrain: Send + Sync {
    /// Answer a user chat message, optionally grounded in editor context.
    async fn chat(&self, user_text: &str, code_context: Option<&str>) -> Reply;

    /// Produce a tip for a summarized batch of code changes, or skip.
    async fn code_tip(&self, context: &str) -> Reply;

    /// Produce a proactive message for a category, or skip.
    async fn proactive(&self, category: Category, extra_context: Option<&str>) -> Reply;

    /// Summarize feed items into a short broadcast, or skip.
    async fn summarize_feed(&self, items: &[String]) -> Reply;

    /// Transcribe recorded audio to text.
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> anyhow::Result<String>;
}

/// Speech synthesis function. Returns the path of a rendered audio file.
///
/// Provider choice, fallback chains, and retries all live behind this
/// trait; the engine does exactly one call per reply.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> anyhow::Result<PathBuf>;
}

/// Snapshot of what the user is editing right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeContext {
    pub file_name: String,
    pub language: String,
    pub code: String,
    /// 1-based cursor line.
    pub cursor_line: u32,
    pub diagnostics: Vec<String>,
}

impl CodeContext {
    /// Render the snapshot as prompt context.
    #[must_use]
    pub fn to_prompt(&self) -> String {
        let mut prompt = format!(
            "Currently editing {} ({}), cursor at line {}:\n```\n{}\n```",
            self.file_name, self.language, self.cursor_line, self.code
        );
        if !self.diagnostics.is_empty() {
            prompt.push_str("\nDiagnostics:\n");
            for diag in &self.diagnostics {
                prompt.push_str(&format!("- {diag}\n"));
            }
        }
        prompt
    }
}

/// Provider of editor context snapshots.
pub trait CodeContextProvider: Send + Sync {
    /// Current context, or `None` when no document is open.
    fn snapshot(&self) -> Option<CodeContext>;
}

/// Provider that always reports no open document.
pub struct NoContext;

impl CodeContextProvider for NoContext {
    fn snapshot(&self) -> Option<CodeContext> {
        None
    }
}
