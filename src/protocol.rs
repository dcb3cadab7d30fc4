//! Wire protocol between the controller and the overlay renderer.
//!
//! Messages travel as newline-delimited JSON frames over the loopback
//! channel. Each frame is one self-describing envelope discriminated by a
//! `type` field; the two directions are disjoint tagged unions with no
//! shared session state. Frames whose `type` the receiver does not know are
//! dropped at the channel layer (forward compatibility).

use crate::config::OverlaySettings;
use serde::{Deserialize, Serialize};

/// Affect shown by the companion character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Worried,
    #[default]
    Calm,
    Angry,
    Excited,
    Thinking,
}

/// Character sprite shown by the overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Character {
    #[default]
    Sprite,
    Cat,
    Dog,
    Custom,
}

/// Voice pack used for synthesized speech.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoicePack {
    #[default]
    Bright,
    Mellow,
    Smoky,
    Bubble,
    Custom,
}

/// Proactive content category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Health,
    News,
    Mood,
    Reflection,
    Amusement,
}

/// Controller → overlay envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayBound {
    /// Reply to a user-initiated chat request.
    ChatResponse { text: String, emotion: Emotion },
    /// Unsolicited tip about a recent code change.
    CodeTip { text: String, emotion: Emotion },
    /// Scheduler-initiated message.
    ProactiveMessage {
        text: String,
        emotion: Emotion,
        category: Category,
    },
    /// Change the character's displayed affect.
    EmotionChange { emotion: Emotion },
    /// Push the current overlay-visible configuration.
    ConfigUpdate { config: OverlaySettings },
    /// Switch the character sprite.
    ChangeCharacter { character: Character },
    /// Switch the voice pack.
    ChangeVoice { voice: VoicePack },
    /// Controller liveness indicator.
    Status { connected: bool },
    /// Synthesized speech for the most recent text message.
    AudioData {
        audio_base64: String,
        mime_type: String,
    },
}

/// Overlay → controller envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerBound {
    /// Text typed into the chat bubble.
    ChatRequest { text: String },
    /// Recorded microphone audio (base64).
    VoiceInput {
        audio_data: String,
        mime_type: String,
    },
    /// Pasted or dropped image (base64), optionally with a caption.
    ImageInput {
        image_data: String,
        mime_type: String,
        #[serde(default)]
        text: Option<String>,
    },
    /// The overlay finished loading and can render messages.
    OverlayReady,
    /// Explicit request for a `config_update` push.
    RequestConfig,
}
