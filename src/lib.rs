//! Cricket is a desk companion runtime for code editors.
//!
//! It speaks a newline-delimited JSON protocol to an overlay window over a
//! loopback TCP socket and decides, on its own schedule, when the
//! character should say something: tips about recent code edits, break
//! reminders after long continuous sessions, and periodic proactive
//! messages (news, mood, reflection, amusement) with randomized timing.
//!
//! The crate is editor-agnostic. The embedding host supplies a
//! [`brain::CompanionBrain`] for language-model calls, an optional
//! [`brain::SpeechSynthesizer`] for voice output, and a
//! [`brain::CodeContextProvider`] for editor state, then feeds edits and
//! activity through a [`CompanionHandle`].
//!
//! # Example
//!
//! ```no_run
//! use cricket::{Companion, ConfigStore};
//! use cricket::brain::NoContext;
//! use std::sync::Arc;
//!
//! # async fn demo(brain: Arc<dyn cricket::brain::CompanionBrain>) -> cricket::Result<()> {
//! let (companion, handle) = Companion::new(
//!     ConfigStore::default(),
//!     brain,
//!     None,
//!     Arc::new(NoContext),
//! );
//! tokio::spawn(async move { companion.run().await });
//! handle.record_activity();
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod brain;
pub mod channel;
pub mod config;
pub mod error;
pub mod history;
pub mod news;
pub mod persist;
pub mod protocol;
pub mod reminder;
pub mod scheduler;
pub mod speech;
pub mod watcher;

pub use app::{Companion, CompanionHandle, InputEvent};
pub use channel::{ChannelEvent, ChannelHandle, OverlayChannel};
pub use config::{CompanionConfig, ConfigStore};
pub use error::{CompanionError, Result};
pub use protocol::{Category, Character, ControllerBound, Emotion, OverlayBound, VoicePack};
