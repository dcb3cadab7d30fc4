//! Speech pipeline adapter.
//!
//! Sequences "synthesize, then transmit audio, then transmit text" for any
//! reply the companion wants to speak. Synthesis failure is logged and
//! never blocks the text envelope; there are no retries here (provider
//! fallback lives inside the synthesizer).

use crate::brain::{Reply, SpeechSynthesizer};
use crate::channel::ChannelHandle;
use crate::config::ConfigStore;
use crate::protocol::OverlayBound;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Adapter between generated replies and the overlay channel.
#[derive(Clone)]
pub struct SpeechAdapter {
    channel: ChannelHandle,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    config: ConfigStore,
}

impl SpeechAdapter {
    /// Create an adapter. `synthesizer` may be absent (speech disabled at
    /// build time or unconfigured); delivery then degrades to text only.
    #[must_use]
    pub fn new(
        channel: ChannelHandle,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        config: ConfigStore,
    ) -> Self {
        Self {
            channel,
            synthesizer,
            config,
        }
    }

    /// Deliver a reply: best-effort audio first, then the text envelope.
    ///
    /// The text envelope is always sent (subject only to channel
    /// liveness); audio is attempted only when the reply wants speech and
    /// voice output is enabled.
    pub async fn deliver(&self, reply: &Reply, envelope: OverlayBound) {
        if reply.should_speak {
            self.send_audio(&reply.text).await;
        }
        self.channel.send(&envelope).await;
    }

    async fn send_audio(&self, text: &str) {
        if !self.config.get().overlay.enable_voice_output {
            return;
        }
        let Some(synthesizer) = &self.synthesizer else {
            debug!("no speech synthesizer configured; skipping audio");
            return;
        };

        let path = match synthesizer.synthesize(text).await {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "speech synthesis failed; sending text only");
                return;
            }
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "cannot read synthesized audio");
                return;
            }
        };

        self.channel
            .send(&OverlayBound::AudioData {
                audio_base64: BASE64.encode(bytes),
                mime_type: mime_for(&path).to_owned(),
            })
            .await;
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        _ => "audio/mp3",
    }
}
