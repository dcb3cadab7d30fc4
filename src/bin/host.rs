//! Standalone companion host.
//!
//! Runs the companion runtime with a canned demo brain so the overlay can
//! be developed and tested without a model backend. Logs go to stderr;
//! stdout stays clean for tooling.

use async_trait::async_trait;
use cricket::brain::{CompanionBrain, NoContext, Reply};
use cricket::protocol::{Category, Emotion};
use cricket::{Companion, CompanionConfig, ConfigStore};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Canned replies, enough to exercise every overlay code path.
struct DemoBrain;

#[async_trait]
impl CompanionBrain for DemoBrain {
    async fn chat(&self, user_text: &str, _code_context: Option<&str>) -> Reply {
        Reply::say(
            format!("You said: \"{user_text}\". I'm a demo brain, but I'm listening!"),
            Emotion::Happy,
        )
    }

    async fn code_tip(&self, _context: &str) -> Reply {
        Reply::say(
            "Nice progress! Remember to commit early and often.",
            Emotion::Excited,
        )
    }

    async fn proactive(&self, category: Category, extra_context: Option<&str>) -> Reply {
        match category {
            Category::Health => {
                let detail = extra_context.unwrap_or("a while");
                Reply::say(
                    format!("Time to stretch! ({detail})"),
                    Emotion::Worried,
                )
            }
            Category::Mood => Reply::say("How is the coding going today?", Emotion::Happy),
            Category::Reflection => Reply::say(
                "Anything worth jotting down from today's session?",
                Emotion::Thinking,
            ),
            Category::Amusement => Reply::say(
                "Why do programmers prefer dark mode? Because light attracts bugs.",
                Emotion::Excited,
            ),
            Category::News => Reply::skip(),
        }
    }

    async fn summarize_feed(&self, items: &[String]) -> Reply {
        match items.first() {
            Some(first) => Reply::say(
                format!("Top story right now: {first}"),
                Emotion::Excited,
            ),
            None => Reply::skip(),
        }
    }

    async fn transcribe(&self, _audio: &[u8], _mime_type: &str) -> anyhow::Result<String> {
        anyhow::bail!("the demo brain has no transcription backend")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cricket=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = CompanionConfig::default_config_path();
    let config = match CompanionConfig::from_file(&config_path) {
        Ok(config) => {
            info!(path = %config_path.display(), "loaded configuration");
            config
        }
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "using default configuration");
            CompanionConfig::default()
        }
    };

    let (companion, handle) = Companion::new(
        ConfigStore::new(config),
        Arc::new(DemoBrain),
        None,
        Arc::new(NoContext),
    );

    let runtime = tokio::spawn(companion.run());

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    handle.shutdown();
    runtime.await??;
    Ok(())
}
