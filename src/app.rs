//! Companion runtime: the single event loop that owns all mutable state.
//!
//! One task multiplexes overlay frames, host input events, the debounce
//! deadline, the reminder check, and the proactive scan with
//! `tokio::select!`. Collaborators that do I/O (brain, synthesizer, feed)
//! sit behind trait objects; jittered proactive triggers are the only
//! work spawned off the loop, and they share state only through
//! [`ProactiveEngine`].

use crate::brain::{CodeContextProvider, CompanionBrain, Reply, SpeechSynthesizer};
use crate::channel::{ChannelEvent, ChannelHandle, OverlayChannel};
use crate::config::{ConfigStore, OverlaySettings};
use crate::history::ConversationHistory;
use crate::news::{HackerNewsFeed, NewsCache};
use crate::protocol::{Category, ControllerBound, Emotion, OverlayBound};
use crate::reminder::{ActivityTracker, CHECK_INTERVAL};
use crate::scheduler::{ProactiveEngine, ScheduleTable};
use crate::speech::SpeechAdapter;
use crate::watcher::{ChangeDebouncer, EditRecord};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// How long an expressed emotion lingers before the character settles.
const EMOTION_HOLD: Duration = Duration::from_secs(15);

/// Host-side input fed into the event loop.
#[derive(Debug)]
pub enum InputEvent {
    /// A document edit observed by the embedding editor.
    Edit(EditRecord),
    /// Any user activity (typing, cursor movement, focus).
    Activity,
    /// Stop the loop and close the channel.
    Shutdown,
}

/// Cheap handle for feeding events into a running [`Companion`].
#[derive(Clone)]
pub struct CompanionHandle {
    tx: mpsc::UnboundedSender<InputEvent>,
}

impl CompanionHandle {
    /// Report a document edit. Also counts as activity.
    pub fn record_edit(&self, edit: EditRecord) {
        let _ = self.tx.send(InputEvent::Edit(edit));
    }

    /// Report user activity without an associated edit.
    pub fn record_activity(&self) {
        let _ = self.tx.send(InputEvent::Activity);
    }

    /// Request a clean shutdown of the event loop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(InputEvent::Shutdown);
    }
}

/// The companion runtime. Construct with [`Companion::new`], then drive
/// with [`Companion::run`].
pub struct Companion {
    config: ConfigStore,
    brain: Arc<dyn CompanionBrain>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    context: Arc<dyn CodeContextProvider>,
    input_rx: mpsc::UnboundedReceiver<InputEvent>,
}

impl Companion {
    /// Build a runtime and the handle used to feed it input.
    #[must_use]
    pub fn new(
        config: ConfigStore,
        brain: Arc<dyn CompanionBrain>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        context: Arc<dyn CodeContextProvider>,
    ) -> (Self, CompanionHandle) {
        let (tx, input_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                brain,
                synthesizer,
                context,
                input_rx,
            },
            CompanionHandle { tx },
        )
    }

    /// Run until shutdown. Fails only when the overlay port cannot be bound.
    pub async fn run(self) -> crate::Result<()> {
        let (tx, _rx) = oneshot::channel();
        self.run_inner(tx).await
    }

    /// Like [`Companion::run`], but reports the bound port once listening.
    /// Useful with port `0` (ephemeral).
    pub async fn run_with_port_notify(self, port_tx: oneshot::Sender<u16>) -> crate::Result<()> {
        self.run_inner(port_tx).await
    }

    async fn run_inner(mut self, port_tx: oneshot::Sender<u16>) -> crate::Result<()> {
        let cfg = self.config.get();

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let channel = OverlayChannel::start(cfg.channel.port, event_tx).await?;
        info!(port = channel.port(), "overlay channel listening");
        let _ = port_tx.send(channel.port());

        let speech = SpeechAdapter::new(
            channel.handle(),
            self.synthesizer.take(),
            self.config.clone(),
        );
        let news = NewsCache::new(
            Box::new(HackerNewsFeed::new(
                cfg.news.feed_url.clone(),
                Duration::from_secs(cfg.news.fetch_timeout_secs),
            )),
            Duration::from_secs(cfg.news.refresh_minutes * 60),
            cfg.news.max_items,
        );
        let engine = Arc::new(ProactiveEngine::new(
            channel.handle(),
            Arc::clone(&self.brain),
            speech.clone(),
            news,
        ));

        let history_path = cfg
            .history
            .path
            .clone()
            .unwrap_or_else(ConversationHistory::default_path);
        let mut session = Session {
            channel: channel.handle(),
            brain: Arc::clone(&self.brain),
            speech,
            context: Arc::clone(&self.context),
            config: self.config.clone(),
            history: ConversationHistory::load(cfg.history.max_turns, history_path),
        };

        let mut debouncer = ChangeDebouncer::new(
            Duration::from_secs(cfg.watcher.quiet_period_secs),
            Duration::from_secs(cfg.watcher.min_tip_interval_secs),
        );
        let mut tracker = ActivityTracker::new(Instant::now());
        let mut schedule = ScheduleTable::standard();

        let mut last_overlay = cfg.overlay.clone();
        let mut config_rx = self.config.subscribe();
        let mut reminder_tick = tokio::time::interval(CHECK_INTERVAL);
        reminder_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut scan_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + Duration::from_secs(cfg.proactive.startup_grace_secs),
            Duration::from_secs(cfg.proactive.tick_secs),
        );
        scan_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            // Re-armed each iteration from the debouncer's current deadline.
            // The deadline is copied out so the future holds no borrow.
            let deadline = debouncer.deadline();
            let quiet_elapsed = async move {
                match deadline {
                    Some(deadline) => {
                        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
                    }
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                Some(event) = event_rx.recv() => match event {
                    ChannelEvent::Connected => session.on_overlay_connected().await,
                    ChannelEvent::Disconnected => {
                        debug!("overlay disconnected");
                    }
                    ChannelEvent::Message(frame) => session.dispatch(frame).await,
                },

                Some(input) = self.input_rx.recv() => match input {
                    InputEvent::Edit(edit) => {
                        let now = Instant::now();
                        tracker.record_activity(now);
                        debouncer.record_change(edit, now);
                    }
                    InputEvent::Activity => tracker.record_activity(Instant::now()),
                    InputEvent::Shutdown => {
                        info!("shutting down companion runtime");
                        channel.stop().await;
                        return Ok(());
                    }
                },

                () = quiet_elapsed => {
                    let cfg = self.config.get();
                    let summary = debouncer.flush(Instant::now());
                    if let Some(summary) = summary {
                        if cfg.proactive.enable_code_tips && session.channel.is_connected() {
                            session.send_code_tip(&summary).await;
                        }
                    }
                },

                _ = reminder_tick.tick() => {
                    let cfg = self.config.get();
                    let interval = Duration::from_secs(cfg.proactive.health_reminder_minutes * 60);
                    let now = Instant::now();
                    if tracker.check(now, interval) {
                        let minutes = tracker.continuous_minutes(now);
                        let context = format!(
                            "The user has been coding continuously for about {minutes} minutes"
                        );
                        engine.trigger(Category::Health, Some(context)).await;
                    }
                },

                _ = scan_tick.tick() => {
                    let cfg = self.config.get();
                    if let Some(category) = schedule.scan(&cfg, Instant::now()) {
                        let jitter = {
                            let mut rng = rand::thread_rng();
                            rng.gen_range(0..=cfg.proactive.max_jitter_secs)
                        };
                        debug!(?category, jitter_secs = jitter, "scheduling proactive trigger");
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move {
                            tokio::time::sleep(Duration::from_secs(jitter)).await;
                            engine.trigger(category, None).await;
                        });
                    }
                },

                changed = config_rx.changed() => {
                    if changed.is_ok() && session.channel.is_connected() {
                        let current = self.config.get().overlay;
                        session.push_config_delta(&last_overlay, &current).await;
                        last_overlay = current;
                    }
                },
            }
        }
    }
}

/// Per-connection dispatch state, split out so handlers stay readable.
struct Session {
    channel: ChannelHandle,
    brain: Arc<dyn CompanionBrain>,
    speech: SpeechAdapter,
    context: Arc<dyn CodeContextProvider>,
    config: ConfigStore,
    history: ConversationHistory,
}

impl Session {
    async fn on_overlay_connected(&self) {
        info!("overlay connected");
        self.push_config().await;
        self.channel
            .send(&OverlayBound::Status { connected: true })
            .await;
    }

    async fn push_config(&self) {
        let overlay = self.config.get().overlay;
        self.channel
            .send(&OverlayBound::ConfigUpdate { config: overlay })
            .await;
    }

    /// Push the updated config, plus targeted change envelopes so the
    /// overlay can animate a swap instead of re-rendering wholesale.
    async fn push_config_delta(&self, previous: &OverlaySettings, current: &OverlaySettings) {
        self.channel
            .send(&OverlayBound::ConfigUpdate {
                config: current.clone(),
            })
            .await;
        if current.character != previous.character {
            self.channel
                .send(&OverlayBound::ChangeCharacter {
                    character: current.character,
                })
                .await;
        }
        if current.voice_pack != previous.voice_pack {
            self.channel
                .send(&OverlayBound::ChangeVoice {
                    voice: current.voice_pack,
                })
                .await;
        }
    }

    async fn dispatch(&mut self, frame: ControllerBound) {
        match frame {
            ControllerBound::ChatRequest { text } => self.handle_chat(&text).await,
            ControllerBound::VoiceInput {
                audio_data,
                mime_type,
            } => self.handle_voice(&audio_data, &mime_type).await,
            ControllerBound::ImageInput {
                image_data: _,
                mime_type,
                text,
            } => {
                // Vision is delegated to the brain via a textual preamble;
                // raw pixels never cross this layer.
                let caption = text.unwrap_or_default();
                let prompt =
                    format!("[The user shared an image ({mime_type})] {caption}");
                self.handle_chat(prompt.trim()).await;
            }
            ControllerBound::OverlayReady | ControllerBound::RequestConfig => {
                self.push_config().await;
            }
        }
    }

    async fn handle_chat(&mut self, text: &str) {
        let snapshot = self.context.snapshot().map(|c| c.to_prompt());
        self.history.push_user(text);
        let reply = self.brain.chat(text, snapshot.as_deref()).await;
        self.history.push_assistant(reply.text.clone());

        self.channel
            .send(&OverlayBound::EmotionChange {
                emotion: reply.emotion,
            })
            .await;
        let envelope = OverlayBound::ChatResponse {
            text: reply.text.clone(),
            emotion: reply.emotion,
        };
        self.speech.deliver(&reply, envelope).await;
        self.settle_emotion_later();
    }

    async fn handle_voice(&mut self, audio_base64: &str, mime_type: &str) {
        let audio = match BASE64.decode(audio_base64) {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, "voice input carried invalid base64");
                return;
            }
        };
        match self.brain.transcribe(&audio, mime_type).await {
            Ok(text) if !text.trim().is_empty() => self.handle_chat(text.trim()).await,
            Ok(_) => {
                let reply = Reply::say(
                    "Sorry, I didn't catch that. Could you try again?",
                    Emotion::Thinking,
                );
                self.send_chat_reply(&reply).await;
            }
            Err(e) => {
                warn!(error = %e, "transcription failed");
                let reply =
                    Reply::apology("I couldn't make out the audio. Mind typing it instead?");
                self.send_chat_reply(&reply).await;
            }
        }
    }

    async fn send_chat_reply(&self, reply: &Reply) {
        let envelope = OverlayBound::ChatResponse {
            text: reply.text.clone(),
            emotion: reply.emotion,
        };
        self.speech.deliver(reply, envelope).await;
    }

    async fn send_code_tip(&self, summary: &str) {
        let reply = self.brain.code_tip(summary).await;
        if reply.is_skip || reply.text.is_empty() {
            debug!("code tip skipped");
            return;
        }
        info!("emitting code tip");
        let envelope = OverlayBound::CodeTip {
            text: reply.text.clone(),
            emotion: reply.emotion,
        };
        self.speech.deliver(&reply, envelope).await;
        self.settle_emotion_later();
    }

    /// Return the character to calm once the expressed emotion has lingered.
    fn settle_emotion_later(&self) {
        let channel = self.channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(EMOTION_HOLD).await;
            channel
                .send(&OverlayBound::EmotionChange {
                    emotion: Emotion::Calm,
                })
                .await;
        });
    }
}
