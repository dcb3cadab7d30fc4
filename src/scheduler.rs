//! Proactive interaction scheduling.
//!
//! A coarse periodic scan over a fixed, priority-ordered schedule table
//! decides which content category to push next. At most one category fires
//! per scan, and its `last_triggered_at` is stamped at selection time so a
//! jittered in-flight trigger can never be selected again. Triggering is a
//! no-op while the overlay is disconnected: nothing is queued and nothing
//! catches up later.
//!
//! Each category maps to an explicit content strategy. The news category
//! short-circuits through the feed cache and falls through to a generic
//! category only when the feed has nothing worth sharing; the health
//! category is driven directly by the activity tracker rather than by the
//! scan.

use crate::brain::CompanionBrain;
use crate::channel::ChannelHandle;
use crate::config::CompanionConfig;
use crate::news::NewsCache;
use crate::protocol::{Category, OverlayBound};
use crate::speech::SpeechAdapter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One proactive category schedule.
pub struct ScheduleEntry {
    /// Category this entry fires.
    pub category: Category,
    /// Minimum spacing between two triggers of this category.
    pub interval: Duration,
    /// Stamped at scan time, not at jittered fire time.
    pub last_triggered_at: Option<Instant>,
    enabled: fn(&CompanionConfig) -> bool,
}

impl ScheduleEntry {
    fn new(category: Category, interval: Duration, enabled: fn(&CompanionConfig) -> bool) -> Self {
        Self {
            category,
            interval,
            last_triggered_at: None,
            enabled,
        }
    }
}

/// Priority-ordered table of proactive schedules.
///
/// Owned exclusively by the event loop; entries are created once at
/// startup and mutated only by [`ScheduleTable::scan`].
pub struct ScheduleTable {
    entries: Vec<ScheduleEntry>,
}

impl ScheduleTable {
    /// The standard category set. Health is reminder-driven and therefore
    /// absent from the scanned table.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            entries: vec![
                ScheduleEntry::new(Category::News, Duration::from_secs(60 * 60), |c| {
                    c.proactive.enable_news
                }),
                ScheduleEntry::new(Category::Mood, Duration::from_secs(90 * 60), |c| {
                    c.proactive.enable_chat
                }),
                ScheduleEntry::new(Category::Reflection, Duration::from_secs(120 * 60), |c| {
                    c.proactive.enable_chat
                }),
                ScheduleEntry::new(Category::Amusement, Duration::from_secs(75 * 60), |c| {
                    c.proactive.enable_chat
                }),
            ],
        }
    }

    /// Pick at most one due category and stamp it immediately.
    ///
    /// Entries are considered in table order; the first one that is
    /// enabled and whose interval has elapsed wins the whole scan.
    pub fn scan(&mut self, config: &CompanionConfig, now: Instant) -> Option<Category> {
        for entry in &mut self.entries {
            if !(entry.enabled)(config) {
                continue;
            }
            let due = entry
                .last_triggered_at
                .is_none_or(|at| now.duration_since(at) >= entry.interval);
            if due {
                entry.last_triggered_at = Some(now);
                debug!(category = ?entry.category, "proactive category selected");
                return Some(entry.category);
            }
        }
        None
    }

    /// Registered entries, in priority order.
    #[must_use]
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }
}

/// How a category's content is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStrategy {
    /// Plain completion call with the category's prompt.
    Generic,
    /// Summarize the external feed; fall through to `fallback`'s generic
    /// prompt when the feed has nothing worth sharing.
    Feed { fallback: Category },
    /// Driven directly by the activity tracker with duration context.
    Reminder,
}

/// Explicit category → strategy mapping (no inline aliasing).
#[must_use]
pub fn strategy(category: Category) -> ContentStrategy {
    match category {
        Category::News => ContentStrategy::Feed {
            fallback: Category::Amusement,
        },
        Category::Health => ContentStrategy::Reminder,
        Category::Mood | Category::Reflection | Category::Amusement => ContentStrategy::Generic,
    }
}

/// Executes proactive triggers against the live channel.
///
/// Shared behind `Arc` so jittered triggers can run as spawned tasks; the
/// feed cache sits behind a mutex because two jittered news triggers may
/// overlap.
pub struct ProactiveEngine {
    channel: ChannelHandle,
    brain: Arc<dyn CompanionBrain>,
    speech: SpeechAdapter,
    news: Mutex<NewsCache>,
}

impl ProactiveEngine {
    /// Bundle the collaborators a trigger needs.
    #[must_use]
    pub fn new(
        channel: ChannelHandle,
        brain: Arc<dyn CompanionBrain>,
        speech: SpeechAdapter,
        news: NewsCache,
    ) -> Self {
        Self {
            channel,
            brain,
            speech,
            news: Mutex::new(news),
        }
    }

    /// Fire one proactive trigger for `category`.
    ///
    /// No-op while the overlay is disconnected. A reply that signals skip
    /// emits nothing and runs no audio pipeline.
    pub async fn trigger(&self, category: Category, extra_context: Option<String>) {
        if !self.channel.is_connected() {
            debug!(?category, "no live overlay; dropping proactive trigger");
            return;
        }

        match strategy(category) {
            ContentStrategy::Feed { fallback } => {
                let items = {
                    let mut news = self.news.lock().await;
                    news.formatted(Instant::now()).await
                };
                if items.is_empty() {
                    debug!(?category, ?fallback, "feed empty; falling through");
                    self.trigger_generic(fallback, category, None).await;
                } else {
                    let reply = self.brain.summarize_feed(&items).await;
                    self.emit(reply, category).await;
                }
            }
            ContentStrategy::Generic | ContentStrategy::Reminder => {
                self.trigger_generic(category, category, extra_context).await;
            }
        }
    }

    /// Run the generic completion path. The envelope keeps the originally
    /// scheduled category even when the prompt came from a fallback.
    async fn trigger_generic(
        &self,
        prompt_category: Category,
        envelope_category: Category,
        extra_context: Option<String>,
    ) {
        let reply = self
            .brain
            .proactive(prompt_category, extra_context.as_deref())
            .await;
        self.emit(reply, envelope_category).await;
    }

    async fn emit(&self, reply: crate::brain::Reply, category: Category) {
        if reply.is_skip || reply.text.is_empty() {
            debug!(?category, "reply signalled skip; nothing to emit");
            return;
        }
        info!(?category, "emitting proactive message");
        let envelope = OverlayBound::ProactiveMessage {
            text: reply.text.clone(),
            emotion: reply.emotion,
            category,
        };
        self.speech.deliver(&reply, envelope).await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::brain::Reply;
    use crate::channel::{ChannelEvent, OverlayChannel};
    use crate::config::ConfigStore;
    use crate::news::FeedSource;
    use crate::protocol::Emotion;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn config() -> CompanionConfig {
        CompanionConfig::default()
    }

    #[test]
    fn scan_fires_at_most_one_category_per_tick() {
        let mut table = ScheduleTable::standard();
        let now = Instant::now();

        // Everything is due at startup, but only the highest-priority
        // category wins the scan.
        assert_eq!(table.scan(&config(), now), Some(Category::News));
        assert_eq!(table.scan(&config(), now), Some(Category::Mood));
        assert_eq!(table.scan(&config(), now), Some(Category::Reflection));
        assert_eq!(table.scan(&config(), now), Some(Category::Amusement));
        // All stamped now; nothing is due anymore.
        assert_eq!(table.scan(&config(), now), None);
    }

    #[test]
    fn stamp_happens_at_selection_time() {
        let mut table = ScheduleTable::standard();
        let now = Instant::now();

        assert_eq!(table.scan(&config(), now), Some(Category::News));
        let entry = &table.entries()[0];
        assert_eq!(entry.last_triggered_at, Some(now));

        // Within the interval the same category cannot be re-selected,
        // regardless of whether its jittered fire has completed.
        assert_ne!(
            table.scan(&config(), now + Duration::from_secs(60)),
            Some(Category::News)
        );
        // After the interval it becomes due again.
        let later = now + HOUR + Duration::from_secs(1);
        assert_eq!(table.scan(&config(), later), Some(Category::News));
    }

    #[test]
    fn disabled_categories_are_skipped() {
        let mut table = ScheduleTable::standard();
        let mut cfg = config();
        cfg.proactive.enable_news = false;
        let now = Instant::now();

        assert_eq!(table.scan(&cfg, now), Some(Category::Mood));

        cfg.proactive.enable_chat = false;
        let later = now + Duration::from_secs(200 * 60);
        assert_eq!(table.scan(&cfg, later), None);
    }

    #[test]
    fn strategy_table_is_explicit() {
        assert_eq!(
            strategy(Category::News),
            ContentStrategy::Feed {
                fallback: Category::Amusement
            }
        );
        assert_eq!(strategy(Category::Health), ContentStrategy::Reminder);
        assert_eq!(strategy(Category::Mood), ContentStrategy::Generic);
    }

    // -- engine tests -------------------------------------------------------

    struct RecordingBrain {
        proactive_calls: StdMutex<Vec<Category>>,
        feed_calls: AtomicUsize,
        reply: StdMutex<Reply>,
    }

    impl RecordingBrain {
        fn skipping() -> Self {
            Self {
                proactive_calls: StdMutex::new(Vec::new()),
                feed_calls: AtomicUsize::new(0),
                reply: StdMutex::new(Reply::skip()),
            }
        }

        fn chatty() -> Self {
            Self {
                proactive_calls: StdMutex::new(Vec::new()),
                feed_calls: AtomicUsize::new(0),
                reply: StdMutex::new(Reply {
                    text: "did you know?".to_owned(),
                    emotion: Emotion::Excited,
                    should_speak: false,
                    is_skip: false,
                }),
            }
        }
    }

    #[async_trait]
    impl CompanionBrain for RecordingBrain {
        async fn chat(&self, _user_text: &str, _code_context: Option<&str>) -> Reply {
            self.reply.lock().unwrap().clone()
        }

        async fn code_tip(&self, _context: &str) -> Reply {
            self.reply.lock().unwrap().clone()
        }

        async fn proactive(&self, category: Category, _extra: Option<&str>) -> Reply {
            self.proactive_calls.lock().unwrap().push(category);
            self.reply.lock().unwrap().clone()
        }

        async fn summarize_feed(&self, _items: &[String]) -> Reply {
            self.feed_calls.fetch_add(1, Ordering::SeqCst);
            self.reply.lock().unwrap().clone()
        }

        async fn transcribe(&self, _audio: &[u8], _mime: &str) -> anyhow::Result<String> {
            anyhow::bail!("not implemented")
        }
    }

    struct EmptyFeed;

    #[async_trait]
    impl FeedSource for EmptyFeed {
        async fn fetch(&self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct FullFeed;

    #[async_trait]
    impl FeedSource for FullFeed {
        async fn fetch(&self) -> anyhow::Result<Vec<String>> {
            Ok(vec!["headline".to_owned()])
        }
    }

    fn engine_with(
        channel: ChannelHandle,
        brain: Arc<RecordingBrain>,
        feed: Box<dyn FeedSource>,
        fallback: Vec<String>,
    ) -> ProactiveEngine {
        let store = ConfigStore::default();
        let speech = SpeechAdapter::new(channel.clone(), None, store);
        let news = NewsCache::new(feed, Duration::from_secs(1800), 10).with_fallback(fallback);
        ProactiveEngine::new(channel, brain, speech, news)
    }

    #[tokio::test]
    async fn disconnected_channel_makes_trigger_a_noop() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let channel = OverlayChannel::start(0, tx).await.unwrap();
        let brain = Arc::new(RecordingBrain::chatty());
        let engine = engine_with(
            channel.handle(),
            Arc::clone(&brain),
            Box::new(FullFeed),
            Vec::new(),
        );

        engine.trigger(Category::Mood, None).await;

        assert!(brain.proactive_calls.lock().unwrap().is_empty());
        assert_eq!(brain.feed_calls.load(Ordering::SeqCst), 0);
        channel.stop().await;
    }

    async fn connected(
        channel: &OverlayChannel,
        rx: &mut mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> BufReader<TcpStream> {
        let client = TcpStream::connect(("127.0.0.1", channel.port()))
            .await
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ChannelEvent::Connected));
        BufReader::new(client)
    }

    #[tokio::test]
    async fn empty_feed_falls_through_to_amusement() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = OverlayChannel::start(0, tx).await.unwrap();
        let _client = connected(&channel, &mut rx).await;

        let brain = Arc::new(RecordingBrain::skipping());
        let engine = engine_with(
            channel.handle(),
            Arc::clone(&brain),
            Box::new(EmptyFeed),
            Vec::new(), // empty fallback list, so the cache yields nothing
        );

        engine.trigger(Category::News, None).await;

        // Feed summarization never ran; the generic path ran with the
        // amusement prompt instead.
        assert_eq!(brain.feed_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            brain.proactive_calls.lock().unwrap().as_slice(),
            &[Category::Amusement]
        );
        channel.stop().await;
    }

    #[tokio::test]
    async fn double_skip_emits_no_envelope() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = OverlayChannel::start(0, tx).await.unwrap();
        let mut client = connected(&channel, &mut rx).await;

        let brain = Arc::new(RecordingBrain::skipping());
        let engine = engine_with(
            channel.handle(),
            Arc::clone(&brain),
            Box::new(EmptyFeed),
            Vec::new(),
        );

        engine.trigger(Category::News, None).await;

        // Nothing must arrive on the wire; probe with a bounded read.
        let mut line = String::new();
        let read = tokio::time::timeout(
            Duration::from_millis(300),
            client.read_line(&mut line),
        )
        .await;
        assert!(read.is_err(), "expected no frame, got: {line}");
        channel.stop().await;
    }

    #[tokio::test]
    async fn feed_summary_is_emitted_with_the_news_category() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = OverlayChannel::start(0, tx).await.unwrap();
        let mut client = connected(&channel, &mut rx).await;

        let brain = Arc::new(RecordingBrain::chatty());
        let engine = engine_with(
            channel.handle(),
            Arc::clone(&brain),
            Box::new(FullFeed),
            Vec::new(),
        );

        engine.trigger(Category::News, None).await;

        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        let frame: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(frame["type"], "proactive_message");
        assert_eq!(frame["category"], "news");
        assert_eq!(frame["text"], "did you know?");
        assert_eq!(brain.feed_calls.load(Ordering::SeqCst), 1);
        channel.stop().await;
    }
}
