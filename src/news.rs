//! External content feed with caching and a static fallback.
//!
//! The proactive news category reads from this cache rather than hitting
//! the network on every trigger. A fetch never fails past its caller: any
//! network, status, or parse problem degrades to a randomly sampled
//! built-in list, and the cache (items + timestamp) is updated atomically
//! in both the success and the fallback path.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Items sampled from the fallback list per fill.
const FALLBACK_SAMPLE: usize = 3;

/// Built-in fallback shown when the remote feed is unreachable.
const FALLBACK_ITEMS: &[&str] = &[
    "AI tooling keeps moving fast; every major platform shipped new coding assistants this year",
    "Language rankings barely moved: Python, JavaScript, and TypeScript still lead",
    "More companies are funding the open-source projects they depend on",
    "Edge computing keeps growing as workloads move closer to users",
    "WebAssembly keeps finding new homes outside the browser",
    "Postgres remains the default answer to most storage questions",
];

/// Source of raw feed items.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the current feed items, newest first.
    async fn fetch(&self) -> anyhow::Result<Vec<String>>;
}

/// Hacker News front page via the hnrss.org RSS mirror.
pub struct HackerNewsFeed {
    url: String,
    timeout: Duration,
}

impl HackerNewsFeed {
    /// Create a source for the given RSS URL with a bounded fetch timeout.
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl FeedSource for HackerNewsFeed {
    async fn fetch(&self) -> anyhow::Result<Vec<String>> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let body = client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(extract_item_titles(&body))
    }
}

/// Pull `<item><title>` texts out of an RSS document, tolerating CDATA.
fn extract_item_titles(xml: &str) -> Vec<String> {
    let mut titles = Vec::new();
    let mut rest = xml;

    while let Some(item_start) = rest.find("<item>") {
        rest = &rest[item_start + "<item>".len()..];
        let Some(title_start) = rest.find("<title>") else {
            break;
        };
        let after = &rest[title_start + "<title>".len()..];
        let Some(title_end) = after.find("</title>") else {
            break;
        };
        let raw = after[..title_end].trim();
        let title = raw
            .strip_prefix("<![CDATA[")
            .and_then(|s| s.strip_suffix("]]>"))
            .unwrap_or(raw)
            .trim();
        if !title.is_empty() {
            titles.push(title.to_owned());
        }
        rest = &after[title_end..];
    }

    titles
}

/// Cached view over a [`FeedSource`].
pub struct NewsCache {
    source: Box<dyn FeedSource>,
    refresh_interval: Duration,
    max_items: usize,
    fallback: Vec<String>,
    items: Vec<String>,
    fetched_at: Option<Instant>,
}

impl NewsCache {
    /// Create a cache over `source` refreshing at most once per
    /// `refresh_interval` and keeping up to `max_items` entries.
    #[must_use]
    pub fn new(source: Box<dyn FeedSource>, refresh_interval: Duration, max_items: usize) -> Self {
        Self {
            source,
            refresh_interval,
            max_items,
            fallback: FALLBACK_ITEMS.iter().map(|s| (*s).to_owned()).collect(),
            items: Vec::new(),
            fetched_at: None,
        }
    }

    /// Replace the built-in fallback list.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Vec<String>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Current items, refreshing from the source when the cache expired.
    ///
    /// Never fails: a failed or empty remote fetch fills the cache from the
    /// fallback list instead.
    pub async fn fetch(&mut self, now: Instant) -> Vec<String> {
        let fresh = self
            .fetched_at
            .is_some_and(|at| now.duration_since(at) < self.refresh_interval);
        if fresh && !self.items.is_empty() {
            return self.items.clone();
        }

        let mut items = match self.source.fetch().await {
            Ok(items) if !items.is_empty() => items,
            Ok(_) => {
                debug!("feed returned no items; using fallback list");
                self.sample_fallback()
            }
            Err(e) => {
                warn!(error = %e, "feed fetch failed; using fallback list");
                self.sample_fallback()
            }
        };
        items.truncate(self.max_items);

        self.items = items;
        self.fetched_at = Some(now);
        self.items.clone()
    }

    /// Numbered item list for prompt building.
    pub async fn formatted(&mut self, now: Instant) -> Vec<String> {
        self.fetch(now)
            .await
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {item}", i + 1))
            .collect()
    }

    fn sample_fallback(&self) -> Vec<String> {
        let mut rng = rand::thread_rng();
        self.fallback
            .choose_multiple(&mut rng, FALLBACK_SAMPLE)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StubFeed {
        calls: Arc<AtomicUsize>,
        reply: anyhow::Result<Vec<String>>,
    }

    #[async_trait]
    impl FeedSource for StubFeed {
        async fn fetch(&self) -> anyhow::Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(items) => Ok(items.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    fn stub(reply: anyhow::Result<Vec<String>>) -> (Box<dyn FeedSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(StubFeed {
                calls: Arc::clone(&calls),
                reply,
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn cache_hit_returns_identical_items_without_refetch() {
        let (source, calls) = stub(Ok(vec!["one".into(), "two".into()]));
        let mut cache = NewsCache::new(source, Duration::from_secs(1800), 10);

        let t0 = Instant::now();
        let first = cache.fetch(t0).await;
        let second = cache.fetch(t0 + Duration::from_secs(60)).await;

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expiry_triggers_exactly_one_refresh() {
        let (source, calls) = stub(Ok(vec!["one".into()]));
        let mut cache = NewsCache::new(source, Duration::from_secs(1800), 10);

        let t0 = Instant::now();
        cache.fetch(t0).await;
        cache.fetch(t0 + Duration::from_secs(1801)).await;
        cache.fetch(t0 + Duration::from_secs(1802)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_fallback() {
        let (source, _calls) = stub(Err(anyhow::anyhow!("connection refused")));
        let mut cache = NewsCache::new(source, Duration::from_secs(1800), 10);

        let items = cache.fetch(Instant::now()).await;
        assert_eq!(items.len(), FALLBACK_SAMPLE);
        for item in &items {
            assert!(FALLBACK_ITEMS.contains(&item.as_str()));
        }
    }

    #[tokio::test]
    async fn empty_feed_with_empty_fallback_yields_nothing() {
        let (source, _calls) = stub(Ok(Vec::new()));
        let mut cache =
            NewsCache::new(source, Duration::from_secs(1800), 10).with_fallback(Vec::new());

        assert!(cache.fetch(Instant::now()).await.is_empty());
    }

    #[tokio::test]
    async fn items_are_capped() {
        let many: Vec<String> = (0..25).map(|i| format!("item {i}")).collect();
        let (source, _calls) = stub(Ok(many));
        let mut cache = NewsCache::new(source, Duration::from_secs(1800), 10);

        assert_eq!(cache.fetch(Instant::now()).await.len(), 10);
    }

    #[tokio::test]
    async fn formatted_numbers_the_items() {
        let (source, _calls) = stub(Ok(vec!["alpha".into(), "beta".into()]));
        let mut cache = NewsCache::new(source, Duration::from_secs(1800), 10);

        let formatted = cache.formatted(Instant::now()).await;
        assert_eq!(formatted, vec!["1. alpha", "2. beta"]);
    }

    #[test]
    fn rss_titles_are_extracted_with_and_without_cdata() {
        let xml = r"<rss><channel>
            <title>Front Page</title>
            <item><title><![CDATA[First story]]></title></item>
            <item><title>Second story</title></item>
            <item><title>  </title></item>
        </channel></rss>";
        assert_eq!(extract_item_titles(xml), vec!["First story", "Second story"]);
    }

    #[tokio::test]
    async fn hacker_news_feed_fetches_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<rss><item><title><![CDATA[Mock headline]]></title></item></rss>",
            ))
            .mount(&server)
            .await;

        let feed = HackerNewsFeed::new(server.uri(), Duration::from_secs(5));
        let items = feed.fetch().await.unwrap();
        assert_eq!(items, vec!["Mock headline"]);
    }

    #[tokio::test]
    async fn hacker_news_feed_propagates_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let feed = HackerNewsFeed::new(server.uri(), Duration::from_secs(5));
        assert!(feed.fetch().await.is_err());
    }
}
