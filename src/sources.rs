// src/sources.rs
// The two external sources behind one trait: the chat network (session
// client + collection controller) and the feed scraper (out-of-process
// command emitting JSON posts). Once normalized to RawItems they flow
// through the same merge/extraction pipeline.

use crate::collector::{ChannelBatch, Collector};
use crate::config::{ChannelConfig, SyncConfig};
use crate::error::SyncError;
use crate::session::SessionClient;
use crate::store::EventStore;
use crate::types::{ContentKind, RawItem, SessionStatus, SourceType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Fetches the binary payload behind an item's media handle.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch_media(&self, item: &RawItem) -> Result<Vec<u8>>;
}

/// One configured external source: collects a deduplicated batch per channel
/// and serves media for its own items during extraction.
#[async_trait]
pub trait ItemSource: MediaFetcher + Send {
    fn source_type(&self) -> SourceType;
    /// Collect a batch per channel. `since_ts` is the unix second of the
    /// last completed run (0 for a first run); sources with a replayable
    /// history resume from it.
    async fn collect(&mut self, since_ts: i64) -> Result<Vec<ChannelBatch>, SyncError>;
    async fn close(&mut self);
}

// ------------------------------------------------------------
// Chat network source
// ------------------------------------------------------------

pub struct ChatSource<C: SessionClient> {
    client: C,
    channels: Vec<ChannelConfig>,
    quiet_period: Duration,
    drain_deadline: Duration,
    connect_timeout: Duration,
    max_restart_attempts: u32,
    store: Arc<dyn EventStore>,
}

impl<C: SessionClient> ChatSource<C> {
    pub fn new(client: C, config: &SyncConfig, store: Arc<dyn EventStore>) -> Self {
        Self {
            client,
            channels: config.channels.clone(),
            quiet_period: config.quiet_period(),
            drain_deadline: config.drain_deadline(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            max_restart_attempts: config.max_restart_attempts,
            store,
        }
    }

    fn persist_status(&self, status: SessionStatus) {
        persist_status(self.store.as_ref(), status);
    }
}

fn persist_status(store: &dyn EventStore, status: SessionStatus) {
    if let Err(e) = store.save_session_status(&status) {
        tracing::warn!(error = ?e, "failed to persist session status");
    }
}

#[async_trait]
impl<C: SessionClient + Sync> MediaFetcher for ChatSource<C> {
    async fn fetch_media(&self, item: &RawItem) -> Result<Vec<u8>> {
        let media_ref = item
            .media_ref
            .as_deref()
            .context("item has no media handle")?;
        self.client.fetch_media(media_ref).await
    }
}

#[async_trait]
impl<C: SessionClient + Sync> ItemSource for ChatSource<C> {
    fn source_type(&self) -> SourceType {
        SourceType::ChatMessage
    }

    async fn collect(&mut self, since_ts: i64) -> Result<Vec<ChannelBatch>, SyncError> {
        let store = self.store.clone();
        let collector = Collector::new(
            &mut self.client,
            &self.channels,
            self.quiet_period,
            self.drain_deadline,
            self.connect_timeout,
            self.max_restart_attempts,
            since_ts,
        )
        .with_open_hook(move || {
            persist_status(
                store.as_ref(),
                SessionStatus {
                    connected: true,
                    logged_out: false,
                    last_sync: None,
                    error: None,
                },
            );
        });
        match collector.collect().await {
            Ok(batches) => {
                self.persist_status(SessionStatus {
                    connected: false,
                    logged_out: false,
                    last_sync: Some(Utc::now()),
                    error: None,
                });
                Ok(batches)
            }
            Err(e) => {
                self.persist_status(SessionStatus {
                    connected: false,
                    logged_out: e.is_session_invalid(),
                    last_sync: None,
                    error: Some(e.to_string()),
                });
                Err(e)
            }
        }
    }

    async fn close(&mut self) {
        self.client.close().await;
    }
}

// ------------------------------------------------------------
// Feed scraper source
// ------------------------------------------------------------

/// One post as emitted by the scraper process.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPost {
    pub post_id: String,
    pub username: String,
    #[serde(default)]
    pub caption: Option<String>,
    /// File name under the store's poster directory, written by the scraper.
    #[serde(default)]
    pub image_file: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScrapeOutput {
    pub posts: Vec<FeedPost>,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait FeedScraper: Send + Sync {
    async fn fetch_posts(&self) -> Result<ScrapeOutput>;
}

/// Runs the configured scraper command and parses its stdout as JSON.
pub struct CommandFeedScraper {
    command: String,
    timeout: Duration,
}

impl CommandFeedScraper {
    pub fn new(command: String) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(600),
        }
    }
}

#[async_trait]
impl FeedScraper for CommandFeedScraper {
    async fn fetch_posts(&self) -> Result<ScrapeOutput> {
        tracing::info!(command = %self.command, "running feed scraper");
        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&self.command)
                .output(),
        )
        .await
        .context("feed scraper timed out")?
        .context("spawning feed scraper")?;

        if !output.status.success() {
            anyhow::bail!("feed scraper exited with {}", output.status);
        }
        serde_json::from_slice(&output.stdout).context("parsing feed scraper output")
    }
}

pub struct FeedSource {
    scraper: Box<dyn FeedScraper>,
    pages: Vec<ChannelConfig>,
    posters_dir: PathBuf,
}

impl FeedSource {
    pub fn new(scraper: Box<dyn FeedScraper>, config: &SyncConfig) -> Self {
        Self {
            scraper,
            pages: config.feed_pages.clone(),
            posters_dir: config.data_dir.join("posters"),
        }
    }

    fn channel_for(&self, username: &str) -> ChannelConfig {
        self.pages
            .iter()
            .find(|p| p.id == username)
            .cloned()
            .unwrap_or_else(|| ChannelConfig {
                id: username.to_string(),
                city: None,
            })
    }
}

fn normalize_post(post: FeedPost) -> RawItem {
    let kind = match (&post.caption, &post.image_file) {
        (Some(c), Some(_)) if !c.trim().is_empty() => ContentKind::ImageWithCaption,
        (_, Some(_)) => ContentKind::Image,
        _ => ContentKind::Text,
    };
    RawItem {
        source_type: SourceType::FeedPost,
        source_id: post.post_id,
        channel_id: post.username.clone(),
        sender_id: post.username,
        timestamp: post.timestamp.unwrap_or_else(Utc::now).timestamp(),
        kind,
        text: post.caption.filter(|c| !c.trim().is_empty()),
        media_ref: post.image_file,
    }
}

#[async_trait]
impl MediaFetcher for FeedSource {
    async fn fetch_media(&self, item: &RawItem) -> Result<Vec<u8>> {
        let file = item
            .media_ref
            .as_deref()
            .context("post has no image file")?;
        let path = self.posters_dir.join(file);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading scraped image {}", path.display()))
    }
}

#[async_trait]
impl ItemSource for FeedSource {
    fn source_type(&self) -> SourceType {
        SourceType::FeedPost
    }

    // The scraper command re-fetches the pages' recent posts wholesale; the
    // idempotency ledger drops anything already processed.
    async fn collect(&mut self, _since_ts: i64) -> Result<Vec<ChannelBatch>, SyncError> {
        let output = self
            .scraper
            .fetch_posts()
            .await
            .context("feed scraper failed")?;

        for err in &output.errors {
            tracing::warn!(error = %err, "feed scraper reported an error");
        }
        tracing::info!(posts = output.posts.len(), "feed posts fetched");

        // Dedup by post id, then group per page, newest first.
        let mut by_id: HashMap<String, RawItem> = HashMap::new();
        for post in output.posts {
            let item = normalize_post(post);
            by_id.entry(item.source_id.clone()).or_insert(item);
        }
        let mut items: Vec<RawItem> = by_id.into_values().collect();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let mut batches: Vec<ChannelBatch> = Vec::new();
        for item in items {
            match batches.iter_mut().find(|b| b.channel.id == item.channel_id) {
                Some(batch) => batch.items.push(item),
                None => batches.push(ChannelBatch {
                    channel: self.channel_for(&item.channel_id),
                    items: vec![item],
                }),
            }
        }
        Ok(batches)
    }

    async fn close(&mut self) {}
}
