// src/collector.rs
// Collection / quiescence controller. One sync run walks
// Connecting -> Syncing -> Draining -> Done | Failed: open the session,
// request backlog for every configured channel, then wait until the backlog
// signals completion or no new item has arrived for a quiet period
// (the history protocol gives no reliable "done" signal in all cases).

use crate::config::ChannelConfig;
use crate::error::SyncError;
use crate::session::{DisconnectReason, SessionClient, SessionEvent};
use crate::types::RawItem;
use metrics::counter;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// Deduplicated items for one configured channel, newest first.
#[derive(Debug, Clone)]
pub struct ChannelBatch {
    pub channel: ChannelConfig,
    pub items: Vec<RawItem>,
}

pub struct Collector<'a, C: SessionClient> {
    client: &'a mut C,
    channels: &'a [ChannelConfig],
    quiet_period: Duration,
    drain_deadline: Duration,
    connect_timeout: Duration,
    max_restart_attempts: u32,
    since_ts: i64,
    on_open: Option<Box<dyn Fn() + Send + 'a>>,
}

enum Outcome {
    Done(HashMap<String, RawItem>),
    /// Normal mid-handshake artifact; rerun the whole controller.
    Restart,
}

impl<'a, C: SessionClient> Collector<'a, C> {
    pub fn new(
        client: &'a mut C,
        channels: &'a [ChannelConfig],
        quiet_period: Duration,
        drain_deadline: Duration,
        connect_timeout: Duration,
        max_restart_attempts: u32,
        since_ts: i64,
    ) -> Self {
        Self {
            client,
            channels,
            quiet_period,
            drain_deadline,
            connect_timeout,
            max_restart_attempts,
            since_ts,
            on_open: None,
        }
    }

    /// Invoked each time the session reaches the open state, before backlog
    /// is requested. Lets the caller surface a live connection.
    pub fn with_open_hook(mut self, hook: impl Fn() + Send + 'a) -> Self {
        self.on_open = Some(Box::new(hook));
        self
    }

    /// Run the controller to completion, restarting silently (bounded) on a
    /// restart-required disconnect. The session is closed before returning,
    /// success or not.
    pub async fn collect(mut self) -> Result<Vec<ChannelBatch>, SyncError> {
        let mut attempt = 0u32;
        loop {
            let outcome = self.run_once().await;
            self.client.close().await;
            match outcome {
                Ok(Outcome::Done(collected)) => return Ok(self.into_batches(collected)),
                Ok(Outcome::Restart) => {
                    attempt += 1;
                    if attempt > self.max_restart_attempts {
                        return Err(SyncError::RestartExhausted { attempts: attempt });
                    }
                    tracing::info!(attempt, "restart required; reconnecting");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_once(&mut self) -> Result<Outcome, SyncError> {
        let mut rx = self.client.connect().await?;

        let poll = (self.quiet_period / 4).clamp(Duration::from_millis(20), Duration::from_secs(2));
        let connect_deadline = Instant::now() + self.connect_timeout;

        let mut open = false;
        let mut backlog_complete = false;
        let mut collected: HashMap<String, RawItem> = HashMap::new();
        let mut last_arrival = Instant::now();
        let mut drain_start = Instant::now();

        loop {
            match timeout(poll, rx.recv()).await {
                // Poll tick with no event; deadline checks below decide.
                Err(_) => {}
                // Event stream ended without a disconnect event.
                Ok(None) => {
                    if open {
                        tracing::warn!("session stream ended mid-sync; keeping collected items");
                        break;
                    }
                    return Err(SyncError::ConnectionFailed { code: 0 });
                }
                Ok(Some(event)) => match event {
                    SessionEvent::LinkingChallenge(payload) => {
                        // Pass-through for the operator; not reinterpreted.
                        tracing::info!(challenge = %payload, "linking challenge received");
                    }
                    SessionEvent::Connected => {
                        open = true;
                        if let Some(hook) = &self.on_open {
                            hook();
                        }
                        tracing::info!(channels = self.channels.len(), "session open; requesting backlog");
                        for ch in self.channels {
                            if let Err(e) =
                                self.client.request_backlog(&ch.id, self.since_ts).await
                            {
                                tracing::warn!(channel = %ch.id, error = ?e, "backlog request failed");
                            }
                        }
                        last_arrival = Instant::now();
                        drain_start = Instant::now();
                    }
                    SessionEvent::Item(item) => {
                        if self.accept(&mut collected, item) {
                            last_arrival = Instant::now();
                        }
                    }
                    SessionEvent::Backlog {
                        items,
                        is_last,
                        progress,
                    } => {
                        let total = items.len();
                        let mut relevant = 0usize;
                        for item in items {
                            if self.accept(&mut collected, item) {
                                relevant += 1;
                            }
                        }
                        if relevant > 0 {
                            last_arrival = Instant::now();
                        }
                        tracing::info!(
                            total,
                            relevant,
                            progress = progress.map(i64::from).unwrap_or(-1),
                            "backlog batch"
                        );
                        if is_last {
                            backlog_complete = true;
                        }
                    }
                    SessionEvent::Disconnected(reason) => match reason {
                        DisconnectReason::LoggedOut => return Err(SyncError::SessionInvalid),
                        DisconnectReason::RestartRequired => return Ok(Outcome::Restart),
                        DisconnectReason::Other(code) => {
                            if open {
                                tracing::warn!(code, "session closed mid-sync; keeping collected items");
                                break;
                            }
                            return Err(SyncError::ConnectionFailed { code });
                        }
                    },
                },
            }

            if !open {
                if Instant::now() >= connect_deadline {
                    return Err(SyncError::ConnectTimeout);
                }
                continue;
            }

            // Draining: backlog completion, quiescence, or the absolute cap,
            // whichever comes first.
            if backlog_complete
                || last_arrival.elapsed() >= self.quiet_period
                || drain_start.elapsed() >= self.drain_deadline
            {
                break;
            }
        }

        counter!("sync_items_collected_total").increment(collected.len() as u64);
        tracing::info!(items = collected.len(), "collection finished");
        Ok(Outcome::Done(collected))
    }

    /// Keep only items for configured channels, first sighting wins.
    fn accept(&self, collected: &mut HashMap<String, RawItem>, item: RawItem) -> bool {
        if !self.channels.iter().any(|c| c.id == item.channel_id) {
            return false;
        }
        if collected.contains_key(&item.source_id) {
            return false;
        }
        collected.insert(item.source_id.clone(), item);
        true
    }

    /// Group per configured channel, newest first, so that an interrupted
    /// extraction run has already covered the most recent items.
    fn into_batches(&self, collected: HashMap<String, RawItem>) -> Vec<ChannelBatch> {
        let mut items: Vec<RawItem> = collected.into_values().collect();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        self.channels
            .iter()
            .filter_map(|ch| {
                let batch: Vec<RawItem> = items
                    .iter()
                    .filter(|i| i.channel_id == ch.id)
                    .cloned()
                    .collect();
                if batch.is_empty() {
                    None
                } else {
                    Some(ChannelBatch {
                        channel: ch.clone(),
                        items: batch,
                    })
                }
            })
            .collect()
    }
}
