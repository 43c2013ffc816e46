// src/pipeline.rs
// Extraction orchestrator: for each merged item not yet in the ledger,
// derive caption/media, call the extraction service, run fuzzy dedup, and
// persist a confidence-gated record. Failures are contained per item; the
// run always returns whatever succeeded.

use crate::config::ChannelConfig;
use crate::extractor::Extractor;
use crate::ledger::IdempotencyLedger;
use crate::similarity::find_similar;
use crate::sources::MediaFetcher;
use crate::store::EventStore;
use crate::types::{
    ContentKind, EventRecord, EventStatus, ExtractionResult, Mode, SourceType, SyncItem,
};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use uuid::Uuid;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_records_new_total", "New event records persisted.");
        describe_counter!(
            "sync_items_skipped_total",
            "Items skipped as already processed, empty, or duplicate."
        );
        describe_counter!(
            "sync_extraction_errors_total",
            "Extraction service or parse failures (item marked processed)."
        );
        describe_counter!("sync_store_errors_total", "Store failures fatal to one item.");
    });
}

pub struct Pipeline<'a> {
    store: &'a dyn EventStore,
    extractor: &'a dyn Extractor,
    ledger: &'a mut IdempotencyLedger,
    confidence_threshold: f32,
    similarity_threshold: f32,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a dyn EventStore,
        extractor: &'a dyn Extractor,
        ledger: &'a mut IdempotencyLedger,
        confidence_threshold: f32,
        similarity_threshold: f32,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            extractor,
            ledger,
            confidence_threshold,
            similarity_threshold,
        }
    }

    /// Process one channel's merged batch sequentially (extraction is rate
    /// limited upstream, and later items must see earlier ones persisted for
    /// dedup). Returns the records created for this batch.
    pub async fn process_channel(
        &mut self,
        fetcher: &dyn MediaFetcher,
        channel: &ChannelConfig,
        items: Vec<SyncItem>,
    ) -> Vec<EventRecord> {
        let mut created = Vec::new();
        tracing::info!(
            channel = %channel.id,
            city = channel.city.as_deref().unwrap_or("-"),
            items = items.len(),
            "processing channel batch"
        );
        for item in items {
            match self.process_item(fetcher, channel, &item).await {
                Some(record) => {
                    tracing::info!(name = %record.name, status = ?record.status, "new record");
                    counter!("sync_records_new_total").increment(1);
                    created.push(record);
                }
                None => {
                    counter!("sync_items_skipped_total").increment(1);
                }
            }
        }
        created
    }

    async fn process_item(
        &mut self,
        fetcher: &dyn MediaFetcher,
        channel: &ChannelConfig,
        item: &SyncItem,
    ) -> Option<EventRecord> {
        let raw = item.raw();
        let source_type = raw.source_type;
        let ids = item.source_ids();

        if ids
            .iter()
            .all(|id| self.ledger.is_processed(source_type, id))
        {
            return None;
        }

        // 1) Caption and/or media. A media-fetch failure never aborts the
        // item; extraction proceeds with caption only.
        let caption = raw.text.as_deref().filter(|t| !t.trim().is_empty());
        let media = match raw.kind {
            ContentKind::Text => None,
            ContentKind::Image | ContentKind::ImageWithCaption => {
                match fetcher.fetch_media(raw).await {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        tracing::warn!(id = %raw.source_id, error = ?e, "media fetch failed; continuing with caption only");
                        None
                    }
                }
            }
        };
        if caption.is_none() && media.is_none() {
            self.mark_all(source_type, &ids);
            return None;
        }

        tracing::info!(
            id = %raw.source_id,
            caption = caption.map(|c| c.chars().take(80).collect::<String>()).unwrap_or_default(),
            has_image = media.is_some(),
            "extracting"
        );

        // 2) Extraction failures are per-item, not fatal to the run. The
        // item is marked processed to avoid retry storms on permanently
        // broken inputs.
        let extracted = match self.extractor.extract(caption, media.as_deref()).await {
            Ok(Some(result)) => result,
            Ok(None) => {
                self.mark_all(source_type, &ids);
                return None;
            }
            Err(e) => {
                tracing::warn!(id = %raw.source_id, error = ?e, "extraction failed");
                counter!("sync_extraction_errors_total").increment(1);
                self.mark_all(source_type, &ids);
                return None;
            }
        };

        // 3) No name means insufficient signal.
        let Some(name) = extracted
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
        else {
            self.mark_all(source_type, &ids);
            return None;
        };

        // 4) City: explicit extraction wins, then the online override, then
        // the channel's configured default.
        let city = resolve_city(&extracted, channel);

        // 5) Fuzzy dedup against everything already persisted, including
        // records created earlier in this same run.
        let existing = match self.store.list_records() {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(id = %raw.source_id, error = ?e, "store read failed; leaving item for a later run");
                counter!("sync_store_errors_total").increment(1);
                return None;
            }
        };
        if let Some(similar) = find_similar(
            &existing,
            &name,
            extracted.date.as_deref(),
            city.as_deref(),
            self.similarity_threshold,
        ) {
            tracing::info!(name = %name, existing = %similar.name, "skipping near-duplicate");
            self.mark_all(source_type, &ids);
            return None;
        }

        // 6) Persist. A poster-write failure downgrades to a record without
        // a poster; a record-write failure leaves the item unmarked so a
        // later run can retry it.
        let poster_image_path = match media {
            Some(bytes) => match self.store.save_poster(&bytes) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(id = %raw.source_id, error = ?e, "poster write failed; keeping record without poster");
                    None
                }
            },
            None => None,
        };

        let now = Utc::now();
        let status = if extracted.confidence >= self.confidence_threshold {
            EventStatus::Published
        } else {
            EventStatus::Flagged
        };
        let record = EventRecord {
            id: Uuid::new_v4(),
            status,
            confidence: extracted.confidence,
            name,
            description: extracted.description.clone().unwrap_or_default(),
            date: extracted.date.clone(),
            time: extracted.time.clone(),
            venue: extracted.venue.clone(),
            venue_map_link: extracted.venue_map_link.clone(),
            eligibility_raw: extracted.eligibility_raw.clone(),
            eligibility_categories: extracted.eligibility_categories.clone(),
            hosting_org: extracted.hosting_org.clone(),
            quiz_masters: extracted.quiz_masters.clone(),
            point_of_contact: extracted.point_of_contact.clone(),
            registration_link: extracted.registration_link.clone(),
            social_link: extracted.social_link.clone(),
            team_size: extracted.team_size,
            cross_college_allowed: extracted.cross_college_allowed,
            mode: extracted.mode.unwrap_or_default(),
            city,
            source_type,
            source_id: format!("{}:{}", source_type, raw.source_id),
            channel_id: raw.channel_id.clone(),
            poster_image_path,
            source_caption: caption.map(str::to_string),
            source_timestamp: DateTime::from_timestamp(raw.timestamp, 0).unwrap_or(now),
            created_at: now,
            updated_at: now,
            extracted_fields: extracted.extracted_fields.clone(),
        };

        if let Err(e) = self.store.add_record(&record) {
            tracing::error!(id = %raw.source_id, error = ?e, "store write failed");
            counter!("sync_store_errors_total").increment(1);
            return None;
        }
        self.mark_all(source_type, &ids);
        Some(record)
    }

    /// Mark every covered source id processed and persist the ledger, so a
    /// merged pair's two original ids are both covered.
    fn mark_all(&mut self, source_type: SourceType, ids: &[&str]) {
        for id in ids {
            self.ledger.mark_processed(source_type, id);
        }
        if let Err(e) = self.store.save_ledger(self.ledger) {
            tracing::warn!(error = ?e, "failed to persist idempotency ledger");
        }
    }
}

fn resolve_city(extracted: &ExtractionResult, channel: &ChannelConfig) -> Option<String> {
    if let Some(city) = extracted.city.clone().filter(|c| !c.trim().is_empty()) {
        return Some(city);
    }
    if extracted.mode == Some(Mode::Online) {
        return Some("Online".to_string());
    }
    channel.city.clone()
}
