// src/types.rs
// Core data model: raw source items, the merged Single|Composite union,
// extraction output, and the persisted event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which external feed an item came from. Namespaces idempotency keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    ChatMessage,
    FeedPost,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatMessage => "chat-message",
            Self::FeedPost => "feed-post",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    Text,
    Image,
    ImageWithCaption,
}

/// One inbound unit from an external source. Immutable once collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    pub source_type: SourceType,
    /// Unique within `source_type`.
    pub source_id: String,
    /// Group / page identifier.
    pub channel_id: String,
    pub sender_id: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub kind: ContentKind,
    pub text: Option<String>,
    /// Opaque handle for `fetch_media`.
    pub media_ref: Option<String>,
}

impl RawItem {
    /// True for an image item that carries no caption text (merge candidate).
    pub fn is_captionless_image(&self) -> bool {
        self.kind == ContentKind::Image && self.text.as_deref().is_none_or(str::is_empty)
    }

    pub fn is_plain_text(&self) -> bool {
        self.kind == ContentKind::Text
    }
}

/// A processable unit handed to extraction: either a raw item as collected,
/// or an image+text pair merged into one composite announcement.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncItem {
    Single(RawItem),
    Composite {
        item: RawItem,
        /// Original source ids this composite replaces, in scan order.
        merged_from: Vec<String>,
    },
}

impl SyncItem {
    pub fn raw(&self) -> &RawItem {
        match self {
            Self::Single(item) => item,
            Self::Composite { item, .. } => item,
        }
    }

    /// Every source id covered by this item, for idempotency marking.
    pub fn source_ids(&self) -> Vec<&str> {
        match self {
            Self::Single(item) => vec![item.source_id.as_str()],
            Self::Composite { merged_from, .. } => {
                merged_from.iter().map(String::as_str).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Offline,
    Online,
    Hybrid,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Offline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Published,
    Draft,
    Flagged,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PointOfContact {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub whatsapp_number: Option<String>,
}

/// Best-effort structured output from the extraction service.
/// Absent fields deserialize to their defaults; `name` is the only field
/// required for the result to be usable downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionResult {
    pub name: Option<String>,
    pub description: Option<String>,
    /// ISO date (YYYY-MM-DD) or null.
    pub date: Option<String>,
    pub time: Option<String>,
    pub venue: Option<String>,
    pub venue_map_link: Option<String>,
    pub eligibility_raw: Vec<String>,
    pub eligibility_categories: Vec<String>,
    pub hosting_org: Option<String>,
    pub quiz_masters: Vec<String>,
    pub point_of_contact: PointOfContact,
    pub registration_link: Option<String>,
    pub social_link: Option<String>,
    pub team_size: Option<u32>,
    pub cross_college_allowed: Option<bool>,
    pub mode: Option<Mode>,
    pub city: Option<String>,
    /// Self-reported, 0.0..=1.0.
    pub confidence: f32,
    /// Names of fields the service actually populated.
    pub extracted_fields: Vec<String>,
}

/// Persisted event record. Created once by the pipeline; only the external
/// admin surface mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: Uuid,
    pub status: EventStatus,
    pub confidence: f32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub venue: Option<String>,
    pub venue_map_link: Option<String>,
    #[serde(default)]
    pub eligibility_raw: Vec<String>,
    #[serde(default)]
    pub eligibility_categories: Vec<String>,
    pub hosting_org: Option<String>,
    #[serde(default)]
    pub quiz_masters: Vec<String>,
    #[serde(default)]
    pub point_of_contact: PointOfContact,
    pub registration_link: Option<String>,
    pub social_link: Option<String>,
    pub team_size: Option<u32>,
    pub cross_college_allowed: Option<bool>,
    #[serde(default)]
    pub mode: Mode,
    pub city: Option<String>,
    pub source_type: SourceType,
    /// Composite key `sourceType:sourceId`.
    pub source_id: String,
    pub channel_id: String,
    pub poster_image_path: Option<String>,
    pub source_caption: Option<String>,
    pub source_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extracted_fields: Vec<String>,
}

/// Connection status persisted for the operator-facing `/status` route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStatus {
    pub connected: bool,
    pub logged_out: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(id: &str) -> RawItem {
        RawItem {
            source_type: SourceType::ChatMessage,
            source_id: id.to_string(),
            channel_id: "g1".into(),
            sender_id: "s1".into(),
            timestamp: 100,
            kind: ContentKind::Image,
            text: None,
            media_ref: Some("ref".into()),
        }
    }

    #[test]
    fn source_type_keys_are_kebab_case() {
        assert_eq!(SourceType::ChatMessage.as_str(), "chat-message");
        assert_eq!(SourceType::FeedPost.to_string(), "feed-post");
    }

    #[test]
    fn composite_covers_all_merged_ids() {
        let item = SyncItem::Composite {
            item: img("a"),
            merged_from: vec!["a".into(), "b".into()],
        };
        assert_eq!(item.source_ids(), vec!["a", "b"]);
        let single = SyncItem::Single(img("a"));
        assert_eq!(single.source_ids(), vec!["a"]);
    }

    #[test]
    fn extraction_result_tolerates_sparse_json() {
        let r: ExtractionResult =
            serde_json::from_str(r#"{"name":"Open Quiz","confidence":0.9}"#).unwrap();
        assert_eq!(r.name.as_deref(), Some("Open Quiz"));
        assert!(r.date.is_none());
        assert!(r.quiz_masters.is_empty());
        assert!((r.confidence - 0.9).abs() < f32::EPSILON);
    }
}
