// src/merge.rs
// Consecutive-message merging: organizers often post a poster image and its
// description as two separate messages. Pairing them up front avoids two
// partial extractions of the same announcement.

use crate::types::{ContentKind, RawItem, SyncItem};

/// Merge adjacent image+text pairs from the same sender and channel.
///
/// Items are sorted by `(channel_id, timestamp)` and scanned with a single
/// lookahead. Two adjacent items merge when they share channel and sender,
/// their timestamps are within `window_secs`, and one is a caption-less
/// image while the other is plain text (either order). The text becomes the
/// image's caption and both original ids are carried for idempotency.
///
/// The merged batch comes out newest first, so a run cut short mid-extraction
/// has already covered the most recent announcements.
pub fn merge_consecutive(items: Vec<RawItem>, window_secs: i64) -> Vec<SyncItem> {
    let mut sorted = items;
    sorted.sort_by(|a, b| {
        a.channel_id
            .cmp(&b.channel_id)
            .then(a.timestamp.cmp(&b.timestamp))
    });

    let mut out = Vec::with_capacity(sorted.len());
    let mut i = 0;
    while i < sorted.len() {
        if i + 1 < sorted.len() {
            let cur = &sorted[i];
            let nxt = &sorted[i + 1];
            if let Some(item) = try_merge(cur, nxt, window_secs) {
                out.push(item);
                i += 2;
                continue;
            }
        }
        out.push(SyncItem::Single(sorted[i].clone()));
        i += 1;
    }

    let merged = sorted.len() - out.len();
    if merged > 0 {
        tracing::info!(pairs = merged, "merged consecutive image+text pairs");
    }

    out.sort_by(|x, y| y.raw().timestamp.cmp(&x.raw().timestamp));
    out
}

fn try_merge(cur: &RawItem, nxt: &RawItem, window_secs: i64) -> Option<SyncItem> {
    let adjacent = cur.channel_id == nxt.channel_id
        && cur.sender_id == nxt.sender_id
        && (nxt.timestamp - cur.timestamp).abs() <= window_secs;
    if !adjacent {
        return None;
    }

    let (img, txt) = if cur.is_captionless_image() && nxt.is_plain_text() {
        (cur, nxt)
    } else if cur.is_plain_text() && nxt.is_captionless_image() {
        (nxt, cur)
    } else {
        return None;
    };

    let mut item = img.clone();
    item.kind = ContentKind::ImageWithCaption;
    item.text = txt.text.clone();
    Some(SyncItem::Composite {
        item,
        merged_from: vec![cur.source_id.clone(), nxt.source_id.clone()],
    })
}
