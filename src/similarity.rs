// src/similarity.rs
// Fuzzy duplicate detection: Dice bigram coefficient over normalized names,
// gated by exact date and an advisory city match.

use crate::types::EventRecord;
use std::collections::HashMap;

/// Lowercase and strip everything that is not ASCII alphanumeric.
fn normalize(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Dice bigram coefficient between two strings, 0.0..=1.0.
/// Identical normalized forms score 1.0; strings shorter than one bigram
/// after normalization score 0.0.
pub fn similarity(a: &str, b: &str) -> f32 {
    let a = normalize(a);
    let b = normalize(b);

    if a == b {
        return 1.0;
    }
    if a.chars().count() < 2 || b.chars().count() < 2 {
        return 0.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    // Bigram multiset of `a`, then consume matches while walking `b`.
    let mut a_bigrams: HashMap<(char, char), u32> = HashMap::new();
    for w in a_chars.windows(2) {
        *a_bigrams.entry((w[0], w[1])).or_insert(0) += 1;
    }

    let mut intersection = 0u32;
    for w in b_chars.windows(2) {
        if let Some(count) = a_bigrams.get_mut(&(w[0], w[1])) {
            if *count > 0 {
                *count -= 1;
                intersection += 1;
            }
        }
    }

    (2 * intersection) as f32 / (a_chars.len() - 1 + b_chars.len() - 1) as f32
}

/// Scan existing records for a near-duplicate of an extracted announcement.
///
/// A candidate must match the extracted date exactly and score at least
/// `threshold` on name similarity. The city gate is advisory: a record with
/// no city set is never excluded. First match wins, in store order.
pub fn find_similar<'a>(
    records: &'a [EventRecord],
    name: &str,
    date: Option<&str>,
    city: Option<&str>,
    threshold: f32,
) -> Option<&'a EventRecord> {
    let date = date?;
    records.iter().find(|rec| {
        let city_ok = match rec.city.as_deref() {
            None => true,
            Some(c) => Some(c) == city,
        };
        city_ok
            && rec.date.as_deref() == Some(date)
            && similarity(name, &rec.name) >= threshold
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventStatus, Mode, PointOfContact, SourceType};
    use chrono::Utc;
    use uuid::Uuid;

    fn record(name: &str, date: Option<&str>, city: Option<&str>) -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            status: EventStatus::Published,
            confidence: 0.9,
            name: name.to_string(),
            description: String::new(),
            date: date.map(str::to_string),
            time: None,
            venue: None,
            venue_map_link: None,
            eligibility_raw: vec![],
            eligibility_categories: vec![],
            hosting_org: None,
            quiz_masters: vec![],
            point_of_contact: PointOfContact::default(),
            registration_link: None,
            social_link: None,
            team_size: None,
            cross_college_allowed: None,
            mode: Mode::Offline,
            city: city.map(str::to_string),
            source_type: SourceType::ChatMessage,
            source_id: "chat-message:x".into(),
            channel_id: "g1".into(),
            poster_image_path: None,
            source_caption: None,
            source_timestamp: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            extracted_fields: vec![],
        }
    }

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(similarity("Delhi Quiz Night", "Delhi Quiz Night"), 1.0);
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        assert_eq!(similarity("Delhi Quiz Night", "delhi quiz night!!"), 1.0);
    }

    #[test]
    fn symmetric() {
        let a = "Annual Quiz 2024";
        let b = "Annual Quiz 2025";
        assert_eq!(similarity(a, b), similarity(b, a));
    }

    #[test]
    fn short_strings_score_zero() {
        assert_eq!(similarity("", "x"), 0.0);
        assert_eq!(similarity("a", "ab"), 0.0);
    }

    #[test]
    fn near_duplicate_names_score_high() {
        let s = similarity("Annual Quiz 2024", "Annual Quiz 2025");
        assert!(s > 0.8, "got {s}");
        assert!(s < 1.0);
    }

    #[test]
    fn find_similar_requires_exact_date() {
        let records = vec![record("Annual Quiz 2024", Some("2024-12-12"), None)];
        let hit = find_similar(&records, "Annual Quiz 2025", Some("2024-12-12"), None, 0.75);
        assert!(hit.is_some());
        let miss = find_similar(&records, "Annual Quiz 2025", Some("2024-12-13"), None, 0.75);
        assert!(miss.is_none());
    }

    #[test]
    fn find_similar_without_date_never_matches() {
        let records = vec![record("Open Quiz", Some("2024-12-12"), None)];
        assert!(find_similar(&records, "Open Quiz", None, None, 0.75).is_none());
    }

    #[test]
    fn city_gate_is_advisory() {
        let records = vec![
            record("Open Quiz", Some("2024-12-12"), Some("Mumbai")),
            record("Open Quiz", Some("2024-12-12"), None),
        ];
        // Mumbai record is excluded for a Delhi item; the city-less one matches.
        let hit = find_similar(&records, "Open Quiz", Some("2024-12-12"), Some("Delhi"), 0.75)
            .expect("city-less record should match");
        assert!(hit.city.is_none());
    }
}
