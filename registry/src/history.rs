//! Per-test bucket history reconciliation.
//!
//! Every test carries a `metaInfo` map from an opaque slot key to the
//! transition record of one tag. Slots are created lazily on the first
//! bucket change and mutated in place afterwards; they are never deleted,
//! so the map doubles as an audit trail.

use crate::metrics_defs::{HISTORY_SLOTS_RECONCILED, HISTORY_SLOTS_SEEDED, HISTORY_TAGS_DROPPED};
use crate::tags::TagDiff;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Insertion-ordered so slot scans are deterministic across saves.
pub type MetaInfo = IndexMap<String, MetaRecord>;

/// Transition history of a single tag slot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetaRecord {
    /// The tag currently occupying this slot. Null only on legacy slots
    /// whose tag was removed without a replacement.
    pub current_bucket: Option<String>,
    /// The tag this slot held before the last update; empty for seeded
    /// slots that never had a prior value.
    pub last_known_bucket: String,
    pub bucket_updated_at: DateTime<Utc>,
}

/// Finds the slot whose `currentBucket` equals `tag`.
///
/// Scans in insertion order and returns the first match together with its
/// key, or `None` when no slot matches or the map is empty.
pub fn slot_for_tag<'a>(meta: &'a MetaInfo, tag: &str) -> Option<(&'a str, &'a MetaRecord)> {
    meta.iter()
        .find(|(_, record)| record.current_bucket.as_deref() == Some(tag))
        .map(|(key, record)| (key.as_str(), record))
}

/// Generates a fresh slot key. Keys are opaque to callers; the only
/// requirement is that they never collide with existing slots.
pub fn new_slot_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Folds a tag diff into the history map, pairing `old_tags[i]` with
/// `new_tags[i]` by index.
///
/// The slot previously holding `old_tags[i]` is reused when one exists;
/// otherwise a fresh slot is created. When more tags were removed than
/// added, the unmatched removals are dropped from this pass without a
/// history entry. That truncation is long-standing observable behavior;
/// callers depend on it, so it stays.
pub fn apply_diff(meta: &mut MetaInfo, diff: &TagDiff, now: DateTime<Utc>) -> usize {
    let pairs = diff.old_tags.len().min(diff.new_tags.len());

    for (old_tag, new_tag) in diff.old_tags.iter().zip(diff.new_tags.iter()) {
        let key = match slot_for_tag(meta, old_tag) {
            Some((key, _)) => key.to_owned(),
            None => new_slot_key(),
        };
        meta.insert(
            key,
            MetaRecord {
                current_bucket: Some(new_tag.clone()),
                last_known_bucket: old_tag.clone(),
                bucket_updated_at: now,
            },
        );
    }

    let dropped = diff.old_tags.len() - pairs;
    if dropped > 0 {
        tracing::debug!(dropped, "unmatched removed tags kept no history slot");
        metrics::counter!(HISTORY_TAGS_DROPPED.name).increment(dropped as u64);
    }
    metrics::counter!(HISTORY_SLOTS_RECONCILED.name).increment(pairs as u64);

    pairs
}

/// Seeds one slot per tag with no prior value. Used at record creation for
/// tags following the `_new]` suffix convention.
pub fn seed_new_tags(meta: &mut MetaInfo, tags: &[String], now: DateTime<Utc>) -> usize {
    for tag in tags {
        meta.insert(
            new_slot_key(),
            MetaRecord {
                current_bucket: Some(tag.clone()),
                last_known_bucket: String::new(),
                bucket_updated_at: now,
            },
        );
    }
    metrics::counter!(HISTORY_SLOTS_SEEDED.name).increment(tags.len() as u64);
    tags.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags;

    fn record(current: Option<&str>, last_known: &str) -> MetaRecord {
        MetaRecord {
            current_bucket: current.map(str::to_owned),
            last_known_bucket: last_known.to_owned(),
            bucket_updated_at: Utc::now(),
        }
    }

    #[test]
    fn slot_lookup_matches_current_bucket() {
        let mut meta = MetaInfo::new();
        // A legacy slot whose tag was fully removed must not match anything.
        meta.insert(
            "59f26864274f9a0800049b40".into(),
            record(None, "[dt_safari_regression_tut]"),
        );
        meta.insert(
            "5919ef2665e0720600adea3e".into(),
            record(Some("[dt_chrome_regression_new]"), "[dt_chrome_regression_tut]"),
        );

        let (key, found) = slot_for_tag(&meta, "[dt_chrome_regression_new]").expect("slot");
        assert_eq!(key, "5919ef2665e0720600adea3e");
        assert_eq!(found.last_known_bucket, "[dt_chrome_regression_tut]");

        assert!(slot_for_tag(&meta, "[missing]").is_none());
        assert!(slot_for_tag(&MetaInfo::new(), "[anything]").is_none());
    }

    #[test]
    fn slot_keys_are_unique() {
        let a = new_slot_key();
        let b = new_slot_key();
        assert_ne!(a, b);
    }

    #[test]
    fn diff_creates_slot_when_none_matches() {
        let mut meta = MetaInfo::new();
        let diff = tags::difference(
            &["[dt_chrome_regression]".to_owned()],
            &["[dt_chrome_regression_tut]".to_owned()],
        );
        let now = Utc::now();

        assert_eq!(apply_diff(&mut meta, &diff, now), 1);
        assert_eq!(meta.len(), 1);
        let slot = meta.values().next().expect("one slot");
        assert_eq!(slot.current_bucket.as_deref(), Some("[dt_chrome_regression_tut]"));
        assert_eq!(slot.last_known_bucket, "[dt_chrome_regression]");
        assert_eq!(slot.bucket_updated_at, now);
    }

    #[test]
    fn diff_reuses_slot_across_consecutive_moves() {
        let mut meta = MetaInfo::new();
        let now = Utc::now();

        apply_diff(
            &mut meta,
            &tags::difference(&["[a]".to_owned()], &["[b]".to_owned()]),
            now,
        );
        let key = meta.keys().next().expect("slot key").clone();

        apply_diff(
            &mut meta,
            &tags::difference(&["[b]".to_owned()], &["[c]".to_owned()]),
            now,
        );

        assert_eq!(meta.len(), 1);
        let slot = &meta[&key];
        assert_eq!(slot.current_bucket.as_deref(), Some("[c]"));
        assert_eq!(slot.last_known_bucket, "[b]");
    }

    // More tags removed than added: only the first min(old, new) pairs are
    // reconciled and the rest silently keep no slot. Preserved behavior,
    // not something to "fix" here.
    #[test]
    fn more_removed_than_added_truncates_to_shorter_side() {
        let mut meta = MetaInfo::new();
        let diff = tags::difference(
            &["[a]".to_owned(), "[b]".to_owned(), "[c]".to_owned()],
            &["[x]".to_owned()],
        );

        assert_eq!(apply_diff(&mut meta, &diff, Utc::now()), 1);
        assert_eq!(meta.len(), 1);
        let slot = meta.values().next().expect("one slot");
        assert_eq!(slot.last_known_bucket, "[a]");
        assert_eq!(slot.current_bucket.as_deref(), Some("[x]"));
    }

    #[test]
    fn more_added_than_removed_leaves_extra_additions_unslotted() {
        let mut meta = MetaInfo::new();
        let diff = tags::difference(
            &["[a]".to_owned()],
            &["[x]".to_owned(), "[y]".to_owned()],
        );

        assert_eq!(apply_diff(&mut meta, &diff, Utc::now()), 1);
        assert_eq!(meta.len(), 1);
        assert!(slot_for_tag(&meta, "[y]").is_none());
    }

    #[test]
    fn seeding_creates_slots_without_prior_value() {
        let mut meta = MetaInfo::new();
        let now = Utc::now();
        let seeded = seed_new_tags(&mut meta, &["[a_new]".to_owned(), "[b_new]".to_owned()], now);

        assert_eq!(seeded, 2);
        assert_eq!(meta.len(), 2);
        for slot in meta.values() {
            assert_eq!(slot.last_known_bucket, "");
            assert_eq!(slot.bucket_updated_at, now);
        }
        assert!(slot_for_tag(&meta, "[a_new]").is_some());
    }
}
