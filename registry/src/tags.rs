//! Bucket tag parsing and diffing.
//!
//! A bucket value is either a raw string containing zero or more bracketed
//! tokens (`"[dt_chrome_regression] [dt_ie_regression]"`) or an explicit
//! list of tag strings. These helpers never fail on malformed input; they
//! return empty sequences instead.

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Tags carrying this suffix at record creation get a seeded history slot
/// even though there is no prior bucket value.
pub const NEW_TAG_SUFFIX: &str = "_new]";

// No nested brackets; greedy to the next closing bracket.
static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]").expect("tag pattern is valid"));

/// The two sides of a bucket change: tags that disappeared and tags that
/// showed up. The lists are not guaranteed to be the same length.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagDiff {
    pub old_tags: Vec<String>,
    pub new_tags: Vec<String>,
}

/// Extracts the ordered tag list from an arbitrary JSON value.
///
/// Arrays pass through as-is (non-string entries are skipped), strings are
/// scanned for bracketed tokens, and any other type yields an empty list.
pub fn extract_tags(input: &Value) -> Vec<String> {
    match input {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_owned))
            .collect(),
        Value::String(text) => bracketed_tags(text),
        _ => Vec::new(),
    }
}

/// All non-overlapping bracketed tokens in `text`, left to right.
pub fn bracketed_tags(text: &str) -> Vec<String> {
    TAG_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_owned())
        .collect()
}

/// Subsequence of `tags` ending with `suffix`, order preserved.
pub fn filter_tags(tags: &[String], suffix: &str) -> Vec<String> {
    tags.iter()
        .filter(|tag| tag.ends_with(suffix))
        .cloned()
        .collect()
}

/// Computes the symmetric tag difference between two bucket inputs.
///
/// Tags present on both sides are unchanged and appear in neither output
/// list. Multiplicity is ignored; output order is the order of first
/// appearance on the owning side.
pub fn get_difference(old_bucket: &Value, new_bucket: &Value) -> TagDiff {
    difference(&extract_tags(old_bucket), &extract_tags(new_bucket))
}

/// Same as [`get_difference`], on already-extracted tag lists.
pub fn difference(old_tags: &[String], new_tags: &[String]) -> TagDiff {
    TagDiff {
        old_tags: subtract(old_tags, new_tags),
        new_tags: subtract(new_tags, old_tags),
    }
}

fn subtract(from: &[String], other: &[String]) -> Vec<String> {
    let exclude: HashSet<&str> = other.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    from.iter()
        .filter(|tag| !exclude.contains(tag.as_str()) && seen.insert(tag.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|t| (*t).to_owned()).collect()
    }

    #[test]
    fn extract_from_string() {
        assert_eq!(
            extract_tags(&json!("[dt_chrome_regression] [dt_ie_regression]")),
            tags(&["[dt_chrome_regression]", "[dt_ie_regression]"])
        );
        assert_eq!(extract_tags(&json!("[a] [b]")), tags(&["[a]", "[b]"]));
    }

    #[test]
    fn extract_array_passes_through() {
        assert_eq!(extract_tags(&json!(["[a]"])), tags(&["[a]"]));
        assert_eq!(
            extract_tags(&json!(["[dt_chrome_regression]", "[dt_ie_regression]"])),
            tags(&["[dt_chrome_regression]", "[dt_ie_regression]"])
        );
    }

    #[test]
    fn extract_defensive_default() {
        assert_eq!(extract_tags(&json!(42)), Vec::<String>::new());
        assert_eq!(extract_tags(&json!(false)), Vec::<String>::new());
        assert_eq!(extract_tags(&Value::Null), Vec::<String>::new());
        assert_eq!(extract_tags(&json!("no tags here")), Vec::<String>::new());
    }

    #[test]
    fn filter_by_suffix() {
        let extracted = tags(&["[dt_chrome_regression_new]", "[dt_ie_regression]"]);
        assert_eq!(
            filter_tags(&extracted, NEW_TAG_SUFFIX),
            tags(&["[dt_chrome_regression_new]"])
        );
        assert_eq!(filter_tags(&[], NEW_TAG_SUFFIX), Vec::<String>::new());
        assert_eq!(
            filter_tags(&tags(&["[a_new]", "[b]"]), NEW_TAG_SUFFIX),
            tags(&["[a_new]"])
        );
    }

    #[test]
    fn difference_of_changed_buckets() {
        let diff = get_difference(
            &json!("[dt_chrome_regression_new] [dt_ie_regression]"),
            &json!("[dt_chrome_regression] [dt_ie_regression]"),
        );
        assert_eq!(
            diff,
            TagDiff {
                old_tags: tags(&["[dt_chrome_regression_new]"]),
                new_tags: tags(&["[dt_chrome_regression]"]),
            }
        );
    }

    #[test]
    fn difference_is_empty_for_identical_input() {
        let bucket = json!("[a_new] [c] [d]");
        assert_eq!(get_difference(&bucket, &bucket), TagDiff::default());
        assert_eq!(get_difference(&json!(17), &json!(17)), TagDiff::default());
    }

    #[test]
    fn difference_ignores_multiplicity() {
        let diff = get_difference(&json!("[a] [a] [b]"), &json!("[b]"));
        assert_eq!(diff.old_tags, tags(&["[a]"]));
        assert_eq!(diff.new_tags, Vec::<String>::new());
    }

    #[test]
    fn difference_preserves_first_appearance_order() {
        let diff = get_difference(&json!("[c] [a] [b]"), &json!("[b] [x] [y]"));
        assert_eq!(diff.old_tags, tags(&["[c]", "[a]"]));
        assert_eq!(diff.new_tags, tags(&["[x]", "[y]"]));
    }

    #[test]
    fn difference_with_suffix_rename() {
        let diff = get_difference(&json!("[a_new] [c]"), &json!("[a] [c]"));
        assert_eq!(diff.old_tags, tags(&["[a_new]"]));
        assert_eq!(diff.new_tags, tags(&["[a]"]));
    }
}
