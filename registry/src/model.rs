//! Stored record types for projects and tests.
//!
//! Wire field names are camelCase to stay compatible with existing
//! consumers of the service.

use crate::history::MetaInfo;
use crate::tags;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A bucket assignment: either a raw string containing bracketed tags or an
/// explicit tag list (the forward-compatible encoding).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BucketValue {
    Text(String),
    Tags(Vec<String>),
}

impl BucketValue {
    /// Interprets a submitted JSON value as a bucket assignment.
    ///
    /// Empty strings count as absent, matching how the service has always
    /// treated blank bucket fields. Non-string, non-array values are
    /// rejected as absent rather than failing the request.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) if !text.is_empty() => Some(BucketValue::Text(text.clone())),
            Value::Array(items) => Some(BucketValue::Tags(
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_owned))
                    .collect(),
            )),
            _ => None,
        }
    }

    /// The ordered tag list this bucket resolves to.
    pub fn tags(&self) -> Vec<String> {
        match self {
            BucketValue::Text(text) => tags::bracketed_tags(text),
            BucketValue::Tags(list) => list.clone(),
        }
    }
}

/// One tracked automated test and its bucket history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub bucket: BucketValue,
    /// Unique within the owning project, not globally.
    pub uuid: String,
    /// Owning project, referenced by name.
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_area: Option<String>,
    #[serde(default)]
    pub meta_info: MetaInfo,
}

/// A project grouping tests, with the app areas its tests may declare.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `None` on legacy records created before app areas existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_areas: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bucket_from_json_accepts_string_and_array() {
        assert_eq!(
            BucketValue::from_json(&json!("[a] [b]")),
            Some(BucketValue::Text("[a] [b]".into()))
        );
        assert_eq!(
            BucketValue::from_json(&json!(["[a]", "[b]"])),
            Some(BucketValue::Tags(vec!["[a]".into(), "[b]".into()]))
        );
        assert_eq!(BucketValue::from_json(&json!("")), None);
        assert_eq!(BucketValue::from_json(&json!(42)), None);
        assert_eq!(BucketValue::from_json(&Value::Null), None);
    }

    #[test]
    fn bucket_tags_from_both_encodings() {
        assert_eq!(
            BucketValue::Text("[a] [b]".into()).tags(),
            vec!["[a]".to_owned(), "[b]".to_owned()]
        );
        assert_eq!(
            BucketValue::Tags(vec!["[a]".into()]).tags(),
            vec!["[a]".to_owned()]
        );
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let test = Test {
            name: Some("login flow".into()),
            bucket: BucketValue::Text("[dt_chrome_regression]".into()),
            uuid: "test-00001".into(),
            project: "Barracuda".into(),
            app_area: Some("checkout".into()),
            meta_info: MetaInfo::new(),
        };

        let value = serde_json::to_value(&test).expect("serialize");
        assert_eq!(value["appArea"], json!("checkout"));
        assert_eq!(value["metaInfo"], json!({}));
        assert_eq!(value["bucket"], json!("[dt_chrome_regression]"));
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let project = Project {
            name: "Barracuda".into(),
            description: None,
            app_areas: None,
        };
        let value = serde_json::to_value(&project).expect("serialize");
        assert!(value.get("description").is_none());
        assert!(value.get("appAreas").is_none());
    }
}
