//! Boundary adapter for inbound link payloads.
//!
//! The capture agent is an uncontrolled upstream producer: payloads may be
//! partial, legacy-shaped (singular `title`/`label` fields instead of
//! `metadata`/`labels`), or missing entirely. Every field therefore has a
//! safe default and normalization never fails. All inbound link data passes
//! through here before any typed code sees it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::link::{Link, LinkMetadata, LinkPriority, LinkStatus};

/// Default label assigned when a payload carries no label at all. Legacy
/// capture-agent builds tagged everything "research"; keeping the default
/// makes those records group identically to freshly captured ones.
pub const DEFAULT_LABEL: &str = "research";

/// Title fallback when neither `metadata.title` nor the legacy `title`
/// field is present.
pub const UNTITLED: &str = "Untitled";

/// An inbound link as the capture agent sends it: camelCase, everything
/// optional, unknown fields preserved rather than rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawLinkPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: Option<RawMetadataPayload>,
    /// Legacy singular title, pre-metadata payload shape.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    /// Legacy singular label, wrapped into a one-element sequence.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub board_id: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawMetadataPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_time: Option<String>,
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl RawLinkPayload {
    /// Minimal payload for a locally captured url; the normalizer fills in
    /// id, timestamps and defaults.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// Convert an arbitrary inbound payload into a canonical [`Link`]. Total:
/// `normalize_link(RawLinkPayload::default())` yields a valid link with a
/// fresh id, empty url, and the documented defaults.
pub fn normalize_link(raw: RawLinkPayload) -> Link {
    let now = Utc::now();
    let metadata = raw.metadata.unwrap_or_default();
    let title = metadata
        .title
        .filter(|title| !title.is_empty())
        .or(raw.title.filter(|title| !title.is_empty()))
        .unwrap_or_else(|| UNTITLED.to_string());

    let labels = match (raw.labels, raw.label) {
        (Some(labels), _) => labels,
        (None, Some(label)) => vec![label],
        (None, None) => vec![DEFAULT_LABEL.to_string()],
    };

    Link {
        id: raw.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        url: raw.url.unwrap_or_default(),
        metadata: LinkMetadata {
            title,
            description: metadata.description,
            image: metadata.image,
            author: metadata.author,
            published_time: metadata.published_time,
            site_name: metadata.site_name,
        },
        labels,
        priority: raw
            .priority
            .and_then(|value| value.parse::<LinkPriority>().ok())
            .unwrap_or_default(),
        status: raw
            .status
            .and_then(|value| value.parse::<LinkStatus>().ok())
            .unwrap_or_default(),
        created_at: raw.created_at.unwrap_or(now),
        updated_at: raw.updated_at.unwrap_or(now),
        board_id: raw.board_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_normalizes_to_valid_link() {
        let link = normalize_link(RawLinkPayload::default());
        assert!(!link.id.is_empty());
        assert_eq!(link.url, "");
        assert_eq!(link.metadata.title, UNTITLED);
        assert_eq!(link.labels, vec![DEFAULT_LABEL.to_string()]);
        assert_eq!(link.priority, LinkPriority::Medium);
        assert_eq!(link.status, LinkStatus::Active);
        assert!(link.board_id.is_none());
    }

    #[test]
    fn empty_json_object_normalizes_to_valid_link() {
        let raw: RawLinkPayload = serde_json::from_str("{}").expect("parse");
        let link = normalize_link(raw);
        assert!(!link.id.is_empty());
        assert!(!link.metadata.title.is_empty());
    }

    #[test]
    fn generated_ids_are_never_reused() {
        let first = normalize_link(RawLinkPayload::default());
        let second = normalize_link(RawLinkPayload::default());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn legacy_title_and_label_fields_are_honored() {
        let raw: RawLinkPayload = serde_json::from_str(
            r#"{"url": "https://example.com", "title": "Old Shape", "label": "reading"}"#,
        )
        .expect("parse");
        let link = normalize_link(raw);
        assert_eq!(link.metadata.title, "Old Shape");
        assert_eq!(link.labels, vec!["reading".to_string()]);
    }

    #[test]
    fn metadata_title_wins_over_legacy_title() {
        let raw: RawLinkPayload = serde_json::from_str(
            r#"{"metadata": {"title": "Canonical"}, "title": "Legacy"}"#,
        )
        .expect("parse");
        assert_eq!(normalize_link(raw).metadata.title, "Canonical");
    }

    #[test]
    fn empty_metadata_title_falls_through_to_legacy_then_untitled() {
        let raw: RawLinkPayload =
            serde_json::from_str(r#"{"metadata": {"title": ""}, "title": "Legacy"}"#)
                .expect("parse");
        assert_eq!(normalize_link(raw).metadata.title, "Legacy");

        let raw: RawLinkPayload =
            serde_json::from_str(r#"{"metadata": {"title": ""}}"#).expect("parse");
        assert_eq!(normalize_link(raw).metadata.title, UNTITLED);
    }

    #[test]
    fn explicit_labels_preserve_order_and_duplicates() {
        let raw: RawLinkPayload =
            serde_json::from_str(r#"{"labels": ["b", "a", "b"], "label": "ignored"}"#)
                .expect("parse");
        let link = normalize_link(raw);
        assert_eq!(
            link.labels,
            vec!["b".to_string(), "a".to_string(), "b".to_string()]
        );
        assert_eq!(link.primary_label(), Some("b"));
    }

    #[test]
    fn malformed_priority_and_status_fall_back_to_defaults() {
        let raw: RawLinkPayload =
            serde_json::from_str(r#"{"priority": "urgent", "status": "on-fire"}"#)
                .expect("parse");
        let link = normalize_link(raw);
        assert_eq!(link.priority, LinkPriority::Medium);
        assert_eq!(link.status, LinkStatus::Active);
    }

    #[test]
    fn camel_case_fields_and_unknown_keys_are_accepted() {
        let raw: RawLinkPayload = serde_json::from_str(
            r#"{
                "id": "abc",
                "url": "https://example.com",
                "boardId": "board-7",
                "createdAt": "2026-01-05T10:00:00Z",
                "updatedAt": "2026-01-06T10:00:00Z",
                "captureVersion": 3
            }"#,
        )
        .expect("parse");
        let link = normalize_link(raw);
        assert_eq!(link.id, "abc");
        assert_eq!(link.board_id.as_deref(), Some("board-7"));
        assert_eq!(link.created_at.to_rfc3339(), "2026-01-05T10:00:00+00:00");
    }
}
