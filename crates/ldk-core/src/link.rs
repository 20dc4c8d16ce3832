use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A saved research link. The capture agent is the system of record for
/// these; locally created links are written through the durable store and
/// re-read on the next snapshot refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub metadata: LinkMetadata,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub priority: LinkPriority,
    #[serde(default)]
    pub status: LinkStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
}

impl Link {
    /// Hostname component of `url`, used as a display fallback when the
    /// title is a placeholder. Accepts absolute and scheme-relative urls.
    pub fn host(&self) -> Option<&str> {
        let rest = match self.url.split_once("://") {
            Some((_, rest)) => rest,
            None => self.url.strip_prefix("//").unwrap_or(&self.url),
        };
        let host = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .split(':')
            .next()
            .unwrap_or_default();
        if host.is_empty() {
            None
        } else {
            Some(host)
        }
    }

    /// First label, the anchor group for multi-label links.
    pub fn primary_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkPriority {
    Low,
    Medium,
    High,
}

impl Default for LinkPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl LinkPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkPriority::Low => "low",
            LinkPriority::Medium => "medium",
            LinkPriority::High => "high",
        }
    }
}

impl fmt::Display for LinkPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkPriority {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "low" => Ok(LinkPriority::Low),
            "medium" => Ok(LinkPriority::Medium),
            "high" => Ok(LinkPriority::High),
            other => Err(format!("Unknown priority: {other}")),
        }
    }
}

/// `Deleted` is a soft-delete marker. Deleted links stay in the snapshot
/// and render under a dedicated group; physical removal is a separate
/// operation on the mutation gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Active,
    Archived,
    Deleted,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Active => "active",
            LinkStatus::Archived => "archived",
            LinkStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "active" => Ok(LinkStatus::Active),
            "archived" => Ok(LinkStatus::Archived),
            "deleted" => Ok(LinkStatus::Deleted),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

/// Partial-field patch applied by the mutation gateway. Merging is shallow
/// at the top level: a patch that changes any metadata sub-field must carry
/// the complete desired `metadata` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<LinkMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<LinkPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LinkStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_link(url: &str) -> Link {
        Link {
            id: "link-1".to_string(),
            url: url.to_string(),
            metadata: LinkMetadata {
                title: "Sample".to_string(),
                ..LinkMetadata::default()
            },
            labels: vec!["research".to_string()],
            priority: LinkPriority::default(),
            status: LinkStatus::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            board_id: None,
        }
    }

    #[test]
    fn link_serialization_roundtrip() {
        let link = sample_link("https://example.com/post/1");
        let json = serde_json::to_string(&link).expect("serialize");
        let back: Link = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(link, back);
    }

    #[test]
    fn host_handles_absolute_and_scheme_relative_urls() {
        assert_eq!(
            sample_link("https://example.com/a/b?q=1").host(),
            Some("example.com")
        );
        assert_eq!(
            sample_link("//cdn.example.org/img.png").host(),
            Some("cdn.example.org")
        );
        assert_eq!(
            sample_link("http://localhost:8080/x").host(),
            Some("localhost")
        );
        assert_eq!(sample_link("").host(), None);
    }

    #[test]
    fn status_and_priority_parse_case_insensitively() {
        assert_eq!("ARCHIVED".parse::<LinkStatus>(), Ok(LinkStatus::Archived));
        assert_eq!(" high ".parse::<LinkPriority>(), Ok(LinkPriority::High));
        assert!("urgent".parse::<LinkPriority>().is_err());
    }

    #[test]
    fn enums_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&LinkStatus::Deleted).expect("serialize"),
            "\"deleted\""
        );
        assert_eq!(
            serde_json::to_string(&LinkPriority::Low).expect("serialize"),
            "\"low\""
        );
    }
}
