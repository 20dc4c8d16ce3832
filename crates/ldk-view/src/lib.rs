//! Pure view derivation: from a raw snapshot and the current filter/sort
//! state to the ordered projection the UI renders, plus label grouping.
//!
//! Nothing here mutates the snapshot; every function filters, sorts and
//! copies. Identical inputs always produce identical outputs.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ldk_core::link::{Link, LinkPriority, LinkStatus};

pub const ARCHIVED_GROUP: &str = "Archived";
pub const DELETED_GROUP: &str = "Deleted";
pub const UNLABELED_GROUP: &str = "Unlabeled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    CreatedAt,
    Title,
    /// Primary-label sort: compares each link's first label only.
    Labels,
    Priority,
    Status,
}

impl Default for SortKey {
    fn default() -> Self {
        Self::CreatedAt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
    Asc,
    Desc,
}

impl Default for SortDir {
    fn default() -> Self {
        Self::Asc
    }
}

/// Filter and sort state, as the UI holds it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub status: Option<LinkStatus>,
    #[serde(default)]
    pub priority: Option<LinkPriority>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort_key: SortKey,
    #[serde(default)]
    pub sort_dir: SortDir,
}

/// A named group of links for the label-oriented view mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkGroup {
    pub name: String,
    pub links: Vec<Link>,
}

/// Derive the visible-links projection. Filters by exact status and
/// priority match, then by case-insensitive substring search over title or
/// url, then sorts with a stable comparator. `Desc` reverses the ordering
/// per comparison rather than reversing the output, so ties keep their
/// input order in both directions.
pub fn derive(links: &[Link], query: &ViewQuery) -> Vec<Link> {
    let search = query
        .search
        .as_deref()
        .map(str::to_lowercase)
        .filter(|term| !term.is_empty());

    let mut visible: Vec<Link> = links
        .iter()
        .filter(|link| query.status.is_none_or(|status| link.status == status))
        .filter(|link| query.priority.is_none_or(|priority| link.priority == priority))
        .filter(|link| match &search {
            Some(term) => {
                link.metadata.title.to_lowercase().contains(term)
                    || link.url.to_lowercase().contains(term)
            }
            None => true,
        })
        .cloned()
        .collect();

    visible.sort_by(|a, b| {
        let ordering = compare_by_key(a, b, query.sort_key);
        match query.sort_dir {
            SortDir::Asc => ordering,
            SortDir::Desc => ordering.reverse(),
        }
    });

    visible
}

fn compare_by_key(a: &Link, b: &Link, key: SortKey) -> Ordering {
    match key {
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::Title => a.metadata.title.cmp(&b.metadata.title),
        SortKey::Labels => a
            .primary_label()
            .unwrap_or_default()
            .cmp(b.primary_label().unwrap_or_default()),
        SortKey::Priority => priority_rank(a.priority).cmp(&priority_rank(b.priority)),
        SortKey::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

fn priority_rank(priority: LinkPriority) -> u8 {
    match priority {
        LinkPriority::Low => 0,
        LinkPriority::Medium => 1,
        LinkPriority::High => 2,
    }
}

/// File links into label groups for the label view mode.
///
/// An active link appears once per label it holds; links with no labels go
/// to "Unlabeled". Archived and deleted links skip label grouping entirely
/// and land only in their dedicated groups. Display order follows
/// `custom_order`, alphabetical for groups not listed, with "Archived" and
/// "Deleted" always pinned last.
pub fn group_links(links: &[Link], custom_order: &[String]) -> Vec<LinkGroup> {
    let mut labeled: BTreeMap<String, Vec<Link>> = BTreeMap::new();
    let mut archived: Vec<Link> = Vec::new();
    let mut deleted: Vec<Link> = Vec::new();

    for link in links {
        match link.status {
            LinkStatus::Archived => archived.push(link.clone()),
            LinkStatus::Deleted => deleted.push(link.clone()),
            LinkStatus::Active => {
                if link.labels.is_empty() {
                    labeled
                        .entry(UNLABELED_GROUP.to_string())
                        .or_default()
                        .push(link.clone());
                } else {
                    for label in &link.labels {
                        labeled.entry(label.clone()).or_default().push(link.clone());
                    }
                }
            }
        }
    }

    let mut groups = Vec::with_capacity(labeled.len() + 2);
    for name in custom_order {
        if name == ARCHIVED_GROUP || name == DELETED_GROUP {
            continue;
        }
        if let Some(links) = labeled.remove(name) {
            groups.push(LinkGroup {
                name: name.clone(),
                links,
            });
        }
    }
    // BTreeMap iteration gives the alphabetical fallback for the rest.
    for (name, links) in labeled {
        groups.push(LinkGroup { name, links });
    }
    if !archived.is_empty() {
        groups.push(LinkGroup {
            name: ARCHIVED_GROUP.to_string(),
            links: archived,
        });
    }
    if !deleted.is_empty() {
        groups.push(LinkGroup {
            name: DELETED_GROUP.to_string(),
            links: deleted,
        });
    }
    groups
}
