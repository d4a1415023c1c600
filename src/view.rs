//! Pure view model for the catalog grid.
//!
//! [`render`] maps `(entries, query, sort key)` to the list of cards to show.
//! It knows nothing about the host's rendering API.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::catalog::CatalogEntry;

/// Sort order selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Ascending by name.
    Name,
    /// Most recently updated first.
    #[default]
    Latest,
}

impl FromStr for SortKey {
    type Err = Infallible;

    /// `"name"` selects [`SortKey::Name`]; any other value is [`SortKey::Latest`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "name" { Self::Name } else { Self::Latest })
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Name => "name",
            Self::Latest => "latest",
        })
    }
}

/// Download control on a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadLink {
    /// Target URL of the package.
    pub href: String,
    /// Whether the link carries the `download` hint.
    pub download: bool,
}

/// One rendered catalog card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    pub id: String,
    pub icon: String,
    pub icon_alt: String,
    pub title: String,
    pub description: String,
    /// Version prefixed with `v`.
    pub version: String,
    pub updated: String,
    /// One chip per tag.
    pub tags: Vec<String>,
    pub download: DownloadLink,
}

impl From<&CatalogEntry> for Card {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            id: entry.id.clone(),
            icon: entry.icon.clone(),
            icon_alt: entry.name.clone(),
            title: entry.name.clone(),
            description: entry.description.clone(),
            version: format!("v{}", entry.version),
            updated: entry.updated_at.clone(),
            tags: entry.tags.clone(),
            download: DownloadLink {
                href: entry.download_url.clone(),
                download: true,
            },
        }
    }
}

/// What the grid currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridContent {
    /// Placeholder cards shown before the catalog resolves.
    Skeletons(usize),
    /// Rendered catalog cards.
    Cards(Vec<Card>),
}

/// Text of the visible count label.
#[must_use]
pub fn count_label(count: usize) -> String {
    format!("{count}件")
}

/// Returns true if the entry matches an already trimmed, lowercased query.
fn matches(entry: &CatalogEntry, needle: &str) -> bool {
    needle.is_empty()
        || entry.name.to_lowercase().contains(needle)
        || entry.description.to_lowercase().contains(needle)
        || entry.tags.join(" ").to_lowercase().contains(needle)
}

/// Keeps entries whose name, description, or tags contain `query`, ignoring case.
///
/// An empty or all-whitespace query keeps everything in order.
#[must_use]
pub fn filter_entries<'a>(entries: &'a [CatalogEntry], query: &str) -> Vec<&'a CatalogEntry> {
    let needle = query.trim().to_lowercase();
    entries.iter().filter(|e| matches(e, &needle)).collect()
}

/// Locale-style name comparison: case-insensitive first, raw text breaks ties.
fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Sorts entries in place. The sort is stable.
///
/// Under [`SortKey::Latest`] entries without a parseable timestamp go last.
pub fn sort_entries(entries: &mut [&CatalogEntry], key: SortKey) {
    match key {
        SortKey::Name => entries.sort_by(|a, b| compare_names(&a.name, &b.name)),
        SortKey::Latest => entries.sort_by_cached_key(|e| std::cmp::Reverse(e.updated())),
    }
}

/// Filters, sorts, and maps entries to cards.
#[must_use]
pub fn render(entries: &[CatalogEntry], query: &str, key: SortKey) -> Vec<Card> {
    let mut visible = filter_entries(entries, query);
    sort_entries(&mut visible, key);
    visible.into_iter().map(Card::from).collect()
}
