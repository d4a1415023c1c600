//! Catalog loading and entry normalization.
//!
//! The catalog is a loosely typed JSON array. Every element is read into a
//! [`RawEntry`] without failing, then [`normalize`]d into a fully populated
//! [`CatalogEntry`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DEFAULT_ICON;
use crate::error::{Error, Result};
use crate::net::{CacheMode, HttpFetch, Request};

/// Name shown for entries without one.
pub const FALLBACK_NAME: &str = "No name";

/// Download link used for entries without one.
pub const PLACEHOLDER_LINK: &str = "#";

/// A catalog element as found in the JSON, every field optional.
///
/// Deserialization never fails: strings are kept, numbers and booleans are
/// stringified, anything else counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub struct RawEntry {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    /// `updatedAt` in the JSON.
    pub updated_at: Option<String>,
    /// Legacy `updated` key, used when `updatedAt` is absent.
    pub updated: Option<String>,
    pub tags: Option<Vec<String>>,
    pub icon: Option<String>,
    pub homepage: Option<String>,
    /// `apkUrl` in the JSON.
    pub apk_url: Option<String>,
    /// Legacy `apk` key, used when `apkUrl` is absent.
    pub apk: Option<String>,
}

fn loose_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn loose_tags(value: Option<&Value>) -> Option<Vec<String>> {
    match value? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| loose_string(Some(item)))
                .collect(),
        ),
        _ => None,
    }
}

impl From<Value> for RawEntry {
    fn from(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        let field = |key: &str| loose_string(map.get(key));

        Self {
            id: field("id"),
            name: field("name"),
            description: field("description"),
            version: field("version"),
            updated_at: field("updatedAt"),
            updated: field("updated"),
            tags: loose_tags(map.get("tags")),
            icon: field("icon"),
            homepage: field("homepage"),
            apk_url: field("apkUrl"),
            apk: field("apk"),
        }
    }
}

impl RawEntry {
    /// Fills every missing field, using `default_icon` for entries without an icon.
    #[must_use]
    pub fn normalize(self, default_icon: &str) -> CatalogEntry {
        CatalogEntry {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: self.name.unwrap_or_else(|| FALLBACK_NAME.to_string()),
            description: self.description.unwrap_or_default(),
            version: self.version.unwrap_or_default(),
            updated_at: self.updated_at.or(self.updated).unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
            icon: self.icon.unwrap_or_else(|| default_icon.to_string()),
            homepage: self.homepage.unwrap_or_default(),
            download_url: self
                .apk_url
                .or(self.apk)
                .unwrap_or_else(|| PLACEHOLDER_LINK.to_string()),
        }
    }
}

/// A fully populated catalog entry, rebuilt on every render pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    /// Identifier; random when the catalog omits it.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Version string without the `v` prefix.
    pub version: String,
    /// Last-updated timestamp as written in the catalog.
    pub updated_at: String,
    /// Free-text tags.
    pub tags: Vec<String>,
    /// Icon path.
    pub icon: String,
    /// Homepage URL. Not rendered.
    pub homepage: String,
    /// Direct download URL for the package.
    pub download_url: String,
}

impl CatalogEntry {
    /// Parses [`updated_at`](Self::updated_at) for sorting.
    #[must_use]
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.updated_at)
    }
}

/// Normalizes a raw entry with the default icon. Never fails.
#[must_use]
pub fn normalize(raw: RawEntry) -> CatalogEntry {
    raw.normalize(DEFAULT_ICON)
}

/// Parses a catalog timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD HH:MM[:SS]`,
/// `YYYY-MM-DD` and `YYYY/MM/DD`. Values without an offset are read as UTC.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    ["%Y-%m-%d", "%Y/%m/%d"]
        .into_iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// The demonstration entry shown when the catalog is unavailable.
#[must_use]
pub fn sample_entry() -> CatalogEntry {
    normalize(RawEntry {
        id: Some("sample".to_string()),
        name: Some("サンプル電卓".to_string()),
        description: Some("デモ用のダミーアプリ".to_string()),
        version: Some("1.0.0".to_string()),
        updated_at: Some("2025-01-01".to_string()),
        tags: Some(vec!["demo".to_string()]),
        icon: Some(DEFAULT_ICON.to_string()),
        apk_url: Some("sample/sample.apk".to_string()),
        ..RawEntry::default()
    })
}

/// Parses a catalog body into raw entries.
///
/// # Errors
///
/// Returns [`Error::CatalogUnavailable`] unless the body is a JSON array.
pub fn parse_catalog(body: &[u8]) -> Result<Vec<RawEntry>> {
    serde_json::from_slice(body)
        .map_err(|e| Error::CatalogUnavailable(format!("invalid catalog JSON: {e}")))
}

/// Fetches the catalog, bypassing HTTP caches.
///
/// # Errors
///
/// Returns [`Error::CatalogUnavailable`] on transport failure, a non-2xx
/// status, or a body that is not a JSON array.
pub async fn load_catalog(fetcher: &dyn HttpFetch, url: &Url) -> Result<Vec<RawEntry>> {
    let request = Request::get(url.clone()).with_cache(CacheMode::NoStore);
    let response = fetcher
        .fetch(&request)
        .await
        .map_err(|e| Error::CatalogUnavailable(e.to_string()))?;

    if !response.is_success() {
        return Err(Error::CatalogUnavailable(format!(
            "{url} returned {}",
            response.status
        )));
    }

    let entries = parse_catalog(&response.body)?;
    log::debug!("Loaded {} catalog entries from {url}", entries.len());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Response;
    use crate::net::testing::MockFetch;
    use proptest::prelude::*;
    use serde_json::json;

    fn raw(value: Value) -> RawEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn normalize_empty_record_applies_defaults() {
        let entry = normalize(RawEntry::default());
        assert!(!entry.id.is_empty());
        assert_eq!(entry.name, "No name");
        assert_eq!(entry.description, "");
        assert_eq!(entry.version, "");
        assert_eq!(entry.updated_at, "");
        assert!(entry.tags.is_empty());
        assert_eq!(entry.icon, "icons/icon-192.png");
        assert_eq!(entry.homepage, "");
        assert_eq!(entry.download_url, "#");
    }

    #[test]
    fn normalize_generates_distinct_ids() {
        let a = normalize(RawEntry::default());
        let b = normalize(RawEntry::default());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn normalize_keeps_present_fields() {
        let entry = normalize(raw(json!({
            "id": "calc",
            "name": "Calc",
            "description": "A calculator",
            "version": "2.1",
            "updatedAt": "2025-03-04",
            "tags": ["tools", "math"],
            "icon": "icons/calc.png",
            "homepage": "https://calc.example",
            "apkUrl": "apks/calc.apk"
        })));
        assert_eq!(entry.id, "calc");
        assert_eq!(entry.name, "Calc");
        assert_eq!(entry.version, "2.1");
        assert_eq!(entry.updated_at, "2025-03-04");
        assert_eq!(entry.tags, vec!["tools", "math"]);
        assert_eq!(entry.icon, "icons/calc.png");
        assert_eq!(entry.homepage, "https://calc.example");
        assert_eq!(entry.download_url, "apks/calc.apk");
    }

    #[test]
    fn normalize_uses_legacy_keys_as_fallback() {
        let entry = normalize(raw(json!({ "updated": "2024-12-01", "apk": "a.apk" })));
        assert_eq!(entry.updated_at, "2024-12-01");
        assert_eq!(entry.download_url, "a.apk");

        let entry = normalize(raw(json!({
            "updatedAt": "2025-01-01",
            "updated": "2020-01-01",
            "apkUrl": "new.apk",
            "apk": "old.apk"
        })));
        assert_eq!(entry.updated_at, "2025-01-01");
        assert_eq!(entry.download_url, "new.apk");
    }

    #[test]
    fn empty_strings_are_not_defaulted() {
        let entry = normalize(raw(json!({ "name": "" })));
        assert_eq!(entry.name, "");
    }

    #[test]
    fn loose_values_are_coerced() {
        let entry = normalize(raw(json!({
            "id": 7,
            "name": null,
            "version": 3,
            "tags": ["a", 1, true, null, {"x": 1}],
            "icon": ["not", "a", "string"]
        })));
        assert_eq!(entry.id, "7");
        assert_eq!(entry.name, "No name");
        assert_eq!(entry.version, "3");
        assert_eq!(entry.tags, vec!["a", "1", "true"]);
        assert_eq!(entry.icon, "icons/icon-192.png");
    }

    #[test]
    fn non_object_element_normalizes_to_defaults() {
        assert_eq!(raw(json!(42)), RawEntry::default());
        assert_eq!(raw(json!(null)), RawEntry::default());
        assert_eq!(raw(json!("calc")), RawEntry::default());
    }

    #[test]
    fn normalize_with_custom_icon() {
        let entry = RawEntry::default().normalize("img/app.png");
        assert_eq!(entry.icon, "img/app.png");
    }

    #[test]
    fn parse_timestamp_formats() {
        let day = parse_timestamp("2025-01-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2025-01-01T00:00:00+00:00");
        assert_eq!(parse_timestamp("2025/01/01"), Some(day));
        assert!(parse_timestamp("2025-01-01T10:20:30Z").unwrap() > day);
        assert!(parse_timestamp("2025-01-01T10:20:30+09:00").unwrap() > day);
        assert!(parse_timestamp("2025-01-01 10:20").unwrap() > day);
        assert!(parse_timestamp("2025-01-01T10:20:30.5").is_some());
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("   "), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2025-13-01"), None);
    }

    #[test]
    fn sample_entry_is_demo_calculator() {
        let entry = sample_entry();
        assert_eq!(entry.id, "sample");
        assert_eq!(entry.name, "サンプル電卓");
        assert_eq!(entry.version, "1.0.0");
        assert_eq!(entry.tags, vec!["demo"]);
        assert_eq!(entry.download_url, "sample/sample.apk");
        assert!(entry.updated().is_some());
    }

    #[test]
    fn parse_catalog_requires_array() {
        assert_eq!(parse_catalog(b"[]").unwrap().len(), 0);
        assert_eq!(parse_catalog(br#"[{"name":"a"}, 3]"#).unwrap().len(), 2);
        assert!(matches!(
            parse_catalog(br#"{"name":"a"}"#),
            Err(Error::CatalogUnavailable(_))
        ));
        assert!(matches!(
            parse_catalog(b"not json"),
            Err(Error::CatalogUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn load_catalog_bypasses_cache() {
        let fetch = MockFetch::new();
        let url = Url::parse("https://store.example/apps.json").unwrap();
        fetch.respond(url.as_str(), Response::new(200, r#"[{"name":"Calc"}]"#));

        let entries = load_catalog(&fetch, &url).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name.as_deref(), Some("Calc"));

        let requests = fetch.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].cache, CacheMode::NoStore);
    }

    #[tokio::test]
    async fn load_catalog_fails_on_http_error() {
        let fetch = MockFetch::new();
        let url = Url::parse("https://store.example/apps.json").unwrap();
        fetch.respond(url.as_str(), Response::new(404, "missing"));

        let err = load_catalog(&fetch, &url).await.unwrap_err();
        assert!(matches!(err, Error::CatalogUnavailable(ref msg) if msg.contains("404")));
    }

    #[tokio::test]
    async fn load_catalog_fails_on_transport_error() {
        let fetch = MockFetch::new();
        let url = Url::parse("https://store.example/apps.json").unwrap();
        let err = load_catalog(&fetch, &url).await.unwrap_err();
        assert!(matches!(err, Error::CatalogUnavailable(_)));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            ".{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::hash_map(
                    prop_oneof![
                        Just("id".to_string()),
                        Just("name".to_string()),
                        Just("tags".to_string()),
                        Just("updatedAt".to_string()),
                        Just("apk".to_string()),
                        "[a-z]{1,6}",
                    ],
                    inner,
                    0..6
                )
                .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn normalize_is_total(value in arb_json()) {
            let raw: RawEntry = serde_json::from_value(value).unwrap();
            let had_id = raw.id.is_some();
            let had_name = raw.name.is_some();
            let had_icon = raw.icon.is_some();
            let had_link = raw.apk_url.is_some() || raw.apk.is_some();
            let entry = normalize(raw);
            if !had_id {
                prop_assert!(!entry.id.is_empty());
            }
            if !had_icon {
                prop_assert_eq!(entry.icon.as_str(), DEFAULT_ICON);
            }
            if !had_name {
                prop_assert_eq!(entry.name.as_str(), FALLBACK_NAME);
            }
            if !had_link {
                prop_assert_eq!(entry.download_url.as_str(), PLACEHOLDER_LINK);
            }
        }
    }
}
