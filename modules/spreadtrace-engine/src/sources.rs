//! Data acquisition seam.
//!
//! The engine never talks to a platform itself. Anything that can produce a
//! `DataCollection` (a scraper, an API client, a recorded JSON file) sits
//! behind `DataSource`, and `fetch_all` runs them concurrently.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use spreadtrace_common::{DataCollection, SpreadTraceError};

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Platform label used in logs and failure reports.
    fn platform(&self) -> &str;

    /// Collect accounts, posts and interactions, optionally scoped to a query.
    async fn fetch(&self, query: Option<&str>) -> Result<DataCollection>;
}

/// A collection recorded as JSON on disk.
pub struct JsonFileSource {
    platform: String,
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(platform: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            platform: platform.into(),
            path: path.into(),
        }
    }

    /// Platform label taken from the file stem (`twitter.json` -> `twitter`).
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let platform = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        Self::new(platform, path)
    }
}

#[async_trait]
impl DataSource for JsonFileSource {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn fetch(&self, query: Option<&str>) -> Result<DataCollection> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read collection file: {}", self.path.display()))?;
        let mut collection: DataCollection = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse collection file: {}", self.path.display()))?;
        if collection.platform.is_empty() {
            collection.platform = self.platform.clone();
        }
        if collection.query.is_none() {
            collection.query = query.map(str::to_string);
        }
        Ok(collection)
    }
}

/// Outcome of fetching every source.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub collections: Vec<DataCollection>,
    pub failures: Vec<SpreadTraceError>,
}

/// Fetch all sources concurrently. A failing source is logged and recorded
/// in `failures`; it never stops the others.
pub async fn fetch_all(sources: &[Box<dyn DataSource>], query: Option<&str>) -> FetchReport {
    let fetches = sources.iter().map(|source| async move {
        let result = source.fetch(query).await;
        (source.platform().to_string(), result)
    });
    let results = futures::future::join_all(fetches).await;

    let mut report = FetchReport::default();
    for (platform, result) in results {
        match result {
            Ok(collection) => {
                info!(
                    platform = platform.as_str(),
                    accounts = collection.accounts.len(),
                    posts = collection.posts.len(),
                    interactions = collection.interactions.len(),
                    "Source fetched"
                );
                report.collections.push(collection);
            }
            Err(e) => {
                warn!(platform = platform.as_str(), error = %e, "Source fetch failed, skipping");
                report.failures.push(SpreadTraceError::Source {
                    platform,
                    message: format!("{e:#}"),
                });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use spreadtrace_common::fixtures::{account, collection, post};

    #[tokio::test]
    async fn json_file_source_fills_platform_and_query() {
        let data = collection("", vec![account("a", 1, 1, 10)], vec![post("p", "a", "hi", 0)], vec![]);
        let path = std::env::temp_dir().join(format!("spreadtrace-source-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&data).unwrap()).unwrap();

        let source = JsonFileSource::new("mastodon", &path);
        let fetched = source.fetch(Some("flood")).await.unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(fetched.platform, "mastodon");
        assert_eq!(fetched.query.as_deref(), Some("flood"));
        assert_eq!(fetched.posts.len(), 1);
    }

    #[test]
    fn platform_defaults_to_file_stem() {
        let source = JsonFileSource::from_path("/data/bluesky.json");
        assert_eq!(source.platform(), "bluesky");
    }

    #[tokio::test]
    async fn missing_file_is_reported_not_fatal() {
        let sources: Vec<Box<dyn DataSource>> =
            vec![Box::new(JsonFileSource::new("x", "/nonexistent/spreadtrace/x.json"))];
        let report = fetch_all(&sources, None).await;
        assert!(report.collections.is_empty());
        assert!(matches!(
            report.failures.as_slice(),
            [SpreadTraceError::Source { platform, .. }] if platform == "x"
        ));
    }
}
