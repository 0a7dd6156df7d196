//! Backend data sources.
//!
//! `DataSource` returns boxed futures so it stays dyn-compatible and can be
//! shared behind an `Arc` across the host's tasks. `HttpDataSource` talks to
//! the real backend; `MemoryDataSource` serves canned payloads for tests and
//! offline runs.

use std::collections::{BTreeMap, BTreeSet};

use foundation::FeatureCollection;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::protocol::{
    IndicatorTable, LodTier, NaturalFamily, history_path, indicator_path, natural_path,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request to {path} failed: {message}")]
    Transport { path: String, message: String },
    #[error("{path} returned HTTP {status}")]
    Status { path: String, status: u16 },
    #[error("malformed payload from {path}: {message}")]
    Decode { path: String, message: String },
}

impl FetchError {
    pub fn path(&self) -> &str {
        match self {
            FetchError::Transport { path, .. }
            | FetchError::Status { path, .. }
            | FetchError::Decode { path, .. } => path,
        }
    }
}

pub trait DataSource: Send + Sync {
    /// Boundary snapshot for an already-snapped year.
    fn history(&self, year: i32) -> BoxFuture<'_, Result<FeatureCollection, FetchError>>;

    fn natural(
        &self,
        family: NaturalFamily,
        tier: LodTier,
        limit: u32,
    ) -> BoxFuture<'_, Result<FeatureCollection, FetchError>>;

    /// Latest value per country for one indicator slug.
    fn indicators(&self, slug: &str) -> BoxFuture<'_, Result<IndicatorTable, FetchError>>;
}

/// Read-only JSON client for the statistics backend.
pub struct HttpDataSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDataSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: String) -> Result<T, FetchError> {
        let url = self.url_for(&path);
        debug!(%url, "GET");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                path,
                status: status.as_u16(),
            });
        }

        resp.json::<T>().await.map_err(|e| FetchError::Decode {
            path,
            message: e.to_string(),
        })
    }
}

impl DataSource for HttpDataSource {
    fn history(&self, year: i32) -> BoxFuture<'_, Result<FeatureCollection, FetchError>> {
        Box::pin(self.get_json(history_path(year)))
    }

    fn natural(
        &self,
        family: NaturalFamily,
        tier: LodTier,
        limit: u32,
    ) -> BoxFuture<'_, Result<FeatureCollection, FetchError>> {
        Box::pin(self.get_json(natural_path(family, tier, limit)))
    }

    fn indicators(&self, slug: &str) -> BoxFuture<'_, Result<IndicatorTable, FetchError>> {
        Box::pin(self.get_json(indicator_path(slug)))
    }
}

/// In-memory source with canned payloads. Unknown keys answer HTTP 404.
#[derive(Debug, Default, Clone)]
pub struct MemoryDataSource {
    history: BTreeMap<i32, FeatureCollection>,
    natural: BTreeMap<(NaturalFamily, LodTier), FeatureCollection>,
    indicators: BTreeMap<String, IndicatorTable>,
    failing: BTreeSet<String>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, year: i32, data: FeatureCollection) -> Self {
        self.history.insert(year, data);
        self
    }

    pub fn with_natural(mut self, family: NaturalFamily, tier: LodTier, data: FeatureCollection) -> Self {
        self.natural.insert((family, tier), data);
        self
    }

    pub fn with_indicators(mut self, slug: &str, table: IndicatorTable) -> Self {
        self.indicators.insert(slug.to_string(), table);
        self
    }

    /// Makes every request for `path` fail at the transport level.
    pub fn failing(mut self, path: impl Into<String>) -> Self {
        self.failing.insert(path.into());
        self
    }

    fn lookup<T: Clone>(&self, path: String, found: Option<&T>) -> Result<T, FetchError> {
        if self.failing.contains(&path) {
            return Err(FetchError::Transport {
                path,
                message: "connection reset".to_string(),
            });
        }
        found
            .cloned()
            .ok_or(FetchError::Status { path, status: 404 })
    }
}

impl DataSource for MemoryDataSource {
    fn history(&self, year: i32) -> BoxFuture<'_, Result<FeatureCollection, FetchError>> {
        let result = self.lookup(history_path(year), self.history.get(&year));
        Box::pin(async move { result })
    }

    fn natural(
        &self,
        family: NaturalFamily,
        tier: LodTier,
        limit: u32,
    ) -> BoxFuture<'_, Result<FeatureCollection, FetchError>> {
        let result = self.lookup(
            natural_path(family, tier, limit),
            self.natural.get(&(family, tier)),
        );
        Box::pin(async move { result })
    }

    fn indicators(&self, slug: &str) -> BoxFuture<'_, Result<IndicatorTable, FetchError>> {
        let result = self.lookup(indicator_path(slug), self.indicators.get(slug));
        Box::pin(async move { result })
    }
}
