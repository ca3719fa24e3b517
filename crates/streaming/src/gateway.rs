//! Data fetch gateway abstraction.
//!
//! The gateway turns a bounding box or an area identifier into feature
//! records. Implementations must be `Send + Sync`; methods return boxed
//! `'static` futures so loads can be driven from spawned tasks.

use std::fmt;
use std::time::Duration;

use foundation::GeoRect;
use scene::{BoxFuture, FeatureCollection};
use serde::{Deserialize, Serialize};

/// Which dataset a bounding-box query targets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Buildings,
    Trees,
    Custom(String),
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Buildings => f.write_str("buildings"),
            SourceKind::Trees => f.write_str("trees"),
            SourceKind::Custom(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum FetchPriority {
    High,
    #[default]
    Normal,
    Low,
}

/// Per-request options understood by gateways.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub cache: bool,
    /// Overrides the gateway's default time-to-live for this response.
    pub cache_ttl: Option<Duration>,
    /// Extra immediate attempts the gateway may make on retriable errors.
    pub retries: u32,
    pub priority: FetchPriority,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            cache: true,
            cache_ttl: None,
            retries: 0,
            priority: FetchPriority::Normal,
        }
    }
}

impl FetchOptions {
    pub fn uncached() -> Self {
        Self {
            cache: false,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: FetchPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("server responded {code}: {message}")]
    Status { code: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Network failures, timeouts and 5xx responses are worth retrying;
    /// client errors and malformed payloads are not.
    pub fn is_retriable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout => true,
            FetchError::Status { code, .. } => *code >= 500,
            FetchError::Malformed(_) => false,
        }
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        FetchError::Status {
            code,
            message: message.into(),
        }
    }
}

pub type FetchResult = Result<FeatureCollection, FetchError>;

pub trait DataGateway: Send + Sync {
    fn fetch_by_bounding_box(
        &self,
        rect: GeoRect,
        source: SourceKind,
        options: FetchOptions,
    ) -> BoxFuture<'static, FetchResult>;

    fn fetch_by_area_id(&self, area_id: String, options: FetchOptions)
    -> BoxFuture<'static, FetchResult>;
}
