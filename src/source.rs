use std::cell::Cell;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const DEFAULT_API_BASE: &str = "https://api.wanikani.com/v2/";
const API_REVISION: &str = "20170710";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("failed to decode summary: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LessonBucket {
    #[serde(default)]
    pub available_at: Option<String>,
    #[serde(default)]
    pub subject_ids: Vec<u64>,
}

/// Summary report listing the subjects currently available for lessons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Summary {
    #[serde(alias = "lessonCounts", default)]
    pub lessons: Vec<LessonBucket>,
}

impl Summary {
    pub fn with_subjects(subject_ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            lessons: vec![LessonBucket {
                available_at: None,
                subject_ids: subject_ids.into_iter().collect(),
            }],
        }
    }

    /// Total lessons available now. The first bucket is the current one.
    pub fn total_lessons(&self) -> usize {
        self.lessons
            .first()
            .map(|bucket| bucket.subject_ids.len())
            .unwrap_or(0)
    }

    /// Accepts either the bare summary object or an API response envelope
    /// carrying it under `data`.
    pub fn from_json(raw: &str) -> Result<Self, SourceError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Payload {
            Envelope { data: Summary },
            Bare(Summary),
        }

        Ok(match serde_json::from_str::<Payload>(raw)? {
            Payload::Envelope { data } => data,
            Payload::Bare(summary) => summary,
        })
    }
}

/// Supplies the data the decorated tile displays. A rejection is treated as a
/// single run failure and never retried by the caller.
#[async_trait(?Send)]
pub trait DataSource {
    async fn fetch_summary(&self) -> Result<Summary, SourceError>;
}

pub struct HttpDataSource {
    client: reqwest::Client,
    endpoint: Url,
    token: String,
}

impl HttpDataSource {
    pub fn new(token: impl Into<String>) -> Result<Self, SourceError> {
        Self::with_base(Url::parse(DEFAULT_API_BASE)?, token)
    }

    pub fn with_base(base: Url, token: impl Into<String>) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: base.join("summary")?,
            token: token.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait(?Send)]
impl DataSource for HttpDataSource {
    async fn fetch_summary(&self) -> Result<Summary, SourceError> {
        tracing::debug!(endpoint = %self.endpoint, "fetching summary");
        let response = self
            .client
            .get(self.endpoint.clone())
            .bearer_auth(&self.token)
            .header("Wanikani-Revision", API_REVISION)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        Summary::from_json(&body)
    }
}

/// Serves a fixed summary, optionally failing every call.
pub struct StaticDataSource {
    summary: Summary,
    failure: Option<String>,
    calls: Cell<usize>,
}

impl StaticDataSource {
    pub fn new(summary: Summary) -> Self {
        Self {
            summary,
            failure: None,
            calls: Cell::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            summary: Summary::default(),
            failure: Some(message.into()),
            calls: Cell::new(0),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::new(Summary::from_json(&raw)?))
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

#[async_trait(?Send)]
impl DataSource for StaticDataSource {
    async fn fetch_summary(&self) -> Result<Summary, SourceError> {
        self.calls.set(self.calls.get() + 1);
        tokio::task::yield_now().await;
        match &self.failure {
            Some(message) => Err(SourceError::Unavailable(message.clone())),
            None => Ok(self.summary.clone()),
        }
    }
}
