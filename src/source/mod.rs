pub mod error;

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use error::SourceError;

pub const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com/posts";
pub const DEFAULT_LIMIT: u64 = 10;
pub const DEFAULT_USER_AGENT: &str = concat!("postpager/", env!("CARGO_PKG_VERSION"));
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Identifier of a record, owned by the remote collection.
///
/// Served ids may be JSON numbers or strings; both are kept in their textual
/// form, which is what `post-{id}` and the `id_ne` filter are built from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        RecordId(id.to_string())
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId(id.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(serde_json::Number),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => RecordId(n.to_string()),
            RawId::Text(s) => RecordId(s),
        })
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("record ids cannot be empty or contain spaces or commas")]
pub struct InvalidRecordId;

impl std::str::FromStr for RecordId {
    type Err = InvalidRecordId;

    // commas would split the id inside the `id_ne` filter
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.contains(',') || s.contains(char::is_whitespace) {
            return Err(InvalidRecordId);
        }
        Ok(RecordId(s.to_string()))
    }
}

// a listed item as served by the remote collection; extra fields are ignored
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

// one list query: pagination, optional free-text search and the ids to leave out
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchQuery {
    pub limit: u64,
    pub page: u64,
    pub search: Option<String>,
    pub exclude: Vec<RecordId>,
}

impl Default for FetchQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            page: 1,
            search: None,
            exclude: Vec::new(),
        }
    }
}

/// Builds `{base}?_limit=N&_page=P[&q=TEXT][&id_ne=ID1,ID2,...]`.
///
/// `q` is left out for an empty search and `id_ne` for an empty exclusion list.
pub fn build_url(base: &Url, query: &FetchQuery) -> Url {
    let mut url = base.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("_limit", &query.limit.to_string());
        pairs.append_pair("_page", &query.page.to_string());
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.append_pair("q", search);
        }
        if !query.exclude.is_empty() {
            let ids = query
                .exclude
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            pairs.append_pair("id_ne", &ids);
        }
    }
    url
}

pub fn build_count_url(base: &Url) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("_limit", "0");
    url
}

pub fn parse_base_url(raw: &str) -> Result<Url, SourceError> {
    Url::parse(raw.trim()).map_err(|e| SourceError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })
}

pub fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), SourceError> {
    let invalid = || SourceError::InvalidHeader {
        header: raw.to_string(),
    };
    let (key, value) = raw.split_once(':').ok_or_else(invalid)?;
    let name = HeaderName::from_bytes(key.trim().as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_str(value.trim()).map_err(|_| invalid())?;
    Ok((name, value))
}

#[derive(Clone, Debug)]
pub struct SourceOptions {
    pub base_url: String,
    pub timeout: Option<Duration>,
    pub proxy: Option<String>,
    pub header: Option<String>,
    pub user_agent: String,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            proxy: None,
            header: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

// the remote collection; cheap to clone, clones share one connection pool
#[derive(Clone, Debug)]
pub struct RemoteRecordSource {
    base_url: Url,
    client: reqwest::Client,
}

impl RemoteRecordSource {
    pub fn new(options: &SourceOptions) -> Result<Self, SourceError> {
        let base_url = parse_base_url(&options.base_url)?;

        let mut headers = HeaderMap::new();
        let user_agent =
            HeaderValue::from_str(&options.user_agent).map_err(|_| SourceError::InvalidHeader {
                header: format!("User-Agent: {}", options.user_agent),
            })?;
        headers.insert(reqwest::header::USER_AGENT, user_agent);
        if let Some(raw) = options.header.as_deref().filter(|h| !h.trim().is_empty()) {
            let (name, value) = parse_header(raw)?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| SourceError::ProxySetup {
                proxy: proxy.to_string(),
                source: e,
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| SourceError::HttpClientBuild { source: e })?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Asks for an empty page and reads the collection size from `x-total-count`.
    ///
    /// A missing or non-numeric header leaves the total unknown.
    pub async fn get_count(&self) -> Result<Option<u64>, SourceError> {
        let resp = self
            .client
            .get(build_count_url(&self.base_url))
            .send()
            .await?;
        let count = resp
            .headers()
            .get(TOTAL_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        Ok(count)
    }

    /// Fetches one page of records in server order.
    ///
    /// The HTTP status is not inspected; a body that is not a record array
    /// fails as a decode error.
    pub async fn fetch_records(&self, query: &FetchQuery) -> Result<Vec<Record>, SourceError> {
        let resp = self
            .client
            .get(build_url(&self.base_url, query))
            .send()
            .await?;
        let body = resp.bytes().await?;
        let records = serde_json::from_slice::<Vec<Record>>(&body)?;
        Ok(records)
    }
}
