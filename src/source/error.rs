use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    // the one runtime failure kind; carries "<name>: <message>" of the underlying error
    #[error("{message}")]
    Network { message: String },

    #[error("invalid base URL: {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("invalid header '{header}', expected 'Key: Value'")]
    InvalidHeader { header: String },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },
}

impl SourceError {
    pub fn network(name: &str, message: impl std::fmt::Display) -> Self {
        SourceError::Network {
            message: format!("{name}: {message}"),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, SourceError::Network { .. })
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::network(transport_error_name(&e), &e)
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::network("DecodeError", e)
    }
}

pub(crate) fn transport_error_name(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "TimeoutError"
    } else if e.is_connect() {
        "ConnectError"
    } else if e.is_decode() {
        "DecodeError"
    } else if e.is_redirect() {
        "RedirectError"
    } else if e.is_body() {
        "BodyError"
    } else if e.is_request() {
        "RequestError"
    } else {
        "NetworkError"
    }
}
