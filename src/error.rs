use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("no listings recognised at {url}")]
    NoListings { url: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("subscriber store error: {0}")]
    Store(String),

    #[error("dispatch to {address} failed: {reason}")]
    Dispatch { address: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelParseError {
    #[error("unknown theater id: {0}")]
    UnknownTheater(String),

    #[error("preference must look like kind:value with kind film, director or actor, got \"{0}\"")]
    Preference(String),
}
