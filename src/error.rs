use thiserror::Error;

/// A single outbound request failed (network, timeout or non-success status).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// A response body could not be turned into an element tree or a field value.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("invalid escape sequence: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
    #[error("text is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("element <{0}> is never closed")]
    Unclosed(String),
    #[error("document has no root element")]
    Empty,
}

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
