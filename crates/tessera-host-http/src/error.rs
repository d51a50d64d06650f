use thiserror::Error;

/// Errors that can occur while performing an outbound request.
#[derive(Debug, Error)]
pub enum HttpError {
  #[error("invalid url '{url}': {message}")]
  InvalidUrl { url: String, message: String },

  #[error("unsupported url scheme: {scheme}")]
  UnsupportedScheme { scheme: String },

  /// DNS resolution failed or returned nothing.
  #[error("could not resolve host '{host}': {message}")]
  Resolve { host: String, message: String },

  /// The destination is not a public address and unrestricted access is off.
  #[error("request to {url} denied: {addr} is not a public address")]
  Denied { url: String, addr: String },

  /// The remote answered with a non-2xx status.
  #[error("got error from {url}: HTTP status {status}")]
  Status { url: String, status: u16 },

  #[error("request to {url} exceeded {max} redirects")]
  TooManyRedirects { url: String, max: usize },

  #[error("request to {url} timed out after {timeout_ms}ms")]
  Timeout { url: String, timeout_ms: u64 },

  #[error("http error: {0}")]
  Request(#[from] reqwest::Error),
}
