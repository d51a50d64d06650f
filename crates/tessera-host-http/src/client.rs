use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Method, Response, StatusCode};
use tracing::{debug, warn};
use url::{Host, Url};

use crate::error::HttpError;
use crate::policy::{HttpPolicy, is_public_ip};

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: String,
  /// Sent as a JSON body when present.
  pub body: Option<serde_json::Value>,
  /// Overrides [`HttpPolicy::default_timeout`].
  pub timeout: Option<Duration>,
  /// Per-request override of [`HttpPolicy::allow_unrestricted`].
  pub allow_unrestricted: bool,
}

impl HttpRequest {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: Method::GET,
      url: url.into(),
      body: None,
      timeout: None,
      allow_unrestricted: false,
    }
  }

  pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
    Self {
      method: Method::POST,
      body: Some(body),
      ..Self::get(url)
    }
  }
}

/// Hops followed for a checked request before giving up.
const MAX_REDIRECTS: usize = 10;

/// Policy-enforcing HTTP client shared by all tasks of a runner.
#[derive(Debug, Clone)]
pub struct HttpClient {
  policy: HttpPolicy,
  unrestricted: Client,
  /// Addresses a checked request may connect to.
  allowed: fn(IpAddr) -> bool,
}

impl HttpClient {
  pub fn new(policy: HttpPolicy) -> Self {
    Self {
      policy,
      unrestricted: Client::new(),
      allowed: is_public_ip,
    }
  }

  /// Perform the request and return the response body as a string.
  ///
  /// Non-2xx responses are errors naming the status and url.
  pub async fn send(&self, request: HttpRequest) -> Result<String, HttpError> {
    let url = parse_url(&request.url)?;
    let timeout = request.timeout.unwrap_or(self.policy.default_timeout);
    let restricted = !(self.policy.allow_unrestricted || request.allow_unrestricted);

    debug!(method = %request.method, url = %request.url, "http_request");

    let response = if restricted {
      self.send_checked(&request, url, timeout).await?
    } else {
      let mut builder = self
        .unrestricted
        .request(request.method.clone(), url)
        .timeout(timeout);
      if let Some(body) = &request.body {
        builder = builder.json(body);
      }
      builder
        .send()
        .await
        .map_err(|e| request_error(e, &request.url, timeout))?
    };

    let status = response.status();
    if !status.is_success() {
      return Err(HttpError::Status {
        url: request.url,
        status: status.as_u16(),
      });
    }

    response
      .text()
      .await
      .map_err(|e| request_error(e, &request.url, timeout))
  }

  /// Send with every hop checked, following redirects by hand.
  ///
  /// Each redirect target is resolved and checked like the original
  /// destination before it is contacted.
  async fn send_checked(
    &self,
    request: &HttpRequest,
    mut url: Url,
    timeout: Duration,
  ) -> Result<Response, HttpError> {
    let mut method = request.method.clone();
    let mut body = request.body.clone();

    for _ in 0..=MAX_REDIRECTS {
      let client = self.pinned_client(&url).await?;
      let mut builder = client.request(method.clone(), url.clone()).timeout(timeout);
      if let Some(body) = &body {
        builder = builder.json(body);
      }
      let response = builder
        .send()
        .await
        .map_err(|e| request_error(e, &request.url, timeout))?;

      let status = response.status();
      let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok());
      let Some(location) = location.filter(|_| status.is_redirection()) else {
        return Ok(response);
      };

      let next = url.join(location).map_err(|e| HttpError::InvalidUrl {
        url: location.to_string(),
        message: e.to_string(),
      })?;
      check_scheme(&next)?;

      // 307 and 308 repeat the request as is; other redirects become a GET.
      if status != StatusCode::TEMPORARY_REDIRECT && status != StatusCode::PERMANENT_REDIRECT {
        if method != Method::HEAD {
          method = Method::GET;
        }
        body = None;
      }

      debug!(from = %url, to = %next, status = status.as_u16(), "http_redirect");
      url = next;
    }

    Err(HttpError::TooManyRedirects {
      url: request.url.clone(),
      max: MAX_REDIRECTS,
    })
  }

  /// Resolve the destination, refuse non-public addresses, and build a client
  /// that connects only to the checked address and never follows redirects.
  async fn pinned_client(&self, url: &Url) -> Result<Client, HttpError> {
    let host = url.host().ok_or_else(|| HttpError::InvalidUrl {
      url: url.to_string(),
      message: "missing host".to_string(),
    })?;
    let port = url.port_or_known_default().unwrap_or(80);

    let (domain, addrs): (Option<String>, Vec<SocketAddr>) = match host {
      Host::Ipv4(ip) => (None, vec![SocketAddr::new(IpAddr::V4(ip), port)]),
      Host::Ipv6(ip) => (None, vec![SocketAddr::new(IpAddr::V6(ip), port)]),
      Host::Domain(domain) => {
        let addrs = tokio::net::lookup_host((domain, port))
          .await
          .map_err(|e| HttpError::Resolve {
            host: domain.to_string(),
            message: e.to_string(),
          })?
          .collect::<Vec<_>>();
        (Some(domain.to_string()), addrs)
      }
    };

    let Some(first) = addrs.first().copied() else {
      return Err(HttpError::Resolve {
        host: url.host_str().unwrap_or_default().to_string(),
        message: "no addresses returned".to_string(),
      });
    };

    // Every resolved address must be allowed, so a mixed answer cannot be
    // used to reach an internal service.
    if let Some(denied) = addrs.iter().find(|addr| !(self.allowed)(addr.ip())) {
      warn!(url = %url, addr = %denied.ip(), "http_request_denied");
      return Err(HttpError::Denied {
        url: url.to_string(),
        addr: denied.ip().to_string(),
      });
    }

    let mut builder = Client::builder().redirect(Policy::none());
    if let Some(domain) = domain {
      builder = builder.resolve(&domain, first);
    }
    Ok(builder.build()?)
  }
}

fn parse_url(raw: &str) -> Result<Url, HttpError> {
  let url = Url::parse(raw).map_err(|e| HttpError::InvalidUrl {
    url: raw.to_string(),
    message: e.to_string(),
  })?;
  check_scheme(&url)?;
  Ok(url)
}

fn check_scheme(url: &Url) -> Result<(), HttpError> {
  match url.scheme() {
    "http" | "https" => Ok(()),
    other => Err(HttpError::UnsupportedScheme {
      scheme: other.to_string(),
    }),
  }
}

fn request_error(e: reqwest::Error, url: &str, timeout: Duration) -> HttpError {
  if e.is_timeout() {
    HttpError::Timeout {
      url: url.to_string(),
      timeout_ms: timeout.as_millis() as u64,
    }
  } else {
    HttpError::Request(e)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::Router;
  use axum::http::StatusCode;
  use axum::response::Redirect;
  use axum::routing::{get, post};

  async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
  }

  fn unrestricted() -> HttpClient {
    HttpClient::new(HttpPolicy {
      allow_unrestricted: true,
      ..HttpPolicy::default()
    })
  }

  /// A checked client that treats loopback as reachable and everything
  /// else non-public as internal.
  fn loopback_only() -> HttpClient {
    HttpClient {
      allowed: |ip: IpAddr| ip.is_loopback() || is_public_ip(ip),
      ..HttpClient::new(HttpPolicy::default())
    }
  }

  #[tokio::test]
  async fn test_redirect_to_internal_address_is_denied() {
    let base = serve(Router::new().route(
      "/",
      get(|| async { Redirect::temporary("http://10.0.0.1/secret") }),
    ))
    .await;

    let err = loopback_only().send(HttpRequest::get(&base)).await.unwrap_err();
    assert!(matches!(err, HttpError::Denied { ref addr, .. } if addr == "10.0.0.1"));
  }

  #[tokio::test]
  async fn test_checked_redirect_is_followed() {
    let base = serve(
      Router::new()
        .route("/start", get(|| async { Redirect::to("/final") }))
        .route("/final", get(|| async { "done" })),
    )
    .await;

    let body = loopback_only()
      .send(HttpRequest::get(format!("{}/start", base)))
      .await
      .unwrap();
    assert_eq!(body, "done");
  }

  #[tokio::test]
  async fn test_redirect_loop_is_bounded() {
    let base = serve(Router::new().route(
      "/loop",
      get(|| async { Redirect::temporary("/loop") }),
    ))
    .await;

    let err = loopback_only()
      .send(HttpRequest::get(format!("{}/loop", base)))
      .await
      .unwrap_err();
    assert!(matches!(err, HttpError::TooManyRedirects { max: 10, .. }));
  }

  #[tokio::test]
  async fn test_loopback_is_denied_by_default() {
    let base = serve(Router::new().route("/", get(|| async { "ok" }))).await;
    let client = HttpClient::new(HttpPolicy::default());

    let err = client.send(HttpRequest::get(&base)).await.unwrap_err();
    assert!(matches!(err, HttpError::Denied { ref addr, .. } if addr == "127.0.0.1"));
  }

  #[tokio::test]
  async fn test_per_request_override_allows_loopback() {
    let base = serve(Router::new().route("/", get(|| async { "ok" }))).await;
    let client = HttpClient::new(HttpPolicy::default());

    let mut request = HttpRequest::get(&base);
    request.allow_unrestricted = true;
    assert_eq!(client.send(request).await.unwrap(), "ok");
  }

  #[tokio::test]
  async fn test_body_is_returned_verbatim() {
    let base = serve(Router::new().route(
      "/price",
      get(|| async { r#"{"data":{"result":62.57}}"# }),
    ))
    .await;

    let body = unrestricted()
      .send(HttpRequest::get(format!("{}/price", base)))
      .await
      .unwrap();
    assert_eq!(body, r#"{"data":{"result":62.57}}"#);
  }

  #[tokio::test]
  async fn test_json_body_is_sent() {
    let base = serve(Router::new().route(
      "/echo",
      post(|body: String| async move { body }),
    ))
    .await;

    let body = unrestricted()
      .send(HttpRequest::post_json(
        format!("{}/echo", base),
        serde_json::json!({"id": 1}),
      ))
      .await
      .unwrap();
    assert_eq!(body, r#"{"id":1}"#);
  }

  #[tokio::test]
  async fn test_non_success_status_is_error() {
    let base = serve(Router::new().route(
      "/",
      get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
    ))
    .await;

    let err = unrestricted().send(HttpRequest::get(&base)).await.unwrap_err();
    assert!(matches!(err, HttpError::Status { status: 502, .. }));
    assert!(err.to_string().contains("HTTP status 502"));
  }

  #[tokio::test]
  async fn test_timeout() {
    let base = serve(Router::new().route(
      "/slow",
      get(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        "late"
      }),
    ))
    .await;

    let mut request = HttpRequest::get(format!("{}/slow", base));
    request.timeout = Some(Duration::from_millis(50));
    let err = unrestricted().send(request).await.unwrap_err();
    assert!(matches!(err, HttpError::Timeout { timeout_ms: 50, .. }));
  }

  #[tokio::test]
  async fn test_unsupported_scheme() {
    let err = unrestricted()
      .send(HttpRequest::get("ftp://example.com/file"))
      .await
      .unwrap_err();
    assert!(matches!(err, HttpError::UnsupportedScheme { .. }));
  }
}
