use std::time::Duration;

use serde_json::Value;
use tessera_config::{HttpMethod, HttpParams};
use tessera_host_http::{HttpRequest, Method};

use crate::context::TaskContext;
use crate::error::TaskError;

pub(crate) async fn run(ctx: &TaskContext, params: &HttpParams) -> Result<Value, TaskError> {
  let request = HttpRequest {
    method: method(params.method),
    url: params.url.clone(),
    body: params.request_data.clone(),
    timeout: params.timeout_ms.map(Duration::from_millis),
    allow_unrestricted: params.allow_unrestricted_network_access.unwrap_or(false),
  };

  let body = ctx.http.send(request).await?;
  Ok(Value::String(body))
}

fn method(method: HttpMethod) -> Method {
  match method {
    HttpMethod::Get => Method::GET,
    HttpMethod::Post => Method::POST,
    HttpMethod::Put => Method::PUT,
    HttpMethod::Patch => Method::PATCH,
    HttpMethod::Delete => Method::DELETE,
    HttpMethod::Head => Method::HEAD,
  }
}
