use std::time::Duration;

use serde_json::{Value, json};
use tessera_config::BridgeParams;
use tessera_host_http::HttpRequest;

use crate::context::TaskContext;
use crate::error::TaskError;

/// POST `{"id": <run id>, "data": <request_data>}` to the named bridge.
///
/// Bridge URLs are registered by the operator, so they bypass the
/// public-address restriction.
pub(crate) async fn run(ctx: &TaskContext, params: &BridgeParams) -> Result<Value, TaskError> {
  let url = ctx
    .bridges
    .bridge_url(&params.name)
    .await?
    .ok_or_else(|| TaskError::BridgeNotFound {
      name: params.name.clone(),
    })?;

  let payload = json!({
    "id": ctx.run_id,
    "data": params.request_data.clone().unwrap_or_else(|| json!({})),
  });

  let mut request = HttpRequest::post_json(url, payload);
  request.timeout = params.timeout_ms.map(Duration::from_millis);
  request.allow_unrestricted = true;

  let body = ctx.http.send(request).await?;
  Ok(Value::String(body))
}
