use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_host_http::HttpClient;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Resolves bridge names to adapter URLs.
#[async_trait]
pub trait BridgeLookup: Send + Sync {
  /// Returns `None` when no bridge is registered under `name`.
  async fn bridge_url(&self, name: &str) -> Result<Option<String>, TaskError>;
}

#[async_trait]
impl BridgeLookup for HashMap<String, String> {
  async fn bridge_url(&self, name: &str) -> Result<Option<String>, TaskError> {
    Ok(self.get(name).cloned())
  }
}

/// Everything a task may use besides its inputs.
#[derive(Clone)]
pub struct TaskContext {
  /// Id of the run the task belongs to. Sent to bridges.
  pub run_id: i64,
  pub cancel: CancellationToken,
  pub http: HttpClient,
  pub bridges: Arc<dyn BridgeLookup>,
}
