use std::sync::Arc;

use async_trait::async_trait;
use tessera_store::Store;
use tessera_task::{BridgeLookup, TaskError};

/// Resolves bridge names through the store's bridge registry.
pub struct StoreBridges {
  store: Arc<dyn Store>,
}

impl StoreBridges {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store }
  }
}

#[async_trait]
impl BridgeLookup for StoreBridges {
  async fn bridge_url(&self, name: &str) -> Result<Option<String>, TaskError> {
    self
      .store
      .get_bridge(name)
      .await
      .map(|bridge| bridge.map(|b| b.url))
      .map_err(|e| TaskError::BridgeLookup {
        message: e.to_string(),
      })
  }
}
