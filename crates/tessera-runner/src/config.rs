use std::time::Duration;

/// Configuration for the runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
  /// Timeout for `http` and `bridge` tasks that do not set their own.
  pub default_http_timeout: Duration,
  /// How long `await_run` waits when the caller gives no deadline.
  pub await_timeout: Duration,
  /// Allow tasks to reach non-public network addresses.
  pub allow_unrestricted_network_access: bool,
  /// Upper bound on tasks executing at once, across all runs.
  pub max_concurrent_tasks: usize,
  /// Lifetime of a job lease before another instance may claim the job.
  pub lease_ttl: Duration,
  /// Identifies this instance in the lease table.
  pub holder_id: String,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      default_http_timeout: Duration::from_secs(15),
      await_timeout: Duration::from_secs(30),
      allow_unrestricted_network_access: false,
      max_concurrent_tasks: 64,
      lease_ttl: Duration::from_secs(30),
      holder_id: uuid::Uuid::new_v4().to_string(),
    }
  }
}
