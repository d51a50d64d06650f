use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use tessera_pipeline::{NodeKind, PipelineSpec};

use crate::{
  Bridge, Error, Job, JobSpecError, PipelineRun, PipelineSpecRecord, RunStatus, Store, TaskRun,
  TaskSpecRecord,
};

/// SQLite-based store implementation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database at `url` and apply migrations.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(url)?
      .create_if_missing(true)
      .foreign_keys(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// A private in-memory database with migrations applied.
  ///
  /// Limited to one connection that is never recycled, since every SQLite
  /// memory connection is its own database.
  pub async fn in_memory() -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect_with(options)
      .await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }
}

/// Lease lifetimes are capped so expiry timestamps stay comparable as text.
const MAX_LEASE_TTL_DAYS: i64 = 36_500;

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
  let cap = chrono::Duration::days(MAX_LEASE_TTL_DAYS);
  let ttl = chrono::Duration::from_std(ttl).unwrap_or(cap).min(cap);
  now + ttl
}

#[async_trait]
impl Store for SqliteStore {
  async fn create_job(
    &self,
    name: Option<&str>,
    source: &str,
    spec: &PipelineSpec,
  ) -> Result<Job, Error> {
    let now = Utc::now();
    let mut tx = self.pool.begin().await?;

    let spec_id: i64 = sqlx::query_scalar(
      r#"
      INSERT INTO pipeline_specs (spec, source, created_at)
      VALUES (?, ?, ?)
      RETURNING id
      "#,
    )
    .bind(Json(spec))
    .bind(source)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    for task in &spec.tasks {
      let params = match &task.kind {
        NodeKind::Task(params) => Some(Json(params)),
        NodeKind::Result => None,
      };

      sqlx::query(
        r#"
        INSERT INTO pipeline_task_specs (pipeline_spec_id, dot_id, task_type, params, successors, position)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
      )
      .bind(spec_id)
      .bind(&task.dot_id)
      .bind(task.task_type())
      .bind(params)
      .bind(Json(&task.successors))
      .bind(task.index as i64)
      .execute(&mut *tx)
      .await?;
    }

    let job: Job = sqlx::query_as(
      r#"
      INSERT INTO jobs (name, pipeline_spec_id, created_at)
      VALUES (?, ?, ?)
      RETURNING id, name, pipeline_spec_id, created_at
      "#,
    )
    .bind(name)
    .bind(spec_id)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(job)
  }

  async fn get_job(&self, job_id: i64) -> Result<Job, Error> {
    sqlx::query_as(
      r#"
      SELECT id, name, pipeline_spec_id, created_at
      FROM jobs
      WHERE id = ?
      "#,
    )
    .bind(job_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))
  }

  async fn get_job_for_spec(&self, spec_id: i64) -> Result<Job, Error> {
    sqlx::query_as(
      r#"
      SELECT id, name, pipeline_spec_id, created_at
      FROM jobs
      WHERE pipeline_spec_id = ?
      "#,
    )
    .bind(spec_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("job for pipeline spec {}", spec_id)))
  }

  async fn list_jobs(&self) -> Result<Vec<Job>, Error> {
    Ok(
      sqlx::query_as(
        r#"
        SELECT id, name, pipeline_spec_id, created_at
        FROM jobs
        ORDER BY id ASC
        "#,
      )
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn delete_job(&self, job_id: i64) -> Result<(), Error> {
    let mut tx = self.pool.begin().await?;

    let spec_id: i64 = sqlx::query_scalar("SELECT pipeline_spec_id FROM jobs WHERE id = ?")
      .bind(job_id)
      .fetch_optional(&mut *tx)
      .await?
      .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

    sqlx::query("DELETE FROM jobs WHERE id = ?")
      .bind(job_id)
      .execute(&mut *tx)
      .await?;

    sqlx::query("DELETE FROM pipeline_specs WHERE id = ?")
      .bind(spec_id)
      .execute(&mut *tx)
      .await?;

    tx.commit().await?;
    Ok(())
  }

  async fn get_pipeline_spec(&self, spec_id: i64) -> Result<PipelineSpecRecord, Error> {
    sqlx::query_as(
      r#"
      SELECT id, spec, source, created_at
      FROM pipeline_specs
      WHERE id = ?
      "#,
    )
    .bind(spec_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("pipeline spec {}", spec_id)))
  }

  async fn list_task_specs(&self, spec_id: i64) -> Result<Vec<TaskSpecRecord>, Error> {
    Ok(
      sqlx::query_as(
        r#"
        SELECT pipeline_spec_id, dot_id, task_type, params, successors, position
        FROM pipeline_task_specs
        WHERE pipeline_spec_id = ?
        ORDER BY position ASC
        "#,
      )
      .bind(spec_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn create_run(
    &self,
    spec_id: i64,
    overrides: Option<&Value>,
  ) -> Result<PipelineRun, Error> {
    Ok(
      sqlx::query_as(
        r#"
        INSERT INTO pipeline_runs (pipeline_spec_id, overrides, status, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id, pipeline_spec_id, overrides, status, error, created_at, finished_at
        "#,
      )
      .bind(spec_id)
      .bind(overrides.map(Json))
      .bind(RunStatus::Pending)
      .bind(Utc::now())
      .fetch_one(&self.pool)
      .await?,
    )
  }

  async fn get_run(&self, run_id: i64) -> Result<PipelineRun, Error> {
    sqlx::query_as(
      r#"
      SELECT id, pipeline_spec_id, overrides, status, error, created_at, finished_at
      FROM pipeline_runs
      WHERE id = ?
      "#,
    )
    .bind(run_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("pipeline run {}", run_id)))
  }

  async fn update_run_status(
    &self,
    run_id: i64,
    status: RunStatus,
    error: Option<&str>,
    finished_at: Option<DateTime<Utc>>,
  ) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
      UPDATE pipeline_runs
      SET status = ?, error = ?, finished_at = ?
      WHERE id = ?
      "#,
    )
    .bind(status)
    .bind(error)
    .bind(finished_at)
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("pipeline run {}", run_id)));
    }
    Ok(())
  }

  async fn list_runs(&self, spec_id: i64) -> Result<Vec<PipelineRun>, Error> {
    Ok(
      sqlx::query_as(
        r#"
        SELECT id, pipeline_spec_id, overrides, status, error, created_at, finished_at
        FROM pipeline_runs
        WHERE pipeline_spec_id = ?
        ORDER BY id DESC
        "#,
      )
      .bind(spec_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn list_incomplete_runs(&self) -> Result<Vec<PipelineRun>, Error> {
    Ok(
      sqlx::query_as(
        r#"
        SELECT id, pipeline_spec_id, overrides, status, error, created_at, finished_at
        FROM pipeline_runs
        WHERE status IN (?, ?)
        ORDER BY id ASC
        "#,
      )
      .bind(RunStatus::Pending)
      .bind(RunStatus::Running)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn create_task_run(&self, task_run: &TaskRun) -> Result<(), Error> {
    sqlx::query(
      r#"
      INSERT INTO pipeline_task_runs (id, pipeline_run_id, dot_id, output, error, created_at, finished_at)
      VALUES (?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&task_run.id)
    .bind(task_run.pipeline_run_id)
    .bind(&task_run.dot_id)
    .bind(&task_run.output)
    .bind(&task_run.error)
    .bind(task_run.created_at)
    .bind(task_run.finished_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn finish_task_run(
    &self,
    task_run_id: &str,
    output: Option<&Value>,
    error: Option<&str>,
    finished_at: DateTime<Utc>,
  ) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
      UPDATE pipeline_task_runs
      SET output = ?, error = ?, finished_at = ?
      WHERE id = ?
      "#,
    )
    .bind(output.map(Json))
    .bind(error)
    .bind(finished_at)
    .bind(task_run_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("task run {}", task_run_id)));
    }
    Ok(())
  }

  async fn list_task_runs(&self, run_id: i64) -> Result<Vec<TaskRun>, Error> {
    Ok(
      sqlx::query_as(
        r#"
        SELECT id, pipeline_run_id, dot_id, output, error, created_at, finished_at
        FROM pipeline_task_runs
        WHERE pipeline_run_id = ?
        ORDER BY created_at ASC, dot_id ASC
        "#,
      )
      .bind(run_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn delete_unfinished_task_runs(&self, run_id: i64) -> Result<u64, Error> {
    let result = sqlx::query(
      "DELETE FROM pipeline_task_runs WHERE pipeline_run_id = ? AND finished_at IS NULL",
    )
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected())
  }

  async fn record_job_error(&self, job_id: i64, description: &str) -> Result<(), Error> {
    let now = Utc::now();
    sqlx::query(
      r#"
      INSERT INTO job_spec_errors (job_id, description, occurrences, created_at, updated_at)
      VALUES (?, ?, 1, ?, ?)
      ON CONFLICT (job_id, description)
      DO UPDATE SET occurrences = job_spec_errors.occurrences + 1, updated_at = excluded.updated_at
      "#,
    )
    .bind(job_id)
    .bind(description)
    .bind(now)
    .bind(now)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn list_job_errors(&self, job_id: i64) -> Result<Vec<JobSpecError>, Error> {
    Ok(
      sqlx::query_as(
        r#"
        SELECT id, job_id, description, occurrences, created_at, updated_at
        FROM job_spec_errors
        WHERE job_id = ?
        ORDER BY id ASC
        "#,
      )
      .bind(job_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn claim_unclaimed_jobs(&self, holder_id: &str, ttl: Duration) -> Result<Vec<i64>, Error> {
    let now = Utc::now();

    // `WHERE true` keeps SQLite from reading ON CONFLICT as a join clause.
    let mut claimed: Vec<i64> = sqlx::query_scalar(
      r#"
      INSERT INTO job_leases (job_id, holder_id, expires_at)
      SELECT id, ?1, ?2 FROM jobs WHERE true
      ON CONFLICT (job_id) DO UPDATE
        SET holder_id = excluded.holder_id, expires_at = excluded.expires_at
        WHERE job_leases.expires_at < ?3 OR job_leases.holder_id = excluded.holder_id
      RETURNING job_id
      "#,
    )
    .bind(holder_id)
    .bind(expiry(now, ttl))
    .bind(now)
    .fetch_all(&self.pool)
    .await?;

    claimed.sort_unstable();
    Ok(claimed)
  }

  async fn claim_job(&self, job_id: i64, holder_id: &str, ttl: Duration) -> Result<bool, Error> {
    let now = Utc::now();

    let claimed: Option<i64> = sqlx::query_scalar(
      r#"
      INSERT INTO job_leases (job_id, holder_id, expires_at)
      SELECT id, ?1, ?2 FROM jobs WHERE id = ?4
      ON CONFLICT (job_id) DO UPDATE
        SET holder_id = excluded.holder_id, expires_at = excluded.expires_at
        WHERE job_leases.expires_at < ?3 OR job_leases.holder_id = excluded.holder_id
      RETURNING job_id
      "#,
    )
    .bind(holder_id)
    .bind(expiry(now, ttl))
    .bind(now)
    .bind(job_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(claimed.is_some())
  }

  async fn renew_leases(&self, holder_id: &str, ttl: Duration) -> Result<u64, Error> {
    let result = sqlx::query("UPDATE job_leases SET expires_at = ? WHERE holder_id = ?")
      .bind(expiry(Utc::now(), ttl))
      .bind(holder_id)
      .execute(&self.pool)
      .await?;

    Ok(result.rows_affected())
  }

  async fn release_leases(&self, holder_id: &str) -> Result<u64, Error> {
    let result = sqlx::query("DELETE FROM job_leases WHERE holder_id = ?")
      .bind(holder_id)
      .execute(&self.pool)
      .await?;

    Ok(result.rows_affected())
  }

  async fn upsert_bridge(&self, name: &str, url: &str) -> Result<Bridge, Error> {
    Ok(
      sqlx::query_as(
        r#"
        INSERT INTO bridges (name, url, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT (name) DO UPDATE SET url = excluded.url
        RETURNING name, url, created_at
        "#,
      )
      .bind(name)
      .bind(url)
      .bind(Utc::now())
      .fetch_one(&self.pool)
      .await?,
    )
  }

  async fn get_bridge(&self, name: &str) -> Result<Option<Bridge>, Error> {
    Ok(
      sqlx::query_as("SELECT name, url, created_at FROM bridges WHERE name = ?")
        .bind(name)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn list_bridges(&self) -> Result<Vec<Bridge>, Error> {
    Ok(
      sqlx::query_as("SELECT name, url, created_at FROM bridges ORDER BY name ASC")
        .fetch_all(&self.pool)
        .await?,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_expiry_is_capped() {
    let now = Utc::now();
    assert_eq!(
      expiry(now, Duration::MAX),
      now + chrono::Duration::days(MAX_LEASE_TTL_DAYS)
    );
    assert_eq!(expiry(now, Duration::from_secs(30)), now + chrono::Duration::seconds(30));
  }
}
