//! Integration tests for SqliteStore.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tessera_pipeline::{PipelineSpec, compile_toml};
use tessera_store::{Error, RunStatus, SqliteStore, Store, TaskRun};

fn spec() -> PipelineSpec {
  compile_toml(
    r#"
name = "eth-usd"

[[tasks]]
id = "ds1"
type = "http"
url = "https://example.com/price"

[[tasks]]
id = "ds1_parse"
type = "jsonparse"
inputs = ["ds1"]
path = "data,result"
"#,
  )
  .unwrap()
}

async fn store() -> SqliteStore {
  SqliteStore::in_memory().await.unwrap()
}

#[tokio::test]
async fn test_create_job_persists_spec_and_task_specs() {
  let store = store().await;
  let spec = spec();

  let job = store
    .create_job(Some("eth-usd"), "source text", &spec)
    .await
    .unwrap();
  assert_eq!(job.name.as_deref(), Some("eth-usd"));

  let record = store.get_pipeline_spec(job.pipeline_spec_id).await.unwrap();
  assert_eq!(record.spec.0, spec);
  assert_eq!(record.source, "source text");

  let task_specs = store.list_task_specs(job.pipeline_spec_id).await.unwrap();
  let dot_ids: Vec<&str> = task_specs.iter().map(|t| t.dot_id.as_str()).collect();
  assert_eq!(dot_ids, vec!["ds1", "ds1_parse", "__result__"]);
  assert_eq!(task_specs[0].task_type, "http");
  assert_eq!(task_specs[0].successors.0, vec!["ds1_parse".to_string()]);
  assert_eq!(task_specs[2].task_type, "result");
  assert!(task_specs[2].params.is_none());

  assert_eq!(store.list_jobs().await.unwrap(), vec![job]);
}

#[tokio::test]
async fn test_run_lifecycle() {
  let store = store().await;
  let job = store.create_job(None, "", &spec()).await.unwrap();

  let overrides = json!({"ds1": "{\"data\":{\"result\":1}}"});
  let run = store
    .create_run(job.pipeline_spec_id, Some(&overrides))
    .await
    .unwrap();
  assert_eq!(run.status, RunStatus::Pending);
  assert_eq!(run.overrides.as_ref().map(|o| &o.0), Some(&overrides));

  let task_run = TaskRun::start(run.id, "ds1");
  store.create_task_run(&task_run).await.unwrap();

  let in_flight = store.list_task_runs(run.id).await.unwrap();
  assert_eq!(in_flight.len(), 1);
  assert_eq!(in_flight[0].outcome(), None);

  store
    .finish_task_run(&task_run.id, Some(&json!(null)), None, Utc::now())
    .await
    .unwrap();

  let finished = store.list_task_runs(run.id).await.unwrap();
  // a null output is still a success
  assert_eq!(finished[0].outcome(), Some(Ok(json!(null))));

  store
    .update_run_status(run.id, RunStatus::Complete, None, Some(Utc::now()))
    .await
    .unwrap();
  let run = store.get_run(run.id).await.unwrap();
  assert_eq!(run.status, RunStatus::Complete);
  assert!(run.finished_at.is_some());
  assert!(store.list_incomplete_runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_task_run_error_outcome() {
  let store = store().await;
  let job = store.create_job(None, "", &spec()).await.unwrap();
  let run = store.create_run(job.pipeline_spec_id, None).await.unwrap();

  let task_run = TaskRun::start(run.id, "ds1_parse");
  store.create_task_run(&task_run).await.unwrap();
  store
    .finish_task_run(&task_run.id, None, Some("boom"), Utc::now())
    .await
    .unwrap();

  let rows = store.list_task_runs(run.id).await.unwrap();
  assert_eq!(rows[0].outcome(), Some(Err("boom".to_string())));
}

#[tokio::test]
async fn test_incomplete_runs_and_unfinished_task_runs() {
  let store = store().await;
  let job = store.create_job(None, "", &spec()).await.unwrap();
  let run = store.create_run(job.pipeline_spec_id, None).await.unwrap();

  let done = TaskRun::start(run.id, "ds1");
  store.create_task_run(&done).await.unwrap();
  store
    .finish_task_run(&done.id, Some(&json!("body")), None, Utc::now())
    .await
    .unwrap();
  store
    .create_task_run(&TaskRun::start(run.id, "ds1_parse"))
    .await
    .unwrap();

  let incomplete = store.list_incomplete_runs().await.unwrap();
  assert_eq!(incomplete.len(), 1);
  assert_eq!(incomplete[0].id, run.id);

  assert_eq!(store.delete_unfinished_task_runs(run.id).await.unwrap(), 1);
  let remaining = store.list_task_runs(run.id).await.unwrap();
  assert_eq!(remaining.len(), 1);
  assert_eq!(remaining[0].dot_id, "ds1");
}

#[tokio::test]
async fn test_job_errors_count_occurrences() {
  let store = store().await;
  let job = store.create_job(None, "", &spec()).await.unwrap();

  store.record_job_error(job.id, "bridge down").await.unwrap();
  store.record_job_error(job.id, "bridge down").await.unwrap();
  store.record_job_error(job.id, "timeout").await.unwrap();

  let errors = store.list_job_errors(job.id).await.unwrap();
  assert_eq!(errors.len(), 2);
  assert_eq!(errors[0].description, "bridge down");
  assert_eq!(errors[0].occurrences, 2);
  assert_eq!(errors[1].occurrences, 1);
}

#[tokio::test]
async fn test_delete_job_cascades() {
  let store = store().await;
  let job = store.create_job(None, "", &spec()).await.unwrap();
  let run = store.create_run(job.pipeline_spec_id, None).await.unwrap();
  store
    .create_task_run(&TaskRun::start(run.id, "ds1"))
    .await
    .unwrap();
  store.record_job_error(job.id, "oops").await.unwrap();
  store
    .claim_unclaimed_jobs("node-a", Duration::from_secs(60))
    .await
    .unwrap();

  store.delete_job(job.id).await.unwrap();

  assert!(matches!(store.get_job(job.id).await, Err(Error::NotFound(_))));
  assert!(matches!(
    store.get_pipeline_spec(job.pipeline_spec_id).await,
    Err(Error::NotFound(_))
  ));
  assert!(matches!(store.get_run(run.id).await, Err(Error::NotFound(_))));
  assert!(store.list_task_runs(run.id).await.unwrap().is_empty());
  assert!(store.list_job_errors(job.id).await.unwrap().is_empty());
  assert!(store.list_task_specs(job.pipeline_spec_id).await.unwrap().is_empty());
  assert_eq!(store.release_leases("node-a").await.unwrap(), 0);

  assert!(matches!(store.delete_job(job.id).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_leases_are_not_double_claimed() {
  let store = store().await;
  let first = store.create_job(None, "", &spec()).await.unwrap();
  let second = store.create_job(None, "", &spec()).await.unwrap();

  let claimed = store
    .claim_unclaimed_jobs("node-a", Duration::from_secs(60))
    .await
    .unwrap();
  assert_eq!(claimed, vec![first.id, second.id]);

  // live leases belong to node-a
  let stolen = store
    .claim_unclaimed_jobs("node-b", Duration::from_secs(60))
    .await
    .unwrap();
  assert!(stolen.is_empty());

  assert_eq!(
    store
      .renew_leases("node-a", Duration::from_secs(60))
      .await
      .unwrap(),
    2
  );
}

#[tokio::test]
async fn test_expired_leases_can_be_claimed() {
  let store = store().await;
  let job = store.create_job(None, "", &spec()).await.unwrap();

  store
    .claim_unclaimed_jobs("node-a", Duration::ZERO)
    .await
    .unwrap();
  tokio::time::sleep(Duration::from_millis(20)).await;

  let claimed = store
    .claim_unclaimed_jobs("node-b", Duration::from_secs(60))
    .await
    .unwrap();
  assert_eq!(claimed, vec![job.id]);
  assert_eq!(store.release_leases("node-a").await.unwrap(), 0);
  assert_eq!(store.release_leases("node-b").await.unwrap(), 1);
}

#[tokio::test]
async fn test_claim_single_job() {
  let store = store().await;
  let job = store.create_job(None, "", &spec()).await.unwrap();
  assert_eq!(store.get_job_for_spec(job.pipeline_spec_id).await.unwrap().id, job.id);
  assert!(matches!(
    store.get_job_for_spec(job.pipeline_spec_id + 1).await,
    Err(Error::NotFound(_))
  ));

  let ttl = Duration::from_secs(60);
  assert!(store.claim_job(job.id, "node-a", ttl).await.unwrap());
  // reclaiming our own lease extends it
  assert!(store.claim_job(job.id, "node-a", ttl).await.unwrap());
  assert!(!store.claim_job(job.id, "node-b", ttl).await.unwrap());
  assert!(!store.claim_job(job.id + 1, "node-a", ttl).await.unwrap());

  store.release_leases("node-a").await.unwrap();
  assert!(store.claim_job(job.id, "node-b", ttl).await.unwrap());
}

#[tokio::test]
async fn test_bridges() {
  let store = store().await;
  assert!(store.get_bridge("election").await.unwrap().is_none());

  store
    .upsert_bridge("election", "http://localhost:1/a")
    .await
    .unwrap();
  let updated = store
    .upsert_bridge("election", "http://localhost:2/b")
    .await
    .unwrap();
  assert_eq!(updated.url, "http://localhost:2/b");

  let bridge = store.get_bridge("election").await.unwrap().unwrap();
  assert_eq!(bridge.url, "http://localhost:2/b");
  assert_eq!(store.list_bridges().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_on_disk_database() {
  let dir = tempfile::tempdir().unwrap();
  let url = format!("sqlite://{}", dir.path().join("tessera.db").display());

  let job_id = {
    let store = SqliteStore::connect(&url).await.unwrap();
    store.create_job(None, "", &spec()).await.unwrap().id
  };

  let store = SqliteStore::connect(&url).await.unwrap();
  assert_eq!(store.get_job(job_id).await.unwrap().id, job_id);
}
