//! Admission control and lifecycle status over a real broker.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use imagen_core::admission::WorkerTasks;
use imagen_core::error::CoreError;
use imagen_core::params::GenerationParams;
use imagen_core::progress::JobPhase;
use imagen_queue::backend::ResultBackend;
use imagen_queue::broker::Broker;
use imagen_queue::client::LifecycleClient;
use imagen_queue::job::QueueName;
use imagen_queue::state::{JobState, JobStatus};
use imagen_queue::submit::{AdmissionController, QueueInspector, Submitter};

fn setup(limit: usize) -> (Arc<Broker>, Submitter, LifecycleClient) {
    let backend = Arc::new(ResultBackend::default());
    let broker = Arc::new(Broker::new("worker-1", Arc::clone(&backend)));
    let admission = AdmissionController::new(broker.clone(), limit);
    let submitter = Submitter::new(Arc::clone(&broker), admission);
    (broker, submitter, LifecycleClient::new(backend))
}

struct UnreachableBroker;

#[async_trait]
impl QueueInspector for UnreachableBroker {
    async fn active(&self) -> Result<WorkerTasks, CoreError> {
        Err(CoreError::Internal("connection refused".into()))
    }

    async fn scheduled(&self) -> Result<WorkerTasks, CoreError> {
        Ok(WorkerTasks::new())
    }
}

struct StaticInspector {
    active: WorkerTasks,
    scheduled: WorkerTasks,
}

#[async_trait]
impl QueueInspector for StaticInspector {
    async fn active(&self) -> Result<WorkerTasks, CoreError> {
        Ok(self.active.clone())
    }

    async fn scheduled(&self) -> Result<WorkerTasks, CoreError> {
        Ok(self.scheduled.clone())
    }
}

// ---------------------------------------------------------------------------
// Test: admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn n_jobs_admitted_then_capacity_error_until_one_leaves() {
    let (broker, submitter, _) = setup(3);

    for expected in 1..=3 {
        let sub = submitter
            .submit_generation(GenerationParams::new("harbour at night"))
            .await
            .unwrap();
        assert_eq!(sub.position, expected);
    }

    let err = submitter
        .submit_generation(GenerationParams::new("one too many"))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Capacity { pending: 3, limit: 3 });
    assert!(err.is_retryable());

    // Executing still counts as pending.
    let job = broker.reserve(QueueName::Generation).await;
    assert_matches!(
        submitter
            .submit_generation(GenerationParams::new("still full"))
            .await,
        Err(CoreError::Capacity { .. })
    );

    broker.ack(QueueName::Generation, &job.id).await;
    let sub = submitter
        .submit_generation(GenerationParams::new("fits again"))
        .await
        .unwrap();
    assert_eq!(sub.position, 3);
}

#[tokio::test]
async fn invalid_params_never_reach_the_queue() {
    let (broker, submitter, _) = setup(10);
    let mut params = GenerationParams::new("x");
    params.model = "unknown".into();

    assert_matches!(
        submitter.submit_generation(params).await,
        Err(CoreError::Validation(_))
    );
    assert_eq!(broker.depth(QueueName::Generation).await, 0);
}

#[tokio::test]
async fn introspection_failure_fails_closed() {
    let admission = AdmissionController::new(Arc::new(UnreachableBroker), 100);
    let err = admission.check().await.unwrap_err();
    assert_matches!(err, CoreError::Unavailable(_));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn controller_counts_distinct_tasks_per_worker() {
    let mut active = WorkerTasks::new();
    active.insert("w1".into(), vec!["a".into()]);
    let mut scheduled = WorkerTasks::new();
    scheduled.insert("w1".into(), vec!["a".into(), "b".into()]);
    scheduled.insert("w2".into(), vec!["c".into()]);

    let inspector = Arc::new(StaticInspector { active, scheduled });
    assert_eq!(AdmissionController::new(inspector.clone(), 4).check().await.unwrap(), 4);
    assert_matches!(
        AdmissionController::new(inspector, 3).check().await,
        Err(CoreError::Capacity { pending: 3, limit: 3 })
    );
}

#[tokio::test]
async fn validation_jobs_bypass_admission() {
    let (broker, submitter, client) = setup(0);
    let id = submitter.submit_validation("electra", "front").await.unwrap();
    assert_eq!(client.status(&id).await, JobStatus::Queued);
    assert_eq!(broker.depth(QueueName::Validation).await, 1);
}

// ---------------------------------------------------------------------------
// Test: lifecycle status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_queued_and_in_progress_are_distinct() {
    let (broker, submitter, client) = setup(10);

    assert_eq!(client.status("never-submitted").await, JobStatus::NotFound);

    let sub = submitter
        .submit_generation(GenerationParams::new("lighthouse"))
        .await
        .unwrap();
    assert_eq!(client.status(&sub.job_id).await, JobStatus::Queued);

    let job = broker.reserve(QueueName::Generation).await;
    broker
        .backend()
        .publish(&job.id, JobState::progress(JobPhase::Generation))
        .await
        .unwrap();
    assert_eq!(
        client.status(&sub.job_id).await,
        JobStatus::InProgress {
            phase: JobPhase::Generation,
            progress: 10
        }
    );
}

#[tokio::test]
async fn expired_results_read_as_not_found() {
    let backend = Arc::new(ResultBackend::new(Duration::from_millis(20)));
    let client = LifecycleClient::new(Arc::clone(&backend));

    backend.publish("j1", JobState::Queued).await.unwrap();
    backend
        .publish("j1", JobState::Failure { error: "boom".into() })
        .await
        .unwrap();
    assert_eq!(
        client.status("j1").await,
        JobStatus::Failed { error: "boom".into() }
    );

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(client.status("j1").await, JobStatus::NotFound);
}

#[tokio::test]
async fn wait_for_terminal_follows_updates() {
    let backend = Arc::new(ResultBackend::default());
    let client = LifecycleClient::new(Arc::clone(&backend));
    backend.publish("j1", JobState::Queued).await.unwrap();

    let publisher = {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            backend
                .publish("j1", JobState::progress(JobPhase::Initialisation))
                .await
                .unwrap();
            backend
                .publish("j1", JobState::Failure { error: "engine down".into() })
                .await
                .unwrap();
        })
    };

    let status = tokio::time::timeout(Duration::from_secs(2), client.wait_for_terminal("j1"))
        .await
        .expect("job settles");
    assert_eq!(
        status,
        JobStatus::Failed {
            error: "engine down".into()
        }
    );
    publisher.await.unwrap();

    assert_eq!(client.wait_for_terminal("unknown").await, JobStatus::NotFound);
}
