//! Background deploy tasks
//!
//! Creation paths that should not block on a build submit a job here and
//! return its id; callers poll [`DeployQueue::status`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use openapi_server::models::{JobResponse, JobState};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::deploy::manager::{DeployRequest, DeploymentManager};
use crate::errors::ControlError;
use crate::models::DeploymentStatus;
use crate::store::StoreExt;

/// Deploy queue options
#[derive(Debug, Clone)]
pub struct Options {
    /// Jobs buffered before `submit` waits
    pub capacity: usize,
    /// How long a finished job stays pollable
    pub retention: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            capacity: 256,
            retention: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug)]
struct Job {
    id: Uuid,
    service_id: Uuid,
    request: DeployRequest,
}

/// Pollable record of one job
#[derive(Debug, Clone)]
struct JobRecord {
    service_id: Uuid,
    state: JobState,
    queued_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRecord {
    fn is_finished(&self) -> bool {
        matches!(self.state, JobState::Succeeded { .. } | JobState::Failed { .. })
    }
}

type Jobs = Arc<RwLock<HashMap<Uuid, JobRecord>>>;

/// Submission handle; cheap to clone
#[derive(Clone)]
pub struct DeployQueue {
    tx: mpsc::Sender<Job>,
    jobs: Jobs,
    retention: Duration,
}

/// Receiving half, consumed by [`run`]
pub struct DeployWorker {
    rx: mpsc::Receiver<Job>,
    jobs: Jobs,
}

impl DeployQueue {
    pub fn new(options: &Options) -> (Self, DeployWorker) {
        let (tx, rx) = mpsc::channel(options.capacity.max(1));
        let jobs: Jobs = Arc::new(RwLock::new(HashMap::new()));
        (
            Self {
                tx,
                jobs: jobs.clone(),
                retention: options.retention,
            },
            DeployWorker { rx, jobs },
        )
    }

    /// Queue a deploy of `service_id` and return the job id
    pub async fn submit(&self, service_id: Uuid, request: DeployRequest) -> Result<Uuid, ControlError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.prune(now).await;
        self.jobs.write().await.insert(
            id,
            JobRecord {
                service_id,
                state: JobState::Queued,
                queued_at: now,
                updated_at: now,
            },
        );

        if self
            .tx
            .send(Job {
                id,
                service_id,
                request,
            })
            .await
            .is_err()
        {
            self.jobs.write().await.remove(&id);
            return Err(ControlError::ServiceUnavailable(
                "Deploy queue is shut down".to_string(),
            ));
        }
        debug!("Queued deploy job {} for service {}", id, service_id);
        Ok(id)
    }

    /// Forget finished jobs older than the retention window
    async fn prune(&self, now: DateTime<Utc>) {
        let Some(cutoff) = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
        else {
            return;
        };
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, record| !record.is_finished() || record.updated_at > cutoff);
        if jobs.len() < before {
            debug!("Pruned {} finished deploy jobs", before - jobs.len());
        }
    }

    pub async fn status(&self, id: Uuid) -> Result<JobResponse, ControlError> {
        let jobs = self.jobs.read().await;
        let record = jobs.get(&id).ok_or_else(|| ControlError::not_found("Job", id))?;
        Ok(JobResponse {
            id,
            service_id: record.service_id,
            status: record.state.clone(),
            queued_at: record.queued_at,
            updated_at: record.updated_at,
        })
    }
}

async fn set_state(jobs: &Jobs, id: Uuid, state: JobState) {
    if let Some(record) = jobs.write().await.get_mut(&id) {
        record.state = state;
        record.updated_at = Utc::now();
    }
}

async fn execute(manager: &DeploymentManager, job: Job) -> JobState {
    let service = match manager.store().service(job.service_id).await {
        Ok(service) => service,
        Err(e) => return JobState::Failed { error: e.to_string() },
    };

    match manager.deploy(&service, job.request).await {
        Ok(deployment) if deployment.status == DeploymentStatus::Running => JobState::Succeeded {
            deployment_id: deployment.id,
        },
        Ok(deployment) => JobState::Failed {
            error: deployment
                .error_message
                .unwrap_or_else(|| format!("deployment {} ended {}", deployment.id, deployment.status)),
        },
        Err(e) => JobState::Failed { error: e.to_string() },
    }
}

/// Drain the queue until shutdown, running each job as its own task.
///
/// Jobs already started are awaited before returning.
pub async fn run(
    worker: DeployWorker,
    manager: Arc<DeploymentManager>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Deploy worker starting...");
    let DeployWorker { mut rx, jobs } = worker;
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Deploy worker shutting down...");
                break;
            }
            job = rx.recv() => {
                let Some(job) = job else { break };
                let manager = manager.clone();
                let jobs = jobs.clone();
                running.spawn(async move {
                    let id = job.id;
                    set_state(&jobs, id, JobState::Running).await;
                    let state = execute(&manager, job).await;
                    if let JobState::Failed { error } = &state {
                        error!("Deploy job {} failed: {}", id, error);
                    }
                    set_state(&jobs, id, state).await;
                });
            }
            Some(_) = running.join_next(), if !running.is_empty() => {}
        }
    }

    rx.close();
    while running.join_next().await.is_some() {}
    info!("Deploy worker stopped");
}
