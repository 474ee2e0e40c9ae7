//! Job worker pool: claims due jobs and runs them through the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use scribe_core::{defaults, Result, Stage};
use scribe_db::Database;

use crate::orchestrator::{Orchestrator, ProcessOutcome};
use crate::EVENT_BUS_CAPACITY;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of jobs processed concurrently. Each may hold an adapter call
    /// open for seconds.
    pub pool_size: usize,
    /// Polling interval when the queue is empty (milliseconds).
    pub poll_interval_ms: u64,
    /// Whether to process jobs at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: defaults::WORKER_POOL_SIZE,
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_POOL_SIZE` | `4` | Concurrent workers |
    /// | `JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let pool_size = std::env::var("JOB_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::WORKER_POOL_SIZE)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        Self {
            pool_size,
            poll_interval_ms,
            enabled,
        }
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    JobStarted {
        job_id: Uuid,
        note_id: Uuid,
        stage: Stage,
    },
    JobCompleted {
        job_id: Uuid,
        note_id: Uuid,
        stage: Stage,
    },
    JobRetried {
        job_id: Uuid,
        note_id: Uuid,
        stage: Stage,
        attempt: i32,
    },
    JobFailed {
        job_id: Uuid,
        note_id: Uuid,
        stage: Stage,
    },
    JobCancelled {
        job_id: Uuid,
        note_id: Uuid,
    },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| scribe_core::Error::Internal("failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Worker pool that drives claimed jobs through the orchestrator.
pub struct JobWorker {
    db: Database,
    orchestrator: Arc<Orchestrator>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    pub fn new(db: Database, orchestrator: Arc<Orchestrator>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            db,
            orchestrator,
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker loop and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Process every currently claimable job (including immediate retries)
    /// and return the number processed. Used by tests and batch tooling.
    pub async fn drain(&self) -> Result<usize> {
        let mut processed = 0;
        while let Some(job) = self.db.jobs.claim_next().await? {
            self.execute(job).await;
            processed += 1;
        }
        Ok(processed)
    }

    #[instrument(skip_all)]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            pool_size = self.config.pool_size,
            poll_interval_ms = self.config.poll_interval_ms,
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            // Claim up to pool_size jobs and run them concurrently; each
            // worker slot executes one job to completion.
            let mut tasks = tokio::task::JoinSet::new();
            let mut claimed = 0;
            for _ in 0..self.config.pool_size {
                match self.db.jobs.claim_next().await {
                    Ok(Some(job)) => {
                        claimed += 1;
                        let orchestrator = self.orchestrator.clone();
                        let event_tx = self.event_tx.clone();
                        tasks.spawn(async move {
                            execute_job(orchestrator, event_tx, job).await;
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Failed to claim job");
                        break;
                    }
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing job batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    async fn execute(&self, job: scribe_core::Job) {
        execute_job(self.orchestrator.clone(), self.event_tx.clone(), job).await;
    }
}

async fn execute_job(
    orchestrator: Arc<Orchestrator>,
    event_tx: broadcast::Sender<WorkerEvent>,
    job: scribe_core::Job,
) {
    let job_id = job.id;
    let stage = job.stage;
    let note_id = job.note_id;

    let _ = event_tx.send(WorkerEvent::JobStarted {
        job_id,
        note_id,
        stage,
    });

    match orchestrator.process(job).await {
        Ok(ProcessOutcome::Completed { stage, note_id }) => {
            let _ = event_tx.send(WorkerEvent::JobCompleted {
                job_id,
                note_id,
                stage,
            });
        }
        Ok(ProcessOutcome::Retried {
            stage,
            note_id,
            attempt,
        }) => {
            let _ = event_tx.send(WorkerEvent::JobRetried {
                job_id,
                note_id,
                stage,
                attempt,
            });
        }
        Ok(ProcessOutcome::Failed { stage, note_id }) => {
            let _ = event_tx.send(WorkerEvent::JobFailed {
                job_id,
                note_id,
                stage,
            });
        }
        Ok(ProcessOutcome::Degraded { note_id }) => {
            let _ = event_tx.send(WorkerEvent::JobCompleted {
                job_id,
                note_id,
                stage,
            });
        }
        Ok(ProcessOutcome::Cancelled { note_id }) => {
            let _ = event_tx.send(WorkerEvent::JobCancelled { job_id, note_id });
        }
        Err(e) => {
            error!(%job_id, error = %e, "Job processing errored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.pool_size, defaults::WORKER_POOL_SIZE);
        assert_eq!(config.poll_interval_ms, defaults::JOB_POLL_INTERVAL_MS);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_pool_size(8)
            .with_poll_interval(50)
            .with_enabled(false);
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.poll_interval_ms, 50);
        assert!(!config.enabled);
    }

    #[test]
    fn test_worker_config_pool_floor() {
        let config = WorkerConfig::default().with_pool_size(0);
        assert_eq!(config.pool_size, 1);
    }

    #[test]
    fn test_worker_event_clone_and_debug() {
        let event = WorkerEvent::JobStarted {
            job_id: Uuid::new_v4(),
            note_id: Uuid::new_v4(),
            stage: Stage::Transcribe,
        };
        let cloned = event.clone();
        let debug = format!("{cloned:?}");
        assert!(debug.contains("JobStarted"));
        assert!(debug.contains("Transcribe"));
    }
}
