//! Bounded background pool running verification jobs
//!
//! Jobs wait in a fixed-capacity queue and at most `concurrency` run at once.
//! Every job ends with exactly one terminal write; a panicking job is logged as
//! a dead letter and recorded as `Unknown`.

use crate::{
    config::{WorkerConfig, MAX_QUEUE_CAPACITY, MAX_WORKERS},
    error::{Error, Result},
    request::{VerificationOutcome, VerificationRequest},
    storage::{Storage, StorageError},
    verify::VerificationPipeline,
};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
};

/// A stored Pending request plus the code it must match
#[derive(Debug, Clone)]
pub struct Job {
    pub request: VerificationRequest,
    pub deployed_bytecode: Vec<u8>,
}

/// Executes jobs and writes their terminal status
#[derive(Clone)]
pub struct Worker {
    storage: Arc<dyn Storage>,
    pipeline: VerificationPipeline,
}

impl Worker {
    pub fn new(storage: Arc<dyn Storage>, pipeline: VerificationPipeline) -> Self {
        Self { storage, pipeline }
    }

    pub async fn process(&self, job: Job) {
        let outcome = self
            .pipeline
            .run(&job.request, &job.deployed_bytecode)
            .await;
        self.finish(&job.request, outcome).await;
    }

    /// Persists `outcome`. A `Successful` outcome that loses the race against
    /// another successful verification of the same address is recorded as
    /// `Unknown` instead.
    pub async fn finish(&self, request: &VerificationRequest, outcome: VerificationOutcome) {
        let result = match self.storage.finish_request(request.id, &outcome).await {
            Err(StorageError::Conflict { address }) => {
                tracing::warn!(
                    "Verification {} matched but {} was verified concurrently",
                    request.id,
                    address
                );
                let conflict = VerificationOutcome {
                    contract_name: outcome.contract_name,
                    ..VerificationOutcome::unknown(&Error::Conflict { address })
                };
                self.storage.finish_request(request.id, &conflict).await
            }
            other => other,
        };

        if let Err(e) = result {
            tracing::error!("Failed to record outcome of verification {}: {}", request.id, e);
        }
    }
}

/// Handle to the dispatcher task and its queue
pub struct WorkerPool {
    queue: mpsc::Sender<Job>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    dispatcher: JoinHandle<()>,
}

/// A reserved queue slot. Dropping it without sending releases the slot.
pub struct QueueSlot<'a> {
    permit: mpsc::Permit<'a, Job>,
}

impl QueueSlot<'_> {
    pub fn send(self, job: Job) {
        self.permit.send(job);
    }
}

impl WorkerPool {
    /// Spawns the dispatcher. Must be called within a Tokio runtime.
    pub fn start(worker: Worker, config: &WorkerConfig) -> Self {
        let concurrency = config.concurrency.clamp(1, MAX_WORKERS);
        let capacity = config.queue_capacity.clamp(1, MAX_QUEUE_CAPACITY);
        let (queue, rx) = mpsc::channel(capacity);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let dispatcher = tokio::spawn(dispatch(rx, semaphore.clone(), worker));

        tracing::info!(
            "Verification pool started: concurrency={}, queue_capacity={}",
            concurrency,
            capacity
        );

        Self {
            queue,
            semaphore,
            concurrency,
            dispatcher,
        }
    }

    /// Reserves a queue slot without waiting. Fails with
    /// [`Error::QueueFull`] when every slot is taken.
    pub fn reserve(&self) -> Result<QueueSlot<'_>> {
        self.queue
            .try_reserve()
            .map(|permit| QueueSlot { permit })
            .map_err(|_| Error::QueueFull)
    }

    /// Stops accepting jobs and waits for queued and running ones to finish
    pub async fn shutdown(self) {
        drop(self.queue);
        if let Err(e) = self.dispatcher.await {
            tracing::error!("Verification dispatcher stopped abnormally: {}", e);
        }
        // every running job holds a permit until it has written its outcome
        match u32::try_from(self.concurrency) {
            Ok(permits) => {
                let _ = self.semaphore.acquire_many(permits).await;
            }
            Err(_) => tracing::error!(
                "Cannot drain {} verification workers, not waiting for running jobs",
                self.concurrency
            ),
        }
        tracing::info!("Verification pool stopped");
    }
}

async fn dispatch(mut rx: mpsc::Receiver<Job>, semaphore: Arc<Semaphore>, worker: Worker) {
    loop {
        // wait for capacity before taking the next job so the rest stay queued
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let Some(job) = rx.recv().await else {
            break;
        };
        tokio::spawn(run_job(worker.clone(), job, permit));
    }
}

async fn run_job(worker: Worker, job: Job, _permit: OwnedSemaphorePermit) {
    let request = job.request.clone();
    let task = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.process(job).await })
    };

    if let Err(e) = task.await {
        tracing::error!(
            request_id = request.id,
            address = %request.address,
            "Dead letter: verification job aborted: {}",
            e
        );
        let reason = if e.is_panic() {
            "verification worker panicked"
        } else {
            "verification worker was cancelled"
        };
        let outcome = VerificationOutcome {
            error_message: Some(reason.to_string()),
            ..VerificationOutcome::unknown(&Error::Internal(reason.to_string()))
        };
        worker.finish(&request, outcome).await;
    }
}
