//! A pool of worker threads that run the stateless, CPU-bound portion of
//! consensus (header checks, proof-of-space verification, VDF output shape,
//! signature aggregation, required-iters/cost accounting) for one block per
//! task. Generalizes the nonce-search worker pool pattern this workspace
//! already used for mining into a generic consensus pre-validation pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use consensus_types::StorageError;
use tokio::sync::oneshot;

/// What one pre-validation task produces for a single block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreValidationResult {
    pub error: Option<PreValidationError>,
    pub required_iters: Option<u64>,
    pub validated_signature: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreValidationError {
    BadHeader,
    BadProofOfSpace,
    BadVdfShape,
    BadSignature,
}

/// The CPU-bound work for one block, injected by the caller. Proof-of-space
/// verification and signature checking are out-of-scope primitives this pool
/// merely schedules; it does not implement them.
pub type ValidationJob = Box<dyn FnOnce() -> PreValidationResult + Send + 'static>;

/// Something that can run a `ValidationJob` and hand back its result.
#[async_trait]
pub trait PreValidationPool: Send + Sync {
    async fn dispatch(&self, job: ValidationJob) -> Result<PreValidationResult, StorageError>;

    /// Shuts the pool down; further `dispatch` calls fail with
    /// `StorageError::PoolShutDown` rather than panicking.
    async fn shut_down(&self);
}

enum Task {
    Run(ValidationJob, oneshot::Sender<PreValidationResult>),
}

/// A pool of OS threads with a bounded channel, sized
/// `max(cpu_count - reserved_cores, 1)`, capped at 61 (mirrors a legacy
/// platform handle limit).
pub struct ThreadPool {
    sender: Option<std_mpsc::SyncSender<Task>>,
    workers: Vec<JoinHandle<()>>,
    shut_down: Arc<AtomicBool>,
}

const MAX_WORKERS: usize = 61;

impl ThreadPool {
    /// `available_parallelism` stands in for `cpu_count`; `reserved_cores`
    /// is subtracted from it before clamping to `[1, MAX_WORKERS]`.
    #[must_use]
    pub fn new(reserved_cores: usize) -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1);
        let worker_count = cpu_count.saturating_sub(reserved_cores).max(1).min(MAX_WORKERS);
        Self::with_worker_count(worker_count)
    }

    #[must_use]
    pub fn with_worker_count(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = std_mpsc::sync_channel::<Task>(worker_count * 4);
        let receiver = Arc::new(std::sync::Mutex::new(receiver));
        let shut_down = Arc::new(AtomicBool::new(false));

        let workers = (0..worker_count)
            .map(|_| {
                let receiver = receiver.clone();
                std::thread::spawn(move || loop {
                    let task = receiver.lock().expect("worker mutex poisoned").recv();
                    match task {
                        Ok(Task::Run(job, responder)) => {
                            let result = job();
                            let _ = responder.send(result);
                        }
                        Err(_) => break, // sender dropped: shut down
                    }
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            shut_down,
        }
    }
}

#[async_trait]
impl PreValidationPool for ThreadPool {
    async fn dispatch(&self, job: ValidationJob) -> Result<PreValidationResult, StorageError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(StorageError::PoolShutDown);
        }
        let (tx, rx) = oneshot::channel();
        self.sender
            .as_ref()
            .ok_or(StorageError::PoolShutDown)?
            .send(Task::Run(job, tx))
            .map_err(|_| StorageError::PoolShutDown)?;
        rx.await.map_err(|_| StorageError::PoolShutDown)
    }

    async fn shut_down(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Dropping the sender closes the channel; workers observe `Err` on
        // `recv` and exit their loops on their own, so `join` below cannot
        // deadlock.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Runs every job synchronously on the calling task. The test-time stand-in
/// for `ThreadPool`.
#[derive(Debug, Default)]
pub struct InlineExecutor {
    shut_down: AtomicBool,
}

impl InlineExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreValidationPool for InlineExecutor {
    async fn dispatch(&self, job: ValidationJob) -> Result<PreValidationResult, StorageError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(StorageError::PoolShutDown);
        }
        Ok(job())
    }

    async fn shut_down(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}
