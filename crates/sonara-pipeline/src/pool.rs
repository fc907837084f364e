//! Bounded extraction worker pool.
//!
//! Workers are scoped OS threads pulling from a shared job channel. A
//! [`PoolSession`] keeps the same workers alive across every batch of a run,
//! and each worker builds its extractor from the factory once, on its first
//! item, so a loaded model is reused until the session ends. No mutable
//! state crosses a worker boundary.
//!
//! Factory calls and extractions run under `catch_unwind`: a panicking
//! extractor turns into an Absent outcome for that one row, and the worker
//! throws its extractor away and builds a fresh one before taking more work.
//! A panicking factory aborts the run.
//!
//! Isolation is per thread, not per process. An unwinding panic is
//! contained, but an abort or a segfault inside native code (an ONNX
//! runtime, an image codec) takes the whole process down. The per-batch
//! checkpoint bounds that loss to the batch in flight.
//!
//! Results arrive in completion order; callers key them by row.

use sonara_core::{Error, Result};
use sonara_extract::{ExtractorFactory, FeatureExtractor, WorkItem};
use sonara_pipeline_state::RowOutcome;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, mpsc};

/// Default worker count: available parallelism minus one, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

/// What one batch produced.
#[derive(Debug, Clone, Default)]
pub struct PoolOutput {
    /// One outcome per dispatched item, in completion order.
    pub outcomes: Vec<RowOutcome>,
    /// Items that produced a vector.
    pub succeeded: usize,
    /// Items that returned an error.
    pub failed: usize,
    /// Items whose extractor panicked.
    pub crashed: usize,
}

#[derive(Debug)]
enum Message {
    Done(RowOutcome),
    Failed(RowOutcome),
    Crashed(RowOutcome),
    Fatal(Error),
}

/// A fixed-size pool of extraction workers.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(default_workers())
    }
}

impl WorkerPool {
    /// Create a pool with `workers` threads (at least one).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Configured worker count.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start the workers, hand a session to `body`, and join the workers
    /// once `body` returns.
    ///
    /// Every batch run through the session is served by the same workers
    /// and the same extractors.
    pub fn session<R>(
        &self,
        factory: &dyn ExtractorFactory,
        body: impl FnOnce(&mut PoolSession<'_>) -> Result<R>,
    ) -> Result<R> {
        let (job_tx, job_rx) = mpsc::channel::<WorkItem>();
        let jobs = Mutex::new(job_rx);
        let abort = AtomicBool::new(false);
        let (result_tx, result_rx) = mpsc::channel();

        std::thread::scope(|scope| {
            for worker in 0..self.workers {
                let tx = result_tx.clone();
                let jobs = &jobs;
                let abort = &abort;
                scope.spawn(move || worker_loop(worker, factory, jobs, abort, &tx));
            }
            drop(result_tx);

            let mut session = PoolSession {
                jobs: job_tx,
                results: result_rx,
                abort: &abort,
            };
            let result = body(&mut session);
            // Closing the job channel lets idle workers exit so the scope can join.
            drop(session);
            result
        })
    }

    /// Run a single batch in a short-lived session.
    ///
    /// # Errors
    ///
    /// See [`PoolSession::run_batch`].
    pub fn run(&self, factory: &dyn ExtractorFactory, items: Vec<WorkItem>) -> Result<PoolOutput> {
        if items.is_empty() {
            return Ok(PoolOutput::default());
        }
        WorkerPool::new(self.workers.min(items.len()))
            .session(factory, |session| session.run_batch(items))
    }
}

/// Live workers, fed one batch at a time.
#[derive(Debug)]
pub struct PoolSession<'s> {
    jobs: mpsc::Sender<WorkItem>,
    results: mpsc::Receiver<Message>,
    abort: &'s AtomicBool,
}

impl PoolSession<'_> {
    /// Run every item through the workers' extractors.
    ///
    /// Blocks until all items have an outcome.
    ///
    /// # Errors
    ///
    /// Fails when an extractor reports a configuration error (for example a
    /// model that cannot be loaded) or the factory panics. Remaining queued
    /// items are then abandoned, no partial output is returned, and every
    /// later batch in the session fails too.
    pub fn run_batch(&mut self, items: Vec<WorkItem>) -> Result<PoolOutput> {
        if self.abort.load(Ordering::SeqCst) {
            return Err(Error::operation("Worker pool was aborted by an earlier failure"));
        }
        let expected = items.len();
        for item in items {
            self.jobs
                .send(item)
                .map_err(|_| Error::operation("Worker pool job channel closed"))?;
        }

        let mut output = PoolOutput::default();
        while output.outcomes.len() < expected {
            let message = self
                .results
                .recv()
                .map_err(|_| Error::operation("All extraction workers exited"))?;
            match message {
                Message::Done(outcome) => {
                    output.succeeded += 1;
                    output.outcomes.push(outcome);
                }
                Message::Failed(outcome) => {
                    output.failed += 1;
                    output.outcomes.push(outcome);
                }
                Message::Crashed(outcome) => {
                    output.crashed += 1;
                    output.outcomes.push(outcome);
                }
                Message::Fatal(e) => return Err(e),
            }
        }
        Ok(output)
    }
}

fn worker_loop(
    worker: usize,
    factory: &dyn ExtractorFactory,
    jobs: &Mutex<mpsc::Receiver<WorkItem>>,
    abort: &AtomicBool,
    tx: &mpsc::Sender<Message>,
) {
    let mut extractor: Option<Box<dyn FeatureExtractor>> = None;

    loop {
        let work = match jobs.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => return,
        };
        let Ok(work) = work else {
            return;
        };
        // Drain without working once the run has failed.
        if abort.load(Ordering::SeqCst) {
            continue;
        }

        if extractor.is_none() {
            match catch_unwind(AssertUnwindSafe(|| factory.create())) {
                Ok(Ok(created)) => extractor = Some(created),
                Ok(Err(e)) => {
                    abort.store(true, Ordering::SeqCst);
                    let _ = tx.send(Message::Fatal(e));
                    return;
                }
                Err(payload) => {
                    abort.store(true, Ordering::SeqCst);
                    let _ = tx.send(Message::Fatal(Error::operation(format!(
                        "Extractor factory panicked: {}",
                        panic_message(payload.as_ref())
                    ))));
                    return;
                }
            }
        }
        let Some(current) = extractor.as_mut() else {
            return;
        };

        let result = catch_unwind(AssertUnwindSafe(|| {
            let expected = current.dimension();
            current.extract(&work).map(|vector| (expected, vector))
        }));

        let message = match result {
            Ok(Ok((expected, vector))) => match expected {
                Some(dim) if dim != vector.dimension() => {
                    tracing::warn!(
                        row = work.row,
                        id = %work.id,
                        expected = dim,
                        actual = vector.dimension(),
                        "Extractor returned a vector of the wrong length"
                    );
                    Message::Failed(RowOutcome::absent(work.row, work.id))
                }
                _ => Message::Done(RowOutcome::extracted(work.row, work.id, vector)),
            },
            Ok(Err(e)) if e.is_config() => {
                abort.store(true, Ordering::SeqCst);
                Message::Fatal(e)
            }
            Ok(Err(e)) => {
                tracing::warn!(row = work.row, id = %work.id, error = %e, "Extraction failed");
                Message::Failed(RowOutcome::absent(work.row, work.id))
            }
            Err(payload) => {
                tracing::warn!(
                    worker,
                    row = work.row,
                    id = %work.id,
                    message = %panic_message(payload.as_ref()),
                    "Extractor crashed; rebuilding"
                );
                extractor = None;
                Message::Crashed(RowOutcome::absent(work.row, work.id))
            }
        };

        let fatal = matches!(message, Message::Fatal(_));
        if tx.send(message).is_err() || fatal {
            return;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
