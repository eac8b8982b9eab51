//! Fixed-size worker pool for running independent jobs in parallel.
//!
//! Jobs are queued up front and drained by plain OS threads, one
//! session per thread. Browser sessions are not `Send`, so each job
//! owns everything it touches and builds its session inside the
//! closure.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{error, info};

use crate::result::{EsperarError, EsperarResult};

type Task = Box<dyn FnOnce() -> EsperarResult<()> + Send + 'static>;

/// Queue of fallible jobs executed by a bounded set of worker threads.
#[derive(Default)]
pub struct TaskPool {
    tasks: Vec<Task>,
}

impl TaskPool {
    /// Empty pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued jobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Queue a job for the next [`run`](Self::run)
    pub fn add(&mut self, task: impl FnOnce() -> EsperarResult<()> + Send + 'static) {
        self.tasks.push(Box::new(task));
    }

    /// Run every queued job on up to `threads` workers (one worker per
    /// job when `None`), blocking until all of them finish. Every job
    /// runs even when earlier ones fail; the first failure is returned
    /// afterwards. A panicking job is reported as a failure rather than
    /// poisoning the pool. The queue is left empty.
    pub fn run(&mut self, threads: Option<usize>) -> EsperarResult<()> {
        let tasks: Vec<Task> = self.tasks.drain(..).collect();
        if tasks.is_empty() {
            return Ok(());
        }
        let total = tasks.len();
        let workers = threads.unwrap_or(total).clamp(1, total);
        info!(jobs = total, workers, "running task pool");

        let queue: Arc<Mutex<VecDeque<Task>>> = Arc::new(Mutex::new(tasks.into()));
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || -> EsperarResult<()> {
                let mut first_failure = None;
                loop {
                    let task = match queue.lock() {
                        Ok(mut queue) => queue.pop_front(),
                        Err(poisoned) => poisoned.into_inner().pop_front(),
                    };
                    let Some(task) = task else { break };
                    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            error!(error = %err, "task failed");
                            first_failure.get_or_insert(err);
                        }
                        Err(_) => {
                            error!("task panicked");
                            first_failure.get_or_insert(EsperarError::Driver {
                                message: "task panicked".to_string(),
                            });
                        }
                    }
                }
                first_failure.map_or(Ok(()), Err)
            }));
        }

        let mut first_failure = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_failure.get_or_insert(err);
                }
                Err(_) => {
                    first_failure.get_or_insert(EsperarError::Driver {
                        message: "task panicked".to_string(),
                    });
                }
            }
        }
        first_failure.map_or(Ok(()), Err)
    }
}
