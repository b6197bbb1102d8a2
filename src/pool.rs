//! Fixed-size worker pool used to evaluate a generation's fitness in parallel.
//!
//! One mutex guards the FIFO queue and the shutdown flag; idle workers sleep
//! on a condition variable. Shutdown lets workers drain every task that was
//! already queued before they exit.

use crate::error::{Error, Result};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    signal: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        // jobs never run under the lock, so a poisoned guard still holds a valid queue
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

/// Result of a queued task. Waiting re-raises a panic from the task as an error.
pub struct TaskHandle<T> {
    rx: Receiver<thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn wait(self) -> Result<T> {
        match self.rx.recv() {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(payload)) => Err(Error::TaskPanicked(panic_message(payload.as_ref()))),
            Err(_) => Err(Error::TaskPanicked("task dropped before it ran".into())),
        }
    }
}

impl ThreadPool {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidConfig("thread pool needs at least one worker".into()));
        }
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            signal: Condvar::new(),
        });
        // if a spawn fails, dropping `pool` joins the workers already running
        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(size),
        };
        for i in 0..size {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("snake-ga-worker-{i}"))
                .spawn(move || worker_loop(&shared))?;
            pool.workers.push(handle);
        }
        debug!(workers = size, "thread pool started");
        Ok(pool)
    }

    /// One worker per hardware thread.
    pub fn with_available_parallelism() -> Result<Self> {
        Self::new(thread::available_parallelism().map_or(1, |n| n.get()))
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn enqueue<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let _ = tx.send(panic::catch_unwind(AssertUnwindSafe(f)));
        });
        {
            let mut q = self.shared.lock();
            if q.shutdown {
                return Err(Error::PoolShutdown);
            }
            q.jobs.push_back(job);
        }
        self.shared.signal.notify_one();
        Ok(TaskHandle { rx })
    }

    /// Stops accepting work, runs whatever is still queued and joins the workers.
    pub fn shutdown(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.signal.notify_all();
        let n = self.workers.len();
        for w in self.workers.drain(..) {
            let _ = w.join();
        }
        if n > 0 {
            debug!(workers = n, "thread pool stopped");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut q = shared.lock();
            loop {
                if let Some(job) = q.jobs.pop_front() {
                    break job;
                }
                if q.shutdown {
                    return;
                }
                q = shared.signal.wait(q).unwrap_or_else(PoisonError::into_inner);
            }
        };
        job();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
