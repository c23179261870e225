//! Bounded worker pool over OS threads
//!
//! A producer running on the calling thread pushes tasks into a bounded
//! queue; N named worker threads consume them. Each worker builds its own
//! state (usually a database connection) before taking work. The call
//! returns once the producer is done, the queue is drained and every worker
//! has exited.

use crate::Result;
use crossbeam_channel::{bounded, Sender};
use std::thread;
use thiserror::Error;

/// Every worker has exited, so nothing will ever consume the task
#[derive(Debug, Error)]
#[error("task queue closed: no worker is left to consume it")]
pub struct QueueClosed;

/// Producer side of a running pool
pub struct TaskQueue<T> {
    tx: Sender<T>,
}

impl<T> TaskQueue<T> {
    /// Enqueues a task, blocking while the queue is full
    pub fn push(&self, task: T) -> std::result::Result<(), QueueClosed> {
        self.tx.send(task).map_err(|_| QueueClosed)
    }
}

/// Fixed-size pool of worker threads
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: String,
    workers: usize,
    capacity: usize,
}

impl WorkerPool {
    /// Creates a pool of `workers` threads named `<name>-<index>`
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            name: name.into(),
            workers,
            capacity: workers,
        }
    }

    /// Sets how many tasks may wait in the queue
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs the pool until `produce` returns and all queued tasks are handled
    ///
    /// `init` builds each worker's state on the worker thread; a worker whose
    /// init fails logs the error and exits. Once no worker is left,
    /// `TaskQueue::push` fails with `QueueClosed`.
    pub fn run<T, S, I, H, P, R>(&self, init: I, handle: H, produce: P) -> R
    where
        T: Send,
        I: Fn(usize) -> Result<S> + Sync,
        H: Fn(&mut S, T) + Sync,
        P: FnOnce(&TaskQueue<T>) -> R,
    {
        let (tx, rx) = bounded::<T>(self.capacity);

        thread::scope(|scope| {
            for index in 0..self.workers {
                let rx = rx.clone();
                let init = &init;
                let handle = &handle;
                let name = format!("{}-{}", self.name, index);

                let spawned = thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(scope, move || {
                        let mut state = match init(index) {
                            Ok(state) => state,
                            Err(e) => {
                                tracing::error!("Worker {} failed to start: {}", name, e);
                                return;
                            }
                        };
                        for task in rx.iter() {
                            handle(&mut state, task);
                        }
                        tracing::trace!("Worker {} finished", name);
                    });

                if let Err(e) = spawned {
                    tracing::error!("Failed to spawn worker {}-{}: {}", self.name, index, e);
                }
            }

            // Only workers may hold receivers, so a send fails once they are all gone
            drop(rx);

            let queue = TaskQueue { tx };
            let result = produce(&queue);
            drop(queue);
            result
        })
    }

    /// Runs the pool over a fixed set of tasks
    pub fn run_all<T, S, I, H>(
        &self,
        init: I,
        handle: H,
        tasks: impl IntoIterator<Item = T>,
    ) -> std::result::Result<(), QueueClosed>
    where
        T: Send,
        I: Fn(usize) -> Result<S> + Sync,
        H: Fn(&mut S, T) + Sync,
    {
        self.run(init, handle, |queue| {
            for task in tasks {
                queue.push(task)?;
            }
            Ok(())
        })
    }
}
