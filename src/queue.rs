//! Serialized work queue.
//!
//! The container owns one queue per image replayer; every replayer state
//! transition and external-request completion is funneled through it, so the
//! replayer never needs a thread of its own and no two transitions run
//! concurrently.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Job),
    Stop,
}

/// Cloneable handle used to enqueue work.
#[derive(Clone)]
pub struct WorkQueue {
    tx: Sender<Command>,
}

impl WorkQueue {
    /// Spawn a worker thread and return the queue plus its lifecycle handle.
    pub fn spawn(name: &str) -> (WorkQueue, WorkQueueHandle) {
        let (tx, rx) = channel::unbounded::<Command>();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for command in rx {
                    match command {
                        Command::Run(job) => job(),
                        Command::Stop => break,
                    }
                }
            })
            .expect("spawn work queue thread");
        (
            WorkQueue { tx: tx.clone() },
            WorkQueueHandle {
                tx,
                join: Some(join),
            },
        )
    }

    /// Enqueue a job. Jobs run in submission order on the worker thread.
    pub fn queue(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Command::Run(Box::new(job))).is_err() {
            tracing::debug!("work queue stopped; dropping job");
        }
    }
}

/// Owner-side handle; stops the worker after draining queued jobs.
pub struct WorkQueueHandle {
    tx: Sender<Command>,
    join: Option<JoinHandle<()>>,
}

impl WorkQueueHandle {
    pub fn shutdown(mut self) {
        let _ = self.tx.send(Command::Stop);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for WorkQueueHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Stop);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn jobs_run_in_submission_order() {
        let (queue, handle) = WorkQueue::spawn("wq-test");
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..16 {
            let log = Arc::clone(&log);
            queue.queue(move || log.lock().unwrap().push(i));
        }
        handle.shutdown();
        assert_eq!(*log.lock().unwrap(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn shutdown_drains_queued_jobs() {
        let (queue, handle) = WorkQueue::spawn("wq-drain");
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let ran = Arc::clone(&ran);
            queue.queue(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        handle.shutdown();
        assert_eq!(ran.load(Ordering::SeqCst), 8);
    }
}
