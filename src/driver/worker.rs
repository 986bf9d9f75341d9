// src/driver/worker.rs

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::warn;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget work dispatch for the deferred handlers (AF sweep,
/// AF-window stabilization, stream-off watchdog).
///
/// Enqueuing returns immediately; handlers communicate only through the
/// shared sensor state. Two workers drain one queue so the window job can
/// run while the sweep polls. Dropping the queue hangs up the channel and
/// joins the workers after their current job.
pub(crate) struct Workqueue {
    tx: Option<mpsc::Sender<Job>>,
    // Keeps the channel open even while no worker holds the receiver.
    _rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    workers: Vec<JoinHandle<()>>,
}

impl Workqueue {
    pub(crate) fn new(name: &str, worker_count: usize) -> Workqueue {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = Vec::with_capacity(worker_count);
        for n in 0..worker_count {
            let rx = Arc::clone(&rx);
            let spawned = thread::Builder::new()
                .name(format!("{name}/{n}"))
                .spawn(move || loop {
                    // Hold the receiver lock only while waiting, not while
                    // running the job.
                    let job = {
                        let guard = rx.lock().unwrap_or_else(|e| e.into_inner());
                        guard.recv()
                    };
                    match job {
                        Ok(job) => job(),
                        Err(mpsc::RecvError) => break,
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => warn!("{name}: failed to spawn worker {n}: {e}"),
            }
        }
        Workqueue { tx: Some(tx), _rx: rx, workers }
    }

    /// Enqueues a job. Returns false when the queue is shutting down.
    pub(crate) fn queue(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match &self.tx {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }
}

impl Drop for Workqueue {
    fn drop(&mut self) {
        drop(self.tx.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("workqueue worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn jobs_run_and_drop_joins() {
        let counter = Arc::new(AtomicU32::new(0));
        let wq = Workqueue::new("test-wq", 2);
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            assert!(wq.queue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        drop(wq); // joins after the queue drains
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn two_workers_overlap() {
        let wq = Workqueue::new("test-wq", 2);
        let (tx, rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // First job blocks until released; second must still get a worker.
        wq.queue(move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        });
        wq.queue(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(5))
            .expect("second job ran while first was blocked");
        let _ = release_tx.send(());
    }
}
