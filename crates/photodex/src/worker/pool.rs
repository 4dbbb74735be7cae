use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;

/// Fixed-size pool of OS threads applying one handler to queued jobs.
///
/// Both channels are bounded to `queue_capacity`, so a producer that
/// submits at most `queue_capacity` jobs before draining results can
/// never deadlock on a full channel.
pub struct WorkerPool<J, R> {
    job_sender: Sender<J>,
    result_receiver: Receiver<R>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    queue_capacity: usize,
}

impl<J: Send + 'static, R: Send + 'static> WorkerPool<J, R> {
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new<F>(worker_count: usize, queue_capacity: usize, handler: F) -> Self
    where
        F: Fn(J) -> R + Send + Sync + 'static,
    {
        assert!(worker_count > 0, "worker_count must be > 0");
        let capacity = queue_capacity.max(worker_count);
        let (job_sender, job_receiver) = bounded::<J>(capacity);
        let (result_sender, result_receiver) = bounded::<R>(capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(handler);

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_handler = Arc::clone(&handler);

            workers.push(thread::spawn(move || {
                run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_handler);
            }));
        }

        debug!("Started {} workers", worker_count);

        Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
            queue_capacity: capacity,
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn submit(&self, job: J) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }
        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn recv_result(&self) -> Option<R> {
        self.result_receiver.recv().ok()
    }

    /// Runs a batch through the pool, submitting in channel-sized chunks so
    /// neither channel can fill up while the producer is blocked.
    pub fn process_batch(&self, jobs: Vec<J>) -> Result<Vec<R>, WorkerError> {
        let mut results = Vec::with_capacity(jobs.len());
        let chunk_size = self.queue_capacity;
        let mut pending = Vec::with_capacity(chunk_size);

        for job in jobs {
            pending.push(job);
            if pending.len() == chunk_size {
                self.drain_chunk(&mut pending, &mut results)?;
            }
        }
        self.drain_chunk(&mut pending, &mut results)?;

        Ok(results)
    }

    fn drain_chunk(&self, pending: &mut Vec<J>, results: &mut Vec<R>) -> Result<(), WorkerError> {
        let count = pending.len();
        for job in pending.drain(..) {
            self.submit(job)?;
        }
        for _ in 0..count {
            results.push(self.recv_result().ok_or(WorkerError::ChannelClosed)?);
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Signals workers to exit and joins them.
    pub fn wait(self) {
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker<J, R, F>(
    worker_id: usize,
    job_receiver: Receiver<J>,
    result_sender: Sender<R>,
    shutdown: Arc<AtomicBool>,
    handler: Arc<F>,
) where
    F: Fn(J) -> R,
{
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                let result = handler(job);
                if result_sender.send(result).is_err() {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Worker {} exiting", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_processes_all_jobs() {
        let pool: WorkerPool<u32, u32> = WorkerPool::new(4, 8, |n| n * 2);

        let mut results = pool.process_batch((0..100).collect()).unwrap();
        results.sort_unstable();

        let expected: Vec<u32> = (0..100).map(|n| n * 2).collect();
        assert_eq!(results, expected);

        pool.wait();
    }

    #[test]
    fn test_batch_larger_than_queue_does_not_deadlock() {
        // One worker, tiny queue, batch far bigger than the channel.
        let pool: WorkerPool<u32, u32> = WorkerPool::new(1, 2, |n| n + 1);

        let results = pool.process_batch((0..50).collect()).unwrap();
        assert_eq!(results.len(), 50);

        pool.wait();
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pool: WorkerPool<u32, u32> = WorkerPool::new(1, 2, |n| n);
        pool.shutdown();

        assert!(matches!(pool.submit(1), Err(WorkerError::ChannelClosed)));
        pool.wait();
    }

    #[test]
    fn test_empty_batch() {
        let pool: WorkerPool<u32, u32> = WorkerPool::new(2, 4, |n| n);
        assert!(pool.process_batch(vec![]).unwrap().is_empty());
        pool.wait();
    }
}
