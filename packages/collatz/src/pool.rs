//! A fixed pool of worker threads sharing one memo table.
//!
//! The orchestrator talks to each worker over its own inbox:
//!
//! 1. [`WorkerMessage::Init`] hands over the shared table.
//! 2. [`WorkerMessage::Work`] hands over the worker's whole queue.
//!
//! Each worker answers with exactly one [`WorkerReport`] per queue on a
//! channel shared by the pool. [`WorkerPool::collect`] is the completion
//! barrier: it returns once every worker has finished, or as soon as one of
//! them fails. Dropping the pool closes the inboxes and joins the threads.

use crate::aggregate::{Aggregation, WorkerResult, pick_longest};
use crate::error::{Result, SolveError};
use crate::evaluator::calculate_chain_length;
use crate::memo::SharedMemoTable;
use crate::partition::WorkerQueue;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Orchestrator to worker.
pub enum WorkerMessage {
    Init { table: Arc<SharedMemoTable> },
    Work { numbers: WorkerQueue },
}

/// Worker to orchestrator.
#[derive(Debug)]
pub enum WorkerReport {
    Finished { worker: usize, result: WorkerResult },
    Failed { worker: usize, error: SolveError },
    /// Sent while unwinding from a panic.
    Exited { worker: usize },
}

struct Worker {
    id: usize,
    aggregation: Aggregation,
    inbox: Receiver<WorkerMessage>,
    reports: Sender<WorkerReport>,
    table: Option<Arc<SharedMemoTable>>,
}

impl Worker {
    fn run(&mut self) {
        while let Ok(message) = self.inbox.recv() {
            match message {
                WorkerMessage::Init { table } => self.table = Some(table),
                WorkerMessage::Work { numbers } => {
                    let report = match self.evaluate(&numbers) {
                        Ok(result) => {
                            debug!(worker = self.id, numbers = numbers.len(), "worker finished queue");
                            WorkerReport::Finished {
                                worker: self.id,
                                result,
                            }
                        }
                        Err(error) => {
                            if let Some(table) = &self.table {
                                table.poison();
                            }
                            WorkerReport::Failed {
                                worker: self.id,
                                error,
                            }
                        }
                    };
                    if self.reports.send(report).is_err() {
                        break;
                    }
                }
            }
        }
    }

    fn evaluate(&self, numbers: &[u64]) -> Result<WorkerResult> {
        let mut table: &SharedMemoTable = self
            .table
            .as_deref()
            .ok_or(SolveError::NotInitialised { worker: self.id })?;

        match self.aggregation {
            Aggregation::Longest => {
                let mut best = None;
                for &number in numbers {
                    let detail = calculate_chain_length(&mut table, number)?;
                    best = Some(best.map_or(detail, |b| pick_longest(b, detail)));
                }
                Ok(WorkerResult::Longest(best))
            }
            Aggregation::All => numbers
                .iter()
                .map(|&number| calculate_chain_length(&mut table, number))
                .collect::<Result<Vec<_>>>()
                .map(WorkerResult::All),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!(worker = self.id, "worker panicked");
            if let Some(table) = &self.table {
                table.poison();
            }
            let _ = self.reports.send(WorkerReport::Exited { worker: self.id });
        }
    }
}

struct WorkerHandle {
    inbox: Option<Sender<WorkerMessage>>,
    thread: Option<JoinHandle<()>>,
}

/// A fixed number of named worker threads, started together and joined together.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    reports: Receiver<WorkerReport>,
}

impl WorkerPool {
    /// Start `count` idle workers that will report in the given mode.
    pub fn spawn(count: usize, aggregation: Aggregation) -> Result<Self> {
        if count == 0 {
            return Err(SolveError::NoWorkers);
        }
        let (report_tx, reports) = crossbeam_channel::unbounded();
        let mut pool = WorkerPool {
            workers: Vec::with_capacity(count),
            reports,
        };

        for id in 0..count {
            let (inbox_tx, inbox) = crossbeam_channel::bounded(2);
            let mut worker = Worker {
                id,
                aggregation,
                inbox,
                reports: report_tx.clone(),
                table: None,
            };
            let thread = thread::Builder::new()
                .name(format!("collatz-worker-{id}"))
                .spawn(move || worker.run())?;
            pool.workers.push(WorkerHandle {
                inbox: Some(inbox_tx),
                thread: Some(thread),
            });
        }

        debug!(workers = count, %aggregation, "worker pool started");
        Ok(pool)
    }

    /// Bind every worker to the shared table.
    pub fn init(&self, table: &Arc<SharedMemoTable>) -> Result<()> {
        for id in 0..self.workers.len() {
            self.send(id, WorkerMessage::Init {
                table: Arc::clone(table),
            })?;
        }
        Ok(())
    }

    /// Hand queue `i` to worker `i`.
    pub fn dispatch(&self, queues: Vec<WorkerQueue>) -> Result<()> {
        if queues.len() != self.workers.len() {
            return Err(SolveError::QueueMismatch {
                queues: queues.len(),
                workers: self.workers.len(),
            });
        }
        for (id, numbers) in queues.into_iter().enumerate() {
            self.send(id, WorkerMessage::Work { numbers })?;
        }
        debug!(workers = self.workers.len(), "work dispatched");
        Ok(())
    }

    /// Wait until every worker has reported once and return their results in
    /// worker order.
    ///
    /// A failure or panic ends the wait early. A worker that only failed
    /// because a peer poisoned the table does not end it: the peer's own
    /// report, which names the real cause, follows.
    pub fn collect(&self) -> Result<Vec<WorkerResult>> {
        let expected = self.workers.len();
        let mut results: Vec<Option<WorkerResult>> = (0..expected).map(|_| None).collect();
        let mut completed = 0;
        let mut poisoned = None;

        while completed < expected {
            let Ok(report) = self.reports.recv() else {
                return Err(poisoned.unwrap_or(SolveError::PoolDisconnected {
                    completed,
                    expected,
                }));
            };
            match report {
                WorkerReport::Finished { worker, result } => {
                    if results[worker].replace(result).is_none() {
                        completed += 1;
                    }
                }
                WorkerReport::Failed {
                    worker,
                    error: SolveError::TablePoisoned,
                } => {
                    poisoned.get_or_insert(SolveError::worker_failed(worker, SolveError::TablePoisoned));
                    completed += 1;
                }
                WorkerReport::Failed { worker, error } => {
                    warn!(worker, %error, "worker failed");
                    return Err(SolveError::worker_failed(worker, error));
                }
                WorkerReport::Exited { worker } => {
                    return Err(SolveError::WorkerExited { worker });
                }
            }
        }

        if let Some(error) = poisoned {
            return Err(error);
        }
        Ok(results.into_iter().flatten().collect())
    }

    /// Close every inbox and join every thread.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn send(&self, id: usize, message: WorkerMessage) -> Result<()> {
        self.workers[id]
            .inbox
            .as_ref()
            .and_then(|inbox| inbox.send(message).ok())
            .ok_or(SolveError::WorkerExited { worker: id })
    }

    fn teardown(&mut self) {
        for worker in &mut self.workers {
            worker.inbox.take();
        }
        for (id, worker) in self.workers.iter_mut().enumerate() {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    debug!(worker = id, "joined a panicked worker");
                }
            }
        }
        debug!(workers = self.workers.len(), "worker pool torn down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::round_robin;
    use crate::sequence::ChainDetail;

    fn run_pool(ceiling: u64, workers: usize, aggregation: Aggregation) -> Result<Vec<WorkerResult>> {
        let table = Arc::new(SharedMemoTable::new(ceiling)?);
        let pool = WorkerPool::spawn(workers, aggregation)?;
        pool.init(&table)?;
        pool.dispatch(round_robin(ceiling, workers))?;
        let results = pool.collect();
        pool.shutdown();
        results
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            WorkerPool::spawn(0, Aggregation::Longest),
            Err(SolveError::NoWorkers)
        ));
    }

    #[test]
    fn test_one_result_per_worker() {
        let results = run_pool(100, 4, Aggregation::Longest).unwrap();
        assert_eq!(results.len(), 4);
        // 97 → 1 has 119 terms and 97 % 4 == 1
        assert_eq!(results[1], WorkerResult::Longest(Some(ChainDetail::new(97, 119))));
    }

    #[test]
    fn test_all_mode_reports_every_number() {
        let results = run_pool(50, 3, Aggregation::All).unwrap();
        let total: usize = results
            .iter()
            .map(|r| match r {
                WorkerResult::All(details) => details.len(),
                WorkerResult::Longest(_) => 0,
            })
            .sum();
        assert_eq!(total, 49);
    }

    #[test]
    fn test_empty_queues_report_nothing() {
        let results = run_pool(2, 4, Aggregation::Longest).unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[2], WorkerResult::Longest(Some(ChainDetail::new(2, 2))));
        assert_eq!(results[0], WorkerResult::Longest(None));
    }

    #[test]
    fn test_queue_mismatch() {
        let pool = WorkerPool::spawn(2, Aggregation::Longest).unwrap();
        assert!(matches!(
            pool.dispatch(round_robin(10, 3)),
            Err(SolveError::QueueMismatch { queues: 3, workers: 2 })
        ));
    }

    #[test]
    fn test_work_before_init() {
        let pool = WorkerPool::spawn(1, Aggregation::Longest).unwrap();
        pool.dispatch(vec![vec![2, 3]]).unwrap();
        let err = pool.collect().unwrap_err();
        match err {
            SolveError::WorkerFailed { worker, source } => {
                assert_eq!(worker, 0);
                assert!(matches!(*source, SolveError::NotInitialised { worker: 0 }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_failure_releases_blocked_peer() {
        let table = Arc::new(SharedMemoTable::new(10).unwrap());
        let pool = WorkerPool::spawn(2, Aggregation::Longest).unwrap();
        pool.init(&table).unwrap();
        // Worker 0 blocks on 4, which worker 1 never reaches: 1000 is out of range
        pool.dispatch(vec![vec![5], vec![1000, 4]]).unwrap();

        let err = pool.collect().unwrap_err();
        match err {
            SolveError::WorkerFailed { worker, source } => {
                assert_eq!(worker, 1);
                assert!(matches!(*source, SolveError::OutOfRange { number: 500, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        pool.shutdown();
        assert!(table.is_poisoned());
    }

    #[test]
    fn test_panicking_worker_reports_exit() {
        let table = Arc::new(SharedMemoTable::new(10).unwrap());
        let (report_tx, reports) = crossbeam_channel::unbounded();
        let (_inbox_tx, inbox) = crossbeam_channel::bounded(1);
        let worker = Worker {
            id: 3,
            aggregation: Aggregation::Longest,
            inbox,
            reports: report_tx,
            table: Some(Arc::clone(&table)),
        };

        let handle = thread::spawn(move || {
            let _worker = worker;
            panic!("worker blew up");
        });
        assert!(handle.join().is_err());
        assert!(matches!(reports.recv().unwrap(), WorkerReport::Exited { worker: 3 }));
        assert!(table.is_poisoned());
    }
}
