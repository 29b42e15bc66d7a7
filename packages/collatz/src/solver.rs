//! Solver backends and the handle that selects between them.
//!
//! Every backend answers the same question through [`ChainSolver`]: which
//! number in `[1, ceiling]` has the longest chain, and how many terms it has.
//! Ties go to the lower number in every backend.

use crate::aggregate::{Aggregation, fold_results, pick_longest};
use crate::error::{Result, SolveError};
use crate::evaluator::calculate_chain_length;
use crate::memo::{LocalMemoTable, SharedMemoTable, UNSET, table_bytes, table_len};
use crate::partition::Partition;
use crate::pool::WorkerPool;
use crate::sequence::{ChainDetail, chain_length, chain_length_cached};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Worker count used when none is configured.
pub const DEFAULT_WORKERS: usize = 5;

/// A strategy for finding the longest chain up to a ceiling.
pub trait ChainSolver: Send + Sync {
    fn determine_longest_chain(&self, ceiling: u64) -> Result<ChainDetail>;

    /// Bytes of memo table a call with this ceiling allocates.
    fn table_bytes(&self, ceiling: u64) -> usize;
}

fn validate(ceiling: u64) -> Result<()> {
    if ceiling < 1 {
        return Err(SolveError::InvalidCeiling { ceiling });
    }
    Ok(())
}

/// Single-threaded bottom-up solver over a private table.
///
/// This is the reference the other backends are checked against.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialSolver;

impl SequentialSolver {
    /// Chain details of every number in `[1, ceiling]`, in order.
    pub fn chain_lengths(&self, ceiling: u64) -> Result<Vec<ChainDetail>> {
        validate(ceiling)?;
        let mut table = LocalMemoTable::new(ceiling)?;
        (1..=ceiling)
            .map(|number| calculate_chain_length(&mut table, number))
            .collect()
    }
}

impl ChainSolver for SequentialSolver {
    fn determine_longest_chain(&self, ceiling: u64) -> Result<ChainDetail> {
        validate(ceiling)?;
        let mut table = LocalMemoTable::new(ceiling)?;
        let mut best = ChainDetail::base();
        for number in 2..=ceiling {
            best = pick_longest(best, calculate_chain_length(&mut table, number)?);
        }
        Ok(best)
    }

    fn table_bytes(&self, ceiling: u64) -> usize {
        table_bytes(ceiling)
    }
}

/// Worker pool over one shared, blocking memo table.
#[derive(Clone, Copy, Debug)]
pub struct ParallelSolver {
    workers: usize,
    aggregation: Aggregation,
    partition: Partition,
}

impl ParallelSolver {
    pub fn new(workers: usize) -> Self {
        ParallelSolver {
            workers,
            aggregation: Aggregation::default(),
            partition: Partition::default(),
        }
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    /// Chain details of every number in `[1, ceiling]`, in order, computed by
    /// the pool. Runs in [`Aggregation::All`] mode regardless of configuration.
    pub fn chain_lengths(&self, ceiling: u64) -> Result<Vec<ChainDetail>> {
        validate(ceiling)?;
        let table = Arc::new(SharedMemoTable::new(ceiling)?);
        if ceiling > 1 {
            self.run(ceiling, &table, Aggregation::All)?;
        }
        (1..=ceiling)
            .map(|number| {
                table
                    .get(number)
                    .map(|terms| ChainDetail::new(number, terms))
                    .ok_or(SolveError::Unresolved { number })
            })
            .collect()
    }

    fn run(
        &self,
        ceiling: u64,
        table: &Arc<SharedMemoTable>,
        aggregation: Aggregation,
    ) -> Result<ChainDetail> {
        let queues = self.partition.split(ceiling, self.workers);
        let pool = WorkerPool::spawn(self.workers, aggregation)?;
        pool.init(table)?;
        pool.dispatch(queues)?;
        let results = pool.collect();
        pool.shutdown();
        Ok(fold_results(&results?))
    }
}

impl Default for ParallelSolver {
    fn default() -> Self {
        ParallelSolver::new(DEFAULT_WORKERS)
    }
}

impl ChainSolver for ParallelSolver {
    fn determine_longest_chain(&self, ceiling: u64) -> Result<ChainDetail> {
        validate(ceiling)?;
        if self.workers == 0 {
            return Err(SolveError::NoWorkers);
        }
        if ceiling == 1 {
            return Ok(ChainDetail::base());
        }
        let table = Arc::new(SharedMemoTable::new(ceiling)?);
        self.run(ceiling, &table, self.aggregation)
    }

    fn table_bytes(&self, ceiling: u64) -> usize {
        table_bytes(ceiling)
    }
}

/// No memoization: every chain is walked all the way down to 1.
#[derive(Clone, Copy, Debug, Default)]
pub struct BruteForceSolver;

impl ChainSolver for BruteForceSolver {
    fn determine_longest_chain(&self, ceiling: u64) -> Result<ChainDetail> {
        validate(ceiling)?;
        let mut best = ChainDetail::base();
        for number in 2..=ceiling {
            let terms = chain_length(number).ok_or(SolveError::Overflow { number })?;
            best = pick_longest(best, ChainDetail::new(number, terms));
        }
        Ok(best)
    }

    fn table_bytes(&self, _ceiling: u64) -> usize {
        0
    }
}

/// Rayon-parallel solver where each chunk of the range keeps a private table.
///
/// Nothing is shared between threads, so nothing blocks; chains that run
/// through another chunk's numbers are recomputed instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct IndependentSolver;

impl IndependentSolver {
    fn chunks(ceiling: u64) -> u64 {
        (rayon::current_num_threads() as u64).clamp(1, ceiling.saturating_sub(1).max(1))
    }
}

impl ChainSolver for IndependentSolver {
    fn determine_longest_chain(&self, ceiling: u64) -> Result<ChainDetail> {
        validate(ceiling)?;
        if ceiling == 1 {
            return Ok(ChainDetail::base());
        }
        let len = table_len(ceiling)?;
        let queues = Partition::Contiguous.split(ceiling, Self::chunks(ceiling) as usize);

        queues
            .into_par_iter()
            .map(|queue| -> Result<ChainDetail> {
                let mut cache = vec![UNSET; len];
                cache[1] = 1;
                let mut best = ChainDetail::base();
                for number in queue {
                    let terms = chain_length_cached(number, &mut cache)
                        .ok_or(SolveError::Overflow { number })?;
                    best = pick_longest(best, ChainDetail::new(number, terms));
                }
                Ok(best)
            })
            .try_reduce(ChainDetail::base, |a, b| Ok(pick_longest(a, b)))
    }

    fn table_bytes(&self, ceiling: u64) -> usize {
        table_bytes(ceiling) * Self::chunks(ceiling) as usize
    }
}

/// Which [`ChainSolver`] a handle drives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    Sequential,
    #[default]
    Parallel,
    BruteForce,
    Independent,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Sequential,
        Backend::Parallel,
        Backend::BruteForce,
        Backend::Independent,
    ];
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Sequential => "sequential",
            Backend::Parallel => "parallel",
            Backend::BruteForce => "brute-force",
            Backend::Independent => "independent",
        })
    }
}

impl FromStr for Backend {
    type Err = SolveError;

    fn from_str(s: &str) -> Result<Self> {
        Backend::ALL
            .into_iter()
            .find(|backend| backend.to_string() == s)
            .ok_or_else(|| SolveError::unknown("backend", s))
    }
}

/// Configuration for [`create_solver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolverConfig {
    pub backend: Backend,
    /// Pool size; only the parallel backend uses it.
    pub workers: usize,
    pub aggregation: Aggregation,
    pub partition: Partition,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            backend: Backend::default(),
            workers: DEFAULT_WORKERS,
            aggregation: Aggregation::default(),
            partition: Partition::default(),
        }
    }
}

impl SolverConfig {
    pub fn new(backend: Backend) -> Self {
        SolverConfig {
            backend,
            ..SolverConfig::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Build the solver selected by `config`.
pub fn create_solver(config: &SolverConfig) -> Result<SolverHandle> {
    let solver: Arc<dyn ChainSolver> = match config.backend {
        Backend::Sequential => Arc::new(SequentialSolver),
        Backend::Parallel => {
            if config.workers == 0 {
                return Err(SolveError::NoWorkers);
            }
            Arc::new(
                ParallelSolver::new(config.workers)
                    .with_aggregation(config.aggregation)
                    .with_partition(config.partition),
            )
        }
        Backend::BruteForce => Arc::new(BruteForceSolver),
        Backend::Independent => Arc::new(IndependentSolver),
    };
    debug!(backend = %config.backend, workers = config.workers, "solver created");
    Ok(SolverHandle {
        backend: config.backend,
        solver,
    })
}

/// A configured solver. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct SolverHandle {
    backend: Backend,
    solver: Arc<dyn ChainSolver>,
}

impl SolverHandle {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Solve on the calling thread.
    pub fn determine_longest_chain(&self, ceiling: u64) -> Result<ChainDetail> {
        info!(backend = %self.backend, ceiling, "searching for longest chain");
        let detail = self.solver.determine_longest_chain(ceiling)?;
        info!(number = detail.number, terms = detail.terms, "longest chain found");
        Ok(detail)
    }

    /// Solve on a background thread; the result is delivered once through
    /// [`PendingChain::wait`].
    pub fn spawn(&self, ceiling: u64) -> Result<PendingChain> {
        let handle = self.clone();
        let thread = thread::Builder::new()
            .name("collatz-solve".to_owned())
            .spawn(move || handle.determine_longest_chain(ceiling))?;
        Ok(PendingChain { thread })
    }

    pub fn table_bytes(&self, ceiling: u64) -> usize {
        self.solver.table_bytes(ceiling)
    }
}

impl fmt::Debug for SolverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverHandle")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

/// A solve running on a background thread.
#[derive(Debug)]
pub struct PendingChain {
    thread: JoinHandle<Result<ChainDetail>>,
}

impl PendingChain {
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the result is available.
    pub fn wait(self) -> Result<ChainDetail> {
        self.thread.join().map_err(|_| SolveError::Abandoned)?
    }
}
