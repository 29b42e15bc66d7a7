pub mod aggregate;
pub mod error;
pub mod evaluator;
pub mod memo;
pub mod partition;
pub mod pool;
pub mod report;
pub mod sequence;
pub mod solver;

pub use aggregate::{Aggregation, WorkerResult, pick_longest};
pub use error::{Result, SolveError};
pub use evaluator::calculate_chain_length;
pub use memo::{LocalMemoTable, MemoTable, SharedMemoTable};
pub use partition::{Partition, WorkerQueue};
pub use report::{Report, measure};
pub use sequence::{ChainDetail, chain_length, step};
pub use solver::{
    Backend, BruteForceSolver, ChainSolver, IndependentSolver, ParallelSolver, PendingChain,
    SequentialSolver, SolverConfig, SolverHandle, create_solver,
};
